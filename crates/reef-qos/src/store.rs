//! [`QosStore`] implementation.
//!
//! Limits are keyed by entity, at most one per class. Job-scoped limits are
//! dropped with their job.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use reef_types::{JobId, QosClass, QosEntity, QosLimit, QosScope};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::QosError;

type Result<T> = std::result::Result<T, QosError>;

/// Entity-keyed QoS limits.
pub struct QosStore {
    limits: RwLock<HashMap<QosEntity, BTreeMap<QosClass, u64>>>,
}

impl QosStore {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            limits: RwLock::new(HashMap::new()),
        })
    }

    /// Insert or replace a limit. Returns the previous value for the same
    /// entity and class, if any.
    pub async fn set(&self, limit: QosLimit) -> Option<u64> {
        let mut limits = self.limits.write().await;
        let previous = limits
            .entry(limit.entity.clone())
            .or_default()
            .insert(limit.class, limit.value);

        info!(entity = %limit.entity, class = ?limit.class, value = limit.value, ?previous, "qos limit set");
        previous
    }

    /// All limits recorded for `entity`, which must belong to `scope`.
    pub async fn get(&self, scope: QosScope, entity: &QosEntity) -> Result<Vec<QosLimit>> {
        if entity.scope() != scope {
            return Err(QosError::ScopeMismatch {
                scope,
                entity: entity.clone(),
            });
        }

        let limits = self.limits.read().await;
        Ok(limits
            .get(entity)
            .map(|classes| {
                classes
                    .iter()
                    .map(|(class, value)| QosLimit {
                        entity: entity.clone(),
                        class: *class,
                        value: *value,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Remove the limit of `class` on `entity`, or every limit on it when
    /// `class` is `None`. Returns how many limits were removed.
    pub async fn remove(&self, entity: &QosEntity, class: Option<QosClass>) -> Result<usize> {
        let mut limits = self.limits.write().await;
        let Some(classes) = limits.get_mut(entity) else {
            return Err(QosError::NotFound(entity.clone()));
        };

        let removed = match class {
            Some(class) => {
                if classes.remove(&class).is_none() {
                    return Err(QosError::NotFound(entity.clone()));
                }
                1
            }
            None => {
                let n = classes.len();
                classes.clear();
                n
            }
        };

        if classes.is_empty() {
            limits.remove(entity);
        }
        debug!(%entity, ?class, removed, "qos limits removed");
        Ok(removed)
    }

    /// Drop the limits attached to a job. Returns how many were dropped.
    pub async fn purge_job(&self, job: JobId) -> usize {
        let removed = self
            .limits
            .write()
            .await
            .remove(&QosEntity::Job(job))
            .map(|classes| classes.len())
            .unwrap_or(0);
        if removed > 0 {
            debug!(%job, removed, "purged job qos limits");
        }
        removed
    }

    /// Number of limits attached to a job.
    pub async fn count_for_job(&self, job: JobId) -> usize {
        self.limits
            .read()
            .await
            .get(&QosEntity::Job(job))
            .map(|classes| classes.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use reef_types::{Dataset, ErrorCode};

    use super::*;

    fn limit(entity: QosEntity, class: QosClass, value: u64) -> QosLimit {
        QosLimit {
            entity,
            class,
            value,
        }
    }

    #[tokio::test]
    async fn test_set_replaces_same_class() {
        let store = QosStore::new();
        let node = QosEntity::Node("n01".into());

        assert_eq!(store.set(limit(node.clone(), QosClass::Bandwidth, 100)).await, None);
        assert_eq!(
            store.set(limit(node.clone(), QosClass::Bandwidth, 200)).await,
            Some(100)
        );
        store.set(limit(node.clone(), QosClass::Iops, 50)).await;

        let mut got = store.get(QosScope::Node, &node).await.unwrap();
        got.sort_by_key(|l| l.class);
        assert_eq!(
            got,
            vec![
                limit(node.clone(), QosClass::Bandwidth, 200),
                limit(node, QosClass::Iops, 50),
            ]
        );
    }

    #[tokio::test]
    async fn test_get_unknown_entity_is_empty() {
        let store = QosStore::new();
        let ds = QosEntity::Dataset(Dataset::new("lustre:/in"));
        assert!(store.get(QosScope::Dataset, &ds).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_rejects_scope_mismatch() {
        let store = QosStore::new();
        let err = store
            .get(QosScope::Job, &QosEntity::Node("n01".into()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadArguments);
    }

    #[tokio::test]
    async fn test_entities_are_independent() {
        let store = QosStore::new();
        let a = QosEntity::Node("n01".into());
        let b = QosEntity::Node("n02".into());
        store.set(limit(a.clone(), QosClass::Iops, 1)).await;
        store.set(limit(b.clone(), QosClass::Iops, 2)).await;

        assert_eq!(store.get(QosScope::Node, &a).await.unwrap()[0].value, 1);
        assert_eq!(store.get(QosScope::Node, &b).await.unwrap()[0].value, 2);
    }

    #[tokio::test]
    async fn test_remove_single_class_and_all() {
        let store = QosStore::new();
        let job = QosEntity::Job(JobId::from(4));
        store.set(limit(job.clone(), QosClass::Bandwidth, 1)).await;
        store.set(limit(job.clone(), QosClass::Iops, 2)).await;

        assert_eq!(store.remove(&job, Some(QosClass::Iops)).await.unwrap(), 1);
        let err = store.remove(&job, Some(QosClass::Iops)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        assert_eq!(store.remove(&job, None).await.unwrap(), 1);
        assert!(store.get(QosScope::Job, &job).await.unwrap().is_empty());
        assert!(store.remove(&job, None).await.is_err());
    }

    #[tokio::test]
    async fn test_purge_job_only_touches_job_scope() {
        let store = QosStore::new();
        let id = JobId::from(9);
        store.set(limit(QosEntity::Job(id), QosClass::Bandwidth, 10)).await;
        store.set(limit(QosEntity::Job(id), QosClass::Iops, 10)).await;
        store.set(limit(QosEntity::Node("n01".into()), QosClass::Iops, 5)).await;

        assert_eq!(store.count_for_job(id).await, 2);
        assert_eq!(store.purge_job(id).await, 2);
        assert_eq!(store.count_for_job(id).await, 0);
        assert_eq!(store.purge_job(id).await, 0);

        let node = store
            .get(QosScope::Node, &QosEntity::Node("n01".into()))
            .await
            .unwrap();
        assert_eq!(node.len(), 1);
    }
}
