//! Many clients against one service.

use std::collections::HashSet;

use reef_integration_tests::*;
use reef_net::{Reply, Request};
use reef_types::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30000)]
async fn test_exclusive_binding_under_concurrency() {
    let d = TestDeployment::start().await;
    let setup = d.client();
    let s = register_adhoc(&setup, d.ctx(), &["n01", "n02"]).await;

    let mut jobs = Vec::new();
    for slurm_id in 0..16 {
        jobs.push(register_job(&setup, slurm_id, None).await.unwrap().id);
    }

    // One connection per caller, so requests really overlap.
    let handles: Vec<_> = jobs
        .iter()
        .map(|&job| {
            let client = d.client();
            tokio::spawn(async move {
                let result = call(&client, Request::BindAdhocStorage { adhoc: s.id, job }).await;
                (job, result)
            })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        let (job, result) = handle.await.unwrap();
        match result {
            Ok(_) => winners.push(job),
            Err(code) => assert_eq!(code, ErrorCode::AdhocInUse),
        }
    }

    assert_eq!(winners.len(), 1);
    let reply = call(&setup, Request::CurrentClient { adhoc: s.id }).await.unwrap();
    assert_eq!(reply, Reply::Client(Some(winners[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30000)]
async fn test_concurrent_transfers_get_unique_ids() {
    let d = TestDeployment::start().await;
    let setup = d.client();
    let j = register_job(&setup, 1, None).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = d.client();
            tokio::spawn(async move {
                let mut ids = Vec::new();
                for _ in 0..8 {
                    let reply = call(
                        &client,
                        Request::TransferDatasets {
                            job: j.id,
                            sources: ds(&["lustre:/a"]),
                            targets: ds(&["gekkofs:/a"]),
                            qos_limits: vec![],
                            mapping: TransferMapping::OneToOne,
                        },
                    )
                    .await;
                    match reply {
                        Ok(Reply::Transfer(t)) => ids.push(t.id),
                        other => panic!("transfer_datasets: {other:?}"),
                    }
                }
                ids
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(all.insert(id), "duplicate transfer id {id}");
        }
    }
    assert_eq!(all.len(), 64);
    assert_eq!(d.mover.received.lock().await.len(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30000)]
async fn test_duplicate_slurm_ids_race() {
    let d = TestDeployment::start().await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = d.client();
            tokio::spawn(async move { register_job(&client, 99, None).await })
        })
        .collect();

    let mut registered = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => registered += 1,
            Err(code) => assert_eq!(code, ErrorCode::BadArguments),
        }
    }
    assert_eq!(registered, 1);
}
