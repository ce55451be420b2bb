//! Storage and job lifecycle across real RPC connections.

use reef_integration_tests::*;
use reef_net::{Reply, Request};
use reef_types::*;

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_end_to_end_scenario() {
    let d = TestDeployment::start().await;
    let client = d.client();

    call(&client, Request::Ping).await.unwrap();

    let s = register_adhoc(&client, d.ctx(), &["n01", "n02", "n03", "n04"]).await;
    assert_eq!(s.node_count(), 4);
    let j = register_job(&client, 1001, Some(s.id)).await.unwrap();

    let reply = call(&client, Request::CurrentClient { adhoc: s.id }).await.unwrap();
    assert_eq!(reply, Reply::Client(Some(j.id)));

    // Deployment runs the controller's startup command.
    let Reply::MountPath(path) = call(&client, Request::DeployAdhocStorage { adhoc: s.id })
        .await
        .unwrap()
    else {
        panic!("expected a mount path");
    };
    let directory = d.workdir.path().join(s.id.to_string());
    assert_eq!(path, directory.display().to_string());
    let running = std::fs::read_to_string(directory.join("running")).unwrap();
    assert_eq!(running.trim(), "n01,n02,n03,n04");

    let err = call(&client, Request::DeployAdhocStorage { adhoc: s.id })
        .await
        .unwrap_err();
    assert_eq!(err, ErrorCode::AlreadyDeployed);

    let Reply::Transfer(t) = call(
        &client,
        Request::TransferDatasets {
            job: j.id,
            sources: ds(&["lustre:/in"]),
            targets: ds(&["gekkofs:/in"]),
            qos_limits: vec![],
            mapping: TransferMapping::OneToOne,
        },
    )
    .await
    .unwrap() else {
        panic!("expected a transfer");
    };
    assert_eq!(t.status, TransferStatus::Pending);
    assert_eq!(d.mover.received.lock().await[0].id, t.id);

    call(&client, Request::RemoveJob { job: j.id }).await.unwrap();
    let reply = call(&client, Request::CurrentClient { adhoc: s.id }).await.unwrap();
    assert_eq!(reply, Reply::Client(None));

    // The removed job's transfers go with it.
    let err = call(&client, Request::TransferStatus { transfer: t.id })
        .await
        .unwrap_err();
    assert_eq!(err, ErrorCode::NotFound);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_terminate_runs_shutdown_command() {
    let d = TestDeployment::start().await;
    let client = d.client();
    let s = register_adhoc(&client, d.ctx(), &["n01"]).await;

    call(&client, Request::DeployAdhocStorage { adhoc: s.id })
        .await
        .unwrap();
    let marker = d.workdir.path().join(s.id.to_string()).join("running");
    assert!(marker.exists());

    call(&client, Request::TerminateAdhocStorage { adhoc: s.id })
        .await
        .unwrap();
    assert!(!marker.exists());

    let Reply::AdhocStorage(stored) = call(&client, Request::GetAdhocStorage { adhoc: s.id })
        .await
        .unwrap()
    else {
        panic!("expected a storage");
    };
    assert!(!stored.is_deployed());
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_unsupported_storage_type_fails_deploy() {
    let d = TestDeployment::start().await;
    let client = d.client();

    let Reply::AdhocStorage(s) = call(
        &client,
        Request::RegisterAdhocStorage {
            name: "objects".into(),
            kind: AdhocStorageType::Dataclay,
            ctx: d.ctx(),
            resources: AdhocStorageResources {
                nodes: nodes(&["n01"]),
            },
        },
    )
    .await
    .unwrap() else {
        panic!("expected a storage");
    };

    let err = call(&client, Request::DeployAdhocStorage { adhoc: s.id })
        .await
        .unwrap_err();
    assert_eq!(err, ErrorCode::BadArguments);

    // The failed attempt leaves the storage deployable.
    let Reply::AdhocStorage(stored) = call(&client, Request::GetAdhocStorage { adhoc: s.id })
        .await
        .unwrap()
    else {
        panic!("expected a storage");
    };
    assert!(!stored.is_deployed());
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_query_reports_controller_and_io_procs() {
    let d = TestDeployment::start().await;
    let client = d.client();
    let s = register_adhoc(&client, d.ctx(), &["n01", "n02", "n03"]).await;
    let j = register_job(&client, 4711, Some(s.id)).await.unwrap();

    let reply = call(&client, Request::Query { slurm_id: 4711 }).await.unwrap();
    assert_eq!(
        reply,
        Reply::JobInfo(JobInfo {
            job_id: j.id,
            adhoc_controller_address: d.controller_addr.clone(),
            io_procs: 3,
        })
    );

    let err = call(&client, Request::Query { slurm_id: 1 }).await.unwrap_err();
    assert_eq!(err, ErrorCode::NotFound);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_malformed_requests_are_rejected() {
    let d = TestDeployment::start().await;
    let client = d.client();

    let err = call(
        &client,
        Request::RegisterAdhocStorage {
            name: "empty".into(),
            kind: AdhocStorageType::Gekkofs,
            ctx: d.ctx(),
            resources: AdhocStorageResources { nodes: vec![] },
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err, ErrorCode::BadArguments);

    let err = call(
        &client,
        Request::RegisterJob {
            slurm_id: 1,
            resources: JobResources {
                nodes: nodes(&[""]),
            },
            requirements: JobRequirements::default(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err, ErrorCode::BadArguments);

    // Nothing was registered.
    assert_eq!(d.service.ids_allocated(), 0);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_removed_entities_are_not_found() {
    let d = TestDeployment::start().await;
    let client = d.client();
    let j = register_job(&client, 7, None).await.unwrap();

    call(&client, Request::RemoveJob { job: j.id }).await.unwrap();
    let err = call(&client, Request::GetJob { job: j.id }).await.unwrap_err();
    assert_eq!(err, ErrorCode::NotFound);
    let err = call(
        &client,
        Request::UpdateJob {
            job: j.id,
            resources: JobResources::default(),
            requirements: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err, ErrorCode::NotFound);
}
