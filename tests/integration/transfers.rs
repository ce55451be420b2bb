//! Transfers, QoS and data operations across real RPC connections.

use std::sync::atomic::Ordering;

use reef_integration_tests::*;
use reef_net::{Reply, Request, RpcClient};
use reef_types::*;

async fn transfer(client: &RpcClient, job: JobId, mapping: TransferMapping, n: usize) -> Transfer {
    let ids: Vec<String> = (0..n).map(|i| format!("lustre:/in/{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    match call(
        client,
        Request::TransferDatasets {
            job,
            sources: ds(&refs),
            targets: ds(&refs),
            qos_limits: vec![],
            mapping,
        },
    )
    .await
    {
        Ok(Reply::Transfer(t)) => t,
        other => panic!("transfer_datasets: {other:?}"),
    }
}

fn pending_ids(reply: Reply) -> Vec<TransferId> {
    match reply {
        Reply::Transfers(ts) => ts.into_iter().map(|t| t.id).collect(),
        other => panic!("expected transfers, got {other:?}"),
    }
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_priority_ordering_over_rpc() {
    let d = TestDeployment::start().await;
    let client = d.client();
    let j = register_job(&client, 1, None).await.unwrap();

    let t1 = transfer(&client, j.id, TransferMapping::OneToOne, 1).await;
    let t2 = transfer(&client, j.id, TransferMapping::OneToOne, 1).await;
    let t3 = transfer(&client, j.id, TransferMapping::OneToOne, 1).await;

    let reply = call(&client, Request::GetPendingTransfers { job: j.id }).await.unwrap();
    assert_eq!(pending_ids(reply), vec![t1.id, t2.id, t3.id]);

    let reply = call(
        &client,
        Request::SetTransferPriority {
            transfer: t3.id,
            delta: 10,
        },
    )
    .await
    .unwrap();
    assert_eq!(reply, Reply::Priority(10));

    let reply = call(&client, Request::GetPendingTransfers { job: j.id }).await.unwrap();
    assert_eq!(pending_ids(reply), vec![t3.id, t1.id, t2.id]);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_mapping_mismatch_over_rpc() {
    let d = TestDeployment::start().await;
    let client = d.client();
    let j = register_job(&client, 1, None).await.unwrap();

    let err = call(
        &client,
        Request::TransferDatasets {
            job: j.id,
            sources: ds(&["a", "b"]),
            targets: ds(&["c"]),
            qos_limits: vec![],
            mapping: TransferMapping::OneToOne,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err, ErrorCode::BadArguments);
    assert!(d.mover.received.lock().await.is_empty());

    let reply = call(&client, Request::GetPendingTransfers { job: j.id }).await.unwrap();
    assert!(pending_ids(reply).is_empty());
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_mover_reports_completion() {
    let d = TestDeployment::start().await;
    d.mover.complete.store(true, Ordering::SeqCst);
    let client = d.client();
    let j = register_job(&client, 1, None).await.unwrap();

    let t = transfer(&client, j.id, TransferMapping::NToN, 3).await;
    let reply = call(
        &client,
        Request::WaitTransfer {
            transfer: t.id,
            timeout_ms: Some(5_000),
        },
    )
    .await
    .unwrap();

    let Reply::TransferStatus { status, progress } = reply else {
        panic!("expected a transfer status");
    };
    assert_eq!(status, TransferStatus::Finished);
    assert_eq!(progress.bytes_transferred, 1 << 20);

    // Terminal transfers accept no further updates.
    let err = call(
        &client,
        Request::TransferUpdate {
            transfer: t.id,
            status: TransferStatus::InProgress,
            progress: TransferProgress::default(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err, ErrorCode::InvalidState);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_wait_times_out() {
    let d = TestDeployment::start().await;
    let client = d.client();
    let j = register_job(&client, 1, None).await.unwrap();
    let t = transfer(&client, j.id, TransferMapping::OneToOne, 1).await;

    let err = call(
        &client,
        Request::WaitTransfer {
            transfer: t.id,
            timeout_ms: Some(50),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err, ErrorCode::Timeout);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_qos_constraints_over_rpc() {
    let d = TestDeployment::start().await;
    let client = d.client();
    let j = register_job(&client, 1, None).await.unwrap();
    let entity = QosEntity::Dataset(Dataset::new("lustre:/in"));

    for value in [10, 20] {
        call(
            &client,
            Request::SetQosConstraints {
                job: j.id,
                limit: QosLimit {
                    entity: entity.clone(),
                    class: QosClass::Bandwidth,
                    value,
                },
            },
        )
        .await
        .unwrap();
    }

    let reply = call(
        &client,
        Request::GetQosConstraints {
            job: j.id,
            scope: QosScope::Dataset,
            entity: entity.clone(),
        },
    )
    .await
    .unwrap();
    assert_eq!(
        reply,
        Reply::Limits(vec![QosLimit {
            entity: entity.clone(),
            class: QosClass::Bandwidth,
            value: 20,
        }])
    );

    let err = call(
        &client,
        Request::GetQosConstraints {
            job: j.id,
            scope: QosScope::Node,
            entity,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err, ErrorCode::BadArguments);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_linked_data_operation_over_rpc() {
    let d = TestDeployment::start().await;
    let client = d.client();
    let j = register_job(&client, 1, None).await.unwrap();

    let Reply::DataOperation(op) = call(
        &client,
        Request::DefineDataOperation {
            job: j.id,
            executable: "/opt/tools/compress".into(),
            arguments: vec![OperationArg::Int(9)],
        },
    )
    .await
    .unwrap() else {
        panic!("expected a data operation");
    };

    // Finalizing before connecting is refused and changes nothing.
    let err = call(&client, Request::FinalizeDataOperation { job: j.id, op: op.id })
        .await
        .unwrap_err();
    assert_eq!(err, ErrorCode::InvalidState);

    call(
        &client,
        Request::ConnectDataOperation {
            job: j.id,
            op: op.id,
            inputs: ds(&["gekkofs:/out"]),
            outputs: ds(&["gekkofs:/out.gz"]),
            streaming: false,
            arguments: vec![],
        },
    )
    .await
    .unwrap();

    let t = transfer(&client, j.id, TransferMapping::OneToOne, 1).await;
    call(
        &client,
        Request::LinkTransferToDataOperation {
            job: j.id,
            op: op.id,
            transfer: t.id,
            streaming: false,
            arguments: vec![],
        },
    )
    .await
    .unwrap();

    // The mover reports completion once the operation is linked.
    call(
        &client,
        Request::TransferUpdate {
            transfer: t.id,
            status: TransferStatus::Finished,
            progress: TransferProgress::default(),
        },
    )
    .await
    .unwrap();

    // A finished transfer can no longer be linked.
    let err = call(
        &client,
        Request::LinkTransferToDataOperation {
            job: j.id,
            op: op.id,
            transfer: t.id,
            streaming: false,
            arguments: vec![],
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err, ErrorCode::InvalidState);

    let reply = call(&client, Request::FinalizeDataOperation { job: j.id, op: op.id })
        .await
        .unwrap();
    assert_eq!(reply, Reply::Outcome(OperationOutcome::Succeeded));

    let Reply::Statistics(stats) = call(&client, Request::GetStatistics { job: j.id })
        .await
        .unwrap()
    else {
        panic!("expected statistics");
    };
    assert_eq!(stats.finished_transfers, 1);
    assert_eq!(stats.data_operations, 1);
}
