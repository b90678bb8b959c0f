//! End-to-end flows against the testkit backend and engine

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use waas_agent::{CoordinatorSettings, StopOutcome, WorkflowCoordinator};
use waas_core::{DeviceGroup, InitParams, OperationKind, Passcode, WaasError};
use waas_testkit::{
    init_test_tracing, sample_transaction, CompletionMode, TestEnvironment, TEST_PASSCODE,
    TEST_POOL, TEST_PROXY_URL,
};

const FAST: CoordinatorSettings = CoordinatorSettings {
    poll_interval: Duration::from_millis(5),
    wait_interval: Duration::from_millis(5),
};

fn coordinator(env: &TestEnvironment) -> WorkflowCoordinator {
    init_test_tracing();
    let coordinator = WorkflowCoordinator::new(env.connector.clone(), env.engine_provider.clone())
        .with_settings(FAST);
    coordinator
        .initialize(&InitParams::proxy(TEST_PROXY_URL))
        .unwrap();
    coordinator
}

#[tokio::test]
async fn test_wallet_lifecycle_end_to_end() {
    let env = TestEnvironment::new();
    let coordinator = coordinator(&env);
    let passcode = Passcode::new(TEST_PASSCODE).unwrap();

    // Onboarding
    let device = coordinator.onboard_device_flow(&passcode).await.unwrap();
    assert!(!device.name.is_empty());
    assert_matches!(
        coordinator.bootstrap_device(&passcode).await,
        Err(WaasError::AlreadyBootstrapped)
    );

    // Wallet creation
    let wallet = coordinator
        .create_wallet_flow(TEST_POOL, &device.name)
        .await
        .unwrap();
    assert!(wallet.device_group.starts_with(TEST_POOL));
    let group = coordinator.get_device_group(&wallet.device_group).await.unwrap();
    assert_eq!(group.devices, vec![device.name.clone()]);

    // Signing
    let address = coordinator
        .generate_address(&wallet.name, "ethereum-goerli")
        .await
        .unwrap();
    assert_eq!(
        coordinator.get_address(&address.name).await.unwrap(),
        address
    );
    let tx = sample_transaction();
    let signed = coordinator
        .signing_flow(&address.mpc_keys[0], &tx)
        .await
        .unwrap();
    assert!(signed.raw_transaction.starts_with("0x02"));
    assert_eq!(signed.transaction, tx);

    // Archive and export
    let keys = coordinator
        .device_archive_flow(&wallet.device_group, &device.name, &passcode)
        .await
        .unwrap();
    assert_eq!(keys.len(), 1);

    // Backup onto a second device
    let backup = coordinator
        .device_backup_flow(&wallet.device_group, &device.name, &passcode)
        .await
        .unwrap();
    coordinator
        .add_device_flow(&wallet.device_group, "devices/second", &passcode, &backup)
        .await
        .unwrap();
    let group = env.backend.device_group(&wallet.device_group).unwrap();
    assert!(group.devices.contains(&"devices/second".to_string()));

    assert_eq!(coordinator.ledger().consumed_count(), 5);
    assert!(coordinator.poller().active_polls().is_empty());
}

#[tokio::test]
async fn test_wallet_flow_waits_for_materialization() {
    let env = TestEnvironment::new();
    let coordinator = coordinator(&env);

    // The first wallet in a fresh backend gets id 1
    let group = format!("{TEST_POOL}/deviceGroups/group-1");
    env.backend
        .delay_pending(OperationKind::CreateDeviceGroup, &group, 3);

    let wallet = coordinator
        .create_wallet_flow(TEST_POOL, "devices/d1")
        .await
        .unwrap();
    assert_eq!(wallet.device_group, group);
    assert_eq!(env.recorder.count("KeyService.list_pending_operations"), 4);
}

#[tokio::test]
async fn test_engine_completing_on_other_thread() {
    let env = TestEnvironment::new();
    env.engine.set_completion_mode(CompletionMode::Thread);
    let coordinator = coordinator(&env);

    let device = coordinator
        .onboard_device_flow(&Passcode::new(TEST_PASSCODE).unwrap())
        .await
        .unwrap();
    assert!(device.name.starts_with("devices/"));
    assert_eq!(coordinator.bridge().in_flight(), 0);
}

#[tokio::test]
async fn test_compute_failure_aborts_flow() {
    let env = TestEnvironment::new();
    let coordinator = coordinator(&env);
    env.engine
        .fail_next("CryptoEngine.compute_mpc_operation", "share mismatch");

    let err = coordinator
        .create_wallet_flow(TEST_POOL, "devices/d1")
        .await;
    assert_eq!(err, Err(WaasError::compute("share mismatch")));
    assert_eq!(env.recorder.count("WalletService.get_mpc_wallet_operation"), 0);
}

#[tokio::test]
async fn test_service_failure_aborts_flow_verbatim() {
    let env = TestEnvironment::new();
    let coordinator = coordinator(&env);
    env.backend
        .fail_next("KeyService.list_pending_operations", "deadline exceeded");

    let err = coordinator
        .create_wallet_flow(TEST_POOL, "devices/d1")
        .await
        .unwrap_err();
    assert_matches!(&err, WaasError::ServiceError { message, .. } if message == "deadline exceeded");
    assert!(err.is_retryable());
    assert!(env.engine.computed_operations().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stopped_poll_cancels_flow() {
    let env = TestEnvironment::new();
    let coordinator = Arc::new(coordinator(&env));
    let group = "pools/test-pool/deviceGroups/g1";
    env.backend.add_device_group(DeviceGroup {
        name: group.to_string(),
        mpc_key_export_metadata: "export-metadata".to_string(),
        devices: vec!["devices/d1".to_string()],
    });
    env.backend
        .delay_pending(OperationKind::PrepareDeviceBackup, group, usize::MAX);

    let flow = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let passcode = Passcode::new(TEST_PASSCODE).unwrap();
            coordinator
                .device_backup_flow(group, "devices/d1", &passcode)
                .await
        })
    };
    while !coordinator
        .poller()
        .is_polling(OperationKind::PrepareDeviceBackup, group)
    {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(
        coordinator.stop_polling_for_device_backups().await.unwrap(),
        StopOutcome::Stopped
    );
    assert_matches!(flow.await.unwrap(), Err(WaasError::Cancelled { .. }));
    assert_eq!(env.recorder.count("CryptoEngine.export_device_backup"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_stops_every_poll() {
    let env = TestEnvironment::new();
    let coordinator = Arc::new(coordinator(&env));
    let groups = [
        "pools/test-pool/deviceGroups/g1",
        "pools/test-pool/deviceGroups/g2",
    ];
    for group in groups {
        env.backend
            .delay_pending(OperationKind::CreateSignature, group, usize::MAX);
    }

    let polls: Vec<_> = groups
        .iter()
        .map(|&group| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .poll_for_pending_signatures(group, Duration::from_millis(5))
                    .await
            })
        })
        .collect();
    while coordinator.poller().active_polls().len() < groups.len() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(coordinator.shutdown().await, StopOutcome::Stopped);
    for poll in polls {
        assert_matches!(poll.await.unwrap(), Ok(waas_agent::PollOutcome::Cancelled));
    }
    assert_eq!(coordinator.shutdown().await, StopOutcome::NoOp);
}
