//! Commits racing each other and flow replacement

use std::time::Duration;

use loanflow::{Amount, CommitOutcome, CommitRejection, StepStatus};
use loanflow_fake_chain::FakeChainConfig;
use loanflow_integration_tests::*;
use tokio::time::sleep;

fn slow_chain() -> TestEnv {
    TestEnv::with_config(FakeChainConfig {
        confirmation_delay: Duration::from_millis(300),
        ..Default::default()
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_commit_is_rejected_while_in_flight() {
    setup_tracing();
    let env = slow_chain();
    let manager = env.manager(alice()).await.unwrap();
    manager.start_raw(stake_withdraw(Amount::WAD)).await.unwrap();

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.commit().await }
    });
    sleep(Duration::from_millis(50)).await;

    let step = manager.current_step().unwrap();
    assert_eq!(step.status, StepStatus::AwaitingVerify);
    assert_eq!(
        manager.commit().await,
        CommitOutcome::Rejected(CommitRejection::StepInFlight)
    );

    assert!(first.await.unwrap().is_confirmed());
    assert_eq!(env.chain.submitted().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_discard_while_in_flight_drops_the_result() {
    let env = slow_chain();
    let manager = env.manager(alice()).await.unwrap();
    manager.start_raw(stake_withdraw(Amount::WAD)).await.unwrap();

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.commit().await }
    });
    sleep(Duration::from_millis(50)).await;
    manager.discard().await.unwrap();

    assert_eq!(
        first.await.unwrap(),
        CommitOutcome::Rejected(CommitRejection::FlowReplaced)
    );
    assert!(manager.flow().is_none());
    assert!(env.read_record().await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replacement_while_in_flight_keeps_new_flow_clean() {
    let env = slow_chain();
    let manager = env.manager(alice()).await.unwrap();
    manager.start_raw(stake_withdraw(Amount::WAD)).await.unwrap();

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.commit().await }
    });
    sleep(Duration::from_millis(50)).await;
    let replacement = manager
        .start_raw(stake_withdraw(Amount::ONE))
        .await
        .unwrap();

    assert_eq!(
        first.await.unwrap(),
        CommitOutcome::Rejected(CommitRejection::FlowReplaced)
    );

    let flow = manager.flow().unwrap();
    assert_eq!(flow.id, replacement.id);
    let step = &flow.steps.unwrap()[0];
    assert_eq!(step.status, StepStatus::Idle);
    assert!(step.artifact.is_none());
}
