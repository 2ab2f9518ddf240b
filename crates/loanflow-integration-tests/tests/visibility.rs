//! Flows are scoped to the account that started them

use loanflow::{Amount, CommitOutcome, CommitRejection};
use loanflow_integration_tests::*;

#[tokio::test]
async fn test_switching_accounts_hides_and_restores_flow() {
    let env = TestEnv::new();
    let manager = env.manager(alice()).await.unwrap();
    manager.start_raw(stake_deposit(Amount::WAD)).await.unwrap();
    assert!(manager.commit().await.is_confirmed());
    let before = manager.flow().unwrap();

    manager.set_account(Some(bob())).await;
    assert!(manager.flow().is_none());
    assert!(manager.current_step().is_none());
    assert!(manager.step_name(0).is_none());
    assert_eq!(
        manager.commit().await,
        CommitOutcome::Rejected(CommitRejection::NoActiveFlow)
    );

    manager.set_account(None).await;
    assert!(manager.flow().is_none());

    manager.set_account(Some(alice())).await;
    assert_eq!(manager.flow(), Some(before));
    assert_eq!(env.chain.submitted().len(), 1);
}

#[tokio::test]
async fn test_other_account_starting_replaces_flow() {
    let env = TestEnv::new();
    let manager = env.manager(alice()).await.unwrap();
    manager.start_raw(stake_deposit(Amount::WAD)).await.unwrap();

    manager.set_account(Some(bob())).await;
    let flow = manager.start_raw(stake_withdraw(Amount::WAD)).await.unwrap();
    assert_eq!(flow.account, bob());

    manager.set_account(Some(alice())).await;
    assert!(manager.flow().is_none());
}

#[tokio::test]
async fn test_restored_flow_of_other_account_stays_hidden() {
    let env = TestEnv::new();
    let manager = env.manager(alice()).await.unwrap();
    manager.start_raw(stake_withdraw(Amount::WAD)).await.unwrap();
    drop(manager);

    let manager = env.manager(bob()).await.unwrap();
    assert!(manager.flow().is_none());
    assert!(env.read_record().await.unwrap().is_some());

    manager.set_account(Some(alice())).await;
    assert!(manager.flow().is_some());
}

#[tokio::test]
async fn test_subscription_hides_other_accounts() {
    let env = TestEnv::new();
    let manager = env.manager(alice()).await.unwrap();
    let mut subscription = manager.subscribe();

    manager.start_raw(stake_withdraw(Amount::WAD)).await.unwrap();
    assert!(subscription.changed().await);
    assert!(subscription.current().is_some());

    manager.set_account(Some(bob())).await;
    assert!(subscription.changed().await);
    assert!(subscription.current().is_none());
}
