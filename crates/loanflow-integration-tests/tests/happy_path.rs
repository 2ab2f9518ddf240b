//! Flows driven to completion against the fake chain

use loanflow::{Amount, CommitOutcome, StepStatus, TroveId};
use loanflow_integration_tests::*;

#[tokio::test]
async fn test_stake_deposit_happy_path() {
    setup_tracing();
    let env = TestEnv::new();
    let manager = env.manager(alice()).await.unwrap();
    let deployment = env.chain.deployment().clone();

    let flow = manager.start_raw(stake_deposit(Amount::WAD)).await.unwrap();
    let steps: Vec<_> = flow.steps.unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(steps, vec!["approveToken", "stakeDeposit"]);

    let outcome = manager.commit().await;
    assert!(matches!(
        outcome,
        CommitOutcome::Confirmed {
            step_index: 0,
            flow_complete: false,
            ..
        }
    ));
    assert_eq!(
        env.chain
            .allowance(deployment.lqty_token, alice(), deployment.lqty_staking),
        Amount::WAD
    );
    assert_eq!(manager.current_step_index(), Some(1));

    let outcome = manager.commit().await;
    assert!(matches!(
        outcome,
        CommitOutcome::Confirmed {
            step_index: 1,
            flow_complete: true,
            indexed: Some(true),
            ..
        }
    ));

    let functions: Vec<_> = env
        .chain
        .submitted()
        .into_iter()
        .map(|call| call.function)
        .collect();
    assert_eq!(functions, vec!["approve", "stake"]);
    assert_eq!(
        env.chain
            .allowance(deployment.lqty_token, alice(), deployment.lqty_staking),
        Amount::ZERO
    );

    let flow = manager.flow().unwrap();
    assert!(flow.is_complete());
    assert_eq!(flow.current_step_index(), Some(2));
}

#[tokio::test]
async fn test_commit_after_completion_is_a_no_op() {
    let env = TestEnv::new();
    let manager = env.manager(alice()).await.unwrap();

    manager.start_raw(stake_withdraw(Amount::WAD)).await.unwrap();
    assert!(manager.commit().await.is_confirmed());
    let completed = manager.flow().unwrap();

    for _ in 0..3 {
        assert_eq!(manager.commit().await, CommitOutcome::Complete);
    }
    assert_eq!(env.chain.submitted().len(), 1);
    assert_eq!(manager.flow(), Some(completed));
}

#[tokio::test]
async fn test_existing_allowance_skips_approval() {
    let env = TestEnv::new();
    let deployment = env.chain.deployment().clone();
    env.chain.set_allowance(
        deployment.lqty_token,
        alice(),
        deployment.lqty_staking,
        Amount::WAD,
    );
    let manager = env.manager(alice()).await.unwrap();

    let flow = manager.start_raw(stake_deposit(Amount::WAD)).await.unwrap();
    let steps: Vec<_> = flow.steps.unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(steps, vec!["stakeDeposit"]);
}

#[tokio::test]
async fn test_open_borrow_position_records_trove() {
    setup_tracing();
    let env = TestEnv::new();
    let manager = env.manager(alice()).await.unwrap();

    let flow = manager.start_raw(open_borrow(1, 2)).await.unwrap();
    let steps: Vec<_> = flow.steps.unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(steps, vec!["approveToken", "openTrove"]);
    assert_eq!(manager.step_name(0).as_deref(), Some("Approve rETH"));

    assert!(manager.commit().await.is_confirmed());
    let expected = TroveId::derive(&alice(), 2).to_string();
    match manager.commit().await {
        CommitOutcome::Confirmed {
            output,
            flow_complete,
            indexed,
            ..
        } => {
            assert_eq!(output.as_deref(), Some(expected.as_str()));
            assert!(flow_complete);
            assert_eq!(indexed, Some(true));
        }
        outcome => panic!("Unexpected outcome {outcome:?}"),
    }

    let steps = manager.flow().unwrap().steps.unwrap();
    assert_eq!(steps[1].output.as_deref(), Some(expected.as_str()));

    let troves = env.chain.troves();
    assert_eq!(troves.len(), 1);
    assert_eq!(troves[0].branch_id, 1);
    assert_eq!(troves[0].owner, alice());
}

#[tokio::test]
async fn test_steps_confirm_in_order_one_per_commit() {
    let env = TestEnv::new();
    let manager = env.manager(alice()).await.unwrap();
    manager.start_raw(open_borrow(0, 0)).await.unwrap();

    let step_count = manager.flow().unwrap().steps.unwrap().len();
    for expected_confirmed in 1..=step_count {
        assert!(manager.commit().await.is_confirmed());

        let steps = manager.flow().unwrap().steps.unwrap();
        let confirmed = steps
            .iter()
            .take_while(|step| step.status == StepStatus::Confirmed)
            .count();
        assert_eq!(confirmed, expected_confirmed);
        assert!(steps[confirmed..]
            .iter()
            .all(|step| step.status == StepStatus::Idle));
    }
}
