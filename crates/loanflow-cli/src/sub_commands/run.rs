use anyhow::Result;
use loanflow::{CommitOutcome, FlowManager};

use super::commit::report;

pub async fn run(manager: &FlowManager) -> Result<()> {
    loop {
        let outcome = manager.commit().await;
        let done = matches!(
            outcome,
            CommitOutcome::Complete
                | CommitOutcome::Confirmed {
                    flow_complete: true,
                    ..
                }
        );
        report(manager, outcome)?;

        if done {
            return Ok(());
        }
    }
}
