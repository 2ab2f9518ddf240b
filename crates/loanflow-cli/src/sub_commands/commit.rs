use anyhow::{bail, Result};
use loanflow::{CommitOutcome, FlowManager};

/// Print an outcome, failing on anything that did not confirm a step
pub fn report(manager: &FlowManager, outcome: CommitOutcome) -> Result<()> {
    match outcome {
        CommitOutcome::Confirmed {
            step_index,
            artifact,
            output,
            flow_complete,
            indexed,
            ..
        } => {
            let name = manager
                .step_name(step_index)
                .unwrap_or_else(|| step_index.to_string());
            println!("Confirmed {name} in {artifact}");
            if let Some(output) = output {
                println!("  output: {output}");
            }
            if flow_complete {
                match indexed {
                    Some(false) => println!("Flow complete, not indexed yet"),
                    _ => println!("Flow complete"),
                }
            }
            Ok(())
        }
        CommitOutcome::Complete => {
            println!("Flow is already complete");
            Ok(())
        }
        CommitOutcome::Failed {
            step_id,
            error,
            artifact,
            ..
        } => match artifact {
            Some(artifact) => bail!("Step {step_id} failed in {artifact}: {error}"),
            None => bail!("Step {step_id} failed: {error}"),
        },
        CommitOutcome::Rejected(rejection) => bail!("Nothing committed: {rejection}"),
    }
}

pub async fn commit(manager: &FlowManager) -> Result<()> {
    let outcome = manager.commit().await;
    report(manager, outcome)
}
