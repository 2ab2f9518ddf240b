use anyhow::Result;
use loanflow::{FlowManager, Flowstate};

pub fn status(manager: &FlowManager) -> Result<()> {
    match manager.flow() {
        Some(flow) => print_flow(manager, &flow),
        None => println!("No active flow"),
    }
    Ok(())
}

pub fn print_flow(manager: &FlowManager, flow: &Flowstate) {
    println!("{} ({}) owned by {}", flow.flow_id(), flow.id, flow.account);

    let Some(steps) = &flow.steps else {
        println!("  steps not planned");
        return;
    };

    let current = flow.current_step_index();
    for (index, step) in steps.iter().enumerate() {
        let marker = if Some(index) == current { ">" } else { " " };
        let name = manager
            .step_name(index)
            .unwrap_or_else(|| step.id.clone());
        println!("{marker} {index}: {name} [{}]", step.status);

        if let Some(artifact) = &step.artifact {
            println!("      tx: {artifact}");
        }
        if let Some(output) = &step.output {
            println!("      output: {output}");
        }
        if let Some(error) = &step.error {
            println!("      error: {error}");
        }
    }

    if flow.is_complete() {
        println!("Complete: {}", flow.request.meta().success_message);
    }
}
