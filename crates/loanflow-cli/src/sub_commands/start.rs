use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use loanflow::FlowManager;
use serde_json::Value;

use super::status::print_flow;

#[derive(Args)]
pub struct StartSubCommand {
    /// Flow request as JSON
    #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
    request: Option<String>,
    /// File holding the flow request
    #[arg(short, long)]
    file: Option<PathBuf>,
}

pub async fn start(manager: &FlowManager, sub_command_args: &StartSubCommand) -> Result<()> {
    let request = match (&sub_command_args.request, &sub_command_args.file) {
        (Some(request), _) => request.clone(),
        (None, Some(file)) => fs::read_to_string(file)?,
        (None, None) => anyhow::bail!("Either --request or --file is required"),
    };
    let raw: Value = serde_json::from_str(&request)?;

    let flow = manager.start_raw(raw).await?;
    println!("Started flow {}", flow.id);

    if let Some(error) = manager.planning_error() {
        println!("Steps could not be planned yet: {error}");
    }
    print_flow(manager, &flow);

    Ok(())
}
