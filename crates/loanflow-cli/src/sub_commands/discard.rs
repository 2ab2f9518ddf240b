use anyhow::Result;
use loanflow::FlowManager;

pub async fn discard(manager: &FlowManager) -> Result<()> {
    manager.discard().await?;
    println!("Flow discarded");
    Ok(())
}
