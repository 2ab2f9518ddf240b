use anyhow::Result;
use loanflow::FlowManager;

pub fn flows(manager: &FlowManager) -> Result<()> {
    let registry = manager.registry();
    for flow_id in registry.flow_ids() {
        let declaration = registry.get(flow_id)?;
        println!("{flow_id}: {}", declaration.title());
    }
    Ok(())
}
