//! `stepwise tools`: the planner-facing tool listing.

use std::path::Path;

use crate::wiring;

pub async fn run(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = wiring::load_config(config)?;
    let service = wiring::service(&config);

    println!("{}", service.tool_descriptions());
    let hidden: Vec<String> = service
        .tools()
        .names()
        .into_iter()
        .filter(|name| config.tools.disabled.contains(name))
        .collect();
    if !hidden.is_empty() {
        eprintln!("disabled: {}", hidden.join(", "));
    }
    Ok(())
}
