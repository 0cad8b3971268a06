//! `cpmagent lookup`: Query the performance catalog directly.

use cpmagent_tools::performance;

pub fn run(model: &str, engine: &str, device: &str) -> anyhow::Result<()> {
    let records = performance::lookup(model, engine, device);
    if records.is_empty() {
        eprintln!("No performance data for {model} / {engine} / {device}");
    }
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
