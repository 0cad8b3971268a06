//! `cpmagent run`: Plan, execute and answer a task once.

use cpmagent_agent::{LoopOutcome, ResultEntry};
use cpmagent_config::AppConfig;

use super::Runtime;

pub async fn run(config: AppConfig, task: &str, trace: bool) -> anyhow::Result<()> {
    let runtime = Runtime::build(config)?;
    let agent = runtime.plan_agent()?;

    let outcome = agent.run(task).await?;
    if trace {
        print_trace(&outcome);
    }
    println!("{}", outcome.answer);
    Ok(())
}

fn print_trace(outcome: &LoopOutcome) {
    let state = &outcome.state;
    println!("Plan ({} steps):", state.plan.len());
    for (i, step) in state.plan.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
    println!();
    for entry in &state.results {
        match entry {
            ResultEntry::Step { index, output } => println!("[step {}] {}", index + 1, output),
            ResultEntry::Reflection { text } => println!("[reflection] {text}"),
        }
    }
    println!();
}
