//! `cpmagent chat`: Ask the tool-calling agent a question.

use cpmagent_config::AppConfig;

use super::Runtime;

pub async fn run(config: AppConfig, message: &str) -> anyhow::Result<()> {
    let runtime = Runtime::build(config)?;
    let agent = runtime.tool_agent();

    let outcome = agent.chat(message).await?;
    println!("{}", outcome.response);
    if !outcome.performance_data.is_empty() {
        println!("{}", serde_json::to_string_pretty(&outcome.performance_data)?);
    }
    Ok(())
}
