//! `cpmagent serve`: Start the HTTP API server.

use anyhow::anyhow;
use cpmagent_config::AppConfig;
use cpmagent_gateway::GatewayState;
use std::sync::Arc;

use super::Runtime;

pub async fn run(mut config: AppConfig, port_override: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let runtime = Runtime::build(config)?;
    let plan_agent = Arc::new(runtime.plan_agent()?);
    let tool_agent = Arc::new(runtime.tool_agent());

    eprintln!("CPM Agent API");
    eprintln!(
        "   Listening: {}:{}",
        runtime.config.gateway.host, runtime.config.gateway.port
    );
    eprintln!("   Mode:      {}", runtime.config.agent.mode.as_str());
    eprintln!("   Model:     {} ({})", runtime.config.model.name, runtime.config.model.provider);

    let state = GatewayState::new(runtime.config, plan_agent, tool_agent);
    cpmagent_gateway::start(state)
        .await
        .map_err(|e| anyhow!("Gateway failed: {e}"))
}
