//! Built-in tool implementations for the CPM performance agent.
//!
//! The performance lookup is always available. Search, file reading and
//! code execution are opt-in through `[tools]` in the config file.

pub mod code_exec;
pub mod file_read;
pub mod path_guard;
pub mod performance;
pub mod web_search;

use cpmagent_config::ToolsConfig;
use cpmagent_core::tool::ToolRegistry;
use std::time::Duration;

pub use performance::{PerformanceDataTool, PerformanceRecord, TOOL_NAME as PERFORMANCE_TOOL};

/// Build the tool registry for a given configuration.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(PerformanceDataTool));

    if config.search {
        registry.register(Box::new(web_search::WebSearchTool));
    }

    if config.file_read {
        let roots = if config.allowed_roots.is_empty() {
            std::env::current_dir()
                .map(|d| vec![d.to_string_lossy().into_owned()])
                .unwrap_or_default()
        } else {
            config.allowed_roots.clone()
        };
        registry.register(Box::new(file_read::FileReadTool::new(
            roots,
            config.forbidden_paths.clone(),
        )));
    }

    if config.code_exec {
        registry.register(Box::new(code_exec::CodeExecTool::new(Duration::from_secs(
            config.code_exec_timeout_secs,
        ))));
    }

    tracing::debug!(tools = ?registry.names(), "Tool registry built");
    registry
}
