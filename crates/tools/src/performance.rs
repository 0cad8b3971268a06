//! Performance lookup tool: serving benchmarks keyed by model, engine and device.
//!
//! The catalog is a fixed, read-only table. A lookup is an exact match on
//! all three keys; no match is an empty list, not an error.

use async_trait::async_trait;
use cpmagent_core::error::ToolError;
use cpmagent_core::tool::{Tool, ToolResult};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const TOOL_NAME: &str = "get_performance_data";

/// One measured serving configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub id: u32,
    pub model_name: String,
    pub engine_name: String,
    pub device_type: String,
    pub node_num: u32,
    pub device_per_node: u32,
    pub scenario: String,
    pub dtype: String,
    pub quantization: String,
    pub gpu_memory_utilization: f64,
    pub data_parallel_size: u32,
    pub pipeline_parallel_size: u32,
    pub tensor_parallel_size: u32,
    pub enable_expert_parallel: bool,
    pub enable_chunked_prefill: bool,
    /// Time to first token, ms
    pub ttft: f64,
    /// Time per output token, ms
    pub tpot: f64,
    pub qps: f64,
    /// Output tokens per second
    pub throughput: f64,
}

/// Fields that vary between catalog entries.
struct Measured {
    id: u32,
    model: &'static str,
    engine: &'static str,
    device: &'static str,
    devices: u32,
    chunked_prefill: bool,
    ttft: f64,
    tpot: f64,
    qps: f64,
    throughput: f64,
}

impl From<Measured> for PerformanceRecord {
    fn from(m: Measured) -> Self {
        Self {
            id: m.id,
            model_name: m.model.into(),
            engine_name: m.engine.into(),
            device_type: m.device.into(),
            node_num: 1,
            device_per_node: m.devices,
            scenario: String::new(),
            dtype: "bfloat16".into(),
            quantization: String::new(),
            gpu_memory_utilization: 0.9,
            data_parallel_size: 0,
            pipeline_parallel_size: 0,
            tensor_parallel_size: m.devices,
            enable_expert_parallel: false,
            enable_chunked_prefill: m.chunked_prefill,
            ttft: m.ttft,
            tpot: m.tpot,
            qps: m.qps,
            throughput: m.throughput,
        }
    }
}

static CATALOG: LazyLock<Vec<PerformanceRecord>> = LazyLock::new(|| {
    [
        Measured {
            id: 1,
            model: "Qwen/Qwen3-235B-A22B",
            engine: "vllm",
            device: "nvidia/h800",
            devices: 8,
            chunked_prefill: false,
            ttft: 476.1,
            tpot: 20.2,
            qps: 0.47,
            throughput: 968.73,
        },
        Measured {
            id: 2,
            model: "Qwen/Qwen3-235B-A22B",
            engine: "vllm",
            device: "nvidia/h100",
            devices: 8,
            chunked_prefill: true,
            ttft: 380.5,
            tpot: 15.3,
            qps: 0.62,
            throughput: 1250.45,
        },
        Measured {
            id: 3,
            model: "Qwen/Qwen3-72B-A22B",
            engine: "vllm",
            device: "nvidia/h800",
            devices: 4,
            chunked_prefill: false,
            ttft: 210.3,
            tpot: 8.7,
            qps: 1.15,
            throughput: 1850.22,
        },
        Measured {
            id: 4,
            model: "Meta/Llama-3-70B-Instruct",
            engine: "vllm",
            device: "nvidia/h800",
            devices: 4,
            chunked_prefill: false,
            ttft: 195.7,
            tpot: 7.9,
            qps: 1.26,
            throughput: 1980.56,
        },
        Measured {
            id: 5,
            model: "Qwen/Qwen3-235B-A22B",
            engine: "tensorrt-llm",
            device: "nvidia/h800",
            devices: 8,
            chunked_prefill: false,
            ttft: 420.8,
            tpot: 18.5,
            qps: 0.52,
            throughput: 1050.34,
        },
    ]
    .into_iter()
    .map(PerformanceRecord::from)
    .collect()
});

/// The full catalog.
pub fn catalog() -> &'static [PerformanceRecord] {
    &CATALOG
}

/// Records matching all three keys exactly.
pub fn lookup(model_name: &str, engine_name: &str, device_type: &str) -> Vec<PerformanceRecord> {
    CATALOG
        .iter()
        .filter(|r| {
            r.model_name == model_name && r.engine_name == engine_name && r.device_type == device_type
        })
        .cloned()
        .collect()
}

/// Exposes [`lookup`] to the model.
pub struct PerformanceDataTool;

fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

#[async_trait]
impl Tool for PerformanceDataTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Get serving performance data (latency, throughput, parallelism) for a model, inference engine and device type."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "model_name": {
                    "type": "string",
                    "description": "Full model name, e.g. \"Qwen/Qwen3-235B-A22B\" or \"Meta/Llama-3-70B-Instruct\""
                },
                "engine_name": {
                    "type": "string",
                    "description": "Inference engine, e.g. \"vllm\" or \"tensorrt-llm\""
                },
                "device_type": {
                    "type": "string",
                    "description": "Device type, e.g. \"nvidia/h800\" or \"nvidia/h100\""
                }
            },
            "required": ["model_name", "engine_name", "device_type"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let model_name = required_str(&arguments, "model_name")?;
        let engine_name = required_str(&arguments, "engine_name")?;
        let device_type = required_str(&arguments, "device_type")?;

        let records = lookup(model_name, engine_name, device_type);
        tracing::debug!(model_name, engine_name, device_type, matches = records.len(), "Performance lookup");

        let data = serde_json::to_value(&records).map_err(|e| ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: e.to_string(),
        })?;

        Ok(ToolResult::json(data))
    }
}
