//! Agents for the CPM performance assistant.
//!
//! Two ways to answer a request:
//!
//! 1. **Plan/execute** ([`PlanExecuteAgent`]): plan the task into steps,
//!    execute them one at a time, reflect periodically, then write a final
//!    answer. Each phase is a separate component returning an
//!    [`ExecutionUpdate`] that the control loop applies to a typed
//!    [`ExecutionState`].
//! 2. **Tool calling** ([`ToolAgent`]): a single conversation in which the
//!    model looks up performance records through the tool registry.

pub mod control_loop;
pub mod executor;
pub mod extractor;
pub mod generator;
pub mod planner;
pub mod reflector;
pub mod state;
pub mod tool_agent;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use control_loop::{LoopOptions, LoopOutcome, NO_FINAL_ANSWER, PlanExecuteAgent, Transition};
pub use executor::Executor;
pub use extractor::ExtractedCall;
pub use generator::Generator;
pub use planner::Planner;
pub use reflector::{ReflectionPolicy, Reflector};
pub use state::{Decision, ExecutionState, ExecutionUpdate, Phase, ResultEntry};
pub use tool_agent::{ChatOutcome, NO_PERFORMANCE_DATA, ToolAgent};
