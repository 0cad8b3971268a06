//! # CPM Agent Core
//!
//! Domain types, traits, and error definitions for the CPM performance agent.
//! This crate has **no framework dependencies**. It defines the domain model
//! that the provider, tool, agent and gateway crates implement against.
//!
//! ## Layout
//!
//! - [`provider`]: the text-generation backend abstraction
//! - [`tool`]: callable tools and the registry that dispatches them
//! - [`message`]: chat messages exchanged with a provider
//! - [`prompt`]: named prompt templates and their renderer
//! - [`error`]: one error enum per bounded context

pub mod error;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, PromptError, ProviderError, Result, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use prompt::PromptLibrary;
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
