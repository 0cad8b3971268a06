//! Text-generation providers for the CPM agent.
//!
//! All providers implement the `cpmagent_core::Provider` trait.
//! [`build_provider`] selects the backend named in configuration.

#[cfg(feature = "local")]
pub mod local;
pub mod model_files;
pub mod openai_compat;
pub mod router;

#[cfg(feature = "local")]
pub use local::{LocalModelSpec, LocalProvider, download_model_files};
pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_provider, default_base_url};
