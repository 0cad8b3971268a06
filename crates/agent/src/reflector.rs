//! Reflector: periodic commentary on progress so far.

use cpmagent_core::error::Result;
use cpmagent_core::prompt::{PromptLibrary, names};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

use crate::generator::Generator;
use crate::state::{ExecutionState, ExecutionUpdate};

/// When reflection runs: before the step at every multiple of `frequency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflectionPolicy {
    pub enabled: bool,
    pub frequency: NonZeroUsize,
}

impl ReflectionPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            frequency: NonZeroUsize::MIN,
        }
    }

    /// Whether a reflection is due before executing the step at `step`.
    pub fn due_at(&self, step: usize) -> bool {
        self.enabled && step % self.frequency.get() == 0
    }
}

impl Default for ReflectionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: NonZeroUsize::new(5).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

pub struct Reflector {
    generator: Generator,
    prompts: Arc<PromptLibrary>,
}

impl Reflector {
    pub fn new(generator: Generator, prompts: Arc<PromptLibrary>) -> Self {
        Self { generator, prompts }
    }

    pub async fn reflect(&self, state: &ExecutionState) -> Result<ExecutionUpdate> {
        let plan = state.render_plan();
        let results = state.render_results(true);
        let prompt = self.prompts.render(
            names::REFLECTION,
            &[
                ("task", &state.task),
                ("plan", &plan),
                ("progress", &state.progress),
                ("results", &results),
            ],
        )?;

        debug!(at_step = state.current_step, "Reflecting");
        let text = self.generator.generate(&prompt).await?;
        Ok(ExecutionUpdate::Reflected { text })
    }
}
