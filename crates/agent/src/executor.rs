//! Step executor: runs the plan step at `current_step`.

use cpmagent_core::error::Result;
use cpmagent_core::prompt::{PromptLibrary, names};
use std::sync::Arc;
use tracing::debug;

use crate::generator::Generator;
use crate::state::{ExecutionState, ExecutionUpdate};

pub struct Executor {
    generator: Generator,
    prompts: Arc<PromptLibrary>,
    /// Whether reflection entries are shown in the execution prompt.
    feed_reflections: bool,
}

impl Executor {
    pub fn new(generator: Generator, prompts: Arc<PromptLibrary>, feed_reflections: bool) -> Self {
        Self {
            generator,
            prompts,
            feed_reflections,
        }
    }

    /// Execute one step, or signal completion when none remain.
    ///
    /// Completion does not call the generator.
    pub async fn execute(&self, state: &ExecutionState) -> Result<ExecutionUpdate> {
        let Some(step) = state.current_step_description() else {
            return Ok(ExecutionUpdate::Completed);
        };

        let plan = state.render_plan();
        let results = state.render_results(self.feed_reflections);
        let step_number = (state.current_step + 1).to_string();
        let total_steps = state.plan.len().to_string();

        let prompt = self.prompts.render(
            names::EXECUTION,
            &[
                ("task", &state.task),
                ("plan", &plan),
                ("results", &results),
                ("step_number", &step_number),
                ("total_steps", &total_steps),
                ("step", step),
            ],
        )?;

        debug!(step = %step_number, total = %total_steps, "Executing step");
        let output = self.generator.generate(&prompt).await?;
        Ok(ExecutionUpdate::StepExecuted { output })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ResultEntry;
    use crate::test_helpers::SequentialMockProvider;

    fn executor(provider: Arc<SequentialMockProvider>, feed: bool) -> Executor {
        Executor::new(
            Generator::new(provider, "mock-model"),
            Arc::new(PromptLibrary::builtin()),
            feed,
        )
    }

    fn state_with(plan: &[&str]) -> ExecutionState {
        let mut state = ExecutionState::new("compare engines");
        state.apply(ExecutionUpdate::Planned(plan.iter().map(|s| s.to_string()).collect()));
        state
    }

    #[tokio::test]
    async fn terminal_state_skips_generation() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let update = executor(provider.clone(), true)
            .execute(&state_with(&[]))
            .await
            .unwrap();
        assert_eq!(update, ExecutionUpdate::Completed);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn executes_current_step() {
        let provider = Arc::new(SequentialMockProvider::single_text("vllm: 968.73 tok/s"));
        let mut state = state_with(&["Look up vllm on h800", "Summarize"]);
        let update = executor(provider.clone(), true).execute(&state).await.unwrap();
        state.apply(update);

        assert_eq!(state.current_step, 1);
        assert_eq!(state.progress, "Executed step 1/2");
        assert_eq!(
            state.results,
            vec![ResultEntry::Step { index: 0, output: "vllm: 968.73 tok/s".into() }]
        );
        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("step 1 of 2: Look up vllm on h800"));
        assert!(prompt.contains("2. Summarize"));
    }

    #[tokio::test]
    async fn reflection_visibility_is_configurable() {
        let mut state = state_with(&["a"]);
        state.apply(ExecutionUpdate::Reflected { text: "check units".into() });

        let shown = Arc::new(SequentialMockProvider::single_text("x"));
        executor(shown.clone(), true).execute(&state).await.unwrap();
        assert!(shown.prompts()[0].contains("Reflection: check units"));

        let hidden = Arc::new(SequentialMockProvider::single_text("x"));
        executor(hidden.clone(), false).execute(&state).await.unwrap();
        assert!(!hidden.prompts()[0].contains("check units"));
    }
}
