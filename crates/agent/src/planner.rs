//! Task planner: turns a task into an ordered list of step descriptions.

use cpmagent_core::error::Result;
use cpmagent_core::prompt::{PromptLibrary, names};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::generator::Generator;
use crate::state::ExecutionUpdate;

pub struct Planner {
    generator: Generator,
    prompts: Arc<PromptLibrary>,
    max_steps: usize,
}

impl Planner {
    pub fn new(generator: Generator, prompts: Arc<PromptLibrary>, max_steps: usize) -> Self {
        Self {
            generator,
            prompts,
            max_steps,
        }
    }

    /// Render the planning prompt, generate, and parse the reply into steps.
    pub async fn plan(&self, task: &str) -> Result<Vec<String>> {
        let prompt = self.prompts.render(names::PLANNING, &[("task", task)])?;
        let output = self.generator.generate(&prompt).await?;

        let mut steps = parse_plan(&output);
        if steps.len() > self.max_steps {
            warn!(
                generated = steps.len(),
                max = self.max_steps,
                "Plan exceeds max_plan_steps, dropping extra steps"
            );
            steps.truncate(self.max_steps);
        }

        debug!(steps = steps.len(), "Plan parsed");
        Ok(steps)
    }

    pub async fn update(&self, task: &str) -> Result<ExecutionUpdate> {
        Ok(ExecutionUpdate::Planned(self.plan(task).await?))
    }
}

/// Keep lines that contain `:` and take the trimmed text after the first one.
///
/// Lines without a colon, or with nothing after it, are dropped.
pub fn parse_plan(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(_, rest)| rest.trim())
        .filter(|step| !step.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingProvider, SequentialMockProvider};
    use cpmagent_core::Error;

    fn planner(provider: Arc<dyn cpmagent_core::Provider>, max_steps: usize) -> Planner {
        Planner::new(
            Generator::new(provider, "mock-model"),
            Arc::new(PromptLibrary::builtin()),
            max_steps,
        )
    }

    #[test]
    fn parse_keeps_text_after_first_colon() {
        let output = "Here is the plan\nStep 1: Look up H800 data\nStep 2: Compare at 10:00 UTC\n\nDone";
        assert_eq!(
            parse_plan(output),
            vec!["Look up H800 data", "Compare at 10:00 UTC"]
        );
    }

    #[test]
    fn parse_drops_empty_steps() {
        assert_eq!(parse_plan("Step 1:   \nStep 2: real"), vec!["real"]);
        assert!(parse_plan("no delimiters here\nat all").is_empty());
        assert!(parse_plan("").is_empty());
    }

    #[tokio::test]
    async fn plan_renders_task_into_prompt() {
        let provider = Arc::new(SequentialMockProvider::single_text("Step 1: fetch"));
        let steps = planner(provider.clone(), 20)
            .plan("Find the fastest engine for Qwen3")
            .await
            .unwrap();

        assert_eq!(steps, vec!["fetch"]);
        assert!(provider.prompts()[0].contains("Find the fastest engine for Qwen3"));
    }

    #[tokio::test]
    async fn plan_is_capped() {
        let provider = Arc::new(SequentialMockProvider::single_text("1: a\n2: b\n3: c"));
        let steps = planner(provider, 2).plan("t").await.unwrap();
        assert_eq!(steps, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn missing_template_fails_before_generation() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let planner = Planner::new(
            Generator::new(provider.clone(), "m"),
            Arc::new(PromptLibrary::empty()),
            20,
        );
        let err = planner.plan("t").await.unwrap_err();
        assert!(matches!(err, Error::Prompt(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn generation_failure_propagates() {
        let err = planner(Arc::new(FailingProvider), 20).plan("t").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }
}
