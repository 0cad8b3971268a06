//! The plan → execute/reflect → finish state machine.
//!
//! ```text
//! Planning ──▶ Executing ──▶ Finishing ──▶ Done
//!                 │  ▲
//!                 ▼  │
//!              Reflecting
//! ```
//!
//! Every Executing step strictly increases `current_step`, and a reflection
//! cannot run twice at the same index, so a run always terminates after at
//! most `2 * len(plan) + 3` generator calls.

use cpmagent_config::AgentConfig;
use cpmagent_core::error::{Error, Result};
use cpmagent_core::prompt::{PromptLibrary, names};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::executor::Executor;
use crate::generator::Generator;
use crate::planner::Planner;
use crate::reflector::{ReflectionPolicy, Reflector};
use crate::state::{Decision, ExecutionState, ExecutionUpdate, Phase};

/// Returned when the finisher produced no usable text.
pub const NO_FINAL_ANSWER: &str = "No final answer was produced.";

/// Loop settings resolved from `[agent]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOptions {
    pub max_plan_steps: usize,
    pub reflection: ReflectionPolicy,
    pub feed_reflections: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_plan_steps: 20,
            reflection: ReflectionPolicy::default(),
            feed_reflections: true,
        }
    }
}

impl LoopOptions {
    /// Convert validated config values; a non-positive frequency is rejected.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let frequency = usize::try_from(config.reflection.frequency)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| Error::Config {
                message: format!(
                    "agent.reflection.frequency must be positive, got {}",
                    config.reflection.frequency
                ),
            })?;

        Ok(Self {
            max_plan_steps: config.max_plan_steps,
            reflection: ReflectionPolicy {
                enabled: config.reflection.enabled,
                frequency,
            },
            feed_reflections: config.reflection.feed_into_execution,
        })
    }
}

/// One phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct LoopOutcome {
    pub answer: String,
    pub state: ExecutionState,
    pub transitions: Vec<Transition>,
}

/// Decide what the Executing phase does next.
///
/// Order matters: completion wins over a due reflection.
pub fn should_continue(state: &ExecutionState, policy: &ReflectionPolicy) -> Decision {
    if state.is_complete() {
        Decision::Finish
    } else if policy.due_at(state.current_step) && !state.reflected_here() {
        Decision::Reflect
    } else {
        Decision::Execute
    }
}

/// Plan/execute/reflect agent. Holds no per-run state and can be shared.
pub struct PlanExecuteAgent {
    generator: Generator,
    prompts: Arc<PromptLibrary>,
    planner: Planner,
    executor: Executor,
    reflector: Reflector,
    options: LoopOptions,
}

impl PlanExecuteAgent {
    pub fn new(generator: Generator, prompts: Arc<PromptLibrary>, options: LoopOptions) -> Self {
        Self {
            planner: Planner::new(generator.clone(), prompts.clone(), options.max_plan_steps),
            executor: Executor::new(generator.clone(), prompts.clone(), options.feed_reflections),
            reflector: Reflector::new(generator.clone(), prompts.clone()),
            generator,
            prompts,
            options,
        }
    }

    /// Build from `[agent]`, rejecting invalid reflection settings.
    pub fn from_config(
        generator: Generator,
        prompts: Arc<PromptLibrary>,
        config: &AgentConfig,
    ) -> Result<Self> {
        Ok(Self::new(generator, prompts, LoopOptions::from_config(config)?))
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Run the state machine to completion for one task.
    pub async fn run(&self, task: &str) -> Result<LoopOutcome> {
        let mut state = ExecutionState::new(task);
        let mut transitions = Vec::new();

        info!(model = self.generator.model(), "Plan/execute loop starting");

        while state.phase != Phase::Done {
            let next = match state.phase {
                Phase::Planning => {
                    let update = self.planner.update(&state.task).await?;
                    state.apply(update);
                    Phase::Executing
                }
                Phase::Executing => match should_continue(&state, &self.options.reflection) {
                    Decision::Finish => {
                        state.apply(ExecutionUpdate::Completed);
                        Phase::Finishing
                    }
                    Decision::Reflect => Phase::Reflecting,
                    Decision::Execute => {
                        let update = self.executor.execute(&state).await?;
                        state.apply(update);
                        Phase::Executing
                    }
                },
                Phase::Reflecting => {
                    let update = self.reflector.reflect(&state).await?;
                    state.apply(update);
                    Phase::Executing
                }
                Phase::Finishing => {
                    let update = self.finish(&state).await?;
                    state.apply(update);
                    Phase::Done
                }
                Phase::Done => Phase::Done,
            };

            debug_assert!(state.check_invariants());
            debug!(from = %state.phase, to = %next, step = state.current_step, "Transition");
            transitions.push(Transition {
                from: state.phase,
                to: next,
            });
            state.phase = next;
        }

        let answer = state
            .final_answer
            .clone()
            .unwrap_or_else(|| NO_FINAL_ANSWER.to_string());

        info!(
            steps = state.current_step,
            reflections = state.reflections().count(),
            "Plan/execute loop completed"
        );

        Ok(LoopOutcome {
            answer,
            state,
            transitions,
        })
    }

    async fn finish(&self, state: &ExecutionState) -> Result<ExecutionUpdate> {
        let plan = state.render_plan();
        let results = state.render_results(true);
        let prompt = self.prompts.render(
            names::FINAL_ANSWER,
            &[("task", &state.task), ("plan", &plan), ("results", &results)],
        )?;
        let text = self.generator.generate(&prompt).await?;
        let text = text.trim();
        Ok(ExecutionUpdate::Finished {
            answer: (!text.is_empty()).then(|| text.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ResultEntry;
    use crate::test_helpers::{FailingProvider, SequentialMockProvider};
    use cpmagent_config::ReflectionConfig;

    fn agent(provider: Arc<dyn cpmagent_core::Provider>, options: LoopOptions) -> PlanExecuteAgent {
        PlanExecuteAgent::new(
            Generator::new(provider, "mock-model"),
            Arc::new(PromptLibrary::builtin()),
            options,
        )
    }

    fn no_reflection() -> LoopOptions {
        LoopOptions {
            reflection: ReflectionPolicy::disabled(),
            ..LoopOptions::default()
        }
    }

    fn phases(outcome: &LoopOutcome) -> Vec<(Phase, Phase)> {
        outcome.transitions.iter().map(|t| (t.from, t.to)).collect()
    }

    #[tokio::test]
    async fn two_step_plan_with_initial_reflection() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            "Step 1: Look up vllm on h800\nStep 2: Summarize",
            "Start with the catalog",
            "968.73 tokens/sec",
            "vllm reaches 968.73 tokens/sec",
            "  Use vllm: 968.73 tokens/sec.  ",
        ]));
        let outcome = agent(provider.clone(), LoopOptions::default())
            .run("How fast is Qwen3-235B on H800?")
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Use vllm: 968.73 tokens/sec.");
        assert_eq!(provider.call_count(), 5);
        assert_eq!(outcome.state.current_step, 2);
        assert_eq!(outcome.state.phase, Phase::Done);
        assert_eq!(
            outcome.state.results[0],
            ResultEntry::Reflection { text: "Start with the catalog".into() }
        );
        assert_eq!(
            phases(&outcome),
            vec![
                (Phase::Planning, Phase::Executing),
                (Phase::Executing, Phase::Reflecting),
                (Phase::Reflecting, Phase::Executing),
                (Phase::Executing, Phase::Executing),
                (Phase::Executing, Phase::Executing),
                (Phase::Executing, Phase::Finishing),
                (Phase::Finishing, Phase::Done),
            ]
        );
    }

    #[tokio::test]
    async fn empty_plan_goes_straight_to_finishing() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            "I cannot break this down",
            "No data needed.",
        ]));
        let outcome = agent(provider.clone(), LoopOptions::default()).run("hi").await.unwrap();

        assert_eq!(outcome.answer, "No data needed.");
        assert_eq!(provider.call_count(), 2);
        assert!(outcome.state.results.is_empty());
        assert_eq!(
            phases(&outcome),
            vec![
                (Phase::Planning, Phase::Executing),
                (Phase::Executing, Phase::Finishing),
                (Phase::Finishing, Phase::Done),
            ]
        );
    }

    #[tokio::test]
    async fn reflection_disabled_never_reflects() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            "1: a\n2: b\n3: c",
            "ra",
            "rb",
            "rc",
            "final",
        ]));
        let outcome = agent(provider.clone(), no_reflection()).run("t").await.unwrap();

        assert_eq!(outcome.state.reflections().count(), 0);
        assert_eq!(outcome.state.current_step, 3);
        assert_eq!(provider.call_count(), 5);
    }

    #[tokio::test]
    async fn reflection_runs_at_each_multiple_of_frequency() {
        let options = LoopOptions {
            reflection: ReflectionPolicy {
                enabled: true,
                frequency: NonZeroUsize::new(2).unwrap(),
            },
            ..LoopOptions::default()
        };
        let provider = Arc::new(SequentialMockProvider::texts(&[
            "1: a\n2: b\n3: c\n4: d\n5: e",
            "r0",
            "sa",
            "sb",
            "r2",
            "sc",
            "sd",
            "r4",
            "se",
            "final",
        ]));
        let outcome = agent(provider, options).run("t").await.unwrap();

        let reflections: Vec<String> = outcome.state.reflections().map(|r| r.to_string()).collect();
        assert_eq!(reflections, vec!["Reflection: r0", "Reflection: r2", "Reflection: r4"]);
        assert_eq!(outcome.state.step_results().count(), 5);
    }

    #[tokio::test]
    async fn step_index_only_moves_forward() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            "1: a\n2: b", "r", "x", "y", "done",
        ]));
        let outcome = agent(provider, LoopOptions::default()).run("t").await.unwrap();

        let indices: Vec<usize> = outcome
            .state
            .step_results()
            .map(|r| match r {
                ResultEntry::Step { index, .. } => *index,
                ResultEntry::Reflection { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(indices, vec![0, 1]);
        assert!(outcome.state.check_invariants());
    }

    #[tokio::test]
    async fn blank_final_answer_uses_fallback() {
        let provider = Arc::new(SequentialMockProvider::texts(&["nothing", "   \n"]));
        let outcome = agent(provider, no_reflection()).run("t").await.unwrap();
        assert_eq!(outcome.answer, NO_FINAL_ANSWER);
        assert!(outcome.state.final_answer.is_none());
    }

    #[tokio::test]
    async fn generation_failure_aborts_run() {
        let err = agent(Arc::new(FailingProvider), LoopOptions::default())
            .run("t")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn missing_template_aborts_before_generation() {
        let provider = Arc::new(SequentialMockProvider::texts(&["1: a"]));
        let mut prompts = PromptLibrary::empty();
        prompts.insert(names::PLANNING, "{task}");
        let agent = PlanExecuteAgent::new(
            Generator::new(provider.clone(), "m"),
            Arc::new(prompts),
            no_reflection(),
        );

        let err = agent.run("t").await.unwrap_err();
        assert!(matches!(err, Error::Prompt(_)));
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn should_continue_prefers_finish() {
        let mut state = ExecutionState::new("t");
        let policy = ReflectionPolicy::default();
        assert_eq!(should_continue(&state, &policy), Decision::Finish);

        state.apply(ExecutionUpdate::Planned(vec!["a".into()]));
        assert_eq!(should_continue(&state, &policy), Decision::Reflect);
        state.apply(ExecutionUpdate::Reflected { text: "r".into() });
        assert_eq!(should_continue(&state, &policy), Decision::Execute);
    }

    #[test]
    fn options_reject_non_positive_frequency() {
        for frequency in [0, -3] {
            let config = AgentConfig {
                reflection: ReflectionConfig {
                    frequency,
                    ..ReflectionConfig::default()
                },
                ..AgentConfig::default()
            };
            assert!(matches!(LoopOptions::from_config(&config), Err(Error::Config { .. })));
        }

        let options = LoopOptions::from_config(&AgentConfig::default()).unwrap();
        assert_eq!(options, LoopOptions::default());
    }
}
