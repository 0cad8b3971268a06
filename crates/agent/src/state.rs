//! Execution state for the plan/execute/reflect loop.
//!
//! `ExecutionState` is owned by one loop run. Components never mutate it
//! directly; they return an [`ExecutionUpdate`] which the loop applies.
//!
//! Invariants, checked by [`ExecutionState::check_invariants`]:
//! - `current_step <= plan.len()`
//! - the number of `ResultEntry::Step` entries equals `current_step`
//! - `final_answer` is set at most once

use serde::Serialize;
use std::fmt;

/// The state machine's current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Executing,
    Reflecting,
    Finishing,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Planning => "planning",
            Phase::Executing => "executing",
            Phase::Reflecting => "reflecting",
            Phase::Finishing => "finishing",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

/// One appended result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultEntry {
    /// Output of executing the plan step at `index`.
    Step { index: usize, output: String },
    /// Commentary from the reflector.
    Reflection { text: String },
}

impl ResultEntry {
    pub fn is_reflection(&self) -> bool {
        matches!(self, ResultEntry::Reflection { .. })
    }
}

impl fmt::Display for ResultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultEntry::Step { output, .. } => f.write_str(output),
            ResultEntry::Reflection { text } => write!(f, "Reflection: {text}"),
        }
    }
}

/// What `should_continue` decided for the Executing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Execute,
    Reflect,
    Finish,
}

/// A state change produced by one component.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionUpdate {
    /// The planner produced a plan.
    Planned(Vec<String>),
    /// The executor ran the step at `current_step`.
    StepExecuted { output: String },
    /// The reflector appended commentary at `current_step`.
    Reflected { text: String },
    /// No steps remain.
    Completed,
    /// The finisher produced the final answer (`None` when the model gave nothing usable).
    Finished { answer: Option<String> },
}

/// The typed record threaded through a loop run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionState {
    pub task: String,
    pub plan: Vec<String>,
    pub current_step: usize,
    pub results: Vec<ResultEntry>,
    pub progress: String,
    pub final_answer: Option<String>,
    pub phase: Phase,
    /// `current_step` value when the last reflection ran.
    pub last_reflection_at: Option<usize>,
}

impl ExecutionState {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            plan: Vec::new(),
            current_step: 0,
            results: Vec::new(),
            progress: String::new(),
            final_answer: None,
            phase: Phase::Planning,
            last_reflection_at: None,
        }
    }

    /// True once every plan step has a result.
    pub fn is_complete(&self) -> bool {
        self.current_step >= self.plan.len()
    }

    /// The step description at `current_step`, if any remain.
    pub fn current_step_description(&self) -> Option<&str> {
        self.plan.get(self.current_step).map(String::as_str)
    }

    pub fn step_results(&self) -> impl Iterator<Item = &ResultEntry> {
        self.results.iter().filter(|r| !r.is_reflection())
    }

    pub fn reflections(&self) -> impl Iterator<Item = &ResultEntry> {
        self.results.iter().filter(|r| r.is_reflection())
    }

    /// True if a reflection already ran at the current index.
    pub fn reflected_here(&self) -> bool {
        self.last_reflection_at == Some(self.current_step)
    }

    /// The plan as a numbered list, one step per line.
    pub fn render_plan(&self) -> String {
        if self.plan.is_empty() {
            return "(no steps)".into();
        }
        self.plan
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Results in order, one per line; step outputs are prefixed with their number.
    pub fn render_results(&self, include_reflections: bool) -> String {
        let lines: Vec<String> = self
            .results
            .iter()
            .filter(|r| include_reflections || !r.is_reflection())
            .map(|r| match r {
                ResultEntry::Step { index, output } => format!("Step {}: {}", index + 1, output),
                ResultEntry::Reflection { .. } => r.to_string(),
            })
            .collect();
        if lines.is_empty() {
            "(none yet)".into()
        } else {
            lines.join("\n")
        }
    }

    /// Apply a component's update. This is the only place state changes.
    pub fn apply(&mut self, update: ExecutionUpdate) {
        match update {
            ExecutionUpdate::Planned(plan) => {
                self.plan = plan;
                self.progress = format!("Planned {} steps", self.plan.len());
            }
            ExecutionUpdate::StepExecuted { output } => {
                self.results.push(ResultEntry::Step {
                    index: self.current_step,
                    output,
                });
                self.current_step += 1;
                self.progress = format!("Executed step {}/{}", self.current_step, self.plan.len());
            }
            ExecutionUpdate::Reflected { text } => {
                self.results.push(ResultEntry::Reflection { text });
                self.last_reflection_at = Some(self.current_step);
            }
            ExecutionUpdate::Completed => {
                self.progress = format!("Completed {} steps", self.plan.len());
            }
            ExecutionUpdate::Finished { answer } => {
                if self.final_answer.is_none() {
                    self.final_answer = answer;
                }
            }
        }
    }

    /// Whether the structural invariants hold.
    pub fn check_invariants(&self) -> bool {
        self.current_step <= self.plan.len() && self.step_results().count() == self.current_step
    }
}
