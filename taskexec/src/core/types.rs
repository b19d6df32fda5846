//! Shared data model for the executor.
//!
//! These types are the on-disk contract for `.taskexec/` records. Field names
//! and enum spellings are part of the persisted format and must stay stable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Error,
    Paused,
}

impl TaskStatus {
    /// Whether work on a task in this status can continue later.
    pub fn is_resumable(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Paused => "paused",
        }
    }
}

/// Phase of the orchestrator state machine a task was last in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Idle,
    CacheCheck,
    Context,
    Completion,
    EditLoop,
    Persist,
    Done,
}

/// Persisted state of one task (`.taskexec/state.json`, `.taskexec/tasks/{id}.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub description: String,
    pub status: TaskStatus,
    pub current_step: u32,
    pub step_phase: StepPhase,
    pub model: Option<String>,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub pending_steps: Vec<String>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    pub error: Option<String>,
    pub token_usage: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    /// Fresh pending state for a task.
    pub fn new(task_id: &str, description: &str, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            current_step: 0,
            step_phase: StepPhase::Idle,
            model: None,
            completed_steps: Vec::new(),
            pending_steps: Vec::new(),
            context: BTreeMap::new(),
            error: None,
            token_usage: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `phase`, recording the previous phase as a completed step.
    pub fn enter_phase(&mut self, phase: StepPhase, now: DateTime<Utc>) {
        if self.step_phase != StepPhase::Idle && self.step_phase != phase {
            self.completed_steps.push(phase_name(self.step_phase).to_string());
        }
        self.pending_steps.retain(|step| step != phase_name(phase));
        self.step_phase = phase;
        self.current_step += 1;
        self.updated_at = now;
    }
}

fn phase_name(phase: StepPhase) -> &'static str {
    match phase {
        StepPhase::Idle => "idle",
        StepPhase::CacheCheck => "cache_check",
        StepPhase::Context => "context",
        StepPhase::Completion => "completion",
        StepPhase::EditLoop => "edit_loop",
        StepPhase::Persist => "persist",
        StepPhase::Done => "done",
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Response returned by a completion provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub token_usage: u64,
}

/// A parsed file change proposed by the model.
///
/// `old_content` is empty exactly when `is_create` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub file_path: String,
    pub old_content: String,
    pub new_content: String,
    pub is_create: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    Create,
    Edit,
}

/// Outcome of applying one [`Edit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOutcome {
    pub file: String,
    pub action: EditAction,
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record of one edit-loop iteration. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationResult {
    /// Iteration number (1-indexed).
    pub iteration: u32,
    pub edits_applied: Vec<EditOutcome>,
    pub test_command: Option<String>,
    pub test_passed: bool,
    pub test_output: String,
    pub tokens_used: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    Running,
    Completed,
    Failed,
}

impl LoopStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Durable snapshot of the edit loop (`.taskexec/loop/state.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopCheckpoint {
    pub task: String,
    pub target_files: Vec<String>,
    /// Last finished iteration (0 before the first one completes).
    pub iteration: u32,
    pub max_iterations: u32,
    pub test_command: Option<String>,
    #[serde(default)]
    pub iterations: Vec<IterationResult>,
    pub status: LoopStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoopCheckpoint {
    pub fn tokens_used(&self) -> u64 {
        self.iterations.iter().map(|it| it.tokens_used).sum()
    }
}

/// Result handed back to the shell for one `run` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub output: String,
    pub task_id: String,
    pub model: String,
    pub tokens_used: u64,
    pub tokens_saved: u64,
    pub cached: bool,
    pub completed: bool,
    pub error: Option<String>,
}
