//! Per-invocation task controller.
//!
//! A task either returns a cached answer, runs the edit loop (coding tasks
//! with target files), or asks the provider for a single completion. Every
//! phase transition is written to `.taskexec/state.json` and mirrored into
//! `.taskexec/tasks/{task_id}.json`.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::classifier::is_coding_task;
use crate::core::fingerprint::task_fingerprint;
use crate::core::types::{LoopCheckpoint, LoopStatus, Message, StepPhase, TaskResult, TaskState, TaskStatus};
use crate::edit_loop::{EditLoop, LoopOutcome};
use crate::errors::{Interrupted, LoopNotResumable};
use crate::io::cache::ResponseCache;
use crate::io::checkpoint::CheckpointStore;
use crate::io::config::ExecutorConfig;
use crate::io::context::ContextBuilder;
use crate::io::conversation::ConversationStore;
use crate::io::files::file_stamps;
use crate::io::history::{HistoryEntry, append_history};
use crate::io::json::{read_json_lenient, write_json_atomic};
use crate::io::paths::WorkspacePaths;
use crate::io::prompt::PromptEngine;
use crate::io::provider::CompletionProvider;

const CACHED_MODEL: &str = "cache";

pub struct Orchestrator<'a, P: CompletionProvider + ?Sized, C: ContextBuilder + ?Sized> {
    paths: WorkspacePaths,
    config: ExecutorConfig,
    provider: &'a P,
    context: &'a C,
    cancel: CancelToken,
    cache: ResponseCache,
    tasks: CheckpointStore,
    conversation: ConversationStore,
    prompts: PromptEngine,
}

impl<'a, P: CompletionProvider + ?Sized, C: ContextBuilder + ?Sized> Orchestrator<'a, P, C> {
    pub fn new(
        paths: WorkspacePaths,
        config: ExecutorConfig,
        provider: &'a P,
        context: &'a C,
        cancel: CancelToken,
    ) -> Self {
        let cache = ResponseCache::new(&paths, config.cache_ttl(), config.tokens_saved_per_hit);
        let tasks = CheckpointStore::new(paths.tasks_dir.clone());
        let conversation = ConversationStore::new(paths.conversation_path.clone(), config.conversation_limit);
        Self {
            paths,
            config,
            provider,
            context,
            cancel,
            cache,
            tasks,
            conversation,
            prompts: PromptEngine::new(),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// The task recorded in `state.json`, if any.
    pub fn current_state(&self) -> Option<TaskState> {
        read_json_lenient(&self.paths.state_path)
    }

    /// Run one task.
    ///
    /// Only [`Interrupted`] is returned as an error; every other failure is
    /// recorded and reported through [`TaskResult::error`].
    #[instrument(skip_all, fields(files = files.len()))]
    pub fn run(&self, task: &str, files: &[String]) -> Result<TaskResult> {
        let conversation = self.conversation.load();
        let stamps = file_stamps(&self.paths, files);
        let task_id = task_fingerprint(task, &stamps, &conversation, self.config.fingerprint_history_tail);
        info!(task_id = %task_id, "running task");
        if let Some(previous) = self.current_state()
            && previous.task_id != task_id
            && previous.status.is_resumable()
        {
            info!(
                previous = %previous.task_id,
                status = previous.status.as_str(),
                "previous task left unfinished"
            );
        }

        let mut state = self.open_state(&task_id, task);
        state.pending_steps = vec!["cache_check".to_string()];

        let result = self
            .check_cache(&mut state, task)
            .and_then(|hit| match hit {
                Some(result) => Ok(result),
                None if !files.is_empty() && is_coding_task(task, files) => {
                    self.run_edit_loop(&mut state, task, files)
                }
                None => self.run_completion(&mut state, task, files, &conversation),
            });
        self.settle(&mut state, task, result)
    }

    /// Raw checkpoint of the current edit loop.
    pub fn loop_status(&self) -> Option<LoopCheckpoint> {
        self.edit_loop().status()
    }

    /// Continue an interrupted edit loop, with the same bookkeeping as [`Self::run`].
    pub fn resume_loop(&self) -> Result<TaskResult> {
        let checkpoint = self.loop_status().ok_or(LoopNotResumable { status: None })?;
        if checkpoint.status != LoopStatus::Running {
            return Err(LoopNotResumable {
                status: Some(checkpoint.status.as_str().to_string()),
            }
            .into());
        }

        let task_id = self
            .current_state()
            .filter(|state| state.description == checkpoint.task && state.step_phase == StepPhase::EditLoop)
            .map(|state| state.task_id)
            .unwrap_or_else(|| {
                let stamps = file_stamps(&self.paths, &checkpoint.target_files);
                task_fingerprint(&checkpoint.task, &stamps, &[], 0)
            });
        let mut state = self.open_state(&task_id, &checkpoint.task);
        info!(task_id = %task_id, iteration = checkpoint.iteration, "resuming edit loop task");

        state.status = TaskStatus::Running;
        let result = self.enter(&mut state, StepPhase::EditLoop).and_then(|()| {
            let outcome = self.edit_loop().resume()?;
            self.finish_loop(&mut state, &checkpoint.task, outcome)
        });
        self.settle(&mut state, &checkpoint.task, result)
    }

    pub fn reset_loop(&self) -> Result<bool> {
        self.edit_loop().reset()
    }

    /// Task records that can still make progress, newest first.
    pub fn resumable_tasks(&self) -> Result<Vec<TaskState>> {
        self.tasks.list_resumable()
    }

    /// Prune old task records using the configured age and count bounds.
    pub fn cleanup_tasks(&self) -> Result<usize> {
        self.tasks
            .cleanup(self.config.cleanup_max_age(), self.config.cleanup_max_count)
    }

    fn edit_loop(&self) -> EditLoop<'_, P> {
        EditLoop::new(&self.paths, &self.config, self.provider, &self.cancel)
    }

    /// Fresh state for `task_id`, keeping the creation time of an earlier attempt.
    fn open_state(&self, task_id: &str, task: &str) -> TaskState {
        let now = Utc::now();
        let mut state = TaskState::new(task_id, task, now);
        if let Some(previous) = self.tasks.load::<TaskState>(task_id) {
            debug!(status = previous.status.as_str(), "found earlier record for task");
            state.created_at = previous.created_at;
        }
        state
    }

    fn check_cache(&self, state: &mut TaskState, task: &str) -> Result<Option<TaskResult>> {
        state.status = TaskStatus::Running;
        self.enter(state, StepPhase::CacheCheck)?;
        let Some(payload) = self.cache.get(&state.task_id) else {
            return Ok(None);
        };

        info!(task_id = %state.task_id, "cache hit");
        state.status = TaskStatus::Completed;
        state.model = Some(CACHED_MODEL.to_string());
        self.enter(state, StepPhase::Done)?;
        append_history(&self.paths, HistoryEntry::new(task, &payload, true, Utc::now()))?;
        Ok(Some(TaskResult {
            output: payload,
            task_id: state.task_id.clone(),
            model: CACHED_MODEL.to_string(),
            tokens_used: 0,
            tokens_saved: self.cache.tokens_saved_per_hit(),
            cached: true,
            completed: true,
            error: None,
        }))
    }

    fn run_edit_loop(&self, state: &mut TaskState, task: &str, files: &[String]) -> Result<TaskResult> {
        state.pending_steps = vec!["edit_loop".to_string(), "persist".to_string()];
        self.enter(state, StepPhase::EditLoop)?;
        let outcome = self.edit_loop().run(task, files, self.config.max_iterations)?;
        self.finish_loop(state, task, outcome)
    }

    fn finish_loop(&self, state: &mut TaskState, task: &str, outcome: LoopOutcome) -> Result<TaskResult> {
        state.token_usage += outcome.tokens_used;
        state.model = Some(self.config.provider.model.clone());
        state
            .context
            .insert("loop_iterations".to_string(), outcome.iterations.to_string());
        self.enter(state, StepPhase::Persist)?;

        if outcome.success {
            state.status = TaskStatus::Completed;
            state.error = None;
        } else {
            state.status = TaskStatus::Error;
            state.error = Some(format!(
                "edit loop did not pass tests within {} iteration(s)",
                outcome.iterations
            ));
        }
        self.enter(state, StepPhase::Done)?;
        append_history(&self.paths, HistoryEntry::new(task, &outcome.summary, false, Utc::now()))?;

        Ok(TaskResult {
            output: outcome.summary,
            task_id: state.task_id.clone(),
            model: self.config.provider.model.clone(),
            tokens_used: outcome.tokens_used,
            tokens_saved: 0,
            cached: false,
            completed: outcome.success,
            error: None,
        })
    }

    fn run_completion(
        &self,
        state: &mut TaskState,
        task: &str,
        files: &[String],
        conversation: &[Message],
    ) -> Result<TaskResult> {
        state.pending_steps = vec!["context".to_string(), "completion".to_string(), "persist".to_string()];
        self.enter(state, StepPhase::Context)?;
        let context_block = match self.context.build(task, files) {
            Ok(block) => block,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "context build failed, continuing without context");
                String::new()
            }
        };
        let tail_start = conversation
            .len()
            .saturating_sub(self.config.fingerprint_history_tail);
        let prompt = self
            .prompts
            .render_completion(task, &context_block, &conversation[tail_start..])?;

        self.cancel.check("completion")?;
        self.enter(state, StepPhase::Completion)?;
        let completion = match self.provider.complete(&prompt, &[]) {
            Ok(completion) => completion,
            Err(err) => {
                self.cancel.check("completion")?;
                return Err(err);
            }
        };
        self.cancel.check("completion")?;
        state.token_usage += completion.token_usage;
        state.model = Some(completion.model.clone());

        self.enter(state, StepPhase::Persist)?;
        self.conversation
            .append(&[Message::user(task), Message::assistant(completion.content.clone())])?;
        self.cache.set(&state.task_id, &completion.content);
        state.status = TaskStatus::Completed;
        self.enter(state, StepPhase::Done)?;
        append_history(&self.paths, HistoryEntry::new(task, &completion.content, false, Utc::now()))?;

        Ok(TaskResult {
            output: completion.content,
            task_id: state.task_id.clone(),
            model: completion.model,
            tokens_used: completion.token_usage,
            tokens_saved: 0,
            cached: false,
            completed: true,
            error: None,
        })
    }

    /// Turn the outcome of a task path into the value returned to the caller.
    fn settle(&self, state: &mut TaskState, task: &str, result: Result<TaskResult>) -> Result<TaskResult> {
        let err = match result {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };
        let now = Utc::now();

        if err.downcast_ref::<Interrupted>().is_some() {
            info!(task_id = %state.task_id, "task interrupted, pausing");
            state.status = TaskStatus::Paused;
            state
                .context
                .insert("interrupted_task".to_string(), task.to_string());
            state
                .context
                .insert("interrupted_at".to_string(), now.to_rfc3339());
            state.updated_at = now;
            if let Err(persist_err) = self.persist(state) {
                warn!(err = %format!("{persist_err:#}"), "failed to persist paused state");
            }
            return Err(err);
        }

        let message = format!("{err:#}");
        warn!(task_id = %state.task_id, err = %message, "task failed");
        state.status = TaskStatus::Error;
        state.error = Some(message.clone());
        state.updated_at = now;
        if let Err(persist_err) = self.persist(state) {
            warn!(err = %format!("{persist_err:#}"), "failed to persist error state");
        }
        if let Err(history_err) = append_history(
            &self.paths,
            HistoryEntry::new(task, &format!("error: {message}"), false, now),
        ) {
            warn!(err = %format!("{history_err:#}"), "failed to append history");
        }

        Ok(TaskResult {
            output: format!("error: {message}"),
            task_id: state.task_id.clone(),
            model: state
                .model
                .clone()
                .unwrap_or_else(|| self.config.provider.model.clone()),
            tokens_used: state.token_usage,
            tokens_saved: 0,
            cached: false,
            completed: false,
            error: Some(message),
        })
    }

    fn enter(&self, state: &mut TaskState, phase: StepPhase) -> Result<()> {
        state.enter_phase(phase, Utc::now());
        debug!(task_id = %state.task_id, ?phase, status = state.status.as_str(), "phase transition");
        self.persist(state)
    }

    fn persist(&self, state: &TaskState) -> Result<()> {
        write_json_atomic(&self.paths.state_path, state)?;
        self.tasks.save(&state.task_id, state)?;
        Ok(())
    }
}
