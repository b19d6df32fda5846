//! Iterative edit → test → checkpoint loop for coding tasks.
//!
//! One loop record lives at `.taskexec/loop/state.json`. Every finished
//! iteration is persisted before the next one starts, so a crash or
//! interruption loses at most the iteration in flight. Each finished iteration
//! is also snapshotted as the named checkpoint `iter-{n}`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::edit_parser::parse_edits;
use crate::core::truncate::truncate_middle;
use crate::core::types::{IterationResult, LoopCheckpoint, LoopStatus};
use crate::errors::{LoopNotResumable, TransportError};
use crate::io::checkpoint::CheckpointStore;
use crate::io::config::ExecutorConfig;
use crate::io::edits::apply_edits;
use crate::io::paths::{LOOP_STATE_KEY, WorkspacePaths};
use crate::io::process::{run_with_timeout, shell_command};
use crate::io::prompt::{PromptEngine, PromptFile};
use crate::io::provider::CompletionProvider;
use crate::io::test_detect::detect_test_command;

/// Characters of failing test output embedded in a failed loop's summary.
const SUMMARY_OUTPUT_LIMIT: usize = 1_500;

const NO_TEST_COMMAND: &str = "no test command detected; iteration accepted without tests";

/// Summary of a finished loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub success: bool,
    /// Iterations recorded in the checkpoint (including ones from before a resume).
    pub iterations: u32,
    pub tokens_used: u64,
    pub summary: String,
    pub last_test_output: Option<String>,
}

pub struct EditLoop<'a, P: CompletionProvider + ?Sized> {
    paths: &'a WorkspacePaths,
    config: &'a ExecutorConfig,
    provider: &'a P,
    cancel: &'a CancelToken,
    store: CheckpointStore,
    prompts: PromptEngine,
}

impl<'a, P: CompletionProvider + ?Sized> EditLoop<'a, P> {
    pub fn new(
        paths: &'a WorkspacePaths,
        config: &'a ExecutorConfig,
        provider: &'a P,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            paths,
            config,
            provider,
            cancel,
            store: CheckpointStore::new(paths.loop_dir.clone()),
            prompts: PromptEngine::new(),
        }
    }

    /// Start a fresh loop, replacing any previous loop record.
    #[instrument(skip_all, fields(files = files.len(), max_iterations = max_iterations))]
    pub fn run(&self, task: &str, files: &[String], max_iterations: u32) -> Result<LoopOutcome> {
        let test_command = self
            .config
            .test_command
            .clone()
            .or_else(|| detect_test_command(&self.paths.root, files));
        info!(test_command = ?test_command, "starting edit loop");

        if self.store.delete(LOOP_STATE_KEY)? {
            debug!("replaced previous edit loop record");
        }
        let now = Utc::now();
        let checkpoint = LoopCheckpoint {
            task: task.to_string(),
            target_files: files.to_vec(),
            iteration: 0,
            max_iterations,
            test_command,
            iterations: Vec::new(),
            status: LoopStatus::Running,
            started_at: now,
            updated_at: now,
        };
        self.store.save(LOOP_STATE_KEY, &checkpoint)?;
        self.drive(checkpoint)
    }

    /// Continue a `running` loop at the iteration after the last finished one.
    pub fn resume(&self) -> Result<LoopOutcome> {
        let checkpoint: LoopCheckpoint = self
            .store
            .load(LOOP_STATE_KEY)
            .ok_or(LoopNotResumable { status: None })?;
        if checkpoint.status != LoopStatus::Running {
            return Err(LoopNotResumable {
                status: Some(checkpoint.status.as_str().to_string()),
            }
            .into());
        }
        info!(
            iteration = checkpoint.iteration,
            max_iterations = checkpoint.max_iterations,
            "resuming edit loop"
        );
        self.drive(checkpoint)
    }

    /// The raw loop record, if any.
    pub fn status(&self) -> Option<LoopCheckpoint> {
        self.store.load(LOOP_STATE_KEY)
    }

    /// Delete the loop record and its iteration snapshots.
    pub fn reset(&self) -> Result<bool> {
        self.store.delete(LOOP_STATE_KEY)
    }

    /// Snapshot of the loop as it was right after iteration `n`.
    pub fn iteration_snapshot(&self, n: u32) -> Option<LoopCheckpoint> {
        self.store
            .load_named_checkpoint(LOOP_STATE_KEY, &snapshot_name(n))
    }

    fn drive(&self, mut checkpoint: LoopCheckpoint) -> Result<LoopOutcome> {
        let mut failure = checkpoint
            .iterations
            .last()
            .filter(|it| !it.test_passed)
            .map(|it| it.test_output.clone());

        while checkpoint.status == LoopStatus::Running && checkpoint.iteration < checkpoint.max_iterations {
            let n = checkpoint.iteration + 1;
            let result = self.run_iteration(&checkpoint, n, failure.as_deref())?;
            let passed = result.test_passed;
            failure = (!passed).then(|| result.test_output.clone());

            checkpoint.iterations.push(result);
            checkpoint.iteration = n;
            checkpoint.updated_at = Utc::now();
            if passed {
                checkpoint.status = LoopStatus::Completed;
            } else if n >= checkpoint.max_iterations {
                checkpoint.status = LoopStatus::Failed;
            }
            self.store.save(LOOP_STATE_KEY, &checkpoint)?;
            self.store
                .save_named_checkpoint(LOOP_STATE_KEY, &snapshot_name(n), &checkpoint)?;
            info!(iteration = n, passed, "edit loop iteration finished");
        }

        if checkpoint.status == LoopStatus::Running {
            // Budget was already spent when the loop was entered.
            checkpoint.status = LoopStatus::Failed;
            checkpoint.updated_at = Utc::now();
            self.store.save(LOOP_STATE_KEY, &checkpoint)?;
        }
        Ok(outcome(&checkpoint))
    }

    #[instrument(skip_all, fields(iteration = n))]
    fn run_iteration(&self, checkpoint: &LoopCheckpoint, n: u32, failure: Option<&str>) -> Result<IterationResult> {
        self.cancel.check("edit loop completion")?;

        let files = self.read_targets(&checkpoint.target_files);
        let failure = failure.map(|text| truncate_middle(text, self.config.prompt_failure_limit));
        let prompt = self
            .prompts
            .render_edit(&checkpoint.task, &files, failure.as_deref())?;

        let completion = match self.provider.complete(&prompt, &[]) {
            Ok(completion) => completion,
            Err(err) => {
                // Failure after an interrupt is reported as the interrupt.
                self.cancel.check("edit loop completion")?;
                if err.downcast_ref::<TransportError>().is_some() {
                    return Err(err);
                }
                warn!(err = %format!("{err:#}"), "provider failed, recording failing iteration");
                return Ok(IterationResult {
                    iteration: n,
                    edits_applied: Vec::new(),
                    test_command: checkpoint.test_command.clone(),
                    test_passed: false,
                    test_output: format!("provider error: {err:#}"),
                    tokens_used: 0,
                });
            }
        };

        let edits = parse_edits(&completion.content);
        let outcomes = apply_edits(&self.paths.root, &edits);
        debug!(
            parsed = edits.len(),
            applied = outcomes.iter().filter(|o| o.applied).count(),
            "edits processed"
        );

        self.cancel.check("edit loop tests")?;
        let (test_passed, test_output) = self.run_tests(checkpoint.test_command.as_deref());

        Ok(IterationResult {
            iteration: n,
            edits_applied: outcomes,
            test_command: checkpoint.test_command.clone(),
            test_passed,
            test_output,
            tokens_used: completion.token_usage,
        })
    }

    fn read_targets(&self, files: &[String]) -> Vec<PromptFile> {
        files
            .iter()
            .map(|file| {
                let path = self.paths.resolve(file);
                match fs::read_to_string(&path) {
                    Ok(contents) => PromptFile {
                        path: file.clone(),
                        content: truncate_middle(&contents, self.config.file_content_limit),
                        exists: true,
                    },
                    Err(err) if path.exists() => PromptFile {
                        path: file.clone(),
                        content: format!("(unreadable: {err})"),
                        exists: true,
                    },
                    Err(_) => PromptFile {
                        path: file.clone(),
                        content: String::new(),
                        exists: false,
                    },
                }
            })
            .collect()
    }

    fn run_tests(&self, command: Option<&str>) -> (bool, String) {
        let Some(command) = command else {
            return (true, NO_TEST_COMMAND.to_string());
        };
        run_test_command(
            &self.paths.root,
            command,
            self.config.test_timeout_secs,
            self.config.output_limit_bytes,
            self.config.test_output_limit,
        )
    }
}

/// Run `command` through `sh -c`; pass iff it exits 0 before the timeout.
fn run_test_command(
    root: &Path,
    command: &str,
    timeout_secs: u64,
    output_limit_bytes: usize,
    output_limit: usize,
) -> (bool, String) {
    let timeout = Duration::from_secs(timeout_secs);
    match run_with_timeout(shell_command(command, root), None, timeout, output_limit_bytes) {
        Ok(output) if output.timed_out => (
            false,
            truncate_middle(
                &format!("test command timed out after {timeout_secs}s\n{}", output.combined()),
                output_limit,
            ),
        ),
        Ok(output) => (output.success(), truncate_middle(&output.combined(), output_limit)),
        Err(err) => {
            warn!(command, err = %format!("{err:#}"), "failed to launch test command");
            (false, format!("failed to launch test command `{command}`: {err:#}"))
        }
    }
}

fn outcome(checkpoint: &LoopCheckpoint) -> LoopOutcome {
    let success = checkpoint.status == LoopStatus::Completed;
    let last_test_output = checkpoint.iterations.last().map(|it| it.test_output.clone());
    let edits: usize = checkpoint
        .iterations
        .iter()
        .map(|it| it.edits_applied.iter().filter(|o| o.applied).count())
        .sum();
    let summary = if success {
        let gate = if checkpoint.test_command.is_some() {
            "tests passed"
        } else {
            "no test command"
        };
        format!(
            "Completed in {} iteration(s): {edits} edit(s) applied, {gate}.",
            checkpoint.iteration
        )
    } else {
        let last = last_test_output
            .as_deref()
            .map(|output| truncate_middle(output, SUMMARY_OUTPUT_LIMIT))
            .unwrap_or_default();
        format!(
            "Failed after {} of {} iteration(s): {edits} edit(s) applied.\nLast test output:\n{last}",
            checkpoint.iteration, checkpoint.max_iterations
        )
    };
    LoopOutcome {
        success,
        iterations: checkpoint.iteration,
        tokens_used: checkpoint.tokens_used(),
        summary,
        last_test_output,
    }
}

fn snapshot_name(n: u32) -> String {
    format!("iter-{n}")
}
