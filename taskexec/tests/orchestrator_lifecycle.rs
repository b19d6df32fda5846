//! End-to-end orchestrator scenarios against a temporary workspace.

use std::fs;

use chrono::Utc;
use taskexec::cancel::CancelToken;
use taskexec::core::types::{LoopStatus, StepPhase, TaskState, TaskStatus};
use taskexec::errors::ConfigError;
use taskexec::io::cache::ResponseCache;
use taskexec::io::config::{ExecutorConfig, ProviderConfig, load_config};
use taskexec::io::context::FileContextBuilder;
use taskexec::io::history::load_history;
use taskexec::io::provider::{CompletionProvider, ProviderRegistry};
use taskexec::orchestrator::Orchestrator;
use taskexec::test_support::{ScriptedProvider, ScriptedReply, TestWorkspace, edit_block};

fn file_context(ws: &TestWorkspace, cfg: &ExecutorConfig) -> FileContextBuilder {
    let cache = ResponseCache::new(&ws.paths, cfg.cache_ttl(), cfg.tokens_saved_per_hit);
    FileContextBuilder::new(ws.paths.clone(), cache, cfg.file_content_limit)
}

/// Question about a file → completion with file context; asking again hits the
/// cache; touching the file changes the fingerprint and misses.
#[test]
fn question_is_cached_until_file_changes() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write("notes.md", "The answer is 42.\n").expect("write");
    let cfg = ws
        .configure(ExecutorConfig {
            fingerprint_history_tail: 0,
            ..ExecutorConfig::default()
        })
        .expect("configure");
    let context = file_context(&ws, &cfg);
    let provider = ScriptedProvider::new(vec![
        ScriptedReply::Content("42".to_string()),
        ScriptedReply::Content("still 42".to_string()),
    ]);
    let orchestrator = Orchestrator::new(ws.paths.clone(), cfg, &provider, &context, CancelToken::new());
    let files = vec!["notes.md".to_string()];

    let first = orchestrator.run("what does the note say", &files).expect("run");
    assert_eq!(first.output, "42");
    assert!(provider.calls()[0].prompt.contains("The answer is 42."));

    let second = orchestrator.run("what does the note say", &files).expect("run");
    assert!(second.cached);
    assert_eq!(second.task_id, first.task_id);

    let stats = orchestrator.cache().stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.tokens_saved_estimate, 500);

    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
    fs::File::options()
        .write(true)
        .open(ws.root().join("notes.md"))
        .expect("open")
        .set_modified(later)
        .expect("touch");
    let third = orchestrator.run("what does the note say", &files).expect("run");
    assert!(!third.cached);
    assert_ne!(third.task_id, first.task_id);
    assert_eq!(third.output, "still 42");

    let history = load_history(&ws.paths, Utc::now());
    let cached: Vec<bool> = history.iter().map(|h| h.cached).collect();
    assert_eq!(cached, vec![false, true, false]);
}

#[test]
fn coding_task_updates_state_files() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write("calc.py", "def add(a, b):\n    return a - b\n").expect("write");
    let cfg = ws
        .configure(ExecutorConfig {
            test_command: Some("grep -q 'a + b' calc.py".to_string()),
            ..ExecutorConfig::default()
        })
        .expect("configure");
    let context = file_context(&ws, &cfg);
    let provider = ScriptedProvider::new(vec![ScriptedReply::Content(edit_block(
        "calc.py",
        "return a - b",
        "return a + b",
    ))]);
    let orchestrator = Orchestrator::new(ws.paths.clone(), cfg, &provider, &context, CancelToken::new());

    let result = orchestrator
        .run("fix the add function", &["calc.py".to_string()])
        .expect("run");
    assert!(result.completed);

    let raw = fs::read_to_string(&ws.paths.state_path).expect("state.json");
    let state: TaskState = serde_json::from_str(&raw).expect("parse state");
    assert_eq!(state.task_id, result.task_id);
    assert_eq!(state.status, TaskStatus::Completed);
    assert_eq!(state.step_phase, StepPhase::Done);
    assert!(state.pending_steps.is_empty());
    assert!(
        ws.paths
            .tasks_dir
            .join(format!("{}.json", result.task_id))
            .is_file()
    );
    assert_eq!(orchestrator.loop_status().expect("loop").status, LoopStatus::Completed);

    assert!(orchestrator.reset_loop().expect("reset"));
    assert!(orchestrator.loop_status().is_none());
}

#[test]
fn cleanup_keeps_newest_task_records() {
    let ws = TestWorkspace::new().expect("workspace");
    let cfg = ws
        .configure(ExecutorConfig {
            cleanup_max_count: 2,
            ..ExecutorConfig::default()
        })
        .expect("configure");
    let context = file_context(&ws, &cfg);
    let provider = ScriptedProvider::repeating("ok", 3);
    let orchestrator = Orchestrator::new(ws.paths.clone(), cfg, &provider, &context, CancelToken::new());

    let mut ids = Vec::new();
    for task in ["one", "two", "three"] {
        ids.push(orchestrator.run(task, &[]).expect("run").task_id);
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    assert_eq!(orchestrator.cleanup_tasks().expect("cleanup"), 1);
    assert!(!ws.paths.tasks_dir.join(format!("{}.json", ids[0])).exists());
    assert!(ws.paths.tasks_dir.join(format!("{}.json", ids[2])).exists());
}

#[test]
fn registry_resolves_configured_provider() {
    let ws = TestWorkspace::new().expect("workspace");
    fs::create_dir_all(&ws.paths.state_dir).expect("mkdir");
    fs::write(
        &ws.paths.config_path,
        "[provider]\nid = \"scripted\"\nmodel = \"toy\"\n",
    )
    .expect("write config");
    let cfg = load_config(&ws.paths.config_path).expect("load");

    let mut registry = ProviderRegistry::with_builtins();
    registry.register("scripted", |_cfg, _root| {
        Ok(Box::new(ScriptedProvider::repeating("from registry", 1)) as Box<dyn CompletionProvider>)
    });
    let provider = registry.resolve(&cfg.provider, ws.root()).expect("resolve");
    let context = file_context(&ws, &cfg);
    let orchestrator = Orchestrator::new(ws.paths.clone(), cfg, &provider, &context, CancelToken::new());

    let result = orchestrator.run("hello", &[]).expect("run");
    assert_eq!(result.output, "from registry");

    let err = registry
        .resolve(
            &ProviderConfig {
                id: "vendor-x".to_string(),
                ..ProviderConfig::default()
            },
            ws.root(),
        )
        .err()
        .expect("unknown provider");
    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::UnknownProvider { known, .. }) => {
            assert_eq!(known, &vec!["command".to_string(), "scripted".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
