//! Trigger variables survive a restart through the JSON state file and
//! re-seed variable-condition triggers without firing them.

mod common;

use aiterm_triggers::config::{
    EngineSettings, MatchMode, NotifySeverity, TriggerActionConfig, TriggerConfig,
    TriggerVariablesState, VariableMapping,
};
use aiterm_triggers::persistence::FileVariablePersistence;
use aiterm_triggers::traits::{Collaborators, SharedRules, VariablePersistence};
use aiterm_triggers::TriggerEngine;
use common::{Recorder, vars};
use std::path::Path;
use tempfile::TempDir;

fn rules() -> Vec<TriggerConfig> {
    vec![
        TriggerConfig::new("status", "status", r"status: (\w+)", MatchMode::Regex)
            .with_variable(VariableMapping::capture("status", 1)),
        TriggerConfig::new("finished", "finished", "status == done", MatchMode::Variable)
            .with_action(TriggerActionConfig::Notify {
                title: "finished".into(),
                message: String::new(),
                severity: NotifySeverity::Info,
            }),
    ]
}

fn engine_with_file(path: &Path, recorder: &Recorder) -> TriggerEngine {
    let collaborators = Collaborators {
        rules: Box::new(SharedRules::new(rules())),
        sessions: Box::new(recorder.clone()),
        input: Box::new(recorder.clone()),
        notifier: Box::new(recorder.clone()),
        state: Box::new(recorder.clone()),
        pty: Box::new(recorder.clone()),
        persistence: Box::new(FileVariablePersistence::open(path)),
    };
    TriggerEngine::new(EngineSettings::default(), collaborators)
}

#[test]
fn test_variables_written_to_state_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("trigger-variables.json");
    let recorder = Recorder::default();
    let mut engine = engine_with_file(&path, &recorder);

    engine.on_session_output("tab-1", b"status: running\n");

    let state = TriggerVariablesState::load_from(&path).unwrap();
    assert_eq!(state.session("tab-1"), Some(&vars(&[("status", "running")])));
}

#[test]
fn test_restored_session_does_not_refire() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("trigger-variables.json");

    // First run: the condition becomes true and fires.
    let recorder = Recorder::default();
    let mut engine = engine_with_file(&path, &recorder);
    engine.on_session_output("tab-1", b"status: done\n");
    assert_eq!(recorder.notifications().len(), 1);

    // Restart: restored output is replayed with actions suppressed.
    let recorder = Recorder::default();
    let mut engine = engine_with_file(&path, &recorder);
    engine.on_session_load("tab-1");
    assert_eq!(engine.resolve("tab-1", "%status", false), "done");

    engine.set_suppressed("tab-1", true);
    engine.on_session_output("tab-1", b"status: done\n");
    engine.set_suppressed("tab-1", false);
    engine.on_session_output("tab-1", b"$ ");
    assert!(recorder.notifications().is_empty());

    // A genuine change afterwards still works.
    engine.on_session_output("tab-1", b"status: running\n");
    engine.on_session_output("tab-1", b"status: done\n");
    assert_eq!(recorder.notifications().len(), 1);
}

#[test]
fn test_file_persistence_load_unknown_session_is_empty() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = FileVariablePersistence::open(dir.path().join("vars.json"));
    assert!(store.load("nobody").unwrap().is_empty());
}

#[test]
fn test_sessions_are_stored_independently() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("vars.json");
    let store = FileVariablePersistence::open(&path);
    store.persist("a", &vars(&[("x", "1")])).unwrap();
    store.persist("b", &vars(&[("x", "2")])).unwrap();
    store.persist("a", &vars(&[("x", "3")])).unwrap();

    let reopened = FileVariablePersistence::open(&path);
    assert_eq!(reopened.load("a").unwrap(), vars(&[("x", "3")]));
    assert_eq!(reopened.load("b").unwrap(), vars(&[("x", "2")]));
}
