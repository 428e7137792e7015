//! End-to-end runs of the coordinator and both agents against the simulator.
//!
//! Most tests run on a paused tokio clock, so a run of several hundred time
//! units completes instantly and deterministically. The file-store test
//! runs on the real clock with short time units.

use std::sync::Arc;
use std::time::Duration;

use autolearn_agent::sim::{
    AutoplayPolicy, SimPlatform, Simulation, SimulationConfig, SimulationOutcome,
};
use autolearn_coordinator::{CourseId, FileStore, MemoryStore, SessionStore};
use tempfile::TempDir;

fn ids(names: &[&str]) -> Vec<CourseId> {
    names.iter().map(|n| CourseId::new(*n)).collect()
}

// ============================================================================
// Complete runs
// ============================================================================

#[tokio::test(start_paused = true)]
async fn halts_after_learning_every_course() {
    let mut config = SimulationConfig::new(4, 12.0);
    config.page_size = 2;

    let report = Simulation::new(config)
        .run(Arc::new(MemoryStore::new()))
        .await
        .unwrap();

    assert_eq!(report.outcome, SimulationOutcome::Halted);
    assert_eq!(report.completed, 4);
    assert_eq!(report.total, 4);
    assert_eq!(report.learned_count, 4);
    assert_eq!(
        report.learned_courses,
        ids(&["course-001", "course-002", "course-003", "course-004"])
    );
    assert!(report
        .logs
        .iter()
        .any(|entry| entry.message == "All courses learned"));
}

#[tokio::test(start_paused = true)]
async fn halt_persists_stopped_run() {
    let store = Arc::new(MemoryStore::new());
    let report = Simulation::new(SimulationConfig::new(1, 6.0))
        .run(Arc::clone(&store))
        .await
        .unwrap();
    assert_eq!(report.outcome, SimulationOutcome::Halted);

    let state = SessionStore::new(store).session_state().await.unwrap();
    assert!(!state.is_running);
    assert_eq!(state.current_learning_course_id, None);
}

#[tokio::test(start_paused = true)]
async fn skips_finished_courses_in_document_order() {
    let mut config = SimulationConfig::new(0, 20.0);
    config.courses = SimPlatform::catalogue(3, 20.0);
    config.courses[0].watched = 20.0;
    config.courses[1].watched = 8.0;

    let report = Simulation::new(config)
        .run(Arc::new(MemoryStore::new()))
        .await
        .unwrap();

    assert_eq!(report.outcome, SimulationOutcome::Halted);
    assert_eq!(report.completed, 3);
    // The already finished course is never opened.
    assert_eq!(report.learned_courses, ids(&["course-002", "course-003"]));
    assert_eq!(report.learned_count, 2);
}

#[tokio::test(start_paused = true)]
async fn loop_mode_keeps_running_until_stopped() {
    let mut config = SimulationConfig::new(2, 9.0);
    config.loop_learning = true;

    let store = Arc::new(MemoryStore::new());
    let report = Simulation::new(config)
        .run(Arc::clone(&store))
        .await
        .unwrap();

    assert_eq!(report.outcome, SimulationOutcome::AllComplete);
    assert_eq!(report.completed, 2);
    let state = SessionStore::new(store).session_state().await.unwrap();
    assert!(!state.is_running);
}

#[tokio::test(start_paused = true)]
async fn configured_speed_shortens_the_run() {
    let slow = {
        let mut config = SimulationConfig::new(1, 30.0);
        config.video_speed = Some(1.0);
        Simulation::new(config)
            .run(Arc::new(MemoryStore::new()))
            .await
            .unwrap()
    };
    let fast = {
        let mut config = SimulationConfig::new(1, 30.0);
        config.video_speed = Some(3.0);
        Simulation::new(config)
            .run(Arc::new(MemoryStore::new()))
            .await
            .unwrap()
    };

    assert_eq!(slow.outcome, SimulationOutcome::Halted);
    assert_eq!(fast.outcome, SimulationOutcome::Halted);
    assert!(fast.units < slow.units);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn real_clock_run_persists_to_file_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let mut config = SimulationConfig::new(2, 6.0);
    config.time_unit = Duration::from_millis(20);
    let report = Simulation::new(config)
        .run(Arc::new(FileStore::new(&path)))
        .await
        .unwrap();
    assert_eq!(report.outcome, SimulationOutcome::Halted);

    let reopened = SessionStore::new(Arc::new(FileStore::new(&path)));
    let state = reopened.session_state().await.unwrap();
    assert!(!state.is_running);
    assert_eq!(state.learned_count, 2);
    assert_eq!(state.learned_courses, ids(&["course-001", "course-002"]));
    assert!(!state.logs.is_empty());
}

// ============================================================================
// Playback start fallbacks
// ============================================================================

#[tokio::test(start_paused = true)]
async fn muted_only_player_falls_back_to_muted_autoplay() {
    let mut config = SimulationConfig::new(2, 10.0);
    config.policy = AutoplayPolicy::MutedOnly;

    let report = Simulation::new(config)
        .run(Arc::new(MemoryStore::new()))
        .await
        .unwrap();

    assert_eq!(report.outcome, SimulationOutcome::Halted);
    assert_eq!(report.completed, 2);
}

#[tokio::test(start_paused = true)]
async fn gesture_only_player_starts_with_escalated_click() {
    let mut config = SimulationConfig::new(1, 10.0);
    config.policy = AutoplayPolicy::GestureOnly;

    let report = Simulation::new(config)
        .run(Arc::new(MemoryStore::new()))
        .await
        .unwrap();

    assert_eq!(report.outcome, SimulationOutcome::Halted);
    assert_eq!(report.completed, 1);
}

// ============================================================================
// Limits
// ============================================================================

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_units() {
    let mut config = SimulationConfig::new(3, 600.0);
    config.max_units = 20;

    let report = Simulation::new(config)
        .run(Arc::new(MemoryStore::new()))
        .await
        .unwrap();

    assert_eq!(report.outcome, SimulationOutcome::TimedOut);
    assert_eq!(report.completed, 0);
    assert!(report.units >= 20);
}
