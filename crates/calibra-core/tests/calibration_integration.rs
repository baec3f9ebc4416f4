//! Integration tests for the calibration engine.

use calibra_core::calibration::ProfileComputer;
use calibra_core::{
    BiasProfile, CalibrationService, CalibrationSettings, Confidence, ContextType, EstimateContext,
    FixedClock, MemoryProfileStore, ProfileDb, ProfileFile, ProfileRepository, Project, TaskRecord,
};
use chrono::{DateTime, Duration, Utc};

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-02-16T12:00:00+00:00")
        .unwrap()
        .with_timezone(&Utc)
}

fn done(id: usize, user: &str, estimate: u32, actual: f64) -> TaskRecord {
    TaskRecord {
        id: format!("{user}-{id}"),
        organization_id: "acme".to_string(),
        project_id: Some("website".to_string()),
        status: "done".to_string(),
        tags: vec!["frontend".to_string()],
        estimate_minutes: Some(f64::from(estimate)),
        estimate_provided_by: Some(user.to_string()),
        created_by: None,
        actual_minutes: Some(actual),
        time_logged_ms: None,
        completed_at: Some(now() - Duration::days((id % 20) as i64)),
        updated_at: now(),
        deleted: false,
    }
}

fn open_task(id: &str, project: &str, user: &str, estimate: u32) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        organization_id: "acme".to_string(),
        project_id: Some(project.to_string()),
        status: "todo".to_string(),
        tags: vec![],
        estimate_minutes: Some(f64::from(estimate)),
        estimate_provided_by: Some(user.to_string()),
        created_by: None,
        actual_minutes: None,
        time_logged_ms: None,
        completed_at: None,
        updated_at: now(),
        deleted: false,
    }
}

fn global_profile(user: &str, factor: f64, samples: u32, variance: f64) -> BiasProfile {
    BiasProfile {
        id: BiasProfile::profile_id("acme", user, ContextType::Global, "global"),
        organization_id: "acme".to_string(),
        user_id: user.to_string(),
        context_type: ContextType::Global,
        context_key: "global".to_string(),
        bias_factor: factor,
        confidence: Confidence::from_samples(samples, variance),
        sample_size: samples,
        variance_score: variance,
        trend_delta: 0.0,
        window_start: now(),
        window_end: now(),
        updated_at: now(),
    }
}

fn service_with(settings: CalibrationSettings) -> CalibrationService<MemoryProfileStore> {
    CalibrationService::new(MemoryProfileStore::new(), settings).with_clock(FixedClock(now()))
}

#[test]
fn scenario_a_strong_signal_but_low_confidence() {
    let service = service_with(CalibrationSettings::default());
    let tasks: Vec<_> = (0..10).map(|i| done(i, "alice", 30, 60.0)).collect();
    service.recompute_org_profiles("acme", &tasks);

    let profiles = service.get_profiles_for_user("acme", "alice");
    let global = profiles
        .iter()
        .find(|p| p.context_type == ContextType::Global)
        .unwrap();
    assert_eq!(global.sample_size, 10);
    assert_eq!(global.variance_score, 0.0);
    assert_eq!(global.bias_factor, 2.0);
    assert_eq!(global.confidence, Confidence::Low);
}

#[test]
fn scenario_b_high_confidence_adjusts_estimate() {
    let service = service_with(CalibrationSettings::default());
    let tasks: Vec<_> = (0..30)
        .map(|i| {
            let jitter = [-5.0, 0.0, 5.0][i % 3];
            let mut task = done(i, "bob", 100, 110.0 + jitter);
            task.project_id = None;
            task.tags.clear();
            task
        })
        .collect();
    service.recompute_org_profiles("acme", &tasks);

    let profiles = service.get_profiles_for_user("acme", "bob");
    let global = profiles
        .iter()
        .find(|p| p.context_type == ContextType::Global)
        .unwrap();
    assert_eq!(global.sample_size, 30);
    assert_eq!(global.confidence, Confidence::High);
    assert!((global.bias_factor - 1.10).abs() < 1e-9);

    let preview = service.get_adjustment_preview("acme", "bob", 100.0, &EstimateContext::new());
    assert_eq!(preview.adjusted_minutes, 105.0);
    assert_eq!(preview.confidence, Confidence::High);
}

#[test]
fn scenario_c_approval_gate_threshold() {
    let settings = CalibrationSettings {
        enable_estimate_calibration: true,
        estimation_require_approval: true,
        estimation_approval_threshold: 1.3,
    };

    let service = service_with(settings);
    service
        .repository()
        .replace_all("acme", &[global_profile("carol", 1.4, 30, 0.05)]);
    let preview = service.get_adjustment_preview("acme", "carol", 60.0, &EstimateContext::new());
    assert_eq!(preview.confidence, Confidence::High);
    assert!(preview.requires_approval);
    assert!(service.should_require_approval_for_done(&open_task("t1", "website", "carol", 60)));

    service
        .repository()
        .replace_all("acme", &[global_profile("carol", 1.2, 30, 0.05)]);
    let preview = service.get_adjustment_preview("acme", "carol", 60.0, &EstimateContext::new());
    assert!(!preview.requires_approval);
    assert!(!service.should_require_approval_for_done(&open_task("t1", "website", "carol", 60)));
}

#[test]
fn scenario_d_portfolio_inflation() {
    let service = service_with(CalibrationSettings::default());
    service
        .repository()
        .replace_all("acme", &[global_profile("dave", 1.05, 30, 0.01)]);

    let projects = vec![Project::new("website", "Website")];
    let tasks = vec![
        open_task("t1", "website", "dave", 100),
        open_task("t2", "website", "dave", 200),
    ];
    let rows = service.get_portfolio_risk_rows("acme", &projects, &tasks);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.estimated_minutes, 300.0);
    assert_eq!(row.adjusted_minutes, 315.0);
    assert_eq!(row.delta_minutes, 15.0);
    assert!((row.inflation_factor - 1.05).abs() < 1e-12);
    assert_eq!(row.task_count, 2);

    let csv = service.export_portfolio_csv(&rows);
    assert_eq!(
        csv,
        "Project,Estimated,Adjusted,Delta,Inflation factor,Task count\nWebsite,300,315,15,1.05,2"
    );
}

#[test]
fn recompute_is_idempotent_for_identical_snapshot() {
    let service = service_with(CalibrationSettings::default());
    let mut tasks: Vec<_> = (0..25).map(|i| done(i, "erin", 60, 45.0 + i as f64)).collect();
    tasks.extend((0..12).map(|i| done(i, "frank", 90, 120.0)));

    let first = service.recompute_org_profiles("acme", &tasks);
    let second = service.recompute_org_profiles("acme", &tasks);
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn blended_context_profiles_feed_preview() {
    let service = service_with(CalibrationSettings::default());
    let tasks: Vec<_> = (0..6).map(|i| done(i, "gina", 60, 90.0)).collect();
    let profiles = service.recompute_org_profiles("acme", &tasks);
    // global + project + stage + tag, six samples each
    assert_eq!(profiles.len(), 4);

    let ctx = EstimateContext::new()
        .with_project("website")
        .with_status("done")
        .with_tag("frontend");
    let preview = service.get_adjustment_preview("acme", "gina", 60.0, &ctx);
    assert_eq!(preview.sample_size, 24);
    assert_eq!(preview.bias_factor_used, 1.5);
    assert_eq!(preview.adjusted_minutes, 90.0);

    // Global alone sits under the sample floor.
    let preview = service.get_adjustment_preview("acme", "gina", 60.0, &EstimateContext::new());
    assert_eq!(preview.sample_size, 6);
    assert_eq!(preview.bias_factor_used, 1.0);
    assert_eq!(preview.adjusted_minutes, 60.0);
}

#[test]
fn calibration_off_is_passthrough() {
    let settings = CalibrationSettings {
        enable_estimate_calibration: false,
        estimation_require_approval: true,
        estimation_approval_threshold: 0.5,
    };
    let service = service_with(settings);
    service
        .repository()
        .replace_all("acme", &[global_profile("hank", 2.5, 40, 0.0)]);

    for estimate in [1.0, 7.5, 44.0, 100.0] {
        let preview = service.get_adjustment_preview("acme", "hank", estimate, &EstimateContext::new());
        assert_eq!(preview.adjusted_minutes, estimate);
        assert_eq!(preview.bias_factor_used, 1.0);
        assert!(!preview.requires_approval);
    }
}

#[test]
fn sqlite_backed_service_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = ProfileDb::open_at(&dir.path().join("profiles.db")).unwrap();
    let service = CalibrationService::new(db, CalibrationSettings::default()).with_clock(FixedClock(now()));

    let tasks: Vec<_> = (0..30).map(|i| done(i, "ivy", 60, 75.0)).collect();
    let computed = service.recompute_org_profiles("acme", &tasks);
    let mut stored = service.get_profiles_for_user("acme", "ivy");
    stored.sort_by_key(|p| (p.context_type, p.context_key.clone()));
    assert_eq!(stored, computed);
    assert_eq!(service.profile_generation("acme"), 1);

    // Reopen from disk.
    drop(service);
    let reopened = ProfileDb::open_at(&dir.path().join("profiles.db")).unwrap();
    assert_eq!(reopened.get_for_user("acme", "ivy").len(), computed.len());
}

#[test]
fn file_backed_service_guarded_recompute() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ProfileFile::with_path(dir.path().join("profiles.json"));
    let service = CalibrationService::new(store, CalibrationSettings::default()).with_clock(FixedClock(now()));

    let observed = service.profile_generation("acme");
    let tasks: Vec<_> = (0..3).map(|i| done(i, "jade", 60, 60.0)).collect();
    assert!(service.recompute_org_profiles_guarded("acme", &tasks, observed).is_some());
    assert!(service.recompute_org_profiles_guarded("acme", &[], observed).is_none());
    assert_eq!(service.get_profiles_for_user("acme", "jade").len(), 1);
}

#[test]
fn computer_output_is_ordered_per_user() {
    let mut tasks: Vec<_> = (0..5).map(|i| done(i, "zed", 60, 60.0)).collect();
    tasks.extend((0..5).map(|i| done(i, "amy", 60, 60.0)));

    let profiles = ProfileComputer::default().compute_profiles(&tasks, "acme", now());
    let users: Vec<_> = profiles.iter().map(|p| p.user_id.as_str()).collect();
    assert_eq!(users, vec!["amy", "amy", "amy", "amy", "zed", "zed", "zed", "zed"]);
}
