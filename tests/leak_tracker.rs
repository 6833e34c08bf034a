use archetype_lifecycle::diagnostics::{CallSite, Diagnostics, LeakTracker};
use archetype_lifecycle::time::ManualClock;
use archetype_lifecycle::{
    Asset, AssetConfig, AssetContext, CancelToken, LoadFacade, MemoryStore, Placement,
};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

struct Crate;
impl Asset for Crate {}

fn object() -> Arc<dyn Any + Send + Sync> {
    Arc::new(Crate)
}

#[tokio::test]
async fn test_released_instance_never_reported() {
    let store = Arc::new(MemoryStore::new());
    store.insert("props/crate", "crate", Crate, &[]);
    let diagnostics = Diagnostics::new(Arc::new(ManualClock::new()));
    let facade = LoadFacade::with_diagnostics(store.clone(), diagnostics.clone());

    let kept = facade
        .instantiate("props/crate", Placement::default(), None, &CancelToken::new())
        .await
        .unwrap();
    let released = facade
        .instantiate("props/crate", Placement::default(), None, &CancelToken::new())
        .await
        .unwrap();
    released.release();

    let report = diagnostics.leaks().report_now(20);
    assert!(report.contains("tracked objects: 1"));
    assert_eq!(diagnostics.leaks().swept_total(), 0);
    kept.release();
}

#[tokio::test]
async fn test_destroyed_instance_is_swept() {
    let store = Arc::new(MemoryStore::new());
    store.insert("props/crate", "crate", Crate, &[]);
    let diagnostics = Diagnostics::new(Arc::new(ManualClock::new()));
    let facade = LoadFacade::with_diagnostics(store.clone(), diagnostics.clone());

    let handle = facade
        .instantiate("props/crate", Placement::default(), None, &CancelToken::new())
        .await
        .unwrap();
    let id = handle.instance_id().unwrap();

    // The scene destroys the instance behind the handle's back.
    assert!(store.destroy_instance(id));
    assert!(handle.value().is_none());
    assert_eq!(diagnostics.leaks().len(), 1);
    assert_eq!(diagnostics.leaks().snapshot()[0].key, "props/crate");

    assert_eq!(diagnostics.leaks().sweep(), 1);
    assert!(diagnostics.leaks().is_empty());
    assert!(diagnostics.leaks().report_now(20).contains("tracked objects: 0"));

    // Releasing afterwards is still safe.
    assert!(handle.release());
    assert_eq!(store.outstanding(), 0);
}

#[test]
fn test_report_is_bounded_most_recent_first() {
    let clock = Arc::new(ManualClock::new());
    let tracker = LeakTracker::new(clock.clone());
    let objects: Vec<_> = (0..30).map(|_| object()).collect();
    for (i, target) in objects.iter().enumerate() {
        tracker.track(target, &format!("key_{i}"), "crate", CallSite::caller());
        clock.advance(Duration::from_secs(1));
    }

    let report = tracker.report_now(20);
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines[0], "[LeakTracker] tracked objects: 30");
    assert!(lines[1].contains("key=\"key_29\""));
    assert!(lines[1].contains("age=1.0s"));
    assert_eq!(lines.iter().filter(|line| line.starts_with("  - ")).count(), 20);
    assert_eq!(*lines.last().unwrap(), "  ... and 10 more");

    // Reporting leaves live entries alone.
    assert_eq!(tracker.len(), 30);
}

#[test]
fn test_periodic_report_waits_for_interval() {
    let tracker = LeakTracker::new(Arc::new(ManualClock::new()));
    let target = object();
    tracker.track(&target, "props/crate", "crate", CallSite::caller());

    let interval = Duration::from_secs(10);
    let frame = Duration::from_secs(4);
    assert!(tracker.report_periodic(interval, frame, 5).is_none());
    assert!(tracker.report_periodic(interval, frame, 5).is_none());
    let report = tracker.report_periodic(interval, frame, 5).unwrap();
    assert!(report.contains("props/crate"));
    assert!(tracker.report_periodic(interval, frame, 5).is_none());
}

#[test]
fn test_periodic_interval_has_a_floor() {
    let tracker = LeakTracker::new(Arc::new(ManualClock::new()));
    let target = object();
    tracker.track(&target, "props/crate", "crate", CallSite::caller());

    let half = Duration::from_millis(500);
    assert!(tracker.report_periodic(Duration::from_millis(100), half, 5).is_none());
    assert!(tracker.report_periodic(Duration::from_millis(100), half, 5).is_some());
}

#[test]
fn test_periodic_report_skips_empty_tracker() {
    let tracker = LeakTracker::new(Arc::new(ManualClock::new()));
    let target = object();
    tracker.track(&target, "props/crate", "crate", CallSite::caller());
    drop(target);

    assert!(tracker.report_periodic(Duration::from_secs(1), Duration::from_secs(2), 5).is_none());
    assert_eq!(tracker.swept_total(), 1);
}

#[tokio::test]
async fn test_context_tick_and_debug_report() {
    let store = Arc::new(MemoryStore::new());
    store.insert("props/crate", "crate", Crate, &["Common"]);
    let clock = Arc::new(ManualClock::new());
    let config = AssetConfig {
        report_interval_secs: 2.0,
        ..AssetConfig::diagnostic()
    };
    let context = AssetContext::with_clock(store.clone(), config, clock.clone()).unwrap();
    context.resident().load().await.unwrap();
    if let Some(diagnostics) = context.diagnostics() {
        diagnostics.loads().set_scope("Harbor");
    }

    let handle = context
        .facade()
        .instantiate("props/crate", Placement::default(), None, context.scope())
        .await
        .unwrap();
    clock.advance(Duration::from_secs(3));

    assert!(context.tick(Duration::from_secs(1)).is_none());
    let periodic = context.tick(Duration::from_secs(1)).unwrap();
    assert!(periodic.contains("age=3.0s"));

    let report = context.debug_report();
    assert!(report.contains("### Resident: Common (loaded, 1)"));
    assert!(report.contains("[Harbor]"));
    assert!(report.contains("props/crate : Crate"));
    assert!(report.contains("[LeakTracker] tracked objects: 1"));

    // Leaving the context scope releases the handle.
    context.shutdown();
    assert!(handle.is_released());
    assert!(context.diagnostics().unwrap().leaks().is_empty());
}

#[tokio::test]
async fn test_debug_report_respects_bound() {
    let store = Arc::new(MemoryStore::new());
    for i in 0..200 {
        let name = format!("item_{i:03}");
        store.insert(&format!("bulk/{name}"), &name, Crate, &["Common"]);
    }
    let config = AssetConfig {
        max_report_chars: 512,
        ..AssetConfig::diagnostic()
    };
    let context = AssetContext::new(store, config).unwrap();
    context.resident().load().await.unwrap();

    let report = context.debug_report();
    assert!(report.chars().count() <= 512);
    assert!(report.ends_with("(truncated)\n"));
}
