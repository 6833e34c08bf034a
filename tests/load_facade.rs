use archetype_lifecycle::diagnostics::Diagnostics;
use archetype_lifecycle::time::ManualClock;
use archetype_lifecycle::{Asset, AssetError, CancelToken, LoadFacade, MemoryStore, Placement};
use glam::{Quat, Vec3};
use std::sync::Arc;
use std::time::Duration;

struct Sprite;
impl Asset for Sprite {}

#[derive(Debug)]
struct Clip;
impl Asset for Clip {}

struct Door {
    locked: bool,
}
impl Asset for Door {}

fn setup(latency: Duration) -> (Arc<MemoryStore>, LoadFacade, Diagnostics) {
    let store = Arc::new(MemoryStore::with_latency(latency));
    store.insert("ui/icon", "icon", Sprite, &[]);
    store.insert("props/door", "door", Door { locked: true }, &[]);
    let diagnostics = Diagnostics::new(Arc::new(ManualClock::new()));
    let facade = LoadFacade::with_diagnostics(store.clone(), diagnostics.clone());
    (store, facade, diagnostics)
}

#[tokio::test]
async fn test_success_is_tracked_until_release() {
    let (store, facade, diagnostics) = setup(Duration::ZERO);
    let handle = facade.load_asset::<Sprite>("ui/icon", &CancelToken::new()).await.unwrap();

    assert_eq!(diagnostics.leaks().len(), 1);
    assert_eq!(diagnostics.loads().len(), 1);
    let entry = &diagnostics.leaks().snapshot()[0];
    assert_eq!(entry.key, "ui/icon");
    assert_eq!(entry.name, "icon");
    assert!(entry.site.file.ends_with("load_facade.rs"));

    handle.release();
    assert!(diagnostics.leaks().is_empty());
    assert!(diagnostics.loads().is_empty());
    assert_eq!(store.outstanding(), 0);
}

#[tokio::test]
async fn test_failure_leaves_nothing_behind() {
    let (store, facade, diagnostics) = setup(Duration::ZERO);
    store.fail("ui/icon");

    let err = facade.load_asset::<Sprite>("ui/icon", &CancelToken::new()).await.unwrap_err();
    assert!(matches!(err, AssetError::LoadFailed { .. }));
    assert!(diagnostics.leaks().is_empty());
    assert!(diagnostics.loads().is_empty());
    assert_eq!(store.outstanding(), 0);
    assert_eq!(store.stats().reserved, 1);
    assert_eq!(store.stats().released, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_releases() {
    let (store, facade, diagnostics) = setup(Duration::from_millis(50));
    let scope = CancelToken::new();

    let load = facade.load_asset::<Sprite>("ui/icon", &scope);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.outstanding(), 1);
        scope.cancel();
    };
    let (result, ()) = tokio::join!(load, cancel);

    assert!(result.unwrap_err().is_cancelled());
    assert!(diagnostics.leaks().is_empty());
    assert_eq!(store.outstanding(), 0);
    assert_eq!(store.stats().released, 1);
}

#[tokio::test]
async fn test_already_cancelled_scope() {
    let (store, facade, _) = setup(Duration::ZERO);
    let scope = CancelToken::new();
    scope.cancel();

    let result = facade.load_asset::<Sprite>("ui/icon", &scope).await;
    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(store.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_future_releases() {
    let (store, facade, diagnostics) = setup(Duration::from_millis(50));

    let load = facade.load_asset::<Sprite>("ui/icon", &CancelToken::new());
    let timed_out = tokio::time::timeout(Duration::from_millis(10), load).await;
    assert!(timed_out.is_err());

    assert_eq!(store.stats().reserved, 1);
    assert_eq!(store.outstanding(), 0);
    assert!(diagnostics.leaks().is_empty());
}

#[tokio::test]
async fn test_type_mismatch_is_released() {
    let (store, facade, diagnostics) = setup(Duration::ZERO);
    let err = facade.load_asset::<Clip>("ui/icon", &CancelToken::new()).await.unwrap_err();

    assert_eq!(
        err,
        AssetError::TypeMismatch {
            key: "ui/icon".into(),
            expected: "Clip",
            actual: "Sprite",
        }
    );
    assert_eq!(store.outstanding(), 0);
    assert!(diagnostics.leaks().is_empty());
}

#[tokio::test]
async fn test_instantiate_owns_instance() {
    let (store, facade, diagnostics) = setup(Duration::ZERO);
    let placement = Placement::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_y(1.0));
    let parent = facade
        .instantiate("props/door", Placement::default(), None, &CancelToken::new())
        .await
        .unwrap();
    let parent_id = parent.instance_id();

    let child = facade
        .instantiate("props/door", placement, parent_id, &CancelToken::new())
        .await
        .unwrap();
    let instance = child.value().unwrap();
    assert_eq!(instance.parent(), parent_id);
    assert_eq!(instance.placement(), placement);
    drop(instance);

    assert_eq!(store.live_instances(), 2);
    assert_eq!(diagnostics.leaks().len(), 2);

    child.release();
    parent.release();
    assert_eq!(store.live_instances(), 0);
    assert!(diagnostics.leaks().is_empty());
}

#[tokio::test]
async fn test_instantiate_and_get_component() {
    let (store, facade, _) = setup(Duration::ZERO);
    let (handle, door) = facade
        .instantiate_and_get::<Door>("props/door", Placement::default(), None, &CancelToken::new())
        .await
        .unwrap();
    assert!(door.locked);
    assert_eq!(store.live_instances(), 1);
    handle.release();
    assert_eq!(store.live_instances(), 0);
}

#[tokio::test]
async fn test_missing_component_destroys_instance() {
    let (store, facade, diagnostics) = setup(Duration::ZERO);
    let err = facade
        .instantiate_and_get::<Clip>("props/door", Placement::default(), None, &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AssetError::MissingComponent {
            key: "props/door".into(),
            component: "Clip",
        }
    );
    assert_eq!(store.live_instances(), 0);
    assert_eq!(store.outstanding(), 0);
    assert!(diagnostics.leaks().is_empty());
}

#[tokio::test]
async fn test_loads_of_one_key_are_tracked_separately() {
    let (store, facade, diagnostics) = setup(Duration::ZERO);
    let first = facade.load_asset::<Sprite>("ui/icon", &CancelToken::new()).await.unwrap();
    let second = facade.load_asset::<Sprite>("ui/icon", &CancelToken::new()).await.unwrap();
    assert_eq!(diagnostics.leaks().len(), 2);
    assert_eq!(diagnostics.loads().len(), 2);

    second.release();
    assert_eq!(diagnostics.leaks().len(), 1);
    assert_eq!(diagnostics.loads().len(), 1);
    assert_eq!(diagnostics.leaks().sweep(), 0);
    assert_eq!(store.outstanding(), 1);

    first.release();
    assert!(diagnostics.leaks().is_empty());
    assert_eq!(store.outstanding(), 0);
}

#[tokio::test]
async fn test_dropped_unreleased_asset_handle_is_swept() {
    let (store, facade, diagnostics) = setup(Duration::ZERO);
    let handle = facade.load_asset::<Sprite>("ui/icon", &CancelToken::new()).await.unwrap();
    let copy = handle.clone();
    drop(handle);
    assert_eq!(diagnostics.leaks().sweep(), 0);

    drop(copy);
    assert_eq!(diagnostics.leaks().sweep(), 1);
    assert!(diagnostics.leaks().is_empty());
    // Detection only: the reservation is still open.
    assert_eq!(store.outstanding(), 1);
}

#[tokio::test]
async fn test_failed_instantiate_leaves_nothing_behind() {
    let (store, facade, diagnostics) = setup(Duration::ZERO);
    store.fail("props/door");

    let err = facade
        .instantiate("props/door", Placement::default(), None, &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AssetError::LoadFailed { .. }));
    assert_eq!(store.outstanding(), 0);
    assert_eq!(store.live_instances(), 0);
    assert!(diagnostics.leaks().is_empty());
    assert!(diagnostics.loads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_instantiate_in_flight() {
    let (store, facade, diagnostics) = setup(Duration::from_millis(50));
    let scope = CancelToken::new();

    let spawn = facade.instantiate("props/door", Placement::default(), None, &scope);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        scope.cancel();
    };
    let (result, ()) = tokio::join!(spawn, cancel);

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(store.outstanding(), 0);
    assert_eq!(store.live_instances(), 0);
    assert!(diagnostics.leaks().is_empty());

    // The store task never creates the instance afterwards.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.live_instances(), 0);
}
