//! Walks one frame loop through the asset layer and prints the debug report.
//!
//! Run with `cargo run --features profiling --bin lifecycle_demo`.

use archetype_lifecycle::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

struct Sprite {
    width: u32,
    height: u32,
}
impl Asset for Sprite {}

struct Door {
    open: bool,
}
impl Asset for Door {}

fn build_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(5)));
    store.insert("ui/icon_a", "icon_a", Sprite { width: 32, height: 32 }, &["Common"]);
    store.insert("ui/icon_a_v2", "icon_a", Sprite { width: 64, height: 64 }, &["Common"]);
    store.insert("ui/icon_b", "icon_b", Sprite { width: 16, height: 16 }, &["Common"]);
    store.insert("props/door", "door", Door { open: false }, &["Dungeon"]);
    store
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = build_store();
    let context = AssetContext::new(store.clone(), AssetConfig::diagnostic())?;
    if let Some(diagnostics) = context.diagnostics() {
        diagnostics.loads().set_scope("Dungeon");
    }

    context
        .resident()
        .load_with_progress(|progress| tracing::info!("resident {:.0}%", progress * 100.0))
        .await?;
    if let Some(icon) = context.resident().get::<Sprite>("icon_a") {
        println!("icon_a is {}x{}", icon.width, icon.height);
    }

    let room = context.scope().child();
    let (door, component) = context
        .facade()
        .instantiate_and_get::<Door>("props/door", Placement::at(Vec3::new(4.0, 0.0, 2.0)), None, &room)
        .await?;
    println!("door spawned (open: {})", component.open);

    // Forgotten on purpose: it shows up in the leak summary until the room
    // scope is cancelled.
    let _icon = context.facade().load_asset::<Sprite>("ui/icon_b", &room).await?;

    let mut last_frame = Instant::now();
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(16)).await;
        let now = Instant::now();
        let delta = now - last_frame;
        last_frame = now;
        if let Some(report) = context.tick(delta) {
            println!("{report}");
        }
    }

    println!("{}", context.debug_report());

    door.release();
    room.cancel();
    println!("outstanding reservations after leaving the room: {}", store.outstanding());

    context.shutdown();
    Ok(())
}
