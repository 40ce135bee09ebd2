//! WoT Device Bridge Example
//!
//! Mirrors an in-memory thing into a local device and walks through:
//! 1. Construction from a Thing Description
//! 2. Property writes, live reads and pushed updates
//! 3. Action requests
//! 4. Event relaying through the gateway event bus
//! 5. Teardown

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wotgate_core::{EventBus, GatewayEvent};
use wotgate_devices::mock::MockThing;
use wotgate_devices::{ThingDescription, WotAdapter, WotAdapterConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    wotgate_core::logging::init();
    println!("=== WoTGate Device Bridge Demo ===\n");

    let event_bus = Arc::new(EventBus::with_name("demo"));
    let mut events = event_bus.subscribe();
    let adapter = WotAdapter::new(WotAdapterConfig::new("demo-adapter"), Some(event_bus.clone()));

    // === Example 1: Mirror a thing ===
    println!("--- Example 1: Mirror a thing ---");

    let td = ThingDescription::from_json_str(
        r#"{
            "id": "urn:dev:ops:32473-WoTLamp-1234",
            "title": "MyLampThing",
            "properties": {
                "status": {"type": "string", "observable": true},
                "brightness": {"type": "integer", "minimum": 0, "maximum": 100},
                "firmware": {"type": "string", "readOnly": true}
            },
            "actions": {
                "toggle": {"output": {"type": "boolean"}},
                "fade": {"input": {"type": "integer"}}
            },
            "events": {
                "overheating": {"data": {"type": "string"}}
            }
        }"#,
    )?;

    let lamp = MockThing::new()
        .with_value("brightness", json!(40))
        .with_value("firmware", json!("1.4.2"))
        .with_output("toggle", json!(true));

    let device = adapter.add_device("lamp", td, Arc::new(lamp.clone())).await;
    println!(
        "✓ {} mirrored: {} properties, {} subscriptions",
        device.title().unwrap_or("?"),
        device.properties().count(),
        device.subscription_count()
    );

    // === Example 2: Properties ===
    println!("\n--- Example 2: Properties ---");

    device.set_property("brightness", json!(75)).await?;
    println!("✓ brightness written, remote now reads {}", device.get_property("brightness").await?);
    println!("✓ firmware {}", device.get_property("firmware").await?);

    if let Err(e) = device.set_property("firmware", json!("2.0.0")).await {
        println!("✓ write refused: {}", e);
    }

    lamp.push_property("status", json!("on"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("✓ status pushed, cached as {}", device.get_property("status").await?);

    // === Example 3: Actions ===
    println!("\n--- Example 3: Actions ---");

    let output = device.request_action("req-1", "toggle", None).await?;
    println!("✓ toggle returned {:?}", output);
    device.request_action("req-2", "fade", Some(json!(10))).await?;
    for request in device.action_requests() {
        println!("  {} {} -> {}", request.id, request.name, request.status);
    }

    // === Example 4: Events ===
    println!("\n--- Example 4: Events ---");

    lamp.emit_event("overheating", json!("lamp is getting hot"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    while let Some((event, metadata)) = events.try_recv() {
        match event {
            GatewayEvent::DeviceEvent { event, data, .. } => {
                println!("✓ event '{}' relayed: {}", event, data)
            }
            other => println!("  bus: {} ({})", other, metadata.source),
        }
    }

    // === Example 5: Teardown ===
    println!("\n--- Example 5: Teardown ---");

    let released = adapter.unload().await;
    println!(
        "✓ {} device(s) unloaded, {} remote subscriptions still open",
        released,
        lamp.open_subscriptions()
    );

    println!("\n=== Demo Complete ===");
    Ok(())
}
