// Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use synaptic_hub::search::TextMatchScorer;
use synaptic_hub::{
    CapabilityDescriptor, Category, ConnectionHandle, Gateway, HubConfig, OutboundFrame, Role,
    StaticRegistry,
};

/// Short deadlines so paused-clock tests stay readable
pub fn fast_config() -> HubConfig {
    HubConfig {
        request_timeout_ms: 200,
        retry_delay_ms: 50,
        max_attempts: 3,
        ..Default::default()
    }
}

pub fn editor_registry() -> StaticRegistry {
    StaticRegistry::new(vec![
        CapabilityDescriptor::new(
            "unity_create_gameobject",
            "Create GameObject",
            "Create a new GameObject in the scene",
            Category::GameObject,
        ),
        CapabilityDescriptor::new(
            "unity_set_transform",
            "Set Transform",
            "Set position, rotation and scale",
            Category::Transform,
        ),
        CapabilityDescriptor::new(
            "unity_create_light",
            "Create Light",
            "Add a light source",
            Category::Lighting,
        ),
        CapabilityDescriptor::new(
            "unity_setup_camera",
            "Setup Camera",
            "Configure the main camera",
            Category::Camera,
        ),
        CapabilityDescriptor::new(
            "unity_create_bloom",
            "Create Bloom",
            "Add a bloom post-processing effect",
            Category::VFX,
        ),
        CapabilityDescriptor::new(
            "unity_build_player",
            "Build Player",
            "Build the project for a target platform",
            Category::Build,
        ),
    ])
}

pub fn gateway(config: HubConfig) -> Arc<Gateway> {
    Arc::new(Gateway::new(
        config,
        &editor_registry(),
        Arc::new(TextMatchScorer),
    ))
}

/// A scripted engine attached directly to the hub's engine slot.
///
/// Every command frame is reported on `seen` and answered with whatever
/// frames `reply` returns for it.
pub struct FakeEngine {
    pub handle_id: uuid::Uuid,
    pub seen: mpsc::UnboundedReceiver<Value>,
    pub task: JoinHandle<()>,
}

pub fn attach_engine<F>(gateway: &Arc<Gateway>, reply: F) -> FakeEngine
where
    F: Fn(&Value) -> Vec<Value> + Send + 'static,
{
    let (handle, mut outbound) = ConnectionHandle::channel();
    let handle_id = handle.id();
    gateway.connections().install(Role::Engine, handle);

    let (seen_tx, seen) = mpsc::unbounded_channel();
    let gateway = gateway.clone();
    let task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let OutboundFrame::Text(text) = frame else {
                break;
            };
            let command: Value = serde_json::from_str(&text).unwrap();
            for response in reply(&command) {
                gateway.handle_engine_frame(&response.to_string());
            }
            let _ = seen_tx.send(command);
        }
    });
    FakeEngine {
        handle_id,
        seen,
        task,
    }
}

pub fn success(command: &Value, content: Value) -> Value {
    json!({
        "id": command["id"],
        "type": "operation_result",
        "data": {"success": true},
        "content": content,
    })
}

pub fn failure(command: &Value, content: &str) -> Value {
    json!({
        "id": command["id"],
        "type": "operation_result",
        "data": {"success": false},
        "content": content,
    })
}
