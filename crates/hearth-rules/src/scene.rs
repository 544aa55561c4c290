//! Scenes: named collections of device-attribute targets that can be applied in one shot and
//! checked for "is this scene currently active" against live device state.
//!
//! Grounded on the source `SceneManager`: `set_scene` dispatches every device's command in
//! parallel (here via `tokio::spawn` rather than `asyncio.create_task`, since this crate does not
//! carry a `futures` dependency) and aggregates per-device failures into a single response
//! instead of failing the whole scene on the first device error; `is_scene_set` batch-fetches
//! device attributes and compares them against each member's expected value.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use hearth_common::{HearthError, Result};

use crate::audit::{AuditEvent, AuditLog, EventSubtype, EventType};
use crate::device::SharedDeviceIo;

/// One device's target state within a scene: the command to send to reach it, and the
/// attribute/value pair that indicates the command took effect, for `is_scene_set` comparisons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceStateRequirement {
    pub device_id: i64,
    pub command: String,
    pub args: Option<Value>,
    pub attribute: String,
    pub expected_value: Value,
}

impl DeviceStateRequirement {
    pub fn new(
        device_id: i64,
        command: impl Into<String>,
        args: Option<Value>,
        attribute: impl Into<String>,
        expected_value: Value,
    ) -> Self {
        Self {
            device_id,
            command: command.into(),
            args,
            attribute: attribute.into(),
            expected_value,
        }
    }
}

/// A named scene: the set of device targets applied together by `set_scene`.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRecord {
    pub name: String,
    pub device_states: Vec<DeviceStateRequirement>,
}

/// Outcome of sending one device's command as part of `set_scene`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResult {
    pub device_id: i64,
    pub success: bool,
    pub error: Option<String>,
}

/// Aggregate result of applying a scene: per-device outcomes plus an overall success flag that is
/// true only if every device command succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneSetResponse {
    pub scene_name: String,
    pub success: bool,
    pub results: Vec<CommandResult>,
}

/// Persists scene definitions, applies them against live devices, and reports whether a scene's
/// devices currently match its targets.
#[async_trait]
pub trait SceneManager: Send + Sync {
    async fn create_scene(&self, name: &str, device_states: Vec<DeviceStateRequirement>) -> Result<()>;
    async fn get_scene(&self, name: &str) -> Result<Option<SceneRecord>>;
    async fn list_scenes(&self) -> Result<Vec<SceneRecord>>;
    async fn delete_scene(&self, name: &str) -> Result<()>;

    /// Send every device's command in parallel and aggregate the results. Fails outright only if
    /// `name` is not a known scene; individual device command failures are reported, not raised.
    async fn set_scene(&self, name: &str, device_io: &SharedDeviceIo) -> Result<SceneSetResponse>;

    /// Whether every device in the scene currently reports its expected attribute value.
    async fn is_scene_set(&self, name: &str, device_io: &SharedDeviceIo) -> Result<bool>;

    /// Attach an audit sink for scene lifecycle events (`SCENE_CREATED`, `SCENE_DELETED`,
    /// `SCENE_APPLIED`). Optional -- default no-op for implementations that don't audit.
    fn attach_audit(&self, _audit: Arc<AuditLog>) {}
}

/// In-memory [`SceneManager`] suitable for tests and single-process deployments.
#[derive(Default)]
pub struct InMemorySceneManager {
    scenes: DashMap<String, Vec<DeviceStateRequirement>>,
    audit: parking_lot::Mutex<Option<Arc<AuditLog>>>,
}

impl InMemorySceneManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SceneManager for InMemorySceneManager {
    async fn create_scene(&self, name: &str, device_states: Vec<DeviceStateRequirement>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(HearthError::UserInput("scene name must not be empty".into()));
        }
        self.scenes.insert(name.to_string(), device_states);
        if let Some(audit) = self.audit.lock().clone() {
            audit.log_event(AuditEvent::new(EventType::Scene, EventSubtype::SceneCreated).with_scene(name));
        }
        Ok(())
    }

    async fn get_scene(&self, name: &str) -> Result<Option<SceneRecord>> {
        Ok(self.scenes.get(name).map(|entry| SceneRecord {
            name: name.to_string(),
            device_states: entry.clone(),
        }))
    }

    async fn list_scenes(&self) -> Result<Vec<SceneRecord>> {
        Ok(self
            .scenes
            .iter()
            .map(|entry| SceneRecord {
                name: entry.key().clone(),
                device_states: entry.value().clone(),
            })
            .collect())
    }

    async fn delete_scene(&self, name: &str) -> Result<()> {
        self.scenes
            .remove(name)
            .ok_or_else(|| HearthError::UserInput(format!("scene '{name}' not found")))?;
        if let Some(audit) = self.audit.lock().clone() {
            audit.log_event(AuditEvent::new(EventType::Scene, EventSubtype::SceneDeleted).with_scene(name));
        }
        Ok(())
    }

    async fn set_scene(&self, name: &str, device_io: &SharedDeviceIo) -> Result<SceneSetResponse> {
        let device_states = self
            .scenes
            .get(name)
            .map(|entry| entry.clone())
            .ok_or_else(|| HearthError::UserInput(format!("scene '{name}' not found")))?;

        let mut handles = Vec::with_capacity(device_states.len());
        for requirement in device_states {
            let device_io = device_io.clone();
            handles.push(tokio::spawn(async move {
                let device_id = requirement.device_id;
                match device_io
                    .send_command(device_id, &requirement.command, requirement.args.clone())
                    .await
                {
                    Ok(()) => CommandResult { device_id, success: true, error: None },
                    Err(err) => CommandResult { device_id, success: false, error: Some(err.to_string()) },
                }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap_or_else(|join_err| CommandResult {
                device_id: -1,
                success: false,
                error: Some(join_err.to_string()),
            }));
        }

        let success = results.iter().all(|r| r.success);
        if let Some(audit) = self.audit.lock().clone() {
            audit.log_event(
                AuditEvent::new(EventType::Scene, EventSubtype::SceneApplied)
                    .with_scene(name)
                    .with_detail(format!("success={success}")),
            );
        }
        Ok(SceneSetResponse { scene_name: name.to_string(), success, results })
    }

    async fn is_scene_set(&self, name: &str, device_io: &SharedDeviceIo) -> Result<bool> {
        let device_states = self
            .scenes
            .get(name)
            .map(|entry| entry.clone())
            .ok_or_else(|| HearthError::UserInput(format!("scene '{name}' not found")))?;
        if device_states.is_empty() {
            return Ok(true);
        }

        let device_ids: Vec<i64> = device_states.iter().map(|r| r.device_id).collect();
        let attrs = device_io.get_bulk_attributes(&device_ids).await?;
        Ok(device_states.iter().all(|req| {
            attrs
                .get(&req.device_id)
                .and_then(|m| m.get(&req.attribute))
                .is_some_and(|v| *v == req.expected_value)
        }))
    }

    fn attach_audit(&self, audit: Arc<AuditLog>) {
        *self.audit.lock() = Some(audit);
    }
}

pub type SharedSceneManager = Arc<dyn SceneManager>;
