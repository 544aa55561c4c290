//! Fluent builders rule authors use to describe devices, attributes, commands, and scenes in
//! terms the condition engine understands.
//!
//! This is the Rust analogue of the source system's `Device`/`Attribute`/`Command`/`Scene`
//! wrapper classes. Python leans on dunder methods (`__eq__`, `__lt__`, ...) to turn comparisons
//! into condition objects; Rust has no equivalent operator-overloading story that returns
//! anything other than `bool`, so the same intent is expressed as named builder methods instead.

use chrono::{Local, NaiveTime};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use hearth_common::Result;

use crate::audit::{AuditEvent, AuditLog, EventSubtype, EventType};
use crate::condition::{BooleanOp, ComparisonOp, Condition, ConditionNode};
use crate::device::SharedDeviceIo;
use crate::engine::RuleEngine;
use crate::scene::{DeviceStateRequirement, SceneSetResponse, SharedSceneManager};

/// A device identified by its hub-assigned id.
#[derive(Debug, Clone)]
pub struct Device {
    id: i64,
    audit: Option<Arc<AuditLog>>,
}

impl Device {
    pub fn new(id: i64) -> Self {
        Self { id, audit: None }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn attribute(&self, name: impl Into<String>) -> Attribute {
        Attribute {
            device_id: self.id,
            name: name.into(),
        }
    }

    pub fn command(&self, name: impl Into<String>) -> Command {
        Command {
            device_id: self.id,
            name: name.into(),
            audit: self.audit.clone(),
        }
    }
}

/// A single attribute on a device, used to build attribute conditions.
#[derive(Debug, Clone)]
pub struct Attribute {
    device_id: i64,
    name: String,
}

impl Attribute {
    fn compare(&self, op: ComparisonOp, value: impl Into<Value>) -> Condition {
        ConditionNode::static_attribute(self.device_id, self.name.clone(), op, value.into())
    }

    pub fn eq(&self, value: impl Into<Value>) -> Condition {
        self.compare(ComparisonOp::Eq, value)
    }

    pub fn ne(&self, value: impl Into<Value>) -> Condition {
        self.compare(ComparisonOp::Ne, value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Condition {
        self.compare(ComparisonOp::Lt, value)
    }

    pub fn le(&self, value: impl Into<Value>) -> Condition {
        self.compare(ComparisonOp::Le, value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Condition {
        self.compare(ComparisonOp::Gt, value)
    }

    pub fn ge(&self, value: impl Into<Value>) -> Condition {
        self.compare(ComparisonOp::Ge, value)
    }

    /// Compare this attribute to another device's attribute, with neither side coerced.
    pub fn compare_to(&self, other: &Attribute, op: ComparisonOp) -> Condition {
        ConditionNode::dynamic_attribute(
            (self.device_id, self.name.clone()),
            (other.device_id, other.name.clone()),
            op,
        )
    }

    /// A condition that fires once whenever this attribute's value differs from the value it
    /// had when the condition was registered.
    pub fn on_change(&self) -> Condition {
        ConditionNode::attribute_change(self.device_id, self.name.clone())
    }
}

/// A command that can be sent to a device.
#[derive(Debug, Clone)]
pub struct Command {
    device_id: i64,
    name: String,
    audit: Option<Arc<AuditLog>>,
}

impl Command {
    pub async fn send(&self, device_io: &SharedDeviceIo, args: Option<Value>) -> Result<()> {
        let result = device_io.send_command(self.device_id, &self.name, args.clone()).await;
        if let Some(audit) = &self.audit {
            let detail = match &result {
                Ok(()) => format!("{}({:?})", self.name, args),
                Err(err) => format!("{}({:?}) failed: {err}", self.name, args),
            };
            audit.log_event(
                AuditEvent::new(EventType::Device, EventSubtype::DeviceCommand)
                    .with_device(self.device_id)
                    .with_detail(detail),
            );
        }
        result
    }
}

/// A named scene: a set of device targets, read and applied through [`SharedSceneManager`] rather
/// than via the device-event condition graph, since scenes are not themselves device attributes.
#[derive(Debug, Clone)]
pub struct Scene {
    name: String,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register this scene with `device_states` as its targets.
    pub async fn create(
        &self,
        scenes: &SharedSceneManager,
        device_states: Vec<DeviceStateRequirement>,
    ) -> Result<()> {
        scenes.create_scene(&self.name, device_states).await
    }

    /// Whether every device in this scene currently reports its expected attribute value.
    pub async fn is_set(&self, scenes: &SharedSceneManager, device_io: &SharedDeviceIo) -> Result<bool> {
        scenes.is_scene_set(&self.name, device_io).await
    }

    /// Send every member device's command and return the aggregated per-device result.
    pub async fn apply(
        &self,
        scenes: &SharedSceneManager,
        device_io: &SharedDeviceIo,
    ) -> Result<SceneSetResponse> {
        scenes.set_scene(&self.name, device_io).await
    }

    pub async fn delete(&self, scenes: &SharedSceneManager) -> Result<()> {
        scenes.delete_scene(&self.name).await
    }
}

/// Facade rule scripts use to build conditions, wait on them, and reference devices/scenes,
/// grounded on the source `RuleUtilities` class.
pub struct RuleUtilities {
    engine: Arc<RuleEngine>,
    device_io: SharedDeviceIo,
    scenes: SharedSceneManager,
    audit: Option<Arc<AuditLog>>,
    default_timeout: Option<Duration>,
}

impl RuleUtilities {
    pub fn new(engine: Arc<RuleEngine>, device_io: SharedDeviceIo, scenes: SharedSceneManager) -> Self {
        Self {
            engine,
            device_io,
            scenes,
            audit: None,
            default_timeout: None,
        }
    }

    /// Attach an audit sink so that commands issued through `self.device(id).command(...).send(..)`
    /// are recorded as `DEVICE_COMMAND` events, and set the fallback timeout `wait_for` applies
    /// when the caller passes `None`.
    pub fn with_audit(mut self, audit: Arc<AuditLog>, default_timeout: Option<Duration>) -> Self {
        self.audit = Some(audit);
        self.default_timeout = default_timeout;
        self
    }

    pub fn device(&self, id: i64) -> Device {
        let mut device = Device::new(id);
        device.audit = self.audit.clone();
        device
    }

    pub fn scene(&self, name: impl Into<String>) -> Scene {
        Scene::new(name)
    }

    pub fn device_io(&self) -> &SharedDeviceIo {
        &self.device_io
    }

    pub fn scenes(&self) -> &SharedSceneManager {
        &self.scenes
    }

    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.engine
    }

    /// `AND` combinator over one or more conditions.
    pub fn all_of(&self, conditions: Vec<Condition>) -> Result<Condition> {
        ConditionNode::boolean(BooleanOp::And, conditions)
    }

    /// `OR` combinator over one or more conditions.
    pub fn any_of(&self, conditions: Vec<Condition>) -> Result<Condition> {
        ConditionNode::boolean(BooleanOp::Or, conditions)
    }

    /// Negation of a single condition.
    pub fn is_not(&self, condition: Condition) -> Result<Condition> {
        ConditionNode::boolean(BooleanOp::Not, vec![condition])
    }

    /// Fires once whenever `condition`'s truth value changes.
    pub fn on_change(&self, scene_name: impl Into<String>, condition: Condition) -> Condition {
        ConditionNode::scene_change(scene_name, condition)
    }

    /// Plain awaitable sleep, for rule bodies that just need to pause for a span of time.
    pub async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Register `condition` and block until it evaluates true, or until `timeout` elapses --
    /// returns `Ok(false)` on timeout rather than an error, since timing out is an expected
    /// control-flow outcome for scheduled/trigger rule bodies. `for_duration`, if given, is
    /// applied to `condition` as its debounce window before registration.
    pub async fn wait_for(
        &self,
        condition: Condition,
        timeout: Option<Duration>,
        for_duration: Option<Duration>,
    ) -> Result<bool> {
        use crate::engine::{ConditionNotifier, ConditionState};
        use async_trait::async_trait;
        use tokio::sync::Notify;

        struct WakeOnTrue {
            notify: Arc<Notify>,
        }

        #[async_trait]
        impl ConditionNotifier for WakeOnTrue {
            async fn on_condition_true(&self, _instance_id: crate::instance_id::InstanceId) {
                self.notify.notify_one();
            }
        }

        if let Some(d) = for_duration {
            condition.set_duration(Some(d));
        }

        let timeout = timeout.or(self.default_timeout);

        let notify = Arc::new(Notify::new());
        let notifier = Arc::new(WakeOnTrue { notify: notify.clone() });
        let id = condition.instance_id();
        let initial = self.engine.add_condition(condition, Some(notifier)).await?;

        if initial == ConditionState::True {
            self.engine.remove_condition(id).await;
            return Ok(true);
        }

        let wait = notify.notified();
        let result = match timeout {
            Some(d) => tokio::time::timeout(d, wait).await.is_ok(),
            None => {
                wait.await;
                true
            }
        };
        self.engine.remove_condition(id).await;
        Ok(result)
    }

    /// Convenience over `wait_for` for the common "block until this attribute's value changes"
    /// case, building an `on_change` condition for the caller.
    pub async fn wait_for_change(
        &self,
        device_id: i64,
        attr: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let condition = ConditionNode::attribute_change(device_id, attr);
        self.wait_for(condition, timeout, None).await
    }

    /// Sleep until the next wall-clock occurrence of `time_of_day` (today if it hasn't passed
    /// yet, tomorrow otherwise).
    pub async fn wait_until(&self, time_of_day: NaiveTime) {
        let now = Local::now();
        let mut target = now.date_naive().and_time(time_of_day);
        if target <= now.naive_local() {
            target += chrono::Duration::days(1);
        }
        let delay = (target - now.naive_local())
            .to_std()
            .unwrap_or(Duration::ZERO);
        tokio::time::sleep(delay).await;
    }

    /// Current truth value of a registered condition, or `false` if it is not currently
    /// registered with the engine.
    pub async fn check(&self, instance_id: crate::instance_id::InstanceId) -> bool {
        use crate::engine::ConditionState;
        matches!(
            self.engine.get_condition_state(instance_id).await,
            Some(ConditionState::True)
        )
    }
}
