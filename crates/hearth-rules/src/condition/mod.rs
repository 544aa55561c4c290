//! Condition graph nodes.
//!
//! The set of condition kinds is closed and fully enumerated by the rule language, so `Condition`
//! is a tagged union over a fixed set of state structs rather than a `dyn Trait` object -- there
//! is no extension point here for user-defined condition kinds, unlike e.g. a user-supplied task
//! in a job queue.

mod always_false;
mod attribute_change;
mod boolean;
mod dynamic_attribute;
mod scene_change;
mod static_attribute;
pub mod value;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use hearth_common::Result;

use crate::device::{DeviceAttrs, DeviceEvent};
use crate::instance_id::InstanceId;
use always_false::AlwaysFalseState;
use attribute_change::AttributeChangeState;
use boolean::BooleanState;
use dynamic_attribute::DynamicAttributeState;
use scene_change::SceneChangeState;
use static_attribute::StaticAttributeState;
pub use value::{BooleanOp, ComparisonOp};

enum ConditionKind {
    AttributeChange(AttributeChangeState),
    StaticAttribute(StaticAttributeState),
    DynamicAttribute(DynamicAttributeState),
    Boolean(BooleanState),
    SceneChange(SceneChangeState),
    AlwaysFalse(AlwaysFalseState),
}

/// A single node in the condition dependency graph.
///
/// `timeout` and `duration` are mutable per-registration settings (set by `RuleUtilities::wait`
/// family helpers) layered on top of the node's own truth evaluation; the engine consults them
/// when deciding whether a `TRUE` transition should be delayed (`duration`) or whether a pending
/// transition should be abandoned (`timeout`).
pub struct ConditionNode {
    instance_id: InstanceId,
    kind: ConditionKind,
    timeout: Mutex<Option<Duration>>,
    duration: Mutex<Option<Duration>>,
}

/// Shared handle to a condition node. Cloning a `Condition` shares the same underlying node --
/// condition graphs are DAGs, and a subcondition may be referenced by more than one parent.
pub type Condition = Arc<ConditionNode>;

impl ConditionNode {
    fn wrap(kind: ConditionKind) -> Condition {
        Arc::new(ConditionNode {
            instance_id: InstanceId::next(),
            kind,
            timeout: Mutex::new(None),
            duration: Mutex::new(None),
        })
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn identifier(&self) -> String {
        match &self.kind {
            ConditionKind::AttributeChange(s) => s.identifier(),
            ConditionKind::StaticAttribute(s) => s.identifier(),
            ConditionKind::DynamicAttribute(s) => s.identifier(),
            ConditionKind::Boolean(s) => s.identifier(),
            ConditionKind::SceneChange(s) => s.identifier(),
            ConditionKind::AlwaysFalse(s) => s.identifier(),
        }
    }

    /// Device ids this node reads attributes from directly (empty for composite nodes).
    pub fn device_ids(&self) -> Vec<i64> {
        match &self.kind {
            ConditionKind::AttributeChange(s) => s.device_ids(),
            ConditionKind::StaticAttribute(s) => s.device_ids(),
            ConditionKind::DynamicAttribute(s) => s.device_ids(),
            ConditionKind::Boolean(_) | ConditionKind::SceneChange(_) | ConditionKind::AlwaysFalse(_) => {
                Vec::new()
            }
        }
    }

    /// Direct subconditions this node depends on, if any.
    pub fn subconditions(&self) -> Vec<Condition> {
        match &self.kind {
            ConditionKind::Boolean(s) => s.subconditions().to_vec(),
            ConditionKind::SceneChange(s) => vec![s.underlying().clone()],
            _ => Vec::new(),
        }
    }

    /// Feed a raw device event to leaf nodes that read from that device/attribute.
    pub fn on_device_event(&self, event: &DeviceEvent) {
        match &self.kind {
            ConditionKind::AttributeChange(s) => s.on_device_event(event),
            ConditionKind::StaticAttribute(s) => s.on_device_event(event),
            ConditionKind::DynamicAttribute(s) => s.on_device_event(event),
            ConditionKind::Boolean(_) | ConditionKind::SceneChange(_) | ConditionKind::AlwaysFalse(_) => {}
        }
    }

    /// Record a child's evaluated truth value. Only meaningful for composite nodes.
    pub fn on_condition_event(&self, child: InstanceId, value: bool) {
        match &self.kind {
            ConditionKind::Boolean(s) => s.set_child_state(child, value),
            ConditionKind::SceneChange(s) => s.set_underlying_state(value),
            _ => {}
        }
    }

    /// Seed leaf state from a bulk attribute snapshot and return the initial truth value.
    pub fn initialize(&self, attrs: &DeviceAttrs) -> bool {
        match &self.kind {
            ConditionKind::AttributeChange(s) => s.initialize(attrs),
            ConditionKind::StaticAttribute(s) => s.initialize(attrs),
            ConditionKind::DynamicAttribute(s) => s.initialize(attrs),
            ConditionKind::Boolean(s) => s.evaluate(),
            ConditionKind::SceneChange(s) => s.evaluate(),
            ConditionKind::AlwaysFalse(s) => s.evaluate(),
        }
    }

    /// Re-evaluate this node's truth value from its currently tracked state.
    pub fn evaluate(&self) -> bool {
        match &self.kind {
            ConditionKind::AttributeChange(s) => s.evaluate(),
            ConditionKind::StaticAttribute(s) => s.evaluate(),
            ConditionKind::DynamicAttribute(s) => s.evaluate(),
            ConditionKind::Boolean(s) => s.evaluate(),
            ConditionKind::SceneChange(s) => s.evaluate(),
            ConditionKind::AlwaysFalse(s) => s.evaluate(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        *self.timeout.lock()
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) {
        *self.timeout.lock() = timeout;
    }

    pub fn duration(&self) -> Option<Duration> {
        *self.duration.lock()
    }

    pub fn set_duration(&self, duration: Option<Duration>) {
        *self.duration.lock() = duration;
    }
}

impl ConditionNode {
    pub fn attribute_change(device_id: i64, attr: impl Into<String>) -> Condition {
        Self::wrap(ConditionKind::AttributeChange(AttributeChangeState::new(
            device_id,
            attr.into(),
        )))
    }

    pub fn static_attribute(
        device_id: i64,
        attr: impl Into<String>,
        op: ComparisonOp,
        literal: serde_json::Value,
    ) -> Condition {
        Self::wrap(ConditionKind::StaticAttribute(StaticAttributeState::new(
            device_id,
            attr.into(),
            op,
            literal,
        )))
    }

    pub fn dynamic_attribute(
        left: (i64, impl Into<String>),
        right: (i64, impl Into<String>),
        op: ComparisonOp,
    ) -> Condition {
        Self::wrap(ConditionKind::DynamicAttribute(DynamicAttributeState::new(
            (left.0, left.1.into()),
            (right.0, right.1.into()),
            op,
        )))
    }

    pub fn boolean(op: BooleanOp, children: Vec<Condition>) -> Result<Condition> {
        Ok(Self::wrap(ConditionKind::Boolean(BooleanState::new(
            op, children,
        )?)))
    }

    pub fn scene_change(scene_name: impl Into<String>, underlying: Condition) -> Condition {
        Self::wrap(ConditionKind::SceneChange(SceneChangeState::new(
            scene_name.into(),
            underlying,
        )))
    }

    pub fn always_false(reason: impl Into<String>) -> Condition {
        Self::wrap(ConditionKind::AlwaysFalse(AlwaysFalseState::new(reason)))
    }
}
