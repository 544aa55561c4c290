//! Reactive condition engine, rule supervisor loop, and timer service for a home-automation hub.
//!
//! A rule is built from a [`condition::Condition`] graph evaluated by [`engine::RuleEngine`]
//! against a stream of [`device::DeviceEvent`]s, and run by [`handler::RuleHandler`] once its
//! trigger condition settles `True` (or, for scheduled rules, once its [`handler::ScheduleProvider`]
//! says it's time). [`utilities::RuleUtilities`] is the fluent surface rule authors use to build
//! conditions without touching the engine's internals directly.

pub mod audit;
pub mod condition;
pub mod config;
pub mod device;
pub mod engine;
pub mod handler;
pub mod instance_id;
pub mod scene;
pub mod store;
pub mod timer;
pub mod utilities;

pub use audit::{AuditContext, AuditEvent, AuditLog, AuditSink, EventSubtype, EventType, InMemoryAuditSink};
pub use condition::{BooleanOp, ComparisonOp, Condition, ConditionNode};
pub use config::HearthConfig;
pub use device::{DeviceAttrs, DeviceEvent, DeviceIo, InMemoryDeviceIo, SharedDeviceIo};
pub use engine::{ConditionNotifier, ConditionState, RuleEngine};
pub use handler::{FnAction, RuleAction, RuleHandler, RuleTrigger, ScheduleProvider};
pub use instance_id::InstanceId;
pub use scene::{
    CommandResult, DeviceStateRequirement, InMemorySceneManager, SceneManager, SceneRecord,
    SceneSetResponse, SharedSceneManager,
};
pub use store::{InMemoryRuleStore, RuleKind, RuleRecord, RuleStore};
pub use timer::TimerService;
pub use utilities::{Attribute, Command, Device, RuleUtilities, Scene};

pub use hearth_common::{HearthError, Result};
