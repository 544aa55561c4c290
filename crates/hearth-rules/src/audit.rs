//! Audit trail for rule and scene activity.
//!
//! Events are written through a bounded channel to a background writer task so that logging
//! never blocks the engine's hot path, mirroring the source system's queue-backed audit service.
//! [`AuditContext`] propagates ambient "why was this command sent" context (which rule, which
//! trigger) across the async call chain via a task-local, the way the source attaches scope
//! via a contextvar-backed decorator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Broad category of an audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Rule,
    Scene,
    Device,
    Schedule,
}

/// Specific action within an [`EventType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSubtype {
    Installed,
    /// A previously-installed rule was re-armed from persisted state (e.g. on process startup),
    /// as opposed to a fresh `Installed` from a new rule definition.
    RuleLoaded,
    Uninstalled,
    Triggered,
    ActionExecuted,
    ActionFailed,
    SceneCreated,
    SceneDeleted,
    SceneApplied,
    ScheduleRunCompleted,
    ScheduleTerminated,
    ConditionNowTrue,
    ConditionEvaluated,
    ConditionTimeout,
    DeviceCommand,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub event_subtype: EventSubtype,
    pub rule_name: Option<String>,
    pub scene_name: Option<String>,
    pub device_id: Option<i64>,
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: EventType, event_subtype: EventSubtype) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            event_subtype,
            rule_name: None,
            scene_name: None,
            device_id: None,
            detail: None,
        }
    }

    pub fn with_rule(mut self, rule_name: impl Into<String>) -> Self {
        self.rule_name = Some(rule_name.into());
        self
    }

    pub fn with_scene(mut self, scene_name: impl Into<String>) -> Self {
        self.scene_name = Some(scene_name.into());
        self
    }

    pub fn with_device(mut self, device_id: i64) -> Self {
        self.device_id = Some(device_id);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

tokio::task_local! {
    /// Ambient identifying context (rule name) attached to the current async task tree, so that
    /// device commands issued deep inside a rule action can be audited without threading the
    /// rule name through every call.
    static CURRENT_RULE: String;
}

/// Ambient audit context propagation helpers.
pub struct AuditContext;

impl AuditContext {
    /// Run `body` with `rule_name` attached as the current audit scope.
    pub async fn scoped<F, T>(rule_name: impl Into<String>, body: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        CURRENT_RULE.scope(rule_name.into(), body).await
    }

    /// The rule name attached to the current task tree, if any.
    pub fn current_rule() -> Option<String> {
        CURRENT_RULE.try_with(|r| r.clone()).ok()
    }
}

/// Sink that accepts audit events from anywhere in the engine and persists them from a single
/// background task, so callers never block on I/O.
pub struct AuditLog {
    tx: mpsc::Sender<AuditEvent>,
    writer: JoinHandle<()>,
}

/// Where a background-written audit event ultimately lands. Implementations should not block for
/// long; the bounded channel in front of this trait already provides backpressure relief.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, event: AuditEvent);
}

/// An [`AuditSink`] that simply accumulates events in memory, for tests and local development.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: parking_lot::Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn write(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

impl AuditLog {
    /// Construct the sink with a raw channel capacity. Prefer [`AuditLog::from_config`] when a
    /// [`crate::config::HearthConfig`] is available.
    pub fn new(sink: Arc<dyn AuditSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(capacity.max(1));
        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                sink.write(event).await;
            }
        });
        Self { tx, writer }
    }

    /// Construct the sink with its channel capacity taken from `config.audit_queue_capacity`.
    pub fn from_config(sink: Arc<dyn AuditSink>, config: &crate::config::HearthConfig) -> Self {
        Self::new(sink, config.audit_queue_capacity)
    }

    /// Queue an audit event. If the queue is full, the event is dropped and a warning logged --
    /// auditing must never apply backpressure to the engine's event-processing path.
    pub fn log_event(&self, mut event: AuditEvent) {
        if event.rule_name.is_none() {
            event.rule_name = AuditContext::current_rule();
        }
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(event) {
            warn!("audit queue full, dropping event");
        }
    }

    /// Flush by waiting for the channel to drain and stopping the writer task. Intended for
    /// graceful shutdown.
    pub async fn stop(self) {
        drop(self.tx);
        let _ = self.writer.await;
    }
}
