//! Supervises the lifecycle of installed rules: spawns the background loop each rule runs in,
//! tears it down on uninstall, and keeps [`RuleStore`] in sync with what's actually running.
//!
//! Grounded on the source `RuleHandler`'s `_run_rule_on_condition` / `_run_scheduled_rule`
//! supervisor loops.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use hearth_common::Result;

use crate::audit::{AuditEvent, AuditLog, EventSubtype, EventType};
use crate::condition::Condition;
use crate::config::HearthConfig;
use crate::device::SharedDeviceIo;
use crate::engine::RuleEngine;
use crate::scene::SharedSceneManager;
use crate::store::{RuleKind, RuleRecord, RuleStore};
use crate::utilities::RuleUtilities;

/// Builds the condition a trigger rule waits on. Invoked fresh at the start of every iteration
/// of the supervisor loop rather than cached, so a rule body can reference live device state
/// when constructing its wait condition.
pub trait RuleTrigger: Send + Sync {
    fn build(&self, utils: &RuleUtilities) -> Result<Condition>;
}

/// The body a rule runs once its trigger condition fires or its schedule comes due.
#[async_trait]
pub trait RuleAction: Send + Sync {
    async fn run(&self, utils: &RuleUtilities) -> Result<()>;
}

/// Computes the next absolute run time for a scheduled rule. Returning `None` terminates the
/// schedule permanently.
pub trait ScheduleProvider: Send + Sync {
    fn next_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// How many consecutive stale (already-past) scheduled times a schedule may produce before the
/// handler gives up and terminates it, rather than spinning.
const MAX_STALE_RETRIES: u32 = 2;

/// Owns the background tasks backing every installed rule.
pub struct RuleHandler {
    engine: Arc<RuleEngine>,
    device_io: SharedDeviceIo,
    scenes: SharedSceneManager,
    store: Arc<dyn RuleStore>,
    audit: Arc<AuditLog>,
    tasks: DashMap<String, JoinHandle<()>>,
    config: HearthConfig,
}

impl RuleHandler {
    pub fn new(
        engine: Arc<RuleEngine>,
        device_io: SharedDeviceIo,
        scenes: SharedSceneManager,
        store: Arc<dyn RuleStore>,
        audit: Arc<AuditLog>,
        config: HearthConfig,
    ) -> Self {
        engine.attach_audit(audit.clone());
        scenes.attach_audit(audit.clone());
        Self {
            engine,
            device_io,
            scenes,
            store,
            audit,
            tasks: DashMap::new(),
            config,
        }
    }

    fn utils(&self) -> RuleUtilities {
        RuleUtilities::new(self.engine.clone(), self.device_io.clone(), self.scenes.clone())
            .with_audit(self.audit.clone(), self.config.default_condition_timeout)
    }

    #[instrument(skip(self, trigger, action))]
    pub async fn install_trigger_rule(
        &self,
        name: impl Into<String>,
        trigger: Arc<dyn RuleTrigger>,
        action: Arc<dyn RuleAction>,
    ) -> Result<()> {
        let name = name.into();
        self.store
            .install(RuleRecord::new(name.clone(), RuleKind::Trigger))
            .await?;
        self.audit
            .log_event(AuditEvent::new(EventType::Rule, EventSubtype::Installed).with_rule(&name));
        self.spawn_trigger_loop(name, trigger, action);
        Ok(())
    }

    /// Re-arm a trigger rule that is already present in [`RuleStore`] (e.g. read back from
    /// persistent storage on process startup) using already-built trigger/action objects --
    /// rebuilding those from persisted rule source is out of scope for this crate. Unlike
    /// `install_trigger_rule`, this does not re-register with the store and audits `RULE_LOADED`
    /// instead of `RULE_CREATED`.
    #[instrument(skip(self, trigger, action))]
    pub async fn reinstall_trigger_rule(
        &self,
        name: impl Into<String>,
        trigger: Arc<dyn RuleTrigger>,
        action: Arc<dyn RuleAction>,
    ) -> Result<()> {
        let name = name.into();
        self.audit
            .log_event(AuditEvent::new(EventType::Rule, EventSubtype::RuleLoaded).with_rule(&name));
        self.spawn_trigger_loop(name, trigger, action);
        Ok(())
    }

    fn spawn_trigger_loop(&self, name: String, trigger: Arc<dyn RuleTrigger>, action: Arc<dyn RuleAction>) {
        let utils = self.utils();
        let audit = self.audit.clone();
        let rule_name = name.clone();
        let handle = tokio::spawn(async move {
            loop {
                let condition = match trigger.build(&utils) {
                    Ok(c) => c,
                    Err(err) => {
                        error!(rule = %rule_name, error = %err, "failed to build trigger condition");
                        break;
                    }
                };

                match utils.wait_for(condition, None, None).await {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => {
                        // Device I/O hiccups while waiting on the trigger condition are transient,
                        // not a reason to tear down the rule -- retry rather than exiting the loop
                        // (unlike the scheduled-rule loop, there is no bounded retry count here
                        // since a trigger rule has no "stale schedule" notion to escalate against).
                        warn!(rule = %rule_name, error = %err, "trigger condition wait failed, retrying");
                        continue;
                    }
                }

                audit.log_event(
                    AuditEvent::new(EventType::Rule, EventSubtype::Triggered).with_rule(&rule_name),
                );
                match action.run(&utils).await {
                    Ok(()) => {
                        audit.log_event(
                            AuditEvent::new(EventType::Rule, EventSubtype::ActionExecuted)
                                .with_rule(&rule_name),
                        );
                    }
                    Err(err) => {
                        warn!(rule = %rule_name, error = %err, "rule action failed");
                        audit.log_event(
                            AuditEvent::new(EventType::Rule, EventSubtype::ActionFailed)
                                .with_rule(&rule_name)
                                .with_detail(err.to_string()),
                        );
                    }
                }
            }
        });

        self.tasks.insert(name, handle);
    }

    #[instrument(skip(self, schedule, action))]
    pub async fn install_scheduled_rule(
        &self,
        name: impl Into<String>,
        schedule: Arc<dyn ScheduleProvider>,
        action: Arc<dyn RuleAction>,
    ) -> Result<()> {
        let name = name.into();
        self.store
            .install(RuleRecord::new(name.clone(), RuleKind::Scheduled))
            .await?;
        self.audit
            .log_event(AuditEvent::new(EventType::Rule, EventSubtype::Installed).with_rule(&name));
        self.spawn_scheduled_loop(name, schedule, action);
        Ok(())
    }

    /// Re-arm a scheduled rule that is already present in [`RuleStore`], audited as
    /// `RULE_LOADED` instead of `RULE_CREATED`. See [`RuleHandler::reinstall_trigger_rule`].
    #[instrument(skip(self, schedule, action))]
    pub async fn reinstall_scheduled_rule(
        &self,
        name: impl Into<String>,
        schedule: Arc<dyn ScheduleProvider>,
        action: Arc<dyn RuleAction>,
    ) -> Result<()> {
        let name = name.into();
        self.audit
            .log_event(AuditEvent::new(EventType::Rule, EventSubtype::RuleLoaded).with_rule(&name));
        self.spawn_scheduled_loop(name, schedule, action);
        Ok(())
    }

    fn spawn_scheduled_loop(
        &self,
        name: String,
        schedule: Arc<dyn ScheduleProvider>,
        action: Arc<dyn RuleAction>,
    ) {
        let utils = self.utils();
        let audit = self.audit.clone();
        let rule_name = name.clone();
        let retry_delay = self.config.scheduled_rule_retry_delay;
        let handle = tokio::spawn(async move {
            let mut stale_retries = 0u32;
            loop {
                let now = Utc::now();
                let Some(next) = schedule.next_run(now) else {
                    info!(rule = %rule_name, "schedule exhausted, terminating");
                    break;
                };

                if next <= now {
                    stale_retries += 1;
                    if stale_retries > MAX_STALE_RETRIES {
                        warn!(rule = %rule_name, "schedule repeatedly produced a past run time, terminating");
                        audit.log_event(
                            AuditEvent::new(EventType::Schedule, EventSubtype::ScheduleTerminated)
                                .with_rule(&rule_name),
                        );
                        break;
                    }
                    tokio::time::sleep(retry_delay).await;
                    continue;
                }
                stale_retries = 0;

                let delay = (next - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                tokio::time::sleep(delay).await;

                match action.run(&utils).await {
                    Ok(()) => {
                        audit.log_event(
                            AuditEvent::new(EventType::Schedule, EventSubtype::ScheduleRunCompleted)
                                .with_rule(&rule_name),
                        );
                    }
                    Err(err) => {
                        warn!(rule = %rule_name, error = %err, "scheduled action failed");
                        audit.log_event(
                            AuditEvent::new(EventType::Rule, EventSubtype::ActionFailed)
                                .with_rule(&rule_name)
                                .with_detail(err.to_string()),
                        );
                    }
                }
            }
        });

        self.tasks.insert(name, handle);
    }

    #[instrument(skip(self))]
    pub async fn uninstall_rule(&self, name: &str) -> Result<()> {
        let record = self.store.uninstall(name).await?;
        if let Some((_, handle)) = self.tasks.remove(name) {
            handle.abort();
        }
        self.audit.log_event(
            AuditEvent::new(EventType::Rule, EventSubtype::Uninstalled).with_rule(&record.name),
        );
        Ok(())
    }

    pub async fn get_active_rules(&self) -> Result<Vec<RuleRecord>> {
        self.store.list().await
    }
}

impl Drop for RuleHandler {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}

/// Convenience [`RuleAction`] wrapping a plain async closure, for rules simple enough not to
/// warrant a dedicated type.
pub struct FnAction<F>(pub F);

#[async_trait]
impl<F, Fut> RuleAction for FnAction<F>
where
    F: Fn(&RuleUtilities) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<()>> + Send,
{
    async fn run(&self, utils: &RuleUtilities) -> Result<()> {
        (self.0)(utils).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::device::{DeviceEvent, InMemoryDeviceIo};
    use crate::scene::InMemorySceneManager;
    use crate::store::InMemoryRuleStore;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct SwitchOnTrigger {
        device_id: i64,
    }

    impl RuleTrigger for SwitchOnTrigger {
        fn build(&self, utils: &RuleUtilities) -> Result<Condition> {
            Ok(utils.device(self.device_id).attribute("switch").eq(json!("on")))
        }
    }

    struct SendNotify {
        target: i64,
    }

    #[async_trait]
    impl RuleAction for SendNotify {
        async fn run(&self, utils: &RuleUtilities) -> Result<()> {
            utils
                .device(self.target)
                .command("notify")
                .send(utils.device_io(), None)
                .await
        }
    }

    fn build_handler() -> (RuleHandler, Arc<InMemoryDeviceIo>, Arc<InMemoryAuditSink>) {
        let io = Arc::new(InMemoryDeviceIo::new());
        let scenes: SharedSceneManager = Arc::new(InMemorySceneManager::new());
        let store: Arc<dyn RuleStore> = Arc::new(InMemoryRuleStore::new());
        let sink = Arc::new(InMemoryAuditSink::new());
        let audit = Arc::new(AuditLog::new(sink.clone(), 64));
        let config = HearthConfig {
            max_concurrent_events: 16,
            scheduled_rule_retry_delay: Duration::from_millis(10),
            ..HearthConfig::default()
        };
        let engine = RuleEngine::new(io.clone(), &config);
        let handler = RuleHandler::new(engine, io.clone(), scenes, store, audit, config);
        (handler, io, sink)
    }

    #[tokio::test]
    async fn test_trigger_rule_fires_and_audits() {
        let (handler, io, sink) = build_handler();
        handler
            .install_trigger_rule(
                "notify-on-switch",
                Arc::new(SwitchOnTrigger { device_id: 1 }),
                Arc::new(SendNotify { target: 2 }),
            )
            .await
            .unwrap();

        // let the supervisor loop register its wait condition before the event fires
        tokio::time::sleep(Duration::from_millis(20)).await;
        handler
            .engine
            .on_device_event(DeviceEvent::new(1, "switch", json!("on")))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(io.commands_for(2), vec![("notify".to_string(), None)]);
        let events = sink.events();
        assert!(events
            .iter()
            .any(|e| e.event_subtype == EventSubtype::Triggered));
        assert!(events
            .iter()
            .any(|e| e.event_subtype == EventSubtype::ActionExecuted));
    }

    #[tokio::test]
    async fn test_uninstall_rule_stops_supervisor_and_store() {
        let (handler, _io, _sink) = build_handler();
        handler
            .install_trigger_rule(
                "notify-on-switch",
                Arc::new(SwitchOnTrigger { device_id: 1 }),
                Arc::new(SendNotify { target: 2 }),
            )
            .await
            .unwrap();
        handler.uninstall_rule("notify-on-switch").await.unwrap();
        assert!(handler.get_active_rules().await.unwrap().is_empty());
        assert!(handler.uninstall_rule("notify-on-switch").await.is_err());
    }

    struct AlwaysStaleSchedule {
        calls: AtomicU32,
    }

    impl ScheduleProvider for AlwaysStaleSchedule {
        fn next_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= MAX_STALE_RETRIES + 1 {
                None
            } else {
                Some(now - ChronoDuration::seconds(5))
            }
        }
    }

    struct NoopAction;

    #[async_trait]
    impl RuleAction for NoopAction {
        async fn run(&self, _utils: &RuleUtilities) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_scheduled_rule_terminates_after_repeated_stale_times() {
        let (handler, _io, sink) = build_handler();
        handler
            .install_scheduled_rule(
                "nightly-report",
                Arc::new(AlwaysStaleSchedule { calls: AtomicU32::new(0) }),
                Arc::new(NoopAction),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let events = sink.events();
        assert!(events
            .iter()
            .any(|e| e.event_subtype == EventSubtype::ScheduleTerminated));
    }
}

