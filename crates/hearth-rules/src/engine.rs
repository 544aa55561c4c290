//! The reactive condition engine: holds the dependency graph of registered conditions, applies
//! incoming device events, and propagates truth-value changes up through dependent conditions.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::{debug, instrument, warn};

use hearth_common::{HearthError, Result};

use crate::audit::{AuditEvent, AuditLog, EventSubtype, EventType};
use crate::condition::Condition;
use crate::config::HearthConfig;
use crate::device::{DeviceAttrs, DeviceEvent, SharedDeviceIo};
use crate::instance_id::InstanceId;
use crate::timer::TimerService;

/// Tri-state truth value of a registered condition.
///
/// `DurationPending` covers the debounce window: the condition's raw evaluation has gone true,
/// but the configured `duration` has not yet elapsed, so dependents are not notified until either
/// the timer fires (promoting to `True`) or the raw evaluation reverts to false first (dropping
/// straight back to `False`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionState {
    False,
    DurationPending,
    True,
}

impl ConditionState {
    fn as_bool(self) -> bool {
        matches!(self, ConditionState::True)
    }
}

/// Receives notification when a registered (root) condition transitions to `True`, or is
/// abandoned because its `timeout` elapsed before that happened.
#[async_trait]
pub trait ConditionNotifier: Send + Sync {
    async fn on_condition_true(&self, instance_id: InstanceId);

    /// Called at most once, instead of `on_condition_true`, if the condition's `timeout` elapses
    /// while it is still `False` or `DurationPending`. Default no-op for notifiers that only care
    /// about the fire signal.
    async fn on_condition_timeout(&self, _instance_id: InstanceId) {}
}

struct Registration {
    condition: Condition,
    state: ConditionState,
    notifier: Option<Arc<dyn ConditionNotifier>>,
    /// Number of registered roots (directly added via `add_condition`) that depend on this node,
    /// including itself if it was added as a root. A node is torn down only once this reaches 0.
    refcount: u32,
}

struct EngineInner {
    registrations: HashMap<InstanceId, Registration>,
    /// child -> parents that reference it as a subcondition.
    parents: HashMap<InstanceId, Vec<InstanceId>>,
    /// device id -> leaf condition ids that read attributes from it.
    device_index: HashMap<i64, HashSet<InstanceId>>,
}

/// Owns the condition dependency graph and reacts to device events and timer callbacks.
///
/// The engine's internal state lives behind a `tokio::sync::Mutex` rather than `std::sync::Mutex`
/// or `parking_lot::Mutex` because propagation may need to hold the lock across an `.await`
/// (bulk attribute fetches on registration); individual condition nodes use `parking_lot::Mutex`
/// internally since their own methods never await.
pub struct RuleEngine {
    inner: AsyncMutex<EngineInner>,
    device_io: SharedDeviceIo,
    duration_timers: Arc<TimerService>,
    timeout_timers: Arc<TimerService>,
    event_permits: Arc<Semaphore>,
    bulk_fetch_chunk_size: usize,
    self_weak: std::sync::Weak<RuleEngine>,
    audit: parking_lot::Mutex<Option<Arc<AuditLog>>>,
}

impl RuleEngine {
    /// Construct the engine from a [`HearthConfig`]: `max_concurrent_events` bounds the event
    /// semaphore, `bulk_fetch_chunk_size` bounds how many device ids go into a single
    /// `get_bulk_attributes` round trip during registration.
    pub fn new(device_io: SharedDeviceIo, config: &HearthConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            inner: AsyncMutex::new(EngineInner {
                registrations: HashMap::new(),
                parents: HashMap::new(),
                device_index: HashMap::new(),
            }),
            device_io,
            duration_timers: Arc::new(TimerService::new()),
            timeout_timers: Arc::new(TimerService::new()),
            event_permits: Arc::new(Semaphore::new(config.max_concurrent_events.max(1))),
            bulk_fetch_chunk_size: config.bulk_fetch_chunk_size.max(1),
            self_weak: weak.clone(),
            audit: parking_lot::Mutex::new(None),
        })
    }

    /// Attach an audit sink for condition-level lifecycle events (`CONDITION_NOW_TRUE`,
    /// `CONDITION_TIMEOUT`). Optional -- the engine is fully functional without one, since
    /// rule-level auditing is driven separately by `RuleHandler`.
    pub fn attach_audit(&self, audit: Arc<AuditLog>) {
        *self.audit.lock() = Some(audit);
    }

    /// Register a condition (and transitively, its subconditions) and return its initial state.
    /// `notifier`, if given, is invoked whenever this root condition later transitions to `True`.
    #[instrument(skip(self, condition, notifier))]
    pub async fn add_condition(
        self: &Arc<Self>,
        condition: Condition,
        notifier: Option<Arc<dyn ConditionNotifier>>,
    ) -> Result<ConditionState> {
        let mut inner = self.inner.lock().await;
        let device_ids = self.collect_new_device_ids(&inner, &condition);
        drop(inner);

        let attrs = if device_ids.is_empty() {
            DeviceAttrs::new()
        } else if device_ids.len() <= self.bulk_fetch_chunk_size {
            self.device_io.get_bulk_attributes(&device_ids).await?
        } else {
            let mut merged = DeviceAttrs::new();
            for chunk in device_ids.chunks(self.bulk_fetch_chunk_size) {
                merged.extend(self.device_io.get_bulk_attributes(chunk).await?);
            }
            merged
        };

        inner = self.inner.lock().await;
        let id = condition.instance_id();
        let state = self.register_recursive(&mut inner, &condition, &attrs);
        if let Some(reg) = inner.registrations.get_mut(&id) {
            reg.notifier = notifier;
        }

        // Predicate was already true at registration time (no duration involved, since
        // `register_recursive` routes the true-and-has-duration case to `DurationPending`
        // instead): cancel any timeout timer, drop the condition if nothing depends on it yet,
        // and fire the notifier immediately rather than waiting for a future device event.
        if state == ConditionState::True {
            self.timeout_timers.cancel(id);
            let has_dependents = inner.parents.get(&id).is_some_and(|p| !p.is_empty());
            let fire = inner.registrations.get(&id).and_then(|r| r.notifier.clone());
            if !has_dependents {
                self.unregister_recursive(&mut inner, id);
            }
            drop(inner);
            if let Some(audit) = self.audit.lock().clone() {
                audit.log_event(
                    AuditEvent::new(EventType::Device, EventSubtype::ConditionNowTrue)
                        .with_detail(id.to_string()),
                );
            }
            if let Some(notifier) = fire {
                notifier.on_condition_true(id).await;
            }
            return Ok(state);
        }

        Ok(state)
    }

    fn collect_new_device_ids(&self, inner: &EngineInner, condition: &Condition) -> Vec<i64> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut stack = vec![condition.clone()];
        while let Some(node) = stack.pop() {
            if inner.registrations.contains_key(&node.instance_id()) {
                continue;
            }
            for device_id in node.device_ids() {
                if seen.insert(device_id) {
                    out.push(device_id);
                }
            }
            stack.extend(node.subconditions());
        }
        out
    }

    fn register_recursive(
        &self,
        inner: &mut EngineInner,
        condition: &Condition,
        attrs: &DeviceAttrs,
    ) -> ConditionState {
        let id = condition.instance_id();
        if let Some(existing) = inner.registrations.get_mut(&id) {
            existing.refcount += 1;
            return existing.state;
        }

        for child in condition.subconditions() {
            self.register_recursive(inner, &child, attrs);
            inner.parents.entry(child.instance_id()).or_default().push(id);
            let child_state = inner.registrations[&child.instance_id()].state;
            condition.on_condition_event(child.instance_id(), child_state.as_bool());
        }

        for device_id in condition.device_ids() {
            inner.device_index.entry(device_id).or_default().insert(id);
        }

        let raw = condition.initialize(attrs);
        let duration = condition.duration();
        let state = match (raw, duration) {
            (true, Some(d)) if !d.is_zero() => ConditionState::DurationPending,
            (true, _) => ConditionState::True,
            (false, _) => ConditionState::False,
        };
        inner.registrations.insert(
            id,
            Registration {
                condition: condition.clone(),
                state,
                notifier: None,
                refcount: 1,
            },
        );

        // A timeout bounds how long the engine will wait for this node to reach `True` at all,
        // independent of whether it's waiting on a raw value change or a debounce still in
        // flight -- so it applies in both the `False` and `DurationPending` starting states.
        if state == ConditionState::DurationPending {
            if let Some(d) = duration {
                self.schedule_duration(id, d);
            }
        }
        if state != ConditionState::True {
            if let Some(timeout) = condition.timeout() {
                self.schedule_timeout(id, timeout);
            }
        }

        state
    }

    /// Unregister a previously-added root condition. Nodes with remaining dependents (shared
    /// subconditions of other still-registered conditions) are kept alive.
    #[instrument(skip(self))]
    pub async fn remove_condition(&self, instance_id: InstanceId) {
        let mut inner = self.inner.lock().await;
        self.unregister_recursive(&mut inner, instance_id);
    }

    fn unregister_recursive(&self, inner: &mut EngineInner, id: InstanceId) {
        let Some(reg) = inner.registrations.get_mut(&id) else {
            return;
        };
        reg.refcount = reg.refcount.saturating_sub(1);
        if reg.refcount > 0 {
            return;
        }
        let condition = reg.condition.clone();
        inner.registrations.remove(&id);
        self.duration_timers.cancel(id);
        self.timeout_timers.cancel(id);

        for device_id in condition.device_ids() {
            if let Some(set) = inner.device_index.get_mut(&device_id) {
                set.remove(&id);
                if set.is_empty() {
                    inner.device_index.remove(&device_id);
                }
            }
        }
        for child in condition.subconditions() {
            if let Some(parents) = inner.parents.get_mut(&child.instance_id()) {
                parents.retain(|p| *p != id);
            }
            self.unregister_recursive(inner, child.instance_id());
        }
    }

    pub async fn get_condition_state(&self, instance_id: InstanceId) -> Option<ConditionState> {
        self.inner
            .lock()
            .await
            .registrations
            .get(&instance_id)
            .map(|r| r.state)
    }

    /// Apply an incoming device event: feed it to every leaf condition reading that attribute,
    /// then propagate any resulting truth-value change up through the dependency graph.
    #[instrument(skip(self, event))]
    pub async fn on_device_event(self: &Arc<Self>, event: DeviceEvent) {
        let _permit = match self.event_permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let mut inner = self.inner.lock().await;
        let Some(leaf_ids) = inner.device_index.get(&event.device_id).cloned() else {
            return;
        };

        let mut queue: Vec<InstanceId> = Vec::new();
        for leaf_id in leaf_ids {
            if let Some(reg) = inner.registrations.get(&leaf_id) {
                reg.condition.on_device_event(&event);
                queue.push(leaf_id);
            }
        }

        // Breadth-first propagation with no de-duplication: a node reachable through two
        // distinct paths is legitimately re-evaluated once per path, matching the source engine.
        while let Some(id) = queue.pop() {
            self.process_condition_change(&mut inner, id).await;
            if let Some(parents) = inner.parents.get(&id) {
                queue.extend(parents.iter().copied());
            }
        }
    }

    async fn process_condition_change(&self, inner: &mut EngineInner, id: InstanceId) {
        let Some(condition) = inner.registrations.get(&id).map(|r| r.condition.clone()) else {
            return;
        };
        let raw = condition.evaluate();
        let previous = inner.registrations[&id].state;

        if let Some(audit) = self.audit.lock().clone() {
            audit.log_event(
                AuditEvent::new(EventType::Device, EventSubtype::ConditionEvaluated)
                    .with_detail(format!("{id}={raw}")),
            );
        }

        let duration = condition.duration();
        let next = match (previous, raw) {
            // A condition that had already fired once satisfied its timeout regardless of later
            // reverting back to false, so the timeout timer is cancelled (it should already have
            // been, on the earlier True transition -- this is belt-and-suspenders).
            (ConditionState::True, false) => {
                self.duration_timers.cancel(id);
                self.timeout_timers.cancel(id);
                ConditionState::False
            }
            // Reverting out of `DurationPending` without ever reaching `True` only cancels the
            // duration timer; the registration-time timeout keeps counting down so a condition
            // that repeatedly flickers true-then-false-before-debouncing still gets abandoned
            // once its overall time budget runs out.
            (ConditionState::DurationPending, false) => {
                self.duration_timers.cancel(id);
                ConditionState::False
            }
            (ConditionState::False, true) => match duration {
                Some(d) if !d.is_zero() => {
                    self.schedule_duration(id, d);
                    ConditionState::DurationPending
                }
                _ => {
                    self.timeout_timers.cancel(id);
                    ConditionState::True
                }
            },
            (ConditionState::DurationPending, true) => ConditionState::DurationPending,
            (ConditionState::True, true) => ConditionState::True,
            (ConditionState::False, false) => ConditionState::False,
        };

        if next != previous {
            if let Some(reg) = inner.registrations.get_mut(&id) {
                reg.state = next;
            }
            debug!(condition_id = %id, ?previous, ?next, "condition state transition");
        }

        // Parents re-derive their own truth value from every child evaluation, not only ones
        // that flip this node's state -- a parent whose own evaluation depends on raw values
        // besides this child's state (e.g. boolean combinators resampling siblings) still needs
        // the chance to recompute on every settle, matching the source engine's propagation.
        self.notify_parents(inner, id, next.as_bool());

        if next != previous && next == ConditionState::True {
            self.fire_notifier(inner, id).await;
        }
    }

    fn notify_parents(&self, inner: &EngineInner, id: InstanceId, value: bool) {
        if let Some(parents) = inner.parents.get(&id) {
            for parent_id in parents {
                if let Some(parent_reg) = inner.registrations.get(parent_id) {
                    parent_reg.condition.on_condition_event(id, value);
                }
            }
        }
    }

    async fn fire_notifier(&self, inner: &EngineInner, id: InstanceId) {
        if let Some(audit) = self.audit.lock().clone() {
            audit.log_event(
                AuditEvent::new(EventType::Device, EventSubtype::ConditionNowTrue)
                    .with_detail(id.to_string()),
            );
        }
        if let Some(notifier) = inner.registrations.get(&id).and_then(|r| r.notifier.clone()) {
            notifier.on_condition_true(id).await;
        }
    }

    fn schedule_duration(&self, id: InstanceId, delay: Duration) {
        let engine = self.self_weak.clone();
        self.duration_timers.start(
            id,
            delay,
            Arc::new(move |fired_id| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Some(engine) = engine.upgrade() {
                        engine.handle_duration_completion(fired_id).await;
                    }
                });
            }),
        );
    }

    /// Bound how long a condition may sit in `DurationPending` before it's abandoned and
    /// reverted to `False`. Distinct from the duration timer itself: duration defines how long
    /// the raw value must hold steady, timeout caps how long we're willing to wait for that to
    /// happen at all.
    fn schedule_timeout(&self, id: InstanceId, delay: Duration) {
        let engine = self.self_weak.clone();
        self.timeout_timers.start(
            id,
            delay,
            Arc::new(move |fired_id| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Some(engine) = engine.upgrade() {
                        engine.handle_condition_timeout(fired_id).await;
                    }
                });
            }),
        );
    }

    /// Bounds how long the engine will wait, from registration, for this condition to reach
    /// `True` -- whether it never leaves `False` at all, or gets stuck `DurationPending` because
    /// its debounce never finishes elapsing. Per the source engine's timeout path, this removes
    /// the condition (and dependent-free descendants) but never walks upward to parents; a
    /// parent composed of this subcondition simply continues observing it as permanently false.
    async fn handle_condition_timeout(self: Arc<Self>, id: InstanceId) {
        let (notifier, timed_out) = {
            let mut inner = self.inner.lock().await;
            let Some(reg) = inner.registrations.get(&id) else {
                return;
            };
            if reg.state == ConditionState::True {
                return;
            }
            let notifier = reg.notifier.clone();
            self.notify_parents(&inner, id, false);
            self.unregister_recursive(&mut inner, id);
            (notifier, true)
        };
        if !timed_out {
            return;
        }
        warn!(condition_id = %id, "condition timed out before becoming true");
        if let Some(audit) = self.audit.lock().clone() {
            audit.log_event(
                AuditEvent::new(EventType::Device, EventSubtype::ConditionTimeout)
                    .with_detail(id.to_string()),
            );
        }
        if let Some(notifier) = notifier {
            notifier.on_condition_timeout(id).await;
        }
    }

    async fn handle_duration_completion(self: Arc<Self>, id: InstanceId) {
        let mut inner = self.inner.lock().await;
        let Some(reg) = inner.registrations.get(&id) else {
            return;
        };
        if reg.state != ConditionState::DurationPending {
            return;
        }
        if !reg.condition.evaluate() {
            return;
        }
        if let Some(reg) = inner.registrations.get_mut(&id) {
            reg.state = ConditionState::True;
        }
        self.timeout_timers.cancel(id);
        debug!(condition_id = %id, "duration elapsed, condition promoted to true");
        self.notify_parents(&inner, id, true);
        self.fire_notifier(&inner, id).await;

        let mut queue: Vec<InstanceId> = inner.parents.get(&id).cloned().unwrap_or_default();
        while let Some(parent_id) = queue.pop() {
            self.process_condition_change(&mut inner, parent_id).await;
            if let Some(parents) = inner.parents.get(&parent_id) {
                queue.extend(parents.iter().copied());
            }
        }
    }

    pub fn is_user_error(err: &HearthError) -> bool {
        err.is_user_fault()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{BooleanOp, ComparisonOp};
    use crate::config::HearthConfig;
    use crate::device::InMemoryDeviceIo;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingNotifier {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ConditionNotifier for CountingNotifier {
        async fn on_condition_true(&self, _instance_id: InstanceId) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_simple_condition_fires_on_matching_event() {
        let io: SharedDeviceIo = Arc::new(InMemoryDeviceIo::new());
        let engine = RuleEngine::new(io.clone(), &HearthConfig::default());
        let condition = crate::condition::ConditionNode::static_attribute(
            1,
            "switch",
            ComparisonOp::Eq,
            json!("on"),
        );
        let fire_count = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(CountingNotifier { count: fire_count.clone() });
        let initial = engine
            .add_condition(condition.clone(), Some(notifier))
            .await
            .unwrap();
        assert_eq!(initial, ConditionState::False);

        engine
            .on_device_event(DeviceEvent::new(1, "switch", json!("on")))
            .await;
        assert_eq!(
            engine.get_condition_state(condition.instance_id()).await,
            Some(ConditionState::True)
        );
        assert_eq!(fire_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_debounce_delays_true_transition() {
        let io: SharedDeviceIo = Arc::new(InMemoryDeviceIo::new());
        let engine = RuleEngine::new(io.clone(), &HearthConfig::default());
        let condition =
            crate::condition::ConditionNode::static_attribute(1, "motion", ComparisonOp::Eq, json!(true));
        condition.set_duration(Some(Duration::from_millis(30)));
        engine.add_condition(condition.clone(), None).await.unwrap();

        engine
            .on_device_event(DeviceEvent::new(1, "motion", json!(true)))
            .await;
        assert_eq!(
            engine.get_condition_state(condition.instance_id()).await,
            Some(ConditionState::DurationPending)
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(
            engine.get_condition_state(condition.instance_id()).await,
            Some(ConditionState::True)
        );
    }

    #[tokio::test]
    async fn test_debounce_reverts_if_value_flips_back_before_elapsing() {
        let io: SharedDeviceIo = Arc::new(InMemoryDeviceIo::new());
        let engine = RuleEngine::new(io.clone(), &HearthConfig::default());
        let condition =
            crate::condition::ConditionNode::static_attribute(1, "motion", ComparisonOp::Eq, json!(true));
        condition.set_duration(Some(Duration::from_millis(50)));
        engine.add_condition(condition.clone(), None).await.unwrap();

        engine
            .on_device_event(DeviceEvent::new(1, "motion", json!(true)))
            .await;
        engine
            .on_device_event(DeviceEvent::new(1, "motion", json!(false)))
            .await;
        assert_eq!(
            engine.get_condition_state(condition.instance_id()).await,
            Some(ConditionState::False)
        );
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(
            engine.get_condition_state(condition.instance_id()).await,
            Some(ConditionState::False)
        );
    }

    #[tokio::test]
    async fn test_boolean_and_over_two_devices_propagates() {
        let io: SharedDeviceIo = Arc::new(InMemoryDeviceIo::new());
        let engine = RuleEngine::new(io.clone(), &HearthConfig::default());
        let a = crate::condition::ConditionNode::static_attribute(1, "switch", ComparisonOp::Eq, json!("on"));
        let b = crate::condition::ConditionNode::static_attribute(2, "switch", ComparisonOp::Eq, json!("on"));
        let root = crate::condition::ConditionNode::boolean(BooleanOp::And, vec![a, b]).unwrap();
        let root_id = root.instance_id();

        engine.add_condition(root.clone(), None).await.unwrap();
        engine
            .on_device_event(DeviceEvent::new(1, "switch", json!("on")))
            .await;
        assert_eq!(engine.get_condition_state(root_id).await, Some(ConditionState::False));

        engine
            .on_device_event(DeviceEvent::new(2, "switch", json!("on")))
            .await;
        assert_eq!(engine.get_condition_state(root_id).await, Some(ConditionState::True));
    }

    #[tokio::test]
    async fn test_timeout_abandons_pending_duration_before_it_elapses() {
        let io: SharedDeviceIo = Arc::new(InMemoryDeviceIo::new());
        let engine = RuleEngine::new(io.clone(), &HearthConfig::default());
        let condition =
            crate::condition::ConditionNode::static_attribute(1, "motion", ComparisonOp::Eq, json!(true));
        condition.set_duration(Some(Duration::from_millis(100)));
        condition.set_timeout(Some(Duration::from_millis(20)));
        engine.add_condition(condition.clone(), None).await.unwrap();

        engine
            .on_device_event(DeviceEvent::new(1, "motion", json!(true)))
            .await;
        assert_eq!(
            engine.get_condition_state(condition.instance_id()).await,
            Some(ConditionState::DurationPending)
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            engine.get_condition_state(condition.instance_id()).await,
            None,
            "condition should have been removed once its timeout elapsed"
        );

        // the duration timer should have been cancelled by the timeout, so waiting past its
        // original deadline must not resurrect the (now-removed) condition.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(engine.get_condition_state(condition.instance_id()).await, None);
    }

    #[tokio::test]
    async fn test_plain_timeout_with_no_duration_fires_without_any_dispatch() {
        // Spec scenario: a condition with only a `timeout` (no `duration`) that never becomes
        // true on its own must still be abandoned and removed once the timeout elapses, even
        // without any device event ever arriving.
        let io: SharedDeviceIo = Arc::new(InMemoryDeviceIo::new());
        let engine = RuleEngine::new(io.clone(), &HearthConfig::default());
        let condition =
            crate::condition::ConditionNode::static_attribute(1, "switch", ComparisonOp::Eq, json!("on"));
        condition.set_timeout(Some(Duration::from_millis(30)));

        let timed_out = Arc::new(AtomicUsize::new(0));
        struct TimeoutNotifier {
            count: Arc<AtomicUsize>,
        }
        #[async_trait]
        impl ConditionNotifier for TimeoutNotifier {
            async fn on_condition_true(&self, _instance_id: InstanceId) {}
            async fn on_condition_timeout(&self, _instance_id: InstanceId) {
                self.count.fetch_add(1, Ordering::SeqCst);
            }
        }

        let id = condition.instance_id();
        let notifier = Arc::new(TimeoutNotifier { count: timed_out.clone() });
        let state = engine.add_condition(condition, Some(notifier)).await.unwrap();
        assert_eq!(state, ConditionState::False);
        assert_eq!(
            engine.get_condition_state(id).await,
            Some(ConditionState::False)
        );

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(timed_out.load(Ordering::SeqCst), 1);
        assert_eq!(engine.get_condition_state(id).await, None);
    }
}
