//! Fires when an underlying condition's truth value changes relative to the last time this
//! condition was evaluated.
//!
//! This mirrors a documented quirk of the source system's scene-change tracking: `evaluate` is
//! side-effecting and advances its own baseline each time it runs. The engine guarantees exactly
//! one `evaluate()` call per propagation cycle, which is what makes that safe.

use parking_lot::Mutex;

use super::Condition;

pub(crate) struct SceneChangeState {
    scene_name: String,
    underlying: Condition,
    current: Mutex<bool>,
    prev_state: Mutex<bool>,
}

impl SceneChangeState {
    pub(crate) fn new(scene_name: String, underlying: Condition) -> Self {
        Self {
            scene_name,
            underlying,
            current: Mutex::new(false),
            prev_state: Mutex::new(false),
        }
    }

    pub(crate) fn identifier(&self) -> String {
        format!("on_change(scene({}))", self.scene_name)
    }

    pub(crate) fn underlying(&self) -> &Condition {
        &self.underlying
    }

    /// Record the underlying condition's latest evaluated state.
    pub(crate) fn set_underlying_state(&self, value: bool) {
        *self.current.lock() = value;
    }

    /// Evaluate against the last recorded underlying state, then advance the baseline.
    /// Must be called at most once per propagation cycle.
    pub(crate) fn evaluate(&self) -> bool {
        let underlying_state = *self.current.lock();
        let mut prev = self.prev_state.lock();
        let fired = *prev != underlying_state;
        *prev = underlying_state;
        fired
    }
}
