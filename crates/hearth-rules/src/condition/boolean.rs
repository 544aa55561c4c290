//! Combines other conditions with `and`, `or`, or `not`.

use parking_lot::Mutex;
use std::collections::HashMap;

use hearth_common::{HearthError, Result};

use super::value::BooleanOp;
use super::Condition;
use crate::instance_id::InstanceId;

pub(crate) struct BooleanState {
    op: BooleanOp,
    children: Vec<Condition>,
    child_states: Mutex<HashMap<InstanceId, bool>>,
}

impl BooleanState {
    pub(crate) fn new(op: BooleanOp, children: Vec<Condition>) -> Result<Self> {
        if op == BooleanOp::Not && children.len() != 1 {
            return Err(HearthError::UserInput(format!(
                "'not' requires exactly one subcondition, got {}",
                children.len()
            )));
        }
        if children.is_empty() {
            return Err(HearthError::UserInput(
                "boolean condition requires at least one subcondition".into(),
            ));
        }
        let child_states = children.iter().map(|c| (c.instance_id(), false)).collect();
        Ok(Self {
            op,
            children,
            child_states: Mutex::new(child_states),
        })
    }

    pub(crate) fn identifier(&self) -> String {
        let parts: Vec<String> = self.children.iter().map(|c| c.identifier()).collect();
        format!("({} {})", self.op.as_str(), parts.join(" "))
    }

    pub(crate) fn subconditions(&self) -> &[Condition] {
        &self.children
    }

    /// Record a child's latest evaluated state. Called by the engine as children settle.
    pub(crate) fn set_child_state(&self, child: InstanceId, value: bool) {
        self.child_states.lock().insert(child, value);
    }

    pub(crate) fn evaluate(&self) -> bool {
        let states = self.child_states.lock();
        match self.op {
            BooleanOp::And => states.values().all(|v| *v),
            BooleanOp::Or => states.values().any(|v| *v),
            BooleanOp::Not => !states.values().next().copied().unwrap_or(false),
        }
    }
}
