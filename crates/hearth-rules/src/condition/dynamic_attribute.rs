//! Compares two device attributes against each other, with no coercion applied to either side.

use parking_lot::Mutex;
use serde_json::Value;

use super::value::{compare_values, ComparisonOp};
use crate::device::{DeviceAttrs, DeviceEvent};

pub(crate) struct DynamicAttributeState {
    left: (i64, String),
    right: (i64, String),
    op: ComparisonOp,
    left_value: Mutex<Value>,
    right_value: Mutex<Value>,
}

impl DynamicAttributeState {
    pub(crate) fn new(left: (i64, String), right: (i64, String), op: ComparisonOp) -> Self {
        Self {
            left,
            right,
            op,
            left_value: Mutex::new(Value::Null),
            right_value: Mutex::new(Value::Null),
        }
    }

    pub(crate) fn identifier(&self) -> String {
        format!(
            "device({}).{} {} device({}).{}",
            self.left.0,
            self.left.1,
            self.op.as_str(),
            self.right.0,
            self.right.1
        )
    }

    pub(crate) fn device_ids(&self) -> Vec<i64> {
        vec![self.left.0, self.right.0]
    }

    pub(crate) fn on_device_event(&self, event: &DeviceEvent) {
        if event.device_id == self.left.0 && event.attribute == self.left.1 {
            *self.left_value.lock() = event.value.clone();
        }
        if event.device_id == self.right.0 && event.attribute == self.right.1 {
            *self.right_value.lock() = event.value.clone();
        }
    }

    pub(crate) fn initialize(&self, attrs: &DeviceAttrs) -> bool {
        let left = attrs
            .get(&self.left.0)
            .and_then(|m| m.get(&self.left.1))
            .cloned()
            .unwrap_or(Value::Null);
        let right = attrs
            .get(&self.right.0)
            .and_then(|m| m.get(&self.right.1))
            .cloned()
            .unwrap_or(Value::Null);
        *self.left_value.lock() = left;
        *self.right_value.lock() = right;
        self.evaluate()
    }

    pub(crate) fn evaluate(&self) -> bool {
        compare_values(self.op, &self.left_value.lock(), &self.right_value.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn attrs_with(entries: &[(i64, &str, Value)]) -> DeviceAttrs {
        let mut out = DeviceAttrs::new();
        for (device_id, attr, value) in entries {
            out.entry(*device_id)
                .or_insert_with(HashMap::new)
                .insert(attr.to_string(), value.clone());
        }
        out
    }

    #[test]
    fn test_equal_when_both_sides_match() {
        let cond = DynamicAttributeState::new(
            (1, "target".to_string()),
            (2, "level".to_string()),
            ComparisonOp::Eq,
        );
        let fired = cond.initialize(&attrs_with(&[
            (1, "target", Value::from(70)),
            (2, "level", Value::from(70)),
        ]));
        assert!(fired);
    }

    #[test]
    fn test_updates_independently_per_side() {
        let cond = DynamicAttributeState::new(
            (1, "target".to_string()),
            (2, "level".to_string()),
            ComparisonOp::Lt,
        );
        cond.initialize(&attrs_with(&[
            (1, "target", Value::from(10)),
            (2, "level", Value::from(10)),
        ]));
        assert!(!cond.evaluate());
        cond.on_device_event(&DeviceEvent::new(2, "level", Value::from(20)));
        assert!(cond.evaluate());
    }
}
