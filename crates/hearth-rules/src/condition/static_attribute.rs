//! Compares a single device attribute against a literal value.

use parking_lot::Mutex;
use serde_json::Value;

use super::value::{coerce_value, compare_values, ComparisonOp};
use crate::device::{DeviceAttrs, DeviceEvent};

pub(crate) struct StaticAttributeState {
    device_id: i64,
    attr: String,
    op: ComparisonOp,
    literal: Value,
    current: Mutex<Value>,
}

impl StaticAttributeState {
    pub(crate) fn new(device_id: i64, attr: String, op: ComparisonOp, literal: Value) -> Self {
        Self {
            device_id,
            attr,
            op,
            literal,
            current: Mutex::new(Value::Null),
        }
    }

    pub(crate) fn identifier(&self) -> String {
        format!(
            "device({}).{} {} {}",
            self.device_id,
            self.attr,
            self.op.as_str(),
            self.literal
        )
    }

    pub(crate) fn device_ids(&self) -> Vec<i64> {
        vec![self.device_id]
    }

    pub(crate) fn on_device_event(&self, event: &DeviceEvent) {
        if event.device_id == self.device_id && event.attribute == self.attr {
            *self.current.lock() = coerce_value(&self.literal, &event.value);
        }
    }

    pub(crate) fn initialize(&self, attrs: &DeviceAttrs) -> bool {
        let raw = attrs
            .get(&self.device_id)
            .and_then(|m| m.get(&self.attr))
            .cloned()
            .unwrap_or(Value::Null);
        *self.current.lock() = coerce_value(&self.literal, &raw);
        self.evaluate()
    }

    pub(crate) fn evaluate(&self) -> bool {
        compare_values(self.op, &self.current.lock(), &self.literal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn attrs_with(device_id: i64, attr: &str, value: Value) -> DeviceAttrs {
        let mut inner = HashMap::new();
        inner.insert(attr.to_string(), value);
        let mut outer = DeviceAttrs::new();
        outer.insert(device_id, inner);
        outer
    }

    #[test]
    fn test_equality_against_string_literal() {
        let cond =
            StaticAttributeState::new(1, "switch".to_string(), ComparisonOp::Eq, Value::from("on"));
        assert!(!cond.initialize(&attrs_with(1, "switch", Value::from("off"))));
        cond.on_device_event(&DeviceEvent::new(1, "switch", Value::from("on")));
        assert!(cond.evaluate());
    }

    #[test]
    fn test_bool_coercion_from_wire_strings() {
        let cond = StaticAttributeState::new(1, "contact".to_string(), ComparisonOp::Eq, Value::from(true));
        cond.on_device_event(&DeviceEvent::new(1, "contact", Value::from("open")));
        assert!(cond.evaluate());
        cond.on_device_event(&DeviceEvent::new(1, "contact", Value::from("closed")));
        assert!(!cond.evaluate());
    }

    #[test]
    fn test_ordering_against_missing_value_is_false() {
        let cond = StaticAttributeState::new(1, "level".to_string(), ComparisonOp::Gt, Value::from(50));
        assert!(!cond.initialize(&DeviceAttrs::new()));
    }
}
