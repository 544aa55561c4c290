//! Fires once when an attribute's value differs from the value it had at registration.

use parking_lot::Mutex;
use serde_json::Value;

use crate::device::{DeviceAttrs, DeviceEvent};

pub(crate) struct AttributeChangeState {
    device_id: i64,
    attr: String,
    previous: Mutex<Option<Value>>,
    current: Mutex<Option<Value>>,
}

impl AttributeChangeState {
    pub(crate) fn new(device_id: i64, attr: String) -> Self {
        Self {
            device_id,
            attr,
            previous: Mutex::new(None),
            current: Mutex::new(None),
        }
    }

    pub(crate) fn identifier(&self) -> String {
        format!("on_change(device({}).{})", self.device_id, self.attr)
    }

    pub(crate) fn device_ids(&self) -> Vec<i64> {
        vec![self.device_id]
    }

    pub(crate) fn on_device_event(&self, event: &DeviceEvent) {
        if event.device_id == self.device_id && event.attribute == self.attr {
            *self.current.lock() = Some(event.value.clone());
        }
    }

    pub(crate) fn initialize(&self, attrs: &DeviceAttrs) -> bool {
        let initial = attrs
            .get(&self.device_id)
            .and_then(|m| m.get(&self.attr))
            .cloned();
        *self.previous.lock() = initial.clone();
        *self.current.lock() = initial;
        self.evaluate()
    }

    pub(crate) fn evaluate(&self) -> bool {
        *self.previous.lock() != *self.current.lock()
    }
}
