//! Device I/O facade.
//!
//! The hub HTTP client itself is out of scope for this crate; [`DeviceIo`] is the interface the
//! condition engine consumes, and [`InMemoryDeviceIo`] is a fake suitable for tests and local
//! development.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use hearth_common::{HearthError, Result};

/// A single device attribute change as delivered by the event ingress.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    pub device_id: i64,
    pub attribute: String,
    pub value: serde_json::Value,
}

impl DeviceEvent {
    pub fn new(device_id: i64, attribute: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            device_id,
            attribute: attribute.into(),
            value,
        }
    }
}

/// Bulk attribute snapshot: device id -> attribute name -> value.
pub type DeviceAttrs = HashMap<i64, HashMap<String, serde_json::Value>>;

/// Reads current attribute values and issues fire-and-forget commands against the hub.
///
/// Implementers MAY fall back to per-device queries when a bulk read for a given device is
/// unavailable; a missing device should yield an empty inner map rather than an error.
#[async_trait]
pub trait DeviceIo: Send + Sync {
    /// Fetch current attribute values for a set of devices in one round trip.
    async fn get_bulk_attributes(&self, device_ids: &[i64]) -> Result<DeviceAttrs>;

    /// Send a fire-and-forget command to a device. Errors are surfaced to the caller; the
    /// engine does not retry.
    async fn send_command(
        &self,
        device_id: i64,
        command: &str,
        args: Option<serde_json::Value>,
    ) -> Result<()>;
}

/// In-memory device registry backing [`DeviceIo`] for tests and local development.
#[derive(Default)]
pub struct InMemoryDeviceIo {
    attrs: DashMap<i64, HashMap<String, serde_json::Value>>,
    commands: DashMap<i64, Vec<(String, Option<serde_json::Value>)>>,
}

impl InMemoryDeviceIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed (or overwrite) the attribute table for a device.
    pub fn set_attributes(&self, device_id: i64, attrs: HashMap<String, serde_json::Value>) {
        self.attrs.insert(device_id, attrs);
    }

    /// Set a single attribute, as a device-event producer would.
    pub fn set_attribute(&self, device_id: i64, attr: impl Into<String>, value: serde_json::Value) {
        self.attrs
            .entry(device_id)
            .or_default()
            .insert(attr.into(), value);
    }

    /// Commands recorded for a device, in send order, for test assertions.
    pub fn commands_for(&self, device_id: i64) -> Vec<(String, Option<serde_json::Value>)> {
        self.commands
            .get(&device_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeviceIo for InMemoryDeviceIo {
    async fn get_bulk_attributes(&self, device_ids: &[i64]) -> Result<DeviceAttrs> {
        let mut out = DeviceAttrs::new();
        for device_id in device_ids {
            let entry = self
                .attrs
                .get(device_id)
                .map(|e| e.clone())
                .unwrap_or_default();
            out.insert(*device_id, entry);
        }
        Ok(out)
    }

    async fn send_command(
        &self,
        device_id: i64,
        command: &str,
        args: Option<serde_json::Value>,
    ) -> Result<()> {
        if command.is_empty() {
            return Err(HearthError::UserInput("command name must not be empty".into()));
        }
        self.commands
            .entry(device_id)
            .or_default()
            .push((command.to_string(), args));
        Ok(())
    }
}

/// Shared handle to a [`DeviceIo`] implementation.
pub type SharedDeviceIo = Arc<dyn DeviceIo>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_bulk_attributes_missing_device_is_empty() {
        let io = InMemoryDeviceIo::new();
        io.set_attribute(1, "switch", json!("on"));
        let attrs = io.get_bulk_attributes(&[1, 2]).await.unwrap();
        assert_eq!(attrs[&1]["switch"], json!("on"));
        assert!(attrs[&2].is_empty());
    }

    #[tokio::test]
    async fn test_send_command_records_and_rejects_empty() {
        let io = InMemoryDeviceIo::new();
        io.send_command(1, "on", None).await.unwrap();
        assert_eq!(io.commands_for(1), vec![("on".to_string(), None)]);
        assert!(io.send_command(1, "", None).await.is_err());
    }
}
