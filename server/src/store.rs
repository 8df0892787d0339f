use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::{Error, Result};
use crate::metrics::DEVICES_TOTAL;
use crate::model::DeviceRecord;

/// How a new reading combines with what a device already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorePolicy {
    /// Keep only the most recent reading.
    Overwrite,
    /// Keep every reading in arrival order.
    #[default]
    Append,
}

impl FromStr for StorePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" | "latest" => Ok(StorePolicy::Overwrite),
            "append" | "history" => Ok(StorePolicy::Append),
            other => Err(format!("unknown store policy '{}'", other)),
        }
    }
}

impl fmt::Display for StorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorePolicy::Overwrite => f.write_str("overwrite"),
            StorePolicy::Append => f.write_str("append"),
        }
    }
}

/// Sensor readings keyed by device ID.
#[derive(Debug)]
pub struct DeviceStore {
    policy: StorePolicy,
    devices: DashMap<String, DeviceRecord>,
}

impl DeviceStore {
    pub fn new(policy: StorePolicy) -> Self {
        Self {
            policy,
            devices: DashMap::new(),
        }
    }

    pub fn policy(&self) -> StorePolicy {
        self.policy
    }

    pub fn put(&self, device_id: &str, sensor_data: Map<String, Value>) {
        let value = Value::Object(sensor_data);
        let mut created = false;

        match self.policy {
            StorePolicy::Overwrite => {
                created = self
                    .devices
                    .insert(device_id.to_string(), DeviceRecord::Latest(value))
                    .is_none();
            }
            StorePolicy::Append => {
                let mut entry = self.devices.entry(device_id.to_string()).or_insert_with(|| {
                    created = true;
                    DeviceRecord::History(Vec::new())
                });
                match entry.value_mut() {
                    DeviceRecord::History(history) => history.push(value),
                    // Only reachable if the policy changed under a live map.
                    latest => *latest = DeviceRecord::History(vec![value]),
                }
            }
        }

        if created {
            DEVICES_TOTAL.set(self.devices.len() as f64);
            debug!("First reading stored for device {}", device_id);
        }
    }

    pub fn get(&self, device_id: &str) -> Result<DeviceRecord> {
        self.devices
            .get(device_id)
            .map(|record| record.value().clone())
            .ok_or(Error::NotFound("Device data not found"))
    }

    /// Number of devices that have written at least once.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
