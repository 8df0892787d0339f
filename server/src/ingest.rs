use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::metrics::{READINGS_REJECTED_TOTAL, READINGS_TOTAL};
use crate::model::Reading;
use crate::registry::SchemaRegistry;
use crate::store::DeviceStore;
use crate::validate::validate_object;

/// Whether readings are checked against the schema registry before storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestValidation {
    /// Store everything; validation is left to the sending client.
    #[default]
    Off,
    /// Validate readings that name a `message_type`, store the rest as-is.
    Tagged,
    /// Every reading must name a `message_type` and pass validation.
    Required,
}

impl FromStr for IngestValidation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(IngestValidation::Off),
            "tagged" => Ok(IngestValidation::Tagged),
            "required" | "strict" => Ok(IngestValidation::Required),
            other => Err(format!("unknown ingest validation mode '{}'", other)),
        }
    }
}

impl fmt::Display for IngestValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestValidation::Off => f.write_str("off"),
            IngestValidation::Tagged => f.write_str("tagged"),
            IngestValidation::Required => f.write_str("required"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    WebSocket,
}

impl Transport {
    pub fn label(self) -> &'static str {
        match self {
            Transport::Http => "http",
            Transport::WebSocket => "ws",
        }
    }
}

/// The one path every reading takes into the store, whatever it arrived on.
#[derive(Debug, Clone)]
pub struct Ingestor {
    registry: Arc<SchemaRegistry>,
    store: Arc<DeviceStore>,
    validation: IngestValidation,
}

impl Ingestor {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        store: Arc<DeviceStore>,
        validation: IngestValidation,
    ) -> Self {
        Self {
            registry,
            store,
            validation,
        }
    }

    pub fn validation(&self) -> IngestValidation {
        self.validation
    }

    pub fn ingest(&self, reading: Reading, transport: Transport) -> Result<()> {
        if let Err(e) = self.check(&reading) {
            READINGS_REJECTED_TOTAL.inc();
            warn!(
                "Rejected reading from {} over {}: {}",
                reading.device_id,
                transport.label(),
                e
            );
            return Err(e);
        }

        debug!(
            "Reading from {} over {} ({} fields)",
            reading.device_id,
            transport.label(),
            reading.sensor_data.len()
        );
        self.store.put(&reading.device_id, reading.sensor_data);
        READINGS_TOTAL.with_label_values(&[transport.label()]).inc();
        Ok(())
    }

    fn check(&self, reading: &Reading) -> Result<()> {
        let name = match (self.validation, reading.message_type.as_deref()) {
            (IngestValidation::Off, _) | (IngestValidation::Tagged, None) => return Ok(()),
            (IngestValidation::Required, None) => return Err(Error::MissingMessageType),
            (_, Some(name)) => name,
        };
        validate_object(self.registry.as_ref(), name, &reading.sensor_data)
    }
}
