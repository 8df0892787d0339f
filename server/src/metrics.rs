use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref READINGS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("hololens_readings_total", "Readings stored, by transport"),
        &["transport"]
    )
    .unwrap();
    pub static ref READINGS_REJECTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "hololens_readings_rejected_total",
        "Readings refused by ingest validation"
    ))
    .unwrap();
    pub static ref MESSAGE_TYPES_REGISTERED: Counter = Counter::with_opts(Opts::new(
        "hololens_message_types_registered_total",
        "Successful message type registrations"
    ))
    .unwrap();
    pub static ref MESSAGE_TYPES_TOTAL: Gauge = Gauge::with_opts(Opts::new(
        "hololens_message_types",
        "Message types currently registered"
    ))
    .unwrap();
    pub static ref DEVICES_TOTAL: Gauge = Gauge::with_opts(Opts::new(
        "hololens_devices",
        "Devices that have stored at least one reading"
    ))
    .unwrap();
    pub static ref WS_SESSIONS_ACTIVE: Gauge = Gauge::with_opts(Opts::new(
        "hololens_ws_sessions_active",
        "Open WebSocket sessions"
    ))
    .unwrap();
    pub static ref MALFORMED_FRAMES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "hololens_malformed_frames_total",
        "WebSocket frames that could not be decoded"
    ))
    .unwrap();
    pub static ref ECHOED_FRAMES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "hololens_echoed_frames_total",
        "WebSocket frames echoed back to the sender"
    ))
    .unwrap();
    pub static ref PACKETS_ASSEMBLED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "hololens_packets_assembled_total",
        "Chunked packets reassembled from all of their chunks"
    ))
    .unwrap();
    pub static ref PACKETS_EXPIRED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "hololens_packets_expired_total",
        "Partial packets dropped after going quiet"
    ))
    .unwrap();
    pub static ref PACKET_TRANSFER_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "hololens_packet_transfer_seconds",
            "Delay between a chunk's send timestamp and its receipt"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(READINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINGS_REJECTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MESSAGE_TYPES_REGISTERED.clone()))?;
    REGISTRY.register(Box::new(MESSAGE_TYPES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEVICES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WS_SESSIONS_ACTIVE.clone()))?;
    REGISTRY.register(Box::new(MALFORMED_FRAMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ECHOED_FRAMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PACKETS_ASSEMBLED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PACKETS_EXPIRED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PACKET_TRANSFER_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_after_init() {
        // The registry is process-global, so a second init from another test
        // would report AlreadyReg; either outcome leaves metrics registered.
        let _ = init_metrics();
        READINGS_TOTAL.with_label_values(&["http"]).inc();

        let text = gather_metrics();
        assert!(text.contains("hololens_readings_total"));
        assert!(text.contains("transport=\"http\""));
    }
}
