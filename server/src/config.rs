use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::chunks::ChunkLimits;
use crate::ingest::IngestValidation;
use crate::store::StorePolicy;

/// Which origins may call the HTTP surface from a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

impl FromStr for CorsOrigins {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let origins: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if origins.is_empty() {
            return Err("no origins listed".to_string());
        }
        // A wildcard anywhere in the list opens every origin.
        if origins.iter().any(|o| o == "*") {
            return Ok(CorsOrigins::Any);
        }
        Ok(CorsOrigins::List(origins))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_addr: String,
    pub store_policy: StorePolicy,
    pub ingest_validation: IngestValidation,
    pub cors_origins: CorsOrigins,
    pub request_timeout: Duration,
    pub ws_idle_timeout: Duration,
    pub max_pending_packets: usize,
    pub max_chunks_per_packet: u32,
    pub max_packet_bytes: usize,
    pub packet_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let chunks = ChunkLimits::default();
        Self {
            http_addr: "0.0.0.0:8000".to_string(),
            store_policy: StorePolicy::Append,
            ingest_validation: IngestValidation::Off,
            cors_origins: CorsOrigins::Any,
            request_timeout: Duration::from_secs(30),
            ws_idle_timeout: Duration::from_secs(300),
            max_pending_packets: chunks.max_pending,
            max_chunks_per_packet: chunks.max_chunks,
            max_packet_bytes: chunks.max_packet_bytes,
            packet_ttl: chunks.packet_ttl,
        }
    }
}

impl Config {
    /// Reads settings from the environment; unset or unparseable variables
    /// fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            http_addr: env::var("HTTP_ADDR").unwrap_or(defaults.http_addr),
            store_policy: parse_var("STORE_POLICY", defaults.store_policy),
            ingest_validation: parse_var("INGEST_VALIDATION", defaults.ingest_validation),
            cors_origins: parse_var("CORS_ALLOWED_ORIGINS", defaults.cors_origins),
            request_timeout: Duration::from_secs(parse_var(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            ws_idle_timeout: Duration::from_secs(parse_var(
                "WS_IDLE_TIMEOUT_SECS",
                defaults.ws_idle_timeout.as_secs(),
            )),
            max_pending_packets: parse_var("MAX_PENDING_PACKETS", defaults.max_pending_packets),
            max_chunks_per_packet: parse_var(
                "MAX_CHUNKS_PER_PACKET",
                defaults.max_chunks_per_packet,
            ),
            max_packet_bytes: parse_var("MAX_PACKET_BYTES", defaults.max_packet_bytes),
            packet_ttl: Duration::from_secs(parse_var(
                "PACKET_TTL_SECS",
                defaults.packet_ttl.as_secs(),
            )),
        }
    }

    pub fn chunk_limits(&self) -> ChunkLimits {
        ChunkLimits {
            max_pending: self.max_pending_packets,
            max_chunks: self.max_chunks_per_packet,
            max_packet_bytes: self.max_packet_bytes,
            packet_ttl: self.packet_ttl,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => parse_or(name, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(name: &str, raw: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", name, raw, e);
            default
        }
    }
}
