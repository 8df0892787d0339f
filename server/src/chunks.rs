//! Reassembly of payloads that devices split across several WebSocket frames.
//!
//! A chunk packet looks like:
//!
//! ```json
//! {"packetId": "a1", "packetType": "vertices", "timestamp": "2026-01-01T00:00:00Z",
//!  "chunk": {"sequenceNumber": 1, "totalChunks": 3, "data": "[{\"x\":"}}
//! ```
//!
//! Sequence numbers run from 1 to `totalChunks`. Chunks may arrive in any
//! order; once every number has been seen the `data` strings are joined in
//! sequence order and handed back as one payload.
//!
//! Each session's buffer is bounded by [`ChunkLimits`]: how many packets may
//! be in flight, how many chunks and bytes one packet may hold, and how long
//! a packet may go without a new chunk before it is discarded.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Error, Result};
use crate::metrics::{PACKETS_ASSEMBLED_TOTAL, PACKETS_EXPIRED_TOTAL, PACKET_TRANSFER_SECONDS};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPacket {
    pub packet_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_type: Option<String>,
    pub chunk: Chunk,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub sequence_number: u32,
    pub total_chunks: u32,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkProgress {
    Partial { received: u32, total: u32 },
    Complete(AssembledPacket),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPacket {
    pub packet_id: String,
    pub packet_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Partial packets a session may hold at once.
    pub max_pending: usize,
    /// Largest `totalChunks` a packet may announce.
    pub max_chunks: u32,
    /// Chunk data bytes buffered for one packet.
    pub max_packet_bytes: usize,
    /// A partial packet with no new chunk for this long is dropped.
    pub packet_ttl: Duration,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_pending: 64,
            max_chunks: 4096,
            max_packet_bytes: 16 * 1024 * 1024,
            packet_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct PendingPacket {
    packet_type: Option<String>,
    total: u32,
    parts: BTreeMap<u32, String>,
    bytes: usize,
    last_seen: Instant,
    transfer_times: Vec<Duration>,
}

/// Per-session buffer of partially received packets.
#[derive(Debug)]
pub struct ChunkAssembler {
    limits: ChunkLimits,
    pending: HashMap<String, PendingPacket>,
}

impl ChunkAssembler {
    pub fn new(limits: ChunkLimits) -> Self {
        Self {
            limits,
            pending: HashMap::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn accept(&mut self, packet: ChunkPacket) -> Result<ChunkProgress> {
        self.accept_at(packet, Instant::now())
    }

    fn expire_stale(&mut self, now: Instant) {
        let ttl = self.limits.packet_ttl;
        let before = self.pending.len();
        self.pending.retain(|id, p| {
            let alive = now.saturating_duration_since(p.last_seen) < ttl;
            if !alive {
                debug!(
                    "Dropping packet {} after {:?} idle ({}/{} chunks)",
                    id,
                    ttl,
                    p.parts.len(),
                    p.total
                );
            }
            alive
        });
        let expired = before - self.pending.len();
        if expired > 0 {
            PACKETS_EXPIRED_TOTAL.inc_by(expired as f64);
        }
    }

    fn accept_at(&mut self, packet: ChunkPacket, now: Instant) -> Result<ChunkProgress> {
        self.expire_stale(now);

        let ChunkPacket {
            packet_id,
            packet_type,
            chunk,
            timestamp,
        } = packet;

        if chunk.total_chunks == 0 {
            return Err(Error::InvalidChunk(format!(
                "packet {} declares zero chunks",
                packet_id
            )));
        }
        if chunk.total_chunks > self.limits.max_chunks {
            return Err(Error::InvalidChunk(format!(
                "packet {} declares {} chunks (limit {})",
                packet_id, chunk.total_chunks, self.limits.max_chunks
            )));
        }
        if chunk.sequence_number == 0 || chunk.sequence_number > chunk.total_chunks {
            return Err(Error::InvalidChunk(format!(
                "sequence number {} outside 1..={} for packet {}",
                chunk.sequence_number, chunk.total_chunks, packet_id
            )));
        }

        let buffered = match self.pending.get(&packet_id) {
            Some(existing) if existing.total != chunk.total_chunks => {
                return Err(Error::InvalidChunk(format!(
                    "packet {} announced {} chunks, now {}",
                    packet_id, existing.total, chunk.total_chunks
                )));
            }
            // A retransmitted chunk replaces the earlier copy.
            Some(existing) => {
                existing.bytes
                    - existing
                        .parts
                        .get(&chunk.sequence_number)
                        .map_or(0, String::len)
            }
            None if self.pending.len() >= self.limits.max_pending => {
                return Err(Error::InvalidChunk(format!(
                    "too many partial packets (limit {})",
                    self.limits.max_pending
                )));
            }
            None => 0,
        };

        let bytes = buffered + chunk.data.len();
        if bytes > self.limits.max_packet_bytes {
            self.pending.remove(&packet_id);
            return Err(Error::InvalidChunk(format!(
                "packet {} exceeds {} buffered bytes and was dropped",
                packet_id, self.limits.max_packet_bytes
            )));
        }

        let entry = self
            .pending
            .entry(packet_id.clone())
            .or_insert_with(|| PendingPacket {
                packet_type: packet_type.clone(),
                total: chunk.total_chunks,
                parts: BTreeMap::new(),
                bytes: 0,
                last_seen: now,
                transfer_times: Vec::new(),
            });

        entry.bytes = bytes;
        entry.last_seen = now;
        if entry.packet_type.is_none() {
            entry.packet_type = packet_type;
        }
        if let Some(sent_at) = timestamp {
            if let Ok(delay) = (Utc::now() - sent_at).to_std() {
                PACKET_TRANSFER_SECONDS.observe(delay.as_secs_f64());
                entry.transfer_times.push(delay);
            }
        }
        entry.parts.insert(chunk.sequence_number, chunk.data);

        let received = entry.parts.len() as u32;
        if received < entry.total {
            return Ok(ChunkProgress::Partial {
                received,
                total: entry.total,
            });
        }

        let Some(done) = self.pending.remove(&packet_id) else {
            return Err(Error::InvalidChunk(format!("packet {} vanished", packet_id)));
        };
        if !done.transfer_times.is_empty() {
            let total: Duration = done.transfer_times.iter().sum();
            let average = total / done.transfer_times.len() as u32;
            debug!(
                "Packet {} average chunk transfer time: {:.3} ms",
                packet_id,
                average.as_secs_f64() * 1000.0
            );
        }
        PACKETS_ASSEMBLED_TOTAL.inc();

        Ok(ChunkProgress::Complete(AssembledPacket {
            packet_id,
            packet_type: done.packet_type,
            data: done.parts.into_values().collect(),
        }))
    }
}
