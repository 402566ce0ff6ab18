//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode) as hash input
//! - Lossless JSON round-trips (timestamps as ISO-8601 strings)
//! - Memory safety (no unsafe code)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// SHA-256 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Previous-hash sentinel of the genesis block
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|e| crate::Error::InvalidHash(format!("{s}: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| crate::Error::InvalidHash(format!("{s}: expected 32 bytes")))?;
        Ok(Self(bytes))
    }

    /// First ten hex characters, as shown on the dashboard
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(10);
        s
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Tip of a replica's chain
///
/// `Empty` orders before every digest, and digests order by their bytes, so
/// `min` over tips is the lexicographically smallest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tip {
    /// Chain has no blocks
    Empty,
    /// Current hash of the last block
    Block(Hash),
}

impl Tip {
    /// Digest of the tip block, if any
    pub fn hash(&self) -> Option<Hash> {
        match self {
            Tip::Empty => None,
            Tip::Block(hash) => Some(*hash),
        }
    }

    /// True when the tip is the given digest
    pub fn is(&self, hash: &Hash) -> bool {
        matches!(self, Tip::Block(h) if h == hash)
    }
}

impl fmt::Display for Tip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tip::Empty => write!(f, "EMPTY"),
            Tip::Block(hash) => write!(f, "{hash}"),
        }
    }
}

/// Delivery stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Left the distribution center
    Departed,
    /// On the road
    InTransit,
    /// Reached the destination
    Arrived,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Departed => "departed",
            Stage::InTransit => "in_transit",
            Stage::Arrived => "arrived",
        };
        write!(f, "{s}")
    }
}

/// Risk assessment attached to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        write!(f, "{s}")
    }
}

/// Logistics event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Delivery identifier
    pub delivery_id: String,

    /// Origin distribution center
    pub origin: String,

    /// Destination
    pub destination: String,

    /// Delivery stage
    pub stage: Stage,

    /// Risk level
    pub risk: RiskLevel,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(
        delivery_id: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
        stage: Stage,
        risk: RiskLevel,
    ) -> Self {
        Self {
            delivery_id: delivery_id.into(),
            origin: origin.into(),
            destination: destination.into(),
            stage,
            risk,
            timestamp: Utc::now(),
        }
    }

    /// Replace the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Copy of this event with the destination rerouted and risk raised
    pub fn falsified(&self) -> Self {
        Self {
            destination: format!("{} (rerouted)", self.destination),
            risk: RiskLevel::High,
            ..self.clone()
        }
    }
}

/// Block payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Fixed payload of the genesis block
    Genesis,
    /// A single event
    Event(Event),
    /// An ordered batch of events
    Batch(Vec<Event>),
}

impl Payload {
    /// Create canonical bytes for hashing
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Deterministic serialization for hash recomputation
        bincode::serialize(self).expect("serialization cannot fail")
    }

    /// Events carried by this payload
    pub fn events(&self) -> &[Event] {
        match self {
            Payload::Genesis => &[],
            Payload::Event(event) => std::slice::from_ref(event),
            Payload::Batch(events) => events,
        }
    }

    /// Number of events
    pub fn event_count(&self) -> usize {
        self.events().len()
    }

    /// A payload that differs from this one in content
    pub fn falsified(&self) -> Self {
        match self {
            Payload::Genesis => Payload::Batch(Vec::new()),
            Payload::Event(event) => Payload::Event(event.falsified()),
            Payload::Batch(events) => match events.split_first() {
                Some((first, rest)) => {
                    let mut altered = vec![first.falsified()];
                    altered.extend_from_slice(rest);
                    Payload::Batch(altered)
                }
                None => Payload::Genesis,
            },
        }
    }
}

impl From<Event> for Payload {
    fn from(event: Event) -> Self {
        Payload::Event(event)
    }
}

impl From<Vec<Event>> for Payload {
    fn from(events: Vec<Event>) -> Self {
        Payload::Batch(events)
    }
}

/// Entry in a replica's chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain (0 = genesis)
    pub sequence: u64,

    /// Event content
    pub payload: Payload,

    /// Hash of the preceding block
    pub previous_hash: Hash,

    /// Hash of this block's contents
    pub current_hash: Hash,

    /// Token binding the hash to one proposal
    pub transaction_id: Uuid,
}

impl Block {
    /// Create a block with its hash computed from the given fields
    pub fn new(sequence: u64, payload: Payload, previous_hash: Hash, transaction_id: Uuid) -> Self {
        let current_hash = crate::crypto::hash_block(&payload, &transaction_id, &previous_hash);
        Self {
            sequence,
            payload,
            previous_hash,
            current_hash,
            transaction_id,
        }
    }

    /// Recompute the hash from the stored fields
    pub fn compute_hash(&self) -> Hash {
        crate::crypto::hash_block(&self.payload, &self.transaction_id, &self.previous_hash)
    }

    /// True when the stored hash matches recomputation
    pub fn is_intact(&self) -> bool {
        self.current_hash == self.compute_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event::new("100", "Depot_SP", "Center_MG", Stage::Departed, RiskLevel::Low)
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let hash = Hash::from_bytes([0xab; 32]);
        assert_eq!(Hash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert_eq!(hash.short(), "abababab".to_string() + "ab");
        assert!(Hash::from_hex("zz").is_err());
        assert!(Hash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_tip_ordering() {
        let low = Tip::Block(Hash::from_bytes([1u8; 32]));
        let high = Tip::Block(Hash::from_bytes([2u8; 32]));
        assert!(Tip::Empty < low);
        assert!(low < high);
        assert_eq!(Tip::Empty.to_string(), "EMPTY");
        assert!(low.is(&Hash::from_bytes([1u8; 32])));
        assert_eq!(Tip::Empty.hash(), None);
    }

    #[test]
    fn test_payload_events() {
        let event = sample_event();
        assert_eq!(Payload::Genesis.event_count(), 0);
        assert_eq!(Payload::from(event.clone()).event_count(), 1);
        assert_eq!(Payload::from(vec![event.clone(), event]).event_count(), 2);
    }

    #[test]
    fn test_falsified_payload_differs() {
        let event = sample_event();
        for payload in [
            Payload::Genesis,
            Payload::Event(event.clone()),
            Payload::Batch(vec![event.clone(), event]),
            Payload::Batch(vec![]),
        ] {
            assert_ne!(payload.falsified(), payload);
        }
    }

    #[test]
    fn test_block_hash_matches_fields() {
        let block = Block::new(1, sample_event().into(), Hash::ZERO, Uuid::new_v4());
        assert!(block.is_intact());

        let mut altered = block.clone();
        altered.sequence = 7;
        // Sequence is not part of the hash input
        assert!(altered.is_intact());

        altered.payload = altered.payload.falsified();
        assert!(!altered.is_intact());
    }

    #[test]
    fn test_event_json_uses_iso_timestamps() {
        let event = sample_event();
        let json = serde_json::to_value(&event).unwrap();
        let ts = json["timestamp"].as_str().unwrap();
        assert_eq!(ts.parse::<DateTime<Utc>>().unwrap(), event.timestamp);
        assert_eq!(json["stage"], "departed");
    }
}
