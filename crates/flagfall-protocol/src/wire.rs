use rmp_serde::{decode, encode};
use thiserror::Error;

use crate::{Command, Event, LogEntry, ReplayFile, Snapshot};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn serialize_command(cmd: &Command) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(cmd)?)
}

pub fn deserialize_command(bytes: &[u8]) -> Result<Command, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_events(events: &[Event]) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(events)?)
}

pub fn deserialize_events(bytes: &[u8]) -> Result<Vec<Event>, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(snapshot)?)
}

pub fn deserialize_snapshot(bytes: &[u8]) -> Result<Snapshot, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_replay(replay: &ReplayFile) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(replay)?)
}

pub fn deserialize_replay(bytes: &[u8]) -> Result<ReplayFile, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_log(entries: &[LogEntry]) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(entries)?)
}

pub fn deserialize_log(bytes: &[u8]) -> Result<Vec<LogEntry>, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_command_json(cmd: &Command) -> Result<String, WireError> {
    Ok(serde_json::to_string(cmd)?)
}

pub fn deserialize_command_json(json: &str) -> Result<Command, WireError> {
    Ok(serde_json::from_str(json)?)
}

pub fn serialize_snapshot_json(snapshot: &Snapshot) -> Result<String, WireError> {
    Ok(serde_json::to_string(snapshot)?)
}

pub fn deserialize_snapshot_json(json: &str) -> Result<Snapshot, WireError> {
    Ok(serde_json::from_str(json)?)
}

pub fn serialize_replay_json(replay: &ReplayFile) -> Result<String, WireError> {
    Ok(serde_json::to_string(replay)?)
}

pub fn deserialize_replay_json(json: &str) -> Result<ReplayFile, WireError> {
    Ok(serde_json::from_str(json)?)
}

/// Deterministic snapshot hash for desync detection and replay verification.
///
/// Hashes the MessagePack-serialized snapshot using FNV-1a 64-bit.
pub fn snapshot_hash(snapshot: &Snapshot) -> Result<u64, WireError> {
    let bytes = serialize_snapshot(snapshot)?;
    Ok(hash_bytes_fnv1a64(&bytes))
}

/// Deterministic, stable 64-bit hash for raw bytes (FNV-1a).
pub fn hash_bytes_fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coord, MineKind, PlayerId, UnitId};

    #[test]
    fn command_roundtrip_msgpack() {
        let cmd = Command::PlaceMine {
            unit: UnitId(3),
            at: Coord::new(2, 9),
            kind: MineKind::Chain,
        };
        let bytes = serialize_command(&cmd).unwrap();
        let back = deserialize_command(&bytes).unwrap();
        match back {
            Command::PlaceMine { unit, at, kind } => {
                assert_eq!(unit, UnitId(3));
                assert_eq!(at, Coord::new(2, 9));
                assert_eq!(kind, MineKind::Chain);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn command_json_is_tagged() {
        let cmd = Command::SkipTurn {
            player: PlayerId::ONE,
        };
        let json = serialize_command_json(&cmd).unwrap();
        assert!(json.contains("\"type\":\"SkipTurn\""));
        deserialize_command_json(&json).unwrap();
    }

    #[test]
    fn fnv_hash_is_stable() {
        assert_eq!(hash_bytes_fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(hash_bytes_fnv1a64(b"a"), hash_bytes_fnv1a64(b"a"));
        assert_ne!(hash_bytes_fnv1a64(b"a"), hash_bytes_fnv1a64(b"b"));
    }
}
