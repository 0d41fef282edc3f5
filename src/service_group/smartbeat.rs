// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::SmartbeatError;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wire length of an encoded smartbeat.
pub const SMARTBEAT_LEN: usize = 24;

/// A service heartbeat: send time plus an application checkpoint counter.
///
/// Encoded as three little-endian `u64`s: seconds, microseconds, checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Smartbeat {
    pub sec: u64,
    pub usec: u64,
    pub checkpoint: u64,
}

impl Smartbeat {
    pub fn new(sec: u64, usec: u64, checkpoint: u64) -> Self {
        Self {
            sec,
            usec,
            checkpoint,
        }
    }

    /// Stamp `checkpoint` with the current wall-clock time.
    pub fn now(checkpoint: u64) -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::new(elapsed.as_secs(), u64::from(elapsed.subsec_micros()), checkpoint)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, SmartbeatError> {
        if payload.len() < SMARTBEAT_LEN {
            return Err(SmartbeatError::Truncated {
                expected: SMARTBEAT_LEN,
                actual: payload.len(),
            });
        }
        let word = |index: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&payload[index * 8..index * 8 + 8]);
            u64::from_le_bytes(bytes)
        };
        Ok(Self::new(word(0), word(1), word(2)))
    }

    pub fn encode(&self) -> [u8; SMARTBEAT_LEN] {
        let mut out = [0u8; SMARTBEAT_LEN];
        out[..8].copy_from_slice(&self.sec.to_le_bytes());
        out[8..16].copy_from_slice(&self.usec.to_le_bytes());
        out[16..].copy_from_slice(&self.checkpoint.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reads_little_endian_fields() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1_700_000_000u64.to_le_bytes());
        payload.extend_from_slice(&250_000u64.to_le_bytes());
        payload.extend_from_slice(&42u64.to_le_bytes());

        let beat = Smartbeat::decode(&payload).unwrap();
        assert_eq!(beat, Smartbeat::new(1_700_000_000, 250_000, 42));
        assert_eq!(beat.encode().as_slice(), payload.as_slice());
    }

    #[test]
    fn test_decode_rejects_short_payloads() {
        assert_eq!(
            Smartbeat::decode(&[0u8; 10]),
            Err(SmartbeatError::Truncated {
                expected: 24,
                actual: 10
            })
        );
    }
}
