//! Append-only event ledger
//!
//! Alerts are recorded through the [`Ledger`] port. The in-memory
//! implementation chains SHA-256 digests so tampering with any recorded
//! event breaks verification of everything after it.

use crate::events::TelemetryEvent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Digest the first entry chains from
pub const GENESIS_DIGEST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Proof that an event was appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub sequence: u64,
    pub digest: String,
    pub previous_digest: String,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn record(&self, event: &TelemetryEvent) -> Result<LedgerReceipt>;
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    receipt: LedgerReceipt,
    payload: String,
}

/// Entries kept by [`InMemoryLedger::new`]
pub const DEFAULT_LEDGER_RETENTION: usize = 10_000;

#[derive(Debug)]
struct LedgerState {
    entries: VecDeque<LedgerEntry>,
    next_sequence: u64,
    head: String,
}

/// Hash-chained ledger held in memory.
///
/// Only the newest `retention` entries are kept. Older ones are evicted
/// FIFO; the chain continues from the evicted head, and [`verify`] checks
/// the retained suffix.
///
/// [`verify`]: InMemoryLedger::verify
#[derive(Debug)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    retention: usize,
}

fn chain_digest(previous: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::with_retention(DEFAULT_LEDGER_RETENTION)
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                entries: VecDeque::new(),
                next_sequence: 0,
                head: GENESIS_DIGEST.to_string(),
            }),
            retention: retention.max(1),
        }
    }

    /// Number of retained entries
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Total events recorded, including evicted ones
    pub async fn recorded(&self) -> u64 {
        self.state.lock().await.next_sequence
    }

    pub async fn receipts(&self) -> Vec<LedgerReceipt> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .map(|entry| entry.receipt.clone())
            .collect()
    }

    /// Re-walk the retained chain; true if every digest matches its payload
    /// and predecessor and sequences are contiguous
    pub async fn verify(&self) -> bool {
        let state = self.state.lock().await;
        let Some(first) = state.entries.front() else {
            return true;
        };
        let mut previous = first.receipt.previous_digest.clone();
        let mut sequence = first.receipt.sequence;

        for entry in &state.entries {
            if entry.receipt.sequence != sequence || entry.receipt.previous_digest != previous {
                return false;
            }
            if chain_digest(&previous, &entry.payload) != entry.receipt.digest {
                return false;
            }
            previous = entry.receipt.digest.clone();
            sequence += 1;
        }
        previous == state.head
    }

    #[cfg(test)]
    async fn tamper(&self, index: usize, payload: &str) {
        if let Some(entry) = self.state.lock().await.entries.get_mut(index) {
            entry.payload = payload.to_string();
        }
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn record(&self, event: &TelemetryEvent) -> Result<LedgerReceipt> {
        let payload = serde_json::to_string(event).context("Failed to serialize ledger event")?;

        let mut state = self.state.lock().await;
        let previous_digest = state.head.clone();
        let receipt = LedgerReceipt {
            sequence: state.next_sequence,
            digest: chain_digest(&previous_digest, &payload),
            previous_digest,
            recorded_at: Utc::now(),
        };

        state.head = receipt.digest.clone();
        state.next_sequence += 1;
        if state.entries.len() >= self.retention {
            state.entries.pop_front();
        }
        state.entries.push_back(LedgerEntry {
            receipt: receipt.clone(),
            payload,
        });
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HealthChange;
    use crate::models::DeviceStatus;
    use tokio_test::assert_ok;

    fn event(device_id: &str) -> TelemetryEvent {
        TelemetryEvent::HealthChanged(HealthChange {
            device_id: device_id.to_string(),
            previous: DeviceStatus::Online,
            current: DeviceStatus::Error,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_empty_ledger_verifies() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.is_empty().await);
        assert!(ledger.verify().await);
    }

    #[tokio::test]
    async fn test_receipts_chain() {
        let ledger = InMemoryLedger::new();
        let first = assert_ok!(ledger.record(&event("a")).await);
        let second = assert_ok!(ledger.record(&event("b")).await);

        assert_eq!(first.sequence, 0);
        assert_eq!(first.previous_digest, GENESIS_DIGEST);
        assert_eq!(first.digest.len(), 64);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.previous_digest, first.digest);
        assert_ne!(first.digest, second.digest);

        assert_eq!(ledger.len().await, 2);
        assert!(ledger.verify().await);
        assert_eq!(ledger.receipts().await, vec![first, second]);
    }

    #[tokio::test]
    async fn test_tampering_breaks_verification() {
        let ledger = InMemoryLedger::new();
        for id in ["a", "b", "c"] {
            ledger.record(&event(id)).await.unwrap();
        }
        assert!(ledger.verify().await);

        ledger.tamper(1, "{}").await;
        assert!(!ledger.verify().await);
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest_and_keeps_chain() {
        let ledger = InMemoryLedger::with_retention(2);
        let mut receipts = Vec::new();
        for id in ["a", "b", "c", "d"] {
            receipts.push(assert_ok!(ledger.record(&event(id)).await));
        }

        assert_eq!(ledger.len().await, 2);
        assert_eq!(ledger.recorded().await, 4);
        assert_eq!(ledger.receipts().await, receipts[2..].to_vec());
        assert_eq!(receipts[3].sequence, 3);
        assert_eq!(receipts[2].previous_digest, receipts[1].digest);
        assert!(ledger.verify().await);

        ledger.tamper(0, "{}").await;
        assert!(!ledger.verify().await);
    }
}
