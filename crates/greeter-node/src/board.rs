//! Public record of accepted greetings.
//!
//! Events carry what the signal revealed (message, nullifier hash, scope,
//! root) and nothing that links back to a member. Sequences are dense and
//! start at zero for the lifetime of the board.

use crate::storage::NullifierRecord;
use greeter_types::{ExternalNullifier, MerkleRoot, NullifierHash};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetingEvent {
    pub sequence: u64,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub message: Vec<u8>,
    pub nullifier_hash: NullifierHash,
    pub scope: ExternalNullifier,
    pub root: MerkleRoot,
    /// Unix milliseconds.
    pub accepted_at: i64,
}

impl GreetingEvent {
    pub fn message_lossy(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFrom {
    /// Only events published after subscribing.
    Now,
    /// Every event with a sequence number at or above this one.
    Sequence(u64),
}

struct BoardInner {
    history: RwLock<Vec<GreetingEvent>>,
    sender: broadcast::Sender<GreetingEvent>,
}

#[derive(Clone)]
pub struct GreetingBoard {
    inner: Arc<BoardInner>,
}

impl GreetingBoard {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(BoardInner {
                history: RwLock::new(Vec::new()),
                sender,
            }),
        }
    }

    /// Rebuilds history from accepted records, in the order given.
    pub fn from_records(records: &[NullifierRecord]) -> Self {
        let board = Self::new();
        for record in records {
            board.publish(record);
        }
        board
    }

    pub fn publish(&self, record: &NullifierRecord) -> GreetingEvent {
        let mut history = self.inner.history.write();
        let event = GreetingEvent {
            sequence: history.len() as u64,
            message: record.message.clone(),
            nullifier_hash: record.nullifier_hash,
            scope: record.scope,
            root: record.root,
            accepted_at: record.accepted_at,
        };
        history.push(event.clone());
        // No subscribers is fine.
        let _ = self.inner.sender.send(event.clone());
        event
    }

    pub fn subscribe(&self, start: StartFrom) -> Subscription {
        // Taken under the history lock so no publish falls between the two.
        let history = self.inner.history.read();
        let receiver = self.inner.sender.subscribe();
        let next = match start {
            StartFrom::Now => history.len() as u64,
            StartFrom::Sequence(n) => n,
        };
        Subscription {
            inner: Arc::clone(&self.inner),
            receiver,
            next,
        }
    }

    pub fn len(&self) -> u64 {
        self.inner.history.read().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, sequence: u64) -> Option<GreetingEvent> {
        self.inner.history.read().get(sequence as usize).cloned()
    }

    pub fn events(&self) -> Vec<GreetingEvent> {
        self.inner.history.read().clone()
    }
}

impl Default for GreetingBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Yields each event once, in sequence order, starting where it was asked to.
pub struct Subscription {
    inner: Arc<BoardInner>,
    receiver: broadcast::Receiver<GreetingEvent>,
    next: u64,
}

impl Subscription {
    /// Returns the next event without waiting.
    pub fn try_next(&mut self) -> Option<GreetingEvent> {
        let event = self.inner.history.read().get(self.next as usize).cloned()?;
        self.next += 1;
        Some(event)
    }

    /// Waits for the next event.
    pub async fn next(&mut self) -> Option<GreetingEvent> {
        loop {
            if let Some(event) = self.try_next() {
                return Some(event);
            }
            match self.receiver.recv().await {
                // History is authoritative; the channel only wakes us.
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.try_next(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(n: u8) -> NullifierRecord {
        NullifierRecord {
            scope: ExternalNullifier::from_bytes([1; 32]),
            nullifier_hash: NullifierHash::from_bytes([n; 32]),
            message: vec![n],
            root: MerkleRoot::from_bytes([2; 32]),
            accepted_at: n as i64,
        }
    }

    #[tokio::test]
    async fn test_subscribe_now_skips_history() {
        let board = GreetingBoard::new();
        board.publish(&record(0));
        board.publish(&record(1));

        let mut sub = board.subscribe(StartFrom::Now);
        assert!(sub.try_next().is_none());

        board.publish(&record(2));
        let event = sub.next().await.unwrap();
        assert_eq!(event.sequence, 2);
        assert_eq!(event.nullifier_hash, NullifierHash::from_bytes([2; 32]));
    }

    #[tokio::test]
    async fn test_subscribe_from_sequence_replays_once() {
        let board = GreetingBoard::new();
        for n in 0..3 {
            board.publish(&record(n));
        }

        let mut sub = board.subscribe(StartFrom::Sequence(1));
        board.publish(&record(3));

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(sub.next().await.unwrap().sequence);
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn test_waiter_woken_by_publish() {
        let board = GreetingBoard::new();
        let mut sub = board.subscribe(StartFrom::Now);

        let publisher = board.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish(&record(5));
        });

        let event = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.message, vec![5]);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_still_sees_everything() {
        let board = GreetingBoard::new();
        let mut sub = board.subscribe(StartFrom::Now);

        for n in 0..(CHANNEL_CAPACITY as u64 + 10) {
            board.publish(&record((n % 250) as u8));
        }

        for expected in 0..(CHANNEL_CAPACITY as u64 + 10) {
            assert_eq!(sub.next().await.unwrap().sequence, expected);
        }
    }

    #[test]
    fn test_rebuilt_from_records() {
        let records: Vec<_> = (0..4).map(record).collect();
        let board = GreetingBoard::from_records(&records);
        assert_eq!(board.len(), 4);
        assert_eq!(board.get(3).unwrap().accepted_at, 3);
        assert!(board.get(4).is_none());
    }
}
