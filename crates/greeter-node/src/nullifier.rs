//! Seen-set of nullifier hashes, partitioned by scope.
//!
//! Each scope has its own async mutex. A submission holds it from the first
//! lookup until the record lands, so two signals with the same nullifier hash
//! can never both be admitted. Accepted nullifiers are never evicted; a scope
//! that was locked but never recorded into is dropped with its last guard.

use crate::storage::{NullifierRecord, NullifierStore};
use greeter_types::{Admission, ExternalNullifier, GreeterResult, MerkleRoot, NullifierHash};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

#[derive(Default)]
struct ScopeState {
    seen: HashMap<NullifierHash, NullifierRecord>,
}

pub struct NullifierRegistry {
    scopes: Mutex<HashMap<ExternalNullifier, Arc<AsyncMutex<ScopeState>>>>,
    store: Option<Arc<dyn NullifierStore>>,
    accepted: AtomicU64,
    repeats: AtomicU64,
}

/// Exclusive access to one scope's seen-set.
pub struct ScopeGuard<'a> {
    registry: &'a NullifierRegistry,
    scope: ExternalNullifier,
    state: OwnedMutexGuard<ScopeState>,
}

impl ScopeGuard<'_> {
    pub fn scope(&self) -> &ExternalNullifier {
        &self.scope
    }

    pub fn is_seen(&self, nullifier_hash: &NullifierHash) -> bool {
        self.state.seen.contains_key(nullifier_hash)
    }

    /// Moves `Unseen` to `Seen`. The record is persisted before it becomes
    /// visible, so a storage failure leaves the scope unchanged.
    pub fn record(&mut self, record: NullifierRecord) -> GreeterResult<Admission> {
        debug_assert_eq!(record.scope, self.scope);

        if self.is_seen(&record.nullifier_hash) {
            self.registry.repeats.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Nullifier {} already used in scope {}",
                record.nullifier_hash.short(),
                self.scope.short()
            );
            return Ok(Admission::AlreadyUsed);
        }

        if let Some(store) = &self.registry.store {
            store.append_nullifier(&record)?;
        }
        self.state.seen.insert(record.nullifier_hash, record);
        self.registry.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(Admission::Accepted)
    }

}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if !self.state.seen.is_empty() {
            return;
        }

        // The map holds one reference and this guard another. Anyone else
        // has cloned the lock and is waiting on it.
        let lock = OwnedMutexGuard::mutex(&self.state);
        let mut scopes = self.registry.scopes.lock();
        let unused = scopes
            .get(&self.scope)
            .map(|entry| Arc::ptr_eq(entry, lock) && Arc::strong_count(lock) == 2)
            .unwrap_or(false);
        if unused {
            scopes.remove(&self.scope);
        }
    }
}

impl NullifierRegistry {
    pub fn new() -> Self {
        Self {
            scopes: Mutex::new(HashMap::new()),
            store: None,
            accepted: AtomicU64::new(0),
            repeats: AtomicU64::new(0),
        }
    }

    /// Restores every stored record and persists new ones to `store`.
    pub fn open(store: Arc<dyn NullifierStore>) -> GreeterResult<Self> {
        let records = store.load_nullifiers()?;
        let count = records.len();

        let mut scopes: HashMap<ExternalNullifier, ScopeState> = HashMap::new();
        for record in records {
            scopes
                .entry(record.scope)
                .or_default()
                .seen
                .insert(record.nullifier_hash, record);
        }

        info!(
            "Nullifier registry restored: {} records in {} scopes",
            count,
            scopes.len()
        );

        Ok(Self {
            scopes: Mutex::new(
                scopes
                    .into_iter()
                    .map(|(scope, state)| (scope, Arc::new(AsyncMutex::new(state))))
                    .collect(),
            ),
            store: Some(store),
            accepted: AtomicU64::new(0),
            repeats: AtomicU64::new(0),
        })
    }

    fn scope_lock(&self, scope: &ExternalNullifier) -> Arc<AsyncMutex<ScopeState>> {
        Arc::clone(self.scopes.lock().entry(*scope).or_default())
    }

    pub async fn lock_scope(&self, scope: &ExternalNullifier) -> ScopeGuard<'_> {
        let state = self.scope_lock(scope).lock_owned().await;
        ScopeGuard {
            registry: self,
            scope: *scope,
            state,
        }
    }

    /// Records `nullifier_hash` in `scope` unless it is already there.
    pub async fn check_and_record(
        &self,
        scope: &ExternalNullifier,
        nullifier_hash: &NullifierHash,
        message: &[u8],
        root: &MerkleRoot,
    ) -> GreeterResult<Admission> {
        let mut guard = self.lock_scope(scope).await;
        guard.record(NullifierRecord {
            scope: *scope,
            nullifier_hash: *nullifier_hash,
            message: message.to_vec(),
            root: *root,
            accepted_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub async fn is_seen(&self, scope: &ExternalNullifier, nullifier_hash: &NullifierHash) -> bool {
        let lock = self.scopes.lock().get(scope).cloned();
        match lock {
            Some(lock) => lock.lock().await.seen.contains_key(nullifier_hash),
            None => false,
        }
    }

    /// Every accepted record, oldest first.
    pub async fn records(&self) -> Vec<NullifierRecord> {
        let locks: Vec<_> = self.scopes.lock().values().cloned().collect();

        let mut records = Vec::new();
        for lock in locks {
            records.extend(lock.lock().await.seen.values().cloned());
        }
        records.sort_by(|a, b| {
            a.accepted_at
                .cmp(&b.accepted_at)
                .then_with(|| a.scope.cmp(&b.scope))
                .then_with(|| a.nullifier_hash.cmp(&b.nullifier_hash))
        });
        records
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.lock().len()
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn repeats(&self) -> u64 {
        self.repeats.load(Ordering::Relaxed)
    }
}

impl Default for NullifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}
