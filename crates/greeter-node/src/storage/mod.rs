mod config;
mod metrics;
mod types;

pub use config::*;
pub use metrics::*;
pub use types::*;

use greeter_types::{Commitment, GreeterError, GreeterResult};
use sled::{Db, Tree};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

const CURRENT_SCHEMA_VERSION: u32 = 1;
const SCHEMA_KEY: &[u8] = b"__schema_version__";

/// Durable home of the leaf sequence.
pub trait CommitmentStore: Send + Sync {
    /// All commitments in insertion order.
    fn load_commitments(&self) -> GreeterResult<Vec<Commitment>>;

    fn append_commitment(&self, index: u64, commitment: &Commitment) -> GreeterResult<()>;
}

/// Durable home of the accepted nullifier set.
pub trait NullifierStore: Send + Sync {
    fn load_nullifiers(&self) -> GreeterResult<Vec<NullifierRecord>>;

    fn append_nullifier(&self, record: &NullifierRecord) -> GreeterResult<()>;
}

pub struct GreeterStorage {
    db: Db,
    schema: Tree,
    commitments: Tree,
    nullifiers: Tree,
    metrics: Arc<StorageMetrics>,
}

impl GreeterStorage {
    /// Opens (or creates) the database for a tree of `depth`.
    pub fn open(config: StorageConfig, depth: usize) -> GreeterResult<Self> {
        let path = &config.path;
        info!("Opening storage at {:?}", path);

        let sled_config = sled::Config::new()
            .path(path)
            .cache_capacity(config.cache_capacity_bytes)
            .mode(sled::Mode::HighThroughput)
            .flush_every_ms(config.flush_every_ms);

        let db = sled_config
            .open()
            .map_err(|e| GreeterError::Storage(format!("Failed to open database: {}", e)))?;

        let storage = Self::create_from_db(db)?;
        storage.ensure_schema(depth)?;

        info!("Storage opened (schema version {})", CURRENT_SCHEMA_VERSION);
        Ok(storage)
    }

    pub fn in_memory(depth: usize) -> GreeterResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| GreeterError::Storage(format!("Failed to open temp database: {}", e)))?;

        let storage = Self::create_from_db(db)?;
        storage.ensure_schema(depth)?;
        Ok(storage)
    }

    fn create_from_db(db: Db) -> GreeterResult<Self> {
        let schema = Self::open_tree(&db, "schema")?;
        let commitments = Self::open_tree(&db, "commitments")?;
        let nullifiers = Self::open_tree(&db, "nullifiers")?;

        Ok(Self {
            db,
            schema,
            commitments,
            nullifiers,
            metrics: Arc::new(StorageMetrics::new()),
        })
    }

    fn open_tree(db: &Db, name: &str) -> GreeterResult<Tree> {
        db.open_tree(name)
            .map_err(|e| GreeterError::Storage(format!("Failed to open {} tree: {}", name, e)))
    }

    fn ensure_schema(&self, depth: usize) -> GreeterResult<()> {
        match self.schema_info()? {
            None => self.initialize_schema(depth),
            Some(info) if info.version != CURRENT_SCHEMA_VERSION => Err(GreeterError::Storage(
                format!(
                    "Database schema version {} is not supported (expected {})",
                    info.version, CURRENT_SCHEMA_VERSION
                ),
            )),
            Some(info) if info.depth != depth => Err(GreeterError::Config(format!(
                "Database holds a depth {} tree but depth {} is configured",
                info.depth, depth
            ))),
            Some(_) => Ok(()),
        }
    }

    fn initialize_schema(&self, depth: usize) -> GreeterResult<()> {
        info!(
            "Initializing new database with schema version {} (depth {})",
            CURRENT_SCHEMA_VERSION, depth
        );

        let info = SchemaInfo {
            version: CURRENT_SCHEMA_VERSION,
            created_at: chrono::Utc::now().timestamp(),
            depth,
        };

        let bytes = bincode::serialize(&info)
            .map_err(|e| GreeterError::Storage(format!("Failed to serialize schema: {}", e)))?;

        self.schema
            .insert(SCHEMA_KEY, bytes)
            .map_err(|e| GreeterError::Storage(format!("Failed to store schema: {}", e)))?;

        self.flush()
    }

    pub fn schema_info(&self) -> GreeterResult<Option<SchemaInfo>> {
        match self
            .schema
            .get(SCHEMA_KEY)
            .map_err(|e| GreeterError::Storage(format!("Schema read error: {}", e)))?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(|e| {
                GreeterError::Storage(format!("Schema deserialize error: {}", e))
            })?)),
            None => Ok(None),
        }
    }

    fn nullifier_key(record: &NullifierRecord) -> [u8; 64] {
        let mut key = [0u8; 64];
        key[..32].copy_from_slice(record.scope.as_bytes());
        key[32..].copy_from_slice(record.nullifier_hash.as_bytes());
        key
    }

    pub fn flush(&self) -> GreeterResult<()> {
        self.metrics.flushes.fetch_add(1, Ordering::Relaxed);
        self.db
            .flush()
            .map_err(|e| GreeterError::Storage(format!("Flush error: {}", e)))?;
        Ok(())
    }

    pub async fn flush_async(&self) -> GreeterResult<()> {
        self.metrics.flushes.fetch_add(1, Ordering::Relaxed);
        self.db
            .flush_async()
            .await
            .map_err(|e| GreeterError::Storage(format!("Flush error: {}", e)))?;
        Ok(())
    }

    pub fn storage_metrics(&self) -> Arc<StorageMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl CommitmentStore for GreeterStorage {
    fn load_commitments(&self) -> GreeterResult<Vec<Commitment>> {
        let mut commitments = Vec::with_capacity(self.commitments.len());

        for (expected, result) in self.commitments.iter().enumerate() {
            let (key, value) = result.map_err(|e| {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                GreeterError::Storage(format!("Failed to iterate commitments: {}", e))
            })?;
            self.metrics.reads.fetch_add(1, Ordering::Relaxed);

            let index = u64::from_be_bytes(
                key.as_ref()
                    .try_into()
                    .map_err(|_| GreeterError::Storage("Invalid commitment key".into()))?,
            );
            if index != expected as u64 {
                return Err(GreeterError::Storage(format!(
                    "Commitment sequence has a gap at index {}",
                    expected
                )));
            }

            let bytes: [u8; 32] = value
                .as_ref()
                .try_into()
                .map_err(|_| GreeterError::Storage("Invalid commitment value".into()))?;
            commitments.push(Commitment::from_bytes(bytes));
        }

        debug!("Loaded {} commitments", commitments.len());
        Ok(commitments)
    }

    fn append_commitment(&self, index: u64, commitment: &Commitment) -> GreeterResult<()> {
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        self.metrics.write_bytes.fetch_add(32, Ordering::Relaxed);

        let previous = self
            .commitments
            .compare_and_swap(
                index.to_be_bytes(),
                None as Option<&[u8]>,
                Some(commitment.as_bytes().as_slice()),
            )
            .map_err(|e| {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                GreeterError::Storage(format!("Failed to store commitment: {}", e))
            })?;

        if previous.is_err() {
            self.metrics.errors.fetch_add(1, Ordering::Relaxed);
            return Err(GreeterError::Storage(format!(
                "Commitment index {} is already occupied",
                index
            )));
        }
        Ok(())
    }
}

impl NullifierStore for GreeterStorage {
    fn load_nullifiers(&self) -> GreeterResult<Vec<NullifierRecord>> {
        let mut records = Vec::with_capacity(self.nullifiers.len());

        for result in self.nullifiers.iter() {
            let (_, value) = result.map_err(|e| {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                GreeterError::Storage(format!("Failed to iterate nullifiers: {}", e))
            })?;
            self.metrics.reads.fetch_add(1, Ordering::Relaxed);

            let record: NullifierRecord = bincode::deserialize(&value).map_err(|e| {
                GreeterError::Storage(format!("Failed to deserialize nullifier: {}", e))
            })?;
            records.push(record);
        }

        debug!("Loaded {} nullifier records", records.len());
        Ok(records)
    }

    fn append_nullifier(&self, record: &NullifierRecord) -> GreeterResult<()> {
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);

        let value = bincode::serialize(record)
            .map_err(|e| GreeterError::Storage(format!("Failed to serialize nullifier: {}", e)))?;
        self.metrics
            .write_bytes
            .fetch_add(value.len() as u64, Ordering::Relaxed);

        let previous = self
            .nullifiers
            .compare_and_swap(Self::nullifier_key(record), None as Option<&[u8]>, Some(value))
            .map_err(|e| {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                GreeterError::Storage(format!("Failed to store nullifier: {}", e))
            })?;

        if previous.is_err() {
            return Err(GreeterError::Storage(format!(
                "Nullifier {} already stored in scope {}",
                record.nullifier_hash.short(),
                record.scope.short()
            )));
        }
        Ok(())
    }
}
