//! Optimized storage layer using RocksDB

use crate::config::StorageConfig;
use crate::errors::StorageError;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct OptimizedStorage {
    db: Arc<DB>,
}

impl OptimizedStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
            StorageError::DatabaseOpenFailed(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open the database described by `config`, wiping it first if asked to
    pub fn new_with_config(config: &StorageConfig) -> Result<Self, StorageError> {
        if config.clear_on_start && Path::new(&config.data_directory).exists() {
            std::fs::remove_dir_all(&config.data_directory).map_err(|e| {
                StorageError::WriteFailed(format!("Failed to clear {}: {}", config.data_directory, e))
            })?;
        }
        Self::new(&config.data_directory)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        Ok(self.db.put(key, value)?)
    }

    /// Write every item or none of them
    pub fn batch_write<K, V>(&self, items: &[(K, V)]) -> Result<(), StorageError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut batch = WriteBatch::default();
        for (key, value) in items {
            batch.put(key, value);
        }
        Ok(self.db.write(batch)?)
    }

    /// Key/value pairs starting with `prefix`, in key order, at most `limit`
    pub fn scan_prefix(&self, prefix: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) || rows.len() >= limit {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }
}
