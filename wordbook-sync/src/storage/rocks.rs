//! RocksDB-backed document store.
//!
//! Column families:
//! - `documents` — JSON field maps (LZ4 compressed), keyed by `collection\0id`
//! - `metadata`  — per-document metadata (bincode: version, sizes, timestamps)
//!
//! Documents and their metadata are always written in one `WriteBatch`.
//! Writers that read before they write hold `write_lock`, so an overwrite
//! cannot bring back a document deleted under it.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use uuid::Uuid;

use crate::record::Fields;

/// Column family names.
const CF_DOCUMENTS: &str = "documents";
const CF_METADATA: &str = "metadata";

/// All column family names for initialization.
const COLUMN_FAMILIES: &[&str] = &[CF_DOCUMENTS, CF_METADATA];

/// Separates the collection name from the document id in keys.
const KEY_SEPARATOR: u8 = 0;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("wordbook_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// Metadata stored alongside each document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub collection: String,
    pub id: String,
    /// Bumped on every overwrite, starts at 1
    pub version: u64,
    /// Uncompressed JSON size in bytes
    pub size: u64,
    /// Compressed size in bytes
    pub compressed_size: u64,
    /// Creation timestamp (seconds since epoch)
    pub created_at: u64,
    /// Last modified timestamp (seconds since epoch)
    pub updated_at: u64,
}

impl DocumentMetadata {
    fn new(collection: &str, id: &str) -> Self {
        let now = now_secs();
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
            version: 0,
            size: 0,
            compressed_size: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
        Ok(meta)
    }
}

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// RocksDB internal error
    DatabaseError(String),
    /// Document not found
    NotFound { collection: String, id: String },
    /// Collection name is empty or contains a NUL byte
    InvalidCollection(String),
    /// Serialization failed
    SerializationError(String),
    /// Deserialization failed
    DeserializationError(String),
    /// Compression error
    CompressionError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DatabaseError(e) => write!(f, "Database error: {e}"),
            StoreError::NotFound { collection, id } => {
                write!(f, "Document not found: {collection}/{id}")
            }
            StoreError::InvalidCollection(name) => write!(f, "Invalid collection name: {name:?}"),
            StoreError::SerializationError(e) => write!(f, "Serialization error: {e}"),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            StoreError::CompressionError(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

/// Check that a collection name can be used as a key prefix.
pub fn validate_collection(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.as_bytes().contains(&KEY_SEPARATOR) {
        return Err(StoreError::InvalidCollection(name.to_string()));
    }
    Ok(())
}

/// RocksDB-backed document store holding any number of named collections.
pub struct DocumentStore {
    /// RocksDB instance (single-threaded mode — concurrency via tokio)
    db: DBWithThreadMode<SingleThreaded>,
    /// Store configuration
    config: StoreConfig,
    /// Serializes read-modify-write sequences
    write_lock: Mutex<()>,
}

impl DocumentStore {
    /// Open the document store at the configured path.
    ///
    /// Creates the database and column families if they don't exist.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        log::debug!("Opened document store at {}", config.path.display());
        Ok(Self {
            db,
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Build column-family-specific options.
    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_DOCUMENTS => {
                // Values are already LZ4 compressed
                opts.set_compression_type(DBCompressionType::None);
                opts.set_max_write_buffer_number(2);
            }
            CF_METADATA => {
                opts.set_compression_type(DBCompressionType::Lz4);
                opts.set_max_write_buffer_number(2);
            }
            _ => {}
        }

        opts
    }

    // ─── Documents ────────────────────────────────────────────────────

    /// Insert a new document under a freshly generated id.
    pub fn insert_document(&self, collection: &str, fields: &Fields) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let meta = DocumentMetadata::new(collection, &id);
        let _guard = self.lock_writes();
        self.write_document(meta, fields)?;
        Ok(id)
    }

    /// Replace the fields of an existing document.
    pub fn overwrite_document(
        &self,
        collection: &str,
        id: &str,
        fields: &Fields,
    ) -> Result<DocumentMetadata, StoreError> {
        let _guard = self.lock_writes();
        let meta = self.load_metadata(collection, id)?;
        self.write_document(meta, fields)
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write document + metadata atomically, bumping the version.
    fn write_document(
        &self,
        mut meta: DocumentMetadata,
        fields: &Fields,
    ) -> Result<DocumentMetadata, StoreError> {
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_meta = self.cf(CF_METADATA)?;
        let key = Self::document_key(&meta.collection, &meta.id)?;

        let json = serde_json::to_vec(fields)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        let compressed = lz4_flex::compress_prepend_size(&json);

        meta.version += 1;
        meta.size = json.len() as u64;
        meta.compressed_size = compressed.len() as u64;
        meta.updated_at = now_secs();

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_docs, &key, &compressed);
        batch.put_cf(&cf_meta, &key, &meta.encode()?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        Ok(meta)
    }

    /// Load a document's fields.
    pub fn load_document(&self, collection: &str, id: &str) -> Result<Fields, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        let key = Self::document_key(collection, id)?;

        match self.db.get_cf(&cf, &key)? {
            Some(compressed) => Self::decode_fields(&compressed),
            None => Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// List every document of a collection, ordered by id.
    pub fn list_documents(&self, collection: &str) -> Result<Vec<(String, Fields)>, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        let prefix = Self::collection_prefix(collection)?;

        let mut documents = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id = String::from_utf8(key[prefix.len()..].to_vec())
                .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
            documents.push((id, Self::decode_fields(&value)?));
        }

        Ok(documents)
    }

    /// Delete a document. Returns whether it existed.
    pub fn delete_document(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock_writes();
        if !self.document_exists(collection, id)? {
            return Ok(false);
        }
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_meta = self.cf(CF_METADATA)?;
        let key = Self::document_key(collection, id)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_docs, &key);
        batch.delete_cf(&cf_meta, &key);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(true)
    }

    /// Check if a document exists.
    pub fn document_exists(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let key = Self::document_key(collection, id)?;
        Ok(self.db.get_cf(&cf, &key)?.is_some())
    }

    // ─── Metadata ─────────────────────────────────────────────────────

    /// Load document metadata.
    pub fn load_metadata(&self, collection: &str, id: &str) -> Result<DocumentMetadata, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let key = Self::document_key(collection, id)?;

        match self.db.get_cf(&cf, &key)? {
            Some(bytes) => DocumentMetadata::decode(&bytes),
            None => Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Number of documents in a collection.
    pub fn count_documents(&self, collection: &str) -> Result<usize, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let prefix = Self::collection_prefix(collection)?;

        let mut count = 0;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Names of all non-empty collections, sorted.
    pub fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let mut names: Vec<String> = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            let Some(split) = key.iter().position(|b| *b == KEY_SEPARATOR) else {
                continue;
            };
            let name = String::from_utf8(key[..split].to_vec())
                .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
            if names.last() != Some(&name) {
                names.push(name);
            }
        }

        Ok(names)
    }

    /// Flush memtables to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }

    /// `<collection>\0`
    fn collection_prefix(collection: &str) -> Result<Vec<u8>, StoreError> {
        validate_collection(collection)?;
        let mut prefix = Vec::with_capacity(collection.len() + 1);
        prefix.extend_from_slice(collection.as_bytes());
        prefix.push(KEY_SEPARATOR);
        Ok(prefix)
    }

    /// `<collection>\0<id>`
    fn document_key(collection: &str, id: &str) -> Result<Vec<u8>, StoreError> {
        let mut key = Self::collection_prefix(collection)?;
        key.extend_from_slice(id.as_bytes());
        Ok(key)
    }

    fn decode_fields(compressed: &[u8]) -> Result<Fields, StoreError> {
        let json = lz4_flex::decompress_size_prepended(compressed)
            .map_err(|e| StoreError::CompressionError(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| StoreError::DeserializationError(e.to_string()))
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
