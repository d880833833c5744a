//! RocksDB-backed block store.
//!
//! This implementation persists blocks, the active chain and tip
//! metadata in a RocksDB instance with dedicated column families:
//!
//! - `"blocks"`: maps `BlockHash` (32 bytes) -> bincode-encoded block,
//! - `"active"`: maps big-endian `u32` height -> active `BlockHash`,
//! - `"meta"`:   stores the current tip under a fixed key `"tip"`.

use std::path::Path;

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options};
use thiserror::Error;
use tracing::error;

use crate::consensus::store::BlockStore;
use crate::types::{Block, BlockHash, HASH_LEN, Hash256};

const CF_BLOCKS: &str = "blocks";
const CF_ACTIVE: &str = "active";
const CF_META: &str = "meta";
const TIP_KEY: &[u8] = b"tip";

/// Configuration for [`RocksDbBlockStore`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/yoda-chain".to_string(),
            create_if_missing: true,
        }
    }
}

/// Storage-level error type.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("rocksdb: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("column family {0:?} not found")]
    MissingColumnFamily(&'static str),

    /// Corrupted or malformed metadata (e.g. tip hash with wrong length).
    #[error("corrupted metadata: {0}")]
    CorruptedMeta(&'static str),

    #[error("block encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("block decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// RocksDB-backed implementation of [`BlockStore`].
///
/// The [`BlockStore`] methods cannot fail; write errors are logged and
/// the engine rebuilds from whatever made it to disk on restart.
pub struct RocksDbBlockStore {
    db: DB,
}

impl RocksDbBlockStore {
    /// Opens (or creates) a RocksDB-backed block store at the given path.
    ///
    /// This sets up the `"blocks"`, `"active"` and `"meta"` column
    /// families. The `"default"` column family is also created to keep
    /// RocksDB happy, but it is not used.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_BLOCKS, Options::default()),
            ColumnFamilyDescriptor::new(CF_ACTIVE, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    fn encode_block(block: &Block) -> Result<Vec<u8>, StorageError> {
        Ok(bincode::serde::encode_to_vec(
            block,
            bincode::config::standard(),
        )?)
    }

    fn decode_block(bytes: &[u8]) -> Result<Block, StorageError> {
        let (block, _): (Block, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(block)
    }

    fn decode_hash(bytes: &[u8], what: &'static str) -> Result<BlockHash, StorageError> {
        let arr: [u8; HASH_LEN] = bytes
            .try_into()
            .map_err(|_| StorageError::CorruptedMeta(what))?;
        Ok(BlockHash(Hash256(arr)))
    }

    /// Loads a block, distinguishing "absent" from "unreadable".
    pub fn load_block(&self, hash: &BlockHash) -> Result<Option<Block>, StorageError> {
        match self.db.get_cf(self.cf(CF_BLOCKS)?, hash.0.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_block(&bytes)?)),
            None => Ok(None),
        }
    }

    fn store_block(&self, hash: &BlockHash, block: &Block) -> Result<(), StorageError> {
        let bytes = Self::encode_block(block)?;
        self.db.put_cf(self.cf(CF_BLOCKS)?, hash.0.as_bytes(), bytes)?;
        Ok(())
    }

    /// Loads the current tip hash from the meta column family, if present.
    fn load_tip(&self) -> Result<Option<BlockHash>, StorageError> {
        self.db
            .get_cf(self.cf(CF_META)?, TIP_KEY)?
            .map(|bytes| Self::decode_hash(&bytes, "tip hash length"))
            .transpose()
    }

    /// Persists the tip hash into the meta column family.
    fn store_tip(&self, hash: &BlockHash) -> Result<(), StorageError> {
        self.db.put_cf(self.cf(CF_META)?, TIP_KEY, hash.0.as_bytes())?;
        Ok(())
    }

    fn load_active(&self, height: u32) -> Result<Option<BlockHash>, StorageError> {
        self.db
            .get_cf(self.cf(CF_ACTIVE)?, height.to_be_bytes())?
            .map(|bytes| Self::decode_hash(&bytes, "active hash length"))
            .transpose()
    }

    fn store_active(&self, height: u32, hash: Option<BlockHash>) -> Result<(), StorageError> {
        let cf = self.cf(CF_ACTIVE)?;
        match hash {
            Some(hash) => self.db.put_cf(cf, height.to_be_bytes(), hash.0.as_bytes())?,
            None => self.db.delete_cf(cf, height.to_be_bytes())?,
        }
        Ok(())
    }
}

impl BlockStore for RocksDbBlockStore {
    fn get_block(&self, hash: &BlockHash) -> Option<Block> {
        self.load_block(hash).unwrap_or_else(|e| {
            error!(%hash, error = %e, "failed to read block");
            None
        })
    }

    fn put_block(&mut self, hash: BlockHash, block: &Block) {
        if let Err(e) = self.store_block(&hash, block) {
            error!(%hash, error = %e, "failed to write block");
        }
    }

    fn tip(&self) -> Option<BlockHash> {
        self.load_tip().unwrap_or_else(|e| {
            error!(error = %e, "failed to read tip");
            None
        })
    }

    fn set_tip(&mut self, hash: BlockHash) {
        if let Err(e) = self.store_tip(&hash) {
            error!(%hash, error = %e, "failed to write tip");
        }
    }

    fn hash_at_height(&self, height: u32) -> Option<BlockHash> {
        self.load_active(height).unwrap_or_else(|e| {
            error!(height, error = %e, "failed to read active chain");
            None
        })
    }

    fn set_active(&mut self, height: u32, hash: Option<BlockHash>) {
        if let Err(e) = self.store_active(height, hash) {
            error!(height, error = %e, "failed to write active chain");
        }
    }
}
