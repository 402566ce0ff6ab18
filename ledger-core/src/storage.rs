//! Chain persistence
//!
//! Chains are exchanged with external storage as ordered lists of flat
//! [`ChainRecord`]s. [`ChainStore`] keeps one JSON snapshot per replica:
//!
//! - `<data_dir>/<replica>.chain.json` - records of one replica's chain
//!
//! Writes go to a temporary file first and are renamed into place.

use crate::chain::Chain;
use crate::types::{Block, Hash, Payload};
use crate::{Config, Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SNAPSHOT_SUFFIX: &str = ".chain.json";

/// Flat persisted form of one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRecord {
    /// Position in the chain
    pub sequence: u64,
    /// Event content
    pub payload: Payload,
    /// Hash of the preceding block
    pub previous_hash: Hash,
    /// Stored hash of this block
    pub current_hash: Hash,
    /// Proposal token
    pub transaction_id: Uuid,
}

impl From<&Block> for ChainRecord {
    fn from(block: &Block) -> Self {
        Self {
            sequence: block.sequence,
            payload: block.payload.clone(),
            previous_hash: block.previous_hash,
            current_hash: block.current_hash,
            transaction_id: block.transaction_id,
        }
    }
}

impl From<ChainRecord> for Block {
    fn from(record: ChainRecord) -> Self {
        Self {
            sequence: record.sequence,
            payload: record.payload,
            previous_hash: record.previous_hash,
            current_hash: record.current_hash,
            transaction_id: record.transaction_id,
        }
    }
}

/// Flatten a chain into records
pub fn to_records(chain: &Chain) -> Vec<ChainRecord> {
    chain.blocks().iter().map(ChainRecord::from).collect()
}

/// Rebuild a chain from records
///
/// Records must be ordered with contiguous sequence numbers starting at 0.
/// Hashes are restored as stored and not re-verified.
pub fn from_records(records: Vec<ChainRecord>) -> Result<Chain> {
    for (index, record) in records.iter().enumerate() {
        if record.sequence != index as u64 {
            return Err(Error::InvalidRecord(format!(
                "expected sequence {}, found {}",
                index, record.sequence
            )));
        }
    }
    Ok(Chain::from_blocks_unchecked(
        records.into_iter().map(Block::from).collect(),
    ))
}

/// File-backed store of replica chains
#[derive(Debug, Clone)]
pub struct ChainStore {
    dir: PathBuf,
    pretty: bool,
}

impl ChainStore {
    /// Open or create the store under the configured data directory
    pub fn open(config: &Config) -> Result<Self> {
        Self::at(&config.data_dir, config.storage.pretty_json)
    }

    /// Open or create the store in `dir`
    pub fn at(dir: impl AsRef<Path>, pretty: bool) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        tracing::info!("Opened chain store at {:?}", dir.as_ref());
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            pretty,
        })
    }

    fn path_for(&self, replica: &str) -> PathBuf {
        self.dir.join(format!("{replica}{SNAPSHOT_SUFFIX}"))
    }

    /// Save a replica's chain
    pub fn save(&self, replica: &str, chain: &Chain) -> Result<()> {
        let records = to_records(chain);
        let data = if self.pretty {
            serde_json::to_vec_pretty(&records)?
        } else {
            serde_json::to_vec(&records)?
        };

        let path = self.path_for(replica);
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &path)?;

        tracing::debug!(replica, blocks = records.len(), "Chain saved");
        Ok(())
    }

    /// Load a replica's chain, `None` if it was never saved
    pub fn load(&self, replica: &str) -> Result<Option<Chain>> {
        let path = self.path_for(replica);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        let records: Vec<ChainRecord> = serde_json::from_slice(&data)?;
        from_records(records).map(Some)
    }

    /// Remove a replica's snapshot
    pub fn clear(&self, replica: &str) -> Result<()> {
        let path = self.path_for(replica);
        if path.exists() {
            fs::remove_file(&path)?;
            tracing::info!(replica, "Chain snapshot removed");
        }
        Ok(())
    }

    /// Names of all stored replicas, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let file_name = entry?.file_name();
            if let Some(name) = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(SNAPSHOT_SUFFIX))
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
