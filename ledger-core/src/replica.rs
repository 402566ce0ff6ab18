//! Replicas and the replica set
//!
//! A replica is a named node holding its own chain and signing credential.
//! The set maps names to replicas; iteration is in name order so every
//! report built from it is deterministic.

use crate::chain::Chain;
use crate::crypto::{SecretSigner, Signer};
use crate::types::{Block, Hash, Tip};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named node with its own chain
#[derive(Debug, Clone)]
pub struct Replica {
    name: String,
    signer: Arc<dyn Signer>,
    chain: Chain,
}

impl Replica {
    /// Create a replica
    pub fn new(name: impl Into<String>, signer: Arc<dyn Signer>, chain: Chain) -> Self {
        Self {
            name: name.into(),
            signer,
            chain,
        }
    }

    /// Replica using the default simulated secret for its name
    pub fn with_default_secret(name: impl Into<String>, chain: Chain) -> Self {
        let name = name.into();
        let signer = Arc::new(SecretSigner::for_node(&name));
        Self::new(name, signer, chain)
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read-only view of the chain
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Chain length
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// True when the chain has no blocks
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Tip hash, never failing on an empty chain
    pub fn tip_hash(&self) -> Tip {
        self.chain.tip_hash()
    }

    /// Signing credential
    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    /// Sign a digest with this replica's credential
    pub fn sign(&self, digest: &Hash) -> String {
        self.signer.sign(digest)
    }

    /// Append a committed block
    pub fn append(&mut self, block: Block) -> Result<()> {
        self.chain.append(block)
    }

    /// Replace the whole chain (recovery)
    pub fn replace_chain(&mut self, chain: Chain) {
        self.chain = chain;
    }

    pub(crate) fn chain_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }
}

/// Named collection of replicas
#[derive(Debug, Clone, Default)]
pub struct ReplicaSet {
    replicas: BTreeMap<String, Replica>,
}

impl ReplicaSet {
    /// One replica per name, each starting from the same genesis block
    pub fn from_genesis<I, S>(genesis: &crate::types::Block, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_chain(&Chain::from_genesis(genesis.clone()), names)
    }

    /// One replica per name, each holding a copy of `chain`
    pub fn from_chain<I, S>(chain: &Chain, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for name in names {
            set.insert(Replica::with_default_secret(name, chain.clone()))?;
        }
        Ok(set)
    }

    /// Add a replica; names must be unique
    pub fn insert(&mut self, replica: Replica) -> Result<()> {
        if self.replicas.contains_key(replica.name()) {
            return Err(Error::DuplicateReplica(replica.name().to_string()));
        }
        self.replicas.insert(replica.name().to_string(), replica);
        Ok(())
    }

    /// Number of replicas
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// True when the set has no replicas
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// True when `name` is a member
    pub fn contains(&self, name: &str) -> bool {
        self.replicas.contains_key(name)
    }

    /// Look up a replica
    pub fn get(&self, name: &str) -> Result<&Replica> {
        self.replicas
            .get(name)
            .ok_or_else(|| Error::UnknownReplica(name.to_string()))
    }

    /// Look up a replica for mutation
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Replica> {
        self.replicas
            .get_mut(name)
            .ok_or_else(|| Error::UnknownReplica(name.to_string()))
    }

    /// Replicas in name order
    pub fn iter(&self) -> impl Iterator<Item = &Replica> {
        self.replicas.values()
    }

    /// Replicas in name order, mutable
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Replica> {
        self.replicas.values_mut()
    }

    /// Member names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.replicas.keys().map(String::as_str)
    }

    /// Tip hash of every replica
    pub fn tip_hashes(&self) -> BTreeMap<String, Tip> {
        self.replicas
            .iter()
            .map(|(name, replica)| (name.clone(), replica.tip_hash()))
            .collect()
    }
}
