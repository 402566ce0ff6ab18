//! Hash-linked, append-only chain of blocks
//!
//! Every chain starts from the same constant genesis block, so replicas
//! created independently are byte-identical without a coordination round.
//! The public mutation path is [`Chain::append`]; fault injection and
//! recovery are the only code allowed to rewrite blocks or whole chains.

use crate::types::{Block, Event, Hash, Payload, Tip};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of seed blocks built from an initial event table
pub const DEFAULT_SEED_LIMIT: usize = 20;

/// The chain-wide constant genesis block
pub fn genesis_block() -> Block {
    Block::new(0, Payload::Genesis, Hash::ZERO, Uuid::nil())
}

/// Ordered sequence of blocks owned by one replica
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    /// Chain holding only the genesis block
    pub fn new() -> Self {
        Self::from_genesis(genesis_block())
    }

    /// Chain with no blocks at all
    pub fn empty() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Chain starting from the given genesis block
    pub fn from_genesis(genesis: Block) -> Self {
        Self {
            blocks: vec![genesis],
        }
    }

    /// Genesis followed by one block per seed event (at most `limit`)
    pub fn seeded(events: impl IntoIterator<Item = Event>, limit: usize) -> Result<Self> {
        let mut chain = Self::new();
        for event in events.into_iter().take(limit) {
            let block = Block::new(
                chain.len() as u64,
                Payload::Event(event),
                chain.tip_block_hash()?,
                Uuid::new_v4(),
            );
            chain.append(block)?;
        }
        Ok(chain)
    }

    /// Restore blocks as stored, without linkage checks
    ///
    /// Used by the record codec so tampered chains survive a round-trip.
    pub(crate) fn from_blocks_unchecked(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True when the chain has no blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// All blocks in order
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Block at a sequence number
    pub fn get(&self, sequence: u64) -> Option<&Block> {
        self.blocks.get(sequence as usize)
    }

    /// Last block
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Tip hash, `Tip::Empty` for a chain without blocks
    pub fn tip_hash(&self) -> Tip {
        match self.blocks.last() {
            Some(block) => Tip::Block(block.current_hash),
            None => Tip::Empty,
        }
    }

    /// Tip digest, failing on an empty chain
    pub fn tip_block_hash(&self) -> Result<Hash> {
        self.tip().map(|b| b.current_hash).ok_or(Error::EmptyChain)
    }

    /// Check that `block` may be appended, without mutating anything
    pub fn check_append(&self, block: &Block) -> Result<()> {
        let expected = match self.tip() {
            Some(tip) => tip.current_hash,
            None => Hash::ZERO,
        };
        if block.previous_hash != expected {
            return Err(Error::InvalidLinkage {
                expected,
                found: block.previous_hash,
            });
        }

        let next = self.blocks.len() as u64;
        if block.sequence != next {
            return Err(Error::SequenceMismatch {
                expected: next,
                found: block.sequence,
            });
        }

        Ok(())
    }

    /// Append a block that links to the current tip
    pub fn append(&mut self, block: Block) -> Result<()> {
        self.check_append(&block)?;

        tracing::debug!(
            sequence = block.sequence,
            hash = %block.current_hash.short(),
            events = block.payload.event_count(),
            "Block appended"
        );

        self.blocks.push(block);
        Ok(())
    }

    /// Walk every block and recompute its hash and back-link
    ///
    /// Fails with `TamperedBlock` naming the first block whose stored hash,
    /// previous hash or sequence number does not hold.
    pub fn verify(&self) -> Result<()> {
        let mut expected_previous = Hash::ZERO;

        for (index, block) in self.blocks.iter().enumerate() {
            let sequence = index as u64;
            if block.sequence != sequence
                || block.previous_hash != expected_previous
                || !block.is_intact()
            {
                tracing::warn!(sequence, "Chain verification failed");
                return Err(Error::TamperedBlock { sequence });
            }
            expected_previous = block.current_hash;
        }

        Ok(())
    }

    /// Boolean form of [`Chain::verify`]
    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    /// Mutable access to the last block, bypassing the append-only rule
    pub(crate) fn tip_mut(&mut self) -> Option<&mut Block> {
        self.blocks.last_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RiskLevel, Stage};

    fn event(id: &str) -> Event {
        Event::new(id, "Depot_SP", "Center_MG", Stage::InTransit, RiskLevel::Low)
    }

    fn next_block(chain: &Chain, payload: Payload) -> Block {
        Block::new(
            chain.len() as u64,
            payload,
            chain.tip_block_hash().unwrap(),
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_genesis_is_constant() {
        let a = genesis_block();
        let b = genesis_block();
        assert_eq!(a, b);
        assert_eq!(a.sequence, 0);
        assert_eq!(a.previous_hash, Hash::ZERO);
        assert!(a.is_intact());
        assert_eq!(Chain::new(), Chain::new());
    }

    #[test]
    fn test_append_links_to_tip() {
        let mut chain = Chain::new();
        let block = next_block(&chain, event("1").into());
        let hash = block.current_hash;

        chain.append(block).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.tip_hash(), Tip::Block(hash));
        assert!(chain.is_valid());
    }

    #[test]
    fn test_append_rejects_bad_linkage() {
        let mut chain = Chain::new();
        let block = Block::new(1, event("1").into(), Hash::from_bytes([9u8; 32]), Uuid::new_v4());

        let err = chain.append(block).unwrap_err();
        assert!(matches!(err, Error::InvalidLinkage { .. }));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_append_rejects_bad_sequence() {
        let mut chain = Chain::new();
        let mut block = next_block(&chain, event("1").into());
        block.sequence = 5;

        let err = chain.append(block).unwrap_err();
        assert!(matches!(err, Error::SequenceMismatch { expected: 1, found: 5 }));
    }

    #[test]
    fn test_empty_chain_tip() {
        let chain = Chain::empty();
        assert_eq!(chain.tip_hash(), Tip::Empty);
        assert!(matches!(chain.tip_block_hash(), Err(Error::EmptyChain)));
        assert!(chain.is_valid());
    }

    #[test]
    fn test_seeded_chain() {
        let events: Vec<Event> = (0..30).map(|i| event(&i.to_string())).collect();
        let chain = Chain::seeded(events, DEFAULT_SEED_LIMIT).unwrap();
        assert_eq!(chain.len(), DEFAULT_SEED_LIMIT + 1);
        assert!(chain.is_valid());
    }

    #[test]
    fn test_verify_reports_tampered_sequence() {
        let mut chain = Chain::new();
        for i in 0..3 {
            let block = next_block(&chain, event(&i.to_string()).into());
            chain.append(block).unwrap();
        }

        let mut blocks = chain.blocks().to_vec();
        blocks[2].payload = blocks[2].payload.falsified();
        let tampered = Chain::from_blocks_unchecked(blocks);

        assert!(matches!(
            tampered.verify(),
            Err(Error::TamperedBlock { sequence: 2 })
        ));
    }

    #[test]
    fn test_verify_detects_broken_backlink() {
        let mut chain = Chain::new();
        let block = next_block(&chain, event("1").into());
        chain.append(block).unwrap();

        let mut blocks = chain.blocks().to_vec();
        blocks[0] = Block::new(0, Payload::Batch(vec![]), Hash::ZERO, Uuid::nil());
        let relinked = Chain::from_blocks_unchecked(blocks);

        // Genesis is self-consistent; block 1 no longer points at it
        assert!(matches!(
            relinked.verify(),
            Err(Error::TamperedBlock { sequence: 1 })
        ));
    }
}
