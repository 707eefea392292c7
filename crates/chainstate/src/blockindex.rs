//! In-memory tree of block headers with cumulative work and validity.
//!
//! Entries live in an arena and refer to their parent by handle, never
//! by owning pointer; the arena is append-only for the process
//! lifetime and persisted through the header column.

use std::collections::HashMap;

use basaltd_consensus::Hash256;
use basaltd_pow::block_proof;
use basaltd_primitives::block::BlockHeader;
use basaltd_primitives::encoding::{DecodeError, Decoder, Encoder};
use primitive_types::U256;

/// Stable identifier of an entry in the index arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Handle(u32);

impl Handle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Validation progress of a block. Only ever advances; the failed
/// states are absorbing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockStatus {
    Unknown,
    /// Header passed context-free and parent-contextual checks.
    HeaderValid,
    /// Full block data is stored and passed context-free checks.
    TreeValid,
    /// Block connected successfully apart from script execution.
    ChainValid,
    /// Every input script verified; fully valid.
    ScriptsValid,
    /// The block itself broke a rule. Terminal.
    Failed,
    /// An ancestor is `Failed`. Terminal.
    FailedChild,
}

impl BlockStatus {
    fn rank(self) -> u8 {
        match self {
            BlockStatus::Unknown => 0,
            BlockStatus::HeaderValid => 1,
            BlockStatus::TreeValid => 2,
            BlockStatus::ChainValid => 3,
            BlockStatus::ScriptsValid => 4,
            BlockStatus::Failed | BlockStatus::FailedChild => 0,
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, BlockStatus::Failed | BlockStatus::FailedChild)
    }

    pub fn is_at_least(self, other: BlockStatus) -> bool {
        !self.is_failed() && self.rank() >= other.rank()
    }

    fn to_byte(self) -> u8 {
        match self {
            BlockStatus::Unknown => 0,
            BlockStatus::HeaderValid => 1,
            BlockStatus::TreeValid => 2,
            BlockStatus::ChainValid => 3,
            BlockStatus::ScriptsValid => 4,
            BlockStatus::Failed => 5,
            BlockStatus::FailedChild => 6,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => BlockStatus::Unknown,
            1 => BlockStatus::HeaderValid,
            2 => BlockStatus::TreeValid,
            3 => BlockStatus::ChainValid,
            4 => BlockStatus::ScriptsValid,
            5 => BlockStatus::Failed,
            6 => BlockStatus::FailedChild,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct BlockIndexEntry {
    pub header: BlockHeader,
    pub hash: Hash256,
    pub height: i32,
    /// Total work on the chain ending at this block.
    pub chain_work: U256,
    pub status: BlockStatus,
    /// First-seen order, used by the equal-work tie-break.
    pub sequence: u64,
    pub parent: Option<Handle>,
    pub have_data: bool,
}

impl BlockIndexEntry {
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(80 + 4 + 32 + 8 + 2);
        self.header.encode_to(&mut encoder);
        encoder.write_u32_le(self.height as u32);
        let mut work = [0u8; 32];
        self.chain_work.to_little_endian(&mut work);
        encoder.write_hash(&work);
        encoder.write_u64_le(self.sequence);
        encoder.write_u8(self.status.to_byte());
        encoder.write_u8(if self.have_data { 1 } else { 0 });
        encoder.into_inner()
    }

    /// Decode a persisted entry. The parent handle is resolved by the
    /// index during load.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = BlockHeader::decode_from(&mut decoder)?;
        let height = decoder.read_u32_le()? as i32;
        let work = decoder.read_hash()?;
        let sequence = decoder.read_u64_le()?;
        let status_byte = decoder.read_u8()?;
        let have_data = decoder.read_u8()? != 0;
        decoder.finish()?;
        Ok(Self {
            hash: header.hash(),
            header,
            height,
            chain_work: U256::from_little_endian(&work),
            status: BlockStatus::from_byte(status_byte).ok_or(DecodeError::TrailingBytes)?,
            sequence,
            parent: None,
            have_data,
        })
    }
}

#[derive(Default)]
pub struct BlockIndex {
    entries: Vec<BlockIndexEntry>,
    by_hash: HashMap<Hash256, Handle>,
    next_sequence: u64,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, hash: &Hash256) -> Option<Handle> {
        self.by_hash.get(hash).copied()
    }

    pub fn get(&self, handle: Handle) -> &BlockIndexEntry {
        &self.entries[handle.index()]
    }

    pub fn get_mut(&mut self, handle: Handle) -> &mut BlockIndexEntry {
        &mut self.entries[handle.index()]
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        (0..self.entries.len() as u32).map(Handle)
    }

    /// Insert a header whose parent (if any) is already present.
    /// Returns the existing handle for duplicates.
    pub fn insert(&mut self, header: BlockHeader, parent: Option<Handle>) -> Handle {
        let hash = header.hash();
        if let Some(existing) = self.by_hash.get(&hash) {
            return *existing;
        }
        let (height, parent_work, poisoned) = match parent {
            Some(parent_handle) => {
                let parent_entry = self.get(parent_handle);
                (
                    parent_entry.height + 1,
                    parent_entry.chain_work,
                    parent_entry.status.is_failed(),
                )
            }
            None => (0, U256::zero(), false),
        };
        let status = if poisoned {
            BlockStatus::FailedChild
        } else {
            BlockStatus::HeaderValid
        };
        let entry = BlockIndexEntry {
            hash,
            height,
            chain_work: parent_work + block_proof(header.bits),
            status,
            sequence: self.next_sequence,
            parent,
            have_data: false,
            header,
        };
        self.next_sequence += 1;
        let handle = Handle(self.entries.len() as u32);
        self.entries.push(entry);
        self.by_hash.insert(hash, handle);
        handle
    }

    /// Restore a persisted entry. Entries must arrive parents-first.
    pub fn restore(&mut self, mut entry: BlockIndexEntry) -> Result<Handle, Hash256> {
        if entry.height > 0 {
            let parent = self
                .lookup(&entry.header.prev_block)
                .ok_or(entry.header.prev_block)?;
            entry.parent = Some(parent);
        }
        let handle = Handle(self.entries.len() as u32);
        self.next_sequence = self.next_sequence.max(entry.sequence + 1);
        self.by_hash.insert(entry.hash, handle);
        self.entries.push(entry);
        Ok(handle)
    }

    /// Advance validity, never regressing and never resurrecting a
    /// failed entry.
    pub fn advance_status(&mut self, handle: Handle, status: BlockStatus) {
        let entry = self.get_mut(handle);
        if entry.status.is_failed() {
            return;
        }
        if status.rank() > entry.status.rank() {
            entry.status = status;
        }
    }

    /// Mark an entry failed and poison every descendant.
    pub fn mark_failed(&mut self, handle: Handle) {
        if !self.entries[handle.index()].status.is_failed() {
            self.entries[handle.index()].status = BlockStatus::Failed;
        }
        // Children always sit at larger arena positions than parents,
        // so one forward pass reaches the whole subtree.
        for index in handle.index() + 1..self.entries.len() {
            let Some(parent) = self.entries[index].parent else {
                continue;
            };
            if self.entries[parent.index()].status.is_failed()
                && !self.entries[index].status.is_failed()
            {
                self.entries[index].status = BlockStatus::FailedChild;
            }
        }
    }

    /// Walk up to the ancestor at the given height.
    pub fn ancestor_at(&self, handle: Handle, height: i32) -> Option<Handle> {
        let mut current = handle;
        loop {
            let entry = self.get(current);
            if entry.height == height {
                return Some(current);
            }
            if entry.height < height {
                return None;
            }
            current = entry.parent?;
        }
    }

    /// Median timestamp of the last eleven blocks ending at `handle`.
    pub fn median_time_past(&self, handle: Handle) -> u32 {
        let mut times = Vec::with_capacity(basaltd_consensus::constants::MEDIAN_TIME_SPAN);
        let mut current = Some(handle);
        while let Some(walk) = current {
            if times.len() == basaltd_consensus::constants::MEDIAN_TIME_SPAN {
                break;
            }
            let entry = self.get(walk);
            times.push(entry.header.time);
            current = entry.parent;
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    pub fn last_common_ancestor(&self, a: Handle, b: Handle) -> Handle {
        let mut left = a;
        let mut right = b;
        let min_height = self.get(left).height.min(self.get(right).height);
        if let Some(ancestor) = self.ancestor_at(left, min_height) {
            left = ancestor;
        }
        if let Some(ancestor) = self.ancestor_at(right, min_height) {
            right = ancestor;
        }
        while left != right {
            let (Some(next_left), Some(next_right)) =
                (self.get(left).parent, self.get(right).parent)
            else {
                break;
            };
            left = next_left;
            right = next_right;
        }
        left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(prev: Hash256, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block: prev,
            merkle_root: [0u8; 32],
            time: 1_000_000 + nonce,
            bits: 0x207f_ffff,
            nonce,
        }
    }

    fn build_chain(index: &mut BlockIndex, length: usize) -> Vec<Handle> {
        let mut handles = Vec::new();
        let genesis = header([0u8; 32], 0);
        let mut prev_hash = genesis.hash();
        handles.push(index.insert(genesis, None));
        for nonce in 1..length as u32 {
            let next = header(prev_hash, nonce);
            prev_hash = next.hash();
            handles.push(index.insert(next, Some(handles[handles.len() - 1])));
        }
        handles
    }

    #[test]
    fn work_accumulates_along_chain() {
        let mut index = BlockIndex::new();
        let handles = build_chain(&mut index, 3);
        let work_one = index.get(handles[1]).chain_work;
        let work_two = index.get(handles[2]).chain_work;
        assert!(work_two > work_one);
        assert_eq!(index.get(handles[2]).height, 2);
    }

    #[test]
    fn duplicate_insert_returns_existing_handle() {
        let mut index = BlockIndex::new();
        let genesis = header([0u8; 32], 0);
        let first = index.insert(genesis, None);
        let second = index.insert(genesis, None);
        assert_eq!(first, second);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn status_is_monotonic() {
        let mut index = BlockIndex::new();
        let handles = build_chain(&mut index, 1);
        index.advance_status(handles[0], BlockStatus::ScriptsValid);
        index.advance_status(handles[0], BlockStatus::TreeValid);
        assert_eq!(index.get(handles[0]).status, BlockStatus::ScriptsValid);
    }

    #[test]
    fn failure_is_terminal_and_poisons_descendants() {
        let mut index = BlockIndex::new();
        let handles = build_chain(&mut index, 4);
        index.mark_failed(handles[1]);
        assert_eq!(index.get(handles[1]).status, BlockStatus::Failed);
        assert_eq!(index.get(handles[2]).status, BlockStatus::FailedChild);
        assert_eq!(index.get(handles[3]).status, BlockStatus::FailedChild);
        // Cannot advance out of the failed state.
        index.advance_status(handles[1], BlockStatus::ScriptsValid);
        assert_eq!(index.get(handles[1]).status, BlockStatus::Failed);
        // New children of a failed parent are born poisoned.
        let tip_hash = index.get(handles[3]).hash;
        let child = index.insert(header(tip_hash, 99), Some(handles[3]));
        assert_eq!(index.get(child).status, BlockStatus::FailedChild);
    }

    #[test]
    fn last_common_ancestor_of_fork() {
        let mut index = BlockIndex::new();
        let handles = build_chain(&mut index, 3);
        // Fork off block 1.
        let fork_parent_hash = index.get(handles[1]).hash;
        let fork_a = index.insert(header(fork_parent_hash, 50), Some(handles[1]));
        assert_eq!(index.last_common_ancestor(fork_a, handles[2]), handles[1]);
        assert_eq!(index.last_common_ancestor(fork_a, fork_a), fork_a);
    }

    #[test]
    fn entry_codec_round_trip() {
        let mut index = BlockIndex::new();
        let handles = build_chain(&mut index, 2);
        let entry = index.get(handles[1]).clone();
        let decoded = BlockIndexEntry::decode(&entry.encode()).expect("decode");
        assert_eq!(decoded.hash, entry.hash);
        assert_eq!(decoded.height, entry.height);
        assert_eq!(decoded.chain_work, entry.chain_work);
        assert_eq!(decoded.status, entry.status);
        assert_eq!(decoded.sequence, entry.sequence);
        assert_eq!(decoded.have_data, entry.have_data);
    }
}
