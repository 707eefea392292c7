//! The active chain as a height-indexed vector of index handles.

use crate::blockindex::{BlockIndex, Handle};

/// Handles of the active chain, position = height. Rebuilt whenever the
/// tip moves by walking parent links from the new tip.
#[derive(Default)]
pub struct Chain {
    handles: Vec<Handle>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn height(&self) -> i32 {
        self.handles.len() as i32 - 1
    }

    pub fn tip(&self) -> Option<Handle> {
        self.handles.last().copied()
    }

    pub fn at_height(&self, height: i32) -> Option<Handle> {
        if height < 0 {
            return None;
        }
        self.handles.get(height as usize).copied()
    }

    pub fn contains(&self, index: &BlockIndex, handle: Handle) -> bool {
        self.at_height(index.get(handle).height) == Some(handle)
    }

    pub fn set_tip(&mut self, index: &BlockIndex, tip: Handle) {
        let tip_height = index.get(tip).height;
        self.handles.resize(tip_height as usize + 1, tip);
        let mut current = Some(tip);
        while let Some(handle) = current {
            let entry = index.get(handle);
            if self.handles[entry.height as usize] == handle && entry.height != tip_height {
                // Unchanged below this point.
                break;
            }
            self.handles[entry.height as usize] = handle;
            current = entry.parent;
        }
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basaltd_primitives::block::BlockHeader;

    fn header(prev: [u8; 32], nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block: prev,
            merkle_root: [0u8; 32],
            time: 1_000_000 + nonce,
            bits: 0x207f_ffff,
            nonce,
        }
    }

    #[test]
    fn set_tip_walks_and_replaces_fork() {
        let mut index = BlockIndex::new();
        let genesis = header([0u8; 32], 0);
        let genesis_hash = genesis.hash();
        let g = index.insert(genesis, None);
        let block_a = header(genesis_hash, 1);
        let a_hash = block_a.hash();
        let a = index.insert(block_a, Some(g));
        let b = index.insert(header(a_hash, 2), Some(a));

        let mut chain = Chain::new();
        assert_eq!(chain.height(), -1);
        chain.set_tip(&index, b);
        assert_eq!(chain.height(), 2);
        assert_eq!(chain.at_height(0), Some(g));
        assert_eq!(chain.at_height(1), Some(a));
        assert_eq!(chain.tip(), Some(b));
        assert!(chain.contains(&index, a));

        // Reorg to a sibling of `a`.
        let a2 = index.insert(header(genesis_hash, 9), Some(g));
        chain.set_tip(&index, a2);
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.tip(), Some(a2));
        assert!(!chain.contains(&index, a));
        assert!(chain.contains(&index, g));
    }
}
