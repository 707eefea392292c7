//! Block and block header types.

use basaltd_consensus::Hash256;

use crate::encoding::{var_int_size, DecodeError, Decoder, Encoder};
use crate::hash::{merkle_root, sha256d};
use crate::transaction::Transaction;

pub const HEADER_SIZE: usize = 80;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(HEADER_SIZE);
        self.encode_to(&mut encoder);
        encoder.into_inner()
    }

    pub fn encode_to(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_hash(&self.prev_block);
        encoder.write_hash(&self.merkle_root);
        encoder.write_u32_le(self.time);
        encoder.write_u32_le(self.bits);
        encoder.write_u32_le(self.nonce);
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = Self::decode_from(&mut decoder)?;
        decoder.finish()?;
        Ok(header)
    }

    pub fn decode_from(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.read_i32_le()?,
            prev_block: decoder.read_hash()?,
            merkle_root: decoder.read_hash()?,
            time: decoder.read_u32_le()?,
            bits: decoder.read_u32_le()?,
            nonce: decoder.read_u32_le()?,
        })
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(self.serialized_size());
        self.header.encode_to(&mut encoder);
        encoder.write_var_int(self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode_to(&mut encoder);
        }
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = BlockHeader::decode_from(&mut decoder)?;
        let count = decoder.read_var_int()?;
        let mut transactions = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            transactions.push(Transaction::decode_from(&mut decoder)?);
        }
        decoder.finish()?;
        Ok(Self {
            header,
            transactions,
        })
    }

    pub fn serialized_size(&self) -> usize {
        let mut size = HEADER_SIZE + var_int_size(self.transactions.len() as u64);
        for tx in &self.transactions {
            size += tx.serialized_size();
        }
        size
    }

    pub fn txids(&self) -> Vec<Hash256> {
        self.transactions.iter().map(Transaction::txid).collect()
    }

    /// Merkle root computed from the block's transactions.
    pub fn computed_merkle_root(&self) -> Hash256 {
        merkle_root(&self.txids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outpoint::OutPoint;
    use crate::transaction::{TxIn, TxOut};

    fn sample_block() -> Block {
        let coinbase = Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig: vec![0x51, 0x00],
                sequence: 0xffff_ffff,
            }],
            vout: vec![TxOut {
                value: 5_000_000_000,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        };
        let mut block = Block {
            header: BlockHeader {
                version: 1,
                prev_block: [0u8; 32],
                merkle_root: [0u8; 32],
                time: 1_296_688_602,
                bits: 0x207f_ffff,
                nonce: 0,
            },
            transactions: vec![coinbase],
        };
        block.header.merkle_root = block.computed_merkle_root();
        block
    }

    #[test]
    fn header_is_eighty_bytes() {
        let block = sample_block();
        assert_eq!(block.header.consensus_encode().len(), HEADER_SIZE);
    }

    #[test]
    fn block_round_trip() {
        let block = sample_block();
        let bytes = block.consensus_encode();
        assert_eq!(bytes.len(), block.serialized_size());
        let decoded = Block::consensus_decode(&bytes).expect("decode");
        assert_eq!(decoded, block);
        assert_eq!(decoded.header.hash(), block.header.hash());
    }

    #[test]
    fn merkle_root_matches_single_tx() {
        let block = sample_block();
        assert_eq!(block.header.merkle_root, block.transactions[0].txid());
    }
}
