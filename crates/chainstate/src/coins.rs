//! The unspent-output set: a storage-backed view plus a layered
//! write-back cache with dirty/fresh bookkeeping.

use std::collections::HashMap;

use basaltd_primitives::encoding::{DecodeError, Decoder, Encoder};
use basaltd_primitives::outpoint::OutPoint;
use basaltd_storage::{Column, KeyValueStore, StoreError, WriteBatch};

/// A spendable transaction output and the metadata needed to validate
/// a spend of it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Coin {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
    pub height: u32,
    pub is_coinbase: bool,
}

impl Coin {
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
        encoder.write_u32_le(self.height);
        encoder.write_u8(if self.is_coinbase { 1 } else { 0 });
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        let height = decoder.read_u32_le()?;
        let is_coinbase = decoder.read_u8()? != 0;
        decoder.finish()?;
        Ok(Self {
            value,
            script_pubkey,
            height,
            is_coinbase,
        })
    }
}

pub type OutPointKey = [u8; 36];

pub fn outpoint_key(outpoint: &OutPoint) -> OutPointKey {
    let mut key = [0u8; 36];
    key[..32].copy_from_slice(&outpoint.txid);
    key[32..].copy_from_slice(&outpoint.vout.to_le_bytes());
    key
}

pub fn outpoint_from_key(key: &OutPointKey) -> OutPoint {
    let mut txid = [0u8; 32];
    txid.copy_from_slice(&key[..32]);
    let vout = u32::from_le_bytes([key[32], key[33], key[34], key[35]]);
    OutPoint { txid, vout }
}

#[derive(Debug)]
pub enum CoinsError {
    /// The outpoint is not present in any layer.
    CoinNotFound,
    /// An unspent coin already exists at this outpoint.
    DoubleAdd,
    Store(StoreError),
    Decode(DecodeError),
}

impl std::fmt::Display for CoinsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoinsError::CoinNotFound => write!(f, "coin not found"),
            CoinsError::DoubleAdd => write!(f, "coin already unspent at outpoint"),
            CoinsError::Store(err) => write!(f, "{err}"),
            CoinsError::Decode(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CoinsError {}

impl From<StoreError> for CoinsError {
    fn from(err: StoreError) -> Self {
        CoinsError::Store(err)
    }
}

impl From<DecodeError> for CoinsError {
    fn from(err: DecodeError) -> Self {
        CoinsError::Decode(err)
    }
}

/// One flushed mutation. `fresh` asserts the receiving layer's parent
/// has never seen this outpoint, letting a spent entry vanish instead
/// of producing a delete.
pub struct CoinChange {
    pub outpoint: OutPoint,
    pub coin: Option<Coin>,
    pub fresh: bool,
}

/// Read/flush interface shared by the backing store and cache layers.
pub trait CoinsView {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsError>;

    fn have_coin(&self, outpoint: &OutPoint) -> Result<bool, CoinsError> {
        Ok(self.coin(outpoint)?.is_some())
    }

    fn batch_write(&mut self, changes: Vec<CoinChange>) -> Result<(), CoinsError>;
}

impl<V: CoinsView + ?Sized> CoinsView for &mut V {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsError> {
        (**self).coin(outpoint)
    }

    fn batch_write(&mut self, changes: Vec<CoinChange>) -> Result<(), CoinsError> {
        (**self).batch_write(changes)
    }
}

/// Coin set persisted in `Column::Coin` of the backing store.
pub struct CoinsDb<S> {
    store: S,
}

impl<S> CoinsDb<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> CoinsView for CoinsDb<S> {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsError> {
        let key = outpoint_key(outpoint);
        match self.store.get(Column::Coin, &key)? {
            Some(bytes) => Ok(Some(Coin::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn batch_write(&mut self, changes: Vec<CoinChange>) -> Result<(), CoinsError> {
        let mut batch = WriteBatch::new();
        for change in changes {
            let key = outpoint_key(&change.outpoint);
            match change.coin {
                Some(coin) => batch.put(Column::Coin, key.to_vec(), coin.encode()),
                None => {
                    // A fresh spent entry never reached this store.
                    if !change.fresh {
                        batch.delete(Column::Coin, key.to_vec());
                    }
                }
            }
        }
        self.store.write_batch(batch)?;
        Ok(())
    }
}

const DIRTY: u8 = 1 << 0;
const FRESH: u8 = 1 << 1;

struct CacheEntry {
    coin: Option<Coin>,
    flags: u8,
}

/// Write-back overlay over any `CoinsView`. Reads populate the cache,
/// mutations stay local until `flush` pushes them down in one batch.
pub struct CoinsCache<V> {
    parent: V,
    entries: HashMap<OutPointKey, CacheEntry>,
}

impl<V: CoinsView> CoinsCache<V> {
    pub fn new(parent: V) -> Self {
        Self {
            parent,
            entries: HashMap::new(),
        }
    }

    pub fn cached_count(&self) -> usize {
        self.entries.len()
    }

    /// Lookup that caches parent misses and hits alike. A miss in every
    /// layer is remembered as a spent non-dirty entry.
    pub fn get_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsError> {
        let key = outpoint_key(outpoint);
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.coin.clone());
        }
        let coin = self.parent.coin(outpoint)?;
        self.entries.insert(
            key,
            CacheEntry {
                coin: coin.clone(),
                flags: 0,
            },
        );
        Ok(coin)
    }

    pub fn have_coin_mut(&mut self, outpoint: &OutPoint) -> Result<bool, CoinsError> {
        Ok(self.get_coin(outpoint)?.is_some())
    }

    /// Insert a newly created output.
    ///
    /// The entry is marked fresh when no prior unspent value can exist
    /// in an underlying layer, so a later in-cache spend never emits a
    /// delete for a key the backing store has not seen.
    pub fn add_coin(
        &mut self,
        outpoint: &OutPoint,
        coin: Coin,
        possible_overwrite: bool,
    ) -> Result<(), CoinsError> {
        let key = outpoint_key(outpoint);
        match self.entries.get_mut(&key) {
            Some(entry) => {
                if entry.coin.is_some() && !possible_overwrite {
                    return Err(CoinsError::DoubleAdd);
                }
                // A spent non-dirty entry proves the parent has no coin
                // either, so the rewrite is fresh.
                let fresh = !possible_overwrite
                    && entry.coin.is_none()
                    && (entry.flags & DIRTY == 0 || entry.flags & FRESH != 0);
                entry.coin = Some(coin);
                entry.flags |= DIRTY;
                if fresh {
                    entry.flags |= FRESH;
                }
            }
            None => {
                // New outputs cannot already exist below us: txids are
                // unique over the unspent set.
                let flags = if possible_overwrite { DIRTY } else { DIRTY | FRESH };
                self.entries.insert(
                    key,
                    CacheEntry {
                        coin: Some(coin),
                        flags,
                    },
                );
            }
        }
        Ok(())
    }

    /// Remove a coin, returning it. Spending a fresh entry drops it
    /// outright so no tombstone reaches the parent.
    pub fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Coin, CoinsError> {
        let key = outpoint_key(outpoint);
        if self.get_coin(outpoint)?.is_none() {
            return Err(CoinsError::CoinNotFound);
        }
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or(CoinsError::CoinNotFound)?;
        let coin = entry.coin.take().ok_or(CoinsError::CoinNotFound)?;
        if entry.flags & FRESH != 0 {
            self.entries.remove(&key);
        } else {
            entry.flags |= DIRTY;
        }
        Ok(coin)
    }

    /// Push every dirty entry to the parent as one atomic batch and
    /// drop the cache contents.
    pub fn flush(&mut self) -> Result<(), CoinsError> {
        let mut changes = Vec::new();
        for (key, entry) in self.entries.drain() {
            if entry.flags & DIRTY == 0 {
                continue;
            }
            changes.push(CoinChange {
                outpoint: outpoint_from_key(&key),
                coin: entry.coin,
                fresh: entry.flags & FRESH != 0,
            });
        }
        if changes.is_empty() {
            return Ok(());
        }
        self.parent.batch_write(changes)
    }
}

impl<V: CoinsView> CoinsView for CoinsCache<V> {
    /// Read-through lookup that does not populate the cache; use
    /// `get_coin` on a mutable cache where possible.
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsError> {
        let key = outpoint_key(outpoint);
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.coin.clone());
        }
        self.parent.coin(outpoint)
    }

    /// Receive a child cache's flush, merging flags so fresh entries
    /// stay fresh across layers.
    fn batch_write(&mut self, changes: Vec<CoinChange>) -> Result<(), CoinsError> {
        for change in changes {
            let key = outpoint_key(&change.outpoint);
            match self.entries.get_mut(&key) {
                Some(entry) => {
                    if change.coin.is_none() && entry.flags & FRESH != 0 {
                        self.entries.remove(&key);
                        continue;
                    }
                    entry.coin = change.coin;
                    entry.flags |= DIRTY;
                }
                None => {
                    if change.coin.is_none() && change.fresh {
                        continue;
                    }
                    let mut flags = DIRTY;
                    if change.fresh {
                        flags |= FRESH;
                    }
                    self.entries.insert(
                        key,
                        CacheEntry {
                            coin: change.coin,
                            flags,
                        },
                    );
                }
            }
        }
        Ok(())
    }
}
