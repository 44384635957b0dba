//! Coin records and the layered coin/name view.
//!
//! `DbCoinView` reads straight from the backing store; `CoinViewCache` is the
//! in-memory overlay the consensus engine mutates while connecting or
//! disconnecting a block, flushed as one write batch.

use std::collections::HashMap;

use hunterd_consensus::Hash256;
use hunterd_primitives::encoding::{decode, encode, Decodable, DecodeError, Decoder, Encodable, Encoder};
use hunterd_primitives::outpoint::OutPoint;
use hunterd_primitives::transaction::{Transaction, TxOut};
use hunterd_storage::{Column, KeyValueStore, StoreError, WriteBatch};

use crate::namedb::{NameCache, NameData, NameHistory};
use crate::undo::SpentOutput;

/// The unspent outputs of one transaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Coins {
    pub height: u32,
    pub outputs: Vec<Option<TxOut>>,
}

impl Coins {
    pub fn from_tx(tx: &Transaction, height: u32) -> Self {
        Self {
            height,
            outputs: tx.vout.iter().map(|out| Some(out.clone())).collect(),
        }
    }

    pub fn is_available(&self, index: u32) -> bool {
        self.outputs
            .get(index as usize)
            .map(Option::is_some)
            .unwrap_or(false)
    }

    pub fn output(&self, index: u32) -> Option<&TxOut> {
        self.outputs.get(index as usize).and_then(Option::as_ref)
    }

    pub fn spend(&mut self, index: u32) -> Option<TxOut> {
        self.outputs.get_mut(index as usize).and_then(Option::take)
    }

    pub fn is_pruned(&self) -> bool {
        self.outputs.iter().all(Option::is_none)
    }
}

impl Encodable for Coins {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_u32_le(self.height);
        encoder.write_varint(self.outputs.len() as u64);
        for output in &self.outputs {
            match output {
                Some(output) => {
                    encoder.write_bool(true);
                    output.consensus_encode(encoder);
                }
                None => encoder.write_bool(false),
            }
        }
    }
}

impl Decodable for Coins {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let height = decoder.read_u32_le()?;
        let len = decoder.read_varint()? as usize;
        let mut outputs = Vec::with_capacity(len);
        for _ in 0..len {
            if decoder.read_bool()? {
                outputs.push(Some(TxOut::consensus_decode(decoder)?));
            } else {
                outputs.push(None);
            }
        }
        Ok(Self { height, outputs })
    }
}

/// Read access to the coin and name databases.
pub trait CoinView {
    fn get_coins(&self, txid: &Hash256) -> Result<Option<Coins>, StoreError>;
    fn get_name(&self, name: &[u8]) -> Result<Option<NameData>, StoreError>;
    fn get_name_history(&self, name: &[u8]) -> Result<NameHistory, StoreError>;
    /// All names at or after `start`, in lexicographic byte order.
    fn names_from(&self, start: &[u8]) -> Result<Vec<(Vec<u8>, NameData)>, StoreError>;
}

/// Disk-backed view over the chainstate key-value store.
pub struct DbCoinView<S> {
    store: S,
    name_history: bool,
}

impl<S: KeyValueStore> DbCoinView<S> {
    pub fn new(store: S, name_history: bool) -> Self {
        Self {
            store,
            name_history,
        }
    }

    pub fn name_history_enabled(&self) -> bool {
        self.name_history
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

fn decode_record<T: Decodable>(bytes: &[u8], what: &str) -> Result<T, StoreError> {
    decode(bytes).map_err(|err| StoreError::Backend(format!("corrupt {what} record: {err}")))
}

impl<S: KeyValueStore> CoinView for DbCoinView<S> {
    fn get_coins(&self, txid: &Hash256) -> Result<Option<Coins>, StoreError> {
        match self.store.get(Column::Coins, txid)? {
            Some(bytes) => Ok(Some(decode_record(&bytes, "coins")?)),
            None => Ok(None),
        }
    }

    fn get_name(&self, name: &[u8]) -> Result<Option<NameData>, StoreError> {
        match self.store.get(Column::Name, name)? {
            Some(bytes) => Ok(Some(decode_record(&bytes, "name")?)),
            None => Ok(None),
        }
    }

    fn get_name_history(&self, name: &[u8]) -> Result<NameHistory, StoreError> {
        assert!(self.name_history);
        match self.store.get(Column::NameHistory, name)? {
            Some(bytes) => decode_record(&bytes, "name history"),
            None => Ok(NameHistory::default()),
        }
    }

    fn names_from(&self, start: &[u8]) -> Result<Vec<(Vec<u8>, NameData)>, StoreError> {
        let mut names = Vec::new();
        for (key, value) in self.store.scan_prefix(Column::Name, b"")? {
            if key.as_slice() < start {
                continue;
            }
            names.push((key, decode_record::<NameData>(&value, "name")?));
        }
        Ok(names)
    }
}

/// In-memory overlay over a `DbCoinView`.  All consensus mutations go through
/// here; `flush` persists them as a single batch.
pub struct CoinViewCache<'a, S> {
    base: &'a DbCoinView<S>,
    /// `None` marks a coin record removed outright (block disconnect).
    coins: HashMap<Hash256, Option<Coins>>,
    names: NameCache,
}

impl<'a, S: KeyValueStore> CoinViewCache<'a, S> {
    pub fn new(base: &'a DbCoinView<S>) -> Self {
        Self {
            base,
            coins: HashMap::new(),
            names: NameCache::default(),
        }
    }

    pub fn base(&self) -> &'a DbCoinView<S> {
        self.base
    }

    pub fn name_history_enabled(&self) -> bool {
        self.base.name_history
    }

    pub fn set_coins(&mut self, txid: Hash256, coins: Coins) {
        self.coins.insert(txid, Some(coins));
    }

    /// Enters all outputs of `tx` into the view.
    pub fn add_tx_outputs(&mut self, tx: &Transaction, height: u32) {
        self.set_coins(tx.txid(), Coins::from_tx(tx, height));
    }

    /// Removes a transaction's coin record outright (used when disconnecting
    /// the block that created it).
    pub fn remove_coins(&mut self, txid: &Hash256) {
        self.coins.insert(*txid, None);
    }

    /// Marks one output spent.  Returns the restore record, or `None` when
    /// the output was already gone.
    pub fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Option<SpentOutput>, StoreError> {
        let mut coins = match self.get_coins(&outpoint.hash)? {
            Some(coins) => coins,
            None => return Ok(None),
        };
        let height = coins.height;
        let spent = coins.spend(outpoint.index);
        self.coins.insert(outpoint.hash, Some(coins));
        Ok(spent.map(|output| SpentOutput {
            outpoint: outpoint.clone(),
            output,
            height,
        }))
    }

    /// Recreates a spent output from its undo record.
    pub fn restore_coin(&mut self, spent: &SpentOutput) -> Result<(), StoreError> {
        let mut coins = self
            .get_coins(&spent.outpoint.hash)?
            .unwrap_or(Coins {
                height: spent.height,
                outputs: Vec::new(),
            });
        assert_eq!(coins.height, spent.height);
        let index = spent.outpoint.index as usize;
        if coins.outputs.len() <= index {
            coins.outputs.resize(index + 1, None);
        }
        coins.outputs[index] = Some(spent.output.clone());
        self.coins.insert(spent.outpoint.hash, Some(coins));
        Ok(())
    }

    /// Upserts a name record.  During forward application (`undo == false`)
    /// the previous record is pushed onto the name's history; during reverse
    /// replay (`undo == true`) the matching history entry is popped instead,
    /// so apply/undo pairs leave the history untouched.
    pub fn set_name(&mut self, name: &[u8], data: NameData, undo: bool) -> Result<(), StoreError> {
        if self.base.name_history {
            if let Some(old) = self.get_name(name)? {
                let mut history = self.get_name_history(name)?;
                if undo {
                    history.pop(&data);
                } else {
                    history.push(old);
                }
                self.names.set_history(name, history);
            }
        }
        self.names.set(name, data);
        Ok(())
    }

    /// Removes a record entirely.  Only undo of a fresh registration does
    /// this; the name must exist.
    pub fn delete_name(&mut self, name: &[u8]) -> Result<(), StoreError> {
        assert!(self.get_name(name)?.is_some(), "deleting unknown name");
        self.names.delete(name);
        Ok(())
    }

    /// Persists all pending coin and name writes in one batch.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        for (txid, entry) in &self.coins {
            match entry {
                Some(coins) if !coins.is_pruned() => {
                    batch.put(Column::Coins, txid, encode(coins));
                }
                _ => batch.delete(Column::Coins, txid),
            }
        }
        self.names.write_batch(self.base.name_history, &mut batch);
        self.base.store.write_batch(&batch)?;
        self.coins.clear();
        self.names.clear();
        Ok(())
    }
}

impl<'a, S: KeyValueStore> CoinView for CoinViewCache<'a, S> {
    fn get_coins(&self, txid: &Hash256) -> Result<Option<Coins>, StoreError> {
        if let Some(entry) = self.coins.get(txid) {
            return Ok(entry.clone());
        }
        self.base.get_coins(txid)
    }

    fn get_name(&self, name: &[u8]) -> Result<Option<NameData>, StoreError> {
        if let Some(data) = self.names.get(name) {
            return Ok(Some(data.clone()));
        }
        if self.names.is_deleted(name) {
            return Ok(None);
        }
        self.base.get_name(name)
    }

    fn get_name_history(&self, name: &[u8]) -> Result<NameHistory, StoreError> {
        if let Some(history) = self.names.get_history(name) {
            return Ok(history.clone());
        }
        self.base.get_name_history(name)
    }

    fn names_from(&self, start: &[u8]) -> Result<Vec<(Vec<u8>, NameData)>, StoreError> {
        let mut merged: std::collections::BTreeMap<Vec<u8>, NameData> =
            self.base.names_from(start)?.into_iter().collect();
        for name in self.names.deleted() {
            merged.remove(name);
        }
        for (name, data) in self.names.entries() {
            if name.as_slice() >= start {
                merged.insert(name.clone(), data.clone());
            }
        }
        Ok(merged.into_iter().collect())
    }
}
