//! Name records, per-name history, and the write-back name cache.

use std::collections::{BTreeMap, BTreeSet};

use hunterd_consensus::Hash256;
use hunterd_primitives::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use hunterd_primitives::outpoint::OutPoint;
use hunterd_script::names::NameScript;
use hunterd_storage::{Column, WriteBatch};

/// The authoritative state of one registered name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NameData {
    pub value: Vec<u8>,
    pub height: u32,
    pub update_outpoint: OutPoint,
    pub address_script: Vec<u8>,
    pub dead: bool,
}

impl NameData {
    /// Builds the record written by a first update or update output.
    pub fn from_script(height: u32, update_outpoint: OutPoint, op: &NameScript) -> Self {
        assert!(op.is_any_update());
        Self {
            value: op.value().expect("update ops carry a value").to_vec(),
            height,
            update_outpoint,
            address_script: op.address.clone(),
            dead: false,
        }
    }

    /// Builds the tombstone written when the game engine kills the holder.
    /// The slot stays in the database so a later registration can reclaim it.
    pub fn dead(height: u32, kill_txid: Hash256) -> Self {
        Self {
            value: Vec::new(),
            height,
            update_outpoint: OutPoint::new(kill_txid, 0),
            address_script: Vec::new(),
            dead: true,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }
}

impl Encodable for NameData {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_var_bytes(&self.value);
        encoder.write_u32_le(self.height);
        self.update_outpoint.consensus_encode(encoder);
        encoder.write_var_bytes(&self.address_script);
        encoder.write_bool(self.dead);
    }
}

impl Decodable for NameData {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_var_bytes()?;
        let height = decoder.read_u32_le()?;
        let update_outpoint = OutPoint::consensus_decode(decoder)?;
        let address_script = decoder.read_var_bytes()?;
        let dead = decoder.read_bool()?;
        Ok(Self {
            value,
            height,
            update_outpoint,
            address_script,
            dead,
        })
    }
}

/// Prior records of one name, oldest first.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NameHistory(Vec<NameData>);

impl NameHistory {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn data(&self) -> &[NameData] {
        &self.0
    }

    pub fn push(&mut self, data: NameData) {
        self.0.push(data);
    }

    /// Removes the top entry while undoing an operation.  The entry removed
    /// must be the record being restored, otherwise the caches are corrupt.
    pub fn pop(&mut self, restored: &NameData) {
        let top = self.0.pop();
        assert_eq!(top.as_ref(), Some(restored));
    }
}

impl Encodable for NameHistory {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_varint(self.0.len() as u64);
        for entry in &self.0 {
            entry.consensus_encode(encoder);
        }
    }
}

impl Decodable for NameHistory {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let len = decoder.read_varint()? as usize;
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            entries.push(NameData::consensus_decode(decoder)?);
        }
        Ok(Self(entries))
    }
}

/// Dirty name-state accumulated between flushes.
#[derive(Clone, Debug, Default)]
pub struct NameCache {
    entries: BTreeMap<Vec<u8>, NameData>,
    deleted: BTreeSet<Vec<u8>>,
    history: BTreeMap<Vec<u8>, NameHistory>,
}

impl NameCache {
    pub fn get(&self, name: &[u8]) -> Option<&NameData> {
        self.entries.get(name)
    }

    pub fn is_deleted(&self, name: &[u8]) -> bool {
        self.deleted.contains(name)
    }

    pub fn set(&mut self, name: &[u8], data: NameData) {
        self.deleted.remove(name);
        self.entries.insert(name.to_vec(), data);
    }

    pub fn delete(&mut self, name: &[u8]) {
        self.entries.remove(name);
        self.deleted.insert(name.to_vec());
    }

    pub fn get_history(&self, name: &[u8]) -> Option<&NameHistory> {
        self.history.get(name)
    }

    pub fn set_history(&mut self, name: &[u8], history: NameHistory) {
        self.history.insert(name.to_vec(), history);
    }

    pub fn entries(&self) -> &BTreeMap<Vec<u8>, NameData> {
        &self.entries
    }

    pub fn deleted(&self) -> &BTreeSet<Vec<u8>> {
        &self.deleted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.deleted.clear();
        self.history.clear();
    }

    pub fn write_batch(&self, history_enabled: bool, batch: &mut WriteBatch) {
        for (name, data) in &self.entries {
            batch.put(
                Column::Name,
                name.as_slice(),
                hunterd_primitives::encoding::encode(data),
            );
        }
        for name in &self.deleted {
            batch.delete(Column::Name, name.as_slice());
        }

        assert!(history_enabled || self.history.is_empty());
        for (name, history) in &self.history {
            if history.is_empty() {
                batch.delete(Column::NameHistory, name.as_slice());
            } else {
                batch.put(
                    Column::NameHistory,
                    name.as_slice(),
                    hunterd_primitives::encoding::encode(history),
                );
            }
        }
    }
}
