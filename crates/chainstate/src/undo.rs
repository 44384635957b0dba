//! Per-block undo data for coins and name operations.

use hunterd_primitives::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use hunterd_primitives::outpoint::OutPoint;
use hunterd_primitives::transaction::TxOut;
use hunterd_storage::{KeyValueStore, StoreError};

use crate::coins::{CoinView, CoinViewCache};
use crate::namedb::NameData;

const BLOCK_UNDO_VERSION: u8 = 1;

/// One spent input; restoring it recreates the output in the coin view.
#[derive(Clone, Debug, PartialEq)]
pub struct SpentOutput {
    pub outpoint: OutPoint,
    pub output: TxOut,
    pub height: u32,
}

/// Captures the state of one name before an operation touched it.
#[derive(Clone, Debug, PartialEq)]
pub struct NameTxUndo {
    name: Vec<u8>,
    is_new: bool,
    old_data: Option<NameData>,
}

impl NameTxUndo {
    pub fn from_old_state<V: CoinView>(name: &[u8], view: &V) -> Result<Self, StoreError> {
        let old_data = view.get_name(name)?;
        Ok(Self {
            name: name.to_vec(),
            is_new: old_data.is_none(),
            old_data,
        })
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn apply<S: KeyValueStore>(&self, view: &mut CoinViewCache<'_, S>) -> Result<(), StoreError> {
        if self.is_new {
            view.delete_name(&self.name)
        } else {
            let old = self.old_data.clone().expect("undo data for existing name");
            view.set_name(&self.name, old, true)
        }
    }
}

impl Encodable for NameTxUndo {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_var_bytes(&self.name);
        encoder.write_bool(self.is_new);
        if let Some(data) = &self.old_data {
            data.consensus_encode(encoder);
        }
    }
}

impl Decodable for NameTxUndo {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let name = decoder.read_var_bytes()?;
        let is_new = decoder.read_bool()?;
        let old_data = if is_new {
            None
        } else {
            Some(NameData::consensus_decode(decoder)?)
        };
        Ok(Self {
            name,
            is_new,
            old_data,
        })
    }
}

/// Undo data for a whole block: coin restores first, then the name undo list
/// in application order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockUndo {
    pub spent: Vec<SpentOutput>,
    pub name_undo: Vec<NameTxUndo>,
}

impl BlockUndo {
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_u8(BLOCK_UNDO_VERSION);
        encoder.write_u32_le(self.spent.len() as u32);
        for spent in &self.spent {
            spent.outpoint.consensus_encode(&mut encoder);
            spent.output.consensus_encode(&mut encoder);
            encoder.write_u32_le(spent.height);
        }
        encoder.write_u32_le(self.name_undo.len() as u32);
        for entry in &self.name_undo {
            entry.consensus_encode(&mut encoder);
        }
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let version = decoder.read_u8()?;
        if version != BLOCK_UNDO_VERSION {
            return Err(DecodeError::InvalidData("unsupported block undo version"));
        }
        let spent_len = decoder.read_u32_le()? as usize;
        let mut spent = Vec::with_capacity(spent_len);
        for _ in 0..spent_len {
            let outpoint = OutPoint::consensus_decode(&mut decoder)?;
            let output = TxOut::consensus_decode(&mut decoder)?;
            let height = decoder.read_u32_le()?;
            spent.push(SpentOutput {
                outpoint,
                output,
                height,
            });
        }
        let name_len = decoder.read_u32_le()? as usize;
        let mut name_undo = Vec::with_capacity(name_len);
        for _ in 0..name_len {
            name_undo.push(NameTxUndo::consensus_decode(&mut decoder)?);
        }
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self { spent, name_undo })
    }
}
