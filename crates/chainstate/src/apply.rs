//! Application of validated name operations to the coin view.

use hunterd_consensus::constants::MEMPOOL_HEIGHT;
use hunterd_consensus::{BugType, ChainParams, Hash256};
use hunterd_log::{log_debug, log_error};
use hunterd_primitives::hex::hash256_to_hex;
use hunterd_primitives::outpoint::OutPoint;
use hunterd_primitives::transaction::Transaction;
use hunterd_script::names::NameScript;
use hunterd_storage::{KeyValueStore, StoreError};

use crate::coins::CoinViewCache;
use crate::namedb::NameData;
use crate::undo::{BlockUndo, NameTxUndo};

/// Applies the name effects of `tx` to the view and records undo entries in
/// output order.  The transaction must already have passed
/// `check_name_transaction` at this height.
pub fn apply_name_transaction<S: KeyValueStore>(
    tx: &Transaction,
    height: u32,
    view: &mut CoinViewCache<'_, S>,
    undo: &mut BlockUndo,
    params: &ChainParams,
) -> Result<(), StoreError> {
    assert_ne!(height, MEMPOOL_HEIGHT);
    let txid = tx.txid();

    // Historic bugs that must not be applied leave the name database alone.
    // Their name outputs are marked spent so that the UTXO set does not
    // diverge from the name database.
    if let Some(bug) = params.is_historic_bug(&txid, height) {
        if bug != BugType::FullyApply {
            if bug == BugType::FullyIgnore {
                for (index, output) in tx.vout.iter().enumerate() {
                    let Some(op) = NameScript::parse(&output.script_pubkey) else {
                        continue;
                    };
                    if !op.is_any_update() {
                        continue;
                    }
                    let outpoint = OutPoint::new(txid, index as u32);
                    if view.spend_coin(&outpoint)?.is_none() {
                        log_error!(
                            "ERROR: spending buggy name output {}:{} failed",
                            hash256_to_hex(&txid),
                            index
                        );
                    }
                }
            }
            return Ok(());
        }
    }

    // Some of the buggy transactions handled above are not even flagged as
    // Namecoin transactions, so this comes second.
    if !tx.is_namecoin() {
        return Ok(());
    }

    for (index, output) in tx.vout.iter().enumerate() {
        let Some(op) = NameScript::parse(&output.script_pubkey) else {
            continue;
        };
        if !op.is_any_update() {
            continue;
        }
        let name = op.name().expect("update ops carry a name").to_vec();
        log_debug!(
            "updating name at height {height}: {}",
            String::from_utf8_lossy(&name)
        );

        let op_undo = NameTxUndo::from_old_state(&name, view)?;
        undo.name_undo.push(op_undo);

        let data = NameData::from_script(height, OutPoint::new(txid, index as u32), &op);
        view.set_name(&name, data, false)?;
    }

    Ok(())
}

/// Writes the dead record for a player killed by the game engine at this
/// block.  The slot becomes reclaimable by a later registration.
pub fn kill_name<S: KeyValueStore>(
    name: &[u8],
    height: u32,
    kill_txid: &Hash256,
    view: &mut CoinViewCache<'_, S>,
    undo: &mut BlockUndo,
) -> Result<(), StoreError> {
    log_debug!(
        "killing player at height {height}: {}",
        String::from_utf8_lossy(name)
    );

    let op_undo = NameTxUndo::from_old_state(name, view)?;
    undo.name_undo.push(op_undo);

    view.set_name(name, NameData::dead(height, *kill_txid), false)
}

/// Replays a block's name undo list in reverse, restoring the pre-block name
/// database exactly.
pub fn undo_name_transactions<S: KeyValueStore>(
    undo: &BlockUndo,
    view: &mut CoinViewCache<'_, S>,
) -> Result<(), StoreError> {
    for entry in undo.name_undo.iter().rev() {
        entry.apply(view)?;
    }
    Ok(())
}
