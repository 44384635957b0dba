//! Cross-validation of the UTXO set, name database, and game database.

use std::collections::{BTreeMap, BTreeSet};

use hunterd_consensus::money::Amount;
use hunterd_log::{log_error, log_info};
use hunterd_primitives::encoding::decode;
use hunterd_script::names::NameScript;
use hunterd_storage::{Column, KeyValueStore, StoreError};

use crate::coins::{CoinView, CoinViewCache, Coins, DbCoinView};
use crate::namedb::NameData;

/// The checker's window into the downstream game database: the set of living
/// players together with their locked coins.
pub trait GameStateView {
    fn players(&self) -> Result<BTreeMap<Vec<u8>, Amount>, StoreError>;
}

#[derive(Debug)]
pub enum NameDbError {
    Store(StoreError),
    Corrupt(&'static str),
    DuplicateUtxoName(Vec<u8>),
    /// Game players and the name amounts locked in the UTXO set diverge.
    GameMismatch,
    LivingNameNotInUtxo(Vec<u8>),
    UtxoNameNotInDb(Vec<u8>),
    /// A living record whose `update_outpoint` does not resolve to a UTXO
    /// with the recorded name, height, and address.
    UtxoRecordMismatch(Vec<u8>),
    HistoryForUnknownName(Vec<u8>),
    HistoryWithoutTracking,
}

impl std::fmt::Display for NameDbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let render = |name: &[u8]| String::from_utf8_lossy(name).into_owned();
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Corrupt(message) => write!(f, "{message}"),
            Self::DuplicateUtxoName(name) => {
                write!(f, "name {} duplicated in UTXO set", render(name))
            }
            Self::GameMismatch => write!(f, "game state and name DB mismatch"),
            Self::LivingNameNotInUtxo(name) => {
                write!(f, "name {} in DB but not UTXO set", render(name))
            }
            Self::UtxoNameNotInDb(name) => {
                write!(f, "name {} in UTXO set but not DB", render(name))
            }
            Self::UtxoRecordMismatch(name) => {
                write!(f, "name {} disagrees with its UTXO record", render(name))
            }
            Self::HistoryForUnknownName(name) => {
                write!(f, "history entry for name {} not in main DB", render(name))
            }
            Self::HistoryWithoutTracking => {
                write!(f, "name history entries in DB, but history is not enabled")
            }
        }
    }
}

impl std::error::Error for NameDbError {}

impl From<StoreError> for NameDbError {
    fn from(err: StoreError) -> Self {
        NameDbError::Store(err)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NameDbStats {
    pub living: usize,
    pub total: usize,
    pub with_history: usize,
}

/// Full scan comparing the UTXO set, the name database, optional history
/// entries, and the game database's player set against each other.
pub fn validate_name_db<S: KeyValueStore>(
    db: &DbCoinView<S>,
    game: &dyn GameStateView,
) -> Result<NameDbStats, NameDbError> {
    let store = db.store();

    // Collect every living name output in the UTXO set with its amount.
    let mut names_in_utxo: BTreeMap<Vec<u8>, Amount> = BTreeMap::new();
    for (_, value) in store.scan_prefix(Column::Coins, b"")? {
        let coins: Coins =
            decode(&value).map_err(|_| NameDbError::Corrupt("failed to read coins record"))?;
        for output in coins.outputs.iter().flatten() {
            let Some(op) = NameScript::parse(&output.script_pubkey) else {
                continue;
            };
            if !op.is_any_update() {
                continue;
            }
            let name = op.name().expect("update ops carry a name").to_vec();
            if names_in_utxo.insert(name.clone(), output.value).is_some() {
                return Err(NameDbError::DuplicateUtxoName(name));
            }
        }
    }

    let mut names_total: BTreeSet<Vec<u8>> = BTreeSet::new();
    let mut names_living: BTreeMap<Vec<u8>, NameData> = BTreeMap::new();
    for (name, value) in store.scan_prefix(Column::Name, b"")? {
        let data: NameData =
            decode(&value).map_err(|_| NameDbError::Corrupt("failed to read name record"))?;
        names_total.insert(name.clone());
        if !data.is_dead() {
            names_living.insert(name, data);
        }
    }

    let mut names_with_history: BTreeSet<Vec<u8>> = BTreeSet::new();
    for (name, _) in store.scan_prefix(Column::NameHistory, b"")? {
        names_with_history.insert(name);
    }

    let players = game.players()?;

    // The game's players and the name amounts locked in the UTXO set must
    // agree exactly, amounts included.
    if players != names_in_utxo {
        return Err(NameDbError::GameMismatch);
    }

    for (name, data) in &names_living {
        if !names_in_utxo.contains_key(name) {
            return Err(NameDbError::LivingNameNotInUtxo(name.clone()));
        }

        // The recorded outpoint must still resolve to this name's output.
        let coins = db
            .get_coins(&data.update_outpoint.hash)?
            .ok_or_else(|| NameDbError::UtxoRecordMismatch(name.clone()))?;
        let matches = coins.height == data.height
            && coins
                .output(data.update_outpoint.index)
                .and_then(|out| NameScript::parse(&out.script_pubkey))
                .map(|op| {
                    op.name() == Some(name.as_slice()) && op.address == data.address_script
                })
                .unwrap_or(false);
        if !matches {
            return Err(NameDbError::UtxoRecordMismatch(name.clone()));
        }
    }
    for name in names_in_utxo.keys() {
        if !names_living.contains_key(name) {
            return Err(NameDbError::UtxoNameNotInDb(name.clone()));
        }
    }

    if db.name_history_enabled() {
        for name in &names_with_history {
            if !names_total.contains(name) {
                return Err(NameDbError::HistoryForUnknownName(name.clone()));
            }
        }
    } else if !names_with_history.is_empty() {
        return Err(NameDbError::HistoryWithoutTracking);
    }

    let stats = NameDbStats {
        living: names_living.len(),
        total: names_total.len(),
        with_history: names_with_history.len(),
    };
    log_info!(
        "Checked name database, {} living player names, {} total.",
        stats.living,
        stats.total
    );
    Ok(stats)
}

/// Periodic name-db check.  `option` follows the original knob: -1 skips
/// entirely, 0 forces a check every block, N checks every Nth block (and
/// never on disconnects).  A failed validation is fatal.
pub fn check_name_db<S: KeyValueStore>(
    option: i32,
    disconnect: bool,
    chain_height: u32,
    view: &mut CoinViewCache<'_, S>,
    game: &dyn GameStateView,
) -> Result<(), StoreError> {
    if option == -1 {
        return Ok(());
    }
    assert!(option >= 0);
    if option != 0 && (disconnect || chain_height % option as u32 != 0) {
        return Ok(());
    }

    view.flush()?;
    if let Err(err) = validate_name_db(view.base(), game) {
        log_error!("ERROR: name database is inconsistent: {err}");
        panic!("name database is inconsistent");
    }
    Ok(())
}
