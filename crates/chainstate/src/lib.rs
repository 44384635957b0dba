//! Name registry consensus core: name database, validation, and undo.

pub mod apply;
pub mod checker;
pub mod coins;
pub mod namedb;
pub mod undo;
pub mod validation;

pub use apply::{apply_name_transaction, kill_name, undo_name_transactions};
pub use checker::{check_name_db, validate_name_db, GameStateView};
pub use coins::{CoinView, CoinViewCache, Coins, DbCoinView};
pub use namedb::{NameData, NameHistory};
pub use undo::{BlockUndo, NameTxUndo, SpentOutput};
pub use validation::{check_name_transaction, NameCheckFlags, NameValidationError};
