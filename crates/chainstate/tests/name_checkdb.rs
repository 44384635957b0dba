use std::collections::BTreeMap;
use std::sync::Arc;

use hunterd_chainstate::apply::{apply_name_transaction, kill_name};
use hunterd_chainstate::checker::{check_name_db, validate_name_db, GameStateView, NameDbError};
use hunterd_chainstate::coins::{CoinViewCache, DbCoinView};
use hunterd_chainstate::undo::BlockUndo;
use hunterd_consensus::money::Amount;
use hunterd_consensus::params::{chain_params, Network};
use hunterd_primitives::outpoint::OutPoint;
use hunterd_primitives::transaction::{Transaction, TxIn, TxOut, NAMECOIN_TX_VERSION};
use hunterd_script::names::build_name_first_update;
use hunterd_storage::memory::MemoryStore;
use hunterd_storage::{Column, KeyValueStore, StoreError};

fn p2pkh(tag: u8) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[0x76, 0xa9, 0x14]);
    script.extend_from_slice(&[tag; 20]);
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

fn registration(name: &[u8], tag: u8, value: i64) -> Transaction {
    Transaction {
        version: NAMECOIN_TX_VERSION,
        vin: Vec::new(),
        vout: vec![TxOut {
            value,
            script_pubkey: build_name_first_update(&p2pkh(tag), name, None, b"v"),
        }],
        lock_time: 0,
    }
}

struct StubGameDb {
    players: BTreeMap<Vec<u8>, Amount>,
}

impl GameStateView for StubGameDb {
    fn players(&self) -> Result<BTreeMap<Vec<u8>, Amount>, StoreError> {
        Ok(self.players.clone())
    }
}

struct Setup {
    store: Arc<MemoryStore>,
    db: DbCoinView<Arc<MemoryStore>>,
    alice_tx: Transaction,
    dead_tx: Transaction,
}

/// Chain state with a living "alice" (10M locked) and a killed "bob".
fn setup() -> Setup {
    let store = Arc::new(MemoryStore::new());
    let db = DbCoinView::new(Arc::clone(&store), false);
    let params = chain_params(Network::Regtest);

    let alice_tx = registration(b"alice", 1, 10_000_000);
    let dead_tx = registration(b"bob", 2, 12_000_000);

    {
        let mut cache = CoinViewCache::new(&db);
        let mut undo = BlockUndo::default();
        cache.add_tx_outputs(&alice_tx, 10);
        apply_name_transaction(&alice_tx, 10, &mut cache, &mut undo, &params).expect("apply");
        cache.add_tx_outputs(&dead_tx, 10);
        apply_name_transaction(&dead_tx, 10, &mut cache, &mut undo, &params).expect("apply");

        // Kill bob: his name coin is spent and the record goes dead.
        cache
            .spend_coin(&OutPoint::new(dead_tx.txid(), 0))
            .expect("spend")
            .expect("unspent");
        kill_name(b"bob", 11, &[0x55; 32], &mut cache, &mut undo).expect("kill");
        cache.flush().expect("flush");
    }

    Setup {
        store,
        db,
        alice_tx,
        dead_tx,
    }
}

fn healthy_game() -> StubGameDb {
    let mut players = BTreeMap::new();
    players.insert(b"alice".to_vec(), 10_000_000);
    StubGameDb { players }
}

#[test]
fn healthy_state_validates() {
    let setup = setup();
    let stats = validate_name_db(&setup.db, &healthy_game()).expect("valid");
    assert_eq!(stats.living, 1);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.with_history, 0);
}

#[test]
fn game_player_set_must_match_utxo_names() {
    let setup = setup();

    // A player the chain does not know about.
    let mut players = BTreeMap::new();
    players.insert(b"alice".to_vec(), 10_000_000);
    players.insert(b"eve".to_vec(), 10_000_000);
    let err = validate_name_db(&setup.db, &StubGameDb { players }).unwrap_err();
    assert!(matches!(err, NameDbError::GameMismatch));

    // Locked amounts must agree too.
    let mut players = BTreeMap::new();
    players.insert(b"alice".to_vec(), 9_999_999);
    let err = validate_name_db(&setup.db, &StubGameDb { players }).unwrap_err();
    assert!(matches!(err, NameDbError::GameMismatch));
}

#[test]
fn living_name_without_utxo_is_detected() {
    let setup = setup();

    // Corrupt the state: alice's coin disappears while her record stays.
    setup
        .store
        .delete(Column::Coins, &setup.alice_tx.txid())
        .expect("delete");

    let err = validate_name_db(&setup.db, &StubGameDb { players: BTreeMap::new() }).unwrap_err();
    assert!(matches!(err, NameDbError::LivingNameNotInUtxo(_)));
}

#[test]
fn stray_name_output_is_detected() {
    let setup = setup();

    // A name output in the UTXO set whose record never made it into the
    // name database.
    let stray = registration(b"mallory", 7, 11_000_000);
    {
        let mut cache = CoinViewCache::new(&setup.db);
        cache.add_tx_outputs(&stray, 12);
        cache.flush().expect("flush");
    }

    let mut players = healthy_game().players;
    players.insert(b"mallory".to_vec(), 11_000_000);
    let err = validate_name_db(&setup.db, &StubGameDb { players }).unwrap_err();
    assert!(matches!(err, NameDbError::UtxoNameNotInDb(_)));
}

#[test]
fn history_entries_require_tracking() {
    let setup = setup();

    // History rows with tracking disabled are an inconsistency.
    setup
        .store
        .put(Column::NameHistory, b"alice", &[0x00])
        .expect("put");
    let err = validate_name_db(&setup.db, &healthy_game()).unwrap_err();
    assert!(matches!(err, NameDbError::HistoryWithoutTracking));
}

#[test]
fn dead_names_stay_out_of_the_cross_check() {
    let setup = setup();

    // Bob is dead: not in the game, not in the UTXO set, but still a slot in
    // the name database.
    let stats = validate_name_db(&setup.db, &healthy_game()).expect("valid");
    assert_eq!(stats.total, 2);
    assert_eq!(stats.living, 1);
    assert!(setup.dead_tx.is_namecoin());
}

#[test]
fn periodic_check_honours_interval_option() {
    let setup = setup();
    let game = healthy_game();

    let mut cache = CoinViewCache::new(&setup.db);
    // Disabled entirely.
    check_name_db(-1, false, 10, &mut cache, &game).expect("skip");
    // Every block.
    check_name_db(0, false, 10, &mut cache, &game).expect("check");
    // Every 5th block: height 12 is skipped, height 15 runs.
    check_name_db(5, false, 12, &mut cache, &game).expect("skip");
    check_name_db(5, false, 15, &mut cache, &game).expect("check");
    // Never on disconnect.
    check_name_db(5, true, 15, &mut cache, &game).expect("skip");
}

#[test]
#[should_panic(expected = "name database is inconsistent")]
fn failed_validation_is_fatal() {
    let setup = setup();
    setup
        .store
        .delete(Column::Coins, &setup.alice_tx.txid())
        .expect("delete");

    let mut cache = CoinViewCache::new(&setup.db);
    let game = StubGameDb { players: BTreeMap::new() };
    check_name_db(0, false, 10, &mut cache, &game).expect("io");
}
