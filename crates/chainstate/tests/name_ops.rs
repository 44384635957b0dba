use std::sync::Arc;

use hunterd_chainstate::apply::{apply_name_transaction, kill_name};
use hunterd_chainstate::coins::{CoinView, CoinViewCache, DbCoinView};
use hunterd_chainstate::undo::BlockUndo;
use hunterd_chainstate::validation::{check_name_transaction, NameCheckFlags, NameValidationError};
use hunterd_consensus::constants::{MIN_FIRSTUPDATE_DEPTH, NAMENEW_COIN_AMOUNT};
use hunterd_consensus::params::{chain_params, BugType, HistoricBug, Network};
use hunterd_consensus::Hash256;
use hunterd_primitives::hash::hash160;
use hunterd_primitives::outpoint::OutPoint;
use hunterd_primitives::transaction::{Transaction, TxIn, TxOut, NAMECOIN_TX_VERSION};
use hunterd_script::names::{
    build_name_first_update, build_name_new, build_name_update, NameScript,
};
use hunterd_storage::memory::MemoryStore;

fn p2pkh(tag: u8) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[0x76, 0xa9, 0x14]);
    script.extend_from_slice(&[tag; 20]);
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

fn commitment(rand: &[u8], name: &[u8]) -> [u8; 20] {
    let mut data = rand.to_vec();
    data.extend_from_slice(name);
    hash160(&data)
}

fn name_tx(vin: Vec<TxIn>, vout: Vec<TxOut>) -> Transaction {
    Transaction {
        version: NAMECOIN_TX_VERSION,
        vin,
        vout,
        lock_time: 0,
    }
}

fn spend(prevout: OutPoint) -> TxIn {
    TxIn {
        prevout,
        script_sig: Vec::new(),
        sequence: u32::MAX,
    }
}

fn funding_tx(tag: u8, value: i64) -> Transaction {
    Transaction {
        version: 1,
        vin: vec![spend(OutPoint::null())],
        vout: vec![TxOut {
            value,
            script_pubkey: p2pkh(tag),
        }],
        lock_time: 0,
    }
}

/// Spends the tx's inputs and enters its outputs, the way block connection
/// maintains the coin view around name application.
fn connect_coins(cache: &mut CoinViewCache<'_, Arc<MemoryStore>>, tx: &Transaction, height: u32) {
    for input in &tx.vin {
        if input.prevout.is_null() {
            continue;
        }
        cache
            .spend_coin(&input.prevout)
            .expect("spend input")
            .expect("input must be unspent");
    }
    cache.add_tx_outputs(tx, height);
}

struct Harness {
    db: DbCoinView<Arc<MemoryStore>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            db: DbCoinView::new(Arc::new(MemoryStore::new()), false),
        }
    }

    fn cache(&self) -> CoinViewCache<'_, Arc<MemoryStore>> {
        CoinViewCache::new(&self.db)
    }
}

fn check(
    tx: &Transaction,
    height: u32,
    cache: &CoinViewCache<'_, Arc<MemoryStore>>,
) -> Result<(), NameValidationError> {
    let params = chain_params(Network::Regtest);
    check_name_transaction(tx, height, cache, &params, NameCheckFlags::default())
}

#[test]
fn commit_reveal_happy_path() {
    let harness = Harness::new();
    let mut cache = harness.cache();
    let params = chain_params(Network::Regtest);

    // Block H: publish the commitment.
    let new_tx = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_new(&p2pkh(1), &commitment(b"salt", b"alice")),
        }],
    );
    assert!(check(&new_tx, 100, &cache).is_ok());
    cache.add_tx_outputs(&new_tx, 100);

    // Block H + MIN_FIRSTUPDATE_DEPTH: reveal.
    let reveal_height = 100 + MIN_FIRSTUPDATE_DEPTH;
    let first_tx = name_tx(
        vec![spend(OutPoint::new(new_tx.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(2), b"alice", Some(b"salt"), b"v1"),
        }],
    );
    assert!(check(&first_tx, reveal_height, &cache).is_ok());

    let mut undo = BlockUndo::default();
    connect_coins(&mut cache, &first_tx, reveal_height);
    apply_name_transaction(&first_tx, reveal_height, &mut cache, &mut undo, &params)
        .expect("apply");

    let data = cache.get_name(b"alice").expect("get").expect("stored");
    assert_eq!(data.value, b"v1".to_vec());
    assert_eq!(data.height, reveal_height);
    assert_eq!(data.update_outpoint, OutPoint::new(first_tx.txid(), 0));
    assert_eq!(data.address_script, p2pkh(2));
    assert!(!data.is_dead());
    assert_eq!(undo.name_undo.len(), 1);
}

#[test]
fn premature_reveal_rejected_at_exact_boundary() {
    let harness = Harness::new();
    let mut cache = harness.cache();

    let new_tx = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_new(&p2pkh(1), &commitment(b"salt", b"alice")),
        }],
    );
    cache.add_tx_outputs(&new_tx, 100);

    let first_tx = name_tx(
        vec![spend(OutPoint::new(new_tx.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(2), b"alice", Some(b"salt"), b"v1"),
        }],
    );

    // One block short of maturity.
    let err = check(&first_tx, 100 + MIN_FIRSTUPDATE_DEPTH - 1, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::FirstUpdateImmature));

    // Exactly mature.
    assert!(check(&first_tx, 100 + MIN_FIRSTUPDATE_DEPTH, &cache).is_ok());

    // The maturity check is suppressed in mempool context.
    let params = chain_params(Network::Regtest);
    let flags = NameCheckFlags { mempool: true };
    assert!(check_name_transaction(
        &first_tx,
        100 + MIN_FIRSTUPDATE_DEPTH - 1,
        &cache,
        &params,
        flags
    )
    .is_ok());
}

#[test]
fn reveal_hash_and_rand_rules() {
    let harness = Harness::new();
    let mut cache = harness.cache();

    let new_tx = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_new(&p2pkh(1), &commitment(b"salt", b"alice")),
        }],
    );
    cache.add_tx_outputs(&new_tx, 100);

    // Wrong salt: the committed hash does not match.
    let wrong_rand = name_tx(
        vec![spend(OutPoint::new(new_tx.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(2), b"alice", Some(b"other"), b"v1"),
        }],
    );
    let err = check(&wrong_rand, 200, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::FirstUpdateHashMismatch));

    // A 20-byte salt is fine, 21 bytes is too large.
    let rand20 = [7u8; 20];
    let new20 = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_new(&p2pkh(1), &commitment(&rand20, b"bob")),
        }],
    );
    cache.add_tx_outputs(&new20, 100);
    let reveal20 = name_tx(
        vec![spend(OutPoint::new(new20.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(2), b"bob", Some(&rand20), b"v1"),
        }],
    );
    assert!(check(&reveal20, 200, &cache).is_ok());

    let rand21 = [7u8; 21];
    let new21 = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_new(&p2pkh(1), &commitment(&rand21, b"carol")),
        }],
    );
    cache.add_tx_outputs(&new21, 100);
    let reveal21 = name_tx(
        vec![spend(OutPoint::new(new21.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(2), b"carol", Some(&rand21), b"v1"),
        }],
    );
    let err = check(&reveal21, 200, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::RandTooLarge));
}

#[test]
fn name_and_value_length_boundaries() {
    let harness = Harness::new();
    let cache = harness.cache();

    let name10 = [b'a'; 10];
    let ok_tx = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), &name10, None, b"v"),
        }],
    );
    assert!(check(&ok_tx, 100, &cache).is_ok());

    let name11 = [b'a'; 11];
    let long_tx = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), &name11, None, b"v"),
        }],
    );
    let err = check(&long_tx, 100, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::NameTooLong));

    let value_max = vec![b'v'; 1023];
    let ok_value = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), b"bob", None, &value_max),
        }],
    );
    assert!(check(&ok_value, 100, &cache).is_ok());

    let value_over = vec![b'v'; 1024];
    let long_value = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), b"bob", None, &value_over),
        }],
    );
    let err = check(&long_value, 100, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::ValueTooLong));
}

#[test]
fn locked_amount_minimum() {
    let harness = Harness::new();
    let cache = harness.cache();

    let exact = name_tx(
        Vec::new(),
        vec![TxOut {
            value: NAMENEW_COIN_AMOUNT,
            script_pubkey: build_name_first_update(&p2pkh(1), b"alice", None, b"v"),
        }],
    );
    assert!(check(&exact, 100, &cache).is_ok());

    let greedy = name_tx(
        Vec::new(),
        vec![TxOut {
            value: NAMENEW_COIN_AMOUNT - 1,
            script_pubkey: build_name_first_update(&p2pkh(1), b"alice", None, b"v"),
        }],
    );
    let err = check(&greedy, 100, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::GreedyName));
}

#[test]
fn update_semantics() {
    let harness = Harness::new();
    let mut cache = harness.cache();
    let params = chain_params(Network::Regtest);

    // Register "alice" with 10M locked.
    let first_tx = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), b"alice", None, b"v1"),
        }],
    );
    let mut undo = BlockUndo::default();
    connect_coins(&mut cache, &first_tx, 100);
    apply_name_transaction(&first_tx, 100, &mut cache, &mut undo, &params).expect("apply");

    // Decreasing the locked amount is rejected.
    let decrease = name_tx(
        vec![spend(OutPoint::new(first_tx.txid(), 0))],
        vec![TxOut {
            value: 9_999_999,
            script_pubkey: build_name_update(&p2pkh(2), b"alice", b"v2"),
        }],
    );
    let err = check(&decrease, 101, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::UpdateAmountDecreased));

    // Keeping it equal is fine, and the record moves forward.
    let update = name_tx(
        vec![spend(OutPoint::new(first_tx.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_update(&p2pkh(2), b"alice", b"v2"),
        }],
    );
    assert!(check(&update, 101, &cache).is_ok());
    connect_coins(&mut cache, &update, 101);
    apply_name_transaction(&update, 101, &mut cache, &mut undo, &params).expect("apply");

    let data = cache.get_name(b"alice").expect("get").expect("stored");
    assert_eq!(data.value, b"v2".to_vec());
    assert_eq!(data.height, 101);

    // Renaming through an update is rejected.
    let mismatch = name_tx(
        vec![spend(OutPoint::new(update.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_update(&p2pkh(2), b"bob", b"v3"),
        }],
    );
    let err = check(&mismatch, 102, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::UpdateNameMismatch));

    // An update without any name input is rejected.
    let no_input = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_update(&p2pkh(2), b"alice", b"v3"),
        }],
    );
    let err = check(&no_input, 102, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::UpdateWithoutNameInput));
}

#[test]
fn update_requires_prior_update_input() {
    let harness = Harness::new();
    let mut cache = harness.cache();
    let params = chain_params(Network::Regtest);

    // "alice" exists, but the update tries to consume a NAME_NEW output.
    let first_tx = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), b"alice", None, b"v1"),
        }],
    );
    let mut undo = BlockUndo::default();
    connect_coins(&mut cache, &first_tx, 100);
    apply_name_transaction(&first_tx, 100, &mut cache, &mut undo, &params).expect("apply");

    let new_tx = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_new(&p2pkh(1), &commitment(b"salt", b"alice")),
        }],
    );
    cache.add_tx_outputs(&new_tx, 100);

    let update = name_tx(
        vec![spend(OutPoint::new(new_tx.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_update(&p2pkh(2), b"alice", b"v2"),
        }],
    );
    let err = check(&update, 102, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::UpdateWithNonUpdateInput));
}

#[test]
fn update_on_missing_or_dead_name() {
    let harness = Harness::new();
    let mut cache = harness.cache();
    let params = chain_params(Network::Regtest);

    let first_tx = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), b"carol", None, b"v1"),
        }],
    );
    let mut undo = BlockUndo::default();
    connect_coins(&mut cache, &first_tx, 100);
    apply_name_transaction(&first_tx, 100, &mut cache, &mut undo, &params).expect("apply");

    let update = name_tx(
        vec![spend(OutPoint::new(first_tx.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_update(&p2pkh(2), b"carol", b"v2"),
        }],
    );
    assert!(check(&update, 101, &cache).is_ok());

    // Kill carol; the pending-style update is now invalid.
    kill_name(b"carol", 101, &[9u8; 32], &mut cache, &mut undo).expect("kill");
    let err = check(&update, 102, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::UpdateOnDeadName));

    // A name that never existed cannot be updated.  The input must still be
    // a name output for the check to get that far.
    let other_first = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), b"dave", None, b"v1"),
        }],
    );
    cache.add_tx_outputs(&other_first, 100);
    let missing = name_tx(
        vec![spend(OutPoint::new(other_first.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_update(&p2pkh(2), b"dave", b"v2"),
        }],
    );
    // "dave"'s registration output exists in the coin view but was never
    // applied to the name database.
    let err = check(&missing, 102, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::UpdateOnMissingName));
}

#[test]
fn revival_of_dead_name() {
    let harness = Harness::new();
    let mut cache = harness.cache();
    let params = chain_params(Network::Regtest);

    let first_tx = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), b"carol", None, b"v1"),
        }],
    );
    let mut undo = BlockUndo::default();
    connect_coins(&mut cache, &first_tx, 100);
    apply_name_transaction(&first_tx, 100, &mut cache, &mut undo, &params).expect("apply");

    // Registering over the living name is rejected.
    let reclaim = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(3), b"carol", None, b"v2"),
        }],
    );
    let err = check(&reclaim, 101, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::FirstUpdateOnLivingName));

    // The game kills carol at block H; the slot becomes reclaimable at H+1.
    kill_name(b"carol", 150, &[9u8; 32], &mut cache, &mut undo).expect("kill");
    assert!(check(&reclaim, 151, &cache).is_ok());

    connect_coins(&mut cache, &reclaim, 151);
    apply_name_transaction(&reclaim, 151, &mut cache, &mut undo, &params).expect("apply");
    let data = cache.get_name(b"carol").expect("get").expect("stored");
    assert!(!data.is_dead());
    assert_eq!(data.value, b"v2".to_vec());
    assert_eq!(data.height, 151);
}

#[test]
fn structural_rejections() {
    let harness = Harness::new();
    let mut cache = harness.cache();

    // Two name outputs in one transaction.
    let double_out = name_tx(
        Vec::new(),
        vec![
            TxOut {
                value: 10_000_000,
                script_pubkey: build_name_first_update(&p2pkh(1), b"a", None, b"v"),
            },
            TxOut {
                value: 10_000_000,
                script_pubkey: build_name_first_update(&p2pkh(1), b"b", None, b"v"),
            },
        ],
    );
    let err = check(&double_out, 100, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::MultipleNameOutputs));

    // Two name inputs into one transaction.
    let new_a = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_new(&p2pkh(1), &commitment(b"r", b"a")),
        }],
    );
    let new_b = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_new(&p2pkh(1), &commitment(b"r", b"b")),
        }],
    );
    cache.add_tx_outputs(&new_a, 100);
    cache.add_tx_outputs(&new_b, 100);
    let double_in = name_tx(
        vec![
            spend(OutPoint::new(new_a.txid(), 0)),
            spend(OutPoint::new(new_b.txid(), 0)),
        ],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), b"a", Some(b"r"), b"v"),
        }],
    );
    let err = check(&double_in, 200, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::MultipleNameInputs));

    // A non-Namecoin transaction must not carry name outputs.
    let mut plain = double_out.clone();
    plain.version = 1;
    plain.vout.truncate(1);
    let err = check(&plain, 100, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::NameFlagMismatch(_)));

    // A Namecoin transaction must have a name output.
    let fund = funding_tx(7, 50_000_000);
    cache.add_tx_outputs(&fund, 90);
    let flagless = name_tx(
        vec![spend(OutPoint::new(fund.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: p2pkh(8),
        }],
    );
    let err = check(&flagless, 100, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::NameFlagMismatch(_)));

    // A new-style registration must not consume a name input.
    let new_style_with_input = name_tx(
        vec![spend(OutPoint::new(new_a.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), b"a", None, b"v"),
        }],
    );
    let err = check(&new_style_with_input, 200, &cache).unwrap_err();
    assert!(matches!(
        err,
        NameValidationError::NewStyleRegistrationWithInput
    ));

    // A pre-commitment must not consume a name input either.
    let new_with_input = name_tx(
        vec![spend(OutPoint::new(new_a.txid(), 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_new(&p2pkh(1), &commitment(b"r", b"c")),
        }],
    );
    let err = check(&new_with_input, 200, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::NameNewWithNameInput));

    // Spending an input the view does not know fails the coin fetch.
    let orphan = name_tx(
        vec![spend(OutPoint::new([0xee; 32], 0))],
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), b"e", None, b"v"),
        }],
    );
    let err = check(&orphan, 100, &cache).unwrap_err();
    assert!(matches!(err, NameValidationError::CoinFetch));
}

#[test]
fn historic_bug_bypass_and_ignore() {
    let harness = Harness::new();
    let mut cache = harness.cache();

    // A transaction that is plainly invalid: greedy amount.
    let buggy = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 1,
            script_pubkey: build_name_first_update(&p2pkh(1), b"stolen", None, b"v"),
        }],
    );
    let txid: Hash256 = buggy.txid();

    let mut params = chain_params(Network::Regtest);
    params.historic_bugs.push(HistoricBug {
        txid,
        height: 100,
        bug_type: BugType::FullyIgnore,
    });

    // Validation is skipped on the listed height only.
    assert!(
        check_name_transaction(&buggy, 100, &cache, &params, NameCheckFlags::default()).is_ok()
    );
    assert!(
        check_name_transaction(&buggy, 101, &cache, &params, NameCheckFlags::default()).is_err()
    );

    // Application leaves the name database alone and burns the output.
    cache.add_tx_outputs(&buggy, 100);
    let mut undo = BlockUndo::default();
    apply_name_transaction(&buggy, 100, &mut cache, &mut undo, &params).expect("apply");

    assert!(cache.get_name(b"stolen").expect("get").is_none());
    assert!(undo.name_undo.is_empty());
    let coins = cache.get_coins(&txid).expect("coins").expect("record");
    assert!(!coins.is_available(0));
}

#[test]
fn new_style_registration_does_not_require_commitment() {
    let harness = Harness::new();
    let mut cache = harness.cache();
    let params = chain_params(Network::Regtest);

    let first_tx = name_tx(
        Vec::new(),
        vec![TxOut {
            value: 10_000_000,
            script_pubkey: build_name_first_update(&p2pkh(1), b"eve", None, b"v1"),
        }],
    );
    assert!(check(&first_tx, 100, &cache).is_ok());

    let mut undo = BlockUndo::default();
    connect_coins(&mut cache, &first_tx, 100);
    apply_name_transaction(&first_tx, 100, &mut cache, &mut undo, &params).expect("apply");
    assert!(NameScript::parse(&first_tx.vout[0].script_pubkey)
        .expect("name op")
        .is_new_style_registration());
    assert!(cache.get_name(b"eve").expect("get").is_some());
}
