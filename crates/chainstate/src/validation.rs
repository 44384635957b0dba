//! Validation of name-bearing transactions.

use hunterd_consensus::constants::{
    MAX_NAME_LENGTH, MAX_RAND_LENGTH, MAX_VALUE_LENGTH, MEMPOOL_HEIGHT, MIN_FIRSTUPDATE_DEPTH,
    NAMENEW_COIN_AMOUNT, NAMENEW_HASH_LENGTH,
};
use hunterd_consensus::money::Amount;
use hunterd_consensus::ChainParams;
use hunterd_primitives::hash::hash160;
use hunterd_primitives::transaction::Transaction;
use hunterd_script::names::{NameOp, NameScript};
use hunterd_storage::StoreError;

use crate::coins::CoinView;

#[derive(Debug)]
pub enum NameValidationError {
    MultipleNameInputs,
    MultipleNameOutputs,
    /// Non-Namecoin tx with name content, or Namecoin tx without a name output.
    NameFlagMismatch(&'static str),
    /// Locked amount below the required minimum.
    GreedyName,
    NameTooLong,
    ValueTooLong,
    RandTooLarge,
    NameNewWithNameInput,
    NameNewWrongHashSize,
    FirstUpdateHashMismatch,
    FirstUpdateOnLivingName,
    FirstUpdateImmature,
    FirstUpdateWithNonNewInput,
    NewStyleRegistrationWithInput,
    UpdateWithoutNameInput,
    UpdateNameMismatch,
    UpdateOnMissingName,
    UpdateOnDeadName,
    UpdateAmountDecreased,
    UpdateWithNonUpdateInput,
    /// An input's coin record could not be resolved.
    CoinFetch,
    Store(StoreError),
}

impl std::fmt::Display for NameValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MultipleNameInputs => write!(f, "multiple name inputs into transaction"),
            Self::MultipleNameOutputs => write!(f, "multiple name outputs from transaction"),
            Self::NameFlagMismatch(message) => write!(f, "{message}"),
            Self::GreedyName => write!(f, "greedy name"),
            Self::NameTooLong => write!(f, "name too long"),
            Self::ValueTooLong => write!(f, "value too long"),
            Self::RandTooLarge => write!(f, "first update rand too large"),
            Self::NameNewWithNameInput => write!(f, "name new with previous name input"),
            Self::NameNewWrongHashSize => write!(f, "name new hash has wrong size"),
            Self::FirstUpdateHashMismatch => write!(f, "first update hash mismatch"),
            Self::FirstUpdateOnLivingName => write!(f, "first update on a living name"),
            Self::FirstUpdateImmature => {
                write!(f, "pre-commitment is not mature for first update")
            }
            Self::FirstUpdateWithNonNewInput => {
                write!(f, "first update with non-name-new input")
            }
            Self::NewStyleRegistrationWithInput => {
                write!(f, "new-style registration with name input")
            }
            Self::UpdateWithoutNameInput => write!(f, "update without previous name input"),
            Self::UpdateNameMismatch => write!(f, "update name mismatch to previous output"),
            Self::UpdateOnMissingName => write!(f, "update on a name that does not exist"),
            Self::UpdateOnDeadName => write!(f, "update on a dead name"),
            Self::UpdateAmountDecreased => write!(f, "name amount decreased in update"),
            Self::UpdateWithNonUpdateInput => {
                write!(f, "update with previous input that is no update")
            }
            Self::CoinFetch => write!(f, "failed to fetch input coins"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for NameValidationError {}

impl From<StoreError> for NameValidationError {
    fn from(err: StoreError) -> Self {
        NameValidationError::Store(err)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NameCheckFlags {
    /// Suppresses the pre-commitment maturity check, whose input heights are
    /// not final while the transaction only sits in the pool.
    pub mempool: bool,
}

struct NameInput {
    vin_index: usize,
    op: NameScript,
    amount: Amount,
    coin_height: u32,
}

/// Decides whether `tx` is valid at `height` against the given coin view.
///
/// Structural rules (single name input/output, flag consistency, minimum
/// amount, script shapes) and semantic rules (commitment reveal, maturity,
/// living/dead state, amount monotonicity) are all enforced here.  Historic
/// bugs on the chain's list are accepted as-is.
pub fn check_name_transaction<V: CoinView>(
    tx: &Transaction,
    height: u32,
    view: &V,
    params: &ChainParams,
    flags: NameCheckFlags,
) -> Result<(), NameValidationError> {
    let txid = tx.txid();

    if params.is_historic_bug(&txid, height).is_some() {
        return Ok(());
    }

    // Locate the name input and output.  More than one of either is a hard
    // rejection.
    let mut name_in: Option<NameInput> = None;
    for (vin_index, input) in tx.vin.iter().enumerate() {
        let coins = view
            .get_coins(&input.prevout.hash)?
            .ok_or(NameValidationError::CoinFetch)?;
        let Some(prev_out) = coins.output(input.prevout.index) else {
            continue;
        };
        if let Some(op) = NameScript::parse(&prev_out.script_pubkey) {
            if name_in.is_some() {
                return Err(NameValidationError::MultipleNameInputs);
            }
            name_in = Some(NameInput {
                vin_index,
                op,
                amount: prev_out.value,
                coin_height: coins.height,
            });
        }
    }

    let mut name_out: Option<(usize, NameScript)> = None;
    for (index, output) in tx.vout.iter().enumerate() {
        if let Some(op) = NameScript::parse(&output.script_pubkey) {
            if name_out.is_some() {
                return Err(NameValidationError::MultipleNameOutputs);
            }
            name_out = Some((index, op));
        }
    }

    if !tx.is_namecoin() {
        if name_in.is_some() {
            return Err(NameValidationError::NameFlagMismatch(
                "non-Namecoin transaction has name inputs",
            ));
        }
        if name_out.is_some() {
            return Err(NameValidationError::NameFlagMismatch(
                "non-Namecoin transaction has name outputs",
            ));
        }
        return Ok(());
    }

    let Some((out_index, op_out)) = name_out else {
        return Err(NameValidationError::NameFlagMismatch(
            "Namecoin transaction has no name outputs",
        ));
    };

    // Only the minimum is enforced here; the full game fee rules live in the
    // move validator.
    if tx.vout[out_index].value < NAMENEW_COIN_AMOUNT {
        return Err(NameValidationError::GreedyName);
    }

    if let NameOp::NameNew { hash } = &op_out.op {
        if name_in.is_some() {
            return Err(NameValidationError::NameNewWithNameInput);
        }
        if hash.len() != NAMENEW_HASH_LENGTH {
            return Err(NameValidationError::NameNewWrongHashSize);
        }
        return Ok(());
    }

    // Everything below is a first update or update.  New-style registrations
    // must not consume a name input; everything else must.
    assert!(op_out.is_any_update());
    if op_out.is_new_style_registration() {
        if name_in.is_some() {
            return Err(NameValidationError::NewStyleRegistrationWithInput);
        }
    } else if name_in.is_none() {
        return Err(NameValidationError::UpdateWithoutNameInput);
    }

    let name = op_out.name().expect("update ops carry a name");
    if name.len() > MAX_NAME_LENGTH {
        return Err(NameValidationError::NameTooLong);
    }
    if op_out.value().expect("update ops carry a value").len() > MAX_VALUE_LENGTH {
        return Err(NameValidationError::ValueTooLong);
    }

    if let NameOp::NameUpdate { .. } = op_out.op {
        let input = name_in.as_ref().expect("update requires a name input");

        if tx.vout[out_index].value < input.amount {
            return Err(NameValidationError::UpdateAmountDecreased);
        }
        if !input.op.is_any_update() {
            return Err(NameValidationError::UpdateWithNonUpdateInput);
        }
        if input.op.name() != Some(name) {
            return Err(NameValidationError::UpdateNameMismatch);
        }

        // Redundant with the move validator's player checks, but cheap.
        let old = view
            .get_name(name)?
            .ok_or(NameValidationError::UpdateOnMissingName)?;
        if old.is_dead() {
            return Err(NameValidationError::UpdateOnDeadName);
        }

        // The input coins and the name database must agree; a mismatch means
        // the state on disk is corrupt, not that the transaction is bad.
        assert_eq!(input.coin_height, old.height);
        assert_eq!(tx.vin[input.vin_index].prevout, old.update_outpoint);

        return Ok(());
    }

    // First update.  The commit/reveal checks only apply to the old style.
    if let NameOp::NameFirstUpdate {
        rand: Some(rand), ..
    } = &op_out.op
    {
        let input = name_in.as_ref().expect("old-style reveal requires an input");
        let NameOp::NameNew { hash } = &input.op.op else {
            return Err(NameValidationError::FirstUpdateWithNonNewInput);
        };

        if !flags.mempool {
            assert_ne!(input.coin_height, MEMPOOL_HEIGHT);
            if input.coin_height + MIN_FIRSTUPDATE_DEPTH > height {
                return Err(NameValidationError::FirstUpdateImmature);
            }
        }

        if rand.len() > MAX_RAND_LENGTH {
            return Err(NameValidationError::RandTooLarge);
        }

        let mut to_hash = rand.clone();
        to_hash.extend_from_slice(name);
        if hash160(&to_hash)[..] != hash[..] {
            return Err(NameValidationError::FirstUpdateHashMismatch);
        }
    }

    // The name may exist already only as a dead slot being reclaimed.
    if let Some(old) = view.get_name(name)? {
        if !old.is_dead() {
            return Err(NameValidationError::FirstUpdateOnLivingName);
        }
    }

    Ok(())
}
