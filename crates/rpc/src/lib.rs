//! Read-only RPC projections over the name database and the pool.

use hunterd_chainstate::checker::{validate_name_db, GameStateView};
use hunterd_chainstate::coins::{CoinView, CoinViewCache};
use hunterd_chainstate::namedb::NameData;
use hunterd_consensus::money::Amount;
use hunterd_mempool::Mempool;
use hunterd_primitives::hex::{hash256_to_hex, hex_encode};
use hunterd_primitives::transaction::{Transaction, TxOut, NAMECOIN_TX_VERSION};
use hunterd_script::names::{build_name_update, NameOp, NameScript};
use hunterd_script::standard::{classify_script_pubkey, ScriptType};
use hunterd_storage::{KeyValueStore, StoreError};
use serde_json::{json, Value};

#[derive(Debug)]
pub enum RpcError {
    InvalidParameter(String),
    NameNotFound(String),
    HistoryDisabled,
    Store(StoreError),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParameter(message) => write!(f, "{message}"),
            Self::NameNotFound(name) => write!(f, "name not found: '{name}'"),
            Self::HistoryDisabled => write!(f, "name history is not enabled"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<StoreError> for RpcError {
    fn from(err: StoreError) -> Self {
        RpcError::Store(err)
    }
}

/// Builds the "name info" object shared by `name_show`, `name_history`, and
/// the scan calls.  Value, vout, and address are omitted for dead names.
pub fn name_info(name: &[u8], data: &NameData) -> Value {
    let mut obj = json!({
        "name": String::from_utf8_lossy(name),
        "dead": data.is_dead(),
        "height": data.height,
        "txid": hash256_to_hex(&data.update_outpoint.hash),
    });
    if !data.is_dead() {
        let fields = obj.as_object_mut().expect("name info object");
        fields.insert(
            "value".into(),
            Value::from(String::from_utf8_lossy(&data.value).into_owned()),
        );
        fields.insert("vout".into(), Value::from(data.update_outpoint.index));
        let address = match classify_script_pubkey(&data.address_script) {
            ScriptType::Unknown => "<nonstandard>".to_string(),
            _ => hex_encode(&data.address_script),
        };
        fields.insert("address".into(), Value::from(address));
    }
    obj
}

/// Looks up the current data for a name.  Fails if the name does not exist.
pub fn name_show<V: CoinView>(view: &V, name: &str) -> Result<Value, RpcError> {
    let data = view
        .get_name(name.as_bytes())?
        .ok_or_else(|| RpcError::NameNotFound(name.to_string()))?;
    Ok(name_info(name.as_bytes(), &data))
}

/// Lists the current and all past data for a name, oldest first.
pub fn name_history<V: CoinView>(
    view: &V,
    name: &str,
    history_enabled: bool,
) -> Result<Value, RpcError> {
    if !history_enabled {
        return Err(RpcError::HistoryDisabled);
    }
    let data = view
        .get_name(name.as_bytes())?
        .ok_or_else(|| RpcError::NameNotFound(name.to_string()))?;
    let history = view.get_name_history(name.as_bytes())?;

    let mut entries: Vec<Value> = history
        .data()
        .iter()
        .map(|entry| name_info(name.as_bytes(), entry))
        .collect();
    entries.push(name_info(name.as_bytes(), &data));
    Ok(Value::Array(entries))
}

/// Lists names from the database in order, starting at `start`.
pub fn name_scan<V: CoinView>(
    view: &V,
    start: Option<&str>,
    count: Option<i64>,
) -> Result<Value, RpcError> {
    let count = count.unwrap_or(500);
    if count <= 0 {
        return Ok(Value::Array(Vec::new()));
    }

    let start = start.unwrap_or("").as_bytes();
    let names = view.names_from(start)?;
    let entries: Vec<Value> = names
        .iter()
        .take(count as usize)
        .map(|(name, data)| name_info(name, data))
        .collect();
    Ok(Value::Array(entries))
}

/// Scans names matching a regular expression, with age and paging filters.
/// With `stat` set, returns counts instead of the entries.
#[allow(clippy::too_many_arguments)]
pub fn name_filter<V: CoinView>(
    view: &V,
    chain_height: u32,
    regexp: Option<&str>,
    maxage: Option<i64>,
    from: Option<i64>,
    nb: Option<i64>,
    stat: Option<&str>,
) -> Result<Value, RpcError> {
    let regexp = match regexp {
        Some(pattern) => Some(regex::Regex::new(pattern).map_err(|err| {
            RpcError::InvalidParameter(format!("invalid regular expression: {err}"))
        })?),
        None => None,
    };
    let maxage = maxage.unwrap_or(36_000);
    if maxage < 0 {
        return Err(RpcError::InvalidParameter(
            "'maxage' should be non-negative".to_string(),
        ));
    }
    let mut from = from.unwrap_or(0);
    if from < 0 {
        return Err(RpcError::InvalidParameter(
            "'from' should be non-negative".to_string(),
        ));
    }
    let mut nb = nb.unwrap_or(0);
    if nb < 0 {
        return Err(RpcError::InvalidParameter(
            "'nb' should be non-negative".to_string(),
        ));
    }
    let stats = match stat {
        None => false,
        Some("stat") => true,
        Some(_) => {
            return Err(RpcError::InvalidParameter(
                "fifth argument must be the literal string 'stat'".to_string(),
            ))
        }
    };

    let mut names = Vec::new();
    let mut count = 0usize;
    for (name, data) in view.names_from(b"")? {
        let age = i64::from(chain_height) - i64::from(data.height);
        assert!(age >= 0);
        if maxage != 0 && age >= maxage {
            continue;
        }

        if let Some(regexp) = &regexp {
            if !regexp.is_match(&String::from_utf8_lossy(&name)) {
                continue;
            }
        }

        if from > 0 {
            from -= 1;
            continue;
        }

        if stats {
            count += 1;
        } else {
            names.push(name_info(&name, &data));
        }

        if nb > 0 {
            nb -= 1;
            if nb == 0 {
                break;
            }
        }
    }

    if stats {
        return Ok(json!({
            "blocks": chain_height,
            "count": count,
        }));
    }
    Ok(Value::Array(names))
}

/// Lists unconfirmed name operations, optionally restricted to one name.
pub fn name_pending(pool: &Mempool, name: Option<&str>) -> Result<Value, RpcError> {
    let tx_hashes = match name {
        None => pool.query_hashes(),
        Some(name) => pool
            .tx_for_name(name.as_bytes())
            .into_iter()
            .collect(),
    };

    let mut entries = Vec::new();
    for txid in tx_hashes {
        let Some(entry) = pool.get(&txid) else {
            continue;
        };
        if !entry.tx().is_namecoin() {
            continue;
        }
        for output in &entry.tx().vout {
            let Some(op) = NameScript::parse(&output.script_pubkey) else {
                continue;
            };
            if !op.is_any_update() {
                continue;
            }
            let op_name = match &op.op {
                NameOp::NameFirstUpdate { .. } => "name_firstupdate",
                NameOp::NameUpdate { .. } => "name_update",
                NameOp::NameNew { .. } => unreachable!("filtered above"),
            };
            entries.push(json!({
                "op": op_name,
                "name": String::from_utf8_lossy(op.name().expect("update ops carry a name")),
                "value": String::from_utf8_lossy(op.value().expect("update ops carry a value")),
                "txid": hash256_to_hex(&txid),
            }));
        }
    }
    Ok(Value::Array(entries))
}

/// Validates the name DB's consistency; returns whether the state is valid.
pub fn name_checkdb<S: KeyValueStore>(
    view: &mut CoinViewCache<'_, S>,
    game: &dyn GameStateView,
) -> Result<Value, RpcError> {
    view.flush()?;
    Ok(Value::Bool(validate_name_db(view.base(), game).is_ok()))
}

/// Appends a `name_update` operation to a raw transaction.  The name input
/// is not added here; callers wire it up from `name_show` output so that
/// building a raw transaction needs no chain state.
pub fn build_raw_name_update(
    tx: &mut Transaction,
    name: &str,
    value: &str,
    address_script: &[u8],
    amount: Amount,
) -> Result<(), RpcError> {
    if address_script.is_empty() {
        return Err(RpcError::InvalidParameter(
            "missing address script".to_string(),
        ));
    }
    tx.version = NAMECOIN_TX_VERSION;
    tx.vout.push(TxOut {
        value: amount,
        script_pubkey: build_name_update(address_script, name.as_bytes(), value.as_bytes()),
    });
    Ok(())
}
