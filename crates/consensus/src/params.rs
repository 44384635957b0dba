//! Per-chain parameter definitions.

use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

/// How a historic consensus bug is replayed.
///
/// Transactions on this list were accepted by old clients even though they
/// break the name rules.  Validation skips them and application follows the
/// recorded disposition so that the UTXO set and the name database stay in
/// sync with the historic chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BugType {
    /// Skip validation but apply the name effects normally.
    FullyApply,
    /// Skip validation and suppress all name effects; the transaction's name
    /// outputs are marked unspendable.
    FullyIgnore,
    /// Skip validation; the output stays in the UTXO set but the name
    /// database is left untouched.
    InUtxo,
}

#[derive(Clone, Debug)]
pub struct HistoricBug {
    pub txid: Hash256,
    pub height: u32,
    pub bug_type: BugType,
}

#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,
    /// Default value for the periodic name-db check interval:
    /// -1 disables it, 0 checks every block, N checks every Nth block.
    pub default_check_name_db: i32,
    pub historic_bugs: Vec<HistoricBug>,
}

impl ChainParams {
    pub fn is_historic_bug(&self, txid: &Hash256, height: u32) -> Option<BugType> {
        self.historic_bugs
            .iter()
            .find(|bug| bug.height == height && &bug.txid == txid)
            .map(|bug| bug.bug_type)
    }
}

pub fn chain_params(network: Network) -> ChainParams {
    match network {
        Network::Mainnet => ChainParams {
            network,
            default_check_name_db: -1,
            // The mainnet list (the "name stealing" incidents roughly between
            // blocks 139k and 180k) is loaded from chain data at startup.
            historic_bugs: Vec::new(),
        },
        Network::Testnet => ChainParams {
            network,
            default_check_name_db: -1,
            historic_bugs: Vec::new(),
        },
        Network::Regtest => ChainParams {
            network,
            default_check_name_db: 0,
            historic_bugs: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn historic_bug_lookup_matches_txid_and_height() {
        let mut params = chain_params(Network::Regtest);
        params.historic_bugs.push(HistoricBug {
            txid: [7u8; 32],
            height: 100,
            bug_type: BugType::FullyIgnore,
        });

        assert_eq!(
            params.is_historic_bug(&[7u8; 32], 100),
            Some(BugType::FullyIgnore)
        );
        assert_eq!(params.is_historic_bug(&[7u8; 32], 101), None);
        assert_eq!(params.is_historic_bug(&[8u8; 32], 100), None);
    }
}
