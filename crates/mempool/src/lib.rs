//! Transaction pool with the per-name secondary index.

use std::collections::{HashMap, HashSet};

use hunterd_chainstate::coins::CoinView;
use hunterd_consensus::Hash256;
use hunterd_primitives::transaction::Transaction;
use hunterd_script::names::{NameOp, NameScript};

pub mod names;

use names::NameIndex;

#[derive(Debug, Eq, PartialEq)]
pub enum MempoolError {
    AlreadyInPool,
    /// A different pending transaction already published this commitment.
    NameNewCollision,
    /// Another pending transaction already registers this name.
    RegistrationCollision,
    /// Another pending transaction already updates this name.
    UpdateCollision,
}

impl std::fmt::Display for MempoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyInPool => write!(f, "transaction already in mempool"),
            Self::NameNewCollision => write!(f, "name pre-commitment already pending"),
            Self::RegistrationCollision => write!(f, "name registration already pending"),
            Self::UpdateCollision => write!(f, "name update already pending"),
        }
    }
}

impl std::error::Error for MempoolError {}

#[derive(Clone, Debug)]
pub struct MempoolEntry {
    txid: Hash256,
    tx: Transaction,
    parents: Vec<Hash256>,
    /// The transaction's single name operation, if any, decoded once at
    /// admission time.
    name_op: Option<NameScript>,
}

impl MempoolEntry {
    pub fn txid(&self) -> &Hash256 {
        &self.txid
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn name_op(&self) -> Option<&NameScript> {
        self.name_op.as_ref()
    }
}

fn decode_name_op(tx: &Transaction) -> Option<NameScript> {
    tx.vout
        .iter()
        .find_map(|out| NameScript::parse(&out.script_pubkey))
}

/// The transaction pool.  Tracks parent/child links between pool entries so
/// conflict eviction can remove whole descendant chains, and keeps the name
/// index in lockstep with every entry.
#[derive(Default)]
pub struct Mempool {
    entries: HashMap<Hash256, MempoolEntry>,
    children: HashMap<Hash256, Vec<Hash256>>,
    names: NameIndex,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, txid: &Hash256) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    pub fn query_hashes(&self) -> Vec<Hash256> {
        self.entries.keys().copied().collect()
    }

    pub fn names(&self) -> &NameIndex {
        &self.names
    }

    /// The pending registration or update txid for `name`, if any.  At most
    /// one exists since registrations and updates are exclusive per name.
    pub fn tx_for_name(&self, name: &[u8]) -> Option<Hash256> {
        self.names.tx_for_name(name)
    }

    /// Admits a transaction.  Name conflicts against pending operations are
    /// rejected here; consensus validity must have been checked already.
    pub fn insert(&mut self, tx: Transaction) -> Result<(), MempoolError> {
        let txid = tx.txid();
        if self.entries.contains_key(&txid) {
            return Err(MempoolError::AlreadyInPool);
        }

        let entry = MempoolEntry {
            txid,
            parents: tx
                .vin
                .iter()
                .map(|input| input.prevout.hash)
                .filter(|hash| self.entries.contains_key(hash))
                .collect(),
            name_op: decode_name_op(&tx),
            tx,
        };

        self.names.check_entry(&entry)?;
        self.names.add_unchecked(&entry);

        for parent in &entry.parents {
            let children = self.children.entry(*parent).or_default();
            if !children.contains(&txid) {
                children.push(txid);
            }
        }
        self.entries.insert(txid, entry);
        Ok(())
    }

    /// Pre-admission check without mutating anything.
    pub fn check_tx(&self, tx: &Transaction) -> bool {
        if !tx.is_namecoin() {
            return true;
        }
        let entry = MempoolEntry {
            txid: tx.txid(),
            tx: tx.clone(),
            parents: Vec::new(),
            name_op: decode_name_op(tx),
        };
        self.names.check_entry(&entry).is_ok()
    }

    pub fn remove(&mut self, txid: &Hash256) -> Option<MempoolEntry> {
        let entry = self.entries.remove(txid)?;
        self.names.remove_entry(&entry);
        for parent in &entry.parents {
            let drained = match self.children.get_mut(parent) {
                Some(children) => {
                    children.retain(|child| child != txid);
                    children.is_empty()
                }
                None => false,
            };
            if drained {
                self.children.remove(parent);
            }
        }
        if let Some(children) = self.children.remove(txid) {
            for child in children {
                if let Some(child_entry) = self.entries.get_mut(&child) {
                    child_entry.parents.retain(|parent| parent != txid);
                }
            }
        }
        Some(entry)
    }

    /// Removes a transaction and everything in the pool that spends it.
    pub fn remove_with_descendants(&mut self, txid: &Hash256) -> Vec<MempoolEntry> {
        let mut visited: HashSet<Hash256> = HashSet::new();
        let mut order: Vec<Hash256> = Vec::new();

        fn visit(
            mempool: &Mempool,
            txid: Hash256,
            visited: &mut HashSet<Hash256>,
            order: &mut Vec<Hash256>,
        ) {
            if !visited.insert(txid) {
                return;
            }
            if let Some(children) = mempool.children.get(&txid) {
                for child in children {
                    visit(mempool, *child, visited, order);
                }
            }
            order.push(txid);
        }

        visit(self, *txid, &mut visited, &mut order);

        let mut removed = Vec::new();
        for txid in order {
            if let Some(entry) = self.remove(&txid) {
                removed.push(entry);
            }
        }
        removed
    }

    /// Evicts pool entries whose registrations collide with the first
    /// updates of a freshly mined transaction.  Must run against the
    /// pre-block name-db state, before the block's own operations apply.
    pub fn remove_conflicts(&mut self, block_tx: &Transaction, removed: &mut Vec<MempoolEntry>) {
        if !block_tx.is_namecoin() {
            return;
        }
        for output in &block_tx.vout {
            let Some(op) = NameScript::parse(&output.script_pubkey) else {
                continue;
            };
            if let NameOp::NameFirstUpdate { name, .. } = &op.op {
                if let Some(txid) = self.names.registration_for(name) {
                    removed.extend(self.remove_with_descendants(&txid));
                }
            }
        }
    }

    /// Evicts pending updates for names the game state just transitioned
    /// from living to dead; those updates can no longer confirm.
    pub fn remove_revive_conflicts(
        &mut self,
        revived: &std::collections::BTreeSet<Vec<u8>>,
        removed: &mut Vec<MempoolEntry>,
    ) {
        for name in revived {
            hunterd_log::log_debug!(
                "revivable: {}, pending update: {}",
                String::from_utf8_lossy(name),
                self.names.update_for(name).is_some()
            );
            if let Some(txid) = self.names.update_for(name) {
                removed.extend(self.remove_with_descendants(&txid));
            }
        }
    }

    /// Debug cross-check of the index against the pool and a coin view.
    /// Panics on any inconsistency; state corruption is not recoverable.
    pub fn check<V: CoinView>(&self, view: &V) {
        self.names.check(&self.entries, view);
    }
}
