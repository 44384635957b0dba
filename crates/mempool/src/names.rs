//! Secondary index over the pool's pending name operations.
//!
//! At most one pending operation per name is admitted.  Chained updates
//! within the pool would need a dependency graph between pending name
//! operations; only the first is accepted instead.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use hunterd_chainstate::coins::CoinView;
use hunterd_consensus::Hash256;
use hunterd_script::names::{NameOp, NameScript};

use crate::{MempoolEntry, MempoolError};

#[derive(Debug, Default)]
pub struct NameIndex {
    /// Pre-commitment hash -> txid that published it.
    news: BTreeMap<Vec<u8>, Hash256>,
    /// Name -> pending registration txid.  Keys are names whose on-chain
    /// record is absent or dead.
    registrations: BTreeMap<Vec<u8>, Hash256>,
    /// Name -> pending update txid.  Keys are names that are on-chain and
    /// living.  Disjoint from `registrations`.
    updates: BTreeMap<Vec<u8>, Hash256>,
}

impl NameIndex {
    pub fn registration_for(&self, name: &[u8]) -> Option<Hash256> {
        self.registrations.get(name).copied()
    }

    pub fn update_for(&self, name: &[u8]) -> Option<Hash256> {
        self.updates.get(name).copied()
    }

    pub fn tx_for_name(&self, name: &[u8]) -> Option<Hash256> {
        if let Some(txid) = self.registrations.get(name) {
            assert!(!self.updates.contains_key(name));
            return Some(*txid);
        }
        if let Some(txid) = self.updates.get(name) {
            assert!(!self.registrations.contains_key(name));
            return Some(*txid);
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.news.is_empty() && self.registrations.is_empty() && self.updates.is_empty()
    }

    /// Whether the entry can be admitted without colliding with pending
    /// operations.
    pub(crate) fn check_entry(&self, entry: &MempoolEntry) -> Result<(), MempoolError> {
        let Some(op) = entry.name_op() else {
            return Ok(());
        };
        match &op.op {
            NameOp::NameNew { hash } => {
                // Re-adding the same transaction is fine.
                if let Some(existing) = self.news.get(hash) {
                    if existing != entry.txid() {
                        return Err(MempoolError::NameNewCollision);
                    }
                }
            }
            NameOp::NameFirstUpdate { name, .. } => {
                if self.registrations.contains_key(name) {
                    return Err(MempoolError::RegistrationCollision);
                }
            }
            NameOp::NameUpdate { name, .. } => {
                if self.updates.contains_key(name) {
                    return Err(MempoolError::UpdateCollision);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn add_unchecked(&mut self, entry: &MempoolEntry) {
        let Some(op) = entry.name_op() else {
            return;
        };
        match &op.op {
            NameOp::NameNew { hash } => {
                if let Some(existing) = self.news.get(hash) {
                    assert_eq!(existing, entry.txid());
                } else {
                    self.news.insert(hash.clone(), *entry.txid());
                }
            }
            NameOp::NameFirstUpdate { name, .. } => {
                assert!(!self.registrations.contains_key(name));
                self.registrations.insert(name.clone(), *entry.txid());
            }
            NameOp::NameUpdate { name, .. } => {
                assert!(!self.updates.contains_key(name));
                self.updates.insert(name.clone(), *entry.txid());
            }
        }
    }

    pub(crate) fn remove_entry(&mut self, entry: &MempoolEntry) {
        let Some(op) = entry.name_op() else {
            return;
        };
        match &op.op {
            NameOp::NameNew { hash } => {
                if self.news.get(hash) == Some(entry.txid()) {
                    self.news.remove(hash);
                }
            }
            NameOp::NameFirstUpdate { name, .. } => {
                let removed = self.registrations.remove(name);
                assert_eq!(removed.as_ref(), Some(entry.txid()));
            }
            NameOp::NameUpdate { name, .. } => {
                let removed = self.updates.remove(name);
                assert_eq!(removed.as_ref(), Some(entry.txid()));
            }
        }
    }

    /// Asserts the index against the pool contents and the coin view:
    /// every pool entry appears exactly where expected, registration keys are
    /// absent-or-dead on chain, update keys are present-and-living, and the
    /// two key sets are disjoint.
    pub(crate) fn check<V: CoinView>(&self, entries: &HashMap<Hash256, MempoolEntry>, view: &V) {
        let mut seen_registrations: BTreeSet<Vec<u8>> = BTreeSet::new();
        let mut seen_updates: BTreeSet<Vec<u8>> = BTreeSet::new();

        for (txid, entry) in entries {
            let Some(op) = entry.name_op() else {
                continue;
            };
            match &op.op {
                NameOp::NameNew { hash } => {
                    assert_eq!(self.news.get(hash), Some(txid));
                }
                NameOp::NameFirstUpdate { name, .. } => {
                    assert_eq!(self.registrations.get(name), Some(txid));
                    assert!(seen_registrations.insert(name.clone()));

                    if let Some(data) = view.get_name(name).expect("name lookup") {
                        assert!(data.is_dead());
                    }
                }
                NameOp::NameUpdate { name, .. } => {
                    assert_eq!(self.updates.get(name), Some(txid));
                    assert!(seen_updates.insert(name.clone()));

                    let data = view
                        .get_name(name)
                        .expect("name lookup")
                        .expect("pending update for unknown name");
                    assert!(!data.is_dead());
                }
            }
        }

        assert_eq!(seen_registrations.len(), self.registrations.len());
        assert_eq!(seen_updates.len(), self.updates.len());

        // Registrations and updates must be disjoint: a name either exists
        // on chain or it does not.
        for name in &seen_registrations {
            assert!(!self.updates.contains_key(name));
        }
        for name in &seen_updates {
            assert!(!self.registrations.contains_key(name));
        }
    }
}
