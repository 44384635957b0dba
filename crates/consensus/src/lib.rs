//! Consensus constants and per-chain parameters.

pub mod constants;
pub mod money;
pub mod params;

pub use params::{chain_params, BugType, ChainParams, HistoricBug, Network};

pub type Hash256 = [u8; 32];
