//! Bilancial keeps a ledger of entries booked on hierarchical categories and accounts, cut into
//! windows by separators, and aggregates it into per-window category sums and account balances.

pub mod args;
pub mod commands;
mod config;
pub mod engine;
mod error;
pub mod ledger;
pub mod loader;
pub mod model;
pub mod ordering;
mod utils;

#[cfg(test)]
mod test;

pub use config::Config;
pub use error::{Error, ErrorType, Res, Result};
