//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::engine::aggregate::aggregate;
use crate::engine::{Bilancial, CancelFlag};
use crate::ledger::Ledger;
use crate::loader::LedgerFile;
use crate::model::{
    Account, AccountId, AccountKind, CategoryId, CategoryRegistry, CategoryTree, Entry, EntryFilter,
    EntryId,
};
use crate::Config;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) const CASH: &str = "cash";
pub(crate) const BANK: &str = "bank";

/// A day in March 2024.
pub(crate) fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

/// A registry and a ledger with two accounts: `cash` opening at 100 and `bank` opening at 0.
pub(crate) struct Fixture {
    pub registry: Arc<CategoryRegistry>,
    pub ledger: Ledger,
}

impl Fixture {
    pub fn new() -> Self {
        let mut ledger = Ledger::new();
        ledger.add_account(
            Account::new(AccountId::new(CASH), "Cash box", AccountKind::Cash),
            Decimal::from(100),
        );
        ledger.add_account(
            Account::new(
                AccountId::new(BANK),
                "Club account",
                AccountKind::Bank {
                    institution: "Volksbank".to_string(),
                    number: "DE02".to_string(),
                },
            ),
            Decimal::ZERO,
        );
        Self {
            registry: Arc::new(CategoryRegistry::new()),
            ledger,
        }
    }

    /// The category for a `:` separated path.
    pub fn category(&self, path: &str) -> CategoryId {
        self.registry.category_from_str(path, ":")
    }

    pub fn entry(&self, name: &str, value: i64, d: u32, category: &str, account: &str) -> Entry {
        Entry::new(
            name,
            Decimal::from(value),
            day(d),
            self.category(category),
            AccountId::new(account),
        )
    }

    /// Adds an entry to the ledger.
    pub fn book(
        &mut self,
        name: &str,
        value: i64,
        d: u32,
        category: &str,
        account: &str,
    ) -> EntryId {
        let entry = self.entry(name, value, d, category, account);
        self.ledger.add_entry(entry).unwrap()
    }

    pub fn tree(&self) -> CategoryTree {
        self.registry.tree()
    }

    /// Aggregates the current ledger without a filter.
    pub fn aggregate(&self) -> Bilancial {
        self.aggregate_with(&EntryFilter::All)
    }

    pub fn aggregate_with(&self, filter: &EntryFilter) -> Bilancial {
        aggregate(&self.ledger.snapshot(), &self.tree(), filter, 0, &CancelFlag::new()).unwrap()
    }
}

/// Test environment with an initialized bilancial home directory.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub(crate) struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    /// Creates a home directory with a default config and an empty ledger file.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::create(temp_dir.path().join("bilancial"))
            .await
            .unwrap();
        LedgerFile::default()
            .save(&config.ledger_path())
            .await
            .unwrap();
        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    pub fn config(&self) -> Config {
        self.config.clone()
    }

    /// Replaces the ledger file with `json`.
    pub async fn write_ledger(&self, json: &str) {
        crate::utils::write(self.config.ledger_path(), json)
            .await
            .unwrap();
    }
}

/// A small ledger file. The reading point on the 5th closes a window of three entries; the bus
/// ticket on the 10th lands in the final window.
pub(crate) const LEDGER_JSON: &str = r#"{
    "accounts": [
        { "id": "cash", "name": "Cash box", "opening": "100.00" },
        { "id": "bank", "name": "Club account", "kind": { "type": "bank" } }
    ],
    "entries": [
        { "name": "Picnic", "value": "10.00", "date": "2024-03-01",
          "category": "Food", "account": "cash" },
        { "name": "Lemonade", "value": "-4.00", "date": "2024-03-02",
          "category": "Food:Drinks", "account": "cash" },
        { "name": "Dues", "value": "50.00", "date": "2024-03-03",
          "category": "Income", "account": "bank" },
        { "name": "Bus", "value": "-6.00", "date": "2024-03-10",
          "category": "Travel", "account": "cash" }
    ],
    "separators": [
        { "type": "reading_point", "date": "2024-03-05" }
    ]
}"#;
