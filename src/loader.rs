//! Reading and writing the ledger file.
//!
//! The ledger file is JSON with three lists. Category paths are written as one string joined by
//! the configured separator, amounts as strings (see `Amount`), and a linked separator names its
//! entry by the entry's index in the `entries` list.
//!
//! ```json
//! {
//!   "accounts": [
//!     { "id": "cash", "name": "Cash box", "kind": { "type": "cash" }, "opening": "120.00" }
//!   ],
//!   "entries": [
//!     { "name": "Lemonade", "value": "-4.50", "date": "2024-03-02",
//!       "category": "Food:Drinks", "account": "cash" }
//!   ],
//!   "separators": [
//!     { "type": "reading_point", "date": "2024-03-31" },
//!     { "type": "linked", "entry": 0, "entry_before": true },
//!     { "type": "extreme", "extreme": "after_all" }
//!   ]
//! }
//! ```

use crate::error::Res;
use crate::ledger::Ledger;
use crate::model::{
    Account, AccountId, Amount, CategoryLookup, CategoryRegistry, CategoryTree, Currency, Entry,
    EntryId, EntrySeparator, Extreme,
};
use crate::utils;
use anyhow::{bail, Context};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

fn yes() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

/// The on-disk form of a ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct LedgerFile {
    #[serde(default)]
    pub accounts: Vec<AccountRecord>,
    #[serde(default)]
    pub entries: Vec<EntryRecord>,
    #[serde(default)]
    pub separators: Vec<SeparatorRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AccountRecord {
    #[serde(flatten)]
    pub account: Account,
    #[serde(default)]
    pub opening: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EntryRecord {
    pub name: String,
    pub value: Amount,
    pub date: NaiveDate,
    #[serde(default)]
    pub category: String,
    pub account: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub account_info: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SeparatorRecord {
    Extreme {
        extreme: Extreme,
    },
    ReadingPoint {
        date: NaiveDate,
        #[serde(default = "yes", skip_serializing_if = "is_true")]
        active: bool,
        #[serde(default = "yes", skip_serializing_if = "is_true")]
        visible: bool,
    },
    Linked {
        /// Index into `LedgerFile::entries`.
        entry: usize,
        #[serde(default)]
        entry_before: bool,
    },
}

impl LedgerFile {
    /// Reads a ledger file.
    pub async fn load(path: &Path) -> Res<Self> {
        utils::deserialize(path).await
    }

    /// Writes the ledger file as pretty JSON.
    pub async fn save(&self, path: &Path) -> Res<()> {
        let json = serde_json::to_string_pretty(self).context("Unable to serialize the ledger")?;
        utils::write(path, json).await
    }

    /// Builds a ledger, resolving category strings through `registry`.
    ///
    /// Accounts are added first so that every entry can be checked against them. An entry on an
    /// unknown account, or a linked separator with an index out of range, fails the whole load.
    pub fn into_ledger(self, registry: &CategoryRegistry, separator: &str) -> Res<Ledger> {
        let mut ledger = Ledger::new();
        for record in self.accounts {
            ledger.add_account(record.account, record.opening.value());
        }

        let entries: Vec<Entry> = self
            .entries
            .into_iter()
            .map(|record| record.into_entry(registry, separator))
            .collect();
        let ids = ledger
            .add_entries(entries)
            .context("The ledger file has an invalid entry")?;

        for (ix, record) in self.separators.into_iter().enumerate() {
            match record {
                SeparatorRecord::Extreme { extreme } => {
                    ledger.add_separator(EntrySeparator::Extreme(extreme));
                }
                SeparatorRecord::ReadingPoint {
                    date,
                    active,
                    visible,
                } => {
                    ledger.add_separator(EntrySeparator::ReadingPoint {
                        date,
                        active,
                        visible,
                    });
                }
                SeparatorRecord::Linked {
                    entry,
                    entry_before,
                } => {
                    let Some(id) = ids.get(entry) else {
                        let count = ids.len();
                        bail!("Separator {ix} is linked to entry {entry} of only {count} entries")
                    };
                    ledger.link_separator(*id, entry_before);
                }
            }
        }
        debug!(
            "Loaded {} accounts, {} entries and {} separators",
            ledger.accounts().len(),
            ledger.entries().len(),
            ledger.separators().len()
        );
        Ok(ledger)
    }

    /// The file form of `ledger`. A linked separator whose entry has been removed is left out.
    pub fn from_ledger(ledger: &Ledger, tree: &CategoryTree, separator: &str) -> Self {
        let accounts = ledger
            .accounts()
            .values()
            .map(|a| AccountRecord {
                account: a.account().clone(),
                opening: Amount::new(a.opening()),
            })
            .collect();

        let index: HashMap<EntryId, usize> = ledger
            .entries()
            .iter()
            .enumerate()
            .map(|(ix, e)| (e.id(), ix))
            .collect();
        let entries = ledger
            .entries()
            .iter()
            .map(|e| EntryRecord::from_entry(e, tree, separator))
            .collect();

        let separators = ledger
            .separators()
            .iter()
            .filter_map(|s| match s.kind() {
                EntrySeparator::Extreme(extreme) => Some(SeparatorRecord::Extreme {
                    extreme: *extreme,
                }),
                EntrySeparator::ReadingPoint {
                    date,
                    active,
                    visible,
                } => Some(SeparatorRecord::ReadingPoint {
                    date: *date,
                    active: *active,
                    visible: *visible,
                }),
                EntrySeparator::Linked {
                    entry,
                    entry_before,
                } => match index.get(&entry.id()) {
                    Some(ix) => Some(SeparatorRecord::Linked {
                        entry: *ix,
                        entry_before: *entry_before,
                    }),
                    None => {
                        warn!(
                            "Dropping separator {} linked to removed entry {}",
                            s.id(),
                            entry.id()
                        );
                        None
                    }
                },
            })
            .collect();

        Self {
            accounts,
            entries,
            separators,
        }
    }
}

impl EntryRecord {
    fn into_entry(self, registry: &CategoryRegistry, separator: &str) -> Entry {
        let category = registry.category_from_str(&self.category, separator);
        let mut entry = Entry::new(self.name, self.value.value(), self.date, category, self.account)
            .with_note(self.note);
        if let Some(code) = self.currency {
            entry = entry.with_currency(Currency::new(code));
        }
        for (key, value) in self.account_info {
            entry = entry.with_account_info(key, value);
        }
        entry
    }

    fn from_entry(entry: &Arc<Entry>, tree: &CategoryTree, separator: &str) -> Self {
        let currency = entry.currency();
        Self {
            name: entry.name().to_string(),
            value: Amount::new(entry.value()),
            date: entry.date(),
            category: tree.display(entry.category(), separator),
            account: entry.account().clone(),
            currency: (*currency != Currency::default()).then(|| currency.code().to_string()),
            note: entry.note().to_string(),
            account_info: entry.account_info().clone(),
        }
    }
}

/// Reads the ledger file at `path` into a new `Ledger`.
pub async fn load(path: &Path, registry: &CategoryRegistry, separator: &str) -> Res<Ledger> {
    LedgerFile::load(path)
        .await?
        .into_ledger(registry, separator)
        .with_context(|| format!("Invalid ledger file {}", path.display()))
}
