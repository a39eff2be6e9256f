use crate::model::CategoryId;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The identity of an entry within a `Ledger`. Assigned on insertion and kept across replacement.
#[derive(
    Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntryId(u64);

impl EntryId {
    /// The id carried by an entry that has not been added to a ledger yet.
    pub const UNPOSTED: EntryId = EntryId(0);

    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Identifies an account, e.g. `checking` or `club-cash`.
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for AccountId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// An ISO 4217 style currency code. Codes are stored upper-case.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::new("EUR")
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A single ledger line.
///
/// Entries are immutable once they are in a `Ledger`; changing one means replacing it, which keeps
/// its `EntryId`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Entry {
    id: EntryId,
    name: String,
    value: Decimal,
    currency: Currency,
    date: NaiveDate,
    category: CategoryId,
    account: AccountId,
    account_info: BTreeMap<String, String>,
    note: String,
}

impl Entry {
    pub fn new(
        name: impl Into<String>,
        value: Decimal,
        date: NaiveDate,
        category: CategoryId,
        account: AccountId,
    ) -> Self {
        Self {
            id: EntryId::UNPOSTED,
            name: name.into(),
            value,
            currency: Currency::default(),
            date,
            category,
            account,
            account_info: BTreeMap::new(),
            note: String::new(),
        }
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_account_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.account_info.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: EntryId) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn category(&self) -> CategoryId {
        self.category
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Free-form details about how the entry was booked on its account, e.g. a cheque number.
    pub fn account_info(&self) -> &BTreeMap<String, String> {
        &self.account_info
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    /// True when every field except the identity matches.
    pub fn same_business_fields(&self, other: &Entry) -> bool {
        self.name == other.name
            && self.value == other.value
            && self.currency == other.currency
            && self.date == other.date
            && self.category == other.category
            && self.account == other.account
            && self.account_info == other.account_info
            && self.note == other.note
    }
}
