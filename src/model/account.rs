use crate::model::AccountId;
use serde::{Deserialize, Serialize};

/// The kinds of account the engine knows about.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountKind {
    /// A cash box.
    #[default]
    Cash,
    /// An account held at a bank.
    Bank {
        #[serde(default)]
        institution: String,
        #[serde(default)]
        number: String,
    },
    /// A bookkeeping-only account that does not hold real money, e.g. a budget reserve.
    Virtual,
}

/// An account that entries can be booked on.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    name: String,
    #[serde(default)]
    kind: AccountKind,
}

impl Account {
    pub fn new(id: AccountId, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &AccountKind {
        &self.kind
    }

    /// A one-line description, e.g. `Checking (Bank 1234)`.
    pub fn describe(&self) -> String {
        match &self.kind {
            AccountKind::Cash => format!("{} (cash)", self.name),
            AccountKind::Bank {
                institution,
                number,
            } => {
                let details = [institution.as_str(), number.as_str()]
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                if details.is_empty() {
                    format!("{} (bank)", self.name)
                } else {
                    format!("{} ({details})", self.name)
                }
            }
            AccountKind::Virtual => format!("{} (virtual)", self.name),
        }
    }
}
