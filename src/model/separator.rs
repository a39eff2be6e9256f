//! Separators partition the entry timeline into windows.

use crate::model::{CategoryLookup, Entry};
use crate::ordering;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// The identity of a separator within a `Ledger`.
#[derive(
    Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SeparatorId(u64);

impl SeparatorId {
    /// The id of the closing sentinel the engine adds when a ledger has none of its own.
    pub const AFTER_ALL: SeparatorId = SeparatorId(u64::MAX);

    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Display for SeparatorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// A global bound of the timeline.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extreme {
    BeforeAll,
    AfterAll,
}

serde_plain::derive_display_from_serialize!(Extreme);
serde_plain::derive_fromstr_from_deserialize!(Extreme);

/// A marker in the entry timeline.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum EntrySeparator {
    /// Sits before every entry or after every entry.
    Extreme(Extreme),
    /// Includes every entry dated on or before `date`. Inactive reading points take no part in
    /// aggregation; `visible` is for display only.
    ReadingPoint {
        date: NaiveDate,
        active: bool,
        visible: bool,
    },
    /// Bound to one entry. With `entry_before` the entry is inside the window that this separator
    /// closes, otherwise it opens the next window.
    Linked { entry: Arc<Entry>, entry_before: bool },
}

impl EntrySeparator {
    pub fn reading_point(date: NaiveDate) -> Self {
        Self::ReadingPoint {
            date,
            active: true,
            visible: true,
        }
    }

    /// True when `entry` belongs to the windows up to and including the one this separator
    /// closes.
    pub fn is_at_or_before<L: CategoryLookup>(&self, entry: &Entry, categories: &L) -> bool {
        match self {
            EntrySeparator::Extreme(Extreme::BeforeAll) => false,
            EntrySeparator::Extreme(Extreme::AfterAll) => true,
            EntrySeparator::ReadingPoint { date, .. } => entry.date() <= *date,
            EntrySeparator::Linked {
                entry: linked,
                entry_before,
            } => match ordering::compare_entries_strict(entry, linked, categories) {
                Ordering::Less => true,
                Ordering::Equal => *entry_before,
                Ordering::Greater => false,
            },
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            EntrySeparator::ReadingPoint { active, .. } => *active,
            _ => true,
        }
    }

    /// Whether reports list the window this separator closes. Only reading points can be hidden.
    pub fn is_visible(&self) -> bool {
        match self {
            EntrySeparator::ReadingPoint { visible, .. } => *visible,
            _ => true,
        }
    }

    /// Extremes rank outside of everything else.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            EntrySeparator::Extreme(Extreme::BeforeAll) => 0,
            EntrySeparator::Extreme(Extreme::AfterAll) => 2,
            _ => 1,
        }
    }

    /// The date a window ends on, where one is known.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            EntrySeparator::Extreme(_) => None,
            EntrySeparator::ReadingPoint { date, .. } => Some(*date),
            EntrySeparator::Linked { entry, .. } => Some(entry.date()),
        }
    }

    /// A short label for reports, e.g. `2024-01-31` or `after Hall rent`.
    pub fn label(&self) -> String {
        match self {
            EntrySeparator::Extreme(extreme) => extreme.to_string().replace('_', " "),
            EntrySeparator::ReadingPoint { date, .. } => date.to_string(),
            EntrySeparator::Linked {
                entry,
                entry_before: true,
            } => format!("after {}", entry.name()),
            EntrySeparator::Linked {
                entry,
                entry_before: false,
            } => format!("before {}", entry.name()),
        }
    }
}

/// A separator together with its ledger identity.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Separator {
    id: SeparatorId,
    kind: EntrySeparator,
}

impl Separator {
    pub fn new(id: SeparatorId, kind: EntrySeparator) -> Self {
        Self { id, kind }
    }

    pub fn id(&self) -> SeparatorId {
        self.id
    }

    pub fn kind(&self) -> &EntrySeparator {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut EntrySeparator {
        &mut self.kind
    }
}
