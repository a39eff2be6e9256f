//! The total ordering of ledger entries and separators.
//!
//! Entries are ordered by `(date, name, value, category, account, note, currency, account info)`
//! and then by identity. Separators are placed by the entries they include. The two meet in
//! `compare_mixed`, and `merge` produces the sorted timeline that the aggregation engine walks.
//!
//! `compare_entries` keeps a deliberately weak last rule: two distinct entries whose business
//! fields are all equal each compare as `Greater` than the other. This is fine for display
//! ordering but it is not a total order, so anything that sorts (including `merge`) uses
//! `compare_entries_strict`, which breaks the final tie by `EntryId`.

use crate::model::{CategoryLookup, Entry, EntrySeparator, Separator};
use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Date formats understood by `compare_date_strings`.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d"];

/// One element of the merged timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Timeline {
    Entry(Arc<Entry>),
    Separator(Arc<Separator>),
}

/// Compares by year, then month, then day; anything finer is ignored. `None` is the minimal
/// extreme.
pub fn compare_dates<D: Datelike>(a: Option<&D>, b: Option<&D>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => (a.year(), a.month(), a.day()).cmp(&(b.year(), b.month(), b.day())),
    }
}

/// Compares two dates given as strings. If either side fails to parse, the result is `Equal`.
pub fn compare_date_strings(a: &str, b: &str) -> Ordering {
    match (parse_date(a), parse_date(b)) {
        (Some(a), Some(b)) => compare_dates(Some(&a), Some(&b)),
        _ => Ordering::Equal,
    }
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
}

/// Compares the business fields of two entries, leaving identity out.
fn compare_fields<L: CategoryLookup>(a: &Entry, b: &Entry, categories: &L) -> Ordering {
    compare_dates(Some(&a.date()), Some(&b.date()))
        .then_with(|| a.name().cmp(b.name()))
        .then_with(|| a.value().cmp(&b.value()))
        .then_with(|| categories.compare(a.category(), b.category()))
        .then_with(|| a.account().cmp(b.account()))
        .then_with(|| a.note().cmp(b.note()))
        .then_with(|| a.currency().code().cmp(b.currency().code()))
        .then_with(|| compare_account_info(a.account_info(), b.account_info()))
}

/// Walks both maps in key order, comparing each key and then its value.
fn compare_account_info(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        match ka.cmp(kb).then_with(|| va.cmp(vb)) {
            Ordering::Equal => continue,
            unequal => return unequal,
        }
    }
    a.len().cmp(&b.len())
}

/// The display ordering of entries. Weak on the last rule, see the module documentation.
pub fn compare_entries<L: CategoryLookup>(a: &Entry, b: &Entry, categories: &L) -> Ordering {
    compare_fields(a, b, categories).then_with(|| {
        if a.id() == b.id() {
            Ordering::Equal
        } else {
            Ordering::Greater
        }
    })
}

/// Like `compare_entries` but breaks the final tie by `EntryId`, making it a total order.
pub fn compare_entries_strict<L: CategoryLookup>(a: &Entry, b: &Entry, categories: &L) -> Ordering {
    compare_fields(a, b, categories).then_with(|| a.id().cmp(&b.id()))
}

/// Orders separators by the set of entries they include. Extremes sit outside everything else, a
/// reading point follows every linked separator whose entry falls on or before its date, and ties
/// fall back to the separator id.
pub fn compare_separators<L: CategoryLookup>(
    a: &Separator,
    b: &Separator,
    categories: &L,
) -> Ordering {
    if a.id() == b.id() {
        return Ordering::Equal;
    }
    let by_kind = match (a.kind(), b.kind()) {
        (
            EntrySeparator::ReadingPoint { date: da, .. },
            EntrySeparator::ReadingPoint { date: db, .. },
        ) => compare_dates(Some(da), Some(db)),
        (
            EntrySeparator::Linked {
                entry: ea,
                entry_before: ba,
            },
            EntrySeparator::Linked {
                entry: eb,
                entry_before: bb,
            },
        ) => compare_entries_strict(ea, eb, categories).then_with(|| ba.cmp(bb)),
        (EntrySeparator::ReadingPoint { date, .. }, EntrySeparator::Linked { entry, .. }) => {
            if entry.date() <= *date {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (EntrySeparator::Linked { entry, .. }, EntrySeparator::ReadingPoint { date, .. }) => {
            if entry.date() <= *date {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        _ => Ordering::Equal,
    };
    a.kind()
        .rank()
        .cmp(&b.kind().rank())
        .then(by_kind)
        .then_with(|| a.id().cmp(&b.id()))
}

/// Compares two timeline elements of either kind. An entry and a separator are ordered by the
/// separator's `is_at_or_before`; entries compare with `compare_entries`.
pub fn compare_mixed<L: CategoryLookup>(a: &Timeline, b: &Timeline, categories: &L) -> Ordering {
    match (a, b) {
        (Timeline::Entry(a), Timeline::Entry(b)) => compare_entries(a, b, categories),
        (Timeline::Entry(entry), Timeline::Separator(separator)) => {
            if separator.kind().is_at_or_before(entry, categories) {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (Timeline::Separator(_), Timeline::Entry(_)) => compare_mixed(b, a, categories).reverse(),
        (Timeline::Separator(a), Timeline::Separator(b)) => compare_separators(a, b, categories),
    }
}

/// Sorts entries and separators and interleaves them. Each separator is preceded by every entry it
/// includes that an earlier separator did not.
pub fn merge<L: CategoryLookup>(
    mut entries: Vec<Arc<Entry>>,
    mut separators: Vec<Arc<Separator>>,
    categories: &L,
) -> Vec<Timeline> {
    entries.sort_by(|a, b| compare_entries_strict(a, b, categories));
    separators.sort_by(|a, b| compare_separators(a, b, categories));

    let mut timeline = Vec::with_capacity(entries.len() + separators.len());
    let mut entries = entries.into_iter().peekable();
    for separator in separators {
        while let Some(entry) = entries.next_if(|e| separator.kind().is_at_or_before(e, categories))
        {
            timeline.push(Timeline::Entry(entry));
        }
        timeline.push(Timeline::Separator(separator));
    }
    timeline.extend(entries.map(Timeline::Entry));
    timeline
}
