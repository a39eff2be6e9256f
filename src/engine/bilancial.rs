//! The published results of an aggregation pass.

use crate::engine::overlay::{CategoryOverlay, OverlayState};
use crate::model::{AccountId, CategoryId, CategoryTree, Separator, SeparatorId};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// A sum split into its positive and negative parts. `minus` holds the (negative) total of the
/// negative values.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct Sum {
    plus: Decimal,
    minus: Decimal,
}

impl Sum {
    pub fn add(&mut self, value: Decimal) {
        if value.is_sign_negative() {
            self.minus += value;
        } else {
            self.plus += value;
        }
    }

    pub fn merge(&mut self, other: &Sum) {
        self.plus += other.plus;
        self.minus += other.minus;
    }

    pub fn plus(&self) -> Decimal {
        self.plus
    }

    pub fn minus(&self) -> Decimal {
        self.minus
    }

    pub fn total(&self) -> Decimal {
        self.plus + self.minus
    }
}

/// The sums of one category within one window.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct CategorySums {
    /// Entries booked directly on the category.
    pub(crate) individual: Sum,
    /// `individual` plus the cumulative sums of every direct child.
    pub(crate) cumulative: Sum,
}

impl CategorySums {
    pub fn individual(&self) -> &Sum {
        &self.individual
    }

    pub fn cumulative(&self) -> &Sum {
        &self.cumulative
    }
}

/// The totals captured at one separator.
///
/// Category sums and `window_sum` cover the window closed by the separator, i.e. the entries
/// after the previous separator. `overall_sum` and the account balances run from the start.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct BilancialInformation {
    pub(crate) overall_sum: Decimal,
    pub(crate) window_sum: Decimal,
    pub(crate) entry_count: usize,
    pub(crate) categories: BTreeMap<CategoryId, CategorySums>,
    pub(crate) accounts: BTreeMap<AccountId, Decimal>,
}

impl BilancialInformation {
    pub fn overall_sum(&self) -> Decimal {
        self.overall_sum
    }

    pub fn window_sum(&self) -> Decimal {
        self.window_sum
    }

    /// The number of entries in the window.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Every category with a sum in this window, including the ancestors of those with entries.
    pub fn categories(&self) -> &BTreeMap<CategoryId, CategorySums> {
        &self.categories
    }

    pub fn sums(&self, category: CategoryId) -> CategorySums {
        self.categories.get(&category).copied().unwrap_or_default()
    }

    pub fn individual(&self, category: CategoryId) -> Decimal {
        self.sums(category).individual.total()
    }

    pub fn cumulative(&self, category: CategoryId) -> Decimal {
        self.sums(category).cumulative.total()
    }

    /// The running balance of `account` at this separator, zero if unknown.
    pub fn balance(&self, account: &AccountId) -> Decimal {
        self.accounts.get(account).copied().unwrap_or_default()
    }

    pub fn accounts(&self) -> &BTreeMap<AccountId, Decimal> {
        &self.accounts
    }
}

/// One separator with the totals captured there.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    separator: Arc<Separator>,
    information: BilancialInformation,
}

/// Checkpoints are equal when they close the same separator with the same totals, whichever entry
/// instance a linked separator is bound to.
impl PartialEq for Checkpoint {
    fn eq(&self, other: &Self) -> bool {
        self.separator.id() == other.separator.id() && self.information == other.information
    }
}

impl Eq for Checkpoint {}

impl Checkpoint {
    pub fn separator(&self) -> &Arc<Separator> {
        &self.separator
    }

    pub fn information(&self) -> &BilancialInformation {
        &self.information
    }
}

/// Separator to totals, in timeline order.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BilancialMapping {
    checkpoints: Vec<Checkpoint>,
    index: HashMap<SeparatorId, usize>,
}

impl BilancialMapping {
    /// Appends a checkpoint. Callers push in timeline order.
    pub(crate) fn push(&mut self, separator: Arc<Separator>, information: BilancialInformation) {
        self.index.insert(separator.id(), self.checkpoints.len());
        self.checkpoints.push(Checkpoint {
            separator,
            information,
        });
    }

    pub fn get(&self, separator: SeparatorId) -> Option<&BilancialInformation> {
        self.checkpoint(separator).map(Checkpoint::information)
    }

    pub fn checkpoint(&self, separator: SeparatorId) -> Option<&Checkpoint> {
        self.index.get(&separator).map(|ix| &self.checkpoints[*ix])
    }

    /// The last checkpoint of the timeline.
    pub fn most_recent(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    pub fn ordered_list(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Checkpoints whose separator is meant to be listed. Invisible reading points still close a
    /// window and can be looked up by id.
    pub fn visible(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints
            .iter()
            .filter(|c| c.separator().kind().is_visible())
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

/// The complete, immutable output of one aggregation pass.
#[derive(Debug, Clone)]
pub struct Bilancial {
    pub(crate) revision: u64,
    pub(crate) filter_generation: u64,
    pub(crate) tree: CategoryTree,
    pub(crate) mapping: BilancialMapping,
    pub(crate) openings: BTreeMap<AccountId, Decimal>,
    pub(crate) closings: BTreeMap<AccountId, Decimal>,
    pub(crate) direct: BTreeSet<CategoryId>,
}

impl Bilancial {
    /// The ledger revision this was computed from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn filter_generation(&self) -> u64 {
        self.filter_generation
    }

    /// The category tree as it was when the pass started.
    pub fn tree(&self) -> &CategoryTree {
        &self.tree
    }

    pub fn mapping(&self) -> &BilancialMapping {
        &self.mapping
    }

    /// The opening balance of `account`, zero if unknown.
    pub fn account_before(&self, account: &AccountId) -> Decimal {
        self.openings.get(account).copied().unwrap_or_default()
    }

    /// The opening balance plus every aggregated entry of `account`.
    pub fn account_after(&self, account: &AccountId) -> Decimal {
        self.closings
            .get(account)
            .copied()
            .unwrap_or_else(|| self.account_before(account))
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.openings.keys()
    }

    /// Categories that have at least one aggregated entry booked directly on them.
    pub fn direct_categories(&self) -> &BTreeSet<CategoryId> {
        &self.direct
    }

    /// The sum of every aggregated entry.
    pub fn total(&self) -> Decimal {
        self.mapping
            .most_recent()
            .map(|c| c.information().overall_sum())
            .unwrap_or_default()
    }

    /// The display overlay of the checkpoint at `separator`, or of the most recent one.
    pub fn overlay(
        &self,
        state: &OverlayState,
        separator: Option<SeparatorId>,
    ) -> Option<(CategoryOverlay, &Checkpoint)> {
        let checkpoint = match separator {
            Some(id) => self.mapping.checkpoint(id)?,
            None => self.mapping.most_recent()?,
        };
        let overlay =
            CategoryOverlay::build(&self.tree, checkpoint.information(), &self.direct, state);
        Some((overlay, checkpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_splits_signs() {
        let mut sum = Sum::default();
        sum.add(Decimal::from(10));
        sum.add(Decimal::from(-4));
        sum.add(Decimal::from(3));
        assert_eq!(sum.plus(), Decimal::from(13));
        assert_eq!(sum.minus(), Decimal::from(-4));
        assert_eq!(sum.total(), Decimal::from(9));

        let mut other = Sum::default();
        other.add(Decimal::from(-1));
        sum.merge(&other);
        assert_eq!(sum.minus(), Decimal::from(-5));
    }

    #[test]
    fn test_lookups_default_to_zero() {
        let info = BilancialInformation::default();
        assert_eq!(info.individual(CategoryId::ROOT), Decimal::ZERO);
        assert_eq!(info.cumulative(CategoryId::ROOT), Decimal::ZERO);
        assert_eq!(info.balance(&AccountId::new("nowhere")), Decimal::ZERO);

        let mapping = BilancialMapping::default();
        assert!(mapping.get(SeparatorId::AFTER_ALL).is_none());
        assert!(mapping.most_recent().is_none());
    }
}
