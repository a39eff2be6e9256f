//! The fold that turns a ledger snapshot into a `Bilancial`.

use crate::engine::bilancial::{
    Bilancial, BilancialInformation, BilancialMapping, CategorySums, Sum,
};
use crate::engine::CancelFlag;
use crate::ledger::LedgerSnapshot;
use crate::model::{
    AccountId, CategoryId, CategoryLookup, CategoryTree, Entry, EntryFilter, EntrySeparator,
    Extreme, Separator, SeparatorId,
};
use crate::ordering::{self, Timeline};
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;

/// Walks the merged timeline of `snapshot` and captures the totals at every active separator.
///
/// Entries rejected by `filter` are left out. If the ledger has no `AfterAll` separator a
/// synthetic one with id `SeparatorId::AFTER_ALL` closes the timeline, so trailing entries always
/// land in a window. Returns `None` as soon as `cancel` is raised.
pub(crate) fn aggregate(
    snapshot: &LedgerSnapshot,
    tree: &CategoryTree,
    filter: &EntryFilter,
    filter_generation: u64,
    cancel: &CancelFlag,
) -> Option<Bilancial> {
    let entries: Vec<Arc<Entry>> = snapshot
        .entries()
        .iter()
        .filter(|e| filter.verify_entry(e, tree))
        .cloned()
        .collect();
    let mut separators: Vec<Arc<Separator>> = snapshot
        .separators()
        .iter()
        .filter(|s| s.kind().is_active())
        .cloned()
        .collect();
    let closed = separators
        .iter()
        .any(|s| matches!(s.kind(), EntrySeparator::Extreme(Extreme::AfterAll)));
    if !closed {
        separators.push(Arc::new(Separator::new(
            SeparatorId::AFTER_ALL,
            EntrySeparator::Extreme(Extreme::AfterAll),
        )));
    }
    trace!(
        "Aggregating {} entries and {} separators at revision {}",
        entries.len(),
        separators.len(),
        snapshot.revision()
    );

    let openings: BTreeMap<AccountId, Decimal> = snapshot
        .accounts()
        .iter()
        .map(|(id, account)| (id.clone(), account.opening()))
        .collect();
    let mut fold = Fold::new(openings.clone());
    let mut mapping = BilancialMapping::default();
    for item in ordering::merge(entries, separators, tree) {
        if cancel.is_cancelled() {
            return None;
        }
        match item {
            Timeline::Entry(entry) => fold.add(&entry),
            Timeline::Separator(separator) => {
                let information = fold.checkpoint(tree);
                mapping.push(separator, information);
            }
        }
    }

    Some(Bilancial {
        revision: snapshot.revision(),
        filter_generation,
        tree: tree.clone(),
        mapping,
        openings,
        closings: fold.balances,
        direct: fold.direct,
    })
}

/// Running state of a single pass.
struct Fold {
    overall: Decimal,
    window: Decimal,
    count: usize,
    individual: BTreeMap<CategoryId, Sum>,
    balances: BTreeMap<AccountId, Decimal>,
    direct: BTreeSet<CategoryId>,
}

impl Fold {
    fn new(balances: BTreeMap<AccountId, Decimal>) -> Self {
        Self {
            overall: Decimal::ZERO,
            window: Decimal::ZERO,
            count: 0,
            individual: BTreeMap::new(),
            balances,
            direct: BTreeSet::new(),
        }
    }

    fn add(&mut self, entry: &Entry) {
        let value = entry.value();
        self.overall += value;
        self.window += value;
        self.count += 1;
        self.individual
            .entry(entry.category())
            .or_default()
            .add(value);
        *self.balances.entry(entry.account().clone()).or_default() += value;
        self.direct.insert(entry.category());
    }

    /// Closes the current window and returns its totals.
    fn checkpoint(&mut self, tree: &CategoryTree) -> BilancialInformation {
        let individual = std::mem::take(&mut self.individual);
        let mut categories: BTreeMap<CategoryId, CategorySums> = BTreeMap::new();
        for (id, sum) in individual {
            for ancestor in tree.ancestors(id) {
                categories.entry(ancestor).or_default();
            }
            let sums = categories.entry(id).or_default();
            sums.individual = sum;
            sums.cumulative = sum;
        }
        roll_up(&mut categories, tree);

        let information = BilancialInformation {
            overall_sum: self.overall,
            window_sum: self.window,
            entry_count: self.count,
            categories,
            accounts: self.balances.clone(),
        };
        self.window = Decimal::ZERO;
        self.count = 0;
        information
    }
}

/// Adds every category's cumulative sum to its parent's, deepest categories first, so a parent
/// is complete before it is added to its own parent.
fn roll_up(categories: &mut BTreeMap<CategoryId, CategorySums>, tree: &CategoryTree) {
    let mut order: Vec<CategoryId> = categories.keys().copied().collect();
    order.sort_by_key(|id| Reverse(tree.depth(*id)));
    for id in order {
        let Some(parent) = tree.parent(id) else {
            continue;
        };
        let cumulative = categories.get(&id).map(|s| s.cumulative).unwrap_or_default();
        categories
            .entry(parent)
            .or_default()
            .cumulative
            .merge(&cumulative);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{day, Fixture, BANK, CASH};

    fn last(bilancial: &Bilancial) -> &BilancialInformation {
        bilancial.mapping().most_recent().unwrap().information()
    }

    fn assert_rolled_up(bilancial: &Bilancial) {
        let tree = bilancial.tree();
        for checkpoint in bilancial.mapping().ordered_list() {
            let info = checkpoint.information();
            for (&id, sums) in info.categories() {
                let children: Decimal = tree
                    .children(id)
                    .iter()
                    .map(|child| info.cumulative(*child))
                    .sum();
                assert_eq!(
                    sums.cumulative().total(),
                    sums.individual().total() + children,
                    "roll-up of {}",
                    tree.display(id, ":")
                );
            }
        }
    }

    #[test]
    fn test_parent_and_child_sums() {
        let mut fx = Fixture::new();
        fx.book("Grant", 10, 1, "X", CASH);
        fx.book("Paint", -5, 2, "X:Y", CASH);
        let x = fx.category("X");
        let y = fx.category("X:Y");

        let bilancial = fx.aggregate();
        let info = last(&bilancial);
        assert_eq!(info.cumulative(x), Decimal::from(5));
        assert_eq!(info.individual(x), Decimal::from(10));
        assert_eq!(info.cumulative(y), Decimal::from(-5));
        assert_eq!(info.individual(y), Decimal::from(-5));

        let sums = info.sums(x);
        assert_eq!(sums.cumulative().plus(), Decimal::from(10));
        assert_eq!(sums.cumulative().minus(), Decimal::from(-5));
        assert_eq!(info.cumulative(CategoryId::ROOT), Decimal::from(5));
        assert_rolled_up(&bilancial);
    }

    #[test]
    fn test_reading_point_splits_the_total() {
        let mut fx = Fixture::new();
        fx.book("Dues", 10, 1, "Food", CASH);
        fx.book("Snacks", -3, 5, "Food", CASH);
        fx.book("Bus", 4, 9, "Travel", BANK);
        let unsplit = last(&fx.aggregate()).cumulative(CategoryId::ROOT);
        assert_eq!(unsplit, Decimal::from(11));

        let point = fx.ledger.add_separator(EntrySeparator::reading_point(day(5)));
        let bilancial = fx.aggregate();
        let list = bilancial.mapping().ordered_list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].separator().id(), point);
        assert_eq!(list[1].separator().id(), SeparatorId::AFTER_ALL);

        let first = bilancial.mapping().get(point).unwrap();
        let second = list[1].information();
        assert_eq!(first.cumulative(CategoryId::ROOT), Decimal::from(7));
        assert_eq!(second.cumulative(CategoryId::ROOT), Decimal::from(4));
        assert_eq!(
            first.cumulative(CategoryId::ROOT) + second.cumulative(CategoryId::ROOT),
            unsplit
        );
        assert_eq!(first.entry_count(), 2);
        assert_eq!(second.entry_count(), 1);
        assert_eq!(first.overall_sum(), Decimal::from(7));
        assert_eq!(second.overall_sum(), Decimal::from(11));
        assert_eq!(second.individual(fx.category("Food")), Decimal::ZERO);
        assert_rolled_up(&bilancial);
    }

    #[test]
    fn test_window_sums_add_up_to_the_total() {
        let mut fx = Fixture::new();
        for (d, value) in [(1, 12), (3, -7), (4, 30), (8, -2), (12, 5)] {
            fx.book("Item", value, d, "Club:Events", CASH);
        }
        fx.ledger.add_separator(EntrySeparator::reading_point(day(3)));
        fx.ledger.add_separator(EntrySeparator::reading_point(day(8)));

        let bilancial = fx.aggregate();
        let windows: Decimal = bilancial
            .mapping()
            .ordered_list()
            .iter()
            .map(|c| c.information().window_sum())
            .sum();
        assert_eq!(windows, Decimal::from(38));
        assert_eq!(bilancial.total(), Decimal::from(38));
        for checkpoint in bilancial.mapping().ordered_list() {
            let info = checkpoint.information();
            assert_eq!(info.cumulative(CategoryId::ROOT), info.window_sum());
        }
        assert_rolled_up(&bilancial);
    }

    #[test]
    fn test_account_balances() {
        let mut fx = Fixture::new();
        fx.book("Dues", 50, 1, "Income", CASH);
        fx.book("Rent", -20, 2, "Rent", BANK);
        fx.book("Snacks", -8, 6, "Food", CASH);
        let point = fx.ledger.add_separator(EntrySeparator::reading_point(day(2)));

        let bilancial = fx.aggregate();
        let cash = AccountId::new(CASH);
        let bank = AccountId::new(BANK);
        assert_eq!(bilancial.account_before(&cash), Decimal::from(100));
        assert_eq!(bilancial.account_after(&cash), Decimal::from(142));
        assert_eq!(bilancial.account_before(&bank), Decimal::ZERO);
        assert_eq!(bilancial.account_after(&bank), Decimal::from(-20));
        assert_eq!(bilancial.accounts().count(), 2);

        let at_point = bilancial.mapping().get(point).unwrap();
        assert_eq!(at_point.balance(&cash), Decimal::from(150));
        assert_eq!(at_point.balance(&bank), Decimal::from(-20));
        assert_eq!(last(&bilancial).balance(&cash), Decimal::from(142));
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let mut fx = Fixture::new();
        fx.book("Dues", 50, 1, "Income", CASH);
        fx.book("Lemonade", -3, 2, "Food:Drinks", CASH);
        fx.ledger.add_separator(EntrySeparator::reading_point(day(1)));

        let a = fx.aggregate();
        let b = fx.aggregate();
        assert_eq!(a.mapping(), b.mapping());
        assert_eq!(a.direct_categories(), b.direct_categories());
    }

    #[test]
    fn test_remove_and_re_add_reproduces_the_mapping() {
        let mut fx = Fixture::new();
        fx.book("Dues", 50, 1, "Income", CASH);
        let lemonade = fx.book("Lemonade", -3, 2, "Food:Drinks", CASH);
        fx.book("Bus", -6, 7, "Travel", BANK);
        fx.ledger.add_separator(EntrySeparator::reading_point(day(4)));
        let before = fx.aggregate();

        fx.ledger.remove_entry(lemonade).unwrap();
        assert_ne!(fx.aggregate().mapping(), before.mapping());

        let again = fx.entry("Lemonade", -3, 2, "Food:Drinks", CASH);
        fx.ledger.add_entry(again).unwrap();
        let after = fx.aggregate();
        assert_eq!(after.mapping(), before.mapping());
        assert_eq!(after.account_after(&AccountId::new(CASH)), Decimal::from(147));
    }

    #[test]
    fn test_re_added_entry_rebinds_its_linked_separator() {
        let mut fx = Fixture::new();
        fx.book("Dues", 50, 1, "Income", CASH);
        let lemonade = fx.book("Lemonade", -3, 2, "Food:Drinks", CASH);
        fx.book("Bus", -6, 7, "Travel", BANK);
        let linked = fx.ledger.link_separator(lemonade, true).unwrap();
        let before = fx.aggregate();
        let window = |b: &Bilancial| -> Vec<Decimal> {
            b.mapping()
                .ordered_list()
                .iter()
                .map(|c| c.information().window_sum())
                .collect()
        };
        assert_eq!(window(&before), vec![Decimal::from(47), Decimal::from(-6)]);

        fx.ledger.remove_entry(lemonade).unwrap();
        let again = fx.entry("Lemonade", -3, 2, "Food:Drinks", CASH);
        let id = fx.ledger.add_entry(again).unwrap();
        let after = fx.aggregate();
        assert_eq!(window(&after), window(&before));
        assert_eq!(after.mapping(), before.mapping());

        let separator = after.mapping().checkpoint(linked).unwrap().separator();
        let EntrySeparator::Linked { entry, .. } = separator.kind() else {
            panic!("expected a linked separator");
        };
        assert_eq!(entry.id(), id);
    }

    #[test]
    fn test_different_entry_does_not_rebind_an_orphan() {
        let mut fx = Fixture::new();
        let lemonade = fx.book("Lemonade", -3, 2, "Food:Drinks", CASH);
        let linked = fx.ledger.link_separator(lemonade, true).unwrap();
        fx.ledger.remove_entry(lemonade).unwrap();
        fx.book("Lemonade", -4, 2, "Food:Drinks", CASH);

        let separator = &fx.ledger.separators()[0];
        assert_eq!(separator.id(), linked);
        let EntrySeparator::Linked { entry, .. } = separator.kind() else {
            panic!("expected a linked separator");
        };
        assert_eq!(entry.id(), lemonade);
    }

    #[test]
    fn test_inactive_reading_points_are_skipped() {
        let mut fx = Fixture::new();
        fx.book("Dues", 50, 1, "Income", CASH);
        fx.book("Snacks", -8, 6, "Food", CASH);
        let inactive = fx.ledger.add_separator(EntrySeparator::ReadingPoint {
            date: day(3),
            active: false,
            visible: true,
        });

        let bilancial = fx.aggregate();
        assert!(bilancial.mapping().get(inactive).is_none());
        assert_eq!(bilancial.mapping().len(), 1);
        assert_eq!(last(&bilancial).entry_count(), 2);
    }

    #[test]
    fn test_explicit_extremes() {
        let mut fx = Fixture::new();
        fx.book("Dues", 50, 1, "Income", CASH);
        let before = fx
            .ledger
            .add_separator(EntrySeparator::Extreme(Extreme::BeforeAll));
        let after = fx
            .ledger
            .add_separator(EntrySeparator::Extreme(Extreme::AfterAll));

        let bilancial = fx.aggregate();
        let ids: Vec<SeparatorId> = bilancial
            .mapping()
            .ordered_list()
            .iter()
            .map(|c| c.separator().id())
            .collect();
        assert_eq!(ids, vec![before, after]);

        let opening = bilancial.mapping().get(before).unwrap();
        assert_eq!(opening.entry_count(), 0);
        assert!(opening.categories().is_empty());
        assert_eq!(opening.balance(&AccountId::new(CASH)), Decimal::from(100));
        assert_eq!(bilancial.mapping().get(after).unwrap().entry_count(), 1);
    }

    #[test]
    fn test_linked_separator_window() {
        let mut fx = Fixture::new();
        fx.book("Dues", 50, 1, "Income", CASH);
        let rent = fx.book("Rent", -20, 1, "Rent", BANK);
        fx.book("Snacks", -8, 1, "Food", CASH);
        let included = fx.ledger.link_separator(rent, true).unwrap();
        let excluded = fx.ledger.link_separator(rent, false).unwrap();

        let bilancial = fx.aggregate();
        let list = bilancial.mapping().ordered_list();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].separator().id(), excluded);
        assert_eq!(list[1].separator().id(), included);
        // "Dues" sorts before "Rent", "Snacks" after it.
        assert_eq!(list[0].information().window_sum(), Decimal::from(50));
        assert_eq!(list[1].information().window_sum(), Decimal::from(-20));
        assert_eq!(list[2].information().window_sum(), Decimal::from(-8));
    }

    #[test]
    fn test_filter_limits_entries() {
        let mut fx = Fixture::new();
        fx.book("Dues", 50, 1, "Income", CASH);
        fx.book("Rent", -20, 2, "Rent", BANK);

        let bilancial = fx.aggregate_with(&EntryFilter::Account(AccountId::new(BANK)));
        assert_eq!(bilancial.total(), Decimal::from(-20));
        assert_eq!(bilancial.account_after(&AccountId::new(CASH)), Decimal::from(100));
        assert_eq!(
            bilancial.direct_categories().iter().copied().collect::<Vec<_>>(),
            vec![fx.category("Rent")]
        );
    }

    #[test]
    fn test_cancelled_fold_returns_none() {
        let mut fx = Fixture::new();
        fx.book("Dues", 50, 1, "Income", CASH);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let snapshot = fx.ledger.snapshot();
        assert!(aggregate(&snapshot, &fx.tree(), &EntryFilter::All, 0, &cancel).is_none());
    }
}
