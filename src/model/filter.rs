use crate::model::{AccountId, CategoryId, CategoryLookup, Entry};
use chrono::NaiveDate;

/// A predicate restricting which entries take part in aggregation.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum EntryFilter {
    /// Accepts every entry.
    #[default]
    All,
    /// Accepts entries booked on the account.
    Account(AccountId),
    /// Accepts entries in `category`, and in its subcategories when `include_subcategories`.
    Category {
        category: CategoryId,
        include_subcategories: bool,
    },
    /// Accepts entries dated within the inclusive range. An open end is unbounded.
    DateRange {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    /// Accepts entries whose name contains the text, ignoring case.
    NameContains(String),
    And(Vec<EntryFilter>),
    Or(Vec<EntryFilter>),
    Not(Box<EntryFilter>),
}

impl EntryFilter {
    pub fn verify_entry<L: CategoryLookup>(&self, entry: &Entry, categories: &L) -> bool {
        match self {
            EntryFilter::All => true,
            EntryFilter::Account(account) => entry.account() == account,
            EntryFilter::Category {
                category,
                include_subcategories,
            } => {
                if *include_subcategories {
                    categories.is_subcategory_of(entry.category(), *category)
                } else {
                    entry.category() == *category
                }
            }
            EntryFilter::DateRange { from, to } => {
                from.map_or(true, |from| entry.date() >= from)
                    && to.map_or(true, |to| entry.date() <= to)
            }
            EntryFilter::NameContains(text) => entry
                .name()
                .to_lowercase()
                .contains(&text.to_lowercase()),
            EntryFilter::And(filters) => filters.iter().all(|f| f.verify_entry(entry, categories)),
            EntryFilter::Or(filters) => filters.iter().any(|f| f.verify_entry(entry, categories)),
            EntryFilter::Not(filter) => !filter.verify_entry(entry, categories),
        }
    }

    /// Combines filters with `And`, dropping `All` members. Returns `All` if nothing is left.
    pub fn all_of(filters: impl IntoIterator<Item = EntryFilter>) -> EntryFilter {
        let mut filters: Vec<EntryFilter> = filters
            .into_iter()
            .filter(|f| *f != EntryFilter::All)
            .collect();
        match filters.len() {
            0 => EntryFilter::All,
            1 => filters.remove(0),
            _ => EntryFilter::And(filters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CategoryRegistry;
    use rust_decimal::Decimal;

    #[test]
    fn test_filters() {
        let registry = CategoryRegistry::new();
        let food = registry.category(["Food"]);
        let drinks = registry.category(["Food", "Drinks"]);
        let tree = registry.tree();
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let entry = Entry::new(
            "Cola for the party",
            Decimal::NEGATIVE_ONE,
            date,
            drinks,
            AccountId::new("cash"),
        );

        assert!(EntryFilter::All.verify_entry(&entry, &tree));
        assert!(EntryFilter::Account(AccountId::new("cash")).verify_entry(&entry, &tree));
        assert!(!EntryFilter::Account(AccountId::new("bank")).verify_entry(&entry, &tree));

        let food_tree = EntryFilter::Category {
            category: food,
            include_subcategories: true,
        };
        let food_only = EntryFilter::Category {
            category: food,
            include_subcategories: false,
        };
        assert!(food_tree.verify_entry(&entry, &tree));
        assert!(!food_only.verify_entry(&entry, &tree));

        let may = EntryFilter::DateRange {
            from: NaiveDate::from_ymd_opt(2024, 5, 1),
            to: NaiveDate::from_ymd_opt(2024, 5, 17),
        };
        assert!(may.verify_entry(&entry, &tree));
        let later = EntryFilter::DateRange {
            from: NaiveDate::from_ymd_opt(2024, 5, 18),
            to: None,
        };
        assert!(!later.verify_entry(&entry, &tree));

        assert!(EntryFilter::NameContains("PARTY".into()).verify_entry(&entry, &tree));
        assert!(EntryFilter::Not(Box::new(later.clone())).verify_entry(&entry, &tree));
        assert!(EntryFilter::Or(vec![later.clone(), may.clone()]).verify_entry(&entry, &tree));
        assert!(!EntryFilter::And(vec![later, may]).verify_entry(&entry, &tree));
    }

    #[test]
    fn test_all_of() {
        assert_eq!(EntryFilter::all_of([EntryFilter::All]), EntryFilter::All);
        let single = EntryFilter::NameContains("x".into());
        assert_eq!(
            EntryFilter::all_of([EntryFilter::All, single.clone()]),
            single
        );
    }
}
