//! Types that represent the core data model, such as `Entry`, `Category` and `EntrySeparator`.
mod account;
mod amount;
mod category;
mod entry;
mod filter;
mod separator;

pub use account::{Account, AccountKind};
pub use amount::{Amount, AmountFormat};
pub use category::{
    CategoryId, CategoryLookup, CategoryNode, CategoryRegistry, CategoryTree, DEFAULT_SEPARATOR,
};
pub use entry::{AccountId, Currency, Entry, EntryId};
pub use filter::EntryFilter;
pub use separator::{EntrySeparator, Extreme, Separator, SeparatorId};
