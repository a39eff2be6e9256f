//! The in-memory ledger: entries, separators and accounts with their opening balances.
//!
//! The ledger has a single owner that mutates it synchronously. Every mutation bumps the revision
//! and publishes an immutable `LedgerSnapshot` on a `watch` channel, which is how the aggregation
//! engine learns that it has to recompute. The ledger itself never aggregates.

use crate::error::Res;
use crate::model::{Account, AccountId, Entry, EntryId, EntrySeparator, Separator, SeparatorId};
use anyhow::bail;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

/// What a mutation changed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LedgerChange {
    /// The ledger was created.
    Created,
    Added(Vec<EntryId>),
    Removed(Vec<EntryId>),
    Replaced(EntryId),
    SeparatorAdded(SeparatorId),
    SeparatorRemoved(SeparatorId),
    /// An account was added or its opening balance changed.
    AccountChanged(AccountId),
}

/// An account as held by the ledger, together with its opening balance.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LedgerAccount {
    account: Account,
    opening: Decimal,
}

impl LedgerAccount {
    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn opening(&self) -> Decimal {
        self.opening
    }
}

/// An immutable view of the ledger at one revision.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    revision: u64,
    change: LedgerChange,
    entries: Arc<Vec<Arc<Entry>>>,
    separators: Arc<Vec<Arc<Separator>>>,
    accounts: Arc<BTreeMap<AccountId, LedgerAccount>>,
}

impl LedgerSnapshot {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The mutation that produced this revision.
    pub fn change(&self) -> &LedgerChange {
        &self.change
    }

    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    pub fn separators(&self) -> &[Arc<Separator>] {
        &self.separators
    }

    pub fn accounts(&self) -> &BTreeMap<AccountId, LedgerAccount> {
        &self.accounts
    }

    /// The opening balance of `account`, zero if the account is unknown.
    pub fn opening_balance(&self, account: &AccountId) -> Decimal {
        self.accounts
            .get(account)
            .map(LedgerAccount::opening)
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct Ledger {
    entries: Vec<Arc<Entry>>,
    separators: Vec<Arc<Separator>>,
    accounts: BTreeMap<AccountId, LedgerAccount>,
    next_entry: u64,
    next_separator: u64,
    revision: u64,
    publisher: watch::Sender<LedgerSnapshot>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        let initial = LedgerSnapshot {
            revision: 0,
            change: LedgerChange::Created,
            entries: Arc::default(),
            separators: Arc::default(),
            accounts: Arc::default(),
        };
        let (publisher, _) = watch::channel(initial);
        Self {
            entries: Vec::new(),
            separators: Vec::new(),
            accounts: BTreeMap::new(),
            next_entry: 1,
            next_separator: 1,
            revision: 0,
            publisher,
        }
    }

    /// Returns a receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<LedgerSnapshot> {
        self.publisher.subscribe()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.publisher.borrow().clone()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> Option<&Arc<Entry>> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn separators(&self) -> &[Arc<Separator>] {
        &self.separators
    }

    pub fn accounts(&self) -> &BTreeMap<AccountId, LedgerAccount> {
        &self.accounts
    }

    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.get(id).map(LedgerAccount::account)
    }

    /// Adds an account, or replaces the account with the same id.
    pub fn add_account(&mut self, account: Account, opening: Decimal) {
        let id = account.id().clone();
        self.accounts
            .insert(id.clone(), LedgerAccount { account, opening });
        self.publish(LedgerChange::AccountChanged(id));
    }

    pub fn set_opening_balance(&mut self, id: &AccountId, opening: Decimal) -> Res<()> {
        match self.accounts.get_mut(id) {
            Some(account) => account.opening = opening,
            None => bail!("Unknown account '{id}'"),
        }
        self.publish(LedgerChange::AccountChanged(id.clone()));
        Ok(())
    }

    /// Adds an entry and returns its newly assigned id.
    ///
    /// # Errors
    /// - Returns an error if the entry's account is not in the ledger.
    pub fn add_entry(&mut self, entry: Entry) -> Res<EntryId> {
        let id = self.insert_entry(entry)?;
        self.publish(LedgerChange::Added(vec![id]));
        Ok(id)
    }

    /// Adds several entries, publishing a single change. Nothing is added if any entry refers to
    /// an unknown account.
    pub fn add_entries(&mut self, entries: impl IntoIterator<Item = Entry>) -> Res<Vec<EntryId>> {
        let entries: Vec<Entry> = entries.into_iter().collect();
        for entry in &entries {
            self.check_account(entry)?;
        }
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(self.insert_entry(entry)?);
        }
        self.publish(LedgerChange::Added(ids.clone()));
        Ok(ids)
    }

    /// Removes an entry. Unknown ids are ignored. Linked separators bound to the entry stay in the
    /// ledger and are bound again when an entry with the same business fields is added.
    pub fn remove_entry(&mut self, id: EntryId) -> Option<Arc<Entry>> {
        let position = self.entries.iter().position(|e| e.id() == id)?;
        let removed = self.entries.remove(position);
        self.publish(LedgerChange::Removed(vec![id]));
        Some(removed)
    }

    /// Replaces the entry with identity `id`, keeping that identity. Linked separators bound to the
    /// entry follow the new values. Returns `false` without changing anything when `id` is unknown.
    ///
    /// # Errors
    /// - Returns an error if the replacement refers to an unknown account.
    pub fn replace_entry(&mut self, id: EntryId, mut entry: Entry) -> Res<bool> {
        let Some(position) = self.entries.iter().position(|e| e.id() == id) else {
            return Ok(false);
        };
        self.check_account(&entry)?;
        entry.set_id(id);
        let entry = Arc::new(entry);
        self.entries[position] = entry.clone();

        for separator in self.separators.iter_mut() {
            if let EntrySeparator::Linked { entry: linked, .. } = separator.kind() {
                if linked.id() == id {
                    let separator = Arc::make_mut(separator);
                    if let EntrySeparator::Linked { entry: linked, .. } = separator.kind_mut() {
                        *linked = entry.clone();
                    }
                }
            }
        }

        self.publish(LedgerChange::Replaced(id));
        Ok(true)
    }

    pub fn add_separator(&mut self, kind: EntrySeparator) -> SeparatorId {
        let id = SeparatorId::new(self.next_separator);
        self.next_separator += 1;
        self.separators.push(Arc::new(Separator::new(id, kind)));
        self.publish(LedgerChange::SeparatorAdded(id));
        id
    }

    /// Adds a separator bound to the entry `id`. Returns `None` if there is no such entry.
    pub fn link_separator(&mut self, id: EntryId, entry_before: bool) -> Option<SeparatorId> {
        let entry = self.entry(id)?.clone();
        Some(self.add_separator(EntrySeparator::Linked {
            entry,
            entry_before,
        }))
    }

    /// Removes a separator. Unknown ids are ignored.
    pub fn remove_separator(&mut self, id: SeparatorId) -> Option<Arc<Separator>> {
        let position = self.separators.iter().position(|s| s.id() == id)?;
        let removed = self.separators.remove(position);
        self.publish(LedgerChange::SeparatorRemoved(id));
        Some(removed)
    }

    fn check_account(&self, entry: &Entry) -> Res<()> {
        if !self.accounts.contains_key(entry.account()) {
            bail!(
                "Entry '{}' refers to unknown account '{}'",
                entry.name(),
                entry.account()
            );
        }
        Ok(())
    }

    fn insert_entry(&mut self, mut entry: Entry) -> Res<EntryId> {
        self.check_account(&entry)?;
        let id = EntryId::new(self.next_entry);
        self.next_entry += 1;
        entry.set_id(id);
        trace!("Adding entry {id} '{}'", entry.name());
        let entry = Arc::new(entry);
        self.entries.push(entry.clone());
        self.rebind_orphans(&entry);
        Ok(id)
    }

    /// Binds linked separators whose entry was removed to `entry` if it has the same business
    /// fields, so removing and re-adding an entry restores its windows.
    fn rebind_orphans(&mut self, entry: &Arc<Entry>) {
        let entries = &self.entries;
        for separator in self.separators.iter_mut() {
            let EntrySeparator::Linked { entry: linked, .. } = separator.kind() else {
                continue;
            };
            let orphaned = !entries.iter().any(|e| e.id() == linked.id());
            if !orphaned || !linked.same_business_fields(entry) {
                continue;
            }
            debug!(
                "Rebinding separator {} to entry {} '{}'",
                separator.id(),
                entry.id(),
                entry.name()
            );
            let separator = Arc::make_mut(separator);
            if let EntrySeparator::Linked { entry: linked, .. } = separator.kind_mut() {
                *linked = entry.clone();
            }
        }
    }

    fn publish(&mut self, change: LedgerChange) {
        self.revision += 1;
        debug!("Ledger revision {}: {change:?}", self.revision);
        self.publisher.send_replace(LedgerSnapshot {
            revision: self.revision,
            change,
            entries: Arc::new(self.entries.clone()),
            separators: Arc::new(self.separators.clone()),
            accounts: Arc::new(self.accounts.clone()),
        });
    }
}
