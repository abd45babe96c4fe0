//! Journal: owner of entries, automated entries, accounts and commodities

use std::sync::atomic::{AtomicUsize, Ordering};

use ledger_math::CommodityPool;
use log::{debug, info};

use crate::account::{AccountId, AccountTree};
use crate::auto_entry::{extend_entry_base, AutoEntry};
use crate::entry::{Entry, EntryId};
use crate::error::Result;
use crate::options::JournalOptions;

/// Process-unique identity of a journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JournalId(usize);

impl JournalId {
    fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(1);
        JournalId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Main journal containing all entries
#[derive(Debug)]
pub struct Journal {
    id: JournalId,
    /// Account registry
    pub accounts: AccountTree,
    /// Commodity registry
    pub commodities: CommodityPool,
    basket: Option<AccountId>,
    auto_entries: Vec<AutoEntry>,
    entries: Vec<Entry>,
    options: JournalOptions,
}

impl Journal {
    /// Create a new empty journal
    pub fn new() -> Self {
        Self::with_options(JournalOptions::default())
    }

    /// Create a journal, creating the basket account named in `options`
    pub fn with_options(options: JournalOptions) -> Self {
        let mut accounts = AccountTree::new();
        let basket = options.basket.as_deref().and_then(|path| accounts.find_account(path, true));
        Self {
            id: JournalId::next(),
            accounts,
            commodities: CommodityPool::new(),
            basket,
            auto_entries: Vec::new(),
            entries: Vec::new(),
            options,
        }
    }

    /// Identity entries refer back to
    pub fn id(&self) -> JournalId {
        self.id
    }

    /// Account used to balance single-posting entries
    pub fn basket(&self) -> Option<AccountId> {
        self.basket
    }

    /// Set or clear the basket account
    pub fn set_basket(&mut self, basket: Option<AccountId>) {
        self.basket = basket;
    }

    /// Journal options
    pub fn options(&self) -> &JournalOptions {
        &self.options
    }

    /// Registered automated entries, in registration order
    pub fn auto_entries(&self) -> &[AutoEntry] {
        &self.auto_entries
    }

    /// Register an automated entry
    pub fn add_auto_entry(&mut self, mut auto_entry: AutoEntry) {
        auto_entry.base_mut().set_journal(Some(self.id));
        debug!(target: "ledger.journal.auto", "registered '{}'", auto_entry.predicate.as_str());
        self.auto_entries.push(auto_entry);
    }

    /// Finalized entries, in the order they were added
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Look up an entry by id
    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    /// Expand, finalize and store an entry. On error the entry is discarded.
    pub fn add_entry(&mut self, mut entry: Entry) -> Result<EntryId> {
        entry.base_mut().set_journal(Some(self.id));

        if self.options.apply_auto_entries {
            extend_entry_base(self, entry.base_mut(), false)?;
        }
        entry.finalize(Some(self))?;
        if self.options.apply_auto_entries {
            extend_entry_base(self, entry.base_mut(), true)?;
        }

        let id = entry.id();
        info!("added entry {}", entry.header());
        self.entries.push(entry);
        Ok(id)
    }

    /// Take an entry out of the journal
    pub fn remove_entry(&mut self, id: EntryId) -> Option<Entry> {
        let index = self.entries.iter().position(|entry| entry.id() == id)?;
        let mut entry = self.entries.remove(index);
        entry.base_mut().set_journal(None);
        Some(entry)
    }

    /// Format all entries, separated by blank lines
    pub fn format_entries(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.format(Some(&self.accounts)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}
