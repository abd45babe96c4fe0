//! Entry (transaction) representation
//!
//! [`EntryBase`] holds what every kind of entry shares: the ordered postings,
//! the owning journal and a source position. [`Entry`] adds the dated header
//! of a regular transaction. Automated entries reuse [`EntryBase`] for their
//! template postings.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use log::{debug, trace};

use crate::account::AccountTree;
use crate::error::Result;
use crate::journal::{Journal, JournalId};
use crate::posting::{Ownership, Position, Posting, PostingId, XactState};

/// Process-unique identity of an entry; copies get a fresh one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

impl EntryId {
    fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(1);
        EntryId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Borrowed postings handed back when an entry is torn down
#[derive(Debug, Default)]
pub struct Released {
    /// Postings whose storage belongs to a posting cache
    pub from_cache: Vec<Posting>,
    /// Postings lent by the caller
    pub from_caller: Vec<Posting>,
}

impl Released {
    /// Total number of postings handed back
    pub fn len(&self) -> usize {
        self.from_cache.len() + self.from_caller.len()
    }

    /// True when nothing was borrowed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Postings plus the bookkeeping shared by every kind of entry
#[derive(Debug, Default)]
pub struct EntryBase {
    owner: Option<EntryId>,
    journal: Option<JournalId>,
    pub(crate) xacts: Vec<Posting>,
    finalized: bool,
    /// Source position information
    pub pos: Option<Position>,
}

impl EntryBase {
    /// Create an empty base that wires no back-references
    pub fn new() -> Self {
        Self::default()
    }

    fn owned_by(owner: EntryId) -> Self {
        Self { owner: Some(owner), ..Self::default() }
    }

    /// The entry whose postings these are, if any
    pub fn owner(&self) -> Option<EntryId> {
        self.owner
    }

    /// Journal this entry was registered with
    pub fn journal(&self) -> Option<JournalId> {
        self.journal
    }

    /// Record the owning journal
    pub fn set_journal(&mut self, journal: Option<JournalId>) {
        self.journal = journal;
    }

    /// Whether finalize has completed successfully
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn mark_finalized(&mut self) {
        self.finalized = true;
    }

    /// Postings in order
    pub fn xacts(&self) -> &[Posting] {
        &self.xacts
    }

    /// Postings in order, for in-place edits
    pub fn xacts_mut(&mut self) -> &mut [Posting] {
        &mut self.xacts
    }

    /// Look up a posting by identity
    pub fn xact(&self, id: PostingId) -> Option<&Posting> {
        self.xacts.iter().find(|xact| xact.id() == id)
    }

    /// Append a posting, pointing its back-reference at this entry
    pub fn add_xact(&mut self, mut xact: Posting) -> PostingId {
        xact.entry = self.owner;
        let id = xact.id();
        self.xacts.push(xact);
        id
    }

    /// Remove a posting by identity, clearing its back-reference
    pub fn remove_xact(&mut self, id: PostingId) -> Option<Posting> {
        let index = self.xacts.iter().position(|xact| xact.id() == id)?;
        let mut xact = self.xacts.remove(index);
        xact.entry = None;
        Some(xact)
    }

    /// Tear the entry down. Owned postings are dropped here; borrowed ones
    /// are returned to whoever lent them.
    pub fn release(self) -> Released {
        let mut released = Released::default();
        for mut xact in self.xacts {
            match xact.ownership() {
                Ownership::Owned => trace!("dropping owned posting {:?}", xact.id()),
                Ownership::BorrowedFromCache => {
                    xact.entry = None;
                    released.from_cache.push(xact);
                }
                Ownership::BorrowedFromCaller => {
                    xact.entry = None;
                    released.from_caller.push(xact);
                }
            }
        }
        released
    }

    /// Every posting points back here and is valid on its own. Once
    /// finalized, every balancing posting also has an amount.
    pub fn valid(&self) -> bool {
        for xact in &self.xacts {
            if xact.entry.is_none() || xact.entry != self.owner {
                debug!(target: "ledger.validate", "posting {:?} has a foreign back-reference", xact.id());
                return false;
            }
            if !xact.valid() {
                debug!(target: "ledger.validate", "posting {:?} is not valid", xact.id());
                return false;
            }
            if self.finalized && xact.must_balance() && xact.amount_is_null() {
                debug!(target: "ledger.validate", "posting {:?} has no amount", xact.id());
                return false;
            }
        }
        true
    }

    pub(crate) fn format_xacts(&self, out: &mut String, accounts: Option<&AccountTree>) {
        let width = self
            .xacts
            .iter()
            .map(|xact| accounts.map_or(8, |tree| tree.fullname(xact.account).len()))
            .max()
            .unwrap_or(0);
        for xact in &self.xacts {
            let _ = writeln!(out, "{}", xact.format(accounts, width));
        }
    }
}

/// A dated transaction
#[derive(Debug)]
pub struct Entry {
    id: EntryId,
    base: EntryBase,
    /// Transaction date
    pub date: Option<NaiveDate>,
    /// Optional effective date
    pub effective_date: Option<NaiveDate>,
    /// Transaction code (check number and the like)
    pub code: Option<String>,
    /// Payee/description
    pub payee: String,
    /// Note/comment
    pub note: Option<String>,
}

impl Entry {
    /// Create an entry with no date and no postings
    pub fn empty() -> Self {
        let id = EntryId::next();
        Self {
            id,
            base: EntryBase::owned_by(id),
            date: None,
            effective_date: None,
            code: None,
            payee: String::new(),
            note: None,
        }
    }

    /// Create a new entry with required fields
    pub fn new(date: NaiveDate, payee: impl Into<String>) -> Self {
        let mut entry = Self::empty();
        entry.date = Some(date);
        entry.payee = payee.into();
        entry
    }

    /// Start building an entry
    pub fn builder(date: NaiveDate, payee: impl Into<String>) -> EntryBuilder {
        EntryBuilder { entry: Self::new(date, payee) }
    }

    /// Identity of this entry
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Shared entry data
    pub fn base(&self) -> &EntryBase {
        &self.base
    }

    /// Shared entry data, mutably
    pub fn base_mut(&mut self) -> &mut EntryBase {
        &mut self.base
    }

    /// Postings in order
    pub fn xacts(&self) -> &[Posting] {
        self.base.xacts()
    }

    /// Append a posting
    pub fn add_xact(&mut self, xact: Posting) -> PostingId {
        self.base.add_xact(xact)
    }

    /// Remove a posting by identity
    pub fn remove_xact(&mut self, id: PostingId) -> Option<Posting> {
        self.base.remove_xact(id)
    }

    /// Tear the entry down, returning borrowed postings
    pub fn release(self) -> Released {
        self.base.release()
    }

    /// Effective date, falling back to the transaction date
    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.effective_date.or(self.date)
    }

    /// The clearing state shared by every posting, or `None` when the
    /// postings disagree. An entry without postings is uncleared.
    pub fn get_state(&self) -> Option<XactState> {
        let mut states = self.base.xacts.iter().map(|xact| xact.state);
        let first = states.next().unwrap_or_default();
        states.all(|state| state == first).then_some(first)
    }

    /// Resolve missing amounts and check that the entry balances. The entry
    /// code is used to tag any lots created from postings with a cost.
    pub fn finalize(&mut self, journal: Option<&Journal>) -> Result<()> {
        let moment = self.effective_date();
        self.base
            .finalize(journal, self.code.as_deref(), moment)
            .map_err(|err| err.with_entry_header(self.header()))
    }

    /// A dated entry registered with a journal whose postings are all valid
    pub fn valid(&self) -> bool {
        if self.date.is_none() {
            debug!(target: "ledger.validate", "entry {:?} has no date", self.id);
            return false;
        }
        if self.base.journal.is_none() {
            debug!(target: "ledger.validate", "entry {:?} has no journal", self.id);
            return false;
        }
        self.base.valid()
    }

    /// First line of the entry as it would appear in a journal file
    pub fn header(&self) -> String {
        let mut line = match self.date {
            Some(date) => date.format("%Y/%m/%d").to_string(),
            None => "????/??/??".to_string(),
        };
        if let Some(effective) = self.effective_date {
            let _ = write!(line, "={}", effective.format("%Y/%m/%d"));
        }
        match self.get_state() {
            Some(XactState::Cleared) => line.push_str(" *"),
            Some(XactState::Pending) => line.push_str(" !"),
            _ => {}
        }
        if let Some(code) = &self.code {
            let _ = write!(line, " ({})", code);
        }
        let _ = write!(line, " {}", self.payee);
        line
    }

    /// Header plus every posting
    pub fn format(&self, accounts: Option<&AccountTree>) -> String {
        let mut out = self.header();
        out.push('\n');
        self.base.format_xacts(&mut out, accounts);
        out
    }
}

impl Clone for Entry {
    fn clone(&self) -> Self {
        let id = EntryId::next();
        let mut base = EntryBase::owned_by(id);
        base.journal = self.base.journal;
        base.finalized = self.base.finalized;
        base.pos = self.base.pos.clone();
        for xact in &self.base.xacts {
            base.add_xact(xact.duplicate());
        }

        Self {
            id,
            base,
            date: self.date,
            effective_date: self.effective_date,
            code: self.code.clone(),
            payee: self.payee.clone(),
            note: self.note.clone(),
        }
    }
}

/// Builder for entries
#[derive(Debug)]
pub struct EntryBuilder {
    entry: Entry,
}

impl EntryBuilder {
    /// Set effective date
    pub fn effective_date(mut self, date: NaiveDate) -> Self {
        self.entry.effective_date = Some(date);
        self
    }

    /// Set code
    pub fn code<S: Into<String>>(mut self, code: S) -> Self {
        self.entry.code = Some(code.into());
        self
    }

    /// Set note
    pub fn note<S: Into<String>>(mut self, note: S) -> Self {
        self.entry.note = Some(note.into());
        self
    }

    /// Set source position
    pub fn position(mut self, pos: Position) -> Self {
        self.entry.base.pos = Some(pos);
        self
    }

    /// Add a posting
    pub fn posting(mut self, posting: Posting) -> Self {
        self.entry.add_xact(posting);
        self
    }

    /// Build the entry
    pub fn build(self) -> Entry {
        self.entry
    }
}
