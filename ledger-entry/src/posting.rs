//! Posting (xact) representation within entries

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use ledger_math::amount::Amount;
use serde::{Deserialize, Serialize};

use crate::account::{AccountId, AccountTree};
use crate::entry::EntryId;

// Posting flags matching ledger's xact flags
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct XactFlags: u16 {
        const NORMAL = 0x0000;
        const GENERATED = 0x0001;       // synthesized by finalize
        const TEMP = 0x0002;            // storage belongs to the caller
        const IN_CACHE = 0x0004;        // storage belongs to a posting cache
        const AUTO = 0x0008;            // produced by an automated entry
        const VIRTUAL = 0x0010;         // account specified with (parens)
        const MUST_BALANCE = 0x0020;    // posting must balance in the entry
        const CALCULATED = 0x0040;      // amount was calculated
        const COST_CALCULATED = 0x0080; // cost was calculated
    }
}

/// Clearing state of a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum XactState {
    /// Uncleared
    #[default]
    Uncleared,
    /// Pending (!)
    Pending,
    /// Cleared (*)
    Cleared,
}

impl XactState {
    fn marker(self) -> &'static str {
        match self {
            XactState::Uncleared => "",
            XactState::Pending => "! ",
            XactState::Cleared => "* ",
        }
    }
}

/// Who is responsible for a posting's storage once its entry goes away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ownership {
    /// Dropped together with the entry
    #[default]
    Owned,
    /// Lives in a posting cache; the entry hands it back on release
    BorrowedFromCache,
    /// Lent by the caller; the entry hands it back on release
    BorrowedFromCaller,
}

/// Source position information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// File the item was read from
    pub pathname: Option<PathBuf>,
    /// Byte offset of the first character
    pub beg_pos: usize,
    /// First line
    pub beg_line: usize,
    /// Byte offset just past the last character
    pub end_pos: usize,
    /// Last line
    pub end_line: usize,
}

impl Position {
    /// Position spanning the given lines
    pub fn lines(beg_line: usize, end_line: usize) -> Self {
        Self { beg_line, end_line, ..Self::default() }
    }
}

/// Process-unique identity of a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostingId(usize);

impl PostingId {
    fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(1);
        PostingId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// One account leg of an entry
#[derive(Debug)]
pub struct Posting {
    id: PostingId,
    ownership: Ownership,
    /// Back-reference to the owning entry
    pub entry: Option<EntryId>,
    /// Account posted to
    pub account: AccountId,
    /// Amount posted; `None` until finalize computes it
    pub amount: Option<Amount>,
    /// Total cost, in a commodity other than the amount's
    pub cost: Option<Amount>,
    /// Posting flags
    pub flags: XactFlags,
    /// Clearing state
    pub state: XactState,
    /// Date overriding the entry's date
    pub actual_date: Option<NaiveDate>,
    /// Effective date overriding the entry's
    pub effective_date: Option<NaiveDate>,
    /// Optional note/comment
    pub note: Option<String>,
    /// Source position information
    pub pos: Option<Position>,
}

impl Posting {
    /// Create a posting with no amount yet
    pub fn new(account: AccountId, flags: XactFlags) -> Self {
        Self {
            id: PostingId::next(),
            ownership: Ownership::Owned,
            entry: None,
            account,
            amount: None,
            cost: None,
            flags,
            state: XactState::default(),
            actual_date: None,
            effective_date: None,
            note: None,
            pos: None,
        }
    }

    /// Create a posting with account and amount
    pub fn with_amount(account: AccountId, amount: Amount, flags: XactFlags) -> Self {
        let mut posting = Self::new(account, flags);
        posting.amount = Some(amount);
        posting
    }

    /// Attach a total cost
    pub fn with_cost(mut self, cost: Amount) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Set the clearing state
    pub fn with_state(mut self, state: XactState) -> Self {
        self.state = state;
        self
    }

    /// Identity used by [`EntryBase::remove_xact`](crate::entry::EntryBase::remove_xact)
    pub fn id(&self) -> PostingId {
        self.id
    }

    /// Storage responsibility of this posting
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Change storage responsibility, keeping the TEMP/IN_CACHE flags in step
    pub fn set_ownership(&mut self, ownership: Ownership) {
        self.flags.remove(XactFlags::TEMP | XactFlags::IN_CACHE);
        match ownership {
            Ownership::Owned => {}
            Ownership::BorrowedFromCache => self.flags.insert(XactFlags::IN_CACHE),
            Ownership::BorrowedFromCaller => self.flags.insert(XactFlags::TEMP),
        }
        self.ownership = ownership;
    }

    /// Check if posting must balance in the entry
    pub fn must_balance(&self) -> bool {
        !self.flags.contains(XactFlags::VIRTUAL) || self.flags.contains(XactFlags::MUST_BALANCE)
    }

    /// Check if posting is virtual (enclosed in parentheses)
    pub fn is_virtual(&self) -> bool {
        self.flags.contains(XactFlags::VIRTUAL)
    }

    /// Check if posting amount was calculated
    pub fn is_calculated(&self) -> bool {
        self.flags.contains(XactFlags::CALCULATED)
    }

    /// Check if posting has specific flags
    pub fn has_flags(&self, flags: XactFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Add posting flags
    pub fn add_flags(&mut self, flags: XactFlags) {
        self.flags.insert(flags);
    }

    /// True when there is no amount to post yet
    pub fn amount_is_null(&self) -> bool {
        self.amount.as_ref().map_or(true, Amount::is_null)
    }

    /// Set amount from calculation
    pub fn set_calculated_amount(&mut self, amount: Amount) {
        self.amount = Some(amount);
        self.flags.insert(XactFlags::CALCULATED);
    }

    /// Set cost from calculation
    pub fn set_calculated_cost(&mut self, cost: Amount) {
        self.cost = Some(cost);
        self.flags.insert(XactFlags::COST_CALCULATED);
    }

    /// Posting date, falling back to the entry's date
    pub fn actual_date(&self, entry_date: Option<NaiveDate>) -> Option<NaiveDate> {
        self.actual_date.or(entry_date)
    }

    /// Deep copy carrying a fresh identity and no back-reference
    pub fn duplicate(&self) -> Posting {
        Posting {
            id: PostingId::next(),
            ownership: Ownership::Owned,
            entry: None,
            account: self.account,
            amount: self.amount.clone(),
            cost: self.cost.clone(),
            flags: self.flags - (XactFlags::TEMP | XactFlags::IN_CACHE),
            state: self.state,
            actual_date: self.actual_date,
            effective_date: self.effective_date,
            note: self.note.clone(),
            pos: self.pos.clone(),
        }
    }

    /// A posting is valid once it belongs to an entry and its amounts are
    /// internally consistent
    pub fn valid(&self) -> bool {
        if self.entry.is_none() {
            return false;
        }
        if !self.amount.as_ref().map_or(true, Amount::valid) {
            return false;
        }
        self.cost.as_ref().map_or(true, |cost| !cost.is_null() && cost.valid())
    }

    /// Render as a journal line, aligning the amount after `account_width`
    pub fn format(&self, accounts: Option<&AccountTree>, account_width: usize) -> String {
        let account_name = match accounts {
            Some(tree) => tree.fullname(self.account),
            None => self.account.to_string(),
        };
        let account_name = if self.is_virtual() {
            format!("({})", account_name)
        } else {
            account_name
        };
        let status = self.state.marker();
        let width = account_width.max(account_name.len()).saturating_sub(status.len()) + 2;

        let mut line = String::new();
        match self.amount.as_ref().filter(|a| !a.is_null()) {
            Some(amount) => {
                let _ = write!(line, "    {status}{account_name:width$}{:>12}", amount.to_string());
                if let Some(cost) = &self.cost {
                    let _ = write!(line, " @@ {}", cost);
                }
            }
            None => {
                let _ = write!(line, "    {status}{account_name}");
            }
        }
        line
    }
}
