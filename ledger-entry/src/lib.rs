//! Entry engine for Ledger
//!
//! Entries group postings that move value between accounts. Before an entry
//! is accepted into a [`Journal`] it is finalized: missing amounts are
//! inferred, implied exchange rates are turned into costs, lot sales are
//! reconciled against their basis, and the whole entry is checked to sum to
//! zero. Automated entries add postings to every entry they match, either
//! before balancing (fixed amounts) or after it (multipliers).

#![warn(clippy::all)]
#![warn(missing_docs)]

/// Module for hierarchical account structure
pub mod account;

/// Module for automated entries and posting predicates
pub mod auto_entry;

/// Module for entry representation and lifecycle
pub mod entry;

/// Module for errors and their display context
pub mod error;

/// Module for the balancing algorithm
pub mod finalize;

/// Module for journal data structure
pub mod journal;

/// Module for journal configuration
pub mod options;

/// Module for posting representation
pub mod posting;

/// Module for expression name lookup on entries
pub mod scope;

pub use account::{Account, AccountId, AccountTree};
pub use auto_entry::{extend_entry_base, AutoEntry, ItemPredicate};
pub use entry::{Entry, EntryBase, EntryBuilder, EntryId, Released};
pub use error::{ContextError, ContextValue, EntryContext, Error, ErrorContext, Result, ValueContext};
pub use journal::{Journal, JournalId};
pub use options::JournalOptions;
pub use posting::{Ownership, Position, Posting, PostingId, XactFlags, XactState};
pub use scope::{EntryAccessor, Value};
