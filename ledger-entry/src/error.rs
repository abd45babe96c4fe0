//! Error types for balancing and expansion
//!
//! Balance failures carry a chain of context records so a caller can explain
//! exactly which entry failed and by how much, pointing back at the source
//! lines it came from.

use std::collections::VecDeque;
use std::fmt;
use std::fmt::Write as _;

use ledger_math::{Amount, AmountError, Balance, BalanceError};
use thiserror::Error;

use crate::account::AccountTree;
use crate::entry::EntryBase;
use crate::posting::Position;

/// Result type for entry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while balancing or expanding entries
#[derive(Debug, Error)]
pub enum Error {
    /// More than one balancing posting lacks an amount
    #[error("Only one posting with null amount allowed per entry (lines {beg_line}-{end_line})")]
    AmbiguousNull {
        /// First line of the offending entry
        beg_line: usize,
        /// Last line of the offending entry
        end_line: usize,
    },

    /// The entry does not sum to zero
    #[error("{0}")]
    Balance(ContextError),

    /// Amount arithmetic failed
    #[error("Amount operation failed: {0}")]
    Amount(#[from] AmountError),

    /// Balance arithmetic failed
    #[error("Balance operation failed: {0}")]
    BalanceArithmetic(#[from] BalanceError),

    /// An automated entry predicate could not be compiled
    #[error("Invalid predicate '{expr}': {source}")]
    Predicate {
        /// The predicate text
        expr: String,
        /// Why the pattern was rejected
        #[source]
        source: regex::Error,
    },

    /// Journal options could not be read
    #[error("Invalid journal options: {0}")]
    Options(#[from] serde_json::Error),
}

impl Error {
    /// Attach the entry's header line to the entry context, if there is one
    pub fn with_entry_header(mut self, header: String) -> Self {
        if let Error::Balance(err) = &mut self {
            for context in err.context.iter_mut() {
                if let ErrorContext::Entry(entry) = context {
                    entry.header.get_or_insert_with(|| header.clone());
                }
            }
        }
        self
    }

    /// Context chain of a balance error
    pub fn context(&self) -> Option<&ContextError> {
        match self {
            Error::Balance(err) => Some(err),
            _ => None,
        }
    }

    /// Full human-readable explanation, including any context records
    pub fn describe(&self) -> String {
        match self {
            Error::Balance(err) => err.describe(),
            other => format!("Error: {}", other),
        }
    }
}

/// An error message plus the context records that explain it, outermost last
#[derive(Debug, Clone)]
pub struct ContextError {
    message: String,
    context: VecDeque<ErrorContext>,
}

impl ContextError {
    /// Create an error with no context yet
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), context: VecDeque::new() }
    }

    /// Add a record that is shown first
    pub fn push_front(&mut self, context: ErrorContext) {
        self.context.push_front(context);
    }

    /// Add a record that is shown last
    pub fn push_back(&mut self, context: ErrorContext) {
        self.context.push_back(context);
    }

    /// The bare error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Context records in display order
    pub fn context(&self) -> impl Iterator<Item = &ErrorContext> {
        self.context.iter()
    }

    /// Every context record followed by the message
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for context in &self.context {
            context.describe(&mut out);
        }
        let _ = write!(out, "Error: {}", self.message);
        out
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ContextError> for Error {
    fn from(err: ContextError) -> Self {
        Error::Balance(err)
    }
}

/// One record in a [`ContextError`]
#[derive(Debug, Clone)]
pub enum ErrorContext {
    /// An entry, rendered by printing every posting
    Entry(EntryContext),
    /// A balance or amount
    Value(ValueContext),
}

impl ErrorContext {
    fn describe(&self, out: &mut String) {
        match self {
            ErrorContext::Entry(entry) => entry.describe(out),
            ErrorContext::Value(value) => value.describe(out),
        }
    }
}

/// Snapshot of an entry taken when the error was raised
#[derive(Debug, Clone)]
pub struct EntryContext {
    /// What was being done to the entry
    pub desc: String,
    /// The entry's header line, when the entry has one
    pub header: Option<String>,
    /// Where the entry came from
    pub position: Option<Position>,
    /// One rendered line per posting
    pub lines: Vec<String>,
}

impl EntryContext {
    /// Render `entry` as it stands now
    pub fn new(desc: impl Into<String>, entry: &EntryBase, accounts: Option<&AccountTree>) -> Self {
        let mut rendered = String::new();
        entry.format_xacts(&mut rendered, accounts);
        Self {
            desc: desc.into(),
            header: None,
            position: entry.pos.clone(),
            lines: rendered.lines().map(str::to_string).collect(),
        }
    }

    fn describe(&self, out: &mut String) {
        match &self.position {
            Some(pos) => {
                let desc = self.desc.trim_end_matches(':');
                match &pos.pathname {
                    Some(path) => {
                        let _ = write!(out, "{} from \"{}\"", desc, path.display());
                        let _ = writeln!(out, ", lines {}-{}:", pos.beg_line, pos.end_line);
                    }
                    None => {
                        let _ = writeln!(out, "{} at lines {}-{}:", desc, pos.beg_line, pos.end_line);
                    }
                }
            }
            None => {
                let _ = writeln!(out, "{}", self.desc);
            }
        }
        if let Some(header) = &self.header {
            let _ = writeln!(out, "{}", header);
        }
        for line in &self.lines {
            let _ = writeln!(out, "{}", line);
        }
    }
}

/// The value a [`ValueContext`] shows
#[derive(Debug, Clone)]
pub enum ContextValue {
    /// A multi-commodity balance
    Balance(Balance),
    /// A single amount
    Amount(Amount),
}

/// A value with a short description
#[derive(Debug, Clone)]
pub struct ValueContext {
    /// What the value is
    pub desc: String,
    /// The value itself
    pub value: ContextValue,
}

impl ValueContext {
    /// Describe a balance
    pub fn balance(desc: impl Into<String>, balance: Balance) -> Self {
        Self { desc: desc.into(), value: ContextValue::Balance(balance) }
    }

    /// Describe an amount
    pub fn amount(desc: impl Into<String>, amount: Amount) -> Self {
        Self { desc: desc.into(), value: ContextValue::Amount(amount) }
    }

    fn describe(&self, out: &mut String) {
        let _ = writeln!(out, "{}", self.desc);
        let rendered = match &self.value {
            ContextValue::Balance(balance) => balance.to_string(),
            ContextValue::Amount(amount) => amount.to_string(),
        };
        for line in rendered.lines() {
            let _ = writeln!(out, "{:>16}", line);
        }
    }
}
