//! Name lookup for the expression evaluator
//!
//! An entry exposes two read-only fields, `date` and `payee`. Any other name
//! is left for the evaluator's outer scopes to resolve.

use std::fmt;

use chrono::NaiveDate;

use crate::entry::Entry;

/// A value handed to the expression evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// No value
    Null,
    /// A calendar date
    Date(NaiveDate),
    /// Text
    String(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Date(date) => write!(f, "{}", date.format("%Y/%m/%d")),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

/// A bound field of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAccessor {
    /// The entry date
    Date,
    /// The payee
    Payee,
}

impl EntryAccessor {
    /// Read the field from `entry`
    pub fn call(self, entry: &Entry) -> Value {
        match self {
            EntryAccessor::Date => entry.date.map_or(Value::Null, Value::Date),
            EntryAccessor::Payee => Value::String(entry.payee.clone()),
        }
    }
}

impl Entry {
    /// Resolve `d`/`date` and `p`/`payee`; anything else is `None`
    pub fn lookup(&self, name: &str) -> Option<EntryAccessor> {
        match name {
            "d" | "date" => Some(EntryAccessor::Date),
            "p" | "payee" => Some(EntryAccessor::Payee),
            _ => None,
        }
    }
}
