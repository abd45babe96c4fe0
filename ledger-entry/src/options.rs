//! Journal configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_placeholder_accounts() -> Vec<String> {
    vec!["$account".to_string(), "@account".to_string()]
}

fn default_true() -> bool {
    true
}

/// Settings that change how entries are added to a journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalOptions {
    /// Template account names that stand for the matched posting's account
    #[serde(default = "default_placeholder_accounts")]
    pub placeholder_accounts: Vec<String>,
    /// Run automated entries when adding entries
    #[serde(default = "default_true")]
    pub apply_auto_entries: bool,
    /// Account path used to balance entries with a single posting
    pub basket: Option<String>,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            placeholder_accounts: default_placeholder_accounts(),
            apply_auto_entries: true,
            basket: None,
        }
    }
}

impl JournalOptions {
    /// Parse options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read options from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref()).map_err(serde_json::Error::io)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether `fullname` names the matched posting's account in templates
    pub fn is_placeholder(&self, fullname: &str) -> bool {
        self.placeholder_accounts.iter().any(|name| name == fullname)
    }
}
