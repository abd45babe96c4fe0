//! Hierarchical account structure stored as an arena
//!
//! Accounts are addressed by [`AccountId`], an index into the owning
//! [`AccountTree`]. Postings hold ids rather than shared references, so an
//! entry can be copied or moved without touching the tree.

use std::collections::HashMap;
use std::fmt;

/// Index of an account inside its [`AccountTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(usize);

impl AccountId {
    /// Position in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node in the account hierarchy
#[derive(Debug, Clone)]
pub struct Account {
    /// This account's id
    pub id: AccountId,
    /// Last path component
    pub name: String,
    /// Parent account; `None` only for the root
    pub parent: Option<AccountId>,
    /// Children keyed by their name
    pub children: HashMap<String, AccountId>,
    /// Depth in the hierarchy (0 for the root)
    pub depth: usize,
    fullname: String,
}

impl Account {
    /// Colon-separated path from the root
    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Check if this is a root-level account
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Owns every account of a journal
#[derive(Debug, Clone)]
pub struct AccountTree {
    accounts: Vec<Account>,
    path_index: HashMap<String, AccountId>,
}

impl AccountTree {
    /// Create a tree holding only the unnamed root
    pub fn new() -> Self {
        let root = Account {
            id: AccountId(0),
            name: String::new(),
            parent: None,
            children: HashMap::new(),
            depth: 0,
            fullname: String::new(),
        };
        let mut path_index = HashMap::new();
        path_index.insert(String::new(), root.id);
        Self { accounts: vec![root], path_index }
    }

    /// The unnamed root account
    pub fn root(&self) -> AccountId {
        AccountId(0)
    }

    /// Find an account by its colon-separated path, creating the missing
    /// path components when `auto_create` is set
    pub fn find_account(&mut self, path: &str, auto_create: bool) -> Option<AccountId> {
        if let Some(id) = self.lookup(path) {
            return Some(id);
        }
        if !auto_create {
            return None;
        }

        let mut current = self.root();
        for component in path.split(':').map(str::trim).filter(|c| !c.is_empty()) {
            let existing = self.accounts[current.0].children.get(component).copied();
            current = match existing {
                Some(child) => child,
                None => self.create_child(current, component),
            };
        }
        Some(current)
    }

    fn create_child(&mut self, parent: AccountId, name: &str) -> AccountId {
        let id = AccountId(self.accounts.len());
        let parent_account = &self.accounts[parent.0];
        let fullname = if parent_account.fullname.is_empty() {
            name.to_string()
        } else {
            format!("{}:{}", parent_account.fullname, name)
        };

        let account = Account {
            id,
            name: name.to_string(),
            parent: Some(parent),
            children: HashMap::new(),
            depth: parent_account.depth + 1,
            fullname: fullname.clone(),
        };
        self.accounts.push(account);
        self.accounts[parent.0].children.insert(name.to_string(), id);
        self.path_index.insert(fullname, id);
        id
    }

    /// Find an existing account without creating anything
    pub fn lookup(&self, path: &str) -> Option<AccountId> {
        self.path_index.get(path.trim()).copied()
    }

    /// Get an account by id
    pub fn get(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(id.0)
    }

    /// Full name of an account; unknown ids render as `#<index>`
    pub fn fullname(&self, id: AccountId) -> String {
        match self.get(id) {
            Some(account) => account.fullname.clone(),
            None => id.to_string(),
        }
    }

    /// Number of accounts, including the root
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// True when only the root exists
    pub fn is_empty(&self) -> bool {
        self.accounts.len() == 1
    }
}

impl Default for AccountTree {
    fn default() -> Self {
        Self::new()
    }
}
