//! Automated entries
//!
//! An automated entry pairs a predicate over postings with a list of template
//! postings. Whenever a posting of a regular entry matches, every template is
//! instantiated into that entry:
//!
//! - a template amount with a commodity is copied as is, before balancing;
//! - a commodity-less template amount is a multiplier applied to the matched
//!   posting's amount, after balancing.
//!
//! Only the postings present before expansion starts are matched, so an
//! automated entry never triggers on its own output.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use regex::{Regex, RegexBuilder};

use crate::account::AccountTree;
use crate::entry::EntryBase;
use crate::error::{Error, Result};
use crate::journal::Journal;
use crate::options::JournalOptions;
use crate::posting::{Posting, XactFlags};

const TARGET: &str = "ledger.journal.auto";

type PredicateFn = dyn Fn(&Posting, &AccountTree) -> bool + Send + Sync;

/// Boolean test over a posting
#[derive(Clone)]
pub struct ItemPredicate {
    expr: String,
    test: Arc<PredicateFn>,
}

impl ItemPredicate {
    /// Matches every posting
    pub fn always() -> Self {
        Self { expr: String::new(), test: Arc::new(|_, _| true) }
    }

    /// Matches postings whose account full name matches `pattern`,
    /// ignoring case
    pub fn account_matches(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| Error::Predicate { expr: pattern.to_string(), source })?;
        Ok(Self::from_regex(pattern, regex))
    }

    fn from_regex(expr: &str, regex: Regex) -> Self {
        Self {
            expr: expr.to_string(),
            test: Arc::new(move |xact, accounts| regex.is_match(&accounts.fullname(xact.account))),
        }
    }

    /// Wrap an arbitrary test
    pub fn from_fn<F>(expr: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Posting, &AccountTree) -> bool + Send + Sync + 'static,
    {
        Self { expr: expr.into(), test: Arc::new(test) }
    }

    /// Read a predicate as written after `=` in a journal.
    ///
    /// Accepts an empty string (matches everything), `/regex/`,
    /// `account =~ /regex/`, or a bare account pattern.
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Ok(Self::always());
        }

        let pattern = trimmed
            .strip_prefix("account")
            .map(str::trim_start)
            .and_then(|rest| rest.strip_prefix("=~"))
            .map(str::trim)
            .unwrap_or(trimmed);
        let pattern = pattern
            .strip_prefix('/')
            .and_then(|p| p.strip_suffix('/'))
            .unwrap_or(pattern);

        let mut predicate = Self::account_matches(pattern)?;
        predicate.expr = trimmed.to_string();
        Ok(predicate)
    }

    /// The text this predicate was built from
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// Evaluate against a posting
    pub fn test(&self, xact: &Posting, accounts: &AccountTree) -> bool {
        (self.test)(xact, accounts)
    }
}

impl fmt::Debug for ItemPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ItemPredicate").field(&self.expr).finish()
    }
}

/// Predicate plus template postings
#[derive(Debug)]
pub struct AutoEntry {
    /// Which postings trigger this automated entry
    pub predicate: ItemPredicate,
    base: EntryBase,
}

impl AutoEntry {
    /// Create an automated entry with no templates
    pub fn new(predicate: ItemPredicate) -> Self {
        Self { predicate, base: EntryBase::new() }
    }

    /// Template postings in order
    pub fn xacts(&self) -> &[Posting] {
        self.base.xacts()
    }

    /// Shared entry data
    pub fn base(&self) -> &EntryBase {
        &self.base
    }

    /// Shared entry data, mutably
    pub fn base_mut(&mut self) -> &mut EntryBase {
        &mut self.base
    }

    /// Append a template posting; it must carry an amount
    pub fn add_xact(&mut self, template: Posting) -> Result<()> {
        if template.amount_is_null() {
            return Err(Error::Amount(ledger_math::AmountError::NullAmount));
        }
        self.base.add_xact(template);
        Ok(())
    }

    /// Instantiate the templates into `entry` for every matching posting.
    ///
    /// With `post` unset only templates with a commodity apply; with `post`
    /// set only multiplier templates do.
    pub fn extend_entry(
        &self,
        entry: &mut EntryBase,
        post: bool,
        accounts: &AccountTree,
        options: &JournalOptions,
    ) -> Result<()> {
        let mut generated = Vec::new();

        for matched in entry.xacts().iter().filter(|xact| self.predicate.test(xact, accounts)) {
            debug!(
                target: TARGET,
                "{} matched by '{}'",
                accounts.fullname(matched.account),
                self.predicate.as_str()
            );

            for template in self.base.xacts() {
                let Some(template_amount) = template.amount.as_ref() else {
                    continue;
                };

                let amount = if template_amount.has_commodity() {
                    if post {
                        continue;
                    }
                    template_amount.clone()
                } else {
                    if !post {
                        continue;
                    }
                    let Some(matched_amount) = matched.amount.as_ref().filter(|a| !a.is_null())
                    else {
                        warn!(target: TARGET, "matched posting has no amount to multiply");
                        continue;
                    };
                    (matched_amount * template_amount)?
                };

                let account = if options.is_placeholder(&accounts.fullname(template.account)) {
                    matched.account
                } else {
                    template.account
                };

                let mut xact =
                    Posting::with_amount(account, amount, template.flags | XactFlags::AUTO);
                xact.state = template.state;
                xact.actual_date = template.actual_date;
                xact.effective_date = template.effective_date;
                xact.note = template.note.clone();
                xact.pos = template.pos.clone();
                generated.push(xact);
            }
        }

        for xact in generated {
            debug!(
                target: TARGET,
                "adding {} {}",
                accounts.fullname(xact.account),
                xact.amount.as_ref().map(ToString::to_string).unwrap_or_default()
            );
            entry.add_xact(xact);
        }
        Ok(())
    }
}

/// Apply every automated entry registered with `journal`, in registration
/// order
pub fn extend_entry_base(journal: &Journal, entry: &mut EntryBase, post: bool) -> Result<()> {
    for auto_entry in journal.auto_entries() {
        auto_entry.extend_entry(entry, post, &journal.accounts, journal.options())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use chrono::NaiveDate;
    use ledger_math::{Amount, CommodityPool, Decimal};

    fn dollars(pool: &mut CommodityPool, value: &str) -> Amount {
        let decimal: Decimal = value.parse().unwrap();
        Amount::with_commodity(decimal, pool.create("$", 2))
    }

    fn grocery_entry(tree: &mut AccountTree, pool: &mut CommodityPool) -> Entry {
        let food = tree.find_account("Expenses:Food", true).unwrap();
        let cash = tree.find_account("Assets:Cash", true).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        Entry::builder(date, "Market")
            .posting(Posting::with_amount(food, dollars(pool, "200"), XactFlags::NORMAL))
            .posting(Posting::with_amount(cash, dollars(pool, "-200"), XactFlags::NORMAL))
            .build()
    }

    #[test]
    fn test_parse_predicate_forms() {
        let mut tree = AccountTree::new();
        let food = tree.find_account("Expenses:Food", true).unwrap();
        let xact = Posting::new(food, XactFlags::NORMAL);

        for expr in ["/food/", "account =~ /^Expenses/", "Food", ""] {
            let predicate = ItemPredicate::parse(expr).unwrap();
            assert!(predicate.test(&xact, &tree), "{expr}");
        }
        assert!(!ItemPredicate::parse("/^Assets/").unwrap().test(&xact, &tree));
        assert!(matches!(ItemPredicate::parse("/(/"), Err(Error::Predicate { .. })));
    }

    #[test]
    fn test_multiplier_applies_after_balancing() {
        let mut tree = AccountTree::new();
        let mut pool = CommodityPool::new();
        let mut entry = grocery_entry(&mut tree, &mut pool);
        let tithe = tree.find_account("Liabilities:Tithe", true).unwrap();

        let mut auto = AutoEntry::new(ItemPredicate::account_matches("Food").unwrap());
        auto.add_xact(Posting::with_amount(tithe, Amount::parse("0.1").unwrap(), XactFlags::NORMAL))
            .unwrap();
        let options = JournalOptions::default();

        auto.extend_entry(entry.base_mut(), false, &tree, &options).unwrap();
        assert_eq!(entry.xacts().len(), 2);

        auto.extend_entry(entry.base_mut(), true, &tree, &options).unwrap();
        let added = &entry.xacts()[2];
        assert_eq!(added.account, tithe);
        assert_eq!(added.amount, Some(dollars(&mut pool, "20")));
        assert!(added.has_flags(XactFlags::AUTO));
        assert_eq!(added.entry, Some(entry.id()));
    }

    #[test]
    fn test_fixed_amount_applies_before_balancing() {
        let mut tree = AccountTree::new();
        let mut pool = CommodityPool::new();
        let mut entry = grocery_entry(&mut tree, &mut pool);
        let fee = tree.find_account("Expenses:Fees", true).unwrap();

        let mut auto = AutoEntry::new(ItemPredicate::always());
        let mut template = Posting::with_amount(fee, dollars(&mut pool, "1"), XactFlags::VIRTUAL);
        template.note = Some("card fee".to_string());
        auto.add_xact(template).unwrap();
        let options = JournalOptions::default();

        auto.extend_entry(entry.base_mut(), true, &tree, &options).unwrap();
        assert_eq!(entry.xacts().len(), 2);

        auto.extend_entry(entry.base_mut(), false, &tree, &options).unwrap();
        // one instance per original posting, none for the postings just added
        assert_eq!(entry.xacts().len(), 4);
        for added in &entry.xacts()[2..] {
            assert_eq!(added.amount, Some(dollars(&mut pool, "1")));
            assert!(added.has_flags(XactFlags::AUTO | XactFlags::VIRTUAL));
            assert_eq!(added.note.as_deref(), Some("card fee"));
        }
    }

    #[test]
    fn test_placeholder_resolves_to_matched_account() {
        let mut tree = AccountTree::new();
        let mut pool = CommodityPool::new();
        let mut entry = grocery_entry(&mut tree, &mut pool);
        let placeholder = tree.find_account("$account", true).unwrap();
        let food = tree.lookup("Expenses:Food").unwrap();

        let mut auto = AutoEntry::new(ItemPredicate::account_matches("^Expenses").unwrap());
        auto.add_xact(Posting::with_amount(placeholder, Amount::parse("-1").unwrap(), XactFlags::NORMAL))
            .unwrap();

        auto.extend_entry(entry.base_mut(), true, &tree, &JournalOptions::default()).unwrap();
        let added = &entry.xacts()[2];
        assert_eq!(added.account, food);
        assert_eq!(added.amount, Some(dollars(&mut pool, "-200")));
    }

    #[test]
    fn test_template_without_amount_is_rejected() {
        let mut tree = AccountTree::new();
        let account = tree.find_account("Expenses", true).unwrap();
        let mut auto = AutoEntry::new(ItemPredicate::always());
        assert!(auto.add_xact(Posting::new(account, XactFlags::NORMAL)).is_err());
        assert!(auto.xacts().is_empty());
    }
}
