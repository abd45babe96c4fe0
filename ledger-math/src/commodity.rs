//! Commodity module providing currency and commodity type support
//!
//! Commodities are interned by a [`CommodityPool`], which hands out an
//! `ident` in creation order. Idents are unique across every pool in the
//! process, so commodities from different pools never compare equal. That
//! ident is the ordering key of every
//! [`Balance`](crate::balance::Balance): iterating a balance visits
//! commodities in the order the pool first saw them, with annotated
//! commodities sorted directly after their referent.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};

use bitflags::bitflags;
use chrono::NaiveDate;

use crate::amount::{Amount, Precision};

/// Reference-counted commodity for safe sharing
pub type CommodityRef = Arc<Commodity>;

bitflags! {
    /// Commodity style and behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommodityFlags: u32 {
        const STYLE_SUFFIXED = 0x001;
        const STYLE_SEPARATED = 0x002;
        const NOMARKET = 0x010;
        const BUILTIN = 0x020;
        const KNOWN = 0x080;
        const SAW_ANNOTATED = 0x200;
    }
}

bitflags! {
    /// Records which parts of an annotation were computed rather than given
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AnnotationFlags: u32 {
        const PRICE_CALCULATED = 0x01;
        const PRICE_FIXATED = 0x02;
        const DATE_CALCULATED = 0x08;
        const TAG_CALCULATED = 0x10;
    }
}

/// Lot details attached to an annotated commodity: the per-unit price paid,
/// the acquisition date and a free-form tag.
///
/// Flags do not take part in equality, hashing or ordering; two lots are the
/// same lot whether their details were written by hand or computed.
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    /// Per-unit price paid for this lot
    pub price: Option<Amount>,
    /// Acquisition date
    pub date: Option<NaiveDate>,
    /// Lot identifier
    pub tag: Option<String>,
    /// Calculation state
    pub flags: AnnotationFlags,
}

impl Annotation {
    /// Create annotation with price
    pub fn with_price(price: Amount) -> Self {
        Self { price: Some(price), ..Self::default() }
    }

    /// Check if annotation has any values set
    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.date.is_none() && self.tag.is_none()
    }

    /// Check whether the given flags are all set
    pub fn has_flags(&self, flags: AnnotationFlags) -> bool {
        self.flags.contains(flags)
    }
}

impl PartialEq for Annotation {
    fn eq(&self, other: &Self) -> bool {
        self.price == other.price && self.date == other.date && self.tag == other.tag
    }
}

impl Eq for Annotation {}

impl Hash for Annotation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.price.hash(state);
        self.date.hash(state);
        self.tag.hash(state);
    }
}

impl PartialOrd for Annotation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Annotation {
    fn cmp(&self, other: &Self) -> Ordering {
        let price = match (&self.price, &other.price) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.total_cmp(b),
        };
        price.then_with(|| self.date.cmp(&other.date)).then_with(|| self.tag.cmp(&other.tag))
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(price) = &self.price {
            write!(f, " {{{}}}", price)?;
        }
        if let Some(date) = &self.date {
            write!(f, " [{}]", date.format("%Y/%m/%d"))?;
        }
        if let Some(tag) = &self.tag {
            write!(f, " ({})", tag)?;
        }
        Ok(())
    }
}

/// Represents a commodity (currency or other tradeable item)
///
/// Plain commodities are created by a [`CommodityPool`]. Annotated
/// commodities are built with [`annotate_commodity`] and keep a reference to
/// the plain commodity they annotate (their referent).
#[derive(Debug)]
pub struct Commodity {
    ident: usize,
    symbol: String,
    precision: Precision,
    flags: CommodityFlags,
    annotation: Option<Annotation>,
    referent: Option<CommodityRef>,
}

impl Commodity {
    fn plain(ident: usize, symbol: &str, precision: Precision, flags: CommodityFlags) -> Self {
        Self {
            ident,
            symbol: symbol.to_string(),
            precision,
            flags,
            annotation: None,
            referent: None,
        }
    }

    /// Creation-order identity assigned by the pool; 0 is the null commodity
    pub fn ident(&self) -> usize {
        self.ident
    }

    /// Get the symbol of this commodity
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Display precision used when rounding amounts of this commodity
    pub fn precision(&self) -> Precision {
        match &self.referent {
            Some(base) => base.precision(),
            None => self.precision,
        }
    }

    /// Get the flags of this commodity
    pub fn flags(&self) -> CommodityFlags {
        self.flags
    }

    /// Check if this commodity has specific flags set
    pub fn has_flags(&self, flags: CommodityFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Whether this is the commodity of commodity-less amounts
    pub fn is_null(&self) -> bool {
        self.ident == 0
    }

    /// Whether this commodity carries lot details
    pub fn is_annotated(&self) -> bool {
        self.annotation.is_some()
    }

    /// Lot details, if this is an annotated commodity
    pub fn annotation(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }

    /// The plain commodity behind an annotated one, or itself
    pub fn referent(&self) -> &Commodity {
        self.referent.as_deref().unwrap_or(self)
    }

    /// Shared handle to the plain commodity behind `commodity`
    pub fn base_of(commodity: &CommodityRef) -> CommodityRef {
        match &commodity.referent {
            Some(base) => base.clone(),
            None => commodity.clone(),
        }
    }
}

impl PartialEq for Commodity {
    fn eq(&self, other: &Self) -> bool {
        self.ident == other.ident && self.annotation == other.annotation
    }
}

impl Eq for Commodity {}

impl Hash for Commodity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ident.hash(state);
        self.annotation.hash(state);
    }
}

impl PartialOrd for Commodity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Commodity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ident.cmp(&other.ident).then_with(|| self.annotation.cmp(&other.annotation))
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)?;
        if let Some(annotation) = &self.annotation {
            write!(f, "{}", annotation)?;
        }
        Ok(())
    }
}

/// Global null commodity used for amounts without commodities
pub fn null_commodity() -> CommodityRef {
    static NULL_COMMODITY: OnceLock<CommodityRef> = OnceLock::new();
    NULL_COMMODITY
        .get_or_init(|| Arc::new(Commodity::plain(0, "", 0, CommodityFlags::BUILTIN)))
        .clone()
}

/// Build the annotated form of `base` carrying `annotation`.
///
/// Annotating an already annotated commodity replaces its details. Nothing
/// is registered anywhere, so callers only need shared access to the pool.
pub fn annotate_commodity(base: &CommodityRef, annotation: Annotation) -> CommodityRef {
    let referent = Commodity::base_of(base);
    Arc::new(Commodity {
        ident: referent.ident,
        symbol: referent.symbol.clone(),
        precision: referent.precision,
        flags: referent.flags | CommodityFlags::SAW_ANNOTATED,
        annotation: Some(annotation),
        referent: Some(referent),
    })
}

/// Interns plain commodities by symbol and assigns their idents
#[derive(Debug)]
pub struct CommodityPool {
    commodities: HashMap<String, CommodityRef>,
}

fn next_ident() -> usize {
    // 0 is reserved for the null commodity
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    NEXT.fetch_add(1, AtomicOrdering::Relaxed)
}

impl CommodityPool {
    /// Create a new commodity pool
    pub fn new() -> Self {
        Self { commodities: HashMap::new() }
    }

    /// Find or create a commodity with the given display precision.
    ///
    /// Alphabetic symbols ("USD", "AAPL") print after the quantity, anything
    /// else ("$", "€") prints before it.
    pub fn create(&mut self, symbol: &str, precision: Precision) -> CommodityRef {
        if let Some(commodity) = self.commodities.get(symbol) {
            return commodity.clone();
        }

        let mut flags = CommodityFlags::KNOWN;
        if symbol.chars().all(|c| c.is_alphabetic() || c == '_') {
            flags |= CommodityFlags::STYLE_SUFFIXED | CommodityFlags::STYLE_SEPARATED;
        }

        let commodity = Arc::new(Commodity::plain(next_ident(), symbol, precision, flags));
        self.commodities.insert(symbol.to_string(), commodity.clone());
        commodity
    }

    /// Find or create a commodity by symbol
    pub fn find_or_create(&mut self, symbol: &str) -> CommodityRef {
        self.create(symbol, 0)
    }

    /// Find an existing commodity by symbol
    pub fn find(&self, symbol: &str) -> Option<CommodityRef> {
        self.commodities.get(symbol).cloned()
    }

    /// Get the null commodity
    pub fn null_commodity(&self) -> CommodityRef {
        null_commodity()
    }

    /// Get commodity count
    pub fn len(&self) -> usize {
        self.commodities.len()
    }

    /// Whether the pool has no commodities yet
    pub fn is_empty(&self) -> bool {
        self.commodities.is_empty()
    }
}

impl Default for CommodityPool {
    fn default() -> Self {
        Self::new()
    }
}
