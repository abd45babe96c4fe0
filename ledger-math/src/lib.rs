//! Exact arithmetic for double-entry accounting
//!
//! Provides the numeric types the entry engine balances with: commodities
//! interned by a [`CommodityPool`], exact [`Amount`]s, ordered multi-commodity
//! [`Balance`]s and the [`exchange`] operation that turns a quantity plus a
//! total cost into a priced lot.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod amount;
pub mod balance;
pub mod commodity;
pub mod exchange;

pub use amount::{Amount, AmountError, AmountResult, Precision, EXTEND_BY_DIGITS};
pub use balance::{Balance, BalanceError, BalanceResult};
pub use commodity::{
    annotate_commodity, null_commodity, Annotation, AnnotationFlags, Commodity, CommodityFlags,
    CommodityPool, CommodityRef,
};
pub use exchange::{exchange, Exchange};

pub use num_bigint::BigInt;
pub use num_rational::BigRational;
pub use rust_decimal::Decimal;
