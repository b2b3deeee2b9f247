//! Reckon
//!
//! Reckon is the client-side core of a B2B quoting calculator: selection
//! state over a tiered price book, debounced recalculation against a
//! pricing service, and discount-policy checks over the results.

pub mod book;
pub mod debounce;
pub mod fixtures;
pub mod ids;
pub mod policy;
pub mod quote;
pub mod recalc;
pub mod selection;
pub mod store;
pub mod summary;
pub mod totals;
pub mod wire;
