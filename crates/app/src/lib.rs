//! Interactive pricing sessions over the reckon calculator core.
//!
//! [`api`] defines the pricing backend trait with its HTTP and
//! fixture-backed implementations, [`session`] drives debounced edits
//! through a backend, and [`demo`] scripts a complete quote for the CLI.

pub mod api;
pub mod demo;
pub mod session;
