//!
//! Utility module for the wallet finder dashboard.
//!
//! Re-exports formatting helpers used by the presenters.
/// Utility functions for formatting and display
pub mod index;

pub use index::{BALANCE_DECIMALS, format_balance};
