//! Core types for Marketstall.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod slug;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CartLine, CartTotals, PricingRules, round_cents, to_minor_units};
pub use slug::slugify;
pub use status::*;
