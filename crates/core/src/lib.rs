//! Marketstall Core - Shared domain types.
//!
//! This crate provides the types and pure domain rules used by the other
//! Marketstall components:
//! - `storefront` - JSON API server (public storefront and `/api/admin`)
//! - `cli` - Command-line tools for migrations, admin bootstrap and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Rules that must hold everywhere (order status
//! transitions, cart arithmetic, stock allocation) live here so they can be
//! unit tested without a database.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, emails, statuses, money and slugs
//! - [`inventory`] - Stock allocation planning across warehouses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod inventory;
pub mod types;

pub use inventory::{AllocationPlan, Shortfall, WarehouseStock, plan_allocation};
pub use types::*;
