//! Marketstall Storefront library.
//!
//! The JSON API behind the shop: catalog, cart, checkout, orders, reviews,
//! wishlists, and the `/api/admin` surface for catalog, order, user and
//! warehouse inventory management. Built as a library so the binary and the
//! tests share one router.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
