//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Password accounts, bearer tokens and password resets
//! - `cart` - Cart operations with catalog and stock validation
//! - `catalog` - Cached product lookups
//! - `checkout` - Order placement, status changes and payment events
//! - `email` - Transactional email over SMTP
//! - `payments` - Stripe PaymentIntents, refunds and webhook verification

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod email;
pub mod payments;

pub use auth::{AuthError, AuthService};
pub use cart::{CartError, CartService};
pub use catalog::ProductCache;
pub use checkout::{CheckoutError, CheckoutService};
pub use email::{EmailError, EmailService};
pub use payments::{PaymentError, StripeClient};
