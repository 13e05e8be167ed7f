//! Payment provider integration.
//!
//! This crate defines the seams the booking workflow talks to (session
//! creation and payment verification) plus the Stripe-backed implementation
//! and a mock provider for development and tests.

pub mod gateway;
pub mod mock;
pub mod stripe;

pub use gateway::{
    CheckoutGateway, CheckoutSessionRequest, PaymentError, PaymentStatus, PaymentVerifier,
    ProviderSession,
};
pub use mock::MockCheckoutProvider;
pub use stripe::{StripeClient, StripeConfig};
