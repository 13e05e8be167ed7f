//! Booking lifecycle and confirmation workflow.
//!
//! A booking is created `Pending` when checkout starts and reaches exactly
//! one terminal status (`Confirmed` or `Failed`) through the orchestrator,
//! which verifies payment, secures inventory and queues the confirmation
//! mail. Terminal transitions are recorded exactly once, which is what makes
//! replayed payment callbacks safe.

pub mod booking;
pub mod orchestrator;
pub mod store;

pub use booking::{Booking, BookingStatus, FailureReason, NewBooking};
pub use orchestrator::{
    BeginCheckout, BookingOrchestrator, CheckoutConfig, CheckoutError, CheckoutStarted,
    ConfirmationError, ConfirmationOutcome,
};
pub use store::{BookingStore, BookingStoreError, InMemoryBookingStore, Transition};
