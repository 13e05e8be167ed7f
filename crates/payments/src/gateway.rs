//! Provider-facing contracts for hosted checkout.
//!
//! Two seams are deliberately kept separate: `CheckoutGateway` starts a
//! hosted checkout session, `PaymentVerifier` answers whether a session was
//! actually paid. The booking workflow only ever needs the verifier; the
//! checkout entry point only needs the gateway.

use std::sync::Arc;

use stayforge_core::ProviderSessionId;

/// Errors surfaced by a payment provider.
///
/// Every variant is treated the same way by callers: the outcome of the
/// attempted operation is unknown, so the booking involved must stay
/// pending and the caller may retry later. The split exists for logs.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// Request never produced a usable response (connect error, timeout).
    #[error("payment provider unreachable: {0}")]
    Network(String),

    /// Provider answered with a non-success status.
    #[error("payment provider returned {status}: {detail}")]
    Api { status: u16, detail: String },

    /// Provider answered 2xx but the body did not parse.
    #[error("payment provider response malformed: {0}")]
    Decode(String),
}

/// Settlement state of a checkout session as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    /// The session has a completed payment behind it.
    Paid,
    /// Anything other than a completed payment (unpaid, expired, pending).
    Unpaid,
}

impl PaymentStatus {
    pub fn is_paid(self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }
}

/// What the caller wants a hosted checkout session to look like.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    /// Line item label shown on the provider's payment page.
    pub product_name: String,
    /// Unit amount in the smallest currency denomination.
    pub amount_cents: u64,
    /// ISO currency code, lowercase (e.g. "usd").
    pub currency: String,
    pub quantity: u32,
    /// Where the provider redirects after payment. The provider substitutes
    /// its session id into the `{CHECKOUT_SESSION_ID}` placeholder.
    pub success_url: String,
    pub cancel_url: String,
}

/// A hosted checkout session created at the provider.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub id: ProviderSessionId,
    /// URL the guest is sent to in order to pay.
    pub checkout_url: String,
}

/// Creates hosted checkout sessions at the payment provider.
#[async_trait::async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<ProviderSession, PaymentError>;
}

#[async_trait::async_trait]
impl<G> CheckoutGateway for Arc<G>
where
    G: CheckoutGateway + ?Sized,
{
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<ProviderSession, PaymentError> {
        (**self).create_session(request).await
    }
}

/// Looks up the settlement state of an existing checkout session.
#[async_trait::async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(&self, session: &ProviderSessionId) -> Result<PaymentStatus, PaymentError>;
}

#[async_trait::async_trait]
impl<V> PaymentVerifier for Arc<V>
where
    V: PaymentVerifier + ?Sized,
{
    async fn verify(&self, session: &ProviderSessionId) -> Result<PaymentStatus, PaymentError> {
        (**self).verify(session).await
    }
}
