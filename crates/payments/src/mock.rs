//! Mock payment provider for development and tests.
//!
//! Stands in for Stripe when no secret key is configured. Sessions are
//! fabricated locally and verification reports a fixed status, so the full
//! booking flow can run against in-memory infrastructure.

use tracing::info;

use stayforge_core::ProviderSessionId;

use crate::gateway::{
    CheckoutGateway, CheckoutSessionRequest, PaymentError, PaymentStatus, PaymentVerifier,
    ProviderSession,
};

/// Fake provider: every created session is immediately payable and `verify`
/// answers with a fixed status (paid unless configured otherwise).
#[derive(Debug, Clone)]
pub struct MockCheckoutProvider {
    status: PaymentStatus,
}

impl MockCheckoutProvider {
    pub fn new() -> Self {
        Self {
            status: PaymentStatus::Paid,
        }
    }

    /// Provider whose sessions verify with the given status.
    pub fn with_status(status: PaymentStatus) -> Self {
        Self { status }
    }
}

impl Default for MockCheckoutProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CheckoutGateway for MockCheckoutProvider {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<ProviderSession, PaymentError> {
        let raw_id = format!("mock_cs_{}", uuid::Uuid::now_v7());
        let id = ProviderSessionId::new(raw_id.clone())
            .map_err(|e| PaymentError::Decode(e.to_string()))?;

        info!(
            session = %id,
            product = %request.product_name,
            amount_cents = request.amount_cents,
            "mock checkout session created"
        );

        Ok(ProviderSession {
            id,
            checkout_url: format!("https://checkout.invalid/pay/{raw_id}"),
        })
    }
}

#[async_trait::async_trait]
impl PaymentVerifier for MockCheckoutProvider {
    async fn verify(&self, _session: &ProviderSessionId) -> Result<PaymentStatus, PaymentError> {
        Ok(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkout_request() -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            product_name: "Seaside Villa (Deluxe)".to_string(),
            amount_cents: 12_900,
            currency: "usd".to_string(),
            quantity: 1,
            success_url: "http://localhost:8080/checkout/success?session_id={CHECKOUT_SESSION_ID}&booking_id=1".to_string(),
            cancel_url: "http://localhost:8080/checkout/cancel".to_string(),
        }
    }

    #[tokio::test]
    async fn mock_sessions_verify_as_paid_by_default() {
        let provider = MockCheckoutProvider::new();

        let session = provider.create_session(&checkout_request()).await.unwrap();
        assert!(session.id.as_str().starts_with("mock_cs_"));
        assert!(session.checkout_url.contains(session.id.as_str()));

        let status = provider.verify(&session.id).await.unwrap();
        assert_eq!(status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn mock_provider_can_report_unpaid() {
        let provider = MockCheckoutProvider::with_status(PaymentStatus::Unpaid);

        let session = provider.create_session(&checkout_request()).await.unwrap();
        let status = provider.verify(&session.id).await.unwrap();
        assert_eq!(status, PaymentStatus::Unpaid);
    }
}
