//! Stripe Checkout client.
//!
//! Talks to two endpoints of the Stripe REST API:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | `create_session` | `POST /v1/checkout/sessions` (form-encoded) |
//! | `verify` | `GET /v1/checkout/sessions/{id}` |
//!
//! The secret key is injected through [`StripeConfig`] and sent as a bearer
//! token. It must never appear in source or logs.

use std::time::Duration;

use tracing::instrument;

use stayforge_core::ProviderSessionId;

use crate::gateway::{
    CheckoutGateway, CheckoutSessionRequest, PaymentError, PaymentStatus, PaymentVerifier,
    ProviderSession,
};

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the Stripe API.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_live_...` / `sk_test_...`).
    pub secret_key: String,
    /// API origin, overridable for tests against a local stub.
    pub base_url: String,
    /// Per-request deadline. A slow provider must not hold the booking
    /// callback open indefinitely.
    pub timeout: Duration,
}

impl core::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client for Stripe Checkout sessions.
///
/// Implements both provider seams; the same instance is shared by the
/// checkout entry point and the confirmation workflow.
#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        Ok(Self { http, config })
    }

    fn sessions_url(&self) -> String {
        format!("{}/v1/checkout/sessions", self.config.base_url)
    }

    fn session_url(&self, session: &ProviderSessionId) -> String {
        format!("{}/{}", self.sessions_url(), session)
    }

    /// Turn a non-2xx response into an [`PaymentError::Api`].
    async fn api_error(response: reqwest::Response) -> PaymentError {
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        PaymentError::Api { status, detail }
    }
}

/// Stripe reports `paid`, `unpaid` or `no_payment_required`. Only a
/// completed payment confirms a booking; everything else stays unpaid.
fn status_from_provider(payment_status: &str) -> PaymentStatus {
    if payment_status.eq_ignore_ascii_case("paid") {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Unpaid
    }
}

#[derive(Debug, serde::Deserialize)]
struct CreatedSessionBody {
    id: String,
    url: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct SessionStatusBody {
    payment_status: String,
}

#[async_trait::async_trait]
impl CheckoutGateway for StripeClient {
    #[instrument(
        skip(self, request),
        fields(product = %request.product_name, amount_cents = request.amount_cents),
        err
    )]
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<ProviderSession, PaymentError> {
        let form = [
            ("mode", "payment".to_string()),
            (
                "line_items[0][price_data][currency]",
                request.currency.clone(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.product_name.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                request.amount_cents.to_string(),
            ),
            ("line_items[0][quantity]", request.quantity.to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
        ];

        let response = self
            .http
            .post(self.sessions_url())
            .bearer_auth(&self.config.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body: CreatedSessionBody = response
            .json()
            .await
            .map_err(|e| PaymentError::Decode(e.to_string()))?;

        let id = ProviderSessionId::new(body.id)
            .map_err(|e| PaymentError::Decode(e.to_string()))?;
        let checkout_url = body
            .url
            .ok_or_else(|| PaymentError::Decode("checkout url missing from session".to_string()))?;

        Ok(ProviderSession { id, checkout_url })
    }
}

#[async_trait::async_trait]
impl PaymentVerifier for StripeClient {
    #[instrument(skip(self), fields(session = %session), err)]
    async fn verify(&self, session: &ProviderSessionId) -> Result<PaymentStatus, PaymentError> {
        let response = self
            .http
            .get(self.session_url(session))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body: SessionStatusBody = response
            .json()
            .await
            .map_err(|e| PaymentError::Decode(e.to_string()))?;

        Ok(status_from_provider(&body.payment_status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_paid_counts_as_paid() {
        assert_eq!(status_from_provider("paid"), PaymentStatus::Paid);
        assert_eq!(status_from_provider("PAID"), PaymentStatus::Paid);
        assert_eq!(status_from_provider("unpaid"), PaymentStatus::Unpaid);
        assert_eq!(
            status_from_provider("no_payment_required"),
            PaymentStatus::Unpaid
        );
        assert_eq!(status_from_provider(""), PaymentStatus::Unpaid);
    }

    #[test]
    fn session_urls_target_checkout_sessions() {
        let config = StripeConfig::new("sk_test_dummy").with_base_url("http://localhost:12111");
        let client = StripeClient::new(config).unwrap();

        assert_eq!(
            client.sessions_url(),
            "http://localhost:12111/v1/checkout/sessions"
        );

        let session = ProviderSessionId::new("cs_test_123").unwrap();
        assert_eq!(
            client.session_url(&session),
            "http://localhost:12111/v1/checkout/sessions/cs_test_123"
        );
    }

    #[test]
    fn config_defaults_point_at_stripe() {
        let config = StripeConfig::new("sk_test_dummy");
        assert_eq!(config.base_url, "https://api.stripe.com");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn debug_output_redacts_the_secret_key() {
        let config = StripeConfig::new("sk_test_dummy");
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk_test_dummy"));
        assert!(printed.contains("[redacted]"));
    }
}
