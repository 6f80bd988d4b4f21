//! REST client for the remote cart service.
//!
//! Uses `reqwest` for HTTP. Requests authenticate with the bearer token of
//! the identity currently published on the [`crate::identity::IdentityBridge`].

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::instrument;
use url::Url;

use cartsync_core::{ProductId, RemoteLineId};

use crate::identity::Identity;

use super::wire::{AddLineRequest, CartPayload, ErrorPayload, SetQuantityRequest};
use super::{CartSnapshot, RemoteCart, RemoteError};

/// Client for the remote cart REST API.
#[derive(Clone)]
pub struct HttpCartClient {
    inner: Arc<HttpCartClientInner>,
}

struct HttpCartClientInner {
    client: reqwest::Client,
    base_url: String,
    identity: watch::Receiver<Option<Identity>>,
}

impl HttpCartClient {
    /// Create a client for the service at `base_url`.
    #[must_use]
    pub fn new(base_url: &Url, identity: watch::Receiver<Option<Identity>>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, identity)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        base_url: &Url,
        identity: watch::Receiver<Option<Identity>>,
    ) -> Self {
        Self {
            inner: Arc::new(HttpCartClientInner {
                client,
                base_url: base_url.as_str().trim_end_matches('/').to_string(),
                identity,
            }),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/cart{path}", self.inner.base_url)
    }

    fn access_token(&self) -> Result<SecretString, RemoteError> {
        self.inner
            .identity
            .borrow()
            .as_ref()
            .map(|identity| identity.access_token.clone())
            .ok_or(RemoteError::NotAuthenticated)
    }

    /// Send a request and parse the cart it returns.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<CartSnapshot, RemoteError> {
        let token = self.access_token()?;

        let response = request
            .bearer_auth(token.expose_secret())
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(RemoteError::Unauthorized);
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Cart service returned non-success status"
            );
            let message = serde_json::from_str::<ErrorPayload>(&response_text).map_or_else(
                |_| response_text.chars().take(200).collect(),
                |payload| payload.message,
            );
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let payload: CartPayload = serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %response_text.chars().take(500).collect::<String>(),
                "Failed to parse cart response"
            );
            RemoteError::Parse(e)
        })?;

        Ok(payload.into_snapshot())
    }
}

impl RemoteCart for HttpCartClient {
    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<CartSnapshot, RemoteError> {
        let request = self.inner.client.get(self.endpoint(""));
        self.execute(request).await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_line(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot, RemoteError> {
        let request = self
            .inner
            .client
            .post(self.endpoint("/add"))
            .json(&AddLineRequest {
                product_id,
                quantity,
            });
        self.execute(request).await
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn set_line_quantity(
        &self,
        line_id: &RemoteLineId,
        quantity: u32,
    ) -> Result<CartSnapshot, RemoteError> {
        let request = self
            .inner
            .client
            .put(self.endpoint(&format!("/item/{line_id}")))
            .json(&SetQuantityRequest { quantity });
        self.execute(request).await
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn remove_line(&self, line_id: &RemoteLineId) -> Result<CartSnapshot, RemoteError> {
        let request = self
            .inner
            .client
            .delete(self.endpoint(&format!("/item/{line_id}")));
        self.execute(request).await
    }

    #[instrument(skip(self))]
    async fn clear_cart(&self) -> Result<CartSnapshot, RemoteError> {
        let request = self.inner.client.delete(self.endpoint("/clear"));
        self.execute(request).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cartsync_core::UserId;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let (_tx, rx) = watch::channel(None);
        let client = HttpCartClient::new(&Url::parse("http://localhost:8888/").unwrap(), rx);

        assert_eq!(client.endpoint(""), "http://localhost:8888/api/cart");
        assert_eq!(
            client.endpoint("/item/4"),
            "http://localhost:8888/api/cart/item/4"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let (_tx, rx) = watch::channel(None);
        let client = HttpCartClient::new(&Url::parse("https://shop.test/backend").unwrap(), rx);

        assert_eq!(client.endpoint("/clear"), "https://shop.test/backend/api/cart/clear");
    }

    #[tokio::test]
    async fn test_requests_without_identity_fail_fast() {
        let (_tx, rx) = watch::channel(None);
        let client = HttpCartClient::new(&Url::parse("http://127.0.0.1:9").unwrap(), rx);

        let result = client.fetch_cart().await;
        assert!(matches!(result, Err(RemoteError::NotAuthenticated)));
    }

    #[test]
    fn test_access_token_follows_identity() {
        let (tx, rx) = watch::channel(None);
        let client = HttpCartClient::new(&Url::parse("http://localhost").unwrap(), rx);

        tx.send_replace(Some(Identity::new(UserId::new(1), "token-1")));
        assert_eq!(client.access_token().unwrap().expose_secret(), "token-1");

        tx.send_replace(None);
        assert!(client.access_token().is_err());
    }
}
