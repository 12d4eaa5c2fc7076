//! HTTP client for the platform API.

use crate::error::Error;
use crate::types::*;
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[cfg(test)]
mod tests;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API (e.g., "http://localhost:8080").
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// API key sent with every request.
    pub api_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(30),
            api_key: None,
        }
    }
}

/// HTTP client for the Trading Platform API.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl PlatformClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    /// Creates a new client with default configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_base_url(base_url: &str) -> Result<Self, Error> {
        Self::new(ClientConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    /// Returns a copy of this client that authenticates with `api_key`.
    #[must_use]
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: Some(api_key.into()),
        }
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========================================================================
    // Health & Stats
    // ========================================================================

    /// Performs a health check.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn health_check(&self) -> Result<HealthResponse, Error> {
        let resp = self.request(Method::GET, "/health").send().await?;
        handle_response(resp).await
    }

    /// Gets platform statistics.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_stats(&self) -> Result<StatsResponse, Error> {
        let resp = self.request(Method::GET, "/api/v1/stats").send().await?;
        handle_response(resp).await
    }

    // ========================================================================
    // API keys
    // ========================================================================

    /// Creates an API key. Needs an admin key.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn create_api_key(
        &self,
        req: &CreateApiKeyRequest,
    ) -> Result<CreateApiKeyResponse, Error> {
        let resp = self
            .request(Method::POST, "/api/v1/auth/keys")
            .json(req)
            .send()
            .await?;
        handle_response(resp).await
    }

    /// Lists API keys.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn list_api_keys(&self) -> Result<Vec<ApiKeyInfo>, Error> {
        let resp = self.request(Method::GET, "/api/v1/auth/keys").send().await?;
        handle_response(resp).await
    }

    /// Revokes an API key.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn delete_api_key(&self, key_id: &str) -> Result<MessageResponse, Error> {
        let path = format!("/api/v1/auth/keys/{}", key_id);
        let resp = self.request(Method::DELETE, &path).send().await?;
        handle_response(resp).await
    }

    // ========================================================================
    // Admin resources
    // ========================================================================
    //
    // `resource` is the path below `/api/v1/admin/`, e.g. `referrals` or
    // `staking/pools`. Records are returned as whatever type the caller asks
    // for; `serde_json::Value` always works.

    /// Lists a page of records.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn list_resources<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: Option<&ListParams>,
    ) -> Result<Paginated<T>, Error> {
        let path = with_query(&admin_path(resource), params);
        let resp = self.request(Method::GET, &path).send().await?;
        handle_response(resp).await
    }

    /// Fetches one record.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_resource<T: DeserializeOwned>(
        &self,
        resource: &str,
        id: &str,
    ) -> Result<T, Error> {
        let path = format!("{}/{}", admin_path(resource), id);
        let resp = self.request(Method::GET, &path).send().await?;
        handle_response(resp).await
    }

    /// Creates a record.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn create_resource<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        resource: &str,
        body: &B,
    ) -> Result<T, Error> {
        let resp = self
            .request(Method::POST, &admin_path(resource))
            .json(body)
            .send()
            .await?;
        handle_response(resp).await
    }

    /// Updates a record.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn update_resource<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        resource: &str,
        id: &str,
        body: &B,
    ) -> Result<T, Error> {
        let path = format!("{}/{}", admin_path(resource), id);
        let resp = self.request(Method::PUT, &path).json(body).send().await?;
        handle_response(resp).await
    }

    /// Deletes a record, refunding whatever it holds.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn delete_resource(&self, resource: &str, id: &str) -> Result<MessageResponse, Error> {
        let path = format!("{}/{}", admin_path(resource), id);
        let resp = self.request(Method::DELETE, &path).send().await?;
        handle_response(resp).await
    }

    /// Deletes several records in one all-or-nothing step.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn delete_resources(
        &self,
        resource: &str,
        ids: &[String],
    ) -> Result<MessageResponse, Error> {
        let body = BulkIdsRequest { ids: ids.to_vec() };
        let resp = self
            .request(Method::DELETE, &admin_path(resource))
            .json(&body)
            .send()
            .await?;
        handle_response(resp).await
    }

    /// Sets the status of one record.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn update_status<S: Serialize>(
        &self,
        resource: &str,
        id: &str,
        status: S,
    ) -> Result<MessageResponse, Error> {
        let path = format!("{}/{}/status", admin_path(resource), id);
        let body = StatusRequest { ids: None, status };
        let resp = self.request(Method::PUT, &path).json(&body).send().await?;
        handle_response(resp).await
    }

    /// Sets the status of several records.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn update_statuses<S: Serialize>(
        &self,
        resource: &str,
        ids: &[String],
        status: S,
    ) -> Result<MessageResponse, Error> {
        let path = format!("{}/status", admin_path(resource));
        let body = StatusRequest {
            ids: Some(ids.to_vec()),
            status,
        };
        let resp = self.request(Method::PUT, &path).json(&body).send().await?;
        handle_response(resp).await
    }

    // ========================================================================
    // Market data
    // ========================================================================

    /// Lists enabled markets.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn list_markets(&self, kind: MarketKind) -> Result<Vec<MarketSummary>, Error> {
        let path = format!("/api/v1/{}/markets", kind);
        let resp = self.request(Method::GET, &path).send().await?;
        handle_response(resp).await
    }

    /// Gets the order book of a market.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_order_book(
        &self,
        kind: MarketKind,
        currency: &str,
        pair: &str,
        limit: Option<usize>,
    ) -> Result<OrderBookSnapshot, Error> {
        let mut path = format!("/api/v1/{}/orderbook/{}/{}", kind, currency, pair);
        if let Some(limit) = limit {
            path.push_str(&format!("?limit={}", limit));
        }
        let resp = self.request(Method::GET, &path).send().await?;
        handle_response(resp).await
    }

    /// Gets the ticker of a market.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_ticker(
        &self,
        kind: MarketKind,
        currency: &str,
        pair: &str,
    ) -> Result<Ticker, Error> {
        let path = format!("/api/v1/{}/ticker/{}/{}", kind, currency, pair);
        let resp = self.request(Method::GET, &path).send().await?;
        handle_response(resp).await
    }

    /// Gets the tickers of every enabled market.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_tickers(&self, kind: MarketKind) -> Result<Vec<Ticker>, Error> {
        let path = format!("/api/v1/{}/tickers", kind);
        let resp = self.request(Method::GET, &path).send().await?;
        handle_response(resp).await
    }

    /// Gets recent trades of a market, newest first.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_trades(
        &self,
        kind: MarketKind,
        currency: &str,
        pair: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Trade>, Error> {
        let mut path = format!("/api/v1/{}/trades/{}/{}", kind, currency, pair);
        if let Some(limit) = limit {
            path.push_str(&format!("?limit={}", limit));
        }
        let resp = self.request(Method::GET, &path).send().await?;
        handle_response(resp).await
    }

    /// Gets candles of a market.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_chart(
        &self,
        kind: MarketKind,
        currency: &str,
        pair: &str,
        params: &ChartParams,
    ) -> Result<OhlcResponse, Error> {
        let path = with_query(
            &format!("/api/v1/{}/chart/{}/{}", kind, currency, pair),
            Some(params),
        );
        let resp = self.request(Method::GET, &path).send().await?;
        handle_response(resp).await
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Places an order for the key's user.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn place_order(
        &self,
        kind: MarketKind,
        req: &PlaceOrderRequest,
    ) -> Result<PlaceOrderResponse, Error> {
        let path = format!("/api/v1/{}/orders", kind);
        let resp = self.request(Method::POST, &path).json(req).send().await?;
        handle_response(resp).await
    }

    /// Lists the key's orders.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn list_orders(
        &self,
        kind: MarketKind,
        query: Option<&OrderQuery>,
    ) -> Result<OrderPage, Error> {
        let path = with_query(&format!("/api/v1/{}/orders", kind), query);
        let resp = self.request(Method::GET, &path).send().await?;
        handle_response(resp).await
    }

    /// Fetches one of the key's orders.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_order(&self, kind: MarketKind, order_id: &str) -> Result<Order, Error> {
        let path = format!("/api/v1/{}/orders/{}", kind, order_id);
        let resp = self.request(Method::GET, &path).send().await?;
        handle_response(resp).await
    }

    /// Cancels one of the key's open orders.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn cancel_order(&self, kind: MarketKind, order_id: &str) -> Result<Order, Error> {
        let path = format!("/api/v1/{}/orders/{}", kind, order_id);
        let resp = self.request(Method::DELETE, &path).send().await?;
        handle_response(resp).await
    }

    /// Lists the key's futures positions.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn list_positions(&self) -> Result<Vec<Position>, Error> {
        let resp = self
            .request(Method::GET, "/api/v1/futures/positions")
            .send()
            .await?;
        handle_response(resp).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }
}

fn admin_path(resource: &str) -> String {
    format!("/api/v1/admin/{}", resource.trim_matches('/'))
}

fn with_query<Q: Serialize>(path: &str, query: Option<&Q>) -> String {
    let mut path = path.to_string();
    if let Some(q) = query {
        let params = serde_urlencoded::to_string(q).unwrap_or_default();
        if !params.is_empty() {
            path.push_str(&format!("?{}", params));
        }
    }
    path
}

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();

    if status.is_success() {
        Ok(resp.json().await?)
    } else {
        let text = resp.text().await.unwrap_or_default();
        Err(Error::from_status(status.as_u16(), text))
    }
}
