//! REST client for the WOO X API

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::RestApi;
use crate::error::{MarketMakerError, Result};
use crate::parser::{
    BalancesResponse, ExchangeInfoResponse, InstrumentInfo, OrderBookSnapshot,
    OrderbookSnapshotResponse, PositionsResponse, SendOrderResponse, StatusResponse,
};
use crate::quoting::QuoteRequest;

/// Form body of `POST /v1/order`
#[derive(Debug, Serialize)]
struct SendOrderParams<'a> {
    symbol: &'a str,
    order_type: &'static str,
    order_price: Decimal,
    order_quantity: Decimal,
    side: &'static str,
}

/// Thin REST client; private endpoints are expected to be signed by the
/// gateway `base_url` points at.
#[derive(Debug, Clone)]
pub struct WooRestClient {
    http: Client,
    base_url: String,
    snapshot_depth: usize,
}

impl WooRestClient {
    pub fn new(base_url: &str, snapshot_depth: usize) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            snapshot_depth,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, turning non-2xx statuses into errors carrying the body
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            return Err(MarketMakerError::RestApiError(format!(
                "{} status code for URL {}: {}",
                status.as_u16(),
                url,
                body
            )));
        }

        Ok(response.json::<T>().await?)
    }
}

fn ensure_success(success: bool, endpoint: &str) -> Result<()> {
    if success {
        Ok(())
    } else {
        Err(MarketMakerError::RestApiError(format!(
            "{} returned success=false",
            endpoint
        )))
    }
}

#[async_trait]
impl RestApi for WooRestClient {
    async fn fetch_orderbook_snapshot(&self, symbol: &str) -> Result<OrderBookSnapshot> {
        let url = self.url(&format!("/v1/public/orderbook/{}", symbol));
        debug!(symbol = %symbol, url = %url, "Fetching order book snapshot");

        let response: OrderbookSnapshotResponse = self
            .execute(self.http.get(&url).query(&[("max_level", self.snapshot_depth)]))
            .await?;
        ensure_success(response.success, "orderbook snapshot")?;

        Ok(response.into())
    }

    async fn fetch_positions(&self) -> Result<PositionsResponse> {
        let response: PositionsResponse =
            self.execute(self.http.get(self.url("/v3/positions"))).await?;
        ensure_success(response.success, "positions")?;
        Ok(response)
    }

    async fn fetch_balances(&self) -> Result<BalancesResponse> {
        let response: BalancesResponse =
            self.execute(self.http.get(self.url("/v3/balances"))).await?;
        ensure_success(response.success, "balances")?;
        Ok(response)
    }

    async fn instrument(&self, symbol: &str) -> Result<InstrumentInfo> {
        let url = self.url(&format!("/v1/public/info/{}", symbol));
        let response: ExchangeInfoResponse = self.execute(self.http.get(&url)).await?;
        ensure_success(response.success, "exchange information")?;

        info!(
            symbol = %symbol,
            quote_tick = %response.info.quote_tick,
            base_tick = %response.info.base_tick,
            "Instrument metadata loaded"
        );
        Ok(response.info)
    }

    async fn submit_order(&self, order: &QuoteRequest) -> Result<u64> {
        let params = SendOrderParams {
            symbol: &order.symbol,
            order_type: order.order_type.as_str(),
            order_price: order.price,
            order_quantity: order.quantity,
            side: order.side.as_str(),
        };

        let response: SendOrderResponse = self
            .execute(self.http.post(self.url("/v1/order")).form(&params))
            .await?;
        ensure_success(response.success, "send order")?;

        Ok(response.order_id)
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let response: StatusResponse = self
            .execute(
                self.http
                    .delete(self.url("/v1/orders"))
                    .query(&[("symbol", symbol)]),
            )
            .await?;
        ensure_success(response.success, "cancel orders")?;

        debug!(symbol = %symbol, status = %response.status, "Cancelled resting orders");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::OrderSide;
    use crate::quoting::OrderType;
    use rust_decimal_macros::dec;

    #[test]
    fn test_base_url_is_normalized() {
        let client = WooRestClient::new("https://api.woo.org/", 50);
        assert_eq!(client.url("/v3/positions"), "https://api.woo.org/v3/positions");
    }

    #[test]
    fn test_order_form_fields() {
        let order = QuoteRequest {
            symbol: "PERP_BTC_USDT".to_string(),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            price: dec!(101.20),
            quantity: dec!(0.001),
        };
        let params = SendOrderParams {
            symbol: &order.symbol,
            order_type: order.order_type.as_str(),
            order_price: order.price,
            order_quantity: order.quantity,
            side: order.side.as_str(),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["order_type"], "LIMIT");
        assert_eq!(json["side"], "SELL");
        assert_eq!(json["order_price"], "101.20");
    }

    #[test]
    fn test_ensure_success() {
        assert!(ensure_success(true, "x").is_ok());
        assert!(matches!(
            ensure_success(false, "x"),
            Err(MarketMakerError::RestApiError(_))
        ));
    }
}
