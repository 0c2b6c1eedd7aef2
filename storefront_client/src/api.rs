use std::sync::Arc;

use checkout_engine::{
    order_types::{
        CartLine,
        CartLineId,
        CheckoutReceipt,
        CheckoutRequest,
        Order,
        OrderId,
        OrderPage,
        OrderStatus,
        ShopCart,
        ShopId,
        SkuId,
    },
    GatewayError,
    StorefrontGateway,
};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::StorefrontConfig,
    data_objects::{AddCartLineRequest, DeleteCartLinesRequest, SetOrderStatusRequest, UpdateCartLineRequest},
    error::StorefrontApiError,
};

/// JSON client for the storefront REST API. Cloning is cheap; the underlying connection pool is shared.
#[derive(Clone)]
pub struct StorefrontApi {
    config: StorefrontConfig,
    client: Arc<Client>,
}

impl StorefrontApi {
    pub fn new(config: StorefrontConfig) -> Result<Self, StorefrontApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let token = config.access_token.reveal();
        if !token.is_empty() {
            let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| StorefrontApiError::Initialization(e.to_string()))?;
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);
        }
        let client = Client::builder()
            .user_agent("Multi-Shop Checkout Client")
            .default_headers(headers)
            .build()
            .map_err(|e| StorefrontApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    fn url(&self, path: &str) -> Result<reqwest::Url, StorefrontApiError> {
        self.config.base_url.join(path).map_err(|e| StorefrontApiError::RestRequestError(e.to_string()))
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, StorefrontApiError> {
        let url = self.url(path)?;
        trace!("Sending REST query: {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| StorefrontApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| StorefrontApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| StorefrontApiError::RestResponseError(e.to_string()))?;
            Err(StorefrontApiError::QueryError { status, message })
        }
    }

    /// Like [`Self::rest_query`], but for endpoints whose success response carries no body worth parsing.
    pub async fn rest_call<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<(), StorefrontApiError> {
        let url = self.url(path)?;
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| StorefrontApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| StorefrontApiError::RestResponseError(e.to_string()))?;
            Err(StorefrontApiError::QueryError { status, message })
        }
    }

    pub async fn get_cart(&self) -> Result<Vec<ShopCart>, StorefrontApiError> {
        let cart = self.rest_query::<Vec<ShopCart>, ()>(Method::GET, "cart", &[], None).await?;
        debug!("Fetched cart with {} shops", cart.len());
        Ok(cart)
    }

    pub async fn add_item(&self, sku_id: SkuId, quantity: u32) -> Result<CartLine, StorefrontApiError> {
        let body = AddCartLineRequest { sku_id, quantity };
        let line = self.rest_query::<CartLine, _>(Method::POST, "cart", &[], Some(body)).await?;
        info!("Added cart line {} for SKU {sku_id}", line.id);
        Ok(line)
    }

    pub async fn update_item(
        &self,
        id: CartLineId,
        sku_id: SkuId,
        quantity: u32,
    ) -> Result<(), StorefrontApiError> {
        let body = UpdateCartLineRequest { sku_id, quantity };
        self.rest_call(Method::PUT, &format!("cart/{}", id.value()), Some(body)).await?;
        debug!("Updated cart line {id} to quantity {quantity}");
        Ok(())
    }

    pub async fn delete_items(&self, ids: &[CartLineId]) -> Result<(), StorefrontApiError> {
        let body = DeleteCartLinesRequest { cart_item_ids: ids.to_vec() };
        self.rest_call(Method::POST, "cart/delete", Some(body)).await?;
        info!("Deleted {} cart lines", ids.len());
        Ok(())
    }

    /// Submit a whole checkout as one batch. The storefront creates one order per request element, all stamped with
    /// one shared payment id, or rejects the batch as a whole.
    pub async fn checkout(&self, requests: &[CheckoutRequest]) -> Result<CheckoutReceipt, StorefrontApiError> {
        let receipt = self.rest_query::<CheckoutReceipt, _>(Method::POST, "orders", &[], Some(requests)).await?;
        info!("Checkout created {} orders under payment {}", receipt.orders.len(), receipt.payment_id);
        Ok(receipt)
    }

    pub async fn orders_page(&self, page: u32, limit: u32) -> Result<OrderPage, StorefrontApiError> {
        let (page, limit) = (page.to_string(), limit.to_string());
        let params = [("page", page.as_str()), ("limit", limit.as_str())];
        self.rest_query::<OrderPage, ()>(Method::GET, "orders/manage", &params, None).await
    }

    pub async fn order_by_id(&self, id: OrderId) -> Result<Order, StorefrontApiError> {
        self.rest_query::<Order, ()>(Method::GET, &format!("orders/{}", id.value()), &[], None).await
    }

    pub async fn cancel_order_by_id(&self, id: OrderId) -> Result<Order, StorefrontApiError> {
        let order =
            self.rest_query::<Order, ()>(Method::POST, &format!("orders/{}/cancel", id.value()), &[], None).await?;
        info!("Cancelled order {id}");
        Ok(order)
    }

    pub async fn change_order_status(
        &self,
        shop_id: ShopId,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, StorefrontApiError> {
        let path = format!("shops/{}/orders/{}/status", shop_id.value(), id.value());
        let body = SetOrderStatusRequest { status };
        let order = self.rest_query::<Order, _>(Method::PATCH, &path, &[], Some(body)).await?;
        info!("Order {id} moved to {status}");
        Ok(order)
    }
}

impl StorefrontGateway for StorefrontApi {
    async fn fetch_cart(&self) -> Result<Vec<ShopCart>, GatewayError> {
        Ok(self.get_cart().await?)
    }

    async fn add_cart_line(&self, sku_id: SkuId, quantity: u32) -> Result<CartLine, GatewayError> {
        Ok(self.add_item(sku_id, quantity).await?)
    }

    async fn update_cart_line(&self, id: CartLineId, sku_id: SkuId, quantity: u32) -> Result<(), GatewayError> {
        Ok(self.update_item(id, sku_id, quantity).await?)
    }

    async fn delete_cart_lines(&self, ids: &[CartLineId]) -> Result<(), GatewayError> {
        Ok(self.delete_items(ids).await?)
    }

    async fn submit_checkout(&self, requests: &[CheckoutRequest]) -> Result<CheckoutReceipt, GatewayError> {
        Ok(self.checkout(requests).await?)
    }

    async fn fetch_orders(&self, page: u32, limit: u32) -> Result<OrderPage, GatewayError> {
        Ok(self.orders_page(page, limit).await?)
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Order, GatewayError> {
        match self.order_by_id(id).await {
            Ok(order) => Ok(order),
            Err(StorefrontApiError::QueryError { status: 404, .. }) => Err(GatewayError::OrderNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel_order(&self, id: OrderId) -> Result<Order, GatewayError> {
        match self.cancel_order_by_id(id).await {
            Ok(order) => Ok(order),
            Err(StorefrontApiError::QueryError { status: 404, .. }) => Err(GatewayError::OrderNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_order_status(
        &self,
        shop_id: ShopId,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, GatewayError> {
        Ok(self.change_order_status(shop_id, id, status).await?)
    }
}
