use checkout_engine::order_types::{CartLineId, OrderStatus, SkuId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartLineRequest {
    pub sku_id: SkuId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartLineRequest {
    pub sku_id: SkuId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCartLinesRequest {
    pub cart_item_ids: Vec<CartLineId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOrderStatusRequest {
    pub status: OrderStatus,
}
