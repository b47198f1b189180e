use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{PaymentMethod, TransactionStatus};

/// Cart line in the payment processor's shape; prices in minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub price_data: PriceData,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceData {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub unit_amount: i64,
    #[serde(default)]
    pub product_data: ProductData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductData {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOfflinePaymentRequest {
    #[serde(default, rename = "lineItems")]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Serialize)]
pub struct BankDetails {
    pub account_number: String,
    pub bank_name: String,
    pub recipient: String,
    pub transfer_title: String,
}

#[derive(Debug, Serialize)]
pub struct OfflinePaymentResponse {
    pub message: String,
    pub transaction_id: Uuid,
    pub transfer_title: String,
    pub amount: Decimal,
    pub bank_details: BankDetails,
}

#[derive(Debug, Serialize)]
pub struct ItemView {
    pub id: Uuid,
    pub product_name: String,
    pub product_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub created_at: String,
    pub transfer_title: Option<String>,
    pub items: Vec<ItemView>,
}

/// Admin listing entry: the transaction plus who owns it.
#[derive(Debug, Serialize)]
pub struct AdminTransactionView {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(flatten)]
    pub transaction: TransactionView,
}

#[derive(Debug, Serialize)]
pub struct TransactionList<T> {
    pub transactions: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusResponse {
    pub message: String,
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
}
