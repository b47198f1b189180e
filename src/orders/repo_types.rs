use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Offline,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Offline => "offline",
            PaymentMethod::Card => "card",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised for any status string outside the three known ones.
#[derive(Debug, PartialEq, Eq)]
pub struct UnknownStatus;

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "approved" => Ok(TransactionStatus::Approved),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            _ => Err(UnknownStatus),
        }
    }
}

/// `transactions` row.
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub status: String,
    pub transfer_title: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// `transactions` row joined with its owner, who may be gone.
#[derive(Debug, Clone, FromRow)]
pub struct OwnedTransactionRow {
    #[sqlx(flatten)]
    pub transaction: TransactionRow,
    pub username: Option<String>,
    pub email: Option<String>,
}

/// `transaction_items` row.
#[derive(Debug, Clone, FromRow)]
pub struct TransactionItem {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub product_name: String,
    pub product_price: Decimal,
    pub quantity: i32,
}

/// Line to insert alongside a new transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub product_name: String,
    pub product_price: Decimal,
    pub quantity: i32,
}
