use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{
        AdminTransactionView, BankDetails, ItemView, LineItem, OfflinePaymentResponse,
        TransactionView, UpdateStatusResponse,
    },
    repo,
    repo_types::{NewItem, PaymentMethod, TransactionItem, TransactionRow, TransactionStatus},
};
use crate::{config::BankConfig, error::AppError};

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const UNKNOWN_OWNER: &str = "Unknown";
/// Largest value a `NUMERIC(12,2)` column holds, in minor units.
const MAX_MINOR_UNITS: i64 = 999_999_999_999;
const MAX_QUANTITY: i64 = 10_000;

/// Snapshot cart lines as ledger items. Prices arrive in minor units.
pub(crate) fn prepare_items(line_items: &[LineItem]) -> Result<Vec<NewItem>, AppError> {
    if line_items.is_empty() {
        return Err(AppError::Validation("lineItems must not be empty".into()));
    }
    line_items
        .iter()
        .map(|li| {
            if !(0..=MAX_MINOR_UNITS).contains(&li.price_data.unit_amount) {
                return Err(AppError::Validation(format!(
                    "unit_amount must be between 0 and {MAX_MINOR_UNITS}"
                )));
            }
            if !(1..=MAX_QUANTITY).contains(&li.quantity) {
                return Err(AppError::Validation(format!(
                    "quantity must be between 1 and {MAX_QUANTITY}"
                )));
            }
            let quantity = li.quantity as i32;
            let product_name = li
                .price_data
                .product_data
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or("Unknown Product")
                .to_string();
            Ok(NewItem {
                product_name,
                product_price: Decimal::new(li.price_data.unit_amount, 2),
                quantity,
            })
        })
        .collect()
}

/// Σ price × quantity, bounded by what the amount column stores.
pub(crate) fn compute_total(items: &[NewItem]) -> Result<Decimal, AppError> {
    let too_large = || AppError::Validation("order total is too large".into());
    let max = Decimal::new(MAX_MINOR_UNITS, 2);
    let total = items.iter().try_fold(Decimal::ZERO, |acc, i| {
        i.product_price
            .checked_mul(Decimal::from(i.quantity))
            .and_then(|line| acc.checked_add(line))
            .filter(|sum| *sum <= max)
            .ok_or_else(too_large)
    })?;
    Ok(total)
}

/// `PAYMENT-` followed by eight random uppercase hex digits.
pub(crate) fn new_transfer_title() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("PAYMENT-{}", id[..8].to_uppercase())
}

pub(crate) fn format_timestamp(ts: OffsetDateTime) -> Result<String, AppError> {
    ts.format(TIMESTAMP_FORMAT)
        .map_err(|e| AppError::Internal(e.into()))
}

fn to_view(row: TransactionRow, items: Vec<ItemView>) -> Result<TransactionView, AppError> {
    Ok(TransactionView {
        id: row.id,
        amount: row.amount,
        payment_method: match row.payment_method.as_str() {
            "card" => PaymentMethod::Card,
            _ => PaymentMethod::Offline,
        },
        status: row
            .status
            .parse()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("stored status {:?}", row.status)))?,
        created_at: format_timestamp(row.created_at)?,
        transfer_title: row.transfer_title,
        items,
    })
}

fn group_items(items: Vec<TransactionItem>) -> HashMap<Uuid, Vec<ItemView>> {
    let mut grouped: HashMap<Uuid, Vec<ItemView>> = HashMap::new();
    for item in items {
        grouped.entry(item.transaction_id).or_default().push(ItemView {
            id: item.id,
            product_name: item.product_name,
            product_price: item.product_price,
            quantity: item.quantity,
        });
    }
    grouped
}

async fn persist_offline(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: Decimal,
    transfer_title: &str,
    items: &[NewItem],
) -> anyhow::Result<TransactionRow> {
    let row = repo::insert_transaction_tx(
        tx,
        user_id,
        amount,
        PaymentMethod::Offline,
        Some(transfer_title),
    )
    .await?;
    for item in items {
        repo::insert_item_tx(tx, row.id, item).await?;
    }
    Ok(row)
}

/// Record a pending bank-transfer order with its items, all or nothing.
pub async fn create_offline_transaction(
    db: &PgPool,
    bank: &BankConfig,
    user_id: Uuid,
    line_items: &[LineItem],
) -> Result<OfflinePaymentResponse, AppError> {
    let items = prepare_items(line_items)?;
    let amount = compute_total(&items)?;
    let transfer_title = new_transfer_title();

    let mut tx = db
        .begin()
        .await
        .map_err(|e| AppError::Transaction(format!("begin: {e}")))?;

    let row = match persist_offline(&mut tx, user_id, amount, &transfer_title, &items).await {
        Ok(row) => row,
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                warn!(error = %rb, "rollback failed");
            }
            return Err(AppError::Transaction(format!("{e:#}")));
        }
    };
    tx.commit()
        .await
        .map_err(|e| AppError::Transaction(format!("commit: {e}")))?;

    info!(
        transaction_id = %row.id,
        %user_id,
        %amount,
        items = items.len(),
        transfer_title = %transfer_title,
        "offline transaction created"
    );

    Ok(OfflinePaymentResponse {
        message: "Offline payment created".into(),
        transaction_id: row.id,
        transfer_title: transfer_title.clone(),
        amount,
        bank_details: BankDetails {
            account_number: bank.account_number.clone(),
            bank_name: bank.bank_name.clone(),
            recipient: bank.recipient.clone(),
            transfer_title,
        },
    })
}

pub async fn list_user_transactions(
    db: &PgPool,
    user_id: Uuid,
) -> Result<Vec<TransactionView>, AppError> {
    let rows = repo::list_by_user(db, user_id).await?;
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut items = group_items(repo::items_for(db, &ids).await?);
    rows.into_iter()
        .map(|row| {
            let row_items = items.remove(&row.id).unwrap_or_default();
            to_view(row, row_items)
        })
        .collect()
}

pub async fn list_all_transactions(db: &PgPool) -> Result<Vec<AdminTransactionView>, AppError> {
    let rows = repo::list_all_with_owner(db).await?;
    let ids: Vec<Uuid> = rows.iter().map(|r| r.transaction.id).collect();
    let mut items = group_items(repo::items_for(db, &ids).await?);
    rows.into_iter()
        .map(|owned| {
            let row_items = items.remove(&owned.transaction.id).unwrap_or_default();
            Ok(AdminTransactionView {
                user_id: owned.transaction.user_id,
                username: owned.username.unwrap_or_else(|| UNKNOWN_OWNER.into()),
                email: owned.email.unwrap_or_else(|| UNKNOWN_OWNER.into()),
                transaction: to_view(owned.transaction, row_items)?,
            })
        })
        .collect()
}

/// Admin status change. The status is validated before anything is read.
pub async fn update_transaction_status(
    db: &PgPool,
    transaction_id: Uuid,
    status: &str,
) -> Result<UpdateStatusResponse, AppError> {
    let status: TransactionStatus = status.parse().map_err(|_| AppError::InvalidStatus)?;

    let mut tx = db
        .begin()
        .await
        .map_err(|e| AppError::Transaction(format!("begin: {e}")))?;

    let updated = match repo::update_status_tx(&mut tx, transaction_id, status).await {
        Ok(row) => row,
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                warn!(error = %rb, "rollback failed");
            }
            return Err(AppError::Transaction(format!("{e:#}")));
        }
    };
    let Some(row) = updated else {
        tx.rollback()
            .await
            .map_err(|e| AppError::Transaction(format!("rollback: {e}")))?;
        return Err(AppError::NotFound("Transaction"));
    };
    tx.commit()
        .await
        .map_err(|e| AppError::Transaction(format!("commit: {e}")))?;

    info!(transaction_id = %row.id, status = %status, "transaction status updated");
    Ok(UpdateStatusResponse {
        message: format!("Transaction status updated to {status}"),
        transaction_id: row.id,
        status,
    })
}
