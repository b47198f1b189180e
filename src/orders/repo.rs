use anyhow::Context;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::repo_types::{
    NewItem, OwnedTransactionRow, PaymentMethod, TransactionItem, TransactionRow,
    TransactionStatus,
};

/// Insert a transaction header within a database transaction.
pub async fn insert_transaction_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: Decimal,
    payment_method: PaymentMethod,
    transfer_title: Option<&str>,
) -> anyhow::Result<TransactionRow> {
    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO transactions (user_id, amount, payment_method, status, transfer_title)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, amount, payment_method, status, transfer_title, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(payment_method.as_str())
    .bind(TransactionStatus::Pending.as_str())
    .bind(transfer_title)
    .fetch_one(&mut **tx)
    .await
    .context("insert transaction")?;
    Ok(row)
}

/// Insert one line item within a database transaction.
pub async fn insert_item_tx(
    tx: &mut Transaction<'_, Postgres>,
    transaction_id: Uuid,
    item: &NewItem,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO transaction_items (transaction_id, product_name, product_price, quantity)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(transaction_id)
    .bind(&item.product_name)
    .bind(item.product_price)
    .bind(item.quantity)
    .execute(&mut **tx)
    .await
    .context("insert transaction item")?;
    Ok(())
}

// ---- Queries ----

/// Transactions owned by `user_id`, newest first.
pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<TransactionRow>> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT id, user_id, amount, payment_method, status, transfer_title, created_at, updated_at
          FROM transactions
         WHERE user_id = $1
         ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list transactions by user")?;
    Ok(rows)
}

/// Every transaction with its owner's name and email, newest first.
pub async fn list_all_with_owner(db: &PgPool) -> anyhow::Result<Vec<OwnedTransactionRow>> {
    let rows = sqlx::query_as::<_, OwnedTransactionRow>(
        r#"
        SELECT t.id, t.user_id, t.amount, t.payment_method, t.status, t.transfer_title,
               t.created_at, t.updated_at, u.username, u.email
          FROM transactions t
          LEFT JOIN users u ON u.id = t.user_id
         ORDER BY t.created_at DESC
        "#,
    )
    .fetch_all(db)
    .await
    .context("list all transactions")?;
    Ok(rows)
}

/// Items of the given transactions.
pub async fn items_for(db: &PgPool, transaction_ids: &[Uuid]) -> anyhow::Result<Vec<TransactionItem>> {
    if transaction_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, TransactionItem>(
        r#"
        SELECT id, transaction_id, product_name, product_price, quantity
          FROM transaction_items
         WHERE transaction_id = ANY($1)
         ORDER BY product_name ASC, id ASC
        "#,
    )
    .bind(transaction_ids.to_vec())
    .fetch_all(db)
    .await
    .context("list transaction items")?;
    Ok(rows)
}

/// Set the status and bump `updated_at`. `None` when the id is unknown.
pub async fn update_status_tx(
    tx: &mut Transaction<'_, Postgres>,
    transaction_id: Uuid,
    status: TransactionStatus,
) -> anyhow::Result<Option<TransactionRow>> {
    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        UPDATE transactions
           SET status = $2, updated_at = now()
         WHERE id = $1
        RETURNING id, user_id, amount, payment_method, status, transfer_title, created_at, updated_at
        "#,
    )
    .bind(transaction_id)
    .bind(status.as_str())
    .fetch_optional(&mut **tx)
    .await
    .context("update transaction status")?;
    Ok(row)
}
