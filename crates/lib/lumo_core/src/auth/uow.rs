//! Unit of work: one database transaction around multi-row mutations.

use std::future::Future;

use sqlx::{PgPool, Postgres, Transaction};

use super::AuthError;

/// Transaction handle passed through the unit of work.
pub type Tx = Transaction<'static, Postgres>;

/// Run `op` inside a transaction: commit on `Ok`, roll back on `Err`.
///
/// The closure owns the transaction and hands it back on success; on the
/// error path the handle is dropped inside the closure, which rolls the
/// transaction back — the same holds for a panic or a cancelled task, so
/// partial state is never observable.
///
/// Single-row writes don't need this; it exists for the operations that
/// mutate more than one row and must land together (confirm-and-issue,
/// refresh-and-rotate).
pub async fn in_transaction<T, F, Fut>(pool: &PgPool, op: F) -> Result<T, AuthError>
where
    F: FnOnce(Tx) -> Fut,
    Fut: Future<Output = Result<(Tx, T), AuthError>>,
{
    let tx = pool.begin().await?;
    let (tx, value) = op(tx).await?;
    tx.commit().await?;
    Ok(value)
}
