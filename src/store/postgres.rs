// src/store/postgres.rs
//! PostgreSQL observation store backed by an `sqlx` pool.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

use super::{DateFilter, InsertOutcome, ObservationStore, StoreError};
use crate::model::{LowestPrice, Observation, PriceKey, StoredObservation};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
      id         bigserial PRIMARY KEY,
      title      varchar(255) NOT NULL,
      price      numeric NOT NULL CHECK (price >= 0),
      per        varchar(25),
      url        text,
      image_url  text,
      date       date NOT NULL,
      vendor     varchar(50) NOT NULL,
      CONSTRAINT uq_items_title_date UNIQUE (title, date)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_items_title ON items (title)",
    "CREATE INDEX IF NOT EXISTS idx_items_date ON items (date DESC)",
];

const INSERT_SQL: &str = r#"
    INSERT INTO items (title, price, per, url, image_url, date, vendor)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (title, date) DO NOTHING
"#;

// DISTINCT ON keeps the first row per group, i.e. the cheapest; ties go to the latest date.
const LOWEST_SQL: &str = r#"
    SELECT DISTINCT ON (title, per, vendor) title, per, vendor, price, url
    FROM items
    ORDER BY title, per, vendor, price ASC, date DESC
"#;

const SELECT_COLUMNS: &str = "id, title, price, per, url, image_url, date, vendor";

pub struct PgObservationStore {
    conn_str: String,
    pool: RwLock<PgPool>,
}

impl PgObservationStore {
    /// Connect and make sure the `items` table exists.
    pub async fn connect(conn_str: &str) -> Result<Self, StoreError> {
        let pool = open_pool(conn_str).await?;
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await.map_err(classify)?;
        }
        tracing::info!("observation store ready");
        Ok(Self {
            conn_str: conn_str.to_string(),
            pool: RwLock::new(pool),
        })
    }

    fn pool(&self) -> PgPool {
        self.pool.read().clone()
    }
}

async fn open_pool(conn_str: &str) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(5))
        .connect(conn_str)
        .await
        .map_err(classify)
}

/// Map an `sqlx` failure onto the store taxonomy.
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(e) => StoreError::Connection(e.to_string()),
        sqlx::Error::Tls(e) => StoreError::Connection(e.to_string()),
        sqlx::Error::Protocol(msg) => StoreError::Connection(msg),
        sqlx::Error::PoolTimedOut => StoreError::Connection("pool timed out".into()),
        sqlx::Error::PoolClosed => StoreError::Connection("pool closed".into()),
        sqlx::Error::WorkerCrashed => StoreError::Connection("connection worker crashed".into()),
        sqlx::Error::Database(db) => {
            // SQLSTATE class 08 and 57P0x: the server dropped or refused the session.
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            if code.starts_with("08") || code.starts_with("57P0") {
                StoreError::Connection(db.message().to_string())
            } else if db.is_unique_violation()
                || db.is_check_violation()
                || db.is_foreign_key_violation()
            {
                StoreError::Constraint(db.message().to_string())
            } else {
                StoreError::Database(db.message().to_string())
            }
        }
        e @ (sqlx::Error::RowNotFound
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::Encode(_)) => StoreError::Query(e.to_string()),
        other => StoreError::Unexpected(other.to_string()),
    }
}

fn row_to_observation(row: &PgRow) -> Result<StoredObservation, sqlx::Error> {
    Ok(StoredObservation {
        id: row.try_get("id")?,
        observation: Observation {
            title: row.try_get("title")?,
            price: row.try_get::<Decimal, _>("price")?,
            per: row.try_get("per")?,
            url: row.try_get("url")?,
            image_url: row.try_get("image_url")?,
            date: row.try_get::<NaiveDate, _>("date")?,
            vendor: row.try_get("vendor")?,
        },
    })
}

fn row_to_lowest(row: &PgRow) -> Result<LowestPrice, sqlx::Error> {
    Ok(LowestPrice {
        key: PriceKey {
            title: row.try_get("title")?,
            per: row.try_get("per")?,
            vendor: row.try_get("vendor")?,
        },
        price: row.try_get("price")?,
        url: row.try_get("url")?,
    })
}

#[async_trait]
impl ObservationStore for PgObservationStore {
    async fn insert(&self, o: &Observation) -> Result<InsertOutcome, StoreError> {
        let pool = self.pool();
        let mut tx = pool.begin().await.map_err(classify)?;

        let res = sqlx::query(INSERT_SQL)
            .bind(&o.title)
            .bind(o.price)
            .bind(&o.per)
            .bind(&o.url)
            .bind(&o.image_url)
            .bind(o.date)
            .bind(&o.vendor)
            .execute(&mut *tx)
            .await;

        match res {
            Ok(done) => {
                tx.commit().await.map_err(classify)?;
                if done.rows_affected() == 0 {
                    Ok(InsertOutcome::Duplicate)
                } else {
                    Ok(InsertOutcome::Inserted)
                }
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!(error = %rb, "rollback after failed insert did not complete");
                }
                Err(classify(e))
            }
        }
    }

    async fn lowest_prices(&self) -> Result<Vec<LowestPrice>, StoreError> {
        let rows = sqlx::query(LOWEST_SQL)
            .fetch_all(&self.pool())
            .await
            .map_err(classify)?;
        rows.iter()
            .map(row_to_lowest)
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)
    }

    async fn observations(&self, filter: DateFilter) -> Result<Vec<StoredObservation>, StoreError> {
        let pool = self.pool();
        let rows = match filter {
            DateFilter::All => {
                sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM items ORDER BY id"))
                    .fetch_all(&pool)
                    .await
            }
            DateFilter::On(day) => {
                sqlx::query(&format!(
                    "SELECT {SELECT_COLUMNS} FROM items WHERE date = $1 ORDER BY id"
                ))
                .bind(day)
                .fetch_all(&pool)
                .await
            }
            DateFilter::Since(floor) => {
                sqlx::query(&format!(
                    "SELECT {SELECT_COLUMNS} FROM items WHERE date >= $1 ORDER BY id"
                ))
                .bind(floor)
                .fetch_all(&pool)
                .await
            }
        }
        .map_err(classify)?;

        rows.iter()
            .map(row_to_observation)
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        let fresh = open_pool(&self.conn_str).await?;
        let old = std::mem::replace(&mut *self.pool.write(), fresh);
        tokio::spawn(async move { old.close().await });
        tracing::info!("observation store reconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ErrorKind;

    #[test]
    fn pool_failures_are_transient() {
        assert_eq!(classify(sqlx::Error::PoolTimedOut).kind(), ErrorKind::Transient);
        assert_eq!(classify(sqlx::Error::PoolClosed).kind(), ErrorKind::Transient);
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert_eq!(classify(sqlx::Error::Io(io)).kind(), ErrorKind::Transient);
    }

    #[test]
    fn decode_failures_are_not_retried() {
        assert_eq!(classify(sqlx::Error::RowNotFound).kind(), ErrorKind::NonRetryable);
        assert_eq!(
            classify(sqlx::Error::ColumnNotFound("price".into())).kind(),
            ErrorKind::NonRetryable
        );
    }
}
