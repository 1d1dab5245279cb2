//! Orchestrator table operations
//!
//! One row per registered orchestrator, keyed by registry address. Rows are
//! created on registry import and never deleted here; the registry stays
//! authoritative for membership. Prices mutate through [`OrchestratorStore::update_price`]
//! as probe passes observe fresh quotes.

use crate::net::OrchAddress;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Persisted orchestrator record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchRecord {
    pub address: OrchAddress,
    /// Service URI as imported from the registry. May be syntactically
    /// invalid; such rows are retained but never probed.
    pub service_uri: String,
    /// Fixed-point price; 0 means "not yet probed".
    pub price_per_pixel: i64,
    pub activation_round: i64,
    pub deactivation_round: i64,
    pub stake: i64,
    pub updated_at: DateTime<Utc>,
}

/// Optional row filter for [`OrchestratorStore::select`].
#[derive(Debug, Clone, Default)]
pub struct OrchFilter {
    /// Keep rows whose `[activation_round, deactivation_round)` window
    /// contains this round.
    pub current_round: Option<i64>,
    /// Keep rows with `0 < price_per_pixel <= max_price` (fixed-point).
    pub max_price: Option<i64>,
    /// Keep rows refreshed at or after this instant.
    pub updated_since: Option<DateTime<Utc>>,
}

/// Handle to the orchestrators table.
#[derive(Clone)]
pub struct OrchestratorStore {
    db: SqlitePool,
}

type OrchRow = (String, String, i64, i64, i64, i64, DateTime<Utc>);

impl OrchestratorStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// In-memory store with the schema applied; used by tests and
    /// ephemeral broadcasters.
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(crate::db::init_database_in_memory().await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Insert or overwrite a record by address.
    ///
    /// A zero `price_per_pixel` in the input leaves any stored price
    /// untouched, so a registry re-import does not clobber probe-derived
    /// prices.
    pub async fn upsert(&self, rec: &OrchRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orchestrators
                (address, service_uri, price_per_pixel, activation_round, deactivation_round, stake, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(address) DO UPDATE SET
                service_uri = excluded.service_uri,
                price_per_pixel = CASE
                    WHEN excluded.price_per_pixel = 0 THEN orchestrators.price_per_pixel
                    ELSE excluded.price_per_pixel
                END,
                activation_round = excluded.activation_round,
                deactivation_round = excluded.deactivation_round,
                stake = excluded.stake,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(rec.address.to_hex())
        .bind(&rec.service_uri)
        .bind(rec.price_per_pixel)
        .bind(rec.activation_round)
        .bind(rec.deactivation_round)
        .bind(rec.stake)
        .bind(rec.updated_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Filtered row query, ordered by descending stake then ascending
    /// address for deterministic output.
    pub async fn select(&self, filter: Option<&OrchFilter>) -> Result<Vec<OrchRecord>> {
        let mut sql = String::from(
            "SELECT address, service_uri, price_per_pixel, activation_round, \
             deactivation_round, stake, updated_at FROM orchestrators",
        );

        let filter = filter.cloned().unwrap_or_default();
        let mut clauses: Vec<&str> = Vec::new();
        if filter.current_round.is_some() {
            clauses.push("activation_round <= ? AND deactivation_round > ?");
        }
        if filter.max_price.is_some() {
            clauses.push("price_per_pixel > 0 AND price_per_pixel <= ?");
        }
        if filter.updated_since.is_some() {
            clauses.push("updated_at >= ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY stake DESC, address ASC");

        let mut query = sqlx::query_as::<_, OrchRow>(&sql);
        if let Some(round) = filter.current_round {
            query = query.bind(round).bind(round);
        }
        if let Some(max_price) = filter.max_price {
            query = query.bind(max_price);
        }
        if let Some(since) = filter.updated_since {
            query = query.bind(since);
        }

        let rows = query.fetch_all(&self.db).await?;
        rows.into_iter().map(row_to_record).collect()
    }

    /// Overwrite a row's price and freshness stamp. Single statement, so
    /// concurrent selects see either the old or the new price.
    pub async fn update_price(
        &self,
        address: &OrchAddress,
        price_per_pixel: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE orchestrators SET price_per_pixel = ?, updated_at = ? WHERE address = ?",
        )
        .bind(price_per_pixel)
        .bind(updated_at)
        .bind(address.to_hex())
        .execute(&self.db)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("orchestrator {address}")));
        }
        Ok(())
    }

    /// Total row count, filters ignored.
    pub async fn row_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orchestrators")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

fn row_to_record(row: OrchRow) -> Result<OrchRecord> {
    let (address, service_uri, price_per_pixel, activation_round, deactivation_round, stake, updated_at) =
        row;
    Ok(OrchRecord {
        address: OrchAddress::from_hex(&address)?,
        service_uri,
        price_per_pixel,
        activation_round,
        deactivation_round,
        stake,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u64, uri: &str, price: i64) -> OrchRecord {
        OrchRecord {
            address: OrchAddress::from_low_u64(n),
            service_uri: uri.to_string(),
            price_per_pixel: price,
            activation_round: 0,
            deactivation_round: i64::MAX,
            stake: 0,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_address() {
        let store = OrchestratorStore::open_in_memory().await.unwrap();

        store.upsert(&record(1, "https://127.0.0.1:8936", 5)).await.unwrap();
        store.upsert(&record(1, "https://127.0.0.1:9999", 7)).await.unwrap();

        let rows = store.select(None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].service_uri, "https://127.0.0.1:9999");
        assert_eq!(rows[0].price_per_pixel, 7);
    }

    #[tokio::test]
    async fn test_upsert_price_zero_preserves_existing_price() {
        let store = OrchestratorStore::open_in_memory().await.unwrap();

        store.upsert(&record(1, "https://127.0.0.1:8936", 999)).await.unwrap();
        // Registry re-import carries no price.
        store.upsert(&record(1, "https://127.0.0.1:8936", 0)).await.unwrap();

        let rows = store.select(None).await.unwrap();
        assert_eq!(rows[0].price_per_pixel, 999);
    }

    #[tokio::test]
    async fn test_select_active_round_window() {
        let store = OrchestratorStore::open_in_memory().await.unwrap();

        let mut rec = record(1, "https://127.0.0.1:8936", 1);
        rec.activation_round = 10;
        rec.deactivation_round = 20;
        store.upsert(&rec).await.unwrap();

        let at = |round| OrchFilter {
            current_round: Some(round),
            ..Default::default()
        };
        assert!(store.select(Some(&at(9))).await.unwrap().is_empty());
        assert_eq!(store.select(Some(&at(10))).await.unwrap().len(), 1);
        assert_eq!(store.select(Some(&at(19))).await.unwrap().len(), 1);
        // Deactivation round is exclusive.
        assert!(store.select(Some(&at(20))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_max_price_drops_unpriced_rows() {
        let store = OrchestratorStore::open_in_memory().await.unwrap();

        store.upsert(&record(1, "https://127.0.0.1:8936", 0)).await.unwrap();
        store.upsert(&record(2, "https://127.0.0.1:8937", 500)).await.unwrap();
        store.upsert(&record(3, "https://127.0.0.1:8938", 2000)).await.unwrap();

        let filter = OrchFilter {
            max_price: Some(1000),
            ..Default::default()
        };
        let rows = store.select(Some(&filter)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address, OrchAddress::from_low_u64(2));

        // Without a ceiling, unprobed rows are kept.
        assert_eq!(store.select(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_select_orders_by_stake_then_address() {
        let store = OrchestratorStore::open_in_memory().await.unwrap();

        let mut a = record(2, "https://127.0.0.1:8936", 1);
        a.stake = 50;
        let mut b = record(1, "https://127.0.0.1:8937", 1);
        b.stake = 50;
        let mut c = record(3, "https://127.0.0.1:8938", 1);
        c.stake = 100;
        for rec in [&a, &b, &c] {
            store.upsert(rec).await.unwrap();
        }

        let rows = store.select(None).await.unwrap();
        let addrs: Vec<_> = rows.iter().map(|r| r.address).collect();
        assert_eq!(
            addrs,
            vec![
                OrchAddress::from_low_u64(3),
                OrchAddress::from_low_u64(1),
                OrchAddress::from_low_u64(2),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_price() {
        let store = OrchestratorStore::open_in_memory().await.unwrap();
        store.upsert(&record(1, "https://127.0.0.1:8936", 999)).await.unwrap();

        let stamp = Utc::now();
        store
            .update_price(&OrchAddress::from_low_u64(1), 1000, stamp)
            .await
            .unwrap();

        let rows = store.select(None).await.unwrap();
        assert_eq!(rows[0].price_per_pixel, 1000);
        let drift = (rows[0].updated_at - stamp).num_milliseconds().abs();
        assert!(drift < 1000, "updated_at drifted {drift}ms through the store");

        // Unknown address is an error.
        let missing = store
            .update_price(&OrchAddress::from_low_u64(42), 1, stamp)
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_select_updated_since() {
        let store = OrchestratorStore::open_in_memory().await.unwrap();

        let mut stale = record(1, "https://127.0.0.1:8936", 1);
        stale.updated_at = Utc::now() - chrono::Duration::hours(2);
        store.upsert(&stale).await.unwrap();
        store.upsert(&record(2, "https://127.0.0.1:8937", 1)).await.unwrap();

        let filter = OrchFilter {
            updated_since: Some(Utc::now() - chrono::Duration::hours(1)),
            ..Default::default()
        };
        let rows = store.select(Some(&filter)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address, OrchAddress::from_low_u64(2));
    }
}
