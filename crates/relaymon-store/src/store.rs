use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};

use crate::error::StoreResult;
use relaymon_types::{ConnectionId, UserId, UserLimit};

/// Statements held back from a connection for longer than this are
/// abandoned server-side, so a stalled store cannot stall the event path.
const STATEMENT_TIMEOUT_MS: u64 = 5_000;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 5;

/// Operations the monitor issues against the shared relational store.
///
/// The trait exists so the tracker and maintenance jobs can be exercised
/// against a recording mock; `PgStore` is the only production impl.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// All active users' enforced connection caps. Users whose configured
    /// cap is not a positive number are omitted (their connections are not
    /// limited).
    async fn active_user_limits(&self) -> StoreResult<Vec<UserLimit>>;

    /// Resolve a domain name to the owning user, if any.
    async fn user_id_for_domain(&self, domain: &str) -> StoreResult<Option<UserId>>;

    /// Record a newly observed connection; returns the store-assigned id.
    async fn create_connection(&self, user: UserId, peer_ip: IpAddr) -> StoreResult<ConnectionId>;

    /// Stamp a connection record as disconnected. Updating a record that
    /// no longer exists (e.g. already swept) is a no-op, not an error.
    async fn mark_disconnected(&self, id: ConnectionId) -> StoreResult<()>;

    /// Add byte deltas to a connection record's cumulative counters.
    async fn add_bandwidth(&self, id: ConnectionId, sent: i64, received: i64) -> StoreResult<()>;

    /// Delete every connection record, open or closed, whose connected
    /// timestamp is older than the cutoff. Returns the number removed.
    async fn delete_connections_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Connection settings for the shared PostgreSQL store.
#[derive(Clone, Debug)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "relay".to_string(),
            password: "relay123".to_string(),
            database: "relaydb".to_string(),
        }
    }
}

/// PostgreSQL-backed persistence gateway.
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    /// Open a bounded connection pool against the configured database.
    pub async fn connect(settings: &DbSettings) -> StoreResult<Self> {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database)
            .options([("statement_timeout", STATEMENT_TIMEOUT_MS.to_string())]);

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Startup connectivity probe. The monitor treats a failure here as
    /// its only fatal condition.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Idempotent bootstrap of the relations the monitor shares with the
    /// management API. Most columns of `users` belong to the provisioning
    /// surface; the monitor only reads id, domain, limit_conn, is_active.
    pub async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                domain VARCHAR(255) NOT NULL,
                port INTEGER NOT NULL DEFAULT 443,
                password VARCHAR(255) NOT NULL,
                obfs VARCHAR(50) NOT NULL DEFAULT 'salamander',
                package_name VARCHAR(50) NOT NULL DEFAULT 'basic',
                expired_at TIMESTAMPTZ,
                limit_conn INTEGER NOT NULL DEFAULT 1,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS connections (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT REFERENCES users(id) ON DELETE CASCADE,
                ip_address VARCHAR(45),
                connected_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                disconnected_at TIMESTAMPTZ,
                bytes_sent BIGINT NOT NULL DEFAULT 0,
                bytes_received BIGINT NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_connections_user ON connections(user_id)")
            .execute(&self.pool)
            .await?;

        // The retention sweep filters on connected_at.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_connections_connected_at \
             ON connections(connected_at)",
        )
        .execute(&self.pool)
        .await?;

        tracing::debug!("database schema ensured");
        Ok(())
    }
}

#[async_trait]
impl ConnectionStore for PgStore {
    async fn active_user_limits(&self) -> StoreResult<Vec<UserLimit>> {
        let rows: Vec<(i64, i32)> =
            sqlx::query_as("SELECT id, limit_conn FROM users WHERE is_active = TRUE")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter(|(_, limit)| *limit > 0)
            .map(|(id, limit)| UserLimit::new(UserId(id), limit as u32))
            .collect())
    }

    async fn user_id_for_domain(&self, domain: &str) -> StoreResult<Option<UserId>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE domain = $1 LIMIT 1")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id.map(UserId))
    }

    async fn create_connection(&self, user: UserId, peer_ip: IpAddr) -> StoreResult<ConnectionId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO connections (user_id, ip_address, connected_at) \
             VALUES ($1, $2, NOW()) RETURNING id",
        )
        .bind(user.0)
        .bind(peer_ip.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(ConnectionId(id))
    }

    async fn mark_disconnected(&self, id: ConnectionId) -> StoreResult<()> {
        sqlx::query("UPDATE connections SET disconnected_at = NOW() WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_bandwidth(&self, id: ConnectionId, sent: i64, received: i64) -> StoreResult<()> {
        sqlx::query(
            "UPDATE connections SET bytes_sent = bytes_sent + $1, \
             bytes_received = bytes_received + $2 WHERE id = $3",
        )
        .bind(sent)
        .bind(received)
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_connections_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM connections WHERE connected_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
