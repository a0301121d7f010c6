//! Postgres-backed implementation of the credential store.
//!
//! # What this module is
//! Implements [`CredentialStore`] using Postgres (via `sqlx`) as the durable
//! home of client rows, live refresh credentials, the two append-only
//! revocation sets, and the append-only `token_log`.
//!
//! # Key invariants
//! - At most one unexpired refresh credential exists per client. Rotation
//!   takes a row lock on the owning `clients` row (`SELECT ... FOR UPDATE`) so
//!   concurrent issuances for the same client queue behind one another inside
//!   the database instead of both retiring the same row.
//! - Retire, insert, and audit writes share one transaction. A failure or a
//!   missed deadline drops the transaction, which rolls it back.
//! - `revoked_*` tables and `token_log` are insert-only.
//!
//! # Security notes
//! - Database URLs may contain credentials; avoid logging them.
//! - Only secret hashes are stored, never raw client secrets. Session tokens
//!   appear in `token_log` only as digests.
//!
//! # Operational notes
//! Migrations are executed at startup via `sqlx::migrate!("./migrations")`
//! so handlers can assume the schema exists.
use super::{CredentialStore, Deadline, Rotation, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::model::{
    AuditEvent, Client, Origin, REASON_CLIENT_REVOKED, REASON_ROTATION, RefreshCredential,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgConnection, PgPool};
use std::str::FromStr;
use std::time::Duration;

/// Durable credential store backed by Postgres.
///
/// # Example
/// ```rust,no_run
/// use tokend::config::PostgresConfig;
/// use tokend::store::postgres::PostgresStore;
///
/// async fn open(pg: PostgresConfig) {
///     let _ = PostgresStore::connect(&pg).await;
/// }
/// ```
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbClient {
    name: String,
    secret_hash: String,
    roles: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<DbClient> for Client {
    fn from(row: DbClient) -> Self {
        Client {
            name: row.name,
            secret_hash: row.secret_hash,
            roles: row.roles,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct DbRefreshToken {
    token: String,
    client_secret_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<DbRefreshToken> for RefreshCredential {
    fn from(row: DbRefreshToken) -> Self {
        RefreshCredential {
            token: row.token,
            client_secret_hash: row.client_secret_hash,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

impl PostgresStore {
    /// Connect to Postgres and run the embedded migrations.
    ///
    /// # Errors
    /// - Connection, migration, or pool setup failures.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        let store = Self::connect_without_migrations(pg).await?;
        sqlx::migrate!("./migrations").run(&store.pool).await?;
        Ok(store)
    }

    /// Connect without applying migrations, for callers that manage the
    /// schema themselves.
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        // `acquire_timeout` bounds how long a request waits for a pooled
        // connection; `connect_timeout_ms` bounds initial pool establishment.
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let connect = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), connect)
            .await
            .map_err(|_| StoreError::Unexpected(anyhow!("postgres connect timed out")))??;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn create_client_inner(&self, client: Client) -> StoreResult<Client> {
        let insert = sqlx::query(
            "INSERT INTO clients (name, secret_hash, roles, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&client.name)
        .bind(&client.secret_hash)
        .bind(&client.roles)
        .bind(client.created_at)
        .execute(&self.pool)
        .await;
        match insert {
            Ok(_) => Ok(client),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict("client exists".into()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_client_by_secret_hash_inner(&self, secret_hash: &str) -> StoreResult<Client> {
        let row: Option<DbClient> = sqlx::query_as(
            "SELECT name, secret_hash, roles, created_at FROM clients WHERE secret_hash = $1",
        )
        .bind(secret_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Client::from)
            .ok_or_else(|| StoreError::NotFound("client".into()))
    }

    async fn find_client_by_name_inner(&self, name: &str) -> StoreResult<Client> {
        let row: Option<DbClient> = sqlx::query_as(
            "SELECT name, secret_hash, roles, created_at FROM clients WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Client::from)
            .ok_or_else(|| StoreError::NotFound("client".into()))
    }

    async fn exists(&self, sql: &'static str, key: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(sql)
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn find_refresh_token_inner(&self, token: &str) -> StoreResult<RefreshCredential> {
        let row: Option<DbRefreshToken> = sqlx::query_as(
            "SELECT token, client_secret_hash, expires_at, created_at \
             FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RefreshCredential::from)
            .ok_or_else(|| StoreError::NotFound("refresh token".into()))
    }

    async fn active_refresh_token_inner(
        &self,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<RefreshCredential> {
        let mut conn = self.pool.acquire().await?;
        select_active(&mut conn, secret_hash, now)
            .await?
            .map(RefreshCredential::from)
            .ok_or_else(|| StoreError::NotFound("refresh token".into()))
    }

    async fn rotate_refresh_token_inner(
        &self,
        rotation: Rotation,
    ) -> StoreResult<Option<RefreshCredential>> {
        let owner = rotation.replacement.client_secret_hash.as_str();
        let mut tx = self.pool.begin().await?;

        // Serialize concurrent rotations for this client on its row lock.
        let locked: Option<(String,)> =
            sqlx::query_as("SELECT name FROM clients WHERE secret_hash = $1 FOR UPDATE")
                .bind(owner)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound("client".into()));
        }
        // A revocation that committed while this rotation waited on the lock wins.
        let revoked: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM revoked_client_secrets WHERE hash = $1)",
        )
        .bind(owner)
        .fetch_one(&mut *tx)
        .await?;
        if revoked {
            return Err(StoreError::Revoked("client secret".into()));
        }

        let retired = match select_active(&mut tx, owner, rotation.now).await? {
            Some(active) => {
                let event = AuditEvent::refresh_revoked(
                    owner,
                    &active.token,
                    &rotation.origin,
                    REASON_ROTATION,
                    rotation.now,
                );
                retire(&mut tx, &active.token, rotation.now, &event).await?;
                Some(RefreshCredential::from(active))
            }
            None => None,
        };

        let insert = sqlx::query(
            "INSERT INTO refresh_tokens (token, client_secret_hash, expires_at, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&rotation.replacement.token)
        .bind(owner)
        .bind(rotation.replacement.expires_at)
        .bind(rotation.replacement.created_at)
        .execute(&mut *tx)
        .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("refresh token exists".into()));
            }
            return Err(err.into());
        }

        for event in &rotation.events {
            insert_audit_event(&mut tx, event).await?;
        }

        tx.commit().await?;
        Ok(retired)
    }

    async fn revoke_refresh_token_inner(&self, token: &str, event: AuditEvent) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let marked = sqlx::query(
            "INSERT INTO revoked_refresh_tokens (token, revoked_at) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(token)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;
        if marked.rows_affected() == 0 {
            // Already revoked; dropping the transaction rolls it back.
            return Ok(());
        }
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&mut *tx)
            .await?;
        insert_audit_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn revoke_client_secret_inner(
        &self,
        secret_hash: &str,
        origin: &Origin,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        // Queue behind any in-flight rotation for this client; rotations that
        // lock the row afterwards see the mark and refuse.
        sqlx::query("SELECT 1 FROM clients WHERE secret_hash = $1 FOR UPDATE")
            .bind(secret_hash)
            .fetch_optional(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO revoked_client_secrets (hash, revoked_at) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(secret_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let tokens: Vec<(String,)> = sqlx::query_as(
            "DELETE FROM refresh_tokens WHERE client_secret_hash = $1 RETURNING token",
        )
        .bind(secret_hash)
        .fetch_all(&mut *tx)
        .await?;

        let mut retired = Vec::with_capacity(tokens.len());
        for (token,) in tokens {
            let event = AuditEvent::refresh_revoked(
                secret_hash,
                &token,
                origin,
                REASON_CLIENT_REVOKED,
                now,
            );
            mark_refresh_token(&mut tx, &token, now).await?;
            insert_audit_event(&mut tx, &event).await?;
            retired.push(token);
        }
        tx.commit().await?;
        Ok(retired)
    }

    async fn append_audit_events_inner(&self, events: Vec<AuditEvent>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for event in &events {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn select_active(
    conn: &mut PgConnection,
    secret_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<DbRefreshToken>, sqlx::Error> {
    sqlx::query_as(
        "SELECT token, client_secret_hash, expires_at, created_at FROM refresh_tokens \
         WHERE client_secret_hash = $1 AND expires_at > $2 \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(secret_hash)
    .bind(now)
    .fetch_optional(conn)
    .await
}

async fn retire(
    conn: &mut PgConnection,
    token: &str,
    now: DateTime<Utc>,
    event: &AuditEvent,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
        .bind(token)
        .execute(&mut *conn)
        .await?;
    mark_refresh_token(conn, token, now).await?;
    insert_audit_event(conn, event).await
}

async fn mark_refresh_token(
    conn: &mut PgConnection,
    token: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO revoked_refresh_tokens (token, revoked_at) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(token)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_audit_event(conn: &mut PgConnection, event: &AuditEvent) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO token_log \
         (client_secret_hash, token_type, action, token_ref, ip, user_agent, metadata, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(&event.client_secret_hash)
    .bind(event.kind.as_str())
    .bind(event.action.as_str())
    .bind(&event.token_ref)
    .bind(&event.ip)
    .bind(&event.user_agent)
    .bind(&event.metadata)
    .bind(event.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

#[async_trait]
impl CredentialStore for PostgresStore {
    async fn create_client(&self, deadline: Deadline, client: Client) -> StoreResult<Client> {
        deadline.run(self.create_client_inner(client)).await
    }

    async fn find_client_by_secret_hash(
        &self,
        deadline: Deadline,
        secret_hash: &str,
    ) -> StoreResult<Client> {
        deadline
            .run(self.find_client_by_secret_hash_inner(secret_hash))
            .await
    }

    async fn find_client_by_name(&self, deadline: Deadline, name: &str) -> StoreResult<Client> {
        deadline.run(self.find_client_by_name_inner(name)).await
    }

    async fn is_client_secret_revoked(
        &self,
        deadline: Deadline,
        secret_hash: &str,
    ) -> StoreResult<bool> {
        deadline
            .run(self.exists(
                "SELECT EXISTS(SELECT 1 FROM revoked_client_secrets WHERE hash = $1)",
                secret_hash,
            ))
            .await
    }

    async fn is_refresh_token_revoked(
        &self,
        deadline: Deadline,
        token: &str,
    ) -> StoreResult<bool> {
        deadline
            .run(self.exists(
                "SELECT EXISTS(SELECT 1 FROM revoked_refresh_tokens WHERE token = $1)",
                token,
            ))
            .await
    }

    async fn find_refresh_token(
        &self,
        deadline: Deadline,
        token: &str,
    ) -> StoreResult<RefreshCredential> {
        deadline.run(self.find_refresh_token_inner(token)).await
    }

    async fn active_refresh_token(
        &self,
        deadline: Deadline,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<RefreshCredential> {
        deadline
            .run(self.active_refresh_token_inner(secret_hash, now))
            .await
    }

    async fn rotate_refresh_token(
        &self,
        deadline: Deadline,
        rotation: Rotation,
    ) -> StoreResult<Option<RefreshCredential>> {
        deadline.run(self.rotate_refresh_token_inner(rotation)).await
    }

    async fn revoke_refresh_token(
        &self,
        deadline: Deadline,
        token: &str,
        event: AuditEvent,
    ) -> StoreResult<()> {
        deadline
            .run(self.revoke_refresh_token_inner(token, event))
            .await
    }

    async fn revoke_client_secret(
        &self,
        deadline: Deadline,
        secret_hash: &str,
        origin: &Origin,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        deadline
            .run(self.revoke_client_secret_inner(secret_hash, origin, now))
            .await
    }

    async fn append_audit_events(
        &self,
        deadline: Deadline,
        events: Vec<AuditEvent>,
    ) -> StoreResult<()> {
        deadline.run(self.append_audit_events_inner(events)).await
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
