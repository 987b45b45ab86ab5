use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{QueryBuilder, Row};

use portcullis_core::{AccountStatus, Application, User, UserRole};

use crate::error::PortalError;
use crate::repo::{
    ApplicationFilter, ApplicationRepository, Page, PageRequest, PortalRepository,
    PortalTransaction, SortOrder, UserFilter, UserRepository,
};

/// Connection settings for the Postgres portal backend.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Connection URL, e.g. `postgres://portcullis@localhost/portal`.
    pub url: String,
    /// Maximum pool connections.
    pub pool_size: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: String::from("postgres://localhost/portcullis"),
            pool_size: 8,
        }
    }
}

/// Create the portal tables if they do not exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS portal_users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS portal_applications (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            user_id TEXT NOT NULL REFERENCES portal_users(id) ON DELETE CASCADE,
            api_key TEXT NOT NULL UNIQUE,
            api_secret TEXT NOT NULL,
            status TEXT NOT NULL,
            rate_limit BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS portal_applications_user_id
         ON portal_applications (user_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn map_sqlx(err: sqlx::Error) -> PortalError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            // unique_violation
            Some("23505") => return PortalError::Conflict(db.message().to_owned()),
            // foreign_key_violation
            Some("23503") => return PortalError::Validation(db.message().to_owned()),
            _ => {}
        }
    }
    if matches!(err, sqlx::Error::PoolClosed) {
        return PortalError::Closed;
    }
    PortalError::Backend(err.to_string())
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User, PortalError> {
    let role: String = row.get("role");
    let status: String = row.get("status");
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
        role: UserRole::from_str_loose(&role)
            .ok_or_else(|| PortalError::Backend(format!("corrupt user role: {role}")))?,
        status: AccountStatus::from_str_loose(&status)
            .ok_or_else(|| PortalError::Backend(format!("corrupt user status: {status}")))?,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn app_from_row(row: &sqlx::postgres::PgRow) -> Result<Application, PortalError> {
    let status: String = row.get("status");
    Ok(Application {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        user_id: row.get("user_id"),
        api_key: row.get("api_key"),
        api_secret: row.get("api_secret"),
        status: AccountStatus::from_str_loose(&status)
            .ok_or_else(|| PortalError::Backend(format!("corrupt application status: {status}")))?,
        rate_limit: row.get("rate_limit"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

async fn insert_user<'e, E>(executor: E, user: &User) -> Result<(), PortalError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        "INSERT INTO portal_users
             (id, email, name, password_hash, role, status, created_at, updated_at)
         VALUES ($1, lower($2), $3, $4, $5, $6, $7, $8)",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.status.to_string())
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(executor)
    .await
    .map_err(map_sqlx)?;
    Ok(())
}

async fn update_user_row<'e, E>(executor: E, user: &User) -> Result<(), PortalError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE portal_users
         SET email = lower($2), name = $3, password_hash = $4, role = $5,
             status = $6, updated_at = $7
         WHERE id = $1",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.status.to_string())
    .bind(user.updated_at)
    .execute(executor)
    .await
    .map_err(map_sqlx)?;

    if result.rows_affected() == 0 {
        return Err(PortalError::NotFound(format!("user {}", user.id)));
    }
    Ok(())
}

async fn delete_user_row<'e, E>(executor: E, id: &str) -> Result<(), PortalError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    // Applications go with the user via ON DELETE CASCADE.
    let result = sqlx::query("DELETE FROM portal_users WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await
        .map_err(map_sqlx)?;
    if result.rows_affected() == 0 {
        return Err(PortalError::NotFound(format!("user {id}")));
    }
    Ok(())
}

async fn insert_app<'e, E>(executor: E, app: &Application) -> Result<(), PortalError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        "INSERT INTO portal_applications
             (id, name, description, user_id, api_key, api_secret, status,
              rate_limit, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(&app.id)
    .bind(&app.name)
    .bind(&app.description)
    .bind(&app.user_id)
    .bind(&app.api_key)
    .bind(&app.api_secret)
    .bind(app.status.to_string())
    .bind(app.rate_limit)
    .bind(app.created_at)
    .bind(app.updated_at)
    .execute(executor)
    .await
    .map_err(map_sqlx)?;
    Ok(())
}

async fn update_app_row<'e, E>(executor: E, app: &Application) -> Result<(), PortalError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE portal_applications
         SET name = $2, description = $3, api_key = $4, api_secret = $5,
             status = $6, rate_limit = $7, updated_at = $8
         WHERE id = $1",
    )
    .bind(&app.id)
    .bind(&app.name)
    .bind(&app.description)
    .bind(&app.api_key)
    .bind(&app.api_secret)
    .bind(app.status.to_string())
    .bind(app.rate_limit)
    .bind(app.updated_at)
    .execute(executor)
    .await
    .map_err(map_sqlx)?;

    if result.rows_affected() == 0 {
        return Err(PortalError::NotFound(format!("application {}", app.id)));
    }
    Ok(())
}

async fn delete_app_row<'e, E>(executor: E, id: &str) -> Result<(), PortalError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM portal_applications WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await
        .map_err(map_sqlx)?;
    if result.rows_affected() == 0 {
        return Err(PortalError::NotFound(format!("application {id}")));
    }
    Ok(())
}

/// Map a requested sort column onto a whitelisted SQL identifier.
fn sort_column<'a>(sort_by: Option<&str>, allowed: &[&'a str]) -> &'a str {
    sort_by
        .and_then(|name| allowed.iter().find(|col| **col == name))
        .copied()
        .unwrap_or("created_at")
}

fn sort_direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    }
}

struct Shared {
    pool: PgPool,
    closed: AtomicBool,
}

impl Shared {
    fn ensure_open(&self) -> Result<(), PortalError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(PortalError::Closed)
        } else {
            Ok(())
        }
    }
}

/// PostgreSQL-backed portal repository.
///
/// Uses `sqlx::PgPool`; uniqueness and referential rules live in the schema
/// (UNIQUE and FK constraints) and surface through error-code mapping.
pub struct PostgresPortalRepository {
    shared: Arc<Shared>,
    users: Arc<PostgresUserRepository>,
    apps: Arc<PostgresApplicationRepository>,
}

impl PostgresPortalRepository {
    /// Connect, pool, and migrate.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Connection`] if the pool cannot be created,
    /// or [`PortalError::Backend`] if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, PortalError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| PortalError::Connection(e.to_string()))?;

        run_migrations(&pool)
            .await
            .map_err(|e| PortalError::Backend(e.to_string()))?;

        let shared = Arc::new(Shared {
            pool,
            closed: AtomicBool::new(false),
        });
        Ok(Self {
            users: Arc::new(PostgresUserRepository {
                shared: Arc::clone(&shared),
            }),
            apps: Arc::new(PostgresApplicationRepository {
                shared: Arc::clone(&shared),
            }),
            shared,
        })
    }
}

#[async_trait]
impl PortalRepository for PostgresPortalRepository {
    fn users(&self) -> Arc<dyn UserRepository> {
        Arc::clone(&self.users) as Arc<dyn UserRepository>
    }

    fn applications(&self) -> Arc<dyn ApplicationRepository> {
        Arc::clone(&self.apps) as Arc<dyn ApplicationRepository>
    }

    async fn begin(&self) -> Result<Box<dyn PortalTransaction>, PortalError> {
        self.shared.ensure_open()?;
        let tx = self.shared.pool.begin().await.map_err(map_sqlx)?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn close(&self) -> Result<(), PortalError> {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.pool.close().await;
        Ok(())
    }
}

/// User half of the Postgres backend.
pub struct PostgresUserRepository {
    shared: Arc<Shared>,
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: &User) -> Result<(), PortalError> {
        self.shared.ensure_open()?;
        insert_user(&self.shared.pool, user).await
    }

    async fn get(&self, id: &str) -> Result<User, PortalError> {
        self.shared.ensure_open()?;
        let row = sqlx::query("SELECT * FROM portal_users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.shared.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref()
            .map(user_from_row)
            .transpose()?
            .ok_or_else(|| PortalError::NotFound(format!("user {id}")))
    }

    async fn get_by_email(&self, email: &str) -> Result<User, PortalError> {
        self.shared.ensure_open()?;
        let row = sqlx::query("SELECT * FROM portal_users WHERE email = lower($1)")
            .bind(email)
            .fetch_optional(&self.shared.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref()
            .map(user_from_row)
            .transpose()?
            .ok_or_else(|| PortalError::NotFound(format!("user with email {email}")))
    }

    async fn update(&self, user: &User) -> Result<(), PortalError> {
        self.shared.ensure_open()?;
        update_user_row(&self.shared.pool, user).await
    }

    async fn delete(&self, id: &str) -> Result<(), PortalError> {
        self.shared.ensure_open()?;
        delete_user_row(&self.shared.pool, id).await
    }

    async fn exists(&self, id: &str) -> Result<bool, PortalError> {
        self.shared.ensure_open()?;
        let row = sqlx::query("SELECT 1 AS one FROM portal_users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.shared.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.is_some())
    }

    async fn list(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<Page<User>, PortalError> {
        self.shared.ensure_open()?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM portal_users WHERE 1=1");
        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM portal_users WHERE 1=1");
        for builder in [&mut count, &mut select] {
            if let Some(role) = filter.role {
                builder.push(" AND role = ").push_bind(role.to_string());
            }
            if let Some(status) = filter.status {
                builder.push(" AND status = ").push_bind(status.to_string());
            }
        }

        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.shared.pool)
            .await
            .map_err(map_sqlx)?;

        let limit = page.effective_limit();
        select.push(format!(
            " ORDER BY {} {}",
            sort_column(page.sort_by.as_deref(), &["email", "name", "created_at"]),
            sort_direction(page.sort_order),
        ));
        select.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        select
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset).unwrap_or(i64::MAX));

        let rows = select
            .build()
            .fetch_all(&self.shared.pool)
            .await
            .map_err(map_sqlx)?;

        let items = rows
            .iter()
            .map(user_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or(0),
            limit,
            offset: page.offset,
        })
    }
}

/// Application half of the Postgres backend.
pub struct PostgresApplicationRepository {
    shared: Arc<Shared>,
}

#[async_trait]
impl ApplicationRepository for PostgresApplicationRepository {
    async fn create(&self, app: &Application) -> Result<(), PortalError> {
        self.shared.ensure_open()?;
        insert_app(&self.shared.pool, app).await
    }

    async fn get(&self, id: &str) -> Result<Application, PortalError> {
        self.shared.ensure_open()?;
        let row = sqlx::query("SELECT * FROM portal_applications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.shared.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref()
            .map(app_from_row)
            .transpose()?
            .ok_or_else(|| PortalError::NotFound(format!("application {id}")))
    }

    async fn get_by_api_key(&self, api_key: &str) -> Result<Application, PortalError> {
        self.shared.ensure_open()?;
        let row = sqlx::query("SELECT * FROM portal_applications WHERE api_key = $1")
            .bind(api_key)
            .fetch_optional(&self.shared.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref()
            .map(app_from_row)
            .transpose()?
            .ok_or_else(|| PortalError::NotFound("application for api key".into()))
    }

    async fn update(&self, app: &Application) -> Result<(), PortalError> {
        self.shared.ensure_open()?;
        update_app_row(&self.shared.pool, app).await
    }

    async fn delete(&self, id: &str) -> Result<(), PortalError> {
        self.shared.ensure_open()?;
        delete_app_row(&self.shared.pool, id).await
    }

    async fn exists(&self, id: &str) -> Result<bool, PortalError> {
        self.shared.ensure_open()?;
        let row = sqlx::query("SELECT 1 AS one FROM portal_applications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.shared.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.is_some())
    }

    async fn list(
        &self,
        filter: &ApplicationFilter,
        page: &PageRequest,
    ) -> Result<Page<Application>, PortalError> {
        self.shared.ensure_open()?;

        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM portal_applications WHERE 1=1");
        let mut select =
            QueryBuilder::<Postgres>::new("SELECT * FROM portal_applications WHERE 1=1");
        for builder in [&mut count, &mut select] {
            if let Some(user_id) = &filter.user_id {
                builder.push(" AND user_id = ").push_bind(user_id.clone());
            }
            if let Some(status) = filter.status {
                builder.push(" AND status = ").push_bind(status.to_string());
            }
        }

        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.shared.pool)
            .await
            .map_err(map_sqlx)?;

        let limit = page.effective_limit();
        select.push(format!(
            " ORDER BY {} {}",
            sort_column(page.sort_by.as_deref(), &["name", "created_at"]),
            sort_direction(page.sort_order),
        ));
        select.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        select
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset).unwrap_or(i64::MAX));

        let rows = select
            .build()
            .fetch_all(&self.shared.pool)
            .await
            .map_err(map_sqlx)?;

        let items = rows
            .iter()
            .map(app_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or(0),
            limit,
            offset: page.offset,
        })
    }
}

/// SQL transaction over the portal tables. Dropping it without commit rolls
/// back via sqlx's transaction drop semantics.
struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl PortalTransaction for PostgresTransaction {
    async fn create_user(&mut self, user: &User) -> Result<(), PortalError> {
        insert_user(&mut *self.tx, user).await
    }

    async fn update_user(&mut self, user: &User) -> Result<(), PortalError> {
        update_user_row(&mut *self.tx, user).await
    }

    async fn delete_user(&mut self, id: &str) -> Result<(), PortalError> {
        delete_user_row(&mut *self.tx, id).await
    }

    async fn create_application(&mut self, app: &Application) -> Result<(), PortalError> {
        insert_app(&mut *self.tx, app).await
    }

    async fn update_application(&mut self, app: &Application) -> Result<(), PortalError> {
        update_app_row(&mut *self.tx, app).await
    }

    async fn delete_application(&mut self, id: &str) -> Result<(), PortalError> {
        delete_app_row(&mut *self.tx, id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), PortalError> {
        self.tx.commit().await.map_err(map_sqlx)
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortalError> {
        self.tx.rollback().await.map_err(map_sqlx)
    }
}
