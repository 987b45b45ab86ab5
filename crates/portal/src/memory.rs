use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use portcullis_core::{Application, User};

use crate::error::PortalError;
use crate::repo::{
    ApplicationFilter, ApplicationRepository, Page, PageRequest, PortalRepository,
    PortalTransaction, SortOrder, UserFilter, UserRepository,
};

#[derive(Default, Clone)]
struct Tables {
    users: HashMap<String, User>,
    /// Lowercased email -> user id.
    users_by_email: HashMap<String, String>,
    apps: HashMap<String, Application>,
    /// API key -> application id.
    apps_by_key: HashMap<String, String>,
}

impl Tables {
    fn insert_user(&mut self, user: &User) -> Result<(), PortalError> {
        if self.users.contains_key(&user.id) {
            return Err(PortalError::Conflict(format!("user id {}", user.id)));
        }
        let email = user.email.to_lowercase();
        if self.users_by_email.contains_key(&email) {
            return Err(PortalError::Conflict(format!(
                "email {} is already registered",
                user.email
            )));
        }
        self.users_by_email.insert(email, user.id.clone());
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn update_user(&mut self, user: &User) -> Result<(), PortalError> {
        let Some(existing) = self.users.get(&user.id) else {
            return Err(PortalError::NotFound(format!("user {}", user.id)));
        };
        let old_email = existing.email.to_lowercase();
        let new_email = user.email.to_lowercase();
        if old_email != new_email {
            if self.users_by_email.contains_key(&new_email) {
                return Err(PortalError::Conflict(format!(
                    "email {} is already registered",
                    user.email
                )));
            }
            self.users_by_email.remove(&old_email);
            self.users_by_email.insert(new_email, user.id.clone());
        }
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn delete_user(&mut self, id: &str) -> Result<(), PortalError> {
        let Some(user) = self.users.remove(id) else {
            return Err(PortalError::NotFound(format!("user {id}")));
        };
        self.users_by_email.remove(&user.email.to_lowercase());

        // Cascade: drop every application the user owns.
        let owned: Vec<String> = self
            .apps
            .values()
            .filter(|a| a.user_id == id)
            .map(|a| a.id.clone())
            .collect();
        for app_id in owned {
            if let Some(app) = self.apps.remove(&app_id) {
                self.apps_by_key.remove(&app.api_key);
            }
        }
        Ok(())
    }

    fn insert_app(&mut self, app: &Application) -> Result<(), PortalError> {
        if !self.users.contains_key(&app.user_id) {
            return Err(PortalError::Validation(format!(
                "application references unknown user {}",
                app.user_id
            )));
        }
        if self.apps.contains_key(&app.id) {
            return Err(PortalError::Conflict(format!("application id {}", app.id)));
        }
        if self.apps_by_key.contains_key(&app.api_key) {
            return Err(PortalError::Conflict("api key already in use".into()));
        }
        self.apps_by_key.insert(app.api_key.clone(), app.id.clone());
        self.apps.insert(app.id.clone(), app.clone());
        Ok(())
    }

    fn update_app(&mut self, app: &Application) -> Result<(), PortalError> {
        let Some(existing) = self.apps.get(&app.id) else {
            return Err(PortalError::NotFound(format!("application {}", app.id)));
        };
        if !self.users.contains_key(&app.user_id) {
            return Err(PortalError::Validation(format!(
                "application references unknown user {}",
                app.user_id
            )));
        }
        if existing.api_key != app.api_key {
            if self.apps_by_key.contains_key(&app.api_key) {
                return Err(PortalError::Conflict("api key already in use".into()));
            }
            self.apps_by_key.remove(&existing.api_key);
            self.apps_by_key.insert(app.api_key.clone(), app.id.clone());
        }
        self.apps.insert(app.id.clone(), app.clone());
        Ok(())
    }

    fn delete_app(&mut self, id: &str) -> Result<(), PortalError> {
        let Some(app) = self.apps.remove(id) else {
            return Err(PortalError::NotFound(format!("application {id}")));
        };
        self.apps_by_key.remove(&app.api_key);
        Ok(())
    }
}

struct Inner {
    tables: RwLock<Tables>,
    closed: AtomicBool,
    /// Serializes transactions against each other; plain calls only contend
    /// on the table lock.
    tx_gate: Arc<Mutex<()>>,
}

impl Inner {
    fn ensure_open(&self) -> Result<(), PortalError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(PortalError::Closed)
        } else {
            Ok(())
        }
    }
}

/// In-memory portal repository used by tests and single-node development.
pub struct MemoryPortalRepository {
    inner: Arc<Inner>,
    users: Arc<MemoryUserRepository>,
    apps: Arc<MemoryApplicationRepository>,
}

impl Default for MemoryPortalRepository {
    fn default() -> Self {
        let inner = Arc::new(Inner {
            tables: RwLock::new(Tables::default()),
            closed: AtomicBool::new(false),
            tx_gate: Arc::new(Mutex::new(())),
        });
        Self {
            users: Arc::new(MemoryUserRepository {
                inner: Arc::clone(&inner),
            }),
            apps: Arc::new(MemoryApplicationRepository {
                inner: Arc::clone(&inner),
            }),
            inner,
        }
    }
}

impl MemoryPortalRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PortalRepository for MemoryPortalRepository {
    fn users(&self) -> Arc<dyn UserRepository> {
        Arc::clone(&self.users) as Arc<dyn UserRepository>
    }

    fn applications(&self) -> Arc<dyn ApplicationRepository> {
        Arc::clone(&self.apps) as Arc<dyn ApplicationRepository>
    }

    async fn begin(&self) -> Result<Box<dyn PortalTransaction>, PortalError> {
        self.inner.ensure_open()?;
        let gate = Arc::clone(&self.inner.tx_gate).lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            _gate: gate,
            ops: Vec::new(),
            preview: self.inner.tables.read().await.clone(),
        }))
    }

    async fn close(&self) -> Result<(), PortalError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// User half of the in-memory backend.
pub struct MemoryUserRepository {
    inner: Arc<Inner>,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: &User) -> Result<(), PortalError> {
        self.inner.ensure_open()?;
        self.inner.tables.write().await.insert_user(user)
    }

    async fn get(&self, id: &str) -> Result<User, PortalError> {
        self.inner.ensure_open()?;
        self.inner
            .tables
            .read()
            .await
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| PortalError::NotFound(format!("user {id}")))
    }

    async fn get_by_email(&self, email: &str) -> Result<User, PortalError> {
        self.inner.ensure_open()?;
        let tables = self.inner.tables.read().await;
        tables
            .users_by_email
            .get(&email.to_lowercase())
            .and_then(|id| tables.users.get(id))
            .cloned()
            .ok_or_else(|| PortalError::NotFound(format!("user with email {email}")))
    }

    async fn update(&self, user: &User) -> Result<(), PortalError> {
        self.inner.ensure_open()?;
        self.inner.tables.write().await.update_user(user)
    }

    async fn delete(&self, id: &str) -> Result<(), PortalError> {
        self.inner.ensure_open()?;
        self.inner.tables.write().await.delete_user(id)
    }

    async fn exists(&self, id: &str) -> Result<bool, PortalError> {
        self.inner.ensure_open()?;
        Ok(self.inner.tables.read().await.users.contains_key(id))
    }

    async fn list(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<Page<User>, PortalError> {
        self.inner.ensure_open()?;
        let tables = self.inner.tables.read().await;

        let mut matches: Vec<User> = tables
            .users
            .values()
            .filter(|u| filter.role.is_none_or(|r| u.role == r))
            .filter(|u| filter.status.is_none_or(|s| u.status == s))
            .cloned()
            .collect();

        sort_slice(&mut matches, page, |u, key| match key {
            "email" => u.email.clone(),
            "name" => u.name.clone(),
            _ => u.created_at.to_rfc3339(),
        });

        Ok(paginate(matches, page))
    }
}

/// Application half of the in-memory backend.
pub struct MemoryApplicationRepository {
    inner: Arc<Inner>,
}

#[async_trait]
impl ApplicationRepository for MemoryApplicationRepository {
    async fn create(&self, app: &Application) -> Result<(), PortalError> {
        self.inner.ensure_open()?;
        self.inner.tables.write().await.insert_app(app)
    }

    async fn get(&self, id: &str) -> Result<Application, PortalError> {
        self.inner.ensure_open()?;
        self.inner
            .tables
            .read()
            .await
            .apps
            .get(id)
            .cloned()
            .ok_or_else(|| PortalError::NotFound(format!("application {id}")))
    }

    async fn get_by_api_key(&self, api_key: &str) -> Result<Application, PortalError> {
        self.inner.ensure_open()?;
        let tables = self.inner.tables.read().await;
        tables
            .apps_by_key
            .get(api_key)
            .and_then(|id| tables.apps.get(id))
            .cloned()
            .ok_or_else(|| PortalError::NotFound("application for api key".into()))
    }

    async fn update(&self, app: &Application) -> Result<(), PortalError> {
        self.inner.ensure_open()?;
        self.inner.tables.write().await.update_app(app)
    }

    async fn delete(&self, id: &str) -> Result<(), PortalError> {
        self.inner.ensure_open()?;
        self.inner.tables.write().await.delete_app(id)
    }

    async fn exists(&self, id: &str) -> Result<bool, PortalError> {
        self.inner.ensure_open()?;
        Ok(self.inner.tables.read().await.apps.contains_key(id))
    }

    async fn list(
        &self,
        filter: &ApplicationFilter,
        page: &PageRequest,
    ) -> Result<Page<Application>, PortalError> {
        self.inner.ensure_open()?;
        let tables = self.inner.tables.read().await;

        let mut matches: Vec<Application> = tables
            .apps
            .values()
            .filter(|a| {
                filter
                    .user_id
                    .as_ref()
                    .is_none_or(|uid| &a.user_id == uid)
            })
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .cloned()
            .collect();

        sort_slice(&mut matches, page, |a, key| match key {
            "name" => a.name.clone(),
            _ => a.created_at.to_rfc3339(),
        });

        Ok(paginate(matches, page))
    }
}

fn sort_slice<T>(items: &mut [T], page: &PageRequest, key_fn: impl Fn(&T, &str) -> String) {
    let key = page.sort_by.as_deref().unwrap_or("created_at");
    items.sort_by_key(|item| key_fn(item, key));
    if page.sort_order == SortOrder::Descending {
        items.reverse();
    }
}

fn paginate<T>(matches: Vec<T>, page: &PageRequest) -> Page<T> {
    let total = matches.len() as u64;
    let limit = page.effective_limit();
    let items = matches
        .into_iter()
        .skip(usize::try_from(page.offset).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .collect();
    Page {
        items,
        total,
        limit,
        offset: page.offset,
    }
}

enum TxOp {
    CreateUser(User),
    UpdateUser(User),
    DeleteUser(String),
    CreateApp(Application),
    UpdateApp(Application),
    DeleteApp(String),
}

impl TxOp {
    fn apply(&self, tables: &mut Tables) -> Result<(), PortalError> {
        match self {
            Self::CreateUser(user) => tables.insert_user(user),
            Self::UpdateUser(user) => tables.update_user(user),
            Self::DeleteUser(id) => tables.delete_user(id),
            Self::CreateApp(app) => tables.insert_app(app),
            Self::UpdateApp(app) => tables.update_app(app),
            Self::DeleteApp(id) => tables.delete_app(id),
        }
    }
}

/// Staged-write transaction over the in-memory tables.
///
/// Every staged op is validated immediately against a preview copy taken at
/// `begin`, then the whole set is re-applied atomically to a clone of the
/// live tables at `commit` and swapped in on success. A dropped transaction
/// leaves the live tables untouched.
struct MemoryTransaction {
    inner: Arc<Inner>,
    _gate: OwnedMutexGuard<()>,
    ops: Vec<TxOp>,
    preview: Tables,
}

impl MemoryTransaction {
    fn stage(&mut self, op: TxOp) -> Result<(), PortalError> {
        self.inner.ensure_open()?;
        op.apply(&mut self.preview)?;
        self.ops.push(op);
        Ok(())
    }
}

#[async_trait]
impl PortalTransaction for MemoryTransaction {
    async fn create_user(&mut self, user: &User) -> Result<(), PortalError> {
        self.stage(TxOp::CreateUser(user.clone()))
    }

    async fn update_user(&mut self, user: &User) -> Result<(), PortalError> {
        self.stage(TxOp::UpdateUser(user.clone()))
    }

    async fn delete_user(&mut self, id: &str) -> Result<(), PortalError> {
        self.stage(TxOp::DeleteUser(id.to_owned()))
    }

    async fn create_application(&mut self, app: &Application) -> Result<(), PortalError> {
        self.stage(TxOp::CreateApp(app.clone()))
    }

    async fn update_application(&mut self, app: &Application) -> Result<(), PortalError> {
        self.stage(TxOp::UpdateApp(app.clone()))
    }

    async fn delete_application(&mut self, id: &str) -> Result<(), PortalError> {
        self.stage(TxOp::DeleteApp(id.to_owned()))
    }

    async fn commit(self: Box<Self>) -> Result<(), PortalError> {
        self.inner.ensure_open()?;
        let mut tables = self.inner.tables.write().await;
        let mut staged = tables.clone();
        for op in &self.ops {
            op.apply(&mut staged)?;
        }
        *tables = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortalError> {
        // Staged ops are simply discarded.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use portcullis_core::{AccountStatus, UserRole};

    use crate::repo::{batch_create_users, MAX_PAGE_SIZE};

    use super::*;

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.into(),
            email: email.into(),
            name: format!("user-{id}"),
            password_hash: "$argon2id$hash".into(),
            role: UserRole::Developer,
            status: AccountStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn app(id: &str, user_id: &str, api_key: &str) -> Application {
        Application {
            id: id.into(),
            name: format!("app-{id}"),
            description: String::new(),
            user_id: user_id.into(),
            api_key: api_key.into(),
            api_secret: "secret".into(),
            status: AccountStatus::Active,
            rate_limit: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn email_uniqueness_is_case_insensitive() {
        let repo = MemoryPortalRepository::new();
        repo.users().create(&user("u1", "a@example.com")).await.unwrap();

        let err = repo
            .users()
            .create(&user("u2", "A@Example.COM"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Conflict(_)));
    }

    #[tokio::test]
    async fn deleting_user_cascades_to_applications() {
        let repo = MemoryPortalRepository::new();
        repo.users().create(&user("u1", "a@example.com")).await.unwrap();
        repo.applications()
            .create(&app("app1", "u1", "key-1"))
            .await
            .unwrap();

        repo.users().delete("u1").await.unwrap();

        let err = repo.applications().get("app1").await.unwrap_err();
        assert!(matches!(err, PortalError::NotFound(_)));
        let err = repo
            .applications()
            .get_by_api_key("key-1")
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::NotFound(_)));
    }

    #[tokio::test]
    async fn application_requires_existing_user() {
        let repo = MemoryPortalRepository::new();
        let err = repo
            .applications()
            .create(&app("app1", "ghost", "key-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }

    #[tokio::test]
    async fn api_key_rotation_updates_index() {
        let repo = MemoryPortalRepository::new();
        repo.users().create(&user("u1", "a@example.com")).await.unwrap();
        repo.applications()
            .create(&app("app1", "u1", "key-old"))
            .await
            .unwrap();

        let mut rotated = app("app1", "u1", "key-new");
        rotated.id = "app1".into();
        repo.applications().update(&rotated).await.unwrap();

        assert!(repo.applications().get_by_api_key("key-old").await.is_err());
        assert_eq!(
            repo.applications()
                .get_by_api_key("key-new")
                .await
                .unwrap()
                .id,
            "app1"
        );
    }

    #[tokio::test]
    async fn list_clamps_and_preserves_total() {
        let repo = MemoryPortalRepository::new();
        for i in 0..5 {
            repo.users()
                .create(&user(&format!("u{i}"), &format!("u{i}@example.com")))
                .await
                .unwrap();
        }

        // limit=0 uses the default.
        let page = repo
            .users()
            .list(&UserFilter::default(), &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.total, 5);

        // limit above the cap clamps.
        let page = repo
            .users()
            .list(
                &UserFilter::default(),
                &PageRequest {
                    limit: 100_000,
                    ..PageRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.limit, MAX_PAGE_SIZE);

        // offset beyond total yields an empty page with the total intact.
        let page = repo
            .users()
            .list(
                &UserFilter::default(),
                &PageRequest {
                    offset: 50,
                    ..PageRequest::default()
                },
            )
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 5);
    }

    #[tokio::test]
    async fn batch_create_is_all_or_nothing() {
        let repo = MemoryPortalRepository::new();
        repo.users().create(&user("u0", "taken@example.com")).await.unwrap();

        let batch = vec![
            user("u1", "fresh@example.com"),
            user("u2", "taken@example.com"), // conflicts
        ];
        let err = batch_create_users(&repo, &batch).await.unwrap_err();
        assert!(matches!(err, PortalError::Conflict(_)));

        // Nothing from the batch landed.
        assert!(!repo.users().exists("u1").await.unwrap());
        assert!(!repo.users().exists("u2").await.unwrap());
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let repo = MemoryPortalRepository::new();
        {
            let mut tx = repo.begin().await.unwrap();
            tx.create_user(&user("u1", "a@example.com")).await.unwrap();
            // Dropped without commit.
        }
        assert!(!repo.users().exists("u1").await.unwrap());
    }

    #[tokio::test]
    async fn closed_repository_fails_terminally() {
        let repo = MemoryPortalRepository::new();
        repo.close().await.unwrap();
        let err = repo.users().exists("u1").await.unwrap_err();
        assert!(matches!(err, PortalError::Closed));
    }
}
