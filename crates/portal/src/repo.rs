use std::sync::Arc;

use async_trait::async_trait;

use portcullis_core::{AccountStatus, Application, User, UserRole};

use crate::error::PortalError;

/// Hard cap on page size; requests above it are clamped, not rejected.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Page size used when the caller passes `limit = 0`.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Pagination and ordering for list operations.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub offset: u64,
    /// `0` means "use the default"; values above [`MAX_PAGE_SIZE`] clamp.
    pub limit: u64,
    /// Column to sort by; backends whitelist the supported names and fall
    /// back to creation time for anything else.
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

impl PageRequest {
    /// The limit after default and clamp rules.
    #[must_use]
    pub fn effective_limit(&self) -> u64 {
        if self.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.limit.min(MAX_PAGE_SIZE)
        }
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total matches across all pages, not just this one.
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

/// Filter for user listings.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub status: Option<AccountStatus>,
}

/// Filter for application listings.
#[derive(Debug, Clone, Default)]
pub struct ApplicationFilter {
    pub user_id: Option<String>,
    pub status: Option<AccountStatus>,
}

/// Persistent store for portal users.
///
/// Implementations must be safe for concurrent non-transactional calls.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Fails with [`PortalError::Conflict`] when the id
    /// or email is already taken.
    async fn create(&self, user: &User) -> Result<(), PortalError>;

    async fn get(&self, id: &str) -> Result<User, PortalError>;

    async fn get_by_email(&self, email: &str) -> Result<User, PortalError>;

    /// Replace an existing user. Email uniqueness is re-checked.
    async fn update(&self, user: &User) -> Result<(), PortalError>;

    /// Delete a user and, by cascade, every application it owns.
    async fn delete(&self, id: &str) -> Result<(), PortalError>;

    async fn exists(&self, id: &str) -> Result<bool, PortalError>;

    async fn list(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<Page<User>, PortalError>;
}

/// Persistent store for portal applications.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Insert a new application. The owning user must exist; the id and
    /// api key must be unique.
    async fn create(&self, app: &Application) -> Result<(), PortalError>;

    async fn get(&self, id: &str) -> Result<Application, PortalError>;

    async fn get_by_api_key(&self, api_key: &str) -> Result<Application, PortalError>;

    async fn update(&self, app: &Application) -> Result<(), PortalError>;

    /// Delete an application together with its secondary indexes.
    async fn delete(&self, id: &str) -> Result<(), PortalError>;

    async fn exists(&self, id: &str) -> Result<bool, PortalError>;

    async fn list(
        &self,
        filter: &ApplicationFilter,
        page: &PageRequest,
    ) -> Result<Page<Application>, PortalError>;
}

/// A write transaction over both portal repositories.
///
/// `commit` and `rollback` consume the transaction, so operations after
/// either are unrepresentable. Dropping an uncommitted transaction rolls it
/// back. Calls within one transaction are serialized by construction
/// (`&mut self`).
#[async_trait]
pub trait PortalTransaction: Send {
    async fn create_user(&mut self, user: &User) -> Result<(), PortalError>;
    async fn update_user(&mut self, user: &User) -> Result<(), PortalError>;
    async fn delete_user(&mut self, id: &str) -> Result<(), PortalError>;

    async fn create_application(&mut self, app: &Application) -> Result<(), PortalError>;
    async fn update_application(&mut self, app: &Application) -> Result<(), PortalError>;
    async fn delete_application(&mut self, id: &str) -> Result<(), PortalError>;

    async fn commit(self: Box<Self>) -> Result<(), PortalError>;
    async fn rollback(self: Box<Self>) -> Result<(), PortalError>;
}

/// The portal's persistence root: both repositories sharing one backend
/// plus a transaction scope.
#[async_trait]
pub trait PortalRepository: Send + Sync {
    fn users(&self) -> Arc<dyn UserRepository>;
    fn applications(&self) -> Arc<dyn ApplicationRepository>;

    async fn begin(&self) -> Result<Box<dyn PortalTransaction>, PortalError>;

    /// Shut the backend down; all further operations fail terminally.
    async fn close(&self) -> Result<(), PortalError>;
}

macro_rules! batch_op {
    ($name:ident, $item:ty, $method:ident) => {
        /// All-or-nothing batch operation executed inside one transaction.
        pub async fn $name(
            repo: &dyn PortalRepository,
            items: &[$item],
        ) -> Result<(), PortalError> {
            let mut tx = repo.begin().await?;
            for item in items {
                if let Err(e) = tx.$method(item).await {
                    tx.rollback().await?;
                    return Err(e);
                }
            }
            tx.commit().await
        }
    };
}

batch_op!(batch_create_users, User, create_user);
batch_op!(batch_update_users, User, update_user);
batch_op!(batch_create_applications, Application, create_application);
batch_op!(batch_update_applications, Application, update_application);

/// All-or-nothing batch delete of users (cascades to applications).
pub async fn batch_delete_users(
    repo: &dyn PortalRepository,
    ids: &[String],
) -> Result<(), PortalError> {
    let mut tx = repo.begin().await?;
    for id in ids {
        if let Err(e) = tx.delete_user(id).await {
            tx.rollback().await?;
            return Err(e);
        }
    }
    tx.commit().await
}

/// All-or-nothing batch delete of applications.
pub async fn batch_delete_applications(
    repo: &dyn PortalRepository,
    ids: &[String],
) -> Result<(), PortalError> {
    let mut tx = repo.begin().await?;
    for id in ids {
        if let Err(e) = tx.delete_application(id).await {
            tx.rollback().await?;
            return Err(e);
        }
    }
    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_clamps() {
        let page = PageRequest::default();
        assert_eq!(page.effective_limit(), DEFAULT_PAGE_SIZE);

        let page = PageRequest {
            limit: 7,
            ..PageRequest::default()
        };
        assert_eq!(page.effective_limit(), 7);

        let page = PageRequest {
            limit: 10_000,
            ..PageRequest::default()
        };
        assert_eq!(page.effective_limit(), MAX_PAGE_SIZE);
    }
}
