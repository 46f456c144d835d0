use crate::error::{Entity, LedgerError, LedgerResult};
use crate::ledger::Ledger;
use crate::schemas::{User, UserId, UserStatus};
use crate::store::{LedgerStore, LedgerTx};
use chrono::Utc;
use tracing::{info, warn};

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Loads a user that may take part in new ledger activity. Soft-deleted users
/// are reported as absent. The user stays locked until `tx` ends, so a
/// concurrent soft delete cannot slip in before the commit.
pub(crate) async fn active_user<T: LedgerTx>(tx: &mut T, id: &UserId) -> LedgerResult<User> {
    match tx.lock_user(id).await? {
        Some(user) if user.is_active() => Ok(user),
        _ => Err(LedgerError::NotFound(Entity::User)),
    }
}

impl<S: LedgerStore> Ledger<S> {
    pub async fn create_user(&self, email: &str, name: &str) -> LedgerResult<User> {
        let email = normalize_email(email);
        let mut tx = self.begin().await?;

        if tx.find_user_by_email(&email).await?.is_some() {
            warn!(%email, "email already in use");
            return Err(LedgerError::DuplicateEmail);
        }

        let user = User {
            id: UserId::generate(),
            name: name.trim().to_owned(),
            email,
            created_at: Utc::now(),
            status: UserStatus::Active,
        };
        tx.insert_user(&user).await?;
        tx.commit().await?;

        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn get_user(&self, id: &UserId) -> LedgerResult<User> {
        let mut tx = self.begin().await?;
        let user = tx.get_user(id).await?;
        tx.commit().await?;
        user.ok_or(LedgerError::NotFound(Entity::User))
    }

    pub async fn get_user_by_email(&self, email: &str) -> LedgerResult<User> {
        let mut tx = self.begin().await?;
        let user = tx.find_user_by_email(&normalize_email(email)).await?;
        tx.commit().await?;
        user.ok_or(LedgerError::NotFound(Entity::User))
    }

    pub async fn list_users(&self) -> LedgerResult<Vec<User>> {
        let mut tx = self.begin().await?;
        let users = tx.list_users().await?;
        tx.commit().await?;
        Ok(users)
    }

    /// Marks the user as deleted. The row stays so that ledger history keeps
    /// pointing at it.
    pub async fn soft_delete_user(&self, id: &UserId) -> LedgerResult<()> {
        let mut tx = self.begin().await?;
        let user = tx
            .get_user(id)
            .await?
            .ok_or(LedgerError::NotFound(Entity::User))?;
        if !user.is_active() {
            return Err(LedgerError::AlreadyDeleted);
        }

        tx.set_user_status(id, UserStatus::Deleted { at: Utc::now() })
            .await?;
        tx.commit().await?;

        info!(user_id = %id, "user soft-deleted");
        Ok(())
    }
}
