use super::{LedgerStore, LedgerTx};
use crate::error::{StoreError, StoreResult, UniqueKey};
use crate::schemas::{
    Expense, ExpenseShare, Group, GroupId, Membership, MembershipId, Settlement, User, UserId,
    UserStatus,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
struct Tables {
    users: Vec<User>,
    groups: Vec<Group>,
    memberships: Vec<Membership>,
    expenses: Vec<Expense>,
    shares: Vec<ExpenseShare>,
    settlements: Vec<Settlement>,
}

/// Process-local store. A transaction holds the only lock on the tables for
/// its whole lifetime, so transactions are serializable.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_share_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following share write fail with a backend error.
    #[cfg(test)]
    pub(crate) fn fail_share_writes(&self, fail: bool) {
        self.fail_share_writes.store(fail, Ordering::SeqCst);
    }
}

pub struct MemoryTx {
    committed: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_share_writes: bool,
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        let committed = self.tables.clone().lock_owned().await;
        let working = committed.clone();
        Ok(MemoryTx {
            committed,
            working,
            fail_share_writes: self.fail_share_writes.load(Ordering::SeqCst),
        })
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        if self.working.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation(UniqueKey::UserEmail));
        }
        self.working.users.push(user.clone());
        Ok(())
    }

    async fn get_user(&mut self, id: &UserId) -> StoreResult<Option<User>> {
        Ok(self.working.users.iter().find(|u| &u.id == id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.working.users.iter().find(|u| u.email == email).cloned())
    }

    async fn lock_user(&mut self, id: &UserId) -> StoreResult<Option<User>> {
        self.get_user(id).await
    }

    async fn list_users(&mut self) -> StoreResult<Vec<User>> {
        Ok(self.working.users.clone())
    }

    async fn set_user_status(&mut self, id: &UserId, status: UserStatus) -> StoreResult<()> {
        if let Some(user) = self.working.users.iter_mut().find(|u| &u.id == id) {
            user.status = status;
        }
        Ok(())
    }

    async fn insert_group(&mut self, group: &Group) -> StoreResult<()> {
        self.working.groups.push(group.clone());
        Ok(())
    }

    async fn get_group(&mut self, id: &GroupId) -> StoreResult<Option<Group>> {
        Ok(self.working.groups.iter().find(|g| &g.id == id).cloned())
    }

    async fn lock_group(&mut self, id: &GroupId) -> StoreResult<Option<Group>> {
        // The table lock already excludes every other transaction.
        self.get_group(id).await
    }

    async fn list_groups(&mut self) -> StoreResult<Vec<Group>> {
        Ok(self.working.groups.clone())
    }

    async fn delete_group(&mut self, id: &GroupId) -> StoreResult<()> {
        let tables = &mut self.working;
        tables.groups.retain(|g| &g.id != id);
        tables.memberships.retain(|m| &m.group_id != id);
        tables.expenses.retain(|e| &e.group_id != id);
        tables.shares.retain(|s| &s.group_id != id);
        tables.settlements.retain(|s| &s.group_id != id);
        Ok(())
    }

    async fn insert_membership(&mut self, membership: &Membership) -> StoreResult<()> {
        let duplicate = self
            .working
            .memberships
            .iter()
            .any(|m| m.group_id == membership.group_id && m.user_id == membership.user_id);
        if duplicate {
            return Err(StoreError::UniqueViolation(UniqueKey::Membership));
        }
        self.working.memberships.push(membership.clone());
        Ok(())
    }

    async fn find_membership(
        &mut self,
        group: &GroupId,
        user: &UserId,
    ) -> StoreResult<Option<Membership>> {
        Ok(self
            .working
            .memberships
            .iter()
            .find(|m| &m.group_id == group && &m.user_id == user)
            .cloned())
    }

    async fn list_memberships(&mut self, group: &GroupId) -> StoreResult<Vec<Membership>> {
        Ok(self
            .working
            .memberships
            .iter()
            .filter(|m| &m.group_id == group)
            .cloned()
            .collect())
    }

    async fn delete_membership(&mut self, id: &MembershipId) -> StoreResult<()> {
        self.working.memberships.retain(|m| &m.id != id);
        Ok(())
    }

    async fn insert_expense(&mut self, expense: &Expense) -> StoreResult<()> {
        self.working.expenses.push(expense.clone());
        Ok(())
    }

    async fn insert_shares(&mut self, shares: &[ExpenseShare]) -> StoreResult<()> {
        if self.fail_share_writes {
            return Err(StoreError::Backend("share write rejected".to_owned()));
        }
        self.working.shares.extend_from_slice(shares);
        Ok(())
    }

    async fn list_expenses(&mut self, group: &GroupId) -> StoreResult<Vec<Expense>> {
        Ok(self
            .working
            .expenses
            .iter()
            .filter(|e| &e.group_id == group)
            .cloned()
            .collect())
    }

    async fn list_shares(&mut self, group: &GroupId) -> StoreResult<Vec<ExpenseShare>> {
        Ok(self
            .working
            .shares
            .iter()
            .filter(|s| &s.group_id == group)
            .cloned()
            .collect())
    }

    async fn insert_settlement(&mut self, settlement: &Settlement) -> StoreResult<()> {
        self.working.settlements.push(settlement.clone());
        Ok(())
    }

    async fn list_settlements(&mut self, group: &GroupId) -> StoreResult<Vec<Settlement>> {
        Ok(self
            .working
            .settlements
            .iter()
            .filter(|s| &s.group_id == group)
            .cloned()
            .collect())
    }

    async fn commit(self) -> StoreResult<()> {
        let MemoryTx {
            mut committed,
            working,
            ..
        } = self;
        *committed = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::Role;
    use chrono::Utc;

    fn group(id: &str) -> Group {
        Group {
            id: GroupId::from(id),
            name: "Trip".to_owned(),
            created_at: Utc::now(),
        }
    }

    fn membership(group: &str, user: &str) -> Membership {
        Membership {
            id: MembershipId::generate(),
            user_id: UserId::from(user),
            group_id: GroupId::from(group),
            role: Role::Member,
            joined_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_group(&group("g1")).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_group(&GroupId::from("g1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_group(&group("g1")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_group(&GroupId::from("g1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_membership_is_a_unique_violation() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_membership(&membership("g1", "u1")).await.unwrap();
        let err = tx.insert_membership(&membership("g1", "u1")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(UniqueKey::Membership)));
        tx.insert_membership(&membership("g2", "u1")).await.unwrap();
    }

    #[tokio::test]
    async fn lock_user_sees_the_current_status() {
        let store = MemoryStore::new();
        let user = User {
            id: UserId::from("u1"),
            name: "Alice".to_owned(),
            email: "alice@example.com".to_owned(),
            created_at: Utc::now(),
            status: UserStatus::Active,
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        tx.set_user_status(&user.id, UserStatus::Deleted { at: Utc::now() })
            .await
            .unwrap();
        let locked = tx.lock_user(&user.id).await.unwrap().unwrap();
        assert!(!locked.is_active());
        assert!(tx.lock_user(&UserId::from("u2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_group_cascades() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_group(&group("g1")).await.unwrap();
        tx.insert_group(&group("g2")).await.unwrap();
        tx.insert_membership(&membership("g1", "u1")).await.unwrap();
        tx.insert_membership(&membership("g2", "u1")).await.unwrap();
        tx.delete_group(&GroupId::from("g1")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_group(&GroupId::from("g1")).await.unwrap().is_none());
        assert!(tx.list_memberships(&GroupId::from("g1")).await.unwrap().is_empty());
        assert_eq!(tx.list_memberships(&GroupId::from("g2")).await.unwrap().len(), 1);
    }
}
