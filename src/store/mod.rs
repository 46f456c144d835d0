//! # Storage
//!
//! The ledger keeps no state of its own. Every operation opens one
//! transaction, does its checks and writes through it, and commits. Dropping a
//! [`LedgerTx`] without committing discards everything it wrote.
//!
//! Two backends are provided: [`memory::MemoryStore`] for tests and local runs,
//! and [`mongo::MongoStore`] for deployments.

use crate::error::StoreResult;
use crate::schemas::{
    Expense, ExpenseShare, Group, GroupId, Membership, MembershipId, Settlement, User, UserId,
    UserStatus,
};
use async_trait::async_trait;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Tx: LedgerTx;

    /// Opens a transaction with at least snapshot isolation.
    async fn begin(&self) -> StoreResult<Self::Tx>;
}

/// One atomic unit of work against the store.
///
/// Listings are returned in a stable order: memberships by join time,
/// expenses by creation time, settlements by settlement time.
#[async_trait]
pub trait LedgerTx: Send {
    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;
    async fn get_user(&mut self, id: &UserId) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>>;
    /// Fetches the user and marks it as written by this transaction, so that a
    /// concurrent status change of the same user cannot commit alongside it.
    async fn lock_user(&mut self, id: &UserId) -> StoreResult<Option<User>>;
    async fn list_users(&mut self) -> StoreResult<Vec<User>>;
    async fn set_user_status(&mut self, id: &UserId, status: UserStatus) -> StoreResult<()>;

    async fn insert_group(&mut self, group: &Group) -> StoreResult<()>;
    async fn get_group(&mut self, id: &GroupId) -> StoreResult<Option<Group>>;
    /// Fetches the group and marks it as written by this transaction, so that
    /// concurrent mutations of the same group cannot both commit.
    async fn lock_group(&mut self, id: &GroupId) -> StoreResult<Option<Group>>;
    async fn list_groups(&mut self) -> StoreResult<Vec<Group>>;
    /// Deletes the group with its memberships, expenses, shares and settlements.
    async fn delete_group(&mut self, id: &GroupId) -> StoreResult<()>;

    async fn insert_membership(&mut self, membership: &Membership) -> StoreResult<()>;
    async fn find_membership(
        &mut self,
        group: &GroupId,
        user: &UserId,
    ) -> StoreResult<Option<Membership>>;
    async fn list_memberships(&mut self, group: &GroupId) -> StoreResult<Vec<Membership>>;
    async fn delete_membership(&mut self, id: &MembershipId) -> StoreResult<()>;

    async fn insert_expense(&mut self, expense: &Expense) -> StoreResult<()>;
    async fn insert_shares(&mut self, shares: &[ExpenseShare]) -> StoreResult<()>;
    async fn list_expenses(&mut self, group: &GroupId) -> StoreResult<Vec<Expense>>;
    async fn list_shares(&mut self, group: &GroupId) -> StoreResult<Vec<ExpenseShare>>;

    async fn insert_settlement(&mut self, settlement: &Settlement) -> StoreResult<()>;
    async fn list_settlements(&mut self, group: &GroupId) -> StoreResult<Vec<Settlement>>;

    async fn commit(self) -> StoreResult<()>;
}
