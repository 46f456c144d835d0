use super::{LedgerStore, LedgerTx};
use crate::error::{StoreError, StoreResult, UniqueKey};
use crate::schemas::{
    Expense, ExpenseShare, Group, GroupId, Membership, MembershipId, Settlement, User, UserId,
    UserStatus,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};
use mongodb::options::{
    Acknowledgment, FindOneAndUpdateOptions, IndexOptions, ReadConcern, ReturnDocument,
    TransactionOptions, WriteConcern,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use serde::de::DeserializeOwned;
use tracing::info;

const USERS: &str = "users";
const GROUPS: &str = "groups";
const MEMBERSHIPS: &str = "memberships";
const EXPENSES: &str = "expenses";
const SHARES: &str = "expense_shares";
const SETTLEMENTS: &str = "settlements";

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await.map_err(store_error)?;
        let db = client.database(database);
        let store = Self { client, db };
        store.ensure_indexes().await?;
        info!(database, "connected to mongodb");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = |keys: Document| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };
        let plain = |keys: Document| IndexModel::builder().keys(keys).build();

        let indexes = [
            (USERS, unique(doc! { "id": 1 })),
            (USERS, unique(doc! { "email": 1 })),
            (GROUPS, unique(doc! { "id": 1 })),
            (MEMBERSHIPS, unique(doc! { "id": 1 })),
            (MEMBERSHIPS, unique(doc! { "groupId": 1, "userId": 1 })),
            (EXPENSES, unique(doc! { "id": 1 })),
            (EXPENSES, plain(doc! { "groupId": 1 })),
            (SHARES, plain(doc! { "groupId": 1 })),
            (SETTLEMENTS, plain(doc! { "groupId": 1 })),
        ];
        for (collection, index) in indexes {
            self.db
                .collection::<Document>(collection)
                .create_index(index, None)
                .await
                .map_err(store_error)?;
        }
        Ok(())
    }
}

pub struct MongoTx {
    db: Database,
    session: ClientSession,
}

impl MongoTx {
    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn groups(&self) -> Collection<Group> {
        self.db.collection(GROUPS)
    }

    fn memberships(&self) -> Collection<Membership> {
        self.db.collection(MEMBERSHIPS)
    }

    fn expenses(&self) -> Collection<Expense> {
        self.db.collection(EXPENSES)
    }

    fn shares(&self) -> Collection<ExpenseShare> {
        self.db.collection(SHARES)
    }

    fn settlements(&self) -> Collection<Settlement> {
        self.db.collection(SETTLEMENTS)
    }
}

async fn find_all<T>(
    collection: Collection<T>,
    filter: Document,
    session: &mut ClientSession,
) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let mut cursor = collection
        .find_with_session(filter, None, session)
        .await
        .map_err(store_error)?;
    cursor.stream(session).try_collect().await.map_err(store_error)
}

#[async_trait]
impl LedgerStore for MongoStore {
    type Tx = MongoTx;

    async fn begin(&self) -> StoreResult<MongoTx> {
        let mut session = self.client.start_session(None).await.map_err(store_error)?;
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session.start_transaction(options).await.map_err(store_error)?;
        Ok(MongoTx {
            db: self.db.clone(),
            session,
        })
    }
}

#[async_trait]
impl LedgerTx for MongoTx {
    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        self.users()
            .insert_one_with_session(user, None, &mut self.session)
            .await
            .map_err(|err| unique_error(err, UniqueKey::UserEmail))?;
        Ok(())
    }

    async fn get_user(&mut self, id: &UserId) -> StoreResult<Option<User>> {
        self.users()
            .find_one_with_session(doc! { "id": id.as_str() }, None, &mut self.session)
            .await
            .map_err(store_error)
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        self.users()
            .find_one_with_session(doc! { "email": email }, None, &mut self.session)
            .await
            .map_err(store_error)
    }

    async fn lock_user(&mut self, id: &UserId) -> StoreResult<Option<User>> {
        // Same trick as `lock_group`: a soft delete running concurrently also
        // writes this document, so one of the two transactions must abort.
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.users()
            .find_one_and_update_with_session(
                doc! { "id": id.as_str() },
                doc! { "$inc": { "revision": 1_i64 } },
                options,
                &mut self.session,
            )
            .await
            .map_err(store_error)
    }

    async fn list_users(&mut self) -> StoreResult<Vec<User>> {
        let mut users = find_all(self.users(), doc! {}, &mut self.session).await?;
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn set_user_status(&mut self, id: &UserId, status: UserStatus) -> StoreResult<()> {
        let update = match status {
            UserStatus::Active => doc! {
                "$set": { "status": "active" },
                "$unset": { "deletedAt": "" },
            },
            UserStatus::Deleted { at } => doc! {
                "$set": { "status": "deleted", "deletedAt": at.to_rfc3339() },
            },
        };
        self.users()
            .update_one_with_session(doc! { "id": id.as_str() }, update, None, &mut self.session)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn insert_group(&mut self, group: &Group) -> StoreResult<()> {
        self.groups()
            .insert_one_with_session(group, None, &mut self.session)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn get_group(&mut self, id: &GroupId) -> StoreResult<Option<Group>> {
        self.groups()
            .find_one_with_session(doc! { "id": id.as_str() }, None, &mut self.session)
            .await
            .map_err(store_error)
    }

    async fn lock_group(&mut self, id: &GroupId) -> StoreResult<Option<Group>> {
        // Writing the group document makes any concurrent transaction that
        // also locks it fail with a write conflict instead of write-skewing.
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.groups()
            .find_one_and_update_with_session(
                doc! { "id": id.as_str() },
                doc! { "$inc": { "revision": 1_i64 } },
                options,
                &mut self.session,
            )
            .await
            .map_err(store_error)
    }

    async fn list_groups(&mut self) -> StoreResult<Vec<Group>> {
        let mut groups = find_all(self.groups(), doc! {}, &mut self.session).await?;
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn delete_group(&mut self, id: &GroupId) -> StoreResult<()> {
        let filter = doc! { "groupId": id.as_str() };
        self.shares()
            .delete_many_with_session(filter.clone(), None, &mut self.session)
            .await
            .map_err(store_error)?;
        self.expenses()
            .delete_many_with_session(filter.clone(), None, &mut self.session)
            .await
            .map_err(store_error)?;
        self.settlements()
            .delete_many_with_session(filter.clone(), None, &mut self.session)
            .await
            .map_err(store_error)?;
        self.memberships()
            .delete_many_with_session(filter, None, &mut self.session)
            .await
            .map_err(store_error)?;
        self.groups()
            .delete_one_with_session(doc! { "id": id.as_str() }, None, &mut self.session)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn insert_membership(&mut self, membership: &Membership) -> StoreResult<()> {
        self.memberships()
            .insert_one_with_session(membership, None, &mut self.session)
            .await
            .map_err(|err| unique_error(err, UniqueKey::Membership))?;
        Ok(())
    }

    async fn find_membership(
        &mut self,
        group: &GroupId,
        user: &UserId,
    ) -> StoreResult<Option<Membership>> {
        self.memberships()
            .find_one_with_session(
                doc! { "groupId": group.as_str(), "userId": user.as_str() },
                None,
                &mut self.session,
            )
            .await
            .map_err(store_error)
    }

    async fn list_memberships(&mut self, group: &GroupId) -> StoreResult<Vec<Membership>> {
        let filter = doc! { "groupId": group.as_str() };
        let mut memberships = find_all(self.memberships(), filter, &mut self.session).await?;
        memberships.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        Ok(memberships)
    }

    async fn delete_membership(&mut self, id: &MembershipId) -> StoreResult<()> {
        self.memberships()
            .delete_one_with_session(doc! { "id": id.as_str() }, None, &mut self.session)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn insert_expense(&mut self, expense: &Expense) -> StoreResult<()> {
        self.expenses()
            .insert_one_with_session(expense, None, &mut self.session)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn insert_shares(&mut self, shares: &[ExpenseShare]) -> StoreResult<()> {
        if shares.is_empty() {
            return Ok(());
        }
        self.shares()
            .insert_many_with_session(shares, None, &mut self.session)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn list_expenses(&mut self, group: &GroupId) -> StoreResult<Vec<Expense>> {
        let filter = doc! { "groupId": group.as_str() };
        let mut expenses = find_all(self.expenses(), filter, &mut self.session).await?;
        expenses.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(expenses)
    }

    async fn list_shares(&mut self, group: &GroupId) -> StoreResult<Vec<ExpenseShare>> {
        find_all(self.shares(), doc! { "groupId": group.as_str() }, &mut self.session).await
    }

    async fn insert_settlement(&mut self, settlement: &Settlement) -> StoreResult<()> {
        self.settlements()
            .insert_one_with_session(settlement, None, &mut self.session)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn list_settlements(&mut self, group: &GroupId) -> StoreResult<Vec<Settlement>> {
        let filter = doc! { "groupId": group.as_str() };
        let mut settlements = find_all(self.settlements(), filter, &mut self.session).await?;
        settlements.sort_by(|a, b| a.settled_at.cmp(&b.settled_at).then_with(|| a.id.cmp(&b.id)));
        Ok(settlements)
    }

    async fn commit(mut self) -> StoreResult<()> {
        self.session.commit_transaction().await.map_err(store_error)
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY,
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn unique_error(err: MongoError, key: UniqueKey) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::UniqueViolation(key)
    } else {
        store_error(err)
    }
}

fn store_error(err: MongoError) -> StoreError {
    if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        StoreError::Conflict(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}
