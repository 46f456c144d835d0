use crate::error::{Entity, LedgerError, LedgerResult};
use crate::guard;
use crate::ledger::Ledger;
use crate::schemas::{Group, GroupId, Membership, MembershipId, Role, UserId};
use crate::store::{LedgerStore, LedgerTx};
use crate::users::active_user;
use chrono::Utc;
use tracing::info;

impl<S: LedgerStore> Ledger<S> {
    /// Creates a group whose only member is its creator, as ADMIN.
    pub async fn create_group(&self, name: &str, creator: &UserId) -> LedgerResult<Group> {
        let mut tx = self.begin().await?;
        active_user(&mut tx, creator).await?;

        let now = Utc::now();
        let group = Group {
            id: GroupId::generate(),
            name: name.trim().to_owned(),
            created_at: now,
        };
        let founder = Membership {
            id: MembershipId::generate(),
            user_id: creator.clone(),
            group_id: group.id.clone(),
            role: Role::Admin,
            joined_at: now,
        };
        tx.insert_group(&group).await?;
        tx.insert_membership(&founder).await?;
        tx.commit().await?;

        info!(group_id = %group.id, creator = %creator, "group created");
        Ok(group)
    }

    pub async fn get_group(&self, id: &GroupId) -> LedgerResult<Group> {
        let mut tx = self.begin().await?;
        let group = tx.get_group(id).await?;
        tx.commit().await?;
        group.ok_or(LedgerError::NotFound(Entity::Group))
    }

    pub async fn list_groups(&self) -> LedgerResult<Vec<Group>> {
        let mut tx = self.begin().await?;
        let groups = tx.list_groups().await?;
        tx.commit().await?;
        Ok(groups)
    }

    /// Deletes the group and everything it owns. Admin only.
    pub async fn delete_group(&self, id: &GroupId, requester: &UserId) -> LedgerResult<()> {
        let mut tx = self.begin().await?;
        tx.lock_group(id)
            .await?
            .ok_or(LedgerError::NotFound(Entity::Group))?;
        guard::require_admin_requester(&mut tx, requester, id).await?;

        tx.delete_group(id).await?;
        tx.commit().await?;

        info!(group_id = %id, requester = %requester, "group deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testing;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn creator_becomes_sole_admin() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;

        let group = ledger.create_group("  Cabin  ", &alice.id).await.unwrap();
        assert_eq!(group.name, "Cabin");
        assert_eq!(ledger.get_group(&group.id).await.unwrap(), group);

        let members = ledger.list_members(&group.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, alice.id);
        assert_eq!(members[0].role, Role::Admin);
    }

    #[tokio::test]
    async fn group_names_need_not_be_unique() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;
        ledger.create_group("Trip", &alice.id).await.unwrap();
        ledger.create_group("Trip", &alice.id).await.unwrap();
        assert_eq!(ledger.list_groups().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_or_deleted_creator_is_not_found() {
        let ledger = testing::ledger();
        let err = ledger.create_group("Trip", &UserId::from("ghost")).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(Entity::User)));

        let bob = testing::user(&ledger, "Bob").await;
        ledger.soft_delete_user(&bob.id).await.unwrap();
        let err = ledger.create_group("Trip", &bob.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(Entity::User)));
        assert!(ledger.list_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_group_cascades_everything() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;
        let bob = testing::user(&ledger, "Bob").await;
        let group = testing::group_with(&ledger, &alice.id, &[&bob.id]).await;
        ledger
            .create_expense(&group.id, &alice.id, dec!(40), None, None, None)
            .await
            .unwrap();
        ledger
            .create_settlement(&group.id, &bob.id, &alice.id, dec!(20), None)
            .await
            .unwrap();

        ledger.delete_group(&group.id, &alice.id).await.unwrap();

        for result in [
            ledger.get_group(&group.id).await.map(|_| ()),
            ledger.list_members(&group.id).await.map(|_| ()),
            ledger.list_expenses(&group.id).await.map(|_| ()),
            ledger.get_balances(&group.id).await.map(|_| ()),
        ] {
            assert!(matches!(result, Err(LedgerError::NotFound(Entity::Group))));
        }
        // Users are referenced, not owned.
        assert!(ledger.get_user(&bob.id).await.is_ok());
    }

    #[tokio::test]
    async fn only_admins_delete_groups() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;
        let bob = testing::user(&ledger, "Bob").await;
        let carol = testing::user(&ledger, "Carol").await;
        let group = testing::group_with(&ledger, &alice.id, &[&bob.id]).await;

        for requester in [&bob.id, &carol.id] {
            let err = ledger.delete_group(&group.id, requester).await.unwrap_err();
            assert!(matches!(err, LedgerError::Forbidden(_)));
        }
        assert_eq!(ledger.list_members(&group.id).await.unwrap().len(), 2);

        let err = ledger
            .delete_group(&GroupId::from("missing"), &alice.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(Entity::Group)));
    }

    #[tokio::test]
    async fn deleted_admin_cannot_delete_group() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;
        let group = ledger.create_group("Trip", &alice.id).await.unwrap();
        ledger.soft_delete_user(&alice.id).await.unwrap();

        let err = ledger.delete_group(&group.id, &alice.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(_)));
        assert!(ledger.get_group(&group.id).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn balances_during_delete_see_all_history_or_none() {
        let ledger: Arc<Ledger<MemoryStore>> = Arc::new(testing::ledger());
        let alice = testing::user(&ledger, "Alice").await;
        let bob = testing::user(&ledger, "Bob").await;

        for _ in 0..20 {
            let group = testing::group_with(&ledger, &alice.id, &[&bob.id]).await;
            ledger
                .create_expense(&group.id, &alice.id, dec!(40), None, None, None)
                .await
                .unwrap();
            ledger
                .create_settlement(&group.id, &bob.id, &alice.id, dec!(5), None)
                .await
                .unwrap();

            let reader = {
                let ledger = Arc::clone(&ledger);
                let group = group.id.clone();
                tokio::spawn(async move { ledger.get_balances(&group).await })
            };
            let deleter = {
                let ledger = Arc::clone(&ledger);
                let (group, admin) = (group.id.clone(), alice.id.clone());
                tokio::spawn(async move { ledger.delete_group(&group, &admin).await })
            };
            deleter.await.unwrap().unwrap();

            match reader.await.unwrap() {
                Ok(balances) => {
                    let amounts: Vec<Decimal> = balances.iter().map(|b| b.amount.amount()).collect();
                    assert_eq!(amounts, vec![dec!(25.00), dec!(-25.00)]);
                }
                Err(err) => assert!(matches!(err, LedgerError::NotFound(Entity::Group))),
            }
        }
    }
}
