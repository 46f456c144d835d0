use crate::error::{Entity, LedgerError, LedgerResult};
use crate::guard;
use crate::ledger::Ledger;
use crate::schemas::{GroupId, Membership, MembershipId, Role, UserId};
use crate::store::{LedgerStore, LedgerTx};
use crate::users::active_user;
use chrono::Utc;
use tracing::{info, warn};

impl<S: LedgerStore> Ledger<S> {
    /// Adds `user` to the group, as MEMBER unless another role is given.
    pub async fn add_member(
        &self,
        group: &GroupId,
        user: &UserId,
        role: Option<Role>,
    ) -> LedgerResult<Membership> {
        let mut tx = self.begin().await?;
        tx.lock_group(group)
            .await?
            .ok_or(LedgerError::NotFound(Entity::Group))?;
        active_user(&mut tx, user).await?;

        if tx.find_membership(group, user).await?.is_some() {
            warn!(group_id = %group, user_id = %user, "user is already a member");
            return Err(LedgerError::AlreadyMember);
        }

        let membership = Membership {
            id: MembershipId::generate(),
            user_id: user.clone(),
            group_id: group.clone(),
            role: role.unwrap_or_default(),
            joined_at: Utc::now(),
        };
        tx.insert_membership(&membership).await?;
        tx.commit().await?;

        info!(group_id = %group, user_id = %user, role = ?membership.role, "member added");
        Ok(membership)
    }

    /// Removes `target` from the group on behalf of an admin `requester`.
    /// The group's last admin can never be removed.
    pub async fn remove_member(
        &self,
        requester: &UserId,
        target: &UserId,
        group: &GroupId,
    ) -> LedgerResult<()> {
        let mut tx = self.begin().await?;
        tx.lock_group(group)
            .await?
            .ok_or(LedgerError::NotFound(Entity::Group))?;
        guard::require_admin_requester(&mut tx, requester, group).await?;

        let membership = tx
            .find_membership(group, target)
            .await?
            .ok_or(LedgerError::NotFound(Entity::Membership))?;

        if membership.is_admin() {
            let admins = tx
                .list_memberships(group)
                .await?
                .iter()
                .filter(|m| m.is_admin())
                .count();
            if admins <= 1 {
                warn!(group_id = %group, user_id = %target, "refusing to remove last admin");
                return Err(LedgerError::LastAdmin);
            }
        }

        tx.delete_membership(&membership.id).await?;
        tx.commit().await?;

        info!(group_id = %group, user_id = %target, requester = %requester, "member removed");
        Ok(())
    }

    pub async fn list_members(&self, group: &GroupId) -> LedgerResult<Vec<Membership>> {
        let mut tx = self.begin().await?;
        tx.get_group(group)
            .await?
            .ok_or(LedgerError::NotFound(Entity::Group))?;
        let members = tx.list_memberships(group).await?;
        tx.commit().await?;
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testing;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn add_member_defaults_to_member_role() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;
        let bob = testing::user(&ledger, "Bob").await;
        let group = ledger.create_group("Trip", &alice.id).await.unwrap();

        let membership = ledger.add_member(&group.id, &bob.id, None).await.unwrap();
        assert_eq!(membership.role, Role::Member);
        assert_eq!(membership.group_id, group.id);

        let members = ledger.list_members(&group.id).await.unwrap();
        let ids: Vec<_> = members.iter().map(|m| m.user_id.clone()).collect();
        assert_eq!(ids, vec![alice.id, bob.id]);
    }

    #[tokio::test]
    async fn add_member_rejects_duplicates_and_unknowns() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;
        let group = ledger.create_group("Trip", &alice.id).await.unwrap();

        let err = ledger.add_member(&group.id, &alice.id, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyMember));

        let err = ledger
            .add_member(&group.id, &UserId::from("ghost"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(Entity::User)));

        let err = ledger
            .add_member(&GroupId::from("missing"), &alice.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(Entity::Group)));
    }

    #[tokio::test]
    async fn deleted_users_cannot_join() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;
        let bob = testing::user(&ledger, "Bob").await;
        let group = ledger.create_group("Trip", &alice.id).await.unwrap();
        ledger.soft_delete_user(&bob.id).await.unwrap();

        let err = ledger.add_member(&group.id, &bob.id, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(Entity::User)));
    }

    #[tokio::test]
    async fn admin_removes_member() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;
        let bob = testing::user(&ledger, "Bob").await;
        let group = testing::group_with(&ledger, &alice.id, &[&bob.id]).await;

        ledger.remove_member(&alice.id, &bob.id, &group.id).await.unwrap();
        assert_eq!(ledger.list_members(&group.id).await.unwrap().len(), 1);

        let err = ledger
            .remove_member(&alice.id, &bob.id, &group.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(Entity::Membership)));
    }

    #[tokio::test]
    async fn non_admin_cannot_remove() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;
        let bob = testing::user(&ledger, "Bob").await;
        let carol = testing::user(&ledger, "Carol").await;
        let group = testing::group_with(&ledger, &alice.id, &[&bob.id, &carol.id]).await;

        let err = ledger
            .remove_member(&bob.id, &carol.id, &group.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(_)));
        assert_eq!(ledger.list_members(&group.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn last_admin_stays() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;
        let bob = testing::user(&ledger, "Bob").await;
        let group = testing::group_with(&ledger, &alice.id, &[&bob.id]).await;

        let err = ledger
            .remove_member(&alice.id, &alice.id, &group.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::LastAdmin));

        let members = ledger.list_members(&group.id).await.unwrap();
        assert!(members.iter().any(|m| m.user_id == alice.id && m.is_admin()));
    }

    #[tokio::test]
    async fn one_of_two_admins_may_leave() {
        let ledger = testing::ledger();
        let alice = testing::user(&ledger, "Alice").await;
        let bob = testing::user(&ledger, "Bob").await;
        let group = ledger.create_group("Trip", &alice.id).await.unwrap();
        ledger
            .add_member(&group.id, &bob.id, Some(Role::Admin))
            .await
            .unwrap();

        ledger.remove_member(&bob.id, &alice.id, &group.id).await.unwrap();
        let err = ledger.remove_member(&bob.id, &bob.id, &group.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::LastAdmin));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admin_removals_keep_one_admin() {
        let ledger = Arc::new(testing::ledger());
        let alice = testing::user(&ledger, "Alice").await;
        let bob = testing::user(&ledger, "Bob").await;
        let group = ledger.create_group("Trip", &alice.id).await.unwrap();
        ledger
            .add_member(&group.id, &bob.id, Some(Role::Admin))
            .await
            .unwrap();

        let spawn_removal = |requester: UserId, target: UserId| {
            let ledger: Arc<Ledger<MemoryStore>> = Arc::clone(&ledger);
            let group = group.id.clone();
            tokio::spawn(async move { ledger.remove_member(&requester, &target, &group).await })
        };
        let first = spawn_removal(alice.id.clone(), bob.id.clone());
        let second = spawn_removal(bob.id.clone(), alice.id.clone());
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let admins = ledger
            .list_members(&group.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.is_admin())
            .count();
        assert_eq!(admins, 1);
    }
}
