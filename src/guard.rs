//! Authorization guard.
//!
//! Mutators call these inside their own transaction, right before the writes
//! they gate, so the decision and the mutation commit together.

use crate::error::{LedgerError, LedgerResult, StoreResult};
use crate::schemas::{GroupId, Membership, Role, UserId};
use crate::store::LedgerTx;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Member,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NotMember,
    NotAdmin,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::NotMember => f.write_str("not a member of the group"),
            Denial::NotAdmin => f.write_str("not an admin of the group"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Granted(Membership),
    Denied(Denial),
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted(_))
    }

    /// Turns a denial into `Forbidden`, naming who was denied.
    pub fn require(self, who: &str) -> LedgerResult<Membership> {
        match self {
            Access::Granted(membership) => Ok(membership),
            Access::Denied(denial) => Err(LedgerError::forbidden(format!("{} is {}", who, denial))),
        }
    }
}

pub fn evaluate(membership: Option<Membership>, requirement: Requirement) -> Access {
    match (membership, requirement) {
        (None, _) => Access::Denied(Denial::NotMember),
        (Some(m), Requirement::Admin) if m.role != Role::Admin => Access::Denied(Denial::NotAdmin),
        (Some(m), _) => Access::Granted(m),
    }
}

pub async fn is_member<T: LedgerTx>(tx: &mut T, user: &UserId, group: &GroupId) -> StoreResult<Access> {
    let membership = tx.find_membership(group, user).await?;
    Ok(evaluate(membership, Requirement::Member))
}

pub async fn is_admin<T: LedgerTx>(tx: &mut T, user: &UserId, group: &GroupId) -> StoreResult<Access> {
    let membership = tx.find_membership(group, user).await?;
    Ok(evaluate(membership, Requirement::Admin))
}

/// Gate for admin-only actions: the requester must hold an ADMIN membership
/// and must not be soft-deleted.
pub async fn require_admin_requester<T: LedgerTx>(
    tx: &mut T,
    requester: &UserId,
    group: &GroupId,
) -> LedgerResult<Membership> {
    let membership = is_admin(tx, requester, group).await?.require("requester")?;
    match tx.lock_user(requester).await? {
        Some(user) if user.is_active() => Ok(membership),
        _ => Err(LedgerError::forbidden("requester account is deleted")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::MembershipId;
    use chrono::Utc;

    fn membership(role: Role) -> Membership {
        Membership {
            id: MembershipId::from("m1"),
            user_id: UserId::from("u1"),
            group_id: GroupId::from("g1"),
            role,
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn non_members_are_denied_everything() {
        assert_eq!(evaluate(None, Requirement::Member), Access::Denied(Denial::NotMember));
        assert_eq!(evaluate(None, Requirement::Admin), Access::Denied(Denial::NotMember));
    }

    #[test]
    fn members_are_not_admins() {
        assert!(evaluate(Some(membership(Role::Member)), Requirement::Member).is_granted());
        assert_eq!(
            evaluate(Some(membership(Role::Member)), Requirement::Admin),
            Access::Denied(Denial::NotAdmin)
        );
    }

    #[test]
    fn admins_pass_both_checks() {
        assert!(evaluate(Some(membership(Role::Admin)), Requirement::Member).is_granted());
        assert!(evaluate(Some(membership(Role::Admin)), Requirement::Admin).is_granted());
    }

    #[test]
    fn denial_becomes_forbidden() {
        let err = Access::Denied(Denial::NotAdmin).require("requester").unwrap_err();
        assert_eq!(err.to_string(), "forbidden: requester is not an admin of the group");
    }
}
