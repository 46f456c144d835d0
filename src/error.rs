use std::fmt;

/// Uniqueness constraints the store enforces on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    UserEmail,
    Membership,
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueKey::UserEmail => f.write_str("users.email"),
            UniqueKey::Membership => f.write_str("memberships.(groupId, userId)"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint {0} violated")]
    UniqueViolation(UniqueKey),
    #[error("transaction conflict: {0}")]
    Conflict(String),
    #[error("store failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Group,
    Membership,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::User => f.write_str("user"),
            Entity::Group => f.write_str("group"),
            Entity::Membership => f.write_str("membership"),
        }
    }
}

/// Every way a ledger operation can fail. A failed operation has written
/// nothing.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0} not found")]
    NotFound(Entity),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("user is already a member of this group")]
    AlreadyMember,
    #[error("cannot remove the last admin of a group")]
    LastAdmin,
    #[error("cannot split an expense in a group without members")]
    EmptyGroup,
    #[error("user is already deleted")]
    AlreadyDeleted,
    #[error("email already in use")]
    DuplicateEmail,
    #[error(transparent)]
    Storage(StoreError),
}

impl LedgerError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        LedgerError::Forbidden(reason.into())
    }

    /// Stable machine-readable code for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Forbidden(_) => "FORBIDDEN",
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::AlreadyMember => "ALREADY_MEMBER",
            LedgerError::LastAdmin => "LAST_ADMIN",
            LedgerError::EmptyGroup => "EMPTY_GROUP",
            LedgerError::AlreadyDeleted => "ALREADY_DELETED",
            LedgerError::DuplicateEmail => "DUPLICATE_EMAIL",
            LedgerError::Storage(StoreError::Conflict(_)) => "CONFLICT",
            LedgerError::Storage(_) => "STORE_FAILURE",
        }
    }
}

// Constraint violations raised by the store belong to the ledger taxonomy.
impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(UniqueKey::UserEmail) => LedgerError::DuplicateEmail,
            StoreError::UniqueViolation(UniqueKey::Membership) => LedgerError::AlreadyMember,
            other => LedgerError::Storage(other),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
