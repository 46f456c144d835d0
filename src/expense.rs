use crate::error::{Entity, LedgerError, LedgerResult};
use crate::guard;
use crate::ledger::Ledger;
use crate::money::Money;
use crate::schemas::{
    Currency, Expense, ExpenseDetails, ExpenseId, ExpenseShare, GroupId, Membership, ShareId,
    UserId,
};
use crate::store::{LedgerStore, LedgerTx};
use crate::users::active_user;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};

/// Splits `expense` equally across `roster`, one share per member, in roster
/// order. Leftover minimum units go to the first members of the roster.
pub fn split_equally(expense: &Expense, roster: &[Membership]) -> LedgerResult<Vec<ExpenseShare>> {
    if roster.is_empty() {
        return Err(LedgerError::EmptyGroup);
    }
    let shares = roster
        .iter()
        .zip(expense.amount.split_even(roster.len()))
        .map(|(member, share_amount)| ExpenseShare {
            id: ShareId::generate(),
            expense_id: expense.id.clone(),
            group_id: expense.group_id.clone(),
            participant_id: member.user_id.clone(),
            share_amount,
            share_ratio: None,
        })
        .collect();
    Ok(shares)
}

/// Rejects amounts that are not strictly positive at ledger precision, or
/// that exceed [`Money::max_amount`].
pub(crate) fn positive_amount(amount: Decimal) -> LedgerResult<Money> {
    Money::checked_normalize(amount)
        .filter(Money::is_positive)
        .ok_or_else(|| {
            LedgerError::InvalidAmount(format!(
                "{} must be between {} and {}",
                amount,
                Money::min_unit(),
                Money::max_amount()
            ))
        })
}

impl<S: LedgerStore> Ledger<S> {
    /// Records an expense paid by `payer` and splits it equally across the
    /// group's current members. The expense and its shares are written in one
    /// transaction.
    pub async fn create_expense(
        &self,
        group: &GroupId,
        payer: &UserId,
        amount: Decimal,
        currency: Option<Currency>,
        description: Option<String>,
        occurred_at: Option<DateTime<Utc>>,
    ) -> LedgerResult<ExpenseDetails> {
        let mut tx = self.begin().await?;
        tx.lock_group(group)
            .await?
            .ok_or(LedgerError::NotFound(Entity::Group))?;
        active_user(&mut tx, payer).await?;
        guard::is_member(&mut tx, payer, group).await?.require("payer")?;

        let amount = positive_amount(amount)?;
        let now = Utc::now();
        let expense = Expense {
            id: ExpenseId::generate(),
            group_id: group.clone(),
            payer_id: payer.clone(),
            amount,
            currency: currency.unwrap_or(self.config().default_currency),
            description: description
                .map(|d| d.trim().to_owned())
                .filter(|d| !d.is_empty()),
            occurred_at: occurred_at.unwrap_or(now),
            created_at: now,
        };

        let roster = tx.list_memberships(group).await?;
        let shares = split_equally(&expense, &roster)?;

        tx.insert_expense(&expense).await?;
        tx.insert_shares(&shares).await?;
        tx.commit().await?;

        info!(
            group_id = %group,
            expense_id = %expense.id,
            amount = %expense.amount,
            members = shares.len(),
            "expense recorded"
        );
        Ok(ExpenseDetails { expense, shares })
    }

    pub async fn list_expenses(&self, group: &GroupId) -> LedgerResult<Vec<ExpenseDetails>> {
        let mut tx = self.begin().await?;
        tx.get_group(group)
            .await?
            .ok_or(LedgerError::NotFound(Entity::Group))?;
        let expenses = tx.list_expenses(group).await?;
        let shares = tx.list_shares(group).await?;
        tx.commit().await?;

        let mut by_expense: HashMap<ExpenseId, Vec<ExpenseShare>> = HashMap::new();
        for share in shares {
            by_expense
                .entry(share.expense_id.clone())
                .or_default()
                .push(share);
        }

        let details = expenses
            .into_iter()
            .map(|expense| {
                let shares = by_expense.remove(&expense.id).unwrap_or_default();
                if shares.is_empty() {
                    warn!(expense_id = %expense.id, "expense has no shares");
                }
                ExpenseDetails { expense, shares }
            })
            .collect();
        Ok(details)
    }
}
