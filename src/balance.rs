use crate::error::{Entity, LedgerError, LedgerResult};
use crate::ledger::Ledger;
use crate::money::Money;
use crate::schemas::{Balance, Expense, ExpenseShare, GroupId, Membership, Settlement, UserId};
use crate::store::{LedgerStore, LedgerTx};
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Net positions in first-seen order: current roster first, then anyone else
/// who appears in the group's history.
#[derive(Default)]
struct Tally {
    order: Vec<UserId>,
    amounts: HashMap<UserId, Money>,
}

impl Tally {
    fn entry(&mut self, user: &UserId) -> &mut Money {
        if !self.amounts.contains_key(user) {
            self.order.push(user.clone());
        }
        self.amounts.entry(user.clone()).or_insert(Money::ZERO)
    }

    fn credit(&mut self, user: &UserId, amount: Money) -> Option<()> {
        let entry = self.entry(user);
        *entry = entry.checked_add(amount)?;
        Some(())
    }

    fn debit(&mut self, user: &UserId, amount: Money) -> Option<()> {
        let entry = self.entry(user);
        *entry = entry.checked_sub(amount)?;
        Some(())
    }

    fn into_balances(mut self, roster: &[Membership]) -> Vec<(UserId, Money)> {
        let is_member = |user: &UserId| roster.iter().any(|m| &m.user_id == user);
        self.order
            .into_iter()
            .filter_map(|user| {
                let amount = self.amounts.remove(&user)?;
                // Former members only show up while they still owe or are owed.
                (is_member(&user) || !amount.is_zero()).then_some((user, amount))
            })
            .collect()
    }
}

fn out_of_range(group: &GroupId) -> LedgerError {
    error!(group_id = %group, "balance totals overflowed");
    LedgerError::InvalidAmount(format!("balances of group {} exceed the supported range", group))
}

/// Folds any non-zero total into the first balance so the vector sums to zero.
fn close_residual(group: &GroupId, balances: &mut [(UserId, Money)]) -> Option<()> {
    let residual = balances
        .iter()
        .try_fold(Money::ZERO, |total, (_, amount)| total.checked_add(*amount))?;
    if residual.is_zero() {
        return Some(());
    }
    if let Some((user, first)) = balances.first_mut() {
        warn!(
            group_id = %group,
            user_id = %user,
            residual = %residual.amount(),
            "balances do not sum to zero, closing residual against first member"
        );
        *first = first.checked_sub(residual)?;
    }
    Some(())
}

/// Re-derives every member's net position from the group's full history.
///
/// Positive means the member is owed money, negative means they owe. Fails
/// with `InvalidAmount` instead of overflowing when the history holds amounts
/// beyond what the ledger accepts.
pub fn compute_balances(
    group: &GroupId,
    roster: &[Membership],
    expenses: &[Expense],
    shares: &[ExpenseShare],
    settlements: &[Settlement],
) -> LedgerResult<Vec<Balance>> {
    fold_history(group, roster, expenses, shares, settlements).ok_or_else(|| out_of_range(group))
}

fn fold_history(
    group: &GroupId,
    roster: &[Membership],
    expenses: &[Expense],
    shares: &[ExpenseShare],
    settlements: &[Settlement],
) -> Option<Vec<Balance>> {
    let mut tally = Tally::default();
    for member in roster {
        tally.entry(&member.user_id);
    }
    for expense in expenses {
        tally.credit(&expense.payer_id, expense.amount)?;
    }
    for share in shares {
        tally.debit(&share.participant_id, share.share_amount)?;
    }
    for settlement in settlements {
        tally.debit(&settlement.payer_id, settlement.amount)?;
        tally.credit(&settlement.payee_id, settlement.amount)?;
    }

    let mut balances = tally.into_balances(roster);
    close_residual(group, &mut balances)?;
    for (_, amount) in balances.iter_mut() {
        *amount = amount.normalized();
    }
    // Rounding stored values of finer precision can move the total again.
    close_residual(group, &mut balances)?;

    Some(
        balances
            .into_iter()
            .map(|(user_id, amount)| Balance { user_id, amount })
            .collect(),
    )
}

impl<S: LedgerStore> Ledger<S> {
    pub async fn get_balances(&self, group: &GroupId) -> LedgerResult<Vec<Balance>> {
        let mut tx = self.begin().await?;
        tx.get_group(group)
            .await?
            .ok_or(LedgerError::NotFound(Entity::Group))?;
        let roster = tx.list_memberships(group).await?;
        let expenses = tx.list_expenses(group).await?;
        let shares = tx.list_shares(group).await?;
        let settlements = tx.list_settlements(group).await?;
        tx.commit().await?;

        debug!(
            group_id = %group,
            expenses = expenses.len(),
            settlements = settlements.len(),
            "computing balances"
        );
        compute_balances(group, &roster, &expenses, &shares, &settlements)
    }
}
