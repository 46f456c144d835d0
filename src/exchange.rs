use crate::error::LedgerResult;
use crate::ledger::Ledger;
use crate::money::Money;
use crate::schemas::{Balance, GroupId, UserId};
use crate::store::LedgerStore;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
struct PersonalBalance {
    id: UserId,
    balance: Money,
}

/// A payment from a debtor to a creditor that moves both of them toward zero.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub payer: UserId,
    pub receiver: UserId,
    pub amount: Money,
}

/// Greedy debt simplification: the largest debtor pays the largest creditor
/// until one of them is settled, then repeat.
pub fn simplify(balances: &[Balance]) -> Vec<Exchange> {
    let mut payers = Vec::new();
    let mut receivers = Vec::new();
    for balance in balances {
        let person = PersonalBalance {
            id: balance.user_id.clone(),
            balance: balance.amount.abs(),
        };
        if balance.amount.is_negative() {
            payers.push(person);
        } else if balance.amount.is_positive() {
            receivers.push(person);
        }
    }

    // Ascending, so the largest positions sit at the end.
    let by_size = |a: &PersonalBalance, b: &PersonalBalance| {
        a.balance.cmp(&b.balance).then_with(|| b.id.cmp(&a.id))
    };
    payers.sort_by(by_size);
    receivers.sort_by(by_size);

    let mut exchanges = Vec::new();
    loop {
        let (Some(payer), Some(receiver)) = (payers.last_mut(), receivers.last_mut()) else {
            break;
        };
        let amount = payer.balance.min(receiver.balance);
        exchanges.push(Exchange {
            payer: payer.id.clone(),
            receiver: receiver.id.clone(),
            amount,
        });
        payer.balance -= amount;
        receiver.balance -= amount;

        if payer.balance.is_zero() {
            payers.pop();
        }
        if receiver.balance.is_zero() {
            receivers.pop();
        }
    }
    exchanges
}

impl<S: LedgerStore> Ledger<S> {
    /// Suggests a short list of payments that would settle the whole group.
    pub async fn suggest_settlements(&self, group: &GroupId) -> LedgerResult<Vec<Exchange>> {
        let balances = self.get_balances(group).await?;
        Ok(simplify(&balances))
    }
}
