use crate::error::{Entity, LedgerError, LedgerResult};
use crate::expense::positive_amount;
use crate::guard;
use crate::ledger::Ledger;
use crate::schemas::{Currency, GroupId, Settlement, SettlementId, UserId};
use crate::store::{LedgerStore, LedgerTx};
use crate::users::active_user;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

impl<S: LedgerStore> Ledger<S> {
    /// Records a direct payment from `payer` to `payee`. Balances pick it up
    /// the next time they are computed.
    pub async fn create_settlement(
        &self,
        group: &GroupId,
        payer: &UserId,
        payee: &UserId,
        amount: Decimal,
        currency: Option<Currency>,
    ) -> LedgerResult<Settlement> {
        let mut tx = self.begin().await?;
        tx.lock_group(group)
            .await?
            .ok_or(LedgerError::NotFound(Entity::Group))?;
        active_user(&mut tx, payer).await?;
        active_user(&mut tx, payee).await?;

        if payer == payee {
            return Err(LedgerError::forbidden("payer and payee must be different members"));
        }
        guard::is_member(&mut tx, payer, group).await?.require("payer")?;
        guard::is_member(&mut tx, payee, group).await?.require("payee")?;

        let settlement = Settlement {
            id: SettlementId::generate(),
            group_id: group.clone(),
            payer_id: payer.clone(),
            payee_id: payee.clone(),
            amount: positive_amount(amount)?,
            currency: currency.unwrap_or(self.config().default_currency),
            settled_at: Utc::now(),
        };
        tx.insert_settlement(&settlement).await?;
        tx.commit().await?;

        info!(
            group_id = %group,
            settlement_id = %settlement.id,
            payer = %payer,
            payee = %payee,
            amount = %settlement.amount,
            "settlement recorded"
        );
        Ok(settlement)
    }

    pub async fn list_settlements(&self, group: &GroupId) -> LedgerResult<Vec<Settlement>> {
        let mut tx = self.begin().await?;
        tx.get_group(group)
            .await?
            .ok_or(LedgerError::NotFound(Entity::Group))?;
        let settlements = tx.list_settlements(group).await?;
        tx.commit().await?;
        Ok(settlements)
    }
}
