use chrono::NaiveDateTime;
use cordnode_shared::api::BadgePurchaseReq;
use diesel::prelude::*;
use tracing::info;

use super::models::{BadgePurchase, NewBadgePurchase};
use super::{StorageError, Store, find_user, schema};

#[derive(Debug)]
pub enum BadgeOutcome {
    Recorded(BadgePurchase),
    /// The transaction hash was already recorded for some purchase.
    DuplicateTransaction,
    UnknownUser,
}

impl Store {
    /// Records a badge-of-honor purchase. The payment itself is verified
    /// upstream; this only keeps the receipt and flags the user.
    pub async fn record_badge_purchase(
        &self,
        req: &BadgePurchaseReq,
        now: NaiveDateTime,
    ) -> Result<BadgeOutcome, StorageError> {
        use schema::badge_purchases::dsl as bp;
        use schema::users::dsl as u;
        let tx_hash = req.transaction_hash.trim().to_string();
        let wallet = req.wallet_address.trim().to_string();
        if tx_hash.is_empty() || wallet.is_empty() {
            return Err(StorageError::InvalidInput(
                "wallet_address and transaction_hash are required".into(),
            ));
        }
        if !(req.amount_sol.is_finite() && req.amount_sol >= 0.0)
            || !(req.amount_usd.is_finite() && req.amount_usd >= 0.0)
        {
            return Err(StorageError::InvalidInput(
                "amounts must be finite and non-negative".into(),
            ));
        }
        let user_id = req.user_id.clone();
        let (amount_sol, amount_usd) = (req.amount_sol, req.amount_usd);
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<BadgeOutcome, StorageError> {
                if find_user(conn, &user_id)?.is_none() {
                    return Ok(BadgeOutcome::UnknownUser);
                }
                let seen: i64 = bp::badge_purchases
                    .filter(bp::transaction_hash.eq(&tx_hash))
                    .count()
                    .get_result(conn)?;
                if seen > 0 {
                    return Ok(BadgeOutcome::DuplicateTransaction);
                }
                let purchase: BadgePurchase = diesel::insert_into(bp::badge_purchases)
                    .values(&NewBadgePurchase {
                        user_id: &user_id,
                        wallet_address: &wallet,
                        transaction_hash: &tx_hash,
                        amount_sol,
                        amount_usd,
                        created_at: now,
                    })
                    .returning(BadgePurchase::as_returning())
                    .get_result(conn)?;
                diesel::update(u::users.find(&user_id))
                    .set(u::has_badge_of_honor.eq(true))
                    .execute(conn)?;
                info!(
                    user_id = %user_id,
                    purchase_id = purchase.id,
                    amount_usd,
                    "badge of honor recorded"
                );
                Ok(BadgeOutcome::Recorded(purchase))
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{self, ts};
    use super::*;

    fn purchase(user_id: &str, tx: &str) -> BadgePurchaseReq {
        BadgePurchaseReq {
            user_id: user_id.into(),
            wallet_address: "So1anaWa11et".into(),
            transaction_hash: tx.into(),
            amount_sol: 0.05,
            amount_usd: 9.99,
        }
    }

    #[tokio::test]
    async fn purchase_flags_user_and_rejects_replays() {
        let store = test_support::store().await;
        let now = ts(15, 18, 0, 0);
        let id = test_support::user_aged(&store, "patron", 1.0, now).await;

        let out = store
            .record_badge_purchase(&purchase(&id, "5xTxHash"), now)
            .await
            .unwrap();
        let BadgeOutcome::Recorded(row) = out else {
            panic!("unexpected {out:?}");
        };
        assert_eq!(row.user_id, id);
        assert!(store.get_user(&id).await.unwrap().unwrap().has_badge_of_honor);

        let again = store
            .record_badge_purchase(&purchase(&id, "5xTxHash"), now)
            .await
            .unwrap();
        assert!(matches!(again, BadgeOutcome::DuplicateTransaction));
    }

    #[tokio::test]
    async fn validation_and_unknown_user() {
        let store = test_support::store().await;
        let now = ts(15, 18, 0, 0);
        let out = store
            .record_badge_purchase(&purchase("ghost", "tx-1"), now)
            .await
            .unwrap();
        assert!(matches!(out, BadgeOutcome::UnknownUser));

        let mut bad = purchase("ghost", " ");
        assert!(matches!(
            store.record_badge_purchase(&bad, now).await,
            Err(StorageError::InvalidInput(_))
        ));
        bad.transaction_hash = "tx-2".into();
        bad.amount_usd = f64::NAN;
        assert!(store.record_badge_purchase(&bad, now).await.is_err());
    }
}
