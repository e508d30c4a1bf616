use chrono::NaiveDateTime;
use cordnode_shared::policy;
use diesel::prelude::*;
use tracing::{debug, info};

use super::models::{NewReferralData, ReferralData, User};
use super::{Credit, StorageError, Store, credit_user, find_user, schema};

#[derive(Debug, Clone, PartialEq)]
pub struct ReferralBonus {
    pub referrer_id: String,
    pub welcome_bonus: f64,
    pub referrer_bonus: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReferralOutcome {
    Applied(ReferralBonus),
    AlreadyReferred,
    InvalidCode,
    SelfReferral,
    UnknownUser,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommissionOutcome {
    /// The earner was never referred; nothing to pay.
    NoReferrer,
    Paid { referrer_id: String, amount: f64 },
    UnknownUser,
}

impl Store {
    /// Links a user to the owner of `code` and pays the one-time signup
    /// bonuses to both sides.
    pub async fn process_new_user_referral(
        &self,
        user_id: &str,
        code: &str,
        now: NaiveDateTime,
    ) -> Result<ReferralOutcome, StorageError> {
        use schema::referral_data::dsl as rd;
        use schema::users::dsl as u;
        let user_id = user_id.to_string();
        let code = code.trim().to_uppercase();
        let signup_rate = self.rules.signup_commission_rate;
        if code.is_empty() {
            return Ok(ReferralOutcome::InvalidCode);
        }
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<ReferralOutcome, StorageError> {
                let Some(user) = find_user(conn, &user_id)? else {
                    return Ok(ReferralOutcome::UnknownUser);
                };
                if user.referred_by_user_id.is_some() {
                    return Ok(ReferralOutcome::AlreadyReferred);
                }
                let Some(referrer) = u::users
                    .filter(u::referral_code.eq(&code))
                    .select(User::as_select())
                    .first(conn)
                    .optional()?
                else {
                    return Ok(ReferralOutcome::InvalidCode);
                };
                if referrer.id == user.id {
                    return Ok(ReferralOutcome::SelfReferral);
                }

                let welcome_bonus = policy::welcome_bonus(user.account_age_years, user.multiplier);
                let referrer_bonus = welcome_bonus * signup_rate;

                diesel::update(u::users.find(&user.id))
                    .set(u::referred_by_user_id.eq(Some(&referrer.id)))
                    .execute(conn)?;
                credit_user(conn, &user.id, welcome_bonus, Credit::Reward)?;

                diesel::update(u::users.find(&referrer.id))
                    .set(u::total_referrals.eq(u::total_referrals + 1))
                    .execute(conn)?;
                credit_user(conn, &referrer.id, referrer_bonus, Credit::Commission)?;

                diesel::insert_into(rd::referral_data)
                    .values(&NewReferralData {
                        referrer_id: &referrer.id,
                        referred_id: &user.id,
                        code: &code,
                        created_at: now,
                    })
                    .execute(conn)?;
                diesel::update(rd::referral_data.filter(rd::referred_id.eq(&user.id)))
                    .set(rd::total_earnings.eq(rd::total_earnings + referrer_bonus))
                    .execute(conn)?;

                info!(
                    user_id = %user.id,
                    referrer_id = %referrer.id,
                    welcome_bonus,
                    referrer_bonus,
                    "referral applied"
                );
                Ok(ReferralOutcome::Applied(ReferralBonus {
                    referrer_id: referrer.id,
                    welcome_bonus,
                    referrer_bonus,
                }))
            })
        })
        .await
    }

    /// Pays the referrer's commission on `amount` earned by `user_id`.
    pub async fn distribute_referral_reward(
        &self,
        user_id: &str,
        amount: f64,
    ) -> Result<CommissionOutcome, StorageError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(StorageError::InvalidInput(
                "commission base must be finite and non-negative".into(),
            ));
        }
        let user_id = user_id.to_string();
        let rate = self.rules.commission_rate;
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<CommissionOutcome, StorageError> {
                Ok(distribute_commission(conn, &user_id, amount, rate)?)
            })
        })
        .await
    }

    /// Users referred by `user_id`, newest first, with their usernames.
    pub async fn list_referrals(
        &self,
        user_id: &str,
    ) -> Result<Vec<(ReferralData, String)>, StorageError> {
        use schema::referral_data::dsl as rd;
        use schema::users::dsl as u;
        let user_id = user_id.to_string();
        self.blocking(move |conn| {
            Ok(rd::referral_data
                .inner_join(u::users.on(u::id.eq(rd::referred_id)))
                .filter(rd::referrer_id.eq(&user_id))
                .order((rd::created_at.desc(), rd::id.desc()))
                .select((ReferralData::as_select(), u::username))
                .load(conn)?)
        })
        .await
    }
}

/// Commission step shared by task completion and mining flushes. Runs inside
/// the caller's transaction.
pub(crate) fn distribute_commission(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: f64,
    rate: f64,
) -> QueryResult<CommissionOutcome> {
    use schema::referral_data::dsl as rd;
    let Some(user) = find_user(conn, user_id)? else {
        return Ok(CommissionOutcome::UnknownUser);
    };
    let Some(referrer_id) = user.referred_by_user_id else {
        return Ok(CommissionOutcome::NoReferrer);
    };
    let commission = amount * rate;
    if commission > 0.0 {
        credit_user(conn, &referrer_id, commission, Credit::Commission)?;
        diesel::update(rd::referral_data.filter(rd::referred_id.eq(user_id)))
            .set(rd::total_earnings.eq(rd::total_earnings + commission))
            .execute(conn)?;
        debug!(
            user_id = %user_id,
            referrer_id = %referrer_id,
            commission,
            "referral commission paid"
        );
    }
    Ok(CommissionOutcome::Paid {
        referrer_id,
        amount: commission,
    })
}
