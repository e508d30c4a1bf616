use cordnode_shared::domain::UserSettings;
use diesel::prelude::*;
use tracing::debug;

use super::models::{NewUserSettings, UserSettingsRow};
use super::{StorageError, Store, find_user, schema};
use crate::ledger;

impl Store {
    /// Stored preferences, or the defaults when the user never saved any.
    /// `None` for an unknown user.
    pub async fn get_settings(&self, user_id: &str) -> Result<Option<UserSettings>, StorageError> {
        use schema::user_settings::dsl as us;
        let user_id = user_id.to_string();
        self.blocking(move |conn| {
            if find_user(conn, &user_id)?.is_none() {
                return Ok(None);
            }
            let row: Option<UserSettingsRow> = us::user_settings
                .find(&user_id)
                .select(UserSettingsRow::as_select())
                .first(conn)
                .optional()?;
            match row {
                Some(r) => Ok(Some(serde_json::from_str(&r.settings_json)?)),
                None => Ok(Some(UserSettings::default())),
            }
        })
        .await
    }

    pub async fn put_settings(
        &self,
        user_id: &str,
        settings: &UserSettings,
    ) -> Result<Option<UserSettings>, StorageError> {
        use schema::user_settings::dsl as us;
        let user_id = user_id.to_string();
        let json = serde_json::to_string(settings)?;
        let settings = settings.clone();
        let now = ledger::now();
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<Option<UserSettings>, StorageError> {
                if find_user(conn, &user_id)?.is_none() {
                    return Ok(None);
                }
                diesel::insert_into(us::user_settings)
                    .values(&NewUserSettings {
                        user_id: &user_id,
                        settings_json: &json,
                        updated_at: now,
                    })
                    .on_conflict(us::user_id)
                    .do_update()
                    .set((us::settings_json.eq(&json), us::updated_at.eq(now)))
                    .execute(conn)?;
                debug!(user_id = %user_id, "settings saved");
                Ok(Some(settings))
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{self, ts};
    use cordnode_shared::domain::{MiningIntensity, ProfileVisibility, Theme, UserSettings};

    #[tokio::test]
    async fn defaults_until_saved_then_round_trip() {
        let store = test_support::store().await;
        let id = test_support::user_aged(&store, "prefs", 1.0, ts(14, 8, 0, 0)).await;
        let initial = store.get_settings(&id).await.unwrap().unwrap();
        assert_eq!(initial, UserSettings::default());

        let mut custom = UserSettings::default();
        custom.display.theme = Theme::Light;
        custom.mining.intensity = MiningIntensity::High;
        custom.privacy.profile_visibility = ProfileVisibility::Private;
        custom.notifications.email_digest = true;
        store.put_settings(&id, &custom).await.unwrap();
        assert_eq!(store.get_settings(&id).await.unwrap().unwrap(), custom);

        custom.display.compact_mode = !custom.display.compact_mode;
        store.put_settings(&id, &custom).await.unwrap();
        assert_eq!(store.get_settings(&id).await.unwrap().unwrap(), custom);
    }

    #[tokio::test]
    async fn unknown_user() {
        let store = test_support::store().await;
        assert!(store.get_settings("ghost").await.unwrap().is_none());
        assert!(
            store
                .put_settings("ghost", &UserSettings::default())
                .await
                .unwrap()
                .is_none()
        );
    }
}
