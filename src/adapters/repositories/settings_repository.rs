use async_trait::async_trait;
use sqlx::PgPool;

use super::{SettingsStore, StoreError};
use crate::domain::settings::NotificationSettings;

pub struct PgSettingsStore {
	pool: &'static PgPool,
}

impl PgSettingsStore {
	pub fn new(pool: &'static PgPool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
	async fn notification_settings(
		&self,
		user_id: &str,
	) -> Result<Option<NotificationSettings>, StoreError> {
		let settings = sqlx::query_as::<_, NotificationSettings>(
			"SELECT user_id, notification_email, email_on_message FROM user_settings WHERE user_id = $1",
		)
		.bind(user_id)
		.fetch_optional(self.pool)
		.await?;
		Ok(settings)
	}
}
