pub(crate) mod memory;
pub(crate) mod message_repository;
pub(crate) mod settings_repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use self::{memory::InMemoryMessageStore, memory::InMemorySettingsStore, message_repository::PgMessageStore, settings_repository::PgSettingsStore};
use crate::domain::{message::Message, settings::NotificationSettings};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),
	#[error("store unavailable: {0}")]
	Unavailable(String),
}

/// Access to the `messages` table.
#[async_trait]
pub trait MessageStore: Send + Sync {
	/// Both directions of the conversation, oldest first.
	async fn fetch_thread_messages(
		&self,
		viewer_id: &str,
		counterpart_id: &str,
	) -> Result<Vec<Message>, StoreError>;

	/// Every row the viewer sent or received, newest first.
	async fn fetch_inbox_messages(
		&self,
		viewer_id: &str,
	) -> Result<Vec<Message>, StoreError>;

	async fn send_message(
		&self,
		sender_id: &str,
		recipient_id: &str,
		content: &str,
	) -> Result<Message, StoreError>;

	/// Sets `read_at = now` on the viewer's unread rows from `counterpart_id`
	/// and returns the rows it changed. Rows already read are left alone, so
	/// a second call changes nothing.
	async fn mark_thread_read(
		&self,
		viewer_id: &str,
		counterpart_id: &str,
		now: DateTime<Utc>,
	) -> Result<Vec<Message>, StoreError>;

	async fn count_unread(
		&self,
		viewer_id: &str,
	) -> Result<u64, StoreError>;
}

/// Access to `user_settings`.
#[async_trait]
pub trait SettingsStore: Send + Sync {
	async fn notification_settings(
		&self,
		user_id: &str,
	) -> Result<Option<NotificationSettings>, StoreError>;
}
