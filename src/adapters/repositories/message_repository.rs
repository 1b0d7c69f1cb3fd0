use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{MessageStore, StoreError};
use crate::domain::message::Message;

pub struct PgMessageStore {
	pool: &'static PgPool,
}

impl PgMessageStore {
	pub fn new(pool: &'static PgPool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl MessageStore for PgMessageStore {
	async fn fetch_thread_messages(
		&self,
		viewer_id: &str,
		counterpart_id: &str,
	) -> Result<Vec<Message>, StoreError> {
		let rows = sqlx::query_as::<_, Message>(
			r#"
			SELECT id, sender_id, recipient_id, content, sent_at, read_at
			FROM messages
			WHERE (sender_id = $1 AND recipient_id = $2)
			   OR (sender_id = $2 AND recipient_id = $1)
			ORDER BY sent_at ASC
			"#,
		)
		.bind(viewer_id)
		.bind(counterpart_id)
		.fetch_all(self.pool)
		.await?;
		Ok(rows)
	}

	async fn fetch_inbox_messages(
		&self,
		viewer_id: &str,
	) -> Result<Vec<Message>, StoreError> {
		let rows = sqlx::query_as::<_, Message>(
			r#"
			SELECT id, sender_id, recipient_id, content, sent_at, read_at
			FROM messages
			WHERE sender_id = $1 OR recipient_id = $1
			ORDER BY sent_at DESC
			"#,
		)
		.bind(viewer_id)
		.fetch_all(self.pool)
		.await?;
		Ok(rows)
	}

	async fn send_message(
		&self,
		sender_id: &str,
		recipient_id: &str,
		content: &str,
	) -> Result<Message, StoreError> {
		let row = sqlx::query_as::<_, Message>(
			r#"
			INSERT INTO messages (sender_id, recipient_id, content)
			VALUES ($1, $2, $3)
			RETURNING id, sender_id, recipient_id, content, sent_at, read_at
			"#,
		)
		.bind(sender_id)
		.bind(recipient_id)
		.bind(content)
		.fetch_one(self.pool)
		.await?;
		Ok(row)
	}

	async fn mark_thread_read(
		&self,
		viewer_id: &str,
		counterpart_id: &str,
		now: DateTime<Utc>,
	) -> Result<Vec<Message>, StoreError> {
		let rows = sqlx::query_as::<_, Message>(
			r#"
			UPDATE messages
			SET read_at = $3
			WHERE recipient_id = $1 AND sender_id = $2 AND read_at IS NULL
			RETURNING id, sender_id, recipient_id, content, sent_at, read_at
			"#,
		)
		.bind(viewer_id)
		.bind(counterpart_id)
		.bind(now)
		.fetch_all(self.pool)
		.await?;
		Ok(rows)
	}

	async fn count_unread(
		&self,
		viewer_id: &str,
	) -> Result<u64, StoreError> {
		let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE recipient_id = $1 AND read_at IS NULL")
			.bind(viewer_id)
			.fetch_one(self.pool)
			.await?;
		Ok(count.max(0) as u64)
	}
}
