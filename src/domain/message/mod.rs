pub mod events;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of characters of a message body forwarded as notification preview.
pub const PREVIEW_LEN: usize = 120;

/// A row of the `messages` table.
#[derive(Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
	pub id: Uuid,
	pub sender_id: String,
	pub recipient_id: String,
	pub content: String,
	pub sent_at: DateTime<Utc>,
	pub read_at: Option<DateTime<Utc>>,
}

impl Message {
	/// The party of this message that is not `viewer`.
	pub fn counterpart<'a>(
		&'a self,
		viewer: &str,
	) -> &'a str {
		if self.sender_id == viewer {
			&self.recipient_id
		} else {
			&self.sender_id
		}
	}

	pub fn involves(
		&self,
		viewer: &str,
	) -> bool {
		self.sender_id == viewer || self.recipient_id == viewer
	}

	/// Addressed to `viewer` and not read yet.
	pub fn is_unread_for(
		&self,
		viewer: &str,
	) -> bool {
		self.recipient_id == viewer && self.read_at.is_none()
	}

	pub fn is_between(
		&self,
		viewer: &str,
		counterpart: &str,
	) -> bool {
		(self.sender_id == viewer && self.recipient_id == counterpart) || (self.sender_id == counterpart && self.recipient_id == viewer)
	}

	/// Folds two snapshots of the same row. `read_at` never moves backwards,
	/// so whichever snapshot saw the row read wins that column.
	pub fn merge(
		mut self,
		other: Message,
	) -> Message {
		self.read_at = match (self.read_at, other.read_at) {
			(Some(a), Some(b)) => Some(a.max(b)),
			(a, b) => a.or(b),
		};
		self
	}

	pub fn preview(&self) -> String {
		self.content.chars().take(PREVIEW_LEN).collect()
	}
}

/// Payload for a send; the store assigns id and timestamps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewMessage {
	pub sender_id: String,
	pub recipient_id: String,
	pub content: String,
}

impl NewMessage {
	pub fn into_message(
		self,
		id: Uuid,
		sent_at: DateTime<Utc>,
	) -> Message {
		Message {
			id,
			sender_id: self.sender_id,
			recipient_id: self.recipient_id,
			content: self.content,
			sent_at,
			read_at: None,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
	#[default]
	Pending,
	Delivered,
	Failed,
}

/// A message shown optimistically before (or without) store confirmation.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct OutgoingMessage {
	pub local_id: Uuid,
	pub message: Message,
	pub delivery: DeliveryState,
}

impl OutgoingMessage {
	pub fn pending(new_message: NewMessage) -> Self {
		let local_id = Uuid::new_v4();
		Self {
			local_id,
			message: new_message.into_message(local_id, Utc::now()),
			delivery: DeliveryState::Pending,
		}
	}
}
