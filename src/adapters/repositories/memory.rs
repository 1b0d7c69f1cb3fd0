use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, Ordering},
		Mutex,
	},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{MessageStore, SettingsStore, StoreError};
use crate::domain::{
	message::{Message, NewMessage},
	settings::NotificationSettings,
};

/// Process-local message table for development and tests. `set_offline`
/// makes every call fail the way an unreachable database would.
#[derive(Default)]
pub struct InMemoryMessageStore {
	rows: Mutex<Vec<Message>>,
	offline: AtomicBool,
}

impl InMemoryMessageStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_offline(
		&self,
		offline: bool,
	) {
		self.offline.store(offline, Ordering::SeqCst);
	}

	pub fn insert(
		&self,
		message: Message,
	) {
		self.lock().push(message);
	}

	pub fn rows(&self) -> Vec<Message> {
		self.lock().clone()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
		// a panicked writer cannot leave a half-written Vec behind
		self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	fn online(&self) -> Result<(), StoreError> {
		if self.offline.load(Ordering::SeqCst) {
			return Err(StoreError::Unavailable("in-memory store is offline".into()));
		}
		Ok(())
	}
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
	async fn fetch_thread_messages(
		&self,
		viewer_id: &str,
		counterpart_id: &str,
	) -> Result<Vec<Message>, StoreError> {
		self.online()?;
		let mut rows: Vec<Message> = self.lock().iter().filter(|m| m.is_between(viewer_id, counterpart_id)).cloned().collect();
		rows.sort_by_key(|m| m.sent_at);
		Ok(rows)
	}

	async fn fetch_inbox_messages(
		&self,
		viewer_id: &str,
	) -> Result<Vec<Message>, StoreError> {
		self.online()?;
		let mut rows: Vec<Message> = self.lock().iter().filter(|m| m.involves(viewer_id)).cloned().collect();
		rows.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
		Ok(rows)
	}

	async fn send_message(
		&self,
		sender_id: &str,
		recipient_id: &str,
		content: &str,
	) -> Result<Message, StoreError> {
		self.online()?;
		let mut rows = self.lock();
		// keep sent_at strictly increasing so ordering is stable
		let latest: Option<DateTime<Utc>> = rows.iter().map(|m| m.sent_at).max();
		let now = Utc::now();
		let sent_at = match latest {
			Some(latest) if latest >= now => latest + Duration::microseconds(1),
			_ => now,
		};
		let message = NewMessage {
			sender_id: sender_id.to_string(),
			recipient_id: recipient_id.to_string(),
			content: content.to_string(),
		}
		.into_message(Uuid::new_v4(), sent_at);
		rows.push(message.clone());
		Ok(message)
	}

	async fn mark_thread_read(
		&self,
		viewer_id: &str,
		counterpart_id: &str,
		now: DateTime<Utc>,
	) -> Result<Vec<Message>, StoreError> {
		self.online()?;
		let changed = self
			.lock()
			.iter_mut()
			.filter(|m| m.sender_id == counterpart_id && m.is_unread_for(viewer_id))
			.map(|m| {
				m.read_at = Some(now);
				m.clone()
			})
			.collect();
		Ok(changed)
	}

	async fn count_unread(
		&self,
		viewer_id: &str,
	) -> Result<u64, StoreError> {
		self.online()?;
		Ok(self.lock().iter().filter(|m| m.is_unread_for(viewer_id)).count() as u64)
	}
}

#[derive(Default)]
pub struct InMemorySettingsStore(Mutex<HashMap<String, NotificationSettings>>);

impl InMemorySettingsStore {
	pub fn upsert(
		&self,
		settings: NotificationSettings,
	) {
		self.0
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.insert(settings.user_id.clone(), settings);
	}
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
	async fn notification_settings(
		&self,
		user_id: &str,
	) -> Result<Option<NotificationSettings>, StoreError> {
		Ok(self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).get(user_id).cloned())
	}
}
