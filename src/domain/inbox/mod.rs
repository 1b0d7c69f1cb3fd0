// domain for the messaging inbox
pub mod schemas;
pub mod session;
pub mod unread;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use self::unread::UnreadCounter;
use super::message::{DeliveryState, Message, OutgoingMessage};

/// Groups `messages` by counterpart of `viewer` and keeps the newest message
/// of each group. Equal `sent_at` resolves to the later element of `messages`.
pub fn project_threads<'a, I>(
	viewer: &str,
	messages: I,
) -> HashMap<String, Message>
where
	I: IntoIterator<Item = &'a Message>,
{
	let mut threads: HashMap<String, Message> = HashMap::new();
	for message in messages.into_iter().filter(|m| m.involves(viewer)) {
		let counterpart = message.counterpart(viewer);
		match threads.get(counterpart) {
			Some(latest) if latest.sent_at > message.sent_at => {}
			_ => {
				threads.insert(counterpart.to_string(), message.clone());
			}
		}
	}
	threads
}

/// Thread list in display order: newest first.
pub fn sorted_threads<'a, I>(
	viewer: &str,
	messages: I,
	unread: &UnreadCounter,
) -> Vec<ThreadSummary>
where
	I: IntoIterator<Item = &'a Message>,
{
	let mut threads: Vec<ThreadSummary> = project_threads(viewer, messages)
		.into_iter()
		.map(|(counterpart_id, last_message)| ThreadSummary {
			unread: unread.get(&counterpart_id),
			counterpart_id,
			last_message,
		})
		.collect();
	threads.sort_by(|a, b| {
		b.last_message
			.sent_at
			.cmp(&a.last_message.sent_at)
			.then_with(|| a.counterpart_id.cmp(&b.counterpart_id))
	});
	threads
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ThreadSummary {
	pub counterpart_id: String,
	pub last_message: Message,
	pub unread: u32,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct InboxSnapshot {
	pub threads: Vec<ThreadSummary>,
	pub total_unread: u32,
	/// Set when the store could not be read and the list is shown empty.
	pub degraded: bool,
}

impl InboxSnapshot {
	pub fn from_messages(
		viewer: &str,
		messages: &[Message],
	) -> Self {
		let unread = UnreadCounter::recount(viewer, messages);
		Self {
			threads: sorted_threads(viewer, messages, &unread),
			total_unread: unread.total(),
			degraded: false,
		}
	}

	pub fn degraded() -> Self {
		Self {
			degraded: true,
			..Default::default()
		}
	}

	pub fn thread(
		&self,
		counterpart_id: &str,
	) -> Option<&ThreadSummary> {
		self.threads.iter().find(|t| t.counterpart_id == counterpart_id)
	}
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ThreadEntry {
	pub message: Message,
	pub delivery: DeliveryState,
}

impl From<Message> for ThreadEntry {
	fn from(message: Message) -> Self {
		Self {
			message,
			delivery: DeliveryState::Delivered,
		}
	}
}

impl From<OutgoingMessage> for ThreadEntry {
	fn from(value: OutgoingMessage) -> Self {
		Self {
			message: value.message,
			delivery: value.delivery,
		}
	}
}

/// Conversation with one counterpart, oldest first.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ThreadView {
	pub counterpart_id: String,
	pub entries: Vec<ThreadEntry>,
	pub degraded: bool,
}
