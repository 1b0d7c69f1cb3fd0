use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::message::Message;

/// Change to apply to an [`UnreadCounter`], keyed by counterpart id.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum UnreadDelta {
	Increment(String),
	Decrement(String),
	Reset(String),
}

impl UnreadDelta {
	/// Delta for a row moving from `before` (absent if `None`) to `after`.
	pub fn between(
		viewer: &str,
		before: Option<&Message>,
		after: &Message,
	) -> Option<UnreadDelta> {
		let was_unread = before.is_some_and(|m| m.is_unread_for(viewer));
		match (was_unread, after.is_unread_for(viewer)) {
			(true, false) => Some(UnreadDelta::Decrement(after.sender_id.clone())),
			(false, true) => Some(UnreadDelta::Increment(after.sender_id.clone())),
			_ => None,
		}
	}
}

/// Unread inbound messages per counterpart. Counterparts at zero are absent,
/// so two counters are equal exactly when every count agrees.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct UnreadCounter(HashMap<String, u32>);

impl UnreadCounter {
	/// Full scan of `messages` from the point of view of `viewer`.
	pub fn recount<'a, I>(
		viewer: &str,
		messages: I,
	) -> Self
	where
		I: IntoIterator<Item = &'a Message>,
	{
		let mut counter = Self::default();
		for message in messages.into_iter().filter(|m| m.is_unread_for(viewer)) {
			*counter.0.entry(message.sender_id.clone()).or_default() += 1;
		}
		counter
	}

	pub fn apply(
		&mut self,
		delta: &UnreadDelta,
	) {
		match delta {
			UnreadDelta::Increment(counterpart) => {
				*self.0.entry(counterpart.clone()).or_default() += 1;
			}
			UnreadDelta::Decrement(counterpart) => {
				if let Some(count) = self.0.get_mut(counterpart) {
					*count = count.saturating_sub(1);
					if *count == 0 {
						self.0.remove(counterpart);
					}
				}
			}
			UnreadDelta::Reset(counterpart) => {
				self.0.remove(counterpart);
			}
		}
	}

	pub fn fold<'a, I>(
		mut self,
		deltas: I,
	) -> Self
	where
		I: IntoIterator<Item = &'a UnreadDelta>,
	{
		for delta in deltas {
			self.apply(delta);
		}
		self
	}

	pub fn get(
		&self,
		counterpart: &str,
	) -> u32 {
		self.0.get(counterpart).copied().unwrap_or(0)
	}

	pub fn total(&self) -> u32 {
		self.0.values().sum()
	}
}

#[cfg(test)]
mod test {
	use chrono::{Duration, TimeZone, Utc};
	use uuid::Uuid;

	use super::{UnreadCounter, UnreadDelta};
	use crate::domain::message::Message;

	const VIEWER: &str = "viewer";

	fn message(
		sender: &str,
		recipient: &str,
		secs: i64,
	) -> Message {
		Message {
			id: Uuid::new_v4(),
			sender_id: sender.into(),
			recipient_id: recipient.into(),
			content: String::new(),
			sent_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs),
			read_at: None,
		}
	}

	#[test]
	fn test_recount_counts_only_inbound_unread() {
		let mut read = message("b", VIEWER, 2);
		read.read_at = Some(Utc::now());
		let messages = vec![
			message("b", VIEWER, 1),
			read,
			message(VIEWER, "b", 3),
			message("c", VIEWER, 4),
			message("c", VIEWER, 5),
		];
		let counter = UnreadCounter::recount(VIEWER, &messages);

		assert_eq!(counter.get("b"), 1);
		assert_eq!(counter.get("c"), 2);
		assert_eq!(counter.get("d"), 0);
		assert_eq!(counter.total(), 3);
	}

	#[test]
	fn test_decrement_is_floored_at_zero() {
		let counter = UnreadCounter::default().fold(&[
			UnreadDelta::Decrement("b".into()),
			UnreadDelta::Increment("b".into()),
			UnreadDelta::Decrement("b".into()),
			UnreadDelta::Decrement("b".into()),
		]);
		assert_eq!(counter.get("b"), 0);
		assert_eq!(counter, UnreadCounter::default());
	}

	#[test]
	fn test_reset_twice_equals_reset_once() {
		let messages = vec![message("b", VIEWER, 1), message("b", VIEWER, 2)];
		let counter = UnreadCounter::recount(VIEWER, &messages);

		let once = counter.clone().fold(&[UnreadDelta::Reset("b".into())]);
		let twice = counter.fold(&[UnreadDelta::Reset("b".into()), UnreadDelta::Reset("b".into())]);
		assert_eq!(once, twice);
		assert_eq!(twice.get("b"), 0);
	}

	#[test]
	fn test_delta_depends_on_prior_row() {
		let unread = message("b", VIEWER, 1);
		let read = Message {
			read_at: Some(Utc::now()),
			..unread.clone()
		};

		assert_eq!(UnreadDelta::between(VIEWER, Some(&unread), &read), Some(UnreadDelta::Decrement("b".into())));
		assert_eq!(UnreadDelta::between(VIEWER, None, &unread), Some(UnreadDelta::Increment("b".into())));
		// already applied locally, or never counted
		assert_eq!(UnreadDelta::between(VIEWER, Some(&read), &read), None);
		assert_eq!(UnreadDelta::between(VIEWER, None, &read), None);
		// duplicate insert
		assert_eq!(UnreadDelta::between(VIEWER, Some(&unread), &unread), None);
	}

	#[test]
	fn test_outbound_row_has_no_delta() {
		assert_eq!(UnreadDelta::between(VIEWER, None, &message(VIEWER, "b", 1)), None);
	}
}
