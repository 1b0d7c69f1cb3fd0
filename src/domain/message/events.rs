use serde::{Deserialize, Serialize};

use super::Message;

/// Row-level change delivered by the realtime feed.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "UPPERCASE")]
pub enum ChangeEvent {
	Insert { new: Message },
	Update { old: Message, new: Message },
}

impl ChangeEvent {
	pub fn row(&self) -> &Message {
		match self {
			Self::Insert { new } | Self::Update { new, .. } => new,
		}
	}

	/// Feed subject of the recipient this event is addressed to.
	pub(crate) fn subject(&self) -> String {
		inbox_subject(&self.row().recipient_id)
	}

	/// Update events for rows that `mark_thread_read` transitioned.
	pub fn read_transitions(rows: Vec<Message>) -> Vec<ChangeEvent> {
		rows.into_iter()
			.map(|new| ChangeEvent::Update {
				old: Message { read_at: None, ..new.clone() },
				new,
			})
			.collect()
	}
}

pub(crate) fn inbox_subject(recipient_id: &str) -> String {
	format!("inbox.{recipient_id}")
}

#[test]
fn test_event_wire_representation() {
	use chrono::Utc;
	use uuid::Uuid;

	let row = Message {
		id: Uuid::new_v4(),
		sender_id: "coach".into(),
		recipient_id: "athlete".into(),
		content: "Hi".into(),
		sent_at: Utc::now(),
		read_at: None,
	};
	let jsonified = serde_json::to_value(ChangeEvent::Insert { new: row.clone() }).unwrap();
	assert_eq!(jsonified["event"], "INSERT");
	assert_eq!(jsonified["new"]["recipient_id"], "athlete");

	let event: ChangeEvent = serde_json::from_value(jsonified).unwrap();
	assert_eq!(event.subject(), "inbox.athlete");
}
