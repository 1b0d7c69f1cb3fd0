use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{InboxSnapshot, ThreadView};
use crate::{
	domain::message::OutgoingMessage,
	services::{listener::ListenerState, response::ServiceError, status::StatusNotice},
};

/// Frames a connected client may send over the inbox socket.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
	OpenThread { peer_id: String },
	Send { peer_id: String, content: String },
	MarkRead { peer_id: String },
	Retry { local_id: Uuid },
	Discard { local_id: Uuid },
	Reload,
}

/// Frames pushed to the client.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
	Inbox(InboxSnapshot),
	Thread(ThreadView),
	Sent(OutgoingMessage),
	Status(StatusNotice),
	Listener { state: ListenerState },
}

impl TryFrom<axum::extract::ws::Message> for ClientMessage {
	type Error = ServiceError;
	fn try_from(value: axum::extract::ws::Message) -> Result<Self, Self::Error> {
		match value {
			axum::extract::ws::Message::Text(string_value) => {
				serde_json::from_str::<ClientMessage>(&string_value).map_err(|_err| ServiceError::ParsingError)
			}

			axum::extract::ws::Message::Close(_close_frame) => Err(ServiceError::UserCloseConnection),
			_ => Err(ServiceError::BadRequest),
		}
	}
}

impl From<&ServerMessage> for axum::extract::ws::Message {
	fn from(value: &ServerMessage) -> Self {
		// every variant serializes; the fallback is unreachable in practice
		axum::extract::ws::Message::Text(serde_json::to_string(value).unwrap_or_else(|_| String::from("{}")))
	}
}

#[test]
fn test_enum_representation() {
	let open = r#"{"type":"open_thread","peer_id":"coach-7"}"#;
	match serde_json::from_str::<ClientMessage>(open).unwrap() {
		ClientMessage::OpenThread { peer_id } => assert_eq!(peer_id, "coach-7"),
		other => panic!("unexpected {other:?}"),
	}

	let frame = axum::extract::ws::Message::Text(r#"{"type":"send","peer_id":"b","content":"hi"}"#.to_string());
	assert!(matches!(ClientMessage::try_from(frame), Ok(ClientMessage::Send { .. })));

	let retry = r#"{"type":"retry","local_id":"67e55044-10b1-426f-9247-bb680e5fe0c8"}"#;
	assert!(matches!(serde_json::from_str::<ClientMessage>(retry), Ok(ClientMessage::Retry { .. })));

	let garbage = axum::extract::ws::Message::Text("nope".to_string());
	assert!(matches!(ClientMessage::try_from(garbage), Err(ServiceError::ParsingError)));
}
