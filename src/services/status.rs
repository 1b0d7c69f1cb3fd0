use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::inbox::schemas::ServerMessage;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusVariant {
	Success,
	Error,
	#[default]
	Info,
}

/// A short-lived message for the user ("Message sent", "Could not send").
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct StatusNotice {
	pub message: String,
	pub variant: StatusVariant,
}

/// Presents transient status messages to whoever is looking at the inbox.
pub trait StatusPort: Send + Sync {
	fn present(
		&self,
		message: &str,
		variant: StatusVariant,
	);
}

/// Logs notices; used where no client is attached.
pub struct TracingStatus;

impl StatusPort for TracingStatus {
	fn present(
		&self,
		message: &str,
		variant: StatusVariant,
	) {
		match variant {
			StatusVariant::Error => tracing::warn!(notice = message, "status"),
			_ => tracing::info!(notice = message, "status"),
		}
	}
}

/// Forwards notices to a connected socket.
pub struct SocketStatus(pub broadcast::Sender<ServerMessage>);

impl StatusPort for SocketStatus {
	fn present(
		&self,
		message: &str,
		variant: StatusVariant,
	) {
		let notice = StatusNotice {
			message: message.to_string(),
			variant,
		};
		if self.0.send(ServerMessage::Status(notice)).is_err() {
			tracing::debug!(notice = message, "status dropped, socket gone");
		}
	}
}
