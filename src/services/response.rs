use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::Serialize;
use serde_json::json;

use crate::{
	adapters::{feed::SubscriptionError, repositories::StoreError},
	domain::{
		inbox::{InboxSnapshot, ThreadView},
		message::{DeliveryState, OutgoingMessage},
	},
	services::{listener::ListenerState, notification::NotifyOutcome},
};

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ServiceResponse {
	Inbox(InboxSnapshot),
	Thread(ThreadView),
	Sent(OutgoingMessage),
	Unread { total: u64 },
	MarkedRead { marked: usize },
	Notify(NotifyOutcome),
	Empty(()),
}

impl From<InboxSnapshot> for ServiceResponse {
	fn from(value: InboxSnapshot) -> Self {
		ServiceResponse::Inbox(value)
	}
}

impl From<ThreadView> for ServiceResponse {
	fn from(value: ThreadView) -> Self {
		ServiceResponse::Thread(value)
	}
}

impl From<OutgoingMessage> for ServiceResponse {
	fn from(value: OutgoingMessage) -> Self {
		ServiceResponse::Sent(value)
	}
}

impl From<NotifyOutcome> for ServiceResponse {
	fn from(value: NotifyOutcome) -> Self {
		ServiceResponse::Notify(value)
	}
}

impl From<()> for ServiceResponse {
	fn from(_value: ()) -> Self {
		ServiceResponse::Empty(())
	}
}

impl IntoResponse for ServiceResponse {
	fn into_response(self) -> Response {
		match self {
			ServiceResponse::Inbox(snapshot) => Json(snapshot).into_response(),
			ServiceResponse::Thread(view) => Json(view).into_response(),
			// the optimistic row is still returned so the client can keep showing it
			ServiceResponse::Sent(outgoing) if outgoing.delivery == DeliveryState::Failed => (StatusCode::BAD_GATEWAY, Json(outgoing)).into_response(),
			ServiceResponse::Sent(outgoing) => (StatusCode::CREATED, Json(outgoing)).into_response(),
			ServiceResponse::Unread { total } => Json(json!({ "total": total })).into_response(),
			ServiceResponse::MarkedRead { marked } => Json(json!({ "marked": marked })).into_response(),
			ServiceResponse::Notify(NotifyOutcome::NoRecipient) => StatusCode::NO_CONTENT.into_response(),
			ServiceResponse::Notify(_) => Json(json!({ "ok": true })).into_response(),
			ServiceResponse::Empty(()) => StatusCode::NO_CONTENT.into_response(),
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error("sign in to use messaging")]
	AuthRequired,
	#[error(transparent)]
	Subscription(#[from] SubscriptionError),
	#[error("listener cannot go from {state:?} on {signal:?}")]
	InvalidTransition {
		state: ListenerState,
		signal: crate::services::listener::ListenerSignal,
	},
	#[error("message content is empty")]
	EmptyMessage,
	#[error("message publishing failed: {0}")]
	MessagePublishingError(String),
	#[error("notification failed: {0}")]
	NotificationError(String),
	#[error("queue service error: {0}")]
	QueueServiceError(String),
	#[error("ParsingError")]
	ParsingError,
	#[error("UserCloseConnection")]
	UserCloseConnection,
	#[error("BadRequest")]
	BadRequest,
	#[error("configuration error: {0}")]
	Config(String),
}

impl ServiceError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			ServiceError::AuthRequired => StatusCode::UNAUTHORIZED,
			ServiceError::EmptyMessage | ServiceError::ParsingError | ServiceError::BadRequest => StatusCode::BAD_REQUEST,
			ServiceError::Store(_) | ServiceError::MessagePublishingError(_) | ServiceError::NotificationError(_) | ServiceError::QueueServiceError(_) => {
				StatusCode::BAD_GATEWAY
			}
			ServiceError::Subscription(_) => StatusCode::SERVICE_UNAVAILABLE,
			ServiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
			ServiceError::UserCloseConnection | ServiceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for ServiceError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		if status.is_server_error() {
			tracing::error!(error = %self, "request failed");
		}
		(status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
	}
}
