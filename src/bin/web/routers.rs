use std::sync::Arc;

use axum::{
	extract::{Path, State, WebSocketUpgrade},
	middleware,
	response::IntoResponse,
	routing::{get, post},
	Extension, Json, Router,
};
use axum_macros::debug_handler;
use serde::Deserialize;

use inbox::{
	common::middleware_viewer_header::set_viewer,
	domain::{inbox::session::InboxSession, notification::NotifyRequest, viewer::Viewer},
	services::{
		handlers::InboxHandler,
		notification::NotificationHandler,
		response::{ServiceError, ServiceResponse},
		status::TracingStatus,
	},
};

#[derive(Clone)]
pub struct AppState {
	pub inbox: InboxHandler,
	pub notifications: Arc<NotificationHandler>,
}

#[derive(Deserialize)]
pub struct SendBody {
	content: String,
}

async fn inbox_route(
	State(state): State<AppState>,
	Extension(viewer): Extension<Viewer>,
) -> ServiceResponse {
	state.inbox.inbox(&viewer).await.into()
}

async fn unread_route(
	State(state): State<AppState>,
	Extension(viewer): Extension<Viewer>,
) -> Result<ServiceResponse, ServiceError> {
	let total = state.inbox.unread_total(&viewer).await?;
	Ok(ServiceResponse::Unread { total })
}

async fn thread_route(
	State(state): State<AppState>,
	Extension(viewer): Extension<Viewer>,
	Path(peer_id): Path<String>,
) -> ServiceResponse {
	let session = InboxSession::new(viewer, Arc::new(TracingStatus));
	state.inbox.open_thread(&session, &peer_id).await.into()
}

#[debug_handler]
async fn send_route(
	State(state): State<AppState>,
	Extension(viewer): Extension<Viewer>,
	Path(peer_id): Path<String>,
	Json(body): Json<SendBody>,
) -> Result<ServiceResponse, ServiceError> {
	let sent = state.inbox.send(&viewer, &peer_id, &body.content).await?;
	Ok(sent.into())
}

async fn mark_read_route(
	State(state): State<AppState>,
	Extension(viewer): Extension<Viewer>,
	Path(peer_id): Path<String>,
) -> Result<ServiceResponse, ServiceError> {
	let marked = state.inbox.mark_read(&viewer, &peer_id).await?;
	Ok(ServiceResponse::MarkedRead { marked })
}

async fn inbox_websocket_route(
	ws: WebSocketUpgrade,
	State(state): State<AppState>,
	Extension(viewer): Extension<Viewer>,
) -> impl IntoResponse {
	tracing::info!(viewer = %viewer, "inbox socket opened");
	ws.on_upgrade(move |socket| state.inbox.run_socket_broker(socket, viewer))
}

#[debug_handler]
async fn notify_email_route(
	State(state): State<AppState>,
	Json(request): Json<NotifyRequest>,
) -> Result<ServiceResponse, ServiceError> {
	Ok(state.notifications.handle(request).await?.into())
}

pub fn message_routers() -> Router<AppState> {
	Router::new()
		.route("/", get(inbox_route))
		.route("/unread", get(unread_route))
		.route("/ws", get(inbox_websocket_route))
		.route("/:peer_id", get(thread_route).post(send_route))
		.route("/:peer_id/read", post(mark_read_route))
		.route_layer(middleware::from_fn(set_viewer))
}

pub fn notify_routers() -> Router<AppState> {
	Router::new().route("/notify-email", post(notify_email_route)).route_layer(middleware::from_fn(set_viewer))
}

pub fn app(state: AppState) -> Router {
	Router::new().nest("/messages", message_routers()).merge(notify_routers()).with_state(state)
}

#[cfg(test)]
mod test {
	use std::sync::Arc;

	use axum::{
		body::{Body, HttpBody},
		http::{header::CONTENT_TYPE, Method, Request, StatusCode},
		Router,
	};
	use tower::ServiceExt;

	use super::{app, AppState};
	use inbox::{
		adapters::{
			feed::LocalChangeFeed,
			notifier::{Mailer, Notifier},
			repositories::{InMemoryMessageStore, InMemorySettingsStore},
		},
		domain::notification::{NotifyRequest, OutboundEmail},
		services::{handlers::InboxHandler, notification::NotificationHandler, response::ServiceError},
	};

	struct Discard;

	#[async_trait::async_trait]
	impl Notifier for Discard {
		async fn notify(
			&self,
			_sender_id: &str,
			_request: NotifyRequest,
		) -> Result<(), ServiceError> {
			Ok(())
		}
	}

	#[async_trait::async_trait]
	impl Mailer for Discard {
		async fn deliver(
			&self,
			_email: OutboundEmail,
		) -> Result<(), ServiceError> {
			Ok(())
		}
	}

	fn router(store: Arc<InMemoryMessageStore>) -> Router {
		app(AppState {
			inbox: InboxHandler::new(store, Arc::new(LocalChangeFeed::default()), Arc::new(Discard)),
			notifications: Arc::new(NotificationHandler::new(
				Arc::new(InMemorySettingsStore::default()),
				Arc::new(Discard),
				"ATHLINK <no-reply@athlink.app>",
				"http://localhost:3000",
			)),
		})
	}

	fn request(
		method: Method,
		uri: &str,
		viewer: Option<&str>,
		body: &str,
	) -> Request<Body> {
		let mut builder = Request::builder().method(method).uri(uri).header(CONTENT_TYPE, "application/json");
		if let Some(viewer) = viewer {
			builder = builder.header("x-viewer-id", viewer);
		}
		builder.body(Body::from(body.to_string())).unwrap()
	}

	#[tokio::test]
	async fn test_missing_viewer_is_unauthorized() {
		let response = router(Arc::new(InMemoryMessageStore::new())).oneshot(request(Method::GET, "/messages", None, "")).await.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	}

	#[tokio::test]
	async fn test_send_then_read() {
		let store = Arc::new(InMemoryMessageStore::new());

		let sent = router(store.clone())
			.oneshot(request(Method::POST, "/messages/b", Some("a"), r#"{"content":"hello"}"#))
			.await
			.unwrap();
		assert_eq!(sent.status(), StatusCode::CREATED);
		assert_eq!(store.rows().len(), 1);

		let marked = router(store.clone()).oneshot(request(Method::POST, "/messages/a/read", Some("b"), "")).await.unwrap();
		assert_eq!(marked.status(), StatusCode::OK);
		assert!(store.rows()[0].read_at.is_some());
	}

	#[tokio::test]
	async fn test_blank_send_is_bad_request() {
		let store = Arc::new(InMemoryMessageStore::new());
		let response = router(store.clone())
			.oneshot(request(Method::POST, "/messages/b", Some("a"), r#"{"content":"  "}"#))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert!(store.rows().is_empty());
	}

	#[tokio::test]
	async fn test_offline_store_on_send_is_bad_gateway() {
		let store = Arc::new(InMemoryMessageStore::new());
		store.set_offline(true);
		let response = router(store).oneshot(request(Method::POST, "/messages/b", Some("a"), r#"{"content":"hi"}"#)).await.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
	}

	#[tokio::test]
	async fn test_notify_without_address_is_no_content() {
		let response = router(Arc::new(InMemoryMessageStore::new()))
			.oneshot(request(Method::POST, "/notify-email", Some("coach"), r#"{"type":"message","recipientId":"nobody"}"#))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::NO_CONTENT);
	}

	#[tokio::test]
	async fn test_notify_without_type_or_recipient_is_ok() {
		for payload in [r#"{"recipientId":"x"}"#, r#"{"type":"message","recipientId":null}"#] {
			let response = router(Arc::new(InMemoryMessageStore::new()))
				.oneshot(request(Method::POST, "/notify-email", Some("coach"), payload))
				.await
				.unwrap();
			assert_eq!(response.status(), StatusCode::OK, "{payload}");
			let mut body = response.into_body();
			let mut bytes = Vec::new();
			while let Some(chunk) = body.data().await {
				bytes.extend_from_slice(&chunk.unwrap());
			}
			let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
			assert_eq!(json["ok"], true);
		}
	}

	#[tokio::test]
	async fn test_notify_requires_viewer() {
		let response = router(Arc::new(InMemoryMessageStore::new()))
			.oneshot(request(Method::POST, "/notify-email", None, r#"{"type":"message","recipientId":"x"}"#))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	}
}
