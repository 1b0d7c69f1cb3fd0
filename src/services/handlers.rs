use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use chrono::Utc;
use futures::{
	stream::{SplitSink, SplitStream},
	SinkExt, StreamExt,
};
use tokio::{
	sync::{broadcast, watch},
	task::JoinHandle,
};
use uuid::Uuid;

use super::{
	listener::{ListenerState, RealtimeListener},
	response::ServiceError,
	status::{SocketStatus, StatusVariant},
};
use crate::{
	adapters::{
		feed::ChangeFeed,
		notifier::Notifier,
		repositories::MessageStore,
	},
	domain::{
		inbox::{
			schemas::{ClientMessage, ServerMessage},
			session::InboxSession,
			InboxSnapshot, ThreadView,
		},
		message::{events::ChangeEvent, DeliveryState, Message, NewMessage, OutgoingMessage},
		notification::NotifyRequest,
		viewer::Viewer,
	},
};

/// Inbox operations over a store, a change feed and the notification channel.
#[derive(Clone)]
pub struct InboxHandler {
	store: Arc<dyn MessageStore>,
	feed: Arc<dyn ChangeFeed>,
	notifier: Arc<dyn Notifier>,
}

impl InboxHandler {
	pub fn new(
		store: Arc<dyn MessageStore>,
		feed: Arc<dyn ChangeFeed>,
		notifier: Arc<dyn Notifier>,
	) -> Self {
		Self { store, feed, notifier }
	}

	pub fn listener(&self) -> RealtimeListener {
		RealtimeListener::new(self.feed.clone())
	}

	/// Stateless inbox read. A failing store yields an empty, degraded list.
	pub async fn inbox(
		&self,
		viewer: &Viewer,
	) -> InboxSnapshot {
		match self.store.fetch_inbox_messages(viewer).await {
			Ok(rows) => InboxSnapshot::from_messages(viewer, &rows),
			Err(err) => {
				tracing::warn!(viewer = %viewer, "inbox read failed: {}", err);
				InboxSnapshot::degraded()
			}
		}
	}

	pub async fn unread_total(
		&self,
		viewer: &Viewer,
	) -> Result<u64, ServiceError> {
		Ok(self.store.count_unread(viewer).await?)
	}

	/// Loads the session's inbox. The result is dropped if the session was
	/// unmounted or reloaded while the fetch was in flight.
	pub async fn load_inbox(
		&self,
		session: &InboxSession,
	) -> InboxSnapshot {
		let viewer = session.viewer().await;
		let ticket = session.ticket().await;
		match self.store.fetch_inbox_messages(&viewer).await {
			Ok(rows) => {
				if !session.merge_fetched(ticket, rows).await {
					tracing::debug!(viewer = %viewer, "discarding stale inbox load");
				}
				session.snapshot().await
			}
			Err(err) => {
				tracing::warn!(viewer = %viewer, "inbox read failed: {}", err);
				InboxSnapshot {
					degraded: true,
					..session.snapshot().await
				}
			}
		}
	}

	/// Opens the conversation with `counterpart`: loads it and marks the
	/// counterpart's messages read.
	pub async fn open_thread(
		&self,
		session: &InboxSession,
		counterpart: &str,
	) -> ThreadView {
		let viewer = session.viewer().await;
		let ticket = session.ticket().await;
		let degraded = match self.store.fetch_thread_messages(&viewer, counterpart).await {
			Ok(rows) => {
				session.merge_fetched(ticket, rows).await;
				false
			}
			Err(err) => {
				tracing::warn!(viewer = %viewer, counterpart, "thread read failed: {}", err);
				true
			}
		};
		self.mark_thread_read(session, counterpart).await;

		ThreadView {
			degraded,
			..session.write().await.thread_view(counterpart)
		}
	}

	/// Zeroes the badge at once, then asks the store to persist it. A store
	/// failure only gets logged; the next load heals the badge.
	/// Returns how many rows the store transitioned.
	pub async fn mark_thread_read(
		&self,
		session: &InboxSession,
		counterpart: &str,
	) -> usize {
		let viewer = session.viewer().await;
		let now = Utc::now();
		session.mark_read_locally(counterpart, now).await;

		match self.store.mark_thread_read(&viewer, counterpart, now).await {
			Ok(rows) => {
				let marked = rows.len();
				for event in ChangeEvent::read_transitions(rows) {
					self.publish(&event).await;
				}
				marked
			}
			Err(err) => {
				tracing::warn!(viewer = %viewer, counterpart, "mark-as-read failed: {}", err);
				0
			}
		}
	}

	/// Stateless mark-as-read for callers without a session.
	pub async fn mark_read(
		&self,
		viewer: &Viewer,
		counterpart: &str,
	) -> Result<usize, ServiceError> {
		let rows = self.store.mark_thread_read(viewer, counterpart, Utc::now()).await?;
		let marked = rows.len();
		for event in ChangeEvent::read_transitions(rows) {
			self.publish(&event).await;
		}
		Ok(marked)
	}

	/// Shows the message right away, then stores it. On failure the
	/// optimistic row stays, flagged `failed`, and the user is told.
	pub async fn send_message(
		&self,
		session: &InboxSession,
		counterpart: &str,
		content: &str,
	) -> Result<OutgoingMessage, ServiceError> {
		if content.trim().is_empty() {
			return Err(ServiceError::EmptyMessage);
		}
		let viewer = session.viewer().await;
		let outgoing = {
			let mut state = session.write().await;
			let outgoing = state.push_outgoing(NewMessage {
				sender_id: viewer.to_string(),
				recipient_id: counterpart.to_string(),
				content: content.to_string(),
			});
			state.publish();
			outgoing
		};

		match self.store.send_message(&viewer, counterpart, content).await {
			Ok(stored) => {
				let delivered = {
					let mut state = session.write().await;
					let delivered = state.confirm_outgoing(outgoing.local_id, stored.clone()).unwrap_or(outgoing);
					state.publish();
					state.present("Message sent", StatusVariant::Success);
					delivered
				};
				self.after_send(&stored).await;
				Ok(delivered)
			}
			Err(err) => {
				tracing::warn!(viewer = %viewer, counterpart, "send failed: {}", err);
				let mut state = session.write().await;
				let failed = state.fail_outgoing(outgoing.local_id).unwrap_or(outgoing);
				state.publish();
				state.present(&format!("Message not sent: {err}"), StatusVariant::Error);
				Ok(failed)
			}
		}
	}

	/// Sends a failed message again as a new optimistic entry.
	pub async fn retry_message(
		&self,
		session: &InboxSession,
		local_id: Uuid,
	) -> Result<OutgoingMessage, ServiceError> {
		let failed = session.write().await.discard_outgoing(local_id).ok_or(ServiceError::BadRequest)?;
		self.send_message(session, &failed.message.recipient_id, &failed.message.content).await
	}

	/// Drops a failed message from the session.
	pub async fn discard_message(
		&self,
		session: &InboxSession,
		local_id: Uuid,
	) -> InboxSnapshot {
		let mut state = session.write().await;
		if state.discard_outgoing(local_id).is_some() {
			state.publish();
		}
		state.snapshot()
	}

	/// Stateless send for callers without a session.
	pub async fn send(
		&self,
		viewer: &Viewer,
		counterpart: &str,
		content: &str,
	) -> Result<OutgoingMessage, ServiceError> {
		if content.trim().is_empty() {
			return Err(ServiceError::EmptyMessage);
		}
		let stored = self.store.send_message(viewer, counterpart, content).await?;
		self.after_send(&stored).await;
		Ok(OutgoingMessage {
			local_id: stored.id,
			message: stored,
			delivery: DeliveryState::Delivered,
		})
	}

	/// Feed insert plus best-effort notification; neither can undo the send.
	async fn after_send(
		&self,
		stored: &Message,
	) {
		self.publish(&ChangeEvent::Insert { new: stored.clone() }).await;
		if let Err(err) = self.notifier.notify(&stored.sender_id, NotifyRequest::new_message(stored)).await {
			tracing::warn!(recipient = %stored.recipient_id, "notification request failed: {}", err);
		}
	}

	async fn publish(
		&self,
		event: &ChangeEvent,
	) {
		if let Err(err) = self.feed.publish(event).await {
			tracing::warn!("change feed publish failed: {}", err);
		}
	}

	/// This function deals with a single websocket connection, i.e., a single
	/// signed-in viewer. The session lives as long as the socket: it is
	/// loaded, kept current by a realtime listener, and torn down on close.
	pub async fn run_socket_broker(
		self,
		stream: WebSocket,
		viewer: Viewer,
	) {
		let (sender, receiver) = stream.split();
		let (outbox, _rx) = broadcast::channel::<ServerMessage>(100);

		let session = InboxSession::new(viewer.clone(), Arc::new(SocketStatus(outbox.clone())));
		let snapshots = session.subscribe().await;
		let mut listener = self.listener();

		let mut send_task = InboxHandler::_send_messages_to_this_user(outbox.subscribe(), sender);

		let _ = outbox.send(ServerMessage::Inbox(self.load_inbox(&session).await));
		if listener.attach(session.clone()).await.is_err() {
			session.write().await.present("Live updates unavailable", StatusVariant::Error);
		}
		let _ = outbox.send(ServerMessage::Listener { state: listener.state() });

		let forward_task = InboxHandler::_forward_session_updates(session.clone(), snapshots, listener.watch(), outbox.clone());
		let mut recv_task = InboxHandler::_receive_messages_from_this_user(receiver, self.clone(), session.clone(), outbox.clone());

		// Waits on multiple concurrent branches, returning when the first branch completes,
		// cancelling the remaining branches.
		tokio::select! {
			_ = (&mut send_task) => recv_task.abort(),
			_ = (&mut recv_task) => send_task.abort(),
		};
		forward_task.abort();

		session.unmount().await;
		listener.detach();
		tracing::debug!(viewer = %viewer, "inbox socket closed");
	}

	fn _send_messages_to_this_user(
		mut frames: broadcast::Receiver<ServerMessage>,
		mut sender: SplitSink<WebSocket, WsMessage>,
	) -> JoinHandle<()> {
		tokio::spawn(async move {
			loop {
				match frames.recv().await {
					Ok(frame) => {
						if sender.send(WsMessage::from(&frame)).await.is_err() {
							break;
						}
					}
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						tracing::warn!(skipped, "socket fell behind");
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		})
	}

	fn _forward_session_updates(
		session: InboxSession,
		mut snapshots: broadcast::Receiver<InboxSnapshot>,
		mut listener_state: watch::Receiver<ListenerState>,
		outbox: broadcast::Sender<ServerMessage>,
	) -> JoinHandle<()> {
		tokio::spawn(async move {
			loop {
				tokio::select! {
					snapshot = snapshots.recv() => match snapshot {
						Ok(snapshot) => { let _ = outbox.send(ServerMessage::Inbox(snapshot)); }
						Err(broadcast::error::RecvError::Lagged(_)) => { let _ = outbox.send(ServerMessage::Inbox(session.snapshot().await)); }
						Err(broadcast::error::RecvError::Closed) => break,
					},
					changed = listener_state.changed() => {
						if changed.is_err() {
							break;
						}
						let state = *listener_state.borrow();
						let _ = outbox.send(ServerMessage::Listener { state });
					}
				}
			}
		})
	}

	fn _receive_messages_from_this_user(
		mut receiver: SplitStream<WebSocket>,
		handler: InboxHandler,
		session: InboxSession,
		outbox: broadcast::Sender<ServerMessage>,
	) -> JoinHandle<Result<(), ServiceError>> {
		tokio::spawn(async move {
			while let Some(Ok(message)) = receiver.next().await {
				let client_message = match ClientMessage::try_from(message) {
					Ok(client_message) => client_message,
					Err(ServiceError::UserCloseConnection) => return Ok(()),
					Err(_) => {
						session.write().await.present("Wrong input was given", StatusVariant::Error);
						continue;
					}
				};
				let frame = match client_message {
					ClientMessage::OpenThread { peer_id } => ServerMessage::Thread(handler.open_thread(&session, &peer_id).await),
					ClientMessage::MarkRead { peer_id } => {
						handler.mark_thread_read(&session, &peer_id).await;
						ServerMessage::Inbox(session.snapshot().await)
					}
					ClientMessage::Send { peer_id, content } => match handler.send_message(&session, &peer_id, &content).await {
						Ok(outgoing) => ServerMessage::Sent(outgoing),
						Err(err) => {
							session.write().await.present(&err.to_string(), StatusVariant::Error);
							continue;
						}
					},
					ClientMessage::Retry { local_id } => match handler.retry_message(&session, local_id).await {
						Ok(outgoing) => ServerMessage::Sent(outgoing),
						Err(_) => {
							session.write().await.present("Nothing to retry", StatusVariant::Error);
							continue;
						}
					},
					ClientMessage::Discard { local_id } => ServerMessage::Inbox(handler.discard_message(&session, local_id).await),
					ClientMessage::Reload => ServerMessage::Inbox(handler.load_inbox(&session).await),
				};
				let _ = outbox.send(frame);
			}
			Ok(())
		})
	}
}
