use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::{sync::watch, task::JoinHandle};

use super::{response::ServiceError, status::StatusVariant};
use crate::{
	adapters::feed::{ChangeFeed, FeedStream, SubscriptionError},
	domain::inbox::session::InboxSession,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
	#[default]
	Detached,
	Subscribing,
	Attached,
	Failed,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ListenerSignal {
	ViewerKnown,
	Acknowledged,
	Error,
	Teardown,
}

impl ListenerState {
	pub fn next(
		self,
		signal: ListenerSignal,
	) -> Result<ListenerState, ServiceError> {
		use ListenerSignal::*;
		use ListenerState::*;
		match (self, signal) {
			(Detached, ViewerKnown) => Ok(Subscribing),
			(Subscribing, Acknowledged) => Ok(Attached),
			(Subscribing | Attached, Error) => Ok(Failed),
			(_, Teardown) => Ok(Detached),
			(state, signal) => Err(ServiceError::InvalidTransition { state, signal }),
		}
	}
}

/// Keeps one inbox session fed from the realtime feed.
///
/// Events are applied one by one in arrival order by a single pump task.
/// Undecodable payloads and lags are skipped. A broken or ended feed is a
/// failure, and there is no retry: after a failure the listener stays `Failed` until
/// [`RealtimeListener::detach`] and a fresh [`RealtimeListener::attach`].
pub struct RealtimeListener {
	feed: Arc<dyn ChangeFeed>,
	state: Arc<watch::Sender<ListenerState>>,
	pump: Option<JoinHandle<()>>,
}

impl RealtimeListener {
	pub fn new(feed: Arc<dyn ChangeFeed>) -> Self {
		let (state, _rx) = watch::channel(ListenerState::Detached);
		Self {
			feed,
			state: Arc::new(state),
			pump: None,
		}
	}

	pub fn state(&self) -> ListenerState {
		*self.state.borrow()
	}

	pub fn watch(&self) -> watch::Receiver<ListenerState> {
		self.state.subscribe()
	}

	fn advance(
		&self,
		signal: ListenerSignal,
	) -> Result<ListenerState, ServiceError> {
		advance(&self.state, signal)
	}

	pub async fn attach(
		&mut self,
		session: InboxSession,
	) -> Result<(), ServiceError> {
		self.advance(ListenerSignal::ViewerKnown)?;
		let viewer = session.viewer().await;

		let stream = match self.feed.subscribe(&viewer).await {
			Ok(stream) => stream,
			Err(err) => {
				tracing::warn!(viewer = %viewer, "realtime subscription failed: {}", err);
				self.advance(ListenerSignal::Error)?;
				return Err(err.into());
			}
		};
		self.advance(ListenerSignal::Acknowledged)?;
		tracing::debug!(viewer = %viewer, "realtime listener attached");

		self.pump = Some(tokio::spawn(Self::pump(stream, session, self.state.clone())));
		Ok(())
	}

	async fn pump(
		mut stream: FeedStream,
		session: InboxSession,
		state: Arc<watch::Sender<ListenerState>>,
	) {
		while let Some(item) = stream.next().await {
			match item {
				Ok(event) => {
					session.apply_event(event).await;
				}
				Err(err) if !err.is_fatal() => {
					tracing::warn!("skipping realtime feed item: {}", err);
					if let SubscriptionError::Lagged(_) = err {
						session.write().await.present("Some live updates were missed, reload to catch up", StatusVariant::Info);
					}
				}
				Err(err) => {
					tracing::warn!("realtime feed error: {}", err);
					break;
				}
			}
		}
		// feed ended or broke without a teardown
		let _ = advance(&state, ListenerSignal::Error);
	}

	/// Releases the subscription. Valid from every state.
	pub fn detach(&mut self) {
		if let Some(pump) = self.pump.take() {
			pump.abort();
		}
		let _ = self.advance(ListenerSignal::Teardown);
	}
}

impl Drop for RealtimeListener {
	fn drop(&mut self) {
		if let Some(pump) = self.pump.take() {
			pump.abort();
		}
	}
}

fn advance(
	state: &watch::Sender<ListenerState>,
	signal: ListenerSignal,
) -> Result<ListenerState, ServiceError> {
	let next = state.borrow().next(signal)?;
	state.send_replace(next);
	Ok(next)
}
