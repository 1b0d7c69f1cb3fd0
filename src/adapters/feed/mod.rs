//! Realtime change feed: row-level insert/update notifications for the
//! `messages` table, filtered to one recipient.
//!
//! [`NatsChangeFeed`] rides on the queue service. [`LocalChangeFeed`] keeps
//! everything in process for single-node runs and tests.

mod local;
mod nats;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

pub use self::{local::LocalChangeFeed, nats::NatsChangeFeed};
use crate::domain::message::events::ChangeEvent;

pub type FeedStream = Pin<Box<dyn Stream<Item = Result<ChangeEvent, SubscriptionError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
	#[error("recipient id {0:?} cannot be used as a feed filter")]
	InvalidRecipient(String),
	#[error("subscribe failed: {0}")]
	Subscribe(String),
	#[error("undecodable feed payload: {0}")]
	Decode(String),
	#[error("feed dropped {0} events")]
	Lagged(u64),
	#[error("publish failed: {0}")]
	Publish(String),
}

impl SubscriptionError {
	/// Whether the subscription is unusable. A bad payload or a lag loses
	/// events but later ones still arrive.
	pub fn is_fatal(&self) -> bool {
		!matches!(self, SubscriptionError::Decode(_) | SubscriptionError::Lagged(_))
	}
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
	/// Events whose row has `recipient_id == recipient_id`, in arrival order.
	/// Dropping the stream releases the subscription.
	async fn subscribe(
		&self,
		recipient_id: &str,
	) -> Result<FeedStream, SubscriptionError>;

	async fn publish(
		&self,
		event: &ChangeEvent,
	) -> Result<(), SubscriptionError>;
}

/// Recipient ids become part of a subject, so they must be a single token.
pub(crate) fn validate_recipient(recipient_id: &str) -> Result<(), SubscriptionError> {
	let valid = !recipient_id.is_empty() && !recipient_id.chars().any(|c| c == '.' || c == '*' || c == '>' || c.is_whitespace());
	if valid {
		Ok(())
	} else {
		Err(SubscriptionError::InvalidRecipient(recipient_id.to_string()))
	}
}

#[test]
fn test_recipient_must_be_single_subject_token() {
	assert!(validate_recipient("5f0c2a8e-user").is_ok());
	for bad in ["", "a.b", "a*", ">", "a b"] {
		assert!(validate_recipient(bad).is_err(), "{bad:?} accepted");
	}
}
