use async_trait::async_trait;
use futures::StreamExt;

use super::{validate_recipient, ChangeFeed, FeedStream, SubscriptionError};
use crate::{
	database::QueueClient,
	domain::message::events::{inbox_subject, ChangeEvent},
};

/// Change feed on the queue service, one subject per recipient.
#[derive(Clone)]
pub struct NatsChangeFeed {
	queue_client: QueueClient,
}

impl NatsChangeFeed {
	pub fn new(queue_client: QueueClient) -> Self {
		Self { queue_client }
	}
}

#[async_trait]
impl ChangeFeed for NatsChangeFeed {
	async fn subscribe(
		&self,
		recipient_id: &str,
	) -> Result<FeedStream, SubscriptionError> {
		validate_recipient(recipient_id)?;
		let subscriber = self
			.queue_client
			.subscribe(inbox_subject(recipient_id))
			.await
			.map_err(|err| SubscriptionError::Subscribe(err.to_string()))?;

		// the server has processed SUB once the flush round-trips
		self.queue_client
			.flush()
			.await
			.map_err(|err| SubscriptionError::Subscribe(err.to_string()))?;

		let events = subscriber.map(|message| serde_json::from_slice::<ChangeEvent>(&message.payload).map_err(|err| SubscriptionError::Decode(err.to_string())));
		Ok(Box::pin(events))
	}

	async fn publish(
		&self,
		event: &ChangeEvent,
	) -> Result<(), SubscriptionError> {
		self.queue_client
			.send(event.subject(), event)
			.await
			.map_err(|err| SubscriptionError::Publish(err.to_string()))
	}
}
