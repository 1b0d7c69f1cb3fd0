use async_trait::async_trait;
use futures::stream;
use tokio::sync::broadcast::{self, error::RecvError};

use super::{validate_recipient, ChangeFeed, FeedStream, SubscriptionError};
use crate::domain::message::events::ChangeEvent;

#[derive(Clone)]
pub struct LocalChangeFeed(broadcast::Sender<ChangeEvent>);

impl LocalChangeFeed {
	pub fn new(capacity: usize) -> Self {
		let (tx, _rx) = broadcast::channel(capacity);
		Self(tx)
	}

	pub fn subscriber_count(&self) -> usize {
		self.0.receiver_count()
	}
}

impl Default for LocalChangeFeed {
	fn default() -> Self {
		Self::new(100)
	}
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
	async fn subscribe(
		&self,
		recipient_id: &str,
	) -> Result<FeedStream, SubscriptionError> {
		validate_recipient(recipient_id)?;
		let receiver = self.0.subscribe();
		let recipient_id = recipient_id.to_string();

		let events = stream::unfold((receiver, recipient_id), |(mut receiver, recipient_id)| async move {
			loop {
				match receiver.recv().await {
					Ok(event) if event.row().recipient_id == recipient_id => return Some((Ok(event), (receiver, recipient_id))),
					Ok(_) => continue,
					Err(RecvError::Lagged(skipped)) => {
						tracing::warn!(skipped, "local feed lagged");
						return Some((Err(SubscriptionError::Lagged(skipped)), (receiver, recipient_id)));
					}
					Err(RecvError::Closed) => return None,
				}
			}
		});
		Ok(Box::pin(events))
	}

	async fn publish(
		&self,
		event: &ChangeEvent,
	) -> Result<(), SubscriptionError> {
		// nobody listening is not an error
		let _ = self.0.send(event.clone());
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use chrono::Utc;
	use futures::StreamExt;
	use uuid::Uuid;

	use super::LocalChangeFeed;
	use crate::{
		adapters::feed::ChangeFeed,
		domain::message::{events::ChangeEvent, Message},
	};

	fn insert(recipient: &str) -> ChangeEvent {
		ChangeEvent::Insert {
			new: Message {
				id: Uuid::new_v4(),
				sender_id: "d".into(),
				recipient_id: recipient.into(),
				content: "yo".into(),
				sent_at: Utc::now(),
				read_at: None,
			},
		}
	}

	#[tokio::test]
	async fn test_subscription_is_filtered_to_recipient() {
		let feed = LocalChangeFeed::default();
		let mut stream = feed.subscribe("a").await.unwrap();

		feed.publish(&insert("someone-else")).await.unwrap();
		let mine = insert("a");
		feed.publish(&mine).await.unwrap();

		assert_eq!(stream.next().await.unwrap().unwrap(), mine);
	}

	#[tokio::test]
	async fn test_dropping_stream_releases_subscription() {
		let feed = LocalChangeFeed::default();
		let stream = feed.subscribe("a").await.unwrap();
		assert_eq!(feed.subscriber_count(), 1);
		drop(stream);
		assert_eq!(feed.subscriber_count(), 0);
	}
}
