use std::ops::Deref;

use async_nats::{Client, Subscriber};
use bytes::Bytes;
use serde::Serialize;
use sqlx::PgPool;

use crate::services::response::ServiceError;

/// Thin wrapper over the queue service connection that speaks JSON.
#[derive(Clone)]
pub struct QueueClient(Client);

impl QueueClient {
	pub async fn connect(url: &str) -> Result<Self, ServiceError> {
		let client = async_nats::ConnectOptions::new()
			.name("athlink-inbox")
			.connect(url)
			.await
			.map_err(|err| ServiceError::QueueServiceError(err.to_string()))?;
		Ok(Self(client))
	}

	pub async fn send<T: Serialize + ?Sized>(
		&self,
		subject: String,
		msg: &T,
	) -> Result<(), ServiceError> {
		let payload = serde_json::to_vec(msg).map_err(|_| ServiceError::ParsingError)?;
		self.0.publish(subject.clone(), Bytes::from(payload)).await.map_err(|err| {
			tracing::error!(subject = %subject, "message publishing error: {:?}", err);
			ServiceError::MessagePublishingError(err.to_string())
		})
	}

	pub async fn subscribe(
		&self,
		subject: String,
	) -> Result<Subscriber, ServiceError> {
		self.0.subscribe(subject).await.map_err(|err| ServiceError::QueueServiceError(err.to_string()))
	}

	pub async fn flush(&self) -> Result<(), ServiceError> {
		self.0.flush().await.map_err(|err| ServiceError::QueueServiceError(err.to_string()))
	}
}

impl From<Client> for QueueClient {
	fn from(value: Client) -> Self {
		Self(value)
	}
}

impl Deref for QueueClient {
	type Target = Client;
	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// Applies the bundled schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), ServiceError> {
	sqlx::migrate!("./migrations").run(pool).await.map_err(|err| {
		tracing::error!("migration failed: {:?}", err);
		ServiceError::Config(format!("migration failed: {err}"))
	})
}
