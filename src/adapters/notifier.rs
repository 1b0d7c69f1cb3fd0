use std::time::Duration;

use async_trait::async_trait;

use crate::{
	common::middleware_viewer_header::VIEWER_HEADER,
	database::QueueClient,
	domain::notification::{NotifyRequest, OutboundEmail, MAIL_SUBJECT},
	services::response::ServiceError,
};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound side of the notification channel, called after a send.
#[async_trait]
pub trait Notifier: Send + Sync {
	async fn notify(
		&self,
		sender_id: &str,
		request: NotifyRequest,
	) -> Result<(), ServiceError>;
}

/// Hands a rendered e-mail to whatever delivers mail.
#[async_trait]
pub trait Mailer: Send + Sync {
	async fn deliver(
		&self,
		email: OutboundEmail,
	) -> Result<(), ServiceError>;
}

/// POSTs the request to the notification endpoint on behalf of the sender.
pub struct HttpNotifier {
	client: reqwest::Client,
	url: String,
}

impl HttpNotifier {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			url: url.into(),
		}
	}
}

#[async_trait]
impl Notifier for HttpNotifier {
	async fn notify(
		&self,
		sender_id: &str,
		request: NotifyRequest,
	) -> Result<(), ServiceError> {
		self.client
			.post(&self.url)
			.header(VIEWER_HEADER, sender_id)
			.json(&request)
			.timeout(REQUEST_TIMEOUT)
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(|err| ServiceError::NotificationError(err.to_string()))?;
		Ok(())
	}
}

/// Sends through the Resend HTTP API.
pub struct ResendMailer {
	client: reqwest::Client,
	api_key: String,
	endpoint: String,
}

impl ResendMailer {
	pub fn new(api_key: impl Into<String>) -> Self {
		Self::with_endpoint(api_key, RESEND_ENDPOINT)
	}

	pub(crate) fn with_endpoint(
		api_key: impl Into<String>,
		endpoint: impl Into<String>,
	) -> Self {
		Self {
			client: reqwest::Client::new(),
			api_key: api_key.into(),
			endpoint: endpoint.into(),
		}
	}
}

#[async_trait]
impl Mailer for ResendMailer {
	async fn deliver(
		&self,
		email: OutboundEmail,
	) -> Result<(), ServiceError> {
		self.client
			.post(&self.endpoint)
			.bearer_auth(&self.api_key)
			.json(&email)
			.timeout(REQUEST_TIMEOUT)
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(|err| ServiceError::NotificationError(err.to_string()))?;
		Ok(())
	}
}

/// Publishes rendered e-mails on `mail.outbound` for an external mail relay.
pub struct QueueMailer(pub QueueClient);

#[async_trait]
impl Mailer for QueueMailer {
	async fn deliver(
		&self,
		email: OutboundEmail,
	) -> Result<(), ServiceError> {
		self.0.send(MAIL_SUBJECT.to_string(), &email).await
	}
}
