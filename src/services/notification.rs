use std::sync::Arc;

use serde::Serialize;

use super::response::ServiceError;
use crate::{
	adapters::{notifier::Mailer, repositories::SettingsStore},
	domain::notification::{NotifyRequest, OutboundEmail},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyOutcome {
	/// Not a message notification, or no recipient given.
	Skipped,
	/// Recipient has no address or opted out of message e-mails.
	NoRecipient,
	Sent,
}

/// Turns notification requests into e-mails for users who want them.
pub struct NotificationHandler {
	settings: Arc<dyn SettingsStore>,
	mailer: Arc<dyn Mailer>,
	from: String,
	site_url: String,
}

impl NotificationHandler {
	pub fn new(
		settings: Arc<dyn SettingsStore>,
		mailer: Arc<dyn Mailer>,
		from: impl Into<String>,
		site_url: impl Into<String>,
	) -> Self {
		Self {
			settings,
			mailer,
			from: from.into(),
			site_url: site_url.into().trim_end_matches('/').to_string(),
		}
	}

	pub async fn handle(
		&self,
		request: NotifyRequest,
	) -> Result<NotifyOutcome, ServiceError> {
		let Some(recipient) = request.recipient() else {
			return Ok(NotifyOutcome::Skipped);
		};

		let settings = self.settings.notification_settings(recipient).await?;
		let Some(to) = settings.as_ref().and_then(|s| s.message_recipient()) else {
			tracing::debug!(recipient, "no e-mail for recipient");
			return Ok(NotifyOutcome::NoRecipient);
		};

		let email = OutboundEmail::render(&request, &self.from, to, &self.site_url);
		self.mailer.deliver(email).await?;
		tracing::info!(recipient, "message e-mail sent");
		Ok(NotifyOutcome::Sent)
	}
}
