use serde::{Deserialize, Serialize};

/// Row of `user_settings`, reduced to the columns messaging cares about.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationSettings {
	pub user_id: String,
	pub notification_email: Option<String>,
	pub email_on_message: Option<bool>,
}

impl NotificationSettings {
	/// Address to notify about a new message, if the user wants one.
	/// An unset `email_on_message` counts as opted in.
	pub fn message_recipient(&self) -> Option<&str> {
		if self.email_on_message == Some(false) {
			return None;
		}
		self.notification_email.as_deref().map(str::trim).filter(|email| !email.is_empty())
	}
}

#[test]
fn test_message_recipient_respects_opt_out() {
	let mut settings = NotificationSettings {
		user_id: "u".into(),
		notification_email: Some("coach@university.edu".into()),
		email_on_message: None,
	};
	assert_eq!(settings.message_recipient(), Some("coach@university.edu"));

	settings.email_on_message = Some(false);
	assert_eq!(settings.message_recipient(), None);

	settings.email_on_message = Some(true);
	settings.notification_email = Some("  ".into());
	assert_eq!(settings.message_recipient(), None);
}
