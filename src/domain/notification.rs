use html_escape::{encode_double_quoted_attribute, encode_safe};
use serde::{Deserialize, Serialize};

use super::message::Message;

pub const MAIL_SUBJECT: &str = "mail.outbound";
pub const DEFAULT_TITLE: &str = "Nouveau message sur ATHLINK";
const DEFAULT_PREVIEW: &str = "Tu as reçu un nouveau message.";

/// Body of the notification side channel.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
	#[serde(rename = "type", default)]
	pub kind: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub recipient_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preview: Option<String>,
}

impl NotifyRequest {
	pub fn new_message(message: &Message) -> Self {
		Self {
			kind: "message".to_string(),
			recipient_id: Some(message.recipient_id.clone()),
			title: None,
			url: None,
			preview: Some(message.preview()),
		}
	}

	/// Recipient of a message notification. Anything else is acknowledged
	/// and ignored.
	pub fn recipient(&self) -> Option<&str> {
		if self.kind != "message" {
			return None;
		}
		self.recipient_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
	}
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct OutboundEmail {
	pub from: String,
	pub to: String,
	pub subject: String,
	pub html: String,
}

impl OutboundEmail {
	pub fn render(
		request: &NotifyRequest,
		from: &str,
		to: &str,
		site_url: &str,
	) -> Self {
		let subject = request.title.clone().unwrap_or_else(|| DEFAULT_TITLE.to_string());
		let link = request
			.url
			.clone()
			.unwrap_or_else(|| format!("{}/messages/{}", site_url, request.recipient().unwrap_or_default()));
		let preview = request.preview.as_deref().filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PREVIEW);

		let html = format!(
			r#"<div style="font-family: Inter, Arial, sans-serif; line-height:1.5;">
  <h2 style="margin:0 0 8px 0;">{subject}</h2>
  <p style="margin:0 0 8px 0; color:#475569;">{preview}</p>
  <p style="margin:16px 0;">
    <a href="{link}" style="background:#0F172A;color:#fff;padding:10px 14px;border-radius:8px;text-decoration:none;">Ouvrir la messagerie</a>
  </p>
</div>"#,
			subject = encode_safe(&subject),
			preview = encode_safe(preview),
			link = encode_double_quoted_attribute(&link),
		);

		Self {
			from: from.to_string(),
			to: to.to_string(),
			subject,
			html,
		}
	}
}

#[cfg(test)]
mod test {
	use super::{NotifyRequest, OutboundEmail, DEFAULT_TITLE};

	fn request() -> NotifyRequest {
		serde_json::from_str(r#"{"type":"message","recipientId":"athlete-1","preview":"<b>Hi</b> & welcome"}"#).unwrap()
	}

	#[test]
	fn test_wire_format_is_camel_case() {
		let req = request();
		assert_eq!(req.recipient(), Some("athlete-1"));

		let json = serde_json::to_value(&req).unwrap();
		assert_eq!(json["type"], "message");
		assert_eq!(json["recipientId"], "athlete-1");
		assert!(json.get("title").is_none());
	}

	#[test]
	fn test_requests_without_a_message_recipient_are_skipped() {
		for body in [
			r#"{"type":"like","recipientId":"x"}"#,
			r#"{"type":"message"}"#,
			r#"{"type":"message","recipientId":null}"#,
			r#"{"type":"message","recipientId":"  "}"#,
			r#"{"recipientId":"x"}"#,
			r#"{}"#,
		] {
			let req: NotifyRequest = serde_json::from_str(body).unwrap();
			assert_eq!(req.recipient(), None, "{body}");
		}
	}

	#[test]
	fn test_render_defaults_and_escapes() {
		let email = OutboundEmail::render(&request(), "ATHLINK <no-reply@athlink.app>", "a@b.c", "https://athlink.app");

		assert_eq!(email.subject, DEFAULT_TITLE);
		assert_eq!(email.to, "a@b.c");
		assert!(email.html.contains("https://athlink.app/messages/athlete-1"));
		assert!(email.html.contains("&lt;b&gt;Hi"));
		assert!(email.html.contains("&amp; welcome"));
		assert!(!email.html.contains("<b>Hi"));

		let quoted = NotifyRequest {
			url: Some(r#"https://athlink.app/x" onclick="y"#.into()),
			..request()
		};
		let email = OutboundEmail::render(&quoted, "from", "to", "https://athlink.app");
		assert!(!email.html.contains(r#"x" onclick"#));
	}
}
