use crate::services::response::ServiceError;

pub struct Config {
	/// Which errors we want to log
	pub log_level: String,

	/// Port server is listening to
	pub server_ip_port: String,
	pub queue_url: String,
	pub database_url: String,
	pub allow_origins: String,

	/// Public base URL used in notification links
	pub site_url: String,
	pub mail_from: String,

	/// Where new-message notifications are POSTed
	pub notify_url: String,
	/// Mail goes to `mail.outbound` when unset
	pub resend_api_key: Option<String>,
}

impl Config {
	pub fn new() -> Result<Config, ServiceError> {
		dotenv::dotenv().ok();
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ServiceError> {
		let required = |key: &str| lookup(key).ok_or_else(|| ServiceError::Config(format!("{key} must be set")));

		let queue_url = required("QUEUE_URL")?;
		let database_url = required("DATABASE_URL")?;
		let log_level = lookup("LOG_LEVEL").unwrap_or("warn".to_string());
		let server_ip_port = lookup("SERVER_IP_PORT").unwrap_or("0.0.0.0:80".into());
		let allow_origins = lookup("ALLOW_ORIGINS").unwrap_or("http://localhost:3000,http://localhost:3001".to_string());
		let site_url = lookup("SITE_URL").unwrap_or("http://localhost:3000".to_string());
		let mail_from = lookup("MAIL_FROM").unwrap_or("ATHLINK <no-reply@athlink.app>".to_string());
		let notify_url = lookup("NOTIFY_URL").unwrap_or_else(|| {
			let port = server_ip_port.rsplit(':').next().unwrap_or("80");
			format!("http://127.0.0.1:{port}/athlink-inbox/notify-email")
		});
		let resend_api_key = lookup("RESEND_API_KEY").filter(|key| !key.trim().is_empty());

		Ok(Config {
			queue_url,
			log_level,
			server_ip_port,
			database_url,
			allow_origins,
			site_url: site_url.trim_end_matches('/').to_string(),
			mail_from,
			notify_url,
			resend_api_key,
		})
	}

	pub fn allowed_origins(&self) -> impl Iterator<Item = &str> {
		self.allow_origins.split(',').map(str::trim).filter(|origin| !origin.is_empty())
	}
}

#[cfg(test)]
mod test {
	use std::collections::HashMap;

	use super::Config;
	use crate::services::response::ServiceError;

	#[test]
	fn test_missing_database_url_is_config_error() {
		let env: HashMap<&str, &str> = HashMap::from([("QUEUE_URL", "nats://localhost:4222")]);
		let result = Config::from_lookup(|key| env.get(key).map(|v| v.to_string()));
		assert!(matches!(result, Err(ServiceError::Config(msg)) if msg.contains("DATABASE_URL")));
	}

	#[test]
	fn test_defaults() {
		let env: HashMap<&str, &str> = HashMap::from([
			("QUEUE_URL", "nats://localhost:4222"),
			("DATABASE_URL", "postgres://localhost/athlink"),
			("SITE_URL", "https://athlink.app/"),
			("ALLOW_ORIGINS", "https://athlink.app, ,https://www.athlink.app"),
		]);
		let config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();

		assert_eq!(config.server_ip_port, "0.0.0.0:80");
		assert_eq!(config.notify_url, "http://127.0.0.1:80/athlink-inbox/notify-email");
		assert_eq!(config.resend_api_key, None);
		assert_eq!(config.site_url, "https://athlink.app");
		assert_eq!(config.allowed_origins().collect::<Vec<_>>(), vec!["https://athlink.app", "https://www.athlink.app"]);
	}
}
