use std::sync::OnceLock;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{config::Config, database::QueueClient, services::response::ServiceError};

pub fn config() -> Result<&'static Config, ServiceError> {
	static CONFIG: OnceLock<Config> = OnceLock::new();
	let config = match CONFIG.get() {
		None => {
			let config = Config::new()?;

			CONFIG.get_or_init(|| config)
		}
		Some(config) => config,
	};
	Ok(config)
}

pub async fn connection_pool() -> Result<&'static PgPool, ServiceError> {
	static POOL: OnceLock<PgPool> = OnceLock::new();

	let p = match POOL.get() {
		None => {
			let url: &String = &config()?.database_url;
			let pool = PgPoolOptions::new().max_connections(30).connect(url).await.map_err(|err| {
				tracing::error!("database connection error: {:?}", err);
				ServiceError::Config(format!("database unreachable: {err}"))
			})?;
			POOL.get_or_init(|| pool)
		}
		Some(pool) => pool,
	};
	Ok(p)
}

pub async fn queue_client() -> Result<&'static QueueClient, ServiceError> {
	static CLIENT: OnceLock<QueueClient> = OnceLock::new();

	let c = match CLIENT.get() {
		None => {
			let cl = QueueClient::connect(&config()?.queue_url).await?;
			CLIENT.get_or_init(|| cl)
		}
		Some(c) => c,
	};
	Ok(c)
}
