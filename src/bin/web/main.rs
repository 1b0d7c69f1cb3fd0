pub mod routers;

use std::{net::SocketAddr, str::FromStr, sync::Arc};

use axum::{
	http::{header, HeaderValue, Method},
	Router,
};

use inbox::{
	adapters::{
		feed::NatsChangeFeed,
		notifier::{HttpNotifier, Mailer, QueueMailer, ResendMailer},
		repositories::{PgMessageStore, PgSettingsStore},
	},
	common::middleware_viewer_header::VIEWER_HEADER,
	database::migrate,
	dependencies::{config, connection_pool, queue_client},
	services::{handlers::InboxHandler, notification::NotificationHandler, response::ServiceError},
};
use tower::ServiceBuilder;
use tower_http::{
	cors::{AllowOrigin, CorsLayer},
	trace::TraceLayer,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::routers::AppState;

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
	let config = config()?;

	// ! Tracing
	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
			// axum logs rejections from built-in extractors with the `axum::rejection`
			// target, at `TRACE` level. `axum::rejection=trace` enables showing those events
			format!("inbox={level},web={level},tower_http=debug,axum::rejection=trace", level = config.log_level).into()
		}))
		.with(tracing_subscriber::fmt::layer())
		.init();

	// ! Connection
	tracing::info!("connections are being pooled");
	let pool = connection_pool().await?;
	migrate(pool).await?;
	let queue = queue_client().await?;

	let mailer: Arc<dyn Mailer> = match &config.resend_api_key {
		Some(api_key) => Arc::new(ResendMailer::new(api_key.clone())),
		None => {
			tracing::warn!("RESEND_API_KEY not set, handing e-mails to mail.outbound");
			Arc::new(QueueMailer(queue.clone()))
		}
	};
	let notifications = Arc::new(NotificationHandler::new(
		Arc::new(PgSettingsStore::new(pool)),
		mailer,
		config.mail_from.clone(),
		config.site_url.clone(),
	));

	let state = AppState {
		inbox: InboxHandler::new(
			Arc::new(PgMessageStore::new(pool)),
			Arc::new(NatsChangeFeed::new(queue.clone())),
			Arc::new(HttpNotifier::new(config.notify_url.clone())),
		),
		notifications,
	};

	let origins: Vec<HeaderValue> = config.allowed_origins().filter_map(|origin| origin.parse().ok()).collect();
	let service_name = "/athlink-inbox";
	let app = Router::new().nest(service_name, routers::app(state)).layer(
		ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
			CorsLayer::new()
				.allow_origin(AllowOrigin::list(origins))
				.allow_methods([Method::GET, Method::POST])
				.allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static(VIEWER_HEADER)]),
		),
	);

	let addr = SocketAddr::from_str(&config.server_ip_port).map_err(|err| ServiceError::Config(format!("SERVER_IP_PORT: {err}")))?;
	tracing::info!(%addr, "start web server");
	axum::Server::bind(&addr)
		.serve(app.into_make_service())
		.await
		.map_err(|err| ServiceError::Config(format!("server error: {err}")))
}
