use axum::{
	http::{HeaderMap, Request},
	middleware::Next,
	response::Response,
};

use crate::{domain::viewer::Viewer, services::response::ServiceError};

/// Set by the auth gateway in front of this service.
pub const VIEWER_HEADER: &str = "x-viewer-id";

pub fn viewer_from_headers(headers: &HeaderMap) -> Result<Viewer, ServiceError> {
	let value = headers.get(VIEWER_HEADER).map(|value| value.to_str().map_err(|_| ServiceError::AuthRequired)).transpose()?;
	Viewer::resolve(value)
}

/// Puts the signed-in [`Viewer`] into the request extensions, or answers 401.
pub async fn set_viewer<B>(
	mut request: Request<B>,
	next: Next<B>,
) -> Result<Response, ServiceError> {
	let viewer = viewer_from_headers(request.headers())?;
	request.extensions_mut().insert(viewer);

	Ok(next.run(request).await)
}
