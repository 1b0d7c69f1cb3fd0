use std::{fmt::Display, ops::Deref};

use serde::{Deserialize, Serialize};

use crate::services::response::ServiceError;

/// Identity of the signed-in user, as resolved by the auth gateway.
/// Opaque to this service.
#[derive(Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Viewer(String);

impl Viewer {
	pub fn resolve(id: Option<&str>) -> Result<Self, ServiceError> {
		match id.map(str::trim) {
			Some(id) if !id.is_empty() => Ok(Self(id.to_string())),
			_ => Err(ServiceError::AuthRequired),
		}
	}

	pub fn id(&self) -> &str {
		&self.0
	}
}

impl Deref for Viewer {
	type Target = str;
	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl Display for Viewer {
	fn fmt(
		&self,
		f: &mut std::fmt::Formatter<'_>,
	) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

#[test]
fn test_blank_identity_requires_auth() {
	assert!(matches!(Viewer::resolve(None), Err(ServiceError::AuthRequired)));
	assert!(matches!(Viewer::resolve(Some("  ")), Err(ServiceError::AuthRequired)));
	assert_eq!(Viewer::resolve(Some(" u-1 ")).unwrap().id(), "u-1");
}
