//! Request extractors for caller identity.
//!
//! Sessions live upstream: signed-in customers arrive with `x-user-id`, and
//! operator tooling sends the shared `x-admin-token`.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::warn;
use uuid::Uuid;

use crate::error::{parse_id, BookingError};
use crate::AppState;

/// Header set by the upstream session layer for signed-in callers.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the operator secret (`app.admin_token`).
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Caller identity. `None` for guests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Option<Uuid>);

impl CurrentUser {
    pub fn require(self) -> Result<Uuid, BookingError> {
        self.0.ok_or_else(|| {
            BookingError::InvalidArgument(format!("{USER_ID_HEADER} header is required"))
        })
    }

    /// Guest bookings are visible to anyone holding their id; owned
    /// bookings only to their owner.
    pub fn can_see(self, owner: Option<Uuid>) -> bool {
        owner.is_none() || owner == self.0
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = BookingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(CurrentUser(None));
        };
        let value = value
            .to_str()
            .map_err(|_| BookingError::InvalidId {
                field: "user_id",
                value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            })?;
        if value.trim().is_empty() {
            return Ok(CurrentUser(None));
        }
        Ok(CurrentUser(Some(parse_id("user_id", value)?)))
    }
}

/// An operator. Rejects with `Forbidden` unless the request carries the
/// configured admin token; an empty token refuses everyone.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser;

impl AdminUser {
    fn check(expected: &str, presented: Option<&str>) -> Result<Self, BookingError> {
        match presented {
            Some(token) if !expected.is_empty() && token == expected => Ok(AdminUser),
            Some(_) => Err(BookingError::Forbidden("admin token rejected".into())),
            None => Err(BookingError::Forbidden(format!(
                "{ADMIN_TOKEN_HEADER} header is required"
            ))),
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = BookingError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        let admin = Self::check(&state.config.app.admin_token, presented);
        if admin.is_err() {
            warn!(path = %parts.uri.path(), "Operator route refused");
        }
        admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<CurrentUser, BookingError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_header_is_a_guest() {
        assert_eq!(extract(None).await.unwrap(), CurrentUser(None));
    }

    #[tokio::test]
    async fn valid_header_identifies_the_caller() {
        let id = Uuid::new_v4();
        assert_eq!(
            extract(Some(&id.to_string())).await.unwrap(),
            CurrentUser(Some(id))
        );
    }

    #[tokio::test]
    async fn malformed_header_is_rejected() {
        assert!(matches!(
            extract(Some("42")).await,
            Err(BookingError::InvalidId { field: "user_id", .. })
        ));
    }

    #[test]
    fn admin_token_must_match() {
        assert!(AdminUser::check("s3cret", Some("s3cret")).is_ok());
        assert!(matches!(
            AdminUser::check("s3cret", Some("guess")),
            Err(BookingError::Forbidden(_))
        ));
        assert!(matches!(
            AdminUser::check("s3cret", None),
            Err(BookingError::Forbidden(_))
        ));
    }

    #[test]
    fn empty_admin_token_disables_operator_routes() {
        assert!(AdminUser::check("", Some("")).is_err());
        assert!(AdminUser::check("", None).is_err());
    }

    #[test]
    fn owners_and_guests() {
        let owner = Uuid::new_v4();
        assert!(CurrentUser(None).can_see(None));
        assert!(CurrentUser(Some(owner)).can_see(Some(owner)));
        assert!(!CurrentUser(None).can_see(Some(owner)));
        assert!(!CurrentUser(Some(Uuid::new_v4())).can_see(Some(owner)));
    }
}
