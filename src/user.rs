//! Caller identity. Sessions are issued and verified upstream of this
//! service; by the time a request reaches us the fronting proxy has
//! resolved it to a stable user id carried in a trusted header.
use axum::{
    extract::FromRequestParts,
    http::{header::HeaderName, request::Parts},
};

use crate::error::AppError;

pub static USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

pub struct AuthedUser(pub String);

impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(&USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AppError::Unauthorized)?;

        Ok(Self(user_id.to_string()))
    }
}
