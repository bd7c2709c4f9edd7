use crate::error::AppError;
use crate::models::{CallerIdentity, Role};
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticating gateway in front of the service sets both headers.
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|_| AppError::Unauthorized("malformed caller id".to_string()))?;
        let role = header(parts, USER_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(|_| AppError::Unauthorized("malformed caller role".to_string()))?;
        Ok(CallerIdentity::new(user_id, role))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("missing caller identity".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(builder: axum::http::request::Builder) -> Result<CallerIdentity, AppError> {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CallerIdentity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_reads_gateway_headers() {
        let id = Uuid::new_v4();
        let caller = extract(
            Request::builder()
                .header(USER_ID_HEADER, id.to_string())
                .header(USER_ROLE_HEADER, "Driver"),
        )
        .await
        .unwrap();
        assert_eq!(caller, CallerIdentity::driver(id));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_is_unauthorized() {
        let missing = extract(Request::builder()).await;
        assert!(matches!(missing, Err(AppError::Unauthorized(_))));

        let bad_id = extract(
            Request::builder()
                .header(USER_ID_HEADER, "not-a-uuid")
                .header(USER_ROLE_HEADER, "rider"),
        )
        .await;
        assert!(matches!(bad_id, Err(AppError::Unauthorized(_))));

        let bad_role = extract(
            Request::builder()
                .header(USER_ID_HEADER, Uuid::new_v4().to_string())
                .header(USER_ROLE_HEADER, "passenger"),
        )
        .await;
        assert!(matches!(bad_role, Err(AppError::Unauthorized(_))));
    }
}
