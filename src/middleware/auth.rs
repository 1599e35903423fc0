use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::rbac::{parse_roles, Role};
use crate::auth::{self, apikey};
use crate::database::models::staff::StaffAccount;
use crate::database::models::system::ApiKey;
use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated principal injected into request extensions. Either a staff
/// session (JWT) or a programmatic API key; both carry a role set so the
/// permission gate applies uniformly.
#[derive(Clone, Debug)]
pub struct StaffContext {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub roles: Vec<Role>,
    pub step_up_until: Option<DateTime<Utc>>,
}

/// Authentication middleware for everything under /admin except login.
///
/// Roles are resolved from the database on every request, so membership
/// changes apply on the next permission check rather than at token issue.
pub async fn require_staff(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let context = if let Some(raw_key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        authenticate_api_key(&state, raw_key).await?
    } else {
        let token = extract_bearer(&headers)?;
        authenticate_staff(&state, &token).await?
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<String, ApiError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    let value = header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header format"))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.to_string()),
        Some(_) => Err(ApiError::unauthorized("Empty bearer token")),
        None => Err(ApiError::unauthorized(
            "Authorization header must use Bearer token format",
        )),
    }
}

async fn authenticate_staff(state: &AppState, token: &str) -> Result<StaffContext, ApiError> {
    let claims = auth::validate_token(token, &state.config.security.jwt_secret)?;

    let staff = load_staff(state, claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Staff account not found"))?;

    if !staff.is_active {
        return Err(ApiError::forbidden("Staff account is inactive"));
    }

    let roles = load_staff_roles(state, staff.id).await?;

    Ok(StaffContext {
        id: staff.id,
        name: staff.name,
        email: Some(staff.email),
        roles,
        step_up_until: claims.step_up_until(),
    })
}

/// API keys act with the roles named in their scopes. Step-up never applies:
/// keys cannot re-prove credentials, so sensitive actions stay out of reach.
async fn authenticate_api_key(state: &AppState, raw_key: &str) -> Result<StaffContext, ApiError> {
    let digest = apikey::hash_key(raw_key);

    let key = sqlx::query_as::<_, ApiKey>(
        "SELECT id, name, key_hash, scopes, created_by, expires_at, revoked_at, created_at
         FROM api_keys WHERE key_hash = $1",
    )
    .bind(&digest)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::unauthorized("Unknown API key"))?;

    if !apikey::key_is_usable(key.revoked_at, key.expires_at, Utc::now()) {
        return Err(ApiError::unauthorized("API key is revoked or expired"));
    }

    Ok(StaffContext {
        id: key.id,
        name: key.name.clone(),
        email: None,
        roles: parse_roles(key.scope_names()),
        step_up_until: None,
    })
}

pub async fn load_staff(state: &AppState, staff_id: Uuid) -> Result<Option<StaffAccount>, ApiError> {
    let staff = sqlx::query_as::<_, StaffAccount>(
        "SELECT id, email, name, hashed_password, is_active, mfa_enabled, created_at
         FROM staff_accounts WHERE id = $1",
    )
    .bind(staff_id)
    .fetch_optional(&state.pool)
    .await?;
    Ok(staff)
}

pub async fn load_staff_roles(state: &AppState, staff_id: Uuid) -> Result<Vec<Role>, ApiError> {
    let names = load_staff_role_names(state, staff_id).await?;
    Ok(parse_roles(names))
}

pub async fn load_staff_role_names(
    state: &AppState,
    staff_id: Uuid,
) -> Result<Vec<String>, ApiError> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT r.name FROM roles r
         JOIN staff_roles sr ON sr.role_id = r.id
         WHERE sr.staff_id = $1
         ORDER BY r.name",
    )
    .bind(staff_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_extraction() {
        let token = extract_bearer(&headers_with_auth("Bearer abc.def.ghi")).unwrap();
        assert_eq!(token, "abc.def.ghi");
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let err = extract_bearer(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");
    }

    #[test]
    fn non_bearer_schemes_are_rejected() {
        assert!(extract_bearer(&headers_with_auth("Basic dXNlcjpwdw==")).is_err());
        assert!(extract_bearer(&headers_with_auth("Bearer ")).is_err());
    }
}
