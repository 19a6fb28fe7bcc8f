//! Authentication middleware for account token validation

use super::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

/// Authenticated account resolved from the request token, available to
/// handlers as a request extension
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

/// Authentication middleware
///
/// Validates the Authorization header against registered account tokens.
/// Expected format: `Authorization: Bearer <token>`
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => header[7..].to_string(),
        Some(_) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "Invalid Authorization header format. Expected: Bearer <token>"
                })),
            )
                .into_response();
        }
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "Account token required. Set Authorization: Bearer <token>"
                })),
            )
                .into_response();
        }
    };

    let lookup = state
        .db
        .with_conn(move |conn| {
            conn.query_row(
                "SELECT id, username FROM users WHERE token = ?",
                [&token],
                |row| {
                    Ok(CurrentUser {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                },
            )
        })
        .await;

    match lookup {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(crate::error::CoreError::Database(rusqlite::Error::QueryReturnedNoRows)) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid account token" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_bearer_token_extraction() {
        let header = "Bearer my-secret-token";
        assert!(header.starts_with("Bearer "));
        let token = &header[7..];
        assert_eq!(token, "my-secret-token");
    }
}
