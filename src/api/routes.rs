//! HTTP route handlers for the API

use super::auth::CurrentUser;
use super::AppState;
use crate::validate::image;
use crate::validate::{
    validate_description, validate_memory_date, validate_title, validate_username, FieldError,
    FormErrors,
};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

/// Timeline page size
const PAGE_SIZE: i64 = 12;

// ============================================================================
// Health Check
// ============================================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============================================================================
// Registration
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if let Err(e) = validate_username(&req.username) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "errors": { "username": e.reason } })),
        )
            .into_response();
    }

    let id = uuid::Uuid::new_v4().to_string();
    let token = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let id_clone = id.clone();
    let token_clone = token.clone();
    let username = req.username.clone();

    let result = state
        .db
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (id, username, token, created_at) VALUES (?, ?, ?, ?)",
                rusqlite::params![id_clone, req.username, token_clone, now],
            )
        })
        .await;

    match result {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": id,
                "username": username,
                "token": token
            })),
        )
            .into_response(),
        Err(crate::error::CoreError::Database(rusqlite::Error::SqliteFailure(e, _)))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            (
                StatusCode::CONFLICT,
                Json(serde_json::json!({ "error": "Username already taken" })),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

// ============================================================================
// Memories
// ============================================================================

/// Fields carried by a multipart memory submission
#[derive(Debug, Default)]
struct MemoryUpload {
    title: Option<String>,
    description: Option<String>,
    date: Option<String>,
    image: Option<(String, Vec<u8>)>,
}

/// Drain a multipart body into the known fields; unknown parts are ignored
async fn read_multipart(
    multipart: &mut Multipart,
) -> std::result::Result<MemoryUpload, String> {
    let mut upload = MemoryUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("invalid multipart body: {}", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => {
                upload.title = Some(field.text().await.map_err(|e| e.to_string())?);
            }
            "description" => {
                upload.description = Some(field.text().await.map_err(|e| e.to_string())?);
            }
            "date" => {
                upload.date = Some(field.text().await.map_err(|e| e.to_string())?);
            }
            "image" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(|e| e.to_string())?;
                upload.image = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    Ok(upload)
}

fn required(value: Option<&str>) -> std::result::Result<&str, FieldError> {
    match value {
        Some(v) => Ok(v),
        None => Err(FieldError::new("This field is required.")),
    }
}

fn parse_date(value: &str) -> std::result::Result<NaiveDate, FieldError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| FieldError::new("Enter a valid date in YYYY-MM-DD format."))
}

/// Validate every submitted field, collecting all rejections so the caller
/// can report them in one response
fn validate_upload(
    upload: &MemoryUpload,
    state: &AppState,
    image_required: bool,
) -> (FormErrors, Option<NaiveDate>) {
    let mut errors = FormErrors::new();
    let mut date = None;

    match required(upload.title.as_deref()) {
        Ok(title) => errors.check("title", validate_title(title)),
        Err(e) => errors.check("title", Err(e)),
    }

    match required(upload.description.as_deref()) {
        Ok(desc) => errors.check("description", validate_description(desc)),
        Err(e) => errors.check("description", Err(e)),
    }

    match required(upload.date.as_deref()).and_then(|raw| parse_date(raw)) {
        Ok(d) => {
            errors.check("date", validate_memory_date(d));
            date = Some(d);
        }
        Err(e) => errors.check("date", Err(e)),
    }

    match &upload.image {
        Some((filename, bytes)) => {
            errors.check("image", image::validate_filename(filename));
            errors.check(
                "image",
                image::validate_image(
                    bytes,
                    bytes.len() as u64,
                    &state.uploads,
                    state.sniffer.as_ref(),
                ),
            );
        }
        None if image_required => {
            errors.check("image", Err(FieldError::new("This field is required.")));
        }
        None => {}
    }

    (errors, date)
}

fn memory_row_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    Ok(serde_json::json!({
        "id": id,
        "title": row.get::<_, String>(1)?,
        "description": row.get::<_, String>(2)?,
        "image_url": format!("/api/memories/{}/image", id),
        "date": row.get::<_, String>(3)?,
        "created_at": row.get::<_, String>(4)?,
        "updated_at": row.get::<_, String>(5)?,
    }))
}

const MEMORY_COLUMNS: &str = "id, title, description, date, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    pub page: Option<i64>,
}

/// Chronological feed of the caller's own memories, most recent date first
pub async fn list_memories(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<TimelineQuery>,
) -> impl IntoResponse {
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * PAGE_SIZE;
    let user_id = user.id.clone();

    let result = state
        .db
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM memories
                 WHERE user_id = ?
                 ORDER BY date DESC, created_at DESC
                 LIMIT ? OFFSET ?",
                MEMORY_COLUMNS
            ))?;

            let memories: Vec<serde_json::Value> = stmt
                .query_map(
                    rusqlite::params![user_id, PAGE_SIZE, offset],
                    memory_row_json,
                )?
                .filter_map(|r| r.ok())
                .collect();

            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE user_id = ?",
                [&user_id],
                |row| row.get(0),
            )?;

            Ok((memories, total))
        })
        .await;

    match result {
        Ok((memories, total)) => Json(serde_json::json!({
            "memories": memories,
            "total": total,
            "page": page,
            "pages": (total + PAGE_SIZE - 1) / PAGE_SIZE,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn create_memory(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let upload = match read_multipart(&mut multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e })),
            )
                .into_response();
        }
    };

    let (errors, date) = validate_upload(&upload, &state, true);
    if !errors.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "errors": errors })),
        )
            .into_response();
    }

    // Validation guarantees all fields are present past this point
    let (filename, bytes) = upload.image.unwrap();
    let title = upload.title.unwrap();
    let description = upload.description.unwrap();
    let date = date.unwrap();

    let stored_name = image::upload_filename(&filename);
    let image_path = match state.media.save(&stored_name, &bytes).await {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("Failed to store upload: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to store image" })),
            )
                .into_response();
        }
    };

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let id_clone = id.clone();
    let user_id = user.id.clone();
    let now_clone = now.clone();
    let title_clone = title.clone();
    let image_path_clone = image_path.clone();

    let result = state
        .db
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO memories (id, user_id, title, description, image_path, date, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    id_clone,
                    user_id,
                    title_clone,
                    description,
                    image_path_clone,
                    date.to_string(),
                    now_clone,
                    now_clone
                ],
            )
        })
        .await;

    match result {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": id,
                "title": title,
                "image_url": format!("/api/memories/{}/image", id),
                "date": date.to_string(),
                "created_at": now
            })),
        )
            .into_response(),
        Err(e) => {
            // Keep the media directory consistent with the table
            let _ = state.media.delete(&image_path).await;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn get_memory(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user_id = user.id.clone();
    let result = state
        .db
        .with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM memories WHERE id = ? AND user_id = ?",
                    MEMORY_COLUMNS
                ),
                rusqlite::params![id, user_id],
                memory_row_json,
            )
        })
        .await;

    match result {
        Ok(memory) => Json(memory).into_response(),
        // Another user's memory is reported as missing, not forbidden
        Err(crate::error::CoreError::Database(rusqlite::Error::QueryReturnedNoRows)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Memory not found" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn update_memory(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    // Ownership check up front; the old image path is needed either way
    let id_clone = id.clone();
    let user_id = user.id.clone();
    let existing = state
        .db
        .with_conn(move |conn| {
            conn.query_row(
                "SELECT image_path FROM memories WHERE id = ? AND user_id = ?",
                rusqlite::params![id_clone, user_id],
                |row| row.get::<_, String>(0),
            )
        })
        .await;

    let old_image_path = match existing {
        Ok(path) => path,
        Err(crate::error::CoreError::Database(rusqlite::Error::QueryReturnedNoRows)) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Memory not found" })),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let upload = match read_multipart(&mut multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e })),
            )
                .into_response();
        }
    };

    // Image stays optional on update: absent means keep the stored one
    let (errors, date) = validate_upload(&upload, &state, false);
    if !errors.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "errors": errors })),
        )
            .into_response();
    }

    let new_image_path = match &upload.image {
        Some((filename, bytes)) => {
            let stored_name = image::upload_filename(filename);
            match state.media.save(&stored_name, bytes).await {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::error!("Failed to store upload: {}", e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(serde_json::json!({ "error": "Failed to store image" })),
                    )
                        .into_response();
                }
            }
        }
        None => None,
    };

    let now = chrono::Utc::now().to_rfc3339();
    let id_clone = id.clone();
    let user_id = user.id.clone();
    let now_clone = now.clone();
    let title = upload.title.unwrap();
    let description = upload.description.unwrap();
    let date = date.unwrap();
    let image_for_update = new_image_path.clone();

    let result = state
        .db
        .with_conn(move |conn| match image_for_update {
            Some(image_path) => conn.execute(
                "UPDATE memories SET title = ?, description = ?, date = ?, image_path = ?, updated_at = ?
                 WHERE id = ? AND user_id = ?",
                rusqlite::params![title, description, date.to_string(), image_path, now_clone, id_clone, user_id],
            ),
            None => conn.execute(
                "UPDATE memories SET title = ?, description = ?, date = ?, updated_at = ?
                 WHERE id = ? AND user_id = ?",
                rusqlite::params![title, description, date.to_string(), now_clone, id_clone, user_id],
            ),
        })
        .await;

    match result {
        Ok(_) => {
            if new_image_path.is_some() {
                if let Err(e) = state.media.delete(&old_image_path).await {
                    tracing::warn!("Failed to remove replaced image: {}", e);
                }
            }
            Json(serde_json::json!({
                "id": id,
                "updated_at": now
            }))
            .into_response()
        }
        Err(e) => {
            if let Some(path) = new_image_path {
                let _ = state.media.delete(&path).await;
            }
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn delete_memory(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id_clone = id.clone();
    let user_id = user.id.clone();

    let result = state
        .db
        .with_conn(move |conn| {
            let image_path = conn.query_row(
                "SELECT image_path FROM memories WHERE id = ? AND user_id = ?",
                rusqlite::params![id_clone, user_id],
                |row| row.get::<_, String>(0),
            )?;
            conn.execute(
                "DELETE FROM memories WHERE id = ? AND user_id = ?",
                rusqlite::params![id_clone, user_id],
            )?;
            Ok(image_path)
        })
        .await;

    match result {
        Ok(image_path) => {
            // A missing file is tolerated; the record is gone regardless
            if let Err(e) = state.media.delete(&image_path).await {
                tracing::warn!("Failed to remove image for deleted memory: {}", e);
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(crate::error::CoreError::Database(rusqlite::Error::QueryReturnedNoRows)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Memory not found" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn memory_count(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> impl IntoResponse {
    let user_id = user.id.clone();
    let result = state
        .db
        .with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE user_id = ?",
                [&user_id],
                |row| row.get::<_, i64>(0),
            )
        })
        .await;

    match result {
        Ok(count) => Json(serde_json::json!({
            "count": count,
            "user": user.username,
            "status": "success"
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Serve the stored image bytes for one of the caller's memories
pub async fn get_memory_image(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user_id = user.id.clone();
    let result = state
        .db
        .with_conn(move |conn| {
            conn.query_row(
                "SELECT image_path FROM memories WHERE id = ? AND user_id = ?",
                rusqlite::params![id, user_id],
                |row| row.get::<_, String>(0),
            )
        })
        .await;

    let image_path = match result {
        Ok(path) => path,
        Err(crate::error::CoreError::Database(rusqlite::Error::QueryReturnedNoRows)) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Memory not found" })),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    match state.media.read(&image_path).await {
        Ok(bytes) => {
            let content_type = content_type_for(&image_path);
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(crate::error::CoreError::NotFound(..)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Image file missing" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

fn content_type_for(path: &str) -> &'static str {
    match image::file_extension(path).as_deref() {
        Some(".jpg") | Some(".jpeg") => "image/jpeg",
        Some(".png") => "image/png",
        Some(".gif") => "image/gif",
        Some(".webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
