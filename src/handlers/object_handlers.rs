//! HTTP handlers for the mounted image store.
//! Multipart uploads are spooled to disk before validation and object bodies
//! are streamed chunk by chunk, so neither direction buffers a whole file.

use crate::{
    errors::AppError,
    handlers::auth_handlers::AdminSession,
    models::upload::UploadedFile,
    state::AppState,
    validation::{FileValidator, ValidationError},
};
use axum::{
    Form, Json,
    body::Body,
    extract::{FromRequest, Multipart, Path, Request, State, multipart::MultipartError},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::json;
use std::io;
use uuid::Uuid;

/// `POST {prefix}` with multipart `file` and optional `label`.
pub async fn upload_object(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_upload_form(&state, multipart).await?;
    let origin = request_origin(&state, &headers);

    let object = state
        .objects
        .upload(form.file, form.label.as_deref().unwrap_or(""), &origin)
        .await?;

    Ok(Json(json!({
        "message": "File uploaded successfully",
        "filePath": object.filename,
    })))
}

/// `GET {prefix}/{filename}` streams the stored bytes.
pub async fn get_object(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let (object, chunks) = state.objects.fetch(&filename).await?;

    let file_id = object.id;
    let body = Body::from_stream(chunks.inspect_err(move |err| {
        tracing::error!(%file_id, error = %err, "object stream aborted");
    }));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&object.metadata.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.length.max(0)));
    Ok(response)
}

/// `GET {prefix}` lists stored objects, newest upload first.
pub async fn list_objects(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let files = state.objects.list().await?;
    Ok(Json(json!({ "files": files })))
}

/// `POST {prefix}/update/{id}` swaps the payload and keeps the current label.
pub async fn update_object(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let form = read_upload_form(&state, multipart).await?;
    let origin = request_origin(&state, &headers);

    let object = state
        .objects
        .replace(id, form.file, form.label.as_deref().unwrap_or(""), &origin)
        .await?;

    Ok(Json(json!({
        "message": "File updated successfully",
        "filePath": object.filename,
    })))
}

/// `POST {prefix}/update-label/{id}`
pub async fn update_label(
    State(state): State<AppState>,
    Path(id): Path<String>,
    LabelInput(label): LabelInput,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    state.objects.relabel(id, label.as_deref()).await?;
    Ok(Json(json!({ "message": "Label updated successfully" })))
}

/// `POST {prefix}/del/{id}`
pub async fn delete_object(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let file = state.objects.delete(id).await?;
    Ok(Json(json!({
        "message": "File and metadata deleted successfully",
        "file": file,
    })))
}

/// `GET {prefix}_api/metadata`
pub async fn list_metadata(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let metadata = state.objects.ledger_records().await?;
    Ok(Json(json!({ "metadata": metadata })))
}

/// `GET {prefix}_api/orphans`
pub async fn orphans(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.objects.find_orphans().await?))
}

/// `POST {prefix}_api/reconcile` removes aged orphans. Admin only.
pub async fn reconcile(
    State(state): State<AppState>,
    admin: AdminSession,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(admin_id = %admin.session.admin_id, "reconciliation requested");
    Ok(Json(state.objects.reconcile().await?))
}

struct UploadForm {
    file: UploadedFile,
    label: Option<String>,
}

/// Pull the `file` and `label` parts out of a multipart body.
///
/// The file part is rejected by name before any of its bytes are spooled and
/// at most `max_file_size` bytes are kept on disk.
async fn read_upload_form(state: &AppState, mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let validator = state.objects.validator();
    let mut file = None;
    let mut label = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| upload_multipart_error(err, validator))?
    {
        let part = field.name().unwrap_or_default().to_string();
        match part.as_str() {
            "file" => {
                if file.is_some() {
                    return Err(ValidationError::Malformed("more than one file part".into()).into());
                }
                let name = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .ok_or(ValidationError::MissingField("file"))?;
                validator.validate_name(&name)?;

                let mime_type = field.content_type().map(str::to_string);
                let stream = field.map(|chunk| chunk.map_err(io::Error::other));
                let spooled = UploadedFile::spool(
                    &state.upload_dir,
                    name,
                    mime_type,
                    stream,
                    validator.max_size_bytes(),
                )
                .await
                .map_err(|err| spool_failure(err, validator))?;
                file = Some(spooled);
            }
            "label" => {
                label = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| upload_multipart_error(err, validator))?,
                );
            }
            _ => {}
        }
    }

    let file = file.ok_or(ValidationError::MissingField("file"))?;
    Ok(UploadForm { file, label })
}

/// The `label` of a relabel request, sent as multipart, urlencoded or JSON.
pub struct LabelInput(pub Option<String>);

#[derive(Deserialize)]
struct LabelBody {
    label: Option<String>,
}

impl<S> FromRequest<S> for LabelInput
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|err| AppError::bad_request(err.body_text()))?;
            while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
                if field.name() == Some("label") {
                    return Ok(Self(Some(field.text().await.map_err(bad_multipart)?)));
                }
            }
            Ok(Self(None))
        } else if content_type.starts_with("application/json") {
            let Json(body) = Json::<LabelBody>::from_request(req, state)
                .await
                .map_err(|err| AppError::bad_request(err.body_text()))?;
            Ok(Self(body.label))
        } else {
            let Form(body) = Form::<LabelBody>::from_request(req, state)
                .await
                .map_err(|err| AppError::bad_request(err.body_text()))?;
            Ok(Self(body.label))
        }
    }
}

/// Unparseable ids cannot name a stored object.
fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found("File not found"))
}

/// Scheme + authority used to build object URLs.
fn request_origin(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = state.public_base_url.as_deref() {
        return base.to_string();
    }
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|host| !host.is_empty())
        .map(|host| format!("http://{}", host))
        .unwrap_or_else(|| "http://localhost".to_string())
}

fn bad_multipart(err: MultipartError) -> AppError {
    AppError::new(
        StatusCode::BAD_REQUEST,
        ValidationError::Malformed(err.body_text()).to_string(),
    )
}

/// A body cut off by the router's length limit is reported like any other
/// oversize upload.
fn upload_multipart_error(err: MultipartError, validator: &FileValidator) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return validator.too_large(None).into();
    }
    bad_multipart(err)
}

/// A broken multipart body is the client's fault, a failing spool disk is ours.
fn spool_failure(err: io::Error, validator: &FileValidator) -> AppError {
    let client_side = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<MultipartError>());
    match client_side {
        Some(multipart) if multipart.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            validator.too_large(None).into()
        }
        Some(multipart) => ValidationError::Malformed(multipart.body_text()).into(),
        None => {
            tracing::error!(error = %err, "failed to spool upload");
            AppError::internal("failed to store upload")
        }
    }
}
