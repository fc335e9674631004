//! Registration endpoints used by the encoder.
//!
//! The encoder announces each job when it starts writing, reports when its
//! process exits on its own, and removes jobs it tore down itself. Jobs are
//! addressed by the name of their output file inside the output directory.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
    Json, Router,
};
use serde::Deserialize;

use super::AppContext;
use crate::error::{AppError, Error};
use crate::transcoding::paths::is_safe_component;
use crate::transcoding::{JobKind, TranscodeJob};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/Transcodes", post(register_transcode))
        .route("/Transcodes/:file_name", delete(remove_transcode))
        .route("/Transcodes/:file_name/Exited", post(mark_transcode_exited))
}

/// Request body for announcing a new job.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterTranscodeRequest {
    /// Playlist or progressive file name, relative to the output directory.
    pub file_name: String,
    #[serde(default)]
    pub kind: Option<JobKind>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub play_session_id: Option<String>,
    #[serde(default)]
    pub pid: Option<u32>,
}

fn output_path(ctx: &AppContext, file_name: &str) -> Result<std::path::PathBuf, Error> {
    if !is_safe_component(file_name) {
        return Err(Error::Validation(format!(
            "invalid output file name: {file_name:?}"
        )));
    }
    Ok(ctx.output_dir().join(file_name))
}

/// POST /Transcodes
pub async fn register_transcode(
    State(ctx): State<AppContext>,
    Json(payload): Json<RegisterTranscodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let path = output_path(&ctx, &payload.file_name)?;

    let mut job = TranscodeJob::new(&path, payload.kind.unwrap_or(JobKind::Hls));
    if let Some(device_id) = payload.device_id {
        job = job.with_device(device_id);
    }
    if let Some(play_session_id) = payload.play_session_id {
        job = job.with_play_session(play_session_id);
    }
    if let Some(pid) = payload.pid {
        job = job.with_pid(pid);
    }

    let id = ctx.registry.register(job)?;
    // A kill may land between registering and reading the entry back.
    let snapshot = ctx
        .registry
        .get(&path)
        .filter(|snapshot| snapshot.id == id)
        .ok_or_else(|| Error::not_found("transcode job", &payload.file_name))?;

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// POST /Transcodes/{fileName}/Exited
pub async fn mark_transcode_exited(
    State(ctx): State<AppContext>,
    Path(file_name): Path<String>,
) -> Result<StatusCode, AppError> {
    let path = output_path(&ctx, &file_name)?;
    if ctx.registry.mark_exited(&path) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("transcode job", &file_name).into())
    }
}

/// DELETE /Transcodes/{fileName}
pub async fn remove_transcode(
    State(ctx): State<AppContext>,
    Path(file_name): Path<String>,
) -> Result<StatusCode, AppError> {
    let path = output_path(&ctx, &file_name)?;
    match ctx.registry.remove(&path) {
        Some(job) => {
            tracing::info!(path = %job.output_path.display(), "Encoder removed transcode job");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(Error::not_found("transcode job", &file_name).into()),
    }
}
