//! Jellyfin-compatible HLS segment and encoding routes.
//!
//! The audio and video segment routes are legacy endpoints that clients hit
//! without credentials. The playlist, active-encodings and ping routes are
//! protected.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::AppContext;
use crate::error::{AppError, Error};
use crate::transcoding::paths::{self, is_safe_component};
use crate::transcoding::{find_playlist_path, JobFilter, JobSnapshot};

/// Routes reachable without authentication.
pub fn legacy_segment_routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/Audio/:item_id/hls/:segment_id/:file_name",
            get(get_hls_audio_segment),
        )
        .route(
            "/Videos/:item_id/hls/:playlist_id/:segment_file",
            get(get_hls_video_segment),
        )
}

/// Routes that require authentication.
pub fn protected_routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/Videos/:item_id/hls/:playlist_id/stream.m3u8",
            get(get_hls_playlist),
        )
        .route(
            "/Videos/ActiveEncodings",
            get(list_active_encodings).delete(stop_encoding_process),
        )
        .route("/Sessions/Playing/Ping", post(ping_playback_session))
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ActiveEncodingsQuery {
    #[serde(alias = "deviceId", alias = "DeviceId")]
    pub device_id: Option<String>,
    #[serde(alias = "playSessionId", alias = "PlaySessionId")]
    pub play_session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PingQuery {
    #[serde(alias = "playSessionId", alias = "PlaySessionId")]
    pub play_session_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /Audio/{itemId}/hls/{segmentId}/stream.{mp3|aac}
pub async fn get_hls_audio_segment(
    State(ctx): State<AppContext>,
    Path((item_id, segment_id, file_name)): Path<(String, String, String)>,
) -> Result<Response, AppError> {
    if !matches!(file_name.as_str(), "stream.mp3" | "stream.aac") || !is_safe_component(&segment_id)
    {
        return Err(Error::not_found("audio segment", &segment_id).into());
    }

    let path = paths::audio_segment_path(
        ctx.output_dir(),
        &segment_id,
        paths::request_extension(&file_name),
    );
    tracing::debug!(%item_id, path = %path.display(), "HLS audio segment request");

    Ok(ctx.streamer.stream(&path, None).await?)
}

/// GET /Videos/{itemId}/hls/{playlistId}/stream.m3u8
pub async fn get_hls_playlist(
    State(ctx): State<AppContext>,
    Path((item_id, playlist_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    if !is_safe_component(&playlist_id) {
        return Err(Error::not_found("playlist", &playlist_id).into());
    }

    let path = paths::playlist_path(ctx.output_dir(), &playlist_id, ".m3u8");
    tracing::debug!(%item_id, path = %path.display(), "HLS playlist request");

    Ok(ctx.streamer.stream(&path, Some(&path)).await?)
}

/// GET /Videos/{itemId}/hls/{playlistId}/{segmentId}.{segmentContainer}
pub async fn get_hls_video_segment(
    State(ctx): State<AppContext>,
    Path((item_id, playlist_id, segment_file)): Path<(String, String, String)>,
) -> Result<Response, AppError> {
    let Some((segment_id, container)) = segment_file.rsplit_once('.') else {
        return Err(Error::not_found("video segment", &segment_file).into());
    };
    if !is_safe_component(&segment_file) || segment_id.is_empty() || container.is_empty() {
        return Err(Error::not_found("video segment", &segment_file).into());
    }

    let playlist = find_playlist_path(ctx.output_dir(), &playlist_id)
        .await
        .ok_or_else(|| Error::not_found("playlist", &playlist_id))?;

    let path = paths::video_segment_path(ctx.output_dir(), segment_id, container);
    tracing::debug!(
        %item_id,
        playlist = %playlist.display(),
        path = %path.display(),
        "HLS video segment request"
    );

    Ok(ctx.streamer.stream(&path, Some(&playlist)).await?)
}

/// DELETE /Videos/ActiveEncodings?deviceId=..&playSessionId=..
pub async fn stop_encoding_process(
    State(ctx): State<AppContext>,
    Query(query): Query<ActiveEncodingsQuery>,
) -> Result<StatusCode, AppError> {
    let (Some(device_id), Some(play_session_id)) = (query.device_id, query.play_session_id) else {
        return Err(Error::Validation("deviceId and playSessionId are required".into()).into());
    };

    let killed = ctx
        .termination
        .kill(&JobFilter::session(&device_id, &play_session_id))
        .await;
    tracing::info!(%device_id, %play_session_id, killed, "Stopped active encodings");

    Ok(StatusCode::NO_CONTENT)
}

/// GET /Videos/ActiveEncodings
pub async fn list_active_encodings(State(ctx): State<AppContext>) -> Json<Vec<JobSnapshot>> {
    Json(ctx.registry.snapshot())
}

/// POST /Sessions/Playing/Ping?playSessionId=..
pub async fn ping_playback_session(
    State(ctx): State<AppContext>,
    Query(query): Query<PingQuery>,
) -> impl IntoResponse {
    if let Some(play_session_id) = query.play_session_id {
        let touched = ctx
            .registry
            .ping(&JobFilter::PlaySession(play_session_id.clone()));
        tracing::debug!(%play_session_id, touched, "Playback session ping");
    }
    StatusCode::NO_CONTENT
}
