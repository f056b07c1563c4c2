use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::atomic::Ordering;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use super::m3u8_router::OriginState;
use crate::utils::content_type::content_type_for;

fn playlist_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/vnd.apple.mpegurl"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers
}

/// Plain file names with the segment extension only; nothing that can
/// climb out of the segment directory.
fn is_servable(filename: &str, extension: &str) -> bool {
    !filename.starts_with('.')
        && !filename.contains(['/', '\\'])
        && !filename.contains("..")
        && filename
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext == extension)
}

pub async fn get_live_playlist(State(state): State<OriginState>) -> impl IntoResponse {
    let playlist = state.manifest.read().await.render();
    (playlist_headers(), playlist)
}

pub async fn get_chunk_file(
    Path(filename): Path<String>,
    State(state): State<OriginState>,
) -> Result<Response, StatusCode> {
    if !is_servable(&filename, &state.segment_extension) {
        return Err(StatusCode::NOT_FOUND);
    }

    let file_path = state.segment_dir.join(&filename);
    let file = File::open(&file_path).await.map_err(|_| StatusCode::NOT_FOUND)?;
    let length = file.metadata().await.map(|m| m.len()).ok();
    let body = Body::from_stream(ReaderStream::new(file));

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type_for(&file_path)));
    // Filenames repeat across sessions.
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok((headers, body).into_response())
}

pub async fn get_health(State(state): State<OriginState>) -> impl IntoResponse {
    let metrics = state.metrics.get_metrics().await;
    Json(json!({
        "status": "ok",
        "seeding": state.distributor.active_seedings().await,
        "chunks": metrics.total_segments,
        "manifestSize": state.manifest.read().await.len(),
        "sessionId": state.distributor.current_session_id().await,
        "sessionEnded": state.distributor.session_ended().await,
        "sessionRestarts": state.distributor.session_transitions().await,
        "signalingConnected": state.signaling_connected.load(Ordering::Relaxed),
        "uptime": metrics.uptime_seconds,
    }))
}

pub async fn get_metrics(State(state): State<OriginState>) -> impl IntoResponse {
    let mut body = state.metrics.export_metrics_json().await;
    body["manifest"] = json!(state.manifest.read().await.stats());
    Json(body)
}
