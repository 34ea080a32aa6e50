//! Route handlers.
//!
//! Anything that touches the device, sleeps or encodes a full frame runs on
//! the blocking pool so the executor stays free for the MJPEG streams.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task;
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::capture::DeviceKind;
use crate::context::StatusReport;
use crate::pipeline::encode::encode_jpeg;
use crate::pipeline::{mjpeg, CaptureResult, Mode, ModeSettings};
use crate::CameraContext;

/// MJPEG parts buffered per client before the feed thread blocks
const STREAM_BUFFER: usize = 2;

#[derive(Debug, Default, Deserialize)]
pub struct ModeRequest {
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub success: bool,
    pub mode: Mode,
    pub settings: ModeSettings,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub success: bool,
    /// Base64 JPEG
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub mode: Mode,
    pub timestamp: String,
    pub camera_type: DeviceKind,
}

fn parse_mode(raw: Option<&str>) -> ApiResult<Option<Mode>> {
    Ok(raw.map(str::parse::<Mode>).transpose()?)
}

pub async fn status(State(ctx): State<Arc<CameraContext>>) -> Json<StatusReport> {
    Json(ctx.status())
}

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Unparseable or absent bodies fall through to `other`
pub async fn set_mode(
    State(ctx): State<Arc<CameraContext>>,
    body: Option<Json<ModeRequest>>,
) -> ApiResult<Json<ModeResponse>> {
    let raw = body
        .and_then(|Json(req)| req.mode)
        .unwrap_or_else(|| Mode::Other.as_str().to_string());

    let (mode, settings) = task::spawn_blocking(move || ctx.set_mode(&raw)).await??;
    Ok(Json(ModeResponse {
        success: true,
        mode,
        settings,
    }))
}

pub async fn stream(State(ctx): State<Arc<CameraContext>>) -> ApiResult<Response> {
    ctx.start_streaming()?;

    let (tx, rx) = flume::bounded(STREAM_BUFFER);
    ctx.spawn_mjpeg_feed(tx)?;
    info!("MJPEG client connected");

    let body = Body::from_stream(rx.into_stream().map(Ok::<_, Infallible>));
    Ok(([(header::CONTENT_TYPE, mjpeg::content_type())], body).into_response())
}

/// Exclusive capture plus full-quality encode, off the executor
async fn capture_encoded(
    ctx: Arc<CameraContext>,
    mode: Option<Mode>,
) -> ApiResult<(CaptureResult, Vec<u8>)> {
    let quality = ctx.config().jpeg.capture_quality;
    let captured = task::spawn_blocking(move || -> crate::Result<_> {
        let result = ctx.capture(mode)?;
        let jpeg = encode_jpeg(&result.frame, quality)?;
        Ok((result, jpeg))
    })
    .await??;
    Ok(captured)
}

#[derive(Debug, Default, Deserialize)]
pub struct CaptureQuery {
    pub mode: Option<String>,
}

pub async fn capture_jpeg(
    State(ctx): State<Arc<CameraContext>>,
    Query(query): Query<CaptureQuery>,
) -> ApiResult<Response> {
    let mode = parse_mode(query.mode.as_deref())?;
    let (result, jpeg) = capture_encoded(ctx, mode).await?;

    let headers = [
        ("content-type", "image/jpeg".to_string()),
        ("x-image-width", result.width().to_string()),
        ("x-image-height", result.height().to_string()),
        ("x-capture-timestamp", result.timestamp_label()),
        ("x-capture-mode", result.mode.to_string()),
        ("x-camera-type", result.kind.to_string()),
    ];
    Ok((headers, jpeg).into_response())
}

/// Base64-in-JSON form kept for older dashboard builds.
/// The mode may arrive in the body or the query string; the body wins.
pub async fn capture(
    State(ctx): State<Arc<CameraContext>>,
    Query(query): Query<CaptureQuery>,
    body: Option<Json<ModeRequest>>,
) -> ApiResult<Json<CaptureResponse>> {
    let raw = body.and_then(|Json(req)| req.mode).or(query.mode);
    let mode = parse_mode(raw.as_deref())?;
    let (result, jpeg) = capture_encoded(ctx, mode).await?;

    Ok(Json(CaptureResponse {
        success: true,
        image: base64::engine::general_purpose::STANDARD.encode(&jpeg),
        width: result.width(),
        height: result.height(),
        mode: result.mode,
        timestamp: result.timestamp_label(),
        camera_type: result.kind,
    }))
}

pub async fn preview(State(ctx): State<Arc<CameraContext>>) -> ApiResult<Response> {
    let quality = ctx.config().jpeg.preview_quality;
    let jpeg = task::spawn_blocking(move || -> ApiResult<Vec<u8>> {
        let frame = ctx.preview_frame().ok_or(ApiError::NoFrame)?;
        Ok(encode_jpeg(&frame, quality)?)
    })
    .await??;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}
