use std::time::Instant;

use axum::{
    Router,
    body::Body,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};

use super::MEMORY_USAGE_HEADER;
use super::memory::{MemoryWindow, format_memory_delta};
use super::pipeline::{TransformPipeline, TransformResult};
use super::types::TransformQuery;
use crate::{error::AppError, state::AppState};

/// 组装成功响应：200 + Content-Type + X-Memory-Usage
pub fn build_response(result: TransformResult, memory_delta: i64) -> Result<Response, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(result.content_type),
    );
    let usage = HeaderValue::from_str(&format_memory_delta(memory_delta))
        .map_err(|e| AppError::TransformFailure(format!("invalid memory header: {e}")))?;
    headers.insert(MEMORY_USAGE_HEADER, usage);

    Ok((StatusCode::OK, headers, Body::from(result.body)).into_response())
}

/// 校验 → 解析 → （开始采样）→ 管道 → （结束采样）→ 响应
async fn serve<P: TransformPipeline>(
    state: &AppState,
    pipeline: &P,
    query: Result<Query<TransformQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let t_total = Instant::now();
    let Query(raw) = query.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let request = raw.validate()?;

    let resolved = state.resolver.resolve(&request.source).await?;

    let window = MemoryWindow::open(state.memory_probe.as_ref());
    let source = pipeline.open(&resolved).await?;
    let result = pipeline.run(source, &request).await?;
    let memory_delta = window.close();

    tracing::info!(
        strategy = P::NAME,
        src = %request.source,
        passthrough = result.passthrough,
        content_type = result.content_type,
        memory_delta,
        elapsed_ms = t_total.elapsed().as_millis() as u64,
        "图片转换完成"
    );

    build_response(result, memory_delta)
}

#[utoipa::path(
    get,
    path = "/image",
    summary = "图片转换（缓冲）",
    description = "整块读入源图，按需缩放（需同时给出 w 与 h）与转码（webp/avif），结果整块返回。未给出任何转换参数时原样返回源字节，Content-Type 固定为 image/png。",
    params(TransformQuery),
    responses(
        (status = 200, description = "图片字节；X-Memory-Usage 头为处理前后进程内存差值"),
        (status = 400, description = "参数校验失败（纯文本）", body = String),
        (status = 404, description = "源图片不存在（纯文本）", body = String),
        (status = 500, description = "图片处理失败（纯文本）", body = String)
    ),
    tag = "Image"
)]
pub async fn transform_buffered(
    State(state): State<AppState>,
    query: Result<Query<TransformQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    serve(&state, &state.buffered, query).await
}

#[utoipa::path(
    get,
    path = "/image/stream",
    summary = "图片转换（流式）",
    description = "与 /image 契约一致，但源文件、编解码与响应体之间以分块管道连接；客户端断开时停止编码。",
    params(TransformQuery),
    responses(
        (status = 200, description = "图片字节流；X-Memory-Usage 头为产生流对象时的进程内存差值"),
        (status = 400, description = "参数校验失败（纯文本）", body = String),
        (status = 404, description = "源图片不存在（纯文本）", body = String),
        (status = 500, description = "图片处理失败（纯文本）", body = String)
    ),
    tag = "Image"
)]
pub async fn transform_streaming(
    State(state): State<AppState>,
    query: Result<Query<TransformQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    serve(&state, &state.streaming, query).await
}

pub fn create_transform_router() -> Router<AppState> {
    Router::new()
        .route("/image", get(transform_buffered))
        .route("/image/stream", get(transform_streaming))
}
