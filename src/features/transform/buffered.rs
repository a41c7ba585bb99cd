use axum::body::Bytes;

use super::codec;
use super::pipeline::{PipelineContext, TransformBody, TransformPipeline, TransformResult};
use super::resolver::ResolvedSource;
use super::types::TransformRequest;
use crate::error::AppError;

/// 缓冲策略：整块读入源文件，整块生成结果后一次性输出。
///
/// 峰值内存约为源图 + 解码像素 + 输出图之和；编码一旦开始无法中途取消。
#[derive(Clone)]
pub struct BufferedPipeline {
    ctx: PipelineContext,
}

impl BufferedPipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }
}

impl TransformPipeline for BufferedPipeline {
    const NAME: &'static str = "buffered";

    type Source = Bytes;

    async fn open(&self, source: &ResolvedSource) -> Result<Bytes, AppError> {
        tokio::fs::read(&source.path)
            .await
            .map(Bytes::from)
            .map_err(|e| {
                tracing::debug!(src = %source.logical, "读取源文件失败: {e}");
                source.not_found()
            })
    }

    async fn run(&self, source: Bytes, request: &TransformRequest) -> Result<TransformResult, AppError> {
        if request.is_passthrough() {
            return Ok(TransformResult {
                body: TransformBody::Full(source),
                content_type: request.content_type(),
                passthrough: true,
            });
        }

        let resize_to = request.resize_target(self.ctx.limits)?;
        let format = request.format;
        let opts = self.ctx.encode;

        let permit = self.ctx.acquire().await?;
        // 解码/缩放/编码是 CPU 密集操作，必须移出 tokio worker。
        let out = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            codec::transform_bytes(&source, format, resize_to, opts)
        })
        .await??;

        Ok(TransformResult {
            body: TransformBody::Full(Bytes::from(out)),
            content_type: request.content_type(),
            passthrough: false,
        })
    }
}
