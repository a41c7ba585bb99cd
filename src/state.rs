use std::sync::Arc;

use crate::config::AppConfig;
use crate::features::transform::{
    BufferedPipeline, MemoryProbe, PipelineContext, ResizeLimits, SourceResolver,
    StreamingPipeline,
    codec::EncodeOptions, memory::probe_from_config,
};

/// 聚合的应用共享状态（只读；每个请求的缓冲区/流均为请求独占）
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<SourceResolver>,
    pub buffered: BufferedPipeline,
    pub streaming: StreamingPipeline,
    pub memory_probe: Arc<dyn MemoryProbe>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_probe(config, probe_from_config(config.memory.probe))
    }

    /// 注入自定义内存探针（测试用固定值探针）
    pub fn with_probe(config: &AppConfig, memory_probe: Arc<dyn MemoryProbe>) -> Self {
        let img = &config.image;
        // 两种策略共享同一个并发许可池。
        let ctx = PipelineContext::new(img.effective_parallelism(), EncodeOptions::from(img))
            .with_limits(ResizeLimits::from(img));
        Self {
            resolver: Arc::new(SourceResolver::new(config.resources_root())),
            buffered: BufferedPipeline::new(ctx.clone()),
            streaming: StreamingPipeline::new(
                ctx,
                img.stream_chunk_bytes,
                img.stream_channel_capacity,
            ),
            memory_probe,
        }
    }
}
