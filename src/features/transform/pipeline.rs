use std::future::Future;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::codec::EncodeOptions;
use super::resolver::ResolvedSource;
use super::types::{ResizeLimits, TransformRequest};
use crate::error::AppError;

/// 管道输出的响应体
pub enum TransformBody {
    /// 完整物化在内存中的结果
    Full(Bytes),
    /// 边处理边输出的字节流
    Stream(Body),
}

impl std::fmt::Debug for TransformBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformBody::Full(b) => f.debug_tuple("Full").field(&b.len()).finish(),
            TransformBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<TransformBody> for Body {
    fn from(body: TransformBody) -> Self {
        match body {
            TransformBody::Full(bytes) => Body::from(bytes),
            TransformBody::Stream(body) => body,
        }
    }
}

/// 管道结果：响应体 + 声明的 Content-Type
#[derive(Debug)]
pub struct TransformResult {
    pub body: TransformBody,
    pub content_type: &'static str,
    /// 是否走了透传分支（仅用于日志）
    pub passthrough: bool,
}

/// 两种策略共享的运行时资源
#[derive(Clone)]
pub struct PipelineContext {
    /// 控制并发 CPU 密集型转换的信号量（等待而不是拒绝）
    pub permits: Arc<Semaphore>,
    pub encode: EncodeOptions,
    pub limits: ResizeLimits,
}

impl PipelineContext {
    pub fn new(max_parallel: usize, encode: EncodeOptions) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
            encode,
            limits: ResizeLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ResizeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AppError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::TransformFailure(format!("获取转换信号量失败: {e}")))
    }
}

/// 同一契约的两种 I/O 策略。
///
/// `open` 把已解析的源变成本策略持有的句柄（整块字节或打开的文件），
/// `run` 执行透传或解码/缩放/编码。路由在装配时绑定具体实现。
pub trait TransformPipeline: Send + Sync + 'static {
    /// 策略名（日志用）
    const NAME: &'static str;

    type Source: Send + 'static;

    fn open(
        &self,
        source: &ResolvedSource,
    ) -> impl Future<Output = Result<Self::Source, AppError>> + Send;

    fn run(
        &self,
        source: Self::Source,
        request: &TransformRequest,
    ) -> impl Future<Output = Result<TransformResult, AppError>> + Send;
}
