pub mod buffered;
pub mod codec;
pub mod handler;
pub mod memory;
pub mod pipeline;
pub mod resolver;
pub mod streaming;
pub mod types;

/// 处理前后进程内存差值的响应头
pub const MEMORY_USAGE_HEADER: &str = "x-memory-usage";

pub use buffered::BufferedPipeline;
pub use handler::create_transform_router;
pub use memory::{MemoryProbe, NoopMemoryProbe, ProcessMemoryProbe};
pub use pipeline::{PipelineContext, TransformBody, TransformPipeline, TransformResult};
pub use resolver::{ResolvedSource, SourceResolver};
pub use streaming::StreamingPipeline;
pub use types::{ResizeLimits, TargetFormat, TransformQuery, TransformRequest};
