use std::fs::File;
use std::io::{self, BufReader, Write};

use axum::body::{Body, Bytes};
use tokio::sync::{mpsc, oneshot};

use super::codec::{self, OutputEncoding};
use super::pipeline::{PipelineContext, TransformBody, TransformPipeline, TransformResult};
use super::resolver::ResolvedSource;
use super::types::TransformRequest;
use crate::error::AppError;

/// 流式策略：源文件 → 解码/缩放 → 编码 → 有界通道 → 响应体。
///
/// - 编码器写满一个分块就推入通道；通道满时编码线程阻塞，响应端的背压由此传回上游。
/// - 解码在响应头提交之前完成，解码失败仍然返回 500；编码阶段的错误只能中断响应体。
/// - 客户端断开会丢弃接收端，编码器下一次写入即失败并停止工作。
#[derive(Clone)]
pub struct StreamingPipeline {
    ctx: PipelineContext,
    chunk_bytes: usize,
    channel_capacity: usize,
}

impl StreamingPipeline {
    pub fn new(ctx: PipelineContext, chunk_bytes: usize, channel_capacity: usize) -> Self {
        Self {
            ctx,
            chunk_bytes: chunk_bytes.max(1),
            channel_capacity: channel_capacity.max(1),
        }
    }
}

type Chunk = io::Result<Bytes>;

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped")
}

/// 把 `Write` 调用切成固定大小的分块送入通道（只能在阻塞线程中使用）
pub(crate) struct ChunkWriter {
    tx: mpsc::Sender<Chunk>,
    buf: Vec<u8>,
    chunk_bytes: usize,
}

impl ChunkWriter {
    pub(crate) fn new(tx: mpsc::Sender<Chunk>, chunk_bytes: usize) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(chunk_bytes),
            chunk_bytes,
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(self.chunk_bytes));
        self.tx
            .blocking_send(Ok(Bytes::from(chunk)))
            .map_err(|_| disconnected())
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        self.tx.is_closed()
    }

    /// 响应头已提交后出错：把错误推给响应体，让连接以失败结束
    fn abort(self, err: impl std::fmt::Display) {
        let _ = self
            .tx
            .blocking_send(Err(io::Error::other(format!("Error processing image: {err}"))));
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.is_disconnected() {
            return Err(disconnected());
        }
        let n = (self.chunk_bytes - self.buf.len()).min(data.len());
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() >= self.chunk_bytes {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

fn body_from_channel(rx: mpsc::Receiver<Chunk>) -> Body {
    Body::from_stream(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    }))
}

/// 结束一次写出：区分客户端断开（正常取消）与真正的失败
fn finish(writer: ChunkWriter, result: io::Result<()>, src: &str) {
    match result {
        Ok(()) => {}
        Err(_) if writer.is_disconnected() => {
            tracing::debug!(src, "客户端已断开，停止流式输出");
        }
        Err(e) => {
            tracing::error!(src, "流式输出中途失败: {e}");
            writer.abort(e);
        }
    }
}

impl TransformPipeline for StreamingPipeline {
    const NAME: &'static str = "streaming";

    type Source = File;

    async fn open(&self, source: &ResolvedSource) -> Result<File, AppError> {
        let file = tokio::fs::File::open(&source.path).await.map_err(|e| {
            tracing::debug!(src = %source.logical, "打开源文件失败: {e}");
            source.not_found()
        })?;
        Ok(file.into_std().await)
    }

    async fn run(&self, file: File, request: &TransformRequest) -> Result<TransformResult, AppError> {
        let (tx, rx) = mpsc::channel::<Chunk>(self.channel_capacity);
        let chunk_bytes = self.chunk_bytes;
        let src = request.source.clone();

        if request.is_passthrough() {
            tokio::task::spawn_blocking(move || {
                let mut file = file;
                let mut writer = ChunkWriter::new(tx, chunk_bytes);
                let result = io::copy(&mut file, &mut writer).and_then(|_| writer.flush());
                finish(writer, result, &src);
            });
            return Ok(TransformResult {
                body: TransformBody::Stream(body_from_channel(rx)),
                content_type: request.content_type(),
                passthrough: true,
            });
        }

        let resize_to = request.resize_target(self.ctx.limits)?;
        let requested = request.format;
        let opts = self.ctx.encode;
        let permit = self.ctx.acquire().await?;
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), AppError>>();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let (img, source_format) = match codec::decode(BufReader::new(file)) {
                Ok(v) => v,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
            };
            let img = codec::resize(img, resize_to);
            if ready_tx.send(Ok(())).is_err() {
                // 处理函数已经放弃（请求被取消）
                return;
            }

            let mut writer = ChunkWriter::new(tx, chunk_bytes);
            let encoding = OutputEncoding::choose(requested, source_format);
            let result = codec::encode(&img, encoding, opts, &mut writer)
                .map_err(io::Error::other)
                .and_then(|_| writer.flush());
            finish(writer, result, &src);
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(TransformResult {
                body: TransformBody::Stream(body_from_channel(rx)),
                content_type: request.content_type(),
                passthrough: false,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::TransformFailure("解码任务异常退出".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::transform::codec::EncodeOptions;
    use crate::features::transform::types::TargetFormat;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    fn pipeline(chunk: usize) -> StreamingPipeline {
        StreamingPipeline::new(PipelineContext::new(2, EncodeOptions::default()), chunk, 2)
    }

    fn write_png(dir: &std::path::Path, w: u32, h: u32) -> std::path::PathBuf {
        let path = dir.join("src.png");
        let img = RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 3) as u8, (y * 5) as u8, 7, 255]));
        DynamicImage::ImageRgba8(img)
            .save_with_format(&path, ImageFormat::Png)
            .expect("write fixture");
        path
    }

    fn req(w: Option<i64>, h: Option<i64>, format: Option<TargetFormat>) -> TransformRequest {
        TransformRequest {
            source: "/src.png".into(),
            width: w,
            height: h,
            format,
        }
    }

    async fn collect(result: TransformResult) -> Bytes {
        let body: Body = result.body.into();
        axum::body::to_bytes(body, usize::MAX).await.expect("read stream")
    }

    #[tokio::test]
    async fn passthrough_streams_file_verbatim_in_small_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_png(tmp.path(), 40, 30);
        let expected = std::fs::read(&path).unwrap();

        let result = pipeline(64)
            .run(File::open(&path).unwrap(), &req(None, None, None))
            .await
            .unwrap();
        assert!(result.passthrough);
        assert_eq!(result.content_type, "image/png");
        assert_eq!(collect(result).await.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn streamed_transform_resizes_and_reencodes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_png(tmp.path(), 40, 30);

        let result = pipeline(128)
            .run(
                File::open(&path).unwrap(),
                &req(Some(10), Some(20), Some(TargetFormat::Webp)),
            )
            .await
            .unwrap();
        assert_eq!(result.content_type, "image/webp");
        let bytes = collect(result).await;
        let img = image::load_from_memory_with_format(&bytes, ImageFormat::WebP).unwrap();
        assert_eq!((img.width(), img.height()), (10, 20));
    }

    #[tokio::test]
    async fn decode_failure_is_reported_before_streaming() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\ntruncated").unwrap();

        let result = pipeline(64)
            .run(File::open(&path).unwrap(), &req(Some(1), Some(1), None))
            .await;
        assert!(matches!(result, Err(AppError::TransformFailure(_))));
    }

    #[tokio::test]
    async fn dropped_body_stops_encoder_and_releases_permit() {
        use futures_util::StreamExt;
        use std::time::Duration;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("noise.png");
        // 近似随机的像素，保证编码输出远大于通道能积压的量
        let img = RgbaImage::from_fn(128, 128, |x, y| {
            let v = x
                .wrapping_mul(2_654_435_761)
                .wrapping_add(y.wrapping_mul(40_503))
                .rotate_left(x % 17);
            Rgba(v.to_le_bytes())
        });
        DynamicImage::ImageRgba8(img)
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let ctx = PipelineContext::new(1, EncodeOptions::default());
        let pipeline = StreamingPipeline::new(ctx.clone(), 64, 1);
        let result = pipeline
            .run(File::open(&path).unwrap(), &req(Some(128), Some(128), None))
            .await
            .unwrap();
        assert_eq!(ctx.permits.available_permits(), 0, "encoder still running");

        let body: Body = result.body.into();
        let mut stream = body.into_data_stream();
        let first = stream.next().await.expect("first chunk").expect("chunk ok");
        assert!(!first.is_empty());
        drop(stream);

        let permit = tokio::time::timeout(Duration::from_secs(10), ctx.acquire())
            .await
            .expect("permit released after client disconnect")
            .unwrap();
        drop(permit);
    }

    #[test]
    fn writer_fails_once_receiver_is_dropped() {
        let (tx, rx) = mpsc::channel::<Chunk>(1);
        let mut writer = ChunkWriter::new(tx, 4);
        drop(rx);
        let err = writer.write_all(b"abcdefgh").expect_err("receiver gone");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(writer.is_disconnected());
    }

    #[test]
    fn writer_emits_fixed_size_chunks() {
        let (tx, mut rx) = mpsc::channel::<Chunk>(8);
        let mut writer = ChunkWriter::new(tx, 4);
        writer.write_all(b"abcdefghij").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.blocking_recv() {
            chunks.push(chunk.unwrap());
        }
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"abcd"),
                Bytes::from_static(b"efgh"),
                Bytes::from_static(b"ij")
            ]
        );
    }
}
