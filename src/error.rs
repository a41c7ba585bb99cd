use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// 应用统一错误类型
///
/// 三类错误均为终态：不重试、不降级，同一个请求/响应周期内直接返回给调用方。
#[derive(Error, Debug)]
pub enum AppError {
    /// 请求参数不合法（调用方错误）
    #[error("{0}")]
    InvalidRequest(String),

    /// 源图片不存在或无法打开；携带调用方传入的原始 `src`
    #[error("Image file not found: {0}")]
    SourceNotFound(String),

    /// 解码/缩放/编码失败，以及其他未分类的内部错误
    #[error("Error processing image: {0}")]
    TransformFailure(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::TransformFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // 演示级服务：错误详情直接回显到响应体（纯文本，无 JSON 包装）。
        match &self {
            AppError::TransformFailure(_) => tracing::error!(status = status.as_u16(), "{self}"),
            _ => tracing::info!(status = status.as_u16(), "{self}"),
        }

        let mut res = (status, self.to_string()).into_response();
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        res
    }
}

// =============== Error conversions for common external errors ===============

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::TransformFailure(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::TransformFailure(format!("阻塞任务执行失败: {err}"))
    }
}
