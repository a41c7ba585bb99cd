use serde::Deserialize;

use crate::config::ImageConfig;
use crate::error::AppError;

/// 原始查询参数：全部按字符串接收，校验在 [`TransformQuery::validate`] 中完成，
/// 以便非数字的 `w`/`h` 也能得到统一的 400 纯文本响应。
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransformQuery {
    /// 源图片路径（相对资源根目录），必填
    #[param(example = "/sample.png")]
    pub src: Option<String>,
    /// 目标宽度（整数）；仅在同时提供 `h` 时触发缩放
    #[param(value_type = Option<i64>, example = 320)]
    pub w: Option<String>,
    /// 目标高度（整数）；仅在同时提供 `w` 时触发缩放
    #[param(value_type = Option<i64>, example = 240)]
    pub h: Option<String>,
    /// 目标编码：webp | avif；缺省保留源编码
    #[param(example = "webp")]
    pub format: Option<String>,
}

/// 目标编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Webp,
    Avif,
}

impl TargetFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "webp" => Some(TargetFormat::Webp),
            "avif" => Some(TargetFormat::Avif),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TargetFormat::Webp => "webp",
            TargetFormat::Avif => "avif",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            TargetFormat::Webp => "image/webp",
            TargetFormat::Avif => "image/avif",
        }
    }
}

/// 未请求格式转换时声明的 Content-Type（与实际字节无关）
pub const DEFAULT_CONTENT_TYPE: &str = "image/png";

/// 缩放目标尺寸上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeLimits {
    /// 单边最大像素数
    pub max_dimension: u32,
    /// `w * h` 的最大像素数
    pub max_pixels: u64,
}

impl ResizeLimits {
    fn check(self, w: u32, h: u32) -> Result<(), AppError> {
        let pixels = u64::from(w) * u64::from(h);
        if w > self.max_dimension || h > self.max_dimension || pixels > self.max_pixels {
            return Err(AppError::TransformFailure(format!(
                "resize target {w}x{h} exceeds limit (max side {}, max pixels {})",
                self.max_dimension, self.max_pixels
            )));
        }
        Ok(())
    }
}

impl From<&ImageConfig> for ResizeLimits {
    fn from(cfg: &ImageConfig) -> Self {
        Self {
            max_dimension: cfg.max_dimension.max(1),
            max_pixels: cfg.max_pixels.max(1),
        }
    }
}

impl Default for ResizeLimits {
    fn default() -> Self {
        Self::from(&ImageConfig::default())
    }
}

/// 校验后的转换请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub source: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub format: Option<TargetFormat>,
}

impl TransformRequest {
    /// 三个转换参数都缺省时直接透传源字节
    pub fn is_passthrough(&self) -> bool {
        self.format.is_none() && self.width.is_none() && self.height.is_none()
    }

    /// 缩放闸门：只有宽高同时给出（且都非 0）才缩放。
    ///
    /// 负数、超出 `u32` 或超出 `limits` 的尺寸在闸门打开时视为处理失败；
    /// 目标缓冲区在缩放前就要整块分配，过大的尺寸会直接让进程因分配失败而中止。
    pub fn resize_target(&self, limits: ResizeLimits) -> Result<Option<(u32, u32)>, AppError> {
        let (Some(w), Some(h)) = (self.width, self.height) else {
            return Ok(None);
        };
        if w == 0 || h == 0 {
            return Ok(None);
        }
        let (Ok(w), Ok(h)) = (u32::try_from(w), u32::try_from(h)) else {
            return Err(AppError::TransformFailure(format!(
                "invalid resize dimensions {w}x{h}"
            )));
        };
        limits.check(w, h)?;
        Ok(Some((w, h)))
    }

    /// 响应声明的 Content-Type：由请求的格式决定，而不是由输出字节决定
    pub fn content_type(&self) -> &'static str {
        self.format
            .map(TargetFormat::content_type)
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// 空字符串与缺省等价
fn non_empty(v: Option<&str>) -> Option<&str> {
    v.filter(|s| !s.is_empty())
}

fn parse_dimension(name: &str, raw: Option<&str>) -> Result<Option<i64>, AppError> {
    match non_empty(raw) {
        None => Ok(None),
        Some(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AppError::InvalidRequest(format!("{name} must be an integer, got {s:?}"))),
    }
}

impl TransformQuery {
    /// 纯函数：把原始参数转换为 [`TransformRequest`]，不做任何 I/O
    pub fn validate(&self) -> Result<TransformRequest, AppError> {
        let source = non_empty(self.src.as_deref())
            .ok_or_else(|| AppError::InvalidRequest("source required".to_string()))?
            .to_string();

        let width = parse_dimension("w", self.w.as_deref())?;
        let height = parse_dimension("h", self.h.as_deref())?;

        let format = match non_empty(self.format.as_deref()) {
            None => None,
            Some(raw) => Some(TargetFormat::parse(raw).ok_or_else(|| {
                AppError::InvalidRequest(format!(
                    "unsupported format {raw:?}, expected \"webp\" or \"avif\""
                ))
            })?),
        };

        Ok(TransformRequest {
            source,
            width,
            height,
            format,
        })
    }
}
