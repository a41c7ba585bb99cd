//! 对 `image` crate 的薄封装：解码、缩放、编码。
//!
//! 编码统一写入任意 `Write`，缓冲策略与流式策略共用同一套实现：
//! 前者写入 `Vec<u8>`，后者写入通道写端。

use std::io::{BufRead, Cursor, Seek, Write};

use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::error::ImageFormatHint;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, ImageResult};

use super::types::TargetFormat;
use crate::config::ImageConfig;

/// 编码参数（来自配置）
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    pub avif_speed: u8,
    pub avif_quality: u8,
    pub jpeg_quality: u8,
}

impl From<&ImageConfig> for EncodeOptions {
    fn from(cfg: &ImageConfig) -> Self {
        Self {
            avif_speed: cfg.avif_speed.clamp(1, 10),
            avif_quality: cfg.avif_quality.clamp(1, 100),
            jpeg_quality: cfg.jpeg_quality.clamp(1, 100),
        }
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::from(&ImageConfig::default())
    }
}

/// 输出编码：请求指定的格式，或源图自身的编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    Target(TargetFormat),
    Native(ImageFormat),
}

impl OutputEncoding {
    pub fn choose(requested: Option<TargetFormat>, source: ImageFormat) -> Self {
        match requested {
            Some(t) => OutputEncoding::Target(t),
            None => OutputEncoding::Native(source),
        }
    }
}

/// 从带 Seek 的读端解码，同时返回探测到的源编码
pub fn decode<R: BufRead + Seek>(reader: R) -> ImageResult<(DynamicImage, ImageFormat)> {
    let reader = ImageReader::new(reader).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| ImageError::Unsupported(ImageFormatHint::Unknown.into()))?;
    let img = reader.decode()?;
    Ok((img, format))
}

pub fn decode_bytes(bytes: &[u8]) -> ImageResult<(DynamicImage, ImageFormat)> {
    decode(Cursor::new(bytes))
}

/// 精确缩放到 `w × h`（不保持宽高比）
pub fn resize(img: DynamicImage, target: Option<(u32, u32)>) -> DynamicImage {
    match target {
        Some((w, h)) if (w, h) != (img.width(), img.height()) => {
            img.resize_exact(w, h, FilterType::Lanczos3)
        }
        _ => img,
    }
}

/// 按目标编码写出图片。
///
/// WebP 只有无损编码器且仅支持 RGB(A)8；JPEG 不支持 alpha；AVIF 统一转为 RGBA8。
/// 其他源编码（GIF/TIFF/BMP 等）先在内存中编码再整体写出。
pub fn encode<W: Write>(
    img: &DynamicImage,
    encoding: OutputEncoding,
    opts: EncodeOptions,
    mut out: W,
) -> ImageResult<()> {
    match encoding {
        OutputEncoding::Target(TargetFormat::Webp) | OutputEncoding::Native(ImageFormat::WebP) => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(out))
        }
        OutputEncoding::Target(TargetFormat::Avif) | OutputEncoding::Native(ImageFormat::Avif) => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(AvifEncoder::new_with_speed_quality(
                out,
                opts.avif_speed,
                opts.avif_quality,
            ))
        }
        OutputEncoding::Native(ImageFormat::Png) => img.write_with_encoder(PngEncoder::new(out)),
        OutputEncoding::Native(ImageFormat::Jpeg) => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(out, opts.jpeg_quality))
        }
        OutputEncoding::Native(other) => {
            let mut buf = Cursor::new(Vec::new());
            img.write_to(&mut buf, other)?;
            out.write_all(buf.get_ref())?;
            Ok(())
        }
    }
}

/// 完整的解码 → 缩放 → 编码（缓冲版本）
pub fn transform_bytes(
    src: &[u8],
    requested: Option<TargetFormat>,
    resize_to: Option<(u32, u32)>,
    opts: EncodeOptions,
) -> ImageResult<Vec<u8>> {
    let (img, source_format) = decode_bytes(src)?;
    let img = resize(img, resize_to);
    let mut out = Vec::new();
    encode(&img, OutputEncoding::choose(requested, source_format), opts, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn sample_png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 7) as u8, (y * 11) as u8, 90, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    fn sample_jpeg(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 5) as u8, (y * 3) as u8, 40]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Jpeg)
            .expect("encode jpeg");
        out.into_inner()
    }

    #[test]
    fn decode_reports_source_format() {
        let (img, fmt) = decode_bytes(&sample_png(8, 6)).expect("decode");
        assert_eq!(fmt, ImageFormat::Png);
        assert_eq!((img.width(), img.height()), (8, 6));
    }

    #[test]
    fn resize_is_exact_and_ignores_aspect_ratio() {
        let (img, _) = decode_bytes(&sample_png(40, 10)).unwrap();
        let out = resize(img, Some((7, 13)));
        assert_eq!((out.width(), out.height()), (7, 13));
    }

    #[test]
    fn webp_target_produces_webp() {
        let out = transform_bytes(
            &sample_png(12, 9),
            Some(TargetFormat::Webp),
            None,
            EncodeOptions::default(),
        )
        .expect("transform");
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::WebP);
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 9));
    }

    #[test]
    fn avif_target_produces_avif_container() {
        let out = transform_bytes(
            &sample_png(48, 32),
            Some(TargetFormat::Avif),
            Some((32, 32)),
            EncodeOptions {
                avif_speed: 10,
                ..EncodeOptions::default()
            },
        )
        .expect("transform");
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Avif);
    }

    #[test]
    fn native_encoding_is_kept_without_target() {
        let out = transform_bytes(&sample_jpeg(20, 10), None, Some((10, 5)), EncodeOptions::default())
            .expect("transform");
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 5));
    }

    #[test]
    fn corrupt_input_is_an_error() {
        let mut bytes = sample_png(8, 8);
        bytes.truncate(30);
        assert!(transform_bytes(&bytes, Some(TargetFormat::Webp), None, EncodeOptions::default()).is_err());
        assert!(transform_bytes(b"plain text", None, None, EncodeOptions::default()).is_err());
    }
}
