use std::str::FromStr;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;

/// 配置列表的解析结果："*" 表示任意，否则为逐项解析成功的值
enum Allow<T> {
    Any,
    List(Vec<T>),
}

impl<T: FromStr> Allow<T> {
    fn parse(field: &str, values: &[String]) -> Self {
        let mut list = Vec::new();
        for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
            if value == "*" {
                return Allow::Any;
            }
            match value.parse::<T>() {
                Ok(v) => list.push(v),
                Err(_) => tracing::warn!("CORS {} 中的值无效，已忽略: {}", field, value),
            }
        }
        Allow::List(list)
    }

    fn is_any(&self) -> bool {
        matches!(self, Allow::Any)
    }
}

/// 根据配置构建 CORS 中间件；未启用或配置无效时返回 `None`
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    if !cors.enabled {
        return None;
    }

    let origins = Allow::<HeaderValue>::parse("allowed_origins", &cors.allowed_origins);
    if matches!(&origins, Allow::List(v) if v.is_empty()) {
        tracing::warn!("CORS 已启用但 allowed_origins 为空，已跳过启用");
        return None;
    }
    // 浏览器端只发 GET；未配置方法时默认放行 GET/HEAD。
    let methods = match Allow::<Method>::parse("allowed_methods", &cors.allowed_methods) {
        Allow::List(v) if v.is_empty() => Allow::List(vec![Method::GET, Method::HEAD]),
        other => other,
    };
    let headers = Allow::<HeaderName>::parse("allowed_headers", &cors.allowed_headers);
    let expose = Allow::<HeaderName>::parse("expose_headers", &cors.expose_headers);

    let wildcard = origins.is_any() || methods.is_any() || headers.is_any() || expose.is_any();
    if cors.allow_credentials && wildcard {
        tracing::error!("CORS 配置无效：allow_credentials=true 不能与 \"*\" 同时使用，已跳过启用");
        return None;
    }

    let mut layer = CorsLayer::new();
    layer = match origins {
        Allow::Any => layer.allow_origin(Any),
        Allow::List(v) => layer.allow_origin(v),
    };
    layer = match methods {
        Allow::Any => layer.allow_methods(Any),
        Allow::List(v) => layer.allow_methods(v),
    };
    layer = match headers {
        Allow::Any => layer.allow_headers(Any),
        Allow::List(v) if v.is_empty() => layer,
        Allow::List(v) => layer.allow_headers(v),
    };
    layer = match expose {
        Allow::Any => layer.expose_headers(Any),
        Allow::List(v) if v.is_empty() => layer,
        Allow::List(v) => layer.expose_headers(v),
    };
    if cors.allow_credentials {
        layer = layer.allow_credentials(true);
    }
    if let Some(secs) = cors.max_age_secs
        && secs > 0
    {
        layer = layer.max_age(Duration::from_secs(secs));
    }

    Some(layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_or_originless_config_yields_no_layer() {
        assert!(build_cors_layer(&CorsConfig::default()).is_none());
        let cfg = CorsConfig {
            enabled: true,
            ..CorsConfig::default()
        };
        assert!(build_cors_layer(&cfg).is_none());
    }

    #[test]
    fn credentials_with_wildcard_is_rejected() {
        let cfg = CorsConfig {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
            ..CorsConfig::default()
        };
        assert!(build_cors_layer(&cfg).is_none());
    }
}
