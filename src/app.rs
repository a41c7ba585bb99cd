use axum::{Json, Router, routing::get};
use utoipa::OpenApi;

use crate::config::AppConfig;
use crate::cors::build_cors_layer;
use crate::features::health::health_check;
use crate::features::transform::create_transform_router;
use crate::openapi::ApiDoc;
use crate::request_id::request_id_middleware;
use crate::state::AppState;

/// 装配完整路由：健康检查、OpenAPI 文档、带前缀的图片接口，以及全局中间件
pub fn build_router(state: AppState, config: &AppConfig) -> Router {
    let base = Router::<AppState>::new()
        .route("/health", get(health_check))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    // axum 不允许在根路径 nest。
    let prefix = config.api.prefix.trim_end_matches('/');
    let routed = if prefix.is_empty() {
        base.merge(create_transform_router())
    } else {
        base.nest(prefix, create_transform_router())
    };
    let mut app = routed.with_state(state);

    if let Some(cors) = build_cors_layer(&config.cors) {
        app = app.layer(cors);
    }
    // 最外层：保证 CORS 预检与错误响应也带上 request_id。
    app.layer(axum::middleware::from_fn(request_id_middleware))
}
