use utoipa::openapi::server::{ServerBuilder, ServerVariableBuilder};
use utoipa::{Modify, OpenApi};

/// 图片接口挂在 `config.api.prefix` 下，`/health` 不带前缀，因此提供两个 server。
struct ApiServers;

impl Modify for ApiServers {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let api = ServerBuilder::new()
            .url("{api_prefix}")
            .description(Some("业务接口（默认 /api）"))
            .parameter(
                "api_prefix",
                ServerVariableBuilder::new()
                    .default_value("/api")
                    .description(Some("对应 config.api.prefix（可通过 APP__API__PREFIX 覆盖）")),
            )
            .build();
        let root = ServerBuilder::new()
            .url("/")
            .description(Some("根路径（/health）"))
            .build();
        openapi.servers = Some(vec![api, root]);
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::transform::handler::transform_buffered,
        crate::features::transform::handler::transform_streaming,
    ),
    components(schemas(crate::features::health::handler::HealthResponse)),
    modifiers(&ApiServers),
    tags(
        (name = "Image", description = "Image transform APIs"),
        (name = "Health", description = "Health APIs"),
    ),
    info(
        title = "Image Transform API",
        version = "0.1.0",
        description = "On-demand image resize/transcode service (Axum)"
    )
)]
pub struct ApiDoc;
