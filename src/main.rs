use image_transform_backend::{AppConfig, AppState, ShutdownManager, build_router};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    // RUST_LOG 优先；否则使用配置中的级别。
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "image_transform_backend={lvl},tower_http={lvl}",
            lvl = config.logging.level
        ))
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format.as_str() {
        "compact" => builder.compact().init(),
        _ => builder.init(),
    }
}

#[tokio::main]
async fn main() {
    // 配置加载失败时使用默认配置起一个临时日志，保证错误可见。
    let config = match AppConfig::init_global() {
        Ok(c) => c,
        Err(e) => {
            init_tracing(&AppConfig::default());
            tracing::error!("Config init failed: {}", e);
            std::process::exit(1);
        }
    };
    init_tracing(config);

    let shutdown_manager = ShutdownManager::new();
    if let Err(e) = shutdown_manager.start_signal_handler() {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    let state = AppState::from_config(config);
    tracing::info!(
        "资源根目录: {:?}，并发转换许可: {}",
        state.resolver.root(),
        config.image.effective_parallelism()
    );
    let app = build_router(state, config);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("OpenAPI: http://{}/api-docs/openapi.json", addr);
    tracing::info!("Image (buffered): http://{}{}/image?src=", addr, config.api.prefix);
    tracing::info!("Image (streaming): http://{}{}/image/stream?src=", addr, config.api.prefix);

    let shutdown_timeout = config.shutdown.timeout_duration();
    let signal_manager = shutdown_manager.clone();
    let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
        let reason = signal_manager.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);
    });

    // 收到信号后，给在途请求留出超时窗口；超时则直接退出。
    let server = tokio::spawn(async move { graceful.await });
    let result = tokio::select! {
        res = server => res,
        _ = async {
            shutdown_manager.wait_for_shutdown().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            tracing::warn!("优雅退出超时（{}秒），强制退出", shutdown_timeout.as_secs());
            std::process::exit(1);
        }
    };

    match result {
        Ok(Ok(())) => tracing::info!("服务器已优雅关闭"),
        Ok(Err(e)) => {
            tracing::error!("服务器运行错误: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("服务器任务异常退出: {}", e);
            std::process::exit(1);
        }
    }
}
