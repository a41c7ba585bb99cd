use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// 资源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// 源图片根目录，所有 `src` 都相对该目录解析
    pub root: String,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            root: "./public".to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 存在时以其为准）
    pub level: String,
    /// 日志格式：full | compact
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API 路由前缀
    pub prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: "/api".to_string(),
        }
    }
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 是否启用 CORS
    #[serde(default)]
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// 允许的方法列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    /// 允许的请求头列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    /// 暴露的响应头列表；默认暴露 `X-Memory-Usage`，浏览器端才能读到内存差值
    #[serde(default = "CorsConfig::default_expose_headers")]
    pub expose_headers: Vec<String>,
    /// 是否允许携带凭证
    #[serde(default)]
    pub allow_credentials: bool,
    /// 预检缓存时间（秒）
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CorsConfig {
    fn default_expose_headers() -> Vec<String> {
        vec![crate::features::transform::MEMORY_USAGE_HEADER.to_string()]
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: Vec::new(),
            allowed_methods: Vec::new(),
            allowed_headers: Vec::new(),
            expose_headers: Self::default_expose_headers(),
            allow_credentials: false,
            max_age_secs: None,
        }
    }
}

/// 图片处理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// 并发转换许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// 流式输出的分块大小（字节）
    #[serde(default = "ImageConfig::default_stream_chunk_bytes")]
    pub stream_chunk_bytes: usize,
    /// 流式管道中允许积压的分块数；满了以后编码线程阻塞（背压）
    #[serde(default = "ImageConfig::default_stream_channel_capacity")]
    pub stream_channel_capacity: usize,
    /// AVIF 编码速度 1-10（越大越快）
    #[serde(default = "ImageConfig::default_avif_speed")]
    pub avif_speed: u8,
    /// AVIF 编码质量 1-100
    #[serde(default = "ImageConfig::default_avif_quality")]
    pub avif_quality: u8,
    /// 源图为 JPEG 且未指定格式时的重编码质量 1-100
    #[serde(default = "ImageConfig::default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// 缩放目标单边上限（像素）
    #[serde(default = "ImageConfig::default_max_dimension")]
    pub max_dimension: u32,
    /// 缩放目标总像素上限（w * h）
    #[serde(default = "ImageConfig::default_max_pixels")]
    pub max_pixels: u64,
}

impl ImageConfig {
    fn default_stream_chunk_bytes() -> usize {
        64 * 1024
    }
    fn default_stream_channel_capacity() -> usize {
        4
    }
    fn default_avif_speed() -> u8 {
        6
    }
    fn default_avif_quality() -> u8 {
        80
    }
    fn default_jpeg_quality() -> u8 {
        85
    }
    fn default_max_dimension() -> u32 {
        16_384
    }
    fn default_max_pixels() -> u64 {
        40_000_000
    }

    /// 实际生效的并发许可数
    pub fn effective_parallelism(&self) -> usize {
        match self.max_parallel {
            0 => num_cpus::get().max(1),
            n => n as usize,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_parallel: 0,
            stream_chunk_bytes: Self::default_stream_chunk_bytes(),
            stream_channel_capacity: Self::default_stream_channel_capacity(),
            avif_speed: Self::default_avif_speed(),
            avif_quality: Self::default_avif_quality(),
            jpeg_quality: Self::default_jpeg_quality(),
            max_dimension: Self::default_max_dimension(),
            max_pixels: Self::default_max_pixels(),
        }
    }
}

/// 内存探针类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryProbeKind {
    /// 读取当前进程常驻内存
    #[default]
    Process,
    /// 恒为 0（关闭采样，响应头固定为 `0 bytes`）
    None,
}

/// 内存采样配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryConfig {
    #[serde(default)]
    pub probe: MemoryProbeKind,
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }

    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    ///
    /// 配置文件可缺省；环境变量形如 `APP__IMAGE__MAX_PARALLEL=4`。
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();
        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<&'static AppConfig, ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(Self::global())
    }

    /// 获取配置文件路径（`APP_CONFIG_PATH` 优先）
    fn get_config_path() -> PathBuf {
        std::env::var_os("APP_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 获取源图片根目录
    pub fn resources_root(&self) -> PathBuf {
        PathBuf::from(&self.resources.root)
    }
}
