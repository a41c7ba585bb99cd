/// 健康检查
pub mod health;

/// 图片转换（校验/解析/管道/采样/响应）
pub mod transform;
