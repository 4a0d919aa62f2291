//! 配置层错误类型定义

use thiserror::Error;

/// 配置错误
///
/// 所有错误都在加载阶段产生，属于不可恢复的致命错误。
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取失败
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON 解析失败
    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML 解析失败
    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// 不支持的文件扩展名
    #[error("Unsupported configuration format '{0}' (expected .json or .toml)")]
    UnsupportedFormat(String),

    /// 未知的位置类型
    #[error("Unknown position type '{0}'")]
    UnknownPositionType(String),

    /// 重复的位置标识
    #[error("Duplicate position identifier '{0}'")]
    DuplicatePosition(String),

    /// 重复的动作标识
    #[error("Duplicate action identifier '{0}'")]
    DuplicateAction(String),

    /// 引用既不是类型名也不是已知位置
    #[error("'{owner}' references unknown position or type '{reference}'")]
    UnknownReference { owner: String, reference: String },

    /// 需求映射中的未知上下文字段
    #[error("'{owner}' uses unknown context field '{field}'")]
    UnknownContextField { owner: String, field: String },

    /// 需求值类型与字段不匹配
    #[error("'{owner}' has invalid value for '{field}': {reason}")]
    InvalidRequirementValue {
        owner: String,
        field: String,
        reason: String,
    },

    /// 坐标值无法解析
    #[error("Position '{position}' has invalid {axis} coordinate: {reason}")]
    InvalidCoordinate {
        position: String,
        axis: char,
        reason: String,
    },

    /// 缺少 GLOBAL_READY 位置
    #[error("Configuration must define a GLOBAL_READY position")]
    MissingGlobalReady,

    /// 存在多个 GLOBAL_READY 位置
    #[error("Configuration defines more than one GLOBAL_READY position: {0}")]
    MultipleGlobalReady(String),

    /// 坐标容差非法
    #[error("Coordinate tolerance for {axis} must be a non-negative number (got {value})")]
    InvalidTolerance { axis: char, value: f64 },

    /// 查询未知位置
    #[error("Unknown position identifier '{0}'")]
    UnknownPosition(String),

    /// 查询未知动作
    #[error("Unknown action identifier '{0}'")]
    UnknownAction(String),

    /// 系统配置取值非法
    #[error("Invalid system configuration: {0}")]
    InvalidSystemConfig(String),
}
