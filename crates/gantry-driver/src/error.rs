//! 驱动层错误类型定义

use thiserror::Error;

/// 机器驱动错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// 未连接
    #[error("Machine is not connected")]
    NotConnected,

    /// 通信失败
    #[error("Communication error: {0}")]
    Communication(String),

    /// 控制器拒绝了命令
    #[error("Command '{command}' rejected: {reason}")]
    CommandRejected { command: String, reason: String },

    /// G-code 无法解析
    #[error("Invalid G-code '{0}'")]
    InvalidCommand(String),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}

/// 称量设备错误
///
/// 过载、超量程与单位不符需要与普通通信错误区分，调用方据此决定是否重试。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScaleError {
    /// 未连接
    #[error("Scale is not connected")]
    NotConnected,

    /// 过载
    #[error("Scale overload (reading {reading} g)")]
    Overload { reading: f64 },

    /// 读数超出量程
    #[error("Scale reading out of range: {reading} g")]
    OutOfRange { reading: f64 },

    /// 单位不符
    #[error("Scale unit mismatch: expected '{expected}', got '{actual}'")]
    UnitMismatch { expected: String, actual: String },

    /// 通信失败
    #[error("Scale communication error: {0}")]
    Communication(String),

    /// 稳定读数超时
    #[error("Timed out waiting for a stable reading")]
    Timeout,
}
