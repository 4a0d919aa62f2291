//! 客户端层错误类型定义
//!
//! 两条通道：
//! - [`ExecutionError`]：硬件序列执行失败。状态机捕获后回退到 Idle，
//!   以 `MoveValidationResult` 的形式报告，不向调用方传播。
//! - [`MotionError`]：配置损坏或安全模型被破坏，属于致命错误。

use crate::state::{MotionState, Transition};
use gantry_config::ConfigError;
use gantry_driver::{DriverError, ScaleError};
use thiserror::Error;

/// 致命错误
#[derive(Error, Debug)]
pub enum MotionError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 内部不变量被破坏
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// 状态转换表中不存在的转换
    #[error("Invalid transition '{transition:?}' from state '{from:?}'")]
    InvalidTransition {
        from: MotionState,
        transition: Transition,
    },

    /// 未注册的工具
    #[error("Tool '{0}' is not registered")]
    UnknownTool(String),
}

/// 硬件执行错误
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Scale(#[from] ScaleError),

    /// 需要天平但未配置
    #[error("Scale not configured")]
    ScaleNotConfigured,

    /// 分配循环耗尽仍未达到目标
    #[error("Dispense did not converge after {iterations} iterations (last weight {weight} g)")]
    DispenseIncomplete { iterations: u32, weight: f64 },

    /// 孔板 / 分配器状态错误
    #[error("{0}")]
    Labware(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_is_transparent() {
        let err: ExecutionError = DriverError::Timeout.into();
        assert_eq!(err.to_string(), "Operation timeout");

        let err: ExecutionError = ScaleError::NotConnected.into();
        assert_eq!(err.to_string(), "Scale is not connected");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = MotionError::InvalidTransition {
            from: MotionState::Idle,
            transition: Transition::CompleteMotion,
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition 'CompleteMotion' from state 'Idle'"
        );
    }
}
