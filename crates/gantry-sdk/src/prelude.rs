//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use gantry_sdk::prelude::*;
//! ```

// 配置
pub use crate::config::{PositionRegistry, PositionType, SystemConfig};

// 硬件接口
pub use crate::driver::{Axis, MachineDriver, Scale};

// 状态机与工作流
pub use crate::client::{
    ContextPatch, GantryManager, MotionState, MotionStateMachine, MoveRequest,
    MoveValidationResult, SharedMotionPlatform, payload,
};

// 错误类型
pub use crate::config::ConfigError;
pub use crate::client::{ExecutionError, MotionError};
pub use crate::driver::{DriverError, ScaleError};
