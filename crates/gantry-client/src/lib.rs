//! 客户端层：运动安全核心
//!
//! 本 crate 提供：
//! - [`MotionStateMachine`]：Idle / Moving / ToolEngaged 三态状态机与通用校验执行流程
//! - [`MotionContext`]：平台逻辑位置、工具、载荷与实验耗材状态
//! - [`MovementExecutor`]：把高层操作翻译成 G-code 序列，含定量下粉算法
//! - [`SharedMotionPlatform`]：多调用方共享时的单飞句柄
//! - [`GantryManager`]：连接初始化与单孔下粉工作流
//!
//! # 错误通道
//!
//! "当前不允许"的请求返回 [`MoveValidationResult`]；配置损坏或不变量被破坏返回
//! [`MotionError`]。

pub mod context;
pub mod dispense;
mod error;
pub mod executor;
pub mod labware;
pub mod manager;
mod operations;
pub mod shared;
pub mod state;
pub mod state_machine;
pub mod types;

#[cfg(test)]
mod testing;

// 重新导出常用类型
pub use context::{ContextPatch, MotionContext};
pub use dispense::DispenseReport;
pub use error::{ExecutionError, MotionError};
pub use executor::MovementExecutor;
pub use labware::{Deck, PistonDispenser, WeightWell};
pub use manager::GantryManager;
pub use shared::SharedMotionPlatform;
pub use state::{MotionState, Transition};
pub use state_machine::{ALREADY_EXECUTING, HOMING_ACTIONS, MotionStateMachine, is_homing_action};
pub use types::*;
