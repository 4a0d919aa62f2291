//! # Gantry Driver
//!
//! 硬件接口层：
//! - [`MachineDriver`]：G-code 运动控制器（位置、回零、换刀、宏）
//! - [`Scale`]：电子天平
//! - [`GcodeCommand`] / [`MoveTarget`]：强类型命令模型
//!
//! 启用 `mock` feature 后提供 [`mock::MockMachine`] 与 [`mock::MockScale`]，
//! 用于无硬件测试。

pub mod axis;
mod error;
pub mod gcode;
pub mod machine;
pub mod mode;
pub mod scale;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use axis::{Axis, HomedAxes, MachinePosition};
pub use error::{DriverError, ScaleError};
pub use gcode::{GcodeCommand, MoveTarget};
pub use machine::MachineDriver;
pub use mode::PositioningMode;
pub use scale::Scale;
