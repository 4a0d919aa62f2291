//! Gantry SDK - 实验室龙门平台运动安全核心
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **配置层** (`config`): 位置/动作注册表、需求谓词、系统参数
//! - **驱动层** (`driver`): G-code 运动控制器与天平接口
//! - **客户端层** (`client`): 运动状态机、执行器、工作流
//!
//! # 快速开始
//!
//! ```rust,ignore
//! use gantry_sdk::prelude::*;
//!
//! gantry_sdk::init_logging();
//! let registry = PositionRegistry::from_path("config/motion_platform.json")?;
//! let system = SystemConfig::load_or_default("config/system.toml")?;
//! let platform = MotionStateMachine::new(registry, system, machine, Some(scale))?;
//! let mut manager = GantryManager::new(platform);
//! manager.connect()?;
//! manager.dispense_to_well("A1", 2.5)?;
//! ```

pub mod logging;
pub mod prelude;

// 各层 crate，通过模块路径访问
pub use gantry_client as client;
pub use gantry_config as config;
pub use gantry_driver as driver;

// --- 用户以此为界 ---

// 配置层
pub use gantry_config::{ConfigError, PositionRegistry, PositionType, SystemConfig};

// 驱动层
pub use gantry_driver::{Axis, DriverError, GcodeCommand, MachineDriver, MoveTarget, Scale, ScaleError};

// 客户端层（推荐入口）
pub use gantry_client::{
    ContextPatch, ExecutionError, GantryManager, MotionContext, MotionError, MotionState,
    MotionStateMachine, MoveRequest, MoveValidationResult, SharedMotionPlatform,
};

pub use logging::init_logging;
