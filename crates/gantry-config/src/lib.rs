//! # Gantry Config
//!
//! 运动平台的声明式配置层：位置/动作注册表、需求谓词与系统硬件参数。
//!
//! 本 crate 不依赖任何硬件，只负责解析、校验和查询。
//!
//! ```rust
//! use gantry_config::{PositionRegistry, PositionType};
//!
//! let registry = PositionRegistry::from_json_str(r#"{
//!     "positions": [
//!         { "id": "global_ready", "type": "GLOBAL_READY", "allowed_destinations": ["MOLD_READY"] },
//!         { "id": "mold_ready_A1", "type": "MOLD_READY", "allowed_origins": ["GLOBAL_READY"] }
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(registry.global_ready().identifier, "global_ready");
//! assert!(registry.find_first_of_type(PositionType::MoldReady).is_some());
//! ```

pub mod error;
pub mod position;
pub mod registry;
pub mod requirement;
pub mod system;

pub use error::ConfigError;
pub use position::{
    ActionDescriptor, CoordinateAxis, CoordinateTolerance, CoordinateValue, EngagementRules,
    MachineCoordinates, ObservedCoordinates, PositionDescriptor, PositionType, ZHeightClass,
    ZHeightPolicy, format_options,
};
pub use registry::{PositionRegistry, RegistryConfig};
pub use requirement::{ContextField, ContextSource, Expectation, FieldValue, RequirementSet};
pub use system::{
    DeckLayout, DispenseSettings, DispenserLayout, HomingSettings, MachineSettings,
    ManipulatorSettings, SafetySettings, ScaleStation, SystemConfig, WellSpec,
};
