//! # 系统配置
//!
//! 机器、安全、机械手、分配器、称量与孔板等硬件参数（TOML）。
//! 所有字段都有默认值，缺省的段落或字段按默认值补齐。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// 系统配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub machine: MachineSettings,
    pub safety: SafetySettings,
    pub manipulator: ManipulatorSettings,
    pub homing: HomingSettings,
    pub scale: Option<ScaleStation>,
    pub dispensers: DispenserLayout,
    pub dispense: DispenseSettings,
    pub deck: DeckLayout,
}

impl SystemConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded system configuration from {}", path.display());
        Ok(config)
    }

    /// 文件不存在时回退到默认配置
    ///
    /// 文件存在但内容非法时仍然返回错误。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "System configuration {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidSystemConfig(format!("serialization failed: {}", e)))
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.dispense;
        if !(d.min_step > 0.0 && d.min_step <= d.max_step) {
            return Err(ConfigError::InvalidSystemConfig(format!(
                "dispense steps must satisfy 0 < min_step <= max_step (min_step = {}, max_step = {})",
                d.min_step, d.max_step
            )));
        }
        if d.fine_step <= 0.0 {
            return Err(ConfigError::InvalidSystemConfig(
                "dispense.fine_step must be positive".to_string(),
            ));
        }
        if !(0.0 < d.coarse_fraction && d.coarse_fraction < d.accept_fraction && d.accept_fraction <= 1.0)
        {
            return Err(ConfigError::InvalidSystemConfig(format!(
                "dispense fractions must satisfy 0 < coarse_fraction < accept_fraction <= 1 (got {} / {})",
                d.coarse_fraction, d.accept_fraction
            )));
        }
        if d.max_iterations == 0 {
            return Err(ConfigError::InvalidSystemConfig(
                "dispense.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.safety.max_weight_per_well <= 0.0 {
            return Err(ConfigError::InvalidSystemConfig(
                "safety.max_weight_per_well must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 机器连接与进给参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// 控制器地址
    pub address: String,
    /// 默认进给速度（mm/min）
    pub default_feedrate: u32,
    /// XYZ 移动进给速度
    pub travel_feedrate: u32,
    /// 机械手（V 轴）进给速度
    pub manipulator_feedrate: u32,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            address: "192.168.1.2".to_string(),
            default_feedrate: 3000,
            travel_feedrate: 500,
            manipulator_feedrate: 50,
        }
    }
}

/// 安全参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySettings {
    /// 孔板安全高度
    pub safe_z: f64,
    /// 安全高度之上的额外抬升
    pub safe_z_offset: f64,
    /// 单孔最大粉末重量（g）
    pub max_weight_per_well: f64,
    /// 称重比较容差（g）
    pub weight_tolerance: f64,
}

impl SafetySettings {
    /// 实际使用的行进安全高度
    pub fn travel_z(&self) -> f64 {
        self.safe_z + self.safe_z_offset
    }
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            safe_z: 195.0,
            safe_z_offset: 20.0,
            max_weight_per_well: 10.0,
            weight_tolerance: 0.001,
        }
    }
}

/// 机械手（取放模具、压实、装活塞）参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManipulatorSettings {
    /// 唯一支持的工具名
    pub tool_name: String,
    /// 工具架索引（`T{index}`）
    pub tool_index: u32,
    /// 压实/夹持轴
    pub tamper_axis: char,
    /// 行进位
    pub tamper_travel_pos: f64,
    /// 工作位
    pub tamper_working_pos: f64,
    /// 分配器处安全高度
    pub dispenser_safe_z: f64,

    // ---- 取放模具 ----
    pub well_approach_z: f64,
    pub mold_side_offset: f64,
    pub mold_release_v: f64,

    // ---- 称量台 ----
    pub scale_approach_z: f64,
    pub scale_clearance_v: f64,
    pub scale_reach_y: f64,
    pub scale_place_v: f64,
    pub tamp_v: f64,

    // ---- 活塞 ----
    pub piston_lower_v: f64,
    pub piston_clearance_z: f64,
    pub piston_reach_y: f64,
    pub piston_grip_v: f64,
}

impl Default for ManipulatorSettings {
    fn default() -> Self {
        Self {
            tool_name: "manipulator".to_string(),
            tool_index: 0,
            tamper_axis: 'V',
            tamper_travel_pos: 30.0,
            tamper_working_pos: 50.0,
            dispenser_safe_z: 254.0,
            well_approach_z: 148.0,
            mold_side_offset: 25.5,
            mold_release_v: 50.0,
            scale_approach_z: 134.0,
            scale_clearance_v: 38.5,
            scale_reach_y: 184.0,
            scale_place_v: 45.0,
            tamp_v: 0.0,
            piston_lower_v: 52.0,
            piston_clearance_z: 189.0,
            piston_reach_y: 35.0,
            piston_grip_v: 37.3,
        }
    }
}

/// 回零后的逻辑状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomingSettings {
    /// 回零 / 取放工具后所处的 z 高度等级
    pub z_height: String,
}

impl Default for HomingSettings {
    fn default() -> Self {
        Self {
            z_height: "mold_transfer_safe".to_string(),
        }
    }
}

/// 称量台位置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleStation {
    pub x: f64,
    pub y: f64,
}

/// 活塞分配器布局
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispenserLayout {
    pub count: usize,
    pub pistons_per_dispenser: u32,
    /// 0 号分配器就绪点（分配器前方 35mm）
    pub origin_x: f64,
    pub origin_y: f64,
    /// 相邻分配器的 X 间距
    pub pitch_x: f64,
}

impl DispenserLayout {
    /// 第 `index` 个分配器就绪点坐标
    pub fn ready_point(&self, index: usize) -> (f64, f64) {
        (self.origin_x + index as f64 * self.pitch_x, self.origin_y)
    }
}

impl Default for DispenserLayout {
    fn default() -> Self {
        Self {
            count: 0,
            pistons_per_dispenser: 0,
            origin_x: 320.0,
            origin_y: 337.0,
            pitch_x: 42.5,
        }
    }
}

/// 粉末分配算法参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispenseSettings {
    /// 下粉轴
    pub trickler_axis: char,
    /// 粗加阶段最大步长（mm）
    pub max_step: f64,
    /// 粗加阶段最小步长（mm）
    pub min_step: f64,
    /// 精加固定步长（mm）
    pub fine_step: f64,
    /// 粗加 → 精加的切换比例
    pub coarse_fraction: f64,
    /// 验收比例
    pub accept_fraction: f64,
    /// 最大循环次数
    pub max_iterations: u32,
    /// 振动宏
    pub vibrate_command: String,
    /// 下粉进给速度
    pub trickle_feedrate: u32,
    /// 稳定读数前的等待（毫秒）
    pub settle_ms: u64,
}

impl Default for DispenseSettings {
    fn default() -> Self {
        Self {
            trickler_axis: 'W',
            max_step: 2.0,
            min_step: 0.2,
            fine_step: 0.02,
            coarse_fraction: 0.9,
            accept_fraction: 0.99,
            max_iterations: 2000,
            vibrate_command: "M98 P\"vibrate.g\"".to_string(),
            trickle_feedrate: 2000,
            settle_ms: 0,
        }
    }
}

/// 孔板布局
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckLayout {
    pub wells: Vec<WellSpec>,
}

/// 单个孔位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellSpec {
    /// 孔位标识（如 "A1"）
    pub id: String,
    pub x: f64,
    pub y: f64,
    /// 单孔最大重量（缺省使用 safety.max_weight_per_well）
    #[serde(default)]
    pub max_weight: Option<f64>,
}
