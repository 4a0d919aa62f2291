//! # 位置与动作描述
//!
//! 注册表在加载阶段构造的不可变描述类型。所有类型引用（如 `MOLD_READY`）
//! 都已在加载时展开为具体的位置标识，运行期不再需要解释类型名。

use crate::requirement::RequirementSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 坐标占位符前缀（尚未标定）
pub const PLACEHOLDER_PREFIX: &str = "PLACEHOLDER";

/// 由当前 z 高度等级推导坐标的标记
pub const USE_Z_HEIGHT_POLICY: &str = "USE_Z_HEIGHT_POLICY";

// ==================== 位置类型 ====================

/// 逻辑位置类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PositionType {
    /// 全局就绪点（每个注册表有且仅有一个）
    GlobalReady,
    /// 模具就绪点（每个孔位一个）
    MoldReady,
    /// 活塞分配器就绪点
    DispenserReady,
    /// 称量台就绪点
    ScaleReady,
}

impl PositionType {
    /// 所有位置类型
    pub const ALL: [PositionType; 4] = [
        PositionType::GlobalReady,
        PositionType::MoldReady,
        PositionType::DispenserReady,
        PositionType::ScaleReady,
    ];

    /// 从配置中的类型名解析
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// 配置中使用的类型名
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionType::GlobalReady => "GLOBAL_READY",
            PositionType::MoldReady => "MOLD_READY",
            PositionType::DispenserReady => "DISPENSER_READY",
            PositionType::ScaleReady => "SCALE_READY",
        }
    }
}

impl fmt::Display for PositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ==================== 坐标 ====================

/// 注册表校验的坐标轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateAxis {
    X,
    Y,
    Z,
    V,
}

impl CoordinateAxis {
    pub const ALL: [CoordinateAxis; 4] = [
        CoordinateAxis::X,
        CoordinateAxis::Y,
        CoordinateAxis::Z,
        CoordinateAxis::V,
    ];

    /// 小写轴名（配置键）
    pub fn key(&self) -> char {
        match self {
            CoordinateAxis::X => 'x',
            CoordinateAxis::Y => 'y',
            CoordinateAxis::Z => 'z',
            CoordinateAxis::V => 'v',
        }
    }

    /// 大写轴名（错误消息）
    pub fn letter(&self) -> char {
        self.key().to_ascii_uppercase()
    }
}

/// 单轴的声明坐标
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CoordinateValue {
    /// 未标定或未声明，不参与校验
    #[default]
    Unset,
    /// 固定数值
    Literal(f64),
    /// 由当前 z 高度等级的 `z_coordinate` 推导
    DeriveFromZHeight,
}

impl CoordinateValue {
    /// 固定数值（如有）
    pub fn literal(&self) -> Option<f64> {
        match self {
            CoordinateValue::Literal(value) => Some(*value),
            _ => None,
        }
    }
}

/// 位置的物理坐标声明
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MachineCoordinates {
    pub x: CoordinateValue,
    pub y: CoordinateValue,
    pub z: CoordinateValue,
    pub v: CoordinateValue,
}

impl MachineCoordinates {
    /// 按轴取声明值
    pub fn axis(&self, axis: CoordinateAxis) -> CoordinateValue {
        match axis {
            CoordinateAxis::X => self.x,
            CoordinateAxis::Y => self.y,
            CoordinateAxis::Z => self.z,
            CoordinateAxis::V => self.v,
        }
    }
}

/// 机器上报的实际坐标
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObservedCoordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub v: f64,
}

impl ObservedCoordinates {
    pub fn new(x: f64, y: f64, z: f64, v: f64) -> Self {
        Self { x, y, z, v }
    }

    pub fn axis(&self, axis: CoordinateAxis) -> f64 {
        match axis {
            CoordinateAxis::X => self.x,
            CoordinateAxis::Y => self.y,
            CoordinateAxis::Z => self.z,
            CoordinateAxis::V => self.v,
        }
    }
}

/// 各轴坐标容差
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinateTolerance {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub v: f64,
}

impl CoordinateTolerance {
    /// 默认容差（各轴 ±0.5）
    pub const DEFAULT: f64 = 0.5;

    pub fn axis(&self, axis: CoordinateAxis) -> f64 {
        match axis {
            CoordinateAxis::X => self.x,
            CoordinateAxis::Y => self.y,
            CoordinateAxis::Z => self.z,
            CoordinateAxis::V => self.v,
        }
    }
}

impl Default for CoordinateTolerance {
    fn default() -> Self {
        Self {
            x: Self::DEFAULT,
            y: Self::DEFAULT,
            z: Self::DEFAULT,
            v: Self::DEFAULT,
        }
    }
}

// ==================== Z 高度 ====================

/// 命名的 z 高度等级
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ZHeightClass {
    /// 该等级对应的 Z 轴数值
    #[serde(default)]
    pub z_coordinate: Option<f64>,

    /// 其他附加字段（原样保留）
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// 进入某位置前必须满足的 z 高度约束
///
/// `required` 为空且 `allowed` 为空时表示任意 z 高度均可。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ZHeightPolicy {
    pub required: Option<String>,
    pub allowed: BTreeSet<String>,
}

impl ZHeightPolicy {
    /// 是否不施加任何约束
    pub fn is_unconstrained(&self) -> bool {
        self.required.is_none() && self.allowed.is_empty()
    }

    /// 校验当前 z 高度等级
    ///
    /// # 返回
    /// 满足时返回 `None`，否则返回可读的失败原因。
    pub fn validate(&self, current: Option<&str>) -> Option<String> {
        if self.is_unconstrained() {
            return None;
        }

        let Some(current) = current else {
            return Some("Current z-height is not set.".to_string());
        };

        if let Some(required) = &self.required {
            if current != required {
                return Some(format!(
                    "Move requires z-height '{}', current '{}'.",
                    required, current
                ));
            }
        }

        if !self.allowed.is_empty() && !self.allowed.contains(current) {
            return Some(format!(
                "Z-height '{}' not permitted. Allowed: {}.",
                current,
                format_options(self.allowed.iter())
            ));
        }

        None
    }
}

// ==================== 描述符 ====================

/// 工具接合规则
#[derive(Debug, Clone, Default)]
pub struct EngagementRules {
    /// 接合专用需求（为空时回退到位置的通用需求）
    pub requirements: RequirementSet,
    /// 接合状态下允许的动作（为空表示不限制）
    pub allowed_actions: BTreeSet<String>,
}

/// 逻辑位置描述
#[derive(Debug, Clone)]
pub struct PositionDescriptor {
    pub identifier: String,
    pub position_type: PositionType,
    pub allowed_origins: BTreeSet<String>,
    pub allowed_destinations: BTreeSet<String>,
    pub coordinates: Option<MachineCoordinates>,
    pub requirements: RequirementSet,
    pub z_height_policy: ZHeightPolicy,
    pub allows_tool_engagement: bool,
    pub engagement: EngagementRules,
    pub resource_id: Option<String>,
    pub description: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PositionDescriptor {
    /// 接合校验使用的需求集合
    pub fn engagement_requirements(&self) -> &RequirementSet {
        if self.engagement.requirements.is_empty() {
            &self.requirements
        } else {
            &self.engagement.requirements
        }
    }
}

/// 非位置性动作描述（回零、取工具、取活塞等）
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub identifier: String,
    /// 允许执行的位置（为空表示不限制）
    pub position_scope: BTreeSet<String>,
    pub requirements: RequirementSet,
    pub excludes: RequirementSet,
    pub required_tool_id: Option<String>,
    pub requires_tool_engaged: bool,
    pub blocked_when_engaged: bool,
    pub description: String,
}

/// 将选项集合渲染为排序、去重的逗号分隔字符串
pub fn format_options<I, S>(options: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let sorted: BTreeSet<String> = options
        .into_iter()
        .map(|option| option.as_ref().to_string())
        .collect();
    sorted.into_iter().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(required: Option<&str>, allowed: &[&str]) -> ZHeightPolicy {
        ZHeightPolicy {
            required: required.map(str::to_string),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_position_type_names() {
        for t in PositionType::ALL {
            assert_eq!(PositionType::from_name(t.as_str()), Some(t));
        }
        assert_eq!(PositionType::from_name("mold_ready"), None);
    }

    #[test]
    fn test_unconstrained_policy_accepts_anything() {
        let p = ZHeightPolicy::default();
        assert!(p.validate(None).is_none());
        assert!(p.validate(Some("whatever")).is_none());
    }

    #[test]
    fn test_policy_requires_z_height_to_be_set() {
        let p = policy(None, &["mold_transfer_safe"]);
        let reason = p.validate(None).unwrap();
        assert!(reason.contains("z-height is not set"), "reason: {}", reason);
        assert!(p.validate(Some("mold_transfer_safe")).is_none());
    }

    #[test]
    fn test_policy_required_and_allowed() {
        let p = policy(Some("dispenser_safe"), &[]);
        let reason = p.validate(Some("mold_transfer_safe")).unwrap();
        assert_eq!(
            reason,
            "Move requires z-height 'dispenser_safe', current 'mold_transfer_safe'."
        );

        let p = policy(None, &["b_safe", "a_safe"]);
        let reason = p.validate(Some("c_safe")).unwrap();
        // 允许列表按字母序输出
        assert_eq!(reason, "Z-height 'c_safe' not permitted. Allowed: a_safe, b_safe.");
    }

    #[test]
    fn test_format_options_sorted_and_deduplicated() {
        assert_eq!(format_options(["b", "a", "b"]), "a, b");
        assert_eq!(format_options(Vec::<String>::new()), "");
    }

    #[test]
    fn test_default_tolerance() {
        let t = CoordinateTolerance::default();
        for axis in CoordinateAxis::ALL {
            assert_eq!(t.axis(axis), 0.5);
        }
    }
}
