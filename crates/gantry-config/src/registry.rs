//! # 位置/动作注册表
//!
//! 从声明式配置（JSON 或 TOML）加载全部合法位置与动作。
//!
//! 加载分两遍：
//! 1. 解析每个位置，按类型名记录该类型下的全部标识；
//! 2. 将 origins / destinations / position_scope 中的类型名展开为具体标识。
//!
//! 加载完成后注册表只读，查询不会再解释类型名。

use crate::error::ConfigError;
use crate::position::{
    ActionDescriptor, CoordinateAxis, CoordinateTolerance, CoordinateValue, EngagementRules,
    MachineCoordinates, ObservedCoordinates, PLACEHOLDER_PREFIX, PositionDescriptor, PositionType,
    USE_Z_HEIGHT_POLICY, ZHeightClass, ZHeightPolicy,
};
use crate::requirement::RequirementSet;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

// ==================== 原始配置结构 ====================

/// 注册表配置文档
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub positions: Vec<RawPosition>,
    #[serde(default)]
    pub actions: Vec<RawAction>,
    #[serde(default)]
    pub z_heights: BTreeMap<String, ZHeightClass>,
    #[serde(default)]
    pub coordinate_tolerance: CoordinateTolerance,
}

/// 配置中的单个位置
#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    pub id: String,
    #[serde(rename = "type")]
    pub position_type: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allowed_destinations: Vec<String>,
    #[serde(default)]
    pub coordinates: Option<RawCoordinates>,
    #[serde(default)]
    pub requirements: BTreeMap<String, Value>,
    #[serde(default)]
    pub z_height_policy: Option<RawZHeightPolicy>,
    #[serde(default)]
    pub allows_tool_engagement: bool,
    #[serde(default)]
    pub engagement: Option<RawEngagement>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// 配置中的坐标（每轴为数值或字符串标记）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCoordinates {
    #[serde(default)]
    pub x: Option<RawCoordinate>,
    #[serde(default)]
    pub y: Option<RawCoordinate>,
    #[serde(default)]
    pub z: Option<RawCoordinate>,
    #[serde(default)]
    pub v: Option<RawCoordinate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinate {
    Number(f64),
    Marker(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawZHeightPolicy {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub required: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEngagement {
    #[serde(default)]
    pub requirements: BTreeMap<String, Value>,
    #[serde(default)]
    pub allowed_actions: Vec<String>,
}

/// 配置中的单个动作
#[derive(Debug, Clone, Deserialize)]
pub struct RawAction {
    pub id: String,
    #[serde(default)]
    pub position_scope: Vec<String>,
    #[serde(default)]
    pub requirements: BTreeMap<String, Value>,
    #[serde(default)]
    pub excludes: BTreeMap<String, Value>,
    #[serde(default)]
    pub required_tool_id: Option<String>,
    #[serde(default)]
    pub requires_tool_engaged: bool,
    #[serde(default)]
    pub blocked_when_engaged: bool,
    #[serde(default)]
    pub description: String,
}

// ==================== 注册表 ====================

/// 位置/动作注册表（只读）
#[derive(Debug, Clone)]
pub struct PositionRegistry {
    positions: Vec<PositionDescriptor>,
    position_index: HashMap<String, usize>,
    actions: Vec<ActionDescriptor>,
    action_index: HashMap<String, usize>,
    z_heights: BTreeMap<String, ZHeightClass>,
    tolerance: CoordinateTolerance,
    global_ready: usize,
}

impl PositionRegistry {
    /// 从配置文档构建注册表
    ///
    /// # 错误
    /// 任何重复标识、未知引用、未知字段或非法坐标都会返回 [`ConfigError`]。
    pub fn from_config(config: RegistryConfig) -> Result<Self, ConfigError> {
        validate_tolerance(&config.coordinate_tolerance)?;

        // 第一遍：解析位置并记录类型成员
        let mut type_members: BTreeMap<PositionType, BTreeSet<String>> = BTreeMap::new();
        let mut position_index = HashMap::new();
        let mut parsed = Vec::with_capacity(config.positions.len());

        for raw in &config.positions {
            let position_type = PositionType::from_name(&raw.position_type)
                .ok_or_else(|| ConfigError::UnknownPositionType(raw.position_type.clone()))?;

            if position_index.insert(raw.id.clone(), parsed.len()).is_some() {
                return Err(ConfigError::DuplicatePosition(raw.id.clone()));
            }
            type_members
                .entry(position_type)
                .or_default()
                .insert(raw.id.clone());
            parsed.push((raw, position_type));
        }

        let known_ids: BTreeSet<&str> = position_index.keys().map(String::as_str).collect();
        let expand = |owner: &str, refs: &[String]| -> Result<BTreeSet<String>, ConfigError> {
            let mut expanded = BTreeSet::new();
            for reference in refs {
                if let Some(position_type) = PositionType::from_name(reference) {
                    if let Some(members) = type_members.get(&position_type) {
                        expanded.extend(members.iter().cloned());
                    }
                } else if known_ids.contains(reference.as_str()) {
                    expanded.insert(reference.clone());
                } else {
                    return Err(ConfigError::UnknownReference {
                        owner: owner.to_string(),
                        reference: reference.clone(),
                    });
                }
            }
            Ok(expanded)
        };

        // 第二遍：展开类型引用并构造描述符
        let mut positions = Vec::with_capacity(parsed.len());
        for (raw, position_type) in parsed {
            let policy = raw.z_height_policy.clone().unwrap_or_default();
            let engagement = raw.engagement.clone().unwrap_or_default();

            positions.push(PositionDescriptor {
                identifier: raw.id.clone(),
                position_type,
                allowed_origins: expand(&raw.id, &raw.allowed_origins)?,
                allowed_destinations: expand(&raw.id, &raw.allowed_destinations)?,
                coordinates: raw
                    .coordinates
                    .as_ref()
                    .map(|c| parse_coordinates(&raw.id, c))
                    .transpose()?,
                requirements: RequirementSet::from_raw(&raw.id, &raw.requirements)?,
                z_height_policy: ZHeightPolicy {
                    required: policy.required,
                    allowed: policy.allowed.into_iter().collect(),
                },
                allows_tool_engagement: raw.allows_tool_engagement,
                engagement: EngagementRules {
                    requirements: RequirementSet::from_raw(&raw.id, &engagement.requirements)?,
                    allowed_actions: engagement.allowed_actions.into_iter().collect(),
                },
                resource_id: raw.resource_id.clone(),
                description: raw.description.clone(),
                metadata: raw.metadata.clone(),
            });
        }

        let global_ready = find_global_ready(&positions)?;

        let mut actions = Vec::with_capacity(config.actions.len());
        let mut action_index = HashMap::new();
        for raw in &config.actions {
            if action_index.insert(raw.id.clone(), actions.len()).is_some() {
                return Err(ConfigError::DuplicateAction(raw.id.clone()));
            }
            actions.push(ActionDescriptor {
                identifier: raw.id.clone(),
                position_scope: expand(&raw.id, &raw.position_scope)?,
                requirements: RequirementSet::from_raw(&raw.id, &raw.requirements)?,
                excludes: RequirementSet::from_raw(&raw.id, &raw.excludes)?,
                required_tool_id: raw.required_tool_id.clone(),
                requires_tool_engaged: raw.requires_tool_engaged,
                blocked_when_engaged: raw.blocked_when_engaged,
                description: raw.description.clone(),
            });
        }

        info!(
            "Loaded position registry: {} positions, {} actions, {} z-height classes",
            positions.len(),
            actions.len(),
            config.z_heights.len()
        );

        Ok(Self {
            positions,
            position_index,
            actions,
            action_index,
            z_heights: config.z_heights,
            tolerance: config.coordinate_tolerance,
            global_ready,
        })
    }

    /// 从 JSON 字符串加载
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: RegistryConfig = serde_json::from_str(content)?;
        Self::from_config(config)
    }

    /// 从 TOML 字符串加载
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RegistryConfig = toml::from_str(content)?;
        Self::from_config(config)
    }

    /// 从文件加载（按扩展名选择格式）
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        debug!("Loading position registry from {}", path.display());
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    // ==================== 查询 ====================

    /// 按标识查询位置
    pub fn get(&self, identifier: &str) -> Result<&PositionDescriptor, ConfigError> {
        self.position_index
            .get(identifier)
            .map(|&i| &self.positions[i])
            .ok_or_else(|| ConfigError::UnknownPosition(identifier.to_string()))
    }

    pub fn has(&self, identifier: &str) -> bool {
        self.position_index.contains_key(identifier)
    }

    /// 按声明顺序查找第一个指定类型的位置
    pub fn find_first_of_type(&self, position_type: PositionType) -> Option<&PositionDescriptor> {
        self.positions
            .iter()
            .find(|p| p.position_type == position_type)
    }

    /// 唯一的全局就绪点
    pub fn global_ready(&self) -> &PositionDescriptor {
        &self.positions[self.global_ready]
    }

    /// 按标识查询动作
    pub fn get_action(&self, identifier: &str) -> Result<&ActionDescriptor, ConfigError> {
        self.action_index
            .get(identifier)
            .map(|&i| &self.actions[i])
            .ok_or_else(|| ConfigError::UnknownAction(identifier.to_string()))
    }

    pub fn positions(&self) -> impl Iterator<Item = &PositionDescriptor> {
        self.positions.iter()
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionDescriptor> {
        self.actions.iter()
    }

    pub fn z_heights(&self) -> &BTreeMap<String, ZHeightClass> {
        &self.z_heights
    }

    /// z 高度等级对应的 Z 轴数值
    pub fn z_coordinate(&self, z_height_id: &str) -> Option<f64> {
        self.z_heights
            .get(z_height_id)
            .and_then(|class| class.z_coordinate)
    }

    pub fn coordinate_tolerance(&self) -> &CoordinateTolerance {
        &self.tolerance
    }

    // ==================== 坐标校验 ====================

    /// 校验机器实际坐标是否与位置声明一致
    ///
    /// # 参数
    /// - `position_id`: 期望所在的逻辑位置
    /// - `observed`: 机器上报的 X/Y/Z/V 坐标
    /// - `current_z_height`: 当前 z 高度等级（用于 `USE_Z_HEIGHT_POLICY`）
    ///
    /// # 返回
    /// 一致时返回 `None`，否则返回带轴名的失败原因。
    pub fn validate_physical_coordinates(
        &self,
        position_id: &str,
        observed: &ObservedCoordinates,
        current_z_height: Option<&str>,
    ) -> Option<String> {
        let position = match self.get(position_id) {
            Ok(position) => position,
            Err(err) => return Some(err.to_string()),
        };
        let coordinates = position.coordinates?;

        CoordinateAxis::ALL.into_iter().find_map(|axis| {
            self.check_axis(
                axis,
                coordinates.axis(axis),
                observed.axis(axis),
                current_z_height,
            )
            .map(|issue| format!("Position '{}' validation failed: {}", position_id, issue))
        })
    }

    fn check_axis(
        &self,
        axis: CoordinateAxis,
        declared: CoordinateValue,
        actual: f64,
        current_z_height: Option<&str>,
    ) -> Option<String> {
        let expected = match declared {
            CoordinateValue::Unset => return None,
            CoordinateValue::Literal(value) => value,
            CoordinateValue::DeriveFromZHeight => {
                let Some(class_id) = current_z_height else {
                    return Some(
                        "Z coordinate requires z_height_id but none provided".to_string(),
                    );
                };
                let Some(class) = self.z_heights.get(class_id) else {
                    return Some(format!("Unknown z_height_id: {}", class_id));
                };
                // 等级未声明数值时不约束
                class.z_coordinate?
            },
        };

        let tolerance = self.tolerance.axis(axis);
        if (actual - expected).abs() > tolerance {
            Some(format!(
                "{} coordinate mismatch: expected {}, got {} (tolerance: ±{})",
                axis.letter(),
                expected,
                actual,
                tolerance
            ))
        } else {
            None
        }
    }
}

fn validate_tolerance(tolerance: &CoordinateTolerance) -> Result<(), ConfigError> {
    for axis in CoordinateAxis::ALL {
        let value = tolerance.axis(axis);
        if !(value >= 0.0) || !value.is_finite() {
            return Err(ConfigError::InvalidTolerance {
                axis: axis.key(),
                value,
            });
        }
    }
    Ok(())
}

fn find_global_ready(positions: &[PositionDescriptor]) -> Result<usize, ConfigError> {
    let global: Vec<usize> = positions
        .iter()
        .enumerate()
        .filter(|(_, p)| p.position_type == PositionType::GlobalReady)
        .map(|(i, _)| i)
        .collect();

    match global.as_slice() {
        [] => Err(ConfigError::MissingGlobalReady),
        [single] => Ok(*single),
        many => Err(ConfigError::MultipleGlobalReady(
            many.iter()
                .map(|&i| positions[i].identifier.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )),
    }
}

fn parse_coordinates(position: &str, raw: &RawCoordinates) -> Result<MachineCoordinates, ConfigError> {
    Ok(MachineCoordinates {
        x: parse_coordinate(position, CoordinateAxis::X, raw.x.as_ref())?,
        y: parse_coordinate(position, CoordinateAxis::Y, raw.y.as_ref())?,
        z: parse_coordinate(position, CoordinateAxis::Z, raw.z.as_ref())?,
        v: parse_coordinate(position, CoordinateAxis::V, raw.v.as_ref())?,
    })
}

fn parse_coordinate(
    position: &str,
    axis: CoordinateAxis,
    raw: Option<&RawCoordinate>,
) -> Result<CoordinateValue, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidCoordinate {
        position: position.to_string(),
        axis: axis.key(),
        reason,
    };

    match raw {
        None => Ok(CoordinateValue::Unset),
        Some(RawCoordinate::Number(value)) if value.is_finite() => {
            Ok(CoordinateValue::Literal(*value))
        },
        Some(RawCoordinate::Number(value)) => Err(invalid(format!("non-finite value {}", value))),
        Some(RawCoordinate::Marker(marker)) if marker.starts_with(PLACEHOLDER_PREFIX) => {
            Ok(CoordinateValue::Unset)
        },
        Some(RawCoordinate::Marker(marker)) if marker == USE_Z_HEIGHT_POLICY => {
            if axis == CoordinateAxis::Z {
                Ok(CoordinateValue::DeriveFromZHeight)
            } else {
                Err(invalid(format!(
                    "'{}' is only valid for the z axis",
                    USE_Z_HEIGHT_POLICY
                )))
            }
        },
        Some(RawCoordinate::Marker(marker)) => {
            Err(invalid(format!("unrecognised marker '{}'", marker)))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "positions": [
                {
                    "id": "global_ready",
                    "type": "GLOBAL_READY",
                    "allowed_origins": ["MOLD_READY", "scale_ready"],
                    "allowed_destinations": ["MOLD_READY", "scale_ready"],
                    "coordinates": { "x": 150.0, "y": 150.0, "z": "USE_Z_HEIGHT_POLICY", "v": "PLACEHOLDER_V" }
                },
                {
                    "id": "mold_ready_A1",
                    "type": "MOLD_READY",
                    "allowed_origins": ["global_ready"],
                    "allowed_destinations": ["global_ready"],
                    "z_height_policy": { "allowed": ["mold_transfer_safe"] },
                    "requirements": { "active_tool_id": "manipulator" }
                },
                {
                    "id": "mold_ready_A2",
                    "type": "MOLD_READY",
                    "allowed_origins": ["global_ready"],
                    "allowed_destinations": ["global_ready"]
                },
                {
                    "id": "scale_ready",
                    "type": "SCALE_READY",
                    "allowed_origins": ["GLOBAL_READY"],
                    "allowed_destinations": ["GLOBAL_READY"],
                    "allows_tool_engagement": true,
                    "engagement": { "requirements": { "mold_on_scale": true }, "allowed_actions": ["dispense_powder"] }
                }
            ],
            "actions": [
                {
                    "id": "tamp",
                    "position_scope": ["SCALE_READY"],
                    "requirements": { "mold_on_scale": true },
                    "required_tool_id": "manipulator",
                    "blocked_when_engaged": true
                }
            ],
            "z_heights": {
                "mold_transfer_safe": { "z_coordinate": 215.0, "description": "clear of molds" }
            },
            "coordinate_tolerance": { "x": 0.5, "y": 0.5, "z": 1.0 }
        })
    }

    fn load(value: Value) -> Result<PositionRegistry, ConfigError> {
        PositionRegistry::from_json_str(&value.to_string())
    }

    #[test]
    fn test_type_references_expanded() {
        let registry = load(sample()).unwrap();
        let global = registry.get("global_ready").unwrap();
        let expected: BTreeSet<String> = ["mold_ready_A1", "mold_ready_A2", "scale_ready"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(global.allowed_destinations, expected);

        let tamp = registry.get_action("tamp").unwrap();
        assert_eq!(tamp.position_scope.len(), 1);
        assert!(tamp.position_scope.contains("scale_ready"));
    }

    #[test]
    fn test_lookup_helpers() {
        let registry = load(sample()).unwrap();
        assert!(registry.has("mold_ready_A2"));
        assert!(!registry.has("mold_ready_B1"));
        assert_eq!(registry.global_ready().identifier, "global_ready");
        assert_eq!(
            registry
                .find_first_of_type(PositionType::MoldReady)
                .map(|p| p.identifier.as_str()),
            Some("mold_ready_A1")
        );
        assert!(registry.find_first_of_type(PositionType::DispenserReady).is_none());
        assert!(matches!(
            registry.get("nowhere"),
            Err(ConfigError::UnknownPosition(_))
        ));
        assert!(matches!(
            registry.get_action("fly"),
            Err(ConfigError::UnknownAction(_))
        ));
        assert_eq!(registry.z_coordinate("mold_transfer_safe"), Some(215.0));
        // 未声明的轴使用默认容差
        assert_eq!(registry.coordinate_tolerance().v, 0.5);
        assert_eq!(registry.coordinate_tolerance().z, 1.0);
    }

    #[test]
    fn test_engagement_requirements_fall_back() {
        let registry = load(sample()).unwrap();
        let scale = registry.get("scale_ready").unwrap();
        assert_eq!(scale.engagement_requirements().len(), 1);
        assert!(scale.engagement.allowed_actions.contains("dispense_powder"));

        let mold = registry.get("mold_ready_A1").unwrap();
        assert!(mold.engagement.requirements.is_empty());
        assert_eq!(mold.engagement_requirements(), &mold.requirements);
    }

    #[test]
    fn test_duplicate_position_rejected() {
        let mut value = sample();
        let dup = value["positions"][1].clone();
        value["positions"].as_array_mut().unwrap().push(dup);
        assert!(matches!(load(value), Err(ConfigError::DuplicatePosition(id)) if id == "mold_ready_A1"));
    }

    #[test]
    fn test_duplicate_action_rejected() {
        let mut value = sample();
        let dup = value["actions"][0].clone();
        value["actions"].as_array_mut().unwrap().push(dup);
        assert!(matches!(load(value), Err(ConfigError::DuplicateAction(_))));
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let mut value = sample();
        value["positions"][1]["allowed_origins"] = json!(["global_redy"]);
        assert!(matches!(load(value), Err(ConfigError::UnknownReference { .. })));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut value = sample();
        value["positions"][2]["type"] = json!("WELL_READY");
        assert!(matches!(load(value), Err(ConfigError::UnknownPositionType(_))));
    }

    #[test]
    fn test_global_ready_cardinality() {
        let mut value = sample();
        value["positions"][0]["type"] = json!("MOLD_READY");
        assert!(matches!(load(value), Err(ConfigError::MissingGlobalReady)));

        let mut value = sample();
        value["positions"][2]["type"] = json!("GLOBAL_READY");
        assert!(matches!(load(value), Err(ConfigError::MultipleGlobalReady(_))));
    }

    #[test]
    fn test_invalid_coordinate_markers() {
        let mut value = sample();
        value["positions"][0]["coordinates"]["x"] = json!("USE_Z_HEIGHT_POLICY");
        assert!(matches!(load(value), Err(ConfigError::InvalidCoordinate { axis: 'x', .. })));

        let mut value = sample();
        value["positions"][0]["coordinates"]["y"] = json!("CALIBRATE_ME");
        assert!(matches!(load(value), Err(ConfigError::InvalidCoordinate { axis: 'y', .. })));
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let mut value = sample();
        value["coordinate_tolerance"]["v"] = json!(-0.1);
        assert!(matches!(load(value), Err(ConfigError::InvalidTolerance { axis: 'v', .. })));
    }

    #[test]
    fn test_coordinate_validation() {
        let registry = load(sample()).unwrap();
        let at = |x, y, z, v| ObservedCoordinates::new(x, y, z, v);

        // 在容差内；V 为占位符不校验
        assert!(registry
            .validate_physical_coordinates("global_ready", &at(150.4, 149.6, 215.0, 999.0), Some("mold_transfer_safe"))
            .is_none());

        let issue = registry
            .validate_physical_coordinates("global_ready", &at(151.0, 150.0, 215.0, 0.0), Some("mold_transfer_safe"))
            .unwrap();
        assert!(issue.starts_with("Position 'global_ready' validation failed: X coordinate mismatch"), "{}", issue);

        // z 由高度等级推导
        let issue = registry
            .validate_physical_coordinates("global_ready", &at(150.0, 150.0, 215.0, 0.0), None)
            .unwrap();
        assert!(issue.contains("requires z_height_id"), "{}", issue);

        let issue = registry
            .validate_physical_coordinates("global_ready", &at(150.0, 150.0, 215.0, 0.0), Some("dispenser_safe"))
            .unwrap();
        assert!(issue.contains("Unknown z_height_id: dispenser_safe"), "{}", issue);

        // 无坐标声明的位置直接通过
        assert!(registry
            .validate_physical_coordinates("mold_ready_A2", &at(0.0, 0.0, 0.0, 0.0), None)
            .is_none());
    }

    #[test]
    fn test_toml_registry() {
        let content = r#"
            [[positions]]
            id = "global_ready"
            type = "GLOBAL_READY"
            allowed_destinations = ["MOLD_READY"]

            [positions.coordinates]
            x = 10.0
            z = "USE_Z_HEIGHT_POLICY"

            [[positions]]
            id = "mold_ready_A1"
            type = "MOLD_READY"
            allowed_origins = ["GLOBAL_READY"]

            [z_heights.mold_transfer_safe]
            z_coordinate = 215.0
        "#;
        let registry = PositionRegistry::from_toml_str(content).unwrap();
        let global = registry.get("global_ready").unwrap();
        let coords = global.coordinates.unwrap();
        assert_eq!(coords.x, CoordinateValue::Literal(10.0));
        assert_eq!(coords.y, CoordinateValue::Unset);
        assert_eq!(coords.z, CoordinateValue::DeriveFromZHeight);
        assert!(global.allowed_destinations.contains("mold_ready_A1"));
    }

    #[test]
    fn test_from_path_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("registry.json");
        std::fs::write(&json_path, sample().to_string()).unwrap();
        assert!(PositionRegistry::from_path(&json_path).is_ok());

        let yaml_path = dir.path().join("registry.yaml");
        std::fs::write(&yaml_path, "positions: []").unwrap();
        assert!(matches!(
            PositionRegistry::from_path(&yaml_path),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "yaml"
        ));

        assert!(matches!(
            PositionRegistry::from_path(dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn literal_registry(x: f64, tolerance: f64) -> PositionRegistry {
            load(json!({
                "positions": [{
                    "id": "global_ready",
                    "type": "GLOBAL_READY",
                    "coordinates": { "x": x }
                }],
                "coordinate_tolerance": { "x": tolerance }
            }))
            .unwrap()
        }

        proptest! {
            #[test]
            fn within_tolerance_passes(
                x in -500.0f64..500.0,
                tolerance in 0.01f64..5.0,
                fraction in -1.0f64..=1.0,
            ) {
                let registry = literal_registry(x, tolerance);
                // 缩小一点避免浮点误差落到边界外
                let observed = x + fraction * tolerance * 0.999;
                let issue = registry.validate_physical_coordinates(
                    "global_ready",
                    &ObservedCoordinates::new(observed, 0.0, 0.0, 0.0),
                    None,
                );
                prop_assert!(issue.is_none(), "{:?}", issue);
            }

            #[test]
            fn outside_tolerance_fails(
                x in -500.0f64..500.0,
                tolerance in 0.01f64..5.0,
                excess in 0.01f64..10.0,
                negative in any::<bool>(),
            ) {
                let registry = literal_registry(x, tolerance);
                let delta = tolerance + excess;
                let observed = if negative { x - delta } else { x + delta };
                let issue = registry.validate_physical_coordinates(
                    "global_ready",
                    &ObservedCoordinates::new(observed, 0.0, 0.0, 0.0),
                    None,
                );
                prop_assert!(issue.is_some());
            }
        }

        #[test]
        fn exact_boundary_passes() {
            // 0.5 与 0.25 都可精确表示
            let registry = literal_registry(100.0, 0.5);
            for observed in [100.5, 99.5] {
                assert!(registry
                    .validate_physical_coordinates(
                        "global_ready",
                        &ObservedCoordinates::new(observed, 0.0, 0.0, 0.0),
                        None,
                    )
                    .is_none());
            }
            let registry = literal_registry(10.0, 0.25);
            assert!(registry
                .validate_physical_coordinates(
                    "global_ready",
                    &ObservedCoordinates::new(10.25, 0.0, 0.0, 0.0),
                    None,
                )
                .is_none());
        }
    }
}
