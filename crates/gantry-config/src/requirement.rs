//! # 上下文需求谓词
//!
//! 位置与动作的 `requirements` / `excludes` 映射在加载时被解析为
//! [`ContextField`] 到 [`Expectation`] 的类型化列表。未知字段名或类型不匹配的
//! 取值在加载阶段即报错，运行期只做类型化比较。

use crate::error::ConfigError;
use crate::position::format_options;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ==================== 上下文字段 ====================

/// 字段取值类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 可选文本（可为空）
    Text,
    /// 布尔标志
    Flag,
}

/// 可被需求映射引用的运动上下文字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextField {
    PositionId,
    ZHeightId,
    ActiveToolId,
    PayloadState,
    ToolPose,
    EngagedToolId,
    EngagedReadyPositionId,
    CurrentMold,
    MoldOnScale,
}

impl ContextField {
    pub const ALL: [ContextField; 9] = [
        ContextField::PositionId,
        ContextField::ZHeightId,
        ContextField::ActiveToolId,
        ContextField::PayloadState,
        ContextField::ToolPose,
        ContextField::EngagedToolId,
        ContextField::EngagedReadyPositionId,
        ContextField::CurrentMold,
        ContextField::MoldOnScale,
    ];

    /// 从配置键解析（`current_well` 作为 `current_mold` 的别名）
    pub fn from_key(key: &str) -> Option<Self> {
        if key == "current_well" {
            return Some(ContextField::CurrentMold);
        }
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    /// 配置键
    pub fn key(&self) -> &'static str {
        match self {
            ContextField::PositionId => "position_id",
            ContextField::ZHeightId => "z_height_id",
            ContextField::ActiveToolId => "active_tool_id",
            ContextField::PayloadState => "payload_state",
            ContextField::ToolPose => "tool_pose",
            ContextField::EngagedToolId => "engaged_tool_id",
            ContextField::EngagedReadyPositionId => "engaged_ready_position_id",
            ContextField::CurrentMold => "current_mold",
            ContextField::MoldOnScale => "mold_on_scale",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            ContextField::MoldOnScale => FieldKind::Flag,
            _ => FieldKind::Text,
        }
    }
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 上下文字段的取值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Absent,
    Text(String),
    Flag(bool),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// 从可选字符串构造
    pub fn from_option(value: Option<&str>) -> Self {
        match value {
            Some(v) => FieldValue::Text(v.to_string()),
            None => FieldValue::Absent,
        }
    }

    /// 不带引号的形式（用于选项列表）
    fn plain(&self) -> String {
        match self {
            FieldValue::Absent => "None".to_string(),
            FieldValue::Text(v) => v.clone(),
            FieldValue::Flag(v) => v.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Absent => f.write_str("None"),
            FieldValue::Text(v) => write!(f, "'{}'", v),
            FieldValue::Flag(v) => write!(f, "{}", v),
        }
    }
}

/// 读取上下文字段的接口
///
/// 运动上下文实现此 trait，需求集合通过它做类型化比较。
pub trait ContextSource {
    fn field_value(&self, field: ContextField) -> FieldValue;
}

// ==================== 期望值 ====================

/// 单个字段的期望
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// 必须等于
    Exactly(FieldValue),
    /// 必须属于集合
    OneOf(Vec<FieldValue>),
}

impl Expectation {
    pub fn matches(&self, actual: &FieldValue) -> bool {
        match self {
            Expectation::Exactly(expected) => expected == actual,
            Expectation::OneOf(options) => options.contains(actual),
        }
    }

    fn describe(&self) -> String {
        match self {
            Expectation::Exactly(expected) => expected.to_string(),
            Expectation::OneOf(options) => format_options(options.iter().map(FieldValue::plain)),
        }
    }
}

/// 类型化的需求（或排除）集合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequirementSet {
    entries: Vec<(ContextField, Expectation)>,
}

impl RequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加（或替换）一条期望
    pub fn with(mut self, field: ContextField, expectation: Expectation) -> Self {
        self.entries.retain(|(f, _)| *f != field);
        self.entries.push((field, expectation));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ContextField, Expectation)> {
        self.entries.iter()
    }

    /// 从原始配置映射解析
    ///
    /// # 错误
    /// - 未知字段名：[`ConfigError::UnknownContextField`]
    /// - 取值类型与字段不符：[`ConfigError::InvalidRequirementValue`]
    pub fn from_raw(owner: &str, raw: &BTreeMap<String, Value>) -> Result<Self, ConfigError> {
        let mut set = RequirementSet::new();
        for (key, value) in raw {
            let field =
                ContextField::from_key(key).ok_or_else(|| ConfigError::UnknownContextField {
                    owner: owner.to_string(),
                    field: key.clone(),
                })?;
            let expectation = parse_expectation(owner, field, value)?;
            set = set.with(field, expectation);
        }
        Ok(set)
    }

    /// 第一条未满足的需求
    pub fn first_unsatisfied<C: ContextSource + ?Sized>(&self, context: &C) -> Option<String> {
        self.entries.iter().find_map(|(field, expectation)| {
            let actual = context.field_value(*field);
            if expectation.matches(&actual) {
                None
            } else {
                Some(format!(
                    "Requirement '{}={}' not satisfied (current: {}).",
                    field,
                    expectation.describe(),
                    actual
                ))
            }
        })
    }

    /// 第一条被触发的排除条件
    pub fn first_violated_exclusion<C: ContextSource + ?Sized>(
        &self,
        context: &C,
    ) -> Option<String> {
        self.entries.iter().find_map(|(field, excluded)| {
            let actual = context.field_value(*field);
            if excluded.matches(&actual) {
                Some(format!(
                    "Exclusion violated: '{}' must not be {} (current: {}).",
                    field,
                    excluded.describe(),
                    actual
                ))
            } else {
                None
            }
        })
    }
}

fn parse_expectation(
    owner: &str,
    field: ContextField,
    value: &Value,
) -> Result<Expectation, ConfigError> {
    match value {
        Value::Array(items) => {
            let options = items
                .iter()
                .map(|item| parse_scalar(owner, field, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expectation::OneOf(options))
        },
        scalar => Ok(Expectation::Exactly(parse_scalar(owner, field, scalar)?)),
    }
}

fn parse_scalar(owner: &str, field: ContextField, value: &Value) -> Result<FieldValue, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidRequirementValue {
        owner: owner.to_string(),
        field: field.key().to_string(),
        reason: reason.to_string(),
    };

    match (field.kind(), value) {
        (FieldKind::Text, Value::String(s)) => Ok(FieldValue::Text(s.clone())),
        (FieldKind::Text, Value::Null) => Ok(FieldValue::Absent),
        (FieldKind::Text, _) => Err(invalid("expected a string or null")),
        (FieldKind::Flag, Value::Bool(b)) => Ok(FieldValue::Flag(*b)),
        (FieldKind::Flag, _) => Err(invalid("expected a boolean")),
    }
}
