//! 请求与结果类型

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// 载荷状态标签
pub mod payload {
    pub const EMPTY: &str = "empty";
    pub const MOLD_WITHOUT_CAP: &str = "mold_without_cap";
    pub const MOLD_WITH_CAP: &str = "mold_with_cap";
}

/// 移动请求
///
/// `action` 非空时按动作处理，`target_position_id` 被忽略。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveRequest {
    pub target_position_id: String,
    pub action: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl MoveRequest {
    pub fn to(target_position_id: impl Into<String>) -> Self {
        Self {
            target_position_id: target_position_id.into(),
            ..Default::default()
        }
    }

    pub fn action(action_id: impl Into<String>) -> Self {
        Self {
            action: Some(action_id.into()),
            ..Default::default()
        }
    }
}

/// 校验 / 执行结果
///
/// 所有"当前不允许"的结果都通过此类型返回，而不是 `Err`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveValidationResult {
    pub valid: bool,
    pub reason: Option<String>,
    /// 目标即当前位置，未发生状态转换
    pub in_place: bool,
}

impl MoveValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
            in_place: false,
        }
    }

    /// 有效但无需运动（工具接合时"移动"到当前就绪点）
    pub fn in_place() -> Self {
        Self {
            in_place: true,
            ..Self::ok()
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            in_place: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_in_place(&self) -> bool {
        self.in_place
    }

    /// 失败原因（成功时为空串）
    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}

impl fmt::Display for MoveValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            _ if self.valid => write!(f, "valid"),
            Some(reason) => write!(f, "invalid: {}", reason),
            None => write!(f, "invalid"),
        }
    }
}

/// 单个工具的状态记录
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolStatus {
    pub tool_id: String,
    pub engaged: bool,
    pub ready_position_id: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl ToolStatus {
    pub fn new(tool_id: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            ..Default::default()
        }
    }

    pub fn with_ready_position(mut self, position_id: impl Into<String>) -> Self {
        self.ready_position_id = Some(position_id.into());
        self
    }
}

/// 通用校验流程的目标：移动或动作，二者恰有其一
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotionTarget {
    /// 移动到指定位置
    Position(String),
    /// 执行指定动作
    Action(String),
}

impl MotionTarget {
    pub fn position(id: impl Into<String>) -> Self {
        Self::Position(id.into())
    }

    pub fn action(id: impl Into<String>) -> Self {
        Self::Action(id.into())
    }
}

impl From<&MoveRequest> for MotionTarget {
    fn from(request: &MoveRequest) -> Self {
        match &request.action {
            Some(action) => MotionTarget::Action(action.clone()),
            None => MotionTarget::Position(request.target_position_id.clone()),
        }
    }
}
