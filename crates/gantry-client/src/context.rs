//! 运动上下文
//!
//! 平台"逻辑上在哪里、拿着什么"的唯一可变记录。只有状态机在执行成功后修改它。

use crate::labware::{Deck, PistonDispenser, WeightWell};
use crate::types::{MoveRequest, ToolStatus};
use gantry_config::{ContextField, ContextSource, FieldValue, ScaleStation};
use serde_json::Value;
use std::collections::BTreeMap;

/// 运动上下文
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionContext {
    pub position_id: String,
    pub z_height_id: Option<String>,
    pub active_tool_id: Option<String>,
    pub payload_state: Option<String>,
    pub tool_pose: Option<String>,
    pub tool_states: BTreeMap<String, ToolStatus>,
    /// 非空当且仅当状态为 Moving
    pub pending_move: Option<MoveRequest>,
    pub engaged_ready_position_id: Option<String>,
    pub engaged_tool_id: Option<String>,
    pub metadata: BTreeMap<String, Value>,

    // ---- 上层扩展 ----
    pub deck: Option<Deck>,
    pub scale: Option<ScaleStation>,
    /// 当前携带的模具（孔位标识）
    pub current_mold: Option<String>,
    pub mold_on_scale: bool,
    pub piston_dispensers: Vec<PistonDispenser>,
}

impl MotionContext {
    /// 以 `position_id` 为起点的空上下文
    pub fn new(position_id: impl Into<String>) -> Self {
        Self {
            position_id: position_id.into(),
            ..Default::default()
        }
    }

    /// 按非空字段打补丁
    pub fn apply_patch(&mut self, patch: ContextPatch) {
        if let Some(tool) = patch.active_tool_id {
            self.active_tool_id = Some(tool);
        }
        if let Some(payload) = patch.payload_state {
            self.payload_state = Some(payload);
        }
        if let Some(pose) = patch.tool_pose {
            self.tool_pose = Some(pose);
        }
        if let Some(z_height) = patch.z_height_id {
            self.z_height_id = Some(z_height);
        }
    }

    /// 当前携带的模具
    pub fn carried_well(&self) -> Option<&WeightWell> {
        let id = self.current_mold.as_deref()?;
        self.deck.as_ref()?.get(id)
    }

    pub fn carried_well_mut(&mut self) -> Option<&mut WeightWell> {
        let id = self.current_mold.as_deref()?;
        self.deck.as_mut()?.get_mut(id)
    }

    pub fn dispenser(&self, index: usize) -> Option<&PistonDispenser> {
        self.piston_dispensers.iter().find(|d| d.index == index)
    }

    pub fn dispenser_mut(&mut self, index: usize) -> Option<&mut PistonDispenser> {
        self.piston_dispensers.iter_mut().find(|d| d.index == index)
    }
}

impl ContextSource for MotionContext {
    fn field_value(&self, field: ContextField) -> FieldValue {
        match field {
            ContextField::PositionId => FieldValue::text(self.position_id.clone()),
            ContextField::ZHeightId => FieldValue::from_option(self.z_height_id.as_deref()),
            ContextField::ActiveToolId => FieldValue::from_option(self.active_tool_id.as_deref()),
            ContextField::PayloadState => FieldValue::from_option(self.payload_state.as_deref()),
            ContextField::ToolPose => FieldValue::from_option(self.tool_pose.as_deref()),
            ContextField::EngagedToolId => {
                FieldValue::from_option(self.engaged_tool_id.as_deref())
            },
            ContextField::EngagedReadyPositionId => {
                FieldValue::from_option(self.engaged_ready_position_id.as_deref())
            },
            ContextField::CurrentMold => FieldValue::from_option(self.current_mold.as_deref()),
            ContextField::MoldOnScale => FieldValue::Flag(self.mold_on_scale),
        }
    }
}

/// 上下文补丁
///
/// `None` 字段表示"不修改"，而不是"清空"。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextPatch {
    pub active_tool_id: Option<String>,
    pub payload_state: Option<String>,
    pub tool_pose: Option<String>,
    pub z_height_id: Option<String>,
}

impl ContextPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_tool(mut self, tool_id: impl Into<String>) -> Self {
        self.active_tool_id = Some(tool_id.into());
        self
    }

    pub fn payload(mut self, payload_state: impl Into<String>) -> Self {
        self.payload_state = Some(payload_state.into());
        self
    }

    pub fn tool_pose(mut self, pose: impl Into<String>) -> Self {
        self.tool_pose = Some(pose.into());
        self
    }

    pub fn z_height(mut self, z_height_id: impl Into<String>) -> Self {
        self.z_height_id = Some(z_height_id.into());
        self
    }
}
