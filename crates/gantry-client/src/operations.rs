//! 高层操作
//!
//! 每个操作先做领域检查（孔板、模具、分配器），再走通用校验流程，
//! 执行成功后才修改上下文。

use crate::error::{ExecutionError, MotionError};
use crate::executor::axis_from_letter;
use crate::state_machine::{MotionStateMachine, reject};
use crate::types::{MotionTarget, MoveValidationResult, ToolStatus, payload};
use gantry_config::{
    ContextField, CoordinateValue, Expectation, FieldValue, PositionType, RequirementSet,
};
use gantry_driver::{Axis, MoveTarget};
use tracing::info;

/// 检查不通过时直接返回拒绝结果
macro_rules! guard {
    ($cond:expr, $($reason:tt)+) => {
        if $cond {
            return Ok(reject(format!($($reason)+)));
        }
    };
}

impl MotionStateMachine {
    // ==================== 内部辅助 ====================

    fn homing_z_height(&self) -> String {
        self.config().homing.z_height.clone()
    }

    /// 全局就绪点的机器坐标目标（z 取回零后的高度等级）
    fn global_ready_target(&self) -> MoveTarget {
        let mut target = MoveTarget::new();
        let Some(coordinates) = self.registry.global_ready().coordinates else {
            return target;
        };

        if let Some(x) = coordinates.x.literal() {
            target = target.axis(Axis::X, x);
        }
        if let Some(y) = coordinates.y.literal() {
            target = target.axis(Axis::Y, y);
        }
        let z = match coordinates.z {
            CoordinateValue::Literal(z) => Some(z),
            CoordinateValue::DeriveFromZHeight => {
                self.registry.z_coordinate(&self.config().homing.z_height)
            },
            CoordinateValue::Unset => None,
        };
        if let Some(z) = z {
            target = target.axis(Axis::Z, z);
        }
        if let (Some(v), Ok(axis)) = (
            coordinates.v.literal(),
            axis_from_letter(self.config().manipulator.tamper_axis),
        ) {
            target = target.axis(axis, v);
        }
        target
    }

    /// 回到全局就绪点与回零高度等级
    fn settle_at_global_ready(&mut self) {
        self.context.position_id = self.registry.global_ready().identifier.clone();
        self.context.z_height_id = Some(self.homing_z_height());
    }

    /// 当前携带模具的检查
    fn carried_mold_issue(&self) -> Option<String> {
        let Some(mold) = self.context.current_mold.as_deref() else {
            return Some("Not carrying a mold".to_string());
        };
        if self.context.carried_well().is_none() {
            return Some(format!("Carried mold {} is not on the deck", mold));
        }
        None
    }

    fn carried_has_piston(&self) -> bool {
        self.context
            .carried_well()
            .is_some_and(|well| well.has_top_piston)
    }

    // ==================== 回零 / 换刀 ====================

    /// 回零全部轴并移动到全局就绪点
    pub fn home_all(&mut self) -> Result<MoveValidationResult, MotionError> {
        let ready = self.global_ready_target();
        let result =
            self.validate_and_execute(MotionTarget::action("home_all"), None, move |exec| {
                exec.execute_home_all(ready)?;
                Ok(true)
            })?;
        if result.valid {
            self.settle_at_global_ready();
        }
        Ok(result)
    }

    pub fn home_xyz(&mut self) -> Result<MoveValidationResult, MotionError> {
        self.validate_and_execute(MotionTarget::action("home_xyz"), None, |exec| {
            exec.execute_home_xyz()?;
            Ok(true)
        })
    }

    pub fn home_manipulator(&mut self) -> Result<MoveValidationResult, MotionError> {
        self.validate_and_execute(MotionTarget::action("home_manipulator"), None, |exec| {
            exec.execute_home_manipulator()?;
            Ok(true)
        })
    }

    pub fn home_trickler(&mut self) -> Result<MoveValidationResult, MotionError> {
        self.validate_and_execute(MotionTarget::action("home_trickler"), None, |exec| {
            exec.execute_home_trickler()?;
            Ok(true)
        })
    }

    /// 取工具（仅支持机械手）
    pub fn pickup_tool(&mut self, tool_name: &str) -> Result<MoveValidationResult, MotionError> {
        let manipulator = self.config().manipulator.clone();
        guard!(
            tool_name != manipulator.tool_name,
            "Only manipulator tool is supported. Attempted to pick up: {}",
            tool_name
        );

        let ready = self.global_ready_target();
        let index = manipulator.tool_index;
        let result =
            self.validate_and_execute(MotionTarget::action("pickup_tool"), None, move |exec| {
                exec.execute_pickup_tool(index, ready)?;
                Ok(true)
            })?;
        if result.valid {
            self.context.active_tool_id = Some(tool_name.to_string());
            self.settle_at_global_ready();
            if !self.context.tool_states.contains_key(tool_name) {
                self.register_tool(ToolStatus::new(tool_name));
            }
        }
        Ok(result)
    }

    pub fn park_tool(&mut self) -> Result<MoveValidationResult, MotionError> {
        let ready = self.global_ready_target();
        let result =
            self.validate_and_execute(MotionTarget::action("park_tool"), None, move |exec| {
                exec.execute_park_tool(ready)?;
                Ok(true)
            })?;
        if result.valid {
            self.context.active_tool_id = None;
            self.settle_at_global_ready();
        }
        Ok(result)
    }

    // ==================== 模具 ====================

    /// 从孔位取模具；必须位于该孔位的就绪点
    pub fn pick_mold_from_well(&mut self, well_id: &str) -> Result<MoveValidationResult, MotionError> {
        guard!(
            self.context.current_mold.is_some(),
            "Manipulator already carrying a mold"
        );
        let Some(deck) = self.context.deck.as_ref() else {
            return Ok(reject("Deck not configured"));
        };
        let Some(well) = deck.get(well_id) else {
            return Ok(reject(format!("Well {} not found", well_id)));
        };
        guard!(!well.valid, "Mold is not valid");
        guard!(
            well.has_top_piston,
            "Cannot pick up mold that already has a top piston"
        );

        let extra = at_position(&well.ready_pos);
        let id = well.id.clone();
        let result = self.validate_and_execute(
            MotionTarget::action("pick_mold"),
            Some(&extra),
            |exec| {
                exec.execute_pick_mold_from_well(&id)?;
                Ok(true)
            },
        )?;
        if result.valid {
            self.context.current_mold = Some(id);
            self.context.mold_on_scale = false;
            self.context.payload_state = Some(payload::MOLD_WITHOUT_CAP.to_string());
        }
        Ok(result)
    }

    /// 把携带的模具放回它的孔位
    pub fn place_mold_in_well(&mut self, well_id: &str) -> Result<MoveValidationResult, MotionError> {
        let Some(carried) = self.context.current_mold.clone() else {
            return Ok(reject("Not carrying a mold"));
        };
        let Some(deck) = self.context.deck.as_ref() else {
            return Ok(reject("Deck not configured"));
        };
        let Some(well) = deck.get(well_id) else {
            return Ok(reject(format!("Well {} not found", well_id)));
        };
        guard!(
            well.id != carried,
            "Carried mold belongs to well {}, cannot place it in well {}",
            carried,
            well.id
        );

        let extra = at_position(&well.ready_pos);
        let (id, y) = (well.id.clone(), well.y);
        let result = self.validate_and_execute(
            MotionTarget::action("place_mold"),
            Some(&extra),
            |exec| {
                exec.execute_place_mold_in_well(&id, y)?;
                Ok(true)
            },
        )?;
        if result.valid {
            self.context.current_mold = None;
            self.context.mold_on_scale = false;
            self.context.payload_state = Some(payload::EMPTY.to_string());
        }
        Ok(result)
    }

    pub fn place_mold_on_scale(&mut self) -> Result<MoveValidationResult, MotionError> {
        guard!(self.context.scale.is_none(), "Scale not configured");
        if let Some(issue) = self.carried_mold_issue() {
            return Ok(reject(issue));
        }
        guard!(
            self.carried_has_piston(),
            "Cannot place mold with piston on scale"
        );
        guard!(self.context.mold_on_scale, "Mold is already on scale");

        let result =
            self.validate_and_execute(MotionTarget::action("place_mold_on_scale"), None, |exec| {
                exec.execute_place_mold_on_scale()?;
                Ok(true)
            })?;
        if result.valid {
            self.context.mold_on_scale = true;
        }
        Ok(result)
    }

    pub fn pick_mold_from_scale(&mut self) -> Result<MoveValidationResult, MotionError> {
        guard!(self.context.scale.is_none(), "Scale not configured");
        if let Some(issue) = self.carried_mold_issue() {
            return Ok(reject(issue));
        }
        guard!(!self.context.mold_on_scale, "Mold is not on scale");

        let result = self.validate_and_execute(
            MotionTarget::action("pick_mold_from_scale"),
            None,
            |exec| {
                exec.execute_pick_mold_from_scale()?;
                Ok(true)
            },
        )?;
        if result.valid {
            self.context.mold_on_scale = false;
        }
        Ok(result)
    }

    /// 压实称量台上的粉末
    pub fn tamp(&mut self) -> Result<MoveValidationResult, MotionError> {
        guard!(self.context.scale.is_none(), "Scale not configured");
        if let Some(issue) = self.carried_mold_issue() {
            return Ok(reject(issue));
        }
        guard!(!self.context.mold_on_scale, "Mold must be on scale to tamp");
        guard!(
            self.carried_has_piston(),
            "Cannot tamp mold that has a top piston"
        );

        self.validate_and_execute(MotionTarget::action("tamp"), None, |exec| {
            exec.execute_tamp()?;
            Ok(true)
        })
    }

    // ==================== 活塞 ====================

    /// 在当前分配器处为模具装顶部活塞
    pub fn place_top_piston(&mut self, dispenser_index: usize) -> Result<MoveValidationResult, MotionError> {
        self.install_piston(dispenser_index, "place_top_piston", false)
    }

    /// 从指定分配器取活塞装到模具上；必须位于该分配器就绪点
    pub fn retrieve_piston(&mut self, dispenser_index: usize) -> Result<MoveValidationResult, MotionError> {
        self.install_piston(dispenser_index, "retrieve_piston", true)
    }

    fn install_piston(
        &mut self,
        dispenser_index: usize,
        action_id: &str,
        require_ready_position: bool,
    ) -> Result<MoveValidationResult, MotionError> {
        let Some(dispenser) = self.context.dispenser(dispenser_index) else {
            return Ok(reject(format!("Dispenser {} not found", dispenser_index)));
        };
        guard!(
            !dispenser.has_pistons(),
            "No pistons available in dispenser {}",
            dispenser_index
        );
        let ready_id = dispenser.ready_position_id();
        let (x, y) = (dispenser.x, dispenser.y);

        guard!(
            require_ready_position && self.context.position_id != ready_id,
            "Must be at {} to retrieve piston from dispenser {}. Current position: {}",
            ready_id,
            dispenser_index,
            self.context.position_id
        );
        if let Some(issue) = self.carried_mold_issue() {
            return Ok(reject(issue));
        }
        guard!(self.carried_has_piston(), "Mold already has a top piston");
        guard!(
            self.context.mold_on_scale,
            "Cannot add top piston when mold is on scale"
        );

        let result = self.validate_and_execute(MotionTarget::action(action_id), None, |exec| {
            exec.execute_place_top_piston(dispenser_index, x, y)?;
            Ok(true)
        })?;
        if result.valid {
            if let Some(well) = self.context.carried_well_mut() {
                well.has_top_piston = true;
            }
            if let Some(dispenser) = self.context.dispenser_mut(dispenser_index) {
                dispenser
                    .remove_piston()
                    .map_err(|err| MotionError::InvariantViolation(err.to_string()))?;
            }
            self.context.payload_state = Some(payload::MOLD_WITH_CAP.to_string());
        }
        Ok(result)
    }

    // ==================== 平移 ====================

    pub fn move_to_well(&mut self, well_id: &str) -> Result<MoveValidationResult, MotionError> {
        let Some(deck) = self.context.deck.as_ref() else {
            return Ok(reject("Deck not configured"));
        };
        let Some(well) = deck.get(well_id) else {
            return Ok(reject(format!("Well {} not found", well_id)));
        };
        let target = well.ready_pos.clone();
        let (x, y) = (well.x, well.y);
        guard!(
            !self.registry.has(&target),
            "Well {} has no registered ready position '{}'",
            well_id,
            target
        );

        self.validate_and_execute(MotionTarget::Position(target), None, |exec| {
            exec.execute_move_to_well(x, y)?;
            Ok(true)
        })
    }

    pub fn move_to_scale(&mut self) -> Result<MoveValidationResult, MotionError> {
        guard!(self.context.scale.is_none(), "Scale not configured");
        let Some(scale_ready) = self.registry.find_first_of_type(PositionType::ScaleReady) else {
            return Ok(reject("No SCALE_READY position is registered"));
        };
        let target = scale_ready.identifier.clone();

        self.validate_and_execute(MotionTarget::Position(target), None, |exec| {
            exec.execute_move_to_scale()?;
            Ok(true)
        })
    }

    pub fn move_to_dispenser(&mut self, dispenser_index: usize) -> Result<MoveValidationResult, MotionError> {
        let Some(dispenser) = self.context.dispenser(dispenser_index) else {
            return Ok(reject(format!("Dispenser {} not found", dispenser_index)));
        };
        let target = dispenser.ready_position_id();
        let (x, y) = (dispenser.x, dispenser.y);

        self.validate_and_execute(MotionTarget::Position(target), None, |exec| {
            exec.execute_move_to_xy(x, y)?;
            Ok(true)
        })
    }

    // ==================== 下粉 ====================

    /// 向称量台上的模具下粉到目标重量，并记录到对应孔位
    pub fn dispense_powder(&mut self, target_weight: f64) -> Result<MoveValidationResult, MotionError> {
        guard!(
            !(target_weight > 0.0) || !target_weight.is_finite(),
            "Target weight must be a positive number, got {}",
            target_weight
        );
        let position = self.registry.get(&self.context.position_id)?;
        guard!(
            position.position_type != PositionType::ScaleReady,
            "Must be at SCALE_READY position to dispense. Current: {}",
            position.identifier
        );
        if let Some(issue) = self.carried_mold_issue() {
            return Ok(reject(issue));
        }
        guard!(!self.context.mold_on_scale, "Mold must be on scale to dispense");
        if let Some(well) = self.context.carried_well() {
            guard!(
                target_weight > well.max_weight,
                "Target weight {} g exceeds well {} maximum of {} g",
                target_weight,
                well.id,
                well.max_weight
            );
        }

        let mut report = None;
        let result =
            self.validate_and_execute(MotionTarget::action("dispense_powder"), None, |exec| {
                report = Some(exec.execute_dispense_powder(target_weight)?);
                Ok::<bool, ExecutionError>(true)
            })?;
        if !result.valid {
            return Ok(result);
        }

        let Some(report) = report else {
            return Err(MotionError::InvariantViolation(
                "Dispense reported success without a weight report.".to_string(),
            ));
        };
        if let Some(well) = self.context.carried_well_mut() {
            if let Err(err) = well.set_weight(report.final_weight) {
                return Ok(reject(err.to_string()));
            }
            well.target_weight = Some(target_weight);
            info!(
                "Well {} now holds {} g ({} iterations)",
                well.id, report.final_weight, report.iterations
            );
        }
        Ok(result)
    }
}

/// "必须位于某位置"的附加需求
fn at_position(position_id: &str) -> RequirementSet {
    RequirementSet::new().with(
        ContextField::PositionId,
        Expectation::Exactly(FieldValue::text(position_id)),
    )
}
