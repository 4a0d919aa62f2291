//! 工作流管理器
//!
//! 把高层操作串成完整流程：连接初始化、单孔下粉（取模具 → 称量 → 下粉 →
//! 装活塞 → 放回）。任何一步失败即停止，返回带步骤名的拒绝结果。

use crate::context::ContextPatch;
use crate::error::{ExecutionError, MotionError};
use crate::state_machine::{MotionStateMachine, reject};
use crate::types::{MoveValidationResult, payload};
use tracing::info;

/// 某一步失败时返回 `"{步骤}: {原因}"`
macro_rules! step {
    ($op:expr, $what:expr) => {{
        let result = $op;
        if !result.valid {
            return Ok(reject(format!("{}: {}", $what, result.reason())));
        }
    }};
}

/// 工作流管理器
#[derive(Debug)]
pub struct GantryManager {
    platform: MotionStateMachine,
    connected: bool,
}

impl GantryManager {
    pub fn new(platform: MotionStateMachine) -> Self {
        Self {
            platform,
            connected: false,
        }
    }

    pub fn platform(&self) -> &MotionStateMachine {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut MotionStateMachine {
        &mut self.platform
    }

    pub fn into_platform(self) -> MotionStateMachine {
        self.platform
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// 连接硬件并初始化
    ///
    /// 依次执行：重置逻辑状态、回零全部轴、取机械手、回零机械手轴。
    pub fn connect(&mut self) -> Result<MoveValidationResult, MotionError> {
        if let Err(err) = self.platform.executor_mut().connect() {
            return Ok(reject(format!("Connection failed: {}", err)));
        }
        self.platform.reset()?;
        self.platform
            .update_context(ContextPatch::new().payload(payload::EMPTY));

        let tool = self.platform.config().manipulator.tool_name.clone();
        step!(self.platform.home_all()?, "Failed to home all axes");
        step!(self.platform.pickup_tool(&tool)?, "Failed to pick up tool");
        step!(
            self.platform.home_manipulator()?,
            "Failed to home manipulator"
        );

        self.connected = true;
        info!("Gantry connected and initialized");
        Ok(MoveValidationResult::ok())
    }

    pub fn disconnect(&mut self) -> Result<(), ExecutionError> {
        self.platform.executor_mut().disconnect()?;
        self.connected = false;
        info!("Gantry disconnected");
        Ok(())
    }

    /// 当前稳定读数
    pub fn current_weight(&mut self) -> Result<f64, ExecutionError> {
        self.platform.executor_mut().current_weight(true)
    }

    /// 单孔完整流程
    ///
    /// # 参数
    /// - `well_id`: 孔位标识（如 `"A1"`）
    /// - `target_weight`: 目标粉末重量（g）
    ///
    /// # 返回
    /// 全部步骤成功时返回有效结果；否则返回首个失败步骤的原因。
    pub fn dispense_to_well(
        &mut self,
        well_id: &str,
        target_weight: f64,
    ) -> Result<MoveValidationResult, MotionError> {
        if !self.connected {
            return Ok(reject("Manager is not connected"));
        }
        let Some(well) = self.platform.well(well_id) else {
            return Ok(reject(format!("Well {} not found in deck.", well_id)));
        };
        if !well.valid {
            return Ok(reject("Well is not valid."));
        }
        if well.has_top_piston {
            return Ok(reject("Well already has a top piston. Cannot dispense."));
        }
        info!("Dispensing {} g into well {}", target_weight, well_id);

        let p = &mut self.platform;
        step!(p.move_to_well(well_id)?, "Failed to move to well");
        step!(p.pick_mold_from_well(well_id)?, "Failed to pick up mold");
        step!(p.move_to_scale()?, "Failed to move to scale");
        step!(p.place_mold_on_scale()?, "Failed to place mold on scale");
        step!(p.dispense_powder(target_weight)?, "Failed to dispense powder");
        step!(p.pick_mold_from_scale()?, "Failed to pick mold from scale");

        let Some(dispenser) = p.dispensers().iter().find(|d| d.has_pistons()) else {
            return Ok(reject("No dispenser with pistons found."));
        };
        let (index, ready_id) = (dispenser.index, dispenser.ready_position_id());
        if p.context().position_id != ready_id {
            step!(p.move_to_dispenser(index)?, "Failed to move to dispenser");
        }
        step!(p.retrieve_piston(index)?, "Failed to retrieve piston");
        step!(p.move_to_well(well_id)?, "Failed to move back to well");
        step!(p.place_mold_in_well(well_id)?, "Failed to place mold");

        info!("Well {} complete", well_id);
        Ok(MoveValidationResult::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::rig;
    use gantry_driver::Axis;

    #[test]
    fn test_connect_initializes_platform() {
        let rig = rig();
        let mut manager = GantryManager::new(rig.platform);
        assert_eq!(
            manager.dispense_to_well("A1", 1.0).unwrap().reason(),
            "Manager is not connected"
        );

        let result = manager.connect().unwrap();
        assert!(result.valid, "{}", result);
        assert!(manager.is_connected());

        let ctx = manager.platform().context();
        assert_eq!(ctx.active_tool_id.as_deref(), Some("manipulator"));
        assert_eq!(ctx.payload_state.as_deref(), Some(payload::EMPTY));
        assert_eq!(ctx.z_height_id.as_deref(), Some("mold_transfer_safe"));
        assert!(rig.machine.journal().iter().any(|l| l == "M98 P\"homev.g\""));
    }

    #[test]
    fn test_connect_stops_at_first_failure() {
        let rig = rig();
        rig.machine.fail_on("T0");
        let mut manager = GantryManager::new(rig.platform);

        let result = manager.connect().unwrap();
        assert!(result.reason().starts_with("Failed to pick up tool: Execution failed"), "{}", result);
        assert!(!manager.is_connected());
        assert!(!rig.machine.journal().iter().any(|l| l.contains("homev")));
    }

    #[test]
    fn test_full_dispense_workflow() {
        let rig = rig();
        let mut manager = GantryManager::new(rig.platform);
        assert!(manager.connect().unwrap().valid);

        let result = manager.dispense_to_well("A1", 2.5).unwrap();
        assert!(result.valid, "{}", result);

        let platform = manager.platform();
        let well = platform.well("A1").unwrap();
        assert!(well.has_top_piston);
        assert!(well.current_weight >= 2.5 * 0.99);
        assert!(platform.context().current_mold.is_none());
        assert_eq!(platform.context().position_id, "mold_ready_A1");
        assert_eq!(platform.dispensers()[0].num_pistons, 2);

        // 机器回到孔位就绪点
        assert_eq!(rig.machine.position_of(Axis::X), 30.0);
        assert_eq!(rig.machine.position_of(Axis::Y), 60.0);

        let again = manager.dispense_to_well("A1", 1.0).unwrap();
        assert_eq!(again.reason(), "Well already has a top piston. Cannot dispense.");
        assert_eq!(
            manager.dispense_to_well("B7", 1.0).unwrap().reason(),
            "Well B7 not found in deck."
        );
    }

    #[test]
    fn test_workflow_reports_failed_step() {
        let rig = rig();
        let mut manager = GantryManager::new(rig.platform);
        assert!(manager.connect().unwrap().valid);

        let result = manager.dispense_to_well("A2", 6.0).unwrap();
        assert_eq!(
            result.reason(),
            "Failed to dispense powder: Target weight 6 g exceeds well A2 maximum of 4 g"
        );
        // 模具仍在称量台上
        assert!(manager.platform().context().mold_on_scale);
    }

    #[test]
    fn test_disconnect_and_weight() {
        let rig = rig();
        let mut manager = GantryManager::new(rig.platform);
        assert!(manager.connect().unwrap().valid);
        assert_eq!(manager.current_weight().unwrap(), 0.0);

        manager.disconnect().unwrap();
        assert!(!manager.is_connected());
        assert!(manager.current_weight().is_err());
    }
}
