//! 运动执行器
//!
//! 把已通过校验的移动/动作翻译成有序的底层命令序列。执行器不做任何策略判断：
//! 调用任何 `execute_*` 方法即意味着校验已经通过。硬件错误原样向上返回，
//! 由状态机负责回退。

use crate::error::ExecutionError;
use gantry_config::{ObservedCoordinates, SystemConfig};
use gantry_driver::{Axis, DriverError, HomedAxes, MachineDriver, MoveTarget, Scale};
use tracing::{debug, info};

/// 运动执行器
pub struct MovementExecutor {
    pub(crate) machine: Box<dyn MachineDriver>,
    pub(crate) scale: Option<Box<dyn Scale>>,
    pub(crate) config: SystemConfig,
}

impl std::fmt::Debug for MovementExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovementExecutor")
            .field("machine_connected", &self.machine.is_connected())
            .field("has_scale", &self.scale.is_some())
            .finish()
    }
}

/// 轴字母 → 轴
pub(crate) fn axis_from_letter(letter: char) -> Result<Axis, ExecutionError> {
    Axis::from_letter(letter).ok_or_else(|| {
        ExecutionError::Driver(DriverError::InvalidCommand(format!(
            "unknown axis '{}'",
            letter
        )))
    })
}

impl MovementExecutor {
    pub fn new(
        machine: Box<dyn MachineDriver>,
        scale: Option<Box<dyn Scale>>,
        config: SystemConfig,
    ) -> Self {
        Self {
            machine,
            scale,
            config,
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn has_scale(&self) -> bool {
        self.scale.is_some()
    }

    /// 连接机器与天平
    pub fn connect(&mut self) -> Result<(), ExecutionError> {
        self.machine.connect()?;
        if let Some(scale) = self.scale.as_mut() {
            scale.connect()?;
        }
        info!("Hardware connected");
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), ExecutionError> {
        if let Some(scale) = self.scale.as_mut() {
            scale.disconnect()?;
        }
        self.machine.disconnect()?;
        info!("Hardware disconnected");
        Ok(())
    }

    // ==================== 只读查询 ====================

    /// 机器实时坐标（X/Y/Z + 机械手轴）
    pub fn position(&mut self) -> Result<ObservedCoordinates, ExecutionError> {
        let tamper = axis_from_letter(self.config.manipulator.tamper_axis)?;
        let pos = self.machine.position()?;
        Ok(ObservedCoordinates::new(
            pos.get(Axis::X),
            pos.get(Axis::Y),
            pos.get(Axis::Z),
            pos.get(tamper),
        ))
    }

    pub fn axes_homed(&mut self) -> Result<HomedAxes, ExecutionError> {
        Ok(self.machine.axes_homed()?)
    }

    /// 当前天平读数
    pub fn current_weight(&mut self, stable: bool) -> Result<f64, ExecutionError> {
        let scale = self.scale.as_mut().ok_or(ExecutionError::ScaleNotConfigured)?;
        Ok(scale.weight(stable)?)
    }

    // ==================== 内部辅助 ====================

    fn travel_feed(&self) -> u32 {
        self.config.machine.travel_feedrate
    }

    fn manipulator_feed(&self) -> u32 {
        self.config.machine.manipulator_feedrate
    }

    fn tamper_axis(&self) -> Result<Axis, ExecutionError> {
        axis_from_letter(self.config.manipulator.tamper_axis)
    }

    /// 以机械手进给速度绝对移动机械手轴
    fn move_tamper_to(&mut self, value: f64) -> Result<(), ExecutionError> {
        let axis = self.tamper_axis()?;
        let feed = self.manipulator_feed();
        self.machine
            .move_to(MoveTarget::new().axis(axis, value).feed(feed))?;
        Ok(())
    }

    /// 按当前定位模式移动（XYZ 进给速度）
    fn travel(&mut self, target: MoveTarget) -> Result<(), ExecutionError> {
        let feed = self.travel_feed();
        self.machine.move_axes(target.feed(feed))?;
        Ok(())
    }

    fn raise_to_safe_z(&mut self) -> Result<(), ExecutionError> {
        let safe_z = self.config.safety.travel_z();
        let feed = self.travel_feed();
        self.machine.safe_z_movement(safe_z, feed)?;
        Ok(())
    }

    fn travel_position(&self) -> f64 {
        self.config.manipulator.tamper_travel_pos
    }

    // ==================== 回零 / 换刀 ====================

    /// G28 后移动到 `ready`（全局就绪点）
    pub fn execute_home_all(&mut self, ready: MoveTarget) -> Result<(), ExecutionError> {
        self.machine.home_all()?;
        let feed = self.config.machine.default_feedrate;
        self.machine.move_to(ready.feed(feed))?;
        Ok(())
    }

    pub fn execute_home_xyz(&mut self) -> Result<(), ExecutionError> {
        self.machine.home_xyu()?;
        self.machine.home_z()?;
        Ok(())
    }

    pub fn execute_home_manipulator(&mut self) -> Result<(), ExecutionError> {
        let axis = self.tamper_axis()?;
        self.machine.home_axis_macro(axis)?;
        info!("Manipulator ({}) homing complete", axis);
        Ok(())
    }

    pub fn execute_home_trickler(&mut self) -> Result<(), ExecutionError> {
        let axis = axis_from_letter(self.config.dispense.trickler_axis)?;
        self.machine.home_axis_macro(axis)?;
        info!("Trickler ({}) homing complete", axis);
        Ok(())
    }

    /// 换刀前抬升到安全高度，取刀后回到 `ready`
    pub fn execute_pickup_tool(&mut self, index: u32, ready: MoveTarget) -> Result<(), ExecutionError> {
        self.raise_to_safe_z()?;
        self.machine.pickup_tool(index)?;
        let feed = self.config.machine.default_feedrate;
        self.machine.move_to(ready.feed(feed))?;
        Ok(())
    }

    pub fn execute_park_tool(&mut self, ready: MoveTarget) -> Result<(), ExecutionError> {
        self.raise_to_safe_z()?;
        self.machine.park_tool()?;
        let feed = self.config.machine.default_feedrate;
        self.machine.move_to(ready.feed(feed))?;
        Ok(())
    }

    // ==================== 模具操作 ====================

    /// 从孔位取模具
    ///
    /// 前提：工具头位于孔位上方安全高度，机械手处于行进位。
    pub fn execute_pick_mold_from_well(&mut self, well_id: &str) -> Result<(), ExecutionError> {
        info!("Picking up mold: {}", well_id);
        let m = self.config.manipulator.clone();

        self.machine.set_absolute_positioning()?;
        self.travel(MoveTarget::new().z(m.well_approach_z))?;
        self.machine.set_relative_positioning()?;
        // 移到模具侧面
        self.travel(MoveTarget::new().y(-m.mold_side_offset))?;
        self.move_tamper_to(m.mold_release_v)?;
        self.machine.set_relative_positioning()?;
        // 回到模具下方
        self.travel(MoveTarget::new().y(m.mold_side_offset))?;
        self.move_tamper_to(self.travel_position())?;
        self.raise_to_safe_z()
    }

    /// 把模具放回孔位，并回到孔位就绪点的 Y
    pub fn execute_place_mold_in_well(
        &mut self,
        well_id: &str,
        well_y: f64,
    ) -> Result<(), ExecutionError> {
        info!("Placing mold: {}", well_id);
        let m = self.config.manipulator.clone();

        self.machine.set_absolute_positioning()?;
        self.travel(MoveTarget::new().z(m.well_approach_z))?;
        self.move_tamper_to(m.mold_release_v)?;
        self.machine.set_relative_positioning()?;
        self.travel(MoveTarget::new().y(-m.mold_side_offset))?;
        self.move_tamper_to(self.travel_position())?;
        self.raise_to_safe_z()?;
        let feed = self.travel_feed();
        self.machine.move_to(MoveTarget::new().y(well_y).feed(feed))?;
        Ok(())
    }

    /// 前提：已位于称量台就绪点
    pub fn execute_place_mold_on_scale(&mut self) -> Result<(), ExecutionError> {
        if self.scale.is_none() {
            return Err(ExecutionError::ScaleNotConfigured);
        }
        info!("Placing mold on scale");
        let m = self.config.manipulator.clone();
        let feed = self.travel_feed();

        self.machine.set_absolute_positioning()?;
        self.machine
            .move_to(MoveTarget::new().z(m.scale_approach_z).feed(feed))?;
        // 让模具能伸进下粉口
        self.move_tamper_to(m.scale_clearance_v)?;
        self.travel(MoveTarget::new().y(m.scale_reach_y))?;
        self.move_tamper_to(m.scale_place_v)
    }

    pub fn execute_pick_mold_from_scale(&mut self) -> Result<(), ExecutionError> {
        let station = self
            .config
            .scale
            .ok_or(ExecutionError::ScaleNotConfigured)?;
        if self.scale.is_none() {
            return Err(ExecutionError::ScaleNotConfigured);
        }
        info!("Picking mold from scale");
        let m = self.config.manipulator.clone();

        self.machine.set_absolute_positioning()?;
        self.move_tamper_to(m.scale_clearance_v)?;
        self.travel(MoveTarget::new().y(station.y))?;
        self.raise_to_safe_z()?;
        self.move_tamper_to(self.travel_position())
    }

    /// 在分配器处为当前模具装顶部活塞，结束时回到分配器就绪点
    pub fn execute_place_top_piston(
        &mut self,
        dispenser_index: usize,
        dispenser_x: f64,
        dispenser_y: f64,
    ) -> Result<(), ExecutionError> {
        info!("Placing top piston from dispenser {}", dispenser_index);
        let m = self.config.manipulator.clone();

        self.machine.set_absolute_positioning()?;
        // 模具完全放低
        self.move_tamper_to(m.piston_lower_v)?;
        self.travel(MoveTarget::new().z(m.piston_clearance_z))?;
        self.machine.set_relative_positioning()?;
        self.travel(MoveTarget::new().y(m.piston_reach_y))?;
        self.move_tamper_to(m.piston_grip_v)?;
        self.travel(MoveTarget::new().x(dispenser_x).y(dispenser_y))?;
        self.move_tamper_to(self.travel_position())
    }

    /// 压实：V 轴向下直到堵转检测停止运动
    pub fn execute_tamp(&mut self) -> Result<(), ExecutionError> {
        let station = self
            .config
            .scale
            .ok_or(ExecutionError::ScaleNotConfigured)?;
        if self.scale.is_none() {
            return Err(ExecutionError::ScaleNotConfigured);
        }
        info!("Executing tamp");
        let m = self.config.manipulator.clone();
        let axis = self.tamper_axis()?;
        let slow = self.manipulator_feed();

        self.machine.set_absolute_positioning()?;
        self.move_tamper_to(m.scale_clearance_v)?;
        self.machine
            .move_axes(MoveTarget::new().y(station.y).feed(slow))?;
        self.machine
            .move_to(MoveTarget::new().axis(axis, m.tamp_v).feed(slow))?;
        Ok(())
    }

    // ==================== 平移 ====================

    pub fn execute_move_to_well(&mut self, x: f64, y: f64) -> Result<(), ExecutionError> {
        debug!("Moving to well at ({}, {})", x, y);
        self.raise_to_safe_z()?;
        self.execute_move_to_xy(x, y)
    }

    pub fn execute_move_to_scale(&mut self) -> Result<(), ExecutionError> {
        let station = self
            .config
            .scale
            .ok_or(ExecutionError::ScaleNotConfigured)?;
        self.raise_to_safe_z()?;
        self.execute_move_to_xy(station.x, station.y)
    }

    pub fn execute_move_to_xy(&mut self, x: f64, y: f64) -> Result<(), ExecutionError> {
        let feed = self.travel_feed();
        self.machine.move_to(MoveTarget::new().x(x).y(y).feed(feed))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_config::ScaleStation;
    use gantry_driver::mock::{MockMachine, MockScale};

    fn executor(machine: &MockMachine, with_scale: bool) -> MovementExecutor {
        let mut config = SystemConfig::default();
        config.scale = Some(ScaleStation { x: 250.0, y: 40.0 });
        let scale: Option<Box<dyn Scale>> = if with_scale {
            Some(Box::new(MockScale::new(machine, 0.5)))
        } else {
            None
        };
        MovementExecutor::new(Box::new(machine.clone()), scale, config)
    }

    #[test]
    fn test_pick_mold_sequence() {
        let machine = MockMachine::at(100.0, 60.0, 215.0);
        let mut exec = executor(&machine, true);
        exec.execute_pick_mold_from_well("A1").unwrap();

        assert_eq!(
            machine.journal(),
            vec![
                "G90",
                "G1 Z148 F500",
                "G91",
                "G1 Y-25.5 F500",
                "G90",
                "G1 V50 F50",
                "G91",
                "G1 Y25.5 F500",
                "G90",
                "G1 V30 F50",
                "G90",
                "G1 Z215 F500",
            ]
        );
        assert_eq!(machine.position_of(Axis::Y), 60.0);
        assert_eq!(machine.position_of(Axis::V), 30.0);
    }

    #[test]
    fn test_place_mold_returns_to_ready_y() {
        let machine = MockMachine::at(100.0, 60.0, 215.0);
        let mut exec = executor(&machine, true);
        exec.execute_place_mold_in_well("A1", 60.0).unwrap();

        assert_eq!(machine.position_of(Axis::Y), 60.0);
        assert_eq!(machine.position_of(Axis::Z), 215.0);
        assert_eq!(machine.position_of(Axis::V), 30.0);
        assert!(machine.journal().contains(&"G1 Y-25.5 F500".to_string()));
    }

    #[test]
    fn test_scale_operations_require_scale() {
        let machine = MockMachine::homed();
        let mut exec = executor(&machine, false);
        assert!(matches!(
            exec.execute_place_mold_on_scale(),
            Err(ExecutionError::ScaleNotConfigured)
        ));
        assert!(matches!(
            exec.execute_tamp(),
            Err(ExecutionError::ScaleNotConfigured)
        ));
        assert!(machine.journal().is_empty());
    }

    #[test]
    fn test_place_and_pick_from_scale() {
        let machine = MockMachine::at(250.0, 40.0, 215.0);
        let mut exec = executor(&machine, true);

        exec.execute_place_mold_on_scale().unwrap();
        assert_eq!(machine.position_of(Axis::Y), 184.0);
        assert_eq!(machine.position_of(Axis::Z), 134.0);
        assert_eq!(machine.position_of(Axis::V), 45.0);

        exec.execute_pick_mold_from_scale().unwrap();
        assert_eq!(machine.position_of(Axis::Y), 40.0);
        assert_eq!(machine.position_of(Axis::Z), 215.0);
        assert_eq!(machine.position_of(Axis::V), 30.0);
    }

    #[test]
    fn test_place_top_piston_returns_to_dispenser() {
        let machine = MockMachine::at(320.0, 337.0, 215.0);
        let mut exec = executor(&machine, true);
        exec.execute_place_top_piston(0, 320.0, 337.0).unwrap();

        assert_eq!(machine.position_of(Axis::X), 320.0);
        assert_eq!(machine.position_of(Axis::Y), 337.0);
        assert_eq!(machine.position_of(Axis::Z), 189.0);
        assert_eq!(machine.position_of(Axis::V), 30.0);
    }

    #[test]
    fn test_move_to_well_raises_first() {
        let machine = MockMachine::at(0.0, 0.0, 100.0);
        let mut exec = executor(&machine, false);
        exec.execute_move_to_well(30.0, 60.0).unwrap();
        assert_eq!(
            machine.journal(),
            vec!["G90", "G1 Z215 F500", "G90", "G1 X30 Y60 F500"]
        );
    }

    #[test]
    fn test_home_all_moves_to_ready() {
        let machine = MockMachine::new();
        let mut exec = executor(&machine, false);
        exec.execute_home_all(MoveTarget::new().x(10.0).y(20.0).z(215.0))
            .unwrap();
        assert!(exec.axes_homed().unwrap().all_homed());
        assert_eq!(
            machine.journal(),
            vec!["G28", "G90", "G1 X10 Y20 Z215 F3000"]
        );
    }

    #[test]
    fn test_position_reports_tamper_axis() {
        let machine = MockMachine::at(1.0, 2.0, 3.0);
        machine.set_position(Axis::V, 4.0);
        let mut exec = executor(&machine, false);
        assert_eq!(
            exec.position().unwrap(),
            ObservedCoordinates::new(1.0, 2.0, 3.0, 4.0)
        );
    }

    #[test]
    fn test_driver_failure_surfaces() {
        let machine = MockMachine::homed();
        machine.fail_on("T0");
        let mut exec = executor(&machine, false);
        let err = exec
            .execute_pickup_tool(0, MoveTarget::new().x(1.0))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Driver(_)));
    }
}
