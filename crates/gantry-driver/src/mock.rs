//! 模拟硬件
//!
//! 用于测试和无硬件演示。[`MockMachine`] 解释收到的 G-code 并维护位置、
//! 回零与工具状态；[`MockScale`] 的读数与机器某一轴（默认 W）的行程挂钩，
//! 下粉轴前进多少，天平上就多出相应的重量。
//!
//! 两者都是 `Clone` 的共享句柄：测试代码保留一份，用来检查命令日志和注入故障。

use crate::axis::{Axis, HomedAxes, MachinePosition};
use crate::error::{DriverError, ScaleError};
use crate::gcode::GcodeCommand;
use crate::machine::MachineDriver;
use crate::mode::PositioningMode;
use crate::scale::Scale;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug)]
struct MockMachineState {
    connected: bool,
    mode: PositioningMode,
    position: BTreeMap<Axis, f64>,
    homed: BTreeMap<Axis, bool>,
    tool: Option<u32>,
    journal: Vec<String>,
    fail_patterns: Vec<String>,
}

impl Default for MockMachineState {
    fn default() -> Self {
        Self {
            connected: true,
            mode: PositioningMode::Absolute,
            position: Axis::ALL.iter().map(|a| (*a, 0.0)).collect(),
            homed: Axis::ALL.iter().map(|a| (*a, false)).collect(),
            tool: None,
            journal: Vec::new(),
            fail_patterns: Vec::new(),
        }
    }
}

impl MockMachineState {
    fn apply(&mut self, command: &GcodeCommand) {
        match command {
            GcodeCommand::SetPositioning(mode) => self.mode = *mode,
            GcodeCommand::LinearMove(target) => {
                for (axis, value) in target.axes() {
                    let slot = self.position.entry(*axis).or_insert(0.0);
                    if self.mode.is_relative() {
                        *slot += value;
                    } else {
                        *slot = *value;
                    }
                }
            },
            GcodeCommand::Home(axes) => {
                let axes: Vec<Axis> = if axes.is_empty() {
                    Axis::GANTRY.to_vec()
                } else {
                    axes.clone()
                };
                for axis in axes {
                    self.position.insert(axis, 0.0);
                    self.homed.insert(axis, true);
                }
            },
            GcodeCommand::Macro(file) => {
                let axis = file
                    .strip_prefix("home")
                    .and_then(|rest| rest.strip_suffix(".g"))
                    .filter(|name| name.len() == 1)
                    .and_then(|name| name.chars().next())
                    .and_then(Axis::from_letter);
                if let Some(axis) = axis {
                    self.position.insert(axis, 0.0);
                    self.homed.insert(axis, true);
                }
            },
            GcodeCommand::SelectTool(index) => self.tool = Some(*index),
            GcodeCommand::ParkTool => self.tool = None,
            GcodeCommand::Raw(_) => {},
        }
    }
}

/// 模拟运动控制器
///
/// 创建后即处于已连接状态，所有轴位于 0 且未回零。
#[derive(Debug, Clone, Default)]
pub struct MockMachine {
    state: Arc<Mutex<MockMachineState>>,
}

impl MockMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有龙门轴已回零的机器
    pub fn homed() -> Self {
        let machine = Self::new();
        {
            let mut state = machine.state.lock();
            for axis in Axis::ALL {
                state.homed.insert(axis, true);
            }
        }
        machine
    }

    /// 位于指定坐标的已回零机器
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        let machine = Self::homed();
        machine.set_position(Axis::X, x);
        machine.set_position(Axis::Y, y);
        machine.set_position(Axis::Z, z);
        machine
    }

    /// 已发送命令的文本形式
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    /// 直接改写某轴位置（模拟漂移或手动干预）
    pub fn set_position(&self, axis: Axis, value: f64) {
        self.state.lock().position.insert(axis, value);
    }

    pub fn set_homed(&self, axis: Axis, homed: bool) {
        self.state.lock().homed.insert(axis, homed);
    }

    pub fn position_of(&self, axis: Axis) -> f64 {
        self.state.lock().position.get(&axis).copied().unwrap_or(0.0)
    }

    pub fn mode(&self) -> PositioningMode {
        self.state.lock().mode
    }

    pub fn active_tool(&self) -> Option<u32> {
        self.state.lock().tool
    }

    /// 渲染文本包含 `pattern` 的命令将被拒绝
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.state.lock().fail_patterns.push(pattern.into());
    }

    pub fn clear_failures(&self) {
        self.state.lock().fail_patterns.clear();
    }
}

impl MachineDriver for MockMachine {
    fn connect(&mut self) -> Result<(), DriverError> {
        self.state.lock().connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        self.state.lock().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn send(&mut self, command: &GcodeCommand) -> Result<String, DriverError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(DriverError::NotConnected);
        }

        let line = command.to_string();
        if state.fail_patterns.iter().any(|p| line.contains(p.as_str())) {
            return Err(DriverError::CommandRejected {
                command: line,
                reason: "injected failure".to_string(),
            });
        }

        trace!("mock <- {}", line);
        state.apply(command);
        state.journal.push(line);
        Ok("ok".to_string())
    }

    fn position(&mut self) -> Result<MachinePosition, DriverError> {
        let state = self.state.lock();
        if !state.connected {
            return Err(DriverError::NotConnected);
        }
        let mut position = MachinePosition::new();
        for (axis, value) in &state.position {
            position.set(*axis, *value);
        }
        Ok(position)
    }

    /// 只上报龙门轴；V / W 由宏回零，控制器不报告其状态
    fn axes_homed(&mut self) -> Result<HomedAxes, DriverError> {
        let state = self.state.lock();
        if !state.connected {
            return Err(DriverError::NotConnected);
        }
        Ok(HomedAxes::new(
            Axis::GANTRY
                .iter()
                .map(|a| (*a, state.homed.get(a).copied().unwrap_or(false)))
                .collect(),
        ))
    }
}

// ==================== MockScale ====================

#[derive(Debug)]
struct MockScaleState {
    connected: bool,
    tare_offset: f64,
    grams_per_mm: f64,
    unstable_bias: f64,
    capacity: Option<f64>,
    pending_error: Option<ScaleError>,
    reads: u32,
}

/// 模拟天平
///
/// 读数 = (进给轴位置 - 去皮时位置) × `grams_per_mm`。
#[derive(Debug, Clone)]
pub struct MockScale {
    machine: MockMachine,
    feed_axis: Axis,
    state: Arc<Mutex<MockScaleState>>,
}

impl MockScale {
    /// 挂接到 `machine` 的 W 轴
    pub fn new(machine: &MockMachine, grams_per_mm: f64) -> Self {
        Self::with_axis(machine, Axis::W, grams_per_mm)
    }

    pub fn with_axis(machine: &MockMachine, feed_axis: Axis, grams_per_mm: f64) -> Self {
        Self {
            machine: machine.clone(),
            feed_axis,
            state: Arc::new(Mutex::new(MockScaleState {
                connected: true,
                tare_offset: machine.position_of(feed_axis),
                grams_per_mm,
                unstable_bias: 0.0,
                capacity: None,
                pending_error: None,
                reads: 0,
            })),
        }
    }

    /// 非稳定读数相对真实值的偏差比例（-1..1，负值表示读数滞后偏低）
    pub fn set_unstable_bias(&self, fraction: f64) {
        self.state.lock().unstable_bias = fraction.clamp(-1.0, 1.0);
    }

    /// 超过量程时返回 [`ScaleError::Overload`]
    pub fn set_capacity(&self, capacity: f64) {
        self.state.lock().capacity = Some(capacity);
    }

    /// 下一次读数返回指定错误
    pub fn fail_next(&self, error: ScaleError) {
        self.state.lock().pending_error = Some(error);
    }

    /// 累计读数次数
    pub fn reads(&self) -> u32 {
        self.state.lock().reads
    }

    /// 当前真实净重
    pub fn net_weight(&self) -> f64 {
        let state = self.state.lock();
        (self.machine.position_of(self.feed_axis) - state.tare_offset) * state.grams_per_mm
    }
}

impl Scale for MockScale {
    fn connect(&mut self) -> Result<(), ScaleError> {
        self.state.lock().connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), ScaleError> {
        self.state.lock().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn tare(&mut self) -> Result<(), ScaleError> {
        let position = self.machine.position_of(self.feed_axis);
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ScaleError::NotConnected);
        }
        state.tare_offset = position;
        Ok(())
    }

    fn weight(&mut self, stable: bool) -> Result<f64, ScaleError> {
        let net = self.net_weight();
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ScaleError::NotConnected);
        }
        state.reads += 1;
        if let Some(error) = state.pending_error.take() {
            return Err(error);
        }
        if let Some(capacity) = state.capacity {
            if net > capacity {
                return Err(ScaleError::Overload { reading: net });
            }
        }
        if stable {
            Ok(net)
        } else {
            Ok(net * (1.0 + state.unstable_bias))
        }
    }
}
