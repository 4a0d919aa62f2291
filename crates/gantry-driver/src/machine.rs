//! 机器驱动抽象
//!
//! [`MachineDriver`] 只要求实现连接管理、单条命令发送与状态查询；
//! 定位模式切换、移动、回零、换刀等常用序列以默认方法提供。

use crate::axis::{Axis, HomedAxes, MachinePosition};
use crate::error::DriverError;
use crate::gcode::{GcodeCommand, MoveTarget};
use tracing::{debug, trace};

/// 运动控制器驱动
///
/// 实现方负责传输层（网络、串口或模拟）。所有方法都是阻塞的：
/// 返回 `Ok` 即表示控制器已接受该命令。
pub trait MachineDriver: Send {
    /// 建立连接（已连接时应为空操作）
    fn connect(&mut self) -> Result<(), DriverError>;

    /// 断开连接
    fn disconnect(&mut self) -> Result<(), DriverError>;

    fn is_connected(&self) -> bool;

    /// 发送单条命令，返回控制器应答
    fn send(&mut self, command: &GcodeCommand) -> Result<String, DriverError>;

    /// 读取当前各轴位置
    fn position(&mut self) -> Result<MachinePosition, DriverError>;

    /// 读取各轴回零状态
    fn axes_homed(&mut self) -> Result<HomedAxes, DriverError>;

    // ==================== 默认序列 ====================

    fn set_absolute_positioning(&mut self) -> Result<(), DriverError> {
        self.send(&GcodeCommand::absolute()).map(|_| ())
    }

    fn set_relative_positioning(&mut self) -> Result<(), DriverError> {
        self.send(&GcodeCommand::relative()).map(|_| ())
    }

    /// 按当前定位模式执行 G1（空目标不发送任何命令）
    fn move_axes(&mut self, target: MoveTarget) -> Result<(), DriverError> {
        if target.is_empty() {
            trace!("Skipping empty move");
            return Ok(());
        }
        self.send(&GcodeCommand::LinearMove(target)).map(|_| ())
    }

    /// 绝对移动：先切 G90 再执行 G1
    fn move_to(&mut self, target: MoveTarget) -> Result<(), DriverError> {
        if target.is_empty() {
            return Ok(());
        }
        self.set_absolute_positioning()?;
        self.move_axes(target)
    }

    /// G28（控制器默认回零轴）
    fn home_all(&mut self) -> Result<(), DriverError> {
        debug!("Homing all gantry axes");
        self.send(&GcodeCommand::Home(Vec::new())).map(|_| ())
    }

    /// 回零 X / Y / U
    fn home_xyu(&mut self) -> Result<(), DriverError> {
        self.send(&GcodeCommand::Home(vec![Axis::X, Axis::Y, Axis::U]))
            .map(|_| ())
    }

    fn home_z(&mut self) -> Result<(), DriverError> {
        self.send(&GcodeCommand::Home(vec![Axis::Z])).map(|_| ())
    }

    /// 通过回零宏回零单轴（`home{axis}.g`）
    fn home_axis_macro(&mut self, axis: Axis) -> Result<(), DriverError> {
        let file = format!("home{}.g", axis.letter().to_ascii_lowercase());
        self.send(&GcodeCommand::Macro(file)).map(|_| ())
    }

    fn pickup_tool(&mut self, index: u32) -> Result<(), DriverError> {
        self.send(&GcodeCommand::SelectTool(index)).map(|_| ())
    }

    fn park_tool(&mut self) -> Result<(), DriverError> {
        self.send(&GcodeCommand::ParkTool).map(|_| ())
    }

    /// 若当前 Z 低于 `safe_z`，抬升到 `safe_z`
    ///
    /// # 返回
    /// 是否发生了抬升
    fn safe_z_movement(&mut self, safe_z: f64, feedrate: u32) -> Result<bool, DriverError> {
        let current = self.position()?.get(Axis::Z);
        if current >= safe_z {
            return Ok(false);
        }
        debug!("Raising Z from {} to safe height {}", current, safe_z);
        self.move_to(MoveTarget::new().z(safe_z).feed(feedrate))?;
        Ok(true)
    }

    /// 发送原始 G-code 行
    fn send_raw(&mut self, line: &str) -> Result<String, DriverError> {
        let command = GcodeCommand::parse(line)?;
        self.send(&command)
    }
}

impl<T: MachineDriver + ?Sized> MachineDriver for Box<T> {
    fn connect(&mut self) -> Result<(), DriverError> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send(&mut self, command: &GcodeCommand) -> Result<String, DriverError> {
        (**self).send(command)
    }

    fn position(&mut self) -> Result<MachinePosition, DriverError> {
        (**self).position()
    }

    fn axes_homed(&mut self) -> Result<HomedAxes, DriverError> {
        (**self).axes_homed()
    }
}
