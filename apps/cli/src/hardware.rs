//! 模拟硬件
//!
//! CLI 不连接真实控制器：脚本与检查都跑在内存中的模拟机器与天平上。

use anyhow::Result;
use gantry_sdk::driver::mock::{MockMachine, MockScale};
use gantry_sdk::{MotionStateMachine, PositionRegistry, Scale, SystemConfig};

/// 模拟天平默认灵敏度（g/mm）
pub const DEFAULT_GRAMS_PER_MM: f64 = 0.5;

/// 在模拟机器与天平上构造平台（未回零、无工具）
pub fn mock_platform(
    registry: PositionRegistry,
    system: SystemConfig,
    grams_per_mm: f64,
) -> Result<MotionStateMachine> {
    let machine = MockMachine::new();
    let scale = MockScale::new(&machine, grams_per_mm);
    let platform = MotionStateMachine::new(
        registry,
        system,
        Box::new(machine),
        Some(Box::new(scale) as Box<dyn Scale>),
    )?;
    Ok(platform)
}
