//! 定量下粉
//!
//! 两阶段策略：
//! 1. **粗加**：非稳定读数低于 `coarse_fraction × 目标` 时先振动，再按线性递减的步长
//!    （`max_step` → `min_step`）推进下粉轴，然后取稳定读数。
//! 2. **精加**：以固定的 `fine_step` 推进，立即取非稳定读数。
//!
//! 非稳定读数达到 `accept_fraction × 目标` 后暂停，取一次稳定读数确认；
//! 确认不足则继续精加。

use crate::error::ExecutionError;
use crate::executor::{MovementExecutor, axis_from_letter};
use gantry_config::DispenseSettings;
use gantry_driver::{Axis, MachineDriver, MoveTarget};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 下粉结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispenseReport {
    /// 最终稳定读数（g）
    pub final_weight: f64,
    /// 循环次数
    pub iterations: u32,
}

/// 粗加步长：重量越接近粗加阈值，步长越接近 `min_step`
pub fn coarse_step(settings: &DispenseSettings, weight: f64, coarse_threshold: f64) -> f64 {
    let progress = if coarse_threshold > 0.0 {
        (weight / coarse_threshold).clamp(0.0, 1.0)
    } else {
        1.0
    };
    settings.max_step - (settings.max_step - settings.min_step) * progress
}

/// 相对推进下粉轴，结束后恢复绝对定位
fn trickle(
    machine: &mut dyn MachineDriver,
    axis: Axis,
    step: f64,
    feed: u32,
) -> Result<(), ExecutionError> {
    machine.set_relative_positioning()?;
    let moved = machine.move_axes(MoveTarget::new().axis(axis, step).feed(feed));
    if moved.is_err() {
        warn!("Trickle move failed, restoring absolute positioning");
    }
    let restored = machine.set_absolute_positioning();
    moved?;
    restored?;
    Ok(())
}

impl MovementExecutor {
    /// 下粉到目标重量
    ///
    /// # 错误
    /// - 未配置天平：[`ExecutionError::ScaleNotConfigured`]
    /// - 天平 / 机器通信错误
    /// - 循环耗尽仍未确认：[`ExecutionError::DispenseIncomplete`]
    pub fn execute_dispense_powder(
        &mut self,
        target_weight: f64,
    ) -> Result<DispenseReport, ExecutionError> {
        let settings = self.config.dispense.clone();
        let axis = axis_from_letter(settings.trickler_axis)?;
        let Self { machine, scale, .. } = self;
        let scale = scale.as_mut().ok_or(ExecutionError::ScaleNotConfigured)?;

        let coarse_threshold = target_weight * settings.coarse_fraction;
        let accept_threshold = target_weight * settings.accept_fraction;

        let feed = settings.trickle_feedrate;

        info!("Dispensing to {} g", target_weight);
        scale.tare()?;
        let mut weight = scale.weight(false)?;

        for iteration in 1..=settings.max_iterations {
            if weight >= accept_threshold {
                if settings.settle_ms > 0 {
                    thread::sleep(Duration::from_millis(settings.settle_ms));
                }
                let stable = scale.weight(true)?;
                if stable >= accept_threshold {
                    info!(
                        "Dispense complete: {} g after {} iterations",
                        stable, iteration
                    );
                    return Ok(DispenseReport {
                        final_weight: stable,
                        iterations: iteration,
                    });
                }
                debug!("Stable reading {} g short of {} g, resuming", stable, accept_threshold);
                trickle(machine.as_mut(), axis, settings.fine_step, feed)?;
                weight = scale.weight(false)?;
            } else if weight < coarse_threshold {
                machine.send_raw(&settings.vibrate_command)?;
                let step = coarse_step(&settings, weight, coarse_threshold);
                debug!("Coarse step {} mm at {} g", step, weight);
                trickle(machine.as_mut(), axis, step, feed)?;
                weight = scale.weight(true)?;
            } else {
                trickle(machine.as_mut(), axis, settings.fine_step, feed)?;
                weight = scale.weight(false)?;
            }
        }

        warn!(
            "Dispense did not converge: {} g of {} g after {} iterations",
            weight, target_weight, settings.max_iterations
        );
        Err(ExecutionError::DispenseIncomplete {
            iterations: settings.max_iterations,
            weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_config::SystemConfig;
    use gantry_driver::mock::{MockMachine, MockScale};
    use gantry_driver::{Scale, ScaleError};

    fn executor(machine: &MockMachine, scale: &MockScale) -> MovementExecutor {
        MovementExecutor::new(
            Box::new(machine.clone()),
            Some(Box::new(scale.clone()) as Box<dyn Scale>),
            SystemConfig::default(),
        )
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// 步长始终落在 [min_step, max_step]，且随重量单调不增
            #[test]
            fn prop_coarse_step_bounded_and_monotonic(
                threshold in 0.1f64..50.0,
                a in 0.0f64..60.0,
                b in 0.0f64..60.0,
            ) {
                let settings = DispenseSettings::default();
                let (low, high) = if a <= b { (a, b) } else { (b, a) };
                let step_low = coarse_step(&settings, low, threshold);
                let step_high = coarse_step(&settings, high, threshold);

                prop_assert!(step_low <= settings.max_step + 1e-12);
                prop_assert!(step_high >= settings.min_step - 1e-12);
                prop_assert!(step_high <= step_low + 1e-12);
            }
        }
    }

    #[test]
    fn test_coarse_step_shrinks_linearly() {
        let settings = DispenseSettings::default();
        assert_eq!(coarse_step(&settings, 0.0, 9.0), settings.max_step);
        assert!((coarse_step(&settings, 4.5, 9.0) - 1.1).abs() < 1e-9);
        assert_eq!(coarse_step(&settings, 9.0, 9.0), settings.min_step);
        assert_eq!(coarse_step(&settings, 20.0, 9.0), settings.min_step);
    }

    #[test]
    fn test_dispense_reaches_target_without_overshoot() {
        let machine = MockMachine::homed();
        let scale = MockScale::new(&machine, 0.5);
        let mut exec = executor(&machine, &scale);

        let report = exec.execute_dispense_powder(5.0).unwrap();
        assert!(report.final_weight >= 5.0 * 0.99, "report: {:?}", report);
        assert!(report.final_weight <= 5.0, "report: {:?}", report);
        assert!(report.iterations < 200);

        // 粗加阶段发过振动宏
        assert!(machine.journal().iter().any(|l| l == "M98 P\"vibrate.g\""));
        // 最后回到绝对定位
        assert!(!machine.mode().is_relative());
    }

    /// 非稳定读数偏高时，确认读数不足会继续精加
    #[test]
    fn test_dispense_resumes_after_short_stable_reading() {
        let machine = MockMachine::homed();
        let scale = MockScale::new(&machine, 0.5);
        scale.set_unstable_bias(0.05);
        let mut exec = executor(&machine, &scale);

        let report = exec.execute_dispense_powder(2.0).unwrap();
        assert!(report.final_weight >= 2.0 * 0.99, "report: {:?}", report);
        assert!(scale.net_weight() >= 2.0 * 0.99);
    }

    #[test]
    fn test_dispense_gives_up_after_max_iterations() {
        let machine = MockMachine::homed();
        let scale = MockScale::new(&machine, 0.5);
        let mut exec = executor(&machine, &scale);
        exec.config.dispense.max_iterations = 3;

        let err = exec.execute_dispense_powder(50.0).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::DispenseIncomplete { iterations: 3, .. }
        ));
    }

    #[test]
    fn test_dispense_surfaces_scale_errors() {
        let machine = MockMachine::homed();
        let scale = MockScale::new(&machine, 0.5);
        scale.set_capacity(2.0);
        let mut exec = executor(&machine, &scale);

        let err = exec.execute_dispense_powder(5.0).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Scale(ScaleError::Overload { .. })
        ));
    }

    /// 推进失败时仍恢复绝对定位
    #[test]
    fn test_failed_trickle_restores_absolute_positioning() {
        let machine = MockMachine::homed();
        let scale = MockScale::new(&machine, 0.5);
        machine.fail_on("G1 W");
        let mut exec = executor(&machine, &scale);

        let err = exec.execute_dispense_powder(5.0).unwrap_err();
        assert!(matches!(err, ExecutionError::Driver(_)), "{}", err);
        assert!(!machine.mode().is_relative());
        assert_eq!(machine.journal().last().map(String::as_str), Some("G90"));
    }

    #[test]
    fn test_dispense_requires_scale() {
        let machine = MockMachine::homed();
        let mut exec =
            MovementExecutor::new(Box::new(machine.clone()), None, SystemConfig::default());
        assert!(matches!(
            exec.execute_dispense_powder(1.0),
            Err(ExecutionError::ScaleNotConfigured)
        ));
    }
}
