//! 跨线程共享的运动平台句柄
//!
//! 状态机本身是单线程对象。多个调用方共享同一平台时，通过本句柄串行化访问：
//! [`SharedMotionPlatform::try_with`] 在平台忙时立即返回"正在执行"的拒绝结果，
//! 不排队、不阻塞。

use crate::error::MotionError;
use crate::state::MotionState;
use crate::state_machine::{ALREADY_EXECUTING, MotionStateMachine};
use crate::types::MoveValidationResult;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// 共享运动平台
#[derive(Debug, Clone)]
pub struct SharedMotionPlatform {
    inner: Arc<Mutex<MotionStateMachine>>,
}

impl SharedMotionPlatform {
    pub fn new(platform: MotionStateMachine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(platform)),
        }
    }

    /// 平台空闲时执行 `op`，否则立即拒绝
    ///
    /// # 示例
    ///
    /// ```rust,ignore
    /// let result = shared.try_with(|platform| platform.move_to_well("A1"))?;
    /// ```
    pub fn try_with<F>(&self, op: F) -> Result<MoveValidationResult, MotionError>
    where
        F: FnOnce(&mut MotionStateMachine) -> Result<MoveValidationResult, MotionError>,
    {
        match self.inner.try_lock() {
            Some(mut platform) => op(&mut platform),
            None => {
                warn!("Request rejected: platform busy");
                Ok(MoveValidationResult::reject(ALREADY_EXECUTING))
            },
        }
    }

    /// 等待平台空闲后执行 `op`（只读查询等场景）
    pub fn with<R>(&self, op: impl FnOnce(&mut MotionStateMachine) -> R) -> R {
        op(&mut self.inner.lock())
    }

    /// 当前状态；平台忙时返回 `Moving`
    pub fn state(&self) -> MotionState {
        self.inner
            .try_lock()
            .map_or(MotionState::Moving, |platform| platform.state())
    }

    /// 取回独占所有权（没有其他句柄时）
    pub fn into_inner(self) -> Result<MotionStateMachine, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
