//! 平台生命周期状态与转换表
//!
//! 三个状态、六个转换。表中未列出的组合一律拒绝。

use crate::error::MotionError;

/// 平台状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    /// 空闲（初始状态）
    #[default]
    Idle,
    /// 正在执行一次移动
    Moving,
    /// 工具与固定硬件耦合，平台不得平移
    ToolEngaged,
}

/// 状态转换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Idle → Moving
    BeginMotion,
    /// Moving → Idle
    CompleteMotion,
    /// Moving → ToolEngaged
    CompleteMotionWithTool,
    /// Idle → ToolEngaged
    EngageTool,
    /// ToolEngaged → Idle
    DisengageTool,
    /// Moving → Idle（执行失败）
    AbortMotion,
}

impl MotionState {
    /// 查表得到目标状态
    ///
    /// # 错误
    /// 组合不在表中时返回 [`MotionError::InvalidTransition`]
    pub fn apply(self, transition: Transition) -> Result<MotionState, MotionError> {
        use MotionState::*;
        use Transition::*;

        match (self, transition) {
            (Idle, BeginMotion) => Ok(Moving),
            (Moving, CompleteMotion) => Ok(Idle),
            (Moving, CompleteMotionWithTool) => Ok(ToolEngaged),
            (Idle, EngageTool) => Ok(ToolEngaged),
            (ToolEngaged, DisengageTool) => Ok(Idle),
            (Moving, AbortMotion) => Ok(Idle),
            (from, transition) => Err(MotionError::InvalidTransition { from, transition }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [MotionState; 3] = [
        MotionState::Idle,
        MotionState::Moving,
        MotionState::ToolEngaged,
    ];

    const ALL_TRANSITIONS: [Transition; 6] = [
        Transition::BeginMotion,
        Transition::CompleteMotion,
        Transition::CompleteMotionWithTool,
        Transition::EngageTool,
        Transition::DisengageTool,
        Transition::AbortMotion,
    ];

    #[test]
    fn test_listed_transitions() {
        assert_eq!(
            MotionState::Idle.apply(Transition::BeginMotion).unwrap(),
            MotionState::Moving
        );
        assert_eq!(
            MotionState::Moving
                .apply(Transition::CompleteMotionWithTool)
                .unwrap(),
            MotionState::ToolEngaged
        );
        assert_eq!(
            MotionState::ToolEngaged
                .apply(Transition::DisengageTool)
                .unwrap(),
            MotionState::Idle
        );
        assert_eq!(
            MotionState::Moving.apply(Transition::AbortMotion).unwrap(),
            MotionState::Idle
        );
    }

    /// 表中恰好 6 个合法组合，其余全部拒绝
    #[test]
    fn test_unlisted_pairs_rejected() {
        let accepted = ALL_STATES
            .iter()
            .flat_map(|s| ALL_TRANSITIONS.iter().map(move |t| s.apply(*t)))
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(accepted, 6);

        assert!(matches!(
            MotionState::ToolEngaged.apply(Transition::BeginMotion),
            Err(MotionError::InvalidTransition {
                from: MotionState::ToolEngaged,
                transition: Transition::BeginMotion
            })
        ));
        assert!(MotionState::Idle.apply(Transition::AbortMotion).is_err());
    }
}
