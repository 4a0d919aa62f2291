//! 定位模式定义
//!
//! 运动控制器的坐标解释方式，由 G90 / G91 切换。

/// 定位模式
///
/// - **Absolute**: 坐标为机器绝对坐标（G90）
/// - **Relative**: 坐标为相对当前位置的增量（G91）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositioningMode {
    /// 绝对定位（默认）
    #[default]
    Absolute,

    /// 相对定位
    Relative,
}

impl PositioningMode {
    /// 对应的 G-code 字
    pub fn gcode(self) -> &'static str {
        match self {
            Self::Absolute => "G90",
            Self::Relative => "G91",
        }
    }

    /// 从 G-code 字解析
    pub fn from_gcode(word: &str) -> Option<Self> {
        match word {
            "G90" => Some(Self::Absolute),
            "G91" => Some(Self::Relative),
            _ => None,
        }
    }

    pub fn is_relative(self) -> bool {
        self == Self::Relative
    }
}
