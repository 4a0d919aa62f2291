//! G-code 命令模型
//!
//! 运动层只使用很小的 G-code 子集，这里用强类型表示，再统一渲染为文本行。

use crate::axis::Axis;
use crate::error::DriverError;
use crate::mode::PositioningMode;
use std::fmt;

/// 一次直线运动的目标
///
/// 只包含显式给出的轴；未给出的轴保持不动。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveTarget {
    axes: Vec<(Axis, f64)>,
    feedrate: Option<u32>,
}

impl MoveTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置某轴目标（重复设置时覆盖）
    pub fn axis(mut self, axis: Axis, value: f64) -> Self {
        if let Some(slot) = self.axes.iter_mut().find(|(a, _)| *a == axis) {
            slot.1 = value;
        } else {
            self.axes.push((axis, value));
        }
        self
    }

    pub fn x(self, value: f64) -> Self {
        self.axis(Axis::X, value)
    }

    pub fn y(self, value: f64) -> Self {
        self.axis(Axis::Y, value)
    }

    pub fn z(self, value: f64) -> Self {
        self.axis(Axis::Z, value)
    }

    pub fn v(self, value: f64) -> Self {
        self.axis(Axis::V, value)
    }

    pub fn feed(mut self, feedrate: u32) -> Self {
        self.feedrate = Some(feedrate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn axes(&self) -> &[(Axis, f64)] {
        &self.axes
    }

    pub fn feedrate(&self) -> Option<u32> {
        self.feedrate
    }

    pub fn get(&self, axis: Axis) -> Option<f64> {
        self.axes.iter().find(|(a, _)| *a == axis).map(|(_, v)| *v)
    }
}

/// 控制器命令
#[derive(Debug, Clone, PartialEq)]
pub enum GcodeCommand {
    /// G90 / G91
    SetPositioning(PositioningMode),
    /// G1
    LinearMove(MoveTarget),
    /// G28，空列表表示控制器默认的回零轴
    Home(Vec<Axis>),
    /// M98 P"file"
    Macro(String),
    /// T{n}
    SelectTool(u32),
    /// T-1
    ParkTool,
    /// 原样发送
    Raw(String),
}

impl GcodeCommand {
    pub fn absolute() -> Self {
        Self::SetPositioning(PositioningMode::Absolute)
    }

    pub fn relative() -> Self {
        Self::SetPositioning(PositioningMode::Relative)
    }

    /// 解析单行 G-code
    ///
    /// 只识别本模块能渲染的命令；其余内容保留为 [`GcodeCommand::Raw`]。
    /// 空行返回 [`DriverError::InvalidCommand`]。
    pub fn parse(line: &str) -> Result<Self, DriverError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(DriverError::InvalidCommand(line.to_string()));
        }

        let mut words = line.split_whitespace();
        let head = words.next().unwrap_or_default().to_ascii_uppercase();

        if let Some(mode) = PositioningMode::from_gcode(&head) {
            return Ok(Self::SetPositioning(mode));
        }

        match head.as_str() {
            "G0" | "G1" => {
                let mut target = MoveTarget::new();
                for word in words {
                    let (letter, value) = split_word(word, line)?;
                    if letter == 'F' {
                        let feed = value
                            .parse::<f64>()
                            .map_err(|_| DriverError::InvalidCommand(line.to_string()))?
                            .round();
                        // 进给速度须为正且可用 u32 表示
                        if !(1.0..=f64::from(u32::MAX)).contains(&feed) {
                            return Err(DriverError::InvalidCommand(line.to_string()));
                        }
                        target = target.feed(feed as u32);
                        continue;
                    }
                    let axis = Axis::from_letter(letter)
                        .ok_or_else(|| DriverError::InvalidCommand(line.to_string()))?;
                    let value = value
                        .parse::<f64>()
                        .map_err(|_| DriverError::InvalidCommand(line.to_string()))?;
                    target = target.axis(axis, value);
                }
                Ok(Self::LinearMove(target))
            },
            "G28" => {
                let axes = words
                    .map(|w| {
                        w.chars()
                            .next()
                            .and_then(Axis::from_letter)
                            .ok_or_else(|| DriverError::InvalidCommand(line.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Home(axes))
            },
            "M98" => {
                let rest = line[3..].trim();
                let file = rest
                    .strip_prefix('P')
                    .or_else(|| rest.strip_prefix('p'))
                    .map(|f| f.trim_matches('"').to_string())
                    .ok_or_else(|| DriverError::InvalidCommand(line.to_string()))?;
                Ok(Self::Macro(file))
            },
            "T-1" => Ok(Self::ParkTool),
            _ => {
                if let Some(index) = head.strip_prefix('T').and_then(|n| n.parse::<u32>().ok()) {
                    return Ok(Self::SelectTool(index));
                }
                Ok(Self::Raw(line.to_string()))
            },
        }
    }
}

fn split_word<'a>(word: &'a str, line: &str) -> Result<(char, &'a str), DriverError> {
    let mut chars = word.chars();
    let letter = chars
        .next()
        .ok_or_else(|| DriverError::InvalidCommand(line.to_string()))?
        .to_ascii_uppercase();
    Ok((letter, chars.as_str()))
}

impl fmt::Display for GcodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetPositioning(mode) => write!(f, "{}", mode.gcode()),
            Self::LinearMove(target) => {
                write!(f, "G1")?;
                for (axis, value) in target.axes() {
                    write!(f, " {}{}", axis.letter(), value)?;
                }
                if let Some(feed) = target.feedrate() {
                    write!(f, " F{}", feed)?;
                }
                Ok(())
            },
            Self::Home(axes) => {
                write!(f, "G28")?;
                for axis in axes {
                    write!(f, " {}", axis.letter())?;
                }
                Ok(())
            },
            Self::Macro(file) => write!(f, "M98 P\"{}\"", file),
            Self::SelectTool(index) => write!(f, "T{}", index),
            Self::ParkTool => write!(f, "T-1"),
            Self::Raw(line) => write!(f, "{}", line),
        }
    }
}
