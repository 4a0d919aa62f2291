//! 轴定义与机器状态快照

use std::collections::BTreeMap;
use std::fmt;

/// 机器轴
///
/// - X/Y：龙门平面
/// - Z：床身高度（数值越大越安全）
/// - U：换刀锁定轴
/// - V：机械手（夹持/压实）轴
/// - W：下粉轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    X,
    Y,
    Z,
    U,
    V,
    W,
}

impl Axis {
    pub const ALL: [Axis; 6] = [Axis::X, Axis::Y, Axis::Z, Axis::U, Axis::V, Axis::W];

    /// G28 不带参数时回零的龙门轴
    pub const GANTRY: [Axis; 4] = [Axis::X, Axis::Y, Axis::Z, Axis::U];

    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::U => 'U',
            Axis::V => 'V',
            Axis::W => 'W',
        }
    }

    /// 从轴字母解析（大小写均可）
    pub fn from_letter(letter: char) -> Option<Self> {
        let upper = letter.to_ascii_uppercase();
        Self::ALL.into_iter().find(|axis| axis.letter() == upper)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// 机器上报的各轴位置
///
/// 未上报的轴按 0.0 处理。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachinePosition {
    values: BTreeMap<Axis, f64>,
}

impl MachinePosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, axis: Axis, value: f64) -> Self {
        self.values.insert(axis, value);
        self
    }

    pub fn set(&mut self, axis: Axis, value: f64) {
        self.values.insert(axis, value);
    }

    pub fn get(&self, axis: Axis) -> f64 {
        self.values.get(&axis).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Axis, f64)> + '_ {
        self.values.iter().map(|(a, v)| (*a, *v))
    }
}

/// 各轴回零状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HomedAxes {
    flags: Vec<(Axis, bool)>,
}

impl HomedAxes {
    pub fn new(flags: Vec<(Axis, bool)>) -> Self {
        Self { flags }
    }

    /// 所有上报轴是否都已回零
    pub fn all_homed(&self) -> bool {
        self.flags.iter().all(|(_, homed)| *homed)
    }

    /// 未回零的轴（按上报顺序）
    pub fn unhomed(&self) -> Vec<Axis> {
        self.flags
            .iter()
            .filter(|(_, homed)| !homed)
            .map(|(axis, _)| *axis)
            .collect()
    }

    pub fn is_homed(&self, axis: Axis) -> Option<bool> {
        self.flags
            .iter()
            .find(|(a, _)| *a == axis)
            .map(|(_, homed)| *homed)
    }
}
