//! 孔板、称量孔与活塞分配器
//!
//! 孔板共 18 个槽位：A 行 0..=6，B 行 7..=13，C 行 14..=17。
//! 孔位标识（"A1"、"B3"）按此规则映射到槽位。

use crate::error::ExecutionError;
use gantry_config::{ConfigError, DeckLayout, DispenserLayout};

/// 槽位总数
pub const DECK_SLOTS: usize = 18;

/// 每行列数上限（A、B、C）
const ROW_WIDTHS: [usize; 3] = [7, 7, 4];

/// 孔位标识 → 槽位索引
pub fn slot_index(well_id: &str) -> Option<usize> {
    let mut chars = well_id.chars();
    let row = chars.next()?.to_ascii_uppercase();
    let col: usize = chars.as_str().parse().ok()?;
    if col == 0 {
        return None;
    }
    let row = (row as usize).checked_sub('A' as usize)?;
    let width = *ROW_WIDTHS.get(row)?;
    if col > width {
        return None;
    }
    Some(row * 7 + col - 1)
}

// ==================== WeightWell ====================

/// 称量孔（模具）
#[derive(Debug, Clone, PartialEq)]
pub struct WeightWell {
    pub id: String,
    pub x: f64,
    pub y: f64,
    /// 模具可用
    pub valid: bool,
    /// 已装顶部活塞
    pub has_top_piston: bool,
    pub current_weight: f64,
    pub target_weight: Option<f64>,
    pub max_weight: f64,
    /// 对应的就绪位置标识
    pub ready_pos: String,
}

impl WeightWell {
    pub fn new(id: impl Into<String>, x: f64, y: f64, max_weight: f64) -> Self {
        let id = id.into();
        Self {
            ready_pos: format!("mold_ready_{}", id),
            id,
            x,
            y,
            valid: true,
            has_top_piston: false,
            current_weight: 0.0,
            target_weight: None,
            max_weight,
        }
    }

    /// 记录称得的重量
    ///
    /// # 错误
    /// 超过 `max_weight` 时返回 [`ExecutionError::Labware`]，重量不变。
    pub fn set_weight(&mut self, weight: f64) -> Result<(), ExecutionError> {
        if weight > self.max_weight {
            return Err(ExecutionError::Labware(format!(
                "Weight {} g exceeds well {} maximum of {} g",
                weight, self.id, self.max_weight
            )));
        }
        self.current_weight = weight;
        Ok(())
    }

    pub fn add_weight(&mut self, weight: f64) -> Result<(), ExecutionError> {
        self.set_weight(self.current_weight + weight)
    }
}

// ==================== Deck ====================

/// 孔板
#[derive(Debug, Clone, PartialEq)]
pub struct Deck {
    slots: Vec<Option<WeightWell>>,
}

impl Default for Deck {
    fn default() -> Self {
        Self {
            slots: vec![None; DECK_SLOTS],
        }
    }
}

impl Deck {
    /// 按布局构建
    ///
    /// # 参数
    /// - `layout`: 孔位列表
    /// - `default_max_weight`: 未单独声明上限的孔使用的最大重量
    ///
    /// # 错误
    /// 孔位标识无法映射到槽位，或两个孔位落在同一槽位。
    pub fn from_layout(layout: &DeckLayout, default_max_weight: f64) -> Result<Self, ConfigError> {
        let mut deck = Deck::default();
        for spec in &layout.wells {
            let well = WeightWell::new(
                spec.id.clone(),
                spec.x,
                spec.y,
                spec.max_weight.unwrap_or(default_max_weight),
            );
            deck.insert(well)?;
        }
        Ok(deck)
    }

    pub fn insert(&mut self, well: WeightWell) -> Result<(), ConfigError> {
        let index = slot_index(&well.id).ok_or_else(|| {
            ConfigError::InvalidSystemConfig(format!(
                "well id '{}' does not map to a deck slot",
                well.id
            ))
        })?;
        let slot = &mut self.slots[index];
        if slot.is_some() {
            return Err(ConfigError::InvalidSystemConfig(format!(
                "deck slot {} is already occupied (well '{}')",
                index, well.id
            )));
        }
        *slot = Some(well);
        Ok(())
    }

    pub fn get(&self, well_id: &str) -> Option<&WeightWell> {
        slot_index(well_id).and_then(|i| self.slots[i].as_ref())
    }

    pub fn get_mut(&mut self, well_id: &str) -> Option<&mut WeightWell> {
        slot_index(well_id).and_then(|i| self.slots[i].as_mut())
    }

    pub fn slot(&self, index: usize) -> Option<&WeightWell> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// 按槽位顺序遍历已放置的孔
    pub fn wells(&self) -> impl Iterator<Item = &WeightWell> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.wells().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ==================== PistonDispenser ====================

/// 活塞分配器
#[derive(Debug, Clone, PartialEq)]
pub struct PistonDispenser {
    pub index: usize,
    pub num_pistons: u32,
    /// 就绪点坐标
    pub x: f64,
    pub y: f64,
}

impl PistonDispenser {
    pub fn new(index: usize, num_pistons: u32, x: f64, y: f64) -> Self {
        Self {
            index,
            num_pistons,
            x,
            y,
        }
    }

    /// 按布局生成全部分配器
    pub fn from_layout(layout: &DispenserLayout) -> Vec<Self> {
        (0..layout.count)
            .map(|i| {
                let (x, y) = layout.ready_point(i);
                Self::new(i, layout.pistons_per_dispenser, x, y)
            })
            .collect()
    }

    pub fn has_pistons(&self) -> bool {
        self.num_pistons > 0
    }

    /// 对应的就绪位置标识
    pub fn ready_position_id(&self) -> String {
        format!("dispenser_ready_{}", self.index)
    }

    pub fn remove_piston(&mut self) -> Result<(), ExecutionError> {
        if self.num_pistons == 0 {
            return Err(ExecutionError::Labware(format!(
                "No pistons available in dispenser {}",
                self.index
            )));
        }
        self.num_pistons -= 1;
        Ok(())
    }
}
