//! check 命令
//!
//! 加载位置注册表与系统配置，打印摘要并交叉检查两者是否一致。

use anyhow::Result;
use clap::Args;
use gantry_sdk::{PositionRegistry, PositionType, SystemConfig};
use std::path::PathBuf;

use super::config::CliConfig;
use crate::hardware::{DEFAULT_GRAMS_PER_MM, mock_platform};

/// 配置检查命令参数
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// 位置注册表（覆盖配置）
    #[arg(short, long)]
    pub positions: Option<PathBuf>,

    /// 系统配置（覆盖配置）
    #[arg(short, long)]
    pub system: Option<PathBuf>,
}

impl CheckCommand {
    pub fn execute(&self) -> Result<()> {
        let (registry, system) =
            CliConfig::load()?.resolve(self.positions.as_deref(), self.system.as_deref())?;

        print_summary(&registry, &system);

        let issues = cross_check(&registry, &system);
        // 孔板布局等由平台构造时校验
        let issues = match mock_platform(registry, system, DEFAULT_GRAMS_PER_MM) {
            Ok(_) => issues,
            Err(err) => issues.into_iter().chain([err.to_string()]).collect(),
        };

        println!();
        if issues.is_empty() {
            println!("✅ 配置一致");
            return Ok(());
        }
        println!("❌ 发现 {} 个问题:", issues.len());
        for issue in &issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("{} configuration issue(s) found", issues.len())
    }
}

fn print_summary(registry: &PositionRegistry, system: &SystemConfig) {
    println!("📍 位置 ({}):", registry.positions().count());
    for position in registry.positions() {
        println!(
            "  {:<24} {:<16} → {} 个目的地",
            position.identifier,
            position.position_type,
            position.allowed_destinations.len()
        );
    }

    let actions: Vec<&str> = registry.actions().map(|a| a.identifier.as_str()).collect();
    println!("⚙️  动作 ({}): {}", actions.len(), actions.join(", "));

    println!("📏 Z 高度等级:");
    for (id, class) in registry.z_heights() {
        match class.z_coordinate {
            Some(z) => println!("  {} = {}", id, z),
            None => println!("  {} (未声明坐标)", id),
        }
    }

    println!("🧪 孔位: {}", system.deck.wells.len());
    println!(
        "🔩 分配器: {} × {} 活塞",
        system.dispensers.count, system.dispensers.pistons_per_dispenser
    );
    match system.scale {
        Some(scale) => println!("⚖️  称量台: ({}, {})", scale.x, scale.y),
        None => println!("⚖️  称量台: (未配置)"),
    }
}

/// 系统配置引用的就绪位置都必须在注册表中声明
fn cross_check(registry: &PositionRegistry, system: &SystemConfig) -> Vec<String> {
    let mut issues = Vec::new();

    for well in &system.deck.wells {
        let ready = format!("mold_ready_{}", well.id);
        if !registry.has(&ready) {
            issues.push(format!("Well {} has no '{}' position", well.id, ready));
        }
    }

    for index in 0..system.dispensers.count {
        let ready = format!("dispenser_ready_{}", index);
        if !registry.has(&ready) {
            issues.push(format!("Dispenser {} has no '{}' position", index, ready));
        }
    }

    if system.scale.is_some() && registry.find_first_of_type(PositionType::ScaleReady).is_none() {
        issues.push("Scale is configured but no SCALE_READY position is registered".to_string());
    }

    if registry.z_coordinate(&system.homing.z_height).is_none() {
        issues.push(format!(
            "Homing z-height '{}' has no declared z_coordinate",
            system.homing.z_height
        ));
    }

    issues
}
