//! 配置管理命令
//!
//! 记录默认的位置注册表与系统配置路径，保存在用户配置目录下的
//! `gantry/config.toml`。

use anyhow::{Context, Result};
use clap::Subcommand;
use gantry_sdk::{PositionRegistry, SystemConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// 配置文件路径
fn config_dir() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;

    path.push("gantry");
    Ok(path)
}

fn config_file() -> Result<PathBuf> {
    let mut path = config_dir()?;
    path.push("config.toml");
    Ok(path)
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// 位置注册表（.json / .toml）
    pub positions: Option<PathBuf>,

    /// 系统配置（.toml）
    pub system: Option<PathBuf>,

    /// 模拟天平：下粉轴每毫米对应的克数
    pub grams_per_mm: Option<f64>,
}

impl CliConfig {
    /// 加载配置（文件不存在时返回默认值）
    pub fn load() -> Result<Self> {
        let path = config_file()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("读取配置文件失败")?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    /// 保存配置
    fn save(&self) -> Result<()> {
        let path = config_file()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }

        let content = format!(
            "# Gantry CLI Configuration\n\n{}",
            toml::to_string_pretty(self).context("序列化配置失败")?
        );
        fs::write(&path, content).context("写入配置文件失败")?;

        info!("Saved CLI configuration to {}", path.display());
        Ok(())
    }

    /// 命令行参数优先，其次是已保存的配置
    ///
    /// # 错误
    /// 没有任何位置注册表路径，或文件加载失败。
    pub fn resolve(
        &self,
        positions: Option<&Path>,
        system: Option<&Path>,
    ) -> Result<(PositionRegistry, SystemConfig)> {
        let positions = positions.or(self.positions.as_deref()).ok_or_else(|| {
            anyhow::anyhow!(
                "No position registry configured. Pass --positions or run `gantry-cli config set --positions <PATH>`"
            )
        })?;
        let registry = PositionRegistry::from_path(positions)
            .with_context(|| format!("加载位置注册表失败: {}", positions.display()))?;

        let system = match system.or(self.system.as_deref()) {
            Some(path) => SystemConfig::load_from_file(path)
                .with_context(|| format!("加载系统配置失败: {}", path.display()))?,
            None => SystemConfig::default(),
        };

        Ok((registry, system))
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 位置注册表路径
        #[arg(short, long)]
        positions: Option<PathBuf>,

        /// 系统配置路径
        #[arg(short, long)]
        system: Option<PathBuf>,

        /// 模拟天平灵敏度（g/mm）
        #[arg(long)]
        grams_per_mm: Option<f64>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Set {
                positions,
                system,
                grams_per_mm,
            } => Self::set_(positions, system, grams_per_mm),

            ConfigCommand::Get { key } => Self::get_(&key),

            ConfigCommand::Check => Self::check_(),
        }
    }

    fn set_(
        positions: Option<PathBuf>,
        system: Option<PathBuf>,
        grams_per_mm: Option<f64>,
    ) -> Result<()> {
        let mut config = CliConfig::load()?;

        if let Some(path) = positions {
            let path = absolute(path)?;
            println!("✅ 设置位置注册表: {}", path.display());
            config.positions = Some(path);
        }

        if let Some(path) = system {
            let path = absolute(path)?;
            println!("✅ 设置系统配置: {}", path.display());
            config.system = Some(path);
        }

        if let Some(g) = grams_per_mm {
            if !(g > 0.0) {
                anyhow::bail!("grams_per_mm must be positive, got {}", g);
            }
            println!("✅ 设置模拟天平灵敏度: {} g/mm", g);
            config.grams_per_mm = Some(g);
        }

        config.save()
    }

    fn get_(key: &str) -> Result<()> {
        let config = CliConfig::load()?;
        let show = |path: &Option<PathBuf>| {
            path.as_ref()
                .map_or_else(|| "(未设置)".to_string(), |p| p.display().to_string())
        };

        match key {
            "positions" => println!("{}", show(&config.positions)),

            "system" => println!("{}", show(&config.system)),

            "grams_per_mm" => match config.grams_per_mm {
                Some(g) => println!("{}", g),
                None => println!("(未设置)"),
            },

            _ => {
                println!("Gantry CLI 配置:");
                println!("  位置注册表: {}", show(&config.positions));
                println!("  系统配置: {}", show(&config.system));
                println!("  模拟天平: {:?}", config.grams_per_mm);
            },
        }

        Ok(())
    }

    fn check_() -> Result<()> {
        let config = CliConfig::load()?;
        let path = config_file()?;

        println!("配置文件: {}", path.display());
        for (name, file) in [("位置注册表", &config.positions), ("系统配置", &config.system)] {
            match file {
                Some(p) if p.exists() => println!("  ✅ {}: {}", name, p.display()),
                Some(p) => println!("  ❌ {}: {} (不存在)", name, p.display()),
                None => println!("  ⚠️  {}: (未设置)", name),
            }
        }

        Ok(())
    }
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    std::path::absolute(&path).with_context(|| format!("无法解析路径: {}", path.display()))
}
