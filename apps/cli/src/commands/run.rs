//! run 命令
//!
//! 在模拟硬件上执行脚本文件

use anyhow::Result;
use clap::Args;
use gantry_sdk::GantryManager;
use std::path::PathBuf;

use super::config::CliConfig;
use crate::hardware::{DEFAULT_GRAMS_PER_MM, mock_platform};
use crate::script::{ScriptConfig, ScriptExecutor};

/// 脚本执行命令参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 脚本文件路径
    #[arg(long)]
    pub script: PathBuf,

    /// 位置注册表（覆盖配置）
    #[arg(short, long)]
    pub positions: Option<PathBuf>,

    /// 系统配置（覆盖配置）
    #[arg(short, long)]
    pub system: Option<PathBuf>,

    /// 失败时继续执行
    #[arg(long)]
    pub continue_on_error: bool,
}

impl RunCommand {
    /// 执行脚本
    pub fn execute(&self) -> Result<()> {
        println!("📜 加载脚本: {}", self.script.display());
        let script = ScriptExecutor::load_script(&self.script)?;

        println!("📋 脚本: {}", script.name);
        if !script.description.is_empty() {
            println!("    {}", script.description);
        }
        println!("    {} 个命令", script.commands.len());
        println!();

        let cli_config = CliConfig::load()?;
        let (registry, system) =
            cli_config.resolve(self.positions.as_deref(), self.system.as_deref())?;
        let grams_per_mm = cli_config.grams_per_mm.unwrap_or(DEFAULT_GRAMS_PER_MM);
        let platform = mock_platform(registry, system, grams_per_mm)?;
        let mut manager = GantryManager::new(platform);

        let executor = ScriptExecutor::new().with_config(ScriptConfig {
            continue_on_error: self.continue_on_error,
        });
        let result = executor.execute(&mut manager, &script)?;

        println!();
        println!("📊 执行结果:");
        println!("  总命令数: {}", result.total_commands);
        println!("  成功: {}", result.succeeded.len());
        println!("  失败: {}", result.failed.len());
        println!("  耗时: {:.2} 秒", result.duration_secs);

        if !result.failed.is_empty() {
            println!();
            println!("❌ 失败的命令:");
            for (idx, err) in &result.failed {
                println!("  命令 {}: {}", idx + 1, err);
            }
            anyhow::bail!("{} command(s) failed", result.failed.len());
        }

        Ok(())
    }
}
