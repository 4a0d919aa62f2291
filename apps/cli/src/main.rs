//! # Gantry CLI
//!
//! 运动安全核心的命令行工具。
//!
//! ```bash
//! # 记录默认配置文件
//! gantry-cli config set --positions config/motion_platform.json --system config/system.toml
//!
//! # 检查配置
//! gantry-cli check
//!
//! # 在模拟硬件上执行脚本（内部：连接 -> 逐条执行 -> 汇总）
//! gantry-cli run --script workflow.json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod hardware;
mod script;

use commands::{CheckCommand, ConfigCommand, RunCommand};

/// Gantry CLI - 龙门平台命令行工具
#[derive(Parser, Debug)]
#[command(name = "gantry-cli")]
#[command(about = "Command-line interface for the gantry motion-safety core", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 加载并检查位置注册表与系统配置
    Check {
        #[command(flatten)]
        args: CheckCommand,
    },

    /// 在模拟硬件上执行脚本
    Run {
        #[command(flatten)]
        args: RunCommand,
    },
}

fn main() -> Result<()> {
    gantry_sdk::logging::init_logging_with("warn,gantry_cli=info");

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(),
        Commands::Check { args } => args.execute(),
        Commands::Run { args } => args.execute(),
    }
}
