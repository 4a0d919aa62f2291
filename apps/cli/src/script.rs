//! 脚本系统
//!
//! JSON 脚本：按顺序执行的高层操作列表，在模拟硬件上运行。

use anyhow::{Context, Result};
use gantry_sdk::{GantryManager, MoveValidationResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Instant;

/// 脚本命令序列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// 脚本名称
    pub name: String,

    /// 脚本描述
    #[serde(default)]
    pub description: String,

    /// 执行前先连接并初始化（回零、取机械手）
    #[serde(default = "default_connect")]
    pub connect: bool,

    /// 命令序列
    pub commands: Vec<ScriptCommand>,
}

fn default_connect() -> bool {
    true
}

/// 脚本命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptCommand {
    HomeAll,
    HomeXyz,
    HomeManipulator,
    HomeTrickler,
    PickupTool {
        #[serde(default)]
        tool: Option<String>,
    },
    ParkTool,
    MoveToWell {
        well: String,
    },
    MoveToScale,
    MoveToDispenser {
        dispenser: usize,
    },
    PickMold {
        well: String,
    },
    PlaceMold {
        well: String,
    },
    PlaceMoldOnScale,
    PickMoldFromScale,
    DispensePowder {
        target_weight: f64,
    },
    Tamp,
    RetrievePiston {
        dispenser: usize,
    },
    PlaceTopPiston {
        dispenser: usize,
    },
    EngageTool,
    DisengageTool,

    /// 完整的单孔流程
    DispenseToWell {
        well: String,
        target_weight: f64,
    },

    /// 读取天平稳定读数
    Weight,

    /// 打印当前上下文
    Status,
}

impl ScriptCommand {
    /// 在平台上执行
    ///
    /// # 返回
    /// - `Ok(Ok(note))`：成功，附带可选的输出
    /// - `Ok(Err(reason))`：被安全校验拒绝或执行失败
    /// - `Err(_)`：不变量被破坏，脚本必须终止
    fn apply(&self, manager: &mut GantryManager) -> Result<Result<Option<String>, String>> {
        let p = manager.platform_mut();
        let result: MoveValidationResult = match self {
            ScriptCommand::HomeAll => p.home_all()?,
            ScriptCommand::HomeXyz => p.home_xyz()?,
            ScriptCommand::HomeManipulator => p.home_manipulator()?,
            ScriptCommand::HomeTrickler => p.home_trickler()?,
            ScriptCommand::PickupTool { tool } => {
                let tool = tool
                    .clone()
                    .unwrap_or_else(|| p.config().manipulator.tool_name.clone());
                p.pickup_tool(&tool)?
            },
            ScriptCommand::ParkTool => p.park_tool()?,
            ScriptCommand::MoveToWell { well } => p.move_to_well(well)?,
            ScriptCommand::MoveToScale => p.move_to_scale()?,
            ScriptCommand::MoveToDispenser { dispenser } => p.move_to_dispenser(*dispenser)?,
            ScriptCommand::PickMold { well } => p.pick_mold_from_well(well)?,
            ScriptCommand::PlaceMold { well } => p.place_mold_in_well(well)?,
            ScriptCommand::PlaceMoldOnScale => p.place_mold_on_scale()?,
            ScriptCommand::PickMoldFromScale => p.pick_mold_from_scale()?,
            ScriptCommand::DispensePowder { target_weight } => p.dispense_powder(*target_weight)?,
            ScriptCommand::Tamp => p.tamp()?,
            ScriptCommand::RetrievePiston { dispenser } => p.retrieve_piston(*dispenser)?,
            ScriptCommand::PlaceTopPiston { dispenser } => p.place_top_piston(*dispenser)?,
            ScriptCommand::EngageTool => p.request_tool_engagement()?,
            ScriptCommand::DisengageTool => p.request_tool_disengagement()?,
            ScriptCommand::DispenseToWell {
                well,
                target_weight,
            } => manager.dispense_to_well(well, *target_weight)?,
            ScriptCommand::Weight => {
                return Ok(manager
                    .current_weight()
                    .map(|w| Some(format!("{:.3} g", w)))
                    .map_err(|e| e.to_string()));
            },
            ScriptCommand::Status => {
                let ctx = p.context();
                return Ok(Ok(Some(format!(
                    "state={:?} position={} z={} tool={} payload={}",
                    p.state(),
                    ctx.position_id,
                    ctx.z_height_id.as_deref().unwrap_or("none"),
                    ctx.active_tool_id.as_deref().unwrap_or("none"),
                    ctx.payload_state.as_deref().unwrap_or("none"),
                ))));
            },
        };

        if result.valid {
            Ok(Ok(None))
        } else {
            Ok(Err(result.reason().to_string()))
        }
    }
}

/// 脚本执行器
pub struct ScriptExecutor {
    /// 当前配置
    config: ScriptConfig,
}

/// 脚本配置
#[derive(Debug, Clone, Default)]
pub struct ScriptConfig {
    /// 失败时是否继续
    pub continue_on_error: bool,
}

impl ScriptExecutor {
    /// 创建新的脚本执行器
    pub fn new() -> Self {
        Self {
            config: ScriptConfig::default(),
        }
    }

    /// 设置配置
    pub fn with_config(mut self, config: ScriptConfig) -> Self {
        self.config = config;
        self
    }

    /// 加载脚本文件
    pub fn load_script<P: AsRef<std::path::Path>>(path: P) -> Result<Script> {
        let content = fs::read_to_string(path).context("读取脚本文件失败")?;

        let script: Script = serde_json::from_str(&content).context("解析脚本 JSON 失败")?;

        Ok(script)
    }

    /// 执行脚本
    ///
    /// # 错误
    /// 连接阶段失败或状态机报告不变量被破坏时返回错误；
    /// 单条命令被拒绝只记录在 [`ScriptResult::failed`] 中。
    pub fn execute(&self, manager: &mut GantryManager, script: &Script) -> Result<ScriptResult> {
        let start = Instant::now();

        if script.connect {
            println!("🔌 连接并初始化...");
            let result = manager.connect()?;
            if !result.valid {
                anyhow::bail!("Initialization failed: {}", result.reason());
            }
            println!("✅ 已连接");
        }

        let mut result = ScriptResult {
            total_commands: script.commands.len(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            duration_secs: 0.0,
        };

        for (i, cmd) in script.commands.iter().enumerate() {
            println!("命令 {}/{}: {:?}", i + 1, result.total_commands, cmd);

            match cmd.apply(manager)? {
                Ok(note) => {
                    if let Some(note) = note {
                        println!("  {}", note);
                    }
                    println!("  ✅ 成功");
                    result.succeeded.push(i);
                },

                Err(reason) => {
                    println!("  ❌ 失败: {}", reason);
                    result.failed.push((i, reason));

                    if !self.config.continue_on_error {
                        println!();
                        println!("❌ 脚本执行失败，停止执行");
                        break;
                    }
                },
            }
        }

        result.duration_secs = start.elapsed().as_secs_f64();
        Ok(result)
    }
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// 脚本执行结果
#[derive(Debug)]
pub struct ScriptResult {
    /// 总命令数
    pub total_commands: usize,

    /// 成功的命令索引
    pub succeeded: Vec<usize>,

    /// 失败的命令索引和原因
    pub failed: Vec<(usize, String)>,

    /// 脚本执行时长（秒）
    pub duration_secs: f64,
}
