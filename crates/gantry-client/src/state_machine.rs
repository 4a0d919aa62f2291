//! 运动状态机
//!
//! 拥有注册表、运动上下文与执行器，是唯一允许推进上下文的组件。
//!
//! 每个移动 / 动作请求都走同一条校验流程（[`MotionStateMachine::validate_and_execute`]）：
//!
//! 1. 正在移动时拒绝；
//! 2. 除回零动作外，要求所有轴已回零；
//! 3. 移动：拓扑（双向）→ 实际坐标 → z 高度策略 → 目标需求 → 调用方附加需求；
//!    动作：接合约束 → 工具 → 位置范围 → 实际坐标 → 需求 → 排除条件 → 附加需求；
//! 4. 执行；移动在成功后完成、失败后回退到 Idle。
//!
//! "当前不允许"通过 [`MoveValidationResult`] 返回；只有配置损坏或不变量被破坏
//! 才返回 [`MotionError`]。

use crate::context::{ContextPatch, MotionContext};
use crate::error::{ExecutionError, MotionError};
use crate::executor::MovementExecutor;
use crate::labware::{Deck, PistonDispenser, WeightWell};
use crate::state::{MotionState, Transition};
use crate::types::{MotionTarget, MoveRequest, MoveValidationResult, ToolStatus};
use gantry_config::{
    ObservedCoordinates, PositionRegistry, RequirementSet, SystemConfig, format_options,
};
use gantry_driver::{MachineDriver, Scale};
use tracing::{debug, error, info, warn};

/// 正在移动时的拒绝原因
pub const ALREADY_EXECUTING: &str = "Already executing a move. Wait for current move to complete.";

/// 不检查回零状态与实际坐标的动作
pub const HOMING_ACTIONS: [&str; 4] = ["home_all", "home_manipulator", "home_trickler", "home_xyz"];

/// 是否为回零动作
pub fn is_homing_action(action_id: &str) -> bool {
    HOMING_ACTIONS.contains(&action_id)
}

/// 记录并构造拒绝结果
pub(crate) fn reject(reason: impl Into<String>) -> MoveValidationResult {
    let reason = reason.into();
    warn!("Request rejected: {}", reason);
    MoveValidationResult::reject(reason)
}

/// 运动状态机
#[derive(Debug)]
pub struct MotionStateMachine {
    pub(crate) registry: PositionRegistry,
    pub(crate) context: MotionContext,
    pub(crate) state: MotionState,
    pub(crate) executor: MovementExecutor,
}

impl MotionStateMachine {
    /// 创建状态机，上下文位于注册表唯一的全局就绪点
    ///
    /// # 参数
    /// - `registry`: 已加载的位置/动作注册表
    /// - `config`: 系统配置（孔板、分配器、称量台、运动参数）
    /// - `machine`: 机器驱动
    /// - `scale`: 天平（可选）
    ///
    /// # 错误
    /// 孔板布局无法映射到槽位时返回 [`MotionError::Config`]。
    pub fn new(
        registry: PositionRegistry,
        config: SystemConfig,
        machine: Box<dyn MachineDriver>,
        scale: Option<Box<dyn Scale>>,
    ) -> Result<Self, MotionError> {
        let context = initial_context(&registry, &config)?;
        info!(
            "Motion platform ready at '{}' ({} wells, {} dispensers)",
            context.position_id,
            context.deck.as_ref().map_or(0, Deck::len),
            context.piston_dispensers.len()
        );
        Ok(Self {
            registry,
            context,
            state: MotionState::Idle,
            executor: MovementExecutor::new(machine, scale, config),
        })
    }

    /// 丢弃全部逻辑状态，回到初始上下文
    ///
    /// # 错误
    /// 正在移动时返回 [`MotionError::InvariantViolation`]。
    pub fn reset(&mut self) -> Result<(), MotionError> {
        if self.state == MotionState::Moving {
            return Err(MotionError::InvariantViolation(
                "Cannot reset while a move is in progress.".to_string(),
            ));
        }
        self.context = initial_context(&self.registry, self.executor.config())?;
        self.state = MotionState::Idle;
        info!("Motion context reset to '{}'", self.context.position_id);
        Ok(())
    }

    // ==================== 访问器 ====================

    pub fn registry(&self) -> &PositionRegistry {
        &self.registry
    }

    pub fn context(&self) -> &MotionContext {
        &self.context
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn config(&self) -> &SystemConfig {
        self.executor.config()
    }

    pub fn executor_mut(&mut self) -> &mut MovementExecutor {
        &mut self.executor
    }

    /// 按标识查询孔位
    pub fn well(&self, well_id: &str) -> Option<&WeightWell> {
        self.context.deck.as_ref()?.get(well_id)
    }

    pub fn dispensers(&self) -> &[PistonDispenser] {
        &self.context.piston_dispensers
    }

    // ==================== 上下文 / 工具记录 ====================

    /// 按非空字段修改上下文
    pub fn update_context(&mut self, patch: ContextPatch) {
        debug!("Context patch: {:?}", patch);
        self.context.apply_patch(patch);
    }

    pub fn register_tool(&mut self, status: ToolStatus) {
        debug!("Registering tool '{}'", status.tool_id);
        self.context.tool_states.insert(status.tool_id.clone(), status);
    }

    /// 更新已注册工具的接合标志
    ///
    /// # 错误
    /// 工具未注册时返回 [`MotionError::UnknownTool`]。
    pub fn update_tool_engagement(&mut self, tool_id: &str, engaged: bool) -> Result<(), MotionError> {
        let status = self
            .context
            .tool_states
            .get_mut(tool_id)
            .ok_or_else(|| MotionError::UnknownTool(tool_id.to_string()))?;
        status.engaged = engaged;
        Ok(())
    }

    // ==================== 通用校验执行流程 ====================

    /// 校验目标后执行 `execute`
    ///
    /// # 参数
    /// - `target`: 移动目标位置或动作
    /// - `extra`: 调用方附加的上下文需求
    /// - `execute`: 硬件序列；返回 `Ok(false)` 视为失败
    ///
    /// # 返回
    /// 校验或执行失败时返回带原因的无效结果，上下文不前进。
    ///
    /// # 错误
    /// 仅在状态转换或不变量被破坏时返回 [`MotionError`]。
    pub fn validate_and_execute<F>(
        &mut self,
        target: MotionTarget,
        extra: Option<&RequirementSet>,
        execute: F,
    ) -> Result<MoveValidationResult, MotionError>
    where
        F: FnOnce(&mut MovementExecutor) -> Result<bool, ExecutionError>,
    {
        if self.state == MotionState::Moving {
            return Ok(reject(ALREADY_EXECUTING));
        }

        let homing = matches!(&target, MotionTarget::Action(id) if is_homing_action(id));
        if !homing {
            if let Some(issue) = self.check_homed() {
                return Ok(reject(issue));
            }
        }

        match target {
            MotionTarget::Position(target_id) => self.execute_move(&target_id, extra, execute),
            MotionTarget::Action(action_id) => {
                self.execute_action(&action_id, extra, !homing, execute)
            },
        }
    }

    fn execute_move<F>(
        &mut self,
        target_id: &str,
        extra: Option<&RequirementSet>,
        execute: F,
    ) -> Result<MoveValidationResult, MotionError>
    where
        F: FnOnce(&mut MovementExecutor) -> Result<bool, ExecutionError>,
    {
        if let Some(issue) = self.check_topology(target_id) {
            return Ok(reject(issue));
        }
        if let Some(issue) = self.check_drift() {
            return Ok(reject(issue));
        }
        if let Some(issue) = self.check_target_rules(target_id, extra) {
            return Ok(reject(issue));
        }

        if self.state == MotionState::ToolEngaged {
            // 接合状态下只可能"移动"到当前就绪点
            debug!("Already at '{}' with tool engaged, nothing to execute", target_id);
            return Ok(MoveValidationResult::in_place());
        }

        self.context.pending_move = Some(MoveRequest::to(target_id));
        self.transition(Transition::BeginMotion)?;
        debug!("Executing move to '{}'", target_id);

        match execute(&mut self.executor) {
            Ok(true) => {
                self.complete_move(false)?;
                info!("Move to '{}' complete", target_id);
                Ok(MoveValidationResult::ok())
            },
            Ok(false) => {
                self.transition(Transition::AbortMotion)?;
                Ok(reject("Execution returned false"))
            },
            Err(err) => {
                error!("Move to '{}' aborted: {}", target_id, err);
                self.transition(Transition::AbortMotion)?;
                Ok(reject(format!("Execution failed: {}", err)))
            },
        }
    }

    fn execute_action<F>(
        &mut self,
        action_id: &str,
        extra: Option<&RequirementSet>,
        check_coordinates: bool,
        execute: F,
    ) -> Result<MoveValidationResult, MotionError>
    where
        F: FnOnce(&mut MovementExecutor) -> Result<bool, ExecutionError>,
    {
        if let Some(issue) = self.check_action_preconditions(action_id) {
            return Ok(reject(issue));
        }
        if check_coordinates {
            if let Some(issue) = self.check_drift() {
                return Ok(reject(issue));
            }
        }
        if let Some(issue) = self.check_action_context(action_id, extra) {
            return Ok(reject(issue));
        }

        debug!("Executing action '{}'", action_id);
        match execute(&mut self.executor) {
            Ok(true) => {
                info!("Action '{}' complete", action_id);
                Ok(MoveValidationResult::ok())
            },
            Ok(false) => Ok(reject("Execution returned false")),
            Err(err) => {
                error!("Action '{}' failed: {}", action_id, err);
                Ok(reject(format!("Execution failed: {}", err)))
            },
        }
    }

    // ==================== 分步校验 ====================

    fn check_homed(&mut self) -> Option<String> {
        match self.executor.axes_homed() {
            Ok(homed) => {
                let unhomed = homed.unhomed();
                if unhomed.is_empty() {
                    None
                } else {
                    Some(format!(
                        "All axes must be homed before performing moves/actions. Unhomed axes: {}",
                        unhomed
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))
                }
            },
            Err(err) => Some(format!("Unable to read homing state: {}", err)),
        }
    }

    /// 读取实际坐标并与当前逻辑位置比较
    fn check_drift(&mut self) -> Option<String> {
        match self.executor.position() {
            Ok(observed) => self.validate_machine_state(&observed).reason,
            Err(err) => Some(format!("Unable to read machine position: {}", err)),
        }
    }

    /// 实际坐标是否与当前逻辑位置一致
    pub fn validate_machine_state(&self, observed: &ObservedCoordinates) -> MoveValidationResult {
        match self.registry.validate_physical_coordinates(
            &self.context.position_id,
            observed,
            self.context.z_height_id.as_deref(),
        ) {
            Some(err) => MoveValidationResult::reject(format!(
                "Machine state validation failed: {}. Machine may not be at expected position '{}'.",
                err, self.context.position_id
            )),
            None => MoveValidationResult::ok(),
        }
    }

    fn check_topology(&self, target_id: &str) -> Option<String> {
        let Ok(target) = self.registry.get(target_id) else {
            return Some(format!("Unknown target position '{}'.", target_id));
        };
        let current_id = self.context.position_id.as_str();
        let Ok(current) = self.registry.get(current_id) else {
            return Some(format!("Current position '{}' is not registered.", current_id));
        };

        if self.state == MotionState::ToolEngaged {
            if target_id != current_id {
                return Some("Cannot leave the ready point while the tool is engaged.".to_string());
            }
            return None;
        }

        if !current.allowed_destinations.contains(target_id) {
            return Some(format!(
                "Cannot move from '{}' to '{}'. Allowed destinations: {}.",
                current_id,
                target_id,
                format_options(current.allowed_destinations.iter())
            ));
        }
        if !target.allowed_origins.contains(current_id) {
            return Some(format!(
                "'{}' cannot accept moves from '{}'. Allowed origins: {}.",
                target_id,
                current_id,
                format_options(target.allowed_origins.iter())
            ));
        }
        None
    }

    /// 目标位置的 z 高度策略与需求
    fn check_target_rules(&self, target_id: &str, extra: Option<&RequirementSet>) -> Option<String> {
        let Ok(target) = self.registry.get(target_id) else {
            return Some(format!("Unknown target position '{}'.", target_id));
        };

        if self.state != MotionState::ToolEngaged {
            if let Some(issue) = target
                .z_height_policy
                .validate(self.context.z_height_id.as_deref())
            {
                return Some(issue);
            }
        }
        if let Some(issue) = target.requirements.first_unsatisfied(&self.context) {
            return Some(issue);
        }
        extra.and_then(|set| set.first_unsatisfied(&self.context))
    }

    /// 动作的接合、工具与位置范围约束
    fn check_action_preconditions(&self, action_id: &str) -> Option<String> {
        let Ok(action) = self.registry.get_action(action_id) else {
            return Some(format!("Unknown action '{}'.", action_id));
        };
        let engaged = self.state == MotionState::ToolEngaged;

        if action.requires_tool_engaged && !engaged {
            return Some(format!(
                "Action '{}' requires the tool to be engaged.",
                action_id
            ));
        }
        if action.blocked_when_engaged && engaged {
            return Some(format!(
                "Action '{}' cannot be performed while tool is engaged. Tool must be disengaged first.",
                action_id
            ));
        }

        if engaged {
            if let Some(ready_id) = self.context.engaged_ready_position_id.as_deref() {
                if let Ok(ready) = self.registry.get(ready_id) {
                    let allowed = &ready.engagement.allowed_actions;
                    if !allowed.is_empty() && !allowed.contains(action_id) {
                        return Some(format!(
                            "Action '{}' is not permitted while engaged at '{}'. Allowed actions: {}.",
                            action_id,
                            ready_id,
                            format_options(allowed.iter())
                        ));
                    }
                }
            }
        }

        if let Some(required) = action.required_tool_id.as_deref() {
            if self.context.active_tool_id.as_deref() != Some(required) {
                return Some(format!(
                    "Action '{}' requires tool '{}'. Current tool: '{}'.",
                    action_id,
                    required,
                    self.context.active_tool_id.as_deref().unwrap_or("none")
                ));
            }
        }

        if !action.position_scope.is_empty() {
            let reference = if engaged {
                self.context
                    .engaged_ready_position_id
                    .as_deref()
                    .unwrap_or(self.context.position_id.as_str())
            } else {
                self.context.position_id.as_str()
            };
            if !action.position_scope.contains(reference) {
                return Some(format!(
                    "Action '{}' only permitted at: {}. Current position: '{}'.",
                    action_id,
                    format_options(action.position_scope.iter()),
                    reference
                ));
            }
        }

        None
    }

    /// 动作的需求、排除条件与附加需求
    fn check_action_context(&self, action_id: &str, extra: Option<&RequirementSet>) -> Option<String> {
        let Ok(action) = self.registry.get_action(action_id) else {
            return Some(format!("Unknown action '{}'.", action_id));
        };
        if let Some(issue) = action.requirements.first_unsatisfied(&self.context) {
            return Some(issue);
        }
        if let Some(issue) = action.excludes.first_violated_exclusion(&self.context) {
            return Some(issue);
        }
        extra.and_then(|set| set.first_unsatisfied(&self.context))
    }

    // ==================== 仅校验入口 ====================

    /// 校验移动请求（不读取实际坐标，不执行）
    pub fn validate_move(&self, request: &MoveRequest) -> MoveValidationResult {
        if self.state == MotionState::Moving {
            return MoveValidationResult::reject(ALREADY_EXECUTING);
        }
        let target_id = request.target_position_id.as_str();
        match self
            .check_topology(target_id)
            .or_else(|| self.check_target_rules(target_id, None))
        {
            Some(issue) => MoveValidationResult::reject(issue),
            None => MoveValidationResult::ok(),
        }
    }

    /// 校验动作当前是否可执行（不执行）
    pub fn perform_action(&self, action_id: &str) -> MoveValidationResult {
        match self
            .check_action_preconditions(action_id)
            .or_else(|| self.check_action_context(action_id, None))
        {
            Some(issue) => reject(issue),
            None => MoveValidationResult::ok(),
        }
    }

    /// 登记移动请求并进入 Moving
    ///
    /// 携带动作的请求只做动作校验。成功后调用方负责驱动硬件，
    /// 并以 [`complete_move`](Self::complete_move) 或 [`abort_move`](Self::abort_move) 结束。
    ///
    /// 工具接合时请求当前就绪点返回 [`MoveValidationResult::in_place`]：
    /// 状态不变，没有待完成的移动，调用方不得再调用 `complete_move` / `abort_move`。
    pub fn request_move(&mut self, request: &MoveRequest) -> Result<MoveValidationResult, MotionError> {
        if let Some(action_id) = request.action.as_deref() {
            return Ok(self.perform_action(action_id));
        }
        if self.state == MotionState::Moving {
            return Ok(reject(ALREADY_EXECUTING));
        }

        let validation = self.validate_move(request);
        if !validation.valid {
            warn!("Move request rejected: {}", validation.reason());
            return Ok(validation);
        }
        if self.state == MotionState::ToolEngaged {
            return Ok(MoveValidationResult::in_place());
        }

        self.context.pending_move = Some(request.clone());
        self.transition(Transition::BeginMotion)?;
        debug!("Move to '{}' started", request.target_position_id);
        Ok(validation)
    }

    /// 完成当前移动，上下文前进到目标位置
    ///
    /// # 参数
    /// - `tool_still_engaged`: 到达后工具保持接合，进入 ToolEngaged
    ///
    /// # 错误
    /// - 没有待完成的移动
    /// - 保持接合但目标不允许接合，或接合需求不满足（仍处于 Moving，可 `abort_move`）
    /// - 离开接合状态时接合条件已不成立
    pub fn complete_move(&mut self, tool_still_engaged: bool) -> Result<(), MotionError> {
        let Some(pending) = self.context.pending_move.clone() else {
            error!("complete_move called without a pending move");
            return Err(MotionError::InvariantViolation(
                "Cannot complete move when no pending move is recorded.".to_string(),
            ));
        };
        let target = self.registry.get(&pending.target_position_id)?.identifier.clone();

        if tool_still_engaged {
            self.assert_engagement_entry_ready(&target)?;
            self.transition(Transition::CompleteMotionWithTool)?;
            self.context.position_id = target.clone();
            self.context.engaged_ready_position_id = Some(target);
            if self.context.engaged_tool_id.is_none() {
                self.context.engaged_tool_id = self.context.active_tool_id.clone();
            }
            self.set_engaged_flag(true);
        } else {
            self.assert_engagement_exit_ready()?;
            self.transition(Transition::CompleteMotion)?;
            self.context.position_id = target;
            self.context.engaged_ready_position_id = None;
            self.context.engaged_tool_id = None;
        }
        self.context.pending_move = None;
        Ok(())
    }

    /// 放弃当前移动，上下文不前进
    pub fn abort_move(&mut self) -> Result<(), MotionError> {
        warn!("Move aborted at '{}'", self.context.position_id);
        self.transition(Transition::AbortMotion)
    }

    // ==================== 工具接合 ====================

    /// 在当前就绪点接合工具
    pub fn request_tool_engagement(&mut self) -> Result<MoveValidationResult, MotionError> {
        if self.state != MotionState::Idle {
            return Ok(reject(
                "Tool engagement is only permitted while idle at a ready point.",
            ));
        }

        let position = self.registry.get(&self.context.position_id)?;
        if !position.allows_tool_engagement {
            return Ok(reject(format!(
                "Tool engagement is not permitted at '{}'.",
                position.identifier
            )));
        }
        if let Some(issue) = position.engagement_requirements().first_unsatisfied(&self.context) {
            return Ok(reject(format!("Cannot engage tool: {}", issue)));
        }
        let ready_id = position.identifier.clone();

        self.transition(Transition::EngageTool)?;
        self.context.engaged_ready_position_id = Some(ready_id.clone());
        self.context.engaged_tool_id = self.context.active_tool_id.clone();
        self.set_engaged_flag(true);
        info!("Tool engaged at '{}'", ready_id);
        Ok(MoveValidationResult::ok())
    }

    /// 解除接合
    ///
    /// # 错误
    /// 接合条件在接合期间已不成立时返回 [`MotionError::InvariantViolation`]。
    pub fn request_tool_disengagement(&mut self) -> Result<MoveValidationResult, MotionError> {
        if self.state != MotionState::ToolEngaged {
            return Ok(reject("No tool is currently engaged."));
        }
        if self.context.engaged_ready_position_id.is_none() {
            return Err(MotionError::InvariantViolation(
                "Tool is engaged but the engaged ready position is unknown.".to_string(),
            ));
        }

        self.assert_engagement_exit_ready()?;
        self.set_engaged_flag(false);
        self.transition(Transition::DisengageTool)?;
        self.context.engaged_ready_position_id = None;
        self.context.engaged_tool_id = None;
        info!("Tool disengaged at '{}'", self.context.position_id);
        Ok(MoveValidationResult::ok())
    }

    /// 以到达后的上下文校验目标就绪点的接合条件
    fn assert_engagement_entry_ready(&self, target_id: &str) -> Result<(), MotionError> {
        let position = self.registry.get(target_id)?;
        if !position.allows_tool_engagement {
            error!("Move completed with tool engaged at '{}'", target_id);
            return Err(MotionError::InvariantViolation(format!(
                "Tool engagement is not permitted at '{}'.",
                target_id
            )));
        }
        let mut arrived = self.context.clone();
        arrived.position_id = target_id.to_string();
        if let Some(issue) = position.engagement_requirements().first_unsatisfied(&arrived) {
            return Err(MotionError::InvariantViolation(format!(
                "Cannot engage tool: {}",
                issue
            )));
        }
        Ok(())
    }

    fn assert_engagement_exit_ready(&self) -> Result<(), MotionError> {
        let Some(ready_id) = self.context.engaged_ready_position_id.as_deref() else {
            return Ok(());
        };
        let position = self.registry.get(ready_id)?;
        if let Some(issue) = position.engagement_requirements().first_unsatisfied(&self.context) {
            error!("Engagement requirements lost at '{}': {}", ready_id, issue);
            return Err(MotionError::InvariantViolation(format!(
                "Cannot exit tool-engaged state: {}",
                issue
            )));
        }
        Ok(())
    }

    fn set_engaged_flag(&mut self, engaged: bool) {
        let Some(tool_id) = self.context.engaged_tool_id.clone() else {
            return;
        };
        if let Some(status) = self.context.tool_states.get_mut(&tool_id) {
            status.engaged = engaged;
            status.ready_position_id = if engaged {
                self.context.engaged_ready_position_id.clone()
            } else {
                None
            };
        }
    }

    // ==================== 状态转换 ====================

    fn transition(&mut self, transition: Transition) -> Result<(), MotionError> {
        let next = self.state.apply(transition)?;
        debug!("{:?} --{:?}--> {:?}", self.state, transition, next);

        if next == MotionState::Moving && self.context.pending_move.is_none() {
            error!("Entered Moving without a pending move");
            return Err(MotionError::InvariantViolation(
                "Entered moving state without a pending move.".to_string(),
            ));
        }
        if next != MotionState::Moving {
            self.context.pending_move = None;
        }
        self.state = next;
        Ok(())
    }
}

/// 初始上下文：全局就绪点 + 配置中的孔板、分配器与称量台
fn initial_context(
    registry: &PositionRegistry,
    config: &SystemConfig,
) -> Result<MotionContext, MotionError> {
    let mut context = MotionContext::new(registry.global_ready().identifier.clone());
    if !config.deck.wells.is_empty() {
        context.deck = Some(Deck::from_layout(
            &config.deck,
            config.safety.max_weight_per_well,
        )?);
    }
    context.piston_dispensers = PistonDispenser::from_layout(&config.dispensers);
    context.scale = config.scale;
    Ok(context)
}
