//! 运动安全集成测试
//!
//! 使用 fixtures 中的注册表与系统配置，在模拟硬件上验证：
//! - z 高度策略
//! - 回零检查及回零动作豁免
//! - 接合状态下的移动限制
//! - 动作位置范围与分配器活塞检查
//! - 取放模具往返

mod common;

use common::*;
use gantry_sdk::client::MotionTarget;
use gantry_sdk::prelude::*;
use serde_json::json;

// ==================== z 高度 ====================

#[test]
fn test_z_height_policy_scenario() {
    let mut rig = rig();
    let request = MoveRequest::to("mold_ready_A1");

    // 未设置 z 高度等级
    let result = rig.platform.validate_move(&request);
    assert_rejected(&result, "z-height is not set");

    rig.platform
        .update_context(ContextPatch::new().z_height("mold_transfer_safe"));
    assert_valid(&rig.platform.validate_move(&request));

    rig.platform
        .update_context(ContextPatch::new().z_height("dispenser_safe"));
    assert_rejected(&rig.platform.validate_move(&request), "not permitted");
}

#[test]
fn test_z_height_derived_coordinate() {
    let mut rig = connected();
    // 连接后位于 global_ready，Z = mold_transfer_safe = 215
    assert_valid(&rig.platform.move_to_well("A1").unwrap());

    // Z 偏出容差
    let mut rig = connected();
    rig.machine.set_position(Axis::Z, 216.0);
    let result = rig.platform.move_to_well("A1").unwrap();
    assert_rejected(&result, "Z coordinate mismatch: expected 215, got 216");
    assert_eq!(rig.platform.context().position_id, "global_ready");
}

// ==================== 回零 ====================

#[test]
fn test_unhomed_axis_blocks_operations() {
    let mut rig = connected();
    rig.machine.set_homed(Axis::Y, false);

    assert_rejected(
        &rig.platform.move_to_well("A1").unwrap(),
        "Unhomed axes: Y",
    );
    assert_rejected(&rig.platform.park_tool().unwrap(), "Unhomed axes: Y");

    // 回零动作不受限制
    assert_valid(&rig.platform.home_manipulator().unwrap());
    assert_valid(&rig.platform.home_trickler().unwrap());
    assert_valid(&rig.platform.home_xyz().unwrap());

    // XYZ 回零把龙门带到原点，逻辑位置仍是 global_ready
    let result = rig.platform.move_to_well("A1").unwrap();
    assert_rejected(&result, "Machine may not be at expected position 'global_ready'.");
}

#[test]
fn test_homing_skips_coordinate_check() {
    let mut rig = rig();
    rig.machine.set_position(Axis::X, 3.0);
    rig.platform
        .update_context(ContextPatch::new().payload(payload::EMPTY));

    assert_valid(&rig.platform.home_all().unwrap());
    assert_eq!(rig.machine.position_of(Axis::X), 150.0);
    assert_eq!(
        rig.platform.context().z_height_id.as_deref(),
        Some("mold_transfer_safe")
    );
}

// ==================== 接合 ====================

#[test]
fn test_engaged_tool_cannot_leave_ready_point() {
    let mut rig = connected();
    assert_valid(&rig.platform.move_to_well("A1").unwrap());
    assert_valid(&rig.platform.move_to_scale().unwrap());
    assert_valid(&rig.platform.move_to_dispenser(0).unwrap());
    assert_valid(&rig.platform.request_tool_engagement().unwrap());
    assert_eq!(rig.platform.state(), MotionState::ToolEngaged);

    for target in ["mold_ready_A1", "scale_ready", "global_ready", "dispenser_ready_1"] {
        let result = rig
            .platform
            .validate_move(&MoveRequest::to(target));
        assert_rejected(&result, "Cannot leave the ready point while the tool is engaged.");
    }
    assert_rejected(
        &rig.platform.move_to_well("A2").unwrap(),
        "Cannot leave the ready point",
    );
    assert_eq!(rig.platform.context().position_id, "dispenser_ready_0");

    assert_valid(&rig.platform.request_tool_disengagement().unwrap());
    assert_valid(&rig.platform.move_to_well("A2").unwrap());
}

#[test]
fn test_engagement_requires_allowed_position() {
    let mut rig = connected();
    let result = rig.platform.request_tool_engagement().unwrap();
    assert_rejected(&result, "Tool engagement is not permitted at 'global_ready'.");
    assert_eq!(rig.platform.state(), MotionState::Idle);
}

// ==================== 动作范围 / 活塞 ====================

#[test]
fn test_retrieve_piston_scope_scenario() {
    let mut value = registry_value();
    for action in value["actions"].as_array_mut().unwrap() {
        if action["id"] == "retrieve_piston" {
            action["position_scope"] = json!(["dispenser_ready_0"]);
        }
    }
    let mut rig = connected_with(registry_from(&value), system());
    assert_eq!(rig.platform.context().position_id, "global_ready");

    let result = rig.platform.perform_action("retrieve_piston");
    assert_eq!(
        result.reason(),
        "Action 'retrieve_piston' only permitted at: dispenser_ready_0. Current position: 'global_ready'."
    );

    let result = rig.platform.retrieve_piston(0).unwrap();
    assert_rejected(&result, "dispenser_ready_0");
}

#[test]
fn test_empty_dispenser_scenario() {
    let mut system = system();
    system.dispensers.pistons_per_dispenser = 0;
    let mut rig = connected_with(registry(), system);

    let result = rig.platform.retrieve_piston(0).unwrap();
    assert_eq!(result.reason(), "No pistons available in dispenser 0");
}

#[test]
fn test_required_tool_enforced() {
    let mut rig = connected();
    assert_valid(&rig.platform.park_tool().unwrap());
    assert!(rig.platform.context().active_tool_id.is_none());

    assert_valid(&rig.platform.move_to_well("A1").unwrap());
    assert_rejected(
        &rig.platform.pick_mold_from_well("A1").unwrap(),
        "requires tool 'manipulator'",
    );
    // 称量台就绪点要求持有机械手
    assert_rejected(
        &rig.platform.move_to_scale().unwrap(),
        "active_tool_id",
    );
}

// ==================== 取放往返 ====================

#[test]
fn test_pick_and_place_round_trip() {
    let mut rig = connected();
    assert_valid(&rig.platform.move_to_well("A2").unwrap());
    let position = rig.platform.context().position_id.clone();
    let z_height = rig.platform.context().z_height_id.clone();

    assert_valid(&rig.platform.pick_mold_from_well("A2").unwrap());
    assert_eq!(rig.platform.context().current_mold.as_deref(), Some("A2"));

    assert_valid(&rig.platform.place_mold_in_well("A2").unwrap());
    let ctx = rig.platform.context();
    assert!(ctx.current_mold.is_none());
    assert_eq!(ctx.position_id, position);
    assert_eq!(ctx.z_height_id, z_height);
    assert_eq!(ctx.payload_state.as_deref(), Some(payload::EMPTY));
}

#[test]
fn test_failed_execution_leaves_context_untouched() {
    let mut rig = connected();
    assert_valid(&rig.platform.move_to_well("A1").unwrap());
    let before = rig.platform.context().clone();

    rig.machine.fail_on("Z148");
    let result = rig.platform.pick_mold_from_well("A1").unwrap();
    assert_rejected(&result, "Execution failed");
    assert_eq!(rig.platform.context(), &before);
    assert_eq!(rig.platform.state(), MotionState::Idle);
}

#[test]
fn test_generic_protocol_false_return_aborts() {
    let mut rig = connected();
    let result = rig
        .platform
        .validate_and_execute(MotionTarget::position("mold_ready_A1"), None, |_| Ok(false))
        .unwrap();
    assert_eq!(result.reason(), "Execution returned false");
    assert_eq!(rig.platform.context().position_id, "global_ready");
    assert!(rig.platform.context().pending_move.is_none());
}
