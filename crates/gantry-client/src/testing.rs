//! 单元测试共用的注册表与模拟平台

use crate::state_machine::MotionStateMachine;
use gantry_config::{
    DeckLayout, DispenserLayout, PositionRegistry, ScaleStation, SystemConfig, WellSpec,
};
use gantry_driver::Scale;
use gantry_driver::mock::{MockMachine, MockScale};
use serde_json::{Value, json};

pub const SCALE_X: f64 = 250.0;
pub const SCALE_Y: f64 = 120.0;

/// 两个孔位、一个称量台、两个分配器的注册表
pub fn registry_json() -> Value {
    json!({
        "positions": [
            {
                "id": "global_ready",
                "type": "GLOBAL_READY",
                "allowed_origins": ["MOLD_READY", "SCALE_READY", "DISPENSER_READY"],
                "allowed_destinations": ["MOLD_READY"],
                "coordinates": { "x": 150.0, "y": 200.0, "z": "USE_Z_HEIGHT_POLICY", "v": "PLACEHOLDER_V" }
            },
            {
                "id": "mold_ready_A1",
                "type": "MOLD_READY",
                "allowed_origins": ["GLOBAL_READY", "MOLD_READY", "SCALE_READY", "DISPENSER_READY"],
                "allowed_destinations": ["GLOBAL_READY", "MOLD_READY", "SCALE_READY"],
                "coordinates": { "x": 30.0, "y": 60.0, "z": "USE_Z_HEIGHT_POLICY", "v": "PLACEHOLDER_V" },
                "z_height_policy": { "allowed": ["mold_transfer_safe"] }
            },
            {
                "id": "mold_ready_A2",
                "type": "MOLD_READY",
                "allowed_origins": ["GLOBAL_READY", "MOLD_READY", "SCALE_READY", "DISPENSER_READY"],
                "allowed_destinations": ["GLOBAL_READY", "MOLD_READY", "SCALE_READY"],
                "coordinates": { "x": 72.5, "y": 60.0, "z": "USE_Z_HEIGHT_POLICY", "v": "PLACEHOLDER_V" },
                "z_height_policy": { "allowed": ["mold_transfer_safe"] }
            },
            {
                "id": "scale_ready",
                "type": "SCALE_READY",
                "allowed_origins": ["MOLD_READY"],
                "allowed_destinations": ["MOLD_READY", "DISPENSER_READY", "GLOBAL_READY"],
                "coordinates": { "x": SCALE_X, "y": "PLACEHOLDER_Y", "z": "PLACEHOLDER_Z" },
                "requirements": { "active_tool_id": "manipulator" }
            },
            {
                "id": "dispenser_ready_0",
                "type": "DISPENSER_READY",
                "allowed_origins": ["SCALE_READY", "MOLD_READY"],
                "allowed_destinations": ["MOLD_READY", "SCALE_READY", "GLOBAL_READY"],
                "coordinates": { "x": 320.0, "y": 337.0 },
                "allows_tool_engagement": true,
                "engagement": {
                    "requirements": { "active_tool_id": "manipulator" },
                    "allowed_actions": ["retrieve_piston"]
                }
            },
            {
                "id": "dispenser_ready_1",
                "type": "DISPENSER_READY",
                "allowed_origins": ["SCALE_READY", "MOLD_READY"],
                "allowed_destinations": ["MOLD_READY", "SCALE_READY", "GLOBAL_READY"],
                "coordinates": { "x": 362.5, "y": 337.0 }
            }
        ],
        "actions": [
            { "id": "home_all", "requirements": { "payload_state": "empty" }, "excludes": { "active_tool_id": "manipulator" } },
            { "id": "home_xyz", "requirements": { "payload_state": "empty" } },
            { "id": "home_manipulator", "excludes": { "payload_state": ["mold_without_cap", "mold_with_cap"] } },
            { "id": "home_trickler" },
            {
                "id": "pickup_tool",
                "position_scope": ["GLOBAL_READY"],
                "requirements": { "z_height_id": "mold_transfer_safe" },
                "excludes": { "active_tool_id": "manipulator" }
            },
            {
                "id": "park_tool",
                "position_scope": ["GLOBAL_READY"],
                "required_tool_id": "manipulator",
                "requirements": { "payload_state": "empty" }
            },
            {
                "id": "pick_mold",
                "position_scope": ["MOLD_READY"],
                "required_tool_id": "manipulator",
                "blocked_when_engaged": true,
                "excludes": { "payload_state": ["mold_without_cap", "mold_with_cap"] }
            },
            {
                "id": "place_mold",
                "position_scope": ["MOLD_READY"],
                "required_tool_id": "manipulator",
                "blocked_when_engaged": true,
                "requirements": { "payload_state": ["mold_without_cap", "mold_with_cap"], "mold_on_scale": false }
            },
            {
                "id": "place_mold_on_scale",
                "position_scope": ["SCALE_READY"],
                "required_tool_id": "manipulator",
                "requirements": { "payload_state": "mold_without_cap" }
            },
            { "id": "pick_mold_from_scale", "position_scope": ["SCALE_READY"], "requirements": { "mold_on_scale": true } },
            { "id": "dispense_powder", "position_scope": ["SCALE_READY"], "requirements": { "mold_on_scale": true } },
            { "id": "tamp", "position_scope": ["SCALE_READY"], "requirements": { "mold_on_scale": true } },
            {
                "id": "retrieve_piston",
                "position_scope": ["DISPENSER_READY"],
                "required_tool_id": "manipulator",
                "requirements": { "payload_state": "mold_without_cap" }
            },
            {
                "id": "place_top_piston",
                "position_scope": ["DISPENSER_READY"],
                "required_tool_id": "manipulator",
                "requirements": { "payload_state": "mold_without_cap" }
            }
        ],
        "z_heights": {
            "mold_transfer_safe": { "z_coordinate": 215.0 },
            "dispenser_safe": { "z_coordinate": 254.0 }
        },
        "coordinate_tolerance": { "x": 0.5, "y": 0.5, "z": 0.5, "v": 0.5 }
    })
}

pub fn registry() -> PositionRegistry {
    PositionRegistry::from_json_str(&registry_json().to_string()).unwrap()
}

pub fn system_config() -> SystemConfig {
    SystemConfig {
        scale: Some(ScaleStation {
            x: SCALE_X,
            y: SCALE_Y,
        }),
        dispensers: DispenserLayout {
            count: 2,
            pistons_per_dispenser: 3,
            ..Default::default()
        },
        deck: DeckLayout {
            wells: vec![
                WellSpec {
                    id: "A1".to_string(),
                    x: 30.0,
                    y: 60.0,
                    max_weight: None,
                },
                WellSpec {
                    id: "A2".to_string(),
                    x: 72.5,
                    y: 60.0,
                    max_weight: Some(4.0),
                },
            ],
        },
        ..Default::default()
    }
}

/// 模拟平台：未回零、无工具，位于全局就绪点
pub struct Rig {
    pub platform: MotionStateMachine,
    pub machine: MockMachine,
    pub scale: MockScale,
}

pub fn rig() -> Rig {
    rig_with(registry(), system_config())
}

pub fn rig_with(registry: PositionRegistry, config: SystemConfig) -> Rig {
    let machine = MockMachine::new();
    let scale = MockScale::new(&machine, 0.5);
    let platform = MotionStateMachine::new(
        registry,
        config,
        Box::new(machine.clone()),
        Some(Box::new(scale.clone()) as Box<dyn Scale>),
    )
    .unwrap();
    Rig {
        platform,
        machine,
        scale,
    }
}

/// 已回零并持有机械手
pub fn ready_rig() -> Rig {
    let mut rig = rig();
    rig.platform
        .update_context(crate::ContextPatch::new().payload(crate::payload::EMPTY));
    assert!(rig.platform.home_all().unwrap().valid);
    assert!(rig.platform.pickup_tool("manipulator").unwrap().valid);
    assert!(rig.platform.home_manipulator().unwrap().valid);
    rig
}
