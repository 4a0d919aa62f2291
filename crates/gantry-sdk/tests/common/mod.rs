//! 集成测试共用的夹具与模拟平台
#![allow(dead_code)]

use gantry_sdk::driver::mock::{MockMachine, MockScale};
use gantry_sdk::prelude::*;
use serde_json::Value;
use std::path::PathBuf;

/// 模拟天平：每毫米下粉轴行程对应的克数
pub const GRAMS_PER_MM: f64 = 0.5;

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// 注册表夹具的原始 JSON（便于在测试中局部修改）
pub fn registry_value() -> Value {
    let content = std::fs::read_to_string(fixture("motion_platform.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

pub fn registry_from(value: &Value) -> PositionRegistry {
    PositionRegistry::from_json_str(&value.to_string()).unwrap()
}

pub fn registry() -> PositionRegistry {
    PositionRegistry::from_path(fixture("motion_platform.json")).unwrap()
}

pub fn system() -> SystemConfig {
    SystemConfig::load_from_file(fixture("system.toml")).unwrap()
}

/// 模拟硬件上的平台
pub struct Rig {
    pub platform: MotionStateMachine,
    pub machine: MockMachine,
    pub scale: MockScale,
}

pub fn rig_with(registry: PositionRegistry, system: SystemConfig) -> Rig {
    let machine = MockMachine::new();
    let scale = MockScale::new(&machine, GRAMS_PER_MM);
    let platform = MotionStateMachine::new(
        registry,
        system,
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

pub fn rig() -> Rig {
    rig_with(registry(), system())
}

/// 走完连接初始化（回零、取机械手、回零机械手）
pub fn connected_with(registry: PositionRegistry, system: SystemConfig) -> Rig {
    let Rig {
        platform,
        machine,
        scale,
    } = rig_with(registry, system);
    let mut manager = GantryManager::new(platform);
    let result = manager.connect().unwrap();
    assert!(result.valid, "connect failed: {}", result);
    Rig {
        platform: manager.into_platform(),
        machine,
        scale,
    }
}

pub fn connected() -> Rig {
    connected_with(registry(), system())
}

#[track_caller]
pub fn assert_valid(result: &MoveValidationResult) {
    assert!(result.valid, "expected valid result, got: {}", result);
}

#[track_caller]
pub fn assert_rejected(result: &MoveValidationResult, needle: &str) {
    assert!(!result.valid, "expected rejection containing {:?}", needle);
    assert!(
        result.reason().contains(needle),
        "reason {:?} does not contain {:?}",
        result.reason(),
        needle
    );
}
