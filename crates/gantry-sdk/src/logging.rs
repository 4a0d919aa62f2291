//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 订阅者，并把 `log` crate 的记录桥接到 `tracing`。
//! `RUST_LOG` 优先；未设置时使用 [`DEFAULT_DIRECTIVE`]。

use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

/// 默认过滤指令
pub const DEFAULT_DIRECTIVE: &str = "warn,gantry=info";

/// 使用默认过滤指令初始化日志
///
/// 可重复调用；已有全局订阅者时不做任何事。
pub fn init_logging() -> bool {
    init_logging_with(DEFAULT_DIRECTIVE)
}

/// 使用指定的默认过滤指令初始化日志
///
/// # 返回
/// 本次调用安装了订阅者时返回 `true`。
pub fn init_logging_with(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }
    // log → tracing
    let _ = LogTracer::init_with_filter(log::LevelFilter::Trace);
    true
}
