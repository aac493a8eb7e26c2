//! 可观测性

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装 tracing：默认 info，RUST_LOG 覆盖；重复调用时忽略（测试中可多次调用）
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
