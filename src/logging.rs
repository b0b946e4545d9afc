//! 日志桥接
//! 库内统一使用 log 门面；开启 tracing 特性时可将 log 记录转发给 tracing 订阅者

/// 将 log 记录桥接到 tracing（重复初始化返回 false）
#[cfg(feature = "tracing")]
pub fn init_tracing_bridge() -> bool {
    match tracing_log::LogTracer::init() {
        Ok(()) => {
            tracing::debug!("log -> tracing bridge installed");
            true
        }
        Err(_) => false,
    }
}

/// 测试日志初始化（重复调用安全）
#[cfg(test)]
pub(crate) fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(all(test, feature = "tracing"))]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_installs_once() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
        let first = init_tracing_bridge();
        let second = init_tracing_bridge();
        assert!(!(first && second));
    }
}
