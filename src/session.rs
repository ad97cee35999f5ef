/// 宿主应用的登录状态查询
///
/// 分发器不持有会话机制，由宿主注入
pub trait SessionProbe: Send + Sync {
    /// 当前请求是否来自已登录的后台用户
    fn is_user_logged(&self) -> bool;
}

impl<F> SessionProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_user_logged(&self) -> bool {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_probe() {
        let logged = Arc::new(AtomicBool::new(false));
        let flag = logged.clone();
        let probe = move || flag.load(Ordering::SeqCst);

        assert!(!probe.is_user_logged());
        logged.store(true, Ordering::SeqCst);
        assert!(probe.is_user_logged());
    }
}
