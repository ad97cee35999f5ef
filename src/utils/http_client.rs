/// 全局共享的 HTTP 客户端
///
/// 复用连接池，避免每次发送都创建新的 reqwest::Client
use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// 全局 HTTP 客户端实例（使用懒初始化）
pub static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        // 超时配置
        .timeout(Duration::from_secs(30)) // 整体请求超时 30 秒
        .connect_timeout(Duration::from_secs(10)) // 连接建立超时 10 秒
        .user_agent(concat!("gmail-dispatcher/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("构建全局 HTTP 客户端失败，使用默认配置: {}", e);
            Client::new()
        })
});

/// 获取全局 HTTP 客户端
pub fn get_client() -> &'static Client {
    &HTTP_CLIENT
}
