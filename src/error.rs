/// 错误类型定义
///
/// 库内所有操作都返回 [`DispatchError`]，二进制入口再用 anyhow 包装上下文
use thiserror::Error;

/// 邮件分发错误
#[derive(Debug, Error)]
pub enum DispatchError {
    /// 配置缺失或无效（例如交换时未设置授权码）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 没有可用的凭据，或凭据无法续期
    #[error("认证错误: {0}")]
    Authentication(String),

    /// OAuth2 Token 端点请求失败（授权码交换或刷新）
    #[error("OAuth2 Token 请求失败: {0}")]
    Token(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// 邮件地址无效或 MIME 构建失败
    #[error("邮件构建失败: {0}")]
    Compose(String),

    /// Gmail API 返回非成功状态
    #[error("Gmail API 返回错误 {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error("配置文件解析失败: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DispatchError {
    /// 包装 oauth2 crate 返回的 Token 请求错误
    pub(crate) fn token<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Token(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = DispatchError::Api {
            status: 403,
            body: "insufficient scope".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("insufficient scope"));
    }

    #[test]
    fn test_token_error_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = DispatchError::token(io);
        assert!(err.source().is_some());
    }
}
