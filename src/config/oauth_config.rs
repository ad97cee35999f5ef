/// OAuth2 客户端配置
///
/// 支持从 Google 标准格式的 `client_secret.json` 或显式参数构建客户端配置
use serde::Deserialize;
use std::path::Path;

use crate::config::Endpoints;
use crate::error::{DispatchError, Result};

/// 未配置重定向地址时使用的带外（out-of-band）地址，授权码显示在浏览器中由用户手动粘贴
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// OAuth2 客户端配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Google OAuth2 客户端 ID
    pub client_id: String,

    /// Google OAuth2 客户端密钥（为空时按公共客户端处理）
    pub client_secret: String,

    /// 重定向 URI
    pub redirect_uri: String,

    /// 授权端点
    pub auth_uri: String,

    /// Token 端点
    pub token_uri: String,
}

/// `client_secret.json` 顶层结构：`installed`（桌面应用）或 `web`（Web 应用）
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecretEntry>,
    web: Option<ClientSecretEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretEntry {
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl ClientConfig {
    /// 使用显式参数构建配置
    ///
    /// `redirect_uri` 为空时回落到 [`OOB_REDIRECT_URI`]
    pub fn explicit(
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        endpoints: &Endpoints,
    ) -> Self {
        let redirect_uri = if redirect_uri.is_empty() {
            OOB_REDIRECT_URI.to_string()
        } else {
            redirect_uri.to_string()
        };

        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri,
            auth_uri: endpoints.auth_url.clone(),
            token_uri: endpoints.token_url.clone(),
        }
    }

    /// 解析客户端配置
    ///
    /// `secret_path` 指向的文件存在时优先使用文件内容，忽略显式参数
    ///
    /// # Errors
    /// - 密钥文件读取或解析失败
    /// - 最终 client_id 为空
    pub fn resolve(
        secret_path: &Path,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        endpoints: &Endpoints,
    ) -> Result<Self> {
        let config = if secret_path.exists() {
            tracing::info!("✅ 从客户端密钥文件加载 OAuth2 配置: {}", secret_path.display());
            Self::from_secret_file(secret_path, endpoints)?
        } else {
            Self::explicit(client_id, client_secret, redirect_uri, endpoints)
        };

        if config.client_id.is_empty() {
            return Err(DispatchError::Configuration(format!(
                "未配置 OAuth2 client_id，且客户端密钥文件不存在: {}",
                secret_path.display()
            )));
        }

        Ok(config)
    }

    /// 读取 Google 标准格式的客户端密钥文件
    pub fn from_secret_file(path: &Path, endpoints: &Endpoints) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: ClientSecretFile = serde_json::from_str(&content)?;

        let entry = file.installed.or(file.web).ok_or_else(|| {
            DispatchError::Configuration(format!(
                "客户端密钥文件缺少 installed 或 web 段: {}",
                path.display()
            ))
        })?;

        let redirect_uri = entry
            .redirect_uris
            .into_iter()
            .next()
            .unwrap_or_else(|| OOB_REDIRECT_URI.to_string());

        Ok(Self {
            client_id: entry.client_id,
            client_secret: entry.client_secret,
            redirect_uri,
            auth_uri: entry.auth_uri.unwrap_or_else(|| endpoints.auth_url.clone()),
            token_uri: entry
                .token_uri
                .unwrap_or_else(|| endpoints.token_url.clone()),
        })
    }

    /// 替换重定向地址（本地回调监听时使用）
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }
}
