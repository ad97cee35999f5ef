/// 运行配置
///
/// 从 `config.toml` 和环境变量加载存储目录、OAuth2 客户端参数与 Google 端点
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DispatchError, Result};

pub mod oauth_config;
pub mod storage;

/// 应用目录名（配置目录与数据目录下的子目录）
const APP_DIR: &str = "gmail-dispatcher";

/// 凭据文件相对存储目录的路径
const CREDENTIALS_FILE: &str = ".credentials/gmail-credentials.json";

/// 客户端密钥文件相对存储目录的路径
const CLIENT_SECRET_FILE: &str = "client_secret.json";

/// Gmail 发送权限
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub oauth: OAuthSettings,
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// 存放凭据文件和客户端密钥文件的目录
    pub dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        let dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        Self { dir }
    }
}

/// 显式的 OAuth2 客户端参数
///
/// 空字符串表示未配置；存储目录下存在 `client_secret.json` 时以文件为准
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            scopes: vec![GMAIL_SEND_SCOPE.to_string()],
        }
    }
}

/// Google 服务端点
///
/// 测试时指向本地 mock 服务器
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            api_base: "https://gmail.googleapis.com".to_string(),
        }
    }
}

impl Settings {
    /// 加载配置
    ///
    /// 优先级（从高到低）：
    /// 1. 环境变量：`GMAIL_CLIENT_ID`, `GMAIL_CLIENT_SECRET`, `OAUTH_REDIRECT_URI`,
    ///    `GMAIL_DISPATCHER_STORAGE_DIR`
    /// 2. 配置文件（`path` 或默认的 `<config_dir>/gmail-dispatcher/config.toml`）
    /// 3. 默认值
    ///
    /// 配置文件不存在时使用默认值；文件格式错误时返回错误
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        let mut settings = Self::load_from_file(&path)?;
        settings.apply_env();

        tracing::debug!("存储目录: {}", settings.storage.dir.display());
        Ok(settings)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("配置文件不存在，使用默认配置: {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;

        tracing::info!("✅ 从配置文件加载配置: {}", path.display());
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(client_id) = std::env::var("GMAIL_CLIENT_ID") {
            self.oauth.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("GMAIL_CLIENT_SECRET") {
            self.oauth.client_secret = client_secret;
        }
        if let Ok(redirect_uri) = std::env::var("OAUTH_REDIRECT_URI") {
            self.oauth.redirect_uri = redirect_uri;
        }
        if let Ok(dir) = std::env::var("GMAIL_DISPATCHER_STORAGE_DIR") {
            self.storage.dir = PathBuf::from(dir);
        }
    }

    /// 凭据文件路径：`<storage_dir>/.credentials/gmail-credentials.json`
    pub fn credentials_path(&self) -> PathBuf {
        self.storage.dir.join(CREDENTIALS_FILE)
    }

    /// 客户端密钥文件路径：`<storage_dir>/client_secret.json`
    pub fn client_secret_path(&self) -> PathBuf {
        self.storage.dir.join(CLIENT_SECRET_FILE)
    }
}

/// 默认配置文件路径
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| DispatchError::Configuration("无法获取配置目录".to_string()))?
        .join(APP_DIR);

    Ok(config_dir.join("config.toml"))
}
