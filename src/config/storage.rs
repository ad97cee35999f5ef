/// 凭据存储模块
///
/// 负责将 OAuth2 凭据持久化到 JSON 文件；测试或宿主应用可替换为内存实现
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;
use crate::mail::gmail::types::OAuthCredential;

/// 凭据存储接口
pub trait CredentialStore: Send + Sync {
    /// 是否已保存凭据（仅检查存在性，不检查有效性）
    fn exists(&self) -> bool;

    /// 读取凭据，不存在时返回 `None`
    fn load(&self) -> Result<Option<OAuthCredential>>;

    /// 覆盖式保存
    fn save(&self, credential: &OAuthCredential) -> Result<()>;

    /// 删除凭据，不存在时不报错
    fn remove(&self) -> Result<()>;
}

/// 基于文件的凭据存储
///
/// 目录权限 0700，文件权限 0600（Unix）
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        let Some(parent) = self.path.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() || parent.exists() {
            return Ok(());
        }

        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(parent)?;

        tracing::debug!("创建凭据目录: {}", parent.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialStore for FileCredentialStore {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn load(&self) -> Result<Option<OAuthCredential>> {
        if !self.path.exists() {
            tracing::debug!("凭据文件不存在: {}", self.path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)?;
        let credential: OAuthCredential = serde_json::from_str(&content)?;

        Ok(Some(credential))
    }

    fn save(&self, credential: &OAuthCredential) -> Result<()> {
        self.ensure_parent_dir()?;

        let content = serde_json::to_vec(credential)?;

        // 先写临时文件再替换，避免中途失败留下半个文件
        let tmp = self.temp_path();
        {
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&tmp)?;
            file.write_all(&content)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!("凭据已写入: {}", self.path.display());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("🗑️ 已删除凭据文件: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 内存凭据存储
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credential: Mutex<Option<OAuthCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带初始凭据创建
    pub fn with_credential(credential: OAuthCredential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<OAuthCredential>> {
        self.credential
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn exists(&self) -> bool {
        self.slot().is_some()
    }

    fn load(&self) -> Result<Option<OAuthCredential>> {
        Ok(self.slot().clone())
    }

    fn save(&self, credential: &OAuthCredential) -> Result<()> {
        *self.slot() = Some(credential.clone());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}
