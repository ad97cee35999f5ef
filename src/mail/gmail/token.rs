/// Token 刷新管理模块
use oauth2::PkceCodeVerifier;
use std::sync::Arc;

use crate::config::storage::CredentialStore;
use crate::error::{DispatchError, Result};
use crate::mail::gmail::oauth::GmailOAuthClient;
use crate::mail::gmail::types::OAuthCredential;

/// Token 管理器
///
/// 从存储读取凭据，过期时用 Refresh Token 换取新凭据并写回存储
pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    oauth: GmailOAuthClient,
}

impl TokenManager {
    pub fn new(store: Arc<dyn CredentialStore>, oauth: GmailOAuthClient) -> Self {
        Self { store, oauth }
    }

    /// 读取凭据，必要时刷新
    ///
    /// # Returns
    /// 存储中没有凭据时返回 `None`，否则返回未过期的凭据
    ///
    /// # Errors
    /// - 凭据文件读取/解析失败
    /// - 凭据已过期但没有 Refresh Token
    /// - 刷新请求失败
    /// - 写回存储失败
    pub async fn refresh_if_needed(&self) -> Result<Option<OAuthCredential>> {
        let Some(credential) = self.store.load()? else {
            return Ok(None);
        };

        if !credential.is_expired() {
            tracing::debug!("Access Token 未过期（过期时间: {}）", credential.expires_at());
            return Ok(Some(credential));
        }

        tracing::info!(
            "Access Token 已过期（{}），自动刷新",
            credential.expires_at()
        );

        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            DispatchError::Authentication(
                "Access Token 已过期且没有 Refresh Token，请重新授权".to_string(),
            )
        })?;

        let refreshed = self.oauth.refresh(refresh_token).await?;
        self.store.save(&refreshed)?;

        tracing::info!(
            "✅ Access Token 刷新成功（新的过期时间: {}）",
            refreshed.expires_at()
        );
        tracing::debug!("新 Token: {}", refreshed.redacted_access_token());

        Ok(Some(refreshed))
    }

    /// 交换授权码并保存
    ///
    /// 已有凭据时不做任何事，返回 `None`
    pub async fn exchange_and_store(
        &self,
        code: &str,
        pkce_verifier: Option<PkceCodeVerifier>,
    ) -> Result<Option<OAuthCredential>> {
        if self.store.exists() {
            tracing::info!("凭据已存在，跳过授权码交换");
            return Ok(None);
        }

        let credential = self.oauth.exchange_code(code, pkce_verifier).await?;
        self.store.save(&credential)?;

        tracing::info!("✅ 授权码交换成功，凭据已保存");
        Ok(Some(credential))
    }

    pub fn oauth(&self) -> &GmailOAuthClient {
        &self.oauth
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }
}
