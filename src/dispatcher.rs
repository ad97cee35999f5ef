/// 邮件分发器
///
/// 对外的唯一入口：持有 OAuth2 客户端与凭据存储，负责首次授权、自动续期和发送邮件
use oauth2::{CsrfToken, PkceCodeVerifier};
use std::sync::Arc;
use url::Url;

use crate::config::oauth_config::ClientConfig;
use crate::config::storage::{CredentialStore, FileCredentialStore};
use crate::config::{Endpoints, Settings};
use crate::error::{DispatchError, Result};
use crate::mail::gmail::{
    GmailApiClient, GmailOAuthClient, OAuthCredential, OutgoingMessage, SentMessage,
    TokenManager, mime,
};
use crate::session::SessionProbe;
use crate::utils::http_client;

/// Gmail 邮件分发器
///
/// 状态流转：
/// 未配置 →（交换授权码）→ 已授权 →（每次构建时按需刷新）→ 已授权 →（撤销）→ 未配置
pub struct MailDispatcher {
    tokens: TokenManager,
    api_base: String,
    http: reqwest::Client,
    session: Option<Arc<dyn SessionProbe>>,

    /// 待交换的一次性授权码
    authorization_code: Option<String>,

    /// 本地回调授权时生成的 PKCE verifier
    pkce_verifier: Option<PkceCodeVerifier>,

    /// 当前装载的凭据
    credential: Option<OAuthCredential>,
}

impl MailDispatcher {
    /// 创建分发器并立即尝试刷新已保存的凭据
    ///
    /// 没有凭据时不会失败
    ///
    /// # Errors
    /// - 客户端配置中的地址无效
    /// - 已保存的凭据无法读取，或过期后刷新失败
    pub async fn new(
        client: &ClientConfig,
        store: Arc<dyn CredentialStore>,
        endpoints: &Endpoints,
        scopes: &[String],
    ) -> Result<Self> {
        let oauth = GmailOAuthClient::new(client, scopes)?;

        let mut dispatcher = Self {
            tokens: TokenManager::new(store, oauth),
            api_base: endpoints.api_base.clone(),
            http: http_client::get_client().clone(),
            session: None,
            authorization_code: None,
            pkce_verifier: None,
            credential: None,
        };

        dispatcher.refresh_if_needed().await?;
        Ok(dispatcher)
    }

    /// 按配置创建使用文件存储的分发器
    ///
    /// `client_id` / `client_secret` / `redirect_uri` 为空时使用配置中的值；
    /// 存储目录下存在 `client_secret.json` 时以文件为准
    pub async fn from_settings(
        settings: &Settings,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<Self> {
        let client = Self::client_config(settings, client_id, client_secret, redirect_uri)?;
        Self::from_client_config(settings, &client).await
    }

    /// 解析客户端配置：显式参数优先于配置文件中的值
    pub fn client_config(
        settings: &Settings,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<ClientConfig> {
        let pick = |explicit: &str, configured: &str| -> String {
            if explicit.is_empty() {
                configured.to_string()
            } else {
                explicit.to_string()
            }
        };

        ClientConfig::resolve(
            &settings.client_secret_path(),
            &pick(client_id, &settings.oauth.client_id),
            &pick(client_secret, &settings.oauth.client_secret),
            &pick(redirect_uri, &settings.oauth.redirect_uri),
            &settings.endpoints,
        )
    }

    /// 用已解析的客户端配置和文件存储创建分发器
    pub async fn from_client_config(settings: &Settings, client: &ClientConfig) -> Result<Self> {
        let store = Arc::new(FileCredentialStore::new(settings.credentials_path()));
        Self::new(client, store, &settings.endpoints, &settings.oauth.scopes).await
    }

    /// 注入宿主的登录状态查询
    pub fn with_session(mut self, session: Arc<dyn SessionProbe>) -> Self {
        self.session = Some(session);
        self
    }

    /// 替换发送时使用的 HTTP 客户端
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// 获取授权 URL
    ///
    /// 已设置授权码时返回 `None`，避免授权流程中途重复申请
    pub fn authorization_url(&self) -> Option<Url> {
        if self.is_authorization_code_set() {
            return None;
        }

        let (url, _state) = self.tokens.oauth().authorize_url();
        Some(url)
    }

    /// 获取本地回调授权 URL
    ///
    /// URL 带 PKCE challenge，verifier 留在分发器中供随后的授权码交换使用；
    /// 返回的 `CsrfToken` 用于校验回调中的 `state`。已设置授权码时返回 `None`
    pub fn loopback_authorization_url(&mut self) -> Option<(Url, CsrfToken)> {
        if self.is_authorization_code_set() {
            return None;
        }

        let (url, state, pkce_verifier) = self.tokens.oauth().authorize_url_with_pkce();
        self.pkce_verifier = Some(pkce_verifier);
        Some((url, state))
    }

    /// 是否已保存凭据（只检查存在性）
    pub fn has_stored_credential(&self) -> bool {
        self.tokens.store().exists()
    }

    /// 用已设置的授权码换取凭据并保存
    ///
    /// 已有凭据时不覆盖
    ///
    /// # Errors
    /// - 未设置授权码
    /// - Token 请求失败
    /// - 写入存储失败
    pub async fn exchange_authorization_code(&mut self) -> Result<()> {
        let code = self
            .authorization_code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| DispatchError::Configuration("未设置授权码".to_string()))?;

        let pkce_verifier = self.pkce_verifier.take();
        if let Some(credential) = self.tokens.exchange_and_store(code, pkce_verifier).await? {
            self.credential = Some(credential);
        }

        Ok(())
    }

    /// 删除已保存的凭据，可重复调用
    pub fn revoke_credential(&mut self) -> Result<()> {
        self.tokens.store().remove()?;
        self.credential = None;
        Ok(())
    }

    /// 读取已保存的凭据，过期时刷新并写回
    ///
    /// 存储中没有凭据时同步清空当前装载的凭据
    pub async fn refresh_if_needed(&mut self) -> Result<()> {
        self.credential = self.tokens.refresh_if_needed().await?;
        Ok(())
    }

    /// 发送邮件
    ///
    /// 单次尝试，不重试
    ///
    /// # Errors
    /// - 没有已保存的凭据（不会发起任何网络请求）
    /// - 凭据过期且刷新失败
    /// - 邮件构建失败
    /// - Gmail API 请求失败
    pub async fn send(&mut self, message: &OutgoingMessage) -> Result<SentMessage> {
        if !self.has_stored_credential() {
            return Err(DispatchError::Authentication(
                "没有已保存的凭据，请先完成授权".to_string(),
            ));
        }

        self.refresh_if_needed().await?;
        let credential = self
            .credential
            .as_ref()
            .ok_or_else(|| DispatchError::Authentication("凭据已被删除".to_string()))?;

        let raw = mime::encode_raw(&mime::build_mime(message)?);

        tracing::info!(
            "📤 发送邮件: {} -> {}（{} 个附件）",
            message.from_address,
            message.to_address,
            message.attachments.len()
        );

        let api = GmailApiClient::new(
            self.http.clone(),
            self.api_base.clone(),
            credential.access_token.clone(),
        );
        let sent = api.send_raw(&raw).await?;

        tracing::info!("✅ 邮件发送成功（id: {}）", sent.id);
        Ok(sent)
    }

    pub fn is_authorization_code_set(&self) -> bool {
        self.authorization_code
            .as_deref()
            .is_some_and(|code| !code.is_empty())
    }

    pub fn set_authorization_code(&mut self, code: impl Into<String>) {
        self.authorization_code = Some(code.into());
    }

    /// 凭据存在且当前 Access Token 未过期
    pub fn is_operational(&self) -> bool {
        self.has_stored_credential()
            && self
                .credential
                .as_ref()
                .is_some_and(|credential| !credential.is_expired())
    }

    /// 宿主后台用户是否已登录；未注入查询时返回 false
    pub fn is_user_logged(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.is_user_logged())
    }

    /// 当前装载的凭据
    pub fn credential(&self) -> Option<&OAuthCredential> {
        self.credential.as_ref()
    }
}
