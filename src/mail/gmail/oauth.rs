/// Gmail OAuth2 客户端
///
/// 封装 oauth2 crate：生成授权 URL、授权码交换、Refresh Token 交换
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenUrl, basic::BasicClient,
};
use url::Url;

use crate::config::oauth_config::ClientConfig;
use crate::error::{DispatchError, Result};
use crate::mail::gmail::types::OAuthCredential;

/// OAuth2 客户端
#[derive(Debug, Clone)]
pub struct GmailOAuthClient {
    client: BasicClient,
    scopes: Vec<String>,
}

impl GmailOAuthClient {
    /// 根据客户端配置构建
    ///
    /// # Errors
    /// - 授权/Token/重定向地址不是合法 URL
    pub fn new(config: &ClientConfig, scopes: &[String]) -> Result<Self> {
        let client_secret = if config.client_secret.is_empty() {
            None
        } else {
            Some(ClientSecret::new(config.client_secret.clone()))
        };

        let auth_url = AuthUrl::new(config.auth_uri.clone())
            .map_err(|e| DispatchError::Configuration(format!("授权地址无效: {}", e)))?;
        let token_url = TokenUrl::new(config.token_uri.clone())
            .map_err(|e| DispatchError::Configuration(format!("Token 地址无效: {}", e)))?;
        let redirect_url = RedirectUrl::new(config.redirect_uri.clone())
            .map_err(|e| DispatchError::Configuration(format!("重定向地址无效: {}", e)))?;

        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            client_secret,
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url);

        Ok(Self {
            client,
            scopes: scopes.to_vec(),
        })
    }

    /// 生成授权 URL
    ///
    /// 请求离线访问以获得 Refresh Token
    pub fn authorize_url(&self) -> (Url, CsrfToken) {
        self.client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().map(|s| Scope::new(s.clone())))
            .add_extra_param("access_type", "offline")
            .url()
    }

    /// 生成带 PKCE 的授权 URL
    ///
    /// 用于同一进程内完成的本地回调授权，`PkceCodeVerifier` 需保留到交换授权码时
    pub fn authorize_url_with_pkce(&self) -> (Url, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().map(|s| Scope::new(s.clone())))
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        (url, state, pkce_verifier)
    }

    /// 交换授权码为凭据
    ///
    /// 授权 URL 带有 PKCE challenge 时必须传入对应的 verifier
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<PkceCodeVerifier>,
    ) -> Result<OAuthCredential> {
        tracing::debug!("开始交换授权码（PKCE: {}）", pkce_verifier.is_some());

        let mut request = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()));
        if let Some(verifier) = pkce_verifier {
            request = request.set_pkce_verifier(verifier);
        }

        let response = request
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| {
                tracing::error!("授权码交换失败: {}", e);
                DispatchError::token(e)
            })?;

        let credential = OAuthCredential::from_token_response(&response, None);
        if credential.refresh_token.is_none() {
            tracing::warn!("⚠️ Token 响应中没有 refresh_token，过期后需要重新授权");
        }

        Ok(credential)
    }

    /// 使用 Refresh Token 换取新的凭据
    ///
    /// 响应未携带新的 Refresh Token 时沿用旧值
    pub async fn refresh(&self, refresh_token: &str) -> Result<OAuthCredential> {
        tracing::debug!("开始刷新 Access Token");

        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| {
                let error_msg = e.to_string();
                if error_msg.contains("invalid_grant") {
                    tracing::error!(
                        "❌ Token 刷新失败 [授权被拒绝/已过期]: {}，需要重新授权",
                        error_msg
                    );
                } else {
                    tracing::error!("❌ Token 刷新失败: {}", error_msg);
                }
                DispatchError::token(e)
            })?;

        Ok(OAuthCredential::from_token_response(
            &response,
            Some(refresh_token),
        ))
    }
}
