/// Gmail API 调用模块
///
/// 负责调用 `users.messages.send`，以已认证用户（"me"）身份发送原始 MIME 邮件
use serde::Serialize;

use crate::error::{DispatchError, Result};
use crate::mail::gmail::types::SentMessage;

/// `users.messages.send` 请求体
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    /// base64url 编码的 MIME 邮件
    raw: &'a str,
}

/// Gmail API 客户端
pub struct GmailApiClient {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl GmailApiClient {
    /// 创建新的 Gmail API 客户端
    ///
    /// # Arguments
    /// * `http` - HTTP 客户端，通常是 [`crate::utils::http_client::get_client`] 的克隆
    /// * `api_base` - API 根地址，例如 `https://gmail.googleapis.com`
    /// * `access_token` - 未过期的 Access Token
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            access_token: access_token.into(),
        }
    }

    fn send_url(&self) -> String {
        format!(
            "{}/gmail/v1/users/me/messages/send",
            self.api_base.trim_end_matches('/')
        )
    }

    /// 发送已编码的邮件
    ///
    /// 只尝试一次，不做重试
    ///
    /// # Errors
    /// - 网络请求失败
    /// - API 返回非成功状态
    pub async fn send_raw(&self, raw: &str) -> Result<SentMessage> {
        tracing::debug!("正在调用 Gmail 发送接口（载荷 {} 字节）", raw.len());

        let response = self
            .http
            .post(self.send_url())
            .bearer_auth(&self.access_token)
            .json(&SendRequest { raw })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if status == reqwest::StatusCode::UNAUTHORIZED {
                tracing::error!("❌ Gmail 拒绝了 Access Token（401），可能需要重新授权");
            } else {
                tracing::error!("❌ Gmail 发送失败 {}: {}", status, body);
            }

            return Err(DispatchError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let sent: SentMessage = response.json().await?;
        Ok(sent)
    }
}
