/// Gmail 凭据与邮件数据结构
use chrono::{DateTime, Duration, Utc};
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 提前多少秒视为过期（与 Google 客户端库一致）
const EXPIRY_LEEWAY_SECS: i64 = 30;

/// Token 端点未返回 expires_in 时的默认有效期（秒）
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// OAuth2 凭据
///
/// 序列化格式与 Google 客户端库写出的 Token JSON 保持一致：
/// `access_token`, `token_type`, `expires_in`, `refresh_token`, `scope`, `created`（Unix 秒）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredential {
    /// 访问令牌
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// 有效期（秒），从 `created` 起算
    #[serde(default)]
    pub expires_in: i64,

    /// 刷新令牌
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// 签发时间；缺失时按 Unix 纪元处理，即视为已过期
    #[serde(default, with = "chrono::serde::ts_seconds")]
    pub created: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthCredential {
    /// 从 Token 端点响应构建凭据
    ///
    /// 刷新响应通常不带 refresh_token，此时沿用 `previous_refresh_token`
    pub fn from_token_response(
        response: &BasicTokenResponse,
        previous_refresh_token: Option<&str>,
    ) -> Self {
        let expires_in = response
            .expires_in()
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        let refresh_token = response
            .refresh_token()
            .map(|t| t.secret().to_string())
            .or_else(|| previous_refresh_token.map(str::to_string));

        let scope = response.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });

        Self {
            access_token: response.access_token().secret().to_string(),
            token_type: default_token_type(),
            expires_in,
            refresh_token,
            scope,
            created: Utc::now(),
        }
    }

    /// 过期时间
    ///
    /// 超出可表示范围时取时间轴的端点：正溢出视为永不过期，负溢出视为早已过期
    pub fn expires_at(&self) -> DateTime<Utc> {
        Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| self.created.checked_add_signed(lifetime))
            .unwrap_or(if self.expires_in < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            })
    }

    /// 访问令牌是否已过期（提前 30 秒）
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at()
            .checked_sub_signed(Duration::seconds(EXPIRY_LEEWAY_SECS))
            .is_none_or(|deadline| deadline <= now)
    }

    /// 日志中使用的令牌前缀
    pub(crate) fn redacted_access_token(&self) -> String {
        let prefix: String = self.access_token.chars().take(5).collect();
        format!("{}...", prefix)
    }
}

/// 待发送的邮件
///
/// 仅在一次发送过程中存在：构建 MIME、编码、发送后即丢弃
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    /// 发件人地址（同时作为 Reply-To）
    pub from_address: String,

    /// 发件人显示名称，可为空
    pub from_name: String,

    /// 收件人地址
    pub to_address: String,

    pub subject: String,

    /// HTML 正文
    pub body: String,

    /// 附件文件路径，发送时读取
    pub attachments: Vec<PathBuf>,
}

impl OutgoingMessage {
    pub fn new(
        from_name: impl Into<String>,
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from_address: from_address.into(),
            from_name: from_name.into(),
            to_address: to_address.into(),
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    /// 追加附件
    pub fn attach(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }
}

/// Gmail `users.messages.send` 的响应
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SentMessage {
    /// 消息 ID
    pub id: String,

    #[serde(rename = "threadId", default)]
    pub thread_id: String,

    #[serde(rename = "labelIds", default)]
    pub label_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(created: DateTime<Utc>, expires_in: i64) -> OAuthCredential {
        OAuthCredential {
            access_token: "ya29.access".to_string(),
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token: Some("1//refresh".to_string()),
            scope: None,
            created,
        }
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();

        // 1 小时后过期
        assert!(!credential(now, 3600).is_expired_at(now));

        // 已过期 1 小时
        assert!(credential(now - Duration::hours(2), 3600).is_expired_at(now));

        // 距离过期不足 30 秒也算过期
        assert!(credential(now, 20).is_expired_at(now));
    }

    #[test]
    fn test_deserialize_google_token_json() {
        let json = r#"{
            "access_token": "ya29.a0Af",
            "expires_in": 3599,
            "refresh_token": "1//0g",
            "scope": "https://www.googleapis.com/auth/gmail.send",
            "token_type": "Bearer",
            "created": 1700000000
        }"#;

        let cred: OAuthCredential = serde_json::from_str(json).unwrap();
        assert_eq!(cred.access_token, "ya29.a0Af");
        assert_eq!(cred.refresh_token.as_deref(), Some("1//0g"));
        assert_eq!(cred.created.timestamp(), 1_700_000_000);
        assert_eq!(cred.expires_at().timestamp(), 1_700_003_599);
    }

    #[test]
    fn test_missing_created_is_expired() {
        let cred: OAuthCredential =
            serde_json::from_str(r#"{"access_token": "abc", "expires_in": 3600}"#).unwrap();
        assert!(cred.is_expired());
        assert_eq!(cred.token_type, "Bearer");
        assert!(cred.refresh_token.is_none());
    }

    #[test]
    fn test_out_of_range_expires_in() {
        let json = r#"{"access_token": "a", "expires_in": 9223372036854775807, "created": 1700000000}"#;
        let cred: OAuthCredential = serde_json::from_str(json).unwrap();
        assert_eq!(cred.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!cred.is_expired());

        let json = r#"{"access_token": "a", "expires_in": -9223372036854775808, "created": 1700000000}"#;
        let cred: OAuthCredential = serde_json::from_str(json).unwrap();
        assert_eq!(cred.expires_at(), DateTime::<Utc>::MIN_UTC);
        assert!(cred.is_expired());
    }

    #[test]
    fn test_serialize_skips_empty_fields() {
        let mut cred = credential(Utc::now(), 3600);
        cred.refresh_token = None;

        let json = serde_json::to_string(&cred).unwrap();
        assert!(!json.contains("refresh_token"));
        assert!(!json.contains("scope"));
        assert!(json.contains("\"created\":"));
    }

    #[test]
    fn test_redacted_access_token() {
        let cred = credential(Utc::now(), 3600);
        assert_eq!(cred.redacted_access_token(), "ya29....");
    }

    #[test]
    fn test_outgoing_message_builder() {
        let msg = OutgoingMessage::new(
            "Shop",
            "shop@example.com",
            "buyer@example.com",
            "Order #1",
            "<p>Thanks</p>",
        )
        .attach("/tmp/invoice.pdf");

        assert_eq!(msg.from_name, "Shop");
        assert_eq!(msg.attachments.len(), 1);
    }

    #[test]
    fn test_sent_message_response() {
        let json = r#"{"id": "18c", "threadId": "18c", "labelIds": ["SENT"]}"#;
        let sent: SentMessage = serde_json::from_str(json).unwrap();
        assert_eq!(sent.id, "18c");
        assert_eq!(sent.label_ids, vec!["SENT".to_string()]);
    }
}
