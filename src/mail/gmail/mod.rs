/// Gmail 模块 - OAuth2 凭据生命周期与邮件发送
pub mod api;
pub mod callback;
pub mod mime;
pub mod oauth;
pub mod token;
pub mod types;

// 重新导出常用类型
pub use api::GmailApiClient;
pub use oauth::GmailOAuthClient;
pub use token::TokenManager;
pub use types::{OAuthCredential, OutgoingMessage, SentMessage};
