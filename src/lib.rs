//! 通过 Gmail API 发送事务邮件
//!
//! 使用 OAuth2 委托凭据：生成授权 URL、交换授权码、持久化 Token、过期自动刷新，
//! 并用 lettre 构建 MIME 邮件后调用 `users.messages.send` 发送。
//!
//! ```no_run
//! # async fn demo() -> gmail_dispatcher::Result<()> {
//! use gmail_dispatcher::{MailDispatcher, OutgoingMessage, Settings};
//!
//! let settings = Settings::load(None)?;
//! let mut dispatcher = MailDispatcher::from_settings(&settings, "", "", "").await?;
//!
//! if !dispatcher.has_stored_credential() {
//!     if let Some(url) = dispatcher.authorization_url() {
//!         println!("请访问: {}", url);
//!     }
//!     return Ok(());
//! }
//!
//! let message = OutgoingMessage::new(
//!     "Demo Shop",
//!     "shop@example.com",
//!     "buyer@example.com",
//!     "订单确认",
//!     "<p>感谢您的订购</p>",
//! );
//! dispatcher.send(&message).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod mail;
pub mod session;
pub mod utils;

pub use config::Settings;
pub use config::oauth_config::ClientConfig;
pub use config::storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use dispatcher::MailDispatcher;
pub use error::{DispatchError, Result};
pub use mail::gmail::{OAuthCredential, OutgoingMessage, SentMessage};
pub use session::SessionProbe;
