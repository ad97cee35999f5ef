/// MIME 邮件构建
///
/// 使用 lettre 组装 HTML 邮件和附件，再编码成 Gmail API 需要的 base64url 载荷
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use std::path::Path;

use crate::error::{DispatchError, Result};
use crate::mail::gmail::types::OutgoingMessage;

/// 构建 MIME 邮件并序列化为原始字节
///
/// - 字符集 UTF-8，正文为 HTML
/// - Reply-To 与发件人相同
/// - 附件依次追加在正文之后
///
/// # Errors
/// - 地址格式无效
/// - 附件读取失败
pub fn build_mime(message: &OutgoingMessage) -> Result<Vec<u8>> {
    let sender = mailbox(&message.from_name, &message.from_address, "发件人")?;
    let recipient = mailbox("", &message.to_address, "收件人")?;

    let builder = Message::builder()
        .from(sender.clone())
        .reply_to(sender)
        .to(recipient)
        .subject(message.subject.as_str());

    let html = SinglePart::html(message.body.clone());

    let email = if message.attachments.is_empty() {
        builder.singlepart(html)
    } else {
        let mut parts = MultiPart::mixed().singlepart(html);
        for path in &message.attachments {
            parts = parts.singlepart(attachment(path)?);
        }
        builder.multipart(parts)
    }
    .map_err(|e| DispatchError::Compose(e.to_string()))?;

    Ok(email.formatted())
}

/// 编码为 base64url（URL 安全字母表，去掉填充）
pub fn encode_raw(mime: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(mime)
}

fn mailbox(name: &str, address: &str, role: &str) -> Result<Mailbox> {
    let address = address
        .trim()
        .parse()
        .map_err(|e| DispatchError::Compose(format!("{}地址无效 '{}': {}", role, address, e)))?;

    let name = (!name.trim().is_empty()).then(|| name.trim().to_string());
    Ok(Mailbox::new(name, address))
}

fn attachment(path: &Path) -> Result<SinglePart> {
    let content = std::fs::read(path)?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            DispatchError::Compose(format!("附件路径没有文件名: {}", path.display()))
        })?;

    let content_type = ContentType::parse(guess_content_type(path))
        .map_err(|e| DispatchError::Compose(format!("附件类型无效: {}", e)))?;

    tracing::debug!("添加附件: {} ({} 字节)", filename, content.len());

    Ok(Attachment::new(filename).body(content, content_type))
}

/// 按扩展名推断附件类型
fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "htm" | "html" => "text/html",
        "xml" => "application/xml",
        "json" => "application/json",
        "zip" => "application/zip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn order_message() -> OutgoingMessage {
        OutgoingMessage::new(
            "Demo Shop",
            "shop@example.com",
            "buyer@example.com",
            "Order confirmation",
            "<h1>Thank you</h1><p>Your order has shipped.</p>",
        )
    }

    /// 取出指定头部所在的行
    fn header_line<'a>(text: &'a str, name: &str) -> &'a str {
        let prefix = format!("{}: ", name);
        text.lines()
            .find(|line| line.starts_with(&prefix))
            .unwrap_or_else(|| panic!("缺少 {} 头", name))
    }

    #[test]
    fn test_build_html_message() {
        let raw = build_mime(&order_message()).unwrap();
        let text = String::from_utf8_lossy(&raw);

        let from = header_line(&text, "From");
        assert!(from.contains("Demo Shop"));
        assert!(from.contains("<shop@example.com>"));

        let reply_to = header_line(&text, "Reply-To");
        assert!(reply_to.contains("Demo Shop"));
        assert!(reply_to.contains("shop@example.com"));

        assert!(header_line(&text, "To").contains("buyer@example.com"));
        assert!(text.contains("Subject: Order confirmation"));
        assert!(text.contains("Content-Type: text/html; charset=utf-8"));
        assert!(!text.contains("multipart/mixed"));
    }

    #[test]
    fn test_build_with_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let invoice = dir.path().join("invoice.pdf");
        let notes = dir.path().join("notes.txt");
        std::fs::write(&invoice, b"%PDF-1.4 fake").unwrap();
        std::fs::write(&notes, b"gift wrap").unwrap();

        let message = order_message().attach(&invoice).attach(&notes);
        let raw = build_mime(&message).unwrap();
        let text = String::from_utf8_lossy(&raw);

        assert!(text.contains("multipart/mixed"));
        assert!(text.contains("invoice.pdf"));
        assert!(text.contains("application/pdf"));
        assert!(text.contains("notes.txt"));
    }

    #[test]
    fn test_missing_attachment() {
        let message = order_message().attach("/nonexistent/invoice.pdf");
        let result = build_mime(&message);
        assert!(matches!(result, Err(DispatchError::Io(_))));
    }

    #[test]
    fn test_invalid_address() {
        let mut message = order_message();
        message.to_address = "not-an-address".to_string();

        let result = build_mime(&message);
        assert!(matches!(result, Err(DispatchError::Compose(_))));
    }

    #[test]
    fn test_empty_sender_name() {
        let mut message = order_message();
        message.from_name = String::new();

        let raw = build_mime(&message).unwrap();
        let text = String::from_utf8_lossy(&raw);
        let from = header_line(&text, "From");
        assert!(from.contains("shop@example.com"));
        assert!(!from.contains('"'));
    }

    #[test]
    fn test_encode_raw_is_url_safe() {
        // 0xfb 0xff 0xfe 在标准 base64 中会产生 '+' 和 '/'
        let mime = b"Subject: \xfb\xff\xfe?>>\r\n\r\nbody";
        let encoded = encode_raw(mime);

        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));

        // 反向替换并补齐填充后，标准 base64 可以还原
        let mut standard = encoded.replace('-', "+").replace('_', "/");
        while standard.len() % 4 != 0 {
            standard.push('=');
        }
        assert_eq!(STANDARD.decode(standard).unwrap(), mime.to_vec());
    }

    #[test]
    fn test_encode_real_message_round_trip() {
        let raw = build_mime(&order_message()).unwrap();
        let encoded = encode_raw(&raw);

        assert!(!encoded.contains(['+', '/', '=']));
        assert_eq!(URL_SAFE_NO_PAD.decode(&encoded).unwrap(), raw);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a.PDF")), "application/pdf");
        assert_eq!(guess_content_type(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(
            guess_content_type(Path::new("archive.bin")),
            "application/octet-stream"
        );
        assert_eq!(
            guess_content_type(Path::new("README")),
            "application/octet-stream"
        );
    }
}
