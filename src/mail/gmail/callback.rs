/// 本地回调服务器
///
/// 重定向地址设为 `http://localhost:<port>` 时，用它接收浏览器回调中的授权码，
/// 省去手动复制粘贴
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tiny_http::{Header, Response, Server, StatusCode};
use url::Url;

use crate::error::{DispatchError, Result};

/// 授权成功页面
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>授权成功</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 80px;">
    <h1>✓ 授权成功</h1>
    <p>授权码已交给 gmail-dispatcher，可以关闭此页面。</p>
</body>
</html>"#;

/// 授权失败页面
const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>授权失败</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 80px;">
    <h1>✗ 授权失败</h1>
    <p>Gmail 授权未完成，请回到终端查看错误信息。</p>
</body>
</html>"#;

/// 单次轮询等待时间
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 在 `127.0.0.1:port` 上等待一次 OAuth2 回调并返回授权码
///
/// 阻塞调用；异步上下文中请放到 `spawn_blocking` 里执行
///
/// # Arguments
/// * `expected_state` - 授权 URL 中的 CSRF state，回调必须原样带回
///
/// # Errors
/// - 端口被占用
/// - 用户拒绝授权（回调带 `error` 参数）
/// - 回调缺少 `state` 或 `state` 不匹配
/// - 回调缺少 `code` 参数
/// - 超时未收到回调
pub fn receive_authorization_code(
    port: u16,
    timeout: Duration,
    expected_state: &str,
) -> Result<String> {
    let addr = format!("127.0.0.1:{}", port);
    let server = Server::http(&addr).map_err(|e| {
        DispatchError::Configuration(format!("无法启动本地服务器（端口可能被占用）: {}", e))
    })?;

    tracing::info!("✅ 本地回调服务器监听: http://localhost:{}", port);

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let Some(request) = server.recv_timeout(POLL_INTERVAL)? else {
            continue;
        };

        // 浏览器会顺带请求 favicon 等资源
        let Some(params) = callback_params(port, request.url()) else {
            tracing::debug!("忽略无关请求: {}", request.url());
            request.respond(Response::empty(StatusCode(404)))?;
            continue;
        };

        let result = check_callback(&params, expected_state);
        let page = if result.is_ok() { SUCCESS_HTML } else { ERROR_HTML };
        let mut response = Response::from_string(page);
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
            response.add_header(header);
        }
        request.respond(response)?;

        return result;
    }

    Err(DispatchError::Authentication(format!(
        "授权超时：{} 秒内未收到回调",
        timeout.as_secs()
    )))
}

/// 解析请求路径中的查询参数
///
/// 既没有 `code` 也没有 `error` 参数的请求不是授权回调，返回 `None`
fn callback_params(port: u16, request_url: &str) -> Option<HashMap<String, String>> {
    let full_url = format!("http://localhost:{}{}", port, request_url);
    let parsed = Url::parse(&full_url).ok()?;
    let params: HashMap<_, _> = parsed.query_pairs().into_owned().collect();

    (params.contains_key("code") || params.contains_key("error")).then_some(params)
}

/// 校验回调参数并取出授权码
fn check_callback(params: &HashMap<String, String>, expected_state: &str) -> Result<String> {
    if let Some(error) = params.get("error") {
        tracing::error!("用户拒绝授权: {}", error);
        return Err(DispatchError::Authentication(format!(
            "用户拒绝授权: {}",
            error
        )));
    }

    match params.get("state") {
        Some(state) if state == expected_state => {
            tracing::info!("✅ CSRF 验证通过");
        }
        Some(_) => {
            tracing::error!("❌ CSRF 验证失败：state 不匹配");
            return Err(DispatchError::Authentication(
                "CSRF 验证失败：state 不匹配".to_string(),
            ));
        }
        None => {
            tracing::error!("❌ CSRF 验证失败：回调缺少 state 参数");
            return Err(DispatchError::Authentication(
                "CSRF 验证失败：回调缺少 state 参数".to_string(),
            ));
        }
    }

    params
        .get("code")
        .filter(|code| !code.is_empty())
        .cloned()
        .ok_or_else(|| DispatchError::Authentication("回调缺少 code 参数".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    fn parse_callback(request_url: &str, expected_state: &str) -> Result<String> {
        let params = callback_params(8080, request_url).unwrap();
        check_callback(&params, expected_state)
    }

    fn free_port() -> u16 {
        // 先绑定端口 0 拿到一个空闲端口
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    /// 向本地回调服务器发送 GET 请求，返回完整响应文本
    fn get(port: u16, path: &str) -> String {
        let mut stream = None;
        for _ in 0..100 {
            if let Ok(s) = TcpStream::connect(("127.0.0.1", port)) {
                stream = Some(s);
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        let mut stream = stream.unwrap();

        write!(
            stream,
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        )
        .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_parse_callback_code() {
        let code = parse_callback("/?state=abc&code=4%2F0AdQt8q&scope=x", "abc").unwrap();
        assert_eq!(code, "4/0AdQt8q");
    }

    #[test]
    fn test_parse_callback_state_mismatch() {
        let result = parse_callback("/?state=forged&code=4%2F0AdQt8q", "abc");
        assert!(matches!(result, Err(DispatchError::Authentication(_))));
    }

    #[test]
    fn test_parse_callback_missing_state() {
        let result = parse_callback("/?code=4%2F0AdQt8q", "abc");
        assert!(matches!(result, Err(DispatchError::Authentication(_))));
    }

    #[test]
    fn test_parse_callback_denied() {
        let result = parse_callback("/?error=access_denied&state=abc", "abc");
        assert!(matches!(result, Err(DispatchError::Authentication(_))));
    }

    #[test]
    fn test_parse_callback_missing_code() {
        let result = parse_callback("/?state=abc&code=", "abc");
        assert!(matches!(result, Err(DispatchError::Authentication(_))));
    }

    #[test]
    fn test_non_callback_requests() {
        assert!(callback_params(8080, "/favicon.ico").is_none());
        assert!(callback_params(8080, "/?xcode=1&state=abc").is_none());
        assert!(callback_params(8080, "/?noerror=1").is_none());
        assert!(callback_params(8080, "/?code=1").is_some());
    }

    #[test]
    fn test_html_contains_charset() {
        assert!(SUCCESS_HTML.contains("utf-8"));
        assert!(ERROR_HTML.contains("utf-8"));
    }

    #[test]
    fn test_receive_times_out() {
        let result = receive_authorization_code(free_port(), Duration::from_millis(300), "abc");
        assert!(matches!(result, Err(DispatchError::Authentication(_))));
    }

    #[test]
    fn test_receive_skips_unrelated_requests() {
        let port = free_port();
        let server = std::thread::spawn(move || {
            receive_authorization_code(port, Duration::from_secs(5), "abc")
        });

        let ignored = get(port, "/?xcode=1&state=abc");
        assert!(ignored.starts_with("HTTP/1.1 404"));

        let accepted = get(port, "/?state=abc&code=4%2F0Ad");
        assert!(accepted.starts_with("HTTP/1.1 200"));

        assert_eq!(server.join().unwrap().unwrap(), "4/0Ad");
    }

    #[test]
    fn test_receive_rejects_forged_state() {
        let port = free_port();
        let server = std::thread::spawn(move || {
            receive_authorization_code(port, Duration::from_secs(5), "abc")
        });

        let response = get(port, "/?state=forged&code=4%2F0Ad");
        assert!(response.contains("授权失败"));

        let result = server.join().unwrap();
        assert!(matches!(result, Err(DispatchError::Authentication(_))));
    }
}
