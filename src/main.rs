use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use gmail_dispatcher::mail::gmail::callback;
use gmail_dispatcher::{MailDispatcher, OutgoingMessage, Settings};

/// 通过 Gmail API 发送事务邮件
#[derive(Debug, Parser)]
#[command(name = "gmail-dispatcher", version, about)]
struct Cli {
    /// 配置文件路径（默认：<config_dir>/gmail-dispatcher/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// OAuth2 客户端 ID
    #[arg(long, global = true, env = "GMAIL_CLIENT_ID", default_value = "")]
    client_id: String,

    /// OAuth2 客户端密钥
    #[arg(
        long,
        global = true,
        env = "GMAIL_CLIENT_SECRET",
        default_value = "",
        hide_env_values = true
    )]
    client_secret: String,

    /// 重定向 URI（为空时使用带外授权）
    #[arg(long, global = true, env = "OAUTH_REDIRECT_URI", default_value = "")]
    redirect_uri: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 显示凭据状态
    Status,

    /// 获取授权 URL，可选在本地接收回调并完成授权
    Authorize {
        /// 在默认浏览器中打开授权 URL
        #[arg(long)]
        open: bool,

        /// 在本地端口等待浏览器回调（重定向地址改为 http://localhost:<PORT>）
        #[arg(long, value_name = "PORT")]
        listen: Option<u16>,

        /// 等待回调的超时时间（秒）
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },

    /// 用授权码换取并保存凭据
    Exchange {
        /// 浏览器中获得的授权码
        code: String,
    },

    /// 刷新已过期的凭据
    Refresh,

    /// 删除已保存的凭据
    Revoke,

    /// 发送一封邮件
    Send {
        /// 发件人地址
        #[arg(long)]
        from: String,

        /// 发件人名称
        #[arg(long, default_value = "")]
        from_name: String,

        /// 收件人地址
        #[arg(long)]
        to: String,

        #[arg(long)]
        subject: String,

        /// HTML 正文
        #[arg(long, conflicts_with = "body_file", required_unless_present = "body_file")]
        body: Option<String>,

        /// 从文件读取 HTML 正文
        #[arg(long)]
        body_file: Option<PathBuf>,

        /// 附件（可重复）
        #[arg(long = "attach", value_name = "PATH")]
        attachments: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 初始化日志
    init_logger()?;

    // 2. 解析命令行并加载配置
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("加载配置失败")?;
    let args = ClientArgs::from(&cli);

    match cli.command {
        Command::Status => {
            let dispatcher = build_dispatcher(&args, &settings).await?;
            print_status(&settings, &dispatcher);
        }
        Command::Authorize {
            open,
            listen,
            timeout,
        } => authorize(&args, &settings, open, listen, timeout).await?,
        Command::Exchange { code } => {
            let mut dispatcher = build_dispatcher(&args, &settings).await?;
            exchange(&mut dispatcher, &code).await?;
        }
        Command::Refresh => {
            // 构建时即完成刷新
            let dispatcher = build_dispatcher(&args, &settings).await?;
            match dispatcher.credential() {
                Some(credential) => println!("凭据有效，过期时间: {}", credential.expires_at()),
                None => println!("没有已保存的凭据"),
            }
        }
        Command::Revoke => {
            let mut dispatcher = build_dispatcher(&args, &settings).await?;
            dispatcher.revoke_credential().context("删除凭据失败")?;
            println!("已删除凭据: {}", settings.credentials_path().display());
        }
        Command::Send {
            from,
            from_name,
            to,
            subject,
            body,
            body_file,
            attachments,
        } => {
            let body = match (body, body_file) {
                (Some(body), _) => body,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("读取正文文件失败: {}", path.display()))?,
                (None, None) => anyhow::bail!("缺少邮件正文"),
            };

            let mut message = OutgoingMessage::new(from_name, from, to, subject, body);
            message.attachments = attachments;

            let mut dispatcher = build_dispatcher(&args, &settings).await?;
            let sent = dispatcher.send(&message).await.context("发送邮件失败")?;
            println!("已发送，消息 ID: {}", sent.id);
        }
    }

    Ok(())
}

/// 命令行中的客户端参数
struct ClientArgs {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl From<&Cli> for ClientArgs {
    fn from(cli: &Cli) -> Self {
        Self {
            client_id: cli.client_id.clone(),
            client_secret: cli.client_secret.clone(),
            redirect_uri: cli.redirect_uri.clone(),
        }
    }
}

async fn build_dispatcher(args: &ClientArgs, settings: &Settings) -> Result<MailDispatcher> {
    MailDispatcher::from_settings(
        settings,
        &args.client_id,
        &args.client_secret,
        &args.redirect_uri,
    )
    .await
    .context("初始化邮件分发器失败")
}

async fn authorize(
    args: &ClientArgs,
    settings: &Settings,
    open: bool,
    listen: Option<u16>,
    timeout: u64,
) -> Result<()> {
    let mut client = MailDispatcher::client_config(
        settings,
        &args.client_id,
        &args.client_secret,
        &args.redirect_uri,
    )
    .context("OAuth2 客户端配置无效")?;

    if let Some(port) = listen {
        client = client.with_redirect_uri(format!("http://localhost:{}", port));
    }

    let mut dispatcher = MailDispatcher::from_client_config(settings, &client)
        .await
        .context("初始化邮件分发器失败")?;

    if dispatcher.has_stored_credential() {
        println!("已存在凭据，如需重新授权请先执行 revoke");
        return Ok(());
    }

    let (url, state) = match listen {
        Some(_) => dispatcher
            .loopback_authorization_url()
            .map(|(url, state)| (url, Some(state))),
        None => dispatcher.authorization_url().map(|url| (url, None)),
    }
    .context("授权码已设置，无需再次获取授权 URL")?;

    println!("请在浏览器中打开以下地址完成授权：\n\n{}\n", url);

    if open {
        if let Err(e) = webbrowser::open(url.as_str()) {
            tracing::warn!("无法打开浏览器，请手动复制上面的 URL: {}", e);
        }
    }

    let (Some(port), Some(state)) = (listen, state) else {
        println!("授权后执行：gmail-dispatcher exchange <CODE>");
        return Ok(());
    };

    let code = tokio::task::spawn_blocking(move || {
        callback::receive_authorization_code(
            port,
            Duration::from_secs(timeout),
            state.secret(),
        )
    })
    .await
    .context("回调服务器线程异常退出")?
    .context("接收授权回调失败")?;

    exchange(&mut dispatcher, &code).await
}

async fn exchange(dispatcher: &mut MailDispatcher, code: &str) -> Result<()> {
    if dispatcher.has_stored_credential() {
        println!("已存在凭据，未覆盖");
        return Ok(());
    }

    dispatcher.set_authorization_code(code.trim());
    dispatcher
        .exchange_authorization_code()
        .await
        .context("授权码交换失败")?;

    println!("✅ 授权完成");
    Ok(())
}

fn print_status(settings: &Settings, dispatcher: &MailDispatcher) {
    println!("凭据文件: {}", settings.credentials_path().display());
    println!("客户端密钥文件: {}", settings.client_secret_path().display());
    println!("已保存凭据: {}", yes_no(dispatcher.has_stored_credential()));
    println!("可用: {}", yes_no(dispatcher.is_operational()));
    if let Some(credential) = dispatcher.credential() {
        println!("过期时间: {}", credential.expires_at());
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "是" } else { "否" }
}

fn init_logger() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gmail_dispatcher=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
