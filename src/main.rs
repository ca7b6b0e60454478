mod cli;
mod command;
mod context;
mod error;
mod iface;
mod platform;
mod shell;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cli::{Args, Config};
use context::{CancelToken, Context};
use error::Result;
use log::{debug, error, info};
use platform::ControlPlatform;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 加载配置
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // 初始化日志, 命令行优先于配置文件
    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    env_logger::Builder::new()
        .filter_level(level.parse().unwrap_or(log::LevelFilter::Warn))
        .init();

    let rcfile = args.rcfile.map(PathBuf::from);
    let privileged = unsafe { libc::geteuid() } == 0 || rcfile.is_some();
    let cancel = CancelToken::new();
    let ctx = Context::from_config(&config, args.verbose, privileged, cancel.clone());
    info!("privileged: {}, verbose: {}", ctx.privileged, ctx.verbose);

    let platform: Arc<dyn ControlPlatform> = Arc::from(platform::create_platform());
    let command = args.command;

    // 只有交互模式接管 Ctrl-C, 由命令循环在命令返回后处理; 其他模式保持默认的终止行为
    if rcfile.is_none() && command.is_empty() {
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    // 控制请求都是阻塞调用, 放到阻塞线程池里执行
    let outcome = tokio::task::spawn_blocking(move || {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Some(path) = rcfile {
            shell::run_rcfile(platform.as_ref(), &ctx, &path, &mut out)
        } else if !command.is_empty() {
            shell::run_once(platform.as_ref(), &ctx, &command, &mut out)
        } else {
            shell::interactive(platform.as_ref(), &ctx, io::stdin().lock(), &mut out)
        }
    })
    .await?;

    if let Err(e) = outcome {
        match &e {
            error::IfshError::Io(kind) => error!("shell I/O failure: {:?}", kind),
            other => debug!("command failed: {:?}", other),
        }
        let stdout = io::stdout();
        shell::report(&mut stdout.lock(), &e)?;
        std::process::exit(1);
    }
    Ok(())
}
