use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use futures::future::FutureExt;
use futures::select;
#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;
use pages::vote::{Ballot, VoteOutcome};
use pages::Page;
use tokio::task;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter, prelude::*, Layer};
use wallet::{WalletConfig, WalletSession};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod leaderboard;
mod models;
mod pages;
mod time_utils;
mod wallet;

#[derive(Debug, Clone)]
struct Config {
    log_path: PathBuf,
    console_addr: Option<SocketAddr>,
    wallet_address: Option<String>,
}

fn load_config() -> Result<Config> {
    dotenv().ok();

    let log_path_str = env::var("LOG_PATH").unwrap_or_else(|_| {
        if cfg!(target_os = "linux") {
            "/var/logs/mvp"
        } else {
            "."
        }
        .to_string()
    });
    let log_path = PathBuf::from(log_path_str);

    let console_addr = match env::var("CONSOLE_ADDR") {
        Result::Ok(addr) => Some(
            addr.parse::<SocketAddr>()
                .context("Invalid CONSOLE_ADDR (must be host:port)")?,
        ),
        Result::Err(_) => None,
    };

    let wallet_address = env::var("WALLET_ADDRESS")
        .ok()
        .filter(|addr| !addr.trim().is_empty());

    Ok(Config {
        log_path,
        console_addr,
        wallet_address,
    })
}

#[derive(Debug, Clone, PartialEq)]
struct Request {
    page: Page,
    candidate: Option<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Request> {
    let page = match args.next() {
        Some(name) => name.parse::<Page>()?,
        None => Page::Home,
    };
    let candidate = args.next();
    if candidate.is_some() && page != Page::Vote {
        return Err(anyhow!("Only the vote page takes an extra argument."));
    }
    if let Some(extra) = args.next() {
        return Err(anyhow!("Unexpected argument '{}'.", extra));
    }
    Ok(Request { page, candidate })
}

async fn run_page(
    request: Request,
    wallet: Arc<WalletSession>,
    http_client: reqwest::Client,
) -> Result<String> {
    let body = match request.page {
        Page::Home => pages::home::render(),
        Page::Swapfest => pages::swapfest::run(http_client).await?,
        Page::Vote => {
            let mut ballot = Ballot::default();
            if let Some(name) = &request.candidate {
                match ballot.cast(name, &mut rand::thread_rng())? {
                    VoteOutcome::Dodged { offset } => {
                        info!("{} dodged the vote by {:?}", name, offset)
                    }
                    outcome => info!("Vote for {}: {:?}", name, outcome),
                }
            }
            pages::vote::render(&ballot)
        }
    };
    Ok(pages::layout::page(&wallet.current_user().await, &body))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let request = parse_args(env::args().skip(1))?;

    std::panic::set_hook(Box::new(|i| {
        error!("Panic'd: {}", i);
    }));

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("mvp.log")
        .build(&config.log_path)
        .with_context(|| format!("Failed to open log directory {:?}", config.log_path))?;
    let (non_blocking_appender, _guard) = tracing_appender::non_blocking(file_appender);
    let console_layer = config.console_addr.map(|addr| {
        console_subscriber::ConsoleLayer::builder()
            .server_addr(addr)
            .spawn()
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking_appender)
                .with_filter(filter::filter_fn(|metadata| {
                    metadata.target().starts_with("mvp_on_flow")
                })),
        )
        .init();

    info!("Rendering {:?}", request.page);

    let wallet =
        Arc::new(wallet::init(WalletConfig::default()).context("Failed to set up wallet")?);
    info!("Wallet session ready on {}", wallet.config().network);
    if let Some(addr) = &config.wallet_address {
        if let Err(e) = wallet.sign_in(addr).await {
            warn!("Ignoring WALLET_ADDRESS: {}", e);
        }
    }

    let http_client = reqwest::Client::builder()
        .use_rustls_tls()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()?;

    let page_task: task::JoinHandle<Result<String>> =
        task::spawn(run_page(request, wallet.clone(), http_client));

    let rendered = select! {
        res = page_task.fuse() => res.context("Page task failed to complete")?,
        sig = Box::pin(tokio::signal::ctrl_c()).fuse() => {
            sig.context("Failed to listen for ctrl-c")?;
            info!("Interrupted before the page finished rendering");
            wallet.sign_out().await;
            return Ok(());
        }
    };
    wallet.sign_out().await;

    match rendered {
        Result::Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Result::Err(e) => {
            error!("Failed to render page: {:?}", e);
            Err(e)
        }
    }
}
