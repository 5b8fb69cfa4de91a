use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde_derive::{Deserialize, Serialize};
use std::sync::OnceLock;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletConnectMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
}

/// Settings handed to the Flow wallet SDK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletConfig {
    pub app_title: String,
    pub app_icon: String,
    pub access_node: String,
    pub discovery_wallet: String,
    pub network: String,
    pub discovery_include: Vec<String>,
    pub discovery_exclude: Vec<String>,
    pub wallet_connect_project_id: String,
    pub wallet_connect: WalletConnectMetadata,
}

impl Default for WalletConfig {
    fn default() -> Self {
        WalletConfig {
            app_title: "MVP on Flow".to_string(),
            app_icon: "https://mvponflow.cc/favicon.png".to_string(),
            access_node: "https://rest-mainnet.onflow.org".to_string(),
            discovery_wallet: "https://fcl-discovery.onflow.org/authn".to_string(),
            network: "mainnet".to_string(),
            discovery_include: vec!["0x33f75ff0b830dcec".to_string()],
            discovery_exclude: vec![
                "0x95b85a9ef4daabb1".to_string(),
                "0x55ad22f01ef568a1".to_string(),
            ],
            wallet_connect_project_id: "56fce212e878d76623e53be15ab998c5".to_string(),
            wallet_connect: WalletConnectMetadata {
                name: "MVP on Flow".to_string(),
                description: "Fan-powered Jokic project".to_string(),
                url: "https://mvponflow.cc".to_string(),
                icons: vec!["https://mvponflow.cc/favicon.png".to_string()],
            },
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub logged_in: bool,
    pub addr: Option<String>,
}

/// Handle returned by [`init`]. Holds the SDK settings and the user the
/// SDK last reported.
#[derive(Debug)]
pub struct WalletSession {
    config: WalletConfig,
    user: RwLock<CurrentUser>,
}

fn flow_address() -> &'static Regex {
    static ADDRESS: OnceLock<Regex> = OnceLock::new();
    ADDRESS.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{16}$").expect("valid address regex"))
}

pub fn validate_address(addr: &str) -> Result<()> {
    if flow_address().is_match(addr) {
        Ok(())
    } else {
        Err(anyhow!(
            "Invalid Flow address '{}': expected 0x followed by 16 hex digits.",
            addr
        ))
    }
}

/// Validates the wallet settings once at startup and returns the session
/// handle shared by everything that shows wallet state.
pub fn init(config: WalletConfig) -> Result<WalletSession> {
    for url in [
        &config.app_icon,
        &config.access_node,
        &config.discovery_wallet,
        &config.wallet_connect.url,
    ] {
        reqwest::Url::parse(url).with_context(|| format!("Invalid wallet URL '{}'", url))?;
    }
    for addr in config
        .discovery_include
        .iter()
        .chain(config.discovery_exclude.iter())
    {
        validate_address(addr).context("Bad discovery wallet list")?;
    }
    if config.wallet_connect_project_id.is_empty() {
        return Err(anyhow!("WalletConnect project id cannot be empty."));
    }

    info!(
        "Wallet configured for {} via {}",
        config.network, config.access_node
    );
    Ok(WalletSession {
        config,
        user: RwLock::new(CurrentUser::default()),
    })
}

impl WalletSession {
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub async fn current_user(&self) -> CurrentUser {
        self.user.read().await.clone()
    }

    pub async fn sign_in(&self, addr: &str) -> Result<()> {
        let addr = addr.trim();
        validate_address(addr)?;
        let mut user = self.user.write().await;
        user.logged_in = true;
        user.addr = Some(addr.to_string());
        info!("Wallet {} connected", addr);
        Ok(())
    }

    pub async fn sign_out(&self) {
        let mut user = self.user.write().await;
        if let Some(addr) = user.addr.take() {
            info!("Wallet {} disconnected", addr);
        }
        user.logged_in = false;
    }
}
