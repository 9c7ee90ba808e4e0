use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warden_gateway::{GatewayConfig, GatewayServer};
use warden_pairing::{PairingAuthenticator, PairingEndpoint, RateLimits};

#[derive(Parser)]
#[command(name = "warden", about = "Warden — remote approval gateway for coding agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "warden.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the pairing payload of a running gateway
    Pair {
        /// Gateway base URL (defaults to the configured port on loopback)
        #[arg(long)]
        gateway: Option<String>,
    },
    /// Rotate the pairing secret of a running gateway
    Rotate {
        /// Gateway base URL (defaults to the configured port on loopback)
        #[arg(long)]
        gateway: Option<String>,
    },
}

#[derive(Deserialize)]
struct WardenConfig {
    #[serde(default = "default_gateway_name")]
    gateway_name: String,
    /// Base64 of the gateway's raw public key bytes; fingerprinted into
    /// the pairing payload. Key generation happens outside this binary.
    #[serde(default)]
    public_key: String,
    /// Decision log location. Omit to disable the on-disk log.
    #[serde(default)]
    data_dir: Option<PathBuf>,
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    pairing: PairingConfig,
    #[serde(default)]
    approvals: ApprovalConfig,
    #[serde(default)]
    stream: StreamConfig,
}

#[derive(Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum PairingMode {
    Direct,
    Relay,
}

#[derive(Deserialize)]
struct PairingConfig {
    #[serde(default = "default_mode")]
    mode: PairingMode,
    /// Host operator devices should dial in direct mode. Defaults to the
    /// bind host, or loopback when binding all interfaces.
    #[serde(default)]
    advertise_host: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
    #[serde(default)]
    room_secret: Option<String>,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_window_secs")]
    window_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            advertise_host: None,
            room_id: None,
            room_secret: None,
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
        }
    }
}

#[derive(Deserialize)]
struct ApprovalConfig {
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Deserialize)]
struct StreamConfig {
    #[serde(default = "default_coalesce_ms")]
    coalesce_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            coalesce_ms: default_coalesce_ms(),
        }
    }
}

fn default_gateway_name() -> String {
    "warden".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    4750
}
fn default_mode() -> PairingMode {
    PairingMode::Direct
}
fn default_max_attempts() -> u32 {
    5
}
fn default_window_secs() -> u64 {
    60
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_coalesce_ms() -> u64 {
    16
}

fn endpoint_from(config: &WardenConfig, host: &str, port: u16) -> anyhow::Result<PairingEndpoint> {
    match config.pairing.mode {
        PairingMode::Direct => {
            let advertise = config.pairing.advertise_host.clone().unwrap_or_else(|| {
                if host == "0.0.0.0" {
                    "127.0.0.1".to_string()
                } else {
                    host.to_string()
                }
            });
            Ok(PairingEndpoint::Direct {
                host: advertise,
                port,
            })
        }
        PairingMode::Relay => {
            let room_id = config
                .pairing
                .room_id
                .clone()
                .ok_or_else(|| anyhow::anyhow!("relay mode requires pairing.room_id"))?;
            let room_secret = config
                .pairing
                .room_secret
                .clone()
                .ok_or_else(|| anyhow::anyhow!("relay mode requires pairing.room_secret"))?;
            Ok(PairingEndpoint::Relay {
                room_id,
                room_secret,
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Load config
    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let config: WardenConfig = toml::from_str(&config_str)?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let public_key = if config.public_key.is_empty() {
                Vec::new()
            } else {
                BASE64
                    .decode(&config.public_key)
                    .map_err(|e| anyhow::anyhow!("config public_key is not valid base64: {e}"))?
            };

            let limits = RateLimits {
                max_attempts: config.pairing.max_attempts,
                window_secs: config.pairing.window_secs,
            };
            let authenticator = PairingAuthenticator::new(limits)
                .map_err(|e| anyhow::anyhow!("failed to generate pairing secret: {e}"))?;

            let endpoint = endpoint_from(&config, &host, port)?;
            let gw_config = GatewayConfig {
                gateway_name: config.gateway_name.clone(),
                public_key,
                endpoint,
                approval_timeout: Duration::from_secs(config.approvals.timeout_secs),
                coalesce_interval: Duration::from_millis(config.stream.coalesce_ms),
                data_dir: config.data_dir.clone(),
            };

            info!("Starting Warden gateway on {}:{}", host, port);
            let (app, state) = GatewayServer::build_with_state(gw_config, authenticator);

            let addr = format!("{}:{}", host, port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Warden gateway listening on {}", addr);
            info!("Run 'warden pair' on this machine to print pairing material");

            let server = tokio::spawn(async move {
                axum::serve(
                    listener,
                    app.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .await
            });
            tokio::select! {
                result = server => result??,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down, flushing buffered output");
                    state.coalescer.stop().await;
                }
            }
        }
        Commands::Pair { gateway } => {
            let base = gateway_base(gateway, config.server.port);
            let payload: serde_json::Value = reqwest::get(format!("{base}/pairing"))
                .await
                .map_err(|e| anyhow::anyhow!("could not reach the gateway at {base}: {e}"))?
                .error_for_status()?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Rotate { gateway } => {
            let base = gateway_base(gateway, config.server.port);
            let payload: serde_json::Value = reqwest::Client::new()
                .post(format!("{base}/pairing/rotate"))
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("could not reach the gateway at {base}: {e}"))?
                .error_for_status()?
                .json()
                .await?;
            println!("Pairing secret rotated. Previously issued codes are now invalid.");
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    Ok(())
}

/// Pairing routes are loopback-gated, so the default target is always
/// the local machine.
fn gateway_base(flag: Option<String>, port: u16) -> String {
    flag.unwrap_or_else(|| format!("http://127.0.0.1:{port}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: WardenConfig = toml::from_str("").unwrap();
        assert_eq!(config.gateway_name, "warden");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4750);
        assert_eq!(config.pairing.max_attempts, 5);
        assert_eq!(config.pairing.window_secs, 60);
        assert_eq!(config.approvals.timeout_secs, 300);
        assert_eq!(config.stream.coalesce_ms, 16);
        assert!(config.data_dir.is_none());
        assert!(matches!(config.pairing.mode, PairingMode::Direct));
    }

    #[test]
    fn full_config_parses() {
        let config: WardenConfig = toml::from_str(
            r#"
            gateway_name = "workstation"
            public_key = "AAEC"
            data_dir = "./data"

            [server]
            host = "0.0.0.0"
            port = 8080

            [pairing]
            mode = "relay"
            room_id = "room-1"
            room_secret = "shh"
            max_attempts = 3
            window_secs = 120

            [approvals]
            timeout_secs = 60

            [stream]
            coalesce_ms = 32
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway_name, "workstation");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pairing.max_attempts, 3);
        assert_eq!(config.approvals.timeout_secs, 60);
        assert_eq!(config.stream.coalesce_ms, 32);

        let endpoint = endpoint_from(&config, "0.0.0.0", 8080).unwrap();
        assert!(matches!(
            endpoint,
            PairingEndpoint::Relay { room_id, .. } if room_id == "room-1"
        ));
    }

    #[test]
    fn relay_mode_without_room_is_rejected() {
        let config: WardenConfig = toml::from_str(
            r#"
            [pairing]
            mode = "relay"
            "#,
        )
        .unwrap();
        assert!(endpoint_from(&config, "127.0.0.1", 4750).is_err());
    }

    #[test]
    fn direct_mode_advertises_loopback_when_binding_everywhere() {
        let config: WardenConfig = toml::from_str("").unwrap();
        let endpoint = endpoint_from(&config, "0.0.0.0", 4750).unwrap();
        assert!(matches!(
            endpoint,
            PairingEndpoint::Direct { host, port } if host == "127.0.0.1" && port == 4750
        ));
    }

    #[test]
    fn advertise_host_wins_over_bind_host() {
        let config: WardenConfig = toml::from_str(
            r#"
            [pairing]
            advertise_host = "gateway.lan"
            "#,
        )
        .unwrap();
        let endpoint = endpoint_from(&config, "0.0.0.0", 4750).unwrap();
        assert!(matches!(
            endpoint,
            PairingEndpoint::Direct { host, .. } if host == "gateway.lan"
        ));
    }
}
