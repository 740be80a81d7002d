use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "palaver-server",
    author,
    version,
    about = "Palaver group-chat backend"
)]
pub struct Cli {
    /// Address to bind the HTTP/WebSocket listener to.
    #[arg(long, env = "PALAVER_LISTEN_ADDR", default_value = "127.0.0.1:8686")]
    listen_addr: String,

    /// Secret used to sign bearer tokens. Override outside development.
    #[arg(long, env = "PALAVER_TOKEN_SECRET", default_value = "palaver-dev-secret")]
    token_secret: String,

    /// Seed a few users, groups and messages at startup (development only).
    #[arg(long, env = "PALAVER_SEED", default_value_t = false)]
    seed: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub token_secret: String,
    pub seed: bool,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        Ok(ServerConfig {
            listen_addr,
            token_secret: cli.token_secret,
            seed: cli.seed,
        })
    }
}
