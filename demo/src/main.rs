#[macro_use]
extern crate log;

use std::net::{SocketAddr, ToSocketAddrs};

use clap::Parser;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

mod pages;
mod routes;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not resolve address `{0}`")]
    Address(String),
}

/// Datastar demo server
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Bind the server to this host
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Bind the server to this port
    #[arg(long, env = "PORT", default_value_t = 5555)]
    port: u16,
}

impl Cli {
    fn address(&self) -> Result<SocketAddr, Error> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.to_socket_addrs()?
            .next()
            .ok_or(Error::Address(addr))
    }
}

fn is_loopback(addr: &SocketAddr) -> bool {
    addr.ip().is_loopback()
}

async fn run() -> Result<(), Error> {
    // Environment variables from a .env file are read before the arguments
    // so they can act as fallbacks.
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let addr = cli.address()?;
    if !is_loopback(&addr) {
        warn!("listening on non-loopback address {}", addr);
    }

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    loop {
        let (tcp, remote) = listener.accept().await?;
        trace!("connection from {}", remote);
        tokio::spawn(async move {
            let conn = http1::Builder::new()
                .serve_connection(TokioIo::new(tcp), service_fn(routes::handle));
            if let Err(e) = conn.await {
                debug!("connection from {} ended: {}", remote, e);
            }
        });
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => {}
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
