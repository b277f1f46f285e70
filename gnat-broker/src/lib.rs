use std::time::Instant;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub mod commands;
pub mod config;
pub mod error;
pub mod init;
pub mod logger;
pub mod router;
pub mod session;
pub mod status;

use commands::SessionId;
use config::BrokerConfig;
use error::BrokerError;
use router::Router;
use session::Session;

/// Binds the MQTT listener and runs the broker until the process dies.
pub async fn run(config: BrokerConfig) -> Result<(), BrokerError> {
    let listener = TcpListener::bind(config.addr()).await?;
    serve(config, listener).await;
    return Ok(());
}

/// Runs the broker on an already-bound listener. Split out from [`run`] so
/// callers (and the scenario tests) can bind an ephemeral port themselves.
pub async fn serve(config: BrokerConfig, listener: TcpListener) {
    let epoch = Instant::now();
    let (session_tx, session_rx) = mpsc::channel(64);
    let (status_tx, status_rx) = mpsc::channel(8);

    let router = Router::new(session_rx, status_rx, &config, epoch);
    tokio::spawn(router.run());

    if config.http_enabled() {
        tokio::spawn(status::serve(config.http_addr(), status_tx));
    }

    log::info!("Broker listening at: {}", config.addr());

    let mut next_id: SessionId = 1;
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                log::info!("New connection attempt: {addr}");

                let session = Session::new(
                    next_id,
                    stream,
                    session_tx.clone(),
                    config.qos_timeout(),
                    config.max_qos_retries(),
                    epoch,
                );
                tokio::spawn(session.run());
                next_id += 1;
            }
            Err(err) => {
                log::error!("Rejected TCP connection: {err}");
            }
        }
    }
}
