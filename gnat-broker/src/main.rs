use std::path::Path;

use gnat_broker::init::BrokerEnv;

/// The whole broker runs cooperatively on one thread: sessions, router and
/// the status endpoint are tasks, not threads, and no broker state is
/// shared across cores.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let env = BrokerEnv::new(Path::new("gnat.toml")).init();
    let config = env.into_config();

    if let Err(err) = gnat_broker::run(config).await {
        log::error!("Broker failed to start: {err}");
        std::process::exit(1);
    }
}
