//! Register a service into etcd until Ctrl-C.
//!
//! ```text
//! TETHER_ETCD_ENDPOINTS=http://127.0.0.1:2379 TETHER_LOG_LEVEL=debug \
//!     cargo run --example register --features full -- api 10.0.0.1:9000
//! ```

use std::sync::Arc;
use tether::prelude::*;
use tether::tether_log::{error, info, tracing_compat};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let service = args.next().unwrap_or_else(|| "demo".to_string());
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:9000".to_string());

    let logger = Arc::new(Logger::from_env()?);
    tracing_compat::init(logger.clone())?;

    let config = EtcdConfig::from_env()?;
    let store = EtcdStore::connect(&config).await?;

    let registrar = Arc::new(Registrar::new(
        store,
        service,
        Address::new(addr),
        config.ttl,
        logger.clone(),
    ));

    let mut keeper = tokio::spawn({
        let registrar = registrar.clone();
        async move { registrar.keep_alive().await }
    });

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!(logger, "[demo] interrupted, deregistering");
            None
        }
        result = &mut keeper => Some(result?),
    };

    registrar.close().await?;

    let outcome = match finished {
        Some(outcome) => outcome,
        None => keeper.await?,
    };
    if let Err(e) = outcome {
        if !e.is_cancelled() {
            error!(logger, "[demo] keepalive stopped - {}", e);
        }
    }

    logger.flush();
    Ok(())
}
