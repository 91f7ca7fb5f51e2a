use anyhow::{anyhow, Result};
use cdns::{ChallengeBridge, Config, ServerGroup, Shared};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or("cdns".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;
    tracing_init(config.log_level.as_deref());

    let (err_tx, mut err_rx) = mpsc::channel(4);
    let mut servers = ServerGroup::new(&config);
    servers.start(&err_tx);
    drop(err_tx);

    let challenge = Arc::new(ChallengeBridge::new(&servers));
    tracing::info!("API listening on {}", &config.api_bind_addr);
    let api_handle = tokio::spawn(cdns::new_http(config.clone(), challenge));

    let result = tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
            Ok(())
        },
        Some(err) = err_rx.recv() => {
            Err(err.into())
        },
        api_res = api_handle => match api_res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.into()),
            Err(err) => Err(err.into()),
        },
    };

    servers.shutdown().await?;
    tracing::info!("goodbye");
    result
}

fn tracing_init(log_level: Option<&str>) {
    let default = log_level.unwrap_or("cdns=info").to_string();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<Shared> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            let config = Config::try_from_file(&config_file)?;
            Ok(Arc::new(config))
        }
    }
}
