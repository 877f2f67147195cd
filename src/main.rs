use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sospf::protocol::{heartbeat, server};
use sospf::{console, Router, RouterConfig};

#[derive(Parser)]
#[command(name = "sospf", about = "Simulated OSPF link-state router")]
struct Cli {
    /// JSON router configuration
    #[arg(short, long)]
    config: Option<String>,

    /// Simulated address, when no configuration file is given
    #[arg(long)]
    simulated_ip: Option<String>,

    #[arg(long)]
    process_ip: Option<String>,

    /// Listening port (20000..=32767); the first free one is used when omitted
    #[arg(long)]
    process_port: Option<u16>,

    #[arg(long)]
    num_ports: Option<usize>,

    /// Seconds between failure detector passes
    #[arg(long)]
    heartbeat_interval: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<RouterConfig> {
        let mut config = match (&self.config, &self.simulated_ip) {
            (Some(path), _) => RouterConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path))?,
            (None, Some(simulated_ip)) => RouterConfig::new(simulated_ip.as_str()),
            (None, None) => bail!("either --config or --simulated-ip is required"),
        };

        if let (Some(_), Some(simulated_ip)) = (&self.config, self.simulated_ip) {
            config.simulated_ip = simulated_ip;
        }
        if let Some(process_ip) = self.process_ip {
            config.process_ip = process_ip;
        }
        if let Some(port) = self.process_port {
            config.process_port = Some(port);
        }
        if let Some(num_ports) = self.num_ports {
            config.num_ports = num_ports;
        }
        if let Some(interval) = self.heartbeat_interval {
            config.heartbeat_interval_secs = interval;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let (listener, port) = server::bind_listener(&config).await?;
    let router = Router::new(config, port)?;
    info!(
        simulated_ip = router.simulated_ip(),
        process_addr = %router.description().process_addr(),
        "router started"
    );

    let server_task = server::spawn(router.clone(), listener);
    let detector_task = heartbeat::spawn_detector(router.clone());

    let quit = console::run(
        &router,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    if !quit {
        info!("console input closed, waiting for ctrl-c");
        tokio::signal::ctrl_c().await?;
        router.quit().await;
    }

    detector_task.abort();
    server_task.abort();
    Ok(())
}
