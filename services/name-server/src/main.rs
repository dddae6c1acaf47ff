//! Directory Service Server
//!
//! Hosts the name tree that services publish themselves in. Bindings are
//! leased; a landlord task drops the ones that stop being renewed.
//!
//! USAGE:
//!   name-server [OPTIONS]
//!
//! EXAMPLES:
//!   name-server                         # Default port, 60 second leases
//!   name-server --port 14502            # Custom port
//!   name-server --lease-secs 0          # Bindings never expire

use clap::Parser;
use nameserv::{NameServer, NameServerConfig, DEFAULT_NAME_SERVER_PORT};
use orb::{OrbConfig, OrbRuntime};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "name-server")]
#[command(version)]
#[command(about = "Directory service - maps paths to published broker objects")]
struct Args {
    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port number to listen on
    #[arg(long, default_value_t = DEFAULT_NAME_SERVER_PORT)]
    port: u16,

    /// Seconds a binding lives without renewal. 0 disables leases.
    #[arg(long, default_value_t = 60)]
    lease_secs: u64,

    /// Seconds between lease expiry sweeps
    #[arg(long, default_value_t = 15)]
    landlord_secs: u64,
}

impl Args {
    fn server_config(&self) -> NameServerConfig {
        NameServerConfig {
            lease_duration: (self.lease_secs > 0).then(|| Duration::from_secs(self.lease_secs)),
            landlord_interval: Duration::from_secs(self.landlord_secs.max(1)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let runtime = OrbRuntime::init(OrbConfig::default());
    let endpoint = runtime.start_server(addr).await?;

    let server = NameServer::new(args.server_config());
    server.publish(&runtime).await?;
    let landlord = server.start_landlord();
    info!("Directory service listening on {}", endpoint);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down with {} bindings", server.binding_count());

    server.stop_landlord();
    let _ = landlord.await;
    runtime.shutdown().await?;
    Ok(())
}
