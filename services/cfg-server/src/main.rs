//! Configuration Store Server
//!
//! Hosts a versioned object store and publishes it in the directory service
//! so clients can find it by name.
//!
//! USAGE:
//!   cfg-server [OPTIONS]
//!
//! Options may be given in either style:
//!   cfg-server /Port=13503 /RepoPath=C:\Data /NSAddr=nshost:13502
//!   cfg-server --port 13503 --repo-path /var/lib/cfg --ns-addr nshost:13502
//!
//! EXIT CODES:
//!   0  normal shutdown
//!   2  bad parameters
//!   3  store could not be initialized
//!   4  server could not be started
//!   5  runtime failure

use clap::Parser;
use nameserv::{DirectoryRebinder, RebinderConfig, DEFAULT_NAME_SERVER_PORT};
use objstore::{publish_store, StoreError, StoreFlags, VersionedObjectStore};
use orb::{Endpoint, OrbConfig, OrbError, OrbRuntime, ServerConfig};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_PORT: u16 = 13_503;
const DEFAULT_SCOPE: &str = "/Local/CfgSrv";
const STORE_NAME: &str = "CfgSrv";

/// Slash-style flags and the long options they stand for
const SLASH_FLAGS: &[(&str, &str)] = &[
    ("port", "--port"),
    ("max", "--max"),
    ("repopath", "--repo-path"),
    ("altnsscope", "--alt-ns-scope"),
    ("nsaddr", "--ns-addr"),
];

#[derive(Parser, Debug)]
#[command(name = "cfg-server")]
#[command(version)]
#[command(about = "Configuration store server - versioned objects published through the directory")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum number of client connections
    #[arg(long, default_value_t = 64)]
    max: usize,

    /// Directory holding the repository file. Defaults to the directory of
    /// this executable.
    #[arg(long)]
    repo_path: Option<PathBuf>,

    /// Directory scope to publish under instead of /Local/CfgSrv
    #[arg(long)]
    alt_ns_scope: Option<String>,

    /// Directory service address, host:port
    #[arg(long, default_value_t = format!("localhost:{}", DEFAULT_NAME_SERVER_PORT))]
    ns_addr: String,

    /// Move an unreadable repository aside and start empty
    #[arg(long)]
    recover: bool,

    /// Seconds between background retries of writes whose flush failed
    #[arg(long, default_value_t = 30)]
    flush_secs: u64,
}

#[derive(Debug, Error)]
enum Failure {
    #[error("bad parameters: {0}")]
    BadParams(String),

    #[error("store initialization failed: {0}")]
    StoreInit(#[source] StoreError),

    #[error("server start failed: {0}")]
    ServerStart(#[source] OrbError),

    #[error("runtime failure: {0}")]
    Runtime(String),
}

impl Failure {
    fn exit_code(&self) -> u8 {
        match self {
            Failure::BadParams(_) => 2,
            Failure::StoreInit(_) => 3,
            Failure::ServerStart(_) => 4,
            Failure::Runtime(_) => 5,
        }
    }
}

/// Rewrite `/Name=value` flags into long options. Unknown slash flags are
/// logged and dropped.
fn normalize_args<I: IntoIterator<Item = String>>(raw: I) -> Vec<String> {
    let mut out = Vec::new();
    for (index, arg) in raw.into_iter().enumerate() {
        let slash_flag = (index > 0)
            .then(|| arg.strip_prefix('/'))
            .flatten()
            .and_then(|rest| rest.split_once('='));
        let Some((name, value)) = slash_flag else {
            out.push(arg);
            continue;
        };
        let lowered = name.to_ascii_lowercase();
        match SLASH_FLAGS.iter().find(|(flag, _)| *flag == lowered) {
            Some((_, long)) => out.push(format!("{}={}", long, value)),
            None => warn!("Ignoring unknown parameter /{}", name),
        }
    }
    out
}

fn parse_endpoint(text: &str) -> Result<Endpoint, Failure> {
    let (host, port) = text
        .rsplit_once(':')
        .ok_or_else(|| Failure::BadParams(format!("expected host:port, got {:?}", text)))?;
    let port = port
        .parse()
        .map_err(|_| Failure::BadParams(format!("bad port in {:?}", text)))?;
    if host.is_empty() {
        return Err(Failure::BadParams(format!("missing host in {:?}", text)));
    }
    Ok(Endpoint::new(host, port))
}

fn repo_dir(args: &Args) -> Result<PathBuf, Failure> {
    if let Some(path) = &args.repo_path {
        return Ok(path.clone());
    }
    let exe = std::env::current_exe()
        .map_err(|e| Failure::BadParams(format!("cannot locate executable: {}", e)))?;
    exe.parent()
        .map(PathBuf::from)
        .ok_or_else(|| Failure::BadParams("executable has no parent directory".into()))
}

fn binding_path(args: &Args) -> String {
    let scope = args
        .alt_ns_scope
        .as_deref()
        .unwrap_or(DEFAULT_SCOPE)
        .trim_end_matches('/');
    format!("{}/%(h)", scope)
}

fn spawn_flusher(
    store: Arc<VersionedObjectStore>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                _ = ticker.tick() => {}
            }
            if !store.is_dirty() {
                continue;
            }
            let target = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || target.flush()).await {
                Ok(Ok(())) => debug!("Flushed pending changes"),
                Ok(Err(e)) => warn!("Background flush failed: {}", e),
                Err(e) => warn!("Background flush task failed: {}", e),
            }
        }
    })
}

async fn run(args: Args) -> Result<(), Failure> {
    let ns_endpoint = parse_endpoint(&args.ns_addr)?;
    let repo_dir = repo_dir(&args)?;
    if args.max == 0 || args.flush_secs == 0 {
        return Err(Failure::BadParams("max and flush-secs must be non-zero".into()));
    }

    let store = Arc::new(VersionedObjectStore::new());
    let flags = StoreFlags {
        case_sensitive: false,
        recovery_mode: args.recover,
    };
    let created = store
        .initialize(&repo_dir, STORE_NAME, flags)
        .map_err(Failure::StoreInit)?;
    if created {
        info!("Created new repository in {}", repo_dir.display());
    }

    let runtime = OrbRuntime::init(OrbConfig {
        server: ServerConfig {
            max_connections: args.max,
            ..Default::default()
        },
        ..Default::default()
    });
    let listen = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    let endpoint = runtime
        .start_server(listen)
        .await
        .map_err(Failure::ServerStart)?;
    let object_id = publish_store(&runtime, Arc::clone(&store))
        .await
        .map_err(Failure::ServerStart)?;
    info!("Configuration store serving on {}", endpoint);

    let rebinder = DirectoryRebinder::remote(Arc::clone(&runtime), ns_endpoint, RebinderConfig::default());
    let path = rebinder
        .register(
            &binding_path(&args),
            object_id,
            "Configuration store",
            Default::default(),
        )
        .map_err(|e| Failure::Runtime(format!("cannot register binding: {}", e)))?;
    rebinder.start();
    info!("Publishing as {} via {}", path, args.ns_addr);

    let (stop_flush, flush_rx) = watch::channel(false);
    let flusher = spawn_flusher(Arc::clone(&store), Duration::from_secs(args.flush_secs), flush_rx);

    let signal = tokio::signal::ctrl_c().await;
    info!("Shutting down");

    rebinder.shutdown().await;
    let _ = stop_flush.send(true);
    if let Err(e) = flusher.await {
        warn!("Flush task ended abnormally: {}", e);
    }
    let closed = store.close();
    let stopped = runtime.shutdown().await;

    signal.map_err(|e| Failure::Runtime(format!("signal handler failed: {}", e)))?;
    closed.map_err(|e| Failure::Runtime(format!("store close failed: {}", e)))?;
    stopped.map_err(|e| Failure::Runtime(format!("runtime shutdown failed: {}", e)))?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Cannot install logger: {}", e);
    }

    let args = match Args::try_parse_from(normalize_args(std::env::args())) {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 2 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_slash_flags() {
        let normalized = normalize_args(args(&[
            "cfg-server",
            "/Port=14000",
            "/REPOPATH=/tmp/cfg",
            "/Bogus=1",
            "--recover",
            "/AltNSScope=/Test/Cfg",
        ]));
        assert_eq!(
            normalized,
            args(&[
                "cfg-server",
                "--port=14000",
                "--repo-path=/tmp/cfg",
                "--recover",
                "--alt-ns-scope=/Test/Cfg",
            ])
        );

        let parsed = Args::try_parse_from(normalized).unwrap();
        assert_eq!(parsed.port, 14000);
        assert!(parsed.recover);
        assert_eq!(binding_path(&parsed), "/Test/Cfg/%(h)");
    }

    #[test]
    fn test_defaults() {
        let parsed = Args::try_parse_from(normalize_args(args(&["cfg-server"]))).unwrap();
        assert_eq!(parsed.port, DEFAULT_PORT);
        assert_eq!(binding_path(&parsed), "/Local/CfgSrv/%(h)");
        assert!(repo_dir(&parsed).unwrap().is_absolute());
    }

    #[test]
    fn test_bad_parameters() {
        assert!(Args::try_parse_from(normalize_args(args(&["cfg-server", "/Port=abc"]))).is_err());
        for bad in ["nohost", ":80", "host:port"] {
            assert_eq!(parse_endpoint(bad).unwrap_err().exit_code(), 2);
        }
        assert_eq!(
            parse_endpoint("nshost:13502").unwrap(),
            Endpoint::new("nshost", 13502)
        );
    }
}
