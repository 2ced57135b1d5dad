// logond - WoW-compatible logon/authentication server
//
// Terminates the cleartext pre-game logon protocol: SRP6 challenge and
// proof against verifiers stored in the login database, then realm list
// distribution tailored to the client's build and network location.

mod auth_codes;
mod protocol;
mod realm_list;
mod session;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpSocket;
use tokio::sync::watch;
use tokio::task::JoinSet;

use logon_shared::config::Config;
use logon_shared::database::Database;
use logon_shared::log::initialize_logging;

use realm_list::{BuildCatalog, REALM_UPDATE_INTERVAL_SECS, RealmCatalog, refresh_loop};
use session::handle_connection;
use store::{AccountStore, SqlAccountStore};

const DEFAULT_LOGON_PORT: i32 = 3724;
const DEFAULT_CONFIG: &str = "logond.conf";

/// Time allowed for open connections to drain after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "logond")]
#[command(about = "WoW-compatible authentication server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match Config::load(&args.config, "Logond_") {
        Some(config) => config,
        None => {
            eprintln!(
                "Could not read configuration file {}, continuing with defaults",
                args.config
            );
            Config::empty("Logond_")
        }
    };

    let log_dir = config.get_string("LogsDir");
    let log_level = config.get_string_default("LogLevel", "info");
    initialize_logging(
        if log_dir.is_empty() { None } else { Some(log_dir.as_str()) },
        &log_level,
    );

    let worker_threads = config.get_int_default("WorkerThreads", 2).max(1) as usize;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("failed to build the async runtime")?;

    runtime.block_on(run(config, worker_threads))
}

async fn run(config: Config, worker_threads: usize) -> anyhow::Result<()> {
    tracing::info!("logond v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("<Ctrl-C> to stop.");

    let db_info = config.get_string("LoginDatabaseInfo");
    if db_info.is_empty() {
        anyhow::bail!("LoginDatabaseInfo is not configured");
    }

    let mut db = Database::new("Login");
    db.initialize(&db_info, worker_threads as u32)
        .await
        .context("cannot connect to the login database")?;
    let store = Arc::new(SqlAccountStore::new(db));

    let builds = BuildCatalog::new(
        store
            .list_builds()
            .await
            .context("failed to load the build table")?,
    );
    if builds.is_empty() {
        anyhow::bail!("build_information table is empty, no client could ever log in");
    }
    tracing::info!("Loaded {} supported client build(s)", builds.len());
    let builds = Arc::new(builds);

    let catalog = Arc::new(RealmCatalog::new());
    catalog
        .update_realms(store.as_ref())
        .await
        .context("failed to load the realm list")?;
    if catalog.is_empty() {
        anyhow::bail!("No valid realms specified");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let update_interval =
        config.get_int_default("RealmsStateUpdateDelay", REALM_UPDATE_INTERVAL_SECS as i32);
    if update_interval > 0 {
        tokio::spawn(refresh_loop(
            catalog.clone(),
            store.clone(),
            update_interval as u64,
            shutdown_rx.clone(),
        ));
    }

    let ping_interval_mins = config.get_int_default("MaxPingTime", 30);
    if ping_interval_mins > 0 {
        let store_ping = store.clone();
        let mut shutdown_ping = shutdown_rx.clone();
        tokio::spawn(async move {
            let period = Duration::from_secs(ping_interval_mins as u64 * 60);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = shutdown_ping.changed() => return,
                }
                tracing::debug!("Ping database to keep connection alive");
                if let Err(e) = store_ping.database().ping().await {
                    tracing::error!("Database ping failed: {}", e);
                }
            }
        });
    }

    let bind_ip = config.get_string_default("BindIP", "0.0.0.0");
    let port = config.get_int_default("LogonServerPort", DEFAULT_LOGON_PORT);
    let bind_addr: SocketAddr = format!("{}:{}", bind_ip, port)
        .parse()
        .context("invalid BindIP / LogonServerPort")?;

    let socket = if bind_addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .context("failed to create the listener socket")?;
    socket.set_reuseaddr(true)?;
    socket
        .bind(bind_addr)
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    let listener = socket.listen(1024).context("listen failed")?;
    tracing::info!("Listening on {}", bind_addr);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let _ = stream.set_nodelay(true);
                        connections.spawn(handle_connection(
                            stream,
                            addr,
                            store.clone(),
                            builds.clone(),
                            catalog.clone(),
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    // Stop accepting, tell every connection to drain, then wait.
    drop(listener);
    let _ = shutdown_tx.send(true);

    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!(
            "Forcing shutdown with {} connection(s) still open",
            connections.len()
        );
        connections.abort_all();
    }

    tracing::info!("Halting process");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::error!("Failed to install the SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
