use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use toggldw::config::{self, Config};
use toggldw::{server, window, Database, Schedule, Scheduler, TogglClient, TogglDW};

#[derive(Parser)]
#[command(name = "toggldw", about = "Mirror Toggl Track time entries into SQLite")]
struct Cli {
    /// Run a single sync for the --from/--to window and exit
    #[arg(long, conflicts_with_all = ["daily", "serve"])]
    once: bool,

    /// Period between syncs in interval mode (e.g. 15m, 1h30m)
    #[arg(long, default_value = "15m")]
    interval: String,

    /// Sync the previous 24 hours at every midnight in SYNC_TZ
    #[arg(long, conflicts_with = "serve")]
    daily: bool,

    /// Only sync when triggered over HTTP
    #[arg(long)]
    serve: bool,

    /// Window start (RFC3339 or YYYY-MM-DD; default: 24h before --to)
    #[arg(long, default_value = "")]
    from: String,

    /// Window end (RFC3339 or YYYY-MM-DD, inclusive day; default: now)
    #[arg(long, default_value = "")]
    to: String,

    /// Address for the HTTP trigger endpoint (overrides TOGGLDW_HTTP_ADDR)
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Database path (default: ~/.toggldw/toggldw.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show applied migrations and warehouse row counts
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Some(Commands::Status) = cli.command {
        let path = cli
            .db
            .clone()
            .or_else(|| std::env::var_os("TOGGLDW_DB").map(PathBuf::from));
        let db = open_db(path).await?;
        return print_status(&db).await;
    }

    let mut config = Config::from_env()?;
    if let Some(path) = cli.db.clone() {
        config.db_path = Some(path);
    }
    if let Some(addr) = cli.http_addr {
        config.http_addr = Some(addr);
    }

    let every = config::parse_duration(&cli.interval)?;
    let initial = window::resolve(&cli.from, &cli.to, Utc::now())?;
    if cli.serve && config.http_addr.is_none() {
        anyhow::bail!("--serve requires --http-addr or TOGGLDW_HTTP_ADDR");
    }

    let db = open_db(config.db_path.clone()).await?;
    db.ping().await?;
    let client = TogglClient::from_config(&config)?;
    let dw = TogglDW::from_parts(client, db);

    let schedule = if cli.once {
        Schedule::Once(initial)
    } else if cli.daily {
        Schedule::Daily(config.timezone)
    } else if cli.serve {
        Schedule::OnDemand
    } else {
        Schedule::Interval { every, initial }
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        log::info!("received shutdown signal");
        let _ = stop_tx.send(true);
    });

    let server = match config.http_addr {
        Some(addr) if !cli.once => Some(tokio::spawn(server::serve(
            addr,
            dw.clone(),
            stop_rx.clone(),
        ))),
        _ => None,
    };

    let scheduler = Scheduler::new(dw, stop_rx).run(schedule);
    let Some(mut server) = server else {
        scheduler.await?;
        return Ok(());
    };
    tokio::select! {
        result = scheduler => {
            result?;
            server.await??;
        }
        joined = &mut server => joined??,
    }
    Ok(())
}

async fn open_db(path: Option<PathBuf>) -> anyhow::Result<Database> {
    let db = match path {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };
    Ok(db)
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            log::warn!("cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn print_status(db: &Database) -> anyhow::Result<()> {
    let (entries, projects) = db.counts().await?;
    let migrations = db.applied_migrations().await?;

    println!("Warehouse Status");
    println!("  Time entries: {entries}");
    println!("  Projects:     {projects}");
    println!("  Migrations:");
    if migrations.is_empty() {
        println!("    none");
    }
    for m in migrations {
        println!("    {:04}  applied {}", m.version, m.applied_at);
    }
    Ok(())
}
