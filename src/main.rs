use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use ghostpost::storage::Backend;
use ghostpost::{Config, SmtpServer};

/// Inbound mail intake server
#[derive(Clone, Debug, Parser)]
#[command(about, version)]
struct Opt {
    #[command(subcommand)]
    cmd: SubCommand,
}

#[derive(Clone, Debug, Parser)]
enum SubCommand {
    /// Accept mail for the configured domains and store it
    Serve(ServeCommand),
    /// Print the ids of the messages stored on a given day
    List(ListCommand),
}

#[derive(Clone, Debug, Parser)]
struct ServeCommand {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Port to listen on; overrides the file and PORT
    #[arg(long)]
    port: Option<u16>,
    /// Write messages under this directory instead of a bucket; overrides
    /// the file and the environment
    #[arg(long)]
    storage_root: Option<PathBuf>,
}

#[derive(Clone, Debug, Parser)]
struct ListCommand {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Read from this directory instead of a bucket
    #[arg(long)]
    storage_root: Option<PathBuf>,
    /// Day to list, as YYYY-MM-DD (UTC). Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
}

fn load_config(
    path: Option<&PathBuf>,
    storage_root: Option<PathBuf>,
) -> anyhow::Result<Config> {
    let mut config = Config::load(path.map(PathBuf::as_path))?;
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("reading configuration from the environment")?;
    if let Some(root) = storage_root {
        config.storage.bucket = None;
        config.storage.root = Some(root);
    }
    Ok(config)
}

fn serve(cmd: ServeCommand) -> anyhow::Result<()> {
    let mut config = load_config(cmd.config.as_ref(), cmd.storage_root)?;
    if let Some(port) = cmd.port {
        config.port = port;
    }
    config.validate().context("invalid configuration")?;

    let target = config.storage_target()?;
    let backend =
        Backend::open(&target).with_context(|| format!("opening storage {target}"))?;
    log::info!("Storing mail in {target}");

    let server = SmtpServer::with_settings(
        config.domain_policy(),
        backend.into_store(),
        config.server_settings(),
    );
    let addr = config.listen_address();
    server
        .start(&addr)
        .with_context(|| format!("serving on {addr}"))?;
    Ok(())
}

fn list(cmd: ListCommand) -> anyhow::Result<()> {
    let config = load_config(cmd.config.as_ref(), cmd.storage_root)?;
    let target = config.storage_target()?;
    let backend =
        Backend::open(&target).with_context(|| format!("opening storage {target}"))?;

    let date = cmd.date.unwrap_or_else(|| Utc::now().date_naive());
    for id in backend
        .list_day(date)
        .with_context(|| format!("listing {date} in {target}"))?
    {
        println!("{id}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .parse_filters("info")
        .parse_env("RUST_LOG")
        .init();
    let opts = Opt::parse();

    match opts.cmd {
        SubCommand::Serve(cmd) => serve(cmd),
        SubCommand::List(cmd) => list(cmd),
    }
}
