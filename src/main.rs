use anyhow::Result;
use clap::Parser;
use relq::commands::{self, Cli, Command, Context};
use relq::config::Config;
use relq::store::Store;
use tracing::{debug, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut out = std::io::stdout();

    // No store needed
    if let Command::Version = cli.command {
        return commands::inspect::version(&mut out);
    }

    let config = Config::resolve(cli.config.as_deref())?;
    for warning in config.validate()?.warnings {
        warn!("{warning}");
    }
    debug!(prefix = %config.prefix, url = %config.redis_url, "Loaded configuration");

    let store = connect(&config).await?;
    let ctx = Context::new(store, config.queue_options());
    commands::execute(&cli.command, &ctx, &mut out).await
}

#[cfg(feature = "redis")]
async fn connect(config: &Config) -> Result<Store> {
    Store::redis_with_pool(&config.redis_url, config.blocking_pool_size).await
}

#[cfg(not(feature = "redis"))]
async fn connect(_config: &Config) -> Result<Store> {
    anyhow::bail!("relq was built without the `redis` feature")
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
