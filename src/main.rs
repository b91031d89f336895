use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use tcg_ingest::catalog::client::CatalogClient;
use tcg_ingest::config::Config;
use tcg_ingest::ingest::store::Store;
use tcg_ingest::logging::init_tracing;
use tcg_ingest::pipeline::coordinator::Coordinator;
use tcg_ingest::util::db::{ConnectionInfo, Db};
use tcg_ingest::util::env::init_env;

/// Marketplace catalog ingester: fetches card data and images for the given
/// product lines and stores them in MySQL.
#[derive(Parser, Debug)]
#[command(name = "tcg-ingest", version, about)]
struct Args {
    /// Product lines to ingest, e.g. "YuGiOh".
    #[arg(required = true)]
    product_lines: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env();
    init_tracing("tcg_ingest=info,info")?;
    let args = Args::parse();

    let cfg = Config::from_env()?;
    let db = Db::connect(
        &ConnectionInfo::from_env()?,
        cfg.db_max_connections,
        cfg.db_idle_connections,
    )
    .await?;
    let client = CatalogClient::new(&cfg)?;
    let coordinator = Coordinator::new(cfg, client, Store::new(db));

    for product_line in &args.product_lines {
        info!(%product_line, "starting ingestion");
        if let Err(e) = coordinator.run(product_line).await {
            error!(%product_line, error = ?e, "ingestion failed");
            return Err(e);
        }
    }
    Ok(())
}
