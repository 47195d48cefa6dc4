#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use std::sync::Arc;
use trendcache::CommandCollector;
use trendcache_http::serve;

#[derive(Parser)]
#[command(name = "trendcache", version, about = "Cached trending searches over HTTP")]
struct Cli {
    /// Scraper program, run as `<cmd> <args..> <category_id> <geo>`
    #[arg(long, env = "TRENDCACHE_COLLECTOR_CMD")]
    collector_cmd: String,
    /// Extra leading arguments for the scraper, space separated
    #[arg(
        long,
        env = "TRENDCACHE_COLLECTOR_ARGS",
        value_delimiter = ' ',
        num_args = 0..,
        allow_hyphen_values = true
    )]
    collector_args: Vec<String>,

    #[arg(long, env = "TRENDCACHE_GEO", default_value = "IN")]
    geo: String,
    /// Additional geographies, comma separated
    #[arg(long, env = "TRENDCACHE_GEOS")]
    geos: Option<String>,
    /// Seconds between scheduled refreshes
    #[arg(long, env = "TRENDCACHE_REFRESH_INTERVAL", default_value = "120")]
    refresh_interval: u64,
    /// Category ids to collect, comma separated (all when unset)
    #[arg(long, env = "TRENDCACHE_CATEGORIES")]
    categories: Option<String>,
    #[arg(long, env = "TRENDCACHE_DATA_DIR", default_value = "./data")]
    data_dir: String,
    #[arg(long, env = "TRENDCACHE_MAX_CONCURRENCY", default_value = "1")]
    max_concurrency: usize,
    /// Refresh right away when nothing was persisted
    #[arg(
        long,
        env = "TRENDCACHE_REFRESH_ON_START",
        default_value = "true",
        action = clap::ArgAction::Set
    )]
    refresh_on_start: bool,
    #[arg(long, env = "TRENDCACHE_BIND_ADDR", default_value = "127.0.0.1:8888")]
    bind_addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    std::env::set_var("TRENDCACHE_GEO", &cli.geo);
    if let Some(geos) = &cli.geos {
        std::env::set_var("TRENDCACHE_GEOS", geos);
    }
    std::env::set_var(
        "TRENDCACHE_REFRESH_INTERVAL",
        cli.refresh_interval.to_string(),
    );
    if let Some(categories) = &cli.categories {
        std::env::set_var("TRENDCACHE_CATEGORIES", categories);
    }
    std::env::set_var("TRENDCACHE_DATA_DIR", &cli.data_dir);
    std::env::set_var("TRENDCACHE_MAX_CONCURRENCY", cli.max_concurrency.to_string());
    std::env::set_var(
        "TRENDCACHE_REFRESH_ON_START",
        cli.refresh_on_start.to_string(),
    );
    std::env::set_var("TRENDCACHE_BIND_ADDR", &cli.bind_addr);

    let args = cli
        .collector_args
        .into_iter()
        .filter(|a| !a.is_empty())
        .collect();
    let collector = Arc::new(CommandCollector::new(cli.collector_cmd, args));
    serve(collector).await
}
