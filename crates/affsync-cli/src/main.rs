mod pipeline;
mod verify_images;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "affsync-cli")]
#[command(about = "Affiliate feed ingestion and catalog sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run one ingestion for a brand and wait for it to finish
    Ingest {
        /// Brand slug
        #[arg(long)]
        brand: String,

        /// Comma-separated keywords; defaults to the brand's configured list
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        offset: Option<u32>,

        #[arg(long)]
        max_pages: Option<u32>,

        /// Fetch and normalize without writing to the catalog
        #[arg(long)]
        dry_run: bool,
    },
    /// Verify imported products still exist downstream and resync stock
    Reconcile {
        /// Restrict to one brand (by slug)
        #[arg(long)]
        brand: Option<String>,
    },
    /// Re-fetch one product from its feed and push any changes
    Refresh {
        product_id: Uuid,
    },
    /// Set an imported product active, or back to draft with --draft
    Publish {
        product_id: Uuid,

        #[arg(long)]
        draft: bool,
    },
    /// List recent ingestion runs for a brand
    Runs {
        #[arg(long)]
        brand: String,

        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Check stored product image URLs
    VerifyImages {
        #[arg(long)]
        brand: Option<String>,

        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Upsert brands from the brands file
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("affsync-cli: no command given; see --help");
        return Ok(());
    };

    let config = affsync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = affsync_db::PoolConfig::from_app_config(&config);
    let pool = affsync_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => run_db(&pool, &config, command).await?,
        Commands::Ingest {
            brand,
            keywords,
            limit,
            offset,
            max_pages,
            dry_run,
        } => {
            let request = pipeline::run_request(keywords, limit, offset, max_pages);
            pipeline::run_ingest(&pool, &config, &brand, request, dry_run).await?;
        }
        Commands::Reconcile { brand } => {
            pipeline::run_reconcile(&pool, &config, brand.as_deref()).await?;
        }
        Commands::Refresh { product_id } => {
            pipeline::run_refresh(&pool, &config, product_id).await?;
        }
        Commands::Publish { product_id, draft } => {
            pipeline::run_publish(&pool, &config, product_id, !draft).await?;
        }
        Commands::Runs { brand, limit } => pipeline::run_list_runs(&pool, &brand, limit).await?,
        Commands::VerifyImages { brand, concurrency } => {
            verify_images::run_verify_images(&pool, &config, brand.as_deref(), concurrency)
                .await?;
        }
    }

    Ok(())
}

async fn run_db(
    pool: &sqlx::PgPool,
    config: &affsync_core::AppConfig,
    command: DbCommands,
) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            affsync_db::health_check(pool).await?;
            println!("database ok");
        }
        DbCommands::Migrate => {
            let applied = affsync_db::run_migrations(pool).await?;
            println!("{applied} migrations applied");
        }
        DbCommands::Seed => {
            let file = affsync_core::load_brands(&config.brands_path)?;
            let seeded = affsync_db::seed_brands(pool, &file.brands).await?;
            println!("seeded {seeded} brands from {}", config.brands_path.display());
        }
    }
    Ok(())
}
