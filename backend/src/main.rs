use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crm_backend::config::Config;
use crm_backend::jobs::{JobRegistry, JobRunner, JobScheduler};
use crm_backend::remote::RemoteClient;
use crm_backend::store::{CrmStore, MemoryStore, PgStore};
use crm_backend::{app, commands, database, AppState};

#[derive(Parser)]
#[command(name = "crm-backend")]
#[command(about = "CRM maintenance jobs and admin API")]
#[command(version)]
struct Cli {
    /// Use a throwaway in-memory store instead of Postgres
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the job scheduler and the admin HTTP API
    Serve,
    /// Run one job immediately and print its status
    RunJob {
        /// heartbeat, low_stock, crm_report, order_reminders or customer_cleanup
        name: String,
    },
    /// Delete customers with no orders in the past year
    CleanInactiveCustomers,
    /// Reset the catalog to the demo customer and products
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let (db_pool, store) = open_store(&config, cli.in_memory).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, db_pool, store).await?,
        Commands::RunJob { name } => {
            let registry = build_registry(&config, store)?;
            let result = registry.run_job_now(&name).await?;
            println!("{}", result.message);
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::CleanInactiveCustomers => {
            let line = commands::clean_inactive_customers(store, config.jobs.inactivity_days, Utc::now()).await;
            println!("{}", line);
        }
        Commands::Seed => {
            commands::seed(store.as_ref()).await?;
            println!("{}", commands::SEED_MESSAGE);
        }
    }

    Ok(())
}

async fn open_store(config: &Config, in_memory: bool) -> Result<(Option<sqlx::PgPool>, Arc<dyn CrmStore>)> {
    if in_memory {
        info!("Using in-memory store");
        let store: Arc<dyn CrmStore> = Arc::new(MemoryStore::new());
        return Ok((None, store));
    }

    let db_pool = database::create_pool(&config.database_url).await?;
    database::migrate(&db_pool).await?;
    let store: Arc<dyn CrmStore> = Arc::new(PgStore::new(db_pool.clone()));
    Ok((Some(db_pool), store))
}

fn build_registry(config: &Config, store: Arc<dyn CrmStore>) -> Result<JobRegistry> {
    let client = RemoteClient::new(&config.remote)?;
    let runner = JobRunner::new(client, store, config.jobs.retry.clone());
    Ok(JobRegistry::new(runner, config.jobs.clone(), &config.logs))
}

async fn serve(config: Config, db_pool: Option<sqlx::PgPool>, store: Arc<dyn CrmStore>) -> Result<()> {
    let registry = build_registry(&config, store.clone())?;

    if config.remote.negotiate_on_startup {
        if let Err(e) = registry.runner().client().negotiate().await {
            warn!("Contract negotiation failed, every request shape will be tried: {}", e);
        }
    }

    let mut scheduler = JobScheduler::new(registry.clone()).await?;
    scheduler.start().await?;

    let app_state = Arc::new(AppState { db_pool, store, jobs: registry });
    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    info!("Server running on {}", config.server_addr);

    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    scheduler.shutdown().await?;
    Ok(())
}
