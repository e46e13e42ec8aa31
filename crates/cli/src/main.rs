//! Bookbase CLI
//!
//! Admin tool and web server runner.

mod migrations;

use anyhow::{bail, Result};
use bookbase_api::{create_router, AppState};
use bookbase_database::{
    apply_migrations, migration_status, reset_migrations, validate_provider_config, BookFilter,
    BookSort, ClientFactory, Database, DatabaseContext, Pagination, Provider, SortDirection,
};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "bookbase")]
#[command(about = "Bookbase - multi-provider PostgreSQL book catalogue")]
#[command(version)]
struct Cli {
    /// Provider to use instead of the resolved one
    /// (edge-http, pooled-cloud, pooled-local)
    #[arg(short, long)]
    provider: Option<Provider>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved provider and which providers are configured
    Provider,

    /// Check that the provider answers queries
    Health,

    /// Inspect or change the migration ledger
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },

    /// Query books
    Books {
        #[command(subcommand)]
        action: BooksAction,
    },

    /// Query authors
    Authors {
        #[command(subcommand)]
        action: AuthorsAction,
    },

    /// Start the web server
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Show applied and pending migrations
    Status {
        /// Directory of *.sql migrations (bundled baseline if omitted)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Apply pending migrations
    Apply {
        /// Directory of *.sql migrations (bundled baseline if omitted)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Drop the provider's ledger table
    Reset {
        /// Required; the ledger is deleted
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum BooksAction {
    /// Search books
    List {
        #[arg(short, long)]
        genre: Option<String>,

        /// Substring of title, description or author name
        #[arg(short, long)]
        query: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        per_page: u32,
    },

    /// Book statistics
    Stats,

    /// Highest rated books
    Featured {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum AuthorsAction {
    /// Author statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let factory = ClientFactory::from_env()?;

    match cli.command {
        Commands::Provider => provider(&factory, cli.provider),
        Commands::Health => health(&factory, cli.provider).await?,
        Commands::Migrate { action } => migrate(&factory, cli.provider, action).await?,
        Commands::Books { action } => {
            with_database(&factory, cli.provider, |db| books(db, action)).await?
        }
        Commands::Authors { action } => {
            with_database(&factory, cli.provider, |db| authors(db, action)).await?
        }
        Commands::Serve { bind } => serve(factory, cli.provider, bind).await?,
    }

    Ok(())
}

/// Open a database, run `op` and release the session whatever the outcome.
async fn with_database<F, Fut>(factory: &ClientFactory, provider: Option<Provider>, op: F) -> Result<()>
where
    F: FnOnce(Database) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let db = Database::connect(factory, provider).await?;
    let outcome = op(db.clone()).await;
    db.close().await;
    outcome
}

fn provider(factory: &ClientFactory, pinned: Option<Provider>) {
    let current = pinned.unwrap_or_else(|| factory.current_provider());
    println!("Current provider: {}", current);
    println!();
    println!("{:<14} {:<12} {:<22}", "PROVIDER", "CONFIGURED", "LEDGER TABLE");
    println!("{}", "-".repeat(48));
    for p in Provider::ALL {
        let configured = if validate_provider_config(factory.settings(), p) {
            "yes"
        } else {
            "no"
        };
        println!("{:<14} {:<12} {:<22}", p, configured, p.ledger_table());
    }
}

async fn health(factory: &ClientFactory, provider: Option<Provider>) -> Result<()> {
    let db = Database::connect(factory, provider).await?;
    let healthy = db.health_check().await;
    let provider = db.provider();
    db.close().await;

    if !healthy {
        bail!("{} is not reachable", provider);
    }
    println!("{}: healthy", provider);
    Ok(())
}

async fn migrate(factory: &ClientFactory, provider: Option<Provider>, action: MigrateAction) -> Result<()> {
    match action {
        MigrateAction::Status { dir } => {
            let files = migrations::resolve(dir.as_deref())?;
            let status = migration_status(factory, provider, &files).await?;
            println!("Provider: {} ({})", status.provider, status.provider.ledger_table());
            println!("Applied:  {}", status.applied.len());
            for name in &status.applied {
                let marker = if status.drifted.contains(name) { " (changed since applied)" } else { "" };
                println!("  + {}{}", name, marker);
            }
            println!("Pending:  {}", status.pending.len());
            for name in &status.pending {
                println!("  - {}", name);
            }
        }
        MigrateAction::Apply { dir } => {
            let files = migrations::resolve(dir.as_deref())?;
            let report = apply_migrations(factory, provider, &files).await?;
            if report.applied.is_empty() {
                println!("{}: nothing to apply", report.provider);
            }
            for name in &report.applied {
                println!("{}: applied {}", report.provider, name);
            }
        }
        MigrateAction::Reset { confirm } => {
            let provider = provider.unwrap_or_else(|| factory.current_provider());
            reset_migrations(factory, provider, confirm).await?;
            println!("{}: dropped {}", provider, provider.ledger_table());
        }
    }
    Ok(())
}

async fn books(db: Database, action: BooksAction) -> Result<()> {
    match action {
        BooksAction::List {
            genre,
            query,
            page,
            per_page,
        } => {
            let filter = BookFilter {
                genre,
                query,
                ..Default::default()
            };
            let page = db
                .books()
                .search(
                    &filter,
                    Pagination::new(page, per_page),
                    BookSort::Title,
                    SortDirection::Asc,
                )
                .await?;

            println!("{:<6} {:<40} {:<24} {:<14} {:<6}", "ID", "TITLE", "AUTHOR", "GENRE", "RATING");
            println!("{}", "-".repeat(94));
            for item in &page.items {
                println!(
                    "{:<6} {:<40} {:<24} {:<14} {:<6}",
                    item.book.id,
                    truncate(&item.book.title, 40),
                    truncate(&item.author.name, 24),
                    item.book.genre.as_deref().unwrap_or("-"),
                    item.book
                        .rating
                        .map(|r| format!("{:.1}", r))
                        .unwrap_or_else(|| "-".to_string())
                );
            }
            println!("\nPage {} of {} ({} books)", page.page, page.total_pages.max(1), page.total);
        }
        BooksAction::Stats => {
            let stats = db.books().stats().await?;
            println!("Books: {} ({} rated)", stats.total, stats.rated);
            if let Some(avg) = stats.average_rating {
                println!("Average rating: {:.2}", avg);
            }
            println!("\nBy genre:");
            for (genre, count) in &stats.by_genre {
                println!("  {:<24} {}", genre, count);
            }
        }
        BooksAction::Featured { limit } => {
            let featured = db.books().featured(limit).await?;
            if featured.is_empty() {
                println!("No rated books yet.");
            }
            for (idx, item) in featured.iter().enumerate() {
                println!(
                    "{:>2}. {} by {} ({:.1})",
                    idx + 1,
                    item.book.title,
                    item.author.name,
                    item.book.rating.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

async fn authors(db: Database, action: AuthorsAction) -> Result<()> {
    match action {
        AuthorsAction::Stats => {
            let stats = db.authors().stats().await?;
            println!("Authors: {}", stats.total);
            println!("\nBy nationality:");
            for (nationality, count) in &stats.by_nationality {
                println!("  {:<24} {}", nationality, count);
            }
            println!("\nMost productive:");
            for entry in &stats.most_productive {
                println!("  {:<24} {} books", entry.author.name, entry.book_count);
            }
        }
    }
    Ok(())
}

async fn serve(factory: ClientFactory, provider: Option<Provider>, bind: SocketAddr) -> Result<()> {
    let mut context = DatabaseContext::new(factory);
    if let Some(provider) = provider {
        context = context.with_provider(provider);
    }
    let db = context.database().await?.clone();

    let admin_token = std::env::var("BOOKBASE_ADMIN_TOKEN").ok();
    if admin_token.is_none() {
        info!("BOOKBASE_ADMIN_TOKEN not set, migration routes are disabled");
    }
    let state = Arc::new(AppState::new(db).with_admin_token(admin_token));
    let router = create_router(state);

    info!("Starting Bookbase server on {} ({})", bind, context.provider());
    info!("API available at http://{}/api/v1", bind);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    context.shutdown().await;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
