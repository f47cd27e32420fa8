use anyhow::{Context, Result};
use book_config::Config;
use book_error::AppError;
use book_pipeline::admission::BookAdmission;
use book_pipeline::kafka::KafkaPublisher;
use book_pipeline::logging::init_tracing;
use book_pipeline::storage::{PgBookStore, PgCoverStore};
use book_pipeline::Book;
use book_types::{
    BookFilter, BookListQuery, BookSearch, BookSort, SortDirection, SortField, TextField, YearRange,
};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Admit books through the Fibonacci gate and inspect the staging queue
#[derive(Parser, Debug)]
#[command(name = "book-admit", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read one JSON book per line from stdin and admit each in order
    Admit,
    /// Print ready books as JSON
    List(ListArgs),
    /// Print the staging queue as JSON
    Queue,
    /// Clear the staging queue
    Reset,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Case-insensitive substring of the title
    #[arg(long, conflicts_with = "author_contains")]
    title_contains: Option<String>,
    /// Case-insensitive substring of the author
    #[arg(long)]
    author_contains: Option<String>,
    /// Only these authors (repeatable)
    #[arg(long = "author")]
    authors: Vec<String>,
    /// Only these years (repeatable)
    #[arg(long = "year")]
    years: Vec<i32>,
    #[arg(long)]
    year_from: Option<i32>,
    #[arg(long)]
    year_to: Option<i32>,
    /// title, author, year or created_at
    #[arg(long)]
    sort: Option<SortField>,
    #[arg(long, requires = "sort")]
    desc: bool,
    /// 1-based; paging is off unless both page and per-page are set
    #[arg(long, default_value_t = 0)]
    page: u32,
    #[arg(long, default_value_t = 0)]
    per_page: u32,
}

impl ListArgs {
    fn into_query(self) -> BookListQuery {
        let search = match (self.title_contains, self.author_contains) {
            (Some(value), _) => Some(BookSearch {
                field: TextField::Title,
                value,
            }),
            (None, Some(value)) => Some(BookSearch {
                field: TextField::Author,
                value,
            }),
            (None, None) => None,
        };

        let year_range = (self.year_from.is_some() || self.year_to.is_some()).then_some(YearRange {
            from: self.year_from,
            to: self.year_to,
        });

        BookListQuery {
            search,
            filters: vec![BookFilter::Author(self.authors), BookFilter::Year(self.years)],
            year_range,
            sort: self.sort.map(|field| BookSort {
                field,
                direction: if self.desc {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                },
            }),
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.logging)?;

    info!("Connecting to PostgreSQL at: {}", config.database_url_safe());
    let pool = book_db::create_pool(&config.database_url, &config.db).await?;
    book_db::run_migrations(&pool).await?;

    let publisher = Arc::new(KafkaPublisher::new(&config.kafka, &config.worker)?);
    let admission = BookAdmission::new(
        publisher.clone(),
        config.kafka.topic.clone(),
        Arc::new(PgBookStore::ready(pool.clone())),
        Arc::new(PgBookStore::staging(pool.clone())),
        Arc::new(PgCoverStore::new(pool.clone())),
    );

    let outcome = match cli.command {
        Command::Admit => admit_from_stdin(&admission).await,
        Command::List(args) => print_books(&admission, &args.into_query()).await,
        Command::Queue => print_queue(&admission).await,
        Command::Reset => admission
            .reset()
            .await
            .context("Failed to reset book queue"),
    };

    publisher.close(config.worker.flush_timeout).await?;
    pool.close().await;
    outcome
}

async fn admit_from_stdin(admission: &BookAdmission) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match serde_json::from_str::<Book>(&line) {
            Ok(book) => admission.create(book).await,
            Err(e) => Err(AppError::from(e)),
        };

        match outcome {
            Ok(result) => println!("{}", serde_json::to_string(&result)?),
            Err(e) => {
                e.log();
                println!(
                    "{}",
                    serde_json::json!({ "line": line_number, "error": e.error_code(), "message": e.user_message() })
                );
            }
        }
    }

    let status = admission.status();
    info!(
        counter = status.counter,
        pending_count = status.pending_count,
        next_fibonacci = status.next_fibonacci,
        "Admission finished"
    );
    Ok(())
}

async fn print_queue(admission: &BookAdmission) -> Result<()> {
    let queue = admission
        .pending_queue()
        .await
        .context("Failed to read book queue")?;
    println!("{}", serde_json::to_string_pretty(&queue)?);
    Ok(())
}

async fn print_books(admission: &BookAdmission, query: &BookListQuery) -> Result<()> {
    let books = admission
        .ready_books(query)
        .await
        .context("Failed to list books")?;
    println!("{}", serde_json::to_string_pretty(&books)?);
    Ok(())
}
