use camino::Utf8PathBuf;
use clap::Parser;
use owo_colors::OwoColorize;
use remold::{
    AttributeSpec, ColumnType, MigrationStore, ModelDef, ModelOutcome, ModelRegistry, PgDatabase,
    Reconciled, Reconciler, render,
};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// Example model declarations for testing against a scratch database.
fn demo_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register(ModelDef::new(
        "User",
        "users",
        vec![
            AttributeSpec::new("id", ColumnType::Integer)
                .primary_key()
                .auto_increment(),
            AttributeSpec::new("username", ColumnType::VarChar(255))
                .not_null()
                .unique(),
            AttributeSpec::new("email", ColumnType::VarChar(255))
                .not_null()
                .unique(),
            AttributeSpec::new("password", ColumnType::VarChar(255)).not_null(),
            AttributeSpec::new("roles", ColumnType::VarChar(255))
                .not_null()
                .default_value("'user'"),
            AttributeSpec::new("refresh_token", ColumnType::VarChar(255)),
            AttributeSpec::new("is_active", ColumnType::Boolean).default_value("true"),
        ],
    ));
    registry
}

/// Reconcile declared models against a live Postgres schema.
#[derive(Parser, Debug)]
#[command(name = "remold", version)]
struct Cli {
    /// Model to reconcile; every registered model when omitted
    model: Option<String>,

    /// Postgres connection URL (falls back to DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Directory for rendered migration artifacts
    #[arg(long, default_value = "migrations")]
    migrations_dir: Utf8PathBuf,

    /// Print the generated migrations without persisting or applying them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let url = match cli.database_url.or_else(|| std::env::var("DATABASE_URL").ok()) {
        Some(url) => url,
        None => return Err("no database URL (pass --database-url or set DATABASE_URL)".into()),
    };

    let db = PgDatabase::connect(&url).await?;
    let store = MigrationStore::new(cli.migrations_dir);
    let mut reconciler = Reconciler::new(db, store, demo_registry());

    if cli.dry_run {
        return dry_run(&mut reconciler, cli.model.as_deref()).await;
    }

    if let Some(model) = cli.model.as_deref() {
        match reconciler.run(model).await? {
            ModelOutcome::Unchanged => {
                println!("{model}: {}", "no changes".dimmed());
            }
            ModelOutcome::Applied { migration, path } => {
                println!("{model}: {} {migration} ({path})", "applied".green());
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let summary = reconciler.reconcile_all().await;
    for (model, name) in &summary.applied {
        println!("{model}: {} {name}", "applied".green());
    }
    for model in &summary.unchanged {
        println!("{model}: {}", "no changes".dimmed());
    }
    for (model, err) in &summary.failed {
        eprintln!("{model}: {} {err}", "failed".red().bold());
    }
    println!(
        "{} applied, {} unchanged, {} failed",
        summary.applied.len(),
        summary.unchanged.len(),
        summary.failed.len()
    );

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Generate and print migrations without touching the store or the ledger.
async fn dry_run(
    reconciler: &mut Reconciler<PgDatabase>,
    model: Option<&str>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let names: Vec<String> = match model {
        Some(name) => vec![name.to_string()],
        None => reconciler.registry().iter().map(|m| m.name.clone()).collect(),
    };

    for name in names {
        match reconciler.reconcile(&name).await? {
            Reconciled::NoChange => println!("{name}: {}", "no changes".dimmed()),
            Reconciled::Migration(record) => {
                println!("{name}: {} {}", "would apply".yellow(), record.name);
                println!("{}", render::render_record(&record));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
