use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use busstop_client::{
    models::{
        photo::UploadFile,
        report::{ReportFilter, ReportFormat},
        stop::{BusStop, ChangeLogEntry, Condition, StopStatus},
        user::User,
    },
    services::{ReportService, StopService},
    store::FilterPatch,
    ApiClient, Config, Store,
};

#[derive(Parser)]
#[command(name = "busstop", about = "Command-line client for the bus-stop inventory")]
struct Args {
    /// Backend base URL (overrides BUSSTOP_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Login email (overrides BUSSTOP_EMAIL)
    #[arg(long)]
    email: Option<String>,

    /// Login password (overrides BUSSTOP_PASSWORD)
    #[arg(long)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List stops as CSV, filtered client-side
    Stops {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        district: Option<String>,
        #[arg(long)]
        status: Option<StopStatus>,
        #[arg(long)]
        condition: Option<Condition>,
    },
    /// Show one stop by id or code
    Stop { key: String },
    /// Change history of a stop as CSV
    History { key: String },
    /// Inventory counters
    Stats,
    /// Dashboard aggregates
    Dashboard,
    /// List user accounts (admin)
    Users,
    /// Delete a stop
    Delete { key: String },
    /// Mark a photo as the main photo of its stop
    SetMainPhoto { key: String, photo_id: i64 },
    /// Upload a photo for a stop
    UploadPhoto {
        key: String,
        path: PathBuf,
        #[arg(long)]
        main: bool,
    },
    /// Download the inventory report
    Export {
        #[arg(long, default_value = "xlsx")]
        format: ReportFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(api_url) = args.api_url {
        config.api_url = api_url;
    }
    let email = args
        .email
        .or_else(|| config.email.clone())
        .context("--email or BUSSTOP_EMAIL is required")?;
    let password = args
        .password
        .or_else(|| config.password.clone())
        .context("--password or BUSSTOP_PASSWORD is required")?;

    let client = ApiClient::new(&config)?;
    let store = Store::new(client);
    let watcher = store.spawn_session_watcher();

    info!("connecting to {}", config.api_url);
    if !store.login(&email, &password).await {
        let message = store.snapshot().error.unwrap_or_default();
        bail!("login failed: {message}");
    }

    let result = run(&store, args.command).await;

    store.logout().await;
    watcher.abort();
    result
}

async fn run(store: &Store, command: Command) -> anyhow::Result<()> {
    let client = store.client();

    match command {
        Command::Stops {
            search,
            district,
            status,
            condition,
        } => {
            store.load_assets().await;
            if let Some(e) = store.snapshot().last_load_error {
                bail!("could not load stops: {e}");
            }
            store.set_filters(FilterPatch {
                search,
                district: Some(district),
                status: Some(status),
                condition: Some(condition),
            });
            write_stops(&store.filtered_assets())?;
        }
        Command::Stop { key } => {
            let stop = StopService::get(client, &key).await?;
            println!("{}", serde_json::to_string_pretty(&stop)?);
        }
        Command::History { key } => {
            let history = StopService::history(client, &key).await?;
            write_history(&history)?;
        }
        Command::Stats => {
            let stats = StopService::stats(client).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Dashboard => {
            let dashboard = ReportService::dashboard(client).await?;
            println!("{}", serde_json::to_string_pretty(&dashboard)?);
        }
        Command::Users => {
            store.load_users().await;
            let state = store.snapshot();
            if let Some(e) = state.last_load_error {
                bail!("could not load users: {e}");
            }
            write_users(&state.users)?;
            info!("{} users in total", state.users_total);
        }
        Command::Delete { key } => {
            if !store.remove_asset(&key).await {
                bail!("{}", store.snapshot().error.unwrap_or_default());
            }
            info!("stop {key} deleted");
        }
        Command::SetMainPhoto { key, photo_id } => {
            if !store.set_main_photo(&key, photo_id).await {
                bail!("{}", store.snapshot().error.unwrap_or_default());
            }
        }
        Command::UploadPhoto { key, path, main } => {
            let file = UploadFile::from_path(&path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?;
            if !store.upload_photo(&key, &file, main).await {
                bail!("{}", store.snapshot().error.unwrap_or_default());
            }
            info!("uploaded {} to {key}", file.filename);
        }
        Command::Export { format, out } => {
            let bytes = ReportService::export(client, format, &ReportFilter::default()).await?;
            let path = out.unwrap_or_else(|| {
                PathBuf::from(ReportService::export_file_name(format, Utc::now().date_naive()))
            });
            tokio::fs::write(&path, &bytes).await?;
            info!("report written to {}", path.display());
        }
    }
    Ok(())
}

fn write_stops(stops: &[BusStop]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(io::stdout());
    wtr.write_record(["id", "stop_id", "address", "district", "status", "condition", "photos"])?;
    for s in stops {
        wtr.write_record([
            s.id.to_string(),
            s.stop_id.clone(),
            s.address.clone(),
            s.district.clone(),
            s.status.to_string(),
            s.condition.to_string(),
            s.photos.len().to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_history(entries: &[ChangeLogEntry]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(io::stdout());
    wtr.write_record(["changed_at", "user", "field", "old", "new"])?;
    for e in entries {
        wtr.write_record([
            e.changed_at.to_string(),
            e.user_name.clone(),
            e.field_name.clone(),
            e.old_value.clone().unwrap_or_default(),
            e.new_value.clone().unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_users(users: &[User]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(io::stdout());
    wtr.write_record(["id", "email", "name", "role", "active"])?;
    for u in users {
        wtr.write_record([
            u.id.to_string(),
            u.email.clone(),
            u.name.clone(),
            u.role.to_string(),
            u.is_active.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
