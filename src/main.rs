use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;
use ulid::Ulid;

use agenda::config::{Config, ConfigError};
use agenda::engine::Engine;
use agenda::notify::NotifyHub;
use agenda::snapshot::Snapshot;
use agenda::store::Stores;

const USAGE: &str = "usage: agenda <employee-id> <YYYY-MM-DD> <service-id>...";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    agenda::observability::init(config.metrics_port)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }
    let employee_id: Ulid = args[0].parse()?;
    let date = NaiveDate::parse_from_str(&args[1], "%Y-%m-%d")?;
    let services = args[2..]
        .iter()
        .map(|s| s.parse::<Ulid>())
        .collect::<Result<Vec<_>, _>>()?;

    let path = config
        .snapshot
        .clone()
        .ok_or_else(|| ConfigError::Missing("AGENDA_SNAPSHOT".into()))?;
    let store = Snapshot::load(&path)?
        .into_store(config.default_service_interval)
        .await?;
    info!("loaded snapshot {}", path.display());
    info!("  appointments: {}", store.appointment_count());
    info!("  blocks: {}", store.block_count());

    let engine = Engine::new(Stores::memory(Arc::new(store)), Arc::new(NotifyHub::new()));
    let starts = engine.bookable_starts(employee_id, &services, date).await?;
    if starts.is_empty() {
        println!("no bookable start times on {date}");
    }
    for start in starts {
        println!("{}", start.format("%H:%M"));
    }
    Ok(())
}
