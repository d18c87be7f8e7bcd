//! `stepwise sessions` and `stepwise history`.

use std::path::Path;

use chrono::{TimeZone, Utc};

use crate::wiring;

pub async fn list(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = wiring::load_config(config)?;
    let service = wiring::service(&config);

    let sessions = service.sessions().await?;
    if sessions.is_empty() {
        eprintln!("no sessions stored");
        return Ok(());
    }
    for session in sessions {
        let updated = Utc
            .timestamp_millis_opt(session.updated_at)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{}  {updated}  {}", session.id, session.name);
    }
    Ok(())
}

pub async fn history(config: Option<&Path>, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = wiring::load_config(config)?;
    let service = wiring::service(&config);

    let history = service
        .history(id)
        .await?
        .ok_or_else(|| format!("no session with id {id}"))?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}
