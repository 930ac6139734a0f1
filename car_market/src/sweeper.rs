use std::time::Duration;

use actix_web::web;
use chrono::Utc;
use common::SweepReport;
use tokio::time::sleep;

use crate::state::AppState;

pub async fn sweep_once(data: &AppState) -> anyhow::Result<SweepReport> {
    let report = data.db.sweep(Utc::now().naive_utc()).await?;
    if report == SweepReport::default() {
        log::debug!("Sweep: nothing to do");
    } else {
        log::info!(
            "Sweep: {} booking(s) expired, {} listing(s) expired, {} article(s) published, {} skipped",
            report.bookings_expired,
            report.listings_expired,
            report.articles_published,
            report.conflicts
        );
    }
    Ok(report)
}

/// Runs [`sweep_once`] every `every`. Never returns.
pub async fn start_sweeper(data: web::Data<AppState>, every: Duration) {
    loop {
        if let Err(e) = sweep_once(&data).await {
            log::error!("Sweep failed, retrying next round: {:#}", e);
        }
        sleep(every).await;
    }
}
