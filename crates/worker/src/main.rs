use std::sync::Arc;
use std::time::Duration;

use bisectflow::api::{self, ApiState};
use bisectflow::config::Config;
use bisectflow::db;
use bisectflow::dispatch::{BuildDispatchClient, HttpTransport};
use bisectflow::jobs::cancel::CancellationGate;
use bisectflow::jobs::ledger::MemoryRetryLedger;
use bisectflow::jobs::sweep::ReconciliationSweep;
use bisectflow::store::{JobStore, MemoryJobStore, PgJobStore};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = Config::from_env()?;

    info!(
        protocol = ?cfg.protocol,
        sweep_interval_secs = cfg.sweep_interval_secs,
        staleness_threshold_secs = cfg.staleness_threshold_secs,
        max_retries = cfg.max_retries,
        api = cfg.api_addr.as_deref().unwrap_or("disabled"),
        "bisectflow worker starting"
    );

    let store: Arc<dyn JobStore> = match &cfg.database_url {
        Some(url) => {
            let pool = db::make_pool(url).await?;
            if cfg.migrate_on_startup {
                db::run_migrations(&pool).await?;
            }
            Arc::new(PgJobStore::new(pool))
        }
        None => {
            warn!("no database configured; job records will not survive a restart");
            Arc::new(MemoryJobStore::new())
        }
    };
    let ledger = Arc::new(MemoryRetryLedger::new());
    let transport = Arc::new(HttpTransport::new(Duration::from_secs(
        cfg.dispatch_timeout_secs,
    ))?);
    let dispatch = Arc::new(BuildDispatchClient::new(
        cfg.protocol,
        cfg.endpoints.clone(),
        transport,
    ));
    let sweep = Arc::new(ReconciliationSweep::new(
        store.clone(),
        ledger,
        dispatch.clone(),
        cfg.sweep_config(),
    ));
    let gate = Arc::new(CancellationGate::new(store.clone(), cfg.access_policy()));

    // ---- API task ----
    let app = api::router(ApiState {
        store,
        gate,
        sweep: sweep.clone(),
        dispatch,
    });
    let api_addr = cfg.api_addr.clone();
    let api_handle = tokio::spawn(async move {
        if let Some(addr) = api_addr {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("api listening on http://{addr}");
            axum::serve(listener, app).await?;
        } else {
            std::future::pending::<()>().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    // ---- Reconciliation task ----
    let sweep_interval = Duration::from_secs(cfg.sweep_interval_secs);
    let sweep_handle = tokio::spawn(async move {
        loop {
            match sweep.run().await {
                Ok(report) => info!(
                    examined = report.examined,
                    fresh = report.fresh,
                    redispatched = report.redispatched,
                    failed = report.failed,
                    errored = report.errored,
                    "reconciliation pass finished"
                ),
                Err(err) => warn!(error = %err, "reconciliation pass failed"),
            }
            tokio::time::sleep(sweep_interval).await;
        }
        #[allow(unreachable_code)]
        Ok::<(), anyhow::Error>(())
    });

    tokio::select! {
        res = api_handle => res??,
        res = sweep_handle => res??,
    }

    Ok(())
}
