use super::service::{SweepReport, UmaService};
use chrono::Utc;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Periodically removes expired tickets, RPTs and grants from the active store.
///
/// The background task stops when the sweeper is dropped.
#[derive(Debug)]
pub struct CleanupSweeper {
    shutdown_token: CancellationToken,
}

impl CleanupSweeper {
    pub fn start(service: Arc<UmaService>, period: Duration) -> Self {
        let shutdown_token = CancellationToken::new();
        let task_token = shutdown_token.clone();

        tokio::spawn(async move {
            info!("Starting cleanup sweeper every {:?}", period);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        info!("Cleanup sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = sweep_once(&service).await;
                        debug!("Cleanup pass finished: {:?}", report);
                    }
                }
            }
        });

        Self { shutdown_token }
    }

    pub fn stop(&self) {
        self.shutdown_token.cancel();
    }
}

impl Drop for CleanupSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

pub async fn sweep_once(service: &UmaService) -> SweepReport {
    service.sweep_expired(Utc::now()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScopeSeed, UmaConfig};
    use crate::store::create_store;
    use crate::uma::grants::StoreGrantLookup;

    async fn service() -> Arc<UmaService> {
        let config = UmaConfig::for_test();
        let store = Arc::new(create_store(&config).await.unwrap());
        let grants = Arc::new(StoreGrantLookup::new(store.clone()));
        let service = Arc::new(UmaService::new(&config, store, grants));
        service
            .scopes
            .seed(&[ScopeSeed {
                id: "view".to_string(),
                display_name: None,
                icon_uri: None,
                url: None,
            }])
            .await
            .unwrap();
        service
    }

    async fn issue_expired(service: &UmaService) -> String {
        service
            .tickets
            .issue(
                "r1",
                &["https://as.example.com/scopes/view".to_string()],
                "as",
                "rs",
                chrono::Duration::zero(),
            )
            .await
            .unwrap()
            .ticket
    }

    #[tokio::test]
    async fn test_sweep_once_removes_expired_tickets() {
        let service = service().await;
        let ticket = issue_expired(&service).await;

        let report = sweep_once(&service).await;
        assert_eq!(report.tickets, 2);
        assert!(service.tickets.get_by_ticket(&ticket).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_on_interval() {
        let service = service().await;
        let ticket = issue_expired(&service).await;

        let sweeper = CleanupSweeper::start(service.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        // Let the spawned pass complete
        for _ in 0..10 {
            if service.tickets.get_by_ticket(&ticket).await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(service.tickets.get_by_ticket(&ticket).await.is_none());
        drop(sweeper);
    }
}
