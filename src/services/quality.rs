use std::{collections::HashSet, sync::Arc};

use tokio::sync::mpsc;

use crate::{db::MediaStore, models::MediaRecord};

/// A record is a hidden gem when `quality > popularity * ELIGIBILITY_RATIO`
pub const ELIGIBILITY_RATIO: f64 = 0.5;
/// Weight of popularity subtracted from quality when ranking gems
pub const POPULARITY_PENALTY: f64 = 0.3;
/// Largest single boost a reporter may contribute
pub const MAX_SINGLE_BOOST: f64 = 2.0;

pub fn is_hidden_gem(media: &MediaRecord) -> bool {
    media.quality_score > media.popularity_score * ELIGIBILITY_RATIO
}

pub fn gem_score(media: &MediaRecord) -> f64 {
    media.quality_score - media.popularity_score * POPULARITY_PENALTY
}

/// Eligible records not in `exclude`, best gem score first (ties by id), at most `limit`
pub fn rank_hidden_gems(
    records: Vec<MediaRecord>,
    exclude: &HashSet<String>,
    limit: usize,
) -> Vec<MediaRecord> {
    let mut gems: Vec<MediaRecord> = records
        .into_iter()
        .filter(|m| is_hidden_gem(m) && !exclude.contains(&m.id))
        .collect();

    gems.sort_by(|a, b| {
        gem_score(b)
            .total_cmp(&gem_score(a))
            .then_with(|| a.id.cmp(&b.id))
    });
    gems.truncate(limit);
    gems
}

/// One-way "quality boost for id X, amount Y" message
#[derive(Debug, Clone, PartialEq)]
pub struct QualityBoost {
    pub media_id: String,
    pub amount: f64,
}

/// Sending half handed to whatever produces quality signals
#[derive(Clone)]
pub struct QualityBoostSender {
    tx: mpsc::UnboundedSender<QualityBoost>,
}

impl QualityBoostSender {
    /// Queues a boost clamped to `[0, MAX_SINGLE_BOOST]`. Never blocks.
    pub fn report(&self, media_id: impl Into<String>, amount: f64) {
        let amount = if amount.is_finite() {
            amount.clamp(0.0, MAX_SINGLE_BOOST)
        } else {
            0.0
        };
        let boost = QualityBoost {
            media_id: media_id.into(),
            amount,
        };

        if self.tx.send(boost).is_err() {
            tracing::warn!("Quality writer is gone, dropping boost");
        }
    }
}

/// Handle for gracefully shutting down the quality writer.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) also stops the writer.
pub struct QualityWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl QualityWriterHandle {
    /// Signals the writer to apply queued boosts and waits for it to stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Quality writer task panicked");
        }
        tracing::info!("Quality writer stopped");
    }
}

/// Spawns the background task that applies boosts to the store
///
/// Must be called inside a tokio runtime.
pub fn spawn_quality_writer(
    store: Arc<dyn MediaStore>,
) -> (QualityBoostSender, QualityWriterHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    let task = tokio::spawn(quality_writer_task(store, rx, shutdown_rx));

    (
        QualityBoostSender { tx },
        QualityWriterHandle { shutdown_tx, task },
    )
}

async fn quality_writer_task(
    store: Arc<dyn MediaStore>,
    mut rx: mpsc::UnboundedReceiver<QualityBoost>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    tracing::info!("Quality writer task started");

    loop {
        tokio::select! {
            maybe_boost = rx.recv() => {
                let Some(boost) = maybe_boost else { break };
                apply(store.as_ref(), boost).await;
            }
            _ = shutdown_rx.recv() => {
                let mut flushed = 0usize;
                while let Ok(boost) = rx.try_recv() {
                    apply(store.as_ref(), boost).await;
                    flushed += 1;
                }
                tracing::info!(flushed, "Quality writer flushed pending boosts");
                break;
            }
        }
    }
}

async fn apply(store: &dyn MediaStore, boost: QualityBoost) {
    if boost.amount == 0.0 {
        return;
    }
    match store.apply_quality_boost(&boost.media_id, boost.amount).await {
        Ok(()) => tracing::debug!(
            media_id = %boost.media_id,
            amount = boost.amount,
            "Applied quality boost"
        ),
        Err(e) => tracing::warn!(
            media_id = %boost.media_id,
            error = %e,
            "Failed to apply quality boost"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::InMemoryStore, models::MediaType};

    fn media(title: &str, quality: f64, popularity: f64) -> MediaRecord {
        MediaRecord::new(title.to_string(), MediaType::Anime, String::new())
            .with_scores(quality, popularity)
    }

    #[test]
    fn test_hidden_gem_eligibility() {
        let a = media("A", 0.9, 0.3);
        let b = media("B", 0.4, 0.5);

        assert!(is_hidden_gem(&a));
        // 0.4 > 0.5 * 0.5, so the threshold rule admits B
        assert!(is_hidden_gem(&b));
        assert!(gem_score(&a) > gem_score(&b));

        // Strict inequality: equal is not eligible
        assert!(!is_hidden_gem(&media("Edge", 0.5, 1.0)));
    }

    #[test]
    fn test_gem_only_includes_disproportionate_quality() {
        let a = media("A", 0.9, 0.3);
        let b = media("B", 0.1, 0.5);
        let gems = rank_hidden_gems(vec![a.clone(), b], &HashSet::new(), 10);
        assert_eq!(gems, vec![a]);
    }

    #[test]
    fn test_rank_orders_by_gem_score_with_id_tiebreak() {
        let records = vec![
            media("Low", 1.0, 0.0),
            media("High", 3.0, 1.0),
            media("Twin-B", 2.0, 0.0),
            media("Twin-A", 2.0, 0.0),
        ];

        let titles: Vec<String> = rank_hidden_gems(records, &HashSet::new(), 10)
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["High", "Twin-A", "Twin-B", "Low"]);
    }

    #[test]
    fn test_exclusion_applies_before_truncation() {
        let records = vec![media("Best", 5.0, 0.0), media("Next", 4.0, 0.0), media("Third", 3.0, 0.0)];
        let exclude: HashSet<String> = ["anime-Best".to_string()].into_iter().collect();

        let titles: Vec<String> = rank_hidden_gems(records, &exclude, 2)
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["Next", "Third"]);
    }

    #[test]
    fn test_rank_is_total_over_extreme_scores() {
        let records = vec![
            media("Huge", f64::MAX, 0.0),
            media("Tiny", f64::MIN_POSITIVE, 0.0),
            media("Infinite", f64::INFINITY, 1.0),
            media("Mid", 1.0, 0.0),
        ];

        let titles: Vec<String> = rank_hidden_gems(records, &HashSet::new(), 10)
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["Infinite", "Huge", "Mid", "Tiny"]);
    }

    #[tokio::test]
    async fn test_boosts_are_clamped_and_flushed_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let record = media("Boosted", 0.0, 0.0);
        store.insert_record(&record).await.unwrap();

        let (sender, handle) = spawn_quality_writer(store.clone());
        sender.report(record.id.clone(), 0.5);
        sender.report(record.id.clone(), 10.0);
        sender.report(record.id.clone(), -3.0);
        sender.report(record.id.clone(), f64::NAN);
        sender.report("anime-Unknown", 1.0);
        handle.shutdown().await;

        let updated = store.fetch_record(&record.id).await.unwrap().unwrap();
        assert!((updated.quality_score - 2.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_report_after_shutdown_does_not_panic() {
        let store = Arc::new(InMemoryStore::new());
        let (sender, handle) = spawn_quality_writer(store);
        handle.shutdown().await;
        sender.report("anime-Late", 1.0);
    }
}
