//! Per-uploader orchestration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{error, info};

use tharc_client::BiliClient;
use tharc_store::Store;

use crate::config::Config;
use crate::delay::SwitchDelay;
use crate::error::CrawlResult;
use crate::producer::produce_uploader;
use crate::worker::{run_worker, WorkerContext};

/// Runs the acquisition pipeline over every scheduled uploader, serially.
pub struct Crawler {
    config: Config,
    client: Arc<BiliClient>,
    store: Store,
    switch: Arc<SwitchDelay>,
}

impl Crawler {
    pub fn new(config: Config, client: BiliClient, store: Store) -> Self {
        let switch = Arc::new(SwitchDelay::new(config.switch.clone()));
        Self {
            config,
            client: Arc::new(client),
            store,
            switch,
        }
    }

    /// One full pass over the scheduled uploaders.
    ///
    /// Individual uploaders may be abandoned along the way; the pass itself
    /// always runs to the end.
    pub async fn run(&self) -> CrawlResult<()> {
        let mids = self.store.list_uploader_ids().await?;
        info!(count = mids.len(), "uploaders scheduled");

        for (index, &mid) in mids.iter().enumerate() {
            self.archive_uploader(mid).await;

            if index + 1 < mids.len() {
                let delay = self.switch.next_delay();
                info!(mid, delay_secs = delay.as_secs_f64(), "switching uploader");
                tokio::time::sleep(delay).await;
            }
        }

        info!("run complete");
        Ok(())
    }

    /// Archives one uploader: producer plus worker pool over a bounded
    /// queue. The producer's sender is the only one, so the queue closes
    /// when it returns and every worker exits exactly once after the drain.
    pub async fn archive_uploader(&self, mid: i64) {
        info!(mid, "archiving uploader");

        let (sender, receiver) = mpsc::channel(self.config.max_queue_size.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let producer = {
            let client = Arc::clone(&self.client);
            let config = self.config.clone();
            let switch = Arc::clone(&self.switch);
            tokio::spawn(async move {
                produce_uploader(&client, &config, &switch, mid, sender).await;
            })
        };

        let ctx = Arc::new(WorkerContext {
            client: Arc::clone(&self.client),
            store: self.store.clone(),
            permits: Arc::new(Semaphore::new(self.config.max_concurrency.max(1))),
            archived: AtomicUsize::new(0),
        });
        let workers: Vec<_> = (0..self.config.max_concurrency.max(1))
            .map(|_| tokio::spawn(run_worker(Arc::clone(&ctx), Arc::clone(&receiver))))
            .collect();

        if let Err(err) = producer.await {
            error!(mid, "producer task failed: {err}");
        }
        for worker in workers {
            if let Err(err) = worker.await {
                error!(mid, "worker task failed: {err}");
            }
        }

        info!(
            mid,
            archived = ctx.archived.load(Ordering::Relaxed),
            "uploader done"
        );
    }
}
