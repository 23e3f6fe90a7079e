//! Enrichment workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{info, warn};

use tharc_client::BiliClient;
use tharc_models::{classify_tags, filter_tags, Video};
use tharc_store::{save_video, Store};

use crate::error::CrawlResult;

/// State shared by the workers of one uploader.
pub(crate) struct WorkerContext {
    pub client: Arc<BiliClient>,
    pub store: Store,
    /// Bounds concurrent sub-fetches across the pool.
    pub permits: Arc<Semaphore>,
    /// Successfully archived items, for the per-uploader summary.
    pub archived: AtomicUsize,
}

/// One worker: pops videos until the queue closes, enriching and persisting
/// each. Item failures are logged and never kill the worker.
pub(crate) async fn run_worker(ctx: Arc<WorkerContext>, queue: Arc<Mutex<mpsc::Receiver<Video>>>) {
    loop {
        let video = {
            let mut receiver = queue.lock().await;
            receiver.recv().await
        };
        let Some(video) = video else {
            break;
        };

        let bvid = video.bvid.clone();
        match process_video(&ctx, video).await {
            Ok(()) => {
                ctx.archived.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => warn!(bvid = %bvid, "failed to archive video: {err}"),
        }
    }
}

async fn process_video(ctx: &WorkerContext, mut video: Video) -> CrawlResult<()> {
    let (parts, tags) = {
        let _permit = ctx
            .permits
            .acquire()
            .await
            .expect("permit semaphore is never closed");
        tokio::join!(
            ctx.client.fetch_parts(&video.bvid),
            ctx.client.fetch_tags(&video.bvid),
        )
    };

    // A sub-fetch that exhausted its retries degrades to an empty list; the
    // record is still archived.
    video.parts = parts.unwrap_or_else(|err| {
        warn!(bvid = %video.bvid, "parts fetch failed, storing none: {err}");
        Vec::new()
    });
    let tags = tags.unwrap_or_else(|err| {
        warn!(bvid = %video.bvid, "tags fetch failed, storing none: {err}");
        Vec::new()
    });

    video.tags = filter_tags(tags);
    video.status = classify_tags(&video.tags);

    let mut tx = ctx.store.begin().await?;
    save_video(&mut tx, &video).await?;
    tx.commit().await?;

    info!(bvid = %video.bvid, aid = video.aid, status = ?video.status, "archived");
    Ok(())
}
