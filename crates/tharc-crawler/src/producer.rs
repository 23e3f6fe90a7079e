//! Listing producer.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{error, info};

use tharc_client::{BiliClient, VideoPage};
use tharc_models::Video;

use crate::config::Config;
use crate::delay::SwitchDelay;
use crate::error::{CrawlError, CrawlResult};

/// Drives the paginated listing for one uploader and pushes every discovered
/// video into the queue exactly once, expanding seasons inline.
///
/// Returns cleanly in every case; a page that fails all long-interval
/// attempts aborts this uploader only.
pub(crate) async fn produce_uploader(
    client: &BiliClient,
    config: &Config,
    switch: &SwitchDelay,
    mid: i64,
    queue: mpsc::Sender<Video>,
) {
    let mut seen_seasons: HashSet<i64> = HashSet::new();

    // Page 1 determines the page count; without it there is nothing to do.
    let first_page = match fetch_page_with_retry(client, config, mid, 1).await {
        Ok(page) => page,
        Err(err) => {
            error!(mid, "first listing page failed, aborting uploader: {err}");
            return;
        }
    };

    let total = first_page.total;
    let page_size = u64::from(config.page_size.max(1));
    let total_pages = total.div_ceil(page_size) as u32;
    switch.record_video_count(total);
    info!(mid, total, total_pages, "listing started");

    if !enqueue_page(client, mid, first_page, &mut seen_seasons, &queue).await {
        return;
    }

    for page in 2..=total_pages {
        tokio::time::sleep(config.page_delay).await;
        match fetch_page_with_retry(client, config, mid, page).await {
            Ok(listed) => {
                if !enqueue_page(client, mid, listed, &mut seen_seasons, &queue).await {
                    return;
                }
            }
            Err(err) => {
                error!(mid, page, "aborting uploader: {err}");
                return;
            }
        }
    }

    info!(mid, "all listing pages enqueued");
}

/// Long-interval retry around the page fetch. Each attempt still gets the
/// client's own short-interval retries underneath.
async fn fetch_page_with_retry(
    client: &BiliClient,
    config: &Config,
    mid: i64,
    page: u32,
) -> CrawlResult<VideoPage> {
    let times = config.page_retry_times.max(1);
    for attempt in 1..=times {
        match client.fetch_video_page(mid, page, config.page_size).await {
            Ok(listed) => return Ok(listed),
            Err(err) => {
                error!(mid, page, attempt, times, "listing page fetch failed: {err}");
                if attempt < times {
                    let wait = config.page_retry_delay * attempt;
                    info!(wait_secs = wait.as_secs(), "waiting before the next attempt");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
    Err(CrawlError::PageExhausted { mid, page })
}

/// Enqueues one page's entries in source order. The first sighting of a
/// season enqueues its full enumeration instead of the listing entry; later
/// sightings are duplicates and enqueue nothing.
///
/// Returns `false` when the queue has closed (all workers gone).
async fn enqueue_page(
    client: &BiliClient,
    mid: i64,
    listed: VideoPage,
    seen_seasons: &mut HashSet<i64>,
    queue: &mpsc::Sender<Video>,
) -> bool {
    for video in listed.videos {
        match video.season_id {
            Some(season_id) => {
                if seen_seasons.insert(season_id) {
                    for season_video in client.fetch_season_videos(mid, season_id).await {
                        if queue.send(season_video).await.is_err() {
                            return false;
                        }
                    }
                }
            }
            None => {
                if queue.send(video).await.is_err() {
                    return false;
                }
            }
        }
    }
    true
}
