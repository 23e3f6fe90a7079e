//! Retrying API client.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use tharc_models::{Video, VideoPart};

use crate::error::{ClientError, ClientResult};
use crate::pacing::Pacing;
use crate::signer::{self, WbiKeys};
use crate::types::VideoPage;

/// Configuration for the API client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API host, e.g. `https://api.bilibili.com`
    pub base_url: String,
    /// Uploader space host, used for the season Referer
    pub space_url: String,
    /// Default Referer sent with every request
    pub referer: String,
    /// User-Agent header
    pub user_agent: String,
    /// Session cookie (`SESSDATA=...`), if any
    pub cookie: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Attempts per request
    pub retry_times: u32,
    /// Base retry delay; attempt n waits `retry_delay * n`
    pub retry_delay: Duration,
    /// Pacing draw applied after every attempt
    pub pacing: Pacing,
    /// WBI key cache lifetime
    pub key_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.bilibili.com".to_string(),
            space_url: "https://space.bilibili.com".to_string(),
            referer: "https://www.bilibili.com/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36 Edg/139.0.0.0"
                .to_string(),
            cookie: None,
            timeout: Duration::from_secs(30),
            retry_times: 3,
            retry_delay: Duration::from_secs(5),
            pacing: Pacing::default(),
            key_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("API_BASE_URL").unwrap_or(defaults.base_url),
            space_url: std::env::var("SPACE_BASE_URL").unwrap_or(defaults.space_url),
            referer: defaults.referer,
            user_agent: std::env::var("USER_AGENT").unwrap_or(defaults.user_agent),
            cookie: std::env::var("SESSDATA")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|v| format!("SESSDATA={v}")),
            timeout: defaults.timeout,
            retry_times: env_parse("REQUEST_RETRY_TIMES", defaults.retry_times),
            retry_delay: Duration::from_secs(env_parse(
                "REQUEST_RETRY_DELAY_SECONDS",
                defaults.retry_delay.as_secs(),
            )),
            pacing: Pacing::new(
                Duration::from_millis(env_parse("REQUEST_DELAY_MIN_MS", 1000)),
                Duration::from_millis(env_parse("REQUEST_DELAY_MAX_MS", 3000)),
            ),
            key_ttl: defaults.key_ttl,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

struct CachedKeys {
    keys: WbiKeys,
    fetched_at: Instant,
}

/// API client: one shared HTTP connection pool, a WBI key cache, and a
/// retrying GET primitive the endpoint methods are built on.
pub struct BiliClient {
    http: reqwest::Client,
    config: ClientConfig,
    keys: Mutex<Option<CachedKeys>>,
}

impl BiliClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::REFERER,
            HeaderValue::from_str(&config.referer)
                .map_err(|e| ClientError::Parse(format!("invalid referer: {e}")))?,
        );
        if let Some(cookie) = &config.cookie {
            headers.insert(
                header::COOKIE,
                HeaderValue::from_str(cookie)
                    .map_err(|e| ClientError::Parse(format!("invalid cookie: {e}")))?,
            );
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Network)?;

        Ok(Self {
            http,
            config,
            keys: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the cached WBI keys, refreshing them from the nav endpoint
    /// when missing or older than the configured lifetime. Concurrent first
    /// callers serialize on one refresh.
    async fn wbi_keys(&self) -> ClientResult<WbiKeys> {
        let mut slot = self.keys.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.fetched_at.elapsed() < self.config.key_ttl {
                return Ok(cached.keys.clone());
            }
        }

        let keys = self.discover_keys().await?;
        debug!(img_key = %keys.img_key, sub_key = %keys.sub_key, "refreshed WBI keys");
        *slot = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }

    async fn discover_keys(&self) -> ClientResult<WbiKeys> {
        let url = format!("{}/x/web-interface/nav", self.config.base_url);
        let body: Value = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let key_at = |pointer: &str| -> ClientResult<String> {
            let key_url = body
                .pointer(pointer)
                .and_then(Value::as_str)
                .ok_or_else(|| ClientError::KeyDiscovery(format!("missing {pointer}")))?;
            signer::key_from_url(key_url)
                .map(str::to_string)
                .ok_or_else(|| ClientError::KeyDiscovery(format!("malformed url at {pointer}")))
        };

        Ok(WbiKeys {
            img_key: key_at("/data/wbi_img/img_url")?,
            sub_key: key_at("/data/wbi_img/sub_url")?,
        })
    }

    /// Issues a GET for `path` with `params`, retrying transient failures up
    /// to the configured attempt count and handing the decoded body to `extract`.
    ///
    /// HTTP 412, transport errors, non-zero envelopes and extractor failures
    /// all retry with linear backoff (`retry_delay * attempt`). A pacing
    /// delay is slept after every attempt, success included.
    pub async fn request<T, F>(
        &self,
        path: &str,
        params: Vec<(&str, String)>,
        signed: bool,
        extract: F,
    ) -> ClientResult<T>
    where
        F: Fn(&Value) -> ClientResult<T>,
    {
        let query: Vec<(String, String)> = if signed {
            let keys = self.wbi_keys().await?;
            let map: BTreeMap<String, String> = params
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            signer::sign(map, &keys, chrono::Utc::now().timestamp())
        } else {
            params
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect()
        };

        let url = format!("{}{}", self.config.base_url, path);
        let times = self.config.retry_times.max(1);
        let mut last_err = None;

        for attempt in 1..=times {
            match self.attempt(&url, &query, &extract).await {
                Ok(value) => {
                    tokio::time::sleep(self.config.pacing.draw()).await;
                    return Ok(value);
                }
                Err(err) => {
                    if attempt < times && err.is_retryable() {
                        let wait = self.config.retry_delay * attempt;
                        match &err {
                            ClientError::Throttled => {
                                warn!(attempt, wait_secs = wait.as_secs(), "throttled, backing off")
                            }
                            other => warn!(
                                attempt,
                                wait_secs = wait.as_secs(),
                                error = %other,
                                "request failed, retrying"
                            ),
                        }
                        tokio::time::sleep(wait).await;
                        last_err = Some(err);
                    } else {
                        last_err = Some(err);
                        tokio::time::sleep(self.config.pacing.draw()).await;
                        break;
                    }
                }
            }
            tokio::time::sleep(self.config.pacing.draw()).await;
        }

        Err(last_err.expect("at least one attempt was made"))
    }

    async fn attempt<T, F>(&self, url: &str, query: &[(String, String)], extract: &F) -> ClientResult<T>
    where
        F: Fn(&Value) -> ClientResult<T>,
    {
        let response = self.http.get(url).query(&query).send().await?;

        if response.status() == StatusCode::PRECONDITION_FAILED {
            return Err(ClientError::Throttled);
        }
        let response = response.error_for_status()?;

        let body: Value = response.json().await?;
        let code = body
            .get("code")
            .and_then(Value::as_i64)
            .ok_or_else(|| ClientError::Parse("missing envelope code".to_string()))?;
        if code != 0 {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(ClientError::Api { code, message });
        }

        extract(&body)
    }

    /// One signed page of an uploader's catalog listing.
    pub async fn fetch_video_page(
        &self,
        mid: i64,
        page: u32,
        page_size: u32,
    ) -> ClientResult<VideoPage> {
        self.request(
            "/x/space/wbi/arc/search",
            vec![
                ("mid", mid.to_string()),
                ("pn", page.to_string()),
                ("ps", page_size.to_string()),
            ],
            true,
            move |body| {
                let vlist = body
                    .pointer("/data/list/vlist")
                    .and_then(Value::as_array)
                    .ok_or_else(|| ClientError::Parse("missing data.list.vlist".to_string()))?;
                let total = body
                    .pointer("/data/page/count")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ClientError::Parse("missing data.page.count".to_string()))?;

                let mut videos = Vec::with_capacity(vlist.len());
                for entry in vlist {
                    if entry.is_null() {
                        continue;
                    }
                    match serde_json::from_value::<Video>(entry.clone()) {
                        Ok(video) => videos.push(video),
                        Err(err) => {
                            let bvid = entry
                                .get("bvid")
                                .and_then(Value::as_str)
                                .unwrap_or("<unknown>");
                            warn!(bvid, "skipping unparseable listing entry: {err}");
                        }
                    }
                }

                Ok(VideoPage { page, total, videos })
            },
        )
        .await
    }

    /// Enumerates every video of one season.
    ///
    /// The endpoint is paginated on its own and wants a Referer pointing at
    /// the uploader's season list. Errors are not propagated: whatever has
    /// been collected so far is returned.
    pub async fn fetch_season_videos(&self, mid: i64, season_id: i64) -> Vec<Video> {
        const PAGE_SIZE: u32 = 50;

        info!(mid, season_id, "expanding season");
        let url = format!(
            "{}/x/polymer/web-space/seasons_archives_list",
            self.config.base_url
        );
        let referer = format!(
            "{}/{}/lists/{}?type=season",
            self.config.space_url, mid, season_id
        );

        let mut collected: Vec<Video> = Vec::new();
        let mut page_num = 1u32;

        loop {
            match self
                .season_page(&url, &referer, mid, season_id, page_num, PAGE_SIZE)
                .await
            {
                Ok((videos, total)) => {
                    if videos.is_empty() {
                        break;
                    }
                    collected.extend(videos);
                    if collected.len() as u64 >= total {
                        break;
                    }
                    page_num += 1;
                    tokio::time::sleep(self.config.pacing.draw()).await;
                }
                Err(err) => {
                    error!(mid, season_id, page_num, "season page failed: {err}");
                    break;
                }
            }
        }

        info!(season_id, count = collected.len(), "season expanded");
        collected
    }

    async fn season_page(
        &self,
        url: &str,
        referer: &str,
        mid: i64,
        season_id: i64,
        page_num: u32,
        page_size: u32,
    ) -> ClientResult<(Vec<Video>, u64)> {
        let response = self
            .http
            .get(url)
            .header(header::REFERER, referer)
            .query(&[
                ("mid", mid.to_string()),
                ("season_id", season_id.to_string()),
                ("page_num", page_num.to_string()),
                ("page_size", page_size.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let code = body
            .get("code")
            .and_then(Value::as_i64)
            .ok_or_else(|| ClientError::Parse("missing envelope code".to_string()))?;
        if code != 0 {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(ClientError::Api { code, message });
        }

        let archives = body
            .pointer("/data/archives")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let total = body
            .pointer("/data/meta/total")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let mut videos = Vec::with_capacity(archives.len());
        for mut entry in archives {
            // Season archives omit the uploader and season ids.
            if let Some(fields) = entry.as_object_mut() {
                fields.insert("mid".to_string(), Value::from(mid));
                fields.insert("season_id".to_string(), Value::from(season_id));
            }
            match serde_json::from_value::<Video>(entry.clone()) {
                Ok(video) => videos.push(video),
                Err(err) => {
                    let bvid = entry
                        .get("bvid")
                        .and_then(Value::as_str)
                        .unwrap_or("<unknown>");
                    warn!(bvid, season_id, "skipping unparseable season entry: {err}");
                }
            }
        }

        Ok((videos, total))
    }

    /// Parts of one video, server order.
    pub async fn fetch_parts(&self, bvid: &str) -> ClientResult<Vec<VideoPart>> {
        self.request(
            "/x/player/pagelist",
            vec![("bvid", bvid.to_string())],
            false,
            |body| {
                let items = body
                    .get("data")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                items
                    .into_iter()
                    .map(|item| serde_json::from_value::<VideoPart>(item).map_err(ClientError::Json))
                    .collect()
            },
        )
        .await
    }

    /// Tag names of one video, server order.
    pub async fn fetch_tags(&self, bvid: &str) -> ClientResult<Vec<String>> {
        self.request(
            "/x/web-interface/view/detail/tag",
            vec![("bvid", bvid.to_string())],
            false,
            |body| {
                let items = body
                    .get("data")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                items
                    .into_iter()
                    .map(|item| {
                        item.get("tag_name")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .ok_or_else(|| ClientError::Parse("tag entry without tag_name".to_string()))
                    })
                    .collect()
            },
        )
        .await
    }
}
