//! End-to-end pipeline scenarios against a mock remote and a scratch store.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tharc_client::{BiliClient, ClientConfig, Pacing};
use tharc_crawler::{Config, Crawler, SwitchConfig};
use tharc_models::{TouhouStatus, Video};
use tharc_store::{save_video, Store};

fn fast_config() -> Config {
    Config {
        max_concurrency: 3,
        max_queue_size: 8,
        page_size: 50,
        page_delay: Duration::ZERO,
        page_retry_times: 2,
        page_retry_delay: Duration::ZERO,
        switch: SwitchConfig {
            base_delay: 0.0,
            max_delay: 0.0,
            factor_per_video: 0.0,
            jitter_ratio: 0.0,
        },
        ..Config::default()
    }
}

async fn build(server: &MockServer) -> (Crawler, Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::connect(&dir.path().join("tharc.db")).await.unwrap();
    store.init_schema().await.unwrap();

    let client = BiliClient::new(ClientConfig {
        base_url: server.uri(),
        retry_times: 1,
        retry_delay: Duration::ZERO,
        pacing: Pacing::zero(),
        ..ClientConfig::default()
    })
    .unwrap();

    (Crawler::new(fast_config(), client, store.clone()), store, dir)
}

async fn run(crawler: &Crawler) {
    tokio::time::timeout(Duration::from_secs(30), crawler.run())
        .await
        .expect("pipeline run timed out")
        .expect("pipeline run failed");
}

async fn mount_nav(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/x/web-interface/nav"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {
                "wbi_img": {
                    "img_url": "https://i0.hdslb.com/bfs/wbi/7cd084941338484aae1ad9425b84077c.png",
                    "sub_url": "https://i0.hdslb.com/bfs/wbi/4932caff0ff746eab6f01bf08b70ac45.png"
                }
            }
        })))
        .mount(server)
        .await;
}

fn listing_video(aid: i64, mid: i64) -> Value {
    json!({
        "aid": aid,
        "bvid": format!("BV{aid}"),
        "mid": mid,
        "title": format!("video {aid}"),
        "description": "",
        "pic": "http://example.com/cover.jpg",
        "created": 1_600_000_000 + aid,
        "season_id": 0
    })
}

async fn mount_listing(server: &MockServer, mid: i64, pn: u32, count: u64, entries: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/x/space/wbi/arc/search"))
        .and(query_param("mid", mid.to_string()))
        .and(query_param("pn", pn.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "list": { "vlist": entries }, "page": { "count": count } }
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_parts(server: &MockServer, bvid: &str, parts: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/x/player/pagelist"))
        .and(query_param("bvid", bvid))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": parts })),
        )
        .mount(server)
        .await;
}

async fn mount_no_parts(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/x/player/pagelist"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": [] })),
        )
        .mount(server)
        .await;
}

async fn mount_tags(server: &MockServer, tags: &[&str]) {
    let data: Vec<Value> = tags.iter().map(|t| json!({ "tag_name": t })).collect();
    Mock::given(method("GET"))
        .and(path("/x/web-interface/view/detail/tag"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": data })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn happy_small_uploader() {
    let server = MockServer::start().await;
    mount_nav(&server).await;

    let mid = 66508;
    let entries: Vec<Value> = (1..=3).map(|aid| listing_video(aid, mid)).collect();
    mount_listing(&server, mid, 1, 3, entries).await;

    for aid in 1..=3i64 {
        mount_parts(
            &server,
            &format!("BV{aid}"),
            vec![
                json!({ "cid": aid * 10 + 1, "page": 1, "part": "P1", "duration": 100, "ctime": 1 }),
                json!({ "cid": aid * 10 + 2, "page": 2, "part": "P2", "duration": 200, "ctime": 2 }),
            ],
        )
        .await;
    }
    mount_tags(
        &server,
        &["音乐", "Touhou", "钢琴", "$发现《Bad Apple!!》^", "自制"],
    )
    .await;

    let (crawler, store, _dir) = build(&server).await;
    store.add_uploader(mid).await.unwrap();
    run(&crawler).await;

    let videos = store.list_videos(mid).await.unwrap();
    assert_eq!(videos.len(), 3);

    let mut part_rows = 0;
    for video in &videos {
        assert_eq!(video.status, TouhouStatus::AutoMatch);
        assert_eq!(video.tags, vec!["音乐", "Touhou", "钢琴", "自制"]);
        assert_eq!(video.parts.len(), 2);
        part_rows += video.parts.len();
    }
    assert_eq!(part_rows, 6);
}

#[tokio::test]
async fn multi_page_pagination() {
    let server = MockServer::start().await;
    mount_nav(&server).await;

    let mid = 42;
    let page = |range: std::ops::RangeInclusive<i64>| -> Vec<Value> {
        range.map(|aid| listing_video(aid, mid)).collect()
    };
    mount_listing(&server, mid, 1, 127, page(1..=50)).await;
    mount_listing(&server, mid, 2, 127, page(51..=100)).await;
    mount_listing(&server, mid, 3, 127, page(101..=127)).await;
    mount_no_parts(&server).await;
    mount_tags(&server, &["音乐"]).await;

    let (crawler, store, _dir) = build(&server).await;
    store.add_uploader(mid).await.unwrap();
    run(&crawler).await;

    let videos = store.list_videos(mid).await.unwrap();
    assert_eq!(videos.len(), 127);
    assert!(videos
        .iter()
        .all(|v| v.status == TouhouStatus::AutoNoMatch));
}

#[tokio::test]
async fn season_entries_expand_once() {
    let server = MockServer::start().await;
    mount_nav(&server).await;

    let mid = 42;
    let mut entries: Vec<Value> = Vec::new();
    for aid in 1..=50i64 {
        let mut entry = listing_video(aid, mid);
        if (5..=7).contains(&aid) {
            entry["season_id"] = json!(77);
        }
        entries.push(entry);
    }
    mount_listing(&server, mid, 1, 50, entries).await;

    let archives: Vec<Value> = (1000..1012)
        .map(|aid| {
            json!({
                "aid": aid,
                "bvid": format!("BV{aid}"),
                "title": format!("archive {aid}"),
                "pic": "http://example.com/cover.jpg",
                "pubdate": 1_600_000_000 + aid
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/x/polymer/web-space/seasons_archives_list"))
        .and(query_param("season_id", "77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "archives": archives, "meta": { "total": 12 } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    mount_no_parts(&server).await;
    mount_tags(&server, &["东方"]).await;

    let (crawler, store, _dir) = build(&server).await;
    store.add_uploader(mid).await.unwrap();
    run(&crawler).await;

    let videos = store.list_videos(mid).await.unwrap();
    assert_eq!(videos.len(), 47 + 12);

    let from_season: Vec<_> = videos
        .iter()
        .filter(|v| v.season_id == Some(77))
        .collect();
    assert_eq!(from_season.len(), 12);
    assert!(from_season.iter().all(|v| v.mid == mid));
    // The three listing entries that pointed into the season are not
    // archived twice.
    assert!(store.get_video(5).await.unwrap().is_none());
}

#[tokio::test]
async fn exhausted_page_aborts_only_that_uploader() {
    let server = MockServer::start().await;
    mount_nav(&server).await;

    // Uploader 1: page 1 lists two videos but page 2 always fails.
    mount_listing(&server, 1, 1, 60, vec![listing_video(1, 1), listing_video(2, 1)]).await;
    Mock::given(method("GET"))
        .and(path("/x/space/wbi/arc/search"))
        .and(query_param("mid", "1"))
        .and(query_param("pn", "2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2) // two long-interval attempts, one client attempt each
        .mount(&server)
        .await;

    // Uploader 2 is fine.
    mount_listing(&server, 2, 1, 1, vec![listing_video(50, 2)]).await;

    mount_no_parts(&server).await;
    mount_tags(&server, &["东方"]).await;

    let (crawler, store, _dir) = build(&server).await;
    store.add_uploader(1).await.unwrap();
    store.add_uploader(2).await.unwrap();
    run(&crawler).await;

    // Page-1 rows of the aborted uploader survive, and the run reached the
    // second uploader.
    assert_eq!(store.list_videos(1).await.unwrap().len(), 2);
    assert_eq!(store.list_videos(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn confirmed_status_is_never_downgraded() {
    let server = MockServer::start().await;
    mount_nav(&server).await;

    let mid = 66508;
    let (crawler, store, _dir) = build(&server).await;
    store.add_uploader(mid).await.unwrap();

    // Pre-existing manual verdict.
    let seeded = Video {
        aid: 1,
        bvid: "BV1".to_string(),
        mid,
        title: "old title".to_string(),
        description: None,
        pic: "p".to_string(),
        created: 1,
        season_id: None,
        tags: Vec::new(),
        parts: Vec::new(),
        status: TouhouStatus::ConfirmedNoMatch,
    };
    let mut tx = store.begin().await.unwrap();
    save_video(&mut tx, &seeded).await.unwrap();
    tx.commit().await.unwrap();

    mount_listing(&server, mid, 1, 1, vec![listing_video(1, mid)]).await;
    mount_no_parts(&server).await;
    mount_tags(&server, &["Touhou"]).await;

    run(&crawler).await;

    let stored = store.get_video(1).await.unwrap().unwrap();
    assert_eq!(stored.status, TouhouStatus::ConfirmedNoMatch);
    // The rest of the record still refreshed.
    assert_eq!(stored.title, "video 1");
    assert_eq!(stored.tags, vec!["Touhou"]);
}

#[tokio::test]
async fn empty_catalog_finishes_quietly() {
    let server = MockServer::start().await;
    mount_nav(&server).await;

    let mid = 9;
    mount_listing(&server, mid, 1, 0, Vec::new()).await;

    let (crawler, store, _dir) = build(&server).await;
    store.add_uploader(mid).await.unwrap();
    run(&crawler).await;

    assert!(store.list_videos(mid).await.unwrap().is_empty());
}

#[tokio::test]
async fn part_fetch_failure_archives_with_no_parts() {
    let server = MockServer::start().await;
    mount_nav(&server).await;

    let mid = 66508;
    mount_listing(&server, mid, 1, 1, vec![listing_video(1, mid)]).await;
    Mock::given(method("GET"))
        .and(path("/x/player/pagelist"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_tags(&server, &["东方"]).await;

    let (crawler, store, _dir) = build(&server).await;
    store.add_uploader(mid).await.unwrap();
    run(&crawler).await;

    let stored = store.get_video(1).await.unwrap().unwrap();
    assert!(stored.parts.is_empty());
    assert_eq!(stored.status, TouhouStatus::AutoMatch);
}

#[tokio::test]
async fn listing_duplicate_of_season_video_is_archived_once() {
    let server = MockServer::start().await;
    mount_nav(&server).await;

    let mid = 42;
    // aid 7 appears on the listing page tagged with its season, and the
    // season enumeration returns it too.
    let mut entry = listing_video(7, mid);
    entry["season_id"] = json!(88);
    mount_listing(&server, mid, 1, 2, vec![listing_video(1, mid), entry]).await;

    Mock::given(method("GET"))
        .and(path("/x/polymer/web-space/seasons_archives_list"))
        .and(query_param("season_id", "88"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {
                "archives": [{
                    "aid": 7,
                    "bvid": "BV7",
                    "title": "video 7",
                    "pic": "p",
                    "pubdate": 1_600_000_007
                }],
                "meta": { "total": 1 }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    mount_no_parts(&server).await;
    mount_tags(&server, &["东方"]).await;

    let (crawler, store, _dir) = build(&server).await;
    store.add_uploader(mid).await.unwrap();
    run(&crawler).await;

    let videos = store.list_videos(mid).await.unwrap();
    assert_eq!(videos.len(), 2);
    let archived = store.get_video(7).await.unwrap().unwrap();
    assert_eq!(archived.season_id, Some(88));
}
