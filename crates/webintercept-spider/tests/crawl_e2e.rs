//! End-to-end crawl runs against a local fixture site

use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use webintercept_core::model::{CrawlSession, CrawlUrlStatus, EngineStatus, Page};
use webintercept_core::{EventBus, MemoryRepository, Repository};
use webintercept_spider::SpiderManager;

async fn spawn_site(app: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    port
}

fn fixture_site() -> Router {
    Router::new()
        .route(
            "/",
            get(|| async {
                Html(
                    "<html><head><title>Home</title></head><body>\
                     <a href=\"/a\">a</a> <a href=\"/b\">b</a>\
                     <a href=\"/a\">a again</a></body></html>",
                )
            }),
        )
        .route(
            "/a",
            get(|| async { Html("<html><body><a href=\"/a/1\">deep</a></body></html>") }),
        )
        .route("/b", get(|| async { Html("<html><body>leaf</body></html>") }))
        .route("/a/1", get(|| async { Html("<html><body>too deep</body></html>") }))
}

async fn wait_for_status(
    repo: &MemoryRepository,
    session_id: uuid::Uuid,
    status: EngineStatus,
) -> CrawlSession {
    for _ in 0..200 {
        let session = repo.get_crawl_session(session_id).await.expect("session");
        if session.status == status {
            return session;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("crawl never reached {status:?}");
}

#[tokio::test]
async fn depth_bound_limits_crawl_and_frontier_dedups() {
    let port = spawn_site(fixture_site()).await;
    let repo = Arc::new(MemoryRepository::new());
    let events = EventBus::default();
    let mut event_rx = events.subscribe();

    let mut session = CrawlSession::new(
        "depth bound",
        vec![format!("http://127.0.0.1:{port}/")],
    );
    session.max_depth = 1;
    session.max_pages = 100;
    session.threads = 2;
    session.delay_ms = 0;
    session.respect_robots_txt = false;
    let session_id = session.id;
    repo.put_crawl_session(session).await.expect("store");

    let manager = SpiderManager::new(repo.clone(), events);
    manager.start(session_id).await.expect("start");

    let finished = wait_for_status(&repo, session_id, EngineStatus::Completed).await;
    assert_eq!(finished.pages_crawled, 3);

    let urls = repo
        .list_crawl_urls(session_id, None, Page::new(100, 0))
        .await
        .expect("urls");

    // `/` links `/a` twice; the frontier holds it once.
    let crawled: Vec<&str> = urls
        .iter()
        .filter(|u| u.status == CrawlUrlStatus::Crawled)
        .map(|u| u.url.as_str())
        .collect();
    assert_eq!(crawled.len(), 3);
    for path in ["/", "/a", "/b"] {
        assert!(
            crawled.iter().any(|u| u.ends_with(path)),
            "missing crawled {path}"
        );
    }
    // `/a/1` sits one past max_depth and was never enqueued or fetched.
    assert!(!urls.iter().any(|u| u.url.ends_with("/a/1")));

    // Dedup invariant: no URL appears twice for the session.
    let mut all: Vec<&str> = urls.iter().map(|u| u.url.as_str()).collect();
    all.sort_unstable();
    let before = all.len();
    all.dedup();
    assert_eq!(before, all.len());

    // The root page's extraction was recorded.
    let root = urls.iter().find(|u| u.url.ends_with('/')).expect("root row");
    assert_eq!(root.title.as_deref(), Some("Home"));
    assert_eq!(root.links_found, 3);

    let mut saw_url_event = false;
    while let Ok(event) = event_rx.try_recv() {
        if event.event_type == "spider_url" {
            saw_url_event = true;
        }
    }
    assert!(saw_url_event);
}

#[tokio::test]
async fn exclude_patterns_skip_matching_urls() {
    let port = spawn_site(fixture_site()).await;
    let repo = Arc::new(MemoryRepository::new());

    let mut session = CrawlSession::new(
        "filtered",
        vec![format!("http://127.0.0.1:{port}/")],
    );
    session.max_depth = 2;
    session.respect_robots_txt = false;
    session.exclude_patterns = vec!["/b$".to_string()];
    let session_id = session.id;
    repo.put_crawl_session(session).await.expect("store");

    let manager = SpiderManager::new(repo.clone(), EventBus::default());
    manager.start(session_id).await.expect("start");
    wait_for_status(&repo, session_id, EngineStatus::Completed).await;

    let urls = repo
        .list_crawl_urls(session_id, None, Page::new(100, 0))
        .await
        .expect("urls");
    let b_row = urls.iter().find(|u| u.url.ends_with("/b")).expect("b row");
    assert_eq!(b_row.status, CrawlUrlStatus::Skipped);
    assert_eq!(b_row.error_message.as_deref(), Some("filtered by patterns"));
}

#[tokio::test]
async fn robots_txt_denial_skips_url() {
    let app = Router::new()
        .route(
            "/robots.txt",
            get(|| async { "User-agent: *\nDisallow: /private\n" }),
        )
        .route(
            "/",
            get(|| async { Html("<html><body><a href=\"/private/x\">p</a></body></html>") }),
        )
        .route("/private/x", get(|| async { Html("secret") }));
    let port = spawn_site(app).await;

    let repo = Arc::new(MemoryRepository::new());
    let mut session = CrawlSession::new(
        "robots",
        vec![format!("http://127.0.0.1:{port}/")],
    );
    session.max_depth = 2;
    session.respect_robots_txt = true;
    let session_id = session.id;
    repo.put_crawl_session(session).await.expect("store");

    let manager = SpiderManager::new(repo.clone(), EventBus::default());
    manager.start(session_id).await.expect("start");
    wait_for_status(&repo, session_id, EngineStatus::Completed).await;

    let urls = repo
        .list_crawl_urls(session_id, None, Page::new(100, 0))
        .await
        .expect("urls");
    let private = urls
        .iter()
        .find(|u| u.url.contains("/private/"))
        .expect("private row");
    assert_eq!(private.status, CrawlUrlStatus::Skipped);
    assert_eq!(private.error_message.as_deref(), Some("blocked by robots.txt"));
}

#[tokio::test]
async fn external_links_stay_out_of_scope_by_default() {
    let app = Router::new().route(
        "/",
        get(|| async {
            Html("<html><body><a href=\"http://external.invalid/x\">ext</a></body></html>")
        }),
    );
    let port = spawn_site(app).await;

    let repo = Arc::new(MemoryRepository::new());
    let mut session = CrawlSession::new(
        "scoped",
        vec![format!("http://127.0.0.1:{port}/")],
    );
    session.max_depth = 2;
    session.respect_robots_txt = false;
    let session_id = session.id;
    repo.put_crawl_session(session).await.expect("store");

    let manager = SpiderManager::new(repo.clone(), EventBus::default());
    manager.start(session_id).await.expect("start");
    let finished = wait_for_status(&repo, session_id, EngineStatus::Completed).await;
    assert_eq!(finished.pages_crawled, 1);

    let urls = repo
        .list_crawl_urls(session_id, None, Page::new(100, 0))
        .await
        .expect("urls");
    let external = urls
        .iter()
        .find(|u| u.url.contains("external.invalid"))
        .expect("external row");
    assert_eq!(external.status, CrawlUrlStatus::Skipped);
    assert_eq!(external.error_message.as_deref(), Some("outside crawl scope"));
}

#[tokio::test]
async fn max_pages_stops_the_crawl() {
    let port = spawn_site(fixture_site()).await;
    let repo = Arc::new(MemoryRepository::new());

    let mut session = CrawlSession::new(
        "page budget",
        vec![format!("http://127.0.0.1:{port}/")],
    );
    session.max_depth = 3;
    session.max_pages = 1;
    session.threads = 1;
    session.respect_robots_txt = false;
    let session_id = session.id;
    repo.put_crawl_session(session).await.expect("store");

    let manager = SpiderManager::new(repo.clone(), EventBus::default());
    manager.start(session_id).await.expect("start");
    let finished = wait_for_status(&repo, session_id, EngineStatus::Completed).await;
    assert_eq!(finished.pages_crawled, 1);
}
