//! End-to-end attack runs against a local fixture server

use axum::extract::Query;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use webintercept_core::model::{Attack, AttackMode, EngineStatus, Page, Position};
use webintercept_core::{EventBus, MemoryRepository, Repository};
use webintercept_intruder::IntruderManager;

async fn spawn_upstream() -> u16 {
    let app = Router::new().route(
        "/item",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            let a = params.get("a").cloned().unwrap_or_default();
            let b = params.get("b").cloned().unwrap_or_default();
            format!("a={a} b={b}")
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    port
}

fn cluster_bomb_attack(port: u16) -> Attack {
    // Template ...?a=X&b=Y — positions cover the X and Y placeholders.
    let url = format!("http://127.0.0.1:{port}/item?a=X&b=Y");
    let x = url.find("a=X").expect("placeholder") + 2;
    let y = url.find("b=Y").expect("placeholder") + 2;

    let mut attack = Attack::new("cluster", AttackMode::ClusterBomb, "GET", url);
    attack.positions = vec![Position::url(x, x + 1), Position::url(y, y + 1)];
    attack.payload_sets = vec![
        vec!["a".to_string(), "b".to_string()],
        vec!["1".to_string(), "2".to_string(), "3".to_string()],
    ];
    attack.threads = 3;
    attack
}

async fn wait_for_status(
    repo: &MemoryRepository,
    attack_id: uuid::Uuid,
    status: EngineStatus,
) -> Attack {
    for _ in 0..200 {
        let attack = repo.get_attack(attack_id).await.expect("attack");
        if attack.status == status {
            return attack;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("attack never reached {status:?}");
}

#[tokio::test]
async fn cluster_bomb_fires_all_six_combinations() {
    let port = spawn_upstream().await;
    let repo = Arc::new(MemoryRepository::new());
    let events = EventBus::default();
    let mut event_rx = events.subscribe();

    let attack = cluster_bomb_attack(port);
    let attack_id = attack.id;
    repo.put_attack(attack).await.expect("store");

    let manager = IntruderManager::new(repo.clone(), events);
    manager.start(attack_id).await.expect("start");

    let finished = wait_for_status(&repo, attack_id, EngineStatus::Completed).await;
    assert_eq!(finished.total_requests, 6);
    assert_eq!(finished.completed_requests, 6);

    let results = repo
        .list_attack_results(attack_id, Page::new(100, 0))
        .await
        .expect("results");
    assert_eq!(results.len(), 6);

    // Every combination of {a,b} × {1,2,3} fired exactly once, in some order.
    let mut seen: Vec<(String, String)> = results
        .iter()
        .map(|r| (r.payloads[0].clone(), r.payloads[1].clone()))
        .collect();
    seen.sort();
    let expected: Vec<(String, String)> = [
        ("a", "1"), ("a", "2"), ("a", "3"),
        ("b", "1"), ("b", "2"), ("b", "3"),
    ]
    .iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect();
    assert_eq!(seen, expected);

    for result in &results {
        assert_eq!(result.response_status, Some(200));
        let body = String::from_utf8_lossy(result.response_body.as_deref().unwrap_or_default())
            .into_owned();
        assert_eq!(body, format!("a={} b={}", result.payloads[0], result.payloads[1]));
        assert!(result.error.is_none());
    }

    // Progress events were streamed, ending in completed.
    let mut saw_completed = false;
    while let Ok(event) = event_rx.try_recv() {
        if event.event_type == "intruder_progress" && event.data["status"] == "completed" {
            saw_completed = true;
        }
    }
    assert!(saw_completed);
}

#[tokio::test]
async fn request_errors_are_recorded_not_fatal() {
    let repo = Arc::new(MemoryRepository::new());

    // Nothing listens on port 1; every request errors but the attack completes.
    let mut attack = Attack::new(
        "dead upstream",
        AttackMode::Sniper,
        "GET",
        "http://127.0.0.1:1/?q=X".to_string(),
    );
    let x = attack.url_template.find("q=X").expect("placeholder") + 2;
    attack.positions = vec![Position::url(x, x + 1)];
    attack.payload_sets = vec![vec!["1".to_string(), "2".to_string()]];
    attack.timeout_secs = 2;
    let attack_id = attack.id;
    repo.put_attack(attack).await.expect("store");

    let manager = IntruderManager::new(repo.clone(), EventBus::default());
    manager.start(attack_id).await.expect("start");

    let finished = wait_for_status(&repo, attack_id, EngineStatus::Completed).await;
    assert_eq!(finished.completed_requests, 2);

    let results = repo
        .list_attack_results(attack_id, Page::new(10, 0))
        .await
        .expect("results");
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.error.is_some()));
}

#[tokio::test]
async fn start_rejects_invalid_and_running_attacks() {
    let port = spawn_upstream().await;
    let repo = Arc::new(MemoryRepository::new());
    let manager = IntruderManager::new(repo.clone(), EventBus::default());

    // Overlapping positions are rejected before anything runs.
    let mut bad = cluster_bomb_attack(port);
    bad.positions = vec![Position::url(0, 10), Position::url(5, 12)];
    let bad_id = bad.id;
    repo.put_attack(bad).await.expect("store");
    let err = manager.start(bad_id).await.unwrap_err();
    assert!(matches!(err, webintercept_core::Error::InvalidConfig { .. }));
    assert_eq!(
        repo.get_attack(bad_id).await.expect("attack").status,
        EngineStatus::Configured
    );

    // A slow attack cannot be started twice.
    let mut slow = cluster_bomb_attack(port);
    slow.delay_ms = 200;
    slow.threads = 1;
    let slow_id = slow.id;
    repo.put_attack(slow).await.expect("store");
    manager.start(slow_id).await.expect("start");
    let err = manager.start(slow_id).await.unwrap_err();
    assert!(matches!(err, webintercept_core::Error::Conflict { .. }));
    manager.stop(slow_id).await.expect("stop");
}

#[tokio::test]
async fn pause_resume_and_stop_lifecycle() {
    let port = spawn_upstream().await;
    let repo = Arc::new(MemoryRepository::new());
    let manager = IntruderManager::new(repo.clone(), EventBus::default());

    let mut attack = cluster_bomb_attack(port);
    attack.delay_ms = 50;
    attack.threads = 1;
    let attack_id = attack.id;
    repo.put_attack(attack).await.expect("store");

    manager.start(attack_id).await.expect("start");
    manager.pause(attack_id).await.expect("pause");
    assert_eq!(
        repo.get_attack(attack_id).await.expect("attack").status,
        EngineStatus::Paused
    );
    let paused_progress = repo.get_attack(attack_id).await.expect("attack").completed_requests;

    // While paused, no further progress accumulates.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let still = repo.get_attack(attack_id).await.expect("attack").completed_requests;
    assert!(still <= paused_progress + 1, "workers kept firing while paused");

    manager.resume(attack_id).await.expect("resume");
    let finished = wait_for_status(&repo, attack_id, EngineStatus::Completed).await;
    assert_eq!(finished.completed_requests, finished.total_requests);

    // Restarting a completed attack resets its results.
    manager.start(attack_id).await.expect("restart");
    manager.stop(attack_id).await.expect("stop");
    assert_eq!(
        repo.get_attack(attack_id).await.expect("attack").status,
        EngineStatus::Configured
    );
}
