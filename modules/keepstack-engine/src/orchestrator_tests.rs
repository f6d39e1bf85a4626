//! Multi-folder orchestration and service-level tests.

use std::collections::HashMap;
use std::sync::Arc;

use keepstack_common::{CollectedRecord, Mode, Tuning};
use simpage::{Frame, PageScript, RouteScript, SimPage, SimPost};

use crate::cancel::StopToken;
use crate::orchestrator::SavedOrchestrator;
use crate::service::CollectionService;
use crate::sim_adapter::{SimFollowExtractor, SimPageHandle, SimSavedExtractor};
use crate::testing::MockStore;

fn post(id: &str) -> SimPost {
    SimPost {
        id: id.to_string(),
        kind: "p".to_string(),
        ..Default::default()
    }
}

fn grid_route(posts: Vec<SimPost>, links: Vec<&str>) -> RouteScript {
    let visible = posts.len();
    RouteScript {
        frames: vec![Frame {
            content_height: 1000,
            visible,
        }],
        posts,
        profiles: Vec::new(),
        links: links.into_iter().map(String::from).collect(),
        viewport_height: 900,
        overlay: None,
        navigable: true,
    }
}

/// Saved directory with a trips folder, a food folder and the catch-all
/// view. `t1` appears both in trips and in all-posts.
fn folders_script() -> PageScript {
    let mut routes = HashMap::new();
    routes.insert(
        "/me/saved/trips/".to_string(),
        grid_route(
            vec![post("t1"), post("t2")],
            vec!["/me/saved/food/", "/me/saved/all-posts/"],
        ),
    );
    routes.insert(
        "/me/saved/food/".to_string(),
        grid_route(vec![post("f1")], Vec::new()),
    );
    routes.insert(
        "/me/saved/all-posts/".to_string(),
        grid_route(vec![post("t1"), post("f1"), post("a1")], Vec::new()),
    );
    PageScript {
        start_path: "/me/saved/trips/".to_string(),
        routes,
    }
}

fn orchestrator(
    page: Arc<SimPageHandle>,
    store: Arc<MockStore>,
) -> SavedOrchestrator {
    SavedOrchestrator::new(
        Tuning::for_mode(Mode::Saved).instant(),
        page.clone(),
        SimSavedExtractor::new(page),
        store,
    )
}

#[tokio::test]
async fn folders_are_visited_with_all_posts_last() {
    let page = SimPageHandle::new("https://sim.page", SimPage::new(folders_script()));
    let store = Arc::new(MockStore::new());
    let token = StopToken::new(Mode::Saved, store.clone());

    let outcome = orchestrator(page, store.clone())
        .run(&token)
        .await
        .unwrap();

    let visited: Vec<&str> = outcome.targets.iter().map(|t| t.target.as_str()).collect();
    assert_eq!(
        visited,
        vec![
            "/me/saved/trips/",
            "/me/saved/food/",
            "/me/saved/all-posts/"
        ]
    );
    assert!(outcome.targets.iter().all(|t| t.skipped.is_none()));

    let identities: Vec<&str> = outcome.records.iter().map(|r| r.identity()).collect();
    assert_eq!(identities, vec!["t1", "t2", "f1", "a1"]);
    assert_eq!(outcome.meta.collected, 4);
    assert_eq!(store.stored_count(), 4);

    // The shared counter keeps cross-target order stamps strictly increasing.
    let orders: Vec<u64> = outcome.records.iter().filter_map(|r| r.crawl_order()).collect();
    assert!(orders.windows(2).all(|w| w[0] < w[1]));

    // First-seen wins: t1 keeps its folder tag through the all-posts pass.
    match &outcome.records[0] {
        CollectedRecord::Post(p) => assert_eq!(p.source_folder, "trips"),
        CollectedRecord::Follow(_) => panic!("follow in a saved run"),
    }
}

#[tokio::test]
async fn unreachable_folder_is_skipped_not_fatal() {
    let mut script = folders_script();
    script
        .routes
        .get_mut("/me/saved/food/")
        .unwrap()
        .navigable = false;
    let page = SimPageHandle::new("https://sim.page", SimPage::new(script));
    let store = Arc::new(MockStore::new());
    let token = StopToken::new(Mode::Saved, store.clone());

    let outcome = orchestrator(page, store.clone())
        .run(&token)
        .await
        .unwrap();

    assert_eq!(outcome.targets.len(), 3);
    let food = &outcome.targets[1];
    assert_eq!(food.target, "/me/saved/food/");
    let reason = food.skipped.as_deref().unwrap();
    assert!(reason.contains("Navigation timeout"));
    assert_eq!(food.count, 0);

    // The remaining targets still collected; f1 arrives via all-posts.
    let identities: Vec<&str> = outcome.records.iter().map(|r| r.identity()).collect();
    assert_eq!(identities, vec!["t1", "t2", "f1", "a1"]);
    match outcome
        .records
        .iter()
        .find(|r| r.identity() == "f1")
        .unwrap()
    {
        CollectedRecord::Post(p) => assert_eq!(p.source_folder, "all-posts"),
        CollectedRecord::Follow(_) => panic!("follow in a saved run"),
    }
}

#[tokio::test]
async fn zero_link_route_stabilizes_immediately() {
    let mut script = folders_script();
    // An empty folder renders no identity links at all.
    script.routes.insert(
        "/me/saved/empty/".to_string(),
        grid_route(Vec::new(), Vec::new()),
    );
    script
        .routes
        .get_mut("/me/saved/trips/")
        .unwrap()
        .links
        .push("/me/saved/empty/".to_string());
    let page = SimPageHandle::new("https://sim.page", SimPage::new(script));
    let store = Arc::new(MockStore::new());
    let token = StopToken::new(Mode::Saved, store.clone());

    let outcome = orchestrator(page, store).run(&token).await.unwrap();

    let empty = outcome
        .targets
        .iter()
        .find(|t| t.target == "/me/saved/empty/")
        .unwrap();
    assert!(empty.skipped.is_none());
    assert_eq!(empty.count, 0);
}

#[tokio::test]
async fn stable_link_counts_pass_route_stabilization() {
    // A long quick-settle window forces the two-poll equality path.
    let mut tuning = Tuning::for_mode(Mode::Saved).instant();
    tuning.route_quick_settle = std::time::Duration::from_secs(30);
    tuning.route_timeout = std::time::Duration::from_secs(1);
    let page = SimPageHandle::new("https://sim.page", SimPage::new(folders_script()));
    let store = Arc::new(MockStore::new());
    let token = StopToken::new(Mode::Saved, store.clone());
    let orchestrator = SavedOrchestrator::new(
        tuning,
        page.clone(),
        SimSavedExtractor::new(page),
        store,
    );

    let outcome = orchestrator.run(&token).await.unwrap();

    assert!(outcome.targets.iter().all(|t| t.skipped.is_none()));
    assert_eq!(outcome.meta.collected, 4);
}

#[tokio::test]
async fn non_saved_route_runs_a_single_pass() {
    let mut routes = HashMap::new();
    routes.insert(
        "/me/feed/".to_string(),
        grid_route(vec![post("x1"), post("x2")], Vec::new()),
    );
    let script = PageScript {
        start_path: "/me/feed/".to_string(),
        routes,
    };
    let page = SimPageHandle::new("https://sim.page", SimPage::new(script));
    let store = Arc::new(MockStore::new());
    let token = StopToken::new(Mode::Saved, store.clone());

    let outcome = orchestrator(page, store.clone())
        .run(&token)
        .await
        .unwrap();

    assert!(outcome.targets.is_empty());
    assert_eq!(outcome.records.len(), 2);
}

fn saved_service(page: Arc<SimPageHandle>, store: Arc<MockStore>) -> CollectionService {
    CollectionService::new(
        page.clone(),
        SimSavedExtractor::new(page.clone()),
        SimFollowExtractor::new(page),
        store,
    )
    .with_tuning(Tuning::for_mode(Mode::Saved).instant())
}

#[tokio::test]
async fn service_clears_stale_stop_flags_before_running() {
    let page = SimPageHandle::new("https://sim.page", SimPage::new(folders_script()));
    let store = Arc::new(MockStore::new());
    // Leftover flag from an interrupted earlier run.
    store.set_durable_stop(Mode::Saved, true);

    let outcome = saved_service(page, store.clone())
        .start_collection(Mode::Saved)
        .await;

    assert!(outcome.ok);
    let meta = outcome.meta.unwrap();
    assert!(!meta.stopped);
    assert_eq!(outcome.count, 4);
    assert_eq!(meta.targets.len(), 3);
    assert!(!store.durable_stop(Mode::Saved));
}

#[tokio::test]
async fn exhausted_chunk_retries_fail_the_run_and_release_the_mode() {
    let page = SimPageHandle::new("https://sim.page", SimPage::new(folders_script()));
    // Every send attempt fails, so the retry budget runs out.
    let store = Arc::new(MockStore::new().fail_times(3));
    let service = saved_service(page, store.clone());

    let outcome = service.start_collection(Mode::Saved).await;

    assert!(!outcome.ok);
    assert!(outcome.meta.is_none());
    let error = outcome.error.unwrap();
    assert!(error.contains("Background merge failed"));
    assert_eq!(store.stored_count(), 0);
    // The mode is released and no stop flag lingers for the next start.
    assert!(!service.is_running(Mode::Saved));
    assert!(!store.durable_stop(Mode::Saved));
}

#[tokio::test]
async fn stop_request_without_a_run_raises_the_durable_flag() {
    let page = SimPageHandle::new("https://sim.page", SimPage::new(folders_script()));
    let store = Arc::new(MockStore::new());
    let service = saved_service(page, store.clone());

    let outcome = service.request_stop(Mode::Following).await;

    assert!(outcome.ok);
    assert!(!outcome.running);
    assert!(store.durable_stop(Mode::Following));
}

#[tokio::test]
async fn unknown_mode_string_is_rejected_up_front() {
    let page = SimPageHandle::new("https://sim.page", SimPage::new(folders_script()));
    let store = Arc::new(MockStore::new());
    let service = saved_service(page, store.clone());

    let outcome = service.start_collection_str("followers").await;

    assert!(!outcome.ok);
    assert!(outcome.error.unwrap().contains("followers"));
    assert_eq!(store.stored_count(), 0);
}
