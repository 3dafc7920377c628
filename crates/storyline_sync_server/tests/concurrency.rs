//! Many clients syncing at once against one server.

use std::sync::Arc;
use storyline_protocol::{encode, BatchUrlsRequest, DeltaSyncRequest, DeltaSyncResponse};
use storyline_sync_server::{CallerIdentity, HmacUrlSigner, ServerConfig, SyncServer};
use storyline_testkit::prelude::*;

fn shared_server(catalog: &TestCatalog) -> Arc<SyncServer> {
    let signer = Arc::new(HmacUrlSigner::new(b"secret".to_vec(), "https://cdn.example.com"));
    Arc::new(SyncServer::new(
        ServerConfig::default(),
        catalog.engine.clone(),
        signer,
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_clients_see_identical_state() {
    let catalog = TestCatalog::seeded(20);
    let server = shared_server(&catalog);

    let mut tasks = Vec::new();
    for i in 0..32 {
        let server = Arc::clone(&server);
        tasks.push(tokio::task::spawn_blocking(move || {
            let caller = CallerIdentity::new(format!("device-{i}"));
            server.handle_delta_sync(&caller, &DeltaSyncRequest::initial())
        }));
    }

    let mut responses: Vec<DeltaSyncResponse> = Vec::new();
    for task in tasks {
        responses.push(task.await.unwrap().unwrap());
    }
    assert!(responses.iter().all(|r| r == &responses[0]));
    assert_eq!(responses[0].stories.len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn syncs_stay_consistent_while_a_writer_edits() {
    let catalog = TestCatalog::seeded(10);
    let server = shared_server(&catalog);

    let writer = {
        let engine = catalog.engine.clone();
        tokio::task::spawn_blocking(move || {
            for round in 0..20 {
                let mut story = sample_story(&format!("story-{:03}", round % 10 + 1));
                story.title = format!("round {round}");
                engine.catalog().save_story(story).unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for i in 0..8 {
        let server = Arc::clone(&server);
        readers.push(tokio::task::spawn_blocking(move || {
            let caller = CallerIdentity::new(format!("reader-{i}"));
            let mut last_version = 0;
            for _ in 0..20 {
                let response = server
                    .handle_delta_sync(&caller, &DeltaSyncRequest::initial())
                    .unwrap();
                assert_eq!(response.total_stories, 10);
                assert_eq!(response.total_stories, response.story_checksums.len() as u64);
                assert!(response.server_version >= last_version);
                last_version = response.server_version;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    assert!(catalog.repair().verify().unwrap().is_consistent());
    let settled = server
        .handle_delta_sync(&CallerIdentity::system(), &DeltaSyncRequest::initial())
        .unwrap();
    assert!(response_is_consistent(&settled));
    assert_eq!(settled.server_version, 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn syncs_during_rebuild_see_a_whole_aggregate() {
    let catalog = TestCatalog::seeded(10);
    let server = shared_server(&catalog);

    let before = catalog.client_checksums();
    let extra = catalog.stories().put(sample_story("story-011")).unwrap();
    let mut after = before.clone();
    after.insert(extra.id.clone(), extra.checksum.clone());

    let rebuilder = {
        let engine = catalog.engine.clone();
        tokio::task::spawn_blocking(move || {
            for _ in 0..10 {
                engine.repair().rebuild().unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for i in 0..6 {
        let server = Arc::clone(&server);
        let (before, after) = (before.clone(), after.clone());
        readers.push(tokio::task::spawn_blocking(move || {
            let caller = CallerIdentity::new(format!("reader-{i}"));
            let mut last_version = 0;
            for _ in 0..30 {
                let response = server
                    .handle_delta_sync(&caller, &DeltaSyncRequest::initial())
                    .unwrap();
                assert_eq!(response.total_stories, response.story_checksums.len() as u64);
                assert!(
                    response.story_checksums == before || response.story_checksums == after,
                    "mixed aggregate at version {}",
                    response.server_version
                );
                assert!(response.server_version >= last_version);
                last_version = response.server_version;
            }
        }));
    }

    rebuilder.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(catalog.client_checksums(), after);
    assert!(catalog.repair().verify().unwrap().is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_byte_level_batches() {
    let catalog = TestCatalog::memory();
    let server = shared_server(&catalog);
    let body = encode(&BatchUrlsRequest::new([
        "images/a.png",
        "images/../b.png",
    ]))
    .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let server = Arc::clone(&server);
        let body = body.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            server.handle_bytes(&CallerIdentity::system(), 5, &body).0
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 6);
    }
}

#[test]
fn stress_run_has_no_failures() {
    let catalog = TestCatalog::memory();
    let config = StressConfig {
        writers: 1,
        readers: 4,
        operations: 25,
        story_count: 5,
    };
    let result = stress_concurrent_syncs(&catalog, &config);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.total_ops(), 125);
    assert!(catalog.repair().verify().unwrap().is_consistent());
}
