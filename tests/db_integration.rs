//! PostgreSQL status store integration tests.
//!
//! All tests require TEST_DATABASE_URL to be set.
//! Run with: TEST_DATABASE_URL=postgres://... cargo test --test db_integration
//!
//! Tests should be run single-threaded to avoid conflicts:
//!   cargo test --test db_integration -- --test-threads=1

mod common;

use common::{cluster, standalone, Harness};
use fleetpulse::coordinator::{Cadence, Coordinator, ProbeSettings};
use fleetpulse::db::Database;
use fleetpulse::model::ServerStatusDocument;
use fleetpulse::prom_metrics::Metrics;
use fleetpulse::store::StatusStore;
use std::sync::Arc;

/// Skip the test if TEST_DATABASE_URL is not set.
macro_rules! require_db {
    () => {
        if !common::has_test_db() {
            eprintln!("Skipping: TEST_DATABASE_URL not set");
            return;
        }
    };
}

async fn setup() -> Database {
    common::setup_test_db().await
}

// --- Server registrations ---

#[tokio::test]
async fn connect_and_health_check() {
    require_db!();
    let db = setup().await;
    db.health_check().await.unwrap();
}

#[tokio::test]
async fn migrate_is_idempotent() {
    require_db!();
    let db = setup().await;
    db.migrate().await.unwrap();
    db.migrate().await.unwrap();
}

#[tokio::test]
async fn create_meta_rejects_duplicates() {
    require_db!();
    let db = setup().await;

    assert!(db.create_server_meta(&standalone("thor")).await.unwrap());
    assert!(!db.create_server_meta(&standalone("thor")).await.unwrap());

    let stored = db.get_server_meta("thor").await.unwrap().unwrap();
    assert_eq!(stored.shell_username, "ops");
    assert!(stored.created_at.is_some());
}

#[tokio::test]
async fn meta_roundtrips_cluster_shape() {
    require_db!();
    let db = setup().await;

    let meta = cluster("edge.example.com", &["n1", "n2"]);
    db.create_server_meta(&meta).await.unwrap();

    let stored = db.get_server_meta("edge.example.com").await.unwrap().unwrap();
    assert!(stored.is_cluster);
    assert_eq!(stored.node_hostnames, vec!["n1", "n2"]);
    assert_eq!(db.list_server_meta().await.unwrap().len(), 1);
}

#[tokio::test]
async fn tags_update_both_records() {
    require_db!();
    let db = setup().await;

    let meta = standalone("thor");
    db.create_server_meta(&meta).await.unwrap();
    db.put_status(&ServerStatusDocument::from_meta(&meta))
        .await
        .unwrap();

    let tags = vec!["prod".to_string(), "eu".to_string()];
    assert!(db.update_server_tags("thor", &tags).await.unwrap());
    assert!(!db.update_server_tags("ghost", &tags).await.unwrap());

    assert_eq!(db.get_server_meta("thor").await.unwrap().unwrap().tags, tags);
    assert_eq!(db.get_status("thor").await.unwrap().unwrap().tags, tags);
}

#[tokio::test]
async fn delete_cascades_to_status() {
    require_db!();
    let db = setup().await;

    let meta = standalone("thor");
    db.create_server_meta(&meta).await.unwrap();
    db.put_status(&ServerStatusDocument::from_meta(&meta))
        .await
        .unwrap();

    assert!(db.delete_server("thor").await.unwrap());
    assert!(db.get_server_meta("thor").await.unwrap().is_none());
    assert!(db.get_status("thor").await.unwrap().is_none());
    assert!(!db.delete_server("thor").await.unwrap());
}

// --- Status documents ---

#[tokio::test]
async fn upsert_keeps_created_at() {
    require_db!();
    let db = setup().await;

    let mut doc = ServerStatusDocument::from_meta(&standalone("thor"));
    db.put_status(&doc).await.unwrap();
    let first = db.get_status("thor").await.unwrap().unwrap();

    doc.server_version = "4.2.1".to_string();
    db.put_status(&doc).await.unwrap();
    let second = db.get_status("thor").await.unwrap().unwrap();

    assert_eq!(second.server_version, "4.2.1");
    assert_eq!(first.created_at, second.created_at);
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
async fn tag_filter_requires_all_tags() {
    require_db!();
    let db = setup().await;

    let mut both = standalone("thor");
    both.tags = vec!["prod".into(), "eu".into()];
    let mut one = standalone("loki");
    one.tags = vec!["prod".into()];
    for meta in [&both, &one] {
        db.put_status(&ServerStatusDocument::from_meta(meta))
            .await
            .unwrap();
    }

    let prod_eu = vec!["prod".to_string(), "eu".to_string()];
    assert_eq!(common::status_hostnames(&db, &prod_eu).await, vec!["thor"]);
    assert_eq!(
        common::status_hostnames(&db, &["prod".to_string()]).await.len(),
        2
    );
    assert_eq!(db.list_status().await.unwrap().len(), 2);
}

// --- Tag definitions ---

#[tokio::test]
async fn tag_definitions_crud() {
    require_db!();
    let db = setup().await;

    assert!(db.add_tag("prod").await.unwrap());
    assert!(!db.add_tag("prod").await.unwrap());
    let tags = db.list_tags().await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag, "prod");
    assert!(db.delete_tag("prod").await.unwrap());
    assert!(!db.delete_tag("prod").await.unwrap());
}

// --- Coordinator over PostgreSQL ---

#[tokio::test]
async fn fast_cycle_persists_windows() {
    require_db!();
    let db = Arc::new(setup().await);
    let fakes = Harness::new();
    let coordinator = Coordinator::new(
        db.clone(),
        fakes.shell.clone(),
        fakes.registry.clone(),
        fakes.databases.clone(),
        ProbeSettings::default(),
        Arc::new(Metrics::new()),
    );
    fleetpulse::registration::register_server(db.as_ref(), standalone("thor"))
        .await
        .unwrap();
    fakes.shell.healthy_host("thor");

    for _ in 0..3 {
        coordinator.run_cycle(Cadence::Fast).await.unwrap();
    }

    let doc = db.get_status("thor").await.unwrap().unwrap();
    assert_eq!(doc.disk_usage[0].used_samples, vec![42.0, 42.0, 42.0]);
    assert_eq!(doc.memory_pressure[0].sample_timestamps.len(), 3);
}
