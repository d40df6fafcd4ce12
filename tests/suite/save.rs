//! Save files, seeding, and combining on top of imported elements

use std::fs;
use std::sync::Arc;

use kiln_store::{SaveFile, Store};
use wiremock::MockServer;

use crate::common::{memory_store, mount_pair, service_for};

#[test]
fn seeding_is_idempotent() {
    let store = Store::open_in_memory().unwrap();
    assert_eq!(store.seed_starting_elements().unwrap(), 4);
    assert_eq!(store.seed_starting_elements().unwrap(), 0);
    assert_eq!(store.stats().unwrap().elements, 4);
}

#[tokio::test]
async fn imported_icon_wins_over_generator_icon() {
    let server = MockServer::start().await;
    mount_pair(&server, "Fire", "Water", "Steam", "☁️").await;

    let dir = tempfile::tempdir().unwrap();
    let save = dir.path().join("save.json");
    fs::write(
        &save,
        r#"{"elements":[{"text":"Water","emoji":"💧","discovered":false},
                        {"text":"Fire","emoji":"🔥","discovered":false},
                        {"text":"Steam","emoji":"💨","discovered":false}]}"#,
    )
    .unwrap();

    let store = memory_store();
    assert_eq!(store.import_save(&save).unwrap().inserted, 3);

    let service = service_for(&server, Arc::clone(&store));
    let outcome = service.combine("Water", "Fire").await.unwrap();
    assert!(!outcome.is_new_discovery(), "Steam was already known");
    assert_eq!(outcome.element().unwrap().icon, "💨");
}

#[tokio::test]
async fn export_includes_discoveries() {
    let server = MockServer::start().await;
    mount_pair(&server, "Fire", "Water", "Steam", "💨").await;

    let store = memory_store();
    store.seed_starting_elements().unwrap();
    service_for(&server, Arc::clone(&store))
        .combine("Fire", "Water")
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("export.json");
    assert_eq!(store.export_save(&out).unwrap(), 5);

    let exported: SaveFile = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert!(
        exported
            .elements
            .iter()
            .any(|e| e.text == "Steam" && e.emoji == "💨")
    );
}
