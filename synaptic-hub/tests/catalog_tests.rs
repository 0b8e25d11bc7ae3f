mod test_helpers;

use std::io::Write;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use synaptic_hub::catalog::{CatalogLimits, SelectionRequest};
use synaptic_hub::config::DEFAULT_CATEGORIES;
use synaptic_hub::search::TextMatchScorer;
use synaptic_hub::{
    CapabilityCatalog, CapabilityDescriptor, CapabilityRegistry, CatalogEvent, Category,
    HubConfig, JsonFileRegistry, StaticRegistry, ToolOutput,
};
use test_helpers::{editor_registry, gateway};

fn categories(names: &[&str]) -> SelectionRequest {
    SelectionRequest {
        categories: names.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    }
}

fn editor_catalog() -> CapabilityCatalog {
    CapabilityCatalog::new(
        editor_registry().load(),
        synaptic_hub::baseline::essential_tools(),
        Arc::new(TextMatchScorer),
        CatalogLimits::default(),
    )
}

#[tokio::test]
async fn selection_replaces_previous_expansion() {
    let catalog = editor_catalog();
    let baseline: Vec<String> = catalog.baseline().iter().map(|d| d.name.clone()).collect();

    catalog.select(categories(&["Lighting"])).await;
    assert!(catalog.is_advertised("unity_create_light"));

    catalog.select(categories(&["Camera"])).await;
    let mut expected = baseline.clone();
    expected.push("unity_setup_camera".to_string());
    assert_eq!(catalog.advertised_names(), expected);
    assert!(!catalog.is_advertised("unity_create_light"));
}

#[tokio::test]
async fn empty_selection_uses_default_categories() {
    let implicit = editor_catalog();
    let explicit = editor_catalog();

    let outcome = implicit.select(SelectionRequest::default()).await;
    explicit.select(categories(&DEFAULT_CATEGORIES)).await;

    assert_eq!(implicit.advertised_names(), explicit.advertised_names());
    assert_eq!(outcome.categories, DEFAULT_CATEGORIES.to_vec());
    // VFX and Build are outside the default set
    assert!(!implicit.is_advertised("unity_create_bloom"));
    assert!(!implicit.is_advertised("unity_build_player"));
}

#[tokio::test]
async fn category_and_keyword_filters_intersect() {
    let registry = StaticRegistry::new(vec![
        CapabilityDescriptor::new("alpha", "alpha", "first", Category::GameObject),
        CapabilityDescriptor::new("beta", "beta", "second", Category::Camera),
        CapabilityDescriptor::new("gamma", "gamma", "third", Category::GameObject),
    ]);
    let catalog = CapabilityCatalog::new(
        registry.load(),
        Vec::new(),
        Arc::new(TextMatchScorer),
        CatalogLimits::default(),
    );

    catalog.select(categories(&["GameObject"])).await;
    assert_eq!(catalog.advertised_names(), vec!["alpha", "gamma"]);

    let ranked = catalog.search_by_keyword("beta", 10).await;
    assert_eq!(ranked[0].name, "beta");

    let outcome = catalog
        .select(SelectionRequest {
            categories: vec!["GameObject".to_string()],
            keywords: vec!["beta".to_string()],
            max_count: None,
        })
        .await;
    assert_eq!(outcome.loaded_tools, 0);
    assert!(catalog.advertised_names().is_empty());
}

#[tokio::test]
async fn every_selection_is_announced() {
    let catalog = editor_catalog();
    let mut events = catalog.subscribe();
    let baseline = catalog.baseline().len();

    catalog.select(categories(&["VFX", "Build"])).await;
    catalog.select(categories(&["NotACategory"])).await;

    assert_eq!(
        events.recv().await.unwrap(),
        CatalogEvent::ToolsListChanged {
            total_active: baseline + 2
        }
    );
    // an unknown category falls back to the defaults
    match events.recv().await.unwrap() {
        CatalogEvent::ToolsListChanged { total_active } => assert!(total_active > baseline),
    }
}

#[tokio::test]
async fn registry_file_drives_the_gateway() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "{}",
        json!({
            "unity_create_particle_system": {
                "title": "Create Particle System",
                "description": "Spawn a particle system",
                "category": "VFX",
                "embedding": []
            },
            "unity_set_timescale": {
                "description": "Change Time.timeScale"
            }
        })
    )
    .unwrap();

    let registry = JsonFileRegistry::new(file.path());
    let loaded = registry.load().unwrap();
    assert_eq!(loaded["unity_create_particle_system"].category, Category::VFX);
    assert!(loaded["unity_create_particle_system"].embedding.is_none());
    assert_eq!(loaded["unity_set_timescale"].title, "unity_set_timescale");

    let config = HubConfig {
        registry_path: file.path().to_path_buf(),
        ..Default::default()
    };
    let gateway = synaptic_hub::Gateway::from_config(config);
    assert!(!gateway.catalog().is_degraded());

    let output = gateway
        .invoke("search_tools", json!({"query": "particle"}))
        .await
        .unwrap();
    match output {
        ToolOutput::Management { content, is_error } => {
            assert!(!is_error);
            assert_eq!(content["results"][0]["name"], json!("unity_create_particle_system"));
            assert_eq!(content["degraded"], json!(false));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn missing_registry_degrades_to_baseline() {
    let config = HubConfig {
        registry_path: "does/not/exist.json".into(),
        ..Default::default()
    };
    let gateway = synaptic_hub::Gateway::from_config(config);
    assert!(gateway.catalog().is_degraded());

    let output = gateway
        .invoke("select_tools", json!({"categories": ["VFX"]}))
        .await
        .unwrap();
    match output {
        ToolOutput::Management { content, is_error } => {
            assert!(is_error);
            assert_eq!(content["degraded"], json!(true));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        gateway.catalog().advertised_names().len(),
        gateway.catalog().baseline().len()
    );

    // categories still listed from the name patterns
    let output = gateway
        .invoke("list_available_categories", json!({}))
        .await
        .unwrap();
    match output {
        ToolOutput::Management { content, .. } => {
            assert!(content["categories"]["VFX"]["count"].as_u64().unwrap() > 0);
            assert!(content["categories"].get("Other").is_none());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn selected_tools_round_trip_through_the_gateway() {
    let gateway = gateway(HubConfig::default());
    let output = gateway
        .invoke(
            "select_tools",
            json!({"keywords": "bloom", "maxTools": "5"}),
        )
        .await
        .unwrap();
    match output {
        ToolOutput::Management { content, .. } => {
            assert_eq!(content["tools"], json!([{"name": "unity_create_bloom", "category": "VFX"}]));
            assert_eq!(content["keywords"], json!(["bloom"]));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(gateway.catalog().is_advertised("unity_create_bloom"));
}
