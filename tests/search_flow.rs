use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use httptest::matchers::{all_of, contains, json_decoded, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use secrecy::SecretString;
use serde_json::{json, Value};

use amble_lib::{
    AppConfig, AppState, Category, ConnectivityFlag, Coordinates, DeviceFix, DistanceMode, GeminiClient,
    KeyValueStore, LanguageModel, MemoryStore, PlaceSource, PlacesService, Prompt, ResultCache,
    SearchDisplay, SecretVault, Selection,
};

const HOTEL: Coordinates = Coordinates::new(55.8606, -4.2520);

fn secret(value: &str) -> Option<SecretString> {
    Some(SecretString::new(value.to_string().into_boxed_str()))
}

fn config(server: &Server, with_ai: bool) -> AppConfig {
    let base = server.url_str("").trim_end_matches('/').to_string();
    AppConfig {
        google_places_api_key: secret("places-key"),
        google_ai_api_key: if with_ai { secret("ai-key") } else { None },
        places_api_base: base.clone(),
        places_region: "uk".into(),
        ai_api_base: base,
        ai_model: "test-model".into(),
        search_radius_meters: 5_000,
        search_timeout_ms: 5_000,
        search_retry_base_ms: 10,
        search_cache_ttl_secs: 300,
        search_cache_capacity: 64,
        database_file_name: "unused.db".into(),
        data_dir: None,
    }
}

fn state(server: &Server, store: &MemoryStore, with_ai: bool) -> AppState {
    let config = config(server, with_ai);
    let connectivity = ConnectivityFlag::default();
    let places = PlacesService::new(
        &config,
        ResultCache::new(ChronoDuration::seconds(config.search_cache_ttl_secs), 64),
        Arc::new(connectivity.clone()),
    )
    .unwrap();
    let model = GeminiClient::from_config(&config).unwrap();
    AppState::assemble(
        config,
        SecretVault::in_memory(),
        Arc::new(store.clone()),
        places,
        model,
        connectivity,
    )
    .unwrap()
}

fn provider_place(id: &str, name: &str, lat: f64, lng: f64, types: &[&str]) -> Value {
    json!({
        "place_id": id,
        "name": name,
        "formatted_address": format!("{name}, Glasgow"),
        "geometry": { "location": { "lat": lat, "lng": lng } },
        "types": types,
        "photos": [{ "photo_reference": format!("ref-{id}") }],
        "rating": 4.4,
        "user_ratings_total": 90
    })
}

fn expect_provider(server: &Server, times: usize) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/textsearch/json"),
            request::query(url_decoded(contains(("query", "bookshop")))),
        ])
        .times(times)
        .respond_with(json_encoded(json!({
            "status": "OK",
            "results": [
                provider_place("far", "Far Books", 55.8800, -4.3000, &["book_store", "store"]),
                provider_place("near", "Near Books", 55.8607, -4.2521, &["book_store"]),
                provider_place("cafe", "Book Cafe", 55.8650, -4.2600, &["cafe", "book_store"]),
            ]
        }))),
    );
}

fn gemini_reply(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

fn hit_ids(display: &SearchDisplay) -> Vec<String> {
    match display {
        SearchDisplay::Results { hits, .. } => hits
            .iter()
            .map(|hit| hit.result.external_id.clone())
            .collect(),
        other => panic!("expected results, got {other:?}"),
    }
}

#[tokio::test]
async fn search_rank_select_and_confirm_round_trip() {
    let server = Server::run();
    expect_provider(&server, 1);
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/models/test-model:generateContent"),
            request::query(url_decoded(contains(("key", "ai-key")))),
        ])
        .times(2)
        .respond_with(json_encoded(gemini_reply(
            "Here you go: [\"cafe\", \"far\", \"near\"]",
        ))),
    );

    let store = MemoryStore::new();
    let app = state(&server, &store, true);
    let anchor = app.anchor(DistanceMode::FromHotel, None);

    let display = app.search_places("bookshop", anchor, None).await;
    assert_eq!(hit_ids(&display), vec!["cafe", "far", "near"]);
    if let SearchDisplay::Results { hits, .. } = &display {
        assert_eq!(hits[0].suggested_category, Category::Coffee);
        assert_eq!(hits[1].suggested_category, Category::Shopping);
        assert!(hits[0]
            .thumbnail
            .as_deref()
            .is_some_and(|url| url.contains("maxwidth=400&photoreference=ref-cafe")));
        assert!(hits.iter().all(|hit| hit.saved_place_id.is_none()));
    }

    let Selection::Preview(preview) = app.select_search_result("far").unwrap() else {
        panic!("expected preview");
    };
    assert_eq!(preview.source, None);
    let pending = app.request_add().unwrap();
    assert_eq!(pending.suggested_category, Category::Shopping);
    let saved = app.confirm_add(None).unwrap();
    assert_eq!(saved.id, "user_far");
    assert_eq!(saved.source, Some(PlaceSource::User));
    assert!(saved.images[0].contains("maxwidth=800&photoreference=ref-far"));

    let persisted = store.read_json("amble_user_places").unwrap().unwrap();
    assert_eq!(persisted[0]["googlePlaceId"], "far");

    // Served from cache; the provider expectation allows a single call.
    let again = app.search_places("Bookshop ", anchor, None).await;
    if let SearchDisplay::Results { hits, .. } = &again {
        let far = hits.iter().find(|hit| hit.result.external_id == "far").unwrap();
        assert_eq!(far.saved_place_id.as_deref(), Some("user_far"));
    }
    assert_eq!(
        app.select_search_result("far").unwrap(),
        Selection::Existing(saved)
    );
}

#[tokio::test]
async fn ranking_falls_back_to_distance_when_model_errors() {
    let server = Server::run();
    expect_provider(&server, 1);
    server.expect(
        Expectation::matching(request::method_path("POST", "/models/test-model:generateContent"))
            .times(1)
            .respond_with(status_code(503)),
    );

    let store = MemoryStore::new();
    let app = state(&server, &store, true);
    let display = app.search_places("bookshop", HOTEL, None).await;
    assert_eq!(hit_ids(&display), vec!["near", "cafe", "far"]);
}

#[tokio::test]
async fn ranking_without_ai_key_uses_distance_and_retry_repeats_the_query() {
    let server = Server::run();
    expect_provider(&server, 1);

    let store = MemoryStore::new();
    let app = state(&server, &store, false);
    let first = app.search_places("bookshop", HOTEL, Some(5_000)).await;
    assert_eq!(hit_ids(&first), vec!["near", "cafe", "far"]);

    let retried = app.retry_last_search().await.unwrap();
    assert_eq!(hit_ids(&retried), hit_ids(&first));
}

#[tokio::test]
async fn offline_search_is_reported_for_display() {
    let server = Server::run();
    let store = MemoryStore::new();
    let app = state(&server, &store, false);
    app.set_online(false);

    match app.search_places("bookshop", HOTEL, None).await {
        SearchDisplay::Failed { error, query } => {
            assert_eq!(query, "bookshop");
            assert_eq!(error.code, "OFFLINE");
            assert_eq!(
                error.message,
                "No internet connection. Check your connection and try again."
            );
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(
        app.search_places("b", HOTEL, None).await,
        SearchDisplay::Idle
    ));
}

#[test]
fn failed_device_lookup_measures_from_city_centre() {
    let server = Server::run();
    let store = MemoryStore::new();
    let app = state(&server, &store, false);

    let device = app.device_location(DeviceFix::Failed);
    assert_eq!(device, Some(Coordinates::new(55.8600, -4.2500)));
    assert_eq!(
        app.anchor(DistanceMode::FromMe, device),
        Coordinates::new(55.8600, -4.2500)
    );
    assert_eq!(app.anchor(DistanceMode::FromHotel, device), HOTEL);

    let unknown = app.device_location(DeviceFix::Unavailable);
    assert_eq!(app.anchor(DistanceMode::FromMe, unknown), HOTEL);
}

#[tokio::test]
async fn gemini_client_sends_system_instruction() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/models/test-model:generateContent"),
            request::body(json_decoded(|body: &Value| {
                body["contents"][0]["parts"][0]["text"] == "lunch?"
                    && body["systemInstruction"]["parts"][0]["text"] == "be brief"
            })),
        ])
        .times(1)
        .respond_with(json_encoded(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Try " }, { "text": "**[NEW: Ox and Finch]**" }] } }]
        }))),
    );

    let config = config(&server, true);
    let model = GeminiClient::new(
        &config.ai_api_base,
        &config.ai_model,
        SecretString::new("ai-key".to_string().into_boxed_str()),
    )
    .unwrap();
    let text = model
        .generate(&Prompt::new("lunch?").with_system("be brief"))
        .await
        .unwrap();
    assert_eq!(text, "Try **[NEW: Ox and Finch]**");
}

#[tokio::test]
async fn concierge_reply_carries_extracted_mentions() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/models/test-model:generateContent"))
            .times(1)
            .respond_with(json_encoded(gemini_reply(
                "Grab a flat white at **[KNOWN: Laboratorio Espresso]** then try **[NEW: Ox and Finch]**.",
            ))),
    );

    let store = MemoryStore::new();
    let app = state(&server, &store, true);
    let reply = app
        .ask_concierge("coffee then dinner?", Some("c1"), None)
        .await
        .unwrap();
    assert_eq!(reply.mentions.len(), 2);
    assert_eq!(reply.mentions[0].name, "Laboratorio Espresso");
    assert!(reply.text.contains("**[NEW: Ox and Finch]**"));
}
