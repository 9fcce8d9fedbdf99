pub mod ai;
pub mod cache;
pub mod catalog;
pub mod category;
pub mod collection;
pub mod commands;
pub mod concierge;
pub mod config;
pub mod errors;
pub mod geo;
pub mod places;
pub mod ranking;
pub mod search;
pub mod secrets;
pub mod store;

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use secrecy::SecretString;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::ai::{GeminiClient, LanguageModel, Prompt, UnconfiguredModel};
pub use crate::cache::{Clock, ResultCache, SearchRequest, SystemClock};
pub use crate::category::{classify, Category};
pub use crate::collection::{CollectionManager, PendingAdd, Place, PlaceSource, PlaceView, Selection};
pub use crate::concierge::{context_description, extract_mentions, Concierge, Mention, MentionKind};
pub use crate::config::{AppConfig, PublicAppConfig, AI_KEY_ALIAS, PLACES_KEY_ALIAS};
pub use crate::errors::{AppError, AppResult, SearchError};
pub use crate::geo::{
    anchor_for, distance_km, format_duration, walking_minutes, Coordinates, DeviceFix, DistanceMode,
};
pub use crate::places::{
    Connectivity, ConnectivityFlag, HttpPlacesClient, PhotoResolver, PlacesService,
    PlacesTransport, ProviderResponse, RetryPolicy, SearchResult,
};
pub use crate::ranking::{rank_by_distance, RelevanceRanker};
pub use crate::search::{SearchDisplay, SearchHit, SearchSession, SearchTicket};
pub use crate::secrets::SecretVault;
pub use crate::store::{KeyValueStore, MemoryStore, SqliteStore};

pub const VAULT_SERVICE_NAME: &str = "Amble";

/// Answer from the concierge with its place markers pulled out.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConciergeReply {
    pub text: String,
    pub mentions: Vec<Mention>,
}

/// Everything a front end needs, wired once per process.
///
/// Locks are only held for synchronous sections; no guard lives across an `.await`.
pub struct AppState {
    config: AppConfig,
    vault: SecretVault,
    places: PlacesService,
    ranker: RelevanceRanker,
    concierge: Concierge,
    photos: PhotoResolver,
    connectivity: ConnectivityFlag,
    collection: Mutex<CollectionManager>,
    session: Mutex<SearchSession>,
}

impl AppState {
    /// Reads configuration and opens the on-disk store in the platform data directory.
    pub fn initialize() -> AppResult<Self> {
        init_tracing();
        let vault = SecretVault::new(VAULT_SERVICE_NAME);
        let config = AppConfig::from_env().with_vault_fallback(&vault);
        let data_dir = config.resolve_data_dir()?;
        let store = SqliteStore::open(&data_dir, &config.database_file_name)?;
        let connectivity = ConnectivityFlag::default();
        let cache = ResultCache::new(
            ChronoDuration::seconds(config.search_cache_ttl_secs),
            config.search_cache_capacity,
        );
        let places = PlacesService::new(&config, cache, Arc::new(connectivity.clone()))?;
        let model = GeminiClient::from_config(&config)?;
        Self::assemble(config, vault, Arc::new(store), places, model, connectivity)
    }

    /// Wires the state from explicit collaborators.
    pub fn assemble(
        config: AppConfig,
        vault: SecretVault,
        store: Arc<dyn KeyValueStore>,
        places: PlacesService,
        model: Arc<dyn LanguageModel>,
        connectivity: ConnectivityFlag,
    ) -> AppResult<Self> {
        let photos = PhotoResolver::from_config(&config);
        let collection = CollectionManager::load(store, photos.clone())?;
        info!(
            target: "amble",
            version = env!("CARGO_PKG_VERSION"),
            places_key = config.google_places_api_key.is_some(),
            ai_key = config.google_ai_api_key.is_some(),
            "app state ready"
        );
        Ok(Self {
            ranker: RelevanceRanker::new(Arc::clone(&model)),
            concierge: Concierge::new(model),
            config,
            vault,
            places,
            photos,
            connectivity,
            collection: Mutex::new(collection),
            session: Mutex::new(SearchSession::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn set_online(&self, online: bool) {
        self.connectivity.set_online(online);
    }

    pub fn anchor(&self, mode: DistanceMode, device: Option<Coordinates>) -> Coordinates {
        anchor_for(mode, device, catalog::HOME_BASE)
    }

    pub fn device_location(&self, fix: DeviceFix) -> Option<Coordinates> {
        fix.position(catalog::FALLBACK_DEVICE_LOCATION)
    }

    pub fn profile_bio(&self) -> String {
        self.collection.lock().profile_bio().to_string()
    }

    pub fn has_onboarded(&self) -> bool {
        self.collection.lock().has_onboarded()
    }

    pub fn set_profile_bio(&self, bio: &str) -> AppResult<()> {
        self.collection.lock().set_profile_bio(bio)
    }

    pub fn places_in_category(&self, category: Category, anchor: Coordinates) -> Vec<PlaceView> {
        self.collection.lock().places_in_category(category, anchor)
    }

    pub fn favorite_places(&self, anchor: Coordinates) -> Vec<PlaceView> {
        let collection = self.collection.lock();
        collection
            .favorite_places()
            .into_iter()
            .map(|place| collection.view(place, anchor))
            .collect()
    }

    pub fn place(&self, id: &str) -> Option<Place> {
        let collection = self.collection.lock();
        collection.find_by_id(id).cloned().or_else(|| {
            collection
                .pending()
                .filter(|pending| pending.preview.id == id)
                .map(|pending| pending.preview.clone())
        })
    }

    pub fn toggle_favorite(&self, id: &str) -> AppResult<bool> {
        self.collection.lock().toggle_favorite(id)
    }

    pub fn remove_place(&self, id: &str) -> AppResult<Option<Place>> {
        self.collection.lock().remove_place(id)
    }

    /// Runs a search: provider lookup, relevance ranking, then annotation against the collection.
    pub async fn search_places(
        &self,
        query: &str,
        anchor: Coordinates,
        radius_meters: Option<u32>,
    ) -> SearchDisplay {
        let ticket = self.session.lock().begin(query, anchor, radius_meters);
        match ticket {
            Some(ticket) => self.run_search(ticket).await,
            None => SearchDisplay::Idle,
        }
    }

    /// Re-runs the last issued search with the same parameters.
    pub async fn retry_last_search(&self) -> AppResult<SearchDisplay> {
        let ticket = self
            .session
            .lock()
            .retry_last()
            .ok_or_else(|| AppError::InvalidInput("no search to retry".into()))?;
        Ok(self.run_search(ticket).await)
    }

    async fn run_search(&self, ticket: SearchTicket) -> SearchDisplay {
        let outcome = match self
            .places
            .search(&ticket.query, ticket.anchor, ticket.radius_meters)
            .await
        {
            Ok(results) => {
                let bio = self.profile_bio();
                let order = self
                    .ranker
                    .rank(&ticket.query, &bio, ticket.anchor, &results)
                    .await;
                let ranked = ranking::reorder(results, &order);
                let collection = self.collection.lock();
                Ok(search::annotate(ranked, ticket.anchor, &collection, &self.photos))
            }
            Err(err) => Err(err),
        };

        let mut session = self.session.lock();
        if !session.apply(&ticket, outcome) {
            debug!(target: "places_search", generation = ticket.generation, "newer search in progress");
        }
        session.display().clone()
    }

    pub fn search_display(&self) -> SearchDisplay {
        self.session.lock().display().clone()
    }

    pub fn clear_search(&self) {
        self.session.lock().clear();
    }

    /// Resolves a displayed hit to its saved place or an unsaved preview.
    pub fn select_search_result(&self, external_id: &str) -> AppResult<Selection> {
        let result = self
            .session
            .lock()
            .find_result(external_id)
            .cloned()
            .ok_or_else(|| AppError::InvalidInput(format!("no search result {external_id}")))?;
        Ok(self.collection.lock().select_search_result(&result))
    }

    pub fn request_add(&self) -> AppResult<PendingAdd> {
        self.collection.lock().request_add().cloned()
    }

    pub fn cancel_add(&self) {
        self.collection.lock().cancel_add();
    }

    pub fn confirm_add(&self, category: Option<Category>) -> AppResult<Place> {
        let place = self.collection.lock().confirm_pending(category)?;
        self.session.lock().clear();
        Ok(place)
    }

    pub async fn vibe_check(&self, place_id: &str) -> AppResult<String> {
        let place = self
            .place(place_id)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown place {place_id}")))?;
        let bio = self.profile_bio();
        Ok(self.concierge.vibe_check(&place, &bio).await)
    }

    pub async fn ask_concierge(
        &self,
        question: &str,
        selected_place_id: Option<&str>,
        device: Option<Coordinates>,
    ) -> AppResult<ConciergeReply> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidInput("question cannot be empty".into()));
        }
        let (bio, known, context) = {
            let collection = self.collection.lock();
            let selected = selected_place_id.and_then(|id| collection.find_by_id(id));
            (
                collection.profile_bio().to_string(),
                collection.merged_collection().cloned().collect::<Vec<_>>(),
                context_description(selected, device),
            )
        };
        let known_refs: Vec<&Place> = known.iter().collect();
        let text = self
            .concierge
            .explore_recommendations(question, &bio, &known_refs, &context)
            .await;
        Ok(ConciergeReply {
            mentions: extract_mentions(&text),
            text,
        })
    }

    pub fn public_config(&self) -> PublicAppConfig {
        self.config.public_profile()
    }

    /// Stores an API key in the keychain. Takes effect on the next start.
    pub fn store_api_key(&self, account: &str, secret: SecretString) -> AppResult<()> {
        ensure_key_alias(account)?;
        self.vault.store(account, &secret)
    }

    pub fn clear_api_key(&self, account: &str) -> AppResult<()> {
        ensure_key_alias(account)?;
        self.vault.delete(account)
    }
}

fn ensure_key_alias(account: &str) -> AppResult<()> {
    if account == PLACES_KEY_ALIAS || account == AI_KEY_ALIAS {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!("unknown key account {account}")))
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,amble=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}
