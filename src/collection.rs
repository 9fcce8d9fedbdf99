use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{self, DEFAULT_BIO};
use crate::category::{classify, Category};
use crate::errors::{AppError, AppResult};
use crate::geo::{distance_km, format_duration, Coordinates};
use crate::places::{PhotoResolver, SearchResult};
use crate::store::{KeyValueStore, BIO_KEY, FAVORITES_KEY, USER_PLACES_KEY};

const USER_PLACE_PREFIX: &str = "user_";
const MAX_USER_PLACE_IMAGES: usize = 3;
const USER_PLACE_IMAGE_WIDTH: u32 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceSource {
    Curated,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub description: String,
    pub address: String,
    pub coordinates: Coordinates,
    pub images: Vec<String>,
    pub priority: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PlaceSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_place_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl Place {
    pub fn is_user_added(&self) -> bool {
        self.source == Some(PlaceSource::User)
    }
}

/// Collection id for a place added from the provider result `external_id`.
pub fn user_place_id(external_id: &str) -> String {
    format!("{USER_PLACE_PREFIX}{external_id}")
}

/// Outcome of picking a search result.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Already in the collection; show its detail instead of saving.
    Existing(Place),
    /// Unsaved preview with a suggested category.
    Preview(Place),
}

#[derive(Debug, Clone)]
pub struct PendingAdd {
    pub result: SearchResult,
    pub preview: Place,
    pub suggested_category: Category,
    pub awaiting_confirmation: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceView {
    #[serde(flatten)]
    pub place: Place,
    pub distance_km: f64,
    pub walking_time: String,
    pub is_favorite: bool,
}

/// Owns the persisted collection state and every mutation of it.
pub struct CollectionManager {
    store: Arc<dyn KeyValueStore>,
    photos: PhotoResolver,
    curated: Vec<Place>,
    user_places: Vec<Place>,
    favorites: Vec<String>,
    bio: Option<String>,
    pending: Option<PendingAdd>,
}

impl CollectionManager {
    /// Reads all records once. Missing or unreadable records start empty.
    pub fn load(store: Arc<dyn KeyValueStore>, photos: PhotoResolver) -> AppResult<Self> {
        Self::with_curated(store, photos, catalog::curated_places().to_vec())
    }

    pub fn with_curated(
        store: Arc<dyn KeyValueStore>,
        photos: PhotoResolver,
        curated: Vec<Place>,
    ) -> AppResult<Self> {
        let user_places: Vec<Place> = read_record(store.as_ref(), USER_PLACES_KEY)?.unwrap_or_default();
        let favorites: Vec<String> = read_record(store.as_ref(), FAVORITES_KEY)?.unwrap_or_default();
        let bio: Option<String> = read_record(store.as_ref(), BIO_KEY)?;
        info!(
            target: "collection",
            user_places = user_places.len(),
            favorites = favorites.len(),
            onboarded = bio.is_some(),
            "collection loaded"
        );
        Ok(Self {
            store,
            photos,
            curated,
            user_places,
            favorites,
            bio,
            pending: None,
        })
    }

    pub fn curated(&self) -> &[Place] {
        &self.curated
    }

    pub fn user_places(&self) -> &[Place] {
        &self.user_places
    }

    /// Curated places followed by user-added places.
    pub fn merged_collection(&self) -> impl Iterator<Item = &Place> {
        self.curated.iter().chain(self.user_places.iter())
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Place> {
        self.merged_collection().find(|place| place.id == id)
    }

    pub fn find_by_external_id(&self, external_id: &str) -> Option<&Place> {
        self.merged_collection()
            .find(|place| place.google_place_id.as_deref() == Some(external_id))
    }

    pub fn profile_bio(&self) -> &str {
        self.bio.as_deref().unwrap_or(DEFAULT_BIO)
    }

    pub fn has_onboarded(&self) -> bool {
        self.bio.is_some()
    }

    pub fn set_profile_bio(&mut self, bio: &str) -> AppResult<()> {
        let bio = bio.trim();
        if bio.is_empty() {
            return Err(AppError::InvalidInput("profile bio cannot be empty".into()));
        }
        self.store
            .write_json(BIO_KEY, &Value::String(bio.to_string()))?;
        self.bio = Some(bio.to_string());
        Ok(())
    }

    pub fn favorites(&self) -> &[String] {
        &self.favorites
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.iter().any(|fav| fav == id)
    }

    /// Favorited places in the order they were favorited.
    pub fn favorite_places(&self) -> Vec<&Place> {
        self.favorites
            .iter()
            .filter_map(|id| self.find_by_id(id))
            .collect()
    }

    /// Flips favorite membership for any place id and returns the new state.
    pub fn toggle_favorite(&mut self, id: &str) -> AppResult<bool> {
        let mut next = self.favorites.clone();
        let now_favorite = if let Some(index) = next.iter().position(|fav| fav == id) {
            next.remove(index);
            false
        } else {
            next.push(id.to_string());
            true
        };
        self.store
            .write_json(FAVORITES_KEY, &serde_json::to_value(&next)?)?;
        self.favorites = next;
        debug!(target: "collection", id, favorite = now_favorite, "favorite toggled");
        Ok(now_favorite)
    }

    /// One category of the merged collection, favorites first, then nearest first.
    pub fn places_in_category(&self, category: Category, anchor: Coordinates) -> Vec<PlaceView> {
        let mut views: Vec<PlaceView> = self
            .merged_collection()
            .filter(|place| place.category == category)
            .map(|place| self.view(place, anchor))
            .collect();
        views.sort_by(|a, b| {
            b.is_favorite
                .cmp(&a.is_favorite)
                .then(a.distance_km.total_cmp(&b.distance_km))
        });
        views
    }

    pub fn view(&self, place: &Place, anchor: Coordinates) -> PlaceView {
        let distance = distance_km(anchor, place.coordinates);
        PlaceView {
            place: place.clone(),
            distance_km: distance,
            walking_time: format_duration(distance),
            is_favorite: self.is_favorite(&place.id),
        }
    }

    /// Routes a picked search result to its saved place, or stages an unsaved preview.
    pub fn select_search_result(&mut self, result: &SearchResult) -> Selection {
        if let Some(existing) = self.find_by_external_id(&result.external_id) {
            debug!(target: "collection", external_id = %result.external_id, id = %existing.id, "result already saved");
            let existing = existing.clone();
            self.pending = None;
            return Selection::Existing(existing);
        }

        let suggested = classify(&result.types);
        let preview = self.build_place(result, suggested, None);
        self.pending = Some(PendingAdd {
            result: result.clone(),
            preview: preview.clone(),
            suggested_category: suggested,
            awaiting_confirmation: false,
        });
        Selection::Preview(preview)
    }

    pub fn pending(&self) -> Option<&PendingAdd> {
        self.pending.as_ref()
    }

    /// Moves the staged preview into the category-confirmation step.
    pub fn request_add(&mut self) -> AppResult<&PendingAdd> {
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| AppError::InvalidInput("no search result selected".into()))?;
        pending.awaiting_confirmation = true;
        Ok(pending)
    }

    pub fn cancel_add(&mut self) -> Option<PendingAdd> {
        self.pending.take()
    }

    /// Confirms the staged preview, optionally overriding the suggested category.
    pub fn confirm_pending(&mut self, category: Option<Category>) -> AppResult<Place> {
        let pending = self
            .pending
            .clone()
            .ok_or_else(|| AppError::InvalidInput("no search result selected".into()))?;
        let category = category.unwrap_or(pending.suggested_category);
        self.confirm_add(&pending.result, category)
    }

    /// Persists `result` as a user place. Confirming the same external id twice yields one place.
    pub fn confirm_add(&mut self, result: &SearchResult, category: Category) -> AppResult<Place> {
        let id = user_place_id(&result.external_id);
        if let Some(existing) = self
            .find_by_id(&id)
            .or_else(|| self.find_by_external_id(&result.external_id))
        {
            let existing = existing.clone();
            debug!(target: "collection", id = %existing.id, "place already saved; confirm is a no-op");
            self.clear_pending_for(&result.external_id);
            return Ok(existing);
        }

        let place = self.build_place(result, category, Some(Utc::now()));
        let mut next = self.user_places.clone();
        next.push(place.clone());
        self.store
            .write_json(USER_PLACES_KEY, &serde_json::to_value(&next)?)?;
        self.user_places = next;
        self.clear_pending_for(&result.external_id);
        info!(target: "collection", id = %place.id, category = %place.category, "place added");
        Ok(place)
    }

    /// Removes a user-added place and its favorite entry. Unknown or curated ids are a no-op.
    pub fn remove_place(&mut self, id: &str) -> AppResult<Option<Place>> {
        let Some(index) = self
            .user_places
            .iter()
            .position(|place| place.id == id && place.is_user_added())
        else {
            debug!(target: "collection", id, "remove ignored; not a user-added place");
            return Ok(None);
        };

        // Favorites first: a stored favorite never outlives its place.
        if self.is_favorite(id) {
            let next_favorites: Vec<String> = self
                .favorites
                .iter()
                .filter(|fav| fav.as_str() != id)
                .cloned()
                .collect();
            self.store
                .write_json(FAVORITES_KEY, &serde_json::to_value(&next_favorites)?)?;
            self.favorites = next_favorites;
        }

        let mut next_places = self.user_places.clone();
        let removed = next_places.remove(index);
        self.store
            .write_json(USER_PLACES_KEY, &serde_json::to_value(&next_places)?)?;
        self.user_places = next_places;
        info!(target: "collection", id, "place removed");
        Ok(Some(removed))
    }

    fn clear_pending_for(&mut self, external_id: &str) {
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.result.external_id == external_id)
        {
            self.pending = None;
        }
    }

    fn build_place(
        &self,
        result: &SearchResult,
        category: Category,
        added_at: Option<DateTime<Utc>>,
    ) -> Place {
        let mut images: Vec<String> = result
            .photo_references
            .iter()
            .take(MAX_USER_PLACE_IMAGES)
            .map(|reference| self.photos.url(reference, USER_PLACE_IMAGE_WIDTH))
            .collect();
        if images.is_empty() {
            images.push(catalog::placeholder_image());
        }

        Place {
            id: user_place_id(&result.external_id),
            name: result.name.clone(),
            category,
            description: describe(result),
            address: result.formatted_address.clone(),
            coordinates: result.coordinates,
            images,
            priority: false,
            source: added_at.map(|_| PlaceSource::User),
            google_place_id: Some(result.external_id.clone()),
            added_at,
        }
    }
}

fn describe(result: &SearchResult) -> String {
    match (result.rating, result.user_ratings_total) {
        (Some(rating), Some(total)) => format!("Rated {rating:.1} from {total} reviews."),
        (Some(rating), None) => format!("Rated {rating:.1}."),
        _ => "Added from search.".to_string(),
    }
}

fn read_record<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> AppResult<Option<T>> {
    let value = match store.read_json(key) {
        Ok(Some(value)) => value,
        Ok(None) => return Ok(None),
        Err(AppError::Json(err)) => {
            warn!(target: "collection", key, error = %err, "malformed record; starting from defaults");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(err) => {
            warn!(target: "collection", key, error = %err, "unreadable record; starting from defaults");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::places::tests::sample_result;
    use crate::store::{MemoryStore, SqliteStore};

    fn manager(store: &MemoryStore) -> CollectionManager {
        CollectionManager::load(
            Arc::new(store.clone()),
            PhotoResolver::new("https://photos.test", None),
        )
        .unwrap()
    }

    fn stored_places(store: &MemoryStore) -> Vec<Place> {
        serde_json::from_value(store.snapshot(USER_PLACES_KEY).unwrap_or(json!([]))).unwrap()
    }

    fn stored_favorites(store: &MemoryStore) -> Vec<String> {
        serde_json::from_value(store.snapshot(FAVORITES_KEY).unwrap_or(json!([]))).unwrap()
    }

    #[test]
    fn starts_from_defaults_on_first_run() {
        let store = MemoryStore::new();
        let collection = manager(&store);
        assert_eq!(collection.merged_collection().count(), 30);
        assert!(collection.user_places().is_empty());
        assert!(collection.favorites().is_empty());
        assert!(!collection.has_onboarded());
        assert_eq!(collection.profile_bio(), DEFAULT_BIO);
    }

    #[test]
    fn unreadable_records_are_treated_as_absent() {
        let store = MemoryStore::new();
        store.write_json(USER_PLACES_KEY, &json!({"not": "a list"})).unwrap();
        store.write_json(FAVORITES_KEY, &json!(["f1"])).unwrap();
        let collection = manager(&store);
        assert!(collection.user_places().is_empty());
        assert_eq!(collection.favorites(), ["f1".to_string()]);
    }

    #[test]
    fn malformed_sqlite_record_does_not_block_startup() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path(), "amble.db").unwrap();
        let raw = rusqlite::Connection::open(store.path()).unwrap();
        raw.execute(
            "INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, DATETIME('now'))",
            (FAVORITES_KEY, "[\"f1\","),
        )
        .unwrap();
        drop(raw);

        let mut collection = CollectionManager::load(
            Arc::new(store),
            PhotoResolver::new("https://photos.test", None),
        )
        .unwrap();
        assert!(collection.favorites().is_empty());
        assert!(collection.toggle_favorite("c1").unwrap());

        let reopened = SqliteStore::open(dir.path(), "amble.db").unwrap();
        assert_eq!(reopened.read_json(FAVORITES_KEY).unwrap(), Some(json!(["c1"])));
    }

    #[test]
    fn selecting_new_result_stages_unsaved_preview() {
        let store = MemoryStore::new();
        let mut collection = manager(&store);
        let mut result = sample_result("ChIJnew", 55.86, -4.25);
        result.types = vec!["clothing_store".into(), "cafe".into()];
        result.photo_references = vec!["r1".into(), "r2".into(), "r3".into(), "r4".into()];

        let Selection::Preview(preview) = collection.select_search_result(&result) else {
            panic!("expected preview");
        };
        assert_eq!(preview.id, "user_ChIJnew");
        assert_eq!(preview.category, Category::Shopping);
        assert_eq!(preview.source, None);
        assert_eq!(preview.images.len(), 3);
        assert!(preview.images[0].starts_with("https://photos.test/photo?maxwidth=800&photoreference=r1"));
        assert!(!preview.priority);
        assert!(collection.user_places().is_empty());
        assert!(store.snapshot(USER_PLACES_KEY).is_none());
        assert_eq!(
            collection.pending().map(|p| p.suggested_category),
            Some(Category::Shopping)
        );
    }

    #[test]
    fn selecting_saved_result_routes_to_existing_place() {
        let store = MemoryStore::new();
        let mut collection = manager(&store);
        let result = sample_result("X", 55.86, -4.25);
        let saved = collection.confirm_add(&result, Category::Coffee).unwrap();

        let selection = collection.select_search_result(&result);
        assert_eq!(selection, Selection::Existing(saved));
        assert!(collection.pending().is_none());
        let count = collection
            .merged_collection()
            .filter(|p| p.google_place_id.as_deref() == Some("X"))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn duplicate_check_covers_curated_entries() {
        let store = MemoryStore::new();
        let mut curated = catalog::curated_places().to_vec();
        curated[0].google_place_id = Some("ChIJcurated".into());
        let mut collection = CollectionManager::with_curated(
            Arc::new(store.clone()),
            PhotoResolver::new("https://photos.test", None),
            curated,
        )
        .unwrap();

        let result = sample_result("ChIJcurated", 55.86, -4.25);
        let Selection::Existing(existing) = collection.select_search_result(&result) else {
            panic!("expected existing");
        };
        assert_eq!(existing.id, "f1");

        let confirmed = collection.confirm_add(&result, Category::Food).unwrap();
        assert_eq!(confirmed.id, "f1");
        assert!(collection.user_places().is_empty());
    }

    #[test]
    fn confirm_is_idempotent_per_external_id() {
        let store = MemoryStore::new();
        let mut collection = manager(&store);
        let result = sample_result("ChIJtwice", 55.86, -4.25);

        let first = collection.confirm_add(&result, Category::Coffee).unwrap();
        let second = collection.confirm_add(&result, Category::Food).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.source, Some(PlaceSource::User));
        assert!(first.added_at.is_some());
        assert_eq!(collection.user_places().len(), 1);
        assert_eq!(stored_places(&store).len(), 1);
    }

    #[test]
    fn confirm_flow_allows_category_override_and_cancel() {
        let store = MemoryStore::new();
        let mut collection = manager(&store);
        let result = sample_result("ChIJflow", 55.86, -4.25);

        collection.select_search_result(&result);
        assert_eq!(collection.request_add().unwrap().suggested_category, Category::Coffee);
        assert!(collection.pending().unwrap().awaiting_confirmation);
        assert!(collection.cancel_add().is_some());
        assert!(collection.confirm_pending(None).is_err());
        assert!(collection.user_places().is_empty());

        collection.select_search_result(&result);
        collection.request_add().unwrap();
        let place = collection.confirm_pending(Some(Category::Sites)).unwrap();
        assert_eq!(place.category, Category::Sites);
        assert!(collection.pending().is_none());
        assert_eq!(stored_places(&store), vec![place]);
    }

    #[test]
    fn removing_user_place_cascades_to_favorites() {
        let store = MemoryStore::new();
        let mut collection = manager(&store);
        let place = collection
            .confirm_add(&sample_result("ChIJgone", 55.86, -4.25), Category::Food)
            .unwrap();
        assert!(collection.toggle_favorite(&place.id).unwrap());
        assert!(collection.toggle_favorite("f1").unwrap());

        let removed = collection.remove_place(&place.id).unwrap();
        assert_eq!(removed.map(|p| p.id), Some(place.id.clone()));
        assert!(collection.find_by_id(&place.id).is_none());
        assert!(!collection.is_favorite(&place.id));
        assert_eq!(stored_favorites(&store), vec!["f1".to_string()]);
        assert!(stored_places(&store).is_empty());
    }

    #[test]
    fn partial_remove_failure_never_leaves_dangling_favorite() {
        let store = MemoryStore::new();
        let mut collection = manager(&store);
        let place = collection
            .confirm_add(&sample_result("ChIJhalf", 55.86, -4.25), Category::Food)
            .unwrap();
        collection.toggle_favorite(&place.id).unwrap();

        store.fail_writes_for(Some(FAVORITES_KEY));
        assert!(collection.remove_place(&place.id).is_err());
        assert!(collection.find_by_id(&place.id).is_some());
        assert!(collection.is_favorite(&place.id));
        assert_eq!(stored_places(&store), vec![place.clone()]);
        assert_eq!(stored_favorites(&store), vec![place.id.clone()]);

        store.fail_writes_for(Some(USER_PLACES_KEY));
        assert!(collection.remove_place(&place.id).is_err());
        assert!(collection.find_by_id(&place.id).is_some());
        assert!(!collection.is_favorite(&place.id));
        assert_eq!(stored_places(&store), vec![place.clone()]);
        assert!(stored_favorites(&store).is_empty());

        let reloaded = manager(&store);
        assert!(reloaded
            .favorites()
            .iter()
            .all(|id| reloaded.find_by_id(id).is_some()));

        store.fail_writes_for(None);
        assert!(collection.remove_place(&place.id).unwrap().is_some());
        assert!(stored_places(&store).is_empty());
    }

    #[test]
    fn curated_and_unknown_places_cannot_be_removed() {
        let store = MemoryStore::new();
        let mut collection = manager(&store);
        assert!(collection.remove_place("f1").unwrap().is_none());
        assert!(collection.remove_place("user_missing").unwrap().is_none());
        assert!(collection.find_by_id("f1").is_some());
        assert!(store.snapshot(USER_PLACES_KEY).is_none());
    }

    #[test]
    fn failed_write_leaves_memory_untouched() {
        let store = MemoryStore::new();
        let mut collection = manager(&store);
        store.set_fail_writes(true);

        assert!(collection.toggle_favorite("f1").is_err());
        assert!(!collection.is_favorite("f1"));
        assert!(collection
            .confirm_add(&sample_result("ChIJfail", 55.86, -4.25), Category::Food)
            .is_err());
        assert!(collection.user_places().is_empty());
        assert!(collection.set_profile_bio("quiet bookshops").is_err());
        assert!(!collection.has_onboarded());
    }

    #[test]
    fn state_survives_reload() {
        let store = MemoryStore::new();
        {
            let mut collection = manager(&store);
            collection.set_profile_bio("  vintage and coffee  ").unwrap();
            collection
                .confirm_add(&sample_result("ChIJkept", 55.86, -4.25), Category::Coffee)
                .unwrap();
            collection.toggle_favorite("c1").unwrap();
        }
        let collection = manager(&store);
        assert_eq!(collection.profile_bio(), "vintage and coffee");
        assert!(collection.has_onboarded());
        assert!(collection.find_by_external_id("ChIJkept").is_some());
        assert!(collection.is_favorite("c1"));
    }

    #[test]
    fn category_listing_puts_favorites_first_then_nearest() {
        let store = MemoryStore::new();
        let mut collection = manager(&store);
        collection.toggle_favorite("c5").unwrap();
        let anchor = catalog::HOME_BASE;

        let coffee = collection.places_in_category(Category::Coffee, anchor);
        assert_eq!(coffee.len(), 6);
        assert_eq!(coffee[0].place.id, "c5");
        assert!(coffee[0].is_favorite);
        for pair in coffee[1..].windows(2) {
            assert!(pair[0].distance_km <= pair[1].distance_km);
        }
        assert!(coffee.iter().all(|view| view.place.category == Category::Coffee));
    }

    #[test]
    fn place_serializes_with_camel_case_optional_fields() {
        let place = Place {
            google_place_id: Some("ChIJ".into()),
            source: Some(PlaceSource::User),
            ..catalog::curated_places()[0].clone()
        };
        let value = serde_json::to_value(&place).unwrap();
        assert_eq!(value["googlePlaceId"], "ChIJ");
        assert_eq!(value["source"], "user");
        assert!(value.get("addedAt").is_none());
        assert_eq!(value["category"], "Food");
    }
}
