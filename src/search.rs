use serde::Serialize;
use tracing::debug;

use crate::category::{classify, Category};
use crate::collection::CollectionManager;
use crate::errors::SearchError;
use crate::geo::{distance_km, format_duration, Coordinates};
use crate::places::{PhotoResolver, SearchResult, DEFAULT_PHOTO_WIDTH};

/// Queries shorter than this are not sent.
pub const MIN_QUERY_CHARS: usize = 2;

/// Identifies one issued search so late responses can be recognised.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTicket {
    pub generation: u64,
    pub query: String,
    pub anchor: Coordinates,
    pub radius_meters: Option<u32>,
}

/// A search result annotated for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(flatten)]
    pub result: SearchResult,
    pub suggested_category: Category,
    pub distance_km: f64,
    pub walking_time: String,
    pub thumbnail: Option<String>,
    pub saved_place_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFailure {
    pub code: String,
    pub message: String,
}

impl From<&SearchError> for SearchFailure {
    fn from(err: &SearchError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// What the search panel currently shows.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SearchDisplay {
    #[default]
    Idle,
    Loading {
        query: String,
    },
    Results {
        query: String,
        hits: Vec<SearchHit>,
    },
    Empty {
        query: String,
    },
    Failed {
        query: String,
        error: SearchFailure,
    },
}

#[derive(Debug, Default)]
pub struct SearchSession {
    generation: u64,
    active: Option<SearchTicket>,
    last_issued: Option<SearchTicket>,
    display: SearchDisplay,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new search. Returns `None` and resets to idle when the query is too short.
    pub fn begin(
        &mut self,
        query: &str,
        anchor: Coordinates,
        radius_meters: Option<u32>,
    ) -> Option<SearchTicket> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            self.active = None;
            self.display = SearchDisplay::Idle;
            return None;
        }
        Some(self.issue(query.to_string(), anchor, radius_meters))
    }

    /// Re-issues the last search with identical query, anchor and radius.
    pub fn retry_last(&mut self) -> Option<SearchTicket> {
        let last = self.last_issued.clone()?;
        Some(self.issue(last.query, last.anchor, last.radius_meters))
    }

    fn issue(
        &mut self,
        query: String,
        anchor: Coordinates,
        radius_meters: Option<u32>,
    ) -> SearchTicket {
        self.generation += 1;
        let ticket = SearchTicket {
            generation: self.generation,
            query,
            anchor,
            radius_meters,
        };
        self.display = SearchDisplay::Loading {
            query: ticket.query.clone(),
        };
        self.active = Some(ticket.clone());
        self.last_issued = Some(ticket.clone());
        ticket
    }

    pub fn is_current(&self, ticket: &SearchTicket) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.generation == ticket.generation && active.query == ticket.query)
    }

    /// Applies a finished search unless a newer one has been issued since. Returns whether it was applied.
    pub fn apply(
        &mut self,
        ticket: &SearchTicket,
        outcome: Result<Vec<SearchHit>, SearchError>,
    ) -> bool {
        if !self.is_current(ticket) {
            debug!(
                target: "places_search",
                query = %ticket.query,
                generation = ticket.generation,
                "discarding stale search response"
            );
            return false;
        }
        let query = ticket.query.clone();
        self.display = match outcome {
            Ok(hits) if hits.is_empty() => SearchDisplay::Empty { query },
            Ok(hits) => SearchDisplay::Results { query, hits },
            Err(err) => SearchDisplay::Failed {
                query,
                error: SearchFailure::from(&err),
            },
        };
        self.active = None;
        true
    }

    pub fn display(&self) -> &SearchDisplay {
        &self.display
    }

    pub fn hits(&self) -> &[SearchHit] {
        match &self.display {
            SearchDisplay::Results { hits, .. } => hits,
            _ => &[],
        }
    }

    pub fn find_result(&self, external_id: &str) -> Option<&SearchResult> {
        self.hits()
            .iter()
            .map(|hit| &hit.result)
            .find(|result| result.external_id == external_id)
    }

    pub fn clear(&mut self) {
        self.active = None;
        self.display = SearchDisplay::Idle;
    }
}

pub fn annotate(
    results: Vec<SearchResult>,
    anchor: Coordinates,
    collection: &CollectionManager,
    photos: &PhotoResolver,
) -> Vec<SearchHit> {
    results
        .into_iter()
        .map(|result| {
            let distance = distance_km(anchor, result.coordinates);
            SearchHit {
                suggested_category: classify(&result.types),
                distance_km: distance,
                walking_time: format_duration(distance),
                thumbnail: result
                    .photo_references
                    .first()
                    .map(|reference| photos.url(reference, DEFAULT_PHOTO_WIDTH)),
                saved_place_id: collection
                    .find_by_external_id(&result.external_id)
                    .map(|place| place.id.clone()),
                result,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::category::Category;
    use crate::places::tests::sample_result;
    use crate::store::MemoryStore;

    fn anchor() -> Coordinates {
        Coordinates::new(55.8606, -4.2520)
    }

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            result: sample_result(id, 55.86, -4.25),
            suggested_category: Category::Coffee,
            distance_km: 0.1,
            walking_time: "2 min walk".into(),
            thumbnail: None,
            saved_place_id: None,
        }
    }

    #[test]
    fn short_queries_are_not_issued() {
        let mut session = SearchSession::new();
        assert!(session.begin("  a ", anchor(), None).is_none());
        assert!(matches!(session.display(), SearchDisplay::Idle));
        assert!(session.retry_last().is_none());

        let ticket = session.begin(" pi ", anchor(), None).unwrap();
        assert_eq!(ticket.query, "pi");
        assert!(matches!(session.display(), SearchDisplay::Loading { query } if query == "pi"));
    }

    #[test]
    fn stale_responses_do_not_overwrite_newer_query() {
        let mut session = SearchSession::new();
        let coffee = session.begin("coffee", anchor(), None).unwrap();
        let pizza = session.begin("pizza", anchor(), None).unwrap();

        assert!(session.apply(&pizza, Ok(vec![hit("p1")])));
        assert!(!session.apply(&coffee, Ok(vec![hit("c1")])));

        match session.display() {
            SearchDisplay::Results { query, hits } => {
                assert_eq!(query, "pizza");
                assert_eq!(hits[0].result.external_id, "p1");
            }
            other => panic!("unexpected display: {other:?}"),
        }
    }

    #[test]
    fn same_query_reissued_still_discards_older_generation() {
        let mut session = SearchSession::new();
        let first = session.begin("coffee", anchor(), None).unwrap();
        let second = session.begin("coffee", anchor(), None).unwrap();
        assert!(!session.apply(&first, Err(SearchError::Offline)));
        assert!(session.apply(&second, Ok(Vec::new())));
        assert!(matches!(session.display(), SearchDisplay::Empty { query } if query == "coffee"));
    }

    #[test]
    fn failure_is_displayed_and_retry_reuses_parameters() {
        let mut session = SearchSession::new();
        let ticket = session.begin("bookshop", anchor(), Some(1200)).unwrap();
        session.apply(&ticket, Err(SearchError::QuotaExceeded));
        match session.display() {
            SearchDisplay::Failed { error, .. } => {
                assert_eq!(error.code, "OVER_QUERY_LIMIT");
                assert_eq!(error.message, "Too many searches. Please try again in a few minutes.");
            }
            other => panic!("unexpected display: {other:?}"),
        }

        let retry = session.retry_last().unwrap();
        assert_eq!(retry.query, "bookshop");
        assert_eq!(retry.anchor, anchor());
        assert_eq!(retry.radius_meters, Some(1200));
        assert!(retry.generation > ticket.generation);
    }

    #[test]
    fn annotation_marks_saved_results_and_resolves_thumbnail() {
        let store = MemoryStore::new();
        let photos = PhotoResolver::new("https://photos.test", None);
        let mut collection =
            crate::collection::CollectionManager::load(Arc::new(store), photos.clone()).unwrap();
        let saved = sample_result("saved", 55.87, -4.26);
        collection.confirm_add(&saved, Category::Food).unwrap();

        let mut fresh = sample_result("fresh", 55.8606, -4.2520);
        fresh.types = vec!["museum".into()];
        fresh.photo_references = vec!["ref1".into(), "ref2".into()];

        let hits = annotate(vec![saved, fresh], anchor(), &collection, &photos);
        assert_eq!(hits[0].saved_place_id.as_deref(), Some("user_saved"));
        assert_eq!(hits[0].suggested_category, Category::Coffee);
        assert!(hits[0].thumbnail.is_none());
        assert_eq!(hits[1].saved_place_id, None);
        assert_eq!(hits[1].suggested_category, Category::Sites);
        assert_eq!(hits[1].distance_km, 0.0);
        assert_eq!(hits[1].walking_time, "0 min walk");
        assert_eq!(
            hits[1].thumbnail.as_deref(),
            Some("https://photos.test/photo?maxwidth=400&photoreference=ref1")
        );
    }

    #[test]
    fn display_serializes_with_state_tag() {
        let value = serde_json::to_value(SearchDisplay::Empty { query: "x".into() }).unwrap();
        assert_eq!(value["state"], "empty");
        assert_eq!(value["query"], "x");
    }
}
