use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::ai::{LanguageModel, Prompt};
use crate::geo::{distance_km, Coordinates};
use crate::places::SearchResult;

const MAX_TYPES_IN_PROMPT: usize = 5;

/// Why an AI ranking was discarded. Always recovered by the distance fallback.
#[derive(Debug, Error)]
enum RankingFailure {
    #[error("ranking request failed: {0}")]
    Model(String),
    #[error("response contained no JSON array")]
    NoArray,
    #[error("response named none of the candidates")]
    NoKnownIds,
}

#[derive(Clone)]
pub struct RelevanceRanker {
    model: Arc<dyn LanguageModel>,
}

impl RelevanceRanker {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Orders candidate external ids by relevance. The output is always a
    /// permutation of the input ids.
    pub async fn rank(
        &self,
        query: &str,
        profile: &str,
        anchor: Coordinates,
        candidates: &[SearchResult],
    ) -> Vec<String> {
        if candidates.len() <= 1 {
            return candidates.iter().map(|c| c.external_id.clone()).collect();
        }

        match self.rank_with_model(query, profile, anchor, candidates).await {
            Ok(order) => {
                debug!(target: "relevance_ranker", query, "applied model ranking");
                order
            }
            Err(failure) => {
                warn!(
                    target: "relevance_ranker",
                    query,
                    reason = %failure,
                    "falling back to distance ranking"
                );
                rank_by_distance(anchor, candidates)
            }
        }
    }

    async fn rank_with_model(
        &self,
        query: &str,
        profile: &str,
        anchor: Coordinates,
        candidates: &[SearchResult],
    ) -> Result<Vec<String>, RankingFailure> {
        let prompt = build_prompt(query, profile, anchor, candidates);
        let response = self
            .model
            .generate(&Prompt::new(prompt))
            .await
            .map_err(|err| RankingFailure::Model(err.to_string()))?;
        parse_ranking(&response, candidates)
    }
}

/// Ascending distance from `anchor`; ties keep input order.
pub fn rank_by_distance(anchor: Coordinates, candidates: &[SearchResult]) -> Vec<String> {
    let mut scored: Vec<(f64, &SearchResult)> = candidates
        .iter()
        .map(|c| (distance_km(anchor, c.coordinates), c))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored
        .into_iter()
        .map(|(_, c)| c.external_id.clone())
        .collect()
}

/// Rearranges `results` to follow `order`; results missing from `order` keep their relative place at the end.
pub fn reorder(results: Vec<SearchResult>, order: &[String]) -> Vec<SearchResult> {
    let mut remaining: Vec<Option<SearchResult>> = results.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(remaining.len());
    for id in order {
        if let Some(slot) = remaining
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|r| &r.external_id == id))
        {
            ordered.extend(slot.take());
        }
    }
    ordered.extend(remaining.into_iter().flatten());
    ordered
}

fn build_prompt(
    query: &str,
    profile: &str,
    anchor: Coordinates,
    candidates: &[SearchResult],
) -> String {
    let mut listing = String::new();
    for candidate in candidates {
        let types = candidate
            .types
            .iter()
            .take(MAX_TYPES_IN_PROMPT)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let rating = candidate
            .rating
            .map(|r| format!("{r:.1}"))
            .unwrap_or_else(|| "n/a".into());
        let reviews = candidate
            .user_ratings_total
            .map(|n| n.to_string())
            .unwrap_or_else(|| "0".into());
        let _ = writeln!(
            listing,
            "- id: {} | name: {} | address: {} | types: {} | rating: {} ({} reviews) | distance: {:.2} km",
            candidate.external_id,
            candidate.name,
            candidate.formatted_address,
            types,
            rating,
            reviews,
            distance_km(anchor, candidate.coordinates),
        );
    }

    format!(
        r#"You are ranking place search results for a traveller.

Search query: "{query}"
Traveller profile: "{profile}"

Candidates:
{listing}
Rank every candidate from most to least relevant. Weigh, in this order of priority:
1. How well the name matches the search query.
2. How well the place fits the traveller's stated preferences.
3. Proximity (shorter distance is better).
4. Rating and number of reviews.

Respond with ONLY a JSON array of the candidate ids in ranked order, for example ["id1","id2"]. No other text."#
    )
}

fn parse_ranking(
    response: &str,
    candidates: &[SearchResult],
) -> Result<Vec<String>, RankingFailure> {
    let values = extract_array(response).ok_or(RankingFailure::NoArray)?;

    let known: HashSet<&str> = candidates.iter().map(|c| c.external_id.as_str()).collect();
    let mut seen = HashSet::new();
    let mut order: Vec<String> = values
        .iter()
        .filter_map(|value| value.as_str())
        .filter(|id| known.contains(id) && seen.insert(id.to_string()))
        .map(str::to_string)
        .collect();
    if order.is_empty() {
        return Err(RankingFailure::NoKnownIds);
    }

    for candidate in candidates {
        if !seen.contains(&candidate.external_id) {
            order.push(candidate.external_id.clone());
        }
    }
    Ok(order)
}

/// Strict parse first, then the first bracketed substring that parses as a JSON array.
fn extract_array(text: &str) -> Option<Vec<serde_json::Value>> {
    if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(text.trim()) {
        return Some(values);
    }
    for (start, _) in text.match_indices('[') {
        for (offset, _) in text[start..].match_indices(']') {
            let candidate = &text[start..start + offset + 1];
            if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(candidate) {
                return Some(values);
            }
        }
    }
    None
}
