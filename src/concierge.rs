use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::ai::{LanguageModel, Prompt};
use crate::catalog::CITY_NAME;
use crate::collection::Place;
use crate::geo::Coordinates;

const EMPTY_VIBE: &str = "This spot is a local favorite.";
const EMPTY_RECOMMENDATION: &str =
    "I couldn't find anything specific, but exploring nearby is always fun!";
const CONCIERGE_UNAVAILABLE: &str =
    "I'm having trouble connecting to the concierge service right now. Please try again.";

static MENTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*\*\[(KNOWN|NEW): (.+?)\]\*\*").expect("mention pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionKind {
    Known,
    New,
}

/// A place marker found in a concierge reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    pub kind: MentionKind,
    pub name: String,
}

/// Free-text AI helpers. Failures degrade to fixed copy and never error.
#[derive(Clone)]
pub struct Concierge {
    model: Arc<dyn LanguageModel>,
}

impl Concierge {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Two-sentence blurb on why this traveller would like `place`.
    pub async fn vibe_check(&self, place: &Place, bio: &str) -> String {
        let prompt = format!(
            r#"The user is looking at a place named "{name}" which is a {category}.
User's Bio/Interests: "{bio}".

Task: Describe this place in 2 short sentences.
Focus on WHY this specific user would like it based on their bio.
Do not be generic. Be decisive and personal.
Current available data about place: {description}."#,
            name = place.name,
            category = place.category,
            description = place.description,
        );

        match self.model.generate(&Prompt::new(prompt)).await {
            Ok(text) if text.trim().is_empty() => EMPTY_VIBE.to_string(),
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!(target: "concierge", place = %place.id, error = %err, "vibe check failed");
                format!("A popular {} spot in {CITY_NAME}.", place.category)
            }
        }
    }

    /// Answers a free-form question, tagging suggestions with `**[KNOWN: ]**` / `**[NEW: ]**`.
    pub async fn explore_recommendations(
        &self,
        question: &str,
        bio: &str,
        known_places: &[&Place],
        context: &str,
    ) -> String {
        let prompt = Prompt::new(question).with_system(system_instruction(bio, known_places, context));
        match self.model.generate(&prompt).await {
            Ok(text) if text.trim().is_empty() => EMPTY_RECOMMENDATION.to_string(),
            Ok(text) => text,
            Err(err) => {
                warn!(target: "concierge", error = %err, "concierge request failed");
                CONCIERGE_UNAVAILABLE.to_string()
            }
        }
    }
}

fn system_instruction(bio: &str, known_places: &[&Place], context: &str) -> String {
    let known = known_places
        .iter()
        .map(|place| format!("- {} (ID: {})", place.name, place.id))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are Amble, a context-aware travel concierge for a solo female traveler in {CITY_NAME}.

User Bio: "{bio}"
User's Current Context: {context}

The user has a curated list of "Known" places saved in the app:
{known}

Rules for your response:
1. Be concise, friendly, and safe.
2. If you recommend a place that is in the "Known" list above, you MUST explicitly mention that it is already on her list.
   Format known places like this: **[KNOWN: Place Name]**.
3. If you recommend a place NOT on the list, treat it as a new discovery.
   Format new places like this: **[NEW: Place Name]**.
4. Provide 2-3 recommendations maximum.
5. Prioritize safety and the user's bio interests (Artisan, hidden gems, etc)."#
    )
}

/// Where the traveller currently is, as the concierge is told.
pub fn context_description(selected: Option<&Place>, device: Option<Coordinates>) -> String {
    match (selected, device) {
        (Some(place), _) => format!("Near {} ({})", place.name, place.category),
        (None, Some(at)) => format!("Lat: {}, Lng: {}", at.lat, at.lng),
        (None, None) => format!("Central {CITY_NAME}"),
    }
}

pub fn extract_mentions(text: &str) -> Vec<Mention> {
    MENTION_PATTERN
        .captures_iter(text)
        .map(|caps| Mention {
            kind: if &caps[1] == "KNOWN" {
                MentionKind::Known
            } else {
                MentionKind::New
            },
            name: caps[2].to_string(),
        })
        .collect()
}
