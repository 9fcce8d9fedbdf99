use secrecy::SecretString;
use serde::Serialize;

use crate::category::Category;
use crate::collection::{Place, PlaceView, Selection};
use crate::config::PublicAppConfig;
use crate::errors::AppError;
use crate::geo::{Coordinates, DistanceMode};
use crate::search::SearchDisplay;
use crate::{AppState, ConciergeReply};

/// Error shape handed to a presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<AppError> for CommandError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Search(search) => Self {
                code: search.code().to_string(),
                message: search.to_string(),
                retryable: search.is_retryable(),
            },
            AppError::InvalidInput(message) => Self {
                code: "INVALID_INPUT".into(),
                message,
                retryable: false,
            },
            AppError::Config(message) => Self {
                code: "CONFIG".into(),
                message,
                retryable: false,
            },
            // Request URLs carry the API key as a query parameter.
            AppError::Http(err) => Self {
                code: "NETWORK".into(),
                message: err.without_url().to_string(),
                retryable: true,
            },
            other => Self {
                code: "INTERNAL".into(),
                message: other.to_string(),
                retryable: false,
            },
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePayload {
    pub bio: String,
    pub has_onboarded: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum SelectionPayload {
    /// The hit is already saved; open its detail instead.
    Existing { place: Place },
    Preview { place: Place, suggested_category: Category },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPayload {
    pub suggested_category: Category,
    pub choices: [Category; 4],
    pub preview: Place,
}

pub async fn get_profile(state: &AppState) -> CommandResult<ProfilePayload> {
    Ok(ProfilePayload {
        bio: state.profile_bio(),
        has_onboarded: state.has_onboarded(),
    })
}

pub async fn save_profile(state: &AppState, bio: String) -> CommandResult<ProfilePayload> {
    state.set_profile_bio(&bio)?;
    get_profile(state).await
}

pub async fn browse_category(
    state: &AppState,
    category: String,
    mode: DistanceMode,
    device: Option<Coordinates>,
) -> CommandResult<Vec<PlaceView>> {
    let category = Category::parse(&category)?;
    Ok(state.places_in_category(category, state.anchor(mode, device)))
}

pub async fn list_favorites(
    state: &AppState,
    mode: DistanceMode,
    device: Option<Coordinates>,
) -> CommandResult<Vec<PlaceView>> {
    Ok(state.favorite_places(state.anchor(mode, device)))
}

pub async fn toggle_favorite(state: &AppState, place_id: String) -> CommandResult<bool> {
    Ok(state.toggle_favorite(&place_id)?)
}

pub async fn remove_place(state: &AppState, place_id: String) -> CommandResult<Option<Place>> {
    Ok(state.remove_place(&place_id)?)
}

pub async fn search_places(
    state: &AppState,
    query: String,
    mode: DistanceMode,
    device: Option<Coordinates>,
    radius_meters: Option<u32>,
) -> CommandResult<SearchDisplay> {
    let anchor = state.anchor(mode, device);
    Ok(state.search_places(&query, anchor, radius_meters).await)
}

pub async fn retry_search(state: &AppState) -> CommandResult<SearchDisplay> {
    Ok(state.retry_last_search().await?)
}

pub async fn select_search_result(
    state: &AppState,
    external_id: String,
) -> CommandResult<SelectionPayload> {
    Ok(match state.select_search_result(&external_id)? {
        Selection::Existing(place) => SelectionPayload::Existing { place },
        Selection::Preview(place) => SelectionPayload::Preview {
            suggested_category: place.category,
            place,
        },
    })
}

pub async fn request_add(state: &AppState) -> CommandResult<ConfirmPayload> {
    let pending = state.request_add()?;
    Ok(ConfirmPayload {
        suggested_category: pending.suggested_category,
        choices: Category::ALL,
        preview: pending.preview,
    })
}

pub async fn cancel_add(state: &AppState) -> CommandResult<()> {
    state.cancel_add();
    Ok(())
}

pub async fn confirm_add(state: &AppState, category: Option<String>) -> CommandResult<Place> {
    let category = category.as_deref().map(Category::parse).transpose()?;
    Ok(state.confirm_add(category)?)
}

pub async fn vibe_check(state: &AppState, place_id: String) -> CommandResult<String> {
    Ok(state.vibe_check(&place_id).await?)
}

pub async fn ask_concierge(
    state: &AppState,
    question: String,
    selected_place_id: Option<String>,
    device: Option<Coordinates>,
) -> CommandResult<ConciergeReply> {
    Ok(state
        .ask_concierge(&question, selected_place_id.as_deref(), device)
        .await?)
}

pub async fn app_config(state: &AppState) -> CommandResult<PublicAppConfig> {
    Ok(state.public_config())
}

pub async fn set_api_key(state: &AppState, account: String, value: String) -> CommandResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CommandError::from(AppError::InvalidInput(
            "api key cannot be empty".into(),
        )));
    }
    let secret = SecretString::new(value.to_string().into_boxed_str());
    Ok(state.store_api_key(&account, secret)?)
}

pub async fn clear_api_key(state: &AppState, account: String) -> CommandResult<()> {
    Ok(state.clear_api_key(&account)?)
}
