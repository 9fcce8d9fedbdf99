use std::path::PathBuf;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::secrets::SecretVault;

pub const PLACES_KEY_ALIAS: &str = "google-places-api-key";
pub const AI_KEY_ALIAS: &str = "google-ai-api-key";

const DEFAULT_PLACES_API_BASE: &str = "https://maps.googleapis.com/maps/api/place";
const DEFAULT_AI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_AI_MODEL: &str = "gemini-1.5-flash";
const MAX_CACHE_TTL_SECS: i64 = 86_400;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub google_places_api_key: Option<SecretString>,
    pub google_ai_api_key: Option<SecretString>,
    pub places_api_base: String,
    pub places_region: String,
    pub ai_api_base: String,
    pub ai_model: String,
    pub search_radius_meters: u32,
    pub search_timeout_ms: u64,
    pub search_retry_base_ms: u64,
    pub search_cache_ttl_secs: i64,
    pub search_cache_capacity: usize,
    pub database_file_name: String,
    pub data_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAppConfig {
    pub places_api_base: String,
    pub places_region: String,
    pub ai_api_base: String,
    pub ai_model: String,
    pub search_radius_meters: u32,
    pub search_timeout_ms: u64,
    pub search_retry_base_ms: u64,
    pub search_cache_ttl_secs: i64,
    pub search_cache_capacity: usize,
    pub database_file_name: String,
    pub has_google_places_key: bool,
    pub has_google_ai_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            google_places_api_key: parse_secret("GOOGLE_PLACES_API_KEY"),
            google_ai_api_key: parse_secret("GOOGLE_AI_API_KEY"),
            places_api_base: parse_string("PLACES_API_BASE", DEFAULT_PLACES_API_BASE),
            places_region: parse_string("PLACES_REGION", "uk"),
            ai_api_base: parse_string("AI_API_BASE", DEFAULT_AI_API_BASE),
            ai_model: parse_string("AI_MODEL", DEFAULT_AI_MODEL),
            search_radius_meters: parse_u32("SEARCH_RADIUS_METERS", 5_000).max(1),
            search_timeout_ms: parse_u64("SEARCH_TIMEOUT_MS", 10_000).max(1),
            search_retry_base_ms: parse_u64("SEARCH_RETRY_BASE_MS", 1_000),
            search_cache_ttl_secs: parse_i64("SEARCH_CACHE_TTL_SECS", 300).clamp(1, MAX_CACHE_TTL_SECS),
            search_cache_capacity: parse_usize("SEARCH_CACHE_CAPACITY", 64).max(1),
            database_file_name: parse_string("DATABASE_FILE_NAME", "amble.db"),
            data_dir: env::var("AMBLE_DATA_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Fills API keys missing from the environment with keychain entries.
    pub fn with_vault_fallback(mut self, vault: &SecretVault) -> Self {
        if self.google_places_api_key.is_none() {
            self.google_places_api_key = lookup_vault(vault, PLACES_KEY_ALIAS);
        }
        if self.google_ai_api_key.is_none() {
            self.google_ai_api_key = lookup_vault(vault, AI_KEY_ALIAS);
        }
        self
    }

    pub fn resolve_data_dir(&self) -> AppResult<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("amble"))
            .ok_or_else(|| AppError::Path("no platform data directory".into()))
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            places_api_base: self.places_api_base.clone(),
            places_region: self.places_region.clone(),
            ai_api_base: self.ai_api_base.clone(),
            ai_model: self.ai_model.clone(),
            search_radius_meters: self.search_radius_meters,
            search_timeout_ms: self.search_timeout_ms,
            search_retry_base_ms: self.search_retry_base_ms,
            search_cache_ttl_secs: self.search_cache_ttl_secs,
            search_cache_capacity: self.search_cache_capacity,
            database_file_name: self.database_file_name.clone(),
            has_google_places_key: self.google_places_api_key.is_some(),
            has_google_ai_key: self.google_ai_api_key.is_some(),
        }
    }
}

fn lookup_vault(vault: &SecretVault, account: &str) -> Option<SecretString> {
    match vault.get(account) {
        Ok(secret) => secret,
        Err(err) => {
            warn!(target: "config", account, error = %err, "keychain unavailable; continuing without key");
            None
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_secret(key: &str) -> Option<SecretString> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| SecretString::new(v.into_boxed_str()))
}

fn parse_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}
