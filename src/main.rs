use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use amble_lib::commands::{self, CommandError};
use amble_lib::{
    AppState, Coordinates, DeviceFix, DistanceMode, SearchDisplay, AI_KEY_ALIAS, PLACES_KEY_ALIAS,
};

/// Glasgow place discovery from the terminal. Every command prints JSON.
#[derive(Debug, Parser)]
#[command(name = "amble", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the profile bio, or replace it with --set.
    Profile {
        #[arg(long)]
        set: Option<String>,
    },
    /// List one category (food, coffee, shopping, sites).
    Browse {
        category: String,
        #[command(flatten)]
        location: LocationArgs,
    },
    Favorites {
        #[command(flatten)]
        location: LocationArgs,
    },
    Search {
        query: String,
        #[arg(long)]
        radius: Option<u32>,
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Search, pick a hit and save it to the collection.
    Add {
        query: String,
        /// 1-based position of the hit to save.
        #[arg(long, default_value_t = 1)]
        pick: usize,
        /// Overrides the suggested category.
        #[arg(long)]
        category: Option<String>,
        #[command(flatten)]
        location: LocationArgs,
    },
    Remove {
        id: String,
    },
    /// Toggle a place in or out of the favorites.
    Favorite {
        id: String,
    },
    Vibe {
        id: String,
    },
    /// Ask the concierge for recommendations.
    Ask {
        question: String,
        /// Id of the place being viewed.
        #[arg(long)]
        near: Option<String>,
        #[command(flatten)]
        location: LocationArgs,
    },
    Config,
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Debug, Subcommand)]
enum KeyAction {
    Set { account: KeyAccount, value: String },
    Clear { account: KeyAccount },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KeyAccount {
    Places,
    Ai,
}

impl KeyAccount {
    fn alias(self) -> &'static str {
        match self {
            KeyAccount::Places => PLACES_KEY_ALIAS,
            KeyAccount::Ai => AI_KEY_ALIAS,
        }
    }
}

#[derive(Debug, Args)]
struct LocationArgs {
    /// Measure distances from the hotel instead of the device.
    #[arg(long)]
    from_hotel: bool,
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,
    /// The device lookup failed; measure from the city-centre fallback.
    #[arg(long, conflicts_with = "lat")]
    fix_failed: bool,
}

impl LocationArgs {
    fn mode(&self) -> DistanceMode {
        if self.from_hotel {
            DistanceMode::FromHotel
        } else {
            DistanceMode::FromMe
        }
    }

    fn fix(&self) -> DeviceFix {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => DeviceFix::Located(Coordinates::new(lat, lng)),
            _ if self.fix_failed => DeviceFix::Failed,
            _ => DeviceFix::Unavailable,
        }
    }

    fn device(&self, state: &AppState) -> Option<Coordinates> {
        state.device_location(self.fix())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn command_failure(err: CommandError) -> anyhow::Error {
    anyhow!("{} ({})", err.message, err.code)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let state = AppState::initialize().context("failed to initialise amble")?;
    run(&state, cli.command).await
}

async fn run(state: &AppState, command: Command) -> Result<()> {
    match command {
        Command::Profile { set } => {
            let profile = match set {
                Some(bio) => commands::save_profile(state, bio).await,
                None => commands::get_profile(state).await,
            }
            .map_err(command_failure)?;
            print_json(&profile)
        }
        Command::Browse { category, location } => {
            let places = commands::browse_category(state, category, location.mode(), location.device(state))
                .await
                .map_err(command_failure)?;
            print_json(&places)
        }
        Command::Favorites { location } => {
            let places = commands::list_favorites(state, location.mode(), location.device(state))
                .await
                .map_err(command_failure)?;
            print_json(&places)
        }
        Command::Search { query, radius, location } => {
            let display = commands::search_places(state, query, location.mode(), location.device(state), radius)
                .await
                .map_err(command_failure)?;
            print_json(&display)
        }
        Command::Add {
            query,
            pick,
            category,
            location,
        } => {
            let display = commands::search_places(state, query, location.mode(), location.device(state), None)
                .await
                .map_err(command_failure)?;
            let SearchDisplay::Results { hits, .. } = &display else {
                print_json(&display)?;
                return Err(anyhow!("search returned nothing to add"));
            };
            let hit = pick
                .checked_sub(1)
                .and_then(|index| hits.get(index))
                .ok_or_else(|| anyhow!("--pick must be between 1 and {}", hits.len()))?;

            let selection = commands::select_search_result(state, hit.result.external_id.clone())
                .await
                .map_err(command_failure)?;
            if let commands::SelectionPayload::Existing { .. } = selection {
                return print_json(&selection);
            }
            commands::request_add(state).await.map_err(command_failure)?;
            let place = commands::confirm_add(state, category)
                .await
                .map_err(command_failure)?;
            print_json(&place)
        }
        Command::Remove { id } => {
            let removed = commands::remove_place(state, id).await.map_err(command_failure)?;
            print_json(&removed)
        }
        Command::Favorite { id } => {
            let favorite = commands::toggle_favorite(state, id).await.map_err(command_failure)?;
            print_json(&serde_json::json!({ "favorite": favorite }))
        }
        Command::Vibe { id } => {
            let vibe = commands::vibe_check(state, id).await.map_err(command_failure)?;
            print_json(&serde_json::json!({ "vibe": vibe }))
        }
        Command::Ask {
            question,
            near,
            location,
        } => {
            let reply = commands::ask_concierge(state, question, near, location.device(state))
                .await
                .map_err(command_failure)?;
            print_json(&reply)
        }
        Command::Config => {
            let config = commands::app_config(state).await.map_err(command_failure)?;
            print_json(&config)
        }
        Command::Key { action } => match action {
            KeyAction::Set { account, value } => {
                commands::set_api_key(state, account.alias().to_string(), value)
                    .await
                    .map_err(command_failure)?;
                print_json(&serde_json::json!({ "stored": account.alias() }))
            }
            KeyAction::Clear { account } => {
                commands::clear_api_key(state, account.alias().to_string())
                    .await
                    .map_err(command_failure)?;
                print_json(&serde_json::json!({ "cleared": account.alias() }))
            }
        },
    }
}
