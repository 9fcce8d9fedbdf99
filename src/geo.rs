use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;
const WALKING_MINUTES_PER_KM: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Which coordinate distances are measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistanceMode {
    #[default]
    FromMe,
    FromHotel,
}

/// Outcome of asking the platform for the device position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceFix {
    /// No position source was consulted.
    Unavailable,
    /// A lookup was attempted and failed.
    Failed,
    Located(Coordinates),
}

impl DeviceFix {
    /// The device position, with `fallback` standing in for a failed lookup.
    pub fn position(self, fallback: Coordinates) -> Option<Coordinates> {
        match self {
            DeviceFix::Unavailable => None,
            DeviceFix::Failed => Some(fallback),
            DeviceFix::Located(position) => Some(position),
        }
    }
}

/// Resolves the anchor location. `FromMe` uses the device position when known.
pub fn anchor_for(
    mode: DistanceMode,
    device: Option<Coordinates>,
    home_base: Coordinates,
) -> Coordinates {
    match mode {
        DistanceMode::FromMe => device.unwrap_or(home_base),
        DistanceMode::FromHotel => home_base,
    }
}

/// Great-circle distance in kilometres (Haversine).
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Walking time at 5 km/h, rounded up to the next whole minute.
pub fn walking_minutes(km: f64) -> u32 {
    (km * WALKING_MINUTES_PER_KM).ceil().max(0.0) as u32
}

pub fn format_duration(km: f64) -> String {
    let mins = walking_minutes(km);
    if mins > 60 {
        format!("{} hr {} min", mins / 60, mins % 60)
    } else {
        format!("{mins} min walk")
    }
}
