use once_cell::sync::Lazy;

use crate::category::Category::{self, Coffee, Food, Shopping, Sites};
use crate::collection::{Place, PlaceSource};
use crate::geo::Coordinates;

/// Home base used by the "from hotel" distance mode.
pub const HOME_BASE: Coordinates = Coordinates::new(55.8606, -4.2520);

/// Stands in for the device position when a location lookup fails.
pub const FALLBACK_DEVICE_LOCATION: Coordinates = Coordinates::new(55.8600, -4.2500);

pub const DEFAULT_BIO: &str = "I love small artisan shops, finding unique vintage pieces, cozy coffee shops, and light lunches. I prefer hidden gems over tourist traps.";

pub const CITY_NAME: &str = "Glasgow";

const IMAGE_COUNT: usize = 3;

fn photo_ids(keyword: &str) -> &'static [&'static str] {
    match keyword {
        "pizza" => &["1574071318508-1cdbab80d002", "1595854341650-150651a232b5", "1513104890138-7c749659a591"],
        "burger" => &["1568901346375-23c9450c58cd", "1594212699903-ec8a3eca50f5", "1550547660-d949527245ac"],
        "pho" => &["1582878826629-29b7ad1cdc28", "1503764654157-72d979d9e6f5", "1631705663148-9a3d441c97a7"],
        "pasta" => &["1626844131082-256783844137", "1563379116110-1e50523e3295", "1608219992752-ab7927249eab"],
        "brunch" => &["1533089862017-dec9d3e66ce7", "1504754524776-0f4f3b25e7c7", "1520072959219-c595dc3f3a26"],
        "coffee" => &["1497935586351-b67a49e012bf", "1495474472287-4d71bcdd2085", "1509042239860-f550ce710b93"],
        "cafe" => &["1554118811-1e0d58224f24", "1559925393-48074b3611fa", "1501339847302-ac426a4a7cbb"],
        "shop" => &["1441986300917-64674bd600d8", "1472851294608-415522f96319", "1556228453-efd6c1ff04f6"],
        "boutique" => &["1567401893414-76b7b1e5a7a5", "1441984904996-e0b6ba687e04", "1537832816519-689ad163238b"],
        "art" => &["1545989253-02cc26577f88", "1518998053901-53069783323b", "1577720580479-7d839d829c73"],
        "park" => &["1519331379826-302206b802e7", "1498958536643-42002ca74603", "1500530858697-b50c19200eff"],
        "university" => &["1541339907-76d359097075", "1592280771199-5975681d6d8d", "1625624797672-04e284093952"],
        "lane" => &["1513635269975-5966ef6c90df", "1477959858617-67f85cf4f1df", "1596122650800-47401a58e235"],
        _ => &["1486718448742-166226480961", "1514565131-fce0801e5785", "1479839672679-a472b80d891d"],
    }
}

fn image_url(photo_id: &str) -> String {
    format!("https://images.unsplash.com/photo-{photo_id}?auto=format&fit=crop&w=800&q=80")
}

fn images(keyword: &str) -> Vec<String> {
    photo_ids(keyword)
        .iter()
        .take(IMAGE_COUNT)
        .map(|id| image_url(id))
        .collect()
}

/// Shown for user-added places whose search result carried no photos.
pub fn placeholder_image() -> String {
    image_url(photo_ids("building")[0])
}

struct Seed {
    id: &'static str,
    name: &'static str,
    category: Category,
    description: &'static str,
    address: &'static str,
    coordinates: (f64, f64),
    priority: bool,
    image: &'static str,
}

#[allow(clippy::too_many_arguments)]
const fn seed(
    id: &'static str,
    name: &'static str,
    category: Category,
    description: &'static str,
    address: &'static str,
    coordinates: (f64, f64),
    priority: bool,
    image: &'static str,
) -> Seed {
    Seed {
        id,
        name,
        category,
        description,
        address,
        coordinates,
        priority,
        image,
    }
}

const SEEDS: &[Seed] = &[
    seed("f1", "Paesano Pizza", Food, "Authentic Neapolitan pizza. Top rated in Glasgow.", "94 Miller St, Glasgow", (55.8590, -4.2510), true, "pizza"),
    seed("f2", "Fat Hippo", Food, "Messy, delicious burgers.", "86 St Vincent St, Glasgow", (55.8610, -4.2540), false, "burger"),
    seed("f3", "Pho Glasgow", Food, "Healthy Vietnamese street food.", "65 Renfield St, Glasgow", (55.8625, -4.2560), false, "pho"),
    seed("f4", "Sugo Pasta", Food, "Fresh pasta made daily. From the team behind Paesano.", "70 Mitchell St, Glasgow", (55.8585, -4.2555), false, "pasta"),
    seed("f5", "Wilson Street Pantry", Food, "Famous for Eggs Benedict and brunch.", "6 Wilson St, Glasgow", (55.8580, -4.2480), true, "brunch"),
    seed("f6", "Cafe Wander", Food, "Straight forward breakfast option.", "110 W George St, Glasgow", (55.8623, -4.2558), false, "brunch"),
    seed("f7", "The Devil's Roast", Food, "Great cafe and deli options.", "West End / Finnieston, Glasgow", (55.8655, -4.2700), false, "cafe"),
    seed("c1", "Laboratorio Espresso", Coffee, "Minimalist espresso bar with breakfast pastries.", "93 W Nile St, Glasgow", (55.8620, -4.2530), true, "coffee"),
    seed("c2", "Piece", Coffee, "Gourmet sandwiches and strong coffee.", "100 Miller St, Glasgow", (55.8592, -4.2512), false, "cafe"),
    seed("c3", "Tempus Cafe", Coffee, "Unique grab-and-go coffee in a police booth.", "64 Wilson St, Glasgow", (55.8583, -4.2486), true, "coffee"),
    seed("c4", "Riverhill Coffee", Coffee, "Quality coffee and baked goods.", "24 Gordon St, Glasgow", (55.8605, -4.2550), false, "coffee"),
    seed("c5", "Outlier Coffee", Coffee, "Great coffee, close to Modern Love Store.", "38 London Rd, Glasgow", (55.8562, -4.2435), true, "coffee"),
    seed("c6", "Spitfire Espresso", Coffee, "Great coffee spot with good breakfast options.", "127 Candleriggs, Glasgow", (55.8575, -4.2460), false, "cafe"),
    seed("s1", "Knock Nook", Shopping, "Curated gifts and homeware.", "Southside, Glasgow", (55.8300, -4.2700), false, "shop"),
    seed("s2", "This Must Be The Place", Shopping, "Unique prints and gifts.", "Glasgow", (55.8660, -4.2800), false, "art"),
    seed("s3", "Elkins", Shopping, "Clothing and lifestyle.", "Glasgow", (55.8700, -4.2900), false, "boutique"),
    seed("s4", "Papyrus", Shopping, "Beautiful stationery and gifts.", "374 Byres Rd, Glasgow", (55.8735, -4.2950), false, "shop"),
    seed("s5", "Modern Love Store", Shopping, "Design-led lifestyle store.", "Trongate, Glasgow", (55.8560, -4.2450), false, "boutique"),
    seed("s6", "Paper Plane", Shopping, "Cards, gifts, and prints.", "Shawlands, Glasgow", (55.8310, -4.2750), false, "shop"),
    seed("s7", "Ajouter", Shopping, "Lifestyle and interiors.", "Queen Margaret Drive, Glasgow", (55.8780, -4.2850), false, "shop"),
    seed("v1", "The Hidden Lane", Sites, "A cobbled lane of studios and tea rooms.", "1103 Argyle St, Glasgow", (55.8645, -4.2810), true, "lane"),
    seed("v2", "City Chambers", Sites, "Historic municipal building on George Square.", "George Square, Glasgow", (55.8610, -4.2505), false, "building"),
    seed("v3", "GoMA", Sites, "Gallery of Modern Art.", "Royal Exchange Sq, Glasgow", (55.8601, -4.2520), false, "art"),
    seed("v4", "Necropolis", Sites, "Victorian cemetery with city views.", "Castle St, Glasgow", (55.8625, -4.2330), false, "park"),
    seed("v5", "Glasgow Cathedral", Sites, "Medieval cathedral next to the Necropolis.", "Castle St, Glasgow", (55.8621, -4.2345), false, "building"),
    seed("v6", "Kelvingrove Art Gallery", Sites, "Stunning museum and gallery.", "Argyle St, Glasgow", (55.8686, -4.2905), true, "art"),
    seed("v7", "Saint Mungo Mural", Sites, "Famous street art mural.", "High St, Glasgow", (55.8602, -4.2390), true, "art"),
    seed("v8", "Ashton Lane", Sites, "Cobbled lane with bars and restaurants.", "Ashton Lane, West End", (55.8742, -4.2935), true, "lane"),
    seed("v9", "University of Glasgow", Sites, "Historic university with stunning architecture.", "University Ave, Glasgow", (55.8719, -4.2883), false, "university"),
    seed("v10", "Pollok Country Park", Sites, "Large country park in the Southside.", "2060 Pollokshaws Rd, Glasgow", (55.8300, -4.3000), false, "park"),
];

static CURATED: Lazy<Vec<Place>> = Lazy::new(|| {
    SEEDS
        .iter()
        .map(|seed| Place {
            id: seed.id.to_string(),
            name: seed.name.to_string(),
            category: seed.category,
            description: seed.description.to_string(),
            address: seed.address.to_string(),
            coordinates: Coordinates::new(seed.coordinates.0, seed.coordinates.1),
            images: images(seed.image),
            priority: seed.priority,
            source: Some(PlaceSource::Curated),
            google_place_id: None,
            added_at: None,
        })
        .collect()
});

/// The shipped reference dataset. Constant for the life of the process.
pub fn curated_places() -> &'static [Place] {
    &CURATED
}
