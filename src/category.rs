use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Food,
    Coffee,
    Shopping,
    Sites,
}

pub const DEFAULT_CATEGORY: Category = Category::Sites;

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Food,
        Category::Coffee,
        Category::Shopping,
        Category::Sites,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Coffee => "Coffee",
            Category::Shopping => "Shopping",
            Category::Sites => "Sites",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "food" => Ok(Category::Food),
            "coffee" => Ok(Category::Coffee),
            "shopping" => Ok(Category::Shopping),
            "sites" => Ok(Category::Sites),
            _ => Err(AppError::InvalidInput(format!("unknown category: {value}"))),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn category_for_tag(tag: &str) -> Option<Category> {
    let category = match tag {
        "restaurant" | "meal_delivery" | "meal_takeaway" | "food" | "bakery" | "bar" => {
            Category::Food
        }
        "cafe" | "coffee" => Category::Coffee,
        "store" | "shopping_mall" | "clothing_store" | "book_store" | "jewelry_store"
        | "shoe_store" | "home_goods_store" | "furniture_store" | "gift_shop" => {
            Category::Shopping
        }
        "tourist_attraction" | "museum" | "art_gallery" | "park" | "church" | "synagogue"
        | "mosque" | "landmark" | "point_of_interest" => Category::Sites,
        _ => return None,
    };
    Some(category)
}

/// Category of the first tag with a known mapping, scanning in provider order.
pub fn classify<S: AsRef<str>>(tags: &[S]) -> Category {
    tags.iter()
        .find_map(|tag| category_for_tag(tag.as_ref()))
        .unwrap_or(DEFAULT_CATEGORY)
}
