//! Category catalog
//!
//! The configuration panel offers the site's published categories for
//! selection. Fetching is best-effort; when it fails the panel falls back to
//! a built-in seed list instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Public category listing of the target site.
pub const CATALOG_URL: &str = "https://kick.com/api/v2/categories";

/// Most results a search returns.
pub const SEARCH_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected catalog shape")]
    UnexpectedShape,
}

/// One published category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub viewers: u64,
    #[serde(default)]
    pub streamers: u64,
}

impl Category {
    fn seed(id: u64, name: &str, slug: &str, viewers: u64, streamers: u64) -> Self {
        Self {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            viewers,
            streamers,
        }
    }
}

/// Well-known categories used when the catalog cannot be fetched.
pub fn fallback_categories() -> Vec<Category> {
    vec![
        Category::seed(1, "Just Chatting", "just-chatting", 50000, 1000),
        Category::seed(2, "Slots", "slots", 30000, 500),
        Category::seed(3, "League of Legends", "league-of-legends", 25000, 400),
        Category::seed(4, "VALORANT", "valorant", 20000, 300),
        Category::seed(5, "Counter-Strike 2", "counter-strike-2", 15000, 250),
        Category::seed(6, "Grand Theft Auto V", "grand-theft-auto-v", 12000, 200),
        Category::seed(7, "Minecraft", "minecraft", 10000, 150),
        Category::seed(8, "Fortnite", "fortnite", 8000, 120),
        Category::seed(9, "World of Warcraft", "world-of-warcraft", 7000, 100),
        Category::seed(10, "Apex Legends", "apex-legends", 6000, 80),
    ]
}

/// Parse a catalog response, most watched first.
///
/// Accepts a bare array or an object wrapping it in `data`. Entries that do
/// not look like categories are skipped.
pub fn parse_catalog(json: &str) -> Result<Vec<Category>, CatalogError> {
    let value: Value = serde_json::from_str(json)?;
    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items,
            _ => return Err(CatalogError::UnexpectedShape),
        },
        _ => return Err(CatalogError::UnexpectedShape),
    };

    let mut categories: Vec<Category> = items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect();
    categories.sort_by(|a, b| b.viewers.cmp(&a.viewers));
    Ok(categories)
}

/// Where the catalog contents came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Remote,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct CategoryCatalog {
    categories: Vec<Category>,
    source: CatalogSource,
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self::fallback()
    }
}

impl CategoryCatalog {
    pub fn fallback() -> Self {
        Self {
            categories: fallback_categories(),
            source: CatalogSource::Fallback,
        }
    }

    /// Build from the outcome of a fetch, falling back on any failure.
    pub fn from_fetch<E: std::fmt::Display>(fetched: Result<String, E>) -> Self {
        let body = match fetched {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Category fetch failed, using fallback list: {}", e);
                return Self::fallback();
            }
        };
        match parse_catalog(&body) {
            Ok(categories) if !categories.is_empty() => Self {
                categories,
                source: CatalogSource::Remote,
            },
            Ok(_) => {
                log::warn!("Category catalog was empty, using fallback list");
                Self::fallback()
            }
            Err(e) => {
                log::warn!("Category catalog unusable, using fallback list: {}", e);
                Self::fallback()
            }
        }
    }

    pub fn source(&self) -> CatalogSource {
        self.source
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Categories whose name or slug contains `query`, case-insensitive.
    /// A blank query yields nothing.
    pub fn search(&self, query: &str) -> Vec<&Category> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.categories
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&query) || c.slug.to_lowercase().contains(&query))
            .take(SEARCH_LIMIT)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sorts_by_viewers() {
        let json = r#"[
            {"id": 1, "name": "Chess", "slug": "chess", "viewers": 10},
            {"id": 2, "name": "Slots", "slug": "slots", "viewers": 900},
            {"id": 3, "name": "Art", "slug": "art"},
            {"bogus": true}
        ]"#;
        let categories = parse_catalog(json).unwrap();
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Slots", "Chess", "Art"]);
    }

    #[test]
    fn test_parse_wrapped_data() {
        let json = r#"{"data": [{"id": 7, "name": "Minecraft", "slug": "minecraft", "viewers": 5}]}"#;
        assert_eq!(parse_catalog(json).unwrap().len(), 1);
        assert!(matches!(parse_catalog(r#"{"x": 1}"#), Err(CatalogError::UnexpectedShape)));
    }

    #[test]
    fn test_fetch_failure_falls_back() {
        let catalog = CategoryCatalog::from_fetch::<&str>(Err("timeout"));
        assert_eq!(catalog.source(), CatalogSource::Fallback);
        assert_eq!(catalog.categories().len(), 10);

        let catalog = CategoryCatalog::from_fetch::<&str>(Ok("<html>".to_string()));
        assert_eq!(catalog.source(), CatalogSource::Fallback);
    }

    #[test]
    fn test_search_name_and_slug() {
        let catalog = CategoryCatalog::fallback();
        let hits: Vec<&str> = catalog.search("LEGENDS").iter().map(|c| c.name.as_str()).collect();
        assert_eq!(hits, ["League of Legends", "Apex Legends"]);
        assert_eq!(catalog.search("counter-strike").len(), 1);
        assert!(catalog.search("  ").is_empty());
    }
}
