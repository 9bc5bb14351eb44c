//! LinkedIn suggestion format: results grouped by category.
//!
//! ```json
//! {"company": {"resultList": [{"displayName": "Acme"}]},
//!  "mynetwork": {"resultList": [{"displayName": "Ada Lovelace"}]}}
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::translator::SuggestionTranslator;
use crate::{Result, SuggestError};

/// Category order, matching the `types` requested in the suggestion URL.
const CATEGORY_ORDER: &[&str] = &["mynetwork", "company", "group", "sitefeature", "skill"];

/// Translator flattening LinkedIn's per-category result lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkedInTranslator;

#[derive(Deserialize)]
struct Category {
    #[serde(rename = "resultList", default)]
    result_list: Vec<Entry>,
}

#[derive(Deserialize)]
struct Entry {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

impl SuggestionTranslator for LinkedInTranslator {
    fn translate(&self, body: &str) -> Result<Vec<String>> {
        let categories: Map<String, Value> = serde_json::from_str(body)
            .map_err(|e| SuggestError::Translation(format!("invalid LinkedIn response: {}", e)))?;

        let rank = |key: &str| {
            CATEGORY_ORDER
                .iter()
                .position(|known| *known == key)
                .unwrap_or(CATEGORY_ORDER.len())
        };
        let mut keys: Vec<&String> = categories.keys().collect();
        keys.sort_by(|a, b| rank(a.as_str()).cmp(&rank(b.as_str())).then_with(|| a.cmp(b)));

        let mut suggestions = Vec::new();
        for key in keys {
            let category: Category = match serde_json::from_value(categories[key.as_str()].clone()) {
                Ok(category) => category,
                Err(_) => continue,
            };
            suggestions.extend(
                category
                    .result_list
                    .into_iter()
                    .filter_map(|entry| entry.display_name)
                    .filter(|name| !name.trim().is_empty()),
            );
        }
        Ok(suggestions)
    }
}
