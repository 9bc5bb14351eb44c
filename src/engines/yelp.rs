//! Yelp suggestion format: a JSON envelope carrying an HTML list.

use scraper::{Html, Selector};
use serde::Deserialize;

use crate::translator::SuggestionTranslator;
use crate::{Result, SuggestError};

/// Translator extracting list item text from Yelp's HTML fragment.
#[derive(Debug, Clone, Copy, Default)]
pub struct YelpTranslator;

#[derive(Deserialize)]
struct YelpResponse {
    body: String,
}

impl SuggestionTranslator for YelpTranslator {
    fn translate(&self, body: &str) -> Result<Vec<String>> {
        let response: YelpResponse = serde_json::from_str(body)
            .map_err(|e| SuggestError::Translation(format!("invalid Yelp response: {}", e)))?;

        let fragment = Html::parse_fragment(&response.body);
        let item_selector = Selector::parse("li")
            .map_err(|e| SuggestError::Translation(format!("Failed to parse selector: {:?}", e)))?;

        Ok(fragment
            .select(&item_selector)
            .map(|item| {
                item.text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|text| !text.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_list_items() {
        let body = r#"{"body":"<ul class=\"suggestions\"><li data-value=\"pizza\"><b>pi</b>zza</li><li>  pizza   delivery </li><li></li></ul>","unique_request_id":"abc"}"#;
        let out = YelpTranslator.translate(body).unwrap();
        assert_eq!(out, vec!["pizza", "pizza delivery"]);
    }

    #[test]
    fn test_translate_no_items() {
        let out = YelpTranslator.translate(r#"{"body":"<p>nothing</p>"}"#).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_translate_missing_body() {
        assert!(matches!(
            YelpTranslator.translate(r#"["a",["b"]]"#),
            Err(SuggestError::Translation(_))
        ));
    }
}
