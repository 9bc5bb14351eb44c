//! OpenSearch suggestion format: `[query, [suggestion, ...], ...]`.

use serde_json::Value;

use crate::translator::SuggestionTranslator;
use crate::{Result, SuggestError};

/// Translator for the two-element OpenSearch suggestions array.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSearchTranslator;

impl SuggestionTranslator for OpenSearchTranslator {
    fn translate(&self, body: &str) -> Result<Vec<String>> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| SuggestError::Translation(format!("invalid JSON: {}", e)))?;

        let suggestions = value
            .get(1)
            .and_then(Value::as_array)
            .ok_or_else(|| SuggestError::Translation("expected [query, [suggestions]]".into()))?;

        Ok(suggestions
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_standard() {
        let out = OpenSearchTranslator
            .translate(r#"["rust",["rust lang","rust game","rustup"]]"#)
            .unwrap();
        assert_eq!(out, vec!["rust lang", "rust game", "rustup"]);
    }

    #[test]
    fn test_translate_extra_elements_ignored() {
        let out = OpenSearchTranslator
            .translate(r#"["a",["ab"],["desc"],["http://x"]]"#)
            .unwrap();
        assert_eq!(out, vec!["ab"]);
    }

    #[test]
    fn test_translate_skips_non_strings() {
        let out = OpenSearchTranslator.translate(r#"["a",["ab",1,null,"ac"]]"#).unwrap();
        assert_eq!(out, vec!["ab", "ac"]);
    }

    #[test]
    fn test_translate_empty_list() {
        let out = OpenSearchTranslator.translate(r#"["zzz",[]]"#).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_translate_malformed() {
        assert!(matches!(
            OpenSearchTranslator.translate("<html>"),
            Err(SuggestError::Translation(_))
        ));
        assert!(matches!(
            OpenSearchTranslator.translate(r#"{"q":"a"}"#),
            Err(SuggestError::Translation(_))
        ));
        assert!(OpenSearchTranslator.translate(r#"["only"]"#).is_err());
    }
}
