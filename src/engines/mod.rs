//! Built-in providers: seed descriptors and response translators.

// Response shapes
mod linkedin;
mod opensearch;
mod yelp;

pub use linkedin::LinkedInTranslator;
pub use opensearch::OpenSearchTranslator;
pub use yelp::YelpTranslator;

use crate::engine::EngineRecord;
use crate::translator::TranslatorRegistry;

pub const GOOGLE_ID: &str = "https://www.google.com/";
pub const YAHOO_ID: &str = "https://search.yahoo.com/";
pub const BING_ID: &str = "https://www.bing.com/";
pub const WIKIPEDIA_ID: &str = "https://en.wikipedia.org/";
pub const AMAZON_ID: &str = "https://www.amazon.com/";
pub const YELP_ID: &str = "https://www.yelp.com/";
pub const LINKEDIN_ID: &str = "https://www.linkedin.com/";
pub const EBAY_ID: &str = "https://www.ebay.com/";
pub const TWITTER_ID: &str = "https://twitter.com/";

// (id, name, queryURL, suggestionURL, icon)
type Seed = (&'static str, &'static str, &'static str, &'static str, &'static str);

const DEFAULTS: &[Seed] = &[
    (
        GOOGLE_ID,
        "Google",
        "https://www.google.com/search?q={searchTerms}",
        "https://suggestqueries.google.com/complete/search?client=firefox&q={searchTerms}",
        "https://www.google.com/favicon.ico",
    ),
    (
        YAHOO_ID,
        "Yahoo",
        "https://search.yahoo.com/search?p={searchTerms}",
        "https://search.yahoo.com/sugg/ff?output=fxjson&command={searchTerms}",
        "https://search.yahoo.com/favicon.ico",
    ),
    (
        BING_ID,
        "Bing",
        "https://www.bing.com/search?q={searchTerms}",
        "https://api.bing.com/osjson.aspx?query={searchTerms}",
        "https://www.bing.com/favicon.ico",
    ),
    (
        WIKIPEDIA_ID,
        "Wikipedia",
        "https://en.wikipedia.org/wiki/Special:Search?search={searchTerms}",
        "https://en.wikipedia.org/w/api.php?action=opensearch&search={searchTerms}",
        "https://en.wikipedia.org/favicon.ico",
    ),
];

const OTHERS: &[Seed] = &[
    (
        AMAZON_ID,
        "Amazon",
        "https://www.amazon.com/s?k={searchTerms}",
        "https://completion.amazon.com/search/complete?method=completion&search-alias=aps&mkt=1&q={searchTerms}",
        "https://www.amazon.com/favicon.ico",
    ),
    (
        YELP_ID,
        "Yelp",
        "https://www.yelp.com/search?find_desc={searchTerms}&find_loc={geo:name}",
        "https://www.yelp.com/search_suggest/json?prefix={searchTerms}&loc={geo:name}",
        "https://www.yelp.com/favicon.ico",
    ),
    (
        LINKEDIN_ID,
        "LinkedIn",
        "https://www.linkedin.com/search/results/all/?keywords={searchTerms}",
        "https://www.linkedin.com/ta/federator?query={searchTerms}&types=mynetwork,company,group,sitefeature,skill",
        "https://www.linkedin.com/favicon.ico",
    ),
    (
        EBAY_ID,
        "eBay",
        "https://www.ebay.com/sch/i.html?_nkw={searchTerms}",
        "",
        "https://www.ebay.com/favicon.ico",
    ),
    (
        TWITTER_ID,
        "Twitter",
        "https://twitter.com/search?q={searchTerms}",
        "",
        "https://twitter.com/favicon.ico",
    ),
];

fn to_records(seeds: &[Seed]) -> Vec<EngineRecord> {
    seeds
        .iter()
        .map(|&(id, name, query_url, suggestion_url, icon)| EngineRecord {
            id: id.to_string(),
            name: name.to_string(),
            query_url: query_url.to_string(),
            suggestion_url: suggestion_url.to_string(),
            icon: icon.to_string(),
        })
        .collect()
}

/// Providers placed in the defaults list on first run, in order.
pub fn builtin_defaults() -> Vec<EngineRecord> {
    to_records(DEFAULTS)
}

/// Providers placed in the others list on first run.
pub fn builtin_others() -> Vec<EngineRecord> {
    to_records(OTHERS)
}

/// Registers translators for providers with non-OpenSearch responses.
pub fn register_translators(registry: &mut TranslatorRegistry) {
    registry.register(YELP_ID, YelpTranslator);
    registry.register(LINKEDIN_ID, LinkedInTranslator);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineDescriptor;

    #[test]
    fn test_builtin_seeds_are_valid() {
        for record in builtin_defaults().into_iter().chain(builtin_others()) {
            let id = record.id.clone();
            assert!(EngineDescriptor::from_record(record).is_ok(), "{} invalid", id);
        }
    }

    #[test]
    fn test_builtin_defaults_order() {
        let ids: Vec<_> = builtin_defaults().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![GOOGLE_ID, YAHOO_ID, BING_ID, WIKIPEDIA_ID]);
    }

    #[test]
    fn test_builtin_ids_are_unique() {
        let mut ids: Vec<_> = builtin_defaults()
            .into_iter()
            .chain(builtin_others())
            .map(|r| r.id)
            .collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn test_yelp_uses_geo_location() {
        let yelp = builtin_others().into_iter().find(|r| r.id == YELP_ID).unwrap();
        assert!(EngineDescriptor::from_record(yelp).unwrap().uses_geo_location());
    }
}
