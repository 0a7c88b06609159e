//! Retrieval target discovery
//!
//! A target is something a text tells the reader to go and look at: a bare
//! `http(s)` URL, or a document name in corner brackets followed by `を参照`
//! ("see ..."), e.g. `「RAG入門ガイド」を参照`.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Scheme, `://`, one character that cannot start a host, then everything up
/// to the next whitespace. Prose glued to the end of a URL is included.
pub const URL_PATTERN: &str = r"https?://[^\s/$.?#].[^\s]*";

/// Non-greedy capture between `「` and `」`, followed by the marker `を参照`.
pub const REFERENCE_PATTERN: &str = r"「(.*?)」を参照";

static URL_RE: OnceLock<Regex> = OnceLock::new();
static REFERENCE_RE: OnceLock<Regex> = OnceLock::new();

fn url_regex() -> &'static Regex {
    URL_RE.get_or_init(|| Regex::new(URL_PATTERN).expect("Invalid URL pattern"))
}

fn reference_regex() -> &'static Regex {
    REFERENCE_RE.get_or_init(|| Regex::new(REFERENCE_PATTERN).expect("Invalid reference pattern"))
}

/// Targets mentioned in `texts` that are not in `processed`.
///
/// The result holds no duplicates. It is ordered by first discovery: texts in
/// order, and within one text URLs before bracket references.
pub fn extract_new_targets<S, P>(texts: &[S], processed: &[P]) -> Vec<String>
where
    S: AsRef<str>,
    P: AsRef<str>,
{
    let processed: HashSet<&str> = processed.iter().map(AsRef::as_ref).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut found = Vec::new();

    for text in texts {
        let text = text.as_ref();
        let urls = url_regex().find_iter(text).map(|m| m.as_str());
        let references = reference_regex()
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str());

        for candidate in urls.chain(references) {
            if !processed.contains(candidate) && seen.insert(candidate) {
                found.push(candidate.to_string());
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn as_set(targets: &[String]) -> HashSet<&str> {
        targets.iter().map(String::as_str).collect()
    }

    const NONE: &[&str] = &[];

    #[test]
    fn test_finds_bracket_reference() {
        let texts = ["RAGシステムの基本的な仕組みについては、「RAG入門ガイド」を参照してください。"];
        assert_eq!(extract_new_targets(&texts, NONE), vec!["RAG入門ガイド"]);
    }

    #[test]
    fn test_bracket_without_marker_is_ignored() {
        let texts = ["「RAG入門ガイド」をご覧ください", "「ガイド」を 参照"];
        assert!(extract_new_targets(&texts, NONE).is_empty());
    }

    #[test]
    fn test_url_swallows_attached_prose() {
        let texts = ["詳細はhttps://example.com/rag-guideをご覧ください。"];
        assert_eq!(
            extract_new_targets(&texts, NONE),
            vec!["https://example.com/rag-guideをご覧ください。"]
        );
    }

    #[test]
    fn test_url_stops_at_whitespace() {
        let texts = ["see https://example.com/a and http://example.org/b\tnow"];
        assert_eq!(
            extract_new_targets(&texts, NONE),
            vec!["https://example.com/a", "http://example.org/b"]
        );
    }

    #[test]
    fn test_url_rejects_bad_first_host_character() {
        let texts = ["https://.example.com https:///path http://?q ftp://example.com"];
        assert!(extract_new_targets(&texts, NONE).is_empty());
    }

    #[test]
    fn test_urls_come_before_references_within_a_text() {
        let texts = ["「B」を参照 or https://example.com/c"];
        assert_eq!(
            extract_new_targets(&texts, NONE),
            vec!["https://example.com/c", "B"]
        );
    }

    #[test]
    fn test_processed_targets_are_filtered() {
        let texts = ["「A」を参照、「B」を参照"];
        assert_eq!(extract_new_targets(&texts, &["A"]), vec!["B"]);
    }

    #[test]
    fn test_duplicates_across_texts_collapse() {
        let texts = ["「A」を参照", "また「A」を参照", "https://x.io/a https://x.io/a"];
        let found = extract_new_targets(&texts, NONE);
        assert_eq!(found.len(), 2);
        assert_eq!(as_set(&found), HashSet::from(["A", "https://x.io/a"]));
    }

    #[test]
    fn test_no_targets_is_empty_not_error() {
        let texts = ["plain text", ""];
        assert!(extract_new_targets(&texts, NONE).is_empty());
        assert!(extract_new_targets::<&str, &str>(&[], &[]).is_empty());
    }

    fn fragment() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z ]{0,12}".prop_map(|s| s),
            "[a-z]{1,6}".prop_map(|s| format!("「{}」を参照", s)),
            "[a-z]{1,6}".prop_map(|s| format!(" https://example.com/{} ", s)),
            Just("。".to_string()),
        ]
    }

    fn text() -> impl Strategy<Value = String> {
        prop::collection::vec(fragment(), 0..6).prop_map(|parts| parts.concat())
    }

    proptest! {
        #[test]
        fn prop_result_is_deterministic_and_duplicate_free(
            texts in prop::collection::vec(text(), 0..5),
            processed in prop::collection::vec("[a-z]{1,6}", 0..4),
        ) {
            let first = extract_new_targets(&texts, &processed);
            let second = extract_new_targets(&texts, &processed);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(as_set(&first).len(), first.len());
            for target in &first {
                prop_assert!(!processed.contains(target));
            }
        }

        #[test]
        fn prop_feeding_results_back_as_processed_yields_nothing(
            texts in prop::collection::vec(text(), 0..5),
            processed in prop::collection::vec("[a-z]{1,6}", 0..4),
        ) {
            let found = extract_new_targets(&texts, &processed);
            let mut all = processed.clone();
            all.extend(found);
            prop_assert!(extract_new_targets(&texts, &all).is_empty());
        }

        #[test]
        fn prop_order_of_texts_does_not_change_the_set(
            texts in prop::collection::vec(text(), 0..5),
        ) {
            let forward = extract_new_targets(&texts, NONE);
            let mut reversed = texts.clone();
            reversed.reverse();
            let backward = extract_new_targets(&reversed, NONE);
            prop_assert_eq!(as_set(&forward), as_set(&backward));
        }
    }
}
