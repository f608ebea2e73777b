use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([^\s#@]+)").expect("hashtag pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTag {
    /// Tag body without the leading `#`
    pub text: String,
    pub original_text: String,
}

/// Extract unique hashtags in first-seen order.
///
/// A tag is `#` followed by one or more characters that are not whitespace,
/// `#` or `@`, so `#a#b` yields two tags and `#work@home` stops at the `@`.
pub fn extract_tags(content: &str) -> Vec<ParsedTag> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();

    for cap in HASHTAG.captures_iter(content) {
        let Some(body) = cap.get(1) else { continue };
        let body = body.as_str();
        if seen.insert(body) {
            tags.push(ParsedTag {
                text: body.to_string(),
                original_text: format!("#{}", body),
            });
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tags: &[ParsedTag]) -> Vec<&str> {
        tags.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_duplicates_collapse() {
        let tags = extract_tags("#a #a #b");
        assert_eq!(texts(&tags), vec!["a", "b"]);
        assert_eq!(tags[1].original_text, "#b");
    }

    #[test]
    fn test_first_seen_order() {
        let tags = extract_tags("Hello #world this is a #test and #world again");
        assert_eq!(texts(&tags), vec!["world", "test"]);
    }

    #[test]
    fn test_stops_at_reserved_characters() {
        let tags = extract_tags("#work@home #a#b\n#할일");
        assert_eq!(texts(&tags), vec!["work", "a", "b", "할일"]);
    }

    #[test]
    fn test_bare_hash_is_not_a_tag() {
        assert!(extract_tags("# heading\n#").is_empty());
        assert!(extract_tags("").is_empty());
    }
}
