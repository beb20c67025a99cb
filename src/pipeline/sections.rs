//! Section-title extraction from heading markup or freeform text.

use std::sync::LazyLock;

use regex::Regex;

static H2_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<h2[^>]*>(.*?)</h2>").unwrap());
static INNER_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Extract the ordered list of section titles from `text`.
///
/// If the text contains `<h2>` spans (any case, attributes allowed), the
/// inner text of each span is returned in document order with nested markup
/// stripped and whitespace trimmed. Otherwise every non-blank line is a
/// section title, which is how a hand-edited section list reads.
pub fn extract_sections(text: &str) -> Vec<String> {
    let headings: Vec<String> = H2_SPAN
        .captures_iter(text)
        .map(|caps| INNER_TAG.replace_all(&caps[1], "").trim().to_string())
        .collect();

    if !headings.is_empty() {
        return headings;
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_h2_spans_in_order() {
        let html = "<p>intro</p>\
                    <h2>What is cold brew?</h2><p>...</p>\
                    <H2 class=\"x\"> How to make it </H2>\
                    <h2>Common <em>mistakes</em></h2>";
        assert_eq!(
            extract_sections(html),
            vec![
                "What is cold brew?",
                "How to make it",
                "Common mistakes",
            ]
        );
    }

    #[test]
    fn test_single_span() {
        assert_eq!(extract_sections("<h2>Only one</h2>"), vec!["Only one"]);
    }

    #[test]
    fn test_no_spans_falls_back_to_lines() {
        let text = "First section\n\n  Second section  \n\nThird";
        assert_eq!(
            extract_sections(text),
            vec!["First section", "Second section", "Third"]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_sections("").is_empty());
        assert!(extract_sections("  \n \n").is_empty());
    }

    #[test]
    fn test_heading_order_matches_document_order() {
        let html = "<h2>Z last alphabetically</h2><h2>A first alphabetically</h2>";
        assert_eq!(
            extract_sections(html),
            vec!["Z last alphabetically", "A first alphabetically"]
        );
    }
}
