//! Summary-section extraction.
//!
//! Grammar of an agent response:
//!
//! ```text
//! response := before "<summary>" section "</summary>" after
//! ```
//!
//! - exactly one opening tag; the first closing tag after it ends the section
//!   (no nesting)
//! - `section` (trimmed) is the summary, `before + after` (trimmed) is the body
//! - no tag, an unclosed tag, or a repeated opening tag: the whole response
//!   (trimmed) is both summary and body
//! - an empty section falls back to the body as summary
//!
//! Extraction never fails.

pub const SUMMARY_OPEN: &str = "<summary>";
pub const SUMMARY_CLOSE: &str = "</summary>";

/// Instruction appended to an agent's system prompt when summaries are wanted.
pub const SUMMARY_INSTRUCTION: &str = "## Output format\n\
Begin your response with a short summary of your result wrapped in \
<summary>...</summary> tags (one to three sentences), then give your full \
output after the closing tag. Downstream agents see the summary first and \
only read your full output when they need the detail.";

/// A response split into its summary and the remaining body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredOutput {
    pub summary: String,
    pub body: String,
}

/// Split a raw response into `(summary, body)`.
pub fn extract_summary(raw: &str) -> StructuredOutput {
    match split_section(raw) {
        Some((before, section, after)) => {
            let body = format!("{before}{after}").trim().to_string();
            let section = section.trim();
            let summary = if section.is_empty() {
                body.clone()
            } else {
                section.to_string()
            };
            StructuredOutput { summary, body }
        }
        None => {
            let text = raw.trim().to_string();
            StructuredOutput {
                summary: text.clone(),
                body: text,
            }
        }
    }
}

fn split_section(raw: &str) -> Option<(&str, &str, &str)> {
    let open = raw.find(SUMMARY_OPEN)?;
    let section_start = open + SUMMARY_OPEN.len();
    let rest = &raw[section_start..];
    if rest.contains(SUMMARY_OPEN) {
        return None;
    }
    let close = rest.find(SUMMARY_CLOSE)?;
    Some((
        &raw[..open],
        &rest[..close],
        &rest[close + SUMMARY_CLOSE.len()..],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_section_from_body() {
        let out = extract_summary("Foo<summary>Short</summary>Bar");
        assert_eq!(out.summary, "Short");
        assert_eq!(out.body, "FooBar");
    }

    #[test]
    fn no_tag_uses_full_text() {
        let out = extract_summary("Just a plain response with no tags.");
        assert_eq!(out.summary, "Just a plain response with no tags.");
        assert_eq!(out.body, out.summary);
    }

    #[test]
    fn leading_summary_then_detail() {
        let out = extract_summary("<summary>Short summary here.</summary>\nDetailed output follows.");
        assert_eq!(out.summary, "Short summary here.");
        assert_eq!(out.body, "Detailed output follows.");
    }

    #[test]
    fn summary_only_leaves_empty_body() {
        let out = extract_summary("<summary>Only summary, no detail.</summary>");
        assert_eq!(out.summary, "Only summary, no detail.");
        assert_eq!(out.body, "");
    }

    #[test]
    fn whitespace_is_trimmed() {
        let out = extract_summary("  <summary>  Spaced summary  </summary>  \nSome detail  ");
        assert_eq!(out.summary, "Spaced summary");
        assert_eq!(out.body, "Some detail");
    }

    #[test]
    fn multiline_section() {
        let out = extract_summary(
            "<summary>Line one of summary.\nLine two of summary.</summary>\nThe detailed content.",
        );
        assert!(out.summary.contains("Line one"));
        assert!(out.summary.contains("Line two"));
        assert_eq!(out.body, "The detailed content.");
    }

    #[test]
    fn section_in_the_middle() {
        let out = extract_summary("Preamble.\n<summary>Mid summary.</summary>\nAftermath.");
        assert_eq!(out.summary, "Mid summary.");
        assert!(out.body.contains("Preamble."));
        assert!(out.body.contains("Aftermath."));
        assert!(!out.body.contains(SUMMARY_OPEN));
    }

    #[test]
    fn unclosed_tag_degrades() {
        let raw = "Body <summary>never closed";
        let out = extract_summary(raw);
        assert_eq!(out.summary, raw);
        assert_eq!(out.body, raw);
    }

    #[test]
    fn repeated_tags_degrade() {
        let raw = "<summary>one</summary> text <summary>two</summary>";
        let out = extract_summary(raw);
        assert_eq!(out.summary, raw);
        assert_eq!(out.body, raw);
    }

    #[test]
    fn first_closing_tag_wins() {
        let out = extract_summary("a<summary>b</summary>c</summary>");
        assert_eq!(out.summary, "b");
        assert_eq!(out.body, "ac</summary>");
    }

    #[test]
    fn empty_section_falls_back_to_body() {
        let out = extract_summary("<summary>  </summary>The answer.");
        assert_eq!(out.summary, "The answer.");
        assert_eq!(out.body, "The answer.");
    }
}
