//! Output cleanup for model responses.
//!
//! Models sometimes open with conversational preamble ("I'll evaluate…")
//! before the content the card actually wants. We strip leading lines that
//! match known preamble openers, and for anchored categories (the email's
//! `Subject:` line) trim anything before the anchor.

/// Lowercased openers that mark a line as preamble rather than content.
const PREAMBLE_OPENERS: &[&str] = &[
    "i'll ",
    "i will ",
    "let me ",
    "i'm going to ",
    "i need to ",
    "here's my ",
    "here is my ",
    "here's the ",
    "here is the ",
    "based on ",
    "after reviewing ",
    "looking at ",
    "i've analyzed ",
    "i have analyzed ",
    "now i'll ",
    "now let me ",
    "analyzing ",
    "assessing ",
    "thank you for ",
    "i understand ",
    "sure, ",
    "of course",
    "i'd be happy to ",
];

/// Cleans one model response: preamble lines stripped, then (if an anchor is
/// set) content trimmed to start at the anchor.
pub fn clean_output(raw: &str, anchor: Option<&str>) -> String {
    let text = strip_preamble(raw);

    if let Some(anchor) = anchor {
        if !text.starts_with(anchor) {
            if let Some(pos) = text.find(anchor) {
                return text[pos..].to_string();
            }
        }
    }

    text.to_string()
}

/// Drops leading lines that read as assistant preamble. Never strips the
/// whole response: if everything matches, the original text is returned.
fn strip_preamble(text: &str) -> &str {
    let trimmed = text.trim();

    let mut offset = 0;
    for line in trimmed.split_inclusive('\n') {
        if line.trim().is_empty() || is_preamble_line(line) {
            offset += line.len();
        } else {
            break;
        }
    }

    let rest = trimmed[offset..].trim_start();
    if rest.is_empty() {
        trimmed
    } else {
        rest
    }
}

fn is_preamble_line(line: &str) -> bool {
    let lowered = line.trim().to_lowercase();
    PREAMBLE_OPENERS
        .iter()
        .any(|opener| lowered.starts_with(opener))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_line_is_stripped() {
        let raw = "I'll evaluate this transcript for you.\n\n# Scorecard\nGreat work.";
        assert_eq!(clean_output(raw, None), "# Scorecard\nGreat work.");
    }

    #[test]
    fn test_multiple_preamble_lines_are_stripped() {
        let raw = "Thank you for sharing this transcript.\nLet me analyze it now.\nActual content.";
        assert_eq!(clean_output(raw, None), "Actual content.");
    }

    #[test]
    fn test_content_without_preamble_is_untouched() {
        let raw = "# Weekly Growth Plan\n\nStrategy #1: listen more.";
        assert_eq!(clean_output(raw, None), raw);
    }

    #[test]
    fn test_all_preamble_keeps_original() {
        // A response that is nothing but preamble-shaped lines must not be
        // emptied out.
        let raw = "I'll evaluate this.\nLet me assess the interview.";
        assert_eq!(clean_output(raw, None), raw);
    }

    #[test]
    fn test_anchor_trims_leading_text() {
        let raw = "Here is the email you asked for:\nSubject: Great talking today\n\nHi there,";
        let cleaned = clean_output(raw, Some("Subject:"));
        assert!(cleaned.starts_with("Subject: Great talking today"));
    }

    #[test]
    fn test_anchor_absent_leaves_content_alone() {
        let raw = "No subject line in this one at all.";
        assert_eq!(clean_output(raw, Some("Subject:")), raw);
    }

    #[test]
    fn test_anchored_content_already_in_place() {
        let raw = "Subject: Quick follow-up\n\nHi,";
        assert_eq!(clean_output(raw, Some("Subject:")), raw);
    }
}
