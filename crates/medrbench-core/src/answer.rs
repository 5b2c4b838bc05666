//! Extraction of the final answer from a model completion.
//!
//! The task prompts ask for a `### Answer:` section after the reasoning.
//! The parser takes the text after the last marker, up to the next section
//! heading or closing code fence, trimmed. A completion without the marker
//! is a normal outcome, reported as `extraction_succeeded = false`.

use crate::model::ParsedAnswer;

/// Heading that introduces the final answer.
pub const ANSWER_MARKER: &str = "### Answer:";

/// Extracts answers after a fixed marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerParser {
    marker: String,
}

impl Default for AnswerParser {
    fn default() -> Self {
        Self::new(ANSWER_MARKER)
    }
}

impl AnswerParser {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Parse a completion. Never fails.
    pub fn parse(&self, completion: &str) -> ParsedAnswer {
        if self.marker.trim().is_empty() {
            return ParsedAnswer::missing();
        }

        // ASCII lowercasing keeps byte offsets aligned with `completion`.
        let haystack = completion.to_ascii_lowercase();
        let needle = self.marker.to_ascii_lowercase();
        let Some(pos) = haystack.rfind(&needle) else {
            return ParsedAnswer::missing();
        };

        let after = &completion[pos + self.marker.len()..];
        ParsedAnswer {
            extracted_text: take_section(after),
            extraction_succeeded: true,
        }
    }
}

/// Parse with the default `### Answer:` marker.
pub fn parse_answer(completion: &str) -> ParsedAnswer {
    AnswerParser::default().parse(completion)
}

/// Collect lines until the next heading or a fence that closes content.
fn take_section(after: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut has_content = false;

    for (i, line) in after.lines().enumerate() {
        let trimmed = line.trim();
        // The first line is the remainder of the marker line itself.
        if i > 0 && is_section_heading(trimmed) {
            break;
        }
        if trimmed.starts_with("```") {
            if has_content {
                break;
            }
            continue;
        }
        if !trimmed.is_empty() {
            has_content = true;
        }
        lines.push(line);
    }

    let text = lines.join("\n");
    let text = text.trim();
    text.strip_suffix("```").unwrap_or(text).trim_end().to_string()
}

/// `### Reasoning:`-style headings: 1-6 hashes, a space, text ending in `:`.
fn is_section_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return false;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return false;
    }
    let title = rest.trim();
    title.len() > 1 && title.ends_with(':')
}
