//! Deterministic cleanup of the model's CSV response.
//!
//! The prompt forbids code fences and prose, but models still occasionally
//! wrap the CSV in ` ```csv … ``` ` or emit Windows line endings. Fixing
//! these quirks here, with cheap string rules, keeps the prompt focused on
//! *what to extract* rather than formatting edge-cases. Each rule is a pure
//! function and independently testable.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw model output.
///
/// Rules (applied in order):
/// 1. Strip an outer ```csv fence (models sometimes disobey the prompt)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Drop blank lines at either edge and trim surrounding whitespace
pub fn clean_csv(input: &str) -> String {
    let s = strip_csv_fences(input);
    let s = normalise_line_endings(&s);
    trim_edges(&s)
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:csv)?\n(.*)\n```\s*$").unwrap());

fn strip_csv_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_edges(input: &str) -> String {
    input.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_csv_fence() {
        let input = "```csv\na,b\n1,2\n```";
        assert_eq!(clean_csv(input), "a,b\n1,2");
    }

    #[test]
    fn strips_bare_fence() {
        let input = "```\na,b\n1,2\n```";
        assert_eq!(clean_csv(input), "a,b\n1,2");
    }

    #[test]
    fn passthrough_without_fences() {
        assert_eq!(clean_csv("a,b\n1,2"), "a,b\n1,2");
    }

    #[test]
    fn normalises_crlf() {
        assert_eq!(clean_csv("a,b\r\n1,2\r\n"), "a,b\n1,2");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(clean_csv("\n\n  a,b\n1,2  \n\n"), "a,b\n1,2");
    }

    #[test]
    fn quoted_fields_survive_untouched() {
        let input = "name,notes\n\"Doe, Jane\",fine\n";
        assert_eq!(clean_csv(input), "name,notes\n\"Doe, Jane\",fine");
    }
}
