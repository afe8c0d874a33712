//! Status lines returned to agents by board tools.
//!
//! Shape: `"<marker> Successfully <verb> '<name>' (ID: <id>)"`. Agents read
//! ids out of these lines, so the format is fixed.

use std::sync::LazyLock;

use regex::Regex;

pub const SUCCESS_MARKER: &str = "✅";
pub const FAILURE_MARKER: &str = "❌";

/// The id follows the closing quote of the name.
static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"' \(ID: ([^)\s]+)\)").expect("id pattern is valid"));

/// `✅ Successfully created list 'To Do' (ID: 6731ab)`.
pub fn success_with_id(verb: &str, name: &str, id: &str) -> String {
    format!("{SUCCESS_MARKER} Successfully {verb} '{name}' (ID: {id})")
}

/// Success line for operations that create nothing (`deleted card c-9`).
pub fn success(detail: &str) -> String {
    format!("{SUCCESS_MARKER} Successfully {detail}")
}

/// `❌ Error creating card: <error>`.
pub fn failure(action: &str, error: &str) -> String {
    format!("{FAILURE_MARKER} Error {action}: {error}")
}

pub fn is_success(line: &str) -> bool {
    line.starts_with(SUCCESS_MARKER)
}

/// Extract the id embedded in a success line.
///
/// Names may themselves contain `(ID: ..)`; the id written after the name
/// is the last match.
pub fn extract_id(line: &str) -> Option<&str> {
    if !is_success(line) {
        return None;
    }
    ID_RE
        .captures_iter(line)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_line_has_fixed_shape() {
        assert_eq!(
            success_with_id("created list", "To Do", "6731ab"),
            "✅ Successfully created list 'To Do' (ID: 6731ab)"
        );
    }

    #[test]
    fn extracts_id_from_success_only() {
        let line = success_with_id("created card", "Design (v2)", "c-9");
        assert_eq!(extract_id(&line), Some("c-9"));
        assert_eq!(extract_id(&failure("creating card", "(ID: nope)")), None);
        assert_eq!(extract_id(&success("deleted card c-9")), None);
    }

    #[test]
    fn id_inside_name_is_not_taken() {
        let line = success_with_id("created card", "Migrate (ID: legacy-7) records", "card-42");
        assert_eq!(extract_id(&line), Some("card-42"));

        let quoted = success_with_id("created card", "Rename 'old' (ID: legacy-7)", "card-43");
        assert_eq!(extract_id(&quoted), Some("card-43"));

        let label = format!("{} on card card-42", success_with_id("created red label", "Bug", "label-5"));
        assert_eq!(extract_id(&label), Some("label-5"));
    }
}
