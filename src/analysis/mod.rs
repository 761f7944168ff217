pub mod backlog;
pub mod runner;
pub mod scope;
pub mod status;
pub mod time_creep;

/// Field name of workflow-state changes in the activity stream.
pub const STATUS_FIELD: &str = "Status";

/// Normalized status names that count as finished work.
pub const TERMINAL_STATUSES: [&str; 2] = ["RESOLVED", "CLOSED"];

/// Normalizes a raw status string.
///
/// Grammar: `"<workflowname>:<STATUS>[<id>]"` yields the uppercased middle
/// segment. Without the bracket/colon encoding the trimmed, uppercased raw
/// string is returned; a missing or empty value becomes `"N/A"`.
pub fn normalize_status(raw: Option<&str>) -> String {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => return "N/A".to_string(),
    };

    if raw.contains('[') {
        if let Some(middle) = raw.split(':').nth(1) {
            let name = middle.split('[').next().unwrap_or(middle);
            return name.trim().to_uppercase();
        }
    }
    raw.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_encoded_status() {
        assert_eq!(
            normalize_status(Some("BE Workflow:DONE [10023]")),
            "DONE"
        );
        assert_eq!(
            normalize_status(Some("wf:In Progress [7]")),
            "IN PROGRESS"
        );
    }

    #[test]
    fn test_normalize_plain_status() {
        assert_eq!(normalize_status(Some("Funnel")), "FUNNEL");
        assert_eq!(normalize_status(Some("  closed  ")), "CLOSED");
    }

    #[test]
    fn test_normalize_bracket_without_colon_falls_back() {
        assert_eq!(normalize_status(Some("weird [x")), "WEIRD [X");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_status(None), "N/A");
        assert_eq!(normalize_status(Some("")), "N/A");
    }
}
