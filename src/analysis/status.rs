//! Status lifecycle analysis: time spent per normalized status on the root
//! issue, plus the coding window derived from Story-level status changes.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::analysis::{normalize_status, STATUS_FIELD, TERMINAL_STATUSES};
use crate::core::error::{EpiscopeError, Result};
use crate::core::models::IssueType;
use crate::tree::provider::ProjectData;
use crate::utils::format_months_days;

/// One workflow-state transition, tagged with the issue it happened on.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub timestamp: DateTime<FixedOffset>,
    pub issue: String,
    pub from_status: String,
    pub to_status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusAnalysis {
    pub all_status_changes: Vec<StatusChange>,
    #[serde(serialize_with = "durations_as_seconds")]
    pub epic_status_durations: BTreeMap<String, Duration>,
    pub coding_start: Option<DateTime<FixedOffset>>,
    pub coding_end: Option<DateTime<FixedOffset>>,
    pub coding_duration: String,
}

fn durations_as_seconds<S: Serializer>(
    map: &BTreeMap<String, Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(map.iter().map(|(k, v)| (k, v.num_seconds())))
}

/// Runs the status analysis against the aggregated activity stream.
///
/// `now` is injected so open intervals close against a caller-chosen clock.
pub fn analyze(data: &ProjectData, now: DateTime<Utc>) -> Result<StatusAnalysis> {
    if data.all_activities.is_empty() {
        return Err(EpiscopeError::Precondition(
            "Keine Aktivitäten gefunden".to_string(),
        ));
    }

    let all_status_changes: Vec<StatusChange> = data
        .all_activities
        .iter()
        .filter(|a| a.event.field_name == STATUS_FIELD)
        .map(|a| StatusChange {
            timestamp: a.event.timestamp,
            issue: a.issue_key.clone(),
            from_status: normalize_status(a.event.old_value.as_deref()),
            to_status: normalize_status(a.event.new_value.as_deref()),
        })
        .collect();

    let root = data.root_node().to_string();
    let epic_status_durations = epic_durations(data, &root, now);
    let (coding_start, coding_end) = coding_window(data);

    let coding_duration = match coding_start {
        None => "Nicht gestartet".to_string(),
        Some(start) => {
            let end = coding_end
                .map(|e| e.with_timezone(&Utc))
                .unwrap_or(now);
            format_months_days(end - start.with_timezone(&Utc))
        }
    };

    debug!(
        statuses = epic_status_durations.len(),
        changes = all_status_changes.len(),
        "status analysis complete"
    );

    Ok(StatusAnalysis {
        all_status_changes,
        epic_status_durations,
        coding_start,
        coding_end,
        coding_duration,
    })
}

/// Accumulates wall-clock time per normalized status on the root issue.
///
/// A synthetic start entry at the first activity timestamp accounts for the
/// initial "FUNNEL" state that has no recorded transition. The interval of
/// the last known status stays open until `now`.
fn epic_durations(
    data: &ProjectData,
    root: &str,
    now: DateTime<Utc>,
) -> BTreeMap<String, Duration> {
    let epic_events: Vec<_> = data
        .all_activities
        .iter()
        .filter(|a| a.issue_key == root)
        .collect();

    let Some(first) = epic_events.first() else {
        return BTreeMap::new();
    };

    let mut timeline: Vec<(DateTime<Utc>, String)> = vec![(
        first.event.timestamp.with_timezone(&Utc),
        "FUNNEL".to_string(),
    )];
    timeline.extend(
        epic_events
            .iter()
            .filter(|a| a.event.field_name == STATUS_FIELD)
            .map(|a| {
                (
                    a.event.timestamp.with_timezone(&Utc),
                    normalize_status(a.event.new_value.as_deref()),
                )
            }),
    );

    let mut durations: BTreeMap<String, Duration> = BTreeMap::new();
    let mut add = |status: &String, delta: Duration| {
        let slot = durations
            .entry(status.clone())
            .or_insert_with(Duration::zero);
        *slot = *slot + delta;
    };
    for pair in timeline.windows(2) {
        let (entered, status) = &pair[0];
        let (left, _) = &pair[1];
        add(status, *left - *entered);
    }
    if let Some((entered, status)) = timeline.last() {
        add(status, now - *entered);
    }
    durations
}

/// The coding window spans from the first Story entering "IN PROGRESS" to the
/// first Story-level transition into a terminal status.
fn coding_window(
    data: &ProjectData,
) -> (Option<DateTime<FixedOffset>>, Option<DateTime<FixedOffset>>) {
    let stories = data.keys_of_type(&IssueType::Story);

    let mut start = None;
    let mut end = None;
    for activity in &data.all_activities {
        if activity.event.field_name != STATUS_FIELD
            || !stories.contains(&activity.issue_key.as_str())
        {
            continue;
        }
        let status = normalize_status(activity.event.new_value.as_deref());
        if start.is_none() && status == "IN PROGRESS" {
            start = Some(activity.event.timestamp);
        }
        if end.is_none() && TERMINAL_STATUSES.contains(&status.as_str()) {
            end = Some(activity.event.timestamp);
        }
        if start.is_some() && end.is_some() {
            break;
        }
    }
    (start, end)
}
