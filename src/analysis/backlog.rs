//! Backlog cumulative-flow analysis over the Story population: per-day
//! refinement and finish counts with running backlog totals.

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::analysis::{normalize_status, STATUS_FIELD, TERMINAL_STATUSES};
use crate::core::error::{EpiscopeError, Result};
use crate::core::models::IssueType;
use crate::tree::provider::ProjectData;

/// One day in the cumulative-flow series.
#[derive(Debug, Clone, Serialize)]
pub struct BacklogDay {
    pub date: NaiveDate,
    /// Stories that entered the backlog on this day.
    pub refined: u32,
    /// Stories finished on this day.
    pub finished: u32,
    pub refined_backlog: u32,
    pub finished_backlog: u32,
    pub active_backlog: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacklogAnalysis {
    pub coding_start_time: DateTime<FixedOffset>,
    /// Set only once every refined Story has reached a terminal status.
    pub coding_finish_time: Option<DateTime<FixedOffset>>,
    pub series: Vec<BacklogDay>,
}

/// Builds the day-indexed backlog series for all Stories in the tree.
///
/// A Story enters the backlog at its first recorded activity and leaves it at
/// its first transition into a terminal status. The series runs from the
/// earliest entry to the latest finish, or to `now` while work is still open.
pub fn analyze(data: &ProjectData, now: DateTime<Utc>) -> Result<BacklogAnalysis> {
    let stories = data.keys_of_type(&IssueType::Story);
    if stories.is_empty() {
        return Err(EpiscopeError::Precondition(
            "Keine Stories gefunden".to_string(),
        ));
    }

    let mut starts: HashMap<&str, DateTime<FixedOffset>> = HashMap::new();
    let mut finishes: HashMap<&str, DateTime<FixedOffset>> = HashMap::new();
    for activity in &data.all_activities {
        let key = activity.issue_key.as_str();
        if !stories.contains(&key) {
            continue;
        }
        starts.entry(key).or_insert(activity.event.timestamp);
        if activity.event.field_name == STATUS_FIELD
            && !finishes.contains_key(key)
            && TERMINAL_STATUSES
                .contains(&normalize_status(activity.event.new_value.as_deref()).as_str())
        {
            finishes.insert(key, activity.event.timestamp);
        }
    }

    let Some(coding_start_time) = starts.values().min().copied() else {
        return Err(EpiscopeError::Precondition(
            "Keine Stories mit Aktivitäten gefunden".to_string(),
        ));
    };
    let coding_finish_time = if finishes.len() == starts.len() {
        finishes.values().max().copied()
    } else {
        None
    };

    let start_date = coding_start_time.date_naive();
    let end_date = coding_finish_time
        .map(|t| t.date_naive())
        .unwrap_or_else(|| now.date_naive());

    let mut refined_per_day: HashMap<NaiveDate, u32> = HashMap::new();
    for t in starts.values() {
        *refined_per_day.entry(t.date_naive()).or_insert(0) += 1;
    }
    let mut finished_per_day: HashMap<NaiveDate, u32> = HashMap::new();
    for t in finishes.values() {
        *finished_per_day.entry(t.date_naive()).or_insert(0) += 1;
    }

    let mut series = Vec::new();
    let mut refined_backlog = 0u32;
    let mut finished_backlog = 0u32;
    let mut date = start_date;
    while date <= end_date {
        let refined = refined_per_day.get(&date).copied().unwrap_or(0);
        let finished = finished_per_day.get(&date).copied().unwrap_or(0);
        refined_backlog += refined;
        finished_backlog += finished;
        series.push(BacklogDay {
            date,
            refined,
            finished,
            refined_backlog,
            finished_backlog,
            active_backlog: i64::from(refined_backlog) - i64::from(finished_backlog),
        });
        date = date + Duration::days(1);
    }

    debug!(
        stories = starts.len(),
        finished = finishes.len(),
        days = series.len(),
        "backlog analysis complete"
    );

    Ok(BacklogAnalysis {
        coding_start_time,
        coding_finish_time,
        series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::IssueGraph;
    use crate::core::models::{ActivityEvent, Issue, RelationType};
    use crate::tree::{provider::ProjectData, BuiltTree};
    use std::collections::HashMap;

    fn event(field: &str, new: &str, ts: &str) -> ActivityEvent {
        ActivityEvent {
            user: "tester".to_string(),
            field_name: field.to_string(),
            old_value: None,
            new_value: Some(new.to_string()),
            timestamp: DateTime::parse_from_rfc3339(ts).unwrap(),
        }
    }

    fn data_with_stories(stories: Vec<Issue>) -> ProjectData {
        let mut graph = IssueGraph::new();
        let mut issues = HashMap::new();
        for story in stories {
            graph.add_edge("BE-1", &story.key, RelationType::Child);
            issues.insert(story.key.clone(), story);
        }
        issues.insert(
            "BE-1".to_string(),
            Issue::new("BE-1", IssueType::BusinessEpic),
        );
        ProjectData::from_built(
            "BE-1",
            BuiltTree {
                graph,
                issues,
                missing: vec![],
            },
        )
    }

    fn now(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_two_story_flow() {
        let mut s1 = Issue::new("ST-1", IssueType::Story);
        s1.activities = vec![
            event("Description", "refined", "2025-06-01T09:00:00+00:00"),
            event("Status", "RESOLVED", "2025-06-10T09:00:00+00:00"),
        ];
        let mut s2 = Issue::new("ST-2", IssueType::Story);
        s2.activities = vec![event("Description", "refined", "2025-06-05T09:00:00+00:00")];

        let data = data_with_stories(vec![s1, s2]);
        let result = analyze(&data, now("2025-06-12T00:00:00+00:00")).unwrap();

        // ST-2 never finished, so the window stays open until "today".
        assert!(result.coding_finish_time.is_none());
        assert_eq!(result.series.len(), 12);

        let day5 = &result.series[4];
        assert_eq!(day5.date, NaiveDate::from_ymd_opt(2025, 6, 5).unwrap());
        assert_eq!(day5.refined, 1);
        assert_eq!(day5.refined_backlog, 2);
        assert_eq!(day5.active_backlog, 2);

        let day10 = &result.series[9];
        assert_eq!(day10.finished, 1);
        assert_eq!(day10.finished_backlog, 1);
        assert_eq!(day10.active_backlog, 1);

        let last = result.series.last().unwrap();
        assert_eq!(last.active_backlog, 1);
    }

    #[test]
    fn test_series_is_clamped_when_all_stories_finish() {
        let mut s1 = Issue::new("ST-1", IssueType::Story);
        s1.activities = vec![
            event("Status", "IN PROGRESS", "2025-06-01T09:00:00+00:00"),
            event("Status", "CLOSED", "2025-06-03T09:00:00+00:00"),
        ];

        let data = data_with_stories(vec![s1]);
        let result = analyze(&data, now("2025-07-01T00:00:00+00:00")).unwrap();

        assert!(result.coding_finish_time.is_some());
        assert_eq!(result.series.len(), 3);
        assert_eq!(result.series.last().unwrap().active_backlog, 0);
    }

    #[test]
    fn test_cumulative_counts_never_decrease() {
        let mut s1 = Issue::new("ST-1", IssueType::Story);
        s1.activities = vec![
            event("Description", "refined", "2025-06-01T09:00:00+00:00"),
            event("Status", "RESOLVED", "2025-06-04T09:00:00+00:00"),
        ];
        let mut s2 = Issue::new("ST-2", IssueType::Story);
        s2.activities = vec![event("Status", "IN PROGRESS", "2025-06-02T09:00:00+00:00")];

        let data = data_with_stories(vec![s1, s2]);
        let result = analyze(&data, now("2025-06-08T00:00:00+00:00")).unwrap();

        for pair in result.series.windows(2) {
            assert!(pair[1].refined_backlog >= pair[0].refined_backlog);
            assert!(pair[1].finished_backlog >= pair[0].finished_backlog);
            assert!(pair[1].active_backlog >= 0);
        }
    }

    #[test]
    fn test_no_stories() {
        let data = data_with_stories(vec![]);
        let err = analyze(&data, Utc::now()).unwrap_err();
        assert!(matches!(err, EpiscopeError::Precondition(_)));
    }

    #[test]
    fn test_stories_without_activities() {
        let data = data_with_stories(vec![Issue::new("ST-1", IssueType::Story)]);
        let err = analyze(&data, Utc::now()).unwrap_err();
        assert!(matches!(err, EpiscopeError::Precondition(_)));
    }
}
