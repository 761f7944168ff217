//! Date-drift detection: watches "Target end" and "Fix Version/s" changes on
//! planning-level issues and classifies them as set, creep or pull-in events.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::error::Result;
use crate::core::graph::IssueGraph;
use crate::core::models::{ActivityEvent, IssueType};
use crate::llm::Summarizer;
use crate::tree::provider::ProjectData;

/// Fields whose changes count as date drift.
const TARGET_END_FIELD: &str = "Target end";
const FIX_VERSIONS_FIELD: &str = "Fix Version/s";

/// The PI numbering anchors at PI27 == Q1/2025; each PI is one quarter.
const PI_ANCHOR: i32 = 27;
const PI_ANCHOR_YEAR: i32 = 2025;

const NO_SHIFT_TEMPLATE: &str =
    "Das Business Epic {} weist keine signifikanten Terminverschiebungen auf.";
const SUMMARY_FAILED: &str =
    "LLM-Zusammenfassung fehlgeschlagen aufgrund eines internen Fehlers.";
const MISSING_ROOT: &str = "Analyse nicht möglich, da Root-Knoten fehlt.";

lazy_static! {
    static ref PI_RE: Regex = Regex::new(r"PI(\d+)").unwrap();
    static ref QUARTER_RE: Regex = Regex::new(r"Q([1-4])_(\d{2})").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrackedField {
    #[serde(rename = "Target end")]
    TargetEnd,
    #[serde(rename = "Fix Version/s")]
    FixVersions,
}

impl TrackedField {
    fn label(&self) -> &'static str {
        match self {
            TrackedField::TargetEnd => TARGET_END_FIELD,
            TrackedField::FixVersions => FIX_VERSIONS_FIELD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeCreepKind {
    #[serde(rename = "TIME_SET")]
    TimeSet,
    #[serde(rename = "TIME_CREEP")]
    TimeCreep,
    #[serde(rename = "TIME_PULL_IN")]
    TimePullIn,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeCreepEvent {
    pub issue_key: String,
    pub field: TrackedField,
    pub event_type: TimeCreepKind,
    pub old_display: String,
    pub new_display: String,
    pub details: String,
    pub timestamp: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeCreepAnalysis {
    pub time_creep_events: Vec<TimeCreepEvent>,
    pub narrative_summary: String,
}

/// Detects date drift on the root and its direct children, then asks the
/// summarizer for a narrative over the creep digest.
pub async fn analyze(
    data: &ProjectData,
    summarizer: &dyn Summarizer,
) -> Result<TimeCreepAnalysis> {
    let root = data.epic_id.as_str();
    if !data.graph.contains_node(root) {
        return Ok(TimeCreepAnalysis {
            time_creep_events: vec![],
            narrative_summary: MISSING_ROOT.to_string(),
        });
    }

    let mut scope: Vec<&str> = vec![root];
    scope.extend(data.graph.successors(root).iter().map(String::as_str));

    let mut activities_by_issue: HashMap<&str, Vec<&ActivityEvent>> = HashMap::new();
    for tagged in &data.all_activities {
        activities_by_issue
            .entry(tagged.issue_key.as_str())
            .or_default()
            .push(&tagged.event);
    }

    let mut time_creep_events = Vec::new();
    for key in scope {
        if !is_planning_level(data.issue_type_of(key)) {
            continue;
        }
        let Some(activities) = activities_by_issue.get(key) else {
            continue;
        };
        time_creep_events.extend(issue_events(key, activities));
    }
    time_creep_events.sort_by_key(|e| e.timestamp);

    debug!(events = time_creep_events.len(), "time creep scan complete");

    let narrative_summary =
        narrative(data, &time_creep_events, summarizer).await;

    Ok(TimeCreepAnalysis {
        time_creep_events,
        narrative_summary,
    })
}

/// Writes detected events and the narrative onto the graph nodes, so that a
/// serialized graph carries the analysis with it.
pub fn annotate_graph(graph: &mut IssueGraph, epic_id: &str, analysis: &TimeCreepAnalysis) {
    let mut by_issue: BTreeMap<&str, Vec<&TimeCreepEvent>> = BTreeMap::new();
    for event in &analysis.time_creep_events {
        by_issue.entry(&event.issue_key).or_default().push(event);
    }
    for (key, events) in by_issue {
        if let Ok(value) = serde_json::to_value(&events) {
            graph.set_attr(key, "time_creep_events", value);
        }
    }
    graph.set_attr(
        epic_id,
        "llm_time_creep_summary",
        serde_json::Value::String(analysis.narrative_summary.clone()),
    );
}

fn is_planning_level(issue_type: Option<&IssueType>) -> bool {
    matches!(
        issue_type,
        Some(
            IssueType::BusinessEpic
                | IssueType::PortfolioEpic
                | IssueType::Initiative
                | IssueType::Epic
        )
    )
}

/// Walks one issue's tracked-field history day by day.
///
/// Within a day only the last value per field counts. A change on the
/// creation day compares against nothing, so the first recorded value is
/// always a TIME_SET. A Fix Version move that still contains the currently
/// known Target end is planning noise and is suppressed.
fn issue_events(key: &str, activities: &[&ActivityEvent]) -> Vec<TimeCreepEvent> {
    let Some(first) = activities.first() else {
        return vec![];
    };
    let creation_day = first.timestamp.date_naive();

    let relevant: Vec<&ActivityEvent> = activities
        .iter()
        .copied()
        .filter(|e| e.field_name == TARGET_END_FIELD || e.field_name == FIX_VERSIONS_FIELD)
        .collect();

    let mut by_day: Vec<(NaiveDate, Vec<&ActivityEvent>)> = Vec::new();
    for event in relevant {
        let day = event.timestamp.date_naive();
        match by_day.last_mut() {
            Some((d, bucket)) if *d == day => bucket.push(event),
            _ => by_day.push((day, vec![event])),
        }
    }

    let mut known: HashMap<TrackedField, (String, (NaiveDate, NaiveDate))> = HashMap::new();
    let mut events = Vec::new();

    for (day, daily) in by_day {
        // Target end first, so same-day Fix Version moves are judged against
        // the freshest target date.
        for field in [TrackedField::TargetEnd, TrackedField::FixVersions] {
            let Some(last) = daily
                .iter()
                .rev()
                .find(|e| e.field_name == field.label())
            else {
                continue;
            };

            let raw_new = last.new_value.as_deref().filter(|v| !v.is_empty());
            let new_range = raw_new.and_then(|v| parse_field_value(field, v));

            let start_of_day = if day == creation_day {
                None
            } else {
                known.get(&field).cloned()
            };
            let old_end = start_of_day.as_ref().map(|(_, range)| range.1);
            let new_end = new_range.map(|range| range.1);

            let suppressed = field == TrackedField::FixVersions
                && match (new_range, known.get(&TrackedField::TargetEnd)) {
                    (Some((start, end)), Some((_, target))) => {
                        start <= target.1 && target.1 <= end
                    }
                    _ => false,
                };

            if !suppressed {
                if let Some(kind) = classify(old_end, new_end) {
                    let old_display = display_value(
                        field,
                        start_of_day.as_ref().map(|(label, range)| (label.as_str(), *range)),
                    );
                    let new_state = new_range
                        .map(|range| (normalized_label(field, raw_new.unwrap_or_default()), range));
                    let new_display = display_value(
                        field,
                        new_state.as_ref().map(|(label, range)| (label.as_str(), *range)),
                    );
                    let details = details_line(field, kind, &old_display, &new_display);
                    events.push(TimeCreepEvent {
                        issue_key: key.to_string(),
                        field,
                        event_type: kind,
                        old_display,
                        new_display,
                        details,
                        timestamp: day,
                    });
                }
            }

            if let (Some(raw), Some(range)) = (raw_new, new_range) {
                known.insert(field, (normalized_label(field, raw), range));
            }
        }
    }

    events
}

fn classify(old_end: Option<NaiveDate>, new_end: Option<NaiveDate>) -> Option<TimeCreepKind> {
    match (old_end, new_end) {
        (None, Some(_)) => Some(TimeCreepKind::TimeSet),
        (Some(old), Some(new)) if new > old => Some(TimeCreepKind::TimeCreep),
        (Some(old), Some(new)) if new < old => Some(TimeCreepKind::TimePullIn),
        _ => None,
    }
}

fn normalized_label(field: TrackedField, raw: &str) -> String {
    match field {
        TrackedField::FixVersions => normalize_fix_version(raw),
        TrackedField::TargetEnd => raw.to_string(),
    }
}

fn display_value(field: TrackedField, state: Option<(&str, (NaiveDate, NaiveDate))>) -> String {
    match state {
        None => "None".to_string(),
        Some((label, range)) => match field {
            TrackedField::FixVersions => label.to_string(),
            TrackedField::TargetEnd => range.1.format("%Y-%m-%d").to_string(),
        },
    }
}

fn details_line(
    field: TrackedField,
    kind: TimeCreepKind,
    old_display: &str,
    new_display: &str,
) -> String {
    match kind {
        TimeCreepKind::TimeSet => {
            format!("Termin '{}' gesetzt auf: {}", field.label(), new_display)
        }
        TimeCreepKind::TimeCreep => format!(
            "Termin '{}' verschoben von {} auf {}",
            field.label(),
            old_display,
            new_display
        ),
        TimeCreepKind::TimePullIn => format!(
            "Termin '{}' vorgezogen von {} auf {}",
            field.label(),
            old_display,
            new_display
        ),
    }
}

fn parse_field_value(field: TrackedField, raw: &str) -> Option<(NaiveDate, NaiveDate)> {
    match field {
        TrackedField::TargetEnd => parse_target_date(raw),
        TrackedField::FixVersions => parse_fix_version(raw),
    }
}

/// Parses a target date. ISO forms are tried first, then the display form
/// `dd/Mon/yyyy` after the last colon.
fn parse_target_date(raw: &str) -> Option<(NaiveDate, NaiveDate)> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some((date, date));
    }
    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_rfc3339(raw) {
        let date = dt.date_naive();
        return Some((date, date));
    }
    let cleaned = raw.rsplit(':').next().unwrap_or(raw).trim();
    match NaiveDate::parse_from_str(cleaned, "%d/%b/%Y") {
        Ok(date) => Some((date, date)),
        Err(_) => {
            warn!("Unparseable target date: '{}'", raw);
            None
        }
    }
}

/// Resolves a fix version label to the calendar quarter it names.
fn parse_fix_version(raw: &str) -> Option<(NaiveDate, NaiveDate)> {
    if let Some(caps) = PI_RE.captures(raw) {
        let pi: i32 = caps[1].parse().ok()?;
        let offset = pi - PI_ANCHOR;
        let year = PI_ANCHOR_YEAR + offset.div_euclid(4);
        let quarter = offset.rem_euclid(4) as u32 + 1;
        return quarter_range(year, quarter);
    }
    if let Some(caps) = QUARTER_RE.captures(raw) {
        let quarter: u32 = caps[1].parse().ok()?;
        let year: i32 = caps[2].parse::<i32>().ok()? + 2000;
        return quarter_range(year, quarter);
    }
    warn!("Unrecognized fix version label: '{}'", raw);
    None
}

fn quarter_range(year: i32, quarter: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start_month = (quarter - 1) * 3 + 1;
    let end_month = start_month + 2;
    let end_day = match end_month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        2 => {
            if year % 4 == 0 {
                29
            } else {
                28
            }
        }
        _ => 30,
    };
    Some((
        NaiveDate::from_ymd_opt(year, start_month, 1)?,
        NaiveDate::from_ymd_opt(year, end_month, end_day)?,
    ))
}

/// Shortens a fix version string to its PI or quarter token.
fn normalize_fix_version(raw: &str) -> String {
    if let Some(m) = PI_RE.find(raw) {
        return m.as_str().to_string();
    }
    if let Some(m) = QUARTER_RE.find(raw) {
        return m.as_str().to_string();
    }
    raw.to_string()
}

async fn narrative(
    data: &ProjectData,
    events: &[TimeCreepEvent],
    summarizer: &dyn Summarizer,
) -> String {
    let digest: Vec<String> = events
        .iter()
        .filter(|e| e.event_type == TimeCreepKind::TimeCreep)
        .map(|e| format!("- {}: {}", e.issue_key, e.details))
        .collect();

    if digest.is_empty() {
        return NO_SHIFT_TEMPLATE.replacen("{}", &data.epic_id, 1);
    }

    let context = data
        .issues
        .get(&data.epic_id)
        .map(|issue| {
            let mut stripped = issue.clone();
            stripped.activities = vec![];
            serde_json::to_string_pretty(&stripped).unwrap_or_default()
        })
        .unwrap_or_else(|| format!("Business Epic {}", data.epic_id));

    let prompt = format!(
        "Kontext zum Business Epic:\n{}\n\n\
         Erkannte Terminverschiebungen:\n{}\n\n\
         Fasse die Terminsituation dieses Business Epics in einem kurzen \
         Absatz auf Deutsch zusammen. Benenne die wesentlichen \
         Verschiebungen und ihre Größenordnung.",
        context,
        digest.join("\n")
    );

    match summarizer.summarize(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Time creep summary failed: {}", e);
            SUMMARY_FAILED.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Issue;
    use crate::llm::{FailingSummarizer, StaticSummarizer};
    use crate::tree::BuiltTree;
    use std::collections::HashMap as StdHashMap;

    fn change(field: &str, old: Option<&str>, new: Option<&str>, ts: &str) -> ActivityEvent {
        ActivityEvent {
            user: "tester".to_string(),
            field_name: field.to_string(),
            old_value: old.map(str::to_string),
            new_value: new.map(str::to_string),
            timestamp: DateTime::parse_from_rfc3339(ts).unwrap(),
        }
    }

    fn data_with_epic(activities: Vec<ActivityEvent>) -> ProjectData {
        let mut graph = IssueGraph::new();
        graph.add_node("BE-1");
        let mut epic = Issue::new("BE-1", IssueType::BusinessEpic);
        epic.activities = activities;
        ProjectData::from_built(
            "BE-1",
            BuiltTree {
                graph,
                issues: StdHashMap::from([("BE-1".to_string(), epic)]),
                missing: vec![],
            },
        )
    }

    #[tokio::test]
    async fn test_set_creep_and_pull_in() {
        let data = data_with_epic(vec![
            change("Status", None, Some("ANALYSIS"), "2025-01-01T09:00:00+00:00"),
            change(
                "Target end",
                None,
                Some("2025-06-30"),
                "2025-01-05T09:00:00+00:00",
            ),
            change(
                "Target end",
                Some("2025-06-30"),
                Some("2025-09-30"),
                "2025-02-10T09:00:00+00:00",
            ),
            change(
                "Target end",
                Some("2025-09-30"),
                Some("2025-08-15"),
                "2025-03-01T09:00:00+00:00",
            ),
        ]);

        let result = analyze(&data, &StaticSummarizer::new("Zusammenfassung."))
            .await
            .unwrap();

        let kinds: Vec<TimeCreepKind> = result
            .time_creep_events
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TimeCreepKind::TimeSet,
                TimeCreepKind::TimeCreep,
                TimeCreepKind::TimePullIn
            ]
        );
        assert_eq!(result.time_creep_events[1].old_display, "2025-06-30");
        assert_eq!(result.time_creep_events[1].new_display, "2025-09-30");
        assert_eq!(result.narrative_summary, "Zusammenfassung.");
    }

    #[tokio::test]
    async fn test_first_recorded_value_is_always_a_set() {
        // The changelog claims an old value, but on the creation day there is
        // no prior state to compare against.
        let data = data_with_epic(vec![change(
            "Target end",
            Some("2025-03-31"),
            Some("2025-06-30"),
            "2025-01-05T09:00:00+00:00",
        )]);

        let result = analyze(&data, &StaticSummarizer::new("x")).await.unwrap();
        assert_eq!(result.time_creep_events.len(), 1);
        assert_eq!(
            result.time_creep_events[0].event_type,
            TimeCreepKind::TimeSet
        );
    }

    #[tokio::test]
    async fn test_same_day_changes_coalesce_to_last_value() {
        let data = data_with_epic(vec![
            change(
                "Target end",
                None,
                Some("2025-06-30"),
                "2025-01-05T09:00:00+00:00",
            ),
            change(
                "Target end",
                Some("2025-06-30"),
                Some("2025-12-31"),
                "2025-02-01T09:00:00+00:00",
            ),
            change(
                "Target end",
                Some("2025-12-31"),
                Some("2025-07-15"),
                "2025-02-01T15:00:00+00:00",
            ),
        ]);

        let result = analyze(&data, &StaticSummarizer::new("x")).await.unwrap();
        assert_eq!(result.time_creep_events.len(), 2);
        let second = &result.time_creep_events[1];
        assert_eq!(second.event_type, TimeCreepKind::TimeCreep);
        assert_eq!(second.new_display, "2025-07-15");
    }

    #[tokio::test]
    async fn test_fix_version_containing_target_end_is_suppressed() {
        let data = data_with_epic(vec![
            change(
                "Target end",
                None,
                Some("2025-08-15"),
                "2025-01-05T09:00:00+00:00",
            ),
            change(
                "Fix Version/s",
                None,
                Some("Release PI29"),
                "2025-02-01T09:00:00+00:00",
            ),
        ]);

        let result = analyze(&data, &StaticSummarizer::new("x")).await.unwrap();
        // PI29 spans Q3/2025 which contains the known target end.
        assert_eq!(result.time_creep_events.len(), 1);
        assert_eq!(result.time_creep_events[0].field, TrackedField::TargetEnd);
    }

    #[tokio::test]
    async fn test_cleared_field_is_ignored() {
        let data = data_with_epic(vec![
            change(
                "Target end",
                None,
                Some("2025-06-30"),
                "2025-01-05T09:00:00+00:00",
            ),
            change(
                "Target end",
                Some("2025-06-30"),
                None,
                "2025-02-01T09:00:00+00:00",
            ),
        ]);

        let result = analyze(&data, &StaticSummarizer::new("x")).await.unwrap();
        assert_eq!(result.time_creep_events.len(), 1);
    }

    #[tokio::test]
    async fn test_no_creep_yields_fixed_message() {
        let data = data_with_epic(vec![change(
            "Target end",
            None,
            Some("2025-06-30"),
            "2025-01-05T09:00:00+00:00",
        )]);

        let result = analyze(&data, &StaticSummarizer::new("x")).await.unwrap();
        assert_eq!(
            result.narrative_summary,
            "Das Business Epic BE-1 weist keine signifikanten Terminverschiebungen auf."
        );
    }

    #[tokio::test]
    async fn test_summarizer_failure_falls_back() {
        let data = data_with_epic(vec![
            change(
                "Target end",
                None,
                Some("2025-06-30"),
                "2025-01-05T09:00:00+00:00",
            ),
            change(
                "Target end",
                Some("2025-06-30"),
                Some("2025-09-30"),
                "2025-02-10T09:00:00+00:00",
            ),
        ]);

        let result = analyze(&data, &FailingSummarizer).await.unwrap();
        assert_eq!(result.narrative_summary, SUMMARY_FAILED);
    }

    #[tokio::test]
    async fn test_missing_root_node() {
        let data = ProjectData::from_built(
            "BE-9",
            BuiltTree {
                graph: IssueGraph::new(),
                issues: StdHashMap::new(),
                missing: vec![],
            },
        );
        let result = analyze(&data, &StaticSummarizer::new("x")).await.unwrap();
        assert!(result.time_creep_events.is_empty());
        assert_eq!(result.narrative_summary, MISSING_ROOT);
    }

    #[test]
    fn test_pi_quarter_resolution() {
        assert_eq!(
            parse_fix_version("PI27").unwrap(),
            (
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
            )
        );
        assert_eq!(
            parse_fix_version("PI31").unwrap().0,
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        );
        // Offsets before the anchor wrap into the previous year.
        assert_eq!(
            parse_fix_version("PI26").unwrap(),
            (
                NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
            )
        );
        assert_eq!(
            parse_fix_version("Q3_25").unwrap(),
            (
                NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 9, 30).unwrap()
            )
        );
        assert!(parse_fix_version("Backlog").is_none());
    }

    #[test]
    fn test_target_date_formats() {
        assert_eq!(
            parse_target_date("2025-06-30").unwrap().1,
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
        );
        assert_eq!(
            parse_target_date("2025-06-30T00:00:00+02:00").unwrap().1,
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
        );
        assert_eq!(
            parse_target_date("Target end: 15/Jun/2025").unwrap().1,
            NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
        );
        assert!(parse_target_date("morgen").is_none());
    }

    #[test]
    fn test_normalize_fix_version_labels() {
        assert_eq!(normalize_fix_version("Release Train PI29"), "PI29");
        assert_eq!(normalize_fix_version("Roadmap Q3_25"), "Q3_25");
        assert_eq!(normalize_fix_version("Backlog"), "Backlog");
    }

    #[test]
    fn test_annotate_graph() {
        let mut graph = IssueGraph::new();
        graph.add_node("BE-1");
        let analysis = TimeCreepAnalysis {
            time_creep_events: vec![TimeCreepEvent {
                issue_key: "BE-1".to_string(),
                field: TrackedField::TargetEnd,
                event_type: TimeCreepKind::TimeCreep,
                old_display: "2025-06-30".to_string(),
                new_display: "2025-09-30".to_string(),
                details: "Termin 'Target end' verschoben von 2025-06-30 auf 2025-09-30"
                    .to_string(),
                timestamp: NaiveDate::from_ymd_opt(2025, 2, 10).unwrap(),
            }],
            narrative_summary: "Zusammenfassung.".to_string(),
        };

        annotate_graph(&mut graph, "BE-1", &analysis);
        assert!(graph.attr("BE-1", "time_creep_events").is_some());
        assert_eq!(
            graph.attr("BE-1", "llm_time_creep_summary"),
            Some(&serde_json::Value::String("Zusammenfassung.".to_string()))
        );
    }
}
