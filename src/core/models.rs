use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Resolutions that exclude an issue from traversal unless
/// `include_rejected` is set.
pub const EXCLUDED_RESOLUTIONS: [&str; 2] = ["Rejected", "Withdrawn"];

/// Work-item type. The tracker exposes an open string set; anything we do
/// not know becomes `Unknown` and carries the raw string instead of
/// silently matching nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IssueType {
    #[strum(serialize = "Business Initiative")]
    BusinessInitiative,
    #[strum(serialize = "Business Epic")]
    BusinessEpic,
    #[strum(serialize = "Portfolio Epic")]
    PortfolioEpic,
    #[strum(serialize = "Initiative")]
    Initiative,
    #[strum(serialize = "Epic")]
    Epic,
    #[strum(serialize = "Story")]
    Story,
    #[strum(serialize = "Bug")]
    Bug,
    #[strum(default)]
    Unknown(String),
}

impl IssueType {
    /// True for the empty/unrecognized types that invalidate a root.
    pub fn is_unknown(&self) -> bool {
        matches!(self, IssueType::Unknown(_))
    }
}

impl Default for IssueType {
    fn default() -> Self {
        IssueType::Unknown(String::new())
    }
}

impl From<String> for IssueType {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(IssueType::Unknown(s))
    }
}

impl From<IssueType> for String {
    fn from(t: IssueType) -> Self {
        t.to_string()
    }
}

/// Label on a directed edge between two issues.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationType {
    #[strum(serialize = "child")]
    Child,
    #[strum(serialize = "realized_by")]
    RealizedBy,
    #[strum(serialize = "issue_in_epic")]
    IssueInEpic,
    #[strum(serialize = "linked")]
    Linked,
    #[strum(default)]
    Unknown(String),
}

impl From<String> for RelationType {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(RelationType::Unknown(s))
    }
}

impl From<RelationType> for String {
    fn from(r: RelationType) -> Self {
        r.to_string()
    }
}

/// One outgoing typed link of an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(alias = "key")]
    pub target_key: String,
    #[serde(alias = "relation")]
    pub relation_type: RelationType,
}

/// One field-change record from an issue's change history.
///
/// Stored per issue in chronological order as extracted. The German serde
/// aliases keep records written by the original scraper loadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    #[serde(default, alias = "benutzer")]
    pub user: String,
    #[serde(alias = "feld_name")]
    pub field_name: String,
    #[serde(default, alias = "alter_wert")]
    pub old_value: Option<String>,
    #[serde(default, alias = "neuer_wert")]
    pub new_value: Option<String>,
    #[serde(alias = "zeitstempel_iso")]
    pub timestamp: DateTime<FixedOffset>,
}

/// An activity event tagged with its owning issue, the unit of the global
/// activity stream produced by [`crate::tree::provider::ProjectData`].
#[derive(Debug, Clone, Serialize)]
pub struct TaggedActivity {
    pub issue_key: String,
    #[serde(flatten)]
    pub event: ActivityEvent,
}

/// One work item, the durable per-key record layout of the issue store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    #[serde(default)]
    pub issue_type: IssueType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub target_start: Option<String>,
    #[serde(default)]
    pub target_end: Option<String>,
    #[serde(default)]
    pub fix_versions: Vec<String>,
    #[serde(default, deserialize_with = "de_story_points")]
    pub story_points: Option<f64>,
    #[serde(default, alias = "links")]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub issues_in_epic: Vec<String>,
    #[serde(default)]
    pub activities: Vec<ActivityEvent>,
}

impl Issue {
    pub fn new(key: impl Into<String>, issue_type: IssueType) -> Self {
        Self {
            key: key.into(),
            issue_type,
            title: String::new(),
            status: String::new(),
            resolution: None,
            target_start: None,
            target_end: None,
            fix_versions: Vec::new(),
            story_points: None,
            relations: Vec::new(),
            issues_in_epic: Vec::new(),
            activities: Vec::new(),
        }
    }

    /// Terminal-state shortcut used by the freshness policy.
    pub fn is_closed(&self) -> bool {
        self.status.eq_ignore_ascii_case("closed")
    }

    pub fn has_excluded_resolution(&self) -> bool {
        self.resolution
            .as_deref()
            .map(|r| EXCLUDED_RESOLUTIONS.iter().any(|x| r.eq_ignore_ascii_case(x)))
            .unwrap_or(false)
    }

    pub fn points(&self) -> f64 {
        self.story_points.unwrap_or(0.0)
    }
}

/// Story points arrive as a number, a numeric string or nothing at all.
fn de_story_points<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// Per-issue-type whitelist of relation types the tree builder may follow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationMap(HashMap<IssueType, Vec<RelationType>>);

impl RelationMap {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, issue_type: IssueType, relations: Vec<RelationType>) {
        self.0.insert(issue_type, relations);
    }

    /// Allowed relations for a parent type; an unknown type yields an empty
    /// slice, which terminates that branch without error.
    pub fn allowed_for(&self, issue_type: &IssueType) -> &[RelationType] {
        self.0.get(issue_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Strategic levels only: Business Initiative/Epic and Portfolio Epic.
    pub fn management_light() -> Self {
        let mut map = Self::new();
        for t in [
            IssueType::BusinessInitiative,
            IssueType::BusinessEpic,
            IssueType::PortfolioEpic,
        ] {
            map.insert(t, vec![RelationType::RealizedBy, RelationType::Child]);
        }
        map
    }

    /// Strategic levels plus Initiatives and Epics.
    pub fn management() -> Self {
        let mut map = Self::management_light();
        map.insert(
            IssueType::Initiative,
            vec![RelationType::RealizedBy, RelationType::Child],
        );
        map.insert(
            IssueType::Epic,
            vec![
                RelationType::IssueInEpic,
                RelationType::RealizedBy,
                RelationType::Linked,
            ],
        );
        map
    }

    /// The most comprehensive hierarchy we follow.
    pub fn full() -> Self {
        Self::management()
    }
}
