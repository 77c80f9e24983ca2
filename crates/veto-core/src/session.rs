//! Session model.
//!
//! A session is the unit of synchronization: one named veto in progress,
//! shared by every client attached to it. Two representations exist:
//!
//! - [`Session`]: the strongly typed shape clients are expected to send.
//! - [`SessionState`]: what the store actually holds. Submitted states are
//!   accepted without schema validation, so the stored form is a raw JSON
//!   document with a fallible typed view ([`SessionState::typed`]).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::{CoreError, Result};
use crate::sequencer::{self, VetoStep};

/// Default organization label for new sessions.
pub const DEFAULT_ORGANIZATION: &str = "Spectra";
/// Default team icon reference.
pub const DEFAULT_TEAM_ICON: &str = "/assets/misc/icon.webp";
/// Default match format.
pub const DEFAULT_FORMAT: &str = "bo3";
/// Default map pool, in display order.
pub const DEFAULT_MAP_POOL: [&str; 7] = [
    "Bind", "Haven", "Split", "Sunset", "Pearl", "Abyss", "Corrode",
];

/// Kind of veto action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Remove a map from the pool.
    Ban,
    /// Choose a map to be played.
    Pick,
    /// Choose a starting side on the last picked map.
    Side,
    /// Choose a side on the decider map.
    Decider,
}

impl Stage {
    /// Wire name of the stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Pick => "pick",
            Self::Side => "side",
            Self::Decider => "decider",
        }
    }
}

/// Which side must act.
///
/// Serialized as the legacy integer index: `0`, `1`, or `-1` when the
/// operator may assign the action to either team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i64")]
pub enum ActingSide {
    /// Team at index 0.
    First,
    /// Team at index 1.
    Second,
    /// Operator-assignable ("customizable") step.
    Any,
}

impl ActingSide {
    /// Team index for this side, `None` for [`ActingSide::Any`].
    pub fn team_index(self) -> Option<usize> {
        match self {
            Self::First => Some(0),
            Self::Second => Some(1),
            Self::Any => None,
        }
    }
}

impl From<ActingSide> for i8 {
    fn from(side: ActingSide) -> Self {
        match side {
            ActingSide::First => 0,
            ActingSide::Second => 1,
            ActingSide::Any => -1,
        }
    }
}

impl TryFrom<i64> for ActingSide {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::First),
            1 => Ok(Self::Second),
            -1 => Ok(Self::Any),
            other => Err(CoreError::InvalidSide(other)),
        }
    }
}

/// One competing team.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Display name.
    pub name: String,
    /// Short code shown on the overlay.
    pub tricode: String,
    /// Icon reference.
    pub url: String,
}

impl Team {
    /// Create a team.
    pub fn new(name: impl Into<String>, tricode: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tricode: tricode.into(),
            url: url.into(),
        }
    }
}

/// A map descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry {
    /// Map name.
    pub name: String,
}

impl MapEntry {
    /// Create a map descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Typed view of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Room key the session is registered under.
    pub session_identifier: String,
    /// Display label.
    pub organization_name: String,
    /// The two sides; index is the turn index.
    pub teams: [Team; 2],
    /// Format identifier (`bo3`, `bo5`, ...).
    pub format: String,
    /// Maps still eligible for selection.
    pub available_maps: Vec<MapEntry>,
    /// Maps already acted upon, in chronological order.
    pub selected_maps: Vec<MapEntry>,
    /// Current action kind (advisory).
    pub stage: Stage,
    /// Short code of the acting team.
    pub acting_team_code: String,
    /// Acting team index.
    pub acting_team: ActingSide,
}

impl Session {
    /// Next required action for this session's format and turn cursor.
    pub fn next_action(&self) -> Option<VetoStep> {
        sequencer::next_action(&self.format, self.selected_maps.len())
    }

    /// Convert into a storable document.
    pub fn to_state(&self) -> SessionState {
        let maps = |entries: &[MapEntry]| -> Vec<Value> {
            entries.iter().map(|m| json!({ "name": m.name })).collect()
        };
        let teams: Vec<Value> = self
            .teams
            .iter()
            .map(|t| json!({ "name": t.name, "tricode": t.tricode, "url": t.url }))
            .collect();
        SessionState(json!({
            "sessionIdentifier": self.session_identifier,
            "organizationName": self.organization_name,
            "teams": teams,
            "format": self.format,
            "availableMaps": maps(&self.available_maps),
            "selectedMaps": maps(&self.selected_maps),
            "stage": self.stage.as_str(),
            "actingTeamCode": self.acting_team_code,
            "actingTeam": i8::from(self.acting_team),
        }))
    }
}

/// Stored session document.
///
/// Replaced wholesale, never mutated in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState(Value);

impl SessionState {
    /// Wrap a submitted JSON document as-is.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The raw document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume and return the raw document.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Decode into the typed [`Session`] shape.
    pub fn typed(&self) -> Result<Session> {
        Ok(Session::deserialize(&self.0)?)
    }

    /// The `format` field, if present and a string.
    pub fn format(&self) -> Option<&str> {
        self.0.get("format").and_then(Value::as_str)
    }

    /// Length of `selectedMaps`, if present and an array.
    pub fn selected_count(&self) -> Option<usize> {
        self.0
            .get("selectedMaps")
            .and_then(Value::as_array)
            .map(Vec::len)
    }

    /// Sequencer lookup against the raw document.
    ///
    /// Works on partially malformed documents: only `format` and
    /// `selectedMaps` need to be well formed. A missing `selectedMaps` counts
    /// as zero selections.
    pub fn next_action(&self) -> Option<VetoStep> {
        sequencer::next_action(self.format()?, self.selected_count().unwrap_or(0))
    }
}

impl From<&Session> for SessionState {
    fn from(session: &Session) -> Self {
        session.to_state()
    }
}

/// Placeholder values for sessions created on first access.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionTemplate {
    /// Organization label.
    pub organization_name: String,
    /// Placeholder teams.
    pub teams: [Team; 2],
    /// Format identifier.
    pub format: String,
    /// Map pool, in display order.
    pub map_pool: Vec<String>,
}

impl Default for SessionTemplate {
    fn default() -> Self {
        Self {
            organization_name: DEFAULT_ORGANIZATION.to_string(),
            teams: [
                Team::new("Team 1", "T1", DEFAULT_TEAM_ICON),
                Team::new("Team 2", "T2", DEFAULT_TEAM_ICON),
            ],
            format: DEFAULT_FORMAT.to_string(),
            map_pool: DEFAULT_MAP_POOL.iter().map(ToString::to_string).collect(),
        }
    }
}

impl SessionTemplate {
    /// Build the default session for `session_id`.
    ///
    /// `availableMaps` and `selectedMaps` both start as the full pool; moving
    /// entries between them is the submitting client's job.
    pub fn build(&self, session_id: &str) -> Session {
        let maps: Vec<MapEntry> = self.map_pool.iter().map(MapEntry::new).collect();
        Session {
            session_identifier: session_id.to_string(),
            organization_name: self.organization_name.clone(),
            teams: self.teams.clone(),
            format: self.format.clone(),
            available_maps: maps.clone(),
            selected_maps: maps,
            stage: Stage::Ban,
            acting_team_code: self.teams[0].tricode.clone(),
            acting_team: ActingSide::First,
        }
    }
}
