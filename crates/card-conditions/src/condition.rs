//! Condition types
//!
//! Conditions are declarative tests evaluated against a [`ConditionState`]
//! snapshot (or, for `screen`, against the live viewport).
//!
//! [`ConditionState`]: card_core::ConditionState

use card_core::{DisplayMode, KeyPress};
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize a field that can be either a single string or an array of strings
pub(crate) fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(vec![s]),
        StringOrVec::Vec(v) => Ok(v),
    }
}

/// Condition definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Condition {
    /// Check entity state
    State(StateCondition),

    /// Check numeric value thresholds
    NumericState(NumericStateCondition),

    /// Check the current view
    View(ViewCondition),

    /// Check fullscreen mode
    Fullscreen(FullscreenCondition),

    /// Check expanded mode
    Expand(ExpandCondition),

    /// Check the selected camera
    Camera(CameraCondition),

    /// Check whether media has loaded
    MediaLoaded(MediaLoadedCondition),

    /// Check a viewport media query
    Screen(ScreenCondition),

    /// Check the display mode
    DisplayMode(DisplayModeCondition),

    /// Check whether any listed camera is triggered
    Triggered(TriggeredCondition),

    /// Check whether the user is interacting with the card
    Interaction(InteractionCondition),

    /// Check the microphone
    Microphone(MicrophoneCondition),

    /// Check a keyboard key
    Key(KeyCondition),

    /// Check the authenticated user
    Users(UsersCondition),

    /// All conditions must be true (AND)
    And(AndCondition),

    /// Any condition must be true (OR)
    Or(OrCondition),

    /// No condition may be true (NOT)
    Not(NotCondition),
}

impl Condition {
    /// Create an AND condition
    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And(AndCondition { conditions })
    }

    /// Create an OR condition
    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or(OrCondition { conditions })
    }

    /// Create a NOT condition
    pub fn not(conditions: Vec<Condition>) -> Self {
        Condition::Not(NotCondition { conditions })
    }

    /// Create a state condition matching a single value
    pub fn state(entity: impl Into<String>, state: impl Into<String>) -> Self {
        Condition::State(StateCondition {
            entity: entity.into(),
            state: Some(StateMatch::Single(state.into())),
            state_not: None,
        })
    }

    /// Create a view condition
    pub fn view<I, S>(views: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::View(ViewCondition {
            views: views.into_iter().map(Into::into).collect(),
        })
    }

    /// Create an interaction condition
    pub fn interaction(interaction: bool) -> Self {
        Condition::Interaction(InteractionCondition { interaction })
    }

    /// Create a screen condition
    pub fn screen(media_query: impl Into<String>) -> Self {
        Condition::Screen(ScreenCondition {
            media_query: media_query.into(),
        })
    }

    /// The condition discriminator as it appears in configuration
    pub fn kind(&self) -> &'static str {
        match self {
            Condition::State(_) => "state",
            Condition::NumericState(_) => "numeric_state",
            Condition::View(_) => "view",
            Condition::Fullscreen(_) => "fullscreen",
            Condition::Expand(_) => "expand",
            Condition::Camera(_) => "camera",
            Condition::MediaLoaded(_) => "media_loaded",
            Condition::Screen(_) => "screen",
            Condition::DisplayMode(_) => "display_mode",
            Condition::Triggered(_) => "triggered",
            Condition::Interaction(_) => "interaction",
            Condition::Microphone(_) => "microphone",
            Condition::Key(_) => "key",
            Condition::Users(_) => "users",
            Condition::And(_) => "and",
            Condition::Or(_) => "or",
            Condition::Not(_) => "not",
        }
    }

    /// Nested conditions of a compound condition
    pub fn children(&self) -> &[Condition] {
        match self {
            Condition::And(c) => &c.conditions,
            Condition::Or(c) => &c.conditions,
            Condition::Not(c) => &c.conditions,
            _ => &[],
        }
    }

    /// Whether evaluating this condition reads host entity telemetry
    pub fn depends_on_telemetry(&self) -> bool {
        match self {
            Condition::State(_) | Condition::NumericState(_) => true,
            other => other.children().iter().any(Condition::depends_on_telemetry),
        }
    }

    /// Push every viewport media query referenced by this condition
    pub fn collect_media_queries<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Screen(c) => out.push(&c.media_query),
            other => {
                for child in other.children() {
                    child.collect_media_queries(out);
                }
            }
        }
    }
}

/// State to match (single value or list of values)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateMatch {
    Single(String),
    List(Vec<String>),
}

impl StateMatch {
    /// Check if a state matches
    pub fn matches(&self, state: &str) -> bool {
        match self {
            StateMatch::Single(s) => s == state,
            StateMatch::List(list) => list.iter().any(|s| s == state),
        }
    }
}

/// State condition - check entity state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCondition {
    /// Entity ID to check
    pub entity: String,

    /// State to match (can be single or list)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateMatch>,

    /// State that must not match (can be single or list)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_not: Option<StateMatch>,
}

/// Numeric state condition - check numeric thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStateCondition {
    /// Entity ID to check
    pub entity: String,

    /// Value must be above this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above: Option<f64>,

    /// Value must be below this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewCondition {
    #[serde(deserialize_with = "string_or_vec")]
    pub views: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullscreenCondition {
    pub fullscreen: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandCondition {
    pub expand: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCondition {
    #[serde(deserialize_with = "string_or_vec")]
    pub cameras: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaLoadedCondition {
    pub media_loaded: bool,
}

/// Screen condition - evaluated against the live viewport, not the state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenCondition {
    /// Media query, e.g. `(orientation: landscape) and (min-width: 800px)`
    pub media_query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayModeCondition {
    pub display_mode: DisplayMode,
}

/// Triggered condition - true if any listed camera is currently triggered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredCondition {
    #[serde(deserialize_with = "string_or_vec")]
    pub triggered: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionCondition {
    pub interaction: bool,
}

/// Microphone condition - each flag is only checked when specified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrophoneCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

/// Key condition
///
/// The expected key state defaults to down. Modifiers only take part in the
/// match when they are specified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyCondition {
    /// Key name (e.g. `f`, `Escape`)
    pub key: String,

    #[serde(default)]
    pub state: KeyPress,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctrl: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<bool>,
}

/// Users condition - the authenticated user id must be listed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsersCondition {
    #[serde(deserialize_with = "string_or_vec")]
    pub users: Vec<String>,
}

/// AND condition - all must be true
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndCondition {
    pub conditions: Vec<Condition>,
}

/// OR condition - any must be true
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrCondition {
    pub conditions: Vec<Condition>,
}

/// NOT condition - none may be true
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotCondition {
    pub conditions: Vec<Condition>,
}
