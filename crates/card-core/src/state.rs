//! Condition state: the snapshot of dynamic runtime state conditions are evaluated against

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Live telemetry value of a single host entity
///
/// Only the state value takes part in condition matching; attributes are
/// carried so that equality checks notice attribute-only updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// The state value (e.g., "on", "off", "23.5", "unavailable")
    pub state: String,

    /// Additional attributes associated with the state
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl EntityState {
    /// Create an entity state without attributes
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// How the card lays out its cameras
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    Single,
    Grid,
}

/// Microphone sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MicrophoneState {
    #[serde(default)]
    pub connected: bool,

    #[serde(default)]
    pub muted: bool,
}

/// The authenticated host user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Whether a key is held down or released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPress {
    #[default]
    Down,
    Up,
}

/// State of a single keyboard key, with the modifiers held at the time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyState {
    #[serde(default)]
    pub state: KeyPress,

    #[serde(default)]
    pub ctrl: bool,

    #[serde(default)]
    pub alt: bool,

    #[serde(default)]
    pub meta: bool,

    #[serde(default)]
    pub shift: bool,
}

impl KeyState {
    /// A key held down with no modifiers
    pub fn down() -> Self {
        Self::default()
    }

    /// A released key with no modifiers
    pub fn up() -> Self {
        Self {
            state: KeyPress::Up,
            ..Self::default()
        }
    }
}

/// Snapshot of dynamic runtime state
///
/// Every field is optional: a field that has never been set is `None`. The
/// same type doubles as a partial update, where a `Some` field means "this key
/// is supplied" and `None` means "leave as is".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullscreen: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,

    /// Host entity telemetry keyed by entity id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<HashMap<String, EntityState>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_loaded: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_mode: Option<DisplayMode>,

    /// Cameras currently considered triggered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered: Option<HashSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microphone: Option<MicrophoneState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// Keyboard state keyed by key name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<HashMap<String, KeyState>>,
}

/// A key of [`ConditionState`]
///
/// Partial updates can only supply values; clearing a key goes through
/// [`ConditionState::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKey {
    View,
    Fullscreen,
    Expand,
    Camera,
    Entities,
    MediaLoaded,
    DisplayMode,
    Triggered,
    Interaction,
    Microphone,
    User,
    Keys,
}

/// Replace `slot` with `value` when supplied, recording whether it differed.
fn replace<T: PartialEq>(slot: &mut Option<T>, value: Option<T>, changed: &mut bool) {
    if let Some(value) = value {
        if slot.as_ref() != Some(&value) {
            *changed = true;
            *slot = Some(value);
        }
    }
}

impl ConditionState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Shallow-merge a partial update into this state
    ///
    /// Only keys supplied in `patch` are replaced. Returns `true` if at least
    /// one supplied key differed from the current value; when every supplied
    /// key is deep-equal to the current value the state is left untouched and
    /// `false` is returned.
    pub fn merge(&mut self, patch: ConditionState) -> bool {
        let mut changed = false;
        replace(&mut self.view, patch.view, &mut changed);
        replace(&mut self.fullscreen, patch.fullscreen, &mut changed);
        replace(&mut self.expand, patch.expand, &mut changed);
        replace(&mut self.camera, patch.camera, &mut changed);
        replace(&mut self.entities, patch.entities, &mut changed);
        replace(&mut self.media_loaded, patch.media_loaded, &mut changed);
        replace(&mut self.display_mode, patch.display_mode, &mut changed);
        replace(&mut self.triggered, patch.triggered, &mut changed);
        replace(&mut self.interaction, patch.interaction, &mut changed);
        replace(&mut self.microphone, patch.microphone, &mut changed);
        replace(&mut self.user, patch.user, &mut changed);
        replace(&mut self.keys, patch.keys, &mut changed);
        changed
    }

    /// Remove the values of `keys`, returning whether any of them was set
    pub fn clear(&mut self, keys: &[StateKey]) -> bool {
        let mut changed = false;
        for key in keys {
            let cleared = match key {
                StateKey::View => self.view.take().is_some(),
                StateKey::Fullscreen => self.fullscreen.take().is_some(),
                StateKey::Expand => self.expand.take().is_some(),
                StateKey::Camera => self.camera.take().is_some(),
                StateKey::Entities => self.entities.take().is_some(),
                StateKey::MediaLoaded => self.media_loaded.take().is_some(),
                StateKey::DisplayMode => self.display_mode.take().is_some(),
                StateKey::Triggered => self.triggered.take().is_some(),
                StateKey::Interaction => self.interaction.take().is_some(),
                StateKey::Microphone => self.microphone.take().is_some(),
                StateKey::User => self.user.take().is_some(),
                StateKey::Keys => self.keys.take().is_some(),
            };
            changed |= cleared;
        }
        changed
    }

    /// Return a copy of this state with `overrides` shallow-merged on top
    pub fn merged_with(&self, overrides: &ConditionState) -> ConditionState {
        let mut merged = self.clone();
        merged.merge(overrides.clone());
        merged
    }

    /// Names of the keys supplied by this (partial) state
    pub fn supplied_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        let mut push = |present: bool, name: &'static str| {
            if present {
                keys.push(name);
            }
        };
        push(self.view.is_some(), "view");
        push(self.fullscreen.is_some(), "fullscreen");
        push(self.expand.is_some(), "expand");
        push(self.camera.is_some(), "camera");
        push(self.entities.is_some(), "entities");
        push(self.media_loaded.is_some(), "media_loaded");
        push(self.display_mode.is_some(), "display_mode");
        push(self.triggered.is_some(), "triggered");
        push(self.interaction.is_some(), "interaction");
        push(self.microphone.is_some(), "microphone");
        push(self.user.is_some(), "user");
        push(self.keys.is_some(), "keys");
        keys
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn with_camera(mut self, camera: impl Into<String>) -> Self {
        self.camera = Some(camera.into());
        self
    }

    pub fn with_interaction(mut self, interaction: bool) -> Self {
        self.interaction = Some(interaction);
        self
    }

    pub fn with_fullscreen(mut self, fullscreen: bool) -> Self {
        self.fullscreen = Some(fullscreen);
        self
    }

    /// Set a single entity's telemetry, keeping any entities already present
    pub fn with_entity(mut self, entity_id: impl Into<String>, state: EntityState) -> Self {
        self.entities
            .get_or_insert_with(HashMap::new)
            .insert(entity_id.into(), state);
        self
    }

    pub fn with_triggered<I, S>(mut self, cameras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggered = Some(cameras.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>, state: KeyState) -> Self {
        self.keys
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), state);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_replaces_only_supplied_keys() {
        let mut state = ConditionState::new().with_view("live").with_camera("front");
        let changed = state.merge(ConditionState::new().with_view("clips"));

        assert!(changed);
        assert_eq!(state.view.as_deref(), Some("clips"));
        assert_eq!(state.camera.as_deref(), Some("front"));
    }

    #[test]
    fn test_clear_removes_values() {
        let mut state = ConditionState::new().with_view("live").with_camera("front");

        assert!(state.clear(&[StateKey::Camera, StateKey::User]));
        assert_eq!(state.camera, None);
        assert_eq!(state.view.as_deref(), Some("live"));

        assert!(!state.clear(&[StateKey::Camera]));
        assert!(!state.clear(&[]));

        let key: StateKey = serde_json::from_value(serde_json::json!("media_loaded")).unwrap();
        assert_eq!(key, StateKey::MediaLoaded);
    }

    #[test]
    fn test_merge_unchanged_values_is_noop() {
        let mut state = ConditionState::new()
            .with_view("live")
            .with_entity("binary_sensor.door", EntityState::new("on"));
        let before = state.clone();

        let changed = state.merge(
            ConditionState::new()
                .with_view("live")
                .with_entity("binary_sensor.door", EntityState::new("on")),
        );

        assert!(!changed);
        assert_eq!(state, before);
    }

    #[test]
    fn test_merge_entities_replaces_whole_map() {
        let mut state = ConditionState::new()
            .with_entity("light.a", EntityState::new("on"))
            .with_entity("light.b", EntityState::new("off"));

        state.merge(ConditionState::new().with_entity("light.a", EntityState::new("off")));

        let entities = state.entities.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities["light.a"].state, "off");
    }

    #[test]
    fn test_attribute_change_is_a_change() {
        let mut state =
            ConditionState::new().with_entity("sensor.temp", EntityState::new("21"));
        let changed = state.merge(ConditionState::new().with_entity(
            "sensor.temp",
            EntityState::new("21").with_attribute("unit", serde_json::json!("C")),
        ));
        assert!(changed);
    }

    #[test]
    fn test_merged_with_does_not_touch_original() {
        let state = ConditionState::new().with_view("live");
        let merged = state.merged_with(&ConditionState::new().with_view("clips"));

        assert_eq!(state.view.as_deref(), Some("live"));
        assert_eq!(merged.view.as_deref(), Some("clips"));
    }

    #[test]
    fn test_supplied_keys() {
        let patch = ConditionState::new()
            .with_view("live")
            .with_key("a", KeyState::down());
        assert_eq!(patch.supplied_keys(), vec!["view", "keys"]);
    }

    #[test]
    fn test_deserialize_partial_state() {
        let json = r#"{
            "view": "live",
            "triggered": ["front", "back"],
            "keys": {"f": {"state": "down", "ctrl": true}}
        }"#;

        let state: ConditionState = serde_json::from_str(json).unwrap();
        assert_eq!(state.view.as_deref(), Some("live"));
        assert_eq!(state.triggered.as_ref().map(|t| t.len()), Some(2));
        let key = state.keys.unwrap()["f"];
        assert_eq!(key.state, KeyPress::Down);
        assert!(key.ctrl);
        assert!(!key.shift);
        assert!(state.camera.is_none());
    }
}
