use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Stable identity a host assigns to a mapping when it creates it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingId(pub u64);

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Trigger kind of a mapping; for macro and AI mappings it also selects the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum MidiType {
    #[default]
    Note,
    ControlChange,
    Chord,
    Macro,
    AiAction,
    /// Code 3 and anything the host invents later. Kept verbatim so it survives an edit.
    Reserved(u8),
}

impl From<u8> for MidiType {
    fn from(code: u8) -> Self {
        match code {
            0 => MidiType::Note,
            1 => MidiType::ControlChange,
            2 => MidiType::Chord,
            4 => MidiType::Macro,
            5 => MidiType::AiAction,
            other => MidiType::Reserved(other),
        }
    }
}

impl From<MidiType> for u8 {
    fn from(kind: MidiType) -> Self {
        match kind {
            MidiType::Note => 0,
            MidiType::ControlChange => 1,
            MidiType::Chord => 2,
            MidiType::Macro => 4,
            MidiType::AiAction => 5,
            MidiType::Reserved(code) => code,
        }
    }
}

impl MidiType {
    /// True when the mapping fires a virtual key rather than text
    pub fn targets_key(self) -> bool {
        !matches!(self, MidiType::Macro | MidiType::AiAction)
    }
}

/// Temporal pattern of the trigger that fires the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Gesture {
    #[default]
    Tap,
    DoubleTap,
    Hold,
    Unknown(u8),
}

impl From<u8> for Gesture {
    fn from(code: u8) -> Self {
        match code {
            0 => Gesture::Tap,
            1 => Gesture::DoubleTap,
            2 => Gesture::Hold,
            other => Gesture::Unknown(other),
        }
    }
}

impl From<Gesture> for u8 {
    fn from(gesture: Gesture) -> Self {
        match gesture {
            Gesture::Tap => 0,
            Gesture::DoubleTap => 1,
            Gesture::Hold => 2,
            Gesture::Unknown(code) => code,
        }
    }
}

impl Gesture {
    /// Short badge shown next to a mapping
    pub fn badge(self) -> &'static str {
        match self {
            Gesture::DoubleTap => "DBL",
            Gesture::Hold => "HLD",
            Gesture::Tap | Gesture::Unknown(_) => "TAP",
        }
    }
}

/// One user-configured binding, in the shape the host puts on the wire.
///
/// Every field is carried no matter which `midi_type` is selected, so that
/// switching the type in the editor and back never loses data. Fields the
/// host sends that this client does not know about are kept in `extra` and
/// echoed back on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingRecord {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub id: Option<MappingId>,
    #[serde(deserialize_with = "nullable")]
    pub midi_type: MidiType,
    #[serde(deserialize_with = "nullable")]
    pub midi_num: i32,
    #[serde(deserialize_with = "nullable")]
    pub midi_chord: Vec<i32>,
    #[serde(deserialize_with = "nullable")]
    pub gesture_id: Gesture,
    #[serde(deserialize_with = "nullable")]
    pub key_vk: i32,
    #[serde(deserialize_with = "nullable")]
    pub macro_text: String,
    #[serde(deserialize_with = "nullable")]
    pub ai_prompt: String,
    #[serde(deserialize_with = "nullable")]
    pub app_pattern: String,
    #[serde(deserialize_with = "nullable")]
    pub title_pattern: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The one action a record performs, selected by its `midi_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTarget<'a> {
    Key(i32),
    Macro(&'a str),
    Ai(&'a str),
}

impl MappingRecord {
    pub fn target(&self) -> ActionTarget<'_> {
        match self.midi_type {
            MidiType::Macro => ActionTarget::Macro(&self.macro_text),
            MidiType::AiAction => ActionTarget::Ai(&self.ai_prompt),
            _ => ActionTarget::Key(self.key_vk),
        }
    }

    /// Application filter, if the mapping is scoped to one
    pub fn app_scope(&self) -> Option<&str> {
        Some(self.app_pattern.as_str()).filter(|p| !p.is_empty())
    }

    /// Chord notes in entry order, comma-joined
    pub fn chord_text(&self, separator: &str) -> String {
        self.midi_chord
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(separator)
    }

    pub fn summary(&self) -> MappingSummary {
        let title = match self.midi_type {
            MidiType::Chord => format!("Chord [{}]", self.chord_text(",")),
            MidiType::ControlChange => format!("CC {}", self.midi_num),
            _ => format!("Note {}", self.midi_num),
        };

        let target = match (self.midi_type, self.target()) {
            (MidiType::Reserved(_), _) => "HUD".to_string(),
            (MidiType::Chord, ActionTarget::Key(vk)) => format!("Chord Key {vk}"),
            (_, ActionTarget::Key(vk)) => format!("Key {vk}"),
            (_, ActionTarget::Macro(_)) => "Macro".to_string(),
            (_, ActionTarget::Ai(_)) => "AI".to_string(),
        };

        MappingSummary {
            title,
            gesture: self.gesture_id.badge(),
            target,
            app_pill: self.app_scope().map(str::to_string),
        }
    }
}

/// Text rendition of one mapping card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingSummary {
    pub title: String,
    pub gesture: &'static str,
    pub target: String,
    pub app_pill: Option<String>,
}

impl fmt::Display for MappingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<20} {}  -> {}", self.title, self.gesture, self.target)?;
        if let Some(app) = &self.app_pill {
            write!(f, "  [{app}]")?;
        }
        Ok(())
    }
}

/// Treats an explicit `null` the same as a missing field
pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
