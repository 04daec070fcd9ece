use crate::context::ContextSnapshot;
use crate::mapping::{MappingRecord, MidiType};
use crate::store::MappingStore;
use anyhow::{Context, Result, bail};

/// Which inputs the editor offers for a given mapping type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldVisibility {
    pub key: bool,
    pub macro_text: bool,
    pub ai_prompt: bool,
    pub chord: bool,
}

impl FieldVisibility {
    pub fn for_type(kind: MidiType) -> Self {
        Self {
            key: kind.targets_key(),
            macro_text: kind == MidiType::Macro,
            ai_prompt: kind == MidiType::AiAction,
            chord: kind == MidiType::Chord,
        }
    }
}

/// Edits a full copy of one mapping. Hidden fields keep their values, so
/// switching the type back and forth loses nothing.
#[derive(Debug, Clone)]
pub struct MappingEditor {
    index: usize,
    draft: MappingRecord,
}

impl MappingEditor {
    pub fn open(store: &MappingStore, index: usize) -> Option<Self> {
        store.get(index).map(|record| Self {
            index,
            draft: record.clone(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn draft(&self) -> &MappingRecord {
        &self.draft
    }

    pub fn visible_fields(&self) -> FieldVisibility {
        FieldVisibility::for_type(self.draft.midi_type)
    }

    pub fn set(&mut self, field: &str, value: &str) -> Result<()> {
        let number = || -> Result<i32> {
            value
                .trim()
                .parse::<i32>()
                .with_context(|| format!("'{value}' is not a number for {field}"))
        };
        let code = || -> Result<u8> {
            value
                .trim()
                .parse::<u8>()
                .with_context(|| format!("'{value}' is not a valid {field}"))
        };

        match field {
            "midi_type" => self.draft.midi_type = MidiType::from(code()?),
            "gesture_id" => self.draft.gesture_id = code()?.into(),
            "midi_num" => self.draft.midi_num = number()?,
            "key_vk" => self.draft.key_vk = number()?,
            "midi_chord" => self.draft.midi_chord = parse_chord(value),
            "macro_text" => self.draft.macro_text = value.to_string(),
            "ai_prompt" => self.draft.ai_prompt = value.to_string(),
            "app_pattern" => self.draft.app_pattern = value.to_string(),
            "title_pattern" => self.draft.title_pattern = value.to_string(),
            other => bail!("Unknown mapping field '{other}'"),
        }
        Ok(())
    }

    /// Scope the draft to the foreground window currently tracked
    pub fn scope_to(&mut self, context: &ContextSnapshot) {
        self.draft.app_pattern = context.app.clone();
        self.draft.title_pattern = context.title.clone();
    }

    /// Close the editor, handing back the index it was opened on and the draft
    pub fn finish(self) -> (usize, MappingRecord) {
        (self.index, self.draft)
    }
}

/// Comma-separated note numbers; entries that don't start with a number are dropped
pub fn parse_chord(text: &str) -> Vec<i32> {
    text.split(',').filter_map(leading_int).collect()
}

fn leading_int(entry: &str) -> Option<i32> {
    let entry = entry.trim();
    let digits_from = usize::from(entry.starts_with(['-', '+']));
    let end = entry[digits_from..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(entry.len(), |i| i + digits_from);
    if end == digits_from {
        return None;
    }
    entry[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeSender;
    use crate::mapping::Gesture;

    #[test]
    fn chord_text_parses_like_a_form_field() {
        assert_eq!(parse_chord("60, 64,67"), vec![60, 64, 67]);
        assert_eq!(parse_chord("60, x, 64abc, , -1"), vec![60, 64, -1]);
        assert!(parse_chord("").is_empty());
    }

    #[test]
    fn visibility_follows_type() {
        assert_eq!(
            FieldVisibility::for_type(MidiType::Chord),
            FieldVisibility { key: true, macro_text: false, ai_prompt: false, chord: true }
        );
        assert_eq!(
            FieldVisibility::for_type(MidiType::AiAction),
            FieldVisibility { key: false, macro_text: false, ai_prompt: true, chord: false }
        );
        assert!(FieldVisibility::for_type(MidiType::Reserved(3)).key);
    }

    #[test]
    fn type_switch_keeps_hidden_fields() {
        let (bridge, _rx) = BridgeSender::channel();
        let mut store = MappingStore::new(bridge);
        store.apply_snapshot(vec![MappingRecord {
            midi_num: 60,
            key_vk: 65,
            ..Default::default()
        }]);

        let mut editor = MappingEditor::open(&store, 0).unwrap();
        editor.set("midi_type", "4").unwrap();
        editor.set("macro_text", "hi").unwrap();
        editor.set("gesture_id", "1").unwrap();
        assert!(editor.visible_fields().macro_text);
        assert!(!editor.visible_fields().key);
        editor.set("midi_type", "0").unwrap();
        editor.set("midi_type", "4").unwrap();
        editor.scope_to(&ContextSnapshot {
            app: "notepad.exe".into(),
            title: "notes.txt".into(),
        });
        assert!(editor.set("volume", "11").is_err());
        assert!(editor.set("key_vk", "abc").is_err());

        let (index, record) = editor.finish();
        assert_eq!(index, 0);
        assert_eq!(record.midi_type, MidiType::Macro);
        assert_eq!(record.macro_text, "hi");
        assert_eq!(record.key_vk, 65);
        assert_eq!(record.midi_num, 60);
        assert_eq!(record.gesture_id, Gesture::DoubleTap);
        assert_eq!(record.app_pattern, "notepad.exe");
        assert_eq!(record.title_pattern, "notes.txt");

        assert_eq!(store.get(0).unwrap().midi_type, MidiType::Note);
        assert!(MappingEditor::open(&store, 3).is_none());
    }
}
