use midi_types::{Channel, Control, MidiMessage, Note, Value7};
use tracing::debug;

/// Host connection status line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    text: String,
}

impl ConnectionStatus {
    pub fn set(&mut self, text: String) {
        self.text = text;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Drives the green/red indicator
    pub fn is_affirmative(&self) -> bool {
        self.text.contains("Connected") || self.text.contains("Ready")
    }

    pub fn is_connected(&self) -> bool {
        self.text.contains("Connected")
    }

    /// Label of the connect toggle
    pub fn toggle_label(&self) -> &'static str {
        if self.is_connected() { "Disconnect" } else { "Connect" }
    }
}

/// MIDI input ports the host can open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortList {
    ports: Vec<String>,
    selected: Option<usize>,
}

impl PortList {
    /// Replace the list; a negative or out-of-range selection means none
    pub fn apply(&mut self, ports: Vec<String>, selected: i64) {
        self.selected = usize::try_from(selected)
            .ok()
            .filter(|&i| i < ports.len());
        self.ports = ports;
    }

    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Pick a port locally; the host confirms with its next `ports` event
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.ports.len() {
            self.selected = Some(index);
            true
        } else {
            false
        }
    }
}

/// Live view of incoming MIDI: which of the 128 keys are lit
#[derive(Debug, Clone)]
pub struct MidiActivity {
    lit: [bool; 128],
}

impl Default for MidiActivity {
    fn default() -> Self {
        Self { lit: [false; 128] }
    }
}

impl MidiActivity {
    /// Raw `midi_note` event; velocity 0 is a note-off. `None` when either
    /// value is outside the 7-bit MIDI range.
    pub fn note_message(note: u8, velocity: u8) -> Option<MidiMessage> {
        if note > 0x7F || velocity > 0x7F {
            debug!("Dropping out-of-range note event: note {} velocity {}", note, velocity);
            return None;
        }
        let channel = Channel::new(0);
        let note = Note::from(note);
        Some(if velocity == 0 {
            MidiMessage::NoteOff(channel, note, Value7::new(0))
        } else {
            MidiMessage::NoteOn(channel, note, Value7::new(velocity))
        })
    }

    /// Raw `midi_cc` event, with the same range check as notes
    pub fn cc_message(cc: u8, value: u8) -> Option<MidiMessage> {
        if cc > 0x7F || value > 0x7F {
            debug!("Dropping out-of-range CC event: cc {} value {}", cc, value);
            return None;
        }
        Some(MidiMessage::ControlChange(
            Channel::new(0),
            Control::new(cc),
            Value7::new(value),
        ))
    }

    /// Update the key view. Returns the activity line to log, if any.
    pub fn process_midi_message(&mut self, message: MidiMessage) -> Option<String> {
        match message {
            MidiMessage::NoteOn(_, note, velocity) => self.touch("Note", note.into(), velocity.into()),
            MidiMessage::NoteOff(_, note, _) => self.touch("Note", note.into(), 0),
            MidiMessage::ControlChange(_, control, value) => {
                self.touch("CC", control.into(), value.into())
            }
            _ => {
                debug!("Ignoring MIDI message: {:?}", message);
                None
            }
        }
    }

    fn touch(&mut self, kind: &str, number: u8, value: u8) -> Option<String> {
        if let Some(slot) = self.lit.get_mut(usize::from(number)) {
            *slot = value > 0;
        }
        (value > 0).then(|| format!("{kind} {number} (Val: {value})"))
    }

    /// Keys currently lit, lowest first
    pub fn lit_keys(&self) -> Vec<u8> {
        (0..=127u8).filter(|&n| self.lit[usize::from(n)]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_drives_indicator() {
        let mut status = ConnectionStatus::default();
        status.set("Ready".into());
        assert!(status.is_affirmative());
        assert_eq!(status.toggle_label(), "Connect");

        status.set("Connected: Launchkey".into());
        assert!(status.is_connected());
        assert_eq!(status.toggle_label(), "Disconnect");

        status.set("Port closed".into());
        assert!(!status.is_affirmative());
    }

    #[test]
    fn port_selection_bounds() {
        let mut ports = PortList::default();
        ports.apply(vec!["A".into(), "B".into()], 1);
        assert_eq!(ports.selected(), Some(1));
        ports.apply(vec!["A".into()], 1);
        assert_eq!(ports.selected(), None);
        ports.apply(vec!["A".into()], -1);
        assert_eq!(ports.selected(), None);
        assert!(ports.select(0));
        assert!(!ports.select(4));
        assert_eq!(ports.selected(), Some(0));
    }

    #[test]
    fn notes_light_and_release_keys() {
        let mut activity = MidiActivity::default();
        let note = |n, v| MidiActivity::note_message(n, v).unwrap();

        let line = activity.process_midi_message(note(60, 90));
        assert_eq!(line.as_deref(), Some("Note 60 (Val: 90)"));
        assert_eq!(activity.lit_keys(), [60]);

        assert_eq!(activity.process_midi_message(note(60, 0)), None);
        assert!(activity.lit_keys().is_empty());

        let cc = MidiActivity::cc_message(7, 127).unwrap();
        assert_eq!(activity.process_midi_message(cc).as_deref(), Some("CC 7 (Val: 127)"));
        assert_eq!(activity.lit_keys(), [7]);
    }

    #[test]
    fn out_of_range_values_are_dropped_not_folded() {
        assert!(MidiActivity::note_message(60, 128).is_none());
        assert!(MidiActivity::note_message(200, 5).is_none());
        assert!(MidiActivity::cc_message(128, 1).is_none());
        assert!(MidiActivity::cc_message(1, 255).is_none());
        assert!(MidiActivity::note_message(127, 127).is_some());
    }
}
