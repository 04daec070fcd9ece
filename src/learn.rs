use crate::bridge::{Action, BridgeSender};
use tracing::{debug, info, warn};

const AWAITING_MIDI_PROMPT: &str = "Waiting for MIDI...";

/// Host learn phases as numbered on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LearnPhase {
    #[default]
    Idle,
    AwaitingMidi,
    AwaitingKey,
}

impl LearnPhase {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(LearnPhase::Idle),
            1 => Some(LearnPhase::AwaitingMidi),
            2 => Some(LearnPhase::AwaitingKey),
            _ => None,
        }
    }
}

/// Mirror of the host's learn session plus the overlay that goes with it.
///
/// The host owns the capture itself. Phase numbering wraps back to 0 at the
/// end, so only `learn_done` (or a local cancel) closes the overlay.
#[derive(Debug)]
pub struct LearnSession {
    phase: LearnPhase,
    prompt: String,
    overlay_visible: bool,
    bridge: BridgeSender,
}

impl LearnSession {
    pub fn new(bridge: BridgeSender) -> Self {
        Self {
            phase: LearnPhase::Idle,
            prompt: String::new(),
            overlay_visible: false,
            bridge,
        }
    }

    pub fn phase(&self) -> LearnPhase {
        self.phase
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    /// Learn entry points are disabled while this is true
    pub fn is_active(&self) -> bool {
        self.overlay_visible || self.phase != LearnPhase::Idle
    }

    /// Open the overlay and ask the host to start capturing. Refused while a
    /// session is already running; the host never sees a second start.
    pub fn start(&mut self) -> bool {
        if self.is_active() {
            warn!("Learn already in progress ({:?}), ignoring start", self.phase);
            return false;
        }
        self.phase = LearnPhase::AwaitingMidi;
        self.prompt = AWAITING_MIDI_PROMPT.to_string();
        self.overlay_visible = true;
        self.bridge.send(Action::StartLearn);
        info!("Learn started");
        true
    }

    /// Hide the overlay right away and tell the host to abort. Safe from any
    /// phase, including idle.
    pub fn cancel(&mut self) {
        if self.is_active() {
            info!("Learn cancelled in {:?}", self.phase);
        }
        self.phase = LearnPhase::Idle;
        self.overlay_visible = false;
        self.bridge.send(Action::CancelLearn);
    }

    /// Host moved to another phase. Updates the prompt; never closes the overlay.
    ///
    /// Ignored while the overlay is hidden: those are phases the host sent
    /// before it saw our `cancel_learn`.
    pub fn on_phase(&mut self, code: u8, text: String) {
        if !self.overlay_visible {
            debug!("Ignoring learn phase {} with no learn session open", code);
            return;
        }
        match LearnPhase::from_code(code) {
            Some(phase) => {
                if phase == LearnPhase::AwaitingMidi && self.phase == LearnPhase::AwaitingKey {
                    debug!("Host restarted the learn session");
                }
                self.phase = phase;
            }
            None => warn!("Unknown learn phase {}, keeping {:?}", code, self.phase),
        }
        self.prompt = text;
    }

    /// Terminal event from the host
    pub fn on_done(&mut self) {
        debug!("Learn finished");
        self.phase = LearnPhase::Idle;
        self.overlay_visible = false;
    }
}
