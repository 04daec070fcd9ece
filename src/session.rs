use crate::activity_log::ActivityLog;
use crate::ai::{AiError, AiGateway, TextGenerator};
use crate::bridge::{Action, BridgeSender, HostEvent};
use crate::config::ConfigSnapshot;
use crate::context::ContextTracker;
use crate::device::{ConnectionStatus, MidiActivity, PortList};
use crate::editor::MappingEditor;
use crate::learn::LearnSession;
use crate::mapping::MappingRecord;
use crate::store::MappingStore;
use anyhow::Result;
use midi_types::MidiMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What an AI call came back with
pub type AiResult = Result<String, AiError>;

/// All presentation-side state, owned in one place.
///
/// Host events and AI results are applied here one at a time, in arrival
/// order. The mirrors (mappings, config, context, ports) only ever change by
/// applying what the host sent; user intents go out as actions.
pub struct Session<G> {
    bridge: BridgeSender,
    store: MappingStore,
    editor: Option<MappingEditor>,
    learn: LearnSession,
    context: ContextTracker,
    status: ConnectionStatus,
    ports: PortList,
    activity: MidiActivity,
    host_config: ConfigSnapshot,
    log: ActivityLog,
    ai: AiGateway<G>,
    ai_results: mpsc::UnboundedSender<AiResult>,
}

impl<G: TextGenerator> Session<G> {
    pub fn new(
        bridge: BridgeSender,
        ai: AiGateway<G>,
        log_capacity: usize,
    ) -> (Self, mpsc::UnboundedReceiver<AiResult>) {
        let (ai_results, results_rx) = mpsc::unbounded_channel();
        let session = Self {
            store: MappingStore::new(bridge.clone()),
            learn: LearnSession::new(bridge.clone()),
            bridge,
            editor: None,
            context: ContextTracker::new(),
            status: ConnectionStatus::default(),
            ports: PortList::default(),
            activity: MidiActivity::default(),
            host_config: ConfigSnapshot::default(),
            log: ActivityLog::new(log_capacity),
            ai,
            ai_results,
        };
        (session, results_rx)
    }

    /// Ask the host for a full state dump. Sent once at startup.
    pub fn start(&self) {
        self.bridge.send(Action::Init);
    }

    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Mappings { mappings } => {
                if self.store.apply_snapshot(mappings) {
                    info!(
                        "Mappings updated (r{}): {} entries",
                        self.store.revision(),
                        self.store.len()
                    );
                }
            }
            HostEvent::MidiNote { note, velocity } => {
                if let Some(message) = MidiActivity::note_message(note, velocity) {
                    self.on_midi(message);
                }
            }
            HostEvent::MidiCc { cc, value } => {
                if let Some(message) = MidiActivity::cc_message(cc, value) {
                    self.on_midi(message);
                }
            }
            HostEvent::Status { text } => {
                info!("Host status: {}", text);
                self.status.set(text);
            }
            HostEvent::AppChanged { app, title } => {
                if let Some(current) = self.context.apply(app, title) {
                    let line = format!("Context: {} | {}", current.app, current.title);
                    self.log.system(line);
                }
            }
            HostEvent::LearnPhase { phase, text } => self.learn.on_phase(phase, text),
            HostEvent::LearnDone => self.learn.on_done(),
            HostEvent::Log { text, category } => self.log.push(text, category),
            HostEvent::RunAi { prompt } => self.run_ai(&prompt),
            HostEvent::Ports { ports, selected } => self.ports.apply(ports, selected),
            HostEvent::Config { config } => {
                debug!("Host config replaced");
                self.host_config = config;
            }
        }
    }

    fn on_midi(&mut self, message: MidiMessage) {
        if let Some(line) = self.activity.process_midi_message(message) {
            self.log.push(line, "midi-active");
        }
    }

    fn run_ai(&mut self, prompt: &str) {
        let call = match self.ai.request(prompt, &self.host_config) {
            Ok(call) => call,
            Err(e) => {
                self.log.error(format!("AI Error: {e}"));
                return;
            }
        };

        self.log
            .system(format!("AI Thinking ({})...", self.ai.model()));
        let results = self.ai_results.clone();
        tokio::spawn(async move {
            if results.send(call.await).is_err() {
                debug!("Session gone, dropping AI result");
            }
        });
    }

    /// Report a finished AI call and hand successful text to the host for typing
    pub fn handle_ai_result(&mut self, result: AiResult) {
        match result {
            Ok(text) => {
                self.log.system(format!("AI Action: {text}"));
                self.bridge.send(Action::SimulateText { text });
            }
            Err(AiError::Superseded) => debug!("Dropped result of a superseded AI call"),
            Err(AiError::Http { status, message }) => {
                debug!("AI provider answered HTTP {}", status);
                self.log.error(format!("AI Failed: {message}"));
            }
            Err(e) => self.log.error(format!("AI Failed: {e}")),
        }
    }

    pub fn add_mapping(&self) {
        self.store.add();
    }

    pub fn update_mapping(&self, index: usize, record: MappingRecord) -> bool {
        self.store.update(index, record)
    }

    pub fn delete_mapping(&self, index: usize) -> bool {
        self.store.delete(index)
    }

    /// Only goes out once the user has confirmed; the host cannot undo it
    pub fn clear_mappings(&self, confirmed: bool) -> bool {
        if !confirmed {
            debug!("Clear mappings not confirmed");
            return false;
        }
        self.store.clear();
        true
    }

    pub fn open_editor(&mut self, index: usize) -> bool {
        self.editor = MappingEditor::open(&self.store, index);
        self.editor.is_some()
    }

    pub fn editor(&self) -> Option<&MappingEditor> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut MappingEditor> {
        self.editor.as_mut()
    }

    /// Copy the tracked foreground context into the open draft
    pub fn scope_editor_to_context(&mut self) -> bool {
        match (self.editor.as_mut(), self.context.current()) {
            (Some(editor), Some(current)) => {
                editor.scope_to(current);
                true
            }
            _ => false,
        }
    }

    /// Send the draft and close the editor. A draft of a record with an id is
    /// addressed by that id, so a host-side reorder in between does no harm.
    pub fn save_editor(&mut self) -> bool {
        let Some(editor) = self.editor.take() else {
            return false;
        };
        let (index, record) = editor.finish();
        match record.id {
            Some(id) => self.store.update_by_id(id, record),
            None => self.update_mapping(index, record),
        }
    }

    pub fn close_editor(&mut self) {
        self.editor = None;
    }

    pub fn start_learn(&mut self) -> bool {
        self.learn.start()
    }

    pub fn cancel_learn(&mut self) {
        self.learn.cancel();
    }

    pub fn select_port(&mut self, index: usize) -> bool {
        self.ports.select(index)
    }

    /// Ask the host to open or close the selected port
    pub fn toggle_connect(&self) -> bool {
        match self.ports.selected() {
            Some(port) => {
                self.bridge.send(Action::ToggleConnect { port });
                true
            }
            None => {
                warn!("No MIDI port selected");
                false
            }
        }
    }

    pub fn load_profile(&self) {
        self.bridge.send(Action::LoadProfile);
    }

    pub fn save_profile(&self) {
        self.bridge.send(Action::SaveProfile);
    }

    /// Edit a copy of the host config and send the whole object. The mirror
    /// stays as it is until the host echoes the new config.
    pub fn update_config<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut ConfigSnapshot) -> Result<()>,
    {
        let mut next = self.host_config.clone();
        edit(&mut next)?;
        self.bridge.send(Action::UpdateConfig(next));
        Ok(())
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn learn(&self) -> &LearnSession {
        &self.learn
    }

    pub fn context(&self) -> &ContextTracker {
        &self.context
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn ports(&self) -> &PortList {
        &self.ports
    }

    pub fn activity(&self) -> &MidiActivity {
        &self.activity
    }

    pub fn host_config(&self) -> &ConfigSnapshot {
        &self.host_config
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }
}
