use crate::config::ConfigSnapshot;
use crate::mapping::{MappingId, MappingRecord, nullable};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Unsolicited message from the host, one JSON object per line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// Full replacement of the mapping list
    Mappings {
        #[serde(default, deserialize_with = "nullable")]
        mappings: Vec<MappingRecord>,
    },
    /// Raw note activity; velocity 0 is a note-off
    MidiNote {
        #[serde(default, deserialize_with = "nullable")]
        note: u8,
        #[serde(default, deserialize_with = "nullable")]
        velocity: u8,
    },
    MidiCc {
        #[serde(default, deserialize_with = "nullable")]
        cc: u8,
        #[serde(default, deserialize_with = "nullable")]
        value: u8,
    },
    Status {
        #[serde(default, deserialize_with = "nullable")]
        text: String,
    },
    AppChanged {
        #[serde(default, deserialize_with = "nullable")]
        app: String,
        #[serde(default, deserialize_with = "nullable")]
        title: String,
    },
    LearnPhase {
        #[serde(default, deserialize_with = "nullable")]
        phase: u8,
        #[serde(default, deserialize_with = "nullable")]
        text: String,
    },
    LearnDone,
    Log {
        #[serde(default, deserialize_with = "nullable")]
        text: String,
        #[serde(default, deserialize_with = "nullable")]
        category: String,
    },
    RunAi {
        #[serde(default, deserialize_with = "nullable")]
        prompt: String,
    },
    Ports {
        #[serde(default, deserialize_with = "nullable")]
        ports: Vec<String>,
        /// Negative when no port is selected
        #[serde(default = "no_port", deserialize_with = "nullable_port")]
        selected: i64,
    },
    Config {
        #[serde(default, deserialize_with = "nullable")]
        config: ConfigSnapshot,
    },
}

fn no_port() -> i64 {
    -1
}

fn nullable_port<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(-1))
}

/// Request to the host. None of these are acknowledged directly; the host
/// answers with whatever event reflects the new state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Init,
    ClearMappings,
    AddMapping,
    UpdateMapping {
        index: usize,
        #[serde(flatten)]
        record: MappingRecord,
    },
    DeleteMapping {
        index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<MappingId>,
    },
    LoadProfile,
    SaveProfile,
    StartLearn,
    CancelLearn,
    ToggleConnect {
        port: usize,
    },
    UpdateConfig(ConfigSnapshot),
    SimulateText {
        text: String,
    },
}

impl Action {
    /// Wire discriminator, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Action::Init => "init",
            Action::ClearMappings => "clear_mappings",
            Action::AddMapping => "add_mapping",
            Action::UpdateMapping { .. } => "update_mapping",
            Action::DeleteMapping { .. } => "delete_mapping",
            Action::LoadProfile => "load_profile",
            Action::SaveProfile => "save_profile",
            Action::StartLearn => "start_learn",
            Action::CancelLearn => "cancel_learn",
            Action::ToggleConnect { .. } => "toggle_connect",
            Action::UpdateConfig(_) => "update_config",
            Action::SimulateText { .. } => "simulate_text",
        }
    }
}

pub fn encode_action(action: &Action) -> serde_json::Result<String> {
    serde_json::to_string(action)
}

pub fn decode_event(line: &str) -> serde_json::Result<HostEvent> {
    serde_json::from_str(line)
}

/// Outgoing half of the bridge.
///
/// Sending never fails from the caller's point of view: once the transport
/// is gone actions are dropped and the next snapshot from a reconnected host
/// is what brings the mirror back in line.
#[derive(Debug, Clone)]
pub struct BridgeSender {
    tx: mpsc::UnboundedSender<Action>,
}

impl BridgeSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Action>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, action: Action) {
        let name = action.name();
        if self.tx.send(action).is_err() {
            debug!("Bridge closed, dropping '{}' action", name);
        } else {
            debug!("Queued '{}' action", name);
        }
    }
}

/// Connect to the host over TCP and start the bridge tasks
pub async fn connect(addr: &str) -> Result<(BridgeSender, mpsc::UnboundedReceiver<HostEvent>)> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to host at {addr}"))?;
    stream.set_nodelay(true)?;
    info!("Connected to host at {}", addr);

    let (reader, writer) = stream.into_split();
    Ok(spawn(reader, writer))
}

/// Run line-delimited JSON over any byte stream pair.
///
/// Each direction is a single task, so delivery order equals send order.
pub fn spawn<R, W>(reader: R, writer: W) -> (BridgeSender, mpsc::UnboundedReceiver<HostEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sender, mut actions) = BridgeSender::channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut writer = writer;
        while let Some(action) = actions.recv().await {
            let mut line = match encode_action(&action) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to encode '{}' action: {}", action.name(), e);
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                warn!("Bridge write failed, further actions are dropped: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                warn!("Bridge flush failed, further actions are dropped: {}", e);
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match decode_event(&line) {
                        Ok(event) => {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Skipping malformed host message: {}", e),
                    }
                }
                Ok(None) => {
                    info!("Host closed the bridge");
                    break;
                }
                Err(e) => {
                    warn!("Bridge read failed: {}", e);
                    break;
                }
            }
        }
    });

    (sender, event_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MidiType;
    use serde_json::{Value, json};

    #[test]
    fn decodes_every_event_shape() {
        let cases = [
            (r#"{"type":"midi_note","note":60,"velocity":0}"#, HostEvent::MidiNote { note: 60, velocity: 0 }),
            (r#"{"type":"midi_cc","cc":7,"value":100}"#, HostEvent::MidiCc { cc: 7, value: 100 }),
            (r#"{"type":"learn_done"}"#, HostEvent::LearnDone),
            (
                r#"{"type":"learn_phase","phase":2,"text":"Press a key"}"#,
                HostEvent::LearnPhase { phase: 2, text: "Press a key".into() },
            ),
            (
                r#"{"type":"ports","ports":["A","B"],"selected":1}"#,
                HostEvent::Ports { ports: vec!["A".into(), "B".into()], selected: 1 },
            ),
            (r#"{"type":"ports","ports":null}"#, HostEvent::Ports { ports: vec![], selected: -1 }),
            (r#"{"type":"run_ai","prompt":"type hello"}"#, HostEvent::RunAi { prompt: "type hello".into() }),
        ];
        for (line, expected) in cases {
            assert_eq!(decode_event(line).unwrap(), expected, "{line}");
        }
    }

    #[test]
    fn tolerates_missing_payload_fields() {
        let event = decode_event(r#"{"type":"app_changed","app":"code.exe"}"#).unwrap();
        assert_eq!(
            event,
            HostEvent::AppChanged { app: "code.exe".into(), title: String::new() }
        );

        let event = decode_event(r#"{"type":"mappings"}"#).unwrap();
        assert_eq!(event, HostEvent::Mappings { mappings: vec![] });
    }

    #[test]
    fn unknown_event_type_is_an_error() {
        assert!(decode_event(r#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn update_mapping_flattens_record() {
        let action = Action::UpdateMapping {
            index: 0,
            record: MappingRecord {
                midi_type: MidiType::Macro,
                macro_text: "hi".into(),
                ..Default::default()
            },
        };
        let value: Value = serde_json::from_str(&encode_action(&action).unwrap()).unwrap();
        assert_eq!(value["action"], "update_mapping");
        assert_eq!(value["index"], 0);
        assert_eq!(value["midi_type"], 4);
        assert_eq!(value["macro_text"], "hi");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn unit_and_newtype_actions() {
        assert_eq!(
            serde_json::to_value(Action::Init).unwrap(),
            json!({"action": "init"})
        );
        assert_eq!(
            serde_json::to_value(Action::ToggleConnect { port: 2 }).unwrap(),
            json!({"action": "toggle_connect", "port": 2})
        );
        let value = serde_json::to_value(Action::UpdateConfig(ConfigSnapshot {
            auto_reconnect: true,
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(value["action"], "update_config");
        assert_eq!(value["auto_reconnect"], true);
        assert_eq!(value["ai_global_prompt"], "");
    }

    #[test]
    fn send_after_close_is_silent() {
        let (sender, rx) = BridgeSender::channel();
        drop(rx);
        sender.send(Action::AddMapping);
    }

    #[tokio::test]
    async fn stream_round_trip_preserves_order() {
        let (client, host) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (host_read, mut host_write) = tokio::io::split(host);

        let (sender, mut events) = spawn(client_read, client_write);
        sender.send(Action::Init);
        sender.send(Action::StartLearn);

        let mut host_lines = BufReader::new(host_read).lines();
        assert_eq!(host_lines.next_line().await.unwrap().unwrap(), r#"{"action":"init"}"#);
        assert_eq!(
            host_lines.next_line().await.unwrap().unwrap(),
            r#"{"action":"start_learn"}"#
        );

        host_write
            .write_all(b"{\"type\":\"status\",\"text\":\"Ready\"}\nnot json\n\n{\"type\":\"learn_done\"}\n")
            .await
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            HostEvent::Status { text: "Ready".into() }
        );
        assert_eq!(events.recv().await.unwrap(), HostEvent::LearnDone);

        drop(host_write);
        drop(host_lines);
        assert!(events.recv().await.is_none());
    }
}
