use crate::activity_log::Emphasis;
use crate::ai::TextGenerator;
use crate::session::Session;
use anyhow::{Context, Result, anyhow, bail};
use std::fmt::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

const HELP: &str = "\
commands:
  list                      show mappings
  add                       append a default mapping
  edit <i>                  open mapping <i> in the editor
  set <field>=<value>       change a field of the open mapping
  scope                     scope the open mapping to the current window
  show                      show the open mapping
  save | discard            send or drop the open mapping
  delete <i>                delete mapping <i>
  clear yes                 delete every mapping
  learn | cancel            start or cancel learn mode
  ports | port <i>          list or select MIDI ports
  connect                   connect or disconnect the selected port
  profile load|save         load or save a profile on the host
  config [<field>=<value>]  show or change host settings
  status | log | clearlog
  quit";

/// Operator command, one per input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Add,
    Edit(usize),
    Set { field: String, value: String },
    Scope,
    Show,
    Save,
    Discard,
    Delete(usize),
    Clear { confirmed: bool },
    Learn,
    Cancel,
    Ports,
    Port(usize),
    Connect,
    LoadProfile,
    SaveProfile,
    ShowConfig,
    Config { field: String, value: String },
    Status,
    Log,
    ClearLog,
    Help,
    Quit,
}

pub fn parse(line: &str) -> Result<Command> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let index = || -> Result<usize> {
        rest.parse()
            .with_context(|| format!("'{word}' needs a mapping index"))
    };
    let assignment = || -> Result<(String, String)> {
        let (field, value) = rest
            .split_once('=')
            .ok_or_else(|| anyhow!("expected <field>=<value>"))?;
        Ok((field.trim().to_string(), value.to_string()))
    };

    let command = match word {
        "list" | "ls" => Command::List,
        "add" => Command::Add,
        "edit" => Command::Edit(index()?),
        "set" => {
            let (field, value) = assignment()?;
            Command::Set { field, value }
        }
        "scope" => Command::Scope,
        "show" => Command::Show,
        "save" => Command::Save,
        "discard" => Command::Discard,
        "delete" | "rm" => Command::Delete(index()?),
        "clear" => Command::Clear {
            confirmed: rest == "yes",
        },
        "learn" => Command::Learn,
        "cancel" => Command::Cancel,
        "ports" => Command::Ports,
        "port" => Command::Port(index()?),
        "connect" => Command::Connect,
        "profile" => match rest {
            "load" => Command::LoadProfile,
            "save" => Command::SaveProfile,
            _ => bail!("expected 'profile load' or 'profile save'"),
        },
        "config" if rest.is_empty() => Command::ShowConfig,
        "config" => {
            let (field, value) = assignment()?;
            Command::Config { field, value }
        }
        "status" => Command::Status,
        "log" => Command::Log,
        "clearlog" => Command::ClearLog,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}', try 'help'"),
    };
    Ok(command)
}

/// Run one command against the session and render its reply
pub fn execute<G: TextGenerator>(session: &mut Session<G>, command: Command) -> Result<String> {
    let mut out = String::new();
    match command {
        Command::List => {
            if session.store().is_empty() {
                out.push_str("no mappings");
            }
            for (i, summary) in session.store().summaries().iter().enumerate() {
                writeln!(out, "{i:>3}  {summary}")?;
            }
        }
        Command::Add => session.add_mapping(),
        Command::Edit(i) => {
            if !session.open_editor(i) {
                bail!("no mapping {i}");
            }
            out = render_draft(session)?;
        }
        Command::Set { field, value } => {
            session
                .editor_mut()
                .ok_or_else(|| anyhow!("no mapping open, use 'edit <i>'"))?
                .set(&field, &value)?;
            out = render_draft(session)?;
        }
        Command::Scope => {
            if !session.scope_editor_to_context() {
                bail!("needs an open mapping and a known foreground window");
            }
            out = render_draft(session)?;
        }
        Command::Show => out = render_draft(session)?,
        Command::Save => {
            if !session.save_editor() {
                bail!("nothing sent; is a mapping open and still in the list?");
            }
            out.push_str("sent, waiting for host");
        }
        Command::Discard => session.close_editor(),
        Command::Delete(i) => {
            if !session.delete_mapping(i) {
                bail!("no mapping {i}");
            }
        }
        Command::Clear { confirmed } => {
            if !session.clear_mappings(confirmed) {
                out.push_str("this deletes every mapping; type 'clear yes' to confirm");
            }
        }
        Command::Learn => {
            if !session.start_learn() {
                bail!("learn already running, 'cancel' first");
            }
            out.push_str(session.learn().prompt());
        }
        Command::Cancel => session.cancel_learn(),
        Command::Ports => {
            let selected = session.ports().selected();
            for (i, name) in session.ports().ports().iter().enumerate() {
                let marker = if Some(i) == selected { '*' } else { ' ' };
                writeln!(out, "{marker}{i:>2}  {name}")?;
            }
        }
        Command::Port(i) => {
            if !session.select_port(i) {
                bail!("no port {i}");
            }
        }
        Command::Connect => {
            if !session.toggle_connect() {
                bail!("select a port first");
            }
        }
        Command::LoadProfile => session.load_profile(),
        Command::SaveProfile => session.save_profile(),
        Command::ShowConfig => {
            let config = session.host_config();
            writeln!(out, "auto_reconnect   = {}", config.auto_reconnect)?;
            writeln!(out, "app_switching    = {}", config.app_switching)?;
            writeln!(out, "velocity_zones   = {}", config.velocity_zones)?;
            writeln!(out, "minimize_to_tray = {}", config.minimize_to_tray)?;
            let key = if config.ai_api_key.is_empty() { "(unset)" } else { "(set)" };
            writeln!(out, "ai_api_key       = {key}")?;
            write!(out, "ai_global_prompt = {}", config.ai_global_prompt)?;
        }
        Command::Config { field, value } => {
            session.update_config(|config| config.set_field(&field, &value))?;
        }
        Command::Status => {
            let status = session.status();
            let light = if status.is_affirmative() { "ok" } else { "--" };
            writeln!(out, "[{light}] {} ({})", status.text(), status.toggle_label())?;
            match session.context().current() {
                Some(current) => write!(
                    out,
                    "window: {} | {}",
                    current.display_app(),
                    current.display_title()
                )?,
                None => out.push_str("window: unknown"),
            }
            let lit = session.activity().lit_keys();
            if !lit.is_empty() {
                write!(out, "\nheld: {lit:?}")?;
            }
            let learn = session.learn();
            if learn.overlay_visible() {
                write!(out, "\nlearn: {:?} - {}", learn.phase(), learn.prompt())?;
            }
            let log = session.log();
            write!(out, "\nlog: {} lines", log.len())?;
            if let Some(last) = log.last() {
                write!(out, ", last: {}", last.text)?;
            }
        }
        Command::Log => {
            if session.log().is_empty() {
                out.push_str("log is empty");
            }
            for line in session.log().lines() {
                let mark = match line.emphasis() {
                    Emphasis::Error => '!',
                    Emphasis::Accent => '*',
                    Emphasis::Normal => ' ',
                };
                writeln!(out, "{mark} [{}] {}", line.clock(), line.text)?;
            }
        }
        Command::ClearLog => session.clear_log(),
        Command::Help => out.push_str(HELP),
        Command::Quit => {}
    }
    Ok(out.trim_end().to_string())
}

fn render_draft<G: TextGenerator>(session: &Session<G>) -> Result<String> {
    let editor = session
        .editor()
        .ok_or_else(|| anyhow!("no mapping open"))?;
    let draft = editor.draft();
    let visible = editor.visible_fields();

    let mut out = String::new();
    writeln!(out, "mapping {}: {}", editor.index(), draft.summary())?;
    writeln!(out, "  midi_type   = {}", u8::from(draft.midi_type))?;
    writeln!(out, "  midi_num    = {}", draft.midi_num)?;
    writeln!(out, "  gesture_id  = {}", u8::from(draft.gesture_id))?;
    if visible.key {
        writeln!(out, "  key_vk      = {}", draft.key_vk)?;
    }
    if visible.chord {
        writeln!(out, "  midi_chord  = {}", draft.chord_text(", "))?;
    }
    if visible.macro_text {
        writeln!(out, "  macro_text  = {}", draft.macro_text)?;
    }
    if visible.ai_prompt {
        writeln!(out, "  ai_prompt   = {}", draft.ai_prompt)?;
    }
    writeln!(out, "  app_pattern = {}", draft.app_pattern)?;
    write!(out, "  title_pattern = {}", draft.title_pattern)?;
    Ok(out)
}

/// Feed stdin lines to the event loop
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
        debug!("Console input closed");
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiGateway;
    use crate::ai::testing::FakeGenerator;
    use crate::bridge::{Action, BridgeSender, HostEvent};
    use crate::mapping::{MappingRecord, MidiType};
    use std::time::Duration;

    #[test]
    fn parses_commands() {
        assert_eq!(parse("edit 3").unwrap(), Command::Edit(3));
        assert_eq!(
            parse("set macro_text=hello, world").unwrap(),
            Command::Set { field: "macro_text".into(), value: "hello, world".into() }
        );
        assert_eq!(parse("clear").unwrap(), Command::Clear { confirmed: false });
        assert_eq!(parse("clear yes").unwrap(), Command::Clear { confirmed: true });
        assert_eq!(parse("config").unwrap(), Command::ShowConfig);
        assert_eq!(parse("  profile save ").unwrap(), Command::SaveProfile);
        assert!(parse("edit x").is_err());
        assert!(parse("set nothing").is_err());
        assert!(parse("dance").is_err());
    }

    #[tokio::test]
    async fn edit_flow_through_console() {
        let (bridge, mut actions) = BridgeSender::channel();
        let gateway = AiGateway::new(FakeGenerator::default(), Duration::from_secs(15));
        let (mut session, _results) = Session::new(bridge, gateway, 10);
        session.handle_event(HostEvent::Mappings {
            mappings: vec![MappingRecord {
                midi_type: MidiType::Chord,
                midi_chord: vec![60, 64, 67],
                key_vk: 13,
                ..Default::default()
            }],
        });

        let listing = execute(&mut session, parse("list").unwrap()).unwrap();
        assert!(listing.contains("Chord [60,64,67]"));
        assert!(listing.contains("Chord Key 13"));

        let draft = execute(&mut session, parse("edit 0").unwrap()).unwrap();
        assert!(draft.contains("midi_chord  = 60, 64, 67"));
        assert!(!draft.contains("macro_text"));

        let draft = execute(&mut session, parse("set midi_type=4").unwrap()).unwrap();
        assert!(draft.contains("macro_text"));
        assert!(!draft.contains("key_vk"));
        execute(&mut session, parse("set macro_text=hi there").unwrap()).unwrap();
        execute(&mut session, parse("save").unwrap()).unwrap();

        match actions.try_recv().unwrap() {
            Action::UpdateMapping { index: 0, record } => {
                assert_eq!(record.macro_text, "hi there");
                assert_eq!(record.midi_chord, [60, 64, 67]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(execute(&mut session, parse("save").unwrap()).is_err());
        assert!(execute(&mut session, parse("delete 5").unwrap()).is_err());

        let reply = execute(&mut session, parse("clear").unwrap()).unwrap();
        assert!(reply.contains("clear yes"));
        assert!(actions.try_recv().is_err());
    }

    #[tokio::test]
    async fn status_reports_learn_keys_and_log() {
        let (bridge, _actions) = BridgeSender::channel();
        let gateway = AiGateway::new(FakeGenerator::default(), Duration::from_secs(15));
        let (mut session, _results) = Session::new(bridge, gateway, 10);
        session.handle_event(HostEvent::Status { text: "Ready".into() });

        let status = execute(&mut session, Command::Status).unwrap();
        assert!(status.starts_with("[ok] Ready (Connect)"));
        assert!(status.contains("window: unknown"));
        assert!(status.contains("log: 0 lines"));
        assert!(!status.contains("learn:"));

        session.handle_event(HostEvent::MidiNote { note: 61, velocity: 70 });
        execute(&mut session, Command::Learn).unwrap();
        let status = execute(&mut session, Command::Status).unwrap();
        assert!(status.contains("held: [61]"));
        assert!(status.contains("learn: AwaitingMidi - Waiting for MIDI..."));
        assert!(status.contains("log: 1 lines, last: Note 61 (Val: 70)"));

        execute(&mut session, Command::Cancel).unwrap();
        let status = execute(&mut session, Command::Status).unwrap();
        assert!(!status.contains("learn:"));
    }
}
