use crate::ai::TextGenerator;
use crate::bridge::HostEvent;
use crate::console::{self, Command};
use crate::session::{AiResult, Session};
use std::future::Future;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

/// Why the event loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    BridgeClosed,
    Quit,
    Shutdown,
}

/// Drive the session: host events, finished AI calls and operator input are
/// handled one at a time on this task, in the order they arrive.
pub async fn run<G, F>(
    mut session: Session<G>,
    mut events: UnboundedReceiver<HostEvent>,
    mut ai_results: UnboundedReceiver<AiResult>,
    mut input: UnboundedReceiver<String>,
    shutdown: F,
) -> Exit
where
    G: TextGenerator,
    F: Future,
{
    session.start();
    tokio::pin!(shutdown);
    let mut input_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => session.handle_event(event),
                None => {
                    info!("Bridge closed, stopping");
                    return Exit::BridgeClosed;
                }
            },
            Some(result) = ai_results.recv() => session.handle_ai_result(result),
            line = input.recv(), if input_open => match line {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if handle_line(&mut session, &line) == Some(Exit::Quit) {
                        return Exit::Quit;
                    }
                }
                None => input_open = false,
            },
            _ = &mut shutdown => {
                info!("Shutdown requested");
                return Exit::Shutdown;
            }
        }
    }
}

fn handle_line<G: TextGenerator>(session: &mut Session<G>, line: &str) -> Option<Exit> {
    let command = match console::parse(line) {
        Ok(Command::Quit) => return Some(Exit::Quit),
        Ok(command) => command,
        Err(e) => {
            println!("error: {e:#}");
            return None;
        }
    };
    match console::execute(session, command) {
        Ok(reply) if reply.is_empty() => {}
        Ok(reply) => println!("{reply}"),
        Err(e) => {
            warn!("Command failed: {e:#}");
            println!("error: {e:#}");
        }
    }
    None
}
