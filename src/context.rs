use serde::{Deserialize, Serialize};

/// Window title the shell reports while Alt-Tab is up
const TASK_SWITCHING_TITLE: &str = "Task Switching";
/// Desktop shell; with an empty title nothing is actually focused
const DESKTOP_SHELL: &str = "explorer.exe";

/// Last known foreground application and window title
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub app: String,
    pub title: String,
}

impl ContextSnapshot {
    pub fn display_app(&self) -> &str {
        if self.app.is_empty() { "Desktop" } else { &self.app }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() { "Untitled" } else { &self.title }
    }
}

/// Client-side view of the foreground context. The host reports every
/// change, including transient ones this tracker drops.
#[derive(Debug, Default)]
pub struct ContextTracker {
    current: Option<ContextSnapshot>,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ContextSnapshot> {
        self.current.as_ref()
    }

    /// Apply an `app_changed` report. Returns the accepted snapshot, or
    /// `None` when the report is transient noise.
    pub fn apply(&mut self, app: String, title: String) -> Option<&ContextSnapshot> {
        if is_transient(&app, &title) {
            return None;
        }
        self.current = Some(ContextSnapshot { app, title });
        self.current.as_ref()
    }
}

fn is_transient(app: &str, title: &str) -> bool {
    title == TASK_SWITCHING_TITLE || (app == DESKTOP_SHELL && title.is_empty())
}
