use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Display emphasis of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    Error,
    Accent,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub at: SystemTime,
    pub text: String,
    pub category: String,
}

impl LogLine {
    /// Wall-clock time of day (UTC) the line was added, `HH:MM:SS`
    pub fn clock(&self) -> String {
        let secs = self
            .at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            % 86_400;
        format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
    }

    pub fn emphasis(&self) -> Emphasis {
        match self.category.as_str() {
            "error" => Emphasis::Error,
            "midi-active" | "mapping" => Emphasis::Accent,
            _ => Emphasis::Normal,
        }
    }
}

/// Bounded activity log shown to the user.
///
/// Every line is also forwarded to `tracing`, at a level picked from its category.
#[derive(Debug)]
pub struct ActivityLog {
    lines: VecDeque<LogLine>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, text: impl Into<String>, category: impl Into<String>) {
        let line = LogLine {
            at: SystemTime::now(),
            text: text.into(),
            category: category.into(),
        };

        match line.emphasis() {
            Emphasis::Error => warn!(category = %line.category, "{}", line.text),
            Emphasis::Accent => debug!(category = %line.category, "{}", line.text),
            Emphasis::Normal => info!(category = %line.category, "{}", line.text),
        }

        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(text, "error");
    }

    pub fn system(&mut self, text: impl Into<String>) {
        self.push(text, "system");
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    pub fn last(&self) -> Option<&LogLine> {
        self.lines.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_past_capacity() {
        let mut log = ActivityLog::new(2);
        log.system("one");
        log.system("two");
        log.error("three");

        let texts: Vec<_> = log.lines().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["two", "three"]);
        assert_eq!(log.last().unwrap().emphasis(), Emphasis::Error);
    }

    #[test]
    fn category_picks_emphasis() {
        let mut log = ActivityLog::new(10);
        log.push("Note 60 (Val: 90)", "midi-active");
        log.push("Mapped", "mapping");
        log.push("hello", "whatever");
        let emphasis: Vec<_> = log.lines().map(LogLine::emphasis).collect();
        assert_eq!(emphasis, [Emphasis::Accent, Emphasis::Accent, Emphasis::Normal]);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn clock_is_time_of_day() {
        let line = LogLine {
            at: UNIX_EPOCH + std::time::Duration::from_secs(86_400 * 3 + 3600 * 13 + 60 * 7 + 9),
            text: String::new(),
            category: String::new(),
        };
        assert_eq!(line.clock(), "13:07:09");
    }
}
