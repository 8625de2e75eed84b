use crate::ResourceKey;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogEventLevel {
    Info,
    Warning,
    Error,
    FatalError,
}

/// One structured event recorded during a cooking run, tied to the resource
/// it concerns. The walker renders these into the per-file .log outputs.
#[derive(Debug, Clone)]
pub struct CookLogEvent {
    pub key: Option<ResourceKey>,
    pub level: LogEventLevel,
    pub message: String,
}

pub struct CookLogData {
    pub(crate) id: Uuid,
    pub(crate) start_instant: std::time::Instant,
    pub(crate) end_instant: Option<std::time::Instant>,
    pub(crate) start_time: std::time::SystemTime,
    pub log_events: Vec<CookLogEvent>,
}

impl Default for CookLogData {
    fn default() -> Self {
        CookLogData {
            id: Uuid::new_v4(),
            start_instant: std::time::Instant::now(),
            end_instant: None,
            start_time: std::time::SystemTime::now(),
            log_events: vec![],
        }
    }
}

impl CookLogData {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn start_time(&self) -> std::time::SystemTime {
        self.start_time
    }

    pub fn duration(&self) -> Option<std::time::Duration> {
        self.end_instant
            .map(|end_instant| end_instant - self.start_instant)
    }

    pub fn log_events(&self) -> &[CookLogEvent] {
        &self.log_events
    }

    pub fn mark_finished(&mut self) {
        self.end_instant = Some(std::time::Instant::now());
    }

    pub fn info<T: Into<String>>(
        &mut self,
        key: Option<&ResourceKey>,
        message: T,
    ) {
        self.push(key, LogEventLevel::Info, message);
    }

    pub fn warn<T: Into<String>>(
        &mut self,
        key: Option<&ResourceKey>,
        message: T,
    ) {
        self.push(key, LogEventLevel::Warning, message);
    }

    pub fn error<T: Into<String>>(
        &mut self,
        key: Option<&ResourceKey>,
        message: T,
    ) {
        self.push(key, LogEventLevel::Error, message);
    }

    fn push<T: Into<String>>(
        &mut self,
        key: Option<&ResourceKey>,
        level: LogEventLevel,
        message: T,
    ) {
        self.log_events.push(CookLogEvent {
            key: key.cloned(),
            level,
            message: message.into(),
        });
    }

    /// Events concerning one resource, rendered one per line the way the
    /// per-file cook logs store them.
    pub fn render_events_for_key(
        &self,
        key: &ResourceKey,
    ) -> String {
        let mut text = String::default();
        for event in &self.log_events {
            if event.key.as_ref() != Some(key) {
                continue;
            }

            match event.level {
                LogEventLevel::Info => {}
                LogEventLevel::Warning => text.push_str("! WARNING: "),
                LogEventLevel::Error | LogEventLevel::FatalError => text.push_str("!!!! ERROR: "),
            }
            text.push_str(&event.message);
            text.push('\n');
        }
        text
    }
}

pub type CookLogDataRef = Arc<CookLogData>;
