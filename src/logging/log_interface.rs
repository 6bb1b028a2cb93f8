#![allow(unused)] // Marked as allow(unused) for when logging is off.
use crossbeam::channel::Sender;

use super::{LogEntry, LogError, LogEvent, LogFilter};
use derive_more::Constructor;

/// A logging interface, which simply pushes data into a communication channel.
/// Actual writing is done by the log processor.
#[derive(Clone, Constructor)]
pub struct LogInterface {
    /// Name of the current generation scope
    pub scope: String,
    comm: Sender<LogEntry>,
    base_time: std::time::Instant,
    pub(crate) log_filter: LogFilter,
}

impl LogInterface {
    /// Logs an event into the communication channel.
    /// May return an error if either the channel was prematurely closed, or if some aspect of serialization failed.
    pub fn log<T: LogEvent>(&self, event: &T) -> Result<(), LogError> {
        self.comm
            .send(LogEntry {
                timestamp: self
                    .base_time
                    .elapsed()
                    .as_micros()
                    .try_into()
                    .map_err(LogError::TimeConversionError)?,
                scope: self.scope.clone(),
                event_type: T::NAME.to_string(),
                event_data: serde_json::to_value(event).map_err(LogError::SerializationError)?,
            })
            .map_err(|_| LogError::SendError)?;

        Ok(())
    }

    pub(crate) fn set_scope(&mut self, scope: &str) {
        self.scope = scope.to_string();
    }
}
