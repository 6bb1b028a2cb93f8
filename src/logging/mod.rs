//! Logging support for data generation.
//! Events are pushed into a channel by the thread-local [LogInterface] and written out by a [LogProcessor]
//! once generation finishes. Generation is single-threaded, so the processor is drained on the same thread.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::num::TryFromIntError;
use thiserror::Error;

// Adds a logger that does nothing.
mod null_logger;
pub use null_logger::*;

mod json_logger;
pub use json_logger::*;

mod log_interface;
pub use log_interface::LogInterface;

mod log_functions;
pub use log_functions::*;

/// Event types emitted by the generator itself.
pub mod events;

use self::registry::{get_metrics_vec, METRICS};

/// Handles the registering/checking of LogEntry names
pub mod registry;

/// Errors which may occur when attempting to log.
#[derive(Error, Debug)]
pub enum LogError {
    /// Attempted to convert time (in us) to i64, but ran out of time. This is unlikely to ever happen.
    #[error("Error converting time into i64. Did we run out of time?")]
    TimeConversionError(TryFromIntError),

    /// The processor side of the channel was dropped before the event was sent.
    #[error("Could not send event! Was the LogProcessor dropped?")]
    SendError,

    /// The filter that was registered wasn't valid -- some of the filter types weren't registered.
    #[error(
        "Invalid Log Filter Defined: {0:?} were not registered filters! Options: {:?}",
        get_metrics_vec()
    )]
    InvalidFilter(Vec<String>),

    /// Failed to convert the event into json.
    #[error("Serialization Error: {0}")]
    SerializationError(serde_json::Error),

    /// The sink rejected a write.
    #[error("Could not write log entry: {0}")]
    WriteError(std::io::Error),
}

/// A real log entry, which is eventually serialized by a [LogProcessor].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    /// Time in microseconds since the logger was created
    pub(crate) timestamp: i64,

    /// Generation scope that produced the event (workload or mode name)
    pub(crate) scope: String,

    /// String name of the logging event type
    pub(crate) event_type: String,

    /// The actual data of the event
    pub(crate) event_data: serde_json::Value,
}

impl LogEntry {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn event_data(&self) -> &serde_json::Value {
        &self.event_data
    }
}

/// All logs types must expose a name, which is used by filters.
pub trait LogEvent: Serialize {
    /// The declared name of the logging type. This is used to report the the event type in the [LogEntry], as well as check filters in [LogFilter]
    const NAME: &'static str;
}

/// Log Processors are responsible for processing logs (i.e. writing them to a sink).
pub trait LogProcessor {
    /// Drains every entry received so far.
    fn process(&mut self) -> Result<(), LogError>;
}

/// Log filtering policies
#[derive(Debug, Default, Clone)]
pub enum LogFilter {
    /// Enables ALL logging
    #[default]
    AllowAll,

    /// Only enable a subset of logs, based on their registered LogEvent::NAME
    Some(FxHashSet<String>),
}

impl LogFilter {
    /// Builds a filter from a comma-separated list of event names.
    pub fn from_names(names: &str) -> Result<Self, LogError> {
        let set: FxHashSet<String> = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();
        let filter = LogFilter::Some(set);
        filter.check()?;
        Ok(filter)
    }

    /// Checks to see if all elements of the LogFilter are actually registered metrics.
    pub fn check(&self) -> Result<(), LogError> {
        match self {
            LogFilter::AllowAll => Ok(()),
            LogFilter::Some(set) => {
                let invalids: Vec<_> = set
                    .iter()
                    .filter(|key| !METRICS.contains(&key.as_str()))
                    .cloned()
                    .collect();
                if invalids.is_empty() {
                    Ok(())
                } else {
                    Err(LogError::InvalidFilter(invalids))
                }
            }
        }
    }

    /// Checks to see if a log type T is enabled, without actually requiring an instance of T.
    /// This allows checking even when the event is a callback.
    pub fn enabled<T: LogEvent>(&self) -> bool {
        match self {
            LogFilter::AllowAll => true,
            LogFilter::Some(filter) if filter.contains(T::NAME) => true,
            LogFilter::Some(_) => false,
        }
    }
}
