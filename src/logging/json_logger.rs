use std::io::Write;

use crossbeam::channel::Receiver;

use super::{LogEntry, LogError, LogFilter, LogInterface, LogProcessor};

/// Writes each [LogEntry] as one JSON object per line.
pub struct JsonLinesLogger<W: Write> {
    recv: Receiver<LogEntry>,
    sink: W,
}

impl<W: Write> JsonLinesLogger<W> {
    /// Creates a connected interface/processor pair writing into `sink`.
    pub fn new(scope: &str, sink: W, filter: LogFilter) -> (LogInterface, JsonLinesLogger<W>) {
        let (snd, recv) = crossbeam::channel::unbounded();
        let interface = LogInterface::new(scope.to_string(), snd, std::time::Instant::now(), filter);
        (interface, JsonLinesLogger { recv, sink })
    }

    /// Hands back the sink, e.g. to inspect a buffer.
    pub fn into_sink(self) -> W {
        self.sink
    }
}

impl<W: Write> LogProcessor for JsonLinesLogger<W> {
    fn process(&mut self) -> Result<(), LogError> {
        for entry in self.recv.try_iter() {
            let line = serde_json::to_string(&entry).map_err(LogError::SerializationError)?;
            writeln!(self.sink, "{line}").map_err(LogError::WriteError)?;
        }
        self.sink.flush().map_err(LogError::WriteError)
    }
}
