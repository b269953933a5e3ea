use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde_derive::Serialize;
use serde_json::Value;
use tracing::{error, info};

/// Receives one structured record per controller or mock-listener event.
pub trait EventSink: Send + Sync + 'static {
    fn record(&self, kind: &str, duration: Duration, details: Value);
}

/// Forwards events to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl EventSink for TracingEvents {
    fn record(&self, kind: &str, duration: Duration, details: Value) {
        info!(
            event = kind,
            duration_ms = duration.as_micros() as f64 / 1000.0,
            details = %details
        );
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesEvents {
    file: Mutex<File>,
}

#[derive(Serialize)]
struct EventRecord<'a> {
    timestamp_ms: u128,
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<f64>,
    details: Value,
}

impl JsonLinesEvents {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for JsonLinesEvents {
    fn record(&self, kind: &str, duration: Duration, details: Value) {
        let record = EventRecord {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|since| since.as_millis())
                .unwrap_or_default(),
            kind,
            duration_ms: (!duration.is_zero()).then(|| duration.as_micros() as f64 / 1000.0),
            details,
        };
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(err) => {
                error!("Failed to encode event {}: {}", kind, err);
                return;
            }
        };
        line.push(b'\n');

        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = file.write_all(&line) {
            error!("Failed to write event {}: {}", kind, err);
        }
    }
}
