//! Live change-feed consumption.
//!
//! A background task owns the HTTP connection to the event stream and sends
//! parsed changes into a bounded channel. The pipeline side polls that
//! channel with a short timeout; repeated empty reads are the heartbeat that
//! drives the staleness/reconnect decision. The reader task never reconnects
//! itself; the polling side replaces it, so restart accounting lives in one
//! place.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};

use copytrace_common::{ChangeEvent, ChangeType, CopytraceError, Tuning};

/// How long one empty read blocks before reporting `Idle`.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum StreamEvent {
    Change(ChangeEvent),
    /// Clean end of the stream (server closed it deliberately).
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Connected,
    Reconnecting,
    Stopped,
}

/// One poll outcome for the pipeline loop.
#[derive(Debug)]
pub enum StreamPoll {
    Event(ChangeEvent),
    /// Nothing arrived within the poll window.
    Idle,
    /// The sequence ended cleanly; no more events will come.
    Closed,
}

type Connector = Box<dyn FnMut() -> mpsc::Receiver<StreamEvent> + Send>;

pub struct StreamMonitor {
    connector: Connector,
    rx: mpsc::Receiver<StreamEvent>,
    state: MonitorState,
    last_event: Instant,
    restarts: u32,
    /// A reconnect only counts as recovered once a real event arrives.
    pending_reset: bool,
    stale_after: Duration,
    max_restarts: u32,
}

impl StreamMonitor {
    /// Connect to the live feed and start the reader task.
    pub fn connect(url: &str, tuning: &Tuning) -> Self {
        let url = url.to_string();
        let buffer = tuning.event_buffer;
        let connector: Connector = Box::new(move || spawn_reader(url.clone(), buffer));
        Self::with_connector(connector, tuning)
    }

    fn with_connector(mut connector: Connector, tuning: &Tuning) -> Self {
        let rx = connector();
        Self {
            connector,
            rx,
            state: MonitorState::Connected,
            last_event: Instant::now(),
            restarts: 0,
            pending_reset: false,
            stale_after: Duration::from_secs(tuning.stale_after_secs),
            max_restarts: tuning.max_restarts,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Receive with a short timeout. Staleness and reader death both route
    /// through the bounded-restart reconnect policy; exhausting restarts is
    /// the only error this returns, and it is fatal to the run.
    pub async fn poll(&mut self) -> Result<StreamPoll, CopytraceError> {
        if self.state == MonitorState::Stopped {
            return Ok(StreamPoll::Closed);
        }
        match timeout(RECV_TIMEOUT, self.rx.recv()).await {
            Ok(Some(StreamEvent::Change(event))) => {
                self.last_event = Instant::now();
                self.state = MonitorState::Connected;
                if self.pending_reset {
                    self.restarts = 0;
                    self.pending_reset = false;
                }
                Ok(StreamPoll::Event(event))
            }
            Ok(Some(StreamEvent::Eof)) => {
                info!("change feed ended");
                self.state = MonitorState::Stopped;
                Ok(StreamPoll::Closed)
            }
            Ok(None) => {
                // reader task died without a clean end
                self.reconnect()?;
                Ok(StreamPoll::Idle)
            }
            Err(_) => {
                if self.last_event.elapsed() >= self.stale_after {
                    warn!(
                        silent_secs = self.last_event.elapsed().as_secs(),
                        "no feed events for too long, reconnecting"
                    );
                    self.reconnect()?;
                }
                Ok(StreamPoll::Idle)
            }
        }
    }

    fn reconnect(&mut self) -> Result<(), CopytraceError> {
        if self.restarts >= self.max_restarts {
            self.state = MonitorState::Stopped;
            return Err(CopytraceError::RestartsExhausted(self.restarts));
        }
        self.restarts += 1;
        self.state = MonitorState::Reconnecting;
        self.pending_reset = true;
        // Dropping the old receiver makes the old reader task exit on its
        // next send.
        self.rx = (self.connector)();
        self.last_event = Instant::now();
        Ok(())
    }
}

fn spawn_reader(url: String, buffer: usize) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(buffer);
    tokio::spawn(async move {
        if let Err(e) = read_stream(&url, &tx).await {
            warn!(error = %e, "change feed connection lost");
        }
    });
    rx
}

/// Consume the SSE-style stream: `data:` lines carry one JSON change each.
async fn read_stream(url: &str, tx: &mpsc::Sender<StreamEvent>) -> anyhow::Result<()> {
    let response = reqwest::Client::new()
        .get(url)
        .header("Accept", "text/event-stream")
        .send()
        .await?
        .error_for_status()?;
    info!(url, "connected to change feed");

    let mut body = response.bytes_stream();
    let mut pending = String::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        pending.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(newline) = pending.find('\n') {
            let line = pending[..newline].trim_end_matches('\r').to_string();
            pending.drain(..=newline);
            if let Some(event) = parse_stream_line(&line) {
                if tx.send(StreamEvent::Change(event)).await.is_err() {
                    // monitor moved on to a fresh connection
                    return Ok(());
                }
            }
        }
    }
    // server ended the stream cleanly
    let _ = tx.send(StreamEvent::Eof).await;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct FeedRevision {
    #[serde(default)]
    old: Option<u64>,
    #[serde(default)]
    new: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FeedLength {
    #[serde(default)]
    old: Option<i64>,
    #[serde(default)]
    new: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FeedChange {
    title: String,
    namespace: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    bot: bool,
    user: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    revision: Option<FeedRevision>,
    #[serde(default)]
    length: Option<FeedLength>,
    /// Seconds since the epoch.
    timestamp: i64,
}

/// Parse one feed line into a change event. Non-data lines, heartbeats and
/// unparseable payloads all yield `None`.
pub(crate) fn parse_stream_line(line: &str) -> Option<ChangeEvent> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    let raw: FeedChange = match serde_json::from_str(payload) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "skipping unparseable feed line");
            return None;
        }
    };
    let change_type = match raw.kind.as_str() {
        "edit" => ChangeType::Edit,
        "new" => ChangeType::New,
        "log" => ChangeType::Log,
        "categorize" => ChangeType::Categorize,
        _ => return None,
    };
    let (old_len, new_len) = raw
        .length
        .map(|l| (l.old.unwrap_or(0), l.new.unwrap_or(0)))
        .unwrap_or((0, 0));
    Some(ChangeEvent {
        title: raw.title,
        namespace: raw.namespace,
        change_type,
        is_bot: raw.bot,
        editor: raw.user,
        comment: raw.comment,
        old_rev: raw.revision.as_ref().and_then(|r| r.old).unwrap_or(0),
        new_rev: raw.revision.as_ref().and_then(|r| r.new)?,
        byte_delta: new_len - old_len,
        timestamp: DateTime::<Utc>::from_timestamp(raw.timestamp, 0)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> Tuning {
        Tuning {
            stale_after_secs: 0, // every empty poll is stale
            max_restarts: 2,
            ..Tuning::default()
        }
    }

    fn monitor_with_channels(tuning: &Tuning) -> (StreamMonitor, std::sync::Arc<std::sync::Mutex<Vec<mpsc::Sender<StreamEvent>>>>) {
        let senders = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let senders_clone = senders.clone();
        let connector: Connector = Box::new(move || {
            let (tx, rx) = mpsc::channel(8);
            senders_clone.lock().unwrap().push(tx);
            rx
        });
        (StreamMonitor::with_connector(connector, tuning), senders)
    }

    #[tokio::test]
    async fn stale_feed_reconnects_up_to_the_cap_then_fails() {
        let tuning = tuning();
        let (mut monitor, senders) = monitor_with_channels(&tuning);

        // each empty poll is immediately stale with stale_after = 0
        assert!(matches!(monitor.poll().await, Ok(StreamPoll::Idle)));
        assert!(matches!(monitor.poll().await, Ok(StreamPoll::Idle)));
        assert_eq!(senders.lock().unwrap().len(), 3); // initial + 2 reconnects
        assert_eq!(monitor.state(), MonitorState::Reconnecting);

        // third reconnect exceeds max_restarts = 2
        let err = monitor.poll().await.unwrap_err();
        assert!(matches!(err, CopytraceError::RestartsExhausted(2)));
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(matches!(monitor.poll().await, Ok(StreamPoll::Closed)));
    }

    #[tokio::test]
    async fn restart_counter_resets_only_after_a_real_event() {
        let tuning = tuning();
        let (mut monitor, senders) = monitor_with_channels(&tuning);

        assert!(matches!(monitor.poll().await, Ok(StreamPoll::Idle)));
        assert_eq!(monitor.restarts, 1);

        let event = parse_stream_line(
            r#"data: {"title":"T","namespace":0,"type":"edit","user":"U","revision":{"old":1,"new":2},"length":{"old":10,"new":700},"timestamp":1767225600}"#,
        )
        .unwrap();
        let tx = senders.lock().unwrap().last().unwrap().clone();
        tx.send(StreamEvent::Change(event)).await.unwrap();

        assert!(matches!(monitor.poll().await, Ok(StreamPoll::Event(_))));
        assert_eq!(monitor.restarts, 0);
        assert_eq!(monitor.state(), MonitorState::Connected);
    }

    #[tokio::test]
    async fn eof_closes_the_sequence() {
        let tuning = Tuning::default();
        let (mut monitor, senders) = monitor_with_channels(&tuning);
        let tx = senders.lock().unwrap().last().unwrap().clone();
        tx.send(StreamEvent::Eof).await.unwrap();
        assert!(matches!(monitor.poll().await, Ok(StreamPoll::Closed)));
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[test]
    fn parses_wellformed_data_lines() {
        let event = parse_stream_line(
            r#"data: {"title":"Sample","namespace":0,"type":"edit","bot":false,"user":"Ed","comment":"c","revision":{"old":5,"new":6},"length":{"old":100,"new":900},"timestamp":1767225600}"#,
        )
        .unwrap();
        assert_eq!(event.title, "Sample");
        assert_eq!(event.byte_delta, 800);
        assert_eq!(event.old_rev, 5);
    }

    #[test]
    fn ignores_comments_and_noise() {
        assert!(parse_stream_line(":ok").is_none());
        assert!(parse_stream_line("event: message").is_none());
        assert!(parse_stream_line("data: not json").is_none());
        assert!(parse_stream_line("data:").is_none());
    }
}
