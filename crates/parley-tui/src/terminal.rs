//! Terminal driver for the TUI.
//!
//! Implements the [`Driver`] trait for terminal I/O using crossterm for
//! keyboard events and ratatui for rendering. The room channel is a
//! WebSocket and the side-calls go over HTTP; both run on spawned tasks that
//! report back through one outcome queue, so [`Driver::poll`] never blocks on
//! the network.

use std::{
    io::{self, Stdout, stdout},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use crossterm::{
    ExecutableCommand,
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use parley_app::{App, AppEvent, Driver, Input, IoRequest, KeyInput, SessionView};
use parley_client::{
    ClientEvent, ConnectionConfig, UploadId, classify_connect_error, close_reason,
    transport::{Channel, ChannelEvent, HttpClient, TransportError, open_channel},
};
use parley_core::ConnectErrorKind;
use ratatui::{Terminal, backend::CrosstermBackend};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    time::{Interval, MissedTickBehavior},
};

use crate::ui;

/// Interval between UI ticks.
const TICK: Duration = Duration::from_millis(100);

/// Terminal driver errors.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// I/O error from terminal operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport setup error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result of a spawned network or file task.
enum Outcome {
    /// Ready to hand to the runtime.
    Input(Input<Instant>),
    /// A channel finished opening.
    Opened {
        /// Channel generation the open was started in
        generation: u64,
        channel: Channel,
    },
}

impl Outcome {
    fn client(event: ClientEvent) -> Self {
        Self::Input(Input::Client(event))
    }

    fn app(event: AppEvent) -> Self {
        Self::Input(Input::App(event))
    }
}

/// Terminal driver implementing the [`Driver`] trait.
///
/// Owns the terminal (raw mode and alternate screen for its lifetime), the
/// open room channel, and the HTTP client for side-calls.
pub struct TerminalDriver {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    event_stream: EventStream,
    ticks: Interval,
    http: HttpClient,
    config: ConnectionConfig,
    download_dir: PathBuf,
    channel: Option<Channel>,
    /// Bumped on every close so late opens are discarded.
    generation: u64,
    outcomes_tx: mpsc::UnboundedSender<Outcome>,
    outcomes_rx: mpsc::UnboundedReceiver<Outcome>,
}

impl TerminalDriver {
    /// Take over the terminal.
    ///
    /// Downloads and exported transcripts are saved into `download_dir`.
    /// Must be called inside a tokio runtime.
    pub fn new(
        http: HttpClient,
        config: ConnectionConfig,
        download_dir: PathBuf,
    ) -> Result<Self, TerminalError> {
        enable_raw_mode()?;
        stdout().execute(EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout());
        let terminal = Terminal::new(backend)?;
        let event_stream = EventStream::new();

        let mut ticks = tokio::time::interval(TICK);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        Ok(Self {
            terminal,
            event_stream,
            ticks,
            http,
            config,
            download_dir,
            channel: None,
            generation: 0,
            outcomes_tx,
            outcomes_rx,
        })
    }

    /// Convert a crossterm key event to `KeyInput`.
    fn convert_key(key: KeyEvent) -> Option<KeyInput> {
        match key.code {
            KeyCode::Char(c) => Some(KeyInput::Char(c)),
            KeyCode::Enter => Some(KeyInput::Enter),
            KeyCode::Backspace => Some(KeyInput::Backspace),
            KeyCode::Delete => Some(KeyInput::Delete),
            KeyCode::Tab | KeyCode::BackTab => Some(KeyInput::Tab),
            KeyCode::Esc => Some(KeyInput::Esc),
            KeyCode::Left => Some(KeyInput::Left),
            KeyCode::Right => Some(KeyInput::Right),
            KeyCode::Up => Some(KeyInput::Up),
            KeyCode::Down => Some(KeyInput::Down),
            KeyCode::Home => Some(KeyInput::Home),
            KeyCode::End => Some(KeyInput::End),
            _ => None,
        }
    }

    /// Turn a task outcome into runtime input, dropping stale channels.
    fn accept(&mut self, outcome: Outcome) -> Option<Input<Instant>> {
        match outcome {
            Outcome::Input(input) => Some(input),
            Outcome::Opened { generation, channel } if generation == self.generation => {
                tracing::info!("channel open");
                self.channel = Some(channel);
                Some(Input::Client(ClientEvent::ChannelOpened))
            },
            Outcome::Opened { channel, .. } => {
                tracing::debug!("discarding channel opened after close");
                channel.stop();
                None
            },
        }
    }

    /// Turn a channel event into runtime input.
    fn channel_event(&mut self, event: Option<ChannelEvent>) -> Input<Instant> {
        let (server_initiated, reason) = match event {
            Some(ChannelEvent::Frame(frame)) => {
                return Input::Client(ClientEvent::FrameReceived(frame));
            },
            Some(ChannelEvent::Closed { server_initiated, reason }) => (server_initiated, reason),
            None => (false, "channel task ended".to_string()),
        };

        tracing::info!(server_initiated, %reason, "channel closed");
        self.channel = None;
        Input::Client(ClientEvent::ChannelClosed(close_reason(server_initiated, reason)))
    }

    /// Run `task` in the background and queue what it reports.
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Option<Outcome>> + Send + 'static,
    {
        let outcomes = self.outcomes_tx.clone();
        tokio::spawn(async move {
            if let Some(outcome) = task.await {
                let _ = outcomes.send(outcome);
            }
        });
    }

    fn open(&mut self, attempt: u32) {
        let url = match self.http.urls().channel() {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "no channel url");
                let _ = self
                    .outcomes_tx
                    .send(Outcome::client(ClientEvent::ConnectFailed(ConnectErrorKind::Other)));
                return;
            },
        };

        tracing::info!(attempt, %url, "opening channel");
        let generation = self.generation;
        let timeout = self.config.attempt_timeout;
        self.spawn(async move {
            Some(match open_channel(&url, timeout).await {
                Ok(channel) => Outcome::Opened { generation, channel },
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "channel open failed");
                    Outcome::client(ClientEvent::ConnectFailed(classify_connect_error(
                        &e.to_string(),
                    )))
                },
            })
        });
    }

    fn close(&mut self) {
        self.generation += 1;
        if let Some(channel) = self.channel.take() {
            tracing::info!("closing channel");
            channel.stop();
        }
    }

    fn inspect(&self, path: String) {
        self.spawn(async move {
            Some(match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => Outcome::client(ClientEvent::UploadFile {
                    filename: file_name(&path),
                    size: meta.len(),
                    source: path,
                }),
                Ok(_) => Outcome::app(AppEvent::error(format!("{path} is not a file"))),
                Err(e) => Outcome::app(AppEvent::error(format!("Cannot read {path}: {e}"))),
            })
        });
    }

    fn upload(
        &self,
        upload: UploadId,
        source: String,
        presigned_url: String,
        content_type: String,
    ) {
        let http = self.http.clone();
        let outcomes = self.outcomes_tx.clone();
        self.spawn(async move {
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let forward = async {
                while let Some((sent, total)) = progress_rx.recv().await {
                    let event = ClientEvent::UploadProgress { upload, sent, total };
                    let _ = outcomes.send(Outcome::client(event));
                }
            };
            let transfer =
                http.upload(Path::new(&source), &presigned_url, &content_type, progress_tx);

            let (result, ()) = tokio::join!(transfer, forward);
            Some(Outcome::client(match result {
                Ok(()) => ClientEvent::UploadCompleted { upload },
                Err(e) => {
                    tracing::warn!(%upload, error = %e, "upload failed");
                    ClientEvent::UploadFailed { upload, reason: e.to_string() }
                },
            }))
        });
    }
}

/// Last path component, or the whole string if it has none.
fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map_or_else(|| path.to_string(), |name| name.to_string_lossy().into_owned())
}

/// Where to save a file named `filename`, never outside `dir`.
fn save_path(dir: &Path, filename: &str) -> PathBuf {
    match Path::new(filename).file_name() {
        Some(name) => dir.join(name),
        None => dir.join("download"),
    }
}

/// Next event of the open channel. Pends forever without one.
async fn next_channel_event(channel: Option<&mut Channel>) -> Option<ChannelEvent> {
    match channel {
        Some(channel) => channel.from_server.recv().await,
        None => std::future::pending().await,
    }
}

impl Driver for TerminalDriver {
    type Error = TerminalError;
    type Instant = Instant;

    async fn poll(&mut self) -> Result<Option<Input<Instant>>, Self::Error> {
        loop {
            tokio::select! {
                biased;

                // Task outcomes
                Some(outcome) = self.outcomes_rx.recv() => {
                    if let Some(input) = self.accept(outcome) {
                        return Ok(Some(input));
                    }
                }

                // Server frames
                event = next_channel_event(self.channel.as_mut()) => {
                    return Ok(Some(self.channel_event(event)));
                }

                // Terminal events
                maybe_event = self.event_stream.next() => match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(key) = Self::convert_key(key) {
                            return Ok(Some(Input::App(AppEvent::Key(key))));
                        }
                    },
                    Some(Ok(Event::Resize(cols, rows))) => {
                        return Ok(Some(Input::App(AppEvent::Resize(cols, rows))));
                    },
                    Some(Ok(_)) => {},
                    Some(Err(e)) => return Err(TerminalError::Io(e)),
                    None => return Ok(None),
                },

                // Tick
                _ = self.ticks.tick() => {
                    return Ok(Some(Input::App(AppEvent::Tick)));
                }
            }
        }
    }

    async fn perform(&mut self, request: IoRequest) -> Result<(), Self::Error> {
        match request {
            IoRequest::Send(frame) => match &self.channel {
                Some(channel) => {
                    let event = frame.name();
                    if channel.to_server.send(frame).await.is_err() {
                        tracing::warn!(event, "channel task gone; frame dropped");
                    }
                },
                None => tracing::warn!(event = frame.name(), "no open channel; frame dropped"),
            },
            IoRequest::ProbeHealth { probe_id } => {
                let http = self.http.clone();
                let timeout = self.config.probe_timeout;
                self.spawn(async move {
                    let health = http.health(timeout).await;
                    Some(Outcome::client(ClientEvent::ProbeCompleted { probe_id, health }))
                });
            },
            IoRequest::OpenChannel { attempt } => self.open(attempt),
            IoRequest::CloseChannel => self.close(),
            IoRequest::FetchNetworkInfo => {
                let http = self.http.clone();
                self.spawn(async move {
                    match http.network_info().await {
                        Ok(info) => Some(Outcome::client(ClientEvent::NetworkInfoReceived(info))),
                        Err(e) => {
                            tracing::warn!(error = %e, "network info unavailable");
                            None
                        },
                    }
                });
            },
            IoRequest::InspectFile { path } => self.inspect(path),
            IoRequest::StartUpload { upload, source, presigned_url, content_type } => {
                self.upload(upload, source, presigned_url, content_type);
            },
            IoRequest::Download { filename, url } => {
                let http = self.http.clone();
                let dest = save_path(&self.download_dir, &filename);
                self.spawn(async move {
                    Some(Outcome::app(match http.download(&url, &dest).await {
                        Ok(bytes) => {
                            tracing::info!(path = %dest.display(), bytes, "download saved");
                            AppEvent::info(format!("Saved {filename} to {}", dest.display()))
                        },
                        Err(e) => AppEvent::error(format!("Download of {filename} failed: {e}")),
                    }))
                });
            },
            IoRequest::Export(request) => {
                let http = self.http.clone();
                let filename = format!("{}-transcript.pdf", request.room_code);
                let dest = save_path(&self.download_dir, &filename);
                self.spawn(async move {
                    let saved = match http.export(&request).await {
                        Ok(document) => {
                            tokio::fs::write(&dest, document).await.map_err(TransportError::from)
                        },
                        Err(e) => Err(e),
                    };
                    Some(Outcome::app(match saved {
                        Ok(()) => AppEvent::info(format!("Transcript saved to {}", dest.display())),
                        Err(e) => AppEvent::error(format!("Export failed: {e}")),
                    }))
                });
            },
        }
        Ok(())
    }

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn render(&mut self, app: &App, session: Option<&dyn SessionView>) -> Result<(), Self::Error> {
        self.terminal.draw(|frame| {
            ui::render(frame, app, session);
        })?;
        Ok(())
    }

    fn stop(&mut self) {
        self.close();
    }
}

impl Drop for TerminalDriver {
    fn drop(&mut self) {
        self.stop();
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;

    use super::*;

    #[test]
    fn keys_map_to_app_input() {
        let key = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(TerminalDriver::convert_key(key(KeyCode::Char('x'))), Some(KeyInput::Char('x')));
        assert_eq!(TerminalDriver::convert_key(key(KeyCode::BackTab)), Some(KeyInput::Tab));
        assert_eq!(TerminalDriver::convert_key(key(KeyCode::Esc)), Some(KeyInput::Esc));
        assert_eq!(TerminalDriver::convert_key(key(KeyCode::F(1))), None);
    }

    #[test]
    fn saved_files_stay_in_download_dir() {
        let dir = Path::new("/data/downloads");
        assert_eq!(save_path(dir, "notes.txt"), dir.join("notes.txt"));
        assert_eq!(save_path(dir, "../../etc/passwd"), dir.join("passwd"));
        assert_eq!(save_path(dir, ".."), dir.join("download"));
    }

    #[test]
    fn file_names_from_paths() {
        assert_eq!(file_name("/tmp/report.pdf"), "report.pdf");
        assert_eq!(file_name("report.pdf"), "report.pdf");
    }
}
