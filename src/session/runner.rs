//! The interactive export state machine.
//!
//! `Connect → Authenticate → [ElevatePrivilege] → IssueExportCommand →
//! AwaitCompletion → Capture → Disconnect`. Connect and Authenticate are the
//! transport's job; the runner takes over at the first prompt. Disconnect is
//! executed on every exit path, and a disconnect error never changes an
//! already-decided outcome.
//!
//! There is no retry inside a run: one attempt per device.

use log::{debug, trace, warn};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use crate::error::{Result, SessionError, TransportError};
use crate::transport::SessionTransport;
use crate::vendor::SessionProfile;

const SEARCH_DEPTH: usize = 1000;

/// Outcome of waiting for a pattern against the session deadline.
enum Wait {
    Matched,
    DeadlinePassed,
}

/// Drives one device's export over an established transport.
pub struct SessionRunner<T: SessionTransport> {
    transport: T,
    profile: SessionProfile,
    buffer: PatternBuffer,
}

impl<T: SessionTransport> SessionRunner<T> {
    /// Wrap a freshly connected transport.
    pub fn new(transport: T, profile: SessionProfile) -> Self {
        Self {
            transport,
            profile,
            buffer: PatternBuffer::new(SEARCH_DEPTH),
        }
    }

    /// Run the export to completion and return the captured payload.
    ///
    /// The transport is released on every exit path: success, failure, or
    /// timeout.
    pub async fn run(mut self, elevate: bool, secret: &SecretString) -> Result<Vec<u8>> {
        let result = self.export(elevate, secret).await;
        if let Err(e) = self.transport.close().await {
            // Outcome is already decided; the broken disconnect is only logged.
            warn!("Disconnect failed: {e}");
        }
        result
    }

    async fn export(&mut self, elevate: bool, secret: &SecretString) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.profile.session_timeout;
        let prompt = self.profile.prompt.clone();

        // The session is live once the device prints its first prompt.
        match self.read_until(&prompt, deadline).await? {
            Wait::Matched => self.buffer.clear(),
            Wait::DeadlinePassed => {
                return Err(SessionError::NoPrompt(self.profile.session_timeout).into());
            }
        }

        if elevate {
            self.elevate(secret, deadline).await?;
        }

        for command in self.profile.setup_commands.clone() {
            debug!("Setup command: {command}");
            self.transport.send_line(&command).await?;
            match self.read_until(&prompt, deadline).await? {
                Wait::Matched => self.buffer.clear(),
                Wait::DeadlinePassed => {
                    return Err(SessionError::NoPrompt(self.profile.session_timeout).into());
                }
            }
        }

        let mut payload = Vec::new();
        for command in self.profile.export_commands.clone() {
            debug!("Export command: {command}");
            self.transport.send_line(&command).await?;
            self.await_completion(deadline).await?;
            let captured = self.buffer.take();
            payload.extend_from_slice(&normalize(&captured, &command, &prompt));
        }

        Ok(payload)
    }

    /// Enter elevated privilege mode per the vendor's sequence.
    async fn elevate(&mut self, secret: &SecretString, deadline: Instant) -> Result<()> {
        let Some(elevation) = self.profile.elevation.clone() else {
            return Err(SessionError::ElevationFailed {
                message: "vendor profile has no elevation sequence".into(),
            }
            .into());
        };

        self.transport.send_line(&elevation.command).await?;

        if let Some(challenge) = &elevation.password_prompt {
            match self.read_until(challenge, deadline).await? {
                Wait::Matched => self.buffer.clear(),
                Wait::DeadlinePassed => {
                    return Err(SessionError::ElevationFailed {
                        message: "password challenge did not appear".into(),
                    }
                    .into());
                }
            }
            self.transport.send_line(secret.expose_secret()).await?;
        }

        match self.read_until(&elevation.prompt, deadline).await? {
            Wait::Matched => {
                self.buffer.clear();
                Ok(())
            }
            Wait::DeadlinePassed => Err(SessionError::ElevationFailed {
                message: "elevated prompt did not appear".into(),
            }
            .into()),
        }
    }

    /// Read until `pattern` appears in the buffer tail or `deadline` passes.
    async fn read_until(&mut self, pattern: &Regex, deadline: Instant) -> Result<Wait> {
        loop {
            if self.buffer.tail_contains(pattern) {
                return Ok(Wait::Matched);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Wait::DeadlinePassed);
            }
            match self.transport.read_chunk(deadline - now).await {
                Ok(Some(data)) => {
                    trace!("read {} bytes", data.len());
                    self.buffer.extend(&data);
                }
                Ok(None) => {}
                Err(TransportError::Disconnected) => {
                    return Err(SessionError::ClosedMidExport.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// The completion-detection core. Declares the export complete when ANY
    /// of the following holds:
    ///
    /// 1. the terminal prompt pattern reappears in the stream,
    /// 2. no new bytes arrive for the vendor's idle window,
    /// 3. the absolute session deadline passes, classified as a timeout,
    ///    with the partial buffer discarded by the caller chain.
    async fn await_completion(&mut self, deadline: Instant) -> Result<()> {
        let idle = self.profile.idle_timeout;
        let mut last_data = Instant::now();

        loop {
            if self.buffer.tail_contains(&self.profile.prompt) {
                debug!("Completion: prompt matched");
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SessionError::CompletionTimeout(self.profile.session_timeout).into());
            }
            let idle_deadline = last_data + idle;
            if now >= idle_deadline {
                debug!("Completion: idle for {idle:?}");
                return Ok(());
            }

            let wait = idle_deadline.min(deadline) - now;
            match self.transport.read_chunk(wait).await {
                Ok(Some(data)) => {
                    trace!("read {} bytes", data.len());
                    self.buffer.extend(&data);
                    last_data = Instant::now();
                }
                Ok(None) => {}
                Err(TransportError::Disconnected) => {
                    return Err(SessionError::ClosedMidExport.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Trim the command echo from the front and the trailing prompt line from
/// the back of a captured export.
fn normalize(raw: &[u8], command: &str, prompt: &Regex) -> Vec<u8> {
    let mut out: &[u8] = raw;

    if out.starts_with(command.as_bytes()) {
        out = &out[command.len()..];
    }
    while matches!(out.first(), Some(b'\r' | b'\n')) {
        out = &out[1..];
    }

    let last_line_start = out.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1);
    if prompt.is_match(&out[last_line_start..]) {
        out = &out[..last_line_start];
    }
    while matches!(out.last(), Some(b'\r' | b'\n' | b' ')) {
        out = &out[..out.len() - 1];
    }

    let mut payload = out.to_vec();
    if !payload.is_empty() {
        payload.push(b'\n');
    }
    payload
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::testing::{Event, ScriptTransport};
    use crate::vendor::Elevation;

    fn pattern(re: &str) -> Regex {
        Regex::new(re).unwrap()
    }

    fn profile(idle_secs: u64, session_secs: u64) -> SessionProfile {
        SessionProfile {
            setup_commands: vec![],
            export_commands: vec!["/export".into()],
            prompt: pattern(r"(?m)^\[admin@gw\] >\s*$"),
            elevation: None,
            idle_timeout: Duration::from_secs(idle_secs),
            session_timeout: Duration::from_secs(session_secs),
        }
    }

    fn chunk(bytes: &[u8]) -> Event {
        Event::Chunk(bytes.to_vec())
    }

    fn secret() -> SecretString {
        SecretString::from("hunter2".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_completion_captures_output() {
        let transport = ScriptTransport::new(vec![
            (0, chunk(b"[admin@gw] > ")),
            (10, chunk(b"/export\r\n# config line 1\n# config line 2\n")),
            (10, chunk(b"[admin@gw] > ")),
        ]);
        let sent = transport.sent();
        let closed = transport.closed();

        let runner = SessionRunner::new(transport, profile(60, 300));
        let payload = runner.run(false, &secret()).await.unwrap();

        assert_eq!(payload, b"# config line 1\n# config line 2\n");
        assert_eq!(sent.lock().unwrap().as_slice(), ["/export"]);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_window_completes_without_prompt() {
        // Device streams the export, then goes quiet and never re-prompts.
        let transport = ScriptTransport::new(vec![
            (0, chunk(b"[admin@gw] > ")),
            (50, chunk(b"# exported config\n")),
        ]);
        let closed = transport.closed();

        let started = Instant::now();
        let runner = SessionRunner::new(transport, profile(5, 300));
        let payload = runner.run(false, &secret()).await.unwrap();

        assert_eq!(payload, b"# exported config\n");
        // Completed at the idle window, far before the session bound.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(7));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn absolute_deadline_classifies_timeout() {
        // Data keeps trickling so the idle window never expires, and no
        // prompt ever appears.
        let mut events = vec![(0, chunk(b"[admin@gw] > "))];
        for _ in 0..20 {
            events.push((5_000, chunk(b"still exporting...\n")));
        }
        let transport = ScriptTransport::new(events);
        let closed = transport.closed();

        let started = Instant::now();
        let runner = SessionRunner::new(transport, profile(60, 30));
        let err = runner.run(false, &secret()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Session(SessionError::CompletionTimeout(t)) if t == Duration::from_secs(30)
        ));
        // Finalized at the configured deadline, not earlier or materially later.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed < Duration::from_secs(31));
        // Disconnect still ran.
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn no_initial_prompt_is_a_failure_not_a_timeout() {
        let transport = ScriptTransport::new(vec![(0, chunk(b"banner text\n"))]);
        let runner = SessionRunner::new(transport, profile(60, 30));
        let err = runner.run(false, &secret()).await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::NoPrompt(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn eof_mid_export_is_a_protocol_failure() {
        let transport = ScriptTransport::new(vec![
            (0, chunk(b"[admin@gw] > ")),
            (10, chunk(b"partial config")),
            (10, Event::Eof),
        ]);
        let closed = transport.closed();

        let runner = SessionRunner::new(transport, profile(60, 300));
        let err = runner.run(false, &secret()).await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::ClosedMidExport)));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn elevation_sequence_runs_before_export() {
        let profile = SessionProfile {
            setup_commands: vec!["terminal datadump".into()],
            export_commands: vec!["show run".into()],
            prompt: pattern(r"(?m)^core-sw[>#]\s*$"),
            elevation: Some(Elevation {
                command: "enable".into(),
                password_prompt: Some(pattern(r"(?i)password[: ]*$")),
                prompt: pattern(r"(?m)^core-sw#\s*$"),
            }),
            idle_timeout: Duration::from_secs(10),
            session_timeout: Duration::from_secs(180),
        };

        let transport = ScriptTransport::new(vec![
            (0, chunk(b"core-sw>")),
            (5, chunk(b"Password:")),
            (5, chunk(b"core-sw#")),
            (5, chunk(b"terminal datadump\r\ncore-sw#")),
            (5, chunk(b"show run\r\ninterface gi1\n no shutdown\n")),
            (5, chunk(b"core-sw#")),
        ]);
        let sent = transport.sent();

        let runner = SessionRunner::new(transport, profile);
        let payload = runner.run(true, &secret()).await.unwrap();

        assert_eq!(
            sent.lock().unwrap().as_slice(),
            ["enable", "hunter2", "terminal datadump", "show run"]
        );
        assert_eq!(payload, b"interface gi1\n no shutdown\n");
    }

    #[tokio::test(start_paused = true)]
    async fn elevation_without_sequence_fails() {
        let transport = ScriptTransport::new(vec![(0, chunk(b"[admin@gw] > "))]);
        let runner = SessionRunner::new(transport, profile(60, 300));
        let err = runner.run(true, &secret()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::ElevationFailed { .. })
        ));
    }

    #[test]
    fn normalize_strips_echo_and_prompt() {
        let prompt = pattern(r"(?m)^\[admin@gw\] >\s*$");
        let raw = b"/export\r\n# line\n[admin@gw] > ";
        assert_eq!(normalize(raw, "/export", &prompt), b"# line\n");
    }

    #[test]
    fn normalize_keeps_idle_capture_without_prompt() {
        let prompt = pattern(r"(?m)^\[admin@gw\] >\s*$");
        let raw = b"/export\r\n# line one\n# line two\n";
        assert_eq!(normalize(raw, "/export", &prompt), b"# line one\n# line two\n");
    }
}
