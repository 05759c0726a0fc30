//! Operator notifications.
//!
//! A message is composed once per invocation and handed to every configured
//! destination. Delivery is best effort: callers log failures and carry on.

use crate::process_stop::exit_status_code;
use crate::types::{ProcessName, StopError};
use reqwest::blocking::Client;
use serde_json::json;
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Something that can deliver a text message to an operator channel.
pub trait Notifier {
    fn name(&self) -> &str {
        "notifier"
    }

    fn notify(&self, channel: &str, message: &str) -> Result<(), StopError>;
}

/// Text announcing that `operator` is stopping `process`.
pub fn compose_message(operator: &str, process: ProcessName) -> String {
    format!("{} is stopping {}", operator, process)
}

/// Messaging CLI invoked as `program [args..] <channel> <message>`.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Notifier for CommandNotifier {
    fn name(&self) -> &str {
        &self.program
    }

    fn notify(&self, channel: &str, message: &str) -> Result<(), StopError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(channel)
            .arg(message)
            .output()
            .map_err(|e| StopError::Notification(format!("failed to run {}: {}", self.program, e)))?;

        if output.status.success() {
            return Ok(());
        }
        Err(StopError::Notification(format!(
            "{} exited with {}: {}",
            self.program,
            exit_status_code(output.status),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Chat webhook receiving `{"channel": .., "text": ..}`.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self, StopError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
            token,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.url
    }

    fn notify(&self, channel: &str, message: &str) -> Result<(), StopError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&json!({ "channel": channel, "text": message }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        send(request, &self.url)
    }
}

/// Grafana annotation API. The channel is not used; `tag` marks the annotation instead.
#[derive(Debug, Clone)]
pub struct GrafanaAnnotator {
    client: Client,
    url: String,
    token: String,
    tag: String,
}

impl GrafanaAnnotator {
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        tag: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StopError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
            token: token.into(),
            tag: tag.into(),
        })
    }
}

impl Notifier for GrafanaAnnotator {
    fn name(&self) -> &str {
        &self.url
    }

    fn notify(&self, _channel: &str, message: &str) -> Result<(), StopError> {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let annotation = json!({
            "time": now_ms,
            "isRegion": false,
            "tags": [self.tag],
            "text": message,
        });
        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&annotation);
        send(request, &self.url)
    }
}

/// Stand-in for a destination that could not be set up. Every delivery fails
/// with the setup error, so the run reports `notified: false` but still proceeds.
#[derive(Debug, Clone)]
pub struct UnavailableNotifier {
    name: String,
    reason: String,
}

impl UnavailableNotifier {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl Notifier for UnavailableNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify(&self, _channel: &str, _message: &str) -> Result<(), StopError> {
        Err(StopError::Notification(format!("{} is unavailable: {}", self.name, self.reason)))
    }
}

fn http_client(timeout: Duration) -> Result<Client, StopError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| StopError::Notification(format!("failed to build HTTP client: {}", e)))
}

fn send(request: reqwest::blocking::RequestBuilder, url: &str) -> Result<(), StopError> {
    let response = request
        .send()
        .map_err(|e| StopError::Notification(format!("POST {} failed: {}", url, e)))?;
    let status = response.status();
    if status.is_success() {
        debug!(%url, %status, "notification accepted");
        Ok(())
    } else {
        Err(StopError::Notification(format!("POST {} returned {}", url, status)))
    }
}

/// Fan-out over every configured destination.
#[derive(Default)]
pub struct Notifiers {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl Notifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Deliver to each destination once. Returns how many accepted the message.
    pub fn broadcast(&self, channel: &str, message: &str) -> usize {
        let mut delivered = 0;
        for notifier in &self.notifiers {
            match notifier.notify(channel, message) {
                Ok(()) => {
                    info!(destination = notifier.name(), %channel, "notification sent");
                    delivered += 1;
                }
                Err(e) => warn!(destination = notifier.name(), "notification failed: {}", e),
            }
        }
        delivered
    }
}

impl Notifier for Notifiers {
    fn name(&self) -> &str {
        "notifiers"
    }

    fn notify(&self, channel: &str, message: &str) -> Result<(), StopError> {
        let delivered = self.broadcast(channel, message);
        if delivered == self.notifiers.len() {
            Ok(())
        } else {
            Err(StopError::Notification(format!(
                "{} of {} destinations accepted the message",
                delivered,
                self.notifiers.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_secs(5);

    // Accepts one connection, answers with `status` and hands back the raw request.
    fn serve_once(status: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            );
            stream.write_all(response.as_bytes()).unwrap();
            tx.send(request).unwrap();
        });
        (url, rx)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let body_len = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    struct Fixed(bool);

    impl Notifier for Fixed {
        fn notify(&self, _channel: &str, _message: &str) -> Result<(), StopError> {
            if self.0 {
                Ok(())
            } else {
                Err(StopError::Notification("down".into()))
            }
        }
    }

    #[test]
    fn test_compose_message() {
        let message = compose_message("obs", ProcessName::Automator);
        assert_eq!(message, "obs is stopping automator");
        assert!(compose_message("alice", ProcessName::Coordinator).contains("coordinator"));
    }

    #[test]
    fn test_command_notifier_arguments() {
        let notifier = CommandNotifier::new(
            "/bin/sh",
            vec![
                "-c".into(),
                r#"test "$1" = alerts && test "$2" = "obs is stopping automator""#.into(),
                "sh".into(),
            ],
        );
        assert!(notifier.notify("alerts", "obs is stopping automator").is_ok());
        assert!(notifier.notify("other", "obs is stopping automator").is_err());
    }

    #[test]
    fn test_command_notifier_missing_program() {
        let err = CommandNotifier::new("/nonexistent/slack", Vec::new())
            .notify("alerts", "hi")
            .unwrap_err();
        assert!(matches!(err, StopError::Notification(_)));
    }

    #[test]
    fn test_webhook_posts_json() {
        let (url, rx) = serve_once("200 OK");
        let notifier = WebhookNotifier::new(url, Some("secret".into()), TIMEOUT).unwrap();
        notifier.notify("alerts", "obs is stopping coordinator").unwrap();

        let request = rx.recv_timeout(TIMEOUT).unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains(r#""channel":"alerts""#));
        assert!(request.contains(r#""text":"obs is stopping coordinator""#));
    }

    #[test]
    fn test_webhook_error_status() {
        let (url, _rx) = serve_once("500 Internal Server Error");
        let notifier = WebhookNotifier::new(url, None, TIMEOUT).unwrap();
        assert!(notifier.notify("alerts", "x").is_err());
    }

    #[test]
    fn test_grafana_annotation_body() {
        let (url, rx) = serve_once("200 OK");
        let annotator = GrafanaAnnotator::new(url, "tok", "procstop", TIMEOUT).unwrap();
        annotator.notify("alerts", "obs is stopping automator").unwrap();

        let request = rx.recv_timeout(TIMEOUT).unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(lower.contains("authorization: bearer tok"));
        assert!(lower.contains("accept: application/json"));
        assert!(request.contains(r#""tags":["procstop"]"#));
        assert!(request.contains(r#""isRegion":false"#));
        assert!(request.contains(r#""text":"obs is stopping automator""#));
    }

    #[test]
    fn test_broadcast_counts_successes() {
        let mut notifiers = Notifiers::new();
        notifiers.push(Box::new(Fixed(true)));
        notifiers.push(Box::new(Fixed(false)));
        notifiers.push(Box::new(Fixed(true)));

        assert_eq!(notifiers.broadcast("alerts", "m"), 2);
        assert!(notifiers.notify("alerts", "m").is_err());
    }

    #[test]
    fn test_unavailable_notifier_always_fails() {
        let notifier = UnavailableNotifier::new("grafana", "environment variable GRAFANA_AUTH is not set");
        let err = notifier.notify("alerts", "m").unwrap_err();
        assert!(err.to_string().contains("GRAFANA_AUTH"));
    }

    #[test]
    fn test_empty_fan_out_is_ok() {
        assert!(Notifiers::new().notify("alerts", "m").is_ok());
    }
}
