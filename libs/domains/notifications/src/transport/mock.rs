//! Mock SMTP connector for testing.
//!
//! Counts every connect, authenticate, send and release, records accepted
//! messages, and can be scripted to fail or stall at any network stage.

use super::{BoxError, SmtpConnection, SmtpConnector};
use crate::config::SmtpSettings;
use crate::error::DispatchStage;
use crate::models::EmailMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MockRecord {
    connects: AtomicUsize,
    authentications: AtomicUsize,
    sends: AtomicUsize,
    releases: AtomicUsize,
    dropped: AtomicUsize,
    sent: Mutex<Vec<EmailMessage>>,
    credentials: Mutex<Vec<(String, String)>>,
}

#[derive(Debug, Clone, Default)]
struct MockBehavior {
    failures: HashMap<DispatchStage, String>,
    stalls: HashMap<DispatchStage, Duration>,
}

impl MockBehavior {
    async fn enter(&self, stage: DispatchStage) -> Result<(), BoxError> {
        if let Some(delay) = self.stalls.get(&stage) {
            tokio::time::sleep(*delay).await;
        }
        match self.failures.get(&stage) {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }
}

/// Mock connector that captures sent messages.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    behavior: MockBehavior,
    record: Arc<MockRecord>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `stage` with `message` as the relay's error text.
    pub fn failing_at(mut self, stage: DispatchStage, message: impl Into<String>) -> Self {
        self.behavior.failures.insert(stage, message.into());
        self
    }

    /// Sleep for `delay` before completing `stage`.
    pub fn stalling_at(mut self, stage: DispatchStage, delay: Duration) -> Self {
        self.behavior.stalls.insert(stage, delay);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.record.connects.load(Ordering::SeqCst)
    }

    pub fn auth_count(&self) -> usize {
        self.record.authentications.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.record.sends.load(Ordering::SeqCst)
    }

    /// Connections closed through QUIT.
    pub fn release_count(&self) -> usize {
        self.record.releases.load(Ordering::SeqCst)
    }

    /// Connections dropped, whether or not they were closed first.
    pub fn dropped_count(&self) -> usize {
        self.record.dropped.load(Ordering::SeqCst)
    }

    /// Messages the mock relay accepted.
    pub async fn sent_messages(&self) -> Vec<EmailMessage> {
        self.record.sent.lock().await.clone()
    }

    /// `(username, password)` pairs presented during authentication.
    pub async fn credentials(&self) -> Vec<(String, String)> {
        self.record.credentials.lock().await.clone()
    }

    /// Check if a message was accepted for a specific address
    pub async fn was_sent_to(&self, address: &str) -> bool {
        self.record
            .sent
            .lock()
            .await
            .iter()
            .any(|m| m.to_address() == address)
    }
}

#[async_trait]
impl SmtpConnector for MockConnector {
    async fn connect(&self, _settings: &SmtpSettings) -> Result<Box<dyn SmtpConnection>, BoxError> {
        self.record.connects.fetch_add(1, Ordering::SeqCst);
        self.behavior.enter(DispatchStage::Connect).await?;

        Ok(Box::new(MockConnection {
            behavior: self.behavior.clone(),
            record: Arc::clone(&self.record),
        }))
    }
}

struct MockConnection {
    behavior: MockBehavior,
    record: Arc<MockRecord>,
}

#[async_trait]
impl SmtpConnection for MockConnection {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), BoxError> {
        self.record.authentications.fetch_add(1, Ordering::SeqCst);
        self.record
            .credentials
            .lock()
            .await
            .push((username.to_string(), password.to_string()));
        self.behavior.enter(DispatchStage::Authenticate).await
    }

    async fn send(&mut self, message: &EmailMessage) -> Result<Option<String>, BoxError> {
        let sequence = self.record.sends.fetch_add(1, Ordering::SeqCst) + 1;
        self.behavior.enter(DispatchStage::Send).await?;

        self.record.sent.lock().await.push(message.clone());
        Ok(Some(format!("250 2.0.0 Ok: queued as mock-{}", sequence)))
    }

    async fn close(&mut self) {
        self.record.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.record.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings::new("smtp.authapi.test", 587, "mailer", "secret")
    }

    #[tokio::test]
    async fn test_mock_counts_each_stage() {
        let mock = MockConnector::new();
        let mut connection = mock.connect(&settings()).await.unwrap();
        connection.authenticate("mailer", "secret").await.unwrap();
        connection.close().await;
        drop(connection);

        assert_eq!(mock.connect_count(), 1);
        assert_eq!(mock.auth_count(), 1);
        assert_eq!(mock.send_count(), 0);
        assert_eq!(mock.release_count(), 1);
        assert_eq!(mock.dropped_count(), 1);
        assert_eq!(mock.credentials().await, vec![("mailer".to_string(), "secret".to_string())]);
    }

    #[tokio::test]
    async fn test_mock_fails_at_scripted_stage() {
        let mock = MockConnector::new().failing_at(DispatchStage::Authenticate, "535 nope");
        let mut connection = mock.connect(&settings()).await.unwrap();

        let err = connection.authenticate("mailer", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "535 nope");
    }

    #[tokio::test]
    async fn test_clones_share_counters() {
        let mock = MockConnector::new();
        let handle = mock.clone();
        let _connection = mock.connect(&settings()).await.unwrap();

        assert_eq!(handle.connect_count(), 1);
        assert!(!handle.was_sent_to("user@example.com").await);
    }
}
