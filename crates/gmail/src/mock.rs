use std::sync::Mutex;

use async_trait::async_trait;

use mailbrief_core::EmailItem;

use crate::error::MailboxError;
use crate::mailbox::Mailbox;

/// Failure injected into a [`MockMailbox`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    AuthInvalid,
    RateLimited,
    Network,
}

impl MockFailure {
    fn to_error(self) -> MailboxError {
        match self {
            Self::AuthInvalid => MailboxError::AuthInvalid("mock: token revoked".into()),
            Self::RateLimited => MailboxError::RateLimited("mock: 429".into()),
            Self::Network => MailboxError::Network("mock: connection reset".into()),
        }
    }
}

/// In-memory [`Mailbox`] for tests.
///
/// Serves a fixed set of emails, records queries and archive calls, and
/// can inject failures per operation.
#[derive(Debug, Default)]
pub struct MockMailbox {
    emails: Vec<EmailItem>,
    queries: Mutex<Vec<String>>,
    archived: Mutex<Vec<String>>,
    fail_search: Mutex<Option<MockFailure>>,
    fail_fetch: Mutex<Option<MockFailure>>,
    fail_archive: Mutex<Option<MockFailure>>,
}

impl MockMailbox {
    #[must_use]
    pub fn new(emails: Vec<EmailItem>) -> Self {
        Self {
            emails,
            ..Self::default()
        }
    }

    /// Inject a failure into every subsequent `search` call.
    pub fn fail_search(&self, failure: MockFailure) {
        *self.fail_search.lock().unwrap() = Some(failure);
    }

    /// Inject a failure into every subsequent `fetch_messages` call.
    pub fn fail_fetch(&self, failure: MockFailure) {
        *self.fail_fetch.lock().unwrap() = Some(failure);
    }

    /// Inject a failure into every subsequent `archive` call.
    pub fn fail_archive(&self, failure: MockFailure) {
        *self.fail_archive.lock().unwrap() = Some(failure);
    }

    /// Queries observed so far.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// All ids archived so far.
    #[must_use]
    pub fn archived_ids(&self) -> Vec<String> {
        self.archived.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailbox for MockMailbox {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<String>, MailboxError> {
        if let Some(failure) = *self.fail_search.lock().unwrap() {
            return Err(failure.to_error());
        }
        self.queries.lock().unwrap().push(query.to_owned());
        Ok(self
            .emails
            .iter()
            .take(max_results as usize)
            .map(|e| e.id.clone())
            .collect())
    }

    async fn fetch_messages(&self, ids: &[String]) -> Result<Vec<EmailItem>, MailboxError> {
        if let Some(failure) = *self.fail_fetch.lock().unwrap() {
            return Err(failure.to_error());
        }
        Ok(self
            .emails
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect())
    }

    async fn archive(&self, ids: &[String]) -> Result<(), MailboxError> {
        if let Some(failure) = *self.fail_archive.lock().unwrap() {
            return Err(failure.to_error());
        }
        self.archived.lock().unwrap().extend(ids.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailbrief_core::EmailSender;

    fn email(id: &str) -> EmailItem {
        EmailItem {
            id: id.to_owned(),
            thread_id: format!("t-{id}"),
            sender: EmailSender::parse("AI Weekly <ai@example.com>"),
            subject: "subject".into(),
            date: "2024-06-01T00:00:00+00:00".into(),
            snippet: "snippet".into(),
            body: "body".into(),
            labels: vec!["INBOX".into()],
        }
    }

    #[tokio::test]
    async fn serves_and_records() {
        let mock = MockMailbox::new(vec![email("a"), email("b")]);
        let ids = mock.search("in:inbox", 10).await.unwrap();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(mock.queries(), vec!["in:inbox"]);

        let emails = mock.fetch_messages(&ids).await.unwrap();
        assert_eq!(emails.len(), 2);

        mock.archive(&ids).await.unwrap();
        assert_eq!(mock.archived_ids(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn respects_max_results() {
        let mock = MockMailbox::new(vec![email("a"), email("b"), email("c")]);
        let ids = mock.search("in:inbox", 2).await.unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn injected_failures_fire() {
        let mock = MockMailbox::new(vec![email("a")]);
        mock.fail_search(MockFailure::AuthInvalid);
        assert!(matches!(
            mock.search("x", 1).await.unwrap_err(),
            MailboxError::AuthInvalid(_)
        ));

        mock.fail_archive(MockFailure::Network);
        assert!(mock.archive(&["a".into()]).await.is_err());
        assert!(mock.archived_ids().is_empty());
    }
}
