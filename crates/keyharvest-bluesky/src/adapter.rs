//! Bluesky post search as a [`SourceAdapter`]

use std::sync::{Arc, Mutex, PoisonError};

use keyharvest_batch::{AdapterError, PageSink, SourceAdapter};
use keyharvest_core::{Delay, RecordSet, ThreadSleep};

use crate::api::{DEDUP_FIELD, SearchPage, Session};
use crate::config::Config;
use crate::http::{HttpError, HttpTransport, Transport};

pub const PLATFORM: &str = "bluesky";

enum SessionState {
    LoggedOut,
    Active(Session),
    /// The server refused the credentials; not retried for this adapter.
    Rejected(String),
}

enum Failure {
    Fatal(AdapterError),
    /// 400/401 on a search call, usually an expired access token.
    Unauthorized(HttpError),
    Http(HttpError),
}

/// Searches posts via `app.bsky.feed.searchPosts`.
///
/// Logs in lazily on the first call (or eagerly with [`login`](Self::login))
/// and keeps the session for every later keyword.
pub struct BlueskyAdapter<T = HttpTransport> {
    config: Config,
    transport: T,
    delay: Arc<dyn Delay + Send + Sync>,
    session: Mutex<SessionState>,
}

impl BlueskyAdapter<HttpTransport> {
    /// Adapter over HTTPS. Fails with a configuration error when
    /// credentials are missing or settings are out of range.
    pub fn new(config: Config) -> Result<Self, AdapterError> {
        let transport = HttpTransport::new(config.base_url());
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> BlueskyAdapter<T> {
    pub fn with_transport(config: Config, transport: T) -> Result<Self, AdapterError> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            delay: Arc::new(ThreadSleep),
            session: Mutex::new(SessionState::LoggedOut),
        })
    }

    /// Wait used between pages and before retries.
    pub fn with_delay(mut self, delay: Arc<dyn Delay + Send + Sync>) -> Self {
        self.delay = delay;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Establish the session now so bad credentials surface before a batch.
    pub fn login(&self) -> Result<(), AdapterError> {
        let mut attempts = 0;
        loop {
            match self.access_token() {
                Ok(_) => return Ok(()),
                Err(Failure::Http(e)) if e.is_retryable() => {
                    attempts += 1;
                    if attempts >= self.config.max_consecutive_errors {
                        return Err(AdapterError::Transient(format!("login failed: {e}")));
                    }
                    log::warn!("login failed: {e}, retrying");
                    self.delay.sleep(self.config.retry_wait());
                }
                Err(Failure::Fatal(e)) => return Err(e),
                Err(Failure::Http(e) | Failure::Unauthorized(e)) => {
                    return Err(AdapterError::Transient(format!("login failed: {e}")));
                }
            }
        }
    }

    fn access_token(&self) -> Result<String, Failure> {
        let mut state = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            SessionState::Active(session) => return Ok(session.access_jwt.clone()),
            SessionState::Rejected(msg) => {
                return Err(Failure::Fatal(AdapterError::Configuration(msg.clone())))
            }
            SessionState::LoggedOut => {}
        }

        let (identifier, password) = self.config.credentials().map_err(Failure::Fatal)?;
        log::info!("logging in to {} as {identifier}", self.config.base_url());
        match self.transport.create_session(identifier, password) {
            Ok(session) => {
                log::debug!("session established for {} ({})", session.handle, session.did);
                let token = session.access_jwt.clone();
                *state = SessionState::Active(session);
                Ok(token)
            }
            Err(e) if matches!(e.status(), Some(400 | 401)) => {
                let msg = format!("login as {identifier} rejected: {e}");
                *state = SessionState::Rejected(msg.clone());
                Err(Failure::Fatal(AdapterError::Configuration(msg)))
            }
            Err(e) => Err(Failure::Http(e)),
        }
    }

    fn forget_session(&self) {
        let mut state = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SessionState::Active(_)) {
            *state = SessionState::LoggedOut;
        }
    }

    fn search(
        &self,
        keyword: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<SearchPage, Failure> {
        let token = self.access_token()?;
        self.transport
            .search_posts(&token, keyword, limit, cursor)
            .map_err(|e| match e.status() {
                Some(400 | 401) => Failure::Unauthorized(e),
                _ => Failure::Http(e),
            })
    }
}

impl<T: Transport> SourceAdapter for BlueskyAdapter<T> {
    fn platform(&self) -> &str {
        PLATFORM
    }

    fn dedup_field(&self) -> &str {
        DEDUP_FIELD
    }

    fn fetch_pages(
        &self,
        keyword: &str,
        max_records: usize,
        sink: &mut PageSink<'_>,
    ) -> Result<(), AdapterError> {
        let max_errors = self.config.max_consecutive_errors;
        let mut fetched = 0usize;
        let mut cursor: Option<String> = None;
        let mut consecutive_errors = 0u32;
        let mut relogged = false;

        while fetched < max_records {
            let limit = self.config.page_size.min(max_records - fetched);
            let page = match self.search(keyword, limit, cursor.as_deref()) {
                Ok(page) => {
                    consecutive_errors = 0;
                    page
                }
                Err(Failure::Fatal(e)) => return Err(e),
                Err(Failure::Unauthorized(e)) if !relogged => {
                    log::info!("{keyword}: search refused ({e}), logging in again");
                    self.forget_session();
                    relogged = true;
                    continue;
                }
                Err(Failure::Http(e)) if e.is_retryable() => {
                    consecutive_errors += 1;
                    if consecutive_errors >= max_errors {
                        return Err(AdapterError::Transient(format!(
                            "{e} ({consecutive_errors} consecutive failures)"
                        )));
                    }
                    let wait = self.config.retry_wait();
                    log::warn!(
                        "{keyword}: {e}, retry {consecutive_errors}/{} in {:.1}s",
                        max_errors - 1,
                        wait.as_secs_f64()
                    );
                    self.delay.sleep(wait);
                    continue;
                }
                Err(Failure::Http(e) | Failure::Unauthorized(e)) => {
                    return Err(AdapterError::Transient(e.to_string()));
                }
            };

            if page.posts.is_empty() {
                break;
            }
            fetched += page.posts.len();
            log::debug!("{keyword}: page of {} posts, {fetched} so far", page.posts.len());

            let records = RecordSet::from_records(
                DEDUP_FIELD,
                page.posts.iter().map(|post| post.to_record(keyword)),
            );
            if sink(records).is_break() {
                break;
            }

            match page.cursor {
                Some(next) if fetched < max_records => cursor = Some(next),
                _ => break,
            }
            self.delay.sleep(self.config.page_pause);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::ops::ControlFlow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use keyharvest_core::RecordingDelay;

    use super::*;
    use crate::api::{Author, PostRecord, PostView};

    #[derive(Default)]
    struct Scripted {
        logins: Mutex<VecDeque<Result<Session, HttpError>>>,
        pages: Mutex<VecDeque<Result<SearchPage, HttpError>>>,
        login_calls: AtomicUsize,
        searches: Mutex<Vec<(usize, Option<String>)>>,
    }

    impl Scripted {
        fn with_pages(pages: impl IntoIterator<Item = Result<SearchPage, HttpError>>) -> Self {
            let transport = Self::default();
            transport.pages.lock().unwrap().extend(pages);
            transport
        }

        fn searches(&self) -> Vec<(usize, Option<String>)> {
            self.searches.lock().unwrap().clone()
        }
    }

    impl Transport for Scripted {
        fn create_session(&self, identifier: &str, _password: &str) -> Result<Session, HttpError> {
            self.login_calls.fetch_add(1, Ordering::Relaxed);
            self.logins.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(Session {
                    access_jwt: "token".into(),
                    did: "did:plc:me".into(),
                    handle: identifier.into(),
                })
            })
        }

        fn search_posts(
            &self,
            _access_token: &str,
            _query: &str,
            limit: usize,
            cursor: Option<&str>,
        ) -> Result<SearchPage, HttpError> {
            self.searches
                .lock()
                .unwrap()
                .push((limit, cursor.map(str::to_string)));
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(SearchPage::default()))
        }
    }

    fn page(range: std::ops::Range<usize>, cursor: Option<&str>) -> Result<SearchPage, HttpError> {
        let posts = range
            .map(|i| PostView {
                uri: format!("at://did:plc:a/app.bsky.feed.post/{i}"),
                author: Author {
                    did: "did:plc:a".into(),
                    handle: "a.bsky.social".into(),
                    display_name: None,
                    description: None,
                },
                record: PostRecord {
                    text: format!("post {i}"),
                    created_at: None,
                },
            })
            .collect();
        Ok(SearchPage {
            posts,
            cursor: cursor.map(str::to_string),
        })
    }

    fn status(code: u16) -> Result<SearchPage, HttpError> {
        Err(HttpError::Status {
            status: code,
            message: "scripted".into(),
        })
    }

    fn config() -> Config {
        Config {
            identifier: Some("me.bsky.social".into()),
            app_password: Some("app-pass".into()),
            page_size: 2,
            ..Config::default()
        }
    }

    fn adapter(
        transport: Scripted,
        config: Config,
    ) -> (BlueskyAdapter<Scripted>, Arc<RecordingDelay>) {
        let delay = Arc::new(RecordingDelay::new());
        let adapter = BlueskyAdapter::with_transport(config, transport)
            .unwrap()
            .with_delay(delay.clone());
        (adapter, delay)
    }

    const PAUSE: Duration = Duration::from_secs(2);
    const RETRY: Duration = Duration::from_secs(4);

    #[test]
    fn paginates_until_cursor_runs_out() {
        let transport = Scripted::with_pages([page(0..2, Some("c1")), page(2..3, None)]);
        let (adapter, delay) = adapter(transport, config());

        let set = adapter.fetch("fatf", 10).unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.dedup_field(), "uri");
        assert_eq!(
            adapter.transport.searches(),
            [(2, None), (2, Some("c1".to_string()))]
        );
        assert_eq!(delay.calls(), [PAUSE]);
    }

    #[test]
    fn limit_shrinks_to_remaining() {
        let transport = Scripted::with_pages([page(0..2, Some("c1")), page(2..3, Some("c2"))]);
        let (adapter, delay) = adapter(transport, config());

        let set = adapter.fetch("fatf", 3).unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(
            adapter.transport.searches(),
            [(2, None), (1, Some("c1".to_string()))]
        );
        // No pause once the cap is reached
        assert_eq!(delay.calls(), [PAUSE]);
    }

    #[test]
    fn empty_page_stops() {
        let (adapter, delay) = adapter(Scripted::default(), config());
        let set = adapter.fetch("nothing", 10).unwrap();
        assert!(set.is_empty());
        assert!(delay.calls().is_empty());
    }

    #[test]
    fn retries_with_double_pause() {
        let transport = Scripted::with_pages([status(429), status(503), page(0..1, None)]);
        let (adapter, delay) = adapter(transport, config());

        let set = adapter.fetch("fatf", 10).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(delay.calls(), [RETRY, RETRY]);
    }

    #[test]
    fn gives_up_after_consecutive_errors() {
        let transport = Scripted::with_pages([status(503), status(503), status(503)]);
        let (adapter, delay) = adapter(transport, config());

        let err = adapter.fetch("fatf", 10).unwrap_err();

        assert!(!err.is_configuration());
        assert!(err.to_string().contains("3 consecutive failures"));
        assert_eq!(adapter.transport.searches().len(), 3);
        assert_eq!(delay.calls(), [RETRY, RETRY]);
    }

    #[test]
    fn success_resets_error_count() {
        let transport = Scripted::with_pages([
            status(429),
            page(0..2, Some("c1")),
            status(429),
            page(2..3, None),
        ]);
        let config = Config {
            max_consecutive_errors: 2,
            ..config()
        };
        let (adapter, _) = adapter(transport, config);

        assert_eq!(adapter.fetch("fatf", 10).unwrap().len(), 3);
    }

    #[test]
    fn other_client_errors_fail_immediately() {
        let transport = Scripted::with_pages([status(404)]);
        let (adapter, delay) = adapter(transport, config());

        let err = adapter.fetch("fatf", 10).unwrap_err();

        assert_eq!(err, AdapterError::Transient("HTTP 404: scripted".into()));
        assert!(delay.calls().is_empty());
    }

    #[test]
    fn logs_in_once_across_keywords() {
        let transport = Scripted::with_pages([page(0..1, None), page(1..2, None)]);
        let (adapter, _) = adapter(transport, config());

        adapter.fetch("a", 10).unwrap();
        adapter.fetch("b", 10).unwrap();

        assert_eq!(adapter.transport.login_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn rejected_login_is_sticky_configuration_error() {
        let transport = Scripted::default();
        transport.logins.lock().unwrap().push_back(Err(HttpError::Status {
            status: 401,
            message: "AuthenticationRequired".into(),
        }));
        let (adapter, _) = adapter(transport, config());

        assert!(adapter.login().unwrap_err().is_configuration());
        assert!(adapter.fetch("a", 10).unwrap_err().is_configuration());
        assert_eq!(adapter.transport.login_calls.load(Ordering::Relaxed), 1);
        assert!(adapter.transport.searches().is_empty());
    }

    #[test]
    fn expired_token_logs_in_again() {
        let transport = Scripted::with_pages([status(400), page(0..1, None)]);
        let (adapter, _) = adapter(transport, config());

        assert_eq!(adapter.fetch("a", 10).unwrap().len(), 1);
        assert_eq!(adapter.transport.login_calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn sink_break_stops_paging() {
        let transport = Scripted::with_pages([page(0..2, Some("c1")), page(2..4, None)]);
        let (adapter, delay) = adapter(transport, config());

        let mut pages = 0;
        adapter
            .fetch_pages("a", 10, &mut |_| {
                pages += 1;
                ControlFlow::Break(())
            })
            .unwrap();

        assert_eq!(pages, 1);
        assert_eq!(adapter.transport.searches().len(), 1);
        assert!(delay.calls().is_empty());
    }

    #[test]
    fn missing_credentials_rejected_at_construction() {
        let err = BlueskyAdapter::with_transport(Config::default(), Scripted::default())
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn records_carry_keyword() {
        let transport = Scripted::with_pages([page(0..1, None)]);
        let (adapter, _) = adapter(transport, config());
        let set = adapter.fetch("terror financing", 10).unwrap();
        assert_eq!(
            set.records()[0].get("keyword").as_str(),
            Some("terror financing")
        );
    }
}
