//! Per-browser state keyed by the `kubinet_sid` cookie.
//!
//! Each browser owns an auth client, the authoring gate and an advisory busy
//! flag. The session provider following the client starts on first sign-in.
//! Nothing here is shared between browsers except the auth backend.
//!
//! The table is bounded. Anonymous browsers idle past [`BrowserLimits::idle`]
//! are dropped when a new browser arrives, and a full table evicts the least
//! recently seen anonymous browser first. An evicted browser is rebuilt from
//! its cookie id, reopening the same client storage.

use std::{
    num::NonZeroUsize,
    sync::{
        Arc, Mutex as StdMutex, OnceLock,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
    time::Duration,
};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{
    application::{
        gate::{AuthGate, LimiterError, LockoutPolicy},
        session::{AuthBackend, AuthClient, SessionProvider, SessionState},
    },
    cache::{BypassCache, lock::mutex_lock},
    infra::storage::StorageBackend,
    util::clock::Clock,
};

use super::flash;

const SOURCE: &str = "infra::http::sessions";

pub const SESSION_COOKIE: &str = "kubinet_sid";

/// How long a handler waits for the session provider to publish a sign-in or
/// sign-out it just caused.
const SETTLE_LIMIT: Duration = Duration::from_secs(2);

const DEFAULT_MAX_BROWSERS: usize = 1_024;
const DEFAULT_BROWSER_IDLE_SECS: i64 = 1_800;

#[derive(Debug, Clone, Copy)]
pub struct BrowserLimits {
    pub max_browsers: usize,
    /// Anonymous browsers unseen for this long are dropped.
    pub idle: time::Duration,
}

impl Default for BrowserLimits {
    fn default() -> Self {
        Self {
            max_browsers: DEFAULT_MAX_BROWSERS,
            idle: time::Duration::seconds(DEFAULT_BROWSER_IDLE_SECS),
        }
    }
}

pub struct Browser {
    pub id: Uuid,
    pub client: Arc<AuthClient>,
    pub gate: Mutex<AuthGate>,
    session: OnceLock<SessionProvider>,
    busy: AtomicBool,
    last_seen: AtomicI64,
}

impl Browser {
    pub fn viewer(&self) -> SessionState {
        match self.session.get() {
            Some(session) => session.current(),
            None => SessionState::resolved(self.client.current_session().as_ref()),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.client.current_session().is_some()
    }

    /// Claim the busy flag for a mutation. `None` while another one is running.
    pub fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { flag: &self.busy })
    }

    pub async fn settle_signed_in(&self) -> SessionState {
        self.provider()
            .settle(SETTLE_LIMIT, |state| state.is_authenticated)
            .await
    }

    pub async fn settle_signed_out(&self) -> SessionState {
        match self.session.get() {
            Some(session) => {
                session
                    .settle(SETTLE_LIMIT, |state| !state.loading && !state.is_authenticated)
                    .await
            }
            None => self.viewer(),
        }
    }

    fn provider(&self) -> &SessionProvider {
        self.session
            .get_or_init(|| SessionProvider::spawn(self.client.clone()))
    }

    fn touch(&self, now: i64) {
        self.last_seen.store(now, Ordering::Relaxed);
    }

    fn idle_since(&self, cutoff: i64) -> bool {
        self.last_seen.load(Ordering::Relaxed) <= cutoff
    }
}

pub struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct BrowserSessions {
    browsers: StdMutex<LruCache<Uuid, Arc<Browser>>>,
    idle: time::Duration,
    backend: Arc<dyn AuthBackend>,
    storage: StorageBackend,
    secret_key: String,
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
}

impl BrowserSessions {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        storage: StorageBackend,
        secret_key: impl Into<String>,
        policy: LockoutPolicy,
        limits: BrowserLimits,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let capacity = NonZeroUsize::new(limits.max_browsers).unwrap_or(NonZeroUsize::MIN);
        Self {
            browsers: StdMutex::new(LruCache::new(capacity)),
            idle: limits.idle,
            backend,
            storage,
            secret_key: secret_key.into(),
            policy,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.browsers, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The browser named by the cookie, if this process holds it.
    pub fn find(&self, jar: &CookieJar) -> Option<Arc<Browser>> {
        let id = browser_id(jar)?;
        let browser = mutex_lock(&self.browsers, SOURCE, "find").get(&id).cloned()?;
        browser.touch(self.now());
        Some(browser)
    }

    /// The browser named by the cookie, creating it (and the cookie) if needed.
    /// A known cookie id without live state reopens the same client storage,
    /// so lockouts survive a restart or an eviction.
    pub async fn find_or_create(
        &self,
        jar: CookieJar,
    ) -> Result<(CookieJar, Arc<Browser>), LimiterError> {
        if let Some(browser) = self.find(&jar) {
            return Ok((jar, browser));
        }

        let id = browser_id(&jar).unwrap_or_else(Uuid::new_v4);
        let client = Arc::new(AuthClient::new(self.backend.clone()));
        let gate = AuthGate::load(
            &self.secret_key,
            self.policy,
            self.storage.open(id),
            self.clock.clone(),
            client.clone(),
        )
        .await?;

        let now = self.now();
        let created = Arc::new(Browser {
            id,
            client,
            gate: Mutex::new(gate),
            session: OnceLock::new(),
            busy: AtomicBool::new(false),
            last_seen: AtomicI64::new(now),
        });

        let browser = {
            let mut browsers = mutex_lock(&self.browsers, SOURCE, "find_or_create");
            let existing = browsers.get(&id).cloned();
            match existing {
                Some(existing) => existing,
                None => {
                    self.prune(&mut browsers, now);
                    browsers.put(id, created.clone());
                    created
                }
            }
        };
        debug!(target = SOURCE, browser = %id, "browser session opened");

        Ok((jar.add(session_cookie(id)), browser))
    }

    /// Drop idle anonymous browsers, then make room for one more, preferring
    /// the least recently seen anonymous browser over a signed-in one.
    fn prune(&self, browsers: &mut LruCache<Uuid, Arc<Browser>>, now: i64) {
        let cutoff = now - self.idle.whole_seconds();
        let idle: Vec<Uuid> = browsers
            .iter()
            .filter(|(_, browser)| browser.idle_since(cutoff) && !browser.is_signed_in())
            .map(|(id, _)| *id)
            .collect();
        for id in &idle {
            browsers.pop(id);
        }

        let mut evicted = idle.len();
        if browsers.len() >= browsers.cap().get() {
            let anonymous = browsers
                .iter()
                .rev()
                .find(|(_, browser)| !browser.is_signed_in())
                .map(|(id, _)| *id);
            let dropped = match anonymous {
                Some(id) => browsers.pop(&id).is_some(),
                None => browsers.pop_lru().is_some(),
            };
            evicted += usize::from(dropped);
        }

        if evicted > 0 {
            debug!(
                target = SOURCE,
                evicted,
                remaining = browsers.len(),
                "browser sessions evicted"
            );
        }
    }

    fn now(&self) -> i64 {
        self.clock.now().unix_timestamp()
    }
}

fn browser_id(jar: &CookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

fn session_cookie(id: Uuid) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Who is looking at the page. Anonymous unless the cookie names a signed-in
/// browser.
#[derive(Clone)]
pub struct Viewer {
    pub browser: Option<Arc<Browser>>,
    pub state: SessionState,
}

impl Default for Viewer {
    fn default() -> Self {
        Self {
            browser: None,
            state: SessionState::resolved(None),
        }
    }
}

impl Viewer {
    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated
    }

    pub fn user_id(&self) -> Option<&str> {
        self.state.user_id.as_deref()
    }
}

/// Attach the [`Viewer`]. Pages for signed-in viewers, and pages carrying a
/// flash toast, stay out of the response cache.
pub async fn attach_viewer(
    State(sessions): State<Arc<BrowserSessions>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let viewer = match sessions.find(&jar) {
        Some(browser) => Viewer {
            state: browser.viewer(),
            browser: Some(browser),
        },
        None => Viewer::default(),
    };

    if viewer.is_authenticated() || flash::is_pending(&jar) {
        request.extensions_mut().insert(BypassCache);
    }
    request.extensions_mut().insert(viewer);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::auth::LocalAuthBackend;
    use crate::util::clock::{ManualClock, SystemClock};

    fn sessions_with(limits: BrowserLimits, clock: Arc<dyn Clock>) -> BrowserSessions {
        let backend = LocalAuthBackend::new("a@b.c", &LocalAuthBackend::digest("pw"));
        BrowserSessions::new(
            Arc::new(backend),
            StorageBackend::Memory,
            "kubi",
            LockoutPolicy::default(),
            limits,
            clock,
        )
    }

    fn sessions() -> BrowserSessions {
        sessions_with(BrowserLimits::default(), Arc::new(SystemClock))
    }

    fn capped(max_browsers: usize) -> BrowserSessions {
        let limits = BrowserLimits {
            max_browsers,
            ..BrowserLimits::default()
        };
        sessions_with(limits, Arc::new(SystemClock))
    }

    async fn open(sessions: &BrowserSessions) -> (CookieJar, Arc<Browser>) {
        sessions
            .find_or_create(CookieJar::new())
            .await
            .expect("create")
    }

    #[tokio::test]
    async fn cookie_identifies_the_same_browser() {
        let sessions = sessions();
        let (jar, first) = open(&sessions).await;
        let cookie = jar.get(SESSION_COOKIE).expect("cookie set");
        assert_eq!(cookie.value(), first.id.to_string());

        let (_, second) = sessions.find_or_create(jar).await.expect("find");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn unknown_cookie_keeps_its_id() {
        let sessions = sessions();
        let id = Uuid::new_v4();
        let jar = CookieJar::new().add(session_cookie(id));

        assert!(sessions.find(&jar).is_none());
        let (_, browser) = sessions.find_or_create(jar).await.expect("create");
        assert_eq!(browser.id, id);
    }

    #[tokio::test]
    async fn busy_flag_rejects_a_second_claim() {
        let sessions = sessions();
        let (_, browser) = open(&sessions).await;

        let guard = browser.try_begin().expect("first claim");
        assert!(browser.try_begin().is_none());
        drop(guard);
        assert!(browser.try_begin().is_some());
    }

    #[tokio::test]
    async fn cookieless_visits_never_outgrow_the_table() {
        let sessions = capped(8);
        let mut jars = Vec::new();
        for _ in 0..200 {
            let (jar, _) = open(&sessions).await;
            jars.push(jar);
        }

        assert_eq!(sessions.len(), 8);
        assert!(sessions.find(&jars[0]).is_none());
        assert!(sessions.find(&jars[199]).is_some());
    }

    #[tokio::test]
    async fn full_table_evicts_anonymous_before_signed_in() {
        let sessions = capped(2);
        let (admin_jar, admin) = open(&sessions).await;
        admin
            .client
            .sign_in_with_password("a@b.c", "pw")
            .await
            .expect("sign in");

        for _ in 0..5 {
            open(&sessions).await;
        }

        assert_eq!(sessions.len(), 2);
        let found = sessions.find(&admin_jar).expect("signed-in browser kept");
        assert!(Arc::ptr_eq(&found, &admin));
    }

    #[tokio::test]
    async fn idle_anonymous_browsers_are_dropped_when_another_arrives() {
        let clock = Arc::new(ManualClock::default());
        let limits = BrowserLimits {
            max_browsers: 16,
            idle: time::Duration::seconds(60),
        };
        let sessions = sessions_with(limits, clock.clone());

        let (idle_jar, _) = open(&sessions).await;
        let (active_jar, _) = open(&sessions).await;
        clock.advance(time::Duration::seconds(45));
        assert!(sessions.find(&active_jar).is_some());
        clock.advance(time::Duration::seconds(30));

        open(&sessions).await;

        assert_eq!(sessions.len(), 2);
        assert!(sessions.find(&idle_jar).is_none());
        assert!(sessions.find(&active_jar).is_some());
    }

    #[tokio::test]
    async fn evicted_browser_is_rebuilt_from_its_cookie() {
        let sessions = capped(1);
        let (jar, first) = open(&sessions).await;
        open(&sessions).await;
        assert!(sessions.find(&jar).is_none());

        let (_, rebuilt) = sessions.find_or_create(jar).await.expect("rebuild");
        assert_eq!(rebuilt.id, first.id);
        assert!(!Arc::ptr_eq(&rebuilt, &first));
    }

    #[tokio::test]
    async fn session_provider_starts_on_first_sign_in() {
        let sessions = sessions();
        let (_, browser) = open(&sessions).await;

        assert!(browser.session.get().is_none());
        assert_eq!(browser.viewer(), SessionState::resolved(None));
        assert_eq!(browser.settle_signed_out().await, SessionState::resolved(None));
        assert!(browser.session.get().is_none());

        browser
            .client
            .sign_in_with_password("a@b.c", "pw")
            .await
            .expect("sign in");
        let state = browser.settle_signed_in().await;

        assert!(state.is_authenticated);
        assert!(browser.session.get().is_some());
        assert!(browser.viewer().is_authenticated);
    }
}
