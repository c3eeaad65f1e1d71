//! The session store: single source of truth for "am I signed in, and as whom".
//!
//! A store models one browser tab. Stores of one origin share a [`Storage`]
//! and a [`SessionBus`]; every mutation is written through to storage before
//! memory is updated, then announced on the bus so sibling stores can re-read
//! storage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::errors::{AuthError, RequestError, StorageError};
use crate::gateway::{Gateway, RequestOptions};
use crate::lock;
use crate::logger;
use crate::storage::{Storage, TOKEN_KEY, USER_KEY};
use crate::structs::user::LoginResponse;
use crate::structs::{Credentials, UserProfile};

const BUS_CAPACITY: usize = 32;

static NEXT_TAB: AtomicU64 = AtomicU64::new(1);

/// Identifies the store that published a [`SessionChanged`].
pub type TabId = u64;

/// Current login state. `is_authenticated()` is derived from the token alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    token: Option<String>,
    user: Option<UserProfile>,
}

impl Session {
    /// A blank token counts as no token, and a user is never kept without a token.
    pub fn new(token: Option<String>, user: Option<UserProfile>) -> Self {
        let token = token.filter(|t| !t.trim().is_empty());
        let user = if token.is_some() { user } else { None };

        Self { token, user }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    Login,
    Logout,
    /// The gateway saw a 401 for the current token.
    Expired,
    /// Another store sharing this storage changed the session.
    External,
}

/// Published on the [`SessionBus`] after each mutation, and passed to local
/// listeners.
#[derive(Debug, Clone)]
pub struct SessionChanged {
    pub origin: TabId,
    pub cause: ChangeCause,
    pub session: Session,
}

/// Cross-tab broadcast. Clone it into every store of one origin.
#[derive(Debug, Clone)]
pub struct SessionBus {
    sender: broadcast::Sender<SessionChanged>,
}

impl SessionBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionChanged> {
        self.sender.subscribe()
    }

    fn publish(&self, change: SessionChanged) {
        // No receivers is fine: nobody else is listening.
        let _ = self.sender.send(change);
    }
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SessionChanged) + Send + Sync>;

pub struct SessionStore {
    tab: TabId,
    storage: Arc<dyn Storage>,
    state: Mutex<Session>,
    // Held across check-then-write sequences so two mutations never interleave.
    mutation: Mutex<()>,
    bus: SessionBus,
    inbox: Mutex<broadcast::Receiver<SessionChanged>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    debug: bool,
}

impl SessionStore {
    /// Creates a store seeded from `storage`.
    pub fn new(storage: Arc<dyn Storage>, bus: SessionBus) -> Self {
        let session = read_session(storage.as_ref());
        let tab = NEXT_TAB.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Session store {tab} starts {}",
            if session.is_authenticated() { "authenticated" } else { "anonymous" }
        );

        Self {
            tab,
            inbox: Mutex::new(bus.subscribe()),
            storage,
            state: Mutex::new(session),
            mutation: Mutex::new(()),
            bus,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            debug: false,
        }
    }

    /// Echo session transitions to the terminal.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn current_session(&self) -> Session {
        lock(&self.state).clone()
    }

    /// Signs in against `POST /auth/login/`.
    ///
    /// `gateway` must be the gateway wrapping this store: the profile read that
    /// follows a login without a `user` goes through it and has to see the
    /// token written here.
    pub async fn login(
        &self,
        gateway: &Gateway,
        credentials: &Credentials,
    ) -> Result<Session, AuthError> {
        logger::status(self.debug, "[AUTH] Signing in...");

        let response = gateway
            .post_json::<_, LoginResponse>("/auth/login/", credentials, RequestOptions::anonymous())
            .await
            .map_err(|err| {
                logger::failure(self.debug, &format!("[AUTH] Failed to sign in: {err}"));
                match err {
                    RequestError::FailedToDecode(_) => AuthError::MalformedResponse,
                    _ => AuthError::InvalidCredentials,
                }
            })?;

        let token = response
            .access
            .filter(|t| !t.trim().is_empty())
            .ok_or(AuthError::MalformedResponse)?;

        self.write_token(&token, response.user.as_ref())?;

        if response.user.is_none() {
            match self.fetch_profile(gateway).await {
                Ok(user) => self.write_user(&token, user),
                Err(err) => warn!("Signed in, but the profile could not be loaded: {err}"),
            }
        }

        let session = self.current_session();
        if session.token() != Some(token.as_str()) {
            // The profile read came back 401 and the gateway already cleared us.
            return Err(AuthError::InvalidCredentials);
        }

        info!("Session {} signed in", self.tab);
        self.announce(ChangeCause::Login, session.clone());

        let name = session
            .user()
            .map(UserProfile::display_name)
            .unwrap_or_else(|| "there".to_string());
        logger::status(self.debug, &format!("[AUTH] Welcome, {name}."));

        Ok(session)
    }

    /// Clears token and cached user everywhere. Never fails; calling it twice
    /// leaves the same state as calling it once.
    pub fn logout(&self) {
        {
            let _guard = lock(&self.mutation);
            self.clear();
        }

        info!("Session {} signed out", self.tab);
        logger::status(self.debug, "[AUTH] Signed out.");
        self.announce(ChangeCause::Logout, Session::anonymous());
    }

    /// Logs out if the session still holds `sent_token`. Returns whether it did.
    ///
    /// Several requests carrying the same token can all come back 401; only
    /// the first one to get here clears the session.
    pub fn expire(&self, sent_token: &str) -> bool {
        {
            let _guard = lock(&self.mutation);
            if lock(&self.state).token() != Some(sent_token) {
                debug!("Ignoring 401 for a token that is no longer current");
                return false;
            }
            self.clear();
        }

        warn!("Session {} expired", self.tab);
        logger::failure(self.debug, "[AUTH] Session expired. Please sign in again.");
        self.announce(ChangeCause::Expired, Session::anonymous());
        true
    }

    /// Registers `handler` for every local mutation and every applied
    /// cross-tab signal.
    pub fn on_session_change<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&SessionChanged) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, Arc::new(handler)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Applies signals other stores published since the last call, without
    /// blocking. Returns how many foreign signals were seen.
    pub fn process_signals(&self) -> usize {
        let mut foreign = 0;
        {
            let mut inbox = lock(&self.inbox);
            loop {
                match inbox.try_recv() {
                    Ok(change) if change.origin == self.tab => {}
                    Ok(_) => foreign += 1,
                    Err(TryRecvError::Lagged(skipped)) => {
                        debug!("Session store {} skipped {skipped} signals", self.tab);
                        foreign += 1;
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }

        if foreign > 0 {
            self.apply_external();
        }
        foreign
    }

    /// Follows the bus until the task running it is dropped, applying each
    /// foreign signal as it arrives.
    pub async fn watch(self: Arc<Self>) {
        let mut signals = self.bus.subscribe();
        loop {
            match signals.recv().await {
                Ok(change) if change.origin == self.tab => {}
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    self.apply_external();
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Re-reads storage, for stores whose siblings live in another process
    /// and cannot reach this bus. Listeners fire only if the session changed.
    pub fn reload(&self) -> Session {
        let (stored, changed) = self.refresh();

        if changed {
            self.notify(&SessionChanged {
                origin: self.tab,
                cause: ChangeCause::External,
                session: stored.clone(),
            });
        }
        stored
    }

    fn apply_external(&self) {
        let (stored, _) = self.refresh();
        debug!(
            "Session store {} picked up an external change (authenticated: {})",
            self.tab,
            stored.is_authenticated()
        );

        self.notify(&SessionChanged {
            origin: self.tab,
            cause: ChangeCause::External,
            session: stored,
        });
    }

    /// Replaces memory with what storage holds. Returns the stored session and
    /// whether it differed from memory.
    fn refresh(&self) -> (Session, bool) {
        let _guard = lock(&self.mutation);
        let stored = read_session(self.storage.as_ref());

        let mut state = lock(&self.state);
        let changed = *state != stored;
        *state = stored.clone();
        (stored, changed)
    }

    async fn fetch_profile(&self, gateway: &Gateway) -> Result<UserProfile, RequestError> {
        let body = gateway
            .get_json::<Value>("/auth/profile/", RequestOptions::default())
            .await?;
        Ok(UserProfile::from_profile_body(body)?)
    }

    fn write_token(&self, token: &str, user: Option<&UserProfile>) -> Result<(), StorageError> {
        let _guard = lock(&self.mutation);

        self.storage.set(TOKEN_KEY, token)?;
        match user {
            Some(user) => self.storage.set(USER_KEY, &serde_json::to_string(user)?)?,
            None => self.storage.remove(USER_KEY)?,
        }

        *lock(&self.state) = Session::new(Some(token.to_string()), user.cloned());
        Ok(())
    }

    /// Caches `user` next to `token`, unless the token was replaced meanwhile.
    fn write_user(&self, token: &str, user: UserProfile) {
        let _guard = lock(&self.mutation);
        if lock(&self.state).token() != Some(token) {
            return;
        }

        let stored = serde_json::to_string(&user)
            .map_err(StorageError::from)
            .and_then(|raw| self.storage.set(USER_KEY, &raw));
        if let Err(err) = stored {
            warn!("Failed to cache the user profile: {err}");
        }

        *lock(&self.state) = Session::new(Some(token.to_string()), Some(user));
    }

    // Caller holds `mutation`.
    fn clear(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(err) = self.storage.remove(key) {
                warn!("Failed to remove \"{key}\" from storage: {err}");
            }
        }
        *lock(&self.state) = Session::anonymous();
    }

    fn announce(&self, cause: ChangeCause, session: Session) {
        let change = SessionChanged {
            origin: self.tab,
            cause,
            session,
        };
        self.bus.publish(change.clone());
        self.notify(&change);
    }

    fn notify(&self, change: &SessionChanged) {
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(change);
        }
    }
}

fn read_session(storage: &dyn Storage) -> Session {
    let token = storage.get(TOKEN_KEY).unwrap_or_else(|err| {
        warn!("Failed to read the stored token: {err}");
        None
    });

    let user = match storage.get(USER_KEY) {
        Ok(Some(raw)) => serde_json::from_str(&raw)
            .map_err(|err| warn!("Dropping unreadable cached user: {err}"))
            .ok(),
        Ok(None) => None,
        Err(err) => {
            warn!("Failed to read the cached user: {err}");
            None
        }
    };

    Session::new(token, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::structs::Id;
    use std::sync::atomic::AtomicUsize;

    fn store_on(storage: &MemoryStorage, bus: &SessionBus) -> SessionStore {
        SessionStore::new(Arc::new(storage.clone()), bus.clone())
    }

    fn ada() -> UserProfile {
        UserProfile {
            id: Some(Id::from(1_u64)),
            first_name: Some("Ada".into()),
            ..Default::default()
        }
    }

    #[test]
    fn session_invariants() {
        assert!(!Session::new(Some("   ".into()), Some(ada())).is_authenticated());
        assert_eq!(Session::new(None, Some(ada())).user(), None);

        let session = Session::new(Some("tok".into()), Some(ada()));
        assert!(session.is_authenticated());
        assert_eq!(session.user(), Some(&ada()));
    }

    #[test]
    fn seeds_from_storage() {
        let storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "tok123").unwrap();
        storage.set(USER_KEY, &serde_json::to_string(&ada()).unwrap()).unwrap();

        let store = store_on(&storage, &SessionBus::new());
        let session = store.current_session();
        assert_eq!(session.token(), Some("tok123"));
        assert_eq!(session.user(), Some(&ada()));
    }

    #[test]
    fn unreadable_user_is_dropped_and_orphan_user_ignored() {
        let storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "tok123").unwrap();
        storage.set(USER_KEY, "{not json").unwrap();
        assert_eq!(store_on(&storage, &SessionBus::new()).current_session().user(), None);

        let orphan = MemoryStorage::new();
        orphan.set(USER_KEY, &serde_json::to_string(&ada()).unwrap()).unwrap();
        let session = store_on(&orphan, &SessionBus::new()).current_session();
        assert!(!session.is_authenticated());
        assert_eq!(session.user(), None);
    }

    #[test]
    fn logout_clears_both_keys_and_is_idempotent() {
        let storage = MemoryStorage::new();
        let store = store_on(&storage, &SessionBus::new());
        store.write_token("tok123", Some(&ada())).unwrap();

        store.logout();
        let after_once = store.current_session();
        store.logout();

        assert_eq!(store.current_session(), after_once);
        assert!(!after_once.is_authenticated());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(USER_KEY).unwrap(), None);
    }

    #[test]
    fn expire_only_clears_the_token_that_was_sent() {
        let store = store_on(&MemoryStorage::new(), &SessionBus::new());
        let expirations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&expirations);
        store.on_session_change(move |change| {
            if change.cause == ChangeCause::Expired {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        store.write_token("new", None).unwrap();
        assert!(!store.expire("old"));
        assert!(store.current_session().is_authenticated());

        assert!(store.expire("new"));
        assert!(!store.expire("new"));
        assert_eq!(expirations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signals_reach_sibling_tabs() {
        let storage = MemoryStorage::new();
        let bus = SessionBus::new();
        let tab_a = store_on(&storage, &bus);
        let tab_b = store_on(&storage, &bus);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        tab_b.on_session_change(move |change| {
            lock(&sink).push((change.cause, change.session.token().map(str::to_string)));
        });

        tab_a.write_token("tok123", None).unwrap();
        tab_a.announce(ChangeCause::Login, tab_a.current_session());

        assert!(!tab_b.current_session().is_authenticated());
        assert_eq!(tab_b.process_signals(), 1);
        assert_eq!(tab_b.current_session().token(), Some("tok123"));
        assert_eq!(
            *lock(&seen),
            vec![(ChangeCause::External, Some("tok123".to_string()))]
        );

        // A's own signals are not replayed to A.
        assert_eq!(tab_a.process_signals(), 0);

        tab_a.logout();
        tab_b.process_signals();
        assert!(!tab_b.current_session().is_authenticated());
    }

    #[test]
    fn later_writer_wins_across_tabs() {
        let storage = MemoryStorage::new();
        let bus = SessionBus::new();
        let tab_a = store_on(&storage, &bus);
        let tab_b = store_on(&storage, &bus);
        let tab_c = store_on(&storage, &bus);

        tab_a.write_token("from-a", None).unwrap();
        tab_a.announce(ChangeCause::Login, tab_a.current_session());
        tab_b.write_token("from-b", None).unwrap();
        tab_b.announce(ChangeCause::Login, tab_b.current_session());

        tab_c.process_signals();
        tab_a.process_signals();
        assert_eq!(tab_c.current_session().token(), Some("from-b"));
        assert_eq!(tab_a.current_session().token(), Some("from-b"));
    }

    #[test]
    fn reload_notifies_only_on_change() {
        let storage = MemoryStorage::new();
        let store = store_on(&storage, &SessionBus::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = store.on_session_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.reload();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        storage.set(TOKEN_KEY, "elsewhere").unwrap();
        assert_eq!(store.reload().token(), Some("elsewhere"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(store.remove_listener(id));
        assert!(!store.remove_listener(id));
        store.logout();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Shared storage that lets a sibling thread log `victim` out while the
    /// first token read of an armed refresh is still in progress.
    struct InterleavingStorage {
        inner: MemoryStorage,
        armed: std::sync::atomic::AtomicBool,
        victim: std::sync::OnceLock<Arc<SessionStore>>,
        racer: Mutex<Option<std::thread::JoinHandle<()>>>,
    }

    impl Storage for InterleavingStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            let value = self.inner.get(key)?;
            if key == TOKEN_KEY && self.armed.swap(false, Ordering::SeqCst) {
                if let Some(store) = self.victim.get() {
                    let store = Arc::clone(store);
                    *lock(&self.racer) = Some(std::thread::spawn(move || store.logout()));
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
            }
            Ok(value)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn local_logout_during_external_refresh_keeps_memory_in_sync() {
        let shared = MemoryStorage::new();
        let bus = SessionBus::new();
        let tab_a = store_on(&shared, &bus);
        let storage = Arc::new(InterleavingStorage {
            inner: shared.clone(),
            armed: std::sync::atomic::AtomicBool::new(false),
            victim: std::sync::OnceLock::new(),
            racer: Mutex::new(None),
        });
        let tab_b = Arc::new(SessionStore::new(storage.clone(), bus.clone()));
        let _ = storage.victim.set(Arc::clone(&tab_b));

        tab_a.write_token("t", None).unwrap();
        tab_a.announce(ChangeCause::Login, tab_a.current_session());

        storage.armed.store(true, Ordering::SeqCst);
        assert_eq!(tab_b.process_signals(), 1);
        let racer = lock(&storage.racer).take().unwrap();
        racer.join().unwrap();

        assert_eq!(shared.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(tab_b.current_session().token(), None);
    }

    #[tokio::test]
    async fn watch_applies_signals_as_they_arrive() {
        let storage = MemoryStorage::new();
        let bus = SessionBus::new();
        let tab_a = store_on(&storage, &bus);
        let tab_b = Arc::new(store_on(&storage, &bus));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tab_b.on_session_change(move |change| {
            let _ = tx.send(change.session.token().map(str::to_string));
        });
        let watcher = tokio::spawn(Arc::clone(&tab_b).watch());
        tokio::task::yield_now().await;

        tab_a.write_token("tok123", None).unwrap();
        tab_a.announce(ChangeCause::Login, tab_a.current_session());

        assert_eq!(rx.recv().await, Some(Some("tok123".to_string())));
        assert_eq!(tab_b.current_session().token(), Some("tok123"));
        watcher.abort();
    }
}
