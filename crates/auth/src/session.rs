//! Server-side session state.
//!
//! `SessionStore` is the single source of truth for "who is this visitor, and
//! are they logged in". Sessions are keyed by an opaque, unguessable
//! [`SessionId`] carried in the session cookie.
//!
//! ## Locking
//!
//! The id → session map sits behind an `RwLock`; each session has its own
//! `Mutex`. Every mutation (extend, flash read-and-clear, value writes) runs
//! under the session's lock, so concurrent requests from one client cannot
//! interleave a read-modify-write. Rotation and destroy take the map write
//! lock because they change which id points at the session.
//!
//! ## Rotation
//!
//! A rotated-away id stays valid as an alias of the new id for a short grace
//! window ([`DEFAULT_ROTATION_GRACE_SECS`]). Requests that were already in
//! flight with the old cookie resolve to the same session instead of landing
//! on a fresh anonymous one. Aliases never rotate and never chain.
//!
//! ## Expiry
//!
//! Expiry is evaluated lazily by comparing timestamps at access time. Nothing
//! sweeps in the background; [`SessionStore::purge_expired`] exists for
//! operators who want to reclaim memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use cmsgate_core::UserId;

use crate::clock::Clock;
use crate::token::{self, TokenSource};
use crate::{Role, SessionUser};

/// How long a rotated-away id keeps resolving to its successor.
pub const DEFAULT_ROTATION_GRACE_SECS: i64 = 10;

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Accept a client-supplied id only if it has the shape of one we issue.
    pub fn parse(raw: &str) -> Option<Self> {
        token::is_well_formed(raw).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown or destroyed session")]
    UnknownSession,

    #[error("session store unavailable (lock poisoned)")]
    Unavailable,
}

/// Per-visitor state.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub(crate) user: Option<SessionUser>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) login_at: Option<DateTime<Utc>>,
    pub(crate) last_extended_at: Option<DateTime<Utc>>,
    pub(crate) last_rotated_at: DateTime<Utc>,
    pub(crate) csrf_token: Option<String>,
    values: HashMap<String, Value>,
    flash: HashMap<String, String>,
    destroyed: bool,
}

impl Session {
    fn new(now: DateTime<Utc>, user: Option<SessionUser>, csrf_token: String) -> Self {
        let login_at = user.as_ref().map(|_| now);
        Self {
            user,
            created_at: now,
            login_at,
            last_extended_at: login_at,
            last_rotated_at: now,
            csrf_token: Some(csrf_token),
            values: HashMap::new(),
            flash: HashMap::new(),
            destroyed: false,
        }
    }

    pub(crate) fn is_expired(&self, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
        match (self.login_at, self.last_extended_at) {
            (Some(_), Some(last)) => now - last > timeout,
            _ => true,
        }
    }

    fn last_activity(&self) -> DateTime<Utc> {
        self.last_extended_at.unwrap_or(self.created_at)
    }

    fn clear(&mut self) {
        self.user = None;
        self.login_at = None;
        self.last_extended_at = None;
        self.csrf_token = None;
        self.values.clear();
        self.flash.clear();
        self.destroyed = true;
    }
}

/// A retired id pointing at the id that replaced it.
#[derive(Debug, Clone)]
struct Alias {
    current: SessionId,
    until: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionMap {
    live: HashMap<SessionId, Arc<Mutex<Session>>>,
    aliases: HashMap<SessionId, Alias>,
}

/// In-process session store.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<SessionMap>,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenSource>,
    rotation_grace: TimeDelta,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            sessions: RwLock::new(SessionMap::default()),
            clock,
            tokens,
            rotation_grace: TimeDelta::seconds(DEFAULT_ROTATION_GRACE_SECS),
        }
    }

    /// Override how long a rotated-away id keeps resolving.
    pub fn with_rotation_grace(mut self, grace: TimeDelta) -> Self {
        self.rotation_grace = grace;
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn tokens(&self) -> &dyn TokenSource {
        self.tokens.as_ref()
    }

    fn read_map(&self) -> Result<RwLockReadGuard<'_, SessionMap>, SessionError> {
        self.sessions.read().map_err(|_| SessionError::Unavailable)
    }

    fn write_map(&self) -> Result<RwLockWriteGuard<'_, SessionMap>, SessionError> {
        self.sessions.write().map_err(|_| SessionError::Unavailable)
    }

    /// Mint an id that is not currently in use.
    fn fresh_id(&self, map: &SessionMap) -> SessionId {
        loop {
            let id = SessionId(self.tokens.token());
            if !map.live.contains_key(&id) && !map.aliases.contains_key(&id) {
                return id;
            }
        }
    }

    fn insert(&self, user: Option<SessionUser>) -> Result<SessionId, SessionError> {
        let now = self.clock.now();
        let csrf = self.tokens.token();
        let mut map = self.write_map()?;
        let id = self.fresh_id(&map);
        map.live
            .insert(id.clone(), Arc::new(Mutex::new(Session::new(now, user, csrf))));
        Ok(id)
    }

    /// Run `f` against a live session under its lock.
    pub(crate) fn with_session<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, SessionError> {
        let entry = {
            let map = self.read_map()?;
            map.live.get(id).cloned().ok_or(SessionError::UnknownSession)?
        };
        let mut session = entry.lock().map_err(|_| SessionError::Unavailable)?;
        if session.destroyed {
            return Err(SessionError::UnknownSession);
        }
        Ok(f(&mut session))
    }

    /// New session bound to `user`. Always a fresh identifier.
    pub fn create(&self, user: SessionUser) -> Result<SessionId, SessionError> {
        let user_id = user.id;
        let id = self.insert(Some(user))?;
        tracing::debug!(user_id = %user_id, "session created");
        Ok(id)
    }

    /// New session with no identity (pre-login visitor).
    pub fn create_anonymous(&self) -> Result<SessionId, SessionError> {
        self.insert(None)
    }

    /// Live under exactly this id. Aliases do not count.
    pub fn exists(&self, id: &SessionId) -> bool {
        self.with_session(id, |_| ()).is_ok()
    }

    /// Canonical id for a client-presented one.
    ///
    /// A live id resolves to itself; a rotated-away id resolves to its
    /// successor until the grace window closes. Anything else is `None`.
    pub fn resolve(&self, id: &SessionId) -> Option<SessionId> {
        if self.exists(id) {
            return Some(id.clone());
        }
        let now = self.clock.now();
        let current = {
            let map = self.read_map().ok()?;
            let alias = map.aliases.get(id)?;
            (now <= alias.until).then(|| alias.current.clone())?
        };
        self.exists(&current).then_some(current)
    }

    pub fn get(&self, id: &SessionId, key: &str) -> Option<Value> {
        self.with_session(id, |s| s.values.get(key).cloned()).ok().flatten()
    }

    pub fn get_or(&self, id: &SessionId, key: &str, default: Value) -> Value {
        self.get(id, key).unwrap_or(default)
    }

    pub fn set(&self, id: &SessionId, key: impl Into<String>, value: impl Into<Value>) -> Result<(), SessionError> {
        let (key, value) = (key.into(), value.into());
        self.with_session(id, move |s| {
            s.values.insert(key, value);
        })
    }

    pub fn has(&self, id: &SessionId, key: &str) -> bool {
        self.with_session(id, |s| s.values.contains_key(key)).unwrap_or(false)
    }

    pub fn remove(&self, id: &SessionId, key: &str) -> Result<Option<Value>, SessionError> {
        self.with_session(id, |s| s.values.remove(key))
    }

    pub fn user(&self, id: &SessionId) -> Option<SessionUser> {
        self.with_session(id, |s| s.user.clone()).ok().flatten()
    }

    pub fn user_id(&self, id: &SessionId) -> Option<UserId> {
        self.user(id).map(|u| u.id)
    }

    pub fn role(&self, id: &SessionId) -> Option<Role> {
        self.user(id).map(|u| u.role)
    }

    /// Live session with a bound user. Expiry is checked separately.
    pub fn is_authenticated(&self, id: &SessionId) -> bool {
        self.with_session(id, |s| s.user.is_some()).unwrap_or(false)
    }

    /// True when no login is recorded or the last extension is older than `timeout`.
    pub fn is_expired(&self, id: &SessionId, timeout: TimeDelta) -> bool {
        let now = self.clock.now();
        self.with_session(id, |s| s.is_expired(now, timeout)).unwrap_or(true)
    }

    /// Sliding expiration: restart the timeout window.
    pub fn extend(&self, id: &SessionId) -> Result<(), SessionError> {
        let now = self.clock.now();
        self.with_session(id, |s| {
            if s.login_at.is_some() {
                s.last_extended_at = Some(now);
            }
        })
    }

    /// Invalidate the id and wipe its state. Returns whether it existed.
    pub fn destroy(&self, id: &SessionId) -> Result<bool, SessionError> {
        let entry = {
            let mut map = self.write_map()?;
            map.aliases.retain(|old, alias| old != id && alias.current != *id);
            map.live.remove(id)
        };
        let Some(entry) = entry else {
            return Ok(false);
        };
        entry.lock().map_err(|_| SessionError::Unavailable)?.clear();
        tracing::debug!("session destroyed");
        Ok(true)
    }

    /// Move the session to a new id if the current one is older than `interval`.
    ///
    /// Contents are preserved. The old id stops being live but resolves to the
    /// new one for the grace window. Returns the new id when a rotation happened.
    pub fn rotate_if_stale(
        &self,
        id: &SessionId,
        interval: TimeDelta,
    ) -> Result<Option<SessionId>, SessionError> {
        let now = self.clock.now();
        let mut map = self.write_map()?;
        let entry = map.live.get(id).cloned().ok_or(SessionError::UnknownSession)?;

        {
            let mut session = entry.lock().map_err(|_| SessionError::Unavailable)?;
            if session.destroyed {
                return Err(SessionError::UnknownSession);
            }
            if now - session.last_rotated_at <= interval {
                return Ok(None);
            }
            session.last_rotated_at = now;
        }

        let new_id = self.fresh_id(&map);
        let until = now + self.rotation_grace;
        map.live.remove(id);
        map.live.insert(new_id.clone(), entry);
        for alias in map.aliases.values_mut().filter(|a| a.current == *id) {
            alias.current = new_id.clone();
        }
        map.aliases.insert(
            id.clone(),
            Alias {
                current: new_id.clone(),
                until,
            },
        );
        tracing::debug!("session id rotated");
        Ok(Some(new_id))
    }

    /// Store a one-shot message.
    pub fn flash_set(
        &self,
        id: &SessionId,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), SessionError> {
        let (key, message) = (key.into(), message.into());
        self.with_session(id, move |s| {
            s.flash.insert(key, message);
        })
    }

    /// Read and clear a one-shot message. Delivered at most once.
    pub fn flash_take(&self, id: &SessionId, key: &str) -> Option<String> {
        self.with_session(id, |s| s.flash.remove(key)).ok().flatten()
    }

    /// Drop sessions idle for longer than `timeout`, and lapsed aliases.
    /// Returns how many sessions went.
    pub fn purge_expired(&self, timeout: TimeDelta) -> Result<usize, SessionError> {
        let now = self.clock.now();
        let mut map = self.write_map()?;
        let before = map.live.len();
        map.live.retain(|_, entry| match entry.lock() {
            Ok(session) => now - session.last_activity() <= timeout,
            Err(_) => false,
        });
        let SessionMap { live, aliases } = &mut *map;
        aliases.retain(|_, alias| now <= alias.until && live.contains_key(&alias.current));
        Ok(before - live.len())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.read_map().map(|m| m.live.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
