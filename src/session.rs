/*!
Server-side session state.

Each browser gets a random session key, handed out in a cookie whose value
is `key.signature`, where the signature is a hex HMAC-SHA256 of the key
under the configured secret. The session itself (logged-in user, pending
flash messages) never leaves the server.
*/
use std::collections::HashMap;
use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use sha2::Sha256;
use tokio::sync::RwLock;

use crate::user::Role;

type HmacSha256 = Hmac<Sha256>;

pub const COOKIE_NAME: &str = "aula_session";

const KEY_LENGTH: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Success,
    Info,
    Warning,
    Danger,
}

/// A one-shot status message, shown on the next rendered page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Flash {
    pub category: Category,
    pub message: String,
}

/// What the session remembers about a logged-in user.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionUser {
    pub id: i64,
    pub email: String,
    pub role: Role,
}

#[derive(Debug)]
struct Session {
    user: Option<SessionUser>,
    flashes: Vec<Flash>,
    last_seen: Instant,
}

impl Session {
    fn new() -> Self {
        Self { user: None, flashes: Vec::new(), last_seen: Instant::now() }
    }
}

pub struct Sessions {
    mac: HmacSha256,
    ttl: Duration,
    map: RwLock<HashMap<String, Session>>,
}

impl std::fmt::Debug for Sessions {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Sessions")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn generate_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LENGTH)
        .map(char::from)
        .collect()
}

impl Sessions {
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, String> {
        if secret.is_empty() {
            return Err("Session signing secret must not be empty.".to_owned());
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| format!("Unable to key session signer: {}", &e))?;

        Ok(Self { mac, ttl, map: RwLock::new(HashMap::new()) })
    }

    fn sign(&self, key: &str) -> String {
        let tag = self.mac.clone()
            .chain_update(key.as_bytes())
            .finalize()
            .into_bytes();
        hex::encode(tag)
    }

    /// The value to put in the session cookie for session `key`.
    pub fn cookie_value(&self, key: &str) -> String {
        format!("{}.{}", key, &self.sign(key))
    }

    /// A full `Set-Cookie` header value for session `key`.
    pub fn set_cookie(&self, key: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            COOKIE_NAME, &self.cookie_value(key)
        )
    }

    /// Return the session key carried by a cookie value, if the signature
    /// checks out.
    pub fn verify_cookie(&self, value: &str) -> Option<String> {
        let (key, sig) = value.split_once('.')?;
        let sig = hex::decode(sig).ok()?;
        match self.mac.clone().chain_update(key.as_bytes()).verify_slice(&sig) {
            Ok(()) => Some(key.to_owned()),
            Err(_) => {
                log::warn!("Session cookie with bad signature: {:?}", value);
                None
            },
        }
    }

    /**
    Find the session belonging to `cookie` or start a new one.

    Returns the session key and whether it's new (in which case the client
    needs to be sent a cookie for it). A session idle longer than the TTL
    is dropped rather than reopened, and starting a session also clears out
    any others that have sat idle that long.
    */
    pub async fn open(&self, cookie: Option<&str>) -> (String, bool) {
        let mut map = self.map.write().await;

        if let Some(key) = cookie.and_then(|c| self.verify_cookie(c)) {
            let live = map.get(&key).map(|sess| sess.last_seen.elapsed() < self.ttl);
            match live {
                Some(true) => {
                    if let Some(sess) = map.get_mut(&key) {
                        sess.last_seen = Instant::now();
                    }
                    return (key, false);
                },
                Some(false) => {
                    log::debug!("Session expired; starting a new one.");
                    map.remove(&key);
                },
                None => {},
            }
        }

        let ttl = self.ttl;
        let n_before = map.len();
        map.retain(|_, s| s.last_seen.elapsed() < ttl);
        if map.len() < n_before {
            log::debug!("Pruned {} idle sessions.", n_before - map.len());
        }

        let key = generate_key();
        map.insert(key.clone(), Session::new());
        (key, true)
    }

    /**
    Move the session at `key` (flashes and all) to a fresh key and return
    that key. The old key stops working.
    */
    pub async fn rotate(&self, key: &str) -> String {
        let mut map = self.map.write().await;
        let mut sess = map.remove(key).unwrap_or_else(Session::new);
        sess.last_seen = Instant::now();

        let new_key = generate_key();
        map.insert(new_key.clone(), sess);
        new_key
    }

    pub async fn user(&self, key: &str) -> Option<SessionUser> {
        self.map.read().await.get(key).and_then(|s| s.user.clone())
    }

    pub async fn log_in(&self, key: &str, user: SessionUser) {
        log::trace!("Sessions::log_in( [ key ], {:?} ) called.", &user);
        self.map.write().await
            .entry(key.to_owned())
            .or_insert_with(Session::new)
            .user = Some(user);
    }

    pub async fn log_out(&self, key: &str) {
        if let Some(sess) = self.map.write().await.get_mut(key) {
            sess.user = None;
        }
    }

    pub async fn flash<S: Into<String>>(&self, key: &str, category: Category, message: S) {
        self.map.write().await
            .entry(key.to_owned())
            .or_insert_with(Session::new)
            .flashes.push(Flash { category, message: message.into() });
    }

    /// Remove and return all pending flash messages.
    pub async fn take_flashes(&self, key: &str) -> Vec<Flash> {
        match self.map.write().await.get_mut(key) {
            Some(sess) => std::mem::take(&mut sess.flashes),
            None => Vec::new(),
        }
    }
}
