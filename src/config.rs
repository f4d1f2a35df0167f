/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::{
    session::Sessions,
    store::{mem::MemStore, Repo, Store, UserRepo},
    user::{hash_password, NewUser, Role},
};

/// Connection string that selects the in-memory store instead of Postgres.
pub const MEMORY_STORE: &str = "memory";

/// Levels inserted on startup when `seed_levels` is on.
pub static DEFAULT_LEVELS: &[&str] = &["Principiante", "Intermedio", "Avanzado"];

#[derive(Deserialize)]
struct ConfigFile {
    db_connect_string: Option<String>,
    secret_key: Option<String>,
    admin_name: Option<String>,
    admin_email: Option<String>,
    admin_password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    templates_dir: Option<String>,
    static_dir: Option<String>,
    session_ttl_minutes: Option<u64>,
    seed_levels: Option<bool>,
}

pub struct Cfg {
    pub db_connect_string: String,
    pub secret_key: String,
    pub default_admin_name: String,
    pub default_admin_email: String,
    pub default_admin_password: String,
    pub addr: SocketAddr,
    pub templates_dir: String,
    pub static_dir: String,
    pub session_ttl: Duration,
    pub seed_levels: bool,
}

static REDACTED: &str = "[redacted]";

/// Blank out the value of any `password=` pair in a libpq-style
/// connection string, or the password part of a `postgres://` URL.
fn redact_connect_string(s: &str) -> String {
    if let Some((scheme, rest)) = s.split_once("://") {
        if let Some((auth, host)) = rest.split_once('@') {
            if let Some((user, _)) = auth.split_once(':') {
                return format!("{}://{}:{}@{}", scheme, user, REDACTED, host);
            }
        }
        return s.to_owned();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(n) = rest.find("password") {
        let (before, after) = rest.split_at(n + "password".len());
        out.push_str(before);
        let trimmed = after.trim_start();
        let trimmed = match trimmed.strip_prefix('=') {
            Some(t) => t.trim_start(),
            None => { rest = after; continue; },
        };
        out.push('=');
        out.push_str(REDACTED);
        rest = match trimmed.strip_prefix('\'') {
            Some(quoted) => {
                let mut end = quoted.len();
                let mut escaped = false;
                for (i, c) in quoted.char_indices() {
                    match c {
                        _ if escaped => { escaped = false; },
                        '\\' => { escaped = true; },
                        '\'' => { end = i + 1; break; },
                        _ => {},
                    }
                }
                &quoted[end..]
            },
            None => {
                let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
                &trimmed[end..]
            },
        };
    }
    out.push_str(rest);
    out
}

impl std::fmt::Debug for Cfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cfg")
            .field("db_connect_string", &redact_connect_string(&self.db_connect_string))
            .field("secret_key", &REDACTED)
            .field("default_admin_name", &self.default_admin_name)
            .field("default_admin_email", &self.default_admin_email)
            .field("default_admin_password", &REDACTED)
            .field("addr", &self.addr)
            .field("templates_dir", &self.templates_dir)
            .field("static_dir", &self.static_dir)
            .field("session_ttl", &self.session_ttl)
            .field("seed_levels", &self.seed_levels)
            .finish()
    }
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            db_connect_string: "host=localhost user=aula password='aula' dbname=aula".to_owned(),
            secret_key: "change me".to_owned(),
            default_admin_name: "Admin General".to_owned(),
            default_admin_email: "admin@example.com".to_owned(),
            default_admin_password: "admin123".to_owned(),
            addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            templates_dir: "templates/".to_owned(),
            static_dir: "static/".to_owned(),
            session_ttl: Duration::from_secs(60 * 60 * 12),
            seed_levels: true,
        }
    }
}

impl Cfg {
    /// Overlay the values in TOML text `text` on the defaults.
    pub fn from_toml(text: &str) -> Result<Self, String> {
        let cf: ConfigFile = toml::from_str(text)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.db_connect_string {
            c.db_connect_string = s;
        }
        if let Some(s) = cf.secret_key {
            c.secret_key = s;
        }
        if let Some(s) = cf.admin_name {
            c.default_admin_name = s;
        }
        if let Some(s) = cf.admin_email {
            c.default_admin_email = s;
        }
        if let Some(s) = cf.admin_password {
            c.default_admin_password = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(s) = cf.templates_dir {
            c.templates_dir = s;
        }
        if let Some(s) = cf.static_dir {
            c.static_dir = s;
        }
        if let Some(n) = cf.session_ttl_minutes {
            c.session_ttl = Duration::from_secs(n * 60);
        }
        if let Some(b) = cf.seed_levels {
            c.seed_levels = b;
        }

        Ok(c)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file {}: {}", path.display(), &e))?;
        Self::from_toml(&file_contents)
    }
}

/**
This guy will haul around some global variables and be passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    pub store: Arc<dyn Repo>,
    pub sessions: Sessions,
    pub addr: SocketAddr,
    pub static_dir: String,
}

impl Glob {
    pub fn new(store: Arc<dyn Repo>, cfg: &Cfg) -> Result<Self, String> {
        let sessions = Sessions::new(&cfg.secret_key, cfg.session_ttl)?;
        Ok(Self {
            store,
            sessions,
            addr: cfg.addr,
            static_dir: cfg.static_dir.clone(),
        })
    }
}

/// Ensure the default admin exists and can log in.
async fn ensure_default_admin(store: &dyn Repo, cfg: &Cfg) -> Result<(), String> {
    log::trace!("Checking existence of default Admin in data DB...");

    match store.user_by_email(&cfg.default_admin_email).await {
        Err(e) => Err(format!(
            "Error attempting to check existence of default Admin ({}) in data DB: {}",
            &cfg.default_admin_email, &e
        )),
        Ok(Some(u)) => {
            if u.role != Role::Admin {
                log::warn!(
                    "Default Admin email {} belongs to a user with role {}.",
                    &u.email, &u.role
                );
            } else if !u.check_password(&cfg.default_admin_password) {
                log::warn!("Default Admin ({}) not using default password.", &u.email);
            }
            log::trace!("Default admin OK in data DB.");
            Ok(())
        },
        Ok(None) => {
            log::info!(
                "Default Admin ({}) doesn't exist in data DB; inserting.",
                &cfg.default_admin_email
            );
            let new = NewUser {
                name: cfg.default_admin_name.clone(),
                email: cfg.default_admin_email.clone(),
                password_hash: hash_password(&cfg.default_admin_password)?,
                role: Role::Admin,
            };
            store.insert_user(&new).await
                .map_err(|e| format!("Error inserting default Admin into data DB: {}", &e))?;
            Ok(())
        },
    }
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
///
/// Also assures existence of default admin (and default levels, if
/// configured).
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<(Cfg, Glob), String> {
    let cfg = Cfg::from_file(path.as_ref())?;
    log::info!("Configuration file read:\n{:#?}", &cfg);

    let store: Arc<dyn Repo> = if cfg.db_connect_string == MEMORY_STORE {
        log::warn!("Using in-memory data store; nothing will persist.");
        Arc::new(MemStore::new())
    } else {
        Arc::new(Store::new(cfg.db_connect_string.clone()))
    };

    log::trace!("Checking state of data DB...");
    if let Err(e) = store.ensure_db_schema().await {
        return Err(format!("Unable to ensure state of data DB: {}", &e));
    }
    log::trace!("...data DB okay.");

    ensure_default_admin(store.as_ref(), &cfg).await?;

    if cfg.seed_levels {
        let n = store.insert_levels(DEFAULT_LEVELS).await
            .map_err(|e| format!("Error inserting default levels: {}", &e))?;
        if n > 0 {
            log::info!("Inserted {} default levels.", &n);
        }
    }

    let glob = Glob::new(store, &cfg)?;
    Ok((cfg, glob))
}
