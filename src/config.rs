use std::fmt;
use std::path::PathBuf;

use crate::error::{LoadError, Result};
use crate::store::{RestStore, SqliteStore, Store, StoreFactory};

pub const ENDPOINT_VAR: &str = "SUPABASE_URL";

/// Checked in order; the first non-empty value wins.
pub const CREDENTIAL_VARS: &[&str] =
    &["SUPABASE_SERVICE_ROLE_KEY", "SUPABASE_KEY", "SUPABASE_ANON_KEY"];

pub const SQLITE_PATH_VAR: &str = "PITCH_LOADER_SQLITE";

/// Loads `.env` from the working directory if there is one.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[derive(Clone)]
pub struct StoreCredentials {
    pub url: String,
    pub api_key: String,
    /// Which variable the key came from.
    pub key_source: &'static str,
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("key_source", &self.key_source)
            .finish()
    }
}

impl StoreCredentials {
    pub fn from_env() -> Result<Self> {
        Self::resolve(|name| std::env::var(name).ok())
    }

    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let url = non_empty(ENDPOINT_VAR)
            .ok_or_else(|| LoadError::Config(format!("{ENDPOINT_VAR} is not set")))?;
        let (key_source, api_key) = CREDENTIAL_VARS
            .iter()
            .find_map(|name| non_empty(name).map(|v| (*name, v)))
            .ok_or_else(|| {
                LoadError::Config(format!("none of {} is set", CREDENTIAL_VARS.join(", ")))
            })?;
        Ok(Self {
            url,
            api_key,
            key_source,
        })
    }
}

#[derive(Debug, Clone)]
pub enum StoreTarget {
    Rest(StoreCredentials),
    Sqlite(PathBuf),
}

impl StoreTarget {
    /// A local SQLite path takes priority; otherwise the REST credentials must
    /// resolve.
    pub fn select(sqlite: Option<PathBuf>) -> Result<Self> {
        match sqlite {
            Some(path) => Ok(StoreTarget::Sqlite(path)),
            None => Ok(StoreTarget::Rest(StoreCredentials::from_env()?)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            StoreTarget::Rest(creds) => {
                format!("rest {} (key from {})", creds.url, creds.key_source)
            }
            StoreTarget::Sqlite(path) => format!("sqlite {}", path.display()),
        }
    }

    /// Builds a fresh connection on every call.
    pub fn factory(&self) -> StoreFactory {
        match self.clone() {
            StoreTarget::Rest(creds) => {
                Box::new(move || RestStore::connect(&creds).map(|s| Box::new(s) as Box<dyn Store>))
            }
            StoreTarget::Sqlite(path) => {
                Box::new(move || SqliteStore::open(&path).map(|s| Box::new(s) as Box<dyn Store>))
            }
        }
    }
}
