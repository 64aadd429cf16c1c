//! Process configuration, read from the environment after `.env` is loaded.

use anyhow::{bail, Context, Result};
use std::{env, path::PathBuf};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_USER_ID: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub port: u16,
    /// Prebuilt frontend to serve as a fallback, if any.
    pub static_dir: Option<PathBuf>,
    /// Identity used when a request names no user.
    pub default_user: String,
    pub seed_catalog: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match get("STORE").as_deref().map(str::trim) {
            None | Some("") | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => bail!("unknown STORE {other:?} (expected \"postgres\" or \"memory\")"),
        };

        let database_url = get("DATABASE_URL").filter(|s| !s.is_empty());
        if store == StoreKind::Postgres && database_url.is_none() {
            bail!("DATABASE_URL not set");
        }

        let port = match get("PORT") {
            Some(p) => p.parse().with_context(|| format!("invalid PORT {p:?}"))?,
            None => DEFAULT_PORT,
        };

        let default_user = get("DEFAULT_USER_ID")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_ID.into());

        let seed_catalog = matches!(
            get("SEED_CATALOG").as_deref(),
            Some("1") | Some("true") | Some("yes")
        );

        Ok(Config {
            store,
            database_url,
            port,
            static_dir: get("STATIC_DIR").filter(|s| !s.is_empty()).map(PathBuf::from),
            default_user,
            seed_catalog,
        })
    }
}
