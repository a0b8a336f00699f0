use std::env;
use std::net::SocketAddr;

use anyhow::{Context, anyhow};

use crate::auth::{Caller, TokenTable};
use crate::models::{Role, UserId};

const DEFAULT_BIND: &str = "127.0.0.1:4010";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// A development account seeded at startup and reachable with the bearer
/// token `dev-<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevUser {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl DevUser {
    pub fn token(&self) -> String {
        format!("dev-{}", self.id)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub dev_users: Vec<DevUser>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind = lookup("GRAPH_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid GRAPH_BIND '{}'", bind))?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let max_connections = match lookup("GRAPH_DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid GRAPH_DB_MAX_CONNECTIONS '{}'", raw))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let dev_users = match lookup("GRAPH_DEV_USERS") {
            Some(raw) => parse_dev_users(&raw).context("invalid GRAPH_DEV_USERS")?,
            None => Vec::new(),
        };

        Ok(Self {
            bind,
            database_url,
            max_connections,
            dev_users,
        })
    }

    pub fn token_table(&self) -> TokenTable {
        self.dev_users
            .iter()
            .fold(TokenTable::new(), |table, user| {
                table.with_token(
                    user.token(),
                    Caller {
                        id: user.id,
                        role: user.role,
                    },
                )
            })
    }
}

/// Parses a comma-separated `id:name[:admin]` list.
fn parse_dev_users(raw: &str) -> anyhow::Result<Vec<DevUser>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> anyhow::Result<DevUser> {
            let mut parts = entry.split(':');
            let id = parts
                .next()
                .ok_or_else(|| anyhow!("missing id in '{}'", entry))?;
            let id = id
                .trim()
                .parse::<UserId>()
                .with_context(|| format!("invalid user id in '{}'", entry))?;
            if !id.is_assigned() {
                return Err(anyhow!("user id must be positive in '{}'", entry));
            }

            let name = parts
                .next()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| anyhow!("missing user name in '{}'", entry))?;
            let role = match parts.next().map(str::trim) {
                None => Role::User,
                Some(flag) if flag.eq_ignore_ascii_case("admin") => Role::Admin,
                Some(flag) => return Err(anyhow!("unknown role flag '{}' in '{}'", flag, entry)),
            };

            Ok(DevUser {
                id,
                name: name.to_string(),
                role,
            })
        })
        .collect()
}
