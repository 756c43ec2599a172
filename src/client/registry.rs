//! Client registry: name to strategy lookup and ordered list resolution.
//!
//! Built once at startup from configuration and shared behind an `Arc`; never
//! mutated afterwards, so concurrent request handling reads it without locks.

use std::collections::HashMap;

use super::Client;
use crate::core::error::{AuthError, AuthResult};

/// Immutable mapping from client name to identity strategy
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own name.
    ///
    /// Duplicate names are a configuration error.
    pub fn register(&mut self, client: Client) -> AuthResult<()> {
        let name = client.name().to_string();
        if self.clients.contains_key(&name) {
            return Err(AuthError::config(format!(
                "duplicate client name '{name}'"
            )));
        }
        self.clients.insert(name, client);
        Ok(())
    }

    /// Look up a single client by name
    pub fn get(&self, name: &str) -> AuthResult<&Client> {
        self.clients
            .get(name)
            .ok_or_else(|| AuthError::unknown_client(name))
    }

    /// Resolve an ordered name list into an ordered client list.
    ///
    /// Order is preserved exactly: the pipeline tries candidates in this
    /// order and the first match wins. An empty list is valid and means
    /// "authentication required, but no specific strategy": any session
    /// profile satisfies the request and no challenge can be issued.
    pub fn resolve(&self, names: &[String]) -> AuthResult<Vec<Client>> {
        names
            .iter()
            .map(|name| self.get(name).map(Clone::clone))
            .collect()
    }

    /// Split a comma-separated client-name list into trimmed names.
    ///
    /// Done once at configuration load, never per request.
    pub fn parse_names(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}
