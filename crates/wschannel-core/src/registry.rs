//! Connection registry for server channels.
//!
//! The registry is the single owner of every live peer handle. Identifiers are
//! generated here and never reused, so a handle can only be inserted once and
//! retiring it hands ownership back to the caller for disposal.

use std::collections::HashMap;
use std::fmt;

use crate::error::RegistryError;

/// Identifier of one connection, unique for the lifetime of its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The set of currently open connections, keyed by [`ConnectionId`].
#[derive(Debug)]
pub struct ConnectionRegistry<C> {
    next_id: u64,
    entries: HashMap<ConnectionId, C>,
    admitted: u64,
    retired: u64,
}

impl<C> ConnectionRegistry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
            admitted: 0,
            retired: 0,
        }
    }

    /// Allocates a fresh identifier without registering anything yet.
    pub fn reserve_id(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Registers `conn` under `id`.
    ///
    /// Fails with [`RegistryError::Duplicate`] if `id` is already present; the
    /// existing entry is left untouched.
    pub fn insert(&mut self, id: ConnectionId, conn: C) -> Result<(), RegistryError> {
        if self.entries.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.entries.insert(id, conn);
        self.admitted += 1;
        Ok(())
    }

    /// Allocates an identifier and registers `conn` under it.
    pub fn admit(&mut self, conn: C) -> ConnectionId {
        let id = self.reserve_id();
        self.entries.insert(id, conn);
        self.admitted += 1;
        id
    }

    /// Removes `id` and returns its connection.
    pub fn retire(&mut self, id: ConnectionId) -> Result<C, RegistryError> {
        let conn = self
            .entries
            .remove(&id)
            .ok_or(RegistryError::Unknown(id))?;
        self.retired += 1;
        Ok(conn)
    }

    /// Removes every entry, returning ownership of all of them.
    pub fn drain(&mut self) -> Vec<(ConnectionId, C)> {
        let drained: Vec<_> = self.entries.drain().collect();
        self.retired += drained.len() as u64;
        drained
    }

    /// Returns the connection registered under `id`.
    pub fn get(&self, id: ConnectionId) -> Option<&C> {
        self.entries.get(&id)
    }

    /// Returns true if `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Iterates over all registered connections.
    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &C)> {
        self.entries.iter().map(|(id, conn)| (*id, conn))
    }

    /// Returns all registered identifiers.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.entries.keys().copied().collect()
    }

    /// Returns the number of live connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns lifetime statistics.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live: self.entries.len(),
            admitted: self.admitted,
            retired: self.retired,
        }
    }
}

impl<C> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about a connection registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of currently registered connections.
    pub live: usize,
    /// Total number of admissions.
    pub admitted: u64,
    /// Total number of retirements, including teardown drains.
    pub retired: u64,
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Connections: {} live ({} admitted, {} retired)",
            self.live, self.admitted, self.retired
        )
    }
}
