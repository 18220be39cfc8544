//! Per-device binding table.
//!
//! A binding records that an endpoint wants messages whose name matches a
//! pattern, either as a *listener* (broadcast copies of every matching
//! message) or as a *replier* (candidate to answer matching requests).
//!
//! At most one replier may hold any given pattern string.  Ownership is kept
//! in a pattern-to-owner map next to the binding list; both are only mutated
//! through `&mut self`, so the device's routing lock serialises them.
//!
//! # Example
//!
//! ```rust
//! # use kbus_kernel::binding::{BindingTable, Role};
//! # use kbus_kernel::ids::EndpointId;
//! let mut table = BindingTable::new(1000);
//! let a = EndpointId::new(1);
//! let b = EndpointId::new(2);
//!
//! table.bind(a, "$.Fred.*", Role::Replier, false).unwrap();
//! table.bind(b, "$.Fred.Jim", Role::Replier, false).unwrap();
//!
//! let best = table.best_replier_matching("$.Fred.Jim").unwrap();
//! assert_eq!(best.endpoint, b);
//! ```

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KbusError, Result};
use crate::ids::EndpointId;
use crate::name::Pattern;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What a binding asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Receives a copy of every matching message, never obliged to reply.
    Listener,
    /// May be chosen as the single endpoint that answers a matching request.
    Replier,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listener => f.write_str("listener"),
            Self::Replier => f.write_str("replier"),
        }
    }
}

/// A single binding held by an endpoint.
#[derive(Debug, Clone)]
pub struct Binding {
    pub endpoint: EndpointId,
    pub pattern: Pattern,
    pub role: Role,
    /// The endpoint does not tolerate copies for this binding being dropped.
    pub guaranteed: bool,
}

/// Read-only view of a binding, as reported by the bindings snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BindingSnapshot {
    pub endpoint: EndpointId,
    pub role: Role,
    pub guaranteed: bool,
    pub pattern: String,
}

impl fmt::Display for BindingSnapshot {
    /// `"{endpoint:>10} {R|L} {T|F} {pattern}"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            Role::Replier => 'R',
            Role::Listener => 'L',
        };
        let guaranteed = if self.guaranteed { 'T' } else { 'F' };
        write!(
            f,
            "{:>10} {} {} {}",
            self.endpoint, role, guaranteed, self.pattern
        )
    }
}

// ---------------------------------------------------------------------------
// BindingTable
// ---------------------------------------------------------------------------

/// Registry of every binding on one device.
///
/// Bindings are kept in creation order; [`BindingTable::listeners_matching`]
/// reports them in that order and [`BindingTable::unbind`] removes the
/// oldest of several identical bindings.
#[derive(Debug)]
pub struct BindingTable {
    bindings: Vec<Binding>,
    /// Exact pattern string -> the one endpoint holding it as replier.
    repliers: HashMap<String, EndpointId>,
    max_name_len: usize,
}

impl BindingTable {
    /// Create an empty table that rejects patterns longer than
    /// `max_name_len` bytes.
    #[must_use]
    pub fn new(max_name_len: usize) -> Self {
        Self {
            bindings: Vec::new(),
            repliers: HashMap::new(),
            max_name_len,
        }
    }

    /// Add a binding.
    ///
    /// Fails with [`KbusError::AddressInUse`] if `role` is replier and any
    /// endpoint (including this one) already holds a replier binding with the
    /// identical pattern string.  Listener bindings may be duplicated freely.
    pub fn bind(
        &mut self,
        endpoint: EndpointId,
        pattern: &str,
        role: Role,
        guaranteed: bool,
    ) -> Result<()> {
        let pattern = Pattern::parse_bounded(pattern, self.max_name_len)?;

        if role == Role::Replier {
            if let Some(&owner) = self.repliers.get(pattern.as_str()) {
                return Err(KbusError::AddressInUse {
                    pattern: pattern.as_str().to_string(),
                    owner,
                });
            }
            self.repliers.insert(pattern.as_str().to_string(), endpoint);
        }

        tracing::debug!(
            endpoint = %endpoint,
            pattern = %pattern,
            role = %role,
            guaranteed,
            "binding added"
        );

        self.bindings.push(Binding {
            endpoint,
            pattern,
            role,
            guaranteed,
        });
        Ok(())
    }

    /// Remove one binding owned by `endpoint` with exactly this pattern
    /// string and role.  No wildcard matching is involved.
    pub fn unbind(&mut self, endpoint: EndpointId, pattern: &str, role: Role) -> Result<()> {
        let position = self
            .bindings
            .iter()
            .position(|b| {
                b.endpoint == endpoint && b.role == role && b.pattern.as_str() == pattern
            })
            .ok_or_else(|| KbusError::NoSuchBinding {
                endpoint,
                pattern: pattern.to_string(),
                role,
            })?;

        self.bindings.remove(position);
        if role == Role::Replier {
            self.repliers.remove(pattern);
        }

        tracing::debug!(endpoint = %endpoint, pattern = %pattern, role = %role, "binding removed");
        Ok(())
    }

    /// Drop every binding owned by `endpoint`, returning how many there were.
    pub fn remove_endpoint(&mut self, endpoint: EndpointId) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.endpoint != endpoint);
        self.repliers.retain(|_, owner| *owner != endpoint);
        let removed = before - self.bindings.len();
        if removed > 0 {
            tracing::debug!(endpoint = %endpoint, removed, "endpoint bindings released");
        }
        removed
    }

    /// Every listener binding whose pattern matches `name`, duplicates
    /// included, in creation order.
    pub fn listeners_matching(&self, name: &str) -> Vec<&Binding> {
        self.bindings
            .iter()
            .filter(|b| b.role == Role::Listener && b.pattern.matches(name))
            .collect()
    }

    /// The most specific replier binding matching `name`, if any.
    pub fn best_replier_matching(&self, name: &str) -> Option<&Binding> {
        self.bindings
            .iter()
            .filter(|b| b.role == Role::Replier && b.pattern.matches(name))
            .min_by_key(|b| Reverse(b.pattern.specificity()))
    }

    /// The endpoint currently holding `pattern` as replier.
    pub fn replier_for(&self, pattern: &str) -> Option<EndpointId> {
        self.repliers.get(pattern).copied()
    }

    /// A copy of every binding.  Order is not significant.
    pub fn snapshot(&self) -> Vec<BindingSnapshot> {
        self.bindings
            .iter()
            .map(|b| BindingSnapshot {
                endpoint: b.endpoint,
                role: b.role,
                guaranteed: b.guaranteed,
                pattern: b.pattern.as_str().to_string(),
            })
            .collect()
    }

    /// Number of bindings held by `endpoint`.
    pub fn count_for(&self, endpoint: EndpointId) -> usize {
        self.bindings.iter().filter(|b| b.endpoint == endpoint).count()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
