//! Name → constructor table for protocol instances.
//!
//! Nothing registers itself. Hosts build a registry at startup and call
//! [`register_builtin`](crate::register_builtin) (or [`register`] their own
//! protocols) before creating any round.
//!
//! [`register`]: ProtocolRegistry::register

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::instance::{NodeContext, ProtocolInstance};

/// Builds one instance for one node.
pub type Constructor =
    Arc<dyn Fn(NodeContext) -> Result<Box<dyn ProtocolInstance>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every protocol shipped with this crate.
    pub fn with_builtin() -> Result<Self> {
        let mut registry = Self::new();
        crate::register_builtin(&mut registry)?;
        Ok(registry)
    }

    /// Register `constructor` under `name`. Names are unique.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> Result<()>
    where
        F: Fn(NodeContext) -> Result<Box<dyn ProtocolInstance>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.constructors.contains_key(&name) {
            return Err(Error::DuplicateProtocol(name));
        }
        debug!(protocol = %name, "registered protocol");
        self.constructors.insert(name, Arc::new(constructor));
        Ok(())
    }

    /// Instantiate `name` for the node described by `context`.
    pub fn create(&self, name: &str, context: NodeContext) -> Result<Box<dyn ProtocolInstance>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| Error::UnknownProtocol(name.to_string()))?;
        constructor(context)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("protocols", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcast;
    use crate::message::Envelope;
    use crate::transport::{Connection, DialError, Dialer, Outbox, TransportError};
    use async_trait::async_trait;
    use meshcast_tree::{generate, local_identities, NodeIdentity};

    struct Nowhere;

    #[async_trait]
    impl Dialer for Nowhere {
        async fn dial(
            &self,
            _from: &NodeIdentity,
            to: &NodeIdentity,
        ) -> std::result::Result<Box<dyn Connection>, DialError> {
            Err(DialError::Unreachable(to.id))
        }
    }

    #[async_trait]
    impl Outbox for Nowhere {
        async fn send(
            &self,
            to: &NodeIdentity,
            _envelope: Envelope,
        ) -> std::result::Result<(), TransportError> {
            Err(TransportError::NoRoute(to.id))
        }
    }

    fn context() -> NodeContext {
        let tree = Arc::new(generate::binary(local_identities(3, 8000)).unwrap());
        let node = tree.identity(1).id;
        let net = Arc::new(Nowhere);
        NodeContext::new(tree, node, net.clone(), net)
    }

    #[test]
    fn builtin_contains_broadcast() {
        let registry = ProtocolRegistry::with_builtin().unwrap();
        assert!(registry.contains(Broadcast::NAME));
        assert_eq!(registry.names(), vec!["Broadcast"]);

        let ctx = context();
        let node = ctx.node;
        let instance = registry.create("Broadcast", ctx).unwrap();
        assert_eq!(instance.name(), "Broadcast");
        assert_eq!(instance.node(), node);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = ProtocolRegistry::new();
        assert!(registry.is_empty());
        let err = registry.create("Gossip", context()).err().unwrap();
        assert!(matches!(err, Error::UnknownProtocol(name) if name == "Gossip"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ProtocolRegistry::with_builtin().unwrap();
        let err = crate::register_builtin(&mut registry).unwrap_err();
        assert!(matches!(err, Error::DuplicateProtocol(name) if name == "Broadcast"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn constructor_errors_propagate() {
        let mut registry = ProtocolRegistry::new();
        registry
            .register("Broken", |_ctx| Err(Error::Config("nope".into())))
            .unwrap();
        registry.register("Alias", |ctx| Ok(Box::new(Broadcast::new(ctx)?) as _)).unwrap();

        assert_eq!(registry.names(), vec!["Alias", "Broken"]);
        assert!(matches!(registry.create("Broken", context()), Err(Error::Config(_))));
        assert_eq!(registry.create("Alias", context()).unwrap().name(), "Broadcast");
    }
}
