//! Message handlers and their registry.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::core::{Codec, HandlerError, Message, PoolError};
use crate::rpc::Responder;
use crate::transport::PeerAddr;

/// An inbound message together with its reply route.
pub struct InboundRequest {
    peer: PeerAddr,
    message: Message,
    responder: Responder,
    codec: Arc<dyn Codec>,
}

impl InboundRequest {
    pub(crate) fn new(
        peer: PeerAddr,
        message: Message,
        responder: Responder,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            peer,
            message,
            responder,
            codec,
        }
    }

    /// Address of the sending peer.
    pub fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    /// The decoded message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Shorthand for `message().message_type()`.
    pub fn message_type(&self) -> &str {
        self.message.message_type()
    }

    /// Shorthand for `message().body()`.
    pub fn body(&self) -> &[u8] {
        self.message.body()
    }

    /// Check whether the sender is waiting for a reply.
    pub fn expects_reply(&self) -> bool {
        self.responder.expects_reply()
    }

    /// Encode `message` and send it as the reply.
    ///
    /// Fails with [`RpcError::NoReplyRoute`](crate::core::RpcError::NoReplyRoute)
    /// for unsolicited messages.
    pub async fn respond(self, message: &Message) -> Result<(), PoolError> {
        let bytes = self.codec.encode(message)?;
        self.responder.respond(bytes).await?;
        Ok(())
    }

    /// Reply with `body` under the same message type as the request.
    pub async fn reply(self, body: impl Into<Vec<u8>>) -> Result<(), PoolError> {
        let message = Message::new(self.message.message_type(), body);
        self.respond(&message).await
    }
}

impl fmt::Debug for InboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundRequest")
            .field("peer", &self.peer)
            .field("message_type", &self.message.message_type())
            .field("seq", &self.responder.seq())
            .finish_non_exhaustive()
    }
}

/// Handles inbound messages of one type.
///
/// Implemented for any `Fn(InboundRequest) -> impl Future<Output =
/// Result<(), HandlerError>>`. Errors are logged by the pool and never close
/// the session.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Process one inbound message.
    async fn handle(&self, request: InboundRequest) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(InboundRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, request: InboundRequest) -> Result<(), HandlerError> {
        (self)(request).await
    }
}

/// Message type to handler map. Registering a type twice replaces the
/// earlier handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `message_type`.
    pub fn register(&self, message_type: impl Into<String>, handler: impl Handler) {
        let message_type = message_type.into();
        let replaced = self
            .handlers
            .write()
            .insert(message_type.clone(), Arc::new(handler))
            .is_some();
        debug!(message_type = %message_type, replaced, "handler registered");
    }

    /// Remove the handler for `message_type`.
    pub fn unregister(&self, message_type: &str) -> bool {
        self.handlers.write().remove(message_type).is_some()
    }

    /// Look up the handler for `message_type`.
    pub fn get(&self, message_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.read().get(message_type).cloned()
    }

    /// Number of registered message types.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Check whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let mut types: Vec<&String> = handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerRegistry")
            .field("types", &types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Handler for Named {
        async fn handle(&self, _request: InboundRequest) -> Result<(), HandlerError> {
            Err(self.0.into())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());

        registry.register("test/ping", |_request: InboundRequest| async {
            Ok::<(), HandlerError>(())
        });
        registry.register("test/named", Named("named"));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("test/ping").is_some());
        assert!(registry.get("test/missing").is_none());
    }

    #[test]
    fn test_reregister_replaces() {
        let registry = HandlerRegistry::new();
        registry.register("test/ping", Named("first"));
        registry.register("test/ping", Named("second"));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister("test/ping"));
        assert!(!registry.unregister("test/ping"));
        assert!(registry.is_empty());
    }
}
