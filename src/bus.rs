//! Message Bus
//!
//! In-process bus for the host's messaging patterns:
//!
//! - **Point-to-point**: [`MessageBus::send`] to a uniquely named endpoint.
//! - **Request/response**: [`MessageBus::request`] /
//!   [`MessageBus::response`] correlated by request ID.
//! - **Pub/sub**: [`MessageBus::publish`] fans out to every subscription
//!   whose wildcard pattern matches the published topic, in descending
//!   priority order (stable for ties).
//!
//! # Dispatch model
//!
//! Bus operations never suspend: every handler invocation is a direct call
//! on the calling task. Handlers that must do async work self-dispatch.
//! Messages travel as `&dyn Any`; payload typing is the collaborators'
//! concern.
//!
//! # Pattern cache
//!
//! `patterns` caches the resolved, priority-sorted handler list per topic
//! that has been published at least once. Subscribe and unsubscribe update
//! the cached arrays incrementally and clear the `resolved` guard; a topic
//! never published stays out of the cache entirely. After at most one
//! publish the cache is consistent again.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::clock::Clock;
use crate::error::BusError;
use crate::ident::{TraderId, UUID4};
use crate::time::UnixNanos;
use crate::topics::{check_topic, is_matching};

// =============================================================================
// HANDLERS AND SUBSCRIPTIONS
// =============================================================================

/// A shared, identity-bearing message callback.
///
/// Callables have no natural equality, so every handler carries an explicit
/// ID; handlers compare and hash by that ID alone. Cloning shares the same
/// underlying closure.
#[derive(Clone)]
pub struct MessageHandler {
    id: Rc<str>,
    callback: Rc<dyn Fn(&dyn Any)>,
}

impl MessageHandler {
    pub fn new<F>(id: impl Into<Rc<str>>, callback: F) -> Self
    where
        F: Fn(&dyn Any) + 'static,
    {
        Self {
            id: id.into(),
            callback: Rc::new(callback),
        }
    }

    /// The stable handler identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Invoke the handler with a message.
    #[inline]
    pub fn call(&self, msg: &dyn Any) {
        (self.callback)(msg);
    }
}

impl PartialEq for MessageHandler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageHandler {}

impl std::hash::Hash for MessageHandler {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageHandler(id={})", self.id)
    }
}

/// An association of `(topic, handler, priority)`.
///
/// `topic` may contain wildcards, making it a pattern. Equality and hashing
/// ignore `priority`: a handler is subscribed to a topic once, whatever its
/// priority.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// The subscribed topic (may be a wildcard pattern).
    pub topic: String,
    /// The handler receiving matching publications.
    pub handler: MessageHandler,
    /// Delivery priority: higher fires earlier.
    pub priority: u8,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, handler: MessageHandler, priority: u8) -> Self {
        Self {
            topic: topic.into(),
            handler,
            priority,
        }
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic && self.handler == other.handler
    }
}

impl Eq for Subscription {}

// =============================================================================
// REQUEST / RESPONSE RECORDS
// =============================================================================

/// A correlated request dispatched to an endpoint.
#[derive(Clone)]
pub struct Request {
    /// Unique request ID; responses correlate against it.
    pub id: UUID4,
    /// Creation time (Unix nanoseconds).
    pub ts_init: UnixNanos,
    /// Opaque request payload.
    pub payload: Rc<dyn Any>,
    /// Callback to invoke with the correlated response, if any.
    pub callback: Option<MessageHandler>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Request(id={}, ts_init={}, callback={:?})",
            self.id, self.ts_init, self.callback
        )
    }
}

/// A response correlated back to an outstanding request.
#[derive(Clone)]
pub struct Response {
    /// The originating request's ID.
    pub correlation_id: UUID4,
    /// Unique response ID.
    pub id: UUID4,
    /// Creation time (Unix nanoseconds).
    pub ts_init: UnixNanos,
    /// Opaque response payload.
    pub payload: Rc<dyn Any>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Response(correlation_id={}, id={}, ts_init={})",
            self.correlation_id, self.id, self.ts_init
        )
    }
}

// =============================================================================
// MESSAGE BUS
// =============================================================================

/// Construction options for [`MessageBus`].
#[derive(Debug, Clone)]
pub struct MessageBusConfig {
    /// Bus display name; defaults to `MessageBus`.
    pub name: Option<String>,
    /// Whether an external transport backs this bus.
    pub has_backing: bool,
    /// Types eligible for external publication, snapshotted at
    /// construction.
    pub publishable_types: Vec<TypeId>,
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        Self {
            name: None,
            has_backing: false,
            publishable_types: Vec::new(),
        }
    }
}

/// A subscription plus the published-topic cache keys it is indexed under.
struct SubscriptionEntry {
    sub: Subscription,
    cached_topics: Vec<String>,
}

/// The in-process message bus.
///
/// Runs on one logical executor; operations take `&mut self` and dispatch
/// synchronously. Handler panics are not caught; a failing handler aborts
/// the current dispatch only.
pub struct MessageBus {
    /// The trader ID associated with this bus.
    pub trader_id: TraderId,
    /// The process instance ID.
    pub instance_id: UUID4,
    /// The bus display name.
    pub name: String,
    /// Whether an external transport backs this bus.
    pub has_backing: bool,
    clock: Rc<RefCell<dyn Clock>>,
    endpoints: HashMap<String, MessageHandler>,
    subscriptions: Vec<SubscriptionEntry>,
    patterns: HashMap<String, Vec<Subscription>>,
    correlation_index: HashMap<UUID4, MessageHandler>,
    streaming_types: HashSet<TypeId>,
    publishable_types: Box<[TypeId]>,
    resolved: bool,
    sent_count: u64,
    req_count: u64,
    res_count: u64,
    pub_count: u64,
}

impl MessageBus {
    /// Create a new bus bound to `clock`.
    pub fn new(
        trader_id: TraderId,
        instance_id: UUID4,
        clock: Rc<RefCell<dyn Clock>>,
        config: MessageBusConfig,
    ) -> Self {
        Self {
            trader_id,
            instance_id,
            name: config.name.unwrap_or_else(|| "MessageBus".to_string()),
            has_backing: config.has_backing,
            clock,
            endpoints: HashMap::new(),
            subscriptions: Vec::new(),
            patterns: HashMap::new(),
            correlation_index: HashMap::new(),
            streaming_types: HashSet::new(),
            publishable_types: config.publishable_types.into_boxed_slice(),
            resolved: false,
            sent_count: 0,
            req_count: 0,
            res_count: 0,
            pub_count: 0,
        }
    }

    /// Current bus time in Unix nanoseconds, read from the bound clock.
    pub fn timestamp_ns(&self) -> UnixNanos {
        self.clock.borrow().timestamp_ns()
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Registered endpoint addresses, sorted.
    pub fn endpoints(&self) -> Vec<String> {
        let mut names: Vec<String> = self.endpoints.keys().cloned().collect();
        names.sort();
        names
    }

    /// Actively subscribed topics/patterns, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .subscriptions
            .iter()
            .map(|e| e.sub.topic.clone())
            .collect();
        topics.sort();
        topics
    }

    /// Count of subscriptions whose pattern matches `topic`.
    pub fn subscription_count(&self, topic: &str) -> usize {
        match self.patterns.get(topic) {
            Some(subs) => subs.len(),
            None => self
                .subscriptions
                .iter()
                .filter(|e| is_matching(topic, &e.sub.topic))
                .count(),
        }
    }

    /// Whether any subscription matches `topic`.
    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.subscription_count(topic) > 0
    }

    /// Whether `handler` is subscribed under `topic`.
    pub fn is_subscribed(&self, topic: &str, handler: &MessageHandler) -> bool {
        self.subscriptions
            .iter()
            .any(|e| e.sub.topic == topic && &e.sub.handler == handler)
    }

    /// Whether `endpoint` is registered.
    pub fn is_registered(&self, endpoint: &str) -> bool {
        self.endpoints.contains_key(endpoint)
    }

    /// Whether a request with `request_id` awaits its response.
    pub fn is_pending_request(&self, request_id: &UUID4) -> bool {
        self.correlation_index.contains_key(request_id)
    }

    /// Whether `T` is registered for external streaming.
    pub fn is_streaming_type<T: 'static>(&self) -> bool {
        self.streaming_types.contains(&TypeId::of::<T>())
    }

    /// Register `T` for external streaming.
    pub fn add_streaming_type<T: 'static>(&mut self) {
        self.streaming_types.insert(TypeId::of::<T>());
    }

    /// Whether `T` was declared publishable at construction.
    pub fn is_publishable_type<T: 'static>(&self) -> bool {
        self.publishable_types.contains(&TypeId::of::<T>())
    }

    /// Messages sent point-to-point so far.
    pub fn sent_count(&self) -> u64 {
        self.sent_count
    }

    /// Requests dispatched so far.
    pub fn req_count(&self) -> u64 {
        self.req_count
    }

    /// Responses processed so far.
    pub fn res_count(&self) -> u64 {
        self.res_count
    }

    /// Topics published so far.
    pub fn pub_count(&self) -> u64 {
        self.pub_count
    }

    // -------------------------------------------------------------------------
    // Endpoints
    // -------------------------------------------------------------------------

    /// Register `handler` at the unique address `endpoint`.
    pub fn register(&mut self, endpoint: &str, handler: MessageHandler) -> Result<(), BusError> {
        if endpoint.is_empty() {
            return Err(BusError::InvalidEndpoint);
        }
        if self.endpoints.contains_key(endpoint) {
            return Err(BusError::DuplicateEndpoint(endpoint.to_string()));
        }
        tracing::debug!(endpoint, handler = handler.id(), "endpoint registered");
        self.endpoints.insert(endpoint.to_string(), handler);
        Ok(())
    }

    /// Remove the registration at `endpoint`; `handler` must match the
    /// registered one.
    pub fn deregister(&mut self, endpoint: &str, handler: &MessageHandler) -> Result<(), BusError> {
        match self.endpoints.get(endpoint) {
            None => Err(BusError::UnknownEndpoint(endpoint.to_string())),
            Some(registered) if registered != handler => {
                Err(BusError::HandlerMismatch(endpoint.to_string()))
            }
            Some(_) => {
                self.endpoints.remove(endpoint);
                tracing::debug!(endpoint, "endpoint deregistered");
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Pub/sub
    // -------------------------------------------------------------------------

    /// Subscribe `handler` to `topic` (literal or wildcard pattern).
    ///
    /// Idempotent for an existing `(topic, handler)` pair. Higher
    /// `priority` receives matching publications earlier; equal priorities
    /// keep subscribe order.
    pub fn subscribe(
        &mut self,
        topic: &str,
        handler: MessageHandler,
        priority: u8,
    ) -> Result<(), BusError> {
        check_topic(topic)?;

        let sub = Subscription::new(topic, handler, priority);
        if self.subscriptions.iter().any(|e| e.sub == sub) {
            return Ok(());
        }

        // Index the new subscription under every cached published topic it
        // matches, keeping each array in descending priority order
        let mut cached_topics = Vec::new();
        for (published, subs) in &mut self.patterns {
            if is_matching(published, &sub.topic) {
                insert_by_priority(subs, sub.clone());
                cached_topics.push(published.clone());
            }
        }
        cached_topics.sort();

        self.subscriptions.push(SubscriptionEntry {
            sub,
            cached_topics,
        });
        self.resolved = false;
        Ok(())
    }

    /// Remove the `(topic, handler)` subscription. Unknown subscriptions
    /// are a silent no-op.
    pub fn unsubscribe(&mut self, topic: &str, handler: &MessageHandler) -> Result<(), BusError> {
        check_topic(topic)?;

        let Some(idx) = self
            .subscriptions
            .iter()
            .position(|e| e.sub.topic == topic && &e.sub.handler == handler)
        else {
            return Ok(());
        };

        let entry = self.subscriptions.remove(idx);
        for published in &entry.cached_topics {
            if let Some(subs) = self.patterns.get_mut(published) {
                subs.retain(|s| s != &entry.sub);
            }
        }
        self.resolved = false;
        Ok(())
    }

    /// Publish `msg` on `topic` to every matching subscriber, flagged for
    /// external publication (no-op unless the bus has a backing).
    pub fn publish(&mut self, topic: &str, msg: &dyn Any) -> Result<(), BusError> {
        self.publish_external(topic, msg, true)
    }

    /// Publish `msg` on `topic`, threading the external-publication flag
    /// explicitly.
    pub fn publish_external(
        &mut self,
        topic: &str,
        msg: &dyn Any,
        external_pub: bool,
    ) -> Result<(), BusError> {
        check_topic(topic)?;

        let subs = match self.patterns.get(topic) {
            Some(subs) => subs.clone(),
            None => self.resolve_topic(topic),
        };

        for sub in &subs {
            sub.handler.call(msg);
        }
        self.pub_count += 1;

        if external_pub && self.has_backing && self.streaming_types.contains(&msg.type_id()) {
            tracing::trace!(topic, "forwarding publication to external backing");
        }
        Ok(())
    }

    /// Resolve the matching subscriptions for a first-seen `topic`, cache
    /// the sorted array, and index each matched subscription under it.
    fn resolve_topic(&mut self, topic: &str) -> Vec<Subscription> {
        let mut matches: Vec<Subscription> = Vec::new();
        for entry in &mut self.subscriptions {
            if is_matching(topic, &entry.sub.topic) {
                matches.push(entry.sub.clone());
                entry.cached_topics.push(topic.to_string());
                entry.cached_topics.sort();
            }
        }
        // Stable: equal priorities keep subscribe order
        matches.sort_by_key(|s| Reverse(s.priority));

        self.patterns.insert(topic.to_string(), matches.clone());
        self.resolved = true;
        matches
    }

    // -------------------------------------------------------------------------
    // Point-to-point and request/response
    // -------------------------------------------------------------------------

    /// Send `msg` to `endpoint`. Unknown endpoints are a silent no-op.
    pub fn send(&mut self, endpoint: &str, msg: &dyn Any) {
        if let Some(handler) = self.endpoints.get(endpoint).cloned() {
            handler.call(msg);
            self.sent_count += 1;
        }
    }

    /// Dispatch `req` to `endpoint`, registering its response callback
    /// under the request ID. Duplicate request IDs are dropped; unknown
    /// endpoints leave the callback registered but dispatch nothing.
    pub fn request(&mut self, endpoint: &str, req: &Request) {
        if self.correlation_index.contains_key(&req.id) {
            tracing::warn!(request_id = %req.id, "duplicate request ID dropped");
            return;
        }
        if let Some(callback) = &req.callback {
            self.correlation_index.insert(req.id, callback.clone());
        }
        if let Some(handler) = self.endpoints.get(endpoint).cloned() {
            handler.call(req);
            self.req_count += 1;
        }
    }

    /// Deliver `resp` to the callback awaiting its `correlation_id`, if
    /// one is still outstanding.
    pub fn response(&mut self, resp: &Response) {
        if let Some(callback) = self.correlation_index.remove(&resp.correlation_id) {
            callback.call(resp);
        }
        self.res_count += 1;
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("name", &self.name)
            .field("trader_id", &self.trader_id)
            .field("instance_id", &self.instance_id)
            .field("endpoints", &self.endpoints.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("resolved", &self.resolved)
            .finish()
    }
}

/// Insert into a descending-priority array, after any existing equal
/// priorities (stable).
fn insert_by_priority(subs: &mut Vec<Subscription>, sub: Subscription) {
    let pos = subs
        .iter()
        .position(|s| s.priority < sub.priority)
        .unwrap_or(subs.len());
    subs.insert(pos, sub);
}
