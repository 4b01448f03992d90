//! Online probing and network tracing for endpoints.
//!
//! The probe result is cached inside the interned endpoint with a deadline,
//! so the cache disappears together with the identity and no timer is left
//! behind. A per-endpoint async gate makes concurrent callers share one probe.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, timeout};
use tracing::debug;

use super::Endpoint;
use crate::config::LivenessConfig;
use crate::error::{EndpointError, LivenessError};

/// Request primitive provided by the networking layer.
pub trait Transport: Send + Sync {
    /// Send an unsigned, unencrypted ping; resolve once `endpoint` answered.
    fn ping(&self, endpoint: &Endpoint) -> impl Future<Output = Result<(), LivenessError>> + Send;

    /// Deliver `request` to `next`; resolve with the hop list once it is back at its origin.
    fn forward_trace(
        &self,
        next: &Endpoint,
        request: TraceRequest,
    ) -> impl Future<Output = Result<Vec<TraceHop>, LivenessError>> + Send;
}

#[derive(Default)]
pub(crate) struct LivenessCell {
    state: Mutex<CellState>,
    probe: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct CellState {
    cached: Option<Cached>,
    /// Bumped by every explicit override.
    generation: u64,
}

#[derive(Clone, Copy)]
struct Cached {
    online: bool,
    expires_at: Instant,
}

impl LivenessCell {
    fn current(&self) -> Option<bool> {
        let state = self.state.lock().expect("liveness cache poisoned");
        state
            .cached
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.online)
    }

    fn generation(&self) -> u64 {
        self.state.lock().expect("liveness cache poisoned").generation
    }

    /// Store a probe result unless an override happened since `generation`.
    fn store_probe(&self, generation: u64, online: bool, ttl: Duration) -> bool {
        let mut state = self.state.lock().expect("liveness cache poisoned");
        if state.generation != generation {
            return false;
        }
        state.cached = Some(Cached {
            online,
            expires_at: Instant::now() + ttl,
        });
        true
    }

    fn set(&self, online: bool, ttl: Duration) {
        let mut state = self.state.lock().expect("liveness cache poisoned");
        state.generation += 1;
        state.cached = Some(Cached {
            online,
            expires_at: Instant::now() + ttl,
        });
    }
}

/// One recorded step of a trace.
#[derive(Clone, Debug)]
pub struct TraceHop {
    pub endpoint: Endpoint,
    pub interface: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct TraceRequest {
    pub origin: Endpoint,
    pub destination: Endpoint,
    /// Append-only, origin first.
    pub hops: Vec<TraceHop>,
}

/// Outcome of handling a trace request at one node.
#[derive(Debug)]
pub enum TraceStep {
    /// The request is back at its origin.
    Done(Vec<TraceHop>),
    Forward { next: Endpoint, request: TraceRequest },
}

impl TraceRequest {
    pub fn new(origin: Endpoint, destination: Endpoint) -> Self {
        Self {
            origin,
            destination,
            hops: Vec::new(),
        }
    }

    /// Append the hop for `here` and decide where the request travels next.
    pub fn step(mut self, here: &Endpoint, interface: &str) -> TraceStep {
        let returned = self.origin == *here && !self.hops.is_empty();
        self.hops.push(TraceHop {
            endpoint: here.clone(),
            interface: interface.to_string(),
            timestamp: Utc::now(),
        });
        if returned || (self.origin == *here && self.destination == *here) {
            return TraceStep::Done(self.hops);
        }
        let reached = self
            .hops
            .iter()
            .any(|hop| hop.endpoint == self.destination);
        let next = if reached {
            self.origin.clone()
        } else {
            self.destination.clone()
        };
        TraceStep::Forward {
            next,
            request: self,
        }
    }
}

/// Liveness context: who we are, policy, and how to reach others.
pub struct Network<T> {
    local: Endpoint,
    main_node: Option<Endpoint>,
    relays: Vec<Endpoint>,
    config: LivenessConfig,
    transport: T,
}

impl<T: Transport> Network<T> {
    pub fn new(local: Endpoint, config: LivenessConfig, transport: T) -> Result<Self, EndpointError> {
        let main_node = config.main_node.as_deref().map(Endpoint::get).transpose()?;
        let relays = config
            .relays
            .iter()
            .map(|relay| Endpoint::get(relay))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            local,
            main_node,
            relays,
            config,
            transport,
        })
    }

    pub fn local(&self) -> &Endpoint {
        &self.local
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn always_online(&self, endpoint: &Endpoint) -> bool {
        *endpoint == self.local || self.main_node.as_ref() == Some(endpoint)
    }

    /// Ping timeout for `endpoint`; well-known relays get the longer one.
    pub fn ping_timeout(&self, endpoint: &Endpoint) -> Duration {
        let main = endpoint.main();
        let millis = if self.relays.contains(&main) {
            self.config.relay_ping_timeout_ms
        } else {
            self.config.ping_timeout_ms
        };
        Duration::from_millis(millis)
    }

    /// Whether `endpoint` answered a ping recently. Never fails; timeouts count as offline.
    pub async fn is_online(&self, endpoint: &Endpoint) -> bool {
        if self.always_online(endpoint) {
            return true;
        }
        let cell = endpoint.liveness();
        if let Some(online) = cell.current() {
            debug!(%endpoint, online, "liveness cache hit");
            return online;
        }
        let _gate = cell.probe.lock().await;
        // another caller may have finished the probe while we waited
        if let Some(online) = cell.current() {
            return online;
        }
        let generation = cell.generation();
        let limit = self.ping_timeout(endpoint);
        let online = matches!(timeout(limit, self.transport.ping(endpoint)).await, Ok(Ok(())));
        debug!(%endpoint, online, timeout_ms = limit.as_millis() as u64, "liveness probe finished");
        if cell.store_probe(generation, online, self.config.ttl(online)) {
            return online;
        }
        // overridden while the ping was in flight
        let overridden = cell.current().unwrap_or(online);
        debug!(%endpoint, online = overridden, "probe result superseded by override");
        overridden
    }

    /// Override the cached state, e.g. after an observed disconnect. Restarts the TTL.
    pub fn set_online(&self, endpoint: &Endpoint, online: bool) {
        endpoint.liveness().set(online, self.config.ttl(online));
    }

    /// Trace the route to `destination` and back.
    pub async fn trace(&self, destination: &Endpoint) -> Result<Vec<TraceHop>, LivenessError> {
        self.handle_trace(TraceRequest::new(self.local.clone(), destination.clone()))
            .await
    }

    /// Handle a trace request arriving at this node.
    pub async fn handle_trace(&self, request: TraceRequest) -> Result<Vec<TraceHop>, LivenessError> {
        match request.step(&self.local, &self.config.interface) {
            TraceStep::Done(hops) => Ok(hops),
            TraceStep::Forward { next, request } => {
                debug!(%next, hops = request.hops.len(), "forwarding trace");
                match timeout(
                    self.config.trace_timeout(),
                    self.transport.forward_trace(&next, request),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(LivenessError::TraceTimeout {
                        endpoint: next.to_string(),
                        timeout_ms: self.config.trace_timeout_ms,
                    }),
                }
            }
        }
    }
}
