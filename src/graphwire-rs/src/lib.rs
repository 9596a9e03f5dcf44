//! Graphwire client library
//!
//! HTTP client for a graph database's transactional endpoint: authenticated
//! resource calls, typed result hydration and a begin/run/commit-or-rollback
//! transaction state machine. Errors from the server are classified into the
//! taxonomy in [`GraphError`].

mod config;
mod http;
mod instrument;
mod tx;

pub use config::ClientConfig;
pub use http::{HttpResponse, Resource};
pub use instrument::{RequestCounter, RequestEvent, RequestObserver};
pub use tx::{RecordStream, Session, Transaction, TxBody, TRANSACTION_ENDPOINT};

pub use graphwire_core::{
    classify, GraphError, Node, Path, PropertyMap, Record, Relationship, Result, Value,
};

use std::sync::Arc;

/// Builder for configuring and creating a client.
pub struct GraphClientBuilder {
    config: ClientConfig,
    observers: Vec<Arc<dyn RequestObserver>>,
}

impl GraphClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            observers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach an instrumentation hook; one event fires per request.
    pub fn with_observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn connect(self) -> Result<GraphClient> {
        let authorization =
            graphwire_core::auth::basic_auth(&self.config.username, &self.config.password)?;
        let resource = Resource::new(
            &self.config.base_url,
            authorization,
            self.config.timeout(),
            &self.config.user_agent,
        )?;
        for observer in self.observers {
            resource.observe(observer);
        }
        Ok(GraphClient {
            resource: Arc::new(resource),
        })
    }
}

impl Default for GraphClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry point: holds the authenticated resource client and hands out
/// transaction sessions. Sessions are independent of each other; each binds
/// to one transactional resource at a time.
pub struct GraphClient {
    resource: Arc<Resource>,
}

impl GraphClient {
    pub fn connect(config: ClientConfig) -> Result<Self> {
        Self::builder().with_config(config).connect()
    }

    pub fn builder() -> GraphClientBuilder {
        GraphClientBuilder::new()
    }

    pub fn session(&self) -> Session {
        Session::new(self.resource.clone())
    }

    /// Attach an instrumentation hook to an already-connected client; one
    /// event fires per request from then on.
    pub fn observe(&self, observer: Arc<dyn RequestObserver>) {
        self.resource.observe(observer);
    }

    /// Raw resource access for non-transactional endpoints. Convention:
    /// GET expects 200, creation POST expects 201, DELETE expects 204.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }
}
