//! Routing across several providers.
//!
//! Each provider is an independent [`Session`] with its own registry. The
//! [`ProviderSet`] maps every operation name to the provider that declared it
//! first and forwards invocations there.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::protocol::{CallToolResult, MCPResource, ReadResourceResult};
use super::registry::{CapabilityDescriptor, CapabilityRegistry};
use super::schema::{adapt, FunctionDeclaration};
use super::session::{Session, SessionError};
use super::transport::TransportError;
use crate::agent::{InvokeError, OperationInvoker};
use crate::core::ProviderConfig;

/// Error type for provider-set operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderSetError {
    #[error("Provider already connected: {0}")]
    DuplicateProvider(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("No provider serves resource: {0}")]
    UnknownResource(String),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// One connected provider and what it advertised.
#[derive(Debug)]
pub struct ProviderHandle {
    session: Session,
    registry: CapabilityRegistry,
}

impl ProviderHandle {
    /// Start the provider, handshake and run discovery.
    pub async fn connect(config: &ProviderConfig) -> Result<Self, SessionError> {
        let session = Session::start(config).await?;
        Self::from_session(session).await
    }

    /// Run discovery on an initialized session.
    pub async fn from_session(session: Session) -> Result<Self, SessionError> {
        let registry = session.discover().await?;
        tracing::info!(
            provider = %session.name(),
            tools = registry.len(),
            resources = registry.resources().len(),
            "Provider ready"
        );
        Ok(Self { session, registry })
    }

    pub fn name(&self) -> &str {
        self.session.name()
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Read one resource from this provider.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, TransportError> {
        self.session.read_resource(uri).await
    }

    pub async fn close(self) {
        self.session.close().await;
    }
}

#[async_trait]
impl OperationInvoker for ProviderHandle {
    async fn invoke(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, InvokeError> {
        if !self.registry.contains(name) {
            return Err(InvokeError::UnknownOperation(name.to_string()));
        }
        Ok(self.session.invoke(name, arguments).await?)
    }
}

/// Every connected provider plus the operation routing table.
#[derive(Debug, Default)]
pub struct ProviderSet {
    providers: Vec<ProviderHandle>,
    routes: HashMap<String, usize>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect every configured provider.
    ///
    /// A provider that fails to start is reported and left out; the others
    /// are still usable.
    pub async fn connect_all(configs: &[ProviderConfig]) -> (Self, Vec<SessionError>) {
        let mut set = Self::new();
        let mut failures = Vec::new();

        for config in configs {
            if set.provider(&config.name).is_some() {
                tracing::warn!(provider = %config.name, "Ignoring duplicate provider entry");
                continue;
            }

            match ProviderHandle::connect(config).await {
                Ok(handle) => {
                    // Names were checked above.
                    let _ = set.add(handle);
                }
                Err(e) => {
                    tracing::warn!(provider = %config.name, error = %e, "Provider unavailable");
                    failures.push(e);
                }
            }
        }

        (set, failures)
    }

    /// Add a connected provider and route its operations.
    ///
    /// Operations already routed to an earlier provider stay there.
    pub fn add(&mut self, handle: ProviderHandle) -> Result<(), ProviderSetError> {
        if self.provider(handle.name()).is_some() {
            return Err(ProviderSetError::DuplicateProvider(handle.name().to_string()));
        }

        let index = self.providers.len();
        for name in handle.registry.names() {
            if let Some(&owner) = self.routes.get(name) {
                tracing::warn!(
                    operation = name,
                    provider = handle.name(),
                    owner = self.providers[owner].name(),
                    "Operation shadowed by an earlier provider"
                );
                continue;
            }
            self.routes.insert(name.to_string(), index);
        }

        self.providers.push(handle);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn providers(&self) -> &[ProviderHandle] {
        &self.providers
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderHandle> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// Name of the provider an operation is routed to.
    pub fn route(&self, operation: &str) -> Option<&str> {
        self.routes.get(operation).map(|&i| self.providers[i].name())
    }

    /// Routed operations, tagged with their provider, in provider order.
    pub fn descriptors(&self) -> Vec<(&str, &CapabilityDescriptor)> {
        self.providers
            .iter()
            .enumerate()
            .flat_map(|(index, provider)| {
                provider
                    .registry
                    .descriptors()
                    .iter()
                    .filter(move |d| self.routes.get(&d.name) == Some(&index))
                    .map(move |d| (provider.name(), d))
            })
            .collect()
    }

    /// Function declarations for every routed operation.
    pub fn function_declarations(&self) -> Vec<FunctionDeclaration> {
        let descriptors: Vec<CapabilityDescriptor> =
            self.descriptors().into_iter().map(|(_, d)| d.clone()).collect();
        adapt(&descriptors)
    }

    /// All advertised resources, tagged with their provider.
    pub fn resources(&self) -> Vec<(&str, &MCPResource)> {
        self.providers
            .iter()
            .flat_map(|p| p.registry.resources().iter().map(move |r| (p.name(), r)))
            .collect()
    }

    /// Read a resource from `provider`, or from whichever provider advertised it.
    pub async fn read_resource(
        &self,
        uri: &str,
        provider: Option<&str>,
    ) -> Result<ReadResourceResult, ProviderSetError> {
        let handle = match provider {
            Some(name) => self
                .provider(name)
                .ok_or_else(|| ProviderSetError::ProviderNotFound(name.to_string()))?,
            None => self
                .providers
                .iter()
                .find(|p| p.registry.resources().iter().any(|r| r.uri == uri))
                .or_else(|| if self.providers.len() == 1 { self.providers.first() } else { None })
                .ok_or_else(|| ProviderSetError::UnknownResource(uri.to_string()))?,
        };

        Ok(handle.read_resource(uri).await?)
    }

    /// Invoke an operation on a named provider, bypassing routing.
    pub async fn invoke_on(
        &mut self,
        provider: &str,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, ProviderSetError> {
        let handle = self
            .providers
            .iter_mut()
            .find(|p| p.name() == provider)
            .ok_or_else(|| ProviderSetError::ProviderNotFound(provider.to_string()))?;
        Ok(handle.invoke(name, arguments).await?)
    }

    /// Close every session.
    pub async fn close_all(self) {
        for provider in self.providers {
            provider.close().await;
        }
    }
}

#[async_trait]
impl OperationInvoker for ProviderSet {
    async fn invoke(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, InvokeError> {
        let index =
            *self.routes.get(name).ok_or_else(|| InvokeError::UnknownOperation(name.to_string()))?;
        self.providers[index].invoke(name, arguments).await
    }
}
