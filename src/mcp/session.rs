//! An initialized MCP session with one provider.
//!
//! A [`Session`] value only exists once the `initialize` handshake has
//! succeeded, so every other operation is guaranteed to run after it.

use std::time::Duration;

use serde_json::{Map, Value};

use super::protocol::{
    CallToolParams, CallToolResult, ListResourcesPage, ListToolsPage, MCPInitializeParams,
    MCPInitializeResult, MCPResource, ReadResourceParams, ReadResourceResult,
};
use super::registry::{parse_descriptors, CapabilityDescriptor, CapabilityRegistry};
use super::transport::{Transport, TransportError};
use crate::core::ProviderConfig;

/// Upper bound on followed `nextCursor` pages.
const MAX_PAGES: usize = 64;

/// Deadlines applied by a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Handshake deadline
    pub startup_timeout: Duration,
    /// Deadline for every later request
    pub request_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { startup_timeout: Duration::from_secs(30), request_timeout: Duration::from_secs(120) }
    }
}

impl From<&ProviderConfig> for SessionOptions {
    fn from(config: &ProviderConfig) -> Self {
        Self { startup_timeout: config.startup_timeout(), request_timeout: config.request_timeout() }
    }
}

/// Failure to bring a session up.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to start provider '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: TransportError,
    },

    #[error("Provider '{name}' did not complete the handshake within {timeout:?}")]
    StartupTimeout { name: String, timeout: Duration },

    #[error("Provider '{name}' rejected the handshake: {reason}")]
    Handshake { name: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// One initialized session with one provider.
pub struct Session {
    transport: Transport,
    info: MCPInitializeResult,
    options: SessionOptions,
}

impl Session {
    /// Spawn the configured provider process and initialize it.
    pub async fn start(config: &ProviderConfig) -> Result<Self, SessionError> {
        let transport = Transport::spawn(config)
            .map_err(|source| SessionError::Spawn { name: config.name.clone(), source })?;
        Self::initialize(transport, SessionOptions::from(config)).await
    }

    /// Perform the handshake over an open transport.
    ///
    /// On failure the transport is dropped, which also stops a spawned process.
    pub async fn initialize(
        transport: Transport,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let name = transport.name().to_string();
        let params = serde_json::to_value(MCPInitializeParams::default())
            .map_err(TransportError::from)?;

        let raw = match transport.request("initialize", Some(params), options.startup_timeout).await
        {
            Ok(raw) => raw,
            Err(TransportError::Timeout(timeout)) => {
                return Err(SessionError::StartupTimeout { name, timeout });
            }
            Err(TransportError::Rpc(e)) => {
                return Err(SessionError::Handshake { name, reason: e.to_string() });
            }
            Err(TransportError::Closed) => {
                return Err(SessionError::Handshake {
                    name,
                    reason: "channel closed before the handshake completed".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let info: MCPInitializeResult = serde_json::from_value(raw).map_err(|e| {
            SessionError::Handshake { name: name.clone(), reason: format!("invalid initialize result: {}", e) }
        })?;

        transport.notify("notifications/initialized", None).await?;

        tracing::info!(
            provider = %name,
            server = %info.server_info.name,
            protocol = %info.protocol_version,
            "MCP session initialized"
        );

        Ok(Self { transport, info, options })
    }

    /// Provider name.
    pub fn name(&self) -> &str {
        self.transport.name()
    }

    /// What the provider reported during the handshake.
    pub fn server_info(&self) -> &MCPInitializeResult {
        &self.info
    }

    /// Whether the underlying channel is still open.
    pub fn is_open(&self) -> bool {
        !self.transport.is_closed()
    }

    /// Discover the provider's operations, following pagination.
    ///
    /// Malformed descriptors are logged and skipped.
    pub async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>, TransportError> {
        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let raw = self.transport.request("tools/list", params, self.options.request_timeout).await?;
            let page: ListToolsPage = serde_json::from_value(raw)
                .map_err(|e| TransportError::Malformed(format!("tools/list: {}", e)))?;

            entries.extend(page.tools);
            cursor = page.next_cursor.filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        if cursor.is_some() {
            tracing::warn!(provider = %self.name(), "Stopped following tools/list pagination after {} pages", MAX_PAGES);
        }

        let descriptors = parse_descriptors(self.name(), &entries);
        tracing::debug!(
            provider = %self.name(),
            advertised = entries.len(),
            registered = descriptors.len(),
            "Discovered capabilities"
        );
        Ok(descriptors)
    }

    /// List the provider's named content.
    ///
    /// A provider that did not advertise resource support yields an empty list.
    pub async fn list_resources(&self) -> Result<Vec<MCPResource>, TransportError> {
        if self.info.capabilities.resources.is_none() {
            return Ok(Vec::new());
        }

        let mut resources = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let raw = match self
                .transport
                .request("resources/list", params, self.options.request_timeout)
                .await
            {
                Ok(raw) => raw,
                Err(TransportError::Rpc(e)) => {
                    tracing::debug!(provider = %self.name(), error = %e, "resources/list unsupported");
                    return Ok(resources);
                }
                Err(e) => return Err(e),
            };
            let page: ListResourcesPage = serde_json::from_value(raw)
                .map_err(|e| TransportError::Malformed(format!("resources/list: {}", e)))?;

            resources.extend(page.resources);
            cursor = page.next_cursor.filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        Ok(resources)
    }

    /// Discover operations and resources and build the registry in one step.
    pub async fn discover(&self) -> Result<CapabilityRegistry, TransportError> {
        let descriptors = self.list_capabilities().await?;
        let resources = self.list_resources().await?;
        Ok(CapabilityRegistry::new(descriptors, resources))
    }

    /// Read one named resource.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, TransportError> {
        let params = serde_json::to_value(ReadResourceParams { uri: uri.to_string() })?;
        let raw = self
            .transport
            .request("resources/read", Some(params), self.options.request_timeout)
            .await?;
        serde_json::from_value(raw)
            .map_err(|e| TransportError::Malformed(format!("resources/read: {}", e)))
    }

    /// Call one operation.
    ///
    /// Takes `&mut self`: a session never has two invocations in flight. A
    /// JSON-RPC error from the provider is an in-band error result, not a
    /// transport failure.
    pub async fn invoke(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, TransportError> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        })?;

        tracing::debug!(provider = %self.name(), operation = name, "Invoking operation");

        match self.transport.request("tools/call", Some(params), self.options.request_timeout).await {
            Ok(raw) => serde_json::from_value(raw)
                .map_err(|e| TransportError::Malformed(format!("tools/call: {}", e))),
            Err(TransportError::Rpc(e)) => Ok(CallToolResult::error(e.message)),
            Err(e) => Err(e),
        }
    }

    /// Close the session, stopping the provider if this session started it.
    pub async fn close(self) {
        tracing::debug!(provider = %self.name(), "Closing MCP session");
        self.transport.close().await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name())
            .field("server", &self.info.server_info.name)
            .field("open", &self.is_open())
            .finish()
    }
}
