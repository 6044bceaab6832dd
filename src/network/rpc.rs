//! RPC message types for forwarding directory calls between silos.
//!
//! Requests and responses are bincode encoded and framed with a 4 byte
//! big-endian length prefix. Errors travel as the [`Error`] value itself, so
//! a caller sees the same error a local call would have produced.

use crate::directory::GrainDirectory;
use crate::error::{Error, NetworkError, Result};
use crate::network::channel::RemoteDirectoryChannel;
use crate::types::{AddressAndTag, GrainAddress, GrainId, SiloAddress, UnregistrationCause};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// A directory call addressed to a remote owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryRequest {
    Register {
        address: GrainAddress,
        previous: Option<GrainAddress>,
        hop_count: u32,
    },
    Unregister {
        address: GrainAddress,
        cause: UnregistrationCause,
        hop_count: u32,
    },
    UnregisterMany {
        addresses: Vec<GrainAddress>,
        cause: UnregistrationCause,
        hop_count: u32,
    },
    Lookup {
        grain: GrainId,
        hop_count: u32,
    },
    Delete {
        grain: GrainId,
        hop_count: u32,
    },
}

impl DirectoryRequest {
    /// Operation name used in logs.
    pub fn operation(&self) -> &'static str {
        match self {
            DirectoryRequest::Register { .. } => "register",
            DirectoryRequest::Unregister { .. } => "unregister",
            DirectoryRequest::UnregisterMany { .. } => "unregister_many",
            DirectoryRequest::Lookup { .. } => "lookup",
            DirectoryRequest::Delete { .. } => "delete",
        }
    }

    /// Hop count carried by the request.
    pub fn hop_count(&self) -> u32 {
        match self {
            DirectoryRequest::Register { hop_count, .. }
            | DirectoryRequest::Unregister { hop_count, .. }
            | DirectoryRequest::UnregisterMany { hop_count, .. }
            | DirectoryRequest::Lookup { hop_count, .. }
            | DirectoryRequest::Delete { hop_count, .. } => *hop_count,
        }
    }
}

/// Reply to a [`DirectoryRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryResponse {
    /// Result of a register or lookup.
    Address(AddressAndTag),
    /// Unregister or delete completed.
    Ack,
    /// The owner failed the call.
    Error(Error),
}

impl DirectoryResponse {
    fn into_address(self) -> Result<AddressAndTag> {
        match self {
            DirectoryResponse::Address(result) => Ok(result),
            DirectoryResponse::Error(e) => Err(e),
            DirectoryResponse::Ack => Err(unexpected("address", "ack")),
        }
    }

    fn into_ack(self) -> Result<()> {
        match self {
            DirectoryResponse::Ack => Ok(()),
            DirectoryResponse::Error(e) => Err(e),
            DirectoryResponse::Address(_) => Err(unexpected("ack", "address")),
        }
    }
}

fn unexpected(expected: &str, got: &str) -> Error {
    Error::RemoteError(format!("expected {} response, got {}", expected, got))
}

/// Encode a message as a length-prefixed frame.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Bytes> {
    let data = bincode::serialize(message)?;
    let len = u32::try_from(data.len())
        .map_err(|_| NetworkError::Serialization(format!("frame of {} bytes", data.len())))?;

    let mut framed = BytesMut::with_capacity(4 + data.len());
    framed.put_u32(len);
    framed.put_slice(&data);
    Ok(framed.freeze())
}

/// Decode a length-prefixed frame.
pub fn decode_frame<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    if frame.len() < 4 {
        return Err(NetworkError::Deserialization("truncated frame header".into()).into());
    }
    let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    let body = &frame[4..];
    if body.len() != len {
        return Err(NetworkError::Deserialization(format!(
            "frame length {} does not match body of {} bytes",
            len,
            body.len()
        ))
        .into());
    }
    bincode::deserialize(body).map_err(|e| NetworkError::Deserialization(e.to_string()).into())
}

/// Serve `request` against `directory`.
pub async fn dispatch(directory: &dyn GrainDirectory, request: DirectoryRequest) -> DirectoryResponse {
    trace!(operation = request.operation(), hop_count = request.hop_count(), "Dispatching directory request");

    let result = match request {
        DirectoryRequest::Register {
            address,
            previous,
            hop_count,
        } => directory
            .register(address, previous, hop_count)
            .await
            .map(DirectoryResponse::Address),
        DirectoryRequest::Unregister {
            address,
            cause,
            hop_count,
        } => directory
            .unregister(address, cause, hop_count)
            .await
            .map(|_| DirectoryResponse::Ack),
        DirectoryRequest::UnregisterMany {
            addresses,
            cause,
            hop_count,
        } => directory
            .unregister_many(addresses, cause, hop_count)
            .await
            .map(|_| DirectoryResponse::Ack),
        DirectoryRequest::Lookup { grain, hop_count } => directory
            .lookup(grain, hop_count)
            .await
            .map(DirectoryResponse::Address),
        DirectoryRequest::Delete { grain, hop_count } => directory
            .delete(grain, hop_count)
            .await
            .map(|_| DirectoryResponse::Ack),
    };

    result.unwrap_or_else(DirectoryResponse::Error)
}

/// Decode a request frame, serve it, and encode the response frame.
pub async fn serve_frame(directory: &dyn GrainDirectory, frame: &[u8]) -> Result<Bytes> {
    let request: DirectoryRequest = decode_frame(frame)?;
    let response = dispatch(directory, request).await;
    encode_frame(&response)
}

/// Carries request frames to a silo and returns its response frame.
#[async_trait::async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send `frame` to `target` and wait for the reply.
    async fn call(&self, target: &SiloAddress, frame: Bytes) -> Result<Bytes>;
}

/// [`GrainDirectory`] of a remote silo reached through an [`RpcTransport`].
pub struct RpcDirectoryClient {
    target: SiloAddress,
    transport: Arc<dyn RpcTransport>,
}

impl RpcDirectoryClient {
    /// Create a client for `target`.
    pub fn new(target: SiloAddress, transport: Arc<dyn RpcTransport>) -> Self {
        Self { target, transport }
    }

    /// The silo this client talks to.
    pub fn target(&self) -> &SiloAddress {
        &self.target
    }

    async fn call(&self, request: DirectoryRequest) -> Result<DirectoryResponse> {
        let frame = encode_frame(&request)?;
        let reply = self.transport.call(&self.target, frame).await?;
        decode_frame(&reply)
    }
}

#[async_trait::async_trait]
impl GrainDirectory for RpcDirectoryClient {
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<GrainAddress>,
        hop_count: u32,
    ) -> Result<AddressAndTag> {
        self.call(DirectoryRequest::Register {
            address,
            previous,
            hop_count,
        })
        .await?
        .into_address()
    }

    async fn unregister(
        &self,
        address: GrainAddress,
        cause: UnregistrationCause,
        hop_count: u32,
    ) -> Result<()> {
        self.call(DirectoryRequest::Unregister {
            address,
            cause,
            hop_count,
        })
        .await?
        .into_ack()
    }

    async fn unregister_many(
        &self,
        addresses: Vec<GrainAddress>,
        cause: UnregistrationCause,
        hop_count: u32,
    ) -> Result<()> {
        self.call(DirectoryRequest::UnregisterMany {
            addresses,
            cause,
            hop_count,
        })
        .await?
        .into_ack()
    }

    async fn lookup(&self, grain: GrainId, hop_count: u32) -> Result<AddressAndTag> {
        self.call(DirectoryRequest::Lookup { grain, hop_count })
            .await?
            .into_address()
    }

    async fn delete(&self, grain: GrainId, hop_count: u32) -> Result<()> {
        self.call(DirectoryRequest::Delete { grain, hop_count })
            .await?
            .into_ack()
    }
}

/// Channel that reaches every silo through one [`RpcTransport`].
pub struct RpcChannel {
    transport: Arc<dyn RpcTransport>,
}

impl RpcChannel {
    /// Create a channel over `transport`.
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }
}

impl RemoteDirectoryChannel for RpcChannel {
    fn directory(&self, silo: &SiloAddress) -> Result<Arc<dyn GrainDirectory>> {
        Ok(Arc::new(RpcDirectoryClient::new(
            silo.clone(),
            self.transport.clone(),
        )))
    }
}
