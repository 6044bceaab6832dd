//! Reaching the directory of another silo.

pub mod channel;
pub mod rpc;

pub use channel::{InProcessChannel, RemoteDirectoryChannel};
pub use rpc::{
    decode_frame, dispatch, encode_frame, serve_frame, DirectoryRequest, DirectoryResponse,
    RpcChannel, RpcDirectoryClient, RpcTransport,
};
