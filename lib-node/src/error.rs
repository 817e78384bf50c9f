use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("rpc error: {0}")]
    Rpc(#[from] lib_rpc::RpcError),

    #[error("storage error: {0}")]
    Storage(#[from] lib_storage::StorageError),

    #[error("no route to peer {0}")]
    NoRoute(lib_identity::Id),

    #[error("call did not complete: {0:?}")]
    CallIncomplete(lib_rpc::CallState),

    #[error("{0}")]
    BosonError(String),
}
