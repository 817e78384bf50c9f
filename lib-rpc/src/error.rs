use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("frame too short: {len} bytes, minimum is {min}")]
    FrameTooShort { len: usize, min: usize },

    #[error("sender is blacklisted or flagged suspicious")]
    Banned,

    #[error("too many pending calls ({0}, maximum 1024)")]
    TooManyPendingCalls(usize),

    #[error("crypto error: {0}")]
    Crypto(#[from] lib_crypto::CryptoError),

    #[error("message encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("call was canceled")]
    Canceled,

    #[error("call timed out")]
    Timeout,
}
