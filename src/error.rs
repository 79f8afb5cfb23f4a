use thiserror::Error;

/// Library result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the relay.
#[derive(Error, Debug)]
pub enum Error {
    #[error("connection: {0}")]
    Connection(#[from] ConnectionError),

    #[error("pairing: {0}")]
    Pairing(#[from] PairingError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("send: {0}")]
    Send(#[from] SendError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("webhook: {0}")]
    Webhook(#[from] WebhookError),

    #[error("binary protocol: {0}")]
    Binary(String),

    #[error("not connected")]
    NotConnected,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Connection-related errors.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("websocket: {0}")]
    WebSocket(String),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("timeout")]
    Timeout,

    #[error("disconnected")]
    Disconnected,
}

/// Pairing-related errors.
#[derive(Error, Debug)]
pub enum PairingError {
    #[error("invalid device identity HMAC")]
    InvalidDeviceIdentityHmac,

    #[error("invalid device signature")]
    InvalidDeviceSignature,

    #[error("protocol: {0}")]
    Protocol(String),
}

/// Credential store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("save failed: {0}")]
    Save(String),

    #[error("load failed: {0}")]
    Load(String),

    #[error("corrupt credentials: {0}")]
    Corrupt(String),
}

/// Send message errors.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("server error: {0}")]
    Server(String),
}

/// Webhook delivery errors. Logged by the forwarder, never propagated.
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("client: {0}")]
    Client(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("timed out")]
    Timeout,

    #[error("webhook responded with status {0}")]
    Status(u16),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid webhook url {url:?}: {reason}")]
    InvalidWebhookUrl { url: String, reason: String },

    #[error("invalid listen address: {0}")]
    InvalidListenAddr(String),
}
