use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("Socket closed by remote")]
    PeerClosed,

    #[error("Socket error ({:?}): {}", .0.kind(), .0)]
    Transport(std::io::Error),

    #[error("Packet corrupted. Detail: \"{0}\"")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("Packet corrupted. Detail: \"{0}\"")]
    Json(#[from] serde_json::Error),

    #[error("Packet corrupted. Detail: \"no 3D viewport available\"")]
    MissingViewport,

    #[error("Packet corrupted. Detail: \"no object to bind\"")]
    MissingObject,

    #[error("Packet corrupted. Detail: \"{0}\"")]
    MalformedTransform(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl LinkError {
    /// Closing the connection from the remote side is a normal way for a session to end.
    pub fn is_informational(&self) -> bool {
        matches!(self, LinkError::PeerClosed)
    }
}

impl From<toml::de::Error> for LinkError {
    fn from(error: toml::de::Error) -> Self {
        LinkError::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
