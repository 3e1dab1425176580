use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not determine the local hostname: {0}")]
    Hostname(std::io::Error),

    #[error("could not determine a home directory to place the downloads folder in")]
    NoHomeDir,

    #[error(transparent)]
    Discovery(#[from] la_vak_discovery::DiscoveryError),

    #[error(transparent)]
    Transport(#[from] la_vak_transport::TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
