//! Top-level error type

use hub_bus::BusError;

use crate::metadata::MetadataError;
use crate::plugin::PluginError;
use crate::registry::RegistryError;
use crate::server::RpcError;
use crate::storage::StorageError;

/// Any error the hub can surface to its embedder
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl From<figment::Error> for Error {
    fn from(error: figment::Error) -> Self {
        Error::Config(Box::new(error))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
