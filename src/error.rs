//! Centralized error type for the rackd umbrella crate.

use rackd_plugin::HostError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("No plugin registry configured")]
    MissingRegistry,
}

pub type Result<T> = std::result::Result<T, Error>;
