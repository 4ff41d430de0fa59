use snafu::{Location, Snafu};

use crate::console::ConsoleError;
use crate::store::StoreError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ApplicationError {
    /// could not read the configuration from the environment
    ConfigLoad {
        source: envy::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not initialize the logger
    InitializeLogger {
        source: tracing::subscriber::SetGlobalDefaultError,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not build the shared HTTP client
    HttpClient {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not open the subscription store snapshot
    LoadStore {
        source: StoreError,
        #[snafu(implicit)]
        location: Location,
    },

    /// the operator console quit with an error
    Console {
        source: ConsoleError,
        #[snafu(implicit)]
        location: Location,
    },
}
