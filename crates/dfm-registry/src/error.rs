//! Registry resolution errors.

use thiserror::Error;

/// Result type used throughout `dfm-registry`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("unknown provider tag: {0}")]
    UnknownProvider(String),

    #[error("provider {provider} does not serve api_class {api_class}")]
    UnknownApiClass { provider: String, api_class: String },

    #[error("no adapter factory registered for implementation class: {0}")]
    UnknownImplementation(String),

    #[error("no provider factory registered for provider_class: {0}")]
    UnknownProviderClass(String),

    #[error("provider construction failed: {0}")]
    ProviderConstruction(String),

    #[error("adapter construction failed: {0}")]
    AdapterConstruction(String),

    #[error("site config malformed: {0}")]
    Config(#[from] toml::de::Error),
}

impl From<Error> for dfm_core::DfmError {
    fn from(e: Error) -> Self {
        match &e {
            Error::UnknownProvider(_)
            | Error::UnknownApiClass { .. }
            | Error::UnknownImplementation(_)
            | Error::UnknownProviderClass(_) => dfm_core::DfmError::missing_implementation(e.to_string()),
            Error::ProviderConstruction(_) | Error::AdapterConstruction(_) => {
                dfm_core::DfmError::resource(e.to_string())
            }
            Error::Config(_) => dfm_core::DfmError::server(e.to_string()),
        }
    }
}
