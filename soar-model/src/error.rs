use std::fmt::{self, Display};

/// An identity accessor was called on an asset that lacks the field.
///
/// Callers must not substitute defaults for identity fields: a scan aimed at
/// a guessed host is a scan aimed at the wrong target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPropertyError {
    property: &'static str,
    asset: String,
}

impl MissingPropertyError {
    pub fn new(property: &'static str, asset: impl Into<String>) -> Self {
        Self {
            property,
            asset: asset.into(),
        }
    }

    pub fn property(&self) -> &'static str {
        self.property
    }

    /// JSON rendering of the offending asset.
    pub fn asset(&self) -> &str {
        &self.asset
    }
}

impl Display for MissingPropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing property: {} on {}", self.property, self.asset)
    }
}

impl std::error::Error for MissingPropertyError {}

/// Errors produced by model constructors and conversions.
#[derive(Debug)]
pub enum ModelError {
    MissingProperty(MissingPropertyError),
    InvalidPort(u32),
    InvalidProtocol(String),
    Json(serde_json::Error),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::MissingProperty(err) => write!(f, "{err}"),
            ModelError::InvalidPort(port) => {
                write!(f, "invalid port {port}: expected 1-65535")
            }
            ModelError::InvalidProtocol(raw) => {
                write!(f, "invalid protocol '{raw}': expected tcp or udp")
            }
            ModelError::Json(err) => write!(f, "invalid asset payload: {err}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::MissingProperty(err) => Some(err),
            ModelError::Json(err) => Some(err),
            ModelError::InvalidPort(_) | ModelError::InvalidProtocol(_) => None,
        }
    }
}

impl From<MissingPropertyError> for ModelError {
    fn from(err: MissingPropertyError) -> Self {
        ModelError::MissingProperty(err)
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
