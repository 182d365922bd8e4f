use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    /// Resource absent, or not yet visible after creation
    #[error("{resource} not found: {message}")]
    NotFound {
        resource: String,
        /// Provider error code, when the provider reported one
        code: Option<String>,
        message: String,
    },

    /// More than one resource matched; needs operator cleanup
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed request, permission denial or quota
    #[error("Provider rejected {operation}: [{code}] {message}")]
    ProviderRejected {
        operation: String,
        code: String,
        message: String,
    },

    #[error("Failed to set attributes: {}", join_errors(.0))]
    AggregateAttribute(Vec<NetworkError>),

    #[error("IPv6 prefix unavailable for vpc {vpc_id}: {source}")]
    Ipv6 {
        vpc_id: String,
        #[source]
        source: Box<NetworkError>,
    },

    #[error("Timed out waiting for {0} to become available")]
    WaitTimeout(String),

    #[error("Gave up on {resource} after {attempts} attempts: {source}")]
    RetriesExhausted {
        resource: String,
        attempts: u32,
        #[source]
        source: Box<NetworkError>,
    },

    #[error("Refusing to mutate unmanaged {0}")]
    Unmanaged(String),

    #[error("Invalid network configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid CIDR: {0}")]
    InvalidCidr(#[from] ipnetwork::IpNetworkError),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<NetworkError>,
    },
}

fn join_errors(errors: &[NetworkError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl NetworkError {
    pub fn not_found(resource: impl Into<String>, message: impl Into<String>) -> Self {
        NetworkError::NotFound {
            resource: resource.into(),
            code: None,
            message: message.into(),
        }
    }

    /// Not-found error carrying the provider's error code
    pub fn not_found_code(
        resource: impl Into<String>,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        NetworkError::NotFound {
            resource: resource.into(),
            code: Some(code.to_string()),
            message: message.into(),
        }
    }

    pub fn rejected(
        operation: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        NetworkError::ProviderRejected {
            operation: operation.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wrap the error with the operation or resource it came from
    pub fn context(self, context: impl Into<String>) -> Self {
        NetworkError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through context wrappers only
    pub fn root(&self) -> &NetworkError {
        match self {
            NetworkError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for absent resources. IPv6 association failures are not
    /// treated as absence: the VPC exists, it is just unusable.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), NetworkError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), NetworkError::Conflict(_))
    }

    /// Provider error code, if any
    pub fn code(&self) -> Option<&str> {
        match self.root() {
            NetworkError::NotFound { code, .. } => code.as_deref(),
            NetworkError::ProviderRejected { code, .. } => Some(code.as_str()),
            NetworkError::RetriesExhausted { source, .. } => source.code(),
            NetworkError::AggregateAttribute(errors) => {
                // Retryable only when every failure shares the same code
                let first = errors.first()?.code()?;
                errors
                    .iter()
                    .all(|e| e.code() == Some(first))
                    .then_some(first)
            }
            _ => None,
        }
    }

    /// Short reason used in status conditions
    pub fn reason(&self) -> &'static str {
        match self.root() {
            NetworkError::NotFound { .. } => "NotFound",
            NetworkError::Conflict(_) => "Conflict",
            NetworkError::ProviderRejected { .. } => "ProviderRejected",
            NetworkError::AggregateAttribute(_) => "AttributeError",
            NetworkError::Ipv6 { .. } => "IPv6Unavailable",
            NetworkError::WaitTimeout(_) => "WaitTimeout",
            NetworkError::RetriesExhausted { .. } => "RetriesExhausted",
            NetworkError::Unmanaged(_) => "Unmanaged",
            NetworkError::InvalidConfiguration(_) | NetworkError::InvalidCidr(_) => {
                "InvalidConfiguration"
            }
            NetworkError::Context { .. } => "Unknown",
        }
    }
}
