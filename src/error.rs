/// AuthError
///
/// Failure of a mutating session operation (sign-in, sign-up, sign-out, profile update).
/// It is handed back to the call site for user-facing presentation and is never
/// written into the shared `Session`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Sign-up attempted with an email that already has an account.
    #[error("an account already exists for this email")]
    EmailAlreadyInUse,

    /// The password does not satisfy the registration policy.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// Rejected before reaching the provider (blank email, empty password).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("this account has been disabled")]
    UserDisabled,

    #[error("too many attempts, try again later")]
    TooManyAttempts,

    /// The federated sign-in window could not be opened.
    #[error("federated sign-in popup was blocked")]
    PopupBlocked,

    /// The user dismissed the federated sign-in window.
    #[error("federated sign-in popup was closed before completion")]
    PopupClosed,

    /// A profile update was requested without a signed-in identity.
    #[error("no identity is signed in")]
    NotSignedIn,

    /// Transport-level failure talking to the identity backend.
    #[error("network error: {0}")]
    Network(String),

    /// Any other provider-reported failure, carrying the provider's code.
    #[error("identity provider error: {0}")]
    Provider(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AuthError::Provider(format!("unexpected response body: {}", e))
        } else {
            AuthError::Network(e.to_string())
        }
    }
}

/// RoleLookupError
///
/// Failure of the role resolution request. The session controller absorbs it:
/// the session settles with an unresolved role and keeps the error for observability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleLookupError {
    /// Connection refused, timeout, TLS failure.
    #[error("role service unreachable: {0}")]
    Transport(String),

    /// Non-success HTTP status from the role service.
    #[error("role service returned HTTP {0}")]
    Status(u16),

    /// The service has no user record for this email.
    #[error("no role record for {0}")]
    NotFound(String),

    /// The body could not be parsed as a role record.
    #[error("malformed role record: {0}")]
    Decode(String),
}

/// RouteError
///
/// Returned when a logical dashboard route cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("unknown dashboard route '{0}'")]
    UnknownRoute(String),

    #[error("route parameter '{0}' is required")]
    MissingParam(&'static str),
}
