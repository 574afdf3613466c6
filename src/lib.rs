use std::sync::Arc;

// --- Module Structure ---

// Identity, session and authorization core.
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod roles;
pub mod session;

// Client-side routing policy (guard, dashboard namespaces).
pub mod routes;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AuthError, RoleLookupError, RouteError};
pub use identity::{
    IdentityProvider, IdentityProviderState, InMemoryIdentityProvider, RestIdentityProvider,
};
pub use models::{Credentials, Identity, Loading, ProfilePatch, Role, RoleRecord, Session};
pub use roles::{Capability, HttpRoleResolver, MockRoleResolver, RoleResolver, RoleResolverState};
pub use routes::dashboard::{DashboardContext, DashboardRoute, RouteNamespace, build_route};
pub use routes::guard::{GuardDecision, RouteGuard};
pub use session::SessionController;

/// PortalContext
///
/// The one container the UI shell builds at startup and hands to every view by reference.
/// It owns the session controller (there is no module-level global) and the guard policy.
#[derive(Clone)]
pub struct PortalContext {
    /// Session Controller: single owner of the session state.
    session: Arc<SessionController>,
    /// Route Guard configured with the login/landing paths.
    guard: RouteGuard,
    /// Configuration: the loaded, immutable settings.
    config: AppConfig,
}

impl PortalContext {
    /// new
    ///
    /// Starts the session controller over the given adapters. Must run inside a tokio
    /// runtime.
    pub fn new(
        config: AppConfig,
        provider: IdentityProviderState,
        roles: RoleResolverState,
    ) -> Self {
        let session = Arc::new(SessionController::start(provider, roles));
        let guard = RouteGuard::new(&config.login_path, &config.landing_path);
        Self {
            session,
            guard,
            config,
        }
    }

    /// from_config
    ///
    /// Builds the production wiring: REST identity backend and HTTP role service.
    pub fn from_config(config: AppConfig) -> Result<Self, AuthError> {
        let provider = Arc::new(RestIdentityProvider::new(
            &config.identity_api_url,
            &config.identity_api_key,
            config.request_timeout,
        )?) as IdentityProviderState;

        let roles = Arc::new(
            HttpRoleResolver::new(
                &config.role_service_url,
                config.role_service_token.clone(),
                config.request_timeout,
            )
            .map_err(|e| AuthError::Network(e.to_string()))?,
        ) as RoleResolverState;

        Ok(Self::new(config, provider, roles))
    }

    /// The session surface for views: state snapshots, the change stream and the
    /// sign-in/sign-up/sign-out/profile operations.
    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Namespace-bound route builders for the view mounted at `path`.
    pub fn route_namespace(&self, path: &str) -> DashboardContext {
        DashboardContext::for_path(path)
    }

    /// Guard decision for a protected view at `path`, against the current session.
    pub fn guard(&self, path: &str) -> GuardDecision {
        self.guard.decide(&self.session.current(), path)
    }

    pub fn route_guard(&self) -> &RouteGuard {
        &self.guard
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Tears the session down: the identity subscription is released and no further
    /// session writes happen.
    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }
}
