use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::{
    error::{AuthError, RoleLookupError},
    identity::{IdentityProviderState, IdentitySubscription},
    models::{Credentials, Identity, Loading, ProfilePatch, Role, RoleRecord, Session},
    roles::RoleResolverState,
};

/// Result of one role lookup, tagged with the resolution cycle and the email captured
/// when it was issued.
type RoleOutcome = (u64, String, Result<RoleRecord, RoleLookupError>);

/// SessionController
///
/// The single owner of the `Session`. A driver task holds the session state, consumes the
/// identity provider's change stream and the completions of role lookups, and publishes
/// every new snapshot on a watch channel. All session writes happen inside that one task,
/// so no lock guards the session itself.
///
/// State machine:
/// `Booting` → first identity event → `Unauthenticated` | `ResolvingRole` → `Ready`,
/// and from any settled state back to `ResolvingRole`/`Unauthenticated` on a later
/// identity change.
///
/// Construct once per process (it spawns onto the current tokio runtime) and share it by
/// reference; see `PortalContext`.
pub struct SessionController {
    provider: IdentityProviderState,
    session: watch::Receiver<Session>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    /// start
    ///
    /// Subscribes to the provider and spawns the driver task. The session starts in
    /// `Booting` and stays there until the provider reports its initial state.
    pub fn start(provider: IdentityProviderState, roles: RoleResolverState) -> Self {
        let (tx, rx) = watch::channel(Session::default());
        let subscription = provider.on_identity_changed();

        let driver = SessionDriver {
            session: Session::default(),
            roles,
            publisher: tx,
            lookups: JoinSet::new(),
            cycle: 0,
        };
        let handle = tokio::spawn(driver.run(subscription));

        Self {
            provider,
            session: rx,
            driver: Mutex::new(Some(handle)),
        }
    }

    /// Latest-value stream of the session. A new receiver immediately holds the current
    /// snapshot.
    pub fn observe(&self) -> watch::Receiver<Session> {
        self.session.clone()
    }

    pub fn current(&self) -> Session {
        self.session.borrow().clone()
    }

    /// Waits until the session is settled (`Ready` or `Unauthenticated`) and returns it.
    ///
    /// If the driver has already stopped (after `shutdown`), nothing can settle the
    /// session any more and the last published snapshot is returned as is, which may
    /// still be `Booting` or `ResolvingRole`.
    pub async fn wait_until_settled(&self) -> Session {
        let mut rx = self.observe();
        match rx.wait_for(Session::is_settled).await {
            Ok(session) => session.clone(),
            // Driver gone: nothing will change any more.
            Err(_) => self.current(),
        }
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let result = self.provider.sign_in_with_password(credentials).await;
        log_outcome("sign_in", &result);
        result
    }

    pub async fn sign_in_federated(&self) -> Result<Identity, AuthError> {
        let result = self.provider.sign_in_federated().await;
        log_outcome("sign_in_federated", &result);
        result
    }

    /// Registers a new account. The password policy is enforced before the provider is
    /// contacted.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        credentials.check_password_policy()?;
        let result = self.provider.sign_up_with_password(credentials).await;
        log_outcome("sign_up", &result);
        result
    }

    /// Signing out while already signed out is not an error.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.provider.sign_out().await?;
        tracing::info!("signed out");
        Ok(())
    }

    /// Updates the signed-in identity's display name and/or photo.
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<Identity, AuthError> {
        let identity = self.current().identity.ok_or(AuthError::NotSignedIn)?;
        if patch.is_empty() {
            return Ok(identity);
        }
        let result = self.provider.update_profile(&identity, &patch).await;
        log_outcome("update_profile", &result);
        result
    }

    /// Stops the driver and releases the identity subscription. In-flight role lookups are
    /// aborted. Idempotent.
    pub async fn shutdown(&self) {
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            // Resolves once the task (and with it the subscription) has been dropped.
            let _ = handle.await;
            tracing::debug!("session driver stopped");
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
    }
}

fn log_outcome(operation: &'static str, result: &Result<Identity, AuthError>) {
    match result {
        Ok(identity) => tracing::info!(operation, email = %identity.email, "auth operation succeeded"),
        Err(error) => tracing::info!(operation, %error, "auth operation failed"),
    }
}

/// SessionDriver
///
/// State owned by the driver task.
struct SessionDriver {
    session: Session,
    roles: RoleResolverState,
    publisher: watch::Sender<Session>,
    lookups: JoinSet<RoleOutcome>,
    // Bumped on every email change; only the lookup of the current cycle may commit.
    cycle: u64,
}

impl SessionDriver {
    async fn run(mut self, mut subscription: IdentitySubscription) {
        let mut identity_open = true;

        loop {
            tokio::select! {
                event = subscription.next(), if identity_open => match event {
                    Some(identity) => self.on_identity(identity),
                    None => {
                        identity_open = false;
                        self.on_provider_closed();
                    }
                },
                Some(joined) = self.lookups.join_next() => {
                    match joined {
                        Ok((cycle, email, result)) => self.on_role(cycle, email, result),
                        Err(e) => tracing::error!(error = %e, "role lookup task failed"),
                    }
                    self.settle_if_orphaned();
                },
                else => break,
            }
        }
        tracing::debug!("session driver finished");
    }

    fn on_identity(&mut self, identity: Option<Identity>) {
        let booting = self.session.loading == Loading::Booting;

        let Some(identity) = identity else {
            if !booting && self.session.identity.is_none() {
                tracing::debug!("sign-out event while already unauthenticated");
                return;
            }
            self.session = Session {
                loading: Loading::Ready,
                ..Session::default()
            };
            tracing::info!("session unauthenticated");
            self.publish();
            return;
        };

        // Role resolution is keyed on the email only: a new identity object with the
        // same email (profile update, token refresh) keeps the role and progress.
        if !booting && self.session.email() == Some(identity.email.as_str()) {
            tracing::debug!(email = %identity.email, "identity refreshed, role kept");
            self.session.identity = Some(identity);
            self.publish();
            return;
        }

        self.cycle += 1;
        let cycle = self.cycle;
        let email = identity.email.clone();
        self.session = Session {
            identity: Some(identity),
            loading: Loading::ResolvingRole,
            ..Session::default()
        };
        tracing::info!(%email, "identity changed, resolving role");
        self.publish();

        let roles = self.roles.clone();
        self.lookups.spawn(async move {
            let result = roles.resolve(&email).await;
            (cycle, email, result)
        });
    }

    fn on_role(&mut self, cycle: u64, email: String, result: Result<RoleRecord, RoleLookupError>) {
        // Only the response of the current cycle may be committed. An older lookup for the
        // same email (A, B, A again) is as stale as one for another email.
        if cycle != self.cycle || self.session.email() != Some(email.as_str()) {
            tracing::warn!(%email, cycle, current = self.cycle, "discarding stale role response");
            return;
        }

        match result {
            Ok(record) => {
                tracing::info!(%email, role = %record.role, "role resolved");
                self.session.role = Some(record.role);
                self.session.user_data = Some(record);
                self.session.last_error = None;
            }
            Err(error) => {
                tracing::warn!(%email, %error, "role lookup failed, continuing unresolved");
                self.session.role = Some(Role::Unresolved);
                self.session.user_data = None;
                self.session.last_error = Some(error);
            }
        }
        self.session.loading = Loading::Ready;
        self.publish();
    }

    /// If no lookup is left in flight but the session still waits for one, the lookup for
    /// the current email died without reporting. Settle unresolved instead of hanging.
    fn settle_if_orphaned(&mut self) {
        if self.lookups.is_empty() && self.session.loading == Loading::ResolvingRole {
            self.session.role = Some(Role::Unresolved);
            self.session.last_error = Some(RoleLookupError::Transport(
                "role lookup did not complete".to_string(),
            ));
            self.session.loading = Loading::Ready;
            self.publish();
        }
    }

    fn on_provider_closed(&mut self) {
        tracing::warn!("identity provider closed its change stream");
        if self.session.loading == Loading::Booting {
            self.session.loading = Loading::Ready;
            self.publish();
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.session.clone());
    }
}
