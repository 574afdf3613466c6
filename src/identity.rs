use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    error::AuthError,
    models::{Credentials, Identity, ProfilePatch},
};

// 1. IdentityProvider Contract
/// IdentityProvider
///
/// Abstract contract of the federated identity backend. The session controller only talks
/// to this trait, so the REST adapter can be swapped for the in-memory one in tests and
/// local runs without touching the controller.
///
/// Every successful mutation is also reported through the identity-change stream; the
/// stream, not the return value, is what drives the session.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Subscribes to identity changes. Once the provider knows its initial state, a new
    /// subscriber immediately receives it. Dropping the subscription unsubscribes.
    fn on_identity_changed(&self) -> IdentitySubscription;

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Identity, AuthError>;

    /// Interactive federated sign-in (popup flow).
    async fn sign_in_federated(&self) -> Result<Identity, AuthError>;

    async fn sign_up_with_password(&self, credentials: &Credentials) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Applies `patch` to the signed-in `identity` and returns the updated identity.
    async fn update_profile(
        &self,
        identity: &Identity,
        patch: &ProfilePatch,
    ) -> Result<Identity, AuthError>;
}

/// IdentityProviderState
///
/// The shared handle type through which the controller and the glue hold the provider.
pub type IdentityProviderState = Arc<dyn IdentityProvider>;

/// IdentitySubscription
///
/// Receiving end of one identity-change subscription. `None` from `next` means the
/// provider is gone; `Some(None)` means signed out.
pub struct IdentitySubscription {
    rx: mpsc::UnboundedReceiver<Option<Identity>>,
}

impl IdentitySubscription {
    pub async fn next(&mut self) -> Option<Option<Identity>> {
        self.rx.recv().await
    }
}

// 2. Shared fan-out used by the adapters
/// IdentityHub
///
/// Remembers the provider's current identity and fans every change out to the live
/// subscribers. Subscribers whose receiver was dropped are pruned on the next publish.
pub struct IdentityHub {
    inner: Mutex<HubState>,
}

struct HubState {
    // Outer `None`: the provider has not restored its session yet.
    current: Option<Option<Identity>>,
    subscribers: Vec<mpsc::UnboundedSender<Option<Identity>>>,
}

impl IdentityHub {
    /// A hub that has not yet learned its initial state. Subscribers get nothing until
    /// the first `publish`.
    pub fn pending() -> Self {
        Self {
            inner: Mutex::new(HubState {
                current: None,
                subscribers: Vec::new(),
            }),
        }
    }

    /// A hub whose initial state is already known.
    pub fn restored(current: Option<Identity>) -> Self {
        Self {
            inner: Mutex::new(HubState {
                current: Some(current),
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> IdentitySubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.lock();
        if let Some(current) = &state.current {
            // The receiver is alive right here, the send cannot fail.
            let _ = tx.send(current.clone());
        }
        state.subscribers.push(tx);
        IdentitySubscription { rx }
    }

    pub fn publish(&self, identity: Option<Identity>) {
        let mut state = self.inner.lock();
        state.current = Some(identity.clone());
        state
            .subscribers
            .retain(|tx| tx.send(identity.clone()).is_ok());
        tracing::debug!(
            subscribers = state.subscribers.len(),
            signed_in = identity.is_some(),
            "identity change published"
        );
    }

    pub fn current(&self) -> Option<Identity> {
        self.inner.lock().current.clone().flatten()
    }

    /// Drops every subscriber's sender; their streams end after the queued events.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        tracing::debug!(subscribers = state.subscribers.len(), "identity hub closed");
        state.subscribers.clear();
    }

    /// Number of subscriptions that are still held by someone.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.inner.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

// 3. The Real Implementation (Identity-Toolkit style REST backend)
/// RestIdentityProvider
///
/// Talks to an Identity-Toolkit compatible REST API (`accounts:signUp`,
/// `accounts:signInWithPassword`, `accounts:update`). The provider keeps the id token of
/// the signed-in account in memory only; nothing is persisted here.
///
/// There is no interactive browser in this process, so federated sign-in reports
/// `AuthError::PopupBlocked`.
pub struct RestIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    hub: IdentityHub,
    id_token: Mutex<Option<String>>,
}

/// Response shape shared by signUp, signInWithPassword and update.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    display_name: Option<String>,
    // signInWithPassword reports the avatar as `profilePicture`, update as `photoUrl`.
    profile_picture: Option<String>,
    photo_url: Option<String>,
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl AccountResponse {
    fn into_identity(self, fallback_email: &str) -> (Identity, Option<String>) {
        let email = if self.email.is_empty() {
            fallback_email.to_string()
        } else {
            self.email
        };
        let identity = Identity {
            id: self.local_id,
            email,
            display_name: self.display_name.filter(|name| !name.is_empty()),
            avatar_url: self
                .photo_url
                .or(self.profile_picture)
                .filter(|url| !url.is_empty()),
        };
        (identity, self.id_token)
    }
}

impl RestIdentityProvider {
    /// new
    ///
    /// Builds the adapter. `base_url` is the API root (for example
    /// `https://identitytoolkit.googleapis.com`), `api_key` the project's web key.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            hub: IdentityHub::restored(None),
            id_token: Mutex::new(None),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1/accounts:{}", self.base_url, method)
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<AccountResponse, AuthError> {
        tracing::debug!(method, "identity backend request");

        let response = self
            .client
            .post(self.endpoint(method))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<AccountResponse>().await?);
        }

        // The backend reports failures as `{"error": {"message": "EMAIL_EXISTS", ...}}`.
        let error = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => map_provider_error(&envelope.error.message),
            Err(_) => AuthError::Provider(format!("HTTP {}", status.as_u16())),
        };
        tracing::debug!(method, status = status.as_u16(), %error, "identity backend rejected request");
        Err(error)
    }

    fn establish(&self, response: AccountResponse, email: &str) -> Identity {
        let (identity, token) = response.into_identity(email);
        if let Some(token) = token {
            *self.id_token.lock() = Some(token);
        }
        self.hub.publish(Some(identity.clone()));
        identity
    }
}

/// map_provider_error
///
/// Translates the backend's error codes into the `AuthError` taxonomy.
fn map_provider_error(message: &str) -> AuthError {
    // Some codes carry a detail suffix, e.g. "WEAK_PASSWORD : Password should be ...".
    let code = message.split(':').next().unwrap_or(message).trim();
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            AuthError::InvalidCredentials
        }
        "EMAIL_EXISTS" => AuthError::EmailAlreadyInUse,
        "WEAK_PASSWORD" => AuthError::WeakPassword(message.to_string()),
        "INVALID_EMAIL" | "MISSING_PASSWORD" | "MISSING_EMAIL" => {
            AuthError::InvalidInput(code.to_string())
        }
        "USER_DISABLED" => AuthError::UserDisabled,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::TooManyAttempts,
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" => AuthError::NotSignedIn,
        _ => AuthError::Provider(code.to_string()),
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    fn on_identity_changed(&self) -> IdentitySubscription {
        self.hub.subscribe()
    }

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let response = self
            .call(
                "signInWithPassword",
                serde_json::json!({
                    "email": credentials.email(),
                    "password": credentials.password(),
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(self.establish(response, credentials.email()))
    }

    async fn sign_in_federated(&self) -> Result<Identity, AuthError> {
        tracing::warn!("federated sign-in requested but no interactive popup flow is available");
        Err(AuthError::PopupBlocked)
    }

    async fn sign_up_with_password(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let response = self
            .call(
                "signUp",
                serde_json::json!({
                    "email": credentials.email(),
                    "password": credentials.password(),
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(self.establish(response, credentials.email()))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        // Sign-out is local: drop the token and tell subscribers.
        *self.id_token.lock() = None;
        self.hub.publish(None);
        Ok(())
    }

    async fn update_profile(
        &self,
        identity: &Identity,
        patch: &ProfilePatch,
    ) -> Result<Identity, AuthError> {
        let token = self.id_token.lock().clone().ok_or(AuthError::NotSignedIn)?;

        let mut body = serde_json::json!({ "idToken": token, "returnSecureToken": true });
        if let Some(name) = &patch.display_name {
            body["displayName"] = serde_json::Value::String(name.clone());
        }
        if let Some(url) = &patch.photo_url {
            body["photoUrl"] = serde_json::Value::String(url.clone());
        }

        let response = self.call("update", body).await?;
        let (mut updated, token) = response.into_identity(&identity.email);
        // `update` echoes only what it knows; keep anything it left out.
        updated.display_name = updated.display_name.or_else(|| identity.display_name.clone());
        updated.avatar_url = updated.avatar_url.or_else(|| identity.avatar_url.clone());
        if let Some(token) = token {
            *self.id_token.lock() = Some(token);
        }
        self.hub.publish(Some(updated.clone()));
        Ok(updated)
    }
}

// 4. The In-Memory Implementation (tests and local runs)
/// InMemoryIdentityProvider
///
/// A deterministic, in-process identity backend. Accounts live in a map keyed by email,
/// the federated result is scripted, and tests can inject raw identity events with `emit`
/// to drive the session controller through arbitrary sequences.
pub struct InMemoryIdentityProvider {
    hub: IdentityHub,
    accounts: Mutex<HashMap<String, Account>>,
    federated: Mutex<Result<Identity, AuthError>>,
    // One-shot failure returned by the next mutating call.
    next_failure: Mutex<Option<AuthError>>,
}

struct Account {
    password: Zeroizing<String>,
    identity: Identity,
}

impl Account {
    fn new(email: &str, password: &str, display_name: Option<&str>) -> Self {
        Self {
            password: Zeroizing::new(password.to_string()),
            identity: Identity {
                id: Uuid::new_v4().simple().to_string(),
                email: email.to_string(),
                display_name: display_name.map(str::to_string),
                avatar_url: None,
            },
        }
    }
}

impl InMemoryIdentityProvider {
    /// A provider that has already restored a signed-out state.
    pub fn new() -> Self {
        Self::with_hub(IdentityHub::restored(None))
    }

    /// A provider that has not reported its initial state yet; sessions built on it
    /// stay in `Booting` until `emit` is called.
    pub fn pending() -> Self {
        Self::with_hub(IdentityHub::pending())
    }

    fn with_hub(hub: IdentityHub) -> Self {
        Self {
            hub,
            accounts: Mutex::new(HashMap::new()),
            federated: Mutex::new(Err(AuthError::PopupClosed)),
            next_failure: Mutex::new(None),
        }
    }

    /// Registers an account without signing it in and returns its identity.
    pub fn add_account(&self, email: &str, password: &str, display_name: Option<&str>) -> Identity {
        let account = Account::new(email, password, display_name);
        let identity = account.identity.clone();
        self.accounts.lock().insert(email.to_string(), account);
        identity
    }

    /// Scripts the outcome of the next `sign_in_federated` calls.
    pub fn set_federated_result(&self, result: Result<Identity, AuthError>) {
        *self.federated.lock() = result;
    }

    /// Makes the next mutating call fail with `error` (simulates outages).
    pub fn fail_next_with(&self, error: AuthError) {
        *self.next_failure.lock() = Some(error);
    }

    /// Publishes a raw identity event, as if the backend had changed state on its own.
    pub fn emit(&self, identity: Option<Identity>) {
        self.hub.publish(identity);
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.hub.current()
    }

    /// Ends every open identity-change stream, as if the backend had gone away.
    pub fn close(&self) {
        self.hub.close();
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn take_failure(&self) -> Result<(), AuthError> {
        match self.next_failure.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    fn on_identity_changed(&self) -> IdentitySubscription {
        self.hub.subscribe()
    }

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        self.take_failure()?;
        let identity = {
            let accounts = self.accounts.lock();
            let account = accounts
                .get(credentials.email())
                .ok_or(AuthError::InvalidCredentials)?;
            if account.password.as_str() != credentials.password() {
                return Err(AuthError::InvalidCredentials);
            }
            account.identity.clone()
        };
        self.hub.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_federated(&self) -> Result<Identity, AuthError> {
        self.take_failure()?;
        let identity = self.federated.lock().clone()?;
        self.hub.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up_with_password(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        self.take_failure()?;
        let identity = match self.accounts.lock().entry(credentials.email().to_string()) {
            Entry::Occupied(_) => return Err(AuthError::EmailAlreadyInUse),
            Entry::Vacant(slot) => {
                let account = Account::new(credentials.email(), credentials.password(), None);
                slot.insert(account).identity.clone()
            }
        };
        self.hub.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.take_failure()?;
        self.hub.publish(None);
        Ok(())
    }

    async fn update_profile(
        &self,
        identity: &Identity,
        patch: &ProfilePatch,
    ) -> Result<Identity, AuthError> {
        self.take_failure()?;
        match self.hub.current() {
            Some(current) if current.id == identity.id => {}
            _ => return Err(AuthError::NotSignedIn),
        }
        let updated = patch.apply_to(identity);
        if let Some(account) = self.accounts.lock().get_mut(&updated.email) {
            account.identity = updated.clone();
        }
        self.hub.publish(Some(updated.clone()));
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_codes_map_to_auth_errors() {
        assert_eq!(map_provider_error("EMAIL_EXISTS"), AuthError::EmailAlreadyInUse);
        assert_eq!(
            map_provider_error("INVALID_LOGIN_CREDENTIALS"),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            map_provider_error("TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"),
            AuthError::TooManyAttempts
        );
        assert!(matches!(
            map_provider_error("WEAK_PASSWORD : Password should be at least 6 characters"),
            AuthError::WeakPassword(_)
        ));
        assert_eq!(
            map_provider_error("OPERATION_NOT_ALLOWED"),
            AuthError::Provider("OPERATION_NOT_ALLOWED".to_string())
        );
    }

    #[tokio::test]
    async fn pending_hub_delivers_nothing_until_first_publish() {
        let hub = IdentityHub::pending();
        let mut sub = hub.subscribe();
        assert!(sub.rx.try_recv().is_err());

        hub.publish(None);
        assert_eq!(sub.next().await, Some(None));
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let hub = IdentityHub::restored(None);
        let first = hub.subscribe();
        let _second = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        drop(first);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn closed_hub_ends_streams() {
        let hub = IdentityHub::restored(None);
        let mut sub = hub.subscribe();
        hub.close();

        assert_eq!(sub.next().await, Some(None));
        assert_eq!(sub.next().await, None);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sign_ups_for_one_email_create_one_account() {
        let provider = Arc::new(InMemoryIdentityProvider::new());
        let mut tasks = Vec::new();
        for i in 0..8 {
            let provider = provider.clone();
            tasks.push(tokio::spawn(async move {
                let credentials =
                    Credentials::try_new("race@portal.io", &format!("Secret{}", i)).unwrap();
                provider.sign_up_with_password(&credentials).await
            }));
        }

        let mut winners = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(identity) => winners.push(identity),
                Err(error) => assert_eq!(error, AuthError::EmailAlreadyInUse),
            }
        }
        assert_eq!(winners.len(), 1);

        // The stored account is the one that won, not a later overwrite.
        let stored = provider.accounts.lock().get("race@portal.io").map(|a| a.identity.clone());
        assert_eq!(stored, Some(winners[0].clone()));
    }
}
