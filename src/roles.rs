use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::{
    error::RoleLookupError,
    models::{Role, RoleRecord},
};

// 1. RoleResolver Contract
/// RoleResolver
///
/// Maps an identity's email to its authorization record. Implementations must not cache:
/// every call reflects the server's current answer.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn resolve(&self, email: &str) -> Result<RoleRecord, RoleLookupError>;
}

/// RoleResolverState
///
/// The shared handle type for the role service.
pub type RoleResolverState = Arc<dyn RoleResolver>;

// 2. The Real Implementation (HTTP role service)
/// HttpRoleResolver
///
/// Calls `GET {base_url}/users/role?email=<email>`. When a bearer token is configured it
/// is sent as `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct HttpRoleResolver {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpRoleResolver {
    pub fn new(
        base_url: &str,
        bearer_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RoleLookupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RoleLookupError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
        })
    }
}

#[async_trait]
impl RoleResolver for HttpRoleResolver {
    async fn resolve(&self, email: &str) -> Result<RoleRecord, RoleLookupError> {
        let url = format!("{}/users/role", self.base_url);
        let mut request = self.client.get(url).query(&[("email", email)]);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RoleLookupError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RoleLookupError::NotFound(email.to_string()));
        }
        if !status.is_success() {
            return Err(RoleLookupError::Status(status.as_u16()));
        }

        response
            .json::<RoleRecord>()
            .await
            .map_err(|e| RoleLookupError::Decode(e.to_string()))
    }
}

// 3. The Mock Implementation (For Unit Tests)
/// MockRoleResolver
///
/// In-memory role service: returns the record registered for an email, `NotFound`
/// otherwise, or a simulated HTTP 500 when built with `new_failing`. Counts calls so tests
/// can assert how often the controller asked.
#[derive(Default)]
pub struct MockRoleResolver {
    records: Mutex<HashMap<String, RoleRecord>>,
    should_fail: bool,
    calls: AtomicUsize,
}

impl MockRoleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Registers a record for `email` with the given role.
    pub fn with_role(self, email: &str, role: Role) -> Self {
        self.records.lock().insert(
            email.to_string(),
            RoleRecord {
                role,
                name: email.split('@').next().unwrap_or(email).to_string(),
                email: email.to_string(),
                created_at: None,
            },
        );
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoleResolver for MockRoleResolver {
    async fn resolve(&self, email: &str) -> Result<RoleRecord, RoleLookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(RoleLookupError::Status(500));
        }
        self.records
            .lock()
            .get(email)
            .cloned()
            .ok_or_else(|| RoleLookupError::NotFound(email.to_string()))
    }
}

// --- Capability checks ---

/// Capability
///
/// Actions that destination views gate on. Views ask `role.permits(capability)` instead of
/// comparing role strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageCourses,
    ViewAdminDashboard,
    EnrollInCourses,
    ViewStudentDashboard,
}

impl Role {
    /// The single authorization check. `Unresolved` permits nothing.
    pub fn permits(&self, capability: Capability) -> bool {
        match (self, capability) {
            (Role::Admin, Capability::ManageCourses | Capability::ViewAdminDashboard) => true,
            (Role::Student, Capability::EnrollInCourses | Capability::ViewStudentDashboard) => true,
            _ => false,
        }
    }
}

/// permits
///
/// Capability check against a possibly-absent role (no identity, or still resolving).
pub fn permits(role: Option<Role>, capability: Capability) -> bool {
    role.is_some_and(|role| role.permits(capability))
}
