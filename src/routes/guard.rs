use crate::models::{Loading, Session};

/// Default login page (`/auth/login`).
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";
/// Where a freshly signed-in user lands when no protected path was captured.
pub const DEFAULT_LANDING_PATH: &str = "/";

/// GuardDecision
///
/// What a protected view should do for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session is signed in; render the protected view.
    Render,
    /// Session is not settled yet; render a neutral waiting state and do not navigate.
    Wait,
    /// Session is settled and anonymous; go to the login page and come back to
    /// `return_path` afterwards.
    RedirectToLogin {
        login_path: String,
        return_path: String,
    },
}

/// RouteGuard
///
/// Policy wrapper around protected views. Authentication alone decides rendering; role
/// gating is left to the destination views (`Role::permits`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    login_path: String,
    landing_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_PATH, DEFAULT_LANDING_PATH)
    }
}

impl RouteGuard {
    pub fn new(login_path: &str, landing_path: &str) -> Self {
        Self {
            login_path: login_path.to_string(),
            landing_path: landing_path.to_string(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// decide
    ///
    /// `Wait` until the session is `Ready`, then `Render` if an identity is present and
    /// `RedirectToLogin(intended_path)` otherwise. Never redirects while booting or while a
    /// role is still being resolved.
    pub fn decide(&self, session: &Session, intended_path: &str) -> GuardDecision {
        if session.loading != Loading::Ready {
            return GuardDecision::Wait;
        }
        if session.identity.is_some() {
            return GuardDecision::Render;
        }
        GuardDecision::RedirectToLogin {
            login_path: self.login_path.clone(),
            return_path: intended_path.to_string(),
        }
    }

    /// post_login_destination
    ///
    /// Where to navigate after a successful login: the captured return path, unchanged,
    /// or the landing path when nothing was captured.
    pub fn post_login_destination<'a>(&'a self, return_path: Option<&'a str>) -> &'a str {
        match return_path {
            Some(path) if !path.is_empty() => path,
            _ => &self.landing_path,
        }
    }
}

/// Guard decision with the default login path.
pub fn guard_decision(session: &Session, intended_path: &str) -> GuardDecision {
    RouteGuard::default().decide(session, intended_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Identity, Role};

    #[test]
    fn resolving_role_still_waits() {
        let session = Session {
            identity: Some(Identity {
                email: "a@b.com".to_string(),
                ..Identity::default()
            }),
            loading: Loading::ResolvingRole,
            ..Session::default()
        };
        assert_eq!(guard_decision(&session, "/dashboard"), GuardDecision::Wait);
    }

    #[test]
    fn unresolved_role_still_renders() {
        let session = Session {
            identity: Some(Identity::default()),
            role: Some(Role::Unresolved),
            loading: Loading::Ready,
            ..Session::default()
        };
        assert_eq!(guard_decision(&session, "/dashboard"), GuardDecision::Render);
    }

    #[test]
    fn empty_return_path_falls_back_to_landing() {
        let guard = RouteGuard::new("/login", "/home");
        assert_eq!(guard.post_login_destination(Some("")), "/home");
        assert_eq!(guard.post_login_destination(None), "/home");
        assert_eq!(
            guard.post_login_destination(Some("/dashboard/admin/addCourse")),
            "/dashboard/admin/addCourse"
        );
    }
}
