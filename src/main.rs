use course_portal::{
    Credentials, GuardDecision, PortalContext,
    config::{AppConfig, Env},
};
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Boots the portal core against the configured backends: configuration, logging, the
/// session controller, then an optional sign-in and a guard check for one path.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "course_portal=debug,reqwest=info".into());

    // 3. Pretty logs locally, JSON in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Portal starting in {:?} mode", config.env);

    // 4. Session Controller over the REST identity backend and the role service.
    let portal = match PortalContext::from_config(config) {
        Ok(portal) => portal,
        Err(e) => {
            tracing::error!(error = %e, "FATAL: could not build the backend clients");
            std::process::exit(1);
        }
    };

    let initial = portal.session().wait_until_settled().await;
    tracing::info!(phase = ?initial.phase(), "session settled");

    // 5. Optional scripted sign-in (PORTAL_EMAIL / PORTAL_PASSWORD).
    if let (Ok(email), Ok(password)) = (env::var("PORTAL_EMAIL"), env::var("PORTAL_PASSWORD")) {
        match Credentials::try_new(&email, &password) {
            Ok(credentials) => match portal.session().sign_in(&credentials).await {
                Ok(identity) => {
                    let mut sessions = portal.session().observe();
                    let settled = sessions
                        .wait_for(|s| s.email() == Some(identity.email.as_str()) && s.is_settled())
                        .await
                        .map(|s| s.clone());
                    if let Ok(session) = settled {
                        tracing::info!(
                            email = %identity.email,
                            role = ?session.role,
                            error = ?session.last_error,
                            "signed in"
                        );
                    }
                }
                Err(e) => tracing::warn!(error = %e, "sign-in rejected"),
            },
            Err(e) => tracing::warn!(error = %e, "invalid PORTAL_EMAIL/PORTAL_PASSWORD"),
        }
    }

    // 6. Guard check for the requested path.
    let path = env::var("PORTAL_PATH").unwrap_or_else(|_| "/dashboard".to_string());
    match portal.guard(&path) {
        GuardDecision::Render => {
            let context = portal.route_namespace(&path);
            let role = portal.session().current().role;
            let entries = role.map(|role| context.navigation(role)).unwrap_or_default();
            tracing::info!(%path, enhanced = context.is_enhanced(), nav_entries = entries.len(), "render");
        }
        GuardDecision::Wait => tracing::info!(%path, "waiting for session"),
        GuardDecision::RedirectToLogin {
            login_path,
            return_path,
        } => tracing::info!(%path, %login_path, %return_path, "redirect to login"),
    }

    portal.shutdown().await;
}
