/// Route Module Index
///
/// Client-side routing policy: which protected views may render for the current
/// session, and how logical dashboard routes map onto the two parallel dashboard trees.

/// Render / wait / redirect decisions for protected views.
pub mod guard;

/// Route namespace resolution, route builders and sidebar tables.
pub mod dashboard;
