use crate::{error::RouteError, models::Role};

const LEGACY_BASE: &str = "/dashboard";
const ENHANCED_BASE: &str = "/enhanced-dashboard";

/// RouteNamespace
///
/// Which of the two parallel dashboard trees a path belongs to. Derived per navigation,
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteNamespace {
    Legacy,
    Enhanced,
}

impl RouteNamespace {
    /// Fixed-prefix match: anything under `/enhanced-dashboard` is `Enhanced`, every
    /// other path (including non-dashboard pages) is `Legacy`.
    pub fn resolve(path: &str) -> Self {
        if path.starts_with(ENHANCED_BASE) {
            RouteNamespace::Enhanced
        } else {
            RouteNamespace::Legacy
        }
    }

    pub const fn base(&self) -> &'static str {
        match self {
            RouteNamespace::Legacy => LEGACY_BASE,
            RouteNamespace::Enhanced => ENHANCED_BASE,
        }
    }

    pub const fn is_enhanced(&self) -> bool {
        matches!(self, RouteNamespace::Enhanced)
    }

    /// Base prefix joined with an arbitrary suffix, e.g. `"/student/overview"`.
    pub fn route(&self, suffix: &str) -> String {
        format!("{}{}", self.base(), suffix)
    }
}

/// DashboardRoute
///
/// The logical, namespace-independent routes feature views link to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DashboardRoute {
    UpdateCourse { id: String },
    AddCourse,
    MyCourses,
}

impl DashboardRoute {
    /// Parses a logical route name (`update-course`, `add-course`, `my-courses`).
    /// `update-course` needs the course `id`.
    pub fn from_name(name: &str, id: Option<&str>) -> Result<Self, RouteError> {
        match name {
            "update-course" => match id {
                Some(id) if !id.is_empty() => Ok(DashboardRoute::UpdateCourse { id: id.to_string() }),
                _ => Err(RouteError::MissingParam("id")),
            },
            "add-course" => Ok(DashboardRoute::AddCourse),
            "my-courses" => Ok(DashboardRoute::MyCourses),
            other => Err(RouteError::UnknownRoute(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DashboardRoute::UpdateCourse { .. } => "update-course",
            DashboardRoute::AddCourse => "add-course",
            DashboardRoute::MyCourses => "my-courses",
        }
    }
}

/// build_route
///
/// Concrete path of a logical route inside a namespace. The two trees spell the same
/// pages differently (camelCase vs kebab-case), hence the table below.
pub fn build_route(namespace: RouteNamespace, route: &DashboardRoute) -> String {
    let segment = match (route, namespace) {
        (DashboardRoute::UpdateCourse { id }, RouteNamespace::Legacy) => {
            return namespace.route(&format!("/admin/updateCourse/{}", id));
        }
        (DashboardRoute::UpdateCourse { id }, RouteNamespace::Enhanced) => {
            return namespace.route(&format!("/admin/update-course/{}", id));
        }
        (DashboardRoute::AddCourse, RouteNamespace::Legacy) => "/admin/addCourse",
        (DashboardRoute::AddCourse, RouteNamespace::Enhanced) => "/admin/add-course",
        (DashboardRoute::MyCourses, RouteNamespace::Legacy) => "/admin/myAddedCourse",
        (DashboardRoute::MyCourses, RouteNamespace::Enhanced) => "/admin/courses",
    };
    namespace.route(segment)
}

/// Name-based variant of `build_route` for callers holding the logical name as a string.
pub fn build_named_route(
    namespace: RouteNamespace,
    name: &str,
    id: Option<&str>,
) -> Result<String, RouteError> {
    DashboardRoute::from_name(name, id).map(|route| build_route(namespace, &route))
}

// --- Sidebar navigation ---

/// NavItem
///
/// One sidebar entry of a dashboard layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavItem {
    pub label: &'static str,
    pub path: String,
}

/// (label, legacy suffix, enhanced suffix); `None` where a tree has no such page.
type NavEntry = (&'static str, Option<&'static str>, Option<&'static str>);

const ADMIN_NAV: &[NavEntry] = &[
    ("Dashboard Overview", Some("/admin/overview"), Some("/admin/overview")),
    ("My Courses", Some("/admin/myAddedCourse"), Some("/admin/courses")),
    ("Students", None, Some("/admin/students")),
    ("Analytics", None, Some("/admin/analytics")),
    ("Add Course", Some("/admin/addCourse"), Some("/admin/add-course")),
    ("Enrollments", Some("/admin/enrollments"), None),
    ("Settings", None, Some("/admin/settings")),
];

const STUDENT_NAV: &[NavEntry] = &[
    ("Dashboard Overview", Some("/student/overview"), Some("/student/overview")),
    ("My Enrolled Courses", Some("/student/myEnrolledCourse"), Some("/student/courses")),
    ("Progress", Some("/student/progress"), Some("/student/progress")),
    ("Profile", Some("/student/profile"), Some("/student/profile")),
];

/// navigation
///
/// Sidebar entries for a role inside a namespace. An unresolved role has no dashboard
/// pages and gets an empty list.
pub fn navigation(namespace: RouteNamespace, role: Role) -> Vec<NavItem> {
    let table = match role {
        Role::Admin => ADMIN_NAV,
        Role::Student => STUDENT_NAV,
        Role::Unresolved => return Vec::new(),
    };

    table
        .iter()
        .filter_map(|&(label, legacy, enhanced)| {
            let suffix = match namespace {
                RouteNamespace::Legacy => legacy,
                RouteNamespace::Enhanced => enhanced,
            };
            suffix.map(|suffix| NavItem {
                label,
                path: namespace.route(suffix),
            })
        })
        .collect()
}

/// DashboardContext
///
/// What a feature view needs to stay agnostic of the tree it is mounted under: the
/// resolved namespace and route builders bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardContext {
    namespace: RouteNamespace,
}

impl DashboardContext {
    pub fn for_path(path: &str) -> Self {
        Self {
            namespace: RouteNamespace::resolve(path),
        }
    }

    pub fn namespace(&self) -> RouteNamespace {
        self.namespace
    }

    pub fn is_enhanced(&self) -> bool {
        self.namespace.is_enhanced()
    }

    pub fn build_route(&self, route: &DashboardRoute) -> String {
        build_route(self.namespace, route)
    }

    pub fn route(&self, suffix: &str) -> String {
        self.namespace.route(suffix)
    }

    pub fn navigation(&self, role: Role) -> Vec<NavItem> {
        navigation(self.namespace, role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_a_prefix_match() {
        assert_eq!(RouteNamespace::resolve("/enhanced-dashboard"), RouteNamespace::Enhanced);
        assert_eq!(
            RouteNamespace::resolve("/enhanced-dashboard/admin/courses"),
            RouteNamespace::Enhanced
        );
        assert_eq!(RouteNamespace::resolve("/dashboard/admin"), RouteNamespace::Legacy);
        assert_eq!(RouteNamespace::resolve("/allCourses"), RouteNamespace::Legacy);
        assert_eq!(RouteNamespace::resolve(""), RouteNamespace::Legacy);
    }

    #[test]
    fn named_routes_validate_their_inputs() {
        assert_eq!(
            build_named_route(RouteNamespace::Legacy, "update-course", None),
            Err(RouteError::MissingParam("id"))
        );
        assert_eq!(
            build_named_route(RouteNamespace::Legacy, "delete-course", None),
            Err(RouteError::UnknownRoute("delete-course".to_string()))
        );
        assert_eq!(
            build_named_route(RouteNamespace::Enhanced, "my-courses", None),
            Ok("/enhanced-dashboard/admin/courses".to_string())
        );
    }

    #[test]
    fn navigation_follows_each_tree() {
        let legacy: Vec<String> = navigation(RouteNamespace::Legacy, Role::Admin)
            .into_iter()
            .map(|item| item.path)
            .collect();
        assert!(legacy.contains(&"/dashboard/admin/enrollments".to_string()));
        assert!(!legacy.iter().any(|p| p.ends_with("/settings")));

        let enhanced = navigation(RouteNamespace::Enhanced, Role::Student);
        assert_eq!(enhanced.len(), 4);
        assert_eq!(enhanced[1].path, "/enhanced-dashboard/student/courses");

        assert!(navigation(RouteNamespace::Enhanced, Role::Unresolved).is_empty());
    }
}
