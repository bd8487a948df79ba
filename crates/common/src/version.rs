use std::fmt::{self, Display};

use serde::Serialize;

/// Expands to the [`BuildInfo`] of the crate it is invoked in, so a binary
/// can report its own profile and version rather than the library's.
/// The invoking crate needs a `build.rs` that exports the same variables.
#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::BuildInfo {
            build_profile: env!("BUILD_PROFILE"),
            build_features: env!("BUILD_FEATURES"),
            version: env!("REPO_VERSION"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
        }
    };
}

/// Build metadata captured by `build.rs` at compile time.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuildInfo {
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub version: &'static str,
    pub build_timestamp: &'static str,
}

impl Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version: {}\nprofile: {}\nfeatures: {}\nbuilt: {}",
            self.version, self.build_profile, self.build_features, self.build_timestamp
        )
    }
}

/// Build info for the core library.
pub fn build_info() -> BuildInfo {
    build_info!()
}
