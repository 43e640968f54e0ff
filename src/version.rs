// Build and version information, embedded by build.rs

use std::fmt;

pub struct VersionInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub git_dirty: bool,
    pub build_date: &'static str,
    pub build_profile: &'static str,
    pub rustc_version: &'static str,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            version: env!("NETQUOTA_VERSION"),
            git_hash: env!("NETQUOTA_GIT_HASH"),
            git_dirty: env!("NETQUOTA_GIT_DIRTY") == "true",
            build_date: env!("NETQUOTA_BUILD_DATE"),
            build_profile: env!("NETQUOTA_BUILD_PROFILE"),
            rustc_version: env!("NETQUOTA_RUSTC_VERSION"),
        }
    }

    /// `v1.3.0 (abc1234)`, with `+dirty` for uncommitted builds
    pub fn short(&self) -> String {
        let dirty = if self.git_dirty { "+dirty" } else { "" };
        format!("v{} ({}{})", self.version, self.git_hash, dirty)
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "netquota {}", self.short())?;
        writeln!(f, "Built: {} ({})", self.build_date, self.build_profile)?;
        writeln!(f, "Rustc: {}", self.rustc_version)?;
        Ok(())
    }
}

/// Multi-line output for `--version-full`
pub fn version_string() -> String {
    VersionInfo::current().to_string()
}

pub fn short_version() -> String {
    VersionInfo::current().short()
}
