// FILE: src/core/permissions.rs
//! Identity reported as the owner of every virtual entry, and the mount
//! options that follow from it.

/// Captures user identity for ownership reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
    pub is_root: bool,
}

impl Identity {
    /// Capture the current identity. Under sudo, files are reported as owned
    /// by the invoking user rather than root.
    pub fn capture() -> Self {
        let current_uid = Self::get_current_uid();
        let is_root = current_uid == 0;

        let (uid, gid) = match (std::env::var("SUDO_UID").ok(), std::env::var("SUDO_GID").ok()) {
            (Some(sudo_uid), Some(sudo_gid)) if is_root => {
                let uid = sudo_uid.parse::<u32>().unwrap_or(current_uid);
                let gid = sudo_gid.parse::<u32>().unwrap_or_else(|_| Self::get_current_gid());
                tracing::info!("Running under sudo, serving as UID:{} GID:{}", uid, gid);
                (uid, gid)
            }
            _ => (current_uid, Self::get_current_gid()),
        };

        Self { uid, gid, is_root }
    }

    fn get_current_uid() -> u32 { unsafe { libc::getuid() } }
    fn get_current_gid() -> u32 { unsafe { libc::getgid() } }

    /// Mount options for a read-only mount.
    pub fn mount_options(&self, fsname: &str, allow_other: bool) -> Vec<fuser::MountOption> {
        let mut options = vec![
            fuser::MountOption::RO,
            fuser::MountOption::FSName(fsname.to_string()),
            fuser::MountOption::DefaultPermissions,
            fuser::MountOption::AutoUnmount,
        ];
        if allow_other || self.is_root {
            options.push(fuser::MountOption::AllowOther);
        }
        options
    }
}
