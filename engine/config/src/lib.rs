//! Directory layout conventions for persisted client/server state.
//!
//! Grounded on `ic-config::crypto::CryptoConfig::check_dir_has_required_permissions`:
//! every state directory must be readable/writable/executable by its owner
//! only (mode `0700` on Unix). Violating this is treated the same way the
//! teacher treats it — a panic, not a recoverable [`ic_sse_errors::EngineError`],
//! since a loosely permissioned key directory is a deployment mistake, not
//! a condition the engine can safely route around.

use std::fs;
use std::path::Path;

/// The permission bits a state directory must have: owner rwx, nothing else.
#[cfg(unix)]
const REQUIRED_MODE: u32 = 0o700;

/// Verifies `dir` is owner-only accessible, panicking otherwise.
///
/// Mirrors `CryptoConfig::check_dir_has_required_permissions` being called
/// unconditionally at the top of every store-opening constructor in the
/// teacher crate.
#[cfg(unix)]
pub fn check_dir_has_required_permissions(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(dir)
        .unwrap_or_else(|e| panic!("cannot stat directory {}: {}", dir.display(), e));
    if !metadata.is_dir() {
        panic!("{} is not a directory", dir.display());
    }
    let mode = metadata.permissions().mode() & 0o777;
    if mode != REQUIRED_MODE {
        panic!(
            "wrong permissions on {}: expected {:o}, found {:o}",
            dir.display(),
            REQUIRED_MODE,
            mode
        );
    }
}

#[cfg(not(unix))]
pub fn check_dir_has_required_permissions(_dir: &Path) {
    // Permission bits are not meaningfully checkable on non-Unix targets;
    // the on-disk layout is still created with the tightest mode the
    // platform allows, see `create_state_dir`.
}

/// Creates `dir` (and parents) with mode `0700`, matching "setup" creating
/// the client/server directory for the first time (§4.8).
pub fn create_state_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(REQUIRED_MODE))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn freshly_created_dir_passes_the_check() {
        let dir = tempdir().unwrap();
        let state_dir = dir.path().join("state");
        create_state_dir(&state_dir).unwrap();
        check_dir_has_required_permissions(&state_dir);
    }

    #[cfg(unix)]
    #[test]
    #[should_panic(expected = "wrong permissions")]
    fn widely_readable_dir_panics() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let state_dir = dir.path().join("state");
        std::fs::create_dir(&state_dir).unwrap();
        std::fs::set_permissions(&state_dir, std::fs::Permissions::from_mode(0o755)).unwrap();
        check_dir_has_required_permissions(&state_dir);
    }
}
