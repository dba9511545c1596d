//! User and group lookups for ownership handling
//!
//! Names resolve through the system's passwd/group databases. Numeric
//! strings are taken as ids directly.

use anyhow::{Context, Result, bail};
use std::ffi::{CStr, CString};
use std::mem::MaybeUninit;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

const BUF_LEN: usize = 16 * 1024;

/// Resolve a user name (or numeric uid) to a uid
pub fn uid_for(user: &str) -> Result<u32> {
    if let Ok(uid) = user.parse::<u32>() {
        return Ok(uid);
    }
    let c_name = CString::new(user).context("Invalid user name")?;
    let mut pwd = MaybeUninit::<libc::passwd>::uninit();
    let mut buf = vec![0 as libc::c_char; BUF_LEN];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: all pointers are valid for the duration of the call and the
    // buffer length matches the allocation. `result` is only read when the
    // call reports success.
    unsafe {
        let rc = libc::getpwnam_r(
            c_name.as_ptr(),
            pwd.as_mut_ptr(),
            buf.as_mut_ptr(),
            buf.len(),
            &raw mut result,
        );
        if rc != 0 || result.is_null() {
            bail!("unknown user '{user}'");
        }
        Ok((*result).pw_uid)
    }
}

/// Resolve a group name (or numeric gid) to a gid
pub fn gid_for(group: &str) -> Result<u32> {
    if let Ok(gid) = group.parse::<u32>() {
        return Ok(gid);
    }
    let c_name = CString::new(group).context("Invalid group name")?;
    let mut grp = MaybeUninit::<libc::group>::uninit();
    let mut buf = vec![0 as libc::c_char; BUF_LEN];
    let mut result: *mut libc::group = std::ptr::null_mut();

    // SAFETY: as in uid_for
    unsafe {
        let rc = libc::getgrnam_r(
            c_name.as_ptr(),
            grp.as_mut_ptr(),
            buf.as_mut_ptr(),
            buf.len(),
            &raw mut result,
        );
        if rc != 0 || result.is_null() {
            bail!("unknown group '{group}'");
        }
        Ok((*result).gr_gid)
    }
}

/// User name for a uid, or the uid itself when it has no entry
pub fn user_name(uid: u32) -> String {
    let mut pwd = MaybeUninit::<libc::passwd>::uninit();
    let mut buf = vec![0 as libc::c_char; BUF_LEN];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: as in uid_for; pw_name points into `buf`, which outlives the
    // CStr borrow.
    unsafe {
        let rc = libc::getpwuid_r(
            uid,
            pwd.as_mut_ptr(),
            buf.as_mut_ptr(),
            buf.len(),
            &raw mut result,
        );
        if rc != 0 || result.is_null() {
            return uid.to_string();
        }
        CStr::from_ptr((*result).pw_name)
            .to_string_lossy()
            .into_owned()
    }
}

/// Group name for a gid, or the gid itself when it has no entry
pub fn group_name(gid: u32) -> String {
    let mut grp = MaybeUninit::<libc::group>::uninit();
    let mut buf = vec![0 as libc::c_char; BUF_LEN];
    let mut result: *mut libc::group = std::ptr::null_mut();

    // SAFETY: as in user_name
    unsafe {
        let rc = libc::getgrgid_r(
            gid,
            grp.as_mut_ptr(),
            buf.as_mut_ptr(),
            buf.len(),
            &raw mut result,
        );
        if rc != 0 || result.is_null() {
            return gid.to_string();
        }
        CStr::from_ptr((*result).gr_name)
            .to_string_lossy()
            .into_owned()
    }
}

/// Owner and group names of a file
pub fn ownership(meta: &std::fs::Metadata) -> (String, String) {
    (user_name(meta.uid()), group_name(meta.gid()))
}

/// Resolve an owner and group pair to ids
pub fn ids(owner: &str, group: &str) -> Result<(u32, u32)> {
    Ok((uid_for(owner)?, gid_for(group)?))
}

/// Set the owner and group of a path by id; symlinks are not followed
pub fn chown_ids(path: &Path, uid: u32, gid: u32) -> Result<()> {
    std::os::unix::fs::lchown(path, Some(uid), Some(gid))
        .with_context(|| format!("Could not chown {} to {uid}:{gid}", path.display()))
}

/// Set the owner and group of a path by name
pub fn chown(path: &Path, owner: &str, group: &str) -> Result<()> {
    let (uid, gid) = ids(owner, group)?;
    chown_ids(path, uid, gid)
}

/// Names of the effective user and group of this process
pub fn current_identity() -> (String, String) {
    // SAFETY: geteuid and getegid cannot fail
    let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };
    (user_name(uid), group_name(gid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_lookups() {
        assert_eq!(uid_for("root").unwrap(), 0);
        assert_eq!(gid_for("root").unwrap(), 0);
        assert_eq!(user_name(0), "root");
        assert_eq!(group_name(0), "root");
    }

    #[test]
    fn test_numeric_ids() {
        assert_eq!(uid_for("4321").unwrap(), 4321);
        assert_eq!(gid_for("4321").unwrap(), 4321);
        assert_eq!(user_name(3_999_999), "3999999");
    }

    #[test]
    fn test_unknown_names() {
        assert!(uid_for("converge-no-such-user").is_err());
        assert!(gid_for("converge-no-such-group").is_err());
    }

    #[test]
    fn test_chown_to_self() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (user, group) = current_identity();
        chown(file.path(), &user, &group).unwrap();

        let meta = std::fs::metadata(file.path()).unwrap();
        assert_eq!(ownership(&meta), (user, group));
    }
}
