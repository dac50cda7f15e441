//! Log list cache - save and load the last authenticated list to/from disk.
//!
//! The raw list and its detached signature are stored side by side so the
//! signature can be checked again whenever the cache is loaded.

use std::fs;
use std::io;
use std::path::Path;

/// File name of the cached list.
pub const LOG_LIST_FILE: &str = "log_list.json";
/// File name of the cached detached signature.
pub const LOG_LIST_SIG_FILE: &str = "log_list.sig";

/// Save a log list and its signature into `dir`.
///
/// # Example
/// ```ignore
/// cache::save_log_list(Path::new("/var/lib/verifyct"), &list, &sig)?;
/// ```
pub fn save_log_list(dir: &Path, list: &[u8], signature: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    fs::write(dir.join(LOG_LIST_FILE), list)?;
    fs::write(dir.join(LOG_LIST_SIG_FILE), signature)
}

/// Load the cached log list and signature from `dir`.
///
/// Returns `Ok(None)` if nothing has been cached yet.
pub fn load_log_list(dir: &Path) -> io::Result<Option<(Vec<u8>, Vec<u8>)>> {
    let list = match fs::read(dir.join(LOG_LIST_FILE)) {
        Ok(list) => list,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let signature = match fs::read(dir.join(LOG_LIST_SIG_FILE)) {
        Ok(sig) => sig,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    Ok(Some((list, signature)))
}
