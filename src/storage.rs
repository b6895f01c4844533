use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::errors::{AppError, AppResult};
use crate::facilities::sibling_dir;

/// Writes `bytes` to a hidden sibling of `path` and renames it into place,
/// so readers see either the previous file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let parent = sibling_dir(path);
    fs::create_dir_all(&parent).map_err(|err| AppError::output(&parent, err))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".into());
    let tmp = parent.join(format!(".{file_name}.tmp.{}", std::process::id()));

    let written = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(AppError::output(path, err));
    }
    Ok(())
}
