use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const PENDING_SUFFIX: &str = "pending";

/// Stages the image beside `path`, syncs it, then renames it over the
/// target. The previous save stays readable until the rename lands.
pub fn write_save_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let staged = StagedFile::new(pending_path(path));
    {
        let mut file = File::create(staged.path())?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(staged.path(), path)?;
    staged.committed();
    Ok(())
}

/// Removes the staged file on drop unless it was renamed into place.
struct StagedFile {
    path: PathBuf,
    armed: bool,
}

impl StagedFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn committed(mut self) {
        self.armed = false;
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn pending_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "slot".into());
    name.push(".");
    name.push(PENDING_SUFFIX);
    path.with_file_name(name)
}
