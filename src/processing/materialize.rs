use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::Result;
use crate::io::{save_gifti, GiftiImage, SurfaceDataArray};

/// Directory that lives exactly as long as one fit / transform call.
///
/// Dropping it removes the directory and everything in it, so every exit
/// path (success, validation error, tool failure) tears it down.
#[derive(Debug)]
pub struct ScopedDir {
    dir: TempDir,
}

impl ScopedDir {
    /// Creates a fresh, uniquely named directory under `parent`.
    pub fn new_in(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new().prefix("msm-").tempdir_in(parent)?;
        log::debug!("created scoped directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the directory now, reporting any error instead of ignoring it.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        log::debug!("removed scoped directory {}", path.display());
        Ok(())
    }
}

/// What a materialized file is used for; fixes its name in the scoped dir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Source(usize),
    Target(usize),
    TestInput,
}

impl FileRole {
    pub fn file_name(self) -> String {
        match self {
            FileRole::Source(i) => format!("source_{i}.func.gii"),
            FileRole::Target(i) => format!("target_{i}.func.gii"),
            FileRole::TestInput => "input_test.func.gii".to_string(),
        }
    }
}

/// Writes a full image under its role name and returns the path.
pub fn materialize(dir: &ScopedDir, role: FileRole, image: &GiftiImage) -> Result<PathBuf> {
    let path = dir.path().join(role.file_name());
    save_gifti(image, &path)?;
    Ok(path)
}

/// Writes each darray to its own file, `source_{i}` / `target_{i}` style.
pub fn materialize_each(
    dir: &ScopedDir,
    darrays: &[SurfaceDataArray],
    role: fn(usize) -> FileRole,
) -> Result<Vec<PathBuf>> {
    darrays
        .iter()
        .enumerate()
        .map(|(i, darray)| {
            let image = GiftiImage::from_darrays(vec![darray.clone()]);
            materialize(dir, role(i), &image)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::load_gifti;
    use crate::processing::normalize::{duplicate_single_feature, prepare_darrays};
    use crate::utils::test_utils::{coordsys_c, ramp_map};

    #[test]
    fn role_names_are_deterministic() {
        assert_eq!(FileRole::Source(0).file_name(), "source_0.func.gii");
        assert_eq!(FileRole::Target(3).file_name(), "target_3.func.gii");
        assert_eq!(FileRole::TestInput.file_name(), "input_test.func.gii");
    }

    #[test]
    fn scoped_dir_is_removed_on_drop_and_close() {
        let parent = tempfile::tempdir().unwrap();

        let path = {
            let scoped = ScopedDir::new_in(parent.path()).unwrap();
            std::fs::write(scoped.path().join("x"), b"x").unwrap();
            scoped.path().to_path_buf()
        };
        assert!(!path.exists());

        let scoped = ScopedDir::new_in(parent.path()).unwrap();
        let path = scoped.path().to_path_buf();
        scoped.close().unwrap();
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn scoped_dirs_are_unique() {
        let parent = tempfile::tempdir().unwrap();
        let a = ScopedDir::new_in(parent.path()).unwrap();
        let b = ScopedDir::new_in(parent.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn single_feature_file_holds_two_identical_darrays() {
        let parent = tempfile::tempdir().unwrap();
        let scoped = ScopedDir::new_in(parent.path()).unwrap();

        let mut darrays = vec![SurfaceDataArray::from_f32(ramp_map(100, 0.0))];
        prepare_darrays(&mut darrays, &coordsys_c()).unwrap();
        duplicate_single_feature(&mut darrays);
        let path = materialize(&scoped, FileRole::TestInput, &GiftiImage::from_darrays(darrays)).unwrap();

        let written = load_gifti(&path).unwrap();
        assert_eq!(written.darrays.len(), 2);
        assert_eq!(written.darrays[0], written.darrays[1]);
        let first: Vec<u8> = written.darrays[0].data.to_le_bytes();
        assert_eq!(first, written.darrays[1].data.to_le_bytes());
        assert_eq!(written.darrays[0].data.len(), 100);
    }

    #[test]
    fn materialize_each_writes_one_file_per_darray() {
        let parent = tempfile::tempdir().unwrap();
        let scoped = ScopedDir::new_in(parent.path()).unwrap();
        let darrays = vec![
            SurfaceDataArray::from_f32(ramp_map(10, 0.0)),
            SurfaceDataArray::from_f32(ramp_map(10, 1.0)),
        ];

        let paths = materialize_each(&scoped, &darrays, FileRole::Target).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[1].ends_with("target_1.func.gii"));
        assert_eq!(load_gifti(&paths[1]).unwrap().darrays[0], darrays[1]);
    }
}
