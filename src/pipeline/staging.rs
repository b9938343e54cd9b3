//! Upload staging
//!
//! Uploaded recordings are written to a named temporary file before
//! decoding. The file is owned by [`StagedUpload`] and removed when it is
//! dropped, whichever way the request ends.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::PipelineError;

/// Where uploads are staged and which extension they must carry.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: Option<PathBuf>,
    extension: String,
}

impl StagingArea {
    /// `dir = None` stages into the system temp directory.
    pub fn new(dir: Option<PathBuf>, extension: &str) -> Self {
        Self {
            dir,
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Check the client-supplied file name against the accepted extension.
    pub fn check_name(&self, filename: &str) -> Result<(), PipelineError> {
        let name = filename.trim();
        if name.is_empty() {
            return Err(PipelineError::Input("no file selected".to_string()));
        }
        let ok = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension));
        if !ok {
            return Err(PipelineError::Input(format!(
                "invalid file format, please upload a .{} file",
                self.extension
            )));
        }
        Ok(())
    }

    /// Validate and write `bytes` to a fresh temporary file.
    pub fn stage(&self, filename: &str, bytes: &[u8]) -> Result<StagedUpload, PipelineError> {
        self.check_name(filename)?;
        if bytes.is_empty() {
            return Err(PipelineError::Input("uploaded file is empty".to_string()));
        }

        let dir = self.dir();
        std::fs::create_dir_all(&dir).map_err(|e| staging_error("create staging dir", &dir, &e))?;
        let suffix = format!(".{}", self.extension);
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(&dir)
            .map_err(|e| staging_error("create staged file", &dir, &e))?;
        file.write_all(bytes)
            .and_then(|()| file.flush())
            .map_err(|e| staging_error("write staged file", &dir, &e))?;

        debug!(path = %file.path().display(), bytes = bytes.len(), "Upload staged");
        Ok(StagedUpload {
            file,
            original_name: filename.trim().to_string(),
        })
    }
}

fn staging_error(action: &str, path: &Path, e: &std::io::Error) -> PipelineError {
    PipelineError::Staging(format!("{action} ({}): {e}", path.display()))
}

/// A staged upload. Deleted from disk on drop.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    original_name: String,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn read(&self) -> Result<Vec<u8>, PipelineError> {
        std::fs::read(self.file.path()).map_err(|e| staging_error("read staged file", self.file.path(), &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(dir: &Path) -> StagingArea {
        StagingArea::new(Some(dir.to_path_buf()), "edf")
    }

    #[test]
    fn test_stage_and_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = area(dir.path()).stage("subject01.edf", b"0       ").unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        assert!(path.starts_with(dir.path()));
        assert_eq!(staged.read().unwrap(), b"0       ");
        assert_eq!(staged.original_name(), "subject01.edf");
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        assert!(area(dir.path()).stage("S01.EDF", b"x").is_ok());
    }

    #[test]
    fn test_wrong_extension_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = area(dir.path()).stage("notes.csv", b"x").unwrap_err();
        assert!(matches!(err, PipelineError::Input(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_name_and_empty_body_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(area(dir.path()).stage("  ", b"x"), Err(PipelineError::Input(_))));
        assert!(matches!(area(dir.path()).stage("a.edf", b""), Err(PipelineError::Input(_))));
    }

    #[test]
    fn test_unwritable_staging_dir_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("plain-file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = area(&blocker.join("sub")).stage("a.edf", b"data").unwrap_err();
        assert!(matches!(err, PipelineError::Staging(_)), "got {err:?}");
        assert!(!err.is_client_error());
        assert_eq!(err.code(), "STAGING_ERROR");
    }

    #[test]
    fn test_leading_dot_in_extension_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagingArea::new(Some(dir.path().to_path_buf()), ".edf")
            .stage("a.edf", b"x")
            .unwrap();
        assert!(staged.path().to_string_lossy().ends_with(".edf"));
    }
}
