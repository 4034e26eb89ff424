//! Source resolution: turn a caller-supplied image reference into a path.
//!
//! Callers name images relative to the image root (the HTTP surface only
//! ever sees a bare `image_name` plus an optional `subfolder`). Both parts
//! are validated so a request can never escape the root: absolute names and
//! `..` components are rejected with `InvalidParameter`.
//!
//! Existence is *not* checked here. Whether the source exists is a question
//! for the artifact store, which may not be a filesystem at all.

use crate::error::OcrPrepError;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// A validated source image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    path: PathBuf,
    name: String,
}

impl ResolvedSource {
    /// Wrap an explicit path, e.g. one given on the command line.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, OcrPrepError> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| OcrPrepError::InvalidParameter {
                param: "image path",
                value: path.display().to_string(),
                expected: "a path ending in a UTF-8 file name",
            })?
            .to_string();
        Ok(Self { path, name })
    }

    /// Full path of the source image.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used to derive every artifact name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Resolve `image_name` (optionally inside `subfolder`) under `root`.
pub fn resolve_source(
    root: &Path,
    image_name: &str,
    subfolder: Option<&str>,
) -> Result<ResolvedSource, OcrPrepError> {
    check_relative("image_name", image_name)?;

    let mut path = root.to_path_buf();
    if let Some(sub) = subfolder.map(str::trim).filter(|s| !s.is_empty()) {
        check_relative("subfolder", sub)?;
        path.push(sub);
    }
    path.push(image_name);

    debug!("Resolved source: {}", path.display());
    ResolvedSource::from_path(path)
}

/// Reject empty, absolute, or parent-escaping relative paths.
fn check_relative(param: &'static str, value: &str) -> Result<(), OcrPrepError> {
    let invalid = || OcrPrepError::InvalidParameter {
        param,
        value: value.to_string(),
        expected: "a relative name without '..' components",
    };

    if value.trim().is_empty() {
        return Err(invalid());
    }
    for component in Path::new(value).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid())
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn joins_under_root() {
        let s = resolve_source(Path::new("/images"), "receipt.png", None).unwrap();
        assert_eq!(s.path(), Path::new("/images/receipt.png"));
        assert_eq!(s.name(), "receipt.png");
    }

    #[test]
    fn subfolder_is_inserted() {
        let s = resolve_source(Path::new("/images"), "a.jpg", Some("scans")).unwrap();
        assert_eq!(s.path(), Path::new("/images/scans/a.jpg"));
        assert_eq!(s.name(), "a.jpg");

        let s = resolve_source(Path::new("/images"), "a.jpg", Some("  ")).unwrap();
        assert_eq!(s.path(), Path::new("/images/a.jpg"));
    }

    #[test]
    fn escapes_are_rejected() {
        let root = Path::new("/images");
        for (name, sub) in [
            ("../etc/passwd", None),
            ("/etc/passwd", None),
            ("", None),
            ("a.png", Some("../other")),
            ("a.png", Some("/abs")),
        ] {
            let err = resolve_source(root, name, sub).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter, "{name} {sub:?}");
        }
    }

    #[test]
    fn from_path_needs_file_name() {
        assert!(ResolvedSource::from_path("/").is_err());
        let s = ResolvedSource::from_path("./scans/x.png").unwrap();
        assert_eq!(s.name(), "x.png");
    }
}
