//! Media directory paths and copies

use std::path::{Path, PathBuf};

use daybook_core::domain::validate_attachment_name;

/// Suffix of in-flight copies
pub(crate) const PARTIAL_SUFFIX: &str = ".part";

/// Path of `name` inside `media_dir`, if `name` is a plain file name
pub(crate) fn media_path(media_dir: &Path, name: &str) -> Option<PathBuf> {
    validate_attachment_name(name).ok()?;
    Some(media_dir.join(name))
}

/// Copies `source` to `dest` through a temporary file in the same directory
///
/// The temporary file is removed when either the copy or the rename fails.
pub(crate) async fn copy_into_place(source: &Path, dest: &Path) -> std::io::Result<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut partial = dest.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let result = match tokio::fs::copy(source, &partial).await {
        Ok(copied) => tokio::fs::rename(&partial, dest).await.map(|()| copied),
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(&partial).await;
    }
    result
}
