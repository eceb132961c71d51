use std::{
    fs::{File, Metadata},
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// A file opened from one of a mount's source roots, together with the
/// metadata needed to build a response: its content type, length, and
/// modification time for conditional-GET and range handling by the caller.
#[derive(Debug)]
pub struct ResolvedFile {
    path: PathBuf,
    file: File,
    content_type: mime::Mime,
    metadata: Metadata,
    modified: Option<SystemTime>,
}

impl ResolvedFile {
    pub(crate) fn open(path: PathBuf) -> io::Result<Self> {
        let file = File::open(&path)?;
        let metadata = file.metadata()?;
        let modified = metadata.modified().ok();
        let content_type = content_type_for(&path);

        Ok(ResolvedFile {
            path,
            file,
            content_type,
            metadata,
            modified,
        })
    }

    /// The path this file was opened from, on the winning source root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The seekable, read-only file handle. The caller is responsible for
    /// honoring `Range` and conditional-GET headers against it.
    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn into_file(self) -> File {
        self.file
    }

    pub fn content_type(&self) -> &mime::Mime {
        &self.content_type
    }

    pub fn len(&self) -> u64 {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}

/// Derives a MIME type from `path`'s extension, case-insensitively, falling
/// back to `application/octet-stream` when the extension is absent or
/// unrecognized.
pub(crate) fn content_type_for(path: &Path) -> mime::Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}
