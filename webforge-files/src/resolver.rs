use std::path::{Path, PathBuf};

use crate::{error::FilesError, named::ResolvedFile, path_buf::sanitize_relative_path};

/// The outcome of resolving a request path against a [`Mount`].
#[derive(Debug)]
pub enum Resolved {
    /// A source root had the entry at the requested (or index-appended) path.
    File(ResolvedFile),
    /// No source had the entry, but SPA mode served `/index.html` in its place.
    SpaFallback(ResolvedFile),
}

/// An ordered list of read-only filesystem roots mounted under a URL prefix,
/// with optional single-page-application fallback.
///
/// Source roots are walked in registration order; the first root that has an
/// entry at the resolved relative path wins. This mirrors a layered overlay:
/// earlier sources shadow later ones.
pub struct Mount {
    prefix: String,
    spa_mode: bool,
    sources: Vec<PathBuf>,
}

impl Mount {
    /// `prefix` should already be normalized by the caller's route matcher.
    pub fn new(prefix: impl Into<String>, spa_mode: bool, sources: Vec<PathBuf>) -> Self {
        Mount {
            prefix: prefix.into(),
            spa_mode,
            sources,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn spa_mode(&self) -> bool {
        self.spa_mode
    }

    /// Resolves `request_path` (the full path of the incoming request,
    /// including this mount's prefix) against the source list.
    pub fn resolve(&self, request_path: &str) -> Result<Resolved, FilesError> {
        let stripped = request_path
            .strip_prefix(&self.prefix)
            .unwrap_or(request_path);

        let mut relative = sanitize_relative_path(stripped)?;
        if stripped.is_empty() || stripped.ends_with('/') {
            relative.push("index.html");
        }

        if let Some(file) = self.open_in_sources(&relative)? {
            return Ok(Resolved::File(file));
        }

        if self.spa_mode && is_html_ish(&relative) {
            let index = PathBuf::from("index.html");
            if let Some(file) = self.open_in_sources(&index)? {
                return Ok(Resolved::SpaFallback(file));
            }
        }

        Err(FilesError::NotFound)
    }

    /// Walks the source list for `relative`, retrying as `relative/index.html`
    /// when an entry exists but is a directory.
    fn open_in_sources(&self, relative: &Path) -> Result<Option<ResolvedFile>, FilesError> {
        for source in &self.sources {
            let candidate = source.join(relative);

            match candidate.metadata() {
                Ok(meta) if meta.is_dir() => {
                    let index_candidate = candidate.join("index.html");
                    match ResolvedFile::open(index_candidate) {
                        Ok(file) => return Ok(Some(file)),
                        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                            return Err(FilesError::IsDirectory);
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                Ok(_) => match ResolvedFile::open(candidate) {
                    Ok(file) => return Ok(Some(file)),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => return Err(err.into()),
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    log::debug!("skipping unreadable source entry {:?}: {err}", source);
                    continue;
                }
            }
        }

        Ok(None)
    }
}

/// SPA fallback applies to paths with no extension or a `.html` extension;
/// asset-like paths (`.js`, `.png`, ...) should 404 rather than silently
/// serving the app shell.
fn is_html_ish(relative: &Path) -> bool {
    match relative.extension().and_then(|ext| ext.to_str()) {
        None => true,
        Some(ext) => ext.eq_ignore_ascii_case("html"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn serves_plain_file() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "style.css", "body {}");

        let mount = Mount::new("/static", false, vec![tmp.path().to_path_buf()]);
        match mount.resolve("/static/style.css").unwrap() {
            Resolved::File(f) => assert_eq!(f.content_type().subtype(), mime::CSS),
            _ => panic!("expected direct file hit"),
        }
    }

    #[test]
    fn directory_retries_with_index_html() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "docs/index.html", "<h1>docs</h1>");

        let mount = Mount::new("/static", false, vec![tmp.path().to_path_buf()]);
        assert!(matches!(
            mount.resolve("/static/docs/"),
            Ok(Resolved::File(_))
        ));
        assert!(matches!(
            mount.resolve("/static/docs"),
            Ok(Resolved::File(_))
        ));
    }

    #[test]
    fn directory_without_index_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("empty")).unwrap();

        let mount = Mount::new("/static", false, vec![tmp.path().to_path_buf()]);
        assert!(matches!(
            mount.resolve("/static/empty/"),
            Err(FilesError::IsDirectory)
        ));
    }

    #[test]
    fn spa_mode_falls_back_to_index_for_unknown_route() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "index.html", "<app/>");

        let mount = Mount::new("/", true, vec![tmp.path().to_path_buf()]);
        match mount.resolve("/dashboard/settings").unwrap() {
            Resolved::SpaFallback(f) => assert_eq!(f.path().file_name().unwrap(), "index.html"),
            _ => panic!("expected SPA fallback"),
        }
    }

    #[test]
    fn spa_mode_404s_for_missing_asset() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "index.html", "<app/>");

        let mount = Mount::new("/", true, vec![tmp.path().to_path_buf()]);
        assert!(matches!(
            mount.resolve("/missing.js"),
            Err(FilesError::NotFound)
        ));
    }

    #[test]
    fn earlier_source_shadows_later_one() {
        let primary = tempfile::tempdir().unwrap();
        let fallback = tempfile::tempdir().unwrap();
        write(primary.path(), "a.txt", "primary");
        write(fallback.path(), "a.txt", "fallback");
        write(fallback.path(), "b.txt", "fallback-only");

        let mount = Mount::new(
            "/",
            false,
            vec![primary.path().to_path_buf(), fallback.path().to_path_buf()],
        );

        match mount.resolve("/a.txt").unwrap() {
            Resolved::File(f) => assert_eq!(f.path(), primary.path().join("a.txt")),
            _ => panic!("expected file"),
        }
        match mount.resolve("/b.txt").unwrap() {
            Resolved::File(f) => assert_eq!(f.path(), fallback.path().join("b.txt")),
            _ => panic!("expected file from fallback source"),
        }
    }

    #[test]
    fn traversal_attempt_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mount = Mount::new("/static", false, vec![tmp.path().to_path_buf()]);
        assert!(matches!(
            mount.resolve("/static/.hidden"),
            Err(FilesError::BadPath(_))
        ));
    }
}
