use std::path::PathBuf;

use crate::error::UriSegmentError;

/// Converts a request path (already stripped of its mount prefix) into a
/// relative filesystem path, rejecting any segment that could escape the
/// mount's source roots.
///
/// `..` pops the last pushed segment rather than being rejected outright, so
/// that `a/../b` normalizes to `b`; a leading `.` or `*`, or a trailing `:`,
/// `<`, or `>`, is rejected since none of those are meaningful in a mounted
/// path and are common traversal/injection probes.
pub(crate) fn sanitize_relative_path(path: &str) -> Result<PathBuf, UriSegmentError> {
    let mut buf = PathBuf::new();

    for segment in path.split('/') {
        if segment == ".." {
            buf.pop();
        } else if segment.starts_with('.') {
            return Err(UriSegmentError::BadStart('.'));
        } else if segment.starts_with('*') {
            return Err(UriSegmentError::BadStart('*'));
        } else if segment.ends_with(':') {
            return Err(UriSegmentError::BadEnd(':'));
        } else if segment.ends_with('>') {
            return Err(UriSegmentError::BadEnd('>'));
        } else if segment.ends_with('<') {
            return Err(UriSegmentError::BadEnd('<'));
        } else if segment.is_empty() {
            continue;
        } else if cfg!(windows) && segment.contains('\\') {
            return Err(UriSegmentError::BadChar('\\'));
        } else {
            buf.push(segment);
        }
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::iter::FromIterator;

    use super::*;

    #[test]
    fn rejects_dotfile_segments() {
        assert_eq!(
            sanitize_relative_path("/test/.tt"),
            Err(UriSegmentError::BadStart('.'))
        );
    }

    #[test]
    fn rejects_wildcard_segments() {
        assert_eq!(
            sanitize_relative_path("/test/*tt"),
            Err(UriSegmentError::BadStart('*'))
        );
    }

    #[test]
    fn rejects_bad_trailing_chars() {
        assert_eq!(
            sanitize_relative_path("/test/tt:"),
            Err(UriSegmentError::BadEnd(':'))
        );
        assert_eq!(
            sanitize_relative_path("/test/tt<"),
            Err(UriSegmentError::BadEnd('<'))
        );
        assert_eq!(
            sanitize_relative_path("/test/tt>"),
            Err(UriSegmentError::BadEnd('>'))
        );
    }

    #[test]
    fn collapses_empty_segments() {
        assert_eq!(
            sanitize_relative_path("/seg1/seg2/").unwrap(),
            PathBuf::from_iter(["seg1", "seg2"])
        );
    }

    #[test]
    fn dotdot_pops_preceding_segment() {
        assert_eq!(
            sanitize_relative_path("/seg1/../seg2/").unwrap(),
            PathBuf::from_iter(["seg2"])
        );
    }

    #[test]
    fn dotdot_past_root_is_absorbed() {
        assert_eq!(
            sanitize_relative_path("/../../etc/passwd").unwrap(),
            PathBuf::from_iter(["etc", "passwd"])
        );
    }
}
