use std::fmt;

/// A single compiled path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// A literal path segment, matched verbatim.
    Static(String),
    /// A `:name` segment — matches exactly one non-`/` token.
    Param(String),
    /// A trailing `*name` segment — matches the remainder of the path, `/`s included.
    Wildcard(String),
}

/// Error returned when a route path does not conform to the pattern grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// A `*name` wildcard segment appeared somewhere other than the final segment.
    WildcardNotLast,
    /// Two segments in the same path bound the same parameter name.
    DuplicateParam(String),
    /// A dynamic segment (`:` or `*`) had no name after the sigil.
    EmptyParamName,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::WildcardNotLast => {
                write!(f, "wildcard `*name` segment must be the last path segment")
            }
            PatternError::DuplicateParam(name) => {
                write!(f, "parameter `{name}` is bound more than once in this path")
            }
            PatternError::EmptyParamName => write!(f, "dynamic segment is missing a name"),
        }
    }
}

impl std::error::Error for PatternError {}

/// A compiled route path: an ordered sequence of [`Segment`]s plus whether the
/// original pattern carried a trailing slash.
///
/// Patterns follow the grammar described for the pattern matcher: segments
/// separated by `/`, a `:name` segment binds any single non-`/` token, and an
/// optional final `*name` segment binds the rest of the path (including `/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

impl Pattern {
    /// Compiles a normalized absolute path (see [`normalize`]) into a [`Pattern`].
    pub fn compile(path: &str) -> Result<Self, PatternError> {
        let trailing_slash = path.len() > 1 && path.ends_with('/');
        let trimmed = path.trim_matches('/');

        let mut segments = Vec::new();
        let mut seen = std::collections::HashSet::new();

        if !trimmed.is_empty() {
            let parts: Vec<&str> = trimmed.split('/').collect();
            let last = parts.len() - 1;

            for (i, part) in parts.into_iter().enumerate() {
                if let Some(name) = part.strip_prefix('*') {
                    if name.is_empty() {
                        return Err(PatternError::EmptyParamName);
                    }
                    if i != last {
                        return Err(PatternError::WildcardNotLast);
                    }
                    if !seen.insert(name.to_owned()) {
                        return Err(PatternError::DuplicateParam(name.to_owned()));
                    }
                    segments.push(Segment::Wildcard(name.to_owned()));
                } else if let Some(name) = part.strip_prefix(':') {
                    if name.is_empty() {
                        return Err(PatternError::EmptyParamName);
                    }
                    if !seen.insert(name.to_owned()) {
                        return Err(PatternError::DuplicateParam(name.to_owned()));
                    }
                    segments.push(Segment::Param(name.to_owned()));
                } else {
                    segments.push(Segment::Static(part.to_owned()));
                }
            }
        }

        Ok(Pattern {
            raw: path.to_owned(),
            segments,
            trailing_slash,
        })
    }

    /// The original pattern string, as given to [`Pattern::compile`].
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this pattern's final segment is a `*name` wildcard.
    pub fn has_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard(_)))
    }

    /// Attempts to match `path` against this pattern, returning the bound
    /// parameters on success.
    ///
    /// Trailing-slash sensitivity: a pattern with a trailing slash only
    /// matches paths that also have one (and vice versa), except when the
    /// pattern is the wildcard catch-all, for which a trailing slash is
    /// irrelevant to the match (the wildcard segment consumes it).
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        if !self.has_wildcard() && (path.len() > 1 && path.ends_with('/')) != self.trailing_slash {
            return None;
        }

        let trimmed = path.trim_matches('/');
        let req_parts: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };

        let mut params = Vec::new();
        let mut req_idx = 0;

        for seg in self.segments.iter() {
            match seg {
                Segment::Wildcard(name) => {
                    let remainder = if req_idx >= req_parts.len() {
                        String::new()
                    } else {
                        req_parts[req_idx..].join("/")
                    };
                    params.push((name.clone(), remainder));
                    return Some(params);
                }
                Segment::Static(expected) => {
                    let actual = req_parts.get(req_idx)?;
                    if actual != expected {
                        return None;
                    }
                    req_idx += 1;
                }
                Segment::Param(name) => {
                    let actual = req_parts.get(req_idx)?;
                    params.push((name.clone(), (*actual).to_owned()));
                    req_idx += 1;
                }
            }
        }

        if req_idx == req_parts.len() {
            Some(params)
        } else {
            None
        }
    }
}

/// Normalizes an absolute path: collapses an empty path to `/`, collapses
/// repeated `/` separators, and preserves an intentional single trailing
/// slash (distinguishing `/foo` from `/foo/`).
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }

    let had_trailing_slash = path.len() > 1 && path.ends_with('/');
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');

    let mut prev_was_slash = true;
    for ch in path.chars() {
        if ch == '/' {
            if !prev_was_slash {
                out.push('/');
            }
            prev_was_slash = true;
        } else {
            out.push(ch);
            prev_was_slash = false;
        }
    }

    if out.len() > 1 && out.ends_with('/') && !had_trailing_slash {
        out.pop();
    }
    if had_trailing_slash && !out.ends_with('/') {
        out.push('/');
    }

    out
}
