use http::Method;

use crate::{
    pattern::{Pattern, PatternError},
    PathParams,
};

/// Method bound to a registered route: either a concrete HTTP verb or the
/// `ANY` sentinel, which matches every method that has no more specific
/// registration for the same path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    Verb(Method),
    Any,
}

impl From<Method> for RouteMethod {
    fn from(m: Method) -> Self {
        RouteMethod::Verb(m)
    }
}

/// Error returned while building a [`Router`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The path pattern failed to compile.
    Pattern(PatternError),
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterError::Pattern(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RouterError {}

impl From<PatternError> for RouterError {
    fn from(err: PatternError) -> Self {
        RouterError::Pattern(err)
    }
}

const STANDARD_VERBS: &[Method] = &[
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

struct PathEntry<T> {
    pattern: Pattern,
    methods: Vec<(Method, T)>,
    any: Option<T>,
    /// Precomputed, lexicographically sorted `Allow` header value for this path.
    allow: Vec<String>,
}

impl<T> PathEntry<T> {
    fn recompute_allow(&mut self) {
        let mut set: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

        if self.any.is_some() {
            for verb in STANDARD_VERBS {
                set.insert(verb.as_str().to_owned());
            }
            set.insert(Method::HEAD.as_str().to_owned());
        }

        for (method, _) in &self.methods {
            set.insert(method.as_str().to_owned());
            if *method == Method::GET {
                set.insert(Method::HEAD.as_str().to_owned());
            }
        }

        set.insert(Method::OPTIONS.as_str().to_owned());

        self.allow = set.into_iter().collect();
    }
}

/// Builder for a [`Router`]. See [`Router::build`].
pub struct RouterBuilder<T> {
    entries: Vec<PathEntry<T>>,
}

impl<T> Default for RouterBuilder<T> {
    fn default() -> Self {
        RouterBuilder { entries: Vec::new() }
    }
}

impl<T> RouterBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` for `method` at `path`. `path` MUST already be
    /// normalized (see [`crate::pattern::normalize`]).
    ///
    /// Panics if `(method, path)` (or `(ANY, path)`) was already registered.
    /// Registration happens once, at startup, from code the host controls —
    /// a duplicate route is a programming error, not a recoverable runtime
    /// condition.
    pub fn register(
        &mut self,
        path: &str,
        method: RouteMethod,
        value: T,
    ) -> Result<(), RouterError> {
        let entry_idx = match self.entries.iter().position(|e| e.pattern.as_str() == path) {
            Some(idx) => idx,
            None => {
                let pattern = Pattern::compile(path)?;
                self.entries.push(PathEntry {
                    pattern,
                    methods: Vec::new(),
                    any: None,
                    allow: Vec::new(),
                });
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[entry_idx];

        match method {
            RouteMethod::Any => {
                if entry.any.is_some() {
                    panic!("duplicate route: ANY {path}");
                }
                entry.any = Some(value);
            }
            RouteMethod::Verb(verb) => {
                if entry.methods.iter().any(|(m, _)| *m == verb) {
                    panic!("duplicate route: {verb} {path}");
                }
                entry.methods.push((verb, value));
            }
        }

        entry.recompute_allow();
        Ok(())
    }

    pub fn finish(self) -> Router<T> {
        Router { entries: self.entries }
    }
}

/// The compiled, read-only pattern matcher (C1). Recognizes requests by
/// `(method, path)` per the dispatch rules: exact match, `ANY` fallback,
/// `HEAD`-of-`GET`, auto `OPTIONS`, `405` with `Allow`, and finally `404`.
pub struct Router<T> {
    entries: Vec<PathEntry<T>>,
}

/// The outcome of [`Router::recognize`].
pub enum Matched<'a, T> {
    /// A concrete or `ANY` route matched for the exact requested method.
    Found {
        value: &'a T,
        params: PathParams,
        /// The registered pattern string this request matched, e.g.
        /// `/users/:id` — useful for diagnostics, not re-parsed by callers.
        pattern: &'a str,
    },
    /// `HEAD` was requested and a `GET` route matched; the caller should
    /// invoke `value` and then discard the response body while preserving
    /// headers and status.
    HeadFallsBackToGet {
        value: &'a T,
        params: PathParams,
        pattern: &'a str,
    },
    /// `OPTIONS` was requested on a path that has at least one route.
    AutoOptions { allow: Vec<String> },
    /// The path matched but not for the requested method.
    MethodNotAllowed { allow: Vec<String> },
    /// No route matched the path at all.
    NotFound,
}

impl<T> Router<T> {
    pub fn build() -> RouterBuilder<T> {
        RouterBuilder::new()
    }

    pub fn recognize(&self, method: &Method, path: &str) -> Matched<'_, T> {
        if let Some((value, params, pattern)) = self.find_exact(method, path) {
            return Matched::Found { value, params, pattern };
        }

        if let Some((value, params, pattern)) = self.find_any(path) {
            return Matched::Found { value, params, pattern };
        }

        if *method == Method::HEAD {
            if let Some((value, params, pattern)) = self.find_exact(&Method::GET, path) {
                return Matched::HeadFallsBackToGet { value, params, pattern };
            }
        }

        if let Some(allow) = self.allow_for(path) {
            if *method == Method::OPTIONS {
                return Matched::AutoOptions { allow };
            }
            return Matched::MethodNotAllowed { allow };
        }

        Matched::NotFound
    }

    fn find_exact(&self, method: &Method, path: &str) -> Option<(&T, PathParams, &str)> {
        for entry in &self.entries {
            if let Some(pairs) = entry.pattern.matches(path) {
                if let Some((_, value)) = entry.methods.iter().find(|(m, _)| m == method) {
                    return Some((value, PathParams::new(pairs), entry.pattern.as_str()));
                }
            }
        }
        None
    }

    fn find_any(&self, path: &str) -> Option<(&T, PathParams, &str)> {
        for entry in &self.entries {
            if let Some(pairs) = entry.pattern.matches(path) {
                if let Some(value) = &entry.any {
                    return Some((value, PathParams::new(pairs), entry.pattern.as_str()));
                }
            }
        }
        None
    }

    fn allow_for(&self, path: &str) -> Option<Vec<String>> {
        self.entries
            .iter()
            .find(|entry| entry.pattern.matches(path).is_some())
            .map(|entry| entry.allow.clone())
    }
}
