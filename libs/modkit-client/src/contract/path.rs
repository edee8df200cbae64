use std::fmt;

/// Joins path fragments with a single `/`.
///
/// Leading separators of every fragment are stripped, and so are trailing
/// ones of every fragment but the last: `["/users", "/"]` joins to `/users/`.
/// Empty fragments are skipped and the result always starts with `/`.
pub(crate) fn join_paths<'a>(fragments: impl IntoIterator<Item = &'a str>) -> String {
    let mut joined = String::new();
    let mut fragments = fragments.into_iter().peekable();
    while let Some(fragment) = fragments.next() {
        let last = fragments.peek().is_none();
        let trimmed = fragment.trim_start_matches('/');
        let trimmed = if last {
            trimmed
        } else {
            trimmed.trim_end_matches('/')
        };
        if trimmed.is_empty() {
            if last && !fragment.is_empty() {
                joined.push('/');
            }
            continue;
        }
        joined.push('/');
        joined.push_str(trimmed);
    }
    if joined.is_empty() {
        joined.push('/');
    }
    joined
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// Parsed `/users/{id}/orders` style template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

/// Template variable with no bound value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MissingVariable(pub String);

impl PathTemplate {
    /// Returns `None` for unbalanced braces or an empty variable name.
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        let mut segments = Vec::new();
        let mut rest = raw;
        while let Some(open) = rest.find(['{', '}']) {
            if rest.as_bytes()[open] == b'}' {
                return None;
            }
            let after = &rest[open + 1..];
            let close = after.find('}')?;
            let name = after[..close].trim();
            if name.is_empty() || name.contains('{') {
                return None;
            }
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_owned()));
            }
            segments.push(Segment::Variable(name.to_owned()));
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_owned()));
        }
        Some(Self {
            raw: raw.to_owned(),
            segments,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Variable names in template order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Expands the template; `lookup` returns already-encoded values.
    pub(crate) fn expand<'a>(
        &self,
        lookup: impl Fn(&str) -> Option<&'a str>,
    ) -> Result<String, MissingVariable> {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    out.push_str(lookup(name).ok_or_else(|| MissingVariable(name.clone()))?);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for MissingVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing path variable `{}`", self.0)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
