use std::cmp::Ordering;
use std::fmt;

use crate::error::LoadError;

/// One `/`-delimited piece of a route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `:name`, matching exactly one request segment.
    Param(String),
}

/// A parsed route path such as `/items/:id`.
///
/// The path is split on every `/`, so `/items` and `/items/` have different
/// segment counts and never match each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(path: &str) -> Result<Self, LoadError> {
        if !path.starts_with('/') {
            return Err(LoadError::InvalidRoute {
                path: path.to_string(),
                reason: "path must start with '/'",
            });
        }

        let segments = path
            .split('/')
            .map(|part| match part.strip_prefix(':') {
                Some("") => Err(LoadError::InvalidRoute {
                    path: path.to_string(),
                    reason: "parameter name must not be empty",
                }),
                Some(name) => Ok(Segment::Param(name.to_string())),
                None => Ok(Segment::Literal(part.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns `true` if `parts` (a split request path) matches.
    pub fn matches(&self, parts: &[&str]) -> bool {
        self.segments.len() == parts.len()
            && self.segments.iter().zip(parts).all(|(seg, part)| match seg {
                Segment::Literal(lit) => lit == part,
                Segment::Param(_) => true,
            })
    }

    /// Yields `(name, value)` for every parameter segment.
    pub fn bind<'a>(&'a self, parts: &'a [&'a str]) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.segments
            .iter()
            .zip(parts)
            .filter_map(|(seg, part)| match seg {
                Segment::Param(name) => Some((name.as_str(), *part)),
                Segment::Literal(_) => None,
            })
    }

    /// The path with parameter names erased; equal shapes match equal requests.
    pub fn shape(&self) -> String {
        self.segments
            .iter()
            .map(|seg| match seg {
                Segment::Literal(lit) => lit.as_str(),
                Segment::Param(_) => ":",
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Matching priority: segment by segment, literals before parameters and
    /// literals lexically; then fewer segments first.
    pub(crate) fn priority_cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            let ord = match (a, b) {
                (Segment::Literal(a), Segment::Literal(b)) => a.cmp(b),
                (Segment::Literal(_), Segment::Param(_)) => Ordering::Less,
                (Segment::Param(_), Segment::Literal(_)) => Ordering::Greater,
                (Segment::Param(_), Segment::Param(_)) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.segments.len().cmp(&other.segments.len())
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals_and_params() {
        let p = PathPattern::parse("/items/:id").unwrap();
        assert_eq!(
            p.segments(),
            &[
                Segment::Literal(String::new()),
                Segment::Literal("items".into()),
                Segment::Param("id".into()),
            ]
        );
        assert_eq!(p.shape(), "/items/:");
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(PathPattern::parse("items").is_err());
        assert!(PathPattern::parse("/items/:").is_err());
    }

    #[test]
    fn matches_by_segment_count() {
        let p = PathPattern::parse("/items/:id").unwrap();
        assert!(p.matches(&["", "items", "42"]));
        assert!(!p.matches(&["", "items"]));
        assert!(!p.matches(&["", "items", "42", ""]));
        assert!(!p.matches(&["", "users", "42"]));

        let bound: Vec<_> = p.bind(&["", "items", "42"]).collect();
        assert_eq!(bound, vec![("id", "42")]);
    }

    #[test]
    fn literals_outrank_params() {
        let literal = PathPattern::parse("/items/new").unwrap();
        let param = PathPattern::parse("/items/:id").unwrap();
        assert_eq!(literal.priority_cmp(&param), Ordering::Less);
        assert_eq!(param.priority_cmp(&literal), Ordering::Greater);
    }
}
