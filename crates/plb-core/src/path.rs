// Colon-delimited key paths, e.g. `NSNavPanel:Expanded` or `:Window\:Main:Frame`.
// A colon directly after a backslash is part of the segment, and the
// backslash is kept as-is.
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Split a raw path expression into its segments.
///
/// Leading colons are ignored. Never fails: the empty string yields a single
/// empty segment and stray backslashes stay in place.
pub fn resolve(raw: &str) -> Vec<String> {
    let trimmed = raw.trim_start_matches(':');
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut prev = None;
    for ch in trimmed.chars() {
        if ch == ':' && prev != Some('\\') {
            out.push(std::mem::take(&mut cur));
        } else {
            cur.push(ch);
        }
        prev = Some(ch);
    }
    out.push(cur);
    out
}

/// A resolved key path. Always holds at least one segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn parse(raw: &str) -> Self {
        Self {
            segments: resolve(raw),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Intermediate segments and the final key.
    pub fn split_last(&self) -> (&[String], &str) {
        match self.segments.split_last() {
            Some((last, parents)) => (parents, last.as_str()),
            None => (&[], ""),
        }
    }
}

impl FromStr for Path {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Path::parse(s))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::parse(s)
    }
}

impl From<&String> for Path {
    fn from(s: &String) -> Self {
        Path::parse(s)
    }
}

impl From<&Path> for Path {
    fn from(p: &Path) -> Self {
        p.clone()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(":"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_colons() {
        assert_eq!(resolve("server:port"), ["server", "port"]);
        assert_eq!(resolve("single"), ["single"]);
    }

    #[test]
    fn escaped_colon_is_not_a_separator() {
        assert_eq!(resolve("a\\:b:c"), ["a\\:b", "c"]);
        assert_eq!(resolve("a\\\\:b"), ["a\\\\:b"]);
    }

    #[test]
    fn leading_colons_are_stripped() {
        assert_eq!(resolve(":a:b"), ["a", "b"]);
        assert_eq!(resolve(":::a"), ["a"]);
        assert_eq!(resolve(":::"), [""]);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(resolve(""), [""]);
        assert_eq!(resolve("a::b"), ["a", "", "b"]);
        assert_eq!(resolve("a:"), ["a", ""]);
        assert_eq!(resolve("trail\\"), ["trail\\"]);
    }

    #[test]
    fn display_rejoins_segments() {
        let p = Path::parse(":x\\:y:z");
        assert_eq!(p.to_string(), "x\\:y:z");
        assert_eq!(Path::parse(&p.to_string()), p);
        let (parents, last) = p.split_last();
        assert_eq!(parents, ["x\\:y"]);
        assert_eq!(last, "z");
    }
}
