// src/version.rs

//! Package version ordering and dependency expressions
//!
//! Versions follow the `[epoch:]version[-release]` scheme. Comparison is
//! segment-wise (digits compare numerically, letters lexically, a letter
//! segment is always older than a digit one), never plain string order.

use std::cmp::Ordering;
use std::fmt;

/// Compare two full version strings
pub fn vercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let (epoch1, ver1, rel1) = parse_evr(a);
    let (epoch2, ver2, rel2) = parse_evr(b);

    segment_cmp(epoch1, epoch2)
        .then_with(|| segment_cmp(ver1, ver2))
        .then_with(|| match (rel1, rel2) {
            (Some(r1), Some(r2)) => segment_cmp(r1, r2),
            _ => Ordering::Equal,
        })
}

/// Split `epoch:version-release`; the epoch defaults to "0"
fn parse_evr(evr: &str) -> (&str, &str, Option<&str>) {
    let digits = evr.bytes().take_while(u8::is_ascii_digit).count();

    let (epoch, rest) = if evr[digits..].starts_with(':') {
        let epoch = &evr[..digits];
        (if epoch.is_empty() { "0" } else { epoch }, &evr[digits + 1..])
    } else {
        ("0", evr)
    };

    match rest.rfind('-') {
        Some(pos) => (epoch, &rest[..pos], Some(&rest[pos + 1..])),
        None => (epoch, rest, None),
    }
}

/// Compare a single version component (no epoch/release handling)
fn segment_cmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < one.len() && j < two.len() {
        let (sep_start1, sep_start2) = (i, j);
        while i < one.len() && !one[i].is_ascii_alphanumeric() {
            i += 1;
        }
        while j < two.len() && !two[j].is_ascii_alphanumeric() {
            j += 1;
        }

        if i >= one.len() || j >= two.len() {
            break;
        }

        // Differing separator runs decide on their own
        let (sep1, sep2) = (i - sep_start1, j - sep_start2);
        if sep1 != sep2 {
            return sep1.cmp(&sep2);
        }

        let is_num = one[i].is_ascii_digit();
        let (start1, start2) = (i, j);
        if is_num {
            while i < one.len() && one[i].is_ascii_digit() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_digit() {
                j += 1;
            }
        } else {
            while i < one.len() && one[i].is_ascii_alphabetic() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_alphabetic() {
                j += 1;
            }
        }

        // Segments of different kinds: numeric beats alpha
        if start2 == j {
            return if is_num { Ordering::Greater } else { Ordering::Less };
        }

        let mut seg1 = &one[start1..i];
        let mut seg2 = &two[start2..j];

        if is_num {
            seg1 = trim_leading_zeros(seg1);
            seg2 = trim_leading_zeros(seg2);
            match seg1.len().cmp(&seg2.len()) {
                Ordering::Equal => {}
                other => return other,
            }
        }

        match seg1.cmp(seg2) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    let rest1 = &one[i.min(one.len())..];
    let rest2 = &two[j.min(two.len())..];

    if rest1.is_empty() && rest2.is_empty() {
        return Ordering::Equal;
    }

    // A trailing alpha segment never beats an empty one
    let two_alpha = rest2.first().is_some_and(u8::is_ascii_alphabetic);
    let one_alpha = rest1.first().is_some_and(u8::is_ascii_alphabetic);
    if (rest1.is_empty() && !two_alpha) || one_alpha {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

fn trim_leading_zeros(segment: &[u8]) -> &[u8] {
    let zeros = segment.iter().take_while(|&&b| b == b'0').count();
    &segment[zeros..]
}

/// Version constraint operator of a dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepMod {
    Any,
    Eq,
    Ge,
    Le,
    Gt,
    Lt,
}

impl DepMod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepMod::Any => "",
            DepMod::Eq => "=",
            DepMod::Ge => ">=",
            DepMod::Le => "<=",
            DepMod::Gt => ">",
            DepMod::Lt => "<",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            DepMod::Any => true,
            DepMod::Eq => ordering == Ordering::Equal,
            DepMod::Ge => ordering != Ordering::Less,
            DepMod::Le => ordering != Ordering::Greater,
            DepMod::Gt => ordering == Ordering::Greater,
            DepMod::Lt => ordering == Ordering::Less,
        }
    }
}

/// A dependency, conflict or provision expression such as `glibc>=2.17`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Depend {
    pub name: String,
    pub modifier: DepMod,
    pub version: Option<String>,
}

impl Depend {
    /// Parse an expression; an optdepends-style `: description` is dropped
    pub fn parse(expr: &str) -> Self {
        let expr = match expr.split_once(": ") {
            Some((dep, _)) => dep,
            None => expr,
        }
        .trim();

        for (op, modifier) in [
            (">=", DepMod::Ge),
            ("<=", DepMod::Le),
            ("=", DepMod::Eq),
            ("<", DepMod::Lt),
            (">", DepMod::Gt),
        ] {
            if let Some(pos) = expr.find(op) {
                // `name<=x` must not be read as `name<` + `=x`
                let first = expr.find(['<', '>', '=']).unwrap_or(pos);
                if first != pos {
                    continue;
                }
                return Self {
                    name: expr[..pos].to_string(),
                    modifier,
                    version: Some(expr[pos + op.len()..].to_string()),
                };
            }
        }

        Self::any(expr)
    }

    /// Unversioned expression
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifier: DepMod::Any,
            version: None,
        }
    }

    /// Whether a concrete version satisfies this constraint
    pub fn accepts_version(&self, version: &str) -> bool {
        match &self.version {
            Some(wanted) if self.modifier != DepMod::Any => {
                self.modifier.accepts(vercmp(version, wanted))
            }
            _ => true,
        }
    }

    /// Whether a package (name, version, provisions) satisfies this expression
    pub fn is_satisfied_by(&self, name: &str, version: &str, provides: &[Depend]) -> bool {
        if name == self.name && self.accepts_version(version) {
            return true;
        }

        provides.iter().any(|provision| {
            if provision.name != self.name {
                return false;
            }
            match (&provision.version, provision.modifier) {
                (Some(provided), DepMod::Eq) => self.accepts_version(provided),
                // Unversioned provisions only satisfy unversioned dependencies
                _ => self.modifier == DepMod::Any,
            }
        })
    }
}

impl fmt::Display for Depend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, "{}{}", self.modifier.as_str(), version)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_segments_are_not_lexical() {
        assert_eq!(vercmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(vercmp("1.1", "1.0"), Ordering::Greater);
        assert_eq!(vercmp("1.0", "1.0"), Ordering::Equal);
        assert_eq!(vercmp("1.001", "1.1"), Ordering::Equal);
    }

    #[test]
    fn test_release_and_epoch() {
        assert_eq!(vercmp("1.0-2", "1.0-1"), Ordering::Greater);
        assert_eq!(vercmp("1:1.0-1", "2.0-1"), Ordering::Greater);
        assert_eq!(vercmp("0:1.0", "1.0"), Ordering::Equal);
        // Missing release on one side compares equal
        assert_eq!(vercmp("1.0", "1.0-5"), Ordering::Equal);
    }

    #[test]
    fn test_alpha_segments() {
        assert_eq!(vercmp("1.0a", "1.0"), Ordering::Less);
        assert_eq!(vercmp("1.0alpha", "1.0beta"), Ordering::Less);
        assert_eq!(vercmp("1.0.1", "1.0a"), Ordering::Greater);
        assert_eq!(vercmp("1.0rc1", "1.0"), Ordering::Less);
    }

    #[test]
    fn test_separator_lengths() {
        assert_eq!(vercmp("1..0", "1.0"), Ordering::Greater);
        assert_eq!(vercmp("1.0", "1.0.0"), Ordering::Less);
    }

    #[test]
    fn test_parse_depend() {
        let dep = Depend::parse("glibc>=2.17");
        assert_eq!(dep.name, "glibc");
        assert_eq!(dep.modifier, DepMod::Ge);
        assert_eq!(dep.version.as_deref(), Some("2.17"));
        assert_eq!(dep.to_string(), "glibc>=2.17");

        let dep = Depend::parse("readline");
        assert_eq!(dep.modifier, DepMod::Any);
        assert_eq!(dep.to_string(), "readline");

        let dep = Depend::parse("python<3");
        assert_eq!(dep.modifier, DepMod::Lt);

        let dep = Depend::parse("gtk3: graphical frontend");
        assert_eq!(dep, Depend::any("gtk3"));
    }

    #[test]
    fn test_satisfaction() {
        let dep = Depend::parse("bar>=2.0");
        assert!(dep.is_satisfied_by("bar", "2.1-1", &[]));
        assert!(!dep.is_satisfied_by("bar", "1.9-1", &[]));

        let provides = vec![Depend::parse("bar=2.5")];
        assert!(dep.is_satisfied_by("bar-git", "r100-1", &provides));

        let unversioned = vec![Depend::any("bar")];
        assert!(!dep.is_satisfied_by("bar-git", "r100-1", &unversioned));
        assert!(Depend::any("bar").is_satisfied_by("bar-git", "r100-1", &unversioned));
    }
}
