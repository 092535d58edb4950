//! Module specifier parsing.
//!
//! Classifies URLs by scheme and parses package specifiers like:
//! - `npm:react`
//! - `npm:react@18.2.0/jsx-runtime`
//! - `npm:@types/node@^20`
//! - `jsr:@std/path@^1.0.0/posix`

use crate::error::{LoaderError, Result};
use std::fmt;
use url::Url;

/// A package reference parsed from an `npm:` or `jsr:` specifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageRef {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Version or version constraint, if one was given.
    pub version: Option<String>,
    /// Sub-path inside the package, including its leading `/`.
    pub path: Option<String>,
}

impl PackageRef {
    /// `name` or `name@version`, the key used for lockfile lookups.
    #[must_use]
    pub fn package_req(&self) -> String {
        match &self.version {
            Some(version) => format!("{}@{version}", self.name),
            None => self.name.clone(),
        }
    }

    /// Check if this is a scoped package.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.name.starts_with('@')
    }

    /// Get the unscoped portion of the name.
    ///
    /// For `@scope/name`, returns `name`.
    /// For `react`, returns `react`.
    #[must_use]
    pub fn unscoped_name(&self) -> &str {
        unscoped_name(&self.name)
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.package_req())?;
        if let Some(path) = &self.path {
            write!(f, "{path}")?;
        }
        Ok(())
    }
}

/// Strip the `@scope/` prefix from a package name.
#[must_use]
pub fn unscoped_name(name: &str) -> &str {
    if name.starts_with('@') {
        name.split_once('/').map_or(name, |(_, rest)| rest)
    } else {
        name
    }
}

/// A module specifier classified by scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specifier {
    File(Url),
    Http(Url),
    Data(Url),
    Npm(PackageRef),
    Jsr(PackageRef),
    /// Node built-in, e.g. `fs` or `fs/promises`.
    Node(String),
}

impl Specifier {
    /// Classify a URL.
    ///
    /// # Errors
    /// Returns an error for unsupported schemes and malformed `npm:`/`jsr:` specifiers.
    pub fn parse(url: &Url) -> Result<Self> {
        match url.scheme() {
            "file" => Ok(Self::File(url.clone())),
            "http" | "https" => Ok(Self::Http(url.clone())),
            "data" => Ok(Self::Data(url.clone())),
            "npm" => parse_npm_specifier(url).map(Self::Npm),
            "jsr" => parse_jsr_specifier(url).map(Self::Jsr),
            "node" => Ok(Self::Node(url.path().to_string())),
            _ => Err(LoaderError::unsupported_scheme(url.as_str())),
        }
    }

    /// The scheme this specifier was parsed from.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Http(url) if url.scheme() == "http" => "http",
            Self::Http(_) => "https",
            Self::Data(_) => "data",
            Self::Npm(_) => "npm",
            Self::Jsr(_) => "jsr",
            Self::Node(_) => "node",
        }
    }
}

/// Parse an `npm:` specifier URL.
///
/// # Errors
/// Returns `Invalid npm specifier` if the package name is empty or malformed.
pub fn parse_npm_specifier(url: &Url) -> Result<PackageRef> {
    parse_package_ref("npm", url.as_str(), url.path())
}

/// Parse a `jsr:` specifier URL.
///
/// # Errors
/// Returns `Invalid jsr specifier` if the package name is empty or malformed.
pub fn parse_jsr_specifier(url: &Url) -> Result<PackageRef> {
    parse_package_ref("jsr", url.as_str(), url.path())
}

/// Split `[@scope/]name[@version][/path]` into its parts.
///
/// After the name boundary, the first `@` starts the version and the first
/// `/` starts the sub-path; whichever comes first ends the name.
fn parse_package_ref(kind: &str, specifier: &str, path: &str) -> Result<PackageRef> {
    let input = path.strip_prefix('/').unwrap_or(path);
    let invalid = || LoaderError::invalid_specifier(kind, specifier);

    // For scoped packages the name runs through the second segment.
    let name_start = if input.starts_with('@') {
        let slash = input.find('/').ok_or_else(invalid)?;
        if slash == 1 {
            return Err(invalid());
        }
        slash + 1
    } else {
        0
    };

    let rest = &input[name_start..];
    let at = rest.find('@');
    let slash = rest.find('/');

    let (name_len, version, sub_path) = match (at, slash) {
        (Some(a), Some(s)) if a < s => (a, Some(&rest[a + 1..s]), Some(&rest[s..])),
        (Some(a), None) => (a, Some(&rest[a + 1..]), None),
        (_, Some(s)) => (s, None, Some(&rest[s..])),
        (None, None) => (rest.len(), None, None),
    };

    if name_len == 0 {
        return Err(invalid());
    }
    if version.is_some_and(str::is_empty) {
        return Err(invalid());
    }

    Ok(PackageRef {
        name: input[..name_start + name_len].to_string(),
        version: version.map(String::from),
        path: sub_path.map(String::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npm(s: &str) -> Result<PackageRef> {
        parse_npm_specifier(&Url::parse(s).unwrap())
    }

    fn jsr(s: &str) -> Result<PackageRef> {
        parse_jsr_specifier(&Url::parse(s).unwrap())
    }

    fn pkg(name: &str, version: Option<&str>, path: Option<&str>) -> PackageRef {
        PackageRef {
            name: name.to_string(),
            version: version.map(String::from),
            path: path.map(String::from),
        }
    }

    #[test]
    fn test_scoped_full() {
        assert_eq!(
            npm("npm:@scope/name@1.2.3/sub/path").unwrap(),
            pkg("@scope/name", Some("1.2.3"), Some("/sub/path"))
        );
    }

    #[test]
    fn test_scoped_bare() {
        assert_eq!(
            npm("npm:@scope/name").unwrap(),
            pkg("@scope/name", None, None)
        );
    }

    #[test]
    fn test_scoped_with_version() {
        assert_eq!(
            npm("npm:@scope/name@1.2.3").unwrap(),
            pkg("@scope/name", Some("1.2.3"), None)
        );
    }

    #[test]
    fn test_unscoped_path_without_version() {
        assert_eq!(
            npm("npm:left-pad/index.js").unwrap(),
            pkg("left-pad", None, Some("/index.js"))
        );
        assert_eq!(
            npm("npm:name/sub/path").unwrap(),
            pkg("name", None, Some("/sub/path"))
        );
    }

    #[test]
    fn test_at_sign_inside_subpath_is_not_a_version() {
        assert_eq!(
            npm("npm:name/sub@x").unwrap(),
            pkg("name", None, Some("/sub@x"))
        );
    }

    #[test]
    fn test_leading_slash_stripped() {
        assert_eq!(
            npm("npm:/preact@10.19.2").unwrap(),
            pkg("preact", Some("10.19.2"), None)
        );
    }

    #[test]
    fn test_version_range() {
        assert_eq!(
            jsr("jsr:@std/path@^1.0.0").unwrap(),
            pkg("@std/path", Some("^1.0.0"), None)
        );
        assert_eq!(
            jsr("jsr:@std/path@^1.0.0/posix").unwrap(),
            pkg("@std/path", Some("^1.0.0"), Some("/posix"))
        );
    }

    #[test]
    fn test_invalid_specifiers() {
        let err = npm("npm:@").unwrap_err();
        assert_eq!(err.message(), "Invalid npm specifier: npm:@");

        assert!(npm("npm:").is_err());
        assert!(npm("npm:@scope").is_err());
        assert!(npm("npm:@scope/").is_err());
        assert!(npm("npm:@/name").is_err());
        assert!(npm("npm:react@").is_err());

        let err = jsr("jsr:@").unwrap_err();
        assert_eq!(err.message(), "Invalid jsr specifier: jsr:@");
    }

    #[test]
    fn test_display_round_trips() {
        let reference = npm("npm:@scope/name@1.2.3/sub/path").unwrap();
        assert_eq!(reference.to_string(), "@scope/name@1.2.3/sub/path");
        assert_eq!(reference.package_req(), "@scope/name@1.2.3");
        assert_eq!(reference.unscoped_name(), "name");
        assert!(reference.is_scoped());
    }

    #[test]
    fn test_classify_schemes() {
        let cases = [
            ("file:///a/b.ts", "file"),
            ("http://x.test/a.ts", "http"),
            ("https://x.test/a.ts", "https"),
            ("data:text/javascript,1", "data"),
            ("npm:preact", "npm"),
            ("jsr:@std/path", "jsr"),
            ("node:fs", "node"),
        ];
        for (input, scheme) in cases {
            let spec = Specifier::parse(&Url::parse(input).unwrap()).unwrap();
            assert_eq!(spec.scheme(), scheme, "{input}");
        }
    }

    #[test]
    fn test_node_payload() {
        let spec = Specifier::parse(&Url::parse("node:fs/promises").unwrap()).unwrap();
        assert_eq!(spec, Specifier::Node("fs/promises".to_string()));
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = Specifier::parse(&Url::parse("ftp://x.test/a.js").unwrap()).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::SPECIFIER_UNSUPPORTED_SCHEME);
    }
}
