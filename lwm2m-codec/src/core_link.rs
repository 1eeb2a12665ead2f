//! CoRE Link Format (RFC 6690)
//!
//! Devices list the objects and instances they expose as link-format text,
//! for example `</1/0>,</3/0>;ver=1.0,</3303/0>`. Registration bodies and
//! discover responses both use it.

use lwm2m_core::{Lwm2mError, Lwm2mResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static LINK_TARGET: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^<([^<>]*)>(?s)(.*)$"));

static PARAM: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9!#$&+\-.^_`|~*]+)(?:=(?s)(.*))?$"));

fn grammar(regex: &'static LazyLock<Result<Regex, regex::Error>>) -> Lwm2mResult<&'static Regex> {
    LazyLock::force(regex)
        .as_ref()
        .map_err(|e| Lwm2mError::InvalidFormat(format!("Link grammar: {}", e)))
}

/// One link of a link-format document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoreLink {
    uri: String,
    params: BTreeMap<String, Option<String>>,
}

impl CoreLink {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a `name=value` parameter
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), Some(value.into()));
        self
    }

    /// The link target, without the angle brackets
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Value of a parameter; flag parameters without a value yield `""`
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(|value| value.as_deref().unwrap_or(""))
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    /// Whether the link carries `rt="oma.lwm2m"`
    pub fn is_lwm2m_root(&self) -> bool {
        self.param("rt") == Some("oma.lwm2m")
    }

    fn parse_param(param: &str) -> Lwm2mResult<(String, Option<String>)> {
        let captures = grammar(&PARAM)?.captures(param).ok_or_else(|| {
            Lwm2mError::InvalidFormat(format!("Malformed link parameter: {:?}", param))
        })?;
        let name = captures[1].to_string();
        let value = match captures.get(2).map(|m| m.as_str()) {
            None => None,
            Some(raw) if raw.starts_with('"') => {
                if raw.len() < 2 || !raw.ends_with('"') || raw[1..raw.len() - 1].contains('"') {
                    return Err(Lwm2mError::InvalidFormat(format!(
                        "Unterminated quoted value: {:?}",
                        param
                    )));
                }
                Some(raw[1..raw.len() - 1].to_string())
            }
            Some(raw) if raw.contains('"') || raw.contains(char::is_whitespace) => {
                return Err(Lwm2mError::InvalidFormat(format!(
                    "Malformed parameter value: {:?}",
                    param
                )));
            }
            Some(raw) => Some(raw.to_string()),
        };
        Ok((name, value))
    }
}

impl FromStr for CoreLink {
    type Err = Lwm2mError;

    fn from_str(s: &str) -> Lwm2mResult<Self> {
        let captures = grammar(&LINK_TARGET)?
            .captures(s.trim())
            .ok_or_else(|| Lwm2mError::InvalidFormat(format!("Malformed link: {:?}", s)))?;

        let mut link = CoreLink::new(&captures[1]);
        let mut params = split_outside_quotes(&captures[2], ';').into_iter();

        // nothing may sit between the target and the first ';'
        if params.next().is_some_and(|leading| !leading.trim().is_empty()) {
            return Err(Lwm2mError::InvalidFormat(format!("Malformed link: {:?}", s)));
        }

        for param in params {
            let (name, value) = Self::parse_param(param.trim())?;
            link.params.insert(name, value);
        }
        Ok(link)
    }
}

impl fmt::Display for CoreLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.uri)?;
        for (name, value) in &self.params {
            match value {
                None => write!(f, ";{}", name)?,
                Some(v) if !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit() || b == b'.') => {
                    write!(f, ";{}={}", name, v)?
                }
                Some(v) => write!(f, ";{}=\"{}\"", name, v)?,
            }
        }
        Ok(())
    }
}

/// Parse a link-format document
///
/// Malformed entries are skipped; the rest of the document is still
/// returned.
pub fn parse_core_links(s: &str) -> Vec<CoreLink> {
    split_outside_quotes(s, ',')
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse::<CoreLink>() {
            Ok(link) => Some(link),
            Err(e) => {
                log::debug!("Skipping link {:?}: {}", entry, e);
                None
            }
        })
        .collect()
}

/// Serialize links back into a link-format document
pub fn format_core_links(links: &[CoreLink]) -> String {
    links
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn split_outside_quotes(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut in_target = false;
    let mut start = 0;
    for (index, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_target = true,
            '>' if !in_quotes => in_target = false,
            c if c == separator && !in_quotes && !in_target => {
                parts.push(&s[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}
