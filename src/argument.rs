// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

use std::fmt;
use std::str::FromStr;

use crate::packet::{FF, read_field};
use crate::{RTError, Result};

/// An AUTHOR/ACCT attribute-value pair, `attr=value` (mandatory) or
/// `attr*value` (optional).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTArgument {
    pub attribute: String,
    pub value: Option<String>,
    pub optional: bool,
}

impl RTArgument {
    pub fn new(attribute: &str, value: Option<&str>, optional: bool) -> Self {
        Self {
            attribute: attribute.to_owned(),
            value: value.map(str::to_owned),
            optional,
        }
    }

    pub fn mandatory(attribute: &str, value: &str) -> Self {
        Self::new(attribute, Some(value), false)
    }

    pub fn optional(attribute: &str, value: &str) -> Self {
        Self::new(attribute, Some(value), true)
    }

    /// Splits at the first `=` or `*`. No separator means no value and a
    /// mandatory argument.
    pub fn parse(arg: &str) -> Self {
        match arg.find(['=', '*']) {
            Some(idx) => {
                let (attribute, rest) = arg.split_at(idx);
                let optional = rest.starts_with('*');
                Self {
                    attribute: attribute.to_owned(),
                    value: rest.get(1..).map(str::to_owned),
                    optional,
                }
            }
            None => Self {
                attribute: arg.to_owned(),
                value: None,
                optional: false,
            },
        }
    }

    /// Decodes an argument pulled from a packet body; lossy on bad UTF-8.
    pub fn from_wire(raw: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(raw))
    }

    pub fn to_wire(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

/// Wire form of an argument list: at most 255 entries, each at most 255
/// bytes, extras silently dropped.
pub(crate) fn args_to_wire(args: &[RTArgument]) -> Vec<Vec<u8>> {
    args.iter()
        .take(FF)
        .map(|a| {
            let mut raw = a.to_wire();
            raw.truncate(FF);
            raw
        })
        .collect()
}

/// Reads `lens.len()` arguments starting at `offset`; returns the next offset.
pub(crate) fn args_from_wire(
    body: &[u8],
    lens: &[u8],
    offset: usize,
) -> Result<(Vec<RTArgument>, usize)> {
    let mut next = offset;
    let mut args = Vec::with_capacity(lens.len());
    for len in lens {
        let (raw, after) = read_field(body, next, usize::from(*len))?;
        args.push(RTArgument::from_wire(&raw));
        next = after;
    }
    Ok((args, next))
}

impl FromStr for RTArgument {
    type Err = RTError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for RTArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.attribute,
            if self.optional { '*' } else { '=' },
            self.value.as_deref().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandatory_argument_parses() {
        let a = RTArgument::parse("service=shell");
        assert_eq!(a.attribute, "service");
        assert_eq!(a.value.as_deref(), Some("shell"));
        assert!(!a.optional, "'=' marks a mandatory argument");
    }

    #[test]
    fn optional_argument_parses() {
        let a: RTArgument = "priv-lvl*15".parse().unwrap();
        assert_eq!(a.attribute, "priv-lvl");
        assert_eq!(a.value.as_deref(), Some("15"));
        assert!(a.optional, "'*' marks an optional argument");
    }

    #[test]
    fn only_first_separator_splits() {
        let a = RTArgument::parse("cmd-arg=a=b*c");
        assert_eq!(a.attribute, "cmd-arg");
        assert_eq!(a.value.as_deref(), Some("a=b*c"));
        assert!(!a.optional);
    }

    #[test]
    fn bare_attribute_has_no_value() {
        let a = RTArgument::parse("acl");
        assert_eq!(a.value, None);
        assert_eq!(a.to_string(), "acl=");
    }

    #[test]
    fn empty_value_is_kept_as_empty() {
        let a = RTArgument::parse("cmd=");
        assert_eq!(a.value.as_deref(), Some(""));
    }

    #[test]
    fn wire_list_caps_count_and_length() {
        let mut args = vec![RTArgument::mandatory("cmd", &"x".repeat(400))];
        args.extend((0..300).map(|i| RTArgument::optional("n", &i.to_string())));
        let wire = args_to_wire(&args);
        assert_eq!(wire.len(), 255);
        assert_eq!(wire[0].len(), 255);
        assert_eq!(wire[1], b"n*0");
    }

    #[test]
    fn wire_list_reads_back() {
        let body = b"service=shellpriv-lvl*15";
        let (args, next) = args_from_wire(body, &[13, 11], 0).unwrap();
        assert_eq!(next, body.len());
        assert_eq!(args[0], RTArgument::mandatory("service", "shell"));
        assert_eq!(args[1], RTArgument::optional("priv-lvl", "15"));
        assert!(matches!(
            args_from_wire(body, &[13, 12], 0),
            Err(RTError::CorruptPacket)
        ));
    }

    #[test]
    fn display_uses_marker() {
        assert_eq!(RTArgument::optional("timeout", "30").to_string(), "timeout*30");
        assert_eq!(RTArgument::mandatory("service", "ppp").to_string(), "service=ppp");
    }
}
