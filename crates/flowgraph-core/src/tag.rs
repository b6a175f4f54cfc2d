//! Name, tag, and index grammar for stream and side-packet addressing.
//!
//! Every port of every node is addressed with one of the following string
//! forms. The grammar is deliberately small so that addresses stay readable in
//! graph configurations and error messages.
//!
//! ```text
//! name              # untagged, index assigned by position
//! TAG:name          # tagged, index 0
//! TAG:index:name    # tagged, explicit index
//! :index:name       # untagged, explicit index
//! TAG:index         # port reference without a name (back-edge markers)
//! ```
//!
//! ## Grammar
//!
//! ```text
//! name  ::= [a-z_] [a-z0-9_]*
//! tag   ::= [A-Z_] [A-Z0-9_]*
//! index ::= '0' | [1-9] [0-9]*        (at most MAX_INDEX)
//! ```
//!
//! All functions here are pure. Errors carry the offending literal so a
//! caller can point at the exact entry of the configuration.

use core::fmt;

use thiserror::Error;

/// Largest index accepted in `TAG:index:name` and `TAG:index` forms.
pub const MAX_INDEX: u32 = 10_000;

/// Errors produced while parsing or validating addressing strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The name part does not match `[a-z_][a-z0-9_]*`.
    #[error("invalid name \"{name}\" in \"{input}\": names must match [a-z_][a-z0-9_]*")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// The full string the name was taken from.
        input: String,
    },

    /// The tag part does not match `[A-Z_][A-Z0-9_]*`.
    #[error("invalid tag \"{tag}\" in \"{input}\": tags must match [A-Z_][A-Z0-9_]*")]
    InvalidTag {
        /// The rejected tag.
        tag: String,
        /// The full string the tag was taken from.
        input: String,
    },

    /// The index part is not a canonical non-negative integer.
    #[error("invalid index \"{index}\" in \"{input}\": expected digits without a leading zero")]
    InvalidIndex {
        /// The rejected index literal.
        index: String,
        /// The full string the index was taken from.
        input: String,
    },

    /// The index exceeds [`MAX_INDEX`].
    #[error("index \"{index}\" in \"{input}\" exceeds the maximum of {max}")]
    IndexTooLarge {
        /// The rejected index literal.
        index: String,
        /// The full string the index was taken from.
        input: String,
        /// The largest accepted index.
        max: u32,
    },

    /// The string has more `:` separators than its form allows.
    #[error("\"{input}\" has too many ':' separators (at most {max} allowed)")]
    TooManyColons {
        /// The rejected string.
        input: String,
        /// Number of separators accepted by the form.
        max: usize,
    },
}

/// A parsed `TAG:index:name` triple.
///
/// `index` is `None` only for the bare `name` form, where the position of the
/// entry in its list decides the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagIndexName {
    /// Tag, empty for the untagged collection.
    pub tag: String,
    /// Explicit index, if the form carried one.
    pub index: Option<u32>,
    /// Stream or side-packet name.
    pub name: String,
}

impl TagIndexName {
    /// Creates a triple without validating it.
    pub fn new(tag: impl Into<String>, index: Option<u32>, name: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            index,
            name: name.into(),
        }
    }
}

impl fmt::Display for TagIndexName {
    /// Formats the shortest form that parses back to the same triple.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.tag.is_empty(), self.index) {
            (true, None) => write!(f, "{}", self.name),
            (false, Some(0)) => write!(f, "{}:{}", self.tag, self.name),
            (_, Some(index)) => write!(f, "{}:{}:{}", self.tag, index, self.name),
            // A tag always implies an index; keep the tag and let the parser pick 0.
            (false, None) => write!(f, "{}:{}", self.tag, self.name),
        }
    }
}

fn is_valid_ident(s: &str, lower: bool) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let letter = |c: char| {
        if lower {
            c.is_ascii_lowercase()
        } else {
            c.is_ascii_uppercase()
        }
    };
    (letter(first) || first == '_') && chars.all(|c| letter(c) || c.is_ascii_digit() || c == '_')
}

fn check_name(name: &str, input: &str) -> Result<(), NameError> {
    if is_valid_ident(name, true) {
        Ok(())
    } else {
        Err(NameError::InvalidName {
            name: name.to_string(),
            input: input.to_string(),
        })
    }
}

fn check_tag(tag: &str, input: &str) -> Result<(), NameError> {
    if is_valid_ident(tag, false) {
        Ok(())
    } else {
        Err(NameError::InvalidTag {
            tag: tag.to_string(),
            input: input.to_string(),
        })
    }
}

fn parse_index(index: &str, input: &str) -> Result<u32, NameError> {
    let canonical = !index.is_empty()
        && index.bytes().all(|b| b.is_ascii_digit())
        && (index == "0" || !index.starts_with('0'));
    if !canonical {
        return Err(NameError::InvalidIndex {
            index: index.to_string(),
            input: input.to_string(),
        });
    }
    let too_large = || NameError::IndexTooLarge {
        index: index.to_string(),
        input: input.to_string(),
        max: MAX_INDEX,
    };
    let value: u32 = index.parse().map_err(|_| too_large())?;
    if value > MAX_INDEX {
        return Err(too_large());
    }
    Ok(value)
}

/// Validates a stream, side-packet, or executor-free node name.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    check_name(name, name)
}

/// Validates a tag.
pub fn validate_tag(tag: &str) -> Result<(), NameError> {
    check_tag(tag, tag)
}

/// Parses `name` or `TAG:name`.
///
/// Returns `(tag, name)`; the tag is empty for the bare form.
pub fn parse_tag_and_name(input: &str) -> Result<(String, String), NameError> {
    let parts: Vec<&str> = input.split(':').collect();
    match parts.as_slice() {
        [name] => {
            check_name(name, input)?;
            Ok((String::new(), (*name).to_string()))
        }
        [tag, name] => {
            check_tag(tag, input)?;
            check_name(name, input)?;
            Ok(((*tag).to_string(), (*name).to_string()))
        }
        _ => Err(NameError::TooManyColons {
            input: input.to_string(),
            max: 1,
        }),
    }
}

/// Parses `name`, `TAG:name`, or `TAG:index:name`.
///
/// The tag may only be empty when an explicit index follows it (`:2:name`);
/// that form addresses the untagged collection directly.
pub fn parse_tag_index_name(input: &str) -> Result<TagIndexName, NameError> {
    let parts: Vec<&str> = input.split(':').collect();
    match parts.as_slice() {
        [name] => {
            check_name(name, input)?;
            Ok(TagIndexName::new("", None, *name))
        }
        [tag, name] => {
            check_tag(tag, input)?;
            check_name(name, input)?;
            Ok(TagIndexName::new(*tag, Some(0), *name))
        }
        [tag, index, name] => {
            if !tag.is_empty() {
                check_tag(tag, input)?;
            }
            let index = parse_index(index, input)?;
            check_name(name, input)?;
            Ok(TagIndexName::new(*tag, Some(index), *name))
        }
        _ => Err(NameError::TooManyColons {
            input: input.to_string(),
            max: 2,
        }),
    }
}

/// Parses `TAG`, `TAG:index`, or `:index`.
///
/// Both the tag and the index may be omitted; an omitted index is 0. `:3`
/// refers to slot 3 of the untagged collection.
pub fn parse_tag_index(input: &str) -> Result<(String, u32), NameError> {
    let parts: Vec<&str> = input.split(':').collect();
    let (tag, index) = match parts.as_slice() {
        [tag] => (*tag, 0),
        [tag, index] => (*tag, parse_index(index, input)?),
        _ => {
            return Err(NameError::TooManyColons {
                input: input.to_string(),
                max: 1,
            });
        }
    };
    if !tag.is_empty() {
        check_tag(tag, input)?;
    }
    Ok((tag.to_string(), index))
}

/// Splits an address into its `TAG:index:` prefix and its trailing name.
///
/// The prefix keeps its trailing `:` so `prefix + new_name` re-forms a valid
/// address.
pub fn split_name(entry: &str) -> (&str, &str) {
    match entry.rfind(':') {
        Some(pos) => entry.split_at(pos + 1),
        None => ("", entry),
    }
}

/// Returns `entry` with its name part replaced, keeping tag and index text.
pub fn replace_name(entry: &str, name: &str) -> String {
    let (prefix, _) = split_name(entry);
    format!("{prefix}{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_accept_lower_snake_case() {
        for ok in ["a", "_", "video_in", "x2", "_private_9"] {
            assert!(validate_name(ok).is_ok(), "{ok} should be a valid name");
        }
        for bad in ["", "9lives", "Video", "a-b", "a b", "a:b"] {
            assert!(validate_name(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn tags_accept_upper_snake_case() {
        for ok in ["A", "_", "VIDEO", "IMAGE_2"] {
            assert!(validate_tag(ok).is_ok(), "{ok} should be a valid tag");
        }
        for bad in ["", "2D", "video", "A-B"] {
            assert!(validate_tag(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn tag_and_name_forms() {
        assert_eq!(
            parse_tag_and_name("frames").unwrap(),
            (String::new(), "frames".to_string())
        );
        assert_eq!(
            parse_tag_and_name("VIDEO:frames").unwrap(),
            ("VIDEO".to_string(), "frames".to_string())
        );
        assert!(matches!(
            parse_tag_and_name("VIDEO:0:frames"),
            Err(NameError::TooManyColons { max: 1, .. })
        ));
        assert!(matches!(
            parse_tag_and_name(":frames"),
            Err(NameError::InvalidTag { .. })
        ));
    }

    #[test]
    fn tag_index_name_forms() {
        assert_eq!(
            parse_tag_index_name("frames").unwrap(),
            TagIndexName::new("", None, "frames")
        );
        assert_eq!(
            parse_tag_index_name("VIDEO:frames").unwrap(),
            TagIndexName::new("VIDEO", Some(0), "frames")
        );
        assert_eq!(
            parse_tag_index_name("VIDEO:12:frames").unwrap(),
            TagIndexName::new("VIDEO", Some(12), "frames")
        );
        assert_eq!(
            parse_tag_index_name(":3:frames").unwrap(),
            TagIndexName::new("", Some(3), "frames")
        );
        assert!(matches!(
            parse_tag_index_name("A:1:b:c"),
            Err(NameError::TooManyColons { max: 2, .. })
        ));
    }

    #[test]
    fn index_rejects_leading_zero_and_overflow() {
        assert!(parse_tag_index_name("A:0:b").is_ok());
        for bad in ["A:00:b", "A:01:b", "A:-1:b", "A::b", "A:1x:b"] {
            assert!(
                matches!(parse_tag_index_name(bad), Err(NameError::InvalidIndex { .. })),
                "{bad} should have an invalid index"
            );
        }
        assert!(parse_tag_index_name("A:10000:b").is_ok());
        assert!(matches!(
            parse_tag_index_name("A:10001:b"),
            Err(NameError::IndexTooLarge { max: MAX_INDEX, .. })
        ));
        assert!(matches!(
            parse_tag_index_name("A:99999999999999:b"),
            Err(NameError::IndexTooLarge { .. })
        ));
    }

    #[test]
    fn tag_index_forms() {
        assert_eq!(parse_tag_index("VIDEO").unwrap(), ("VIDEO".to_string(), 0));
        assert_eq!(parse_tag_index("VIDEO:2").unwrap(), ("VIDEO".to_string(), 2));
        assert_eq!(parse_tag_index(":3").unwrap(), (String::new(), 3));
        assert_eq!(parse_tag_index("").unwrap(), (String::new(), 0));
        assert!(parse_tag_index("VIDEO:").is_err());
        assert!(parse_tag_index("VIDEO:01").is_err());
        assert!(parse_tag_index("video:1").is_err());
        assert!(parse_tag_index("A:1:2").is_err());
    }

    #[test]
    fn errors_carry_the_literal() {
        let err = parse_tag_index_name("VIDEO:0:Frames").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Frames"), "got: {msg}");
        assert!(msg.contains("VIDEO:0:Frames"), "got: {msg}");
    }

    #[test]
    fn display_round_trips() {
        for triple in [
            TagIndexName::new("", None, "a"),
            TagIndexName::new("", Some(0), "a"),
            TagIndexName::new("", Some(4), "a"),
            TagIndexName::new("TAG", Some(0), "a"),
            TagIndexName::new("TAG", Some(7), "a"),
        ] {
            let text = triple.to_string();
            assert_eq!(parse_tag_index_name(&text).unwrap(), triple, "via {text}");
        }
    }

    #[test]
    fn replace_name_keeps_prefix() {
        assert_eq!(replace_name("VIDEO:1:frames", "out"), "VIDEO:1:out");
        assert_eq!(replace_name("VIDEO:frames", "out"), "VIDEO:out");
        assert_eq!(replace_name("frames", "out"), "out");
        assert_eq!(split_name("A:2:b"), ("A:2:", "b"));
    }
}
