//! Identifiers for MeshBases, MeshObjects and meta-model types.
//!
//! A `NetMeshObjectIdentifier` is a `(home MeshBase, local id)` pair. An
//! absent local id designates the distinguished home object of that MeshBase.
//! External form is `base#local`, or just `base` for the home object.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ReplError, Result};

/// Separates the MeshBase part from the local part of an object identifier.
pub const SEPARATOR: char = '#';

/// Separates hops in an access path.
pub const PATH_SEPARATOR: char = '!';

/// Characters that mark a local id as a global identifier and are rejected.
const FORBIDDEN_IN_LOCAL_ID: [char; 2] = ['.', SEPARATOR];

const RANDOM_LOCAL_ID_LEN: usize = 16;

fn invalid(msg: impl Into<String>) -> ReplError {
    ReplError::Identifier { msg: msg.into() }
}

/// Names one MeshBase, typically with a URL-like string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetMeshBaseIdentifier(String);

impl NetMeshBaseIdentifier {
    /// Create from an external form; rejects empty strings, whitespace, `#` and `!`.
    pub fn create(external_form: impl Into<String>) -> Result<Self> {
        let s = external_form.into();
        if s.is_empty() {
            return Err(invalid("empty mesh base identifier"));
        }
        if let Some(c) = s
            .chars()
            .find(|c| c.is_whitespace() || *c == SEPARATOR || *c == PATH_SEPARATOR)
        {
            return Err(invalid(format!("mesh base identifier {s:?} contains {c:?}")));
        }
        Ok(Self(s))
    }

    /// Parse an external form.
    pub fn from_external_form(s: &str) -> Result<Self> {
        Self::create(s)
    }

    /// The external form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The external form as an owned string.
    pub fn to_external_form(&self) -> String {
        self.0.clone()
    }
}

impl fmt::Display for NetMeshBaseIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NetMeshBaseIdentifier {
    type Error = ReplError;

    fn try_from(s: String) -> Result<Self> {
        Self::create(s)
    }
}

impl From<NetMeshBaseIdentifier> for String {
    fn from(id: NetMeshBaseIdentifier) -> String {
        id.0
    }
}

/// Identifies one MeshObject across all MeshBases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetMeshObjectIdentifier {
    base: NetMeshBaseIdentifier,
    local_id: Option<String>,
}

impl NetMeshObjectIdentifier {
    /// Create an identifier. An empty or absent `local_id` names the home object.
    pub fn create(base: NetMeshBaseIdentifier, local_id: Option<&str>) -> Result<Self> {
        let local_id = match local_id {
            None | Some("") => None,
            Some(local) => {
                if let Some(c) = local.chars().find(|c| FORBIDDEN_IN_LOCAL_ID.contains(c)) {
                    return Err(invalid(format!("local id {local:?} must not contain {c:?}")));
                }
                Some(local.to_string())
            }
        };
        Ok(Self { base, local_id })
    }

    /// The home object of `base`.
    pub fn home_object(base: NetMeshBaseIdentifier) -> Self {
        Self {
            base,
            local_id: None,
        }
    }

    /// The MeshBase this identifier was minted in.
    pub fn base(&self) -> &NetMeshBaseIdentifier {
        &self.base
    }

    /// The local part, absent for the home object.
    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    /// Returns true if this names the home object of its MeshBase.
    pub fn identifies_home_object(&self) -> bool {
        self.local_id.is_none()
    }

    /// `base#local`, or `base` for the home object.
    pub fn to_external_form(&self) -> String {
        match &self.local_id {
            Some(local) => format!("{}{}{}", self.base, SEPARATOR, local),
            None => self.base.to_external_form(),
        }
    }

    /// `#local`, or the empty string for the home object.
    pub fn to_local_external_form(&self) -> String {
        match &self.local_id {
            Some(local) => format!("{SEPARATOR}{local}"),
            None => String::new(),
        }
    }

    /// Parse `base#local` or `base`.
    pub fn from_external_form(s: &str) -> Result<Self> {
        match s.split_once(SEPARATOR) {
            Some((base, local)) => Self::create(NetMeshBaseIdentifier::create(base)?, Some(local)),
            None => Ok(Self::home_object(NetMeshBaseIdentifier::create(s)?)),
        }
    }

    /// Parse an external form that may omit the MeshBase (`#local` or empty).
    pub fn from_external_form_relative(default_base: &NetMeshBaseIdentifier, s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::home_object(default_base.clone()));
        }
        match s.strip_prefix(SEPARATOR) {
            Some(local) => Self::create(default_base.clone(), Some(local)),
            None => Self::from_external_form(s),
        }
    }
}

impl fmt::Display for NetMeshObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_external_form())
    }
}

impl TryFrom<String> for NetMeshObjectIdentifier {
    type Error = ReplError;

    fn try_from(s: String) -> Result<Self> {
        Self::from_external_form(&s)
    }
}

impl From<NetMeshObjectIdentifier> for String {
    fn from(id: NetMeshObjectIdentifier) -> String {
        id.to_external_form()
    }
}

/// Mints object identifiers for one MeshBase.
#[derive(Debug, Clone)]
pub struct NetMeshObjectIdentifierFactory {
    base: NetMeshBaseIdentifier,
}

impl NetMeshObjectIdentifierFactory {
    /// Create a factory for `base`.
    pub fn new(base: NetMeshBaseIdentifier) -> Self {
        Self { base }
    }

    /// Identifier of the home object.
    pub fn home_object_identifier(&self) -> NetMeshObjectIdentifier {
        NetMeshObjectIdentifier::home_object(self.base.clone())
    }

    /// Identifier with the given local id.
    pub fn create_identifier(&self, local_id: &str) -> Result<NetMeshObjectIdentifier> {
        NetMeshObjectIdentifier::create(self.base.clone(), Some(local_id))
    }

    /// Identifier with a fresh random local id.
    pub fn create_random_identifier(&self) -> NetMeshObjectIdentifier {
        let local: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_LOCAL_ID_LEN)
            .map(char::from)
            .collect();
        NetMeshObjectIdentifier {
            base: self.base.clone(),
            local_id: Some(local),
        }
    }

    /// Parse, resolving `#local` against this factory's MeshBase.
    pub fn from_external_form(&self, s: &str) -> Result<NetMeshObjectIdentifier> {
        NetMeshObjectIdentifier::from_external_form_relative(&self.base, s)
    }
}

/// Names an entity type, role type or property type of the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeshTypeIdentifier(String);

impl MeshTypeIdentifier {
    /// Create a type identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MeshTypeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MeshTypeIdentifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn m1() -> NetMeshBaseIdentifier {
        NetMeshBaseIdentifier::create("http://m1.example.org/").unwrap()
    }

    mod base_identifier {
        use super::*;

        #[test]
        fn test_rejects_empty() {
            assert!(NetMeshBaseIdentifier::create("").is_err());
        }

        #[test]
        fn test_rejects_separators() {
            assert!(NetMeshBaseIdentifier::create("http://a#b").is_err());
            assert!(NetMeshBaseIdentifier::create("http://a!b").is_err());
            assert!(NetMeshBaseIdentifier::create("http://a b").is_err());
        }

        #[test]
        fn test_display_is_external_form() {
            assert_eq!(m1().to_string(), "http://m1.example.org/");
        }
    }

    mod object_identifier {
        use super::*;

        #[test]
        fn test_home_object_external_form() {
            let id = NetMeshObjectIdentifier::home_object(m1());
            assert!(id.identifies_home_object());
            assert_eq!(id.to_external_form(), m1().to_external_form());
            assert_eq!(id.to_local_external_form(), "");
        }

        #[test]
        fn test_empty_local_id_is_home_object() {
            let id = NetMeshObjectIdentifier::create(m1(), Some("")).unwrap();
            assert!(id.identifies_home_object());
        }

        #[test]
        fn test_local_external_form() {
            let id = NetMeshObjectIdentifier::create(m1(), Some("abc")).unwrap();
            assert!(!id.identifies_home_object());
            assert_eq!(id.to_external_form(), "http://m1.example.org/#abc");
            assert_eq!(id.to_local_external_form(), "#abc");
        }

        #[test]
        fn test_rejects_dot_in_local_id() {
            let err = NetMeshObjectIdentifier::create(m1(), Some("a.b")).unwrap_err();
            assert!(matches!(err, ReplError::Identifier { .. }));
        }

        #[test]
        fn test_parse_relative() {
            let id = NetMeshObjectIdentifier::from_external_form_relative(&m1(), "#xyz").unwrap();
            assert_eq!(id.base(), &m1());
            assert_eq!(id.local_id(), Some("xyz"));

            let home = NetMeshObjectIdentifier::from_external_form_relative(&m1(), "").unwrap();
            assert!(home.identifies_home_object());
        }

        #[test]
        fn test_serializes_as_string() {
            let id = NetMeshObjectIdentifier::create(m1(), Some("abc")).unwrap();
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, "\"http://m1.example.org/#abc\"");
            let back: NetMeshObjectIdentifier = serde_json::from_str(&json).unwrap();
            assert_eq!(back, id);
        }
    }

    mod factory {
        use super::*;

        #[test]
        fn test_random_identifiers_differ() {
            let factory = NetMeshObjectIdentifierFactory::new(m1());
            let a = factory.create_random_identifier();
            let b = factory.create_random_identifier();
            assert_ne!(a, b);
            assert_eq!(a.local_id().map(str::len), Some(RANDOM_LOCAL_ID_LEN));
        }

        #[test]
        fn test_resolves_against_own_base() {
            let factory = NetMeshObjectIdentifierFactory::new(m1());
            assert_eq!(
                factory.from_external_form("#q").unwrap(),
                factory.create_identifier("q").unwrap()
            );
        }
    }

    proptest! {
        #[test]
        fn prop_external_form_parses_back(base in "[a-z]{1,8}://[a-z0-9./]{1,16}", local in "[A-Za-z0-9_-]{0,12}") {
            let base = NetMeshBaseIdentifier::create(base).unwrap();
            let id = NetMeshObjectIdentifier::create(base, Some(&local)).unwrap();
            let parsed = NetMeshObjectIdentifier::from_external_form(&id.to_external_form()).unwrap();
            prop_assert_eq!(parsed, id);
        }
    }
}
