//! Data structures

use std::collections::BTreeMap;

use bytes::Bytes;
pub use rasn_ldap::ResultCode;

use crate::{
    error::OperationError,
    value::{self, Table, Value},
};

/// Message id correlating an asynchronous request with its results
pub type MessageId = u32;

/// LDAP attribute definition
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Attribute values
    pub values: Vec<Bytes>,
}

pub type Attributes = Vec<Attribute>;

impl From<rasn_ldap::PartialAttribute> for Attribute {
    fn from(raw: rasn_ldap::PartialAttribute) -> Self {
        Attribute {
            name: String::from_utf8_lossy(&raw.r#type).into_owned(),
            values: raw.vals.into_iter().collect(),
        }
    }
}

/// Modification kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Delete,
    Replace,
}

impl ModOp {
    /// Parse a modify batch marker: `+` add, `-` delete, `=` replace
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "+" => Some(ModOp::Add),
            "-" => Some(ModOp::Delete),
            "=" => Some(ModOp::Replace),
            _ => None,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            ModOp::Add => "+",
            ModOp::Delete => "-",
            ModOp::Replace => "=",
        }
    }
}

/// Attribute tagged with a modification kind
#[derive(Clone, Debug, PartialEq)]
pub struct Modification {
    pub op: ModOp,
    pub attribute: Attribute,
}

/// Update operation submitted to the directory
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Add { dn: String, attributes: Vec<Modification> },
    Delete { dn: String },
    Modify { dn: String, changes: Vec<Modification> },
}

impl Operation {
    pub fn dn(&self) -> &str {
        match self {
            Operation::Add { dn, .. } | Operation::Delete { dn } | Operation::Modify { dn, .. } => dn,
        }
    }
}

/// Search scope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Scope {
    Base,
    OneLevel,
    #[default]
    Subtree,
}

impl Scope {
    /// Parse a scope string by its first character: `b`ase, `o`nelevel or `s`ubtree.
    /// Anything else selects the default scope (subtree).
    pub fn parse(s: &str) -> Self {
        match s.as_bytes().first() {
            Some(b'b') => Scope::Base,
            Some(b'o') => Scope::OneLevel,
            Some(b's') => Scope::Subtree,
            _ => Scope::default(),
        }
    }
}

impl From<Scope> for rasn_ldap::SearchRequestScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Base => rasn_ldap::SearchRequestScope::BaseObject,
            Scope::OneLevel => rasn_ldap::SearchRequestScope::SingleLevel,
            Scope::Subtree => rasn_ldap::SearchRequestScope::WholeSubtree,
        }
    }
}

/// Parameters of a search submission
#[derive(Clone, Debug, PartialEq)]
pub struct SearchParams {
    pub base: String,
    pub scope: Scope,
    pub filter: String,
    /// Requested attribute names, `None` requests all attributes
    pub attributes: Option<Vec<String>>,
    pub attrs_only: bool,
    pub size_limit: u32,
    pub time_limit: u32,
}

/// Search entry as delivered by the directory, before decoding
#[derive(Clone, Debug, PartialEq)]
pub struct RawEntry {
    pub dn: Bytes,
    pub attributes: Attributes,
}

impl From<rasn_ldap::SearchResultEntry> for RawEntry {
    fn from(raw: rasn_ldap::SearchResultEntry) -> Self {
        RawEntry {
            dn: raw.object_name,
            attributes: raw.attributes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Search result message, classified once at the directory boundary
#[derive(Clone, Debug, PartialEq)]
pub enum SearchMessage {
    Entry(RawEntry),
    Reference(Vec<String>),
    Done(Result<(), OperationError>),
    /// Any message that has no place in a search exchange
    Unexpected(String),
}

/// Decoded directory entry
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Entry {
    pub dn: String,
    pub attributes: BTreeMap<String, Value>,
}

impl Entry {
    /// Decode a raw entry, keeping the multiplicity of every attribute
    pub fn decode(raw: RawEntry) -> Self {
        Entry {
            dn: String::from_utf8_lossy(&raw.dn).into_owned(),
            attributes: raw
                .attributes
                .into_iter()
                .map(|attr| (attr.name, value::decode(attr.values)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Host-side table with the DN stored under `dn`
    pub fn to_value(&self) -> Value {
        let mut table = Table::new();
        for (name, value) in &self.attributes {
            table.set(name.as_str(), value.clone());
        }
        table.set("dn", self.dn.as_str());
        Value::Table(table)
    }
}

impl From<RawEntry> for Entry {
    fn from(raw: RawEntry) -> Self {
        Entry::decode(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parse() {
        assert_eq!(Scope::parse("base"), Scope::Base);
        assert_eq!(Scope::parse("onelevel"), Scope::OneLevel);
        assert_eq!(Scope::parse("subtree"), Scope::Subtree);
        assert_eq!(Scope::parse("s"), Scope::Subtree);
        assert_eq!(Scope::parse("Base"), Scope::default());
        assert_eq!(Scope::parse(""), Scope::default());
    }

    #[test]
    fn test_mod_markers() {
        assert_eq!(ModOp::from_marker("+"), Some(ModOp::Add));
        assert_eq!(ModOp::from_marker("-"), Some(ModOp::Delete));
        assert_eq!(ModOp::from_marker("="), Some(ModOp::Replace));
        assert_eq!(ModOp::from_marker("add"), None);
    }

    #[test]
    fn test_entry_decode() {
        let raw = RawEntry {
            dn: Bytes::from("cn=Alice,dc=example"),
            attributes: vec![
                Attribute {
                    name: "cn".to_owned(),
                    values: vec![Bytes::from("Alice")],
                },
                Attribute {
                    name: "mail".to_owned(),
                    values: vec![Bytes::from("a@example.com"), Bytes::from("alice@example.com")],
                },
            ],
        };

        let entry = Entry::decode(raw);
        assert_eq!(entry.dn, "cn=Alice,dc=example");
        assert_eq!(entry.get("cn"), Some(&Value::from("Alice")));
        assert_eq!(
            entry.get("mail"),
            Some(&Value::from(vec!["a@example.com", "alice@example.com"]))
        );

        let value = entry.to_value();
        let table = value.as_table().unwrap();
        assert_eq!(table.field("dn"), Some(&Value::from("cn=Alice,dc=example")));
        assert_eq!(table.field_count(), 3);
    }
}
