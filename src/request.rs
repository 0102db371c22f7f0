//! Protocol request construction

use bytes::Bytes;
use rasn_ldap::{
    AddRequest, AttributeValueAssertion, ChangeOperation, CompareRequest, DelRequest, ModifyRequest,
    ModifyRequestChanges, PartialAttribute, ProtocolOp, SearchRequestDerefAliases,
};

use crate::{
    error::Error,
    filter::parse_filter,
    model::{Attribute, ModOp, Modification, Operation, SearchParams},
};

fn octets(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

impl From<ModOp> for ChangeOperation {
    fn from(op: ModOp) -> Self {
        match op {
            ModOp::Add => ChangeOperation::Add,
            ModOp::Delete => ChangeOperation::Delete,
            ModOp::Replace => ChangeOperation::Replace,
        }
    }
}

impl From<Attribute> for PartialAttribute {
    fn from(attr: Attribute) -> Self {
        PartialAttribute::new(attr.name.into(), attr.values.into_iter().collect())
    }
}

impl From<Attribute> for rasn_ldap::Attribute {
    fn from(attr: Attribute) -> Self {
        rasn_ldap::Attribute::new(attr.name.into(), attr.values.into_iter().collect())
    }
}

impl From<Modification> for ModifyRequestChanges {
    fn from(change: Modification) -> Self {
        ModifyRequestChanges {
            operation: change.op.into(),
            modification: change.attribute.into(),
        }
    }
}

impl From<Operation> for ProtocolOp {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Add { dn, attributes } => ProtocolOp::AddRequest(AddRequest {
                entry: dn.into(),
                attributes: attributes.into_iter().map(|m| m.attribute.into()).collect(),
            }),
            Operation::Delete { dn } => ProtocolOp::DelRequest(DelRequest(dn.into())),
            Operation::Modify { dn, changes } => ProtocolOp::ModifyRequest(ModifyRequest {
                object: dn.into(),
                changes: changes.into_iter().map(Into::into).collect(),
            }),
        }
    }
}

/// Compare request for one attribute value
pub(crate) fn compare_request(dn: &str, attribute: &str, value: Bytes) -> ProtocolOp {
    ProtocolOp::CompareRequest(CompareRequest {
        entry: octets(dn),
        ava: AttributeValueAssertion::new(octets(attribute), value),
    })
}

/// Search request; the filter string is parsed here so a bad filter never reaches the server
pub(crate) fn search_request(params: &SearchParams) -> Result<ProtocolOp, Error> {
    Ok(ProtocolOp::SearchRequest(rasn_ldap::SearchRequest::new(
        octets(&params.base),
        params.scope.into(),
        SearchRequestDerefAliases::NeverDerefAliases,
        params.size_limit,
        params.time_limit,
        params.attrs_only,
        parse_filter(&params.filter)?,
        params
            .attributes
            .iter()
            .flatten()
            .map(|name| octets(name))
            .collect(),
    )))
}
