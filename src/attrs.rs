//! Attribute-set builder
//!
//! Turns host tables into bounded lists of [`Modification`]s. All capacity
//! checks happen here so an oversized request fails before anything is sent.

use crate::{
    error::{Bound, Error, Result},
    model::{Attribute, ModOp, Modification},
    options::Limits,
    value::{self, Table, Value},
};

fn check_bound(bound: Bound, count: usize, limit: usize) -> Result<()> {
    if count > limit {
        Err(Error::BoundsExceeded { bound, count, limit })
    } else {
        Ok(())
    }
}

/// Accumulates modifications of a single kind while accounting for capacity
pub struct AttributeSetBuilder<'a> {
    limits: &'a Limits,
    op: ModOp,
    values: usize,
    cells: usize,
    changes: Vec<Modification>,
}

impl<'a> AttributeSetBuilder<'a> {
    pub fn new(op: ModOp, limits: &'a Limits) -> Self {
        Self {
            limits,
            op,
            values: 0,
            cells: 0,
            changes: Vec::new(),
        }
    }

    /// Add one attribute with a scalar or list value
    pub fn push(&mut self, name: &str, value: &Value) -> Result<()> {
        check_bound(Bound::Attributes, self.changes.len() + 1, self.limits.max_attributes)?;

        let values = self.encode_values(name, value)?;

        let total_values = self.values + values.len();
        check_bound(Bound::Values, total_values, self.limits.max_values)?;

        // each value list is terminated by an extra cell
        let total_cells = self.cells + values.len() + 1;
        check_bound(Bound::Cells, total_cells, self.limits.max_cells)?;

        self.values = total_values;
        self.cells = total_cells;
        self.changes.push(Modification {
            op: self.op,
            attribute: Attribute {
                name: name.to_owned(),
                values,
            },
        });
        Ok(())
    }

    fn encode_values(&self, name: &str, value: &Value) -> Result<Vec<bytes::Bytes>> {
        // `true` in a delete batch removes the whole attribute
        if self.op == ModOp::Delete && *value == Value::Boolean(true) {
            return Ok(Vec::new());
        }

        let values = value::encode(value).map_err(|e| match e {
            Error::InvalidValueType { position, found, .. } => Error::InvalidValueType {
                attribute: Some(name.to_owned()),
                position,
                found,
            },
            other => other,
        })?;

        if values.is_empty() {
            return Err(Error::InvalidValueType {
                attribute: Some(name.to_owned()),
                position: None,
                found: "empty table",
            });
        }
        Ok(values)
    }

    pub fn build(self) -> Vec<Modification> {
        self.changes
    }
}

/// Build modifications from the named fields of a table. Positional entries are ignored.
pub fn build_attributes(table: &Table, op: ModOp, limits: &Limits) -> Result<Vec<Modification>> {
    check_bound(Bound::Attributes, table.field_count(), limits.max_attributes)?;

    let mut builder = AttributeSetBuilder::new(op, limits);
    for (name, value) in table.fields() {
        builder.push(name, value)?;
    }
    Ok(builder.build())
}

/// Build one modify batch. The operation marker is read from the first positional slot.
///
/// A bad marker is reported as batch 0; the caller knows the real batch index.
pub fn build_modify_batch(batch: &Table, limits: &Limits) -> Result<Vec<Modification>> {
    let marker = batch.get(1).unwrap_or(&Value::Nil);
    let op = marker
        .as_str()
        .and_then(ModOp::from_marker)
        .ok_or_else(|| Error::InvalidModifyOperation {
            batch: 0,
            marker: match marker.as_bytes() {
                Some(b) => String::from_utf8_lossy(&b).into_owned(),
                None => format!("<{}>", marker.type_name()),
            },
        })?;

    build_attributes(batch, op, limits)
}

/// Build the list of requested attribute names for a search
pub fn build_attribute_names(names: &Table, limits: &Limits) -> Result<Vec<String>> {
    check_bound(Bound::Attributes, names.len(), limits.max_attributes)?;

    names
        .items()
        .enumerate()
        .map(|(i, name)| {
            name.as_bytes()
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .ok_or(Error::InvalidValueType {
                    attribute: None,
                    position: Some(i + 1),
                    found: name.type_name(),
                })
        })
        .collect()
}
