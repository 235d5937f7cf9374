//! Thin wrappers around scalar values.
//!
//! Each wrapper converts into its raw scalar through [`IntoValue`], so a
//! wrapper nested anywhere inside an attribute value is stored (and hashed)
//! exactly like the scalar it wraps. A wrapper can also be turned into a data
//! node holding the scalar under the `value` attribute.

use crate::{Node, Profile, Result};

use super::{IntoValue, Value};

/// Attribute holding the scalar of a base type node.
pub const BASE_VALUE_KEY: &str = "value";

pub trait BaseType: IntoValue + Sized {
    /// Node type of the data node wrapping this scalar.
    const NODE_TYPE: &'static str;

    fn to_node(
        self,
        profile: &Profile,
    ) -> Result<Node> {
        let mut node = Node::new(profile, Self::NODE_TYPE);
        node.set_attribute(BASE_VALUE_KEY, self)?;
        Ok(node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Int(pub i64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Float(pub f64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Str(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bool(pub bool);

impl IntoValue for Int {
    fn into_value(self) -> Value {
        Value::Int(self.0)
    }
}

impl IntoValue for Float {
    fn into_value(self) -> Value {
        Value::Float(self.0)
    }
}

impl IntoValue for Str {
    fn into_value(self) -> Value {
        Value::Str(self.0)
    }
}

impl IntoValue for Bool {
    fn into_value(self) -> Value {
        Value::Bool(self.0)
    }
}

impl BaseType for Int {
    const NODE_TYPE: &'static str = "data.core.int.Int.";
}

impl BaseType for Float {
    const NODE_TYPE: &'static str = "data.core.float.Float.";
}

impl BaseType for Str {
    const NODE_TYPE: &'static str = "data.core.str.Str.";
}

impl BaseType for Bool {
    const NODE_TYPE: &'static str = "data.core.bool.Bool.";
}
