//! Generic records for introspection.
//!
//! Upstreams describe themselves through a [`Dict`], an ordered list of
//! named [`Value`]s, so that the configuration of a resolver can be reported
//! without the reporting side knowing about the different kinds of
//! upstreams. With the `serde` feature, both types can be serialized into
//! any data format supported by serde, with a [`Dict`] becoming a map and a
//! list becoming a sequence.
//!
//! All methods that grow a record report allocation failure as an error
//! rather than aborting.

use super::caps::Caps;
use super::error::Error;
use core::slice;
use std::string::String;
use std::vec::Vec;

//------------ Value ---------------------------------------------------------

/// A value in an introspection record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    /// An integer.
    Int(u32),

    /// A boolean.
    Bool(bool),

    /// A string.
    Str(String),

    /// A list of values.
    List(Vec<Value>),

    /// A nested record.
    Dict(Dict),
}

impl Value {
    /// Creates a string value, reporting allocation failure.
    pub fn try_str(s: &str) -> Result<Self, Error> {
        let mut res = String::new();
        res.try_reserve_exact(s.len())?;
        res.push_str(s);
        Ok(Value::Str(res))
    }

    /// Creates a list of the names of a set of capabilities.
    pub fn try_caps(caps: Caps) -> Result<Self, Error> {
        let mut res = Vec::new();
        res.try_reserve_exact(caps.names().count())?;
        for name in caps.names() {
            res.push(Self::try_str(name)?);
        }
        Ok(Value::List(res))
    }

    /// Returns the integer if this is an integer value.
    pub fn as_int(&self) -> Option<u32> {
        match *self {
            Value::Int(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the string if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match *self {
            Value::Str(ref value) => Some(value),
            _ => None,
        }
    }

    /// Returns the list if this is a list value.
    pub fn as_list(&self) -> Option<&[Value]> {
        match *self {
            Value::List(ref value) => Some(value),
            _ => None,
        }
    }

    /// Returns the record if this is a record value.
    pub fn as_dict(&self) -> Option<&Dict> {
        match *self {
            Value::Dict(ref value) => Some(value),
            _ => None,
        }
    }
}

//------------ Dict ----------------------------------------------------------

/// An ordered record of named values.
///
/// Field names are expected to be unique. Pushing a name twice keeps both
/// entries but [`get`][Self::get] only ever finds the first one.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Dict {
    fields: Vec<(&'static str, Value)>,
}

impl Dict {
    /// Creates a new, empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record with room for `capacity` fields.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        let mut fields = Vec::new();
        fields.try_reserve_exact(capacity)?;
        Ok(Dict { fields })
    }

    /// Appends a field.
    pub fn push(
        &mut self,
        name: &'static str,
        value: Value,
    ) -> Result<(), Error> {
        self.fields.try_reserve(1)?;
        self.fields.push((name, value));
        Ok(())
    }

    /// Returns the value of the field with the given name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns an iterator over the field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(key, _)| *key)
    }

    /// Returns an iterator over the fields in order.
    pub fn iter(&self) -> slice::Iter<'_, (&'static str, Value)> {
        self.fields.iter()
    }
}

impl Drop for Dict {
    fn drop(&mut self) {
        // Records describing deeply nested upstreams are equally deep, so
        // nested values are taken apart here rather than recursively.
        let mut pending = Vec::new();
        pending.extend(self.fields.drain(..).map(|(_, value)| value));
        while let Some(value) = pending.pop() {
            match value {
                Value::List(list) => pending.extend(list),
                Value::Dict(mut dict) => pending
                    .extend(dict.fields.drain(..).map(|(_, value)| value)),
                _ => {}
            }
        }
    }
}

impl<'a> IntoIterator for &'a Dict {
    type Item = &'a (&'static str, Value);
    type IntoIter = slice::Iter<'a, (&'static str, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

//--- Serialize

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match *self {
            Value::Int(value) => serializer.serialize_u32(value),
            Value::Bool(value) => serializer.serialize_bool(value),
            Value::Str(ref value) => serializer.serialize_str(value),
            Value::List(ref value) => serializer.collect_seq(value),
            Value::Dict(ref value) => {
                serde::Serialize::serialize(value, serializer)
            }
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Dict {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.fields.iter().map(|(k, v)| (k, v)))
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keeps_field_order() {
        let mut dict = Dict::new();
        dict.push("zone", Value::try_str("example.").unwrap()).unwrap();
        dict.push("alpha", Value::Int(1)).unwrap();
        dict.push("flag", Value::Bool(true)).unwrap();
        assert_eq!(dict.keys().collect::<Vec<_>>(), ["zone", "alpha", "flag"]);
        assert_eq!(dict.get("alpha").and_then(Value::as_int), Some(1));
        assert_eq!(
            dict.get("zone").and_then(Value::as_str),
            Some("example.")
        );
        assert_eq!(dict.get("missing"), None);
    }

    #[test]
    fn caps_list() {
        let value = Value::try_caps(Caps::STATEFUL | Caps::KEEPALIVE).unwrap();
        let names = value
            .as_list()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(names, ["stateful", "keepalive"]);
        assert_eq!(Value::try_caps(Caps::NONE).unwrap(), Value::List(Vec::new()));
    }

    #[test]
    fn drop_deeply_nested() {
        let mut dict = Dict::new();
        for depth in 0..100_000u32 {
            let mut outer = Dict::new();
            outer.push("depth", Value::Int(depth)).unwrap();
            outer
                .push("children", Value::List(std::vec![Value::Dict(dict)]))
                .unwrap();
            dict = outer;
        }
        assert_eq!(dict.get("depth").and_then(Value::as_int), Some(99_999));
        drop(dict);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn to_json() {
        let mut inner = Dict::new();
        inner.push("port", Value::Int(53)).unwrap();
        let mut dict = Dict::new();
        dict.push("name", Value::try_str("a").unwrap()).unwrap();
        dict.push(
            "children",
            Value::List(std::vec![Value::Dict(inner)]),
        )
        .unwrap();
        assert_eq!(
            serde_json::to_string(&dict).unwrap(),
            r#"{"name":"a","children":[{"port":53}]}"#
        );
    }
}
