use crate::error::{Error, ErrorKind, Result};

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;
use std::ops;
use std::rc::Rc;

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// A numeric value. Integers stay integers as long as arithmetic allows;
/// division and fractional literals fall back to floating point.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(*i),
            Number::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Number::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    pub fn add(&self, rhs: &Number) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => match a.checked_add(*b) {
                Some(n) => Number::Int(n),
                None => Number::Float(*a as f64 + *b as f64),
            },
            _ => Number::Float(self.as_f64() + rhs.as_f64()),
        }
    }

    pub fn sub(&self, rhs: &Number) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => match a.checked_sub(*b) {
                Some(n) => Number::Int(n),
                None => Number::Float(*a as f64 - *b as f64),
            },
            _ => Number::Float(self.as_f64() - rhs.as_f64()),
        }
    }

    pub fn mul(&self, rhs: &Number) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => match a.checked_mul(*b) {
                Some(n) => Number::Int(n),
                None => Number::Float(*a as f64 * *b as f64),
            },
            _ => Number::Float(self.as_f64() * rhs.as_f64()),
        }
    }

    pub fn div(&self, rhs: &Number) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) if *b != 0 && a % b == 0 => Number::Int(a / b),
            _ => Number::Float(self.as_f64() / rhs.as_f64()),
        }
    }

    pub fn rem(&self, rhs: &Number) -> Option<Number> {
        match (self, rhs) {
            (Number::Int(_), Number::Int(0)) => None,
            (Number::Int(a), Number::Int(b)) => Some(Number::Int(a % b)),
            _ => {
                let d = rhs.as_f64();
                if d == 0.0 {
                    None
                } else {
                    Some(Number::Float(self.as_f64() % d))
                }
            }
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.partial_cmp(b),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl FromStr for Number {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Number::Int(i));
        }
        match s.parse::<f64>() {
            Ok(f) => Ok(Number::Float(f)),
            Err(_) => Err(Error::new(
                ErrorKind::Parse,
                format!("`{s}` is not a valid number"),
            )),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Number::Int(i) => serializer.serialize_i64(*i),
            Number::Float(x) => serializer.serialize_f64(*x),
        }
    }
}

/// An evaluated property value.
///
/// `Undefined` marks "no value anywhere"; it is distinct from `Null`, which
/// a binding can produce on purpose. Aggregates are `Rc`-shared; mutation
/// goes through `Rc::make_mut` so shared values are never changed in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(Rc<str>),
    List(Rc<Vec<Value>>),
    Object(Rc<BTreeMap<String, Value>>),
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Undefined => serializer.serialize_str("<undefined>"),
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s.as_ref()),
            Value::List(a) => a.serialize(serializer),
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a value")
    }

    fn visit_unit<E>(self) -> core::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_bool<E>(self, v: bool) -> core::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_u64<E>(self, v: u64) -> core::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(match i64::try_from(v) {
            Ok(i) => Value::from(i),
            Err(_) => Value::Number(Number::Float(v as f64)),
        })
    }

    fn visit_i64<E>(self, v: i64) -> core::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> core::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Number(Number::Float(v)))
    }

    fn visit_str<E>(self, s: &str) -> core::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(s.into()))
    }

    fn visit_string<E>(self, s: String) -> core::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(s.into()))
    }

    fn visit_seq<V>(self, mut visitor: V) -> core::result::Result<Self::Value, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let mut arr = vec![];
        while let Some(v) = visitor.next_element()? {
            arr.push(v);
        }
        Ok(Value::from(arr))
    }

    fn visit_map<V>(self, mut visitor: V) -> core::result::Result<Self::Value, V::Error>
    where
        V: MapAccess<'de>,
    {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = visitor.next_entry::<String, Value>()? {
            map.insert(key, value);
        }
        Ok(Value::from(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{s}"),
            Err(_e) => Err(fmt::Error),
        }
    }
}

impl Value {
    pub fn new_object() -> Value {
        Value::from(BTreeMap::new())
    }

    pub fn new_list() -> Value {
        Value::from(vec![])
    }

    pub fn from_json_str(json: &str) -> Result<Value> {
        serde_json::from_str(json)
            .map_err(|e| Error::new(ErrorKind::Parse, format!("invalid json: {e}")))
    }

    pub fn to_json_str(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::new(ErrorKind::Type, format!("cannot serialize value: {e}")))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness follows the expression language: undefined, null, false,
    /// 0 and "" are false, everything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null | Value::Bool(false) => false,
            Value::Number(n) => n.as_f64() != 0.0,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(Error::new(ErrorKind::Type, "not a bool")),
        }
    }

    pub fn as_number(&self) -> Result<&Number> {
        match self {
            Value::Number(n) => Ok(n),
            _ => Err(Error::new(ErrorKind::Type, "not a number")),
        }
    }

    pub fn as_string(&self) -> Result<&Rc<str>> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(Error::new(ErrorKind::Type, "not a string")),
        }
    }

    pub fn as_list(&self) -> Result<&Vec<Value>> {
        match self {
            Value::List(a) => Ok(a),
            _ => Err(Error::new(ErrorKind::Type, "not a list")),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut Vec<Value>> {
        match self {
            Value::List(a) => Ok(Rc::make_mut(a)),
            _ => Err(Error::new(ErrorKind::Type, "not a list")),
        }
    }

    pub fn as_object(&self) -> Result<&BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Ok(m),
            _ => Err(Error::new(ErrorKind::Type, "not an object")),
        }
    }

    pub fn as_object_mut(&mut self) -> Result<&mut BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Ok(Rc::make_mut(m)),
            _ => Err(Error::new(ErrorKind::Type, "not an object")),
        }
    }

    /// Render the value as a string the way string conversion in the
    /// expression language does; lists join their elements with commas.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.to_string(),
            Value::List(items) => items
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object]".to_string(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::Int(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(Number::Float(n))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::List(Rc::new(a))
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Value::Object(Rc::new(m))
    }
}

impl ops::Index<usize> for Value {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        match self.as_list() {
            Ok(a) if index < a.len() => &a[index],
            _ => &Value::Undefined,
        }
    }
}

impl ops::Index<&str> for Value {
    type Output = Value;

    fn index(&self, key: &str) -> &Self::Output {
        match self {
            Value::Object(m) => match m.get(key) {
                Some(v) => v,
                _ => &Value::Undefined,
            },
            _ => &Value::Undefined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_arithmetic_preserves_integers() {
        let a = Number::Int(6);
        let b = Number::Int(3);
        assert_eq!(a.add(&b), Number::Int(9));
        assert_eq!(a.div(&b), Number::Int(2));
        assert_eq!(a.div(&Number::Int(4)), Number::Float(1.5));
        assert_eq!(a.rem(&Number::Int(0)), None);
    }

    #[test]
    fn json_round_trip() {
        let v = Value::from_json_str(r#"{"modules":{"cpp":{"defines":["A","B"]}},"n":3}"#).unwrap();
        assert_eq!(v["n"], Value::from(3i64));
        assert_eq!(v["modules"]["cpp"]["defines"][1], Value::from("B"));
        let s = serde_json::to_string(&v).unwrap();
        let v2 = Value::from_json_str(&s).unwrap();
        assert_eq!(v, v2);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Undefined.truthy());
        assert!(!Value::from("").truthy());
        assert!(!Value::from(0i64).truthy());
        assert!(Value::from("x").truthy());
        assert!(Value::new_list().truthy());
    }

    #[test]
    fn indexing_missing_yields_undefined() {
        let v = Value::new_object();
        assert!(v["nope"].is_undefined());
        assert!(v["nope"]["deeper"].is_undefined());
    }
}
