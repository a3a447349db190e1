#![forbid(unsafe_code)]

//! Dynamic values flowing through scopes, expressions, and observers.
//!
//! `Value` mirrors the value space of the host scripting model: primitives
//! are stored inline, reference types are `Rc` handles so that cloning a
//! value preserves identity (two clones of the same array are the *same*
//! array, exactly like two references in the host language).
//!
//! # Equality
//!
//! Several equality relations coexist and each has exactly one use:
//!
//! | Relation | Method | Used by |
//! |---|---|---|
//! | SameValue (`Object.is`) | [`Value::same_value`], `PartialEq` | observers suppressing no-op writes |
//! | Strict (`===`) | [`Value::strict_equals`] | `===` / `!==` and `indexOf` |
//! | Loose (`==`) | [`Value::loose_equals`] | `==` / `!=` |
//! | SameValueZero | [`Value::same_value_zero`], [`ValueKey`] | map/set keys, `includes` |

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::collections::{Array, Map, Set};
use crate::function::Function;
use crate::object::Object;

/// A dynamically-typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Rc<Object>),
    Array(Rc<Array>),
    Map(Rc<Map>),
    Set(Rc<Set>),
    Function(Rc<Function>),
}

impl Value {
    /// `undefined` or `null`.
    #[must_use]
    pub const fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Whether the value is a reference (object, collection, or function).
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::Object(_) | Self::Array(_) | Self::Map(_) | Self::Set(_) | Self::Function(_)
        )
    }

    /// Boolean conversion (`!!value`).
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => !(n.is_nan() || *n == 0.0),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Numeric conversion (`+value`).
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => parse_number(s),
            Self::Array(_) => parse_number(&self.to_js_string()),
            Self::Object(_) | Self::Map(_) | Self::Set(_) | Self::Function(_) => f64::NAN,
        }
    }

    /// String conversion (`String(value)`).
    #[must_use]
    pub fn to_js_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => number_to_string(*n),
            Self::String(s) => s.to_string(),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Array(array) => array
                .snapshot()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::Map(_) => "[object Map]".to_string(),
            Self::Set(_) => "[object Set]".to_string(),
            Self::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
        }
    }

    /// The `typeof` operator.
    #[must_use]
    pub const fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) => "function",
            Self::Null | Self::Object(_) | Self::Array(_) | Self::Map(_) | Self::Set(_) => "object",
        }
    }

    /// SameValue (`Object.is`): `NaN` equals itself, `+0` differs from `-0`.
    #[must_use]
    pub fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b && a.is_sign_negative() == b.is_sign_negative()
                }
            }
            _ => self.identity_equals(other),
        }
    }

    /// SameValueZero: like [`same_value`](Self::same_value) but `+0 == -0`.
    #[must_use]
    pub fn same_value_zero(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => (a.is_nan() && b.is_nan()) || a == b,
            _ => self.identity_equals(other),
        }
    }

    /// Strict equality (`===`).
    #[must_use]
    pub fn strict_equals(&self, other: &Self) -> bool {
        self.identity_equals(other)
    }

    /// Loose equality (`==`).
    #[must_use]
    pub fn loose_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined | Self::Null, Self::Undefined | Self::Null) => true,
            (Self::Undefined | Self::Null, _) | (_, Self::Undefined | Self::Null) => false,
            (a, b) if a.is_reference() && b.is_reference() => a.identity_equals(b),
            (a, b) if a.is_reference() => Self::from(a.to_js_string()).loose_equals(b),
            (a, b) if b.is_reference() => a.loose_equals(&Self::from(b.to_js_string())),
            (Self::String(a), Self::String(b)) => a == b,
            (a, b) => a.to_number() == b.to_number(),
        }
    }

    fn identity_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b),
            (Self::Set(a), Self::Set(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Rc<Object>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Rc<Array>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&Rc<Map>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_set(&self) -> Option<&Rc<Set>> {
        match self {
            Self::Set(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Parse a string the way numeric conversion does: trimmed, empty is zero,
/// anything unparseable is `NaN`.
fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    // Rust accepts "inf"/"nan"; the host language does not.
    if t.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Format a number the way `String(n)` does.
///
/// Shortest round-trip digits, positional between `1e-7` and `1e21`,
/// exponent form (`1e+21`, `1.5e-7`) outside that range.
#[must_use]
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        return text.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    // `{:e}` yields the shortest digits as `d.ddde<exp>`.
    let sci = format!("{:e}", n.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let k = digits.len() as i32;
    let point = exp.parse::<i32>().unwrap_or(0) + 1;

    let mut out = String::new();
    if n < 0.0 {
        out.push('-');
    }
    if k <= point && point <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat_n('0', (point - k) as usize));
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        out.push_str(int);
        out.push('.');
        out.push_str(frac);
    } else if -6 < point && point <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat_n('0', (-point) as usize));
        out.push_str(&digits);
    } else {
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        let e = point - 1;
        out.push('e');
        out.push(if e < 0 { '-' } else { '+' });
        out.push_str(&e.abs().to_string());
    }
    out
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&number_to_string(*n)),
            Self::String(s) => write!(f, "{:?}", &**s),
            Self::Object(o) => write!(f, "Object#{}", o.id()),
            Self::Array(a) => write!(f, "Array#{}(len={})", a.id(), a.snapshot().len()),
            Self::Map(m) => write!(f, "Map#{}", m.id()),
            Self::Set(s) => write!(f, "Set#{}", s.id()),
            Self::Function(func) => write!(f, "Function({})", func.name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::String(s)
    }
}

impl From<Rc<Object>> for Value {
    fn from(o: Rc<Object>) -> Self {
        Self::Object(o)
    }
}

impl From<Rc<Array>> for Value {
    fn from(a: Rc<Array>) -> Self {
        Self::Array(a)
    }
}

impl From<Rc<Map>> for Value {
    fn from(m: Rc<Map>) -> Self {
        Self::Map(m)
    }
}

impl From<Rc<Set>> for Value {
    fn from(s: Rc<Set>) -> Self {
        Self::Set(s)
    }
}

impl From<Rc<Function>> for Value {
    fn from(f: Rc<Function>) -> Self {
        Self::Function(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Undefined, Into::into)
    }
}

/// A [`Value`] usable as a hash key under SameValueZero semantics.
///
/// References hash by address, so two structurally identical objects are
/// distinct keys, and `NaN` is a single key.
#[derive(Clone, Debug)]
pub struct ValueKey(pub Value);

impl ValueKey {
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_value_zero(&other.0)
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Undefined => 0u8.hash(state),
            Value::Null => 1u8.hash(state),
            Value::Bool(b) => {
                2u8.hash(state);
                b.hash(state);
            }
            Value::Number(n) => {
                3u8.hash(state);
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if *n == 0.0 {
                    0f64.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::String(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Value::Object(o) => (5u8, Rc::as_ptr(o) as usize).hash(state),
            Value::Array(a) => (6u8, Rc::as_ptr(a) as usize).hash(state),
            Value::Map(m) => (7u8, Rc::as_ptr(m) as usize).hash(state),
            Value::Set(s) => (8u8, Rc::as_ptr(s) as usize).hash(state),
            Value::Function(f) => (9u8, Rc::as_ptr(f) as usize).hash(state),
        }
    }
}

impl From<Value> for ValueKey {
    fn from(v: Value) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_host_rules() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::from(Object::new()).is_truthy());
        assert!(Value::from(Array::new()).is_truthy());
    }

    #[test]
    fn same_value_distinguishes_signed_zero_and_equates_nan() {
        assert!(Value::from(f64::NAN).same_value(&Value::from(f64::NAN)));
        assert!(!Value::from(0.0).same_value(&Value::from(-0.0)));
        assert!(Value::from(0.0).same_value_zero(&Value::from(-0.0)));
        assert!(!Value::from(f64::NAN).strict_equals(&Value::from(f64::NAN)));
    }

    #[test]
    fn references_compare_by_identity() {
        let a = Object::new();
        let b = Object::new();
        assert_eq!(Value::from(a.clone()), Value::from(a));
        assert_ne!(Value::from(Object::new()), Value::from(b));
    }

    #[test]
    fn loose_equality_coerces() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(Value::from("1").loose_equals(&Value::from(1)));
        assert!(Value::from(true).loose_equals(&Value::from(1)));
        assert!(!Value::Null.loose_equals(&Value::from(0)));
        let arr = Array::from_values([Value::from(5)]);
        assert!(Value::from(arr).loose_equals(&Value::from(5)));
    }

    #[test]
    fn string_conversion() {
        assert_eq!(Value::from(5).to_js_string(), "5");
        assert_eq!(Value::from(-0.0).to_js_string(), "0");
        assert_eq!(Value::from(1.5).to_js_string(), "1.5");
        assert_eq!(Value::Undefined.to_js_string(), "undefined");
        let arr = Array::from_values([Value::from(1), Value::Null, Value::from("x")]);
        assert_eq!(Value::from(arr).to_js_string(), "1,,x");
    }

    #[test]
    fn exponent_form_outside_positional_range() {
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(123e-20), "1.23e-18");
        assert_eq!(number_to_string(-2.5e25), "-2.5e+25");
        assert_eq!(number_to_string(1e20), "100000000000000000000");
        assert_eq!(number_to_string(0.000001), "0.000001");
        assert_eq!(number_to_string(-0.00123), "-0.00123");
    }

    #[test]
    fn number_conversion() {
        assert_eq!(Value::from(" 42 ").to_number(), 42.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("inf").to_number().is_nan());
        assert_eq!(Value::from("0x10").to_number(), 16.0);
        assert_eq!(Value::from("-Infinity").to_number(), f64::NEG_INFINITY);
        assert!(Value::Undefined.to_number().is_nan());
        assert_eq!(Value::Null.to_number(), 0.0);
    }

    #[test]
    fn value_key_hashes_consistently_with_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ValueKey(Value::from(0.0)));
        assert!(set.contains(&ValueKey(Value::from(-0.0))));
        set.insert(ValueKey(Value::from(f64::NAN)));
        assert!(set.contains(&ValueKey(Value::from(f64::NAN))));
        let obj = Object::new();
        set.insert(ValueKey(Value::from(obj.clone())));
        assert!(set.contains(&ValueKey(Value::from(obj))));
        assert!(!set.contains(&ValueKey(Value::from(Object::new()))));
    }
}
