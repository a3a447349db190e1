//! Operator semantics for non-short-circuiting binary and unary operators.

use std::cmp::Ordering;

use sinew_core::{Error, Result, Value};

use super::{BinaryOp, UnaryOp};

/// Strings for `+` when either side is a string or a reference.
fn concatenates(left: &Value, right: &Value) -> bool {
    matches!(left, Value::String(_))
        || matches!(right, Value::String(_))
        || left.is_reference()
        || right.is_reference()
}

/// Abstract relational comparison: strings compare by UTF-16 code units,
/// everything else numerically. `None` when either side is `NaN`.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Some(a.encode_utf16().cmp(b.encode_utf16()));
    }
    left.to_number().partial_cmp(&right.to_number())
}

fn has_property(key: &Value, target: &Value) -> Result<bool> {
    match target {
        Value::Object(object) => Ok(object.has(&key.to_js_string())),
        Value::Array(array) => {
            let name = key.to_js_string();
            if name == "length" {
                return Ok(true);
            }
            Ok(name
                .parse::<usize>()
                .is_ok_and(|index| index < array.len()))
        }
        Value::Map(_) | Value::Set(_) | Value::Function(_) => Ok(false),
        other => Err(Error::thrown(format!(
            "cannot use 'in' operator to search for '{}' in {}",
            key.to_js_string(),
            other.to_js_string()
        ))),
    }
}

/// Apply an eager binary operator. `&&`, `||` and `??` short-circuit and are
/// handled by the evaluator; passing them here evaluates them eagerly.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let value = match op {
        BinaryOp::And => {
            if left.is_truthy() {
                right.clone()
            } else {
                left.clone()
            }
        }
        BinaryOp::Or => {
            if left.is_truthy() {
                left.clone()
            } else {
                right.clone()
            }
        }
        BinaryOp::Nullish => {
            if left.is_nullish() {
                right.clone()
            } else {
                left.clone()
            }
        }
        BinaryOp::LooseEq => Value::Bool(left.loose_equals(right)),
        BinaryOp::LooseNe => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNe => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Add if concatenates(left, right) => {
            let mut text = left.to_js_string();
            text.push_str(&right.to_js_string());
            Value::from(text)
        }
        BinaryOp::Add => Value::from(left.to_number() + right.to_number()),
        BinaryOp::Sub => Value::from(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::from(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::from(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::from(left.to_number() % right.to_number()),
        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::Le => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Ge => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::In => Value::Bool(has_property(left, right)?),
    };
    Ok(value)
}

pub fn unary(op: UnaryOp, operand: &Value) -> Value {
    match op {
        UnaryOp::Not => Value::Bool(!operand.is_truthy()),
        UnaryOp::Neg => Value::from(-operand.to_number()),
        UnaryOp::Plus => Value::from(operand.to_number()),
        UnaryOp::TypeOf => Value::from(operand.type_of()),
        UnaryOp::Void => Value::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinew_core::{Array, Object};

    fn eval(op: BinaryOp, l: impl Into<Value>, r: impl Into<Value>) -> Value {
        binary(op, &l.into(), &r.into()).unwrap()
    }

    #[test]
    fn addition_concatenates_strings() {
        assert_eq!(eval(BinaryOp::Add, 1, 2), Value::from(3));
        assert_eq!(eval(BinaryOp::Add, "a", 1), Value::from("a1"));
        assert_eq!(eval(BinaryOp::Add, 1, "2"), Value::from("12"));
        let array = Array::from_values([Value::from(1), Value::from(2)]);
        assert_eq!(eval(BinaryOp::Add, array, "!"), Value::from("1,2!"));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval(BinaryOp::Lt, "a", "b"), Value::Bool(true));
        assert_eq!(eval(BinaryOp::Lt, "10", "9"), Value::Bool(true));
        assert_eq!(eval(BinaryOp::Lt, 10, "9"), Value::Bool(false));
        assert_eq!(eval(BinaryOp::Ge, f64::NAN, 1), Value::Bool(false));
        assert_eq!(eval(BinaryOp::Le, 2, 2), Value::Bool(true));
    }

    #[test]
    fn equality_flavours() {
        assert_eq!(eval(BinaryOp::LooseEq, "1", 1), Value::Bool(true));
        assert_eq!(eval(BinaryOp::StrictEq, "1", 1), Value::Bool(false));
        assert_eq!(
            binary(BinaryOp::LooseEq, &Value::Null, &Value::Undefined).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn in_operator() {
        let obj = Value::from(Object::from_entries([("a", 1)]));
        assert_eq!(eval(BinaryOp::In, "a", obj.clone()), Value::Bool(true));
        assert_eq!(eval(BinaryOp::In, "b", obj), Value::Bool(false));
        assert!(binary(BinaryOp::In, &Value::from("a"), &Value::from(1)).is_err());
    }

    #[test]
    fn unary_operators() {
        assert_eq!(unary(UnaryOp::Not, &Value::from("")), Value::Bool(true));
        assert_eq!(unary(UnaryOp::Plus, &Value::from("4")), Value::from(4));
        assert_eq!(unary(UnaryOp::TypeOf, &Value::Null), Value::from("object"));
        assert_eq!(unary(UnaryOp::Void, &Value::from(1)), Value::Undefined);
    }
}
