//! Methods callable on native values from expressions.
//!
//! Mutating collection methods go through the locator's collection observer
//! when the context has one, so they are observed under either strategy.
//! Reading methods report the whole collection to the connectable.

use std::cmp::Ordering;
use std::rc::Rc;

use sinew_core::{Array, ArrayOp, Comparator, Error, Map, Result, Set, Value};

use super::EvalContext;

/// Call builtin `name` on `target`. `None` if there is no such builtin.
pub(super) fn call(
    target: &Value,
    name: &str,
    args: Vec<Value>,
    ctx: &EvalContext<'_>,
) -> Option<Result<Value>> {
    match target {
        Value::Array(array) => array_method(array, name, args, ctx),
        Value::Map(map) => map_method(map, name, args, ctx),
        Value::Set(set) => set_method(set, name, args, ctx),
        Value::String(text) => string_method(text, name, &args),
        _ => None,
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// ToIntegerOrInfinity, saturated into `i64` (`NaN` is 0).
fn to_integer(value: &Value) -> i64 {
    value.to_number().trunc() as i64
}

/// Resolve a relative index the way `slice` does.
fn relative(index: i64, len: usize) -> usize {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    resolved.clamp(0, len) as usize
}

fn observe(ctx: &EvalContext<'_>, collection: Value) {
    if let Some(connectable) = ctx.connectable {
        connectable.observe_collection(&collection);
    }
}

fn comparator(value: Option<&Value>) -> Result<Option<Comparator>> {
    match value {
        None | Some(Value::Undefined) => Ok(None),
        Some(Value::Function(function)) => {
            let function = Rc::clone(function);
            Ok(Some(Box::new(move |a: &Value, b: &Value| {
                let n = function
                    .call(&Value::Undefined, &[a.clone(), b.clone()])?
                    .to_number();
                Ok(if n < 0.0 {
                    Ordering::Less
                } else if n > 0.0 {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                })
            })))
        }
        Some(_) => Err(Error::thrown(
            "the comparison function must be either a function or undefined",
        )),
    }
}

fn array_method(
    array: &Rc<Array>,
    name: &str,
    args: Vec<Value>,
    ctx: &EvalContext<'_>,
) -> Option<Result<Value>> {
    let mutate = |op: ArrayOp| match ctx.locator {
        Some(locator) => locator.get_array_observer(array).apply_op(op),
        None => array.apply(op, None),
    };
    let this = || Value::Array(Rc::clone(array));

    let result = match name {
        "push" => mutate(ArrayOp::Push(args)),
        "pop" => mutate(ArrayOp::Pop),
        "shift" => mutate(ArrayOp::Shift),
        "unshift" => mutate(ArrayOp::Unshift(args)),
        "splice" => {
            // No arguments removes nothing; a lone start removes to the end.
            let delete_none = args.is_empty();
            let mut args = args.into_iter();
            let start = args.next().map_or(0, |v| to_integer(&v));
            let delete_count = args
                .next()
                .map(|v| to_integer(&v))
                .or(delete_none.then_some(0));
            mutate(ArrayOp::Splice {
                start,
                delete_count,
                items: args.collect(),
            })
        }
        "reverse" => mutate(ArrayOp::Reverse).map(|_| this()),
        "sort" => match comparator(args.first()) {
            Ok(cmp) => mutate(ArrayOp::Sort(cmp)).map(|_| this()),
            Err(err) => Err(err),
        },
        "indexOf" => {
            observe(ctx, this());
            let needle = arg(&args, 0);
            let index = array
                .to_vec()
                .iter()
                .position(|item| item.strict_equals(&needle));
            Ok(index.map_or(Value::from(-1), Value::from))
        }
        "includes" => {
            observe(ctx, this());
            let needle = arg(&args, 0);
            Ok(Value::Bool(
                array.to_vec().iter().any(|item| item.same_value_zero(&needle)),
            ))
        }
        "join" => {
            observe(ctx, this());
            let separator = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(sep) => sep.to_js_string(),
            };
            let text = array
                .to_vec()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(&separator);
            Ok(Value::from(text))
        }
        "slice" => {
            observe(ctx, this());
            let items = array.to_vec();
            let start = relative(args.first().map_or(0, to_integer), items.len());
            let end = match args.get(1) {
                None | Some(Value::Undefined) => items.len(),
                Some(end) => relative(to_integer(end), items.len()),
            };
            let slice = items.get(start..end.max(start)).unwrap_or_default();
            Ok(Value::Array(Array::from_values(slice.iter().cloned())))
        }
        _ => return None,
    };
    Some(result)
}

fn map_method(
    map: &Rc<Map>,
    name: &str,
    args: Vec<Value>,
    ctx: &EvalContext<'_>,
) -> Option<Result<Value>> {
    let key = arg(&args, 0);
    let this = Value::Map(Rc::clone(map));
    let result = match name {
        "get" => {
            observe(ctx, this);
            Ok(map.get(&key))
        }
        "has" => {
            observe(ctx, this);
            Ok(Value::Bool(map.has(&key)))
        }
        "set" => {
            let value = arg(&args, 1);
            match ctx.locator {
                Some(locator) => locator.get_map_observer(map).set(key, value),
                None => map.set(key, value),
            }
            .map(|()| this)
        }
        "delete" => match ctx.locator {
            Some(locator) => locator.get_map_observer(map).delete(&key),
            None => map.delete(&key),
        }
        .map(Value::Bool),
        "clear" => match ctx.locator {
            Some(locator) => locator.get_map_observer(map).clear(),
            None => map.clear(),
        }
        .map(|()| Value::Undefined),
        _ => return None,
    };
    Some(result)
}

fn set_method(
    set: &Rc<Set>,
    name: &str,
    args: Vec<Value>,
    ctx: &EvalContext<'_>,
) -> Option<Result<Value>> {
    let value = arg(&args, 0);
    let this = Value::Set(Rc::clone(set));
    let result = match name {
        "has" => {
            observe(ctx, this);
            Ok(Value::Bool(set.has(&value)))
        }
        "add" => match ctx.locator {
            Some(locator) => locator.get_set_observer(set).add(value),
            None => set.add(value),
        }
        .map(|()| this),
        "delete" => match ctx.locator {
            Some(locator) => locator.get_set_observer(set).delete(&value),
            None => set.delete(&value),
        }
        .map(Value::Bool),
        "clear" => match ctx.locator {
            Some(locator) => locator.get_set_observer(set).clear(),
            None => set.clear(),
        }
        .map(|()| Value::Undefined),
        _ => return None,
    };
    Some(result)
}

fn string_method(text: &str, name: &str, args: &[Value]) -> Option<Result<Value>> {
    let value = match name {
        "toUpperCase" => Value::from(text.to_uppercase()),
        "toLowerCase" => Value::from(text.to_lowercase()),
        "trim" => Value::from(text.trim()),
        "includes" => Value::Bool(text.contains(arg(args, 0).to_js_string().as_str())),
        _ => return None,
    };
    Some(Ok(value))
}
