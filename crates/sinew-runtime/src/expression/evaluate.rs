//! `evaluate` and `assign`.

use std::rc::Rc;

use sinew_core::{Array, ArrayOp, Error, Object, Result, Scope, Value};

use super::{BinaryOp, EvalContext, Expression, builtins, ops};

fn nullish_name(value: &Value) -> &'static str {
    if matches!(value, Value::Null) {
        "null"
    } else {
        "undefined"
    }
}

fn null_member(key: impl Into<String>, target: &Value) -> Error {
    Error::NullMemberAccess {
        key: key.into(),
        target: nullish_name(target),
    }
}

/// An array index: a non-negative integral number or its canonical string.
fn array_index(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= usize::MAX as f64 => {
            Some(*n as usize)
        }
        Value::String(s) => s.parse::<usize>().ok().filter(|i| i.to_string() == **s),
        _ => None,
    }
}

fn read_member(instance: &Value, name: &str, ctx: &EvalContext<'_>) -> Value {
    if let Some(connectable) = ctx.connectable {
        // Array slots have no property observer; their changes are structural.
        if matches!(instance, Value::Array(_)) && name.parse::<usize>().is_ok() {
            connectable.observe_collection(instance);
        } else {
            connectable.observe(instance, name);
        }
    }
    match instance {
        Value::Object(object) => object.get(name),
        Value::Array(array) if name == "length" => Value::from(array.len()),
        Value::Array(array) => match name.parse::<usize>() {
            Ok(index) => array.get(index),
            Err(_) => Value::Undefined,
        },
        Value::Map(map) if name == "size" => Value::from(map.size()),
        Value::Set(set) if name == "size" => Value::from(set.size()),
        Value::String(text) if name == "length" => Value::from(text.encode_utf16().count()),
        Value::Function(function) if name == "name" => Value::from(function.name()),
        _ => Value::Undefined,
    }
}

fn write_index(array: &Rc<Array>, index: usize, value: Value, ctx: &EvalContext<'_>) -> Result<()> {
    match ctx.locator {
        Some(locator) => locator.get_array_observer(array).set(index, value),
        None => array.set(index, value),
    }
}

fn write_length(array: &Rc<Array>, value: Value) -> Result<()> {
    let n = value.to_number();
    if !(n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX)) {
        return Err(Error::invalid("length", format!("invalid array length {n}")));
    }
    let target = n as usize;
    let len = array.snapshot_len();
    if target < len {
        array.apply(
            ArrayOp::Splice {
                start: target as i64,
                delete_count: None,
                items: Vec::new(),
            },
            None,
        )?;
    } else if target > len {
        array.apply(
            ArrayOp::Push(vec![Value::Undefined; target - len]),
            None,
        )?;
    }
    Ok(())
}

fn write_member(target: &Value, name: &str, value: Value, ctx: &EvalContext<'_>) -> Result<()> {
    match target {
        Value::Object(object) => match ctx.locator {
            Some(locator) => locator.get_observer(target, name).set_value(value, ctx.flags),
            None => object.set(name, value),
        },
        Value::Array(array) if name == "length" => match ctx.locator {
            Some(locator) => locator.get_observer(target, name).set_value(value, ctx.flags),
            None => write_length(array, value),
        },
        Value::Array(array) => match name.parse::<usize>() {
            Ok(index) => write_index(array, index, value, ctx),
            Err(_) => Err(Error::read_only(name)),
        },
        Value::Undefined | Value::Null => Err(null_member(name, target)),
        _ => Err(Error::read_only(name)),
    }
}

impl Expression {
    /// Evaluate against `scope`.
    pub fn evaluate(&self, scope: &Rc<Scope>, ctx: &EvalContext<'_>) -> Result<Value> {
        match self {
            Self::AccessThis { ancestor } => Ok(scope
                .ancestor(*ancestor)
                .map(|s| Value::Object(Rc::clone(s.binding_context())))
                .unwrap_or_default()),

            Self::AccessScope { name, ancestor } => {
                let Some(context) = scope.context_for(name, *ancestor) else {
                    return Ok(Value::Undefined);
                };
                Ok(read_member(&Value::Object(context), name, ctx))
            }

            Self::AccessMember {
                object,
                name,
                optional,
            } => {
                let instance = object.evaluate(scope, ctx)?;
                if instance.is_nullish() {
                    return if *optional {
                        Ok(Value::Undefined)
                    } else {
                        Err(null_member(&**name, &instance))
                    };
                }
                Ok(read_member(&instance, name, ctx))
            }

            Self::AccessKeyed {
                object,
                key,
                optional,
            } => {
                let instance = object.evaluate(scope, ctx)?;
                if instance.is_nullish() {
                    return if *optional {
                        Ok(Value::Undefined)
                    } else {
                        Err(null_member(key.to_string(), &instance))
                    };
                }
                let key = key.evaluate(scope, ctx)?;
                if let (Value::Array(array), Some(index)) = (&instance, array_index(&key)) {
                    if let Some(connectable) = ctx.connectable {
                        connectable.observe_collection(&instance);
                    }
                    return Ok(array.get(index));
                }
                Ok(read_member(&instance, &key.to_js_string(), ctx))
            }

            Self::CallScope {
                name,
                args,
                ancestor,
                optional,
            } => {
                let args = evaluate_all(args, scope, ctx)?;
                let Some(context) = scope.context_for(name, *ancestor) else {
                    return Ok(Value::Undefined);
                };
                match context.get(name) {
                    Value::Function(function) => function.call(&Value::Object(context), &args),
                    value if value.is_nullish() && *optional => Ok(Value::Undefined),
                    _ => Err(Error::NotAFunction {
                        name: name.to_string(),
                    }),
                }
            }

            Self::CallMember {
                object,
                name,
                args,
                optional,
            } => {
                let instance = object.evaluate(scope, ctx)?;
                if instance.is_nullish() {
                    return if *optional {
                        Ok(Value::Undefined)
                    } else {
                        Err(null_member(&**name, &instance))
                    };
                }
                let args = evaluate_all(args, scope, ctx)?;
                if let Value::Object(target) = &instance {
                    return match target.get(name) {
                        Value::Function(function) => function.call(&instance, &args),
                        _ => Err(Error::NotAFunction {
                            name: format!("{object}.{name}"),
                        }),
                    };
                }
                builtins::call(&instance, name, args, ctx).unwrap_or_else(|| {
                    Err(Error::NotAFunction {
                        name: format!("{object}.{name}"),
                    })
                })
            }

            Self::CallFunction {
                function,
                args,
                optional,
            } => {
                let callee = function.evaluate(scope, ctx)?;
                let args = evaluate_all(args, scope, ctx)?;
                match callee {
                    Value::Function(f) => f.call(&Value::Undefined, &args),
                    value if value.is_nullish() && *optional => Ok(Value::Undefined),
                    _ => Err(Error::NotAFunction {
                        name: function.to_string(),
                    }),
                }
            }

            Self::Binary { op, left, right } => {
                let left = left.evaluate(scope, ctx)?;
                match op {
                    BinaryOp::And if !left.is_truthy() => Ok(left),
                    BinaryOp::Or if left.is_truthy() => Ok(left),
                    BinaryOp::Nullish if !left.is_nullish() => Ok(left),
                    BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish => right.evaluate(scope, ctx),
                    _ => ops::binary(*op, &left, &right.evaluate(scope, ctx)?),
                }
            }

            Self::Unary { op, operand } => Ok(ops::unary(*op, &operand.evaluate(scope, ctx)?)),

            Self::Conditional { condition, yes, no } => {
                if condition.evaluate(scope, ctx)?.is_truthy() {
                    yes.evaluate(scope, ctx)
                } else {
                    no.evaluate(scope, ctx)
                }
            }

            Self::Assign { target, value } => {
                let value = value.evaluate(scope, ctx)?;
                target.assign(scope, ctx, value.clone())?;
                Ok(value)
            }

            Self::Literal(value) => Ok(value.clone()),

            Self::ArrayLiteral(items) => Ok(Value::Array(Array::from_values(evaluate_all(
                items, scope, ctx,
            )?))),

            Self::ObjectLiteral(entries) => {
                let object = Object::new();
                for (key, value) in entries {
                    object.set(key, value.evaluate(scope, ctx)?)?;
                }
                Ok(Value::Object(object))
            }

            Self::Template {
                cooked,
                expressions,
            } => concat(cooked, expressions, scope, ctx, Value::to_js_string),

            Self::Interpolation { parts, expressions } => {
                concat(parts, expressions, scope, ctx, |value| {
                    if value.is_nullish() {
                        String::new()
                    } else {
                        value.to_js_string()
                    }
                })
            }

            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                let value = expression.evaluate(scope, ctx)?;
                let converter = resolve_converter(ctx, name)?;
                let args = evaluate_all(args, scope, ctx)?;
                converter.to_view(value, &args)
            }
        }
    }

    /// Write `value` through this expression.
    ///
    /// Sub-expressions are evaluated without connecting. Fails with
    /// [`Error::NotAssignable`] for forms that have no assignment.
    pub fn assign(&self, scope: &Rc<Scope>, ctx: &EvalContext<'_>, value: Value) -> Result<()> {
        let read = ctx.unconnected();
        match self {
            Self::AccessScope { name, ancestor } => {
                let context = scope.context_for(name, *ancestor).ok_or_else(|| {
                    Error::thrown(format!("no scope {ancestor} levels above for '{name}'"))
                })?;
                write_member(&Value::Object(context), name, value, ctx)
            }
            Self::AccessMember { object, name, .. } => {
                let instance = object.evaluate(scope, &read)?;
                write_member(&instance, name, value, ctx)
            }
            Self::AccessKeyed { object, key, .. } => {
                let instance = object.evaluate(scope, &read)?;
                let key = key.evaluate(scope, &read)?;
                if let (Value::Array(array), Some(index)) = (&instance, array_index(&key)) {
                    return write_index(array, index, value, ctx);
                }
                write_member(&instance, &key.to_js_string(), value, ctx)
            }
            Self::Assign { target, value: inner } => {
                if inner.is_assignable() {
                    inner.assign(scope, ctx, value.clone())?;
                }
                target.assign(scope, ctx, value)
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                let converter = resolve_converter(ctx, name)?;
                let args = evaluate_all(args, scope, &read)?;
                let value = converter.from_view(value, &args)?;
                expression.assign(scope, ctx, value)
            }
            _ => Err(Error::NotAssignable {
                expression: self.kind(),
            }),
        }
    }
}

fn evaluate_all(
    expressions: &[Expression],
    scope: &Rc<Scope>,
    ctx: &EvalContext<'_>,
) -> Result<Vec<Value>> {
    expressions.iter().map(|e| e.evaluate(scope, ctx)).collect()
}

fn concat(
    parts: &[Rc<str>],
    expressions: &[Expression],
    scope: &Rc<Scope>,
    ctx: &EvalContext<'_>,
    render: impl Fn(&Value) -> String,
) -> Result<Value> {
    let mut text = String::new();
    for (i, part) in parts.iter().enumerate() {
        text.push_str(part);
        if let Some(expression) = expressions.get(i) {
            text.push_str(&render(&expression.evaluate(scope, ctx)?));
        }
    }
    Ok(Value::from(text))
}

fn resolve_converter(
    ctx: &EvalContext<'_>,
    name: &str,
) -> Result<Rc<dyn super::ValueConverter>> {
    match ctx.resources {
        Some(resources) => resources.converter(name),
        None => Err(Error::UnknownConverter {
            name: name.to_string(),
        }),
    }
}
