use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::tracking;
use crate::value::Value;

/// Fallible sort comparator. An error aborts the sort and leaves the array
/// untouched.
pub type Comparator = Box<dyn FnMut(&Value, &Value) -> Result<Ordering>>;

/// A mutating array operation.
pub enum ArrayOp {
    Push(Vec<Value>),
    Pop,
    Shift,
    Unshift(Vec<Value>),
    /// `start` may be negative (counted from the end); a missing
    /// `delete_count` removes everything from `start` on.
    Splice {
        start: i64,
        delete_count: Option<i64>,
        items: Vec<Value>,
    },
    Reverse,
    Sort(Option<Comparator>),
    /// Indexed write. Writing past the end pads with `undefined`.
    Set { index: usize, value: Value },
}

impl ArrayOp {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Push(_) => "push",
            Self::Pop => "pop",
            Self::Shift => "shift",
            Self::Unshift(_) => "unshift",
            Self::Splice { .. } => "splice",
            Self::Reverse => "reverse",
            Self::Sort(_) => "sort",
            Self::Set { .. } => "set",
        }
    }
}

impl fmt::Debug for ArrayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structural effect of one applied [`ArrayOp`].
///
/// Only real changes are reported: pushing nothing or popping an empty
/// array produces no change at all.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayChange {
    Push { count: usize },
    Unshift { count: usize },
    Pop { removed: Value },
    Shift { removed: Value },
    /// `start` is already normalized into `0..=len`.
    Splice {
        start: usize,
        removed: Vec<Value>,
        inserted: usize,
    },
    Reverse,
    /// `permutation[i]` is the pre-sort index of the item now at `i`.
    Sort { permutation: Vec<usize> },
    Replace { index: usize, previous: Value },
}

/// Mutation interception for arrays.
pub trait ArrayHook {
    fn array_changed(&self, change: &ArrayChange) -> Result<()>;
}

pub struct Array {
    id: u64,
    items: RefCell<Vec<Value>>,
    hooks: RefCell<Vec<Weak<dyn ArrayHook>>>,
}

impl Array {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::from_values([])
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Rc<Self> {
        Rc::new(Self {
            id: crate::next_id(),
            items: RefCell::new(values.into_iter().collect()),
            hooks: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Item at `index` (`undefined` when out of range). Tracked.
    pub fn get(self: &Rc<Self>, index: usize) -> Value {
        self.track();
        self.items.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Tracked length.
    pub fn len(self: &Rc<Self>) -> usize {
        self.track();
        self.items.borrow().len()
    }

    pub fn is_empty(self: &Rc<Self>) -> bool {
        self.len() == 0
    }

    /// Tracked copy of the items.
    pub fn to_vec(self: &Rc<Self>) -> Vec<Value> {
        self.track();
        self.snapshot()
    }

    /// Untracked copy of the items.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    /// Untracked length.
    #[must_use]
    pub fn snapshot_len(&self) -> usize {
        self.items.borrow().len()
    }

    fn track(self: &Rc<Self>) {
        tracking::track_collection(Value::Array(Rc::clone(self)));
    }

    // ── Hooks ────────────────────────────────────────────────────────

    pub fn add_hook(&self, hook: Weak<dyn ArrayHook>) {
        super::install(&self.hooks, hook);
    }

    pub fn remove_hook(&self, hook: &Weak<dyn ArrayHook>) {
        super::uninstall(&self.hooks, hook);
    }

    #[must_use]
    pub fn hook_count(&self) -> usize {
        super::live_count(&self.hooks)
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Perform `op` natively, then report the change to installed hooks and
    /// to `via` (unless `via` is itself installed).
    ///
    /// Returns what the native operation returns: the new length for
    /// push/unshift, the removed item for pop/shift, an array of removed
    /// items for splice, the array itself for reverse/sort, and the written
    /// value for an indexed set.
    pub fn apply(
        self: &Rc<Self>,
        op: ArrayOp,
        via: Option<&(dyn ArrayHook + 'static)>,
    ) -> Result<Value> {
        let (result, change) = self.perform(op)?;
        if let Some(change) = change {
            #[cfg(feature = "tracing")]
            tracing::trace!(message = "array.mutate", array = self.id, change = ?change);
            super::deliver(&self.hooks, via, |hook| hook.array_changed(&change))?;
        }
        Ok(result)
    }

    fn perform(self: &Rc<Self>, op: ArrayOp) -> Result<(Value, Option<ArrayChange>)> {
        let outcome = match op {
            ArrayOp::Push(values) => {
                let mut items = self.items.borrow_mut();
                let count = values.len();
                items.extend(values);
                (
                    Value::from(items.len()),
                    (count > 0).then_some(ArrayChange::Push { count }),
                )
            }
            ArrayOp::Pop => match self.items.borrow_mut().pop() {
                Some(removed) => (removed.clone(), Some(ArrayChange::Pop { removed })),
                None => (Value::Undefined, None),
            },
            ArrayOp::Shift => {
                let mut items = self.items.borrow_mut();
                if items.is_empty() {
                    (Value::Undefined, None)
                } else {
                    let removed = items.remove(0);
                    (removed.clone(), Some(ArrayChange::Shift { removed }))
                }
            }
            ArrayOp::Unshift(values) => {
                let mut items = self.items.borrow_mut();
                let count = values.len();
                items.splice(0..0, values);
                (
                    Value::from(items.len()),
                    (count > 0).then_some(ArrayChange::Unshift { count }),
                )
            }
            ArrayOp::Splice {
                start,
                delete_count,
                items: inserted,
            } => {
                let mut items = self.items.borrow_mut();
                let (start, delete) = normalize_splice(items.len(), start, delete_count);
                let count = inserted.len();
                let removed: Vec<Value> = items.splice(start..start + delete, inserted).collect();
                let change = (delete > 0 || count > 0).then(|| ArrayChange::Splice {
                    start,
                    removed: removed.clone(),
                    inserted: count,
                });
                (Value::Array(Self::from_values(removed)), change)
            }
            ArrayOp::Reverse => {
                let mut items = self.items.borrow_mut();
                items.reverse();
                (
                    Value::Array(Rc::clone(self)),
                    (items.len() > 1).then_some(ArrayChange::Reverse),
                )
            }
            ArrayOp::Sort(comparator) => {
                let snapshot = self.snapshot();
                let permutation = sort_permutation(&snapshot, comparator)?;
                let moved = permutation.iter().enumerate().any(|(i, &p)| i != p);
                if moved {
                    *self.items.borrow_mut() =
                        permutation.iter().map(|&p| snapshot[p].clone()).collect();
                }
                (
                    Value::Array(Rc::clone(self)),
                    moved.then_some(ArrayChange::Sort { permutation }),
                )
            }
            ArrayOp::Set { index, value } => {
                let mut items = self.items.borrow_mut();
                let len = items.len();
                let change = if index < len {
                    let previous = std::mem::replace(&mut items[index], value.clone());
                    (!previous.same_value(&value))
                        .then_some(ArrayChange::Replace { index, previous })
                } else {
                    items.resize(index, Value::Undefined);
                    items.push(value.clone());
                    Some(ArrayChange::Push {
                        count: index - len + 1,
                    })
                };
                (value, change)
            }
        };
        Ok(outcome)
    }

    // ── Convenience wrappers (not routed through any observer) ───────

    pub fn push(self: &Rc<Self>, values: impl IntoIterator<Item = Value>) -> Result<usize> {
        let len = self.apply(ArrayOp::Push(values.into_iter().collect()), None)?;
        Ok(len.to_number() as usize)
    }

    pub fn pop(self: &Rc<Self>) -> Result<Value> {
        self.apply(ArrayOp::Pop, None)
    }

    pub fn shift(self: &Rc<Self>) -> Result<Value> {
        self.apply(ArrayOp::Shift, None)
    }

    pub fn unshift(self: &Rc<Self>, values: impl IntoIterator<Item = Value>) -> Result<usize> {
        let len = self.apply(ArrayOp::Unshift(values.into_iter().collect()), None)?;
        Ok(len.to_number() as usize)
    }

    pub fn splice(
        self: &Rc<Self>,
        start: i64,
        delete_count: Option<i64>,
        items: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Value>> {
        let removed = self.apply(
            ArrayOp::Splice {
                start,
                delete_count,
                items: items.into_iter().collect(),
            },
            None,
        )?;
        Ok(removed.as_array().map(|a| a.snapshot()).unwrap_or_default())
    }

    pub fn reverse(self: &Rc<Self>) -> Result<()> {
        self.apply(ArrayOp::Reverse, None).map(drop)
    }

    /// Sort by UTF-16 string order, `undefined` last.
    pub fn sort(self: &Rc<Self>) -> Result<()> {
        self.apply(ArrayOp::Sort(None), None).map(drop)
    }

    pub fn sort_by(
        self: &Rc<Self>,
        comparator: impl FnMut(&Value, &Value) -> Result<Ordering> + 'static,
    ) -> Result<()> {
        self.apply(ArrayOp::Sort(Some(Box::new(comparator))), None)
            .map(drop)
    }

    pub fn set(self: &Rc<Self>, index: usize, value: Value) -> Result<()> {
        self.apply(ArrayOp::Set { index, value }, None).map(drop)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("id", &self.id)
            .field("items", &self.items.borrow())
            .finish()
    }
}

/// Resolve splice arguments against `len` into `(start, delete_count)`.
pub(crate) fn normalize_splice(len: usize, start: i64, delete_count: Option<i64>) -> (usize, usize) {
    let len = len as i64;
    let start = if start < 0 {
        (len + start).max(0)
    } else {
        start.min(len)
    };
    let delete = match delete_count {
        None => len - start,
        Some(count) => count.clamp(0, len - start),
    };
    (start as usize, delete as usize)
}

fn sort_permutation(values: &[Value], comparator: Option<Comparator>) -> Result<Vec<usize>> {
    let (mut defined, undefined): (Vec<usize>, Vec<usize>) =
        (0..values.len()).partition(|&i| !values[i].is_undefined());
    match comparator {
        Some(mut compare) => {
            merge_sort(&mut defined, &mut |a, b| compare(&values[a], &values[b]))?;
        }
        None => {
            let keys: Vec<Vec<u16>> = values
                .iter()
                .map(|v| v.to_js_string().encode_utf16().collect())
                .collect();
            defined.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
        }
    }
    defined.extend(undefined);
    Ok(defined)
}

/// Stable merge sort with a fallible comparator.
fn merge_sort(
    indices: &mut Vec<usize>,
    compare: &mut dyn FnMut(usize, usize) -> Result<Ordering>,
) -> Result<()> {
    if indices.len() < 2 {
        return Ok(());
    }
    let mut right = indices.split_off(indices.len() / 2);
    merge_sort(indices, compare)?;
    merge_sort(&mut right, compare)?;
    let left = std::mem::take(indices);
    indices.reserve(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if compare(right[j], left[i])? == Ordering::Less {
            indices.push(right[j]);
            j += 1;
        } else {
            indices.push(left[i]);
            i += 1;
        }
    }
    indices.extend_from_slice(&left[i..]);
    indices.extend_from_slice(&right[j..]);
    Ok(())
}
