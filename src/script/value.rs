//! Tagged value model shared by the interpreter and the grading comparator.
//!
//! Arrays and objects are reference types (`Rc<RefCell<..>>`) so aliasing
//! and in-place mutation behave the way candidate code expects. Objects keep
//! their keys in insertion order.

use super::ast::FunctionDef;
use super::error::ScriptError;
use super::interpreter::{Interpreter, Scope};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

/// Longest string, in bytes, a script may build.
pub const MAX_STRING_LENGTH: usize = 1 << 28;

/// Longest array a script may grow. Arrays are dense, so this bounds memory.
pub const MAX_ARRAY_LENGTH: usize = 1 << 23;

/// Deepest container nesting that conversion, serialization and
/// comparison will descend into.
pub const MAX_NESTING_DEPTH: usize = 10_000;

pub fn check_string_length(len: usize) -> Result<(), ScriptError> {
    if len > MAX_STRING_LENGTH {
        return Err(ScriptError::range("Invalid string length"));
    }
    Ok(())
}

pub fn check_array_length(len: usize) -> Result<(), ScriptError> {
    if len > MAX_ARRAY_LENGTH {
        return Err(ScriptError::range("Invalid array length"));
    }
    Ok(())
}

/// Signature of a built-in function: interpreter, receiver, arguments.
pub type NativeFn = fn(&mut Interpreter, &Value, Vec<Value>) -> Result<Value, ScriptError>;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<PropertyMap>>),
    Function(Rc<Function>),
}

/// Insertion-ordered property storage for object values.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    entries: Vec<(Rc<str>, Value)>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.as_ref() == key)
    }

    /// Overwrites in place when the key exists, appends otherwise.
    pub fn insert(&mut self, key: impl Into<Rc<str>>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &Rc<str>> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A callable value.
pub enum Function {
    /// A function defined by script source, closed over its scope.
    Script {
        def: Rc<FunctionDef>,
        scope: Rc<Scope>,
        /// Arrow functions capture `this` from where they were created.
        lexical_this: Option<Value>,
    },
    /// A built-in; `bound_this` is the receiver for method values such as
    /// `arr.push` read off an array.
    Native {
        name: &'static str,
        func: NativeFn,
        bound_this: Value,
    },
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Script { def, .. } => def.name.as_deref().unwrap_or(""),
            Function::Native { name, .. } => name,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => match items.try_borrow() {
                Ok(items) => f.debug_list().entries(items.iter()).finish(),
                Err(_) => write!(f, "[Array]"),
            },
            Value::Object(map) => match map.try_borrow() {
                Ok(map) => f.debug_map().entries(map.iter()).finish(),
                Err(_) => write!(f, "[Object]"),
            },
            Value::Function(func) => write!(f, "{:?}", func),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Rc::from(value.as_str()))
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => Value::array(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                let mut props = PropertyMap::new();
                for (key, value) in map {
                    props.insert(key.as_str(), Value::from(value));
                }
                Value::object(props)
            }
        }
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        // Unlink nested containers one level at a time so a deep tree never
        // recurses through drop glue.
        let mut pending = Vec::new();
        self.release_children(&mut pending);
        while let Some(mut value) = pending.pop() {
            value.release_children(&mut pending);
        }
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        let items = Rc::new(RefCell::new(items));
        track(|| Tracked::Array(Rc::downgrade(&items)));
        Value::Array(items)
    }

    pub fn object(props: PropertyMap) -> Self {
        let map = Rc::new(RefCell::new(props));
        track(|| Tracked::Object(Rc::downgrade(&map)));
        Value::Object(map)
    }

    /// Moves out the children of a container that only this value owns.
    fn release_children(&mut self, pending: &mut Vec<Value>) {
        match self {
            Value::Array(items) if Rc::strong_count(items) == 1 => {
                if let Ok(mut items) = items.try_borrow_mut() {
                    pending.append(&mut *items);
                }
            }
            Value::Object(map) if Rc::strong_count(map) == 1 => {
                if let Ok(mut map) = map.try_borrow_mut() {
                    pending.extend(map.entries.drain(..).map(|(_, value)| value));
                }
            }
            Value::Function(func) => match Rc::get_mut(func) {
                Some(Function::Script {
                    scope,
                    lexical_this,
                    ..
                }) => {
                    pending.extend(lexical_this.take());
                    if Rc::strong_count(scope) == 1 {
                        pending.extend(scope.take_values());
                    }
                }
                Some(Function::Native { bound_this, .. }) => {
                    pending.push(mem::replace(bound_this, Value::Undefined));
                }
                None => {}
            },
            _ => {}
        }
    }

    pub fn object_from<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        let mut props = PropertyMap::new();
        for (key, value) in entries {
            props.insert(key, value);
        }
        Value::object(props)
    }

    pub fn native(name: &'static str, func: NativeFn) -> Self {
        Value::Function(Rc::new(Function::Native {
            name,
            func,
            bound_this: Value::Undefined,
        }))
    }

    pub fn bound_native(name: &'static str, func: NativeFn, this: Value) -> Self {
        Value::Function(Rc::new(Function::Native {
            name,
            func,
            bound_this: this,
        }))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    /// Numeric conversion (`Number(x)`, unary `+`, arithmetic operands).
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => {
                string_to_number(&self.to_js_string())
            }
        }
    }

    /// String conversion (`String(x)`, concatenation, property keys).
    ///
    /// Array joins stop descending past [`MAX_NESTING_DEPTH`] and stop
    /// growing once the text exceeds [`MAX_STRING_LENGTH`], so callers that
    /// build strings should still check the length of what comes back.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Array(_) => {
                let mut out = String::new();
                self.write_js_string(&mut out, &mut HashSet::new());
                out
            }
            other => other.scalar_string(),
        }
    }

    fn scalar_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Array(_) => String::new(),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(func) => format!("function {}() {{ [native code] }}", func.name()),
        }
    }

    fn write_js_string(&self, out: &mut String, seen: &mut HashSet<usize>) {
        let Value::Array(items) = self else {
            out.push_str(&self.scalar_string());
            return;
        };
        let id = Rc::as_ptr(items) as *const () as usize;
        // Cyclic joins render the inner reference as empty.
        if seen.len() >= MAX_NESTING_DEPTH || !seen.insert(id) {
            return;
        }
        if let Ok(items) = items.try_borrow() {
            for (index, item) in items.iter().enumerate() {
                if out.len() > MAX_STRING_LENGTH {
                    break;
                }
                if index > 0 {
                    out.push(',');
                }
                if !item.is_nullish() {
                    item.write_js_string(out, seen);
                }
            }
        }
        seen.remove(&id);
    }

    /// Human-readable rendering used in error messages and logs.
    pub fn display_string(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            Value::Object(map) => {
                let map = match map.try_borrow() {
                    Ok(map) => map,
                    Err(_) => return "[object Object]".to_string(),
                };
                match (map.get("name"), map.get("message")) {
                    (Some(name), Some(message)) => {
                        format!("{}: {}", name.to_js_string(), message.to_js_string())
                    }
                    _ => "[object Object]".to_string(),
                }
            }
            other => other.to_js_string(),
        }
    }

    /// The `===` relation.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// SameValueZero, used by `includes`: like `===` but `NaN` equals itself.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// The `==` relation.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (Value::Array(_) | Value::Object(_), Value::Number(_) | Value::String(_)) => {
                Value::from(self.to_js_string()).loose_equals(other)
            }
            (Value::Number(_) | Value::String(_), Value::Array(_) | Value::Object(_)) => {
                self.loose_equals(&Value::from(other.to_js_string()))
            }
            _ => self.strict_equals(other),
        }
    }
}

/// One string value per character, the way iterating a string yields them.
pub fn chars_of(text: &str) -> Result<Vec<Value>, ScriptError> {
    let chars: Vec<Value> = text
        .chars()
        .take(MAX_ARRAY_LENGTH + 1)
        .map(|c| Value::from(c.to_string()))
        .collect();
    check_array_length(chars.len())?;
    Ok(chars)
}

/// Weak handle to a container a heap has seen allocated.
enum Tracked {
    Array(Weak<RefCell<Vec<Value>>>),
    Object(Weak<RefCell<PropertyMap>>),
}

impl Tracked {
    fn upgrade(&self) -> Option<Value> {
        match self {
            Tracked::Array(weak) => weak.upgrade().map(Value::Array),
            Tracked::Object(weak) => weak.upgrade().map(Value::Object),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Tracked::Array(weak) => weak.strong_count() > 0,
            Tracked::Object(weak) => weak.strong_count() > 0,
        }
    }
}

const PRUNE_FLOOR: usize = 1024;

thread_local! {
    static ACTIVE_HEAPS: RefCell<Vec<Rc<Heap>>> = RefCell::new(Vec::new());
}

fn track(container: impl FnOnce() -> Tracked) {
    let _ = ACTIVE_HEAPS.try_with(|heaps| {
        if let Some(heap) = heaps.borrow().last() {
            heap.track(container());
        }
    });
}

/// The arrays and objects one interpreter allocated.
///
/// Reference counting never frees a cycle such as `o.self = o`. When the
/// owning interpreter is dropped, [`Heap::collect`] empties every tracked
/// container that nothing outside the tracked set still refers to.
pub(crate) struct Heap {
    tracked: RefCell<Vec<Tracked>>,
    prune_at: Cell<usize>,
}

/// Keeps a heap current on this thread; containers built meanwhile join it.
pub(crate) struct HeapGuard(());

impl Drop for HeapGuard {
    fn drop(&mut self) {
        let _ = ACTIVE_HEAPS.try_with(|heaps| heaps.borrow_mut().pop());
    }
}

impl Heap {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            tracked: RefCell::new(Vec::new()),
            prune_at: Cell::new(PRUNE_FLOOR),
        })
    }

    pub(crate) fn enter(self: &Rc<Self>) -> HeapGuard {
        ACTIVE_HEAPS.with(|heaps| heaps.borrow_mut().push(self.clone()));
        HeapGuard(())
    }

    fn track(&self, container: Tracked) {
        let mut tracked = self.tracked.borrow_mut();
        tracked.push(container);
        if tracked.len() >= self.prune_at.get() {
            tracked.retain(Tracked::is_live);
            self.prune_at.set((tracked.len() * 2).max(PRUNE_FLOOR));
        }
    }

    /// Track containers that were built outside the heap (call arguments)
    /// along with everything they reach.
    pub(crate) fn adopt(&self, values: &[Value]) {
        let mut seen = HashSet::new();
        let mut stack: Vec<Value> = values.to_vec();
        while let Some(value) = stack.pop() {
            let Some(id) = container_id(&value) else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            match &value {
                Value::Array(items) => self.track(Tracked::Array(Rc::downgrade(items))),
                Value::Object(map) => self.track(Tracked::Object(Rc::downgrade(map))),
                _ => {}
            }
            for_each_child(&value, |child| stack.push(child.clone()));
        }
    }

    /// Empty the tracked containers reachable only from one another.
    pub(crate) fn collect(&self) {
        let tracked = mem::take(&mut *self.tracked.borrow_mut());
        let mut index = HashMap::new();
        let mut live: Vec<Value> = Vec::new();
        for value in tracked.iter().filter_map(Tracked::upgrade) {
            if let Some(id) = container_id(&value) {
                if !index.contains_key(&id) {
                    index.insert(id, live.len());
                    live.push(value);
                }
            }
        }
        drop(tracked);

        // Strong references that come from inside the tracked set.
        let mut internal = vec![0usize; live.len()];
        for value in &live {
            for_each_child(value, |child| {
                if let Some(&i) = container_id(child).and_then(|id| index.get(&id)) {
                    internal[i] += 1;
                }
            });
        }

        // Anything else holding a container (a returned value, an untracked
        // parent) makes it a root; `live` itself holds one reference.
        let mut reachable = vec![false; live.len()];
        let mut stack: Vec<usize> = (0..live.len())
            .filter(|&i| container_strong_count(&live[i]) > internal[i] + 1)
            .collect();
        while let Some(i) = stack.pop() {
            if mem::replace(&mut reachable[i], true) {
                continue;
            }
            for_each_child(&live[i], |child| {
                if let Some(&j) = container_id(child).and_then(|id| index.get(&id)) {
                    if !reachable[j] {
                        stack.push(j);
                    }
                }
            });
        }

        let mut garbage = Vec::new();
        for (value, _) in live.iter().zip(&reachable).filter(|(_, kept)| !**kept) {
            match value {
                Value::Array(items) => {
                    if let Ok(mut items) = items.try_borrow_mut() {
                        garbage.append(&mut *items);
                    }
                }
                Value::Object(map) => {
                    if let Ok(mut map) = map.try_borrow_mut() {
                        garbage.extend(map.entries.drain(..).map(|(_, value)| value));
                    }
                }
                _ => {}
            }
        }
        drop(garbage);
    }
}

fn container_id(value: &Value) -> Option<usize> {
    match value {
        Value::Array(items) => Some(Rc::as_ptr(items) as *const () as usize),
        Value::Object(map) => Some(Rc::as_ptr(map) as *const () as usize),
        _ => None,
    }
}

fn container_strong_count(value: &Value) -> usize {
    match value {
        Value::Array(items) => Rc::strong_count(items),
        Value::Object(map) => Rc::strong_count(map),
        _ => 0,
    }
}

/// Visit the values a container holds. A function held nowhere else
/// counts as part of its container, so its receiver is visited too.
fn for_each_child(value: &Value, mut visit: impl FnMut(&Value)) {
    let mut through_function = |child: &Value| {
        visit(child);
        if let Value::Function(func) = child {
            if Rc::strong_count(func) == 1 {
                match &**func {
                    Function::Script {
                        lexical_this: Some(this),
                        ..
                    } => visit(this),
                    Function::Native { bound_this, .. } => visit(bound_this),
                    Function::Script { .. } => {}
                }
            }
        }
    };
    match value {
        Value::Array(items) => {
            if let Ok(items) = items.try_borrow() {
                items.iter().for_each(&mut through_function);
            }
        }
        Value::Object(map) => {
            if let Ok(map) = map.try_borrow() {
                map.entries.iter().for_each(|(_, child)| through_function(child));
            }
        }
        _ => {}
    }
}

fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0b", 2), ("0B", 2), ("0o", 8), ("0O", 8)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }
    // Rust accepts spellings like "inf" and "nan" that scripts must not.
    if trimmed
        .chars()
        .any(|c| c.is_alphabetic() && c != 'e' && c != 'E')
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Render a number the way scripts print it (`String(n)`).
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{}", n);
    }
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{}e+{}", mantissa, exponent)
        }
        _ => formatted,
    }
}

/// Convert a numeric property key to an array index, if it is one.
pub fn as_index(n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 && n < u32::MAX as f64 {
        Some(n as usize)
    } else {
        None
    }
}
