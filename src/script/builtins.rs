//! Built-in globals and the methods available on each value kind.
//!
//! Method lookup is table driven: the interpreter asks for `array_method`,
//! `string_method`, etc. by name and binds the result to the receiver.

use super::error::ScriptError;
use super::interpreter::{to_int32, Interpreter, Scope};
use super::json;
use super::value::{
    as_index, chars_of, check_array_length, check_string_length, number_to_string, NativeFn,
    PropertyMap, Value, MAX_ARRAY_LENGTH, MAX_NESTING_DEPTH,
};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;
use tracing::debug;

type NativeResult = Result<Value, ScriptError>;
type Method = (&'static str, NativeFn);

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// ToIntegerOrInfinity.
fn to_integer(value: &Value) -> f64 {
    let n = value.to_number();
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Resolve a possibly negative, possibly missing position against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = to_integer(value);
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

pub fn install_globals(scope: &Scope) {
    let define = |name: &str, value: Value| Interpreter::define_global(scope, name, value, false);

    define("undefined", Value::Undefined);
    define("NaN", Value::Number(f64::NAN));
    define("Infinity", Value::Number(f64::INFINITY));

    define("Math", math_object());
    define(
        "JSON",
        Value::object_from([
            ("stringify", Value::native("stringify", json_stringify)),
            ("parse", Value::native("parse", json_parse)),
        ]),
    );
    define(
        "console",
        Value::object_from([
            ("log", Value::native("log", console_log)),
            ("info", Value::native("info", console_log)),
            ("warn", Value::native("warn", console_log)),
            ("error", Value::native("error", console_log)),
            ("debug", Value::native("debug", console_log)),
        ]),
    );

    define("Number", Value::native("Number", number_ctor));
    define("String", Value::native("String", string_ctor));
    define("Boolean", Value::native("Boolean", boolean_ctor));
    define("Array", Value::native("Array", array_ctor));
    define("Object", Value::native("Object", object_ctor));

    define("Error", Value::native("Error", error_ctor));
    define("TypeError", Value::native("TypeError", type_error_ctor));
    define("RangeError", Value::native("RangeError", range_error_ctor));
    define("ReferenceError", Value::native("ReferenceError", reference_error_ctor));
    define("SyntaxError", Value::native("SyntaxError", syntax_error_ctor));

    define("parseInt", Value::native("parseInt", parse_int));
    define("parseFloat", Value::native("parseFloat", parse_float));
    define("isNaN", Value::native("isNaN", global_is_nan));
    define("isFinite", Value::native("isFinite", global_is_finite));
}

/// Properties read off built-in constructors, e.g. `Number.isInteger`.
pub fn static_member(owner: &str, key: &str) -> Option<Value> {
    let value = match (owner, key) {
        ("Number", "isInteger") => Value::native("isInteger", number_is_integer),
        ("Number", "isSafeInteger") => Value::native("isSafeInteger", number_is_safe_integer),
        ("Number", "isFinite") => Value::native("isFinite", number_is_finite),
        ("Number", "isNaN") => Value::native("isNaN", number_is_nan),
        ("Number", "parseInt") => Value::native("parseInt", parse_int),
        ("Number", "parseFloat") => Value::native("parseFloat", parse_float),
        ("Number", "MAX_SAFE_INTEGER") => Value::Number(9_007_199_254_740_991.0),
        ("Number", "MIN_SAFE_INTEGER") => Value::Number(-9_007_199_254_740_991.0),
        ("Number", "EPSILON") => Value::Number(f64::EPSILON),
        ("Number", "MAX_VALUE") => Value::Number(f64::MAX),
        ("Number", "MIN_VALUE") => Value::Number(5e-324),
        ("Number", "POSITIVE_INFINITY") => Value::Number(f64::INFINITY),
        ("Number", "NEGATIVE_INFINITY") => Value::Number(f64::NEG_INFINITY),
        ("Number", "NaN") => Value::Number(f64::NAN),
        ("String", "fromCharCode") => Value::native("fromCharCode", string_from_char_code),
        ("Array", "isArray") => Value::native("isArray", array_is_array),
        ("Array", "from") => Value::native("from", array_from),
        ("Array", "of") => Value::native("of", array_of),
        ("Object", "keys") => Value::native("keys", object_keys),
        ("Object", "values") => Value::native("values", object_values),
        ("Object", "entries") => Value::native("entries", object_entries),
        ("Object", "assign") => Value::native("assign", object_assign),
        ("Object", "fromEntries") => Value::native("fromEntries", object_from_entries),
        ("Object", "freeze") => Value::native("freeze", identity),
        _ => return None,
    };
    Some(value)
}

// ----------------------------------------------------------------------
// Globals
// ----------------------------------------------------------------------

fn math_object() -> Value {
    let mut props = PropertyMap::new();
    for (name, value) in [
        ("PI", std::f64::consts::PI),
        ("E", std::f64::consts::E),
        ("LN2", std::f64::consts::LN_2),
        ("LN10", std::f64::consts::LN_10),
        ("LOG2E", std::f64::consts::LOG2_E),
        ("LOG10E", std::f64::consts::LOG10_E),
        ("SQRT2", std::f64::consts::SQRT_2),
        ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ] {
        props.insert(name, Value::Number(value));
    }
    let functions: [Method; 21] = [
        ("abs", |_, _, a| math1(&a, f64::abs)),
        ("floor", |_, _, a| math1(&a, f64::floor)),
        ("ceil", |_, _, a| math1(&a, f64::ceil)),
        ("round", |_, _, a| math1(&a, js_round)),
        ("trunc", |_, _, a| math1(&a, f64::trunc)),
        ("sign", |_, _, a| math1(&a, js_sign)),
        ("sqrt", |_, _, a| math1(&a, f64::sqrt)),
        ("cbrt", |_, _, a| math1(&a, f64::cbrt)),
        ("log", |_, _, a| math1(&a, f64::ln)),
        ("log2", |_, _, a| math1(&a, f64::log2)),
        ("log10", |_, _, a| math1(&a, f64::log10)),
        ("exp", |_, _, a| math1(&a, f64::exp)),
        ("sin", |_, _, a| math1(&a, f64::sin)),
        ("cos", |_, _, a| math1(&a, f64::cos)),
        ("tan", |_, _, a| math1(&a, f64::tan)),
        ("atan", |_, _, a| math1(&a, f64::atan)),
        ("atan2", |_, _, a| Ok(Value::Number(arg(&a, 0).to_number().atan2(arg(&a, 1).to_number())))),
        ("pow", math_pow),
        ("max", math_max),
        ("min", math_min),
        ("hypot", |_, _, a| Ok(Value::Number(a.iter().map(|v| v.to_number().powi(2)).sum::<f64>().sqrt()))),
    ];
    for (name, func) in functions {
        props.insert(name, Value::native(name, func));
    }
    Value::object(props)
}

fn math1(args: &[Value], f: fn(f64) -> f64) -> NativeResult {
    Ok(Value::Number(f(arg(args, 0).to_number())))
}

fn js_round(n: f64) -> f64 {
    if !n.is_finite() || n.fract() == 0.0 {
        return n;
    }
    (n + 0.5).floor()
}

fn js_sign(n: f64) -> f64 {
    if n.is_nan() || n == 0.0 {
        n
    } else {
        n.signum()
    }
}

fn math_pow(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let (base, exponent) = (arg(&args, 0).to_number(), arg(&args, 1).to_number());
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(base.powf(exponent)))
}

fn math_max(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let mut result = f64::NEG_INFINITY;
    for n in args.iter().map(Value::to_number) {
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        result = result.max(n);
    }
    Ok(Value::Number(result))
}

fn math_min(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let mut result = f64::INFINITY;
    for n in args.iter().map(Value::to_number) {
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        result = result.min(n);
    }
    Ok(Value::Number(result))
}

fn json_stringify(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let gap = match &arg(&args, 2) {
        Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    Ok(json::stringify_with_gap(&arg(&args, 0), &gap)?
        .map(Value::from)
        .unwrap_or(Value::Undefined))
}

fn json_parse(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    json::parse(&arg(&args, 0).to_js_string())
}

fn console_log(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let line = args
        .iter()
        .map(Value::display_string)
        .collect::<Vec<_>>()
        .join(" ");
    debug!(target: "exampro_shim::script", "console: {}", line);
    Ok(Value::Undefined)
}

fn identity(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(arg(&args, 0))
}

fn number_ctor(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(Value::Number(args.first().map(Value::to_number).unwrap_or(0.0)))
}

fn string_ctor(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(Value::from(args.first().map(Value::to_js_string).unwrap_or_default()))
}

fn boolean_ctor(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(arg(&args, 0).truthy()))
}

fn array_ctor(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::Number(n)] => match as_index(*n) {
            Some(len) => {
                check_array_length(len)?;
                Ok(Value::array(vec![Value::Undefined; len]))
            }
            None => Err(ScriptError::range("Invalid array length")),
        },
        _ => Ok(Value::array(args)),
    }
}

fn object_ctor(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    match arg(&args, 0) {
        value @ (Value::Object(_) | Value::Array(_) | Value::Function(_)) => Ok(value),
        _ => Ok(Value::object(PropertyMap::new())),
    }
}

fn make_error(name: &str, args: &[Value]) -> Value {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        other => other.to_js_string(),
    };
    Value::object_from([("name", Value::from(name)), ("message", Value::from(message))])
}

fn error_ctor(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(make_error("Error", &args))
}

fn type_error_ctor(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(make_error("TypeError", &args))
}

fn range_error_ctor(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(make_error("RangeError", &args))
}

fn reference_error_ctor(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(make_error("ReferenceError", &args))
}

fn syntax_error_ctor(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(make_error("SyntaxError", &args))
}

fn parse_int(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let text = arg(&args, 0).to_js_string();
    let mut rest = text.trim_start();
    let negative = rest.starts_with('-');
    if negative || rest.starts_with('+') {
        rest = &rest[1..];
    }
    let mut radix = to_int32(arg(&args, 1).to_number()) as u32;
    if radix == 0 || radix == 16 {
        if let Some(stripped) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            rest = stripped;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    let mut result = 0.0;
    let mut any = false;
    for digit in rest.chars().map_while(|c| c.to_digit(radix)) {
        result = result * f64::from(radix) + f64::from(digit);
        any = true;
    }
    if !any {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(if negative { -result } else { result }))
}

/// Longest prefix of `text` that reads as a decimal literal.
fn float_prefix(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    if text[end..].starts_with("Infinity") {
        return &text[..end + "Infinity".len()];
    }
    let digits = |from: usize| from + bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count();
    let int_end = digits(end);
    let mut mantissa_end = int_end;
    if bytes.get(int_end) == Some(&b'.') {
        let frac_end = digits(int_end + 1);
        if frac_end > int_end + 1 || int_end > end {
            mantissa_end = frac_end;
        }
    }
    if mantissa_end == end || (mantissa_end == end + 1 && bytes[end] == b'.') {
        return "";
    }
    let mut final_end = mantissa_end;
    if matches!(bytes.get(mantissa_end), Some(b'e' | b'E')) {
        let mut exp_start = mantissa_end + 1;
        if matches!(bytes.get(exp_start), Some(b'+' | b'-')) {
            exp_start += 1;
        }
        let exp_end = digits(exp_start);
        if exp_end > exp_start {
            final_end = exp_end;
        }
    }
    &text[..final_end]
}

fn parse_float(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let text = arg(&args, 0).to_js_string();
    let prefix = float_prefix(text.trim_start());
    let value = match prefix.trim_start_matches(['+', '-']) {
        "" => f64::NAN,
        "Infinity" if prefix.starts_with('-') => f64::NEG_INFINITY,
        "Infinity" => f64::INFINITY,
        _ => prefix.parse::<f64>().unwrap_or(f64::NAN),
    };
    Ok(Value::Number(value))
}

fn global_is_nan(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(arg(&args, 0).to_number().is_nan()))
}

fn global_is_finite(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(arg(&args, 0).to_number().is_finite()))
}

fn number_is_integer(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)))
}

fn number_is_safe_integer(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(matches!(
        arg(&args, 0),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0
    )))
}

fn number_is_finite(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite())))
}

fn number_is_nan(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_nan())))
}

fn string_from_char_code(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let units: Vec<u16> = args.iter().map(|v| to_int32(v.to_number()) as u16).collect();
    Ok(Value::from(String::from_utf16_lossy(&units)))
}

fn array_is_array(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_))))
}

fn array_of(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    Ok(Value::array(args))
}

fn array_from(interp: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let source = arg(&args, 0);
    let items: Vec<Value> = match &source {
        Value::Array(items) => items.borrow().clone(),
        Value::String(text) => chars_of(text)?,
        Value::Object(map) => {
            let len = map.borrow().get("length").map(Value::to_number).unwrap_or(0.0);
            let len = as_index(len.max(0.0).trunc()).unwrap_or(0);
            check_array_length(len)?;
            (0..len)
                .map(|i| map.borrow().get(&i.to_string()).cloned().unwrap_or(Value::Undefined))
                .collect()
        }
        _ => Vec::new(),
    };
    let mapper = arg(&args, 1);
    if mapper.is_nullish() {
        return Ok(Value::array(items));
    }
    let mut mapped = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        mapped.push(interp.call(&mapper, Value::Undefined, vec![item, Value::from(index)])?);
    }
    Ok(Value::array(mapped))
}

/// Own enumerable keys of objects, arrays and strings.
fn own_keys(value: &Value) -> Vec<Rc<str>> {
    match value {
        Value::Object(map) => map.borrow().keys().cloned().collect(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| Rc::from(i.to_string().as_str())).collect(),
        Value::String(text) => (0..text.chars().count()).map(|i| Rc::from(i.to_string().as_str())).collect(),
        _ => Vec::new(),
    }
}

fn require_object_coercible(value: &Value) -> Result<(), ScriptError> {
    if value.is_nullish() {
        return Err(ScriptError::type_error("Cannot convert undefined or null to object"));
    }
    Ok(())
}

fn object_keys(_: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let target = arg(&args, 0);
    require_object_coercible(&target)?;
    Ok(Value::array(own_keys(&target).into_iter().map(Value::String).collect()))
}

fn object_values(interp: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let target = arg(&args, 0);
    require_object_coercible(&target)?;
    let mut values = Vec::new();
    for key in own_keys(&target) {
        values.push(interp.get_member(&target, &Value::String(key))?);
    }
    Ok(Value::array(values))
}

fn object_entries(interp: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let target = arg(&args, 0);
    require_object_coercible(&target)?;
    let mut entries = Vec::new();
    for key in own_keys(&target) {
        let value = interp.get_member(&target, &Value::String(key.clone()))?;
        entries.push(Value::array(vec![Value::String(key), value]));
    }
    Ok(Value::array(entries))
}

fn object_assign(interp: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let target = arg(&args, 0);
    require_object_coercible(&target)?;
    for source in args.iter().skip(1) {
        for key in own_keys(source) {
            let key = Value::String(key);
            let value = interp.get_member(source, &key)?;
            interp.set_member(&target, &key, value)?;
        }
    }
    Ok(target)
}

fn object_from_entries(interp: &mut Interpreter, _: &Value, args: Vec<Value>) -> NativeResult {
    let source = arg(&args, 0);
    let Value::Array(entries) = &source else {
        return Err(ScriptError::type_error("Object.fromEntries requires an iterable"));
    };
    let mut props = PropertyMap::new();
    let entries = entries.borrow().clone();
    for entry in &entries {
        let key = interp.get_member(entry, &Value::Number(0.0))?;
        let value = interp.get_member(entry, &Value::Number(1.0))?;
        props.insert(key.to_js_string().as_str(), value);
    }
    Ok(Value::object(props))
}

// ----------------------------------------------------------------------
// Methods by receiver kind
// ----------------------------------------------------------------------

pub fn to_string_method(_: &mut Interpreter, this: &Value, _: Vec<Value>) -> NativeResult {
    Ok(Value::from(this.to_js_string()))
}

pub fn object_method(name: &str) -> Option<Method> {
    let method: Method = match name {
        "hasOwnProperty" => ("hasOwnProperty", |_, this, args| {
            let key = arg(&args, 0).to_js_string();
            Ok(Value::Bool(own_keys(this).iter().any(|k| k.as_ref() == key)))
        }),
        "toString" => ("toString", to_string_method),
        _ => return None,
    };
    Some(method)
}

pub fn function_method(name: &str) -> Option<Method> {
    let method: Method = match name {
        "call" => ("call", |interp, this, mut args| {
            let receiver = if args.is_empty() { Value::Undefined } else { args.remove(0) };
            interp.call(this, receiver, args)
        }),
        "apply" => ("apply", |interp, this, args| {
            let list = match &arg(&args, 1) {
                Value::Array(items) => items.borrow().clone(),
                Value::Undefined | Value::Null => Vec::new(),
                _ => return Err(ScriptError::type_error("CreateListFromArrayLike called on non-object")),
            };
            interp.call(this, arg(&args, 0), list)
        }),
        "toString" => ("toString", to_string_method),
        _ => return None,
    };
    Some(method)
}

pub fn number_method(name: &str) -> Option<Method> {
    let method: Method = match name {
        "toFixed" => ("toFixed", number_to_fixed),
        "toString" => ("toString", number_to_string_radix),
        "valueOf" => ("valueOf", |_, this, _| Ok(this.clone())),
        _ => return None,
    };
    Some(method)
}

fn number_to_fixed(_: &mut Interpreter, this: &Value, args: Vec<Value>) -> NativeResult {
    let n = this.to_number();
    let digits = to_integer(&arg(&args, 0));
    if !(0.0..=100.0).contains(&digits) {
        return Err(ScriptError::range("toFixed() digits argument must be between 0 and 100"));
    }
    if !n.is_finite() || n.abs() >= 1e21 {
        return Ok(Value::from(number_to_string(n)));
    }
    let digits = digits as usize;
    let scale = 10f64.powi(digits as i32);
    let scaled = n.abs() * scale;
    // Exact ties round away from zero.
    let text = if scaled.fract() == 0.5 {
        let rounded = (scaled.floor() + 1.0) / scale;
        format!("{}{:.*}", if n < 0.0 { "-" } else { "" }, digits, rounded)
    } else {
        format!("{:.*}", digits, n)
    };
    Ok(Value::from(text))
}

fn number_to_string_radix(_: &mut Interpreter, this: &Value, args: Vec<Value>) -> NativeResult {
    let n = this.to_number();
    let radix = match arg(&args, 0) {
        Value::Undefined => 10,
        other => to_integer(&other) as u32,
    };
    if !(2..=36).contains(&radix) {
        return Err(ScriptError::range("toString() radix must be between 2 and 36"));
    }
    if radix == 10 || !n.is_finite() {
        return Ok(Value::from(number_to_string(n)));
    }
    let mut magnitude = n.abs().trunc();
    let mut digits = Vec::new();
    while magnitude >= 1.0 {
        let digit = (magnitude % f64::from(radix)) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        magnitude = (magnitude / f64::from(radix)).trunc();
    }
    if digits.is_empty() {
        digits.push('0');
    }
    if n < 0.0 {
        digits.push('-');
    }
    Ok(Value::from(digits.into_iter().rev().collect::<String>()))
}

// ----------------------------------------------------------------------
// Array methods
// ----------------------------------------------------------------------

fn this_array(this: &Value) -> Result<Rc<RefCell<Vec<Value>>>, ScriptError> {
    match this {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(ScriptError::type_error("Array method called on a non-array")),
    }
}

fn callback(args: &[Value], method: &str) -> Result<Value, ScriptError> {
    let func = arg(args, 0);
    if !func.is_callable() {
        return Err(ScriptError::type_error(format!(
            "{} is not a function (in Array.prototype.{})",
            func.display_string(),
            method
        )));
    }
    Ok(func)
}

fn element(items: &Rc<RefCell<Vec<Value>>>, index: usize) -> Value {
    items.borrow().get(index).cloned().unwrap_or(Value::Undefined)
}

pub fn array_method(name: &str) -> Option<Method> {
    let method: Method = match name {
        "push" => ("push", |_, this, args| {
            let items = this_array(this)?;
            let mut items = items.borrow_mut();
            check_array_length(items.len() + args.len())?;
            items.extend(args);
            Ok(Value::from(items.len()))
        }),
        "pop" => ("pop", |_, this, _| {
            Ok(this_array(this)?.borrow_mut().pop().unwrap_or(Value::Undefined))
        }),
        "shift" => ("shift", |_, this, _| {
            let items = this_array(this)?;
            let mut items = items.borrow_mut();
            Ok(if items.is_empty() { Value::Undefined } else { items.remove(0) })
        }),
        "unshift" => ("unshift", |_, this, args| {
            let items = this_array(this)?;
            let mut items = items.borrow_mut();
            check_array_length(items.len() + args.len())?;
            items.splice(0..0, args);
            Ok(Value::from(items.len()))
        }),
        "slice" => ("slice", |_, this, args| {
            let items = this_array(this)?;
            let items = items.borrow();
            let start = relative_index(&arg(&args, 0), items.len(), 0);
            let end = relative_index(&arg(&args, 1), items.len(), items.len());
            Ok(Value::array(items.get(start..end.max(start)).unwrap_or_default().to_vec()))
        }),
        "splice" => ("splice", array_splice),
        "concat" => ("concat", |_, this, args| {
            let mut result = this_array(this)?.borrow().clone();
            for value in args {
                match &value {
                    Value::Array(other) => result.extend(other.borrow().iter().cloned()),
                    _ => result.push(value),
                }
                check_array_length(result.len())?;
            }
            Ok(Value::array(result))
        }),
        "join" => ("join", |_, this, args| {
            let separator = match arg(&args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_js_string(),
            };
            let items = this_array(this)?.borrow().clone();
            let mut text = String::new();
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    text.push_str(&separator);
                }
                if !item.is_nullish() {
                    text.push_str(&item.to_js_string());
                }
                check_string_length(text.len())?;
            }
            Ok(Value::from(text))
        }),
        "toString" => ("toString", to_string_method),
        "reverse" => ("reverse", |_, this, _| {
            this_array(this)?.borrow_mut().reverse();
            Ok(this.clone())
        }),
        "indexOf" => ("indexOf", |_, this, args| {
            let items = this_array(this)?.borrow().clone();
            let target = arg(&args, 0);
            let start = relative_index(&arg(&args, 1), items.len(), 0);
            let found = items.iter().skip(start).position(|v| v.strict_equals(&target));
            Ok(Value::Number(found.map(|i| (i + start) as f64).unwrap_or(-1.0)))
        }),
        "lastIndexOf" => ("lastIndexOf", |_, this, args| {
            let items = this_array(this)?.borrow().clone();
            let target = arg(&args, 0);
            let found = items.iter().rposition(|v| v.strict_equals(&target));
            Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
        }),
        "includes" => ("includes", |_, this, args| {
            let items = this_array(this)?.borrow().clone();
            let target = arg(&args, 0);
            let start = relative_index(&arg(&args, 1), items.len(), 0);
            Ok(Value::Bool(items.iter().skip(start).any(|v| v.same_value_zero(&target))))
        }),
        "at" => ("at", |_, this, args| {
            let items = this_array(this)?;
            let len = items.borrow().len() as f64;
            let mut index = to_integer(&arg(&args, 0));
            if index < 0.0 {
                index += len;
            }
            Ok(as_index(index).map(|i| element(&items, i)).unwrap_or(Value::Undefined))
        }),
        "fill" => ("fill", |_, this, args| {
            let items = this_array(this)?;
            let mut items = items.borrow_mut();
            let len = items.len();
            let start = relative_index(&arg(&args, 1), len, 0);
            let end = relative_index(&arg(&args, 2), len, len);
            for slot in items.iter_mut().take(end).skip(start) {
                *slot = arg(&args, 0);
            }
            Ok(this.clone())
        }),
        "flat" => ("flat", |_, this, args| {
            let depth = match arg(&args, 0) {
                Value::Undefined => 1.0,
                other => to_integer(&other),
            };
            let items = this_array(this)?.borrow().clone();
            Ok(Value::array(flatten(items, depth)?))
        }),
        "forEach" => ("forEach", |interp, this, args| {
            let func = callback(&args, "forEach")?;
            let items = this_array(this)?;
            let len = items.borrow().len();
            for index in 0..len {
                let item = element(&items, index);
                interp.call(&func, Value::Undefined, vec![item, Value::from(index), this.clone()])?;
            }
            Ok(Value::Undefined)
        }),
        "map" => ("map", |interp, this, args| {
            let func = callback(&args, "map")?;
            let items = this_array(this)?;
            let len = items.borrow().len();
            let mut result = Vec::with_capacity(len);
            for index in 0..len {
                let item = element(&items, index);
                result.push(interp.call(&func, Value::Undefined, vec![item, Value::from(index), this.clone()])?);
            }
            Ok(Value::array(result))
        }),
        "filter" => ("filter", |interp, this, args| {
            let func = callback(&args, "filter")?;
            let items = this_array(this)?;
            let len = items.borrow().len();
            let mut result = Vec::new();
            for index in 0..len {
                let item = element(&items, index);
                let keep = interp.call(&func, Value::Undefined, vec![item.clone(), Value::from(index), this.clone()])?;
                if keep.truthy() {
                    result.push(item);
                }
            }
            Ok(Value::array(result))
        }),
        "some" => ("some", |interp, this, args| {
            let index = find_index(interp, this, &args, "some", false)?;
            Ok(Value::Bool(index.is_some()))
        }),
        "every" => ("every", |interp, this, args| {
            let func = callback(&args, "every")?;
            let items = this_array(this)?;
            let len = items.borrow().len();
            for index in 0..len {
                let item = element(&items, index);
                if !interp.call(&func, Value::Undefined, vec![item, Value::from(index), this.clone()])?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }),
        "find" => ("find", |interp, this, args| {
            let index = find_index(interp, this, &args, "find", false)?;
            match index {
                Some(i) => Ok(element(&this_array(this)?, i)),
                None => Ok(Value::Undefined),
            }
        }),
        "findIndex" => ("findIndex", |interp, this, args| {
            let index = find_index(interp, this, &args, "findIndex", false)?;
            Ok(Value::Number(index.map(|i| i as f64).unwrap_or(-1.0)))
        }),
        "findLast" => ("findLast", |interp, this, args| {
            let index = find_index(interp, this, &args, "findLast", true)?;
            match index {
                Some(i) => Ok(element(&this_array(this)?, i)),
                None => Ok(Value::Undefined),
            }
        }),
        "findLastIndex" => ("findLastIndex", |interp, this, args| {
            let index = find_index(interp, this, &args, "findLastIndex", true)?;
            Ok(Value::Number(index.map(|i| i as f64).unwrap_or(-1.0)))
        }),
        "reduce" => ("reduce", |interp, this, args| reduce(interp, this, args, false)),
        "reduceRight" => ("reduceRight", |interp, this, args| reduce(interp, this, args, true)),
        "sort" => ("sort", array_sort),
        _ => return None,
    };
    Some(method)
}

fn flatten(items: Vec<Value>, depth: f64) -> Result<Vec<Value>, ScriptError> {
    let mut result = Vec::new();
    // Partly consumed arrays, each with the depth still allowed below it.
    let mut runs = vec![(items.into_iter(), depth)];
    while let Some((run, depth)) = runs.last_mut() {
        let depth = *depth;
        let Some(item) = run.next() else {
            runs.pop();
            continue;
        };
        match &item {
            Value::Array(inner) if depth >= 1.0 => {
                if runs.len() >= MAX_NESTING_DEPTH {
                    return Err(ScriptError::range("Maximum call stack size exceeded"));
                }
                let inner = inner.borrow().clone();
                runs.push((inner.into_iter(), depth - 1.0));
            }
            _ => {
                result.push(item);
                check_array_length(result.len())?;
            }
        }
    }
    Ok(result)
}

fn find_index(
    interp: &mut Interpreter,
    this: &Value,
    args: &[Value],
    method: &str,
    from_end: bool,
) -> Result<Option<usize>, ScriptError> {
    let func = callback(args, method)?;
    let items = this_array(this)?;
    let len = items.borrow().len();
    let indices: Box<dyn Iterator<Item = usize>> = if from_end {
        Box::new((0..len).rev())
    } else {
        Box::new(0..len)
    };
    for index in indices {
        let item = element(&items, index);
        if interp.call(&func, Value::Undefined, vec![item, Value::from(index), this.clone()])?.truthy() {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn reduce(interp: &mut Interpreter, this: &Value, args: Vec<Value>, from_end: bool) -> NativeResult {
    let func = callback(&args, if from_end { "reduceRight" } else { "reduce" })?;
    let items = this_array(this)?;
    let len = items.borrow().len();
    let mut indices: Vec<usize> = (0..len).collect();
    if from_end {
        indices.reverse();
    }
    let mut indices = indices.into_iter();
    let mut accumulator = match args.get(1) {
        Some(initial) => initial.clone(),
        None => match indices.next() {
            Some(first) => element(&items, first),
            None => return Err(ScriptError::type_error("Reduce of empty array with no initial value")),
        },
    };
    for index in indices {
        let item = element(&items, index);
        accumulator = interp.call(
            &func,
            Value::Undefined,
            vec![accumulator, item, Value::from(index), this.clone()],
        )?;
    }
    Ok(accumulator)
}

fn array_splice(_: &mut Interpreter, this: &Value, args: Vec<Value>) -> NativeResult {
    let items = this_array(this)?;
    let mut items = items.borrow_mut();
    let len = items.len();
    let start = relative_index(&arg(&args, 0), len, 0);
    let delete_count = match args.len() {
        0 => 0,
        1 => len - start,
        _ => (to_integer(&args[1]).max(0.0) as usize).min(len - start),
    };
    let inserted: Vec<Value> = args.into_iter().skip(2).collect();
    check_array_length(len - delete_count + inserted.len())?;
    let removed: Vec<Value> = items.splice(start..start + delete_count, inserted).collect();
    Ok(Value::array(removed))
}

fn array_sort(interp: &mut Interpreter, this: &Value, args: Vec<Value>) -> NativeResult {
    let comparator = arg(&args, 0);
    if !comparator.is_nullish() && !comparator.is_callable() {
        return Err(ScriptError::type_error(
            "The comparison function must be either a function or undefined",
        ));
    }
    let items = this_array(this)?;
    let snapshot = items.borrow().clone();
    let (defined, undefined): (Vec<Value>, Vec<Value>) = snapshot
        .into_iter()
        .partition(|v| !matches!(v, Value::Undefined));
    let mut sorted = merge_sort(interp, defined, &comparator)?;
    sorted.extend(undefined);
    *items.borrow_mut() = sorted;
    Ok(this.clone())
}

/// Stable merge sort that surfaces comparator exceptions.
fn merge_sort(interp: &mut Interpreter, mut items: Vec<Value>, comparator: &Value) -> Result<Vec<Value>, ScriptError> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(interp, items, comparator)?;
    let right = merge_sort(interp, right, comparator)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if sort_compare(interp, comparator, &right[j], &left[i])? == Ordering::Less {
            merged.push(right[j].clone());
            j += 1;
        } else {
            merged.push(left[i].clone());
            i += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    Ok(merged)
}

fn sort_compare(interp: &mut Interpreter, comparator: &Value, a: &Value, b: &Value) -> Result<Ordering, ScriptError> {
    if comparator.is_nullish() {
        return Ok(a.to_js_string().cmp(&b.to_js_string()));
    }
    let result = interp
        .call(comparator, Value::Undefined, vec![a.clone(), b.clone()])?
        .to_number();
    Ok(result.partial_cmp(&0.0).unwrap_or(Ordering::Equal))
}

// ----------------------------------------------------------------------
// String methods
// ----------------------------------------------------------------------

fn this_chars(this: &Value) -> Vec<char> {
    this.to_js_string().chars().collect()
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn collect(chars: &[char]) -> Value {
    Value::from(chars.iter().collect::<String>())
}

pub fn string_method(name: &str) -> Option<Method> {
    let method: Method = match name {
        "charAt" => ("charAt", |_, this, args| {
            let chars = this_chars(this);
            let index = to_integer(&arg(&args, 0));
            Ok(as_index(index)
                .and_then(|i| chars.get(i))
                .map(|c| Value::from(c.to_string()))
                .unwrap_or_else(|| Value::from("")))
        }),
        "charCodeAt" => ("charCodeAt", |_, this, args| {
            let text = this.to_js_string();
            let index = to_integer(&arg(&args, 0));
            Ok(Value::Number(
                as_index(index)
                    .and_then(|i| text.encode_utf16().nth(i))
                    .map(f64::from)
                    .unwrap_or(f64::NAN),
            ))
        }),
        "at" => ("at", |_, this, args| {
            let chars = this_chars(this);
            let mut index = to_integer(&arg(&args, 0));
            if index < 0.0 {
                index += chars.len() as f64;
            }
            Ok(as_index(index)
                .and_then(|i| chars.get(i))
                .map(|c| Value::from(c.to_string()))
                .unwrap_or(Value::Undefined))
        }),
        "indexOf" => ("indexOf", |_, this, args| {
            let chars = this_chars(this);
            let needle: Vec<char> = arg(&args, 0).to_js_string().chars().collect();
            let from = relative_index(&arg(&args, 1), chars.len(), 0);
            Ok(Value::Number(find_chars(&chars, &needle, from).map(|i| i as f64).unwrap_or(-1.0)))
        }),
        "lastIndexOf" => ("lastIndexOf", |_, this, args| {
            let chars = this_chars(this);
            let needle: Vec<char> = arg(&args, 0).to_js_string().chars().collect();
            let found = (0..=chars.len().saturating_sub(needle.len()))
                .rev()
                .find(|&i| chars.len() >= needle.len() && chars[i..i + needle.len()] == *needle);
            Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
        }),
        "includes" => ("includes", |_, this, args| {
            let chars = this_chars(this);
            let needle: Vec<char> = arg(&args, 0).to_js_string().chars().collect();
            let from = relative_index(&arg(&args, 1), chars.len(), 0);
            Ok(Value::Bool(find_chars(&chars, &needle, from).is_some()))
        }),
        "startsWith" => ("startsWith", |_, this, args| {
            let chars = this_chars(this);
            let needle: Vec<char> = arg(&args, 0).to_js_string().chars().collect();
            let from = relative_index(&arg(&args, 1), chars.len(), 0);
            Ok(Value::Bool(chars[from..].starts_with(&needle)))
        }),
        "endsWith" => ("endsWith", |_, this, args| {
            let chars = this_chars(this);
            let needle: Vec<char> = arg(&args, 0).to_js_string().chars().collect();
            let end = relative_index(&arg(&args, 1), chars.len(), chars.len());
            Ok(Value::Bool(chars[..end].ends_with(&needle)))
        }),
        "slice" => ("slice", |_, this, args| {
            let chars = this_chars(this);
            let start = relative_index(&arg(&args, 0), chars.len(), 0);
            let end = relative_index(&arg(&args, 1), chars.len(), chars.len());
            Ok(collect(chars.get(start..end.max(start)).unwrap_or_default()))
        }),
        "substring" => ("substring", |_, this, args| {
            let chars = this_chars(this);
            let clamp = |v: Value, default: usize| match v {
                Value::Undefined => default,
                other => to_integer(&other).clamp(0.0, chars.len() as f64) as usize,
            };
            let start = clamp(arg(&args, 0), 0);
            let end = clamp(arg(&args, 1), chars.len());
            let (start, end) = (start.min(end), start.max(end));
            Ok(collect(&chars[start..end]))
        }),
        "split" => ("split", string_split),
        "toUpperCase" => ("toUpperCase", |_, this, _| Ok(Value::from(this.to_js_string().to_uppercase()))),
        "toLowerCase" => ("toLowerCase", |_, this, _| Ok(Value::from(this.to_js_string().to_lowercase()))),
        "trim" => ("trim", |_, this, _| Ok(Value::from(this.to_js_string().trim()))),
        "trimStart" => ("trimStart", |_, this, _| Ok(Value::from(this.to_js_string().trim_start()))),
        "trimEnd" => ("trimEnd", |_, this, _| Ok(Value::from(this.to_js_string().trim_end()))),
        "repeat" => ("repeat", |_, this, args| {
            let count = to_integer(&arg(&args, 0));
            if !(0.0..=1e8).contains(&count) {
                return Err(ScriptError::range(format!("Invalid count value: {}", number_to_string(count))));
            }
            let text = this.to_js_string();
            check_string_length(text.len().saturating_mul(count as usize))?;
            Ok(Value::from(text.repeat(count as usize)))
        }),
        "padStart" => ("padStart", |_, this, args| pad(this, &args, true)),
        "padEnd" => ("padEnd", |_, this, args| pad(this, &args, false)),
        "concat" => ("concat", |_, this, args| {
            let mut text = this.to_js_string();
            for value in &args {
                let part = value.to_js_string();
                check_string_length(text.len() + part.len())?;
                text.push_str(&part);
            }
            check_string_length(text.len())?;
            Ok(Value::from(text))
        }),
        "replace" => ("replace", |interp, this, args| string_replace(interp, this, args, false)),
        "replaceAll" => ("replaceAll", |interp, this, args| string_replace(interp, this, args, true)),
        "localeCompare" => ("localeCompare", |_, this, args| {
            let ordering = this.to_js_string().cmp(&arg(&args, 0).to_js_string());
            Ok(Value::Number(match ordering {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            }))
        }),
        "toString" | "valueOf" => ("toString", to_string_method),
        _ => return None,
    };
    Some(method)
}

fn pad(this: &Value, args: &[Value], at_start: bool) -> NativeResult {
    let text = this.to_js_string();
    let target = to_integer(&arg(args, 0)).max(0.0) as usize;
    let filler: Vec<char> = match arg(args, 1) {
        Value::Undefined => vec![' '],
        other => other.to_js_string().chars().collect(),
    };
    let len = text.chars().count();
    if target <= len || filler.is_empty() {
        return Ok(Value::from(text));
    }
    let widest = filler.iter().map(|c| c.len_utf8()).max().unwrap_or(1);
    check_string_length((target - len).saturating_mul(widest).saturating_add(text.len()))?;
    let padding: String = filler.iter().cycle().take(target - len).collect();
    Ok(Value::from(if at_start {
        format!("{}{}", padding, text)
    } else {
        format!("{}{}", text, padding)
    }))
}

fn string_split(_: &mut Interpreter, this: &Value, args: Vec<Value>) -> NativeResult {
    let text = this.to_js_string();
    let limit = match arg(&args, 1) {
        Value::Undefined => usize::MAX,
        other => to_integer(&other).max(0.0) as usize,
    };
    let parts: Vec<Value> = match arg(&args, 0) {
        Value::Undefined => vec![Value::from(text)],
        separator => {
            let separator = separator.to_js_string();
            // One past the cap, so an oversized result is reported rather than truncated.
            let bound = limit.min(MAX_ARRAY_LENGTH + 1);
            if separator.is_empty() {
                text.chars().take(bound).map(|c| Value::from(c.to_string())).collect()
            } else {
                text.split(separator.as_str()).take(bound).map(Value::from).collect()
            }
        }
    };
    check_array_length(parts.len())?;
    Ok(Value::array(parts.into_iter().take(limit).collect()))
}

fn string_replace(interp: &mut Interpreter, this: &Value, args: Vec<Value>, all: bool) -> NativeResult {
    let text = this.to_js_string();
    let pattern = arg(&args, 0).to_js_string();
    let replacement = arg(&args, 1);

    let mut positions = Vec::new();
    let mut from = 0;
    while let Some(found) = text[from..].find(&pattern) {
        positions.push(from + found);
        if !all {
            break;
        }
        from += found + pattern.len().max(1);
        if from > text.len() {
            break;
        }
        while !text.is_char_boundary(from) {
            from += 1;
        }
    }

    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for position in positions {
        result.push_str(&text[last..position]);
        let substitute = if replacement.is_callable() {
            let char_index = text[..position].chars().count();
            interp
                .call(
                    &replacement,
                    Value::Undefined,
                    vec![Value::from(pattern.as_str()), Value::from(char_index), this.clone()],
                )?
                .to_js_string()
        } else {
            replacement.to_js_string().replace("$&", &pattern)
        };
        check_string_length(result.len() + substitute.len())?;
        result.push_str(&substitute);
        last = position + pattern.len();
    }
    result.push_str(&text[last..]);
    Ok(Value::from(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse;

    fn run(body: &str) -> Value {
        let program = parse(&format!("function main() {{ {} }}", body)).unwrap();
        let mut interpreter = Interpreter::new();
        interpreter.run(&program).unwrap();
        let main = interpreter.global_value("main").unwrap();
        interpreter.call(&main, Value::Undefined, vec![]).unwrap()
    }

    fn run_string(body: &str) -> String {
        run(body).to_js_string()
    }

    #[test]
    fn test_math() {
        assert_eq!(run_string("return [Math.round(2.5), Math.round(-2.5), Math.max(), Math.min(3, 1)].join(' ');"), "3 -2 -Infinity 1");
        assert_eq!(run_string("return Math.floor(Math.PI * 100);"), "314");
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(
            run_string("const a = [3, 1, 2]; a.push(4); return a.map(x => x * 2).filter(x => x > 2).join('-');"),
            "6-4-8"
        );
        assert_eq!(run_string("return [1, 2, 3, 4].reduce((s, x) => s + x, 0);"), "10");
        assert_eq!(run_string("const a = [1, 2, 3, 4, 5]; const r = a.splice(1, 2, 'x'); return a.join() + '|' + r.join();"), "1,x,4,5|2,3");
        assert_eq!(run_string("return [1, [2, [3, [4]]]].flat(2).length;"), "4");
        assert_eq!(run_string("return [1, 2, 3].slice(-2).concat([9], 8).join();"), "2,3,9,8");
        assert_eq!(run_string("return [NaN].includes(NaN) + ',' + [NaN].indexOf(NaN);"), "true,-1");
    }

    #[test]
    fn test_sort_default_and_comparator() {
        assert_eq!(run_string("return [10, 9, 1, undefined, 2].sort().join();"), "1,10,2,9,");
        assert_eq!(run_string("return [10, 9, 1, 2].sort((a, b) => a - b).join();"), "1,2,9,10");
        assert_eq!(
            run_string(
                "const people = [{n: 'b', a: 1}, {n: 'a', a: 1}, {n: 'c', a: 0}];\n\
                 return people.sort((x, y) => x.a - y.a).map(p => p.n).join('');"
            ),
            "cba"
        );
    }

    #[test]
    fn test_reduce_empty_throws() {
        let program = parse("function main() { return [].reduce((a, b) => a + b); }").unwrap();
        let mut interpreter = Interpreter::new();
        interpreter.run(&program).unwrap();
        let main = interpreter.global_value("main").unwrap();
        let err = interpreter.call(&main, Value::Undefined, vec![]).unwrap_err();
        assert!(matches!(err, ScriptError::Type(_)));
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(run_string("return 'a,b,,c'.split(',').length;"), "4");
        assert_eq!(run_string("return 'hello'.split('').reverse().join('');"), "olleh");
        assert_eq!(run_string("return '  x '.trim() + 'abc'.toUpperCase() + 'abc'.slice(-2);"), "xABCbc");
        assert_eq!(run_string("return '5'.padStart(3, '0') + 'ab'.repeat(2);"), "005abab");
        assert_eq!(run_string("return 'a-b-c'.replace('-', '+') + ' ' + 'a-b-c'.replaceAll('-', '');"), "a+b-c abc");
        assert_eq!(run_string("return 'abc'.charCodeAt(1) + 'abc'.indexOf('c');"), "100");
    }

    #[test]
    fn test_number_helpers() {
        assert_eq!(run_string("return (1.005).toFixed(2) + ' ' + (2.5).toFixed(0) + ' ' + (255).toString(16);"), "1.00 3 ff");
        assert_eq!(run_string("return parseInt('42px') + parseFloat('3.5e1x') + Number('') ;"), "77");
        assert_eq!(run_string("return Number.isInteger(5) + ',' + Number.isInteger('5');"), "true,false");
    }

    #[test]
    fn test_object_statics() {
        assert_eq!(run_string("return Object.keys({b: 1, a: 2}).join();"), "b,a");
        assert_eq!(run_string("return Object.entries({x: 1}).map(([k, v]) => k + v).join();"), "x1");
        assert_eq!(run_string("return JSON.stringify(Object.assign({a: 1}, {b: 2}));"), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn test_constructors_via_new() {
        assert_eq!(run_string("return new Array(3).fill(0).join();"), "0,0,0");
        assert_eq!(
            run_string("try { throw new RangeError('bad'); } catch (e) { return e.name + ':' + e.message; }"),
            "RangeError:bad"
        );
    }

    #[test]
    fn test_function_call_and_apply() {
        assert_eq!(
            run_string("function add(a, b) { return a + b; } return add.call(null, 1, 2) + add.apply(null, [3, 4]);"),
            "10"
        );
    }

    fn caught(body: &str) -> String {
        run_string(&format!(
            "try {{ {} return 'no error'; }} catch (e) {{ return e.name + ': ' + e.message; }}",
            body
        ))
    }

    #[test]
    fn test_oversized_strings_are_range_errors() {
        assert_eq!(caught("'a'.padStart(2 ** 40);"), "RangeError: Invalid string length");
        assert_eq!(caught("'a'.padEnd(2 ** 40, '\u{20ac}');"), "RangeError: Invalid string length");
        assert_eq!(caught("'abcd'.repeat(1e8);"), "RangeError: Invalid string length");
        assert_eq!(caught("'a'.padStart(5, 'xy');"), "no error");
    }

    #[test]
    fn test_oversized_arrays_are_range_errors() {
        assert_eq!(caught("new Array(2 ** 32 - 2);"), "RangeError: Invalid array length");
        assert_eq!(caught("const a = []; a[4e9] = 1;"), "RangeError: Invalid array length");
        assert_eq!(caught("const a = []; a[5e9] = 1;"), "RangeError: Invalid array length");
        assert_eq!(caught("const a = [1, 2]; a.length = 4e9;"), "RangeError: Invalid array length");
        assert_eq!(caught("Array.from({ length: 4e9 });"), "RangeError: Invalid array length");
        assert_eq!(run_string("const a = []; a[3] = 1; return a.length;"), "4");
    }

    #[test]
    fn test_flattening_a_cycle_is_range_error() {
        assert_eq!(
            caught("const a = [1]; a.push(a); a.flat(Infinity);"),
            "RangeError: Maximum call stack size exceeded"
        );
        assert_eq!(run_string("return [[1, [2]], [[[3]]]].flat(Infinity).join();"), "1,2,3");
    }
}
