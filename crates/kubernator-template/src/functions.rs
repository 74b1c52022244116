//! Template functions (global functions available in templates)

use minijinja::value::{Object, Rest};
use minijinja::{Error, ErrorKind, State, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Maximum recursion depth for tpl function (prevents infinite loops)
const MAX_TPL_DEPTH: usize = 10;

/// Key for storing tpl recursion depth in State's temp storage
const TPL_DEPTH_KEY: &str = "__kubernator_tpl_depth";

/// Counter object for tracking tpl recursion depth
/// Implements Object trait so it can be stored in State's temp storage
#[derive(Debug, Default)]
struct TplDepthCounter(AtomicUsize);

impl Object for TplDepthCounter {
    fn repr(self: &Arc<Self>) -> minijinja::value::ObjectRepr {
        minijinja::value::ObjectRepr::Plain
    }
}

impl TplDepthCounter {
    fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fail with a custom error message
///
/// Usage: {{ fail("Something went wrong") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}

/// Look up a live cluster object by `(api_version, kind, namespace, name)`.
///
/// Usage: {${ lookup("v1", "Secret", "default", "my-secret") }$}
///
/// The template engine has no cluster connection of its own — live lookups are
/// a reconciliation-time concern, not a render-time one — so this always
/// returns an empty, iterable object rather than ever contacting a cluster.
/// Templates that branch on `lookup(...)` (the common "use existing secret if
/// present, else generate one" pattern) consistently see "absent" and take the
/// generate-a-new-one path, which is the safe default for a plan that has not
/// yet talked to any cluster.
pub fn lookup(
    _api_version: String,
    _kind: String,
    _namespace: String,
    _name: String,
) -> Value {
    Value::from_serialize(serde_json::Value::Object(serde_json::Map::new()))
}

/// Create a dict from key-value pairs
///
/// Usage: {{ dict("key1", value1, "key2", value2) }}
pub fn dict(args: Vec<Value>) -> Result<Value, Error> {
    if !args.len().is_multiple_of(2) {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "dict requires an even number of arguments (key-value pairs)",
        ));
    }

    let mut map = serde_json::Map::new();

    for chunk in args.chunks(2) {
        let key = chunk[0]
            .as_str()
            .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "dict keys must be strings"))?;
        let value: serde_json::Value = serde_json::to_value(&chunk[1])
            .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
        map.insert(key.to_string(), value);
    }

    Ok(Value::from_serialize(serde_json::Value::Object(map)))
}

/// Create a list from values
///
/// Usage: {{ list("a", "b", "c") }}
pub fn list(args: Vec<Value>) -> Value {
    Value::from(args)
}

/// Get a value with a default if undefined
///
/// Usage: {{ get(values, "key", "default") }}
pub fn get(obj: Value, key: String, default: Option<Value>) -> Value {
    match obj.get_attr(&key) {
        Ok(v) if !v.is_undefined() => v,
        _ => default.unwrap_or(Value::UNDEFINED),
    }
}

/// Set a key in a dict (returns new dict, original unchanged)
///
/// Usage: {{ set(mydict, "newkey", "newvalue") }}
pub fn set(dict: Value, key: String, val: Value) -> Result<Value, Error> {
    use minijinja::value::ValueKind;

    match dict.kind() {
        ValueKind::Map => {
            let mut result = indexmap::IndexMap::new();

            // Copy existing entries
            if let Ok(iter) = dict.try_iter() {
                for k in iter {
                    if let Some(k_str) = k.as_str()
                        && let Ok(v) = dict.get_item(&k)
                    {
                        result.insert(k_str.to_string(), v);
                    }
                }
            }

            // Set the new value
            result.insert(key, val);
            Ok(Value::from_iter(result))
        }
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("set requires a dict, got {:?}", dict.kind()),
        )),
    }
}

/// Remove a key from a dict (returns new dict, original unchanged)
///
/// Usage: {{ unset(mydict, "keytoremove") }}
pub fn unset(dict: Value, key: String) -> Result<Value, Error> {
    use minijinja::value::ValueKind;

    match dict.kind() {
        ValueKind::Map => {
            let mut result = indexmap::IndexMap::new();

            if let Ok(iter) = dict.try_iter() {
                for k in iter {
                    if let Some(k_str) = k.as_str()
                        && k_str != key
                        && let Ok(v) = dict.get_item(&k)
                    {
                        result.insert(k_str.to_string(), v);
                    }
                }
            }

            Ok(Value::from_iter(result))
        }
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("unset requires a dict, got {:?}", dict.kind()),
        )),
    }
}

/// Deep get with path and default value
///
/// Usage: {{ dig(mydict, "a", "b", "c", "default") }}
/// Equivalent to mydict.a.b.c with fallback to default if any key is missing
pub fn dig(dict: Value, keys_and_default: Rest<Value>) -> Result<Value, Error> {
    let args: &[Value] = &keys_and_default;

    if args.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "dig requires at least one key and a default value",
        ));
    }

    // Last argument is the default value, rest are keys
    let (keys, default_slice) = args.split_at(args.len() - 1);
    let default = default_slice.first().cloned().unwrap_or(Value::UNDEFINED);

    if keys.is_empty() {
        // Only default was provided, return the dict itself
        return Ok(dict);
    }

    // Traverse the path
    let mut current = dict;
    for key in keys {
        match key.as_str() {
            Some(k) => match current.get_attr(k) {
                Ok(v) if !v.is_undefined() => current = v,
                _ => return Ok(default),
            },
            None => {
                // Handle integer keys for lists
                if let Some(idx) = key.as_i64() {
                    match current.get_item(&Value::from(idx)) {
                        Ok(v) if !v.is_undefined() => current = v,
                        _ => return Ok(default),
                    }
                } else {
                    return Ok(default);
                }
            }
        }
    }

    Ok(current)
}

/// Return first non-empty value
///
/// Usage: {{ coalesce(a, b, c) }}
pub fn coalesce(args: Vec<Value>) -> Value {
    for arg in args {
        if !arg.is_undefined() && !arg.is_none() {
            if let Some(s) = arg.as_str() {
                if !s.is_empty() {
                    return arg;
                }
            } else {
                return arg;
            }
        }
    }
    Value::UNDEFINED
}

/// Ternary operator
///
/// Usage: {{ ternary(true_value, false_value, condition) }}
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() {
        true_val
    } else {
        false_val
    }
}

/// Generate a UUID (v4)
///
/// Usage: {{ uuidv4() }}
pub fn uuidv4() -> String {
    // Simple UUID v4 generation without external dependency
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let random_part = timestamp ^ (timestamp >> 32);

    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        (random_part & 0xFFFFFFFF) as u32,
        ((random_part >> 32) & 0xFFFF) as u16,
        ((random_part >> 48) & 0x0FFF) as u16,
        (((random_part >> 60) & 0x3F) | 0x80) as u16 | ((random_part & 0xFF) << 8) as u16,
        (random_part ^ (random_part >> 16)) & 0xFFFFFFFFFFFF
    )
}

/// Convert a value to a string representation
///
/// Usage: {{ tostring(value) }}
pub fn tostring(value: Value) -> String {
    if let Some(s) = value.as_str() {
        s.to_string()
    } else {
        value.to_string()
    }
}

/// Convert a value to an integer
///
/// Usage: {{ toint(value) }}
pub fn toint(value: Value) -> Result<i64, Error> {
    if let Some(n) = value.as_i64() {
        Ok(n)
    } else if let Some(s) = value.as_str() {
        s.parse::<i64>().map_err(|_| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot convert '{}' to int", s),
            )
        })
    } else {
        Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot convert {:?} to int", value),
        ))
    }
}

/// Convert a value to a float
///
/// Usage: {{ tofloat(value) }}
pub fn tofloat(value: Value) -> Result<f64, Error> {
    if let Some(n) = value.as_i64() {
        Ok(n as f64)
    } else if let Some(s) = value.as_str() {
        s.parse::<f64>().map_err(|_| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot convert '{}' to float", s),
            )
        })
    } else {
        Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot convert {:?} to float", value),
        ))
    }
}

/// Get current timestamp
///
/// Usage: {{ now() }}
pub fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Printf-style formatting
///
/// Usage: {{ printf("%s-%d", name, count) }}
///
/// Supports format specifiers: %s, %d, %f, %v, %%
pub fn printf(format: String, args: Vec<Value>) -> Result<String, Error> {
    // Pre-allocate with estimated size
    let mut result = String::with_capacity(format.len() + args.len() * 10);
    let mut chars = format.chars().peekable();
    let mut arg_idx = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }

        // Handle format specifier
        let format_char = match chars.next() {
            Some(fc) => fc,
            None => {
                // Trailing % at end of string
                result.push('%');
                break;
            }
        };

        // Handle escaped %%
        if format_char == '%' {
            result.push('%');
            continue;
        }

        // Need an argument for this specifier
        if arg_idx >= args.len() {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                "not enough arguments for format string",
            ));
        }

        let arg = &args[arg_idx];
        match format_char {
            's' | 'v' => result.push_str(&arg.to_string()),
            'd' => {
                if let Some(n) = arg.as_i64() {
                    result.push_str(&n.to_string());
                } else {
                    result.push_str(&arg.to_string());
                }
            }
            'f' => {
                if let Some(n) = arg.as_i64() {
                    result.push_str(&(n as f64).to_string());
                } else {
                    result.push_str(&arg.to_string());
                }
            }
            _ => {
                // Unknown format specifier, treat as %v
                result.push_str(&arg.to_string());
            }
        }
        arg_idx += 1;
    }

    Ok(result)
}

/// Evaluate a string as a template against an explicit context
///
/// Usage: {{ tpl(ctx.host_template, ctx) }}
///
/// Allows a string value to itself contain delimiters, rendered against whatever
/// context the caller passes in. Recursion is capped to guard against a value that
/// references itself.
pub fn tpl(state: &State, template: String, context: Value) -> Result<String, Error> {
    // Skip if no template markers present (optimization)
    if !template.contains(crate::engine::DELIM_OPEN) {
        return Ok(template);
    }

    // Check recursion depth to prevent infinite loops
    let depth = increment_tpl_depth(state)?;

    // Render the template string using the current environment
    let result = state.env().render_str(&template, context).map_err(|e| {
        // Enhance error message with tpl context
        Error::new(
            ErrorKind::InvalidOperation,
            format!(
                "tpl error (depth {}): {}\n  Template: \"{}\"",
                depth,
                e,
                truncate_for_error(&template, 60)
            ),
        )
    });

    // Decrement depth after rendering (for sibling tpl calls)
    decrement_tpl_depth(state);

    result
}

/// Increment tpl recursion depth, returning error if limit exceeded
fn increment_tpl_depth(state: &State) -> Result<usize, Error> {
    let counter = state.get_or_set_temp_object(TPL_DEPTH_KEY, TplDepthCounter::default);
    let depth = counter.increment();

    if depth > MAX_TPL_DEPTH {
        Err(Error::new(
            ErrorKind::InvalidOperation,
            format!(
                "tpl recursion depth {} exceeded maximum {} - possible infinite loop in values. \
                 Check for circular references in template strings.",
                depth, MAX_TPL_DEPTH
            ),
        ))
    } else {
        Ok(depth)
    }
}

/// Decrement tpl recursion depth
fn decrement_tpl_depth(state: &State) {
    let counter = state.get_or_set_temp_object(TPL_DEPTH_KEY, TplDepthCounter::default);
    counter.decrement();
}

/// Truncate string for error messages
fn truncate_for_error(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len])
    }
}

/// Evaluate a string as a template against the full ambient context tree
///
/// Usage: {{ tpl_ctx(ctx.dynamic_host) }}
///
/// Shares the recursion counter with `tpl`.
pub fn tpl_ctx(state: &State, template: String) -> Result<String, Error> {
    // Skip if no template markers present (optimization)
    if !template.contains(crate::engine::DELIM_OPEN) {
        return Ok(template);
    }

    // Check recursion depth to prevent infinite loops
    let depth = increment_tpl_depth(state)?;

    // Build context from every name bound at the top level of the context tree.
    let mut ctx = serde_json::Map::new();
    for var in crate::TOP_LEVEL_CONTEXT_NAMES {
        if let Some(v) = state.lookup(var)
            && !v.is_undefined()
            && let Ok(json_val) = serde_json::to_value(&v)
        {
            ctx.insert((*var).to_string(), json_val);
        }
    }

    let context = Value::from_serialize(serde_json::Value::Object(ctx));

    let result = state.env().render_str(&template, context).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!(
                "tpl_ctx error (depth {}): {}\n  Template: \"{}\"",
                depth,
                e,
                truncate_for_error(&template, 60)
            ),
        )
    });

    // Decrement depth after rendering
    decrement_tpl_depth(state);

    result
}
