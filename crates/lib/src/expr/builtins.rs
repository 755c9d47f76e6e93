//! The built-in globals visible to expressions.
//!
//! Built-ins are addressed by dotted path (`Math.max`) and carried around as
//! [`Value::Builtin`]; nothing here holds state between evaluations.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde_json::Value as JsonValue;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde::Serialize;
use tracing::{error, info, warn};

use super::error::EvalError;
use super::methods::MAX_LENGTH;
use super::value::{Object, Value, format_number};

/// Characters `encodeURIComponent` leaves untouched besides ASCII alphanumerics.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
  .remove(b'-')
  .remove(b'_')
  .remove(b'.')
  .remove(b'!')
  .remove(b'~')
  .remove(b'*')
  .remove(b'\'')
  .remove(b'(')
  .remove(b')');

pub const GLOBALS: &[&str] = &[
  "Math",
  "JSON",
  "Date",
  "String",
  "Number",
  "Boolean",
  "Object",
  "Array",
  "console",
  "parseInt",
  "parseFloat",
  "isNaN",
  "isFinite",
  "encodeURIComponent",
  "decodeURIComponent",
  "btoa",
  "atob",
  "NaN",
  "Infinity",
];

pub fn global(name: &str) -> Option<Value> {
  let value = match name {
    "NaN" => Value::Number(f64::NAN),
    "Infinity" => Value::Number(f64::INFINITY),
    "Math" => Value::Builtin("Math"),
    "JSON" => Value::Builtin("JSON"),
    "Date" => Value::Builtin("Date"),
    "String" => Value::Builtin("String"),
    "Number" => Value::Builtin("Number"),
    "Boolean" => Value::Builtin("Boolean"),
    "Object" => Value::Builtin("Object"),
    "Array" => Value::Builtin("Array"),
    "console" => Value::Builtin("console"),
    "parseInt" => Value::Builtin("parseInt"),
    "parseFloat" => Value::Builtin("parseFloat"),
    "isNaN" => Value::Builtin("isNaN"),
    "isFinite" => Value::Builtin("isFinite"),
    "encodeURIComponent" => Value::Builtin("encodeURIComponent"),
    "decodeURIComponent" => Value::Builtin("decodeURIComponent"),
    "btoa" => Value::Builtin("btoa"),
    "atob" => Value::Builtin("atob"),
    _ => return None,
  };
  Some(value)
}

pub fn is_callable(name: &str) -> bool {
  !matches!(name, "Math" | "JSON" | "console")
}

/// Property access on a built-in namespace.
pub fn member(name: &str, prop: &str) -> Value {
  let path: &'static str = match (name, prop) {
    ("Math", "PI") => return Value::Number(std::f64::consts::PI),
    ("Math", "E") => return Value::Number(std::f64::consts::E),
    ("Math", "LN2") => return Value::Number(std::f64::consts::LN_2),
    ("Math", "LN10") => return Value::Number(std::f64::consts::LN_10),
    ("Math", "LOG2E") => return Value::Number(std::f64::consts::LOG2_E),
    ("Math", "LOG10E") => return Value::Number(std::f64::consts::LOG10_E),
    ("Math", "SQRT2") => return Value::Number(std::f64::consts::SQRT_2),
    ("Math", "SQRT1_2") => return Value::Number(std::f64::consts::FRAC_1_SQRT_2),
    ("Math", "abs") => "Math.abs",
    ("Math", "ceil") => "Math.ceil",
    ("Math", "floor") => "Math.floor",
    ("Math", "round") => "Math.round",
    ("Math", "trunc") => "Math.trunc",
    ("Math", "sign") => "Math.sign",
    ("Math", "sqrt") => "Math.sqrt",
    ("Math", "cbrt") => "Math.cbrt",
    ("Math", "pow") => "Math.pow",
    ("Math", "min") => "Math.min",
    ("Math", "max") => "Math.max",
    ("Math", "random") => "Math.random",
    ("Math", "log") => "Math.log",
    ("Math", "log10") => "Math.log10",
    ("Math", "log2") => "Math.log2",
    ("Math", "exp") => "Math.exp",
    ("Math", "sin") => "Math.sin",
    ("Math", "cos") => "Math.cos",
    ("Math", "tan") => "Math.tan",
    ("Math", "atan") => "Math.atan",
    ("Math", "atan2") => "Math.atan2",
    ("Math", "hypot") => "Math.hypot",
    ("JSON", "parse") => "JSON.parse",
    ("JSON", "stringify") => "JSON.stringify",
    ("Date", "now") => "Date.now",
    ("Date", "parse") => "Date.parse",
    ("Date", "UTC") => "Date.UTC",
    ("Object", "keys") => "Object.keys",
    ("Object", "values") => "Object.values",
    ("Object", "entries") => "Object.entries",
    ("Object", "fromEntries") => "Object.fromEntries",
    ("Object", "assign") => "Object.assign",
    ("Array", "isArray") => "Array.isArray",
    ("Array", "from") => "Array.from",
    ("Array", "of") => "Array.of",
    ("String", "fromCharCode") => "String.fromCharCode",
    ("Number", "isInteger") => "Number.isInteger",
    ("Number", "isFinite") => "Number.isFinite",
    ("Number", "isNaN") => "Number.isNaN",
    ("Number", "parseFloat") => "parseFloat",
    ("Number", "parseInt") => "parseInt",
    ("Number", "MAX_SAFE_INTEGER") => return Value::Number(9_007_199_254_740_991.0),
    ("Number", "MIN_SAFE_INTEGER") => return Value::Number(-9_007_199_254_740_991.0),
    ("Number", "EPSILON") => return Value::Number(f64::EPSILON),
    ("console", "log") => "console.log",
    ("console", "info") => "console.info",
    ("console", "warn") => "console.warn",
    ("console", "error") => "console.error",
    ("console", "debug") => "console.log",
    _ => return Value::Undefined,
  };
  Value::Builtin(path)
}

fn arg(args: &[Value], idx: usize) -> Value {
  args.get(idx).cloned().unwrap_or(Value::Undefined)
}

fn num(args: &[Value], idx: usize) -> f64 {
  arg(args, idx).to_number()
}

fn math1(args: &[Value], f: fn(f64) -> f64) -> Value {
  Value::Number(f(num(args, 0)))
}

/// Calls a built-in function.
pub fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
  let value = match name {
    "Math.abs" => math1(args, f64::abs),
    "Math.ceil" => math1(args, f64::ceil),
    "Math.floor" => math1(args, f64::floor),
    "Math.round" => math1(args, |x| (x + 0.5).floor()),
    "Math.trunc" => math1(args, f64::trunc),
    "Math.sign" => math1(args, |x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
    "Math.sqrt" => math1(args, f64::sqrt),
    "Math.cbrt" => math1(args, f64::cbrt),
    "Math.log" => math1(args, f64::ln),
    "Math.log10" => math1(args, f64::log10),
    "Math.log2" => math1(args, f64::log2),
    "Math.exp" => math1(args, f64::exp),
    "Math.sin" => math1(args, f64::sin),
    "Math.cos" => math1(args, f64::cos),
    "Math.tan" => math1(args, f64::tan),
    "Math.atan" => math1(args, f64::atan),
    "Math.atan2" => Value::Number(num(args, 0).atan2(num(args, 1))),
    "Math.pow" => Value::Number(num(args, 0).powf(num(args, 1))),
    "Math.hypot" => Value::Number(args.iter().map(|a| a.to_number().powi(2)).sum::<f64>().sqrt()),
    "Math.min" => Value::Number(fold_numbers(args, f64::INFINITY, f64::min)),
    "Math.max" => Value::Number(fold_numbers(args, f64::NEG_INFINITY, f64::max)),
    "Math.random" => Value::Number(rand::random::<f64>()),

    "JSON.parse" => {
      let text = arg(args, 0).to_display();
      let json: JsonValue = serde_json::from_str(&text).map_err(|e| EvalError::builtin("JSON.parse", e.to_string()))?;
      Value::from_json(&json)
    }
    "JSON.stringify" => return stringify(args),

    "Date" => Value::string(Utc::now().to_rfc2822()),
    "Date.now" => Value::Number(Utc::now().timestamp_millis() as f64),
    "Date.parse" => match parse_date(&arg(args, 0).to_display()) {
      Some(date) => Value::Number(date.timestamp_millis() as f64),
      None => Value::Number(f64::NAN),
    },
    "Date.UTC" => match date_from_parts(args) {
      Some(date) => Value::Number(date.timestamp_millis() as f64),
      None => Value::Number(f64::NAN),
    },

    "Object.keys" => Value::array(entries(&arg(args, 0)).into_iter().map(|(k, _)| Value::string(k)).collect()),
    "Object.values" => Value::array(entries(&arg(args, 0)).into_iter().map(|(_, v)| v).collect()),
    "Object.entries" => Value::array(
      entries(&arg(args, 0))
        .into_iter()
        .map(|(k, v)| Value::array(vec![Value::string(k), v]))
        .collect(),
    ),
    "Object.fromEntries" => {
      let mut out = Object::new();
      if let Value::Array(pairs) = arg(args, 0) {
        for pair in pairs.iter() {
          if let Value::Array(kv) = pair {
            let key = kv.first().map(Value::to_display).unwrap_or_default();
            out.insert(key, kv.get(1).cloned().unwrap_or(Value::Undefined));
          }
        }
      }
      Value::object(out)
    }
    // Returns a fresh merged object; the first argument is never mutated.
    "Object.assign" => {
      let mut out = Object::new();
      for source in args {
        out.extend(entries(source));
      }
      Value::object(out)
    }

    "Array.isArray" => Value::Bool(matches!(arg(args, 0), Value::Array(_))),
    "Array.of" => Value::array(args.to_vec()),
    "Array.from" => match arg(args, 0) {
      Value::Array(items) => Value::Array(items),
      Value::String(s) => Value::array(s.chars().map(|c| Value::string(c.to_string())).collect()),
      Value::Object(map) => {
        let len = map.get("length").map(Value::to_number).unwrap_or(0.0);
        if len > MAX_LENGTH as f64 {
          return Err(EvalError::builtin("Array.from", "invalid array length"));
        }
        let len = if len.is_finite() && len > 0.0 { len as usize } else { 0 };
        Value::array(
          (0..len)
            .map(|i| map.get(&i.to_string()).cloned().unwrap_or(Value::Undefined))
            .collect(),
        )
      }
      _ => Value::array(Vec::new()),
    },

    "String" => Value::string(if args.is_empty() { String::new() } else { arg(args, 0).to_display() }),
    "String.fromCharCode" => Value::string(
      args
        .iter()
        .filter_map(|a| char::from_u32(a.to_number() as u32))
        .collect::<String>(),
    ),
    "Number" => Value::Number(if args.is_empty() { 0.0 } else { num(args, 0) }),
    "Number.isInteger" => Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)),
    "Number.isFinite" => Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite())),
    "Number.isNaN" => Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_nan())),
    "Boolean" => Value::Bool(arg(args, 0).truthy()),

    "parseInt" => Value::Number(parse_int(&arg(args, 0).to_display(), args.get(1).map(Value::to_number))),
    "parseFloat" => Value::Number(parse_float(&arg(args, 0).to_display())),
    "isNaN" => Value::Bool(num(args, 0).is_nan()),
    "isFinite" => Value::Bool(num(args, 0).is_finite()),

    "encodeURIComponent" => Value::string(utf8_percent_encode(&arg(args, 0).to_display(), URI_COMPONENT).to_string()),
    "decodeURIComponent" => {
      let text = arg(args, 0).to_display();
      let decoded = percent_decode_str(&text)
        .decode_utf8()
        .map_err(|_| EvalError::builtin("decodeURIComponent", "URI malformed"))?;
      Value::string(decoded)
    }
    "btoa" => {
      let text = arg(args, 0).to_display();
      let mut bytes = Vec::with_capacity(text.len());
      for c in text.chars() {
        let code = u32::from(c);
        if code > 0xFF {
          return Err(EvalError::builtin("btoa", "string contains characters outside of the Latin1 range"));
        }
        bytes.push(code as u8);
      }
      Value::string(BASE64.encode(bytes))
    }
    "atob" => {
      let text: String = arg(args, 0).to_display().chars().filter(|c| !c.is_whitespace()).collect();
      let bytes = BASE64
        .decode(text.as_bytes())
        .map_err(|e| EvalError::builtin("atob", e.to_string()))?;
      Value::string(bytes.into_iter().map(char::from).collect::<String>())
    }

    "console.log" | "console.info" | "console.warn" | "console.error" => {
      let message = args.iter().map(console_text).collect::<Vec<_>>().join(" ");
      match name {
        "console.warn" => warn!(target: "bindscope::console", "{}", message),
        "console.error" => error!(target: "bindscope::console", "{}", message),
        _ => info!(target: "bindscope::console", "{}", message),
      }
      Value::Undefined
    }

    other => return Err(EvalError::Type(format!("{} is not a function", other))),
  };
  Ok(value)
}

/// `new <name>(...)`.
pub fn construct(name: &str, args: &[Value]) -> Result<Value, EvalError> {
  match name {
    "Date" => {
      let date = match args {
        [] => Some(Utc::now()),
        [Value::Date(d)] => Some(*d),
        [Value::String(s)] => parse_date(s),
        [single] => from_millis(single.to_number()),
        _ => date_from_parts(args),
      };
      date
        .map(Value::Date)
        .ok_or_else(|| EvalError::builtin("Date", "invalid date"))
    }
    "Object" => Ok(Value::object(Object::new())),
    "Array" => Ok(Value::array(args.to_vec())),
    other => Err(EvalError::Type(format!("{} is not a constructor", other))),
  }
}

fn fold_numbers(args: &[Value], init: f64, f: fn(f64, f64) -> f64) -> f64 {
  let mut acc = init;
  for a in args {
    let n = a.to_number();
    if n.is_nan() {
      return f64::NAN;
    }
    acc = f(acc, n);
  }
  acc
}

fn console_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.to_string(),
    Value::Array(_) | Value::Object(_) => value.to_json().to_string(),
    other => other.to_display(),
  }
}

/// Own enumerable entries, as `Object.entries` sees them.
pub fn entries(value: &Value) -> Vec<(String, Value)> {
  match value {
    Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    Value::Array(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v.clone())).collect(),
    Value::String(s) => s
      .chars()
      .enumerate()
      .map(|(i, c)| (i.to_string(), Value::string(c.to_string())))
      .collect(),
    _ => Vec::new(),
  }
}

fn stringify(args: &[Value]) -> Result<Value, EvalError> {
  let value = arg(args, 0);
  if matches!(value, Value::Undefined | Value::Lambda(_) | Value::Inert) {
    return Ok(Value::Undefined);
  }
  let json = value.to_json();
  let indent = match arg(args, 2) {
    Value::Number(n) if n >= 1.0 => " ".repeat((n as usize).min(10)),
    Value::String(s) => s.chars().take(10).collect(),
    _ => String::new(),
  };
  if indent.is_empty() {
    return Ok(Value::string(json.to_string()));
  }
  let mut buf = Vec::new();
  let formatter = PrettyFormatter::with_indent(indent.as_bytes());
  let mut serializer = Serializer::with_formatter(&mut buf, formatter);
  json
    .serialize(&mut serializer)
    .map_err(|e| EvalError::builtin("JSON.stringify", e.to_string()))?;
  Ok(Value::string(String::from_utf8_lossy(&buf)))
}

fn from_millis(ms: f64) -> Option<DateTime<Utc>> {
  if !ms.is_finite() {
    return None;
  }
  Utc.timestamp_millis_opt(ms as i64).single()
}

/// Parses RFC 3339 timestamps and the common date-only and naive forms (read as UTC).
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
  let text = text.trim();
  if let Ok(date) = DateTime::parse_from_rfc3339(text) {
    return Some(date.with_timezone(&Utc));
  }
  if let Ok(date) = DateTime::parse_from_rfc2822(text) {
    return Some(date.with_timezone(&Utc));
  }
  for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
      return Some(naive.and_utc());
    }
  }
  NaiveDate::parse_from_str(text, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

/// `(year, monthIndex, day, hours, minutes, seconds, ms)` in UTC.
fn date_from_parts(args: &[Value]) -> Option<DateTime<Utc>> {
  let part = |idx: usize, default: f64| args.get(idx).map(Value::to_number).unwrap_or(default);
  let year = part(0, f64::NAN);
  let month = part(1, 0.0);
  if !year.is_finite() || !month.is_finite() {
    return None;
  }
  // month overflow rolls into the year, as in JS
  let total_months = year as i64 * 12 + month as i64;
  let first = NaiveDate::from_ymd_opt(total_months.div_euclid(12) as i32, total_months.rem_euclid(12) as u32 + 1, 1)?
    .and_hms_opt(0, 0, 0)?
    .and_utc();
  let offset_ms = (part(2, 1.0) - 1.0) * 86_400_000.0
    + part(3, 0.0) * 3_600_000.0
    + part(4, 0.0) * 60_000.0
    + part(5, 0.0) * 1_000.0
    + part(6, 0.0);
  if !offset_ms.is_finite() {
    return None;
  }
  from_millis(first.timestamp_millis() as f64 + offset_ms)
}

fn parse_int(text: &str, radix: Option<f64>) -> f64 {
  let mut s = text.trim();
  let mut sign = 1.0;
  if let Some(rest) = s.strip_prefix('-') {
    sign = -1.0;
    s = rest;
  } else if let Some(rest) = s.strip_prefix('+') {
    s = rest;
  }
  let explicit = radix.filter(|r| r.is_finite() && *r != 0.0);
  let mut radix = explicit.map(|r| r as u32).unwrap_or(10);
  if (radix == 16 || explicit.is_none()) && (s.starts_with("0x") || s.starts_with("0X")) {
    s = &s[2..];
    radix = 16;
  }
  if !(2..=36).contains(&radix) {
    return f64::NAN;
  }
  let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
  if digits.is_empty() {
    return f64::NAN;
  }
  let mut value = 0.0;
  for c in digits.chars() {
    value = value * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or(0));
  }
  sign * value
}

fn parse_float(text: &str) -> f64 {
  let s = text.trim_start();
  for (prefix, value) in [("Infinity", f64::INFINITY), ("+Infinity", f64::INFINITY), ("-Infinity", f64::NEG_INFINITY)] {
    if s.starts_with(prefix) {
      return value;
    }
  }
  let bytes = s.as_bytes();
  let mut end = 0;
  let mut seen_digit = false;
  let mut seen_dot = false;
  let mut seen_exp = false;
  while end < bytes.len() {
    let b = bytes[end];
    match b {
      b'0'..=b'9' => seen_digit = true,
      b'+' | b'-' if end == 0 || matches!(bytes[end - 1], b'e' | b'E') => {}
      b'.' if !seen_dot && !seen_exp => seen_dot = true,
      b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
      _ => break,
    }
    end += 1;
  }
  // back off a dangling exponent or sign
  let mut candidate = &s[..end];
  while !candidate.is_empty() {
    if let Ok(v) = candidate.parse::<f64>() {
      return v;
    }
    candidate = &candidate[..candidate.len() - 1];
  }
  f64::NAN
}

/// Reading helper for `Date` getters; months are zero-based like JS.
pub fn date_number(name: &str) -> Option<fn(&DateTime<Utc>) -> f64> {
  use chrono::{Datelike, Timelike};
  let getter: fn(&DateTime<Utc>) -> f64 = match name {
    "getTime" | "valueOf" => |d| d.timestamp_millis() as f64,
    "getFullYear" | "getUTCFullYear" => |d| f64::from(d.year()),
    "getMonth" | "getUTCMonth" => |d| f64::from(d.month0()),
    "getDate" | "getUTCDate" => |d| f64::from(d.day()),
    "getDay" | "getUTCDay" => |d| f64::from(d.weekday().num_days_from_sunday()),
    "getHours" | "getUTCHours" => |d| f64::from(d.hour()),
    "getMinutes" | "getUTCMinutes" => |d| f64::from(d.minute()),
    "getSeconds" | "getUTCSeconds" => |d| f64::from(d.second()),
    "getMilliseconds" | "getUTCMilliseconds" => |d| f64::from(d.timestamp_subsec_millis()),
    "getTimezoneOffset" => |_| 0.0,
    _ => return None,
  };
  Some(getter)
}

/// Display form used by `toString` on numbers with a radix.
pub fn number_to_radix(n: f64, radix: u32) -> String {
  if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
    return format_number(n);
  }
  let negative = n < 0.0;
  let mut value = n.abs() as u64;
  if value == 0 {
    return "0".to_string();
  }
  let mut digits = Vec::new();
  while value > 0 {
    let digit = (value % u64::from(radix)) as u32;
    digits.push(char::from_digit(digit, radix).unwrap_or('?'));
    value /= u64::from(radix);
  }
  if negative {
    digits.push('-');
  }
  digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn call_str(name: &str, args: &[Value]) -> String {
    call(name, args).unwrap().to_display()
  }

  #[test]
  fn math_functions() {
    assert_eq!(call_str("Math.max", &[Value::Number(1.0), Value::Number(5.0)]), "5");
    assert_eq!(call_str("Math.min", &[]), "Infinity");
    assert_eq!(call_str("Math.round", &[Value::Number(-2.5)]), "-2");
    assert_eq!(call_str("Math.round", &[Value::Number(2.5)]), "3");
  }

  #[test]
  fn uri_component_round_trip() {
    let encoded = call_str("encodeURIComponent", &[Value::string("a b&c/d")]);
    assert_eq!(encoded, "a%20b%26c%2Fd");
    assert_eq!(call_str("decodeURIComponent", &[Value::string(&encoded)]), "a b&c/d");
    assert!(call("decodeURIComponent", &[Value::string("%E0%A4%A")]).is_err());
  }

  #[test]
  fn base64_helpers() {
    assert_eq!(call_str("btoa", &[Value::string("hello")]), "aGVsbG8=");
    assert_eq!(call_str("atob", &[Value::string("aGVsbG8=")]), "hello");
    assert!(call("btoa", &[Value::string("☃")]).is_err());
  }

  #[test]
  fn parse_numbers() {
    assert_eq!(parse_int("42px", None), 42.0);
    assert_eq!(parse_int("  -0x1F", None), -31.0);
    assert_eq!(parse_int("ff", Some(16.0)), 255.0);
    assert!(parse_int("px", None).is_nan());
    assert_eq!(parse_float("3.14abc"), 3.14);
    assert_eq!(parse_float("1e3x"), 1000.0);
    assert_eq!(parse_float("2e"), 2.0);
    assert!(parse_float("abc").is_nan());
  }

  #[test]
  fn json_stringify_with_indent() {
    let value = Value::from_json(&serde_json::json!({"a": [1, 2]}));
    assert_eq!(call_str("JSON.stringify", &[value.clone()]), r#"{"a":[1,2]}"#);
    assert_eq!(
      call_str("JSON.stringify", &[value, Value::Null, Value::Number(2.0)]),
      "{\n  \"a\": [\n    1,\n    2\n  ]\n}"
    );
  }

  #[test]
  fn date_construction() {
    let date = construct("Date", &[Value::string("2024-03-05T10:20:30Z")]).unwrap();
    match date {
      Value::Date(d) => assert_eq!(d.timestamp_millis(), 1_709_634_030_000),
      other => panic!("expected date, got {:?}", other),
    }
    let parts = construct("Date", &[Value::Number(2024.0), Value::Number(0.0), Value::Number(31.0)]).unwrap();
    assert_eq!(parts.to_display(), "2024-01-31T00:00:00.000Z");
    assert!(construct("Date", &[Value::string("not a date")]).is_err());
    assert!(construct("Math", &[]).is_err());
  }

  #[test]
  fn object_helpers() {
    let value = Value::from_json(&serde_json::json!({"a": 1, "b": 2}));
    assert_eq!(call("Object.keys", &[value.clone()]).unwrap().to_json(), serde_json::json!(["a", "b"]));
    assert_eq!(
      call("Object.entries", &[value]).unwrap().to_json(),
      serde_json::json!([["a", 1], ["b", 2]])
    );
  }

  #[test]
  fn radix_formatting() {
    assert_eq!(number_to_radix(255.0, 16), "ff");
    assert_eq!(number_to_radix(-5.0, 2), "-101");
  }
}
