//! Runtime values of the expression interpreter.

use std::fmt::Write as _;
use std::rc::Rc;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use super::ast::Arrow;
use super::interp::Env;

pub type Object = IndexMap<String, Value>;

/// A closure created by an arrow function.
#[derive(Debug)]
pub struct Lambda {
  pub arrow: Rc<Arrow>,
  pub env: Env,
}

#[derive(Debug, Clone)]
pub enum Value {
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  String(Rc<str>),
  Array(Rc<Vec<Value>>),
  Object(Rc<Object>),
  Date(DateTime<Utc>),
  Lambda(Rc<Lambda>),
  /// A built-in namespace or function, named by its dotted path (`Math.max`).
  Builtin(&'static str),
  /// The scope itself, reached through `globalThis` and friends.
  Scope,
  /// Placeholder for denylisted names: absorbs member access and calls.
  Inert,
}

impl Value {
  pub fn string(s: impl AsRef<str>) -> Value {
    Value::String(Rc::from(s.as_ref()))
  }

  pub fn array(items: Vec<Value>) -> Value {
    Value::Array(Rc::new(items))
  }

  pub fn object(map: Object) -> Value {
    Value::Object(Rc::new(map))
  }

  pub fn is_nullish(&self) -> bool {
    matches!(self, Value::Undefined | Value::Null)
  }

  pub fn is_callable(&self) -> bool {
    match self {
      Value::Lambda(_) => true,
      Value::Builtin(name) => super::builtins::is_callable(name),
      _ => false,
    }
  }

  pub fn truthy(&self) -> bool {
    match self {
      Value::Undefined | Value::Null | Value::Inert => false,
      Value::Bool(b) => *b,
      Value::Number(n) => *n != 0.0 && !n.is_nan(),
      Value::String(s) => !s.is_empty(),
      _ => true,
    }
  }

  pub fn type_of(&self) -> &'static str {
    match self {
      Value::Undefined | Value::Inert => "undefined",
      Value::Bool(_) => "boolean",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::Null | Value::Array(_) | Value::Object(_) | Value::Date(_) | Value::Scope => "object",
      Value::Lambda(_) => "function",
      Value::Builtin(_) if self.is_callable() => "function",
      Value::Builtin(_) => "object",
    }
  }

  /// `Number(value)` semantics.
  pub fn to_number(&self) -> f64 {
    match self {
      Value::Undefined | Value::Inert => f64::NAN,
      Value::Null => 0.0,
      Value::Bool(b) => f64::from(u8::from(*b)),
      Value::Number(n) => *n,
      Value::String(s) => parse_numeric_string(s),
      Value::Array(items) => match items.len() {
        0 => 0.0,
        1 => items[0].to_number(),
        _ => f64::NAN,
      },
      Value::Date(d) => d.timestamp_millis() as f64,
      _ => f64::NAN,
    }
  }

  /// `String(value)` semantics.
  pub fn to_display(&self) -> String {
    match self {
      Value::Undefined => "undefined".to_string(),
      Value::Null => "null".to_string(),
      Value::Inert => String::new(),
      Value::Bool(b) => b.to_string(),
      Value::Number(n) => format_number(*n),
      Value::String(s) => s.to_string(),
      Value::Array(items) => {
        let mut out = String::new();
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            out.push(',');
          }
          if !item.is_nullish() {
            out.push_str(&item.to_display());
          }
        }
        out
      }
      Value::Object(_) | Value::Scope => "[object Object]".to_string(),
      Value::Date(d) => d.to_rfc3339_opts(SecondsFormat::Millis, true),
      Value::Lambda(_) => "function () { [native code] }".to_string(),
      Value::Builtin(name) => format!("function {}() {{ [native code] }}", name),
    }
  }

  /// Reduces composite values to a string or number, as JS `ToPrimitive` does.
  pub fn to_primitive(&self) -> Value {
    match self {
      Value::Array(_) | Value::Object(_) | Value::Lambda(_) | Value::Builtin(_) | Value::Scope => {
        Value::string(self.to_display())
      }
      Value::Date(_) => Value::string(self.to_display()),
      other => other.clone(),
    }
  }

  pub fn from_json(json: &JsonValue) -> Value {
    match json {
      JsonValue::Null => Value::Null,
      JsonValue::Bool(b) => Value::Bool(*b),
      JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
      JsonValue::String(s) => Value::string(s),
      JsonValue::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
      JsonValue::Object(map) => Value::object(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect()),
    }
  }

  /// Converts to JSON the way `JSON.stringify` would, with `undefined` as `null`.
  pub fn to_json(&self) -> JsonValue {
    match self {
      Value::Undefined | Value::Null | Value::Inert | Value::Lambda(_) | Value::Builtin(_) | Value::Scope => {
        JsonValue::Null
      }
      Value::Bool(b) => JsonValue::Bool(*b),
      Value::Number(n) => number_to_json(*n),
      Value::String(s) => JsonValue::String(s.to_string()),
      Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
      Value::Object(map) => {
        let mut out = JsonMap::new();
        for (k, v) in map.iter() {
          if matches!(v, Value::Undefined | Value::Inert | Value::Lambda(_) | Value::Builtin(_)) {
            continue;
          }
          out.insert(k.clone(), v.to_json());
        }
        JsonValue::Object(out)
      }
      Value::Date(d) => JsonValue::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
  }

  /// `===`, except that arrays and objects compare structurally.
  pub fn strict_equals(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) | (Value::Inert, Value::Inert) => true,
      (Value::Scope, Value::Scope) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::Date(a), Value::Date(b)) => a == b,
      (Value::Builtin(a), Value::Builtin(b)) => a == b,
      (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
      (Value::Array(a), Value::Array(b)) => {
        Rc::ptr_eq(a, b) || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.strict_equals(y)))
      }
      (Value::Object(a), Value::Object(b)) => {
        Rc::ptr_eq(a, b)
          || (a.len() == b.len()
            && a
              .iter()
              .all(|(k, v)| b.get(k).is_some_and(|other| v.strict_equals(other))))
      }
      _ => false,
    }
  }

  /// `==` with the usual primitive coercions.
  pub fn loose_equals(&self, other: &Value) -> bool {
    match (self, other) {
      (a, b) if a.is_nullish() && b.is_nullish() => true,
      (a, b) if a.is_nullish() || b.is_nullish() => false,
      (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
        self.to_number() == other.to_number()
      }
      (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
      (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
      (Value::Array(_) | Value::Object(_) | Value::Date(_), Value::Number(_) | Value::String(_)) => {
        self.to_primitive().loose_equals(other)
      }
      (Value::Number(_) | Value::String(_), Value::Array(_) | Value::Object(_) | Value::Date(_)) => {
        self.loose_equals(&other.to_primitive())
      }
      _ => self.strict_equals(other),
    }
  }
}

fn parse_numeric_string(s: &str) -> f64 {
  let trimmed = s.trim();
  if trimmed.is_empty() {
    return 0.0;
  }
  if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
    return u64::from_str_radix(hex, 16).map(|v| v as f64).unwrap_or(f64::NAN);
  }
  match trimmed {
    "Infinity" | "+Infinity" => f64::INFINITY,
    "-Infinity" => f64::NEG_INFINITY,
    // Rust accepts "inf" and "nan"; JS does not
    t if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
    t => t.parse::<f64>().unwrap_or(f64::NAN),
  }
}

/// Formats a number the way JavaScript's `String(n)` does for common values.
pub fn format_number(n: f64) -> String {
  if n.is_nan() {
    return "NaN".to_string();
  }
  if n.is_infinite() {
    return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
  }
  if n == 0.0 {
    return "0".to_string();
  }
  if n.fract() == 0.0 && n.abs() < 1e21 {
    return format!("{:.0}", n);
  }
  let abs = n.abs();
  if !(1e-6..1e21).contains(&abs) {
    // exponent form: 1e-7, 1.5e+21
    let formatted = format!("{:e}", n);
    if let Some((mantissa, exp)) = formatted.split_once('e') {
      let mut out = String::from(mantissa);
      let exp: i32 = exp.parse().unwrap_or(0);
      let _ = write!(out, "e{}{}", if exp < 0 { "-" } else { "+" }, exp.abs());
      return out;
    }
    return formatted;
  }
  format!("{}", n)
}

/// Integral floats in the safe range become JSON integers; NaN and infinities become `null`.
pub fn number_to_json(n: f64) -> JsonValue {
  if !n.is_finite() {
    return JsonValue::Null;
  }
  if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0 {
    return JsonValue::Number(Number::from(n as i64));
  }
  Number::from_f64(n).map(JsonValue::Number).unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn number_formatting_matches_js() {
    assert_eq!(format_number(3.0), "3");
    assert_eq!(format_number(-0.0), "0");
    assert_eq!(format_number(0.5), "0.5");
    assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    assert_eq!(format_number(1e21), "1e+21");
    assert_eq!(format_number(1e-7), "1e-7");
    assert_eq!(format_number(5e-7), "5e-7");
    assert_eq!(format_number(-1.5e-7), "-1.5e-7");
    assert_eq!(format_number(0.000001), "0.000001");
    assert_eq!(format_number(f64::NAN), "NaN");
    assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
  }

  #[test]
  fn json_conversion_normalizes_numbers() {
    assert_eq!(Value::Number(3.0).to_json(), json!(3));
    assert_eq!(Value::Number(2.5).to_json(), json!(2.5));
    assert_eq!(Value::Number(f64::NAN).to_json(), JsonValue::Null);
  }

  #[test]
  fn json_objects_drop_undefined_members() {
    let mut map = Object::new();
    map.insert("a".into(), Value::Number(1.0));
    map.insert("b".into(), Value::Undefined);
    assert_eq!(Value::object(map).to_json(), json!({"a": 1}));
  }

  #[test]
  fn truthiness() {
    assert!(!Value::Inert.truthy());
    assert!(!Value::string("").truthy());
    assert!(!Value::Number(f64::NAN).truthy());
    assert!(Value::array(vec![]).truthy());
  }

  #[test]
  fn loose_equality_coerces() {
    assert!(Value::Null.loose_equals(&Value::Undefined));
    assert!(Value::string("1").loose_equals(&Value::Number(1.0)));
    assert!(Value::Bool(true).loose_equals(&Value::Number(1.0)));
    assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
  }

  #[test]
  fn numeric_strings() {
    assert_eq!(Value::string(" 42 ").to_number(), 42.0);
    assert_eq!(Value::string("").to_number(), 0.0);
    assert!(Value::string("inf").to_number().is_nan());
    assert_eq!(Value::string("1e3").to_number(), 1000.0);
  }
}
