//! Allow-listed methods per value type. Anything not listed here is not
//! callable from an expression.

use std::cmp::Ordering;

use chrono::SecondsFormat;

use super::builtins::{date_number, number_to_radix};
use super::error::EvalError;
use super::value::{Value, format_number};

/// Longest string or array a built-in will produce.
pub(crate) const MAX_LENGTH: usize = 1 << 24;

pub type Invoke<'a> = dyn FnMut(&Value, Vec<Value>) -> Result<Value, EvalError> + 'a;

const STRING_METHODS: &[&str] = &[
  "toUpperCase",
  "toLowerCase",
  "trim",
  "trimStart",
  "trimEnd",
  "includes",
  "startsWith",
  "endsWith",
  "indexOf",
  "lastIndexOf",
  "slice",
  "substring",
  "split",
  "replace",
  "replaceAll",
  "repeat",
  "padStart",
  "padEnd",
  "charAt",
  "charCodeAt",
  "at",
  "concat",
  "localeCompare",
  "toString",
  "valueOf",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString", "toLocaleString", "valueOf"];

const ARRAY_METHODS: &[&str] = &[
  "map",
  "filter",
  "find",
  "findIndex",
  "some",
  "every",
  "reduce",
  "forEach",
  "flatMap",
  "sort",
  "includes",
  "indexOf",
  "join",
  "slice",
  "concat",
  "reverse",
  "flat",
  "at",
  "toString",
];

const OBJECT_METHODS: &[&str] = &["hasOwnProperty", "toString"];

const DATE_METHODS: &[&str] = &["toISOString", "toJSON", "toString", "toDateString", "toLocaleDateString"];

pub fn has_method(receiver: &Value, name: &str) -> bool {
  match receiver {
    Value::String(_) => STRING_METHODS.contains(&name),
    Value::Number(_) => NUMBER_METHODS.contains(&name),
    Value::Bool(_) => matches!(name, "toString" | "valueOf"),
    Value::Array(_) => ARRAY_METHODS.contains(&name),
    Value::Object(_) => OBJECT_METHODS.contains(&name),
    Value::Date(_) => DATE_METHODS.contains(&name) || date_number(name).is_some(),
    _ => false,
  }
}

pub fn call(receiver: &Value, name: &str, args: &[Value], invoke: &mut Invoke<'_>) -> Result<Value, EvalError> {
  if !has_method(receiver, name) {
    return Err(EvalError::Type(format!(
      "{}.{} is not a function",
      type_label(receiver),
      name
    )));
  }
  match receiver {
    Value::String(s) => string_method(s, name, args, invoke),
    Value::Number(n) => number_method(*n, name, args),
    Value::Bool(b) => Ok(match name {
      "toString" => Value::string(b.to_string()),
      _ => Value::Bool(*b),
    }),
    Value::Array(items) => array_method(items, name, args, invoke),
    Value::Object(map) => Ok(match name {
      "hasOwnProperty" => Value::Bool(map.contains_key(&arg(args, 0).to_display())),
      _ => Value::string(receiver.to_display()),
    }),
    Value::Date(d) => {
      if let Some(getter) = date_number(name) {
        return Ok(Value::Number(getter(d)));
      }
      Ok(Value::string(match name {
        "toDateString" => d.format("%a %b %d %Y").to_string(),
        "toLocaleDateString" => d.format("%-m/%-d/%Y").to_string(),
        _ => d.to_rfc3339_opts(SecondsFormat::Millis, true),
      }))
    }
    _ => Err(EvalError::Type(format!("{} is not a function", name))),
  }
}

fn type_label(value: &Value) -> &'static str {
  match value {
    Value::String(_) => "String",
    Value::Number(_) => "Number",
    Value::Bool(_) => "Boolean",
    Value::Array(_) => "Array",
    Value::Date(_) => "Date",
    _ => "Object",
  }
}

fn arg(args: &[Value], idx: usize) -> Value {
  args.get(idx).cloned().unwrap_or(Value::Undefined)
}

/// Resolves a relative index argument (negative counts from the end) into `0..=len`.
fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
  let Some(value) = value.filter(|v| !matches!(v, Value::Undefined)) else {
    return default;
  };
  let n = value.to_number();
  if n.is_nan() {
    return 0;
  }
  let n = n.trunc();
  if n < 0.0 {
    (len as f64 + n).max(0.0) as usize
  } else {
    n.min(len as f64) as usize
  }
}

fn clamp_index(value: Option<&Value>, len: usize, default: usize) -> usize {
  match value {
    None | Some(Value::Undefined) => default,
    Some(v) => {
      let n = v.to_number();
      if n.is_nan() || n < 0.0 { 0 } else { n.min(len as f64) as usize }
    }
  }
}

fn string_method(s: &str, name: &str, args: &[Value], invoke: &mut Invoke<'_>) -> Result<Value, EvalError> {
  let chars: Vec<char> = s.chars().collect();
  let len = chars.len();
  let text = |idx: usize| arg(args, idx).to_display();
  let slice = |start: usize, end: usize| -> String {
    if start >= end { String::new() } else { chars[start..end].iter().collect() }
  };
  let position_of = |needle: &str, from_end: bool| -> f64 {
    let found = if from_end { s.rfind(needle) } else { s.find(needle) };
    found.map(|byte| s[..byte].chars().count() as f64).unwrap_or(-1.0)
  };

  let value = match name {
    "toUpperCase" => Value::string(s.to_uppercase()),
    "toLowerCase" => Value::string(s.to_lowercase()),
    "trim" => Value::string(s.trim()),
    "trimStart" => Value::string(s.trim_start()),
    "trimEnd" => Value::string(s.trim_end()),
    "includes" => Value::Bool(s.contains(text(0).as_str())),
    "startsWith" => Value::Bool(s.starts_with(text(0).as_str())),
    "endsWith" => Value::Bool(s.ends_with(text(0).as_str())),
    "indexOf" => Value::Number(position_of(&text(0), false)),
    "lastIndexOf" => Value::Number(position_of(&text(0), true)),
    "slice" => {
      let start = relative_index(args.first(), len, 0);
      let end = relative_index(args.get(1), len, len);
      Value::string(slice(start, end))
    }
    "substring" => {
      let a = clamp_index(args.first(), len, 0);
      let b = clamp_index(args.get(1), len, len);
      Value::string(slice(a.min(b), a.max(b)))
    }
    "split" => match args.first() {
      None | Some(Value::Undefined) => Value::array(vec![Value::string(s)]),
      Some(sep) => {
        let sep = sep.to_display();
        let parts: Vec<Value> = if sep.is_empty() {
          chars.iter().map(|c| Value::string(c.to_string())).collect()
        } else {
          s.split(sep.as_str()).map(Value::string).collect()
        };
        match args.get(1).map(Value::to_number) {
          Some(limit) if limit.is_finite() && limit >= 0.0 => {
            Value::array(parts.into_iter().take(limit as usize).collect())
          }
          _ => Value::array(parts),
        }
      }
    },
    "replace" | "replaceAll" => {
      let pattern = text(0);
      let replacement = arg(args, 1);
      let mut out = String::new();
      let mut rest = s;
      let mut replaced_once = false;
      while let Some(idx) = rest.find(pattern.as_str()) {
        if replaced_once && name == "replace" {
          break;
        }
        out.push_str(&rest[..idx]);
        let piece = if replacement.is_callable() {
          invoke(&replacement, vec![Value::string(&pattern)])?.to_display()
        } else {
          replacement.to_display()
        };
        out.push_str(&piece);
        replaced_once = true;
        if pattern.is_empty() {
          // an empty pattern matches once at the start for replace,
          // and between every character for replaceAll
          let Some(c) = rest.chars().next() else {
            rest = "";
            break;
          };
          if name == "replace" {
            break;
          }
          out.push(c);
          rest = &rest[c.len_utf8()..];
          continue;
        }
        rest = &rest[idx + pattern.len()..];
      }
      out.push_str(rest);
      Value::string(out)
    }
    "repeat" => {
      let count = arg(args, 0).to_number();
      if !count.is_finite() || count < 0.0 {
        return Err(EvalError::builtin("String.repeat", "invalid count value"));
      }
      if s.len() as f64 * count.trunc() > MAX_LENGTH as f64 {
        return Err(EvalError::builtin("String.repeat", "invalid string length"));
      }
      Value::string(s.repeat(count as usize))
    }
    "padStart" | "padEnd" => {
      let target = arg(args, 0).to_number();
      if target > MAX_LENGTH as f64 {
        return Err(EvalError::builtin(&format!("String.{}", name), "invalid string length"));
      }
      let target = if target.is_finite() && target > 0.0 { target as usize } else { 0 };
      let filler = match args.get(1) {
        None | Some(Value::Undefined) => " ".to_string(),
        Some(v) => v.to_display(),
      };
      if target <= len || filler.is_empty() {
        Value::string(s)
      } else {
        let pad: String = filler.chars().cycle().take(target - len).collect();
        if name == "padStart" {
          Value::string(format!("{}{}", pad, s))
        } else {
          Value::string(format!("{}{}", s, pad))
        }
      }
    }
    "charAt" => {
      let idx = arg(args, 0).to_number();
      let idx = if idx.is_nan() { 0.0 } else { idx };
      Value::string(
        (idx >= 0.0)
          .then(|| chars.get(idx as usize))
          .flatten()
          .map(|c| c.to_string())
          .unwrap_or_default(),
      )
    }
    "charCodeAt" => {
      let idx = arg(args, 0).to_number();
      let idx = if idx.is_nan() { 0.0 } else { idx };
      Value::Number(
        (idx >= 0.0)
          .then(|| chars.get(idx as usize))
          .flatten()
          .map(|c| f64::from(u32::from(*c)))
          .unwrap_or(f64::NAN),
      )
    }
    "at" => {
      let idx = arg(args, 0).to_number();
      let idx = if idx.is_nan() { 0.0 } else { idx.trunc() };
      let idx = if idx < 0.0 { len as f64 + idx } else { idx };
      if idx < 0.0 {
        Value::Undefined
      } else {
        chars
          .get(idx as usize)
          .map(|c| Value::string(c.to_string()))
          .unwrap_or(Value::Undefined)
      }
    }
    "concat" => Value::string(format!(
      "{}{}",
      s,
      args.iter().map(Value::to_display).collect::<String>()
    )),
    "localeCompare" => Value::Number(match s.cmp(text(0).as_str()) {
      Ordering::Less => -1.0,
      Ordering::Equal => 0.0,
      Ordering::Greater => 1.0,
    }),
    _ => Value::string(s),
  };
  Ok(value)
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Result<Value, EvalError> {
  let value = match name {
    "toFixed" => {
      let digits = arg(args, 0).to_number();
      let digits = if digits.is_nan() { 0.0 } else { digits };
      if !(0.0..=100.0).contains(&digits) {
        return Err(EvalError::builtin("Number.toFixed", "digits argument must be between 0 and 100"));
      }
      if !n.is_finite() {
        Value::string(format_number(n))
      } else {
        Value::string(format!("{:.*}", digits as usize, n))
      }
    }
    "toString" => {
      let radix = match args.first() {
        None | Some(Value::Undefined) => 10.0,
        Some(v) => v.to_number(),
      };
      if !(2.0..=36.0).contains(&radix) {
        return Err(EvalError::builtin("Number.toString", "radix must be between 2 and 36"));
      }
      Value::string(number_to_radix(n, radix as u32))
    }
    "toLocaleString" => Value::string(locale_format(n)),
    _ => Value::Number(n),
  };
  Ok(value)
}

/// en-US grouping with at most three fraction digits.
fn locale_format(n: f64) -> String {
  if !n.is_finite() {
    return format_number(n);
  }
  let rounded = format!("{:.3}", n.abs());
  let (int_part, frac_part) = rounded.split_once('.').unwrap_or((rounded.as_str(), ""));
  let mut grouped = String::new();
  for (i, c) in int_part.chars().enumerate() {
    if i > 0 && (int_part.len() - i) % 3 == 0 {
      grouped.push(',');
    }
    grouped.push(c);
  }
  let frac = frac_part.trim_end_matches('0');
  let sign = if n < 0.0 && (int_part != "0" || !frac.is_empty()) { "-" } else { "" };
  if frac.is_empty() {
    format!("{}{}", sign, grouped)
  } else {
    format!("{}{}.{}", sign, grouped, frac)
  }
}

fn callback_args(item: &Value, idx: usize, items: &Value) -> Vec<Value> {
  vec![item.clone(), Value::Number(idx as f64), items.clone()]
}

fn flatten_into(out: &mut Vec<Value>, items: &[Value], depth: usize) {
  for item in items {
    match item {
      Value::Array(inner) if depth > 0 => flatten_into(out, inner, depth - 1),
      other => out.push(other.clone()),
    }
  }
}

fn array_method(items: &[Value], name: &str, args: &[Value], invoke: &mut Invoke<'_>) -> Result<Value, EvalError> {
  let len = items.len();
  let whole = Value::array(items.to_vec());
  let callback = || -> Result<Value, EvalError> {
    let f = arg(args, 0);
    if f.is_callable() {
      Ok(f)
    } else {
      Err(EvalError::Type(format!("{} is not a function", f.to_display())))
    }
  };

  let value = match name {
    "map" => {
      let f = callback()?;
      let mut out = Vec::with_capacity(len);
      for (i, item) in items.iter().enumerate() {
        out.push(invoke(&f, callback_args(item, i, &whole))?);
      }
      Value::array(out)
    }
    "filter" => {
      let f = callback()?;
      let mut out = Vec::new();
      for (i, item) in items.iter().enumerate() {
        if invoke(&f, callback_args(item, i, &whole))?.truthy() {
          out.push(item.clone());
        }
      }
      Value::array(out)
    }
    "find" | "findIndex" => {
      let f = callback()?;
      let mut found = None;
      for (i, item) in items.iter().enumerate() {
        if invoke(&f, callback_args(item, i, &whole))?.truthy() {
          found = Some((i, item.clone()));
          break;
        }
      }
      match (name, found) {
        ("find", Some((_, item))) => item,
        ("find", None) => Value::Undefined,
        (_, Some((i, _))) => Value::Number(i as f64),
        (_, None) => Value::Number(-1.0),
      }
    }
    "some" | "every" => {
      let f = callback()?;
      let want = name == "some";
      let mut result = !want;
      for (i, item) in items.iter().enumerate() {
        if invoke(&f, callback_args(item, i, &whole))?.truthy() == want {
          result = want;
          break;
        }
      }
      Value::Bool(result)
    }
    "reduce" => {
      let f = callback()?;
      let mut iter = items.iter().enumerate();
      let mut acc = match args.get(1) {
        Some(initial) => initial.clone(),
        None => match iter.next() {
          Some((_, first)) => first.clone(),
          None => return Err(EvalError::Type("reduce of empty array with no initial value".into())),
        },
      };
      for (i, item) in iter {
        acc = invoke(&f, vec![acc, item.clone(), Value::Number(i as f64), whole.clone()])?;
      }
      acc
    }
    "forEach" => {
      let f = callback()?;
      for (i, item) in items.iter().enumerate() {
        invoke(&f, callback_args(item, i, &whole))?;
      }
      Value::Undefined
    }
    "flatMap" => {
      let f = callback()?;
      let mut out = Vec::new();
      for (i, item) in items.iter().enumerate() {
        match invoke(&f, callback_args(item, i, &whole))? {
          Value::Array(inner) => out.extend(inner.iter().cloned()),
          other => out.push(other),
        }
      }
      Value::array(out)
    }
    // Returns a sorted copy; the receiver is never mutated.
    "sort" => {
      let mut sorted = items.to_vec();
      let comparator = arg(args, 0);
      if comparator.is_callable() {
        let mut failure = None;
        sorted.sort_by(|a, b| {
          if failure.is_some() {
            return Ordering::Equal;
          }
          match invoke(&comparator, vec![a.clone(), b.clone()]) {
            Ok(result) => result.to_number().partial_cmp(&0.0).unwrap_or(Ordering::Equal),
            Err(err) => {
              failure = Some(err);
              Ordering::Equal
            }
          }
        });
        if let Some(err) = failure {
          return Err(err);
        }
      } else {
        // undefined sorts last, everything else by string form
        sorted.sort_by(|a, b| match (a, b) {
          (Value::Undefined, Value::Undefined) => Ordering::Equal,
          (Value::Undefined, _) => Ordering::Greater,
          (_, Value::Undefined) => Ordering::Less,
          _ => a.to_display().cmp(&b.to_display()),
        });
      }
      Value::array(sorted)
    }
    "includes" => {
      let needle = arg(args, 0);
      Value::Bool(items.iter().any(|item| {
        item.strict_equals(&needle) || matches!((item, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
      }))
    }
    "indexOf" => {
      let needle = arg(args, 0);
      Value::Number(
        items
          .iter()
          .position(|item| item.strict_equals(&needle))
          .map(|i| i as f64)
          .unwrap_or(-1.0),
      )
    }
    "join" => {
      let sep = match args.first() {
        None | Some(Value::Undefined) => ",".to_string(),
        Some(v) => v.to_display(),
      };
      Value::string(
        items
          .iter()
          .map(|item| if item.is_nullish() { String::new() } else { item.to_display() })
          .collect::<Vec<_>>()
          .join(&sep),
      )
    }
    "slice" => {
      let start = relative_index(args.first(), len, 0);
      let end = relative_index(args.get(1), len, len);
      Value::array(if start < end { items[start..end].to_vec() } else { Vec::new() })
    }
    "concat" => {
      let mut out = items.to_vec();
      for a in args {
        match a {
          Value::Array(inner) => out.extend(inner.iter().cloned()),
          other => out.push(other.clone()),
        }
      }
      Value::array(out)
    }
    "reverse" => Value::array(items.iter().rev().cloned().collect()),
    "flat" => {
      let depth = match args.first() {
        None | Some(Value::Undefined) => 1.0,
        Some(v) => v.to_number(),
      };
      let depth = if depth.is_nan() || depth < 0.0 { 0 } else { depth.min(64.0) as usize };
      let mut out = Vec::new();
      flatten_into(&mut out, items, depth);
      Value::array(out)
    }
    "at" => {
      let idx = arg(args, 0).to_number();
      let idx = if idx.is_nan() { 0.0 } else { idx.trunc() };
      let idx = if idx < 0.0 { len as f64 + idx } else { idx };
      if idx < 0.0 {
        Value::Undefined
      } else {
        items.get(idx as usize).cloned().unwrap_or(Value::Undefined)
      }
    }
    _ => Value::string(whole.to_display()),
  };
  Ok(value)
}
