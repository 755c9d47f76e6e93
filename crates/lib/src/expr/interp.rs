//! Tree-walking interpreter over parsed programs.

use std::cell::Cell;
use std::rc::Rc;

use super::ast::{BinaryOp, Expr, Item, Literal, LogicalOp, Member, Program, PropKey, Property, TemplatePart, UnaryOp};
use super::builtins;
use super::error::EvalError;
use super::methods;
use super::scope::{Scope, is_prototype_handle};
use super::value::{Lambda, Object, Value, format_number};

/// Snippet-local bindings, innermost first.
pub type Env = Option<Rc<Frame>>;

#[derive(Debug)]
pub struct Frame {
  name: String,
  value: Value,
  parent: Env,
}

fn bind(env: &Env, name: &str, value: Value) -> Env {
  Some(Rc::new(Frame {
    name: name.to_string(),
    value,
    parent: env.clone(),
  }))
}

fn lookup_local(env: &Env, name: &str) -> Option<Value> {
  let mut frame = env.as_ref();
  while let Some(f) = frame {
    if f.name == name {
      return Some(f.value.clone());
    }
    frame = f.parent.as_ref();
  }
  None
}

/// Renders an expression back to a short form for error messages.
fn describe(expr: &Expr) -> String {
  match expr {
    Expr::Ident(name) => name.clone(),
    Expr::Member {
      object,
      member: Member::Name(name),
      ..
    } => format!("{}.{}", describe(object), name),
    Expr::Member { object, .. } => format!("{}[...]", describe(object)),
    Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
    Expr::Literal(Literal::String(s)) => format!("'{}'", s),
    Expr::Literal(Literal::Number(n)) => format_number(*n),
    _ => "expression".to_string(),
  }
}

pub struct Interpreter<'s, 'c> {
  scope: &'s Scope<'c>,
  max_depth: usize,
  depth: Cell<usize>,
}

impl<'s, 'c> Interpreter<'s, 'c> {
  pub fn new(scope: &'s Scope<'c>, max_depth: usize) -> Self {
    Self {
      scope,
      max_depth,
      depth: Cell::new(0),
    }
  }

  pub fn run(&self, program: &Program) -> Result<Value, EvalError> {
    let mut env: Env = None;
    for (name, expr) in &program.bindings {
      let value = self.eval(expr, &env)?;
      env = bind(&env, name, value);
    }
    self.eval(&program.body, &env)
  }

  fn lookup(&self, name: &str, env: &Env) -> Value {
    lookup_local(env, name).unwrap_or_else(|| self.scope.lookup(name))
  }

  fn eval(&self, expr: &Expr, env: &Env) -> Result<Value, EvalError> {
    match expr {
      Expr::Literal(lit) => Ok(match lit {
        Literal::Undefined => Value::Undefined,
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
      }),
      Expr::Template(parts) => {
        let mut out = String::new();
        for part in parts {
          match part {
            TemplatePart::Text(text) => out.push_str(text),
            TemplatePart::Code(code) => out.push_str(&self.eval(code, env)?.to_display()),
          }
        }
        Ok(Value::string(out))
      }
      Expr::Ident(name) => Ok(self.lookup(name, env)),
      Expr::Array(items) => Ok(Value::array(self.eval_items(items, env)?)),
      Expr::Object(props) => self.eval_object(props, env),
      Expr::Member { .. } | Expr::Call { .. } => Ok(self.eval_chain(expr, env)?.unwrap_or(Value::Undefined)),
      Expr::New { callee, args } => {
        let target = self.eval(callee, env)?;
        let args = self.eval_items(args, env)?;
        match target {
          Value::Builtin(name) => builtins::construct(name, &args),
          Value::Inert => Ok(Value::Inert),
          _ => Err(EvalError::Type(format!("{} is not a constructor", describe(callee)))),
        }
      }
      Expr::Unary { op, operand } => {
        let value = self.eval(operand, env)?;
        Ok(match op {
          UnaryOp::Not => Value::Bool(!value.truthy()),
          UnaryOp::Neg => Value::Number(-value.to_number()),
          UnaryOp::Plus => Value::Number(value.to_number()),
          UnaryOp::TypeOf => Value::string(value.type_of()),
        })
      }
      Expr::Binary { op, left, right } => {
        let left = self.eval(left, env)?;
        let right = self.eval(right, env)?;
        Ok(binary(*op, &left, &right))
      }
      Expr::Logical { op, left, right } => {
        let left = self.eval(left, env)?;
        let short_circuit = match op {
          LogicalOp::And => !left.truthy(),
          LogicalOp::Or => left.truthy(),
          LogicalOp::Nullish => !left.is_nullish(),
        };
        if short_circuit { Ok(left) } else { self.eval(right, env) }
      }
      Expr::Conditional {
        test,
        consequent,
        alternate,
      } => {
        if self.eval(test, env)?.truthy() {
          self.eval(consequent, env)
        } else {
          self.eval(alternate, env)
        }
      }
      Expr::Arrow(arrow) => Ok(Value::Lambda(Rc::new(Lambda {
        arrow: arrow.clone(),
        env: env.clone(),
      }))),
      Expr::Assign { target, .. } => Err(EvalError::WriteDenied(format!("cannot assign to {}", describe(target)))),
      Expr::Delete(target) => Err(EvalError::WriteDenied(format!("cannot delete {}", describe(target)))),
    }
  }

  /// Evaluates member and call chains. `None` means an optional link
  /// short-circuited and the rest of the chain is skipped.
  fn eval_chain(&self, expr: &Expr, env: &Env) -> Result<Option<Value>, EvalError> {
    match expr {
      Expr::Member {
        object,
        member,
        optional,
      } => {
        let Some(target) = self.eval_chain(object, env)? else {
          return Ok(None);
        };
        if *optional && target.is_nullish() {
          return Ok(None);
        }
        let key = self.member_key(member, env)?;
        self.get_member(&target, &key, object).map(Some)
      }
      Expr::Call { callee, args, optional } => {
        if let Expr::Member {
          object,
          member,
          optional: member_optional,
        } = callee.as_ref()
        {
          let Some(receiver) = self.eval_chain(object, env)? else {
            return Ok(None);
          };
          if *member_optional && receiver.is_nullish() {
            return Ok(None);
          }
          let key = self.member_key(member, env)?;
          if *optional && !receiver.is_nullish() && !self.has_callable(&receiver, &key) {
            return Ok(None);
          }
          let args = self.eval_items(args, env)?;
          return self.call_method(&receiver, &key, args, callee).map(Some);
        }

        let Some(function) = self.eval_chain(callee, env)? else {
          return Ok(None);
        };
        if *optional && function.is_nullish() {
          return Ok(None);
        }
        let args = self.eval_items(args, env)?;
        self.call_value(&function, args, callee).map(Some)
      }
      _ => self.eval(expr, env).map(Some),
    }
  }

  fn member_key(&self, member: &Member, env: &Env) -> Result<String, EvalError> {
    match member {
      Member::Name(name) => Ok(name.clone()),
      Member::Computed(expr) => Ok(property_key(&self.eval(expr, env)?)),
    }
  }

  fn get_member(&self, target: &Value, key: &str, target_expr: &Expr) -> Result<Value, EvalError> {
    match target {
      Value::Undefined | Value::Null => Err(EvalError::Type(format!(
        "cannot read properties of {} (reading '{}' of {})",
        target.to_display(),
        key,
        describe(target_expr)
      ))),
      Value::Inert => Ok(Value::Inert),
      Value::Scope => Ok(self.scope.lookup(key)),
      _ if is_prototype_handle(key) => Ok(Value::Inert),
      Value::Object(map) => Ok(map.get(key).cloned().unwrap_or(Value::Undefined)),
      Value::Array(items) => Ok(match key {
        "length" => Value::Number(items.len() as f64),
        _ => key
          .parse::<usize>()
          .ok()
          .and_then(|i| items.get(i).cloned())
          .unwrap_or(Value::Undefined),
      }),
      Value::String(s) => Ok(match key {
        "length" => Value::Number(s.chars().count() as f64),
        _ => key
          .parse::<usize>()
          .ok()
          .and_then(|i| s.chars().nth(i))
          .map(|c| Value::string(c.to_string()))
          .unwrap_or(Value::Undefined),
      }),
      Value::Builtin(name) => Ok(builtins::member(name, key)),
      _ => Ok(Value::Undefined),
    }
  }

  fn has_callable(&self, receiver: &Value, key: &str) -> bool {
    match receiver {
      Value::Inert => true,
      Value::Scope => self.scope.lookup(key).is_callable(),
      Value::Builtin(name) => builtins::member(name, key).is_callable(),
      Value::Object(map) if map.get(key).is_some_and(Value::is_callable) => true,
      other => methods::has_method(other, key),
    }
  }

  fn call_method(&self, receiver: &Value, key: &str, args: Vec<Value>, callee: &Expr) -> Result<Value, EvalError> {
    match receiver {
      Value::Undefined | Value::Null => Err(EvalError::Type(format!(
        "cannot read properties of {} (reading '{}')",
        receiver.to_display(),
        key
      ))),
      Value::Inert => Ok(Value::Inert),
      _ if is_prototype_handle(key) => Ok(Value::Inert),
      Value::Scope => self.call_value(&self.scope.lookup(key), args, callee),
      Value::Builtin(name) => self.call_value(&builtins::member(name, key), args, callee),
      Value::Object(map) if map.get(key).is_some_and(Value::is_callable) => {
        let function = map.get(key).cloned().unwrap_or(Value::Undefined);
        self.call_value(&function, args, callee)
      }
      _ => {
        let mut invoke = |function: &Value, call_args: Vec<Value>| self.call_value(function, call_args, callee);
        methods::call(receiver, key, &args, &mut invoke)
      }
    }
  }

  fn call_value(&self, function: &Value, args: Vec<Value>, callee: &Expr) -> Result<Value, EvalError> {
    match function {
      Value::Lambda(lambda) => self.call_lambda(lambda, args),
      Value::Builtin(name) if builtins::is_callable(name) => builtins::call(name, &args),
      Value::Inert => Ok(Value::Inert),
      _ => Err(EvalError::Type(format!("{} is not a function", describe(callee)))),
    }
  }

  fn call_lambda(&self, lambda: &Lambda, args: Vec<Value>) -> Result<Value, EvalError> {
    let depth = self.depth.get() + 1;
    if depth > self.max_depth {
      return Err(EvalError::TooDeep(self.max_depth));
    }
    self.depth.set(depth);

    let mut env = lambda.env.clone();
    let mut args = args.into_iter();
    for param in &lambda.arrow.params {
      env = bind(&env, param, args.next().unwrap_or(Value::Undefined));
    }
    let result = self.eval(&lambda.arrow.body, &env);
    self.depth.set(depth - 1);
    result
  }

  fn eval_items(&self, items: &[Item], env: &Env) -> Result<Vec<Value>, EvalError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
      match item {
        Item::Single(expr) => out.push(self.eval(expr, env)?),
        Item::Spread(expr) => match self.eval(expr, env)? {
          Value::Array(values) => out.extend(values.iter().cloned()),
          Value::String(s) => out.extend(s.chars().map(|c| Value::string(c.to_string()))),
          Value::Inert => {}
          _ => return Err(EvalError::Type(format!("{} is not iterable", describe(expr)))),
        },
      }
    }
    Ok(out)
  }

  fn eval_object(&self, props: &[Property], env: &Env) -> Result<Value, EvalError> {
    let mut map = Object::new();
    for prop in props {
      match prop {
        Property::KeyValue(key, expr) => {
          let key = match key {
            PropKey::Static(name) => name.clone(),
            PropKey::Computed(expr) => property_key(&self.eval(expr, env)?),
          };
          if is_prototype_handle(&key) {
            return Err(EvalError::WriteDenied(format!("cannot define '{}'", key)));
          }
          let value = self.eval(expr, env)?;
          map.insert(key, value);
        }
        Property::Spread(expr) => {
          let value = self.eval(expr, env)?;
          map.extend(builtins::entries(&value));
        }
      }
    }
    Ok(Value::object(map))
  }
}

pub fn property_key(value: &Value) -> String {
  match value {
    Value::String(s) => s.to_string(),
    other => other.to_display(),
  }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
  match (left.to_primitive(), right.to_primitive()) {
    (Value::String(a), Value::String(b)) => Some(a.cmp(&b)),
    (a, b) => a.to_number().partial_cmp(&b.to_number()),
  }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
  use std::cmp::Ordering::{Equal, Greater, Less};
  match op {
    BinaryOp::Add => {
      let (l, r) = (left.to_primitive(), right.to_primitive());
      if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
        Value::string(format!("{}{}", l.to_display(), r.to_display()))
      } else {
        Value::Number(l.to_number() + r.to_number())
      }
    }
    BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
    BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
    BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
    BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
    BinaryOp::Pow => Value::Number(left.to_number().powf(right.to_number())),
    BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Less)),
    BinaryOp::Le => Value::Bool(matches!(compare(left, right), Some(Less | Equal))),
    BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Greater)),
    BinaryOp::Ge => Value::Bool(matches!(compare(left, right), Some(Greater | Equal))),
    BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
    BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
    BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
    BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
  }
}
