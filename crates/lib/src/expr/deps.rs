//! Free identifier collection for dependency tooling.

use indexmap::IndexSet;

use super::ast::{Expr, Item, Member, Program, PropKey, Property, TemplatePart};
use super::builtins::GLOBALS;
use super::scope::{DENYLIST, GLOBAL_ALIASES};

/// Root identifiers a program reads from its context, in first-use order.
///
/// Member property names, locals, built-ins, global aliases and denylisted
/// names are excluded.
pub fn free_identifiers(program: &Program) -> Vec<String> {
  let mut found = IndexSet::new();
  let mut locals: Vec<String> = Vec::new();
  for (name, expr) in &program.bindings {
    walk(expr, &mut locals, &mut found);
    locals.push(name.clone());
  }
  walk(&program.body, &mut locals, &mut found);
  found.into_iter().collect()
}

fn walk(expr: &Expr, locals: &mut Vec<String>, found: &mut IndexSet<String>) {
  match expr {
    Expr::Literal(_) => {}
    Expr::Ident(name) => {
      let name = name.as_str();
      if !locals.iter().any(|l| l == name)
        && !GLOBALS.contains(&name)
        && !GLOBAL_ALIASES.contains(&name)
        && !DENYLIST.contains(&name)
      {
        found.insert(name.to_string());
      }
    }
    Expr::Template(parts) => {
      for part in parts {
        if let TemplatePart::Code(code) = part {
          walk(code, locals, found);
        }
      }
    }
    Expr::Array(items) => walk_items(items, locals, found),
    Expr::Object(props) => {
      for prop in props {
        match prop {
          Property::KeyValue(key, value) => {
            if let PropKey::Computed(key) = key {
              walk(key, locals, found);
            }
            walk(value, locals, found);
          }
          Property::Spread(value) => walk(value, locals, found),
        }
      }
    }
    Expr::Member { object, member, .. } => {
      walk(object, locals, found);
      if let Member::Computed(key) = member {
        walk(key, locals, found);
      }
    }
    Expr::Call { callee, args, .. } | Expr::New { callee, args } => {
      walk(callee, locals, found);
      walk_items(args, locals, found);
    }
    Expr::Unary { operand, .. } => walk(operand, locals, found),
    Expr::Delete(target) => walk(target, locals, found),
    Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
      walk(left, locals, found);
      walk(right, locals, found);
    }
    Expr::Assign { target, value } => {
      walk(target, locals, found);
      walk(value, locals, found);
    }
    Expr::Conditional {
      test,
      consequent,
      alternate,
    } => {
      walk(test, locals, found);
      walk(consequent, locals, found);
      walk(alternate, locals, found);
    }
    Expr::Arrow(arrow) => {
      let mark = locals.len();
      locals.extend(arrow.params.iter().cloned());
      walk(&arrow.body, locals, found);
      locals.truncate(mark);
    }
  }
}

fn walk_items(items: &[Item], locals: &mut Vec<String>, found: &mut IndexSet<String>) {
  for item in items {
    match item {
      Item::Single(expr) | Item::Spread(expr) => walk(expr, locals, found),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::super::parser::parse;
  use super::*;

  fn deps(code: &str) -> Vec<String> {
    free_identifiers(&parse(code, 64).unwrap())
  }

  #[test]
  fn member_names_are_not_dependencies() {
    assert_eq!(deps("query1.data.rows[idx]"), vec!["query1", "idx"]);
  }

  #[test]
  fn locals_and_builtins_are_excluded() {
    assert_eq!(deps("let n = count; items.map(x => x * n + Math.max(y, 1))"), vec!["count", "items", "y"]);
    assert_eq!(deps("window.user ? fetch : JSON"), Vec::<String>::new());
  }

  #[test]
  fn parameters_go_out_of_scope() {
    assert_eq!(deps("[a].map(a => a) && a"), vec!["a"]);
    assert_eq!(deps("f(x => x) + x"), vec!["f", "x"]);
  }
}
