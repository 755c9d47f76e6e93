//! Precedence-climbing parser producing [`Program`] trees.

use std::rc::Rc;

use super::ast::{Arrow, BinaryOp, Expr, Item, Literal, LogicalOp, Member, Program, PropKey, Property, TemplatePart, UnaryOp};
use super::error::EvalError;
use super::lexer::{Spanned, TemplateChunk, Token, tokenize};

/// Words that can never name a binding.
pub const KEYWORDS: &[&str] = &[
  "true", "false", "null", "undefined", "typeof", "new", "delete", "let", "const", "var", "function", "return", "this",
  "in", "instanceof", "void", "if", "else",
];

pub fn parse(source: &str, max_depth: usize) -> Result<Program, EvalError> {
  let tokens = tokenize(source)?;
  let mut parser = Parser {
    tokens,
    pos: 0,
    depth: 0,
    max_depth,
    base: 0,
  };
  parser.program()
}

fn parse_embedded(source: &str, offset: usize, max_depth: usize, depth: usize) -> Result<Expr, EvalError> {
  let tokens = tokenize(source).map_err(|e| shift(e, offset))?;
  let mut parser = Parser {
    tokens,
    pos: 0,
    depth,
    max_depth,
    base: offset,
  };
  let expr = parser.expression()?;
  parser.expect_eof()?;
  Ok(expr)
}

fn shift(err: EvalError, offset: usize) -> EvalError {
  match err {
    EvalError::Syntax { pos, message } => EvalError::Syntax {
      pos: pos + offset,
      message,
    },
    other => other,
  }
}

struct Parser {
  tokens: Vec<Spanned>,
  pos: usize,
  depth: usize,
  max_depth: usize,
  base: usize,
}

fn binary_precedence(punct: &str) -> Option<u8> {
  let prec = match punct {
    "??" => 1,
    "||" => 2,
    "&&" => 3,
    "==" | "!=" | "===" | "!==" => 4,
    "<" | "<=" | ">" | ">=" => 5,
    "+" | "-" => 6,
    "*" | "/" | "%" => 7,
    "**" => 8,
    _ => return None,
  };
  Some(prec)
}

impl Parser {
  fn peek(&self) -> &Token {
    &self.tokens[self.pos].token
  }

  fn peek_at(&self, offset: usize) -> &Token {
    let idx = (self.pos + offset).min(self.tokens.len() - 1);
    &self.tokens[idx].token
  }

  fn position(&self) -> usize {
    self.tokens[self.pos].pos + self.base
  }

  fn advance(&mut self) -> Token {
    let token = self.tokens[self.pos].token.clone();
    if self.pos < self.tokens.len() - 1 {
      self.pos += 1;
    }
    token
  }

  fn is_punct(&self, punct: &str) -> bool {
    matches!(self.peek(), Token::Punct(p) if *p == punct)
  }

  fn is_word(&self, word: &str) -> bool {
    matches!(self.peek(), Token::Ident(w) if w == word)
  }

  fn eat(&mut self, punct: &str) -> bool {
    if self.is_punct(punct) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn expect(&mut self, punct: &str) -> Result<(), EvalError> {
    if self.eat(punct) {
      Ok(())
    } else {
      Err(self.unexpected(&format!("expected '{}'", punct)))
    }
  }

  fn expect_eof(&mut self) -> Result<(), EvalError> {
    match self.peek() {
      Token::Eof => Ok(()),
      _ => Err(self.unexpected("expected end of expression")),
    }
  }

  fn unexpected(&self, context: &str) -> EvalError {
    let found = match self.peek() {
      Token::Number(n) => format!("number {}", n),
      Token::String(s) => format!("string '{}'", s),
      Token::Template(_) => "template literal".to_string(),
      Token::Ident(i) => format!("'{}'", i),
      Token::Punct(p) => format!("'{}'", p),
      Token::Eof => "end of input".to_string(),
    };
    EvalError::syntax(self.position(), format!("{}, found {}", context, found))
  }

  fn binding_name(&mut self) -> Result<String, EvalError> {
    match self.peek().clone() {
      Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
        self.advance();
        Ok(name)
      }
      _ => Err(self.unexpected("expected identifier")),
    }
  }

  fn program(&mut self) -> Result<Program, EvalError> {
    let mut bindings = Vec::new();
    while self.is_word("let") || self.is_word("const") {
      self.advance();
      let name = self.binding_name()?;
      self.expect("=")?;
      let value = self.expression()?;
      self.expect(";")?;
      bindings.push((name, value));
    }
    let body = self.expression()?;
    self.eat(";");
    self.expect_eof()?;
    Ok(Program { bindings, body })
  }

  fn enter(&mut self) -> Result<(), EvalError> {
    self.depth += 1;
    if self.depth > self.max_depth {
      return Err(EvalError::TooDeep(self.max_depth));
    }
    Ok(())
  }

  fn expression(&mut self) -> Result<Expr, EvalError> {
    self.enter()?;
    let result = self.assignment();
    self.depth -= 1;
    result
  }

  fn assignment(&mut self) -> Result<Expr, EvalError> {
    if let Some(params) = self.arrow_params() {
      let body = self.expression()?;
      return Ok(Expr::Arrow(Rc::new(Arrow { params, body })));
    }

    let target = self.conditional()?;
    if self.eat("=") {
      let value = self.expression()?;
      return Ok(Expr::Assign {
        target: Box::new(target),
        value: Box::new(value),
      });
    }
    Ok(target)
  }

  /// Consumes an arrow parameter list and the `=>` when one starts here.
  fn arrow_params(&mut self) -> Option<Vec<String>> {
    if let (Token::Ident(name), Token::Punct("=>")) = (self.peek(), self.peek_at(1))
      && !KEYWORDS.contains(&name.as_str())
    {
      let name = name.clone();
      self.pos += 2;
      return Some(vec![name]);
    }

    if !self.is_punct("(") {
      return None;
    }
    let mut params = Vec::new();
    let mut offset = 1;
    loop {
      match self.peek_at(offset) {
        Token::Punct(")") => break,
        Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
          params.push(name.clone());
          offset += 1;
          match self.peek_at(offset) {
            Token::Punct(",") => offset += 1,
            Token::Punct(")") => break,
            _ => return None,
          }
        }
        _ => return None,
      }
    }
    if !matches!(self.peek_at(offset + 1), Token::Punct("=>")) {
      return None;
    }
    self.pos += offset + 2;
    Some(params)
  }

  fn conditional(&mut self) -> Result<Expr, EvalError> {
    let test = self.binary(0)?;
    if self.eat("?") {
      let consequent = self.expression()?;
      self.expect(":")?;
      let alternate = self.expression()?;
      return Ok(Expr::Conditional {
        test: Box::new(test),
        consequent: Box::new(consequent),
        alternate: Box::new(alternate),
      });
    }
    Ok(test)
  }

  fn binary(&mut self, min_prec: u8) -> Result<Expr, EvalError> {
    let mut left = self.unary()?;
    loop {
      let punct = match self.peek() {
        Token::Punct(p) => *p,
        _ => break,
      };
      let Some(prec) = binary_precedence(punct) else {
        break;
      };
      if prec < min_prec {
        break;
      }
      self.advance();
      // `**` is right-associative
      let next_min = if punct == "**" { prec } else { prec + 1 };
      self.enter()?;
      let right = self.binary(next_min);
      self.depth -= 1;
      let right = Box::new(right?);
      let left_box = Box::new(left);
      left = match punct {
        "&&" => Expr::Logical {
          op: LogicalOp::And,
          left: left_box,
          right,
        },
        "||" => Expr::Logical {
          op: LogicalOp::Or,
          left: left_box,
          right,
        },
        "??" => Expr::Logical {
          op: LogicalOp::Nullish,
          left: left_box,
          right,
        },
        other => Expr::Binary {
          op: binary_op(other),
          left: left_box,
          right,
        },
      };
    }
    Ok(left)
  }

  fn unary(&mut self) -> Result<Expr, EvalError> {
    let op = match self.peek() {
      Token::Punct("!") => Some(UnaryOp::Not),
      Token::Punct("-") => Some(UnaryOp::Neg),
      Token::Punct("+") => Some(UnaryOp::Plus),
      Token::Ident(w) if w == "typeof" => Some(UnaryOp::TypeOf),
      Token::Ident(w) if w == "delete" => {
        self.advance();
        let target = self.nested_unary()?;
        return Ok(Expr::Delete(Box::new(target)));
      }
      _ => None,
    };
    match op {
      Some(op) => {
        self.advance();
        let operand = self.nested_unary()?;
        Ok(Expr::Unary {
          op,
          operand: Box::new(operand),
        })
      }
      None => self.postfix(),
    }
  }

  fn nested_unary(&mut self) -> Result<Expr, EvalError> {
    self.enter()?;
    let result = self.unary();
    self.depth -= 1;
    result
  }

  fn postfix(&mut self) -> Result<Expr, EvalError> {
    let mut expr = self.primary()?;
    loop {
      if self.eat(".") {
        let name = self.property_name()?;
        expr = Expr::Member {
          object: Box::new(expr),
          member: Member::Name(name),
          optional: false,
        };
      } else if self.eat("?.") {
        if self.eat("(") {
          let args = self.arguments()?;
          expr = Expr::Call {
            callee: Box::new(expr),
            args,
            optional: true,
          };
        } else if self.eat("[") {
          let key = self.expression()?;
          self.expect("]")?;
          expr = Expr::Member {
            object: Box::new(expr),
            member: Member::Computed(Box::new(key)),
            optional: true,
          };
        } else {
          let name = self.property_name()?;
          expr = Expr::Member {
            object: Box::new(expr),
            member: Member::Name(name),
            optional: true,
          };
        }
      } else if self.eat("[") {
        let key = self.expression()?;
        self.expect("]")?;
        expr = Expr::Member {
          object: Box::new(expr),
          member: Member::Computed(Box::new(key)),
          optional: false,
        };
      } else if self.eat("(") {
        let args = self.arguments()?;
        expr = Expr::Call {
          callee: Box::new(expr),
          args,
          optional: false,
        };
      } else {
        break;
      }
    }
    Ok(expr)
  }

  fn property_name(&mut self) -> Result<String, EvalError> {
    match self.peek().clone() {
      Token::Ident(name) => {
        self.advance();
        Ok(name)
      }
      _ => Err(self.unexpected("expected property name")),
    }
  }

  /// Parses items up to and including `close`; the opener is already consumed.
  fn items(&mut self, close: &str) -> Result<Vec<Item>, EvalError> {
    let mut items = Vec::new();
    while !self.eat(close) {
      if self.eat("...") {
        items.push(Item::Spread(self.expression()?));
      } else {
        items.push(Item::Single(self.expression()?));
      }
      if !self.eat(",") {
        self.expect(close)?;
        break;
      }
    }
    Ok(items)
  }

  fn arguments(&mut self) -> Result<Vec<Item>, EvalError> {
    self.items(")")
  }

  fn object(&mut self) -> Result<Expr, EvalError> {
    let mut props = Vec::new();
    while !self.eat("}") {
      if self.eat("...") {
        props.push(Property::Spread(self.expression()?));
      } else {
        if !matches!(
          self.peek(),
          Token::Ident(_) | Token::String(_) | Token::Number(_) | Token::Punct("[")
        ) {
          return Err(self.unexpected("expected property key"));
        }
        let key = match self.advance() {
          Token::Ident(name) => {
            if !self.is_punct(":") {
              if KEYWORDS.contains(&name.as_str()) {
                self.pos -= 1;
                return Err(self.unexpected("expected ':'"));
              }
              props.push(Property::KeyValue(PropKey::Static(name.clone()), Expr::Ident(name)));
              if !self.eat(",") {
                self.expect("}")?;
                break;
              }
              continue;
            }
            PropKey::Static(name)
          }
          Token::String(s) => PropKey::Static(s),
          Token::Number(n) => PropKey::Static(super::value::format_number(n)),
          Token::Punct("[") => {
            let key = self.expression()?;
            self.expect("]")?;
            PropKey::Computed(key)
          }
          _ => return Err(EvalError::syntax(self.position(), "expected property key")),
        };
        self.expect(":")?;
        let value = self.expression()?;
        props.push(Property::KeyValue(key, value));
      }
      if !self.eat(",") {
        self.expect("}")?;
        break;
      }
    }
    Ok(Expr::Object(props))
  }

  fn primary(&mut self) -> Result<Expr, EvalError> {
    self.enter()?;
    let result = self.primary_inner();
    self.depth -= 1;
    result
  }

  fn primary_inner(&mut self) -> Result<Expr, EvalError> {
    let pos = self.position();
    if matches!(self.peek(), Token::Eof | Token::Punct(_))
      && !(self.is_punct("(") || self.is_punct("[") || self.is_punct("{"))
    {
      return Err(self.unexpected("unexpected token"));
    }
    match self.advance() {
      Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
      Token::String(s) => Ok(Expr::Literal(Literal::String(s.into()))),
      Token::Template(chunks) => {
        let mut parts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
          match chunk {
            TemplateChunk::Text(text) => parts.push(TemplatePart::Text(text)),
            TemplateChunk::Code(code, offset) => parts.push(TemplatePart::Code(parse_embedded(
              &code,
              offset + self.base,
              self.max_depth,
              self.depth,
            )?)),
          }
        }
        Ok(Expr::Template(parts))
      }
      Token::Ident(word) => match word.as_str() {
        "true" => Ok(Expr::Literal(Literal::Bool(true))),
        "false" => Ok(Expr::Literal(Literal::Bool(false))),
        "null" => Ok(Expr::Literal(Literal::Null)),
        "undefined" => Ok(Expr::Literal(Literal::Undefined)),
        "new" => self.new_expression(),
        w if KEYWORDS.contains(&w) => Err(EvalError::syntax(pos, format!("unsupported keyword '{}'", w))),
        _ => Ok(Expr::Ident(word.clone())),
      },
      Token::Punct("(") => {
        let expr = self.expression()?;
        self.expect(")")?;
        Ok(expr)
      }
      Token::Punct("[") => Ok(Expr::Array(self.items("]")?)),
      Token::Punct("{") => self.object(),
      _ => Err(EvalError::syntax(pos, "unexpected token")),
    }
  }

  fn new_expression(&mut self) -> Result<Expr, EvalError> {
    let mut callee = match self.peek().clone() {
      Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
        self.advance();
        Expr::Ident(name)
      }
      _ => return Err(self.unexpected("expected constructor name")),
    };
    while self.eat(".") {
      let name = self.property_name()?;
      callee = Expr::Member {
        object: Box::new(callee),
        member: Member::Name(name),
        optional: false,
      };
    }
    let args = if self.eat("(") { self.arguments()? } else { Vec::new() };
    Ok(Expr::New {
      callee: Box::new(callee),
      args,
    })
  }
}

fn binary_op(punct: &str) -> BinaryOp {
  match punct {
    "**" => BinaryOp::Pow,
    "*" => BinaryOp::Mul,
    "/" => BinaryOp::Div,
    "%" => BinaryOp::Rem,
    "+" => BinaryOp::Add,
    "-" => BinaryOp::Sub,
    "<" => BinaryOp::Lt,
    "<=" => BinaryOp::Le,
    ">" => BinaryOp::Gt,
    ">=" => BinaryOp::Ge,
    "==" => BinaryOp::Eq,
    "!=" => BinaryOp::NotEq,
    "===" => BinaryOp::StrictEq,
    _ => BinaryOp::StrictNotEq,
  }
}
