//! Tokenizer for the expression language.

use chumsky::error::RichReason;
use chumsky::prelude::*;

use super::error::EvalError;

/// One piece of a backtick template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
  Text(String),
  /// Raw source of a `${...}` substitution and its offset in the input.
  Code(String, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
  Number(f64),
  String(String),
  Template(Vec<TemplateChunk>),
  Ident(String),
  Punct(&'static str),
  Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
  pub token: Token,
  pub pos: usize,
}

type LexError<'src> = extra::Err<Rich<'src, char>>;

/// Longest punctuators first so that prefixes never shadow them. `?.` is
/// matched separately.
const PUNCTUATORS: [&str; 32] = [
  "===", "!==", "...", "**", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "+", "-", "*", "/", "%", "<", ">", "!",
  "?", ":", ".", ",", "(", ")", "[", "]", "{", "}", "=", ";",
];

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, EvalError> {
  let mut tokens = lexer().parse(source).into_result().map_err(|errors| {
    errors
      .first()
      .map(|err| EvalError::syntax(err.span().start, describe(err)))
      .unwrap_or_else(|| EvalError::syntax(0, "invalid expression"))
  })?;
  tokens.push(Spanned {
    token: Token::Eof,
    pos: source.len(),
  });
  Ok(tokens)
}

pub fn is_ident_char(c: char) -> bool {
  c == '_' || c == '$' || c.is_alphanumeric()
}

fn describe(err: &Rich<'_, char>) -> String {
  match err.reason() {
    RichReason::Custom(message) => message.clone(),
    _ => match err.found() {
      Some(found) => format!("unexpected character '{}'", found),
      None => "unexpected end of input".to_string(),
    },
  }
}

fn lexer<'src>() -> impl Parser<'src, &'src str, Vec<Spanned>, LexError<'src>> {
  let digits = any().filter(char::is_ascii_digit).repeated();
  let int = digits.clone().at_least(1);

  let hex = just("0x")
    .or(just("0X"))
    .ignore_then(any().filter(char::is_ascii_hexdigit).repeated().to_slice())
    .try_map(|digits: &str, span| {
      u64::from_str_radix(digits, 16)
        .map(|value| Token::Number(value as f64))
        .map_err(|_| Rich::custom(span, "invalid hex literal"))
    });

  // An exponent without digits is left for the identifier rule.
  let exponent = one_of("eE").then(one_of("+-").or_not()).then(int.clone());
  let decimal = choice((
    int.clone().then(just('.').then(digits).or_not()).to_slice(),
    just('.').then(int).to_slice(),
  ))
  .then(exponent.or_not())
  .to_slice()
  .try_map(|literal: &str, span| {
    literal
      .parse::<f64>()
      .map(Token::Number)
      .map_err(|_| Rich::custom(span, format!("invalid number '{}'", literal)))
  });

  let ident = any()
    .filter(|c: &char| *c == '_' || *c == '$' || c.is_alphabetic())
    .then(any().filter(|c: &char| is_ident_char(*c)).repeated())
    .to_slice()
    .map(|name: &str| Token::Ident(name.to_string()));

  // Brace depth is tracked so `${ {a: 1}.a }` keeps its inner object.
  let braced = recursive(|braced| {
    choice((just('{').then(braced).then(just('}')).to_slice(), none_of("{}").to_slice()))
      .repeated()
      .to_slice()
  });
  let substitution = just("${")
    .ignore_then(braced.map_with(|code: &str, e: &mut chumsky::input::MapExtra<'src, '_, &'src str, LexError<'src>>| TemplateChunk::Code(code.to_string(), e.span().start)))
    .then_ignore(just('}'));
  let template_text = choice((escape(), none_of("`\\").and_is(just("${").not())))
    .repeated()
    .at_least(1)
    .collect::<String>()
    .map(TemplateChunk::Text);
  let template = just('`')
    .ignore_then(choice((substitution, template_text)).repeated().collect::<Vec<_>>())
    .then(just('`').or_not())
    .try_map(|(chunks, closed), span| match closed {
      Some(_) => Ok(Token::Template(chunks)),
      None => Err(Rich::custom(span, "unterminated template literal")),
    });

  // `a?.5:1` is a conditional, not optional chaining.
  let optional_chain = just("?.")
    .and_is(just("?.").then(any().filter(char::is_ascii_digit)).not())
    .to(Token::Punct("?."));
  let punct = choice(PUNCTUATORS.map(|p| just(p).to(Token::Punct(p))));

  let token = choice((hex, decimal, template, quoted('"'), quoted('\''), ident, optional_chain, punct));

  text::whitespace()
    .ignore_then(
      token
        .map_with(|token, e| Spanned {
          token,
          pos: e.span().start,
        })
        .then_ignore(text::whitespace())
        .repeated()
        .collect::<Vec<_>>(),
    )
    .then_ignore(end())
}

fn quoted<'src>(quote: char) -> impl Parser<'src, &'src str, Token, LexError<'src>> + Clone {
  let plain = any().filter(move |c: &char| *c != quote && *c != '\\');
  just(quote)
    .ignore_then(choice((escape(), plain)).repeated().collect::<String>())
    .then(just(quote).or_not())
    .try_map(|(content, closed), span| match closed {
      Some(_) => Ok(Token::String(content)),
      None => Err(Rich::custom(span, "unterminated string literal")),
    })
}

fn escape<'src>() -> impl Parser<'src, &'src str, char, LexError<'src>> + Clone {
  let unicode = just('u')
    .ignore_then(any().filter(char::is_ascii_hexdigit).repeated().exactly(4).to_slice().or_not())
    .try_map(|hex: Option<&str>, span| match hex {
      Some(hex) => Ok(
        u32::from_str_radix(hex, 16)
          .ok()
          .and_then(char::from_u32)
          .unwrap_or('\u{fffd}'),
      ),
      None => Err(Rich::custom(span, "invalid unicode escape")),
    });
  let simple = any().filter(|c: &char| *c != 'u').map(|c| match c {
    'n' => '\n',
    't' => '\t',
    'r' => '\r',
    'b' => '\u{8}',
    'f' => '\u{c}',
    'v' => '\u{b}',
    '0' => '\0',
    other => other,
  });
  just('\\').ignore_then(choice((unicode, simple)))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(source: &str) -> Vec<Token> {
    tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
  }

  #[test]
  fn tokenizes_member_chain_and_operators() {
    assert_eq!(
      kinds("a.b >= 10"),
      vec![
        Token::Ident("a".into()),
        Token::Punct("."),
        Token::Ident("b".into()),
        Token::Punct(">="),
        Token::Number(10.0),
        Token::Eof,
      ]
    );
  }

  #[test]
  fn optional_chain_before_digit_is_conditional() {
    assert_eq!(
      kinds("a?.5:1"),
      vec![
        Token::Ident("a".into()),
        Token::Punct("?"),
        Token::Number(0.5),
        Token::Punct(":"),
        Token::Number(1.0),
        Token::Eof,
      ]
    );
  }

  #[test]
  fn string_escapes() {
    assert_eq!(kinds(r#"'it\'s\n'"#)[0], Token::String("it's\n".into()));
    assert_eq!(kinds(r#""A""#)[0], Token::String("A".into()));
  }

  #[test]
  fn template_literal_chunks() {
    let tokens = kinds("`hi ${name}!`");
    assert_eq!(
      tokens[0],
      Token::Template(vec![
        TemplateChunk::Text("hi ".into()),
        TemplateChunk::Code("name".into(), 6),
        TemplateChunk::Text("!".into()),
      ])
    );
  }

  #[test]
  fn numbers_in_every_spelling() {
    assert_eq!(kinds("0x1F")[0], Token::Number(31.0));
    assert_eq!(kinds("1.5e3")[0], Token::Number(1500.0));
    assert_eq!(kinds(".25")[0], Token::Number(0.25));
    assert_eq!(kinds("  \t")[0], Token::Eof);
  }

  #[test]
  fn unexpected_characters_carry_their_offset() {
    assert!(matches!(tokenize("a # b"), Err(EvalError::Syntax { pos: 2, .. })));
  }

  #[test]
  fn rejects_unterminated_string() {
    assert!(matches!(tokenize("'abc"), Err(EvalError::Syntax { .. })));
  }
}
