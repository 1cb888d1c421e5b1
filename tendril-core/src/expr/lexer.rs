//! Tokenizer for binding expressions.

use std::fmt;
use std::rc::Rc;

use chumsky::prelude::*;

use super::{LexError, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    Number(f64),
    Str(Rc<str>),
    Ident(&'src str),
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    BraceOpen,
    BraceClose,
    Comma,
    Dot,
    QuestionDot,
    Colon,
    Semi,
    Question,
    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Nullish,
    PlusPlus,
    MinusMinus,
}

impl Token<'_> {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Number(_) | Self::Str(_) | Self::Ident(_) => "",
            Self::ParenOpen => "(",
            Self::ParenClose => ")",
            Self::BracketOpen => "[",
            Self::BracketClose => "]",
            Self::BraceOpen => "{",
            Self::BraceClose => "}",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::QuestionDot => "?.",
            Self::Colon => ":",
            Self::Semi => ";",
            Self::Question => "?",
            Self::Arrow => "=>",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::Assign => "=",
            Self::PlusAssign => "+=",
            Self::MinusAssign => "-=",
            Self::StarAssign => "*=",
            Self::SlashAssign => "/=",
            Self::Eq => "==",
            Self::StrictEq => "===",
            Self::Ne => "!=",
            Self::StrictNe => "!==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Nullish => "??",
            Self::PlusPlus => "++",
            Self::MinusMinus => "--",
        }
    }

    /// Whether the token is the last one of an operand, so that a following
    /// `+` or `-` is binary.
    pub(crate) fn ends_operand(&self) -> bool {
        match self {
            Self::Ident(name) => *name != "typeof",
            Self::Number(_)
            | Self::Str(_)
            | Self::ParenClose
            | Self::BracketClose
            | Self::BraceClose
            | Self::PlusPlus
            | Self::MinusMinus => true,
            _ => false,
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", super::value::format_number(*n)),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Ident(name) => f.write_str(name),
            other => f.write_str(other.symbol()),
        }
    }
}

/// A token and the byte range it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

pub(crate) fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<Spanned<Token<'src>>>, extra::Err<LexError<'src>>> {
    let bracket = choice((
        just('(').to(Token::ParenOpen),
        just(')').to(Token::ParenClose),
        just('[').to(Token::BracketOpen),
        just(']').to(Token::BracketClose),
        just('{').to(Token::BraceOpen),
        just('}').to(Token::BraceClose),
    ));

    // Longest first, so `===` wins over `==` and `=`.
    let comparator = choice((
        just("===").to(Token::StrictEq),
        just("!==").to(Token::StrictNe),
        just("=>").to(Token::Arrow),
        just("==").to(Token::Eq),
        just("!=").to(Token::Ne),
        just("<=").to(Token::Le),
        just(">=").to(Token::Ge),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
    ));

    let arithmetic = choice((
        just("++").to(Token::PlusPlus),
        just("--").to(Token::MinusMinus),
        just("+=").to(Token::PlusAssign),
        just("-=").to(Token::MinusAssign),
        just("*=").to(Token::StarAssign),
        just("/=").to(Token::SlashAssign),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    // `?.` followed by a digit is a conditional, as in `a?.5:1`.
    let optional_chain = just("?.")
        .and_is(just("?.").then(one_of("0123456789")).not())
        .to(Token::QuestionDot);

    let logical = choice((
        just("&&").to(Token::AndAnd),
        just("||").to(Token::OrOr),
        just("??").to(Token::Nullish),
        optional_chain,
        just('?').to(Token::Question),
        just('!').to(Token::Bang),
        just('=').to(Token::Assign),
    ));

    let punctuation = choice((
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just(':').to(Token::Colon),
        just(';').to(Token::Semi),
    ));

    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10));
    let fraction = just('.').then(text::digits(10));
    let number = text::digits(10)
        .then(fraction.clone().or_not())
        .then(exponent.clone().or_not())
        .ignored()
        .or(fraction.then(exponent.or_not()).ignored())
        .to_slice()
        .try_map(|number: &str, span| {
            number
                .parse::<f64>()
                .map(Token::Number)
                .map_err(|_| LexError::custom(span, format!("invalid number `{number}`")))
        });

    let escape = just('\\').ignore_then(choice((
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
        just('0').to('\0'),
        any(),
    )));
    let double_quoted = just('"')
        .ignore_then(
            none_of("\"\\")
                .or(escape.clone())
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('"'));
    let single_quoted = just('\'')
        .ignore_then(none_of("'\\").or(escape).repeated().collect::<String>())
        .then_ignore(just('\''));
    let string = double_quoted
        .or(single_quoted)
        .map(|text| Token::Str(text.into()));

    let identifier = any()
        .filter(|character: &char| {
            character.is_ascii_alphabetic() || *character == '_' || *character == '$'
        })
        .then(
            any()
                .filter(|character: &char| {
                    character.is_ascii_alphanumeric() || *character == '_' || *character == '$'
                })
                .repeated(),
        )
        .to_slice()
        .map(Token::Ident);

    let token = choice((
        number,
        string,
        identifier,
        bracket,
        comparator,
        arithmetic,
        logical,
        punctuation,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded()
        .repeated()
        .collect()
        .padded()
}

/// Split `source` into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Spanned<Token<'_>>>, super::ParseError> {
    lexer()
        .parse(source)
        .into_result()
        .map_err(super::ParseError::from_rich)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.node)
            .collect()
    }

    #[test]
    fn lexes_operators_longest_first() {
        assert_eq!(
            kinds("a === b => c++"),
            vec![
                Token::Ident("a"),
                Token::StrictEq,
                Token::Ident("b"),
                Token::Arrow,
                Token::Ident("c"),
                Token::PlusPlus,
            ]
        );
        assert_eq!(kinds("x-=1")[1], Token::MinusAssign);
        assert_eq!(kinds("a!==b")[1], Token::StrictNe);
    }

    #[test]
    fn lexes_numbers_and_strings() {
        assert_eq!(
            kinds(r#"1.5e2 .25 'it\'s' "a\nb""#),
            vec![
                Token::Number(150.0),
                Token::Number(0.25),
                Token::Str("it's".into()),
                Token::Str("a\nb".into()),
            ]
        );
        assert_eq!(kinds("1e"), vec![Token::Number(1.0), Token::Ident("e")]);
    }

    #[test]
    fn optional_chain_vs_conditional() {
        assert_eq!(kinds("a?.b")[1], Token::QuestionDot);
        assert_eq!(kinds("a?.5:1")[1], Token::Question);
        assert_eq!(kinds("a?.5:1")[2], Token::Number(0.5));
    }

    #[test]
    fn reports_offsets() {
        let tokens = tokenize("  foo + 1").unwrap();
        assert_eq!(tokens[0].span.start, 2);
        assert_eq!(tokens[0].span.end, 5);
        assert_eq!(tokens[1].span.start, 6);

        let err = tokenize("a # b").unwrap_err();
        assert_eq!(err.offset, 2);

        assert!(tokenize("'open").is_err());
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn displays_tokens_as_written() {
        assert_eq!(Token::StrictNe.to_string(), "!==");
        assert_eq!(Token::Ident("count").to_string(), "count");
        assert_eq!(Token::Number(2.0).to_string(), "2");
    }
}
