//! Parser for binding expressions.
//!
//! The accepted language is a JavaScript-flavoured expression subset:
//! literals, identifiers, member/index access (with `?.`), calls, unary,
//! binary, logical and conditional operators, assignment and update
//! operators, arrow functions (expression or block bodies), array and
//! object literals, and `;`-separated sequences at the top level.
//!
//! Precedence, lowest first:
//!
//! | level       | operators                          |
//! |-------------|------------------------------------|
//! | sequence    | `;`                                |
//! | assignment  | `=` `+=` `-=` `*=` `/=` `=>`       |
//! | conditional | `? :`                              |
//! | logical or  | `\|\|` `??`                        |
//! | logical and | `&&`                               |
//! | equality    | `==` `!=` `===` `!==`              |
//! | relational  | `<` `<=` `>` `>=`                  |
//! | additive    | `+` `-`                            |
//! | term        | `*` `/` `%`                        |
//! | unary       | `!` `-` `+` `typeof` `++x` `--x`   |
//! | postfix     | `x++` `x--`                        |
//! | call/member | `a.b` `a?.b` `a[b]` `a(b)`         |

use std::rc::Rc;

use chumsky::{input::ValueInput, pratt::*, prelude::*};

use super::ast::{
    ArrowBody, ArrowFunction, AssignOp, BinaryOp, Expr, Literal, LogicalOp, Statement, UnaryOp,
    UpdateOp,
};
use super::lexer::{tokenize, Spanned, Token};
use super::value::format_number;
use super::{ParseError, Span, SyntaxError};

/// Brackets plus right-nested operators allowed around any sub-expression.
const MAX_NESTING: usize = 32;

/// Parse a complete expression source.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    check_nesting(&tokens)?;
    let result = parser()
        .parse(
            tokens
                .as_slice()
                .map(Span::from(source.len()..source.len()), |Spanned { node, span }| (node, span)),
        )
        .into_result()
        .map_err(ParseError::from_rich);
    result
}

/// One step of a member/call chain, applied to the expression before it.
enum Access {
    Member { property: Rc<str>, optional: bool },
    Index { index: Expr, optional: bool },
    Call(Vec<Expr>),
}

impl Access {
    fn apply(self, object: Expr) -> Expr {
        let object = Box::new(object);
        match self {
            Access::Member { property, optional } => Expr::Member {
                object,
                property,
                optional,
            },
            Access::Index { index, optional } => Expr::Index {
                object,
                index: Box::new(index),
                optional,
            },
            Access::Call(args) => Expr::Call {
                callee: object,
                args,
            },
        }
    }
}

pub(crate) fn parser<'src, I>() -> impl Parser<'src, I, Expr, extra::Err<SyntaxError<'src>>>
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
{
    let assignment = recursive(|assignment| {
        let comma = just(Token::Comma);
        let paren_open = just(Token::ParenOpen);
        let paren_close = just(Token::ParenClose);
        let bracket_open = just(Token::BracketOpen);
        let bracket_close = just(Token::BracketClose);
        let brace_open = just(Token::BraceOpen);
        let brace_close = just(Token::BraceClose);

        let identifier = select! { Token::Ident(name) => Rc::<str>::from(name) };

        let literal_or_name = select! {
            Token::Number(n) => Expr::Literal(Literal::Number(n)),
            Token::Str(text) => Expr::Literal(Literal::String(text)),
            Token::Ident("true") => Expr::Literal(Literal::Bool(true)),
            Token::Ident("false") => Expr::Literal(Literal::Bool(false)),
            Token::Ident("null") => Expr::Literal(Literal::Null),
            Token::Ident("undefined") => Expr::Literal(Literal::Undefined),
            Token::Ident(name) => Expr::Identifier(name.into()),
        };

        let items = assignment
            .clone()
            .separated_by(comma.clone())
            .allow_trailing()
            .collect::<Vec<_>>();

        let nested = assignment
            .clone()
            .delimited_by(paren_open.clone(), paren_close.clone());

        let array = items
            .clone()
            .delimited_by(bracket_open.clone(), bracket_close.clone())
            .map(Expr::Array);

        let key = select! {
            Token::Ident(name) => Rc::<str>::from(name),
            Token::Str(text) => text,
            Token::Number(n) => Rc::<str>::from(format_number(n)),
        };
        let entry = choice((
            key.then_ignore(just(Token::Colon)).then(assignment.clone()),
            // Shorthand `{ name }`
            identifier
                .clone()
                .map(|name| (Rc::clone(&name), Expr::Identifier(name))),
        ));
        let object = entry
            .separated_by(comma.clone())
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(brace_open.clone(), brace_close.clone())
            .map(Expr::Object);

        let primary = choice((literal_or_name, nested, array, object));

        let index = assignment
            .clone()
            .delimited_by(bracket_open, bracket_close);
        let access = choice((
            just(Token::Dot)
                .ignore_then(identifier.clone())
                .map(|property| Access::Member {
                    property,
                    optional: false,
                }),
            just(Token::QuestionDot)
                .ignore_then(index.clone())
                .map(|index| Access::Index {
                    index,
                    optional: true,
                }),
            just(Token::QuestionDot)
                .ignore_then(identifier.clone())
                .map(|property| Access::Member {
                    property,
                    optional: true,
                }),
            index.map(|index| Access::Index {
                index,
                optional: false,
            }),
            items
                .delimited_by(paren_open.clone(), paren_close.clone())
                .map(Access::Call),
        ));
        let call_member = primary
            .foldl(access.repeated(), |object, access| access.apply(object))
            .boxed();

        let update_op = select! {
            Token::PlusPlus => UpdateOp::Increment,
            Token::MinusMinus => UpdateOp::Decrement,
        };
        let postfix_update = call_member
            .clone()
            .then(update_op.clone().or_not())
            .try_map(|(target, op), span| match op {
                Some(op) => update(op, false, target, span),
                None => Ok(target),
            });
        let prefix_update = update_op
            .then(call_member)
            .try_map(|(op, target), span| update(op, true, target, span));

        let operators = prefix_update.or(postfix_update).pratt((
            prefix(
                7,
                select! {
                    Token::Bang => UnaryOp::Not,
                    Token::Minus => UnaryOp::Neg,
                    Token::Plus => UnaryOp::Plus,
                    Token::Ident("typeof") => UnaryOp::Typeof,
                },
                |op, operand, _| Expr::Unary {
                    op,
                    operand: Box::new(operand),
                },
            ),
            infix(
                left(6),
                select! {
                    Token::Star => BinaryOp::Mul,
                    Token::Slash => BinaryOp::Div,
                    Token::Percent => BinaryOp::Rem,
                },
                |l, op, r, _| binary(op, l, r),
            ),
            infix(
                left(5),
                select! {
                    Token::Plus => BinaryOp::Add,
                    Token::Minus => BinaryOp::Sub,
                },
                |l, op, r, _| binary(op, l, r),
            ),
            infix(
                left(4),
                select! {
                    Token::Lt => BinaryOp::Lt,
                    Token::Le => BinaryOp::Le,
                    Token::Gt => BinaryOp::Gt,
                    Token::Ge => BinaryOp::Ge,
                },
                |l, op, r, _| binary(op, l, r),
            ),
            infix(
                left(3),
                select! {
                    Token::StrictEq => BinaryOp::StrictEq,
                    Token::StrictNe => BinaryOp::StrictNe,
                    Token::Eq => BinaryOp::Eq,
                    Token::Ne => BinaryOp::Ne,
                },
                |l, op, r, _| binary(op, l, r),
            ),
            infix(left(2), just(Token::AndAnd), |l, _, r, _| {
                logical(LogicalOp::And, l, r)
            }),
            infix(
                left(1),
                select! {
                    Token::OrOr => LogicalOp::Or,
                    Token::Nullish => LogicalOp::Nullish,
                },
                |l, op, r, _| logical(op, l, r),
            ),
        ));

        let conditional = operators
            .boxed()
            .then(
                just(Token::Question)
                    .ignore_then(assignment.clone())
                    .then_ignore(just(Token::Colon))
                    .then(assignment.clone())
                    .or_not(),
            )
            .map(|(test, branches)| match branches {
                Some((consequent, alternate)) => Expr::Conditional {
                    test: Box::new(test),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                },
                None => test,
            });

        let assign_op = select! {
            Token::Assign => AssignOp::Assign,
            Token::PlusAssign => AssignOp::Compound(BinaryOp::Add),
            Token::MinusAssign => AssignOp::Compound(BinaryOp::Sub),
            Token::StarAssign => AssignOp::Compound(BinaryOp::Mul),
            Token::SlashAssign => AssignOp::Compound(BinaryOp::Div),
        };
        let assign = conditional
            .then(assign_op.then(assignment.clone()).or_not())
            .try_map(|(target, value), span| match value {
                None => Ok(target),
                Some((op, value)) if target.is_assignable() => Ok(Expr::Assign {
                    op,
                    target: Box::new(target),
                    value: Box::new(value),
                }),
                Some(_) => Err(Rich::custom(
                    span,
                    format!("cannot assign to {}", target.describe()),
                )),
            });

        let params = choice((
            identifier.clone().map(|name| vec![name]),
            identifier
                .separated_by(comma)
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(paren_open, paren_close),
        ));
        let statement = choice((
            select! { Token::Ident("return") => () }
                .ignore_then(assignment.clone().or_not())
                .map(Statement::Return),
            assignment.clone().map(Statement::Expr),
        ));
        let block = statement
            .separated_by(just(Token::Semi).repeated().at_least(1))
            .allow_leading()
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(brace_open, brace_close)
            .map(ArrowBody::Block);
        let arrow = params
            .then_ignore(just(Token::Arrow))
            .then(choice((block, assignment.map(ArrowBody::Expr))))
            .map(|(params, body)| Expr::Arrow(Rc::new(ArrowFunction { params, body })));

        choice((arrow, assign))
    });

    assignment
        .separated_by(just(Token::Semi))
        .at_least(1)
        .allow_trailing()
        .collect::<Vec<_>>()
        .map(|mut items| {
            if items.len() == 1 {
                items.remove(0)
            } else {
                Expr::Sequence(items)
            }
        })
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn update<'src>(
    op: UpdateOp,
    prefix: bool,
    target: Expr,
    span: Span,
) -> Result<Expr, SyntaxError<'src>> {
    if !target.is_assignable() {
        return Err(Rich::custom(
            span,
            format!("cannot update {}", target.describe()),
        ));
    }
    Ok(Expr::Update {
        op,
        prefix,
        target: Box::new(target),
    })
}

/// Refuse input nested deeper than [`MAX_NESTING`] before the recursive
/// grammar sees it.
///
/// Brackets nest, and so do the operators whose right side is parsed
/// recursively: prefix operators, `?`, `=>` and assignments. A `,` or `;`
/// ends the operators of the current bracket.
fn check_nesting(tokens: &[Spanned<Token<'_>>]) -> Result<(), ParseError> {
    // Right-nested operators open within each bracket, innermost last
    let mut open = vec![0_usize];
    let mut depth = 0_usize;
    let mut previous: Option<&Token<'_>> = None;

    for Spanned { node, span } in tokens {
        let prefix_position = previous.map_or(true, |token| !token.ends_operand());
        match node {
            Token::ParenOpen | Token::BracketOpen | Token::BraceOpen => {
                open.push(0);
                depth += 1;
            }
            Token::ParenClose | Token::BracketClose | Token::BraceClose if open.len() > 1 => {
                let operators = open.pop().unwrap_or_default();
                depth -= operators + 1;
            }
            Token::Comma | Token::Semi => {
                if let Some(operators) = open.last_mut() {
                    depth -= *operators;
                    *operators = 0;
                }
            }
            Token::Question
            | Token::Arrow
            | Token::Assign
            | Token::PlusAssign
            | Token::MinusAssign
            | Token::StarAssign
            | Token::SlashAssign => nest(&mut open, &mut depth),
            Token::Bang
            | Token::Plus
            | Token::Minus
            | Token::PlusPlus
            | Token::MinusMinus
            | Token::Ident("typeof")
                if prefix_position =>
            {
                nest(&mut open, &mut depth)
            }
            _ => {}
        }
        if depth > MAX_NESTING {
            return Err(ParseError::new(
                format!("expression nests deeper than {MAX_NESTING} levels"),
                span.start,
            ));
        }
        previous = Some(node);
    }
    Ok(())
}

fn nest(open: &mut [usize], depth: &mut usize) {
    if let Some(operators) = open.last_mut() {
        *operators += 1;
        *depth += 1;
    }
}
