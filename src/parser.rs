//! Textual syntax for terms.
//!
//! ```text
//! formula := conj ('||' conj)*
//! conj    := cmp ('&&' cmp)*
//! cmp     := bitor (('==' | '!=' | '<u' | '<=u' | '<s' | '<=s') bitor)?
//! bitor   := bitxor ('|' bitxor)*
//! bitxor  := bitand ('^' bitand)*
//! bitand  := shift ('&' shift)*
//! shift   := sum (('<<' | '>>') sum)*
//! sum     := prod (('+' | '-') prod)*
//! prod    := unary (('*' | '/' | '%') unary)*
//! unary   := ('-' | '~' | '!') unary | atom
//! atom    := NUMBER | 'true' | 'false' | IDENT
//!          | '%' IDENT ('{' NUMBER ';' NUMBER '}')?
//!          | '[' formula ']' | '(' formula ')'
//! ```
//!
//! Numbers are decimal or `0x`-prefixed hexadecimal. Identifiers denote
//! variables, `%name` denotes a register and `%name{offset;size}` a bit
//! slice of it.
//!
//! ```
//! use microslice::parser::parse_term;
//! use microslice::term::Terms;
//!
//! let terms = Terms::default();
//! let t = parse_term(&terms, "[%sp + 8] == %eax{0;8}").unwrap();
//! assert_eq!(terms.pretty(t), "([(%sp + 8)] == %eax{0;8})");
//! ```

use crate::error::{Error, Result};
use crate::reference::TermRef;
use crate::term::{BinaryOp, Terms, UnaryOp};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Num(u64),
    Ident(String),
    Op(&'static str),
}

const OPERATORS: &[&str] = &[
    "<=u", "<=s", "||", "&&", "==", "!=", "<<", ">>", "<u", "<s", "+", "-", "*", "/", "%", "&", "|", "^", "~", "!", "(",
    ")", "[", "]", "{", "}", ";",
];

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let literal = &text[start..i];
            let value = if let Some(hex) = literal.strip_prefix("0x").or_else(|| literal.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16)
            } else {
                literal.parse::<u64>()
            };
            let value = value.map_err(|_| Error::Parse {
                position: start,
                message: format!("invalid number `{}`", literal),
            })?;
            tokens.push((start, Token::Num(value)));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.') {
                i += 1;
            }
            tokens.push((start, Token::Ident(text[start..i].to_string())));
            continue;
        }

        match OPERATORS.iter().find(|op| text[i..].starts_with(**op)) {
            Some(op) => {
                tokens.push((i, Token::Op(op)));
                i += op.len();
            }
            None => {
                return Err(Error::Parse {
                    position: i,
                    message: format!("unexpected character `{}`", &text[i..].chars().next().unwrap_or('?')),
                })
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    terms: &'a Terms,
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(Error::Parse {
            position: self.offset(),
            message: message.into(),
        })
    }

    fn eat(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, op: &str) -> Result<()> {
        if self.eat(op) {
            Ok(())
        } else {
            self.error(format!("expected `{}`", op))
        }
    }

    /// Parse a left-associative chain of binary operators.
    fn chain(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<TermRef>,
    ) -> Result<TermRef> {
        let mut lhs = next(self)?;
        'outer: loop {
            for &(sym, op) in ops {
                if self.eat(sym) {
                    let rhs = next(self)?;
                    lhs = self.terms.mk_binary(op, lhs, rhs);
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn formula(&mut self) -> Result<TermRef> {
        let mut operands = vec![self.conj()?];
        while self.eat("||") {
            operands.push(self.conj()?);
        }
        Ok(if operands.len() == 1 {
            operands[0]
        } else {
            self.terms.mk_or(operands)
        })
    }

    fn conj(&mut self) -> Result<TermRef> {
        let mut operands = vec![self.cmp()?];
        while self.eat("&&") {
            operands.push(self.cmp()?);
        }
        Ok(if operands.len() == 1 {
            operands[0]
        } else {
            self.terms.mk_and(operands)
        })
    }

    fn cmp(&mut self) -> Result<TermRef> {
        let lhs = self.bitor()?;
        if self.eat("==") {
            let rhs = self.bitor()?;
            return Ok(self.terms.mk_eq(lhs, rhs));
        }
        if self.eat("!=") {
            let rhs = self.bitor()?;
            return Ok(self.terms.mk_not(self.terms.mk_eq(lhs, rhs)));
        }
        for (sym, op) in [
            ("<=u", BinaryOp::LeU),
            ("<=s", BinaryOp::LeS),
            ("<u", BinaryOp::LtU),
            ("<s", BinaryOp::LtS),
        ] {
            if self.eat(sym) {
                let rhs = self.bitor()?;
                return Ok(self.terms.mk_binary(op, lhs, rhs));
            }
        }
        Ok(lhs)
    }

    fn bitor(&mut self) -> Result<TermRef> {
        self.chain(&[("|", BinaryOp::Or)], Self::bitxor)
    }

    fn bitxor(&mut self) -> Result<TermRef> {
        self.chain(&[("^", BinaryOp::Xor)], Self::bitand)
    }

    fn bitand(&mut self) -> Result<TermRef> {
        self.chain(&[("&", BinaryOp::And)], Self::shift)
    }

    fn shift(&mut self) -> Result<TermRef> {
        self.chain(&[("<<", BinaryOp::Shl), (">>", BinaryOp::Shr)], Self::sum)
    }

    fn sum(&mut self) -> Result<TermRef> {
        self.chain(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Self::prod)
    }

    fn prod(&mut self) -> Result<TermRef> {
        self.chain(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::UDiv), ("%", BinaryOp::UMod)],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<TermRef> {
        if self.eat("-") {
            let a = self.unary()?;
            return Ok(self.terms.mk_unary(UnaryOp::Neg, a));
        }
        if self.eat("~") {
            let a = self.unary()?;
            return Ok(self.terms.mk_unary(UnaryOp::Not, a));
        }
        if self.eat("!") {
            let a = self.unary()?;
            return Ok(self.terms.mk_not(a));
        }
        self.atom()
    }

    fn number(&mut self) -> Result<u64> {
        match self.peek() {
            Some(&Token::Num(n)) => {
                self.pos += 1;
                Ok(n)
            }
            _ => self.error("expected a number"),
        }
    }

    fn atom(&mut self) -> Result<TermRef> {
        match self.peek().cloned() {
            Some(Token::Num(n)) => {
                self.pos += 1;
                Ok(self.terms.mk_const(n))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(match name.as_str() {
                    "true" => self.terms.mk_true(),
                    "false" => self.terms.mk_false(),
                    _ => self.terms.mk_var(&name),
                })
            }
            Some(Token::Op("%")) => {
                self.pos += 1;
                let name = match self.peek().cloned() {
                    Some(Token::Ident(name)) => name,
                    _ => return self.error("expected a register name after `%`"),
                };
                self.pos += 1;
                if self.eat("{") {
                    let offset = self.number()?;
                    self.expect(";")?;
                    let size = self.number()?;
                    self.expect("}")?;
                    if offset > u16::MAX as u64 || size == 0 || size > u16::MAX as u64 {
                        return self.error("invalid register slice");
                    }
                    Ok(self.terms.mk_register_slice(&name, offset as u16, size as u16))
                } else {
                    Ok(self.terms.mk_register(&name))
                }
            }
            Some(Token::Op("[")) => {
                self.pos += 1;
                let addr = self.formula()?;
                self.expect("]")?;
                Ok(self.terms.mk_memcell(addr))
            }
            Some(Token::Op("(")) => {
                self.pos += 1;
                let t = self.formula()?;
                self.expect(")")?;
                Ok(t)
            }
            Some(_) => self.error("unexpected token"),
            None => self.error("unexpected end of input"),
        }
    }
}

/// Parse a term (expression or formula).
pub fn parse_term(terms: &Terms, text: &str) -> Result<TermRef> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        terms,
        tokens,
        pos: 0,
        end: text.len(),
    };
    let t = parser.formula()?;
    if parser.pos < parser.tokens.len() {
        return parser.error("trailing input");
    }
    Ok(t)
}

/// Parse a term that must denote an lvalue (register or memory cell).
pub fn parse_lvalue(terms: &Terms, text: &str) -> Result<TermRef> {
    let t = parse_term(terms, text)?;
    if terms.is_lvalue(t) {
        Ok(t)
    } else {
        Err(Error::NotAnLvalue(text.trim().to_string()))
    }
}
