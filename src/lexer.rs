use std::fmt;

use crate::token::{Loc, Token, TokenKind, KEYWORDS};

type Result<T, E = Error> = std::result::Result<T, E>;

/// The JPL lexer.
///
/// ## Implementation Remarks
///
/// This type implements [`Iterator`], so the driver can walk the tokens
/// without collecting them when it only wants to print them (`-l`). The
/// iterator yields the END_OF_FILE token once and then terminates; after the
/// first error it also terminates.
///
/// Consecutive whitespace, comments and line continuations are consumed in
/// one run; if the run contained a real line break, a single NEWLINE token is
/// produced for the whole run.
pub struct Lexer<'src> {
    src: &'src [u8],
    cursor: usize,
    loc: Loc,
    done: bool,
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.scan_next();
        match &item {
            Ok(token) if token.is_eof() => self.done = true,
            Err(_) => self.done = true,
            Ok(_) => {}
        }
        Some(item)
    }
}

/// Runs the lexer over the whole input, producing the token list terminated
/// by END_OF_FILE, or the first error.
pub fn lex_all(src: &str) -> Result<Vec<Token>> {
    Lexer::new(src).collect()
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Lexer<'src> {
        Lexer {
            src: src.as_bytes(),
            cursor: 0,
            loc: Loc::default(),
            done: false,
        }
    }

    fn scan_next(&mut self) -> Result<Token> {
        if let Some(newline) = self.scan_whitespace()? {
            return Ok(newline);
        }
        if self.peek().is_none() {
            return Ok(Token::eof());
        }
        self.scan_token()
    }

    /// Consumes spaces, comments, line continuations and newlines. Returns a
    /// single NEWLINE token if the run contained a real line break.
    fn scan_whitespace(&mut self) -> Result<Option<Token>> {
        let start = self.loc;
        let mut saw_newline = false;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(b' '), _) => {
                    self.advance()?;
                }
                (Some(b'\\'), Some(b'\n')) => {
                    self.advance()?;
                    self.advance()?;
                }
                (Some(b'\n'), _) => {
                    self.advance()?;
                    saw_newline = true;
                }
                (Some(b'/'), Some(b'/')) => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.advance()?;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    self.advance()?;
                    self.advance()?;
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.advance()?;
                                self.advance()?;
                                break;
                            }
                            (Some(b'\n'), _) => {
                                self.advance()?;
                                saw_newline = true;
                            }
                            (Some(_), _) => {
                                self.advance()?;
                            }
                            (None, _) => {
                                return Err(self.error_here(ErrorKind::UnclosedComment));
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(saw_newline.then(|| Token::new(TokenKind::Newline, "\n", start)))
    }

    fn scan_token(&mut self) -> Result<Token> {
        use TokenKind::*;
        let start = self.loc;
        let lo = self.cursor;
        let c = self.peek().expect("caller checked for end of input");
        let kind = match c {
            b'0'..=b'9' | b'.' => return self.scan_number(start),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => return self.scan_word(start),
            b'"' => return self.scan_string(start),
            b':' => self.advance_with(Colon)?,
            b',' => self.advance_with(Comma)?,
            b'(' => self.advance_with(LParen)?,
            b')' => self.advance_with(RParen)?,
            b'[' => self.advance_with(LSquare)?,
            b']' => self.advance_with(RSquare)?,
            b'{' => self.advance_with(LCurly)?,
            b'}' => self.advance_with(RCurly)?,
            b'=' => {
                self.advance()?;
                if self.peek() == Some(b'=') {
                    self.advance_with(Op)?
                } else {
                    Equals
                }
            }
            b'<' | b'>' => {
                self.advance()?;
                if self.peek() == Some(b'=') {
                    self.advance()?;
                }
                Op
            }
            b'!' => {
                self.advance()?;
                if self.peek() == Some(b'=') {
                    self.advance()?;
                }
                Op
            }
            b'+' | b'-' | b'/' | b'%' => self.advance_with(Op)?,
            b'*' => {
                // A bare `*/` is a stray comment terminator, not an operator.
                if self.peek_at(1) == Some(b'/') {
                    return Err(self.error_here(ErrorKind::UnexpectedChar('*')));
                }
                self.advance_with(Op)?
            }
            b'&' => {
                self.advance()?;
                if self.peek() != Some(b'&') {
                    return Err(self.error_here(ErrorKind::UnexpectedChar('&')));
                }
                self.advance_with(Op)?
            }
            b'|' => {
                self.advance()?;
                if self.peek() != Some(b'|') {
                    return Err(self.error_here(ErrorKind::UnexpectedChar('|')));
                }
                self.advance_with(Op)?
            }
            other if other != b'\n' && !(0x20..=0x7e).contains(&other) => {
                return Err(self.error_here(ErrorKind::UnsupportedChar(other as char)))
            }
            other => return Err(self.error_here(ErrorKind::UnexpectedChar(other as char))),
        };
        Ok(self.produce(kind, lo, start))
    }

    /// Integer and float literals. Floats are `digits . digits?` or
    /// `. digits`; an integer is digits not followed by a dot.
    fn scan_number(&mut self, start: Loc) -> Result<Token> {
        let lo = self.cursor;
        let mut saw_int_part = false;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            saw_int_part = true;
            self.advance()?;
        }
        if self.peek() == Some(b'.') {
            self.advance()?;
            let mut saw_frac_part = false;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                saw_frac_part = true;
                self.advance()?;
            }
            if !saw_int_part && !saw_frac_part {
                return Err(self.error_here(ErrorKind::UnexpectedChar('.')));
            }
            return Ok(self.produce(TokenKind::FloatVal, lo, start));
        }
        debug_assert!(saw_int_part);
        Ok(self.produce(TokenKind::IntVal, lo, start))
    }

    /// Keywords and identifiers. A keyword is only recognized when not
    /// followed by `[A-Za-z0-9_]`; identifier continuation additionally
    /// admits dots, so `int.x` lexes as INT while `in.x` is one identifier.
    fn scan_word(&mut self, start: Loc) -> Result<Token> {
        let lo = self.cursor;
        while matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')) {
            self.advance()?;
        }
        let word = &self.src[lo..self.cursor];
        if let Some(&kind) = KEYWORDS.get(std::str::from_utf8(word).unwrap()) {
            return Ok(self.produce(kind, lo, start));
        }
        while matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'.')
        ) {
            self.advance()?;
        }
        Ok(self.produce(TokenKind::Variable, lo, start))
    }

    /// Double-quoted strings; no line breaks or embedded quotes. The token
    /// text keeps the surrounding quotes.
    fn scan_string(&mut self, start: Loc) -> Result<Token> {
        let lo = self.cursor;
        self.advance()?;
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.advance()?;
                    return Ok(self.produce(TokenKind::StringVal, lo, start));
                }
                Some(b'\n') | None => {
                    return Err(Error {
                        kind: ErrorKind::UnclosedString,
                        loc: start,
                        context: self.context_from(lo),
                    });
                }
                Some(_) => {
                    self.advance()?;
                }
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.src.get(self.cursor + n).copied()
    }

    /// Consumes one byte, rejecting anything outside newline plus printable
    /// 7-bit ASCII, and keeps the line/position counters current.
    fn advance(&mut self) -> Result<u8> {
        let c = self.src[self.cursor];
        if c != b'\n' && !(0x20..=0x7e).contains(&c) {
            return Err(self.error_here(ErrorKind::UnsupportedChar(c as char)));
        }
        self.cursor += 1;
        if c == b'\n' {
            self.loc.line += 1;
            self.loc.pos = 0;
        } else {
            self.loc.pos += 1;
        }
        Ok(c)
    }

    fn advance_with(&mut self, kind: TokenKind) -> Result<TokenKind> {
        self.advance()?;
        Ok(kind)
    }

    fn produce(&self, kind: TokenKind, lo: usize, loc: Loc) -> Token {
        let text = std::str::from_utf8(&self.src[lo..self.cursor]).unwrap();
        Token::new(kind, text, loc)
    }

    fn error_here(&self, kind: ErrorKind) -> Error {
        Error {
            kind,
            loc: self.loc,
            context: self.context_from(self.cursor),
        }
    }

    /// The upcoming source chunk up to the next space or newline, quoted in
    /// diagnostics.
    fn context_from(&self, from: usize) -> String {
        self.src[from..]
            .iter()
            .take_while(|&&c| c != b' ' && c != b'\n')
            .map(|&c| c as char)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub loc: Loc,
    pub context: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedChar(char),
    UnexpectedChar(char),
    UnclosedString,
    UnclosedComment,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\nEncountered Error at Lexing Step. {}, Token \"{}\".\n{}",
            self.loc, self.context, self.kind
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::UnsupportedChar(c) => {
                write!(f, "Character {c:?} is not supported JPL source text.")
            }
            ErrorKind::UnexpectedChar(c) => {
                write!(f, "Could not recognize token starting with {c:?}.")
            }
            ErrorKind::UnclosedString => write!(f, "String literal is never closed."),
            ErrorKind::UnclosedComment => write!(f, "Block comment is never closed."),
        }
    }
}
