use std::fmt;

/// A source location: zero-based line and position within the line.
///
/// Both counters start at zero to match the diagnostics of the reference
/// runtime tooling; the first character of a file is `Line 0, Position 0`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Loc {
    pub line: u32,
    pub pos: u32,
}

impl Loc {
    pub fn new(line: u32, pos: u32) -> Loc {
        Loc { line, pos }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}, Position {}", self.line, self.pos)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// The raw source text of the token. Strings keep their quotes.
    pub text: String,
    pub loc: Loc,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, loc: Loc) -> Token {
        Token {
            kind,
            text: text.into(),
            loc,
        }
    }

    /// The END_OF_FILE sentinel terminating every token stream.
    pub fn eof() -> Token {
        Token::new(TokenKind::EndOfFile, "", Loc::default())
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::EndOfFile
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Array,
    Assert,
    Bool,
    Else,
    False,
    Float,
    Fn,
    If,
    Image,
    Int,
    Let,
    Print,
    Read,
    Return,
    Show,
    Sum,
    Then,
    Time,
    To,
    True,
    Type,
    Write,

    Colon,
    LCurly,
    RCurly,
    LParen,
    RParen,
    Comma,
    LSquare,
    RSquare,
    Equals,

    /// One of `== != <= >= < > + - * / % && || !`.
    Op,

    StringVal,
    IntVal,
    FloatVal,
    Variable,

    Newline,
    EndOfFile,
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "array" => TokenKind::Array,
    "assert" => TokenKind::Assert,
    "bool" => TokenKind::Bool,
    "else" => TokenKind::Else,
    "false" => TokenKind::False,
    "float" => TokenKind::Float,
    "fn" => TokenKind::Fn,
    "if" => TokenKind::If,
    "image" => TokenKind::Image,
    "int" => TokenKind::Int,
    "let" => TokenKind::Let,
    "print" => TokenKind::Print,
    "read" => TokenKind::Read,
    "return" => TokenKind::Return,
    "show" => TokenKind::Show,
    "sum" => TokenKind::Sum,
    "then" => TokenKind::Then,
    "time" => TokenKind::Time,
    "to" => TokenKind::To,
    "true" => TokenKind::True,
    "type" => TokenKind::Type,
    "write" => TokenKind::Write,
};

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        let name = match self {
            Array => "ARRAY",
            Assert => "ASSERT",
            Bool => "BOOL",
            Else => "ELSE",
            False => "FALSE",
            Float => "FLOAT",
            Fn => "FN",
            If => "IF",
            Image => "IMAGE",
            Int => "INT",
            Let => "LET",
            Print => "PRINT",
            Read => "READ",
            Return => "RETURN",
            Show => "SHOW",
            Sum => "SUM",
            Then => "THEN",
            Time => "TIME",
            To => "TO",
            True => "TRUE",
            Type => "TYPE",
            Write => "WRITE",
            Colon => "COLON",
            LCurly => "LCURLY",
            RCurly => "RCURLY",
            LParen => "LPAREN",
            RParen => "RPAREN",
            Comma => "COMMA",
            LSquare => "LSQUARE",
            RSquare => "RSQUARE",
            Equals => "EQUALS",
            Op => "OP",
            StringVal => "STRING",
            IntVal => "INTVAL",
            FloatVal => "FLOATVAL",
            Variable => "VARIABLE",
            Newline => "NEWLINE",
            EndOfFile => "END_OF_FILE",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Token {
    /// The `-l` dump format: `KIND 'text'`, except for the textless kinds.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Newline | TokenKind::EndOfFile => write!(f, "{}", self.kind),
            _ => write!(f, "{} '{}'", self.kind, self.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keyword_table_covers_every_keyword_kind() {
        assert_eq!(KEYWORDS.len(), 22);
        for (text, kind) in KEYWORDS.entries() {
            assert_eq!(kind.to_string(), text.to_ascii_uppercase());
        }
    }

    #[test]
    fn token_display() {
        let t = Token::new(TokenKind::IntVal, "42", Loc::new(1, 4));
        assert_eq!(t.to_string(), "INTVAL '42'");
        assert_eq!(Token::eof().to_string(), "END_OF_FILE");
        let nl = Token::new(TokenKind::Newline, "\n", Loc::new(0, 7));
        assert_eq!(nl.to_string(), "NEWLINE");
    }
}
