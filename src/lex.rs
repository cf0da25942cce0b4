//! Reference lexers.
//!
//! [`StringLexer`] tokenizes a byte string of shell source, honouring the
//! parser's mode flags: reserved words only at command position, grouping
//! parentheses inside `[[ … ]]`, glob parentheses in case patterns and
//! conditional operands, expression sections in a `for (( … ))` header.
//! Unquoted characters that matter later (globs, expansions, pattern
//! bars) are mapped to the marker bytes of [`crate::token::chars`];
//! quoting keeps them plain. No alias expansion is performed; the flag is
//! only recorded.
//!
//! [`TestLexer`] feeds the conditional grammar from an argument vector,
//! the way the `test` builtin is parsed.

use crate::instructions::RedirType;
use crate::token::{chars, untokenize, Lexer, Modes, Tok, Token};

const KEYWORDS: &[(&[u8], Tok)] = &[
    (b"if", Tok::If),
    (b"then", Tok::Then),
    (b"elif", Tok::Elif),
    (b"else", Tok::Else),
    (b"fi", Tok::Fi),
    (b"for", Tok::For),
    (b"foreach", Tok::Foreach),
    (b"select", Tok::Select),
    (b"while", Tok::While),
    (b"until", Tok::Until),
    (b"do", Tok::Do),
    (b"done", Tok::Done),
    (b"repeat", Tok::Repeat),
    (b"case", Tok::Case),
    (b"esac", Tok::Esac),
    (b"function", Tok::Func),
    (b"time", Tok::Time),
    (b"coproc", Tok::Coproc),
    (b"nocorrect", Tok::NoCorrect),
    (b"end", Tok::ZEnd),
];

fn keyword(w: &[u8]) -> Option<Tok> {
    KEYWORDS.iter().find(|(k, _)| *k == w).map(|&(_, t)| t)
}

// Position of the `=` ending a valid assignment prefix, allowing one
// balanced subscript in the name.
fn env_assign_pos(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < buf.len() && (buf[i] == b'_' || buf[i].is_ascii_alphanumeric()) {
        i += 1;
    }
    if i == 0 || buf[0].is_ascii_digit() {
        return None;
    }
    if i < buf.len() && buf[i] == chars::INBRACK {
        let mut depth = 0i32;
        while i < buf.len() {
            if buf[i] == chars::INBRACK {
                depth += 1;
            } else if buf[i] == chars::OUTBRACK {
                depth -= 1;
                if depth == 0 {
                    i += 1;
                    break;
                }
            }
            i += 1;
        }
        if depth != 0 {
            return None;
        }
    }
    if i < buf.len() && buf[i] == b'=' {
        Some(i)
    } else {
        None
    }
}

pub struct StringLexer<'s> {
    src: &'s [u8],
    pos: usize,
    line: u32,
    aliases: bool,
    arith_for: bool,
}

impl<'s> StringLexer<'s> {
    pub fn new(src: &'s [u8], aliases: bool) -> StringLexer<'s> {
        StringLexer {
            src,
            pos: 0,
            line: 1,
            aliases,
            arith_for: false,
        }
    }

    /// Whether aliases would be expanded. The reference lexer records the
    /// flag without acting on it.
    pub fn aliases(&self) -> bool {
        self.aliases
    }

    fn peek(&self, n: usize) -> Option<u8> {
        self.src.get(self.pos + n).copied()
    }

    fn delim_after(&self, n: usize) -> bool {
        match self.peek(n) {
            None => true,
            Some(c) => matches!(
                c,
                b' ' | b'\t' | b'\n' | b';' | b'&' | b'|' | b'(' | b')' | b'<' | b'>'
            ),
        }
    }

    fn skip_blanks(&mut self) {
        loop {
            match self.peek(0) {
                Some(b' ') | Some(b'\t') => self.pos += 1,
                Some(b'\\') if self.peek(1) == Some(b'\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                Some(b'#') => {
                    while self.peek(0).map_or(false, |c| c != b'\n') {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    // One section of a `for (( a; b; c ))` header: everything up to the
    // next top-level `;` (DInPar) or the closing `))` (DOutPar).
    fn arith_for_section(&mut self) -> Token {
        let mut t = Token::new(Tok::LexErr);
        t.line = self.line;
        let mut buf = Vec::new();
        let mut depth = 0i32;
        while matches!(self.peek(0), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
        loop {
            let c = match self.peek(0) {
                Some(c) => c,
                None => {
                    self.arith_for = false;
                    return t;
                }
            };
            if depth == 0 && c == b';' {
                self.pos += 1;
                t.tok = Tok::DInPar;
                break;
            }
            if depth == 0 && c == b')' {
                if self.peek(1) == Some(b')') {
                    self.pos += 2;
                    self.arith_for = false;
                    t.tok = Tok::DOutPar;
                    break;
                }
                self.arith_for = false;
                return t;
            }
            if c == b'(' {
                depth += 1;
            } else if c == b')' {
                depth -= 1;
            } else if c == b'\n' {
                self.line += 1;
            }
            buf.push(c);
            self.pos += 1;
        }
        t.text = buf;
        t
    }

    // The expression of a plain `(( … ))`, cursor just past the second
    // opening paren. None when unbalanced.
    fn scan_arith(&mut self) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        let mut depth = 2i32;
        loop {
            let c = self.peek(0)?;
            self.pos += 1;
            if c == b'(' {
                depth += 1;
            } else if c == b')' {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            } else if c == b'\n' {
                self.line += 1;
            }
            buf.push(c);
        }
        while matches!(buf.last(), Some(b' ') | Some(b'\t')) {
            buf.pop();
        }
        if buf.last() == Some(&b')') {
            buf.pop();
            Some(buf)
        } else {
            None
        }
    }

    fn lex_open_paren(&mut self, modes: &Modes, mut t: Token) -> Token {
        // In a case pattern or a conditional operand the paren globs: it
        // opens a pattern word instead of grouping.
        if modes.incasepat || modes.incond >= 2 {
            return self.lex_word(modes, t);
        }
        self.pos += 1;
        let mut j = 0;
        while matches!(self.peek(j), Some(b' ') | Some(b'\t')) {
            j += 1;
        }
        if self.peek(j) == Some(b')') {
            self.pos += j + 1;
            t.tok = Tok::InOutPar;
            return t;
        }
        if (modes.incmdpos || modes.infor) && self.peek(0) == Some(b'(') {
            self.pos += 1;
            if modes.infor {
                self.arith_for = true;
                t.tok = Tok::DInPar;
                return t;
            }
            match self.scan_arith() {
                Some(text) => {
                    t.tok = Tok::DInPar;
                    t.text = text;
                }
                None => t.tok = Tok::LexErr,
            }
            return t;
        }
        t.tok = Tok::InPar;
        t
    }

    // &> &>| &>> &>>| — cursor just past "&>".
    fn err_redir(&mut self) -> RedirType {
        match self.peek(0) {
            Some(b'>') => {
                self.pos += 1;
                match self.peek(0) {
                    Some(b'|') | Some(b'!') => {
                        self.pos += 1;
                        RedirType::ErrAppNow
                    }
                    _ => RedirType::ErrApp,
                }
            }
            Some(b'|') | Some(b'!') => {
                self.pos += 1;
                RedirType::ErrWriteNow
            }
            _ => RedirType::ErrWrite,
        }
    }

    fn lex_redir(&mut self, mut t: Token, fd: i32) -> Token {
        let c = self.src[self.pos];
        self.pos += 1;
        let ty = if c == b'<' {
            match self.peek(0) {
                Some(b'<') => {
                    self.pos += 1;
                    match self.peek(0) {
                        Some(b'-') => {
                            self.pos += 1;
                            RedirType::HeredocDash
                        }
                        Some(b'<') => {
                            self.pos += 1;
                            RedirType::HereStr
                        }
                        _ => RedirType::Heredoc,
                    }
                }
                Some(b'>') => {
                    self.pos += 1;
                    RedirType::ReadWrite
                }
                Some(b'&') => {
                    self.pos += 1;
                    RedirType::MergeIn
                }
                _ => RedirType::Read,
            }
        } else {
            match self.peek(0) {
                Some(b'>') => {
                    self.pos += 1;
                    match self.peek(0) {
                        Some(b'|') | Some(b'!') => {
                            self.pos += 1;
                            RedirType::AppNow
                        }
                        _ => RedirType::App,
                    }
                }
                Some(b'&') => {
                    self.pos += 1;
                    RedirType::MergeOut
                }
                Some(b'|') | Some(b'!') => {
                    self.pos += 1;
                    RedirType::WriteNow
                }
                _ => RedirType::Write,
            }
        };
        t.tok = Tok::Redir(ty);
        t.fd = fd;
        t
    }

    fn copy_quoted_raw(&mut self, q: u8, buf: &mut Vec<u8>) -> bool {
        loop {
            let c = match self.peek(0) {
                Some(c) => c,
                None => return false,
            };
            self.pos += 1;
            buf.push(c);
            if c == b'\n' {
                self.line += 1;
            }
            if c == q {
                return true;
            }
            if c == b'\\' && q == b'"' {
                if let Some(n) = self.peek(0) {
                    buf.push(n);
                    self.pos += 1;
                    if n == b'\n' {
                        self.line += 1;
                    }
                }
            }
        }
    }

    // Copies a balanced `(…)` or `{…}` span, marking only the outer pair.
    fn copy_balanced(&mut self, open: u8, close: u8, so: u8, sc: u8, buf: &mut Vec<u8>) -> bool {
        buf.push(so);
        self.pos += 1;
        let mut depth = 1i32;
        loop {
            let c = match self.peek(0) {
                Some(c) => c,
                None => return false,
            };
            self.pos += 1;
            if c == close {
                depth -= 1;
                if depth == 0 {
                    buf.push(sc);
                    return true;
                }
                buf.push(c);
            } else if c == open {
                depth += 1;
                buf.push(c);
            } else if c == b'\\' {
                buf.push(c);
                if let Some(n) = self.peek(0) {
                    buf.push(n);
                    self.pos += 1;
                    if n == b'\n' {
                        self.line += 1;
                    }
                }
            } else if c == b'\'' || c == b'"' {
                buf.push(c);
                if !self.copy_quoted_raw(c, buf) {
                    return false;
                }
            } else {
                if c == b'\n' {
                    self.line += 1;
                }
                buf.push(c);
            }
        }
    }

    fn lex_dollar(&mut self, buf: &mut Vec<u8>) -> bool {
        buf.push(chars::DOLLAR);
        self.pos += 1;
        match self.peek(0) {
            Some(b'(') => self.copy_balanced(b'(', b')', chars::INPAR, chars::OUTPAR, buf),
            Some(b'{') => self.copy_balanced(b'{', b'}', chars::INBRACE, chars::OUTBRACE, buf),
            _ => true,
        }
    }

    fn lex_tick(&mut self, buf: &mut Vec<u8>) -> bool {
        buf.push(chars::TICK);
        self.pos += 1;
        loop {
            let c = match self.peek(0) {
                Some(c) => c,
                None => return false,
            };
            self.pos += 1;
            match c {
                b'`' => {
                    buf.push(chars::TICK);
                    return true;
                }
                b'\\' => {
                    buf.push(c);
                    if let Some(n) = self.peek(0) {
                        buf.push(n);
                        self.pos += 1;
                        if n == b'\n' {
                            self.line += 1;
                        }
                    }
                }
                b'\n' => {
                    self.line += 1;
                    buf.push(c);
                }
                _ => buf.push(c),
            }
        }
    }

    fn lex_word(&mut self, modes: &Modes, mut t: Token) -> Token {
        let glob_parens = modes.incasepat || modes.incond >= 2;
        let mut buf = Vec::new();
        let mut quoted = false;
        let mut pardepth = 0i32;

        loop {
            let c = match self.peek(0) {
                Some(c) => c,
                None => break,
            };
            match c {
                b'\n' => break,
                b'<' | b'>' if self.peek(1) == Some(b'(') => {
                    buf.push(if c == b'<' { chars::INANG } else { chars::OUTANG });
                    self.pos += 1;
                    if !self.copy_balanced(b'(', b')', chars::INPAR, chars::OUTPAR, &mut buf) {
                        t.tok = Tok::LexErr;
                        t.text = buf;
                        return t;
                    }
                }
                b' ' | b'\t' | b';' | b'&' | b'|' | b')' | b'<' | b'>' if pardepth == 0 => {
                    break
                }
                b'(' if pardepth == 0 && !glob_parens => break,
                b'(' => {
                    buf.push(chars::INPAR);
                    pardepth += 1;
                    self.pos += 1;
                }
                b')' => {
                    buf.push(chars::OUTPAR);
                    pardepth -= 1;
                    self.pos += 1;
                }
                b'|' => {
                    buf.push(chars::BAR);
                    self.pos += 1;
                }
                b'\\' => {
                    self.pos += 1;
                    match self.peek(0) {
                        Some(b'\n') => {
                            self.pos += 1;
                            self.line += 1;
                        }
                        Some(n) => {
                            quoted = true;
                            buf.push(n);
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                b'\'' => {
                    quoted = true;
                    self.pos += 1;
                    loop {
                        match self.peek(0) {
                            Some(b'\'') => {
                                self.pos += 1;
                                break;
                            }
                            Some(n) => {
                                if n == b'\n' {
                                    self.line += 1;
                                }
                                buf.push(n);
                                self.pos += 1;
                            }
                            None => {
                                t.tok = Tok::LexErr;
                                t.text = buf;
                                return t;
                            }
                        }
                    }
                }
                b'"' => {
                    quoted = true;
                    self.pos += 1;
                    loop {
                        match self.peek(0) {
                            Some(b'"') => {
                                self.pos += 1;
                                break;
                            }
                            Some(b'\\') => {
                                self.pos += 1;
                                match self.peek(0) {
                                    Some(n @ b'"')
                                    | Some(n @ b'\\')
                                    | Some(n @ b'$')
                                    | Some(n @ b'`') => {
                                        buf.push(n);
                                        self.pos += 1;
                                    }
                                    Some(b'\n') => {
                                        self.pos += 1;
                                        self.line += 1;
                                    }
                                    Some(n) => {
                                        buf.push(b'\\');
                                        buf.push(n);
                                        self.pos += 1;
                                    }
                                    None => {
                                        t.tok = Tok::LexErr;
                                        t.text = buf;
                                        return t;
                                    }
                                }
                            }
                            Some(b'$') => {
                                if !self.lex_dollar(&mut buf) {
                                    t.tok = Tok::LexErr;
                                    t.text = buf;
                                    return t;
                                }
                            }
                            Some(b'`') => {
                                if !self.lex_tick(&mut buf) {
                                    t.tok = Tok::LexErr;
                                    t.text = buf;
                                    return t;
                                }
                            }
                            Some(n) => {
                                if n == b'\n' {
                                    self.line += 1;
                                }
                                buf.push(n);
                                self.pos += 1;
                            }
                            None => {
                                t.tok = Tok::LexErr;
                                t.text = buf;
                                return t;
                            }
                        }
                    }
                }
                b'$' => {
                    if !self.lex_dollar(&mut buf) {
                        t.tok = Tok::LexErr;
                        t.text = buf;
                        return t;
                    }
                }
                b'`' => {
                    if !self.lex_tick(&mut buf) {
                        t.tok = Tok::LexErr;
                        t.text = buf;
                        return t;
                    }
                }
                b'*' => {
                    buf.push(chars::STAR);
                    self.pos += 1;
                }
                b'?' => {
                    buf.push(chars::QUEST);
                    self.pos += 1;
                }
                b'[' => {
                    buf.push(chars::INBRACK);
                    self.pos += 1;
                }
                b']' => {
                    buf.push(chars::OUTBRACK);
                    self.pos += 1;
                }
                b'~' => {
                    buf.push(chars::TILDE);
                    self.pos += 1;
                }
                b'^' => {
                    buf.push(chars::HAT);
                    self.pos += 1;
                }
                b'{' => {
                    buf.push(chars::INBRACE);
                    self.pos += 1;
                }
                b'}' => {
                    buf.push(chars::OUTBRACE);
                    self.pos += 1;
                }
                _ => {
                    buf.push(c);
                    self.pos += 1;
                }
            }
        }

        if modes.incmdpos && !quoted {
            if let Some(k) = keyword(&buf) {
                t.tok = k;
                t.text = buf;
                return t;
            }
            if let Some(eq) = env_assign_pos(&buf) {
                if eq + 1 == buf.len() && self.peek(0) == Some(b'(') {
                    self.pos += 1;
                    buf.truncate(eq);
                    t.tok = Tok::EnvArray;
                    t.text = buf;
                    return t;
                }
                t.tok = Tok::EnvString;
                t.text = buf;
                return t;
            }
        }
        t.tok = Tok::String;
        t.text = buf;
        t
    }
}

impl<'s> Lexer for StringLexer<'s> {
    fn next(&mut self, modes: &Modes) -> Token {
        if self.arith_for {
            return self.arith_for_section();
        }
        self.skip_blanks();
        let mut t = Token::new(Tok::EndInput);
        t.line = self.line;
        let start = self.pos;
        let c = match self.peek(0) {
            Some(c) => c,
            None => return t,
        };

        if modes.incond >= 1 && c == b']' && self.peek(1) == Some(b']') && self.delim_after(2) {
            self.pos += 2;
            t.tok = Tok::DOutBrack;
            t.text = b"]]".to_vec();
            return t;
        }
        if modes.incond == 1 {
            match c {
                b'<' => {
                    self.pos += 1;
                    t.tok = Tok::InAng;
                    t.text = b"<".to_vec();
                    return t;
                }
                b'>' => {
                    self.pos += 1;
                    t.tok = Tok::OutAng;
                    t.text = b">".to_vec();
                    return t;
                }
                b'(' => {
                    self.pos += 1;
                    t.tok = Tok::InPar;
                    t.text = b"(".to_vec();
                    return t;
                }
                b')' => {
                    self.pos += 1;
                    t.tok = Tok::OutPar;
                    t.text = b")".to_vec();
                    return t;
                }
                _ => {}
            }
        }
        let mut t = match c {
            b'\n' => {
                self.pos += 1;
                self.line += 1;
                t.tok = Tok::Seper;
                t.newline = true;
                t
            }
            b';' => {
                self.pos += 1;
                match self.peek(0) {
                    Some(b';') => {
                        self.pos += 1;
                        t.tok = Tok::DSemi;
                    }
                    Some(b'&') => {
                        self.pos += 1;
                        t.tok = Tok::SemiAmp;
                    }
                    _ => t.tok = Tok::Seper,
                }
                t
            }
            b'&' => {
                self.pos += 1;
                match self.peek(0) {
                    Some(b'&') => {
                        self.pos += 1;
                        t.tok = Tok::DAmper;
                    }
                    Some(b'!') | Some(b'|') => {
                        self.pos += 1;
                        t.tok = Tok::AmperBang;
                    }
                    Some(b'>') => {
                        self.pos += 1;
                        t.tok = Tok::Redir(self.err_redir());
                    }
                    _ => t.tok = Tok::Amper,
                }
                t
            }
            b'|' => {
                self.pos += 1;
                match self.peek(0) {
                    Some(b'|') => {
                        self.pos += 1;
                        t.tok = Tok::DBar;
                    }
                    Some(b'&') => {
                        self.pos += 1;
                        t.tok = Tok::BarAmp;
                    }
                    _ => t.tok = Tok::Bar,
                }
                t
            }
            b'!' if (modes.incmdpos || modes.incond >= 1) && self.delim_after(1) => {
                self.pos += 1;
                t.tok = Tok::Bang;
                t
            }
            b'(' => self.lex_open_paren(modes, t),
            b')' => {
                self.pos += 1;
                t.tok = Tok::OutPar;
                t
            }
            b'{' if modes.incmdpos && self.delim_after(1) => {
                self.pos += 1;
                t.tok = Tok::InBrace;
                t
            }
            b'}' if (modes.incmdpos || modes.incasepat) && self.delim_after(1) => {
                self.pos += 1;
                t.tok = Tok::OutBrace;
                t
            }
            // process substitution: <(...) and >(...) are words
            b'<' | b'>' if self.peek(1) == Some(b'(') => self.lex_word(modes, t),
            b'[' if modes.incmdpos && self.peek(1) == Some(b'[') && self.delim_after(2) => {
                self.pos += 2;
                t.tok = Tok::DInBrack;
                t
            }
            b'<' | b'>' => self.lex_redir(t, -1),
            b'0'..=b'9' => {
                let mut i = 0;
                while self.peek(i).map_or(false, |c| c.is_ascii_digit()) {
                    i += 1;
                }
                match self.peek(i) {
                    Some(b'<') | Some(b'>') => {
                        let mut fd = 0i32;
                        for _ in 0..i {
                            fd = fd * 10 + (self.src[self.pos] - b'0') as i32;
                            self.pos += 1;
                        }
                        self.lex_redir(t, fd)
                    }
                    _ => self.lex_word(modes, t),
                }
            }
            _ => self.lex_word(modes, t),
        };
        // Operator tokens keep their raw spelling for diagnostics.
        match t.tok {
            Tok::String
            | Tok::EnvString
            | Tok::EnvArray
            | Tok::DInPar
            | Tok::DOutPar
            | Tok::EndInput
            | Tok::LexErr => {}
            _ => {
                if t.text.is_empty() {
                    t.text = self.src[start..self.pos].to_vec();
                }
            }
        }
        t
    }

    fn read_heredoc(&mut self, delim: &[u8], strip_tabs: bool) -> Option<Vec<u8>> {
        let plain = untokenize(delim);
        let mut body = Vec::new();
        let mut first = true;
        loop {
            if self.pos >= self.src.len() {
                return None;
            }
            let start = self.pos;
            let end = self.src[start..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| start + i)
                .unwrap_or(self.src.len());
            let mut line = &self.src[start..end];
            self.pos = if end < self.src.len() {
                self.line += 1;
                end + 1
            } else {
                end
            };
            if strip_tabs {
                while line.first() == Some(&b'\t') {
                    line = &line[1..];
                }
            }
            if line == &plain[..] {
                return Some(body);
            }
            if !first {
                body.push(b'\n');
            }
            body.extend_from_slice(line);
            first = false;
        }
    }
}

/// Argument-vector lexer for the `test` builtin dialect.
///
/// `(`, `)`, `!`, `<` and `>` arguments become their structural tokens;
/// every other argument is a plain string (the conditional grammar turns
/// an unknown leftover into `-n <arg>`), and exhaustion yields
/// [`Tok::NullTok`].
pub struct TestLexer {
    args: Vec<Vec<u8>>,
    pos: usize,
}

impl TestLexer {
    pub fn new<A: AsRef<[u8]>>(args: &[A]) -> TestLexer {
        TestLexer {
            args: args.iter().map(|a| a.as_ref().to_vec()).collect(),
            pos: 0,
        }
    }
}

impl Lexer for TestLexer {
    fn next(&mut self, _modes: &Modes) -> Token {
        let mut t = Token::new(Tok::NullTok);
        if self.pos >= self.args.len() {
            return t;
        }
        let text = self.args[self.pos].clone();
        self.pos += 1;
        t.tok = match &text[..] {
            [b'('] => Tok::InPar,
            [b')'] => Tok::OutPar,
            [b'!'] => Tok::Bang,
            [b'<'] => Tok::InAng,
            [b'>'] => Tok::OutAng,
            _ => Tok::String,
        };
        t.text = text;
        t
    }

    fn is_test(&self) -> bool {
        true
    }

    fn test_remaining(&self) -> &[Vec<u8>] {
        &self.args[self.pos..]
    }
}
