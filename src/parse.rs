//! Recursive-descent grammar driver.
//!
//! Each production either matches and advances the token, or fails; on
//! failure the compile is abandoned, the code buffer truncated to the
//! production's entry cursor, and the sticky [`Tok::LexErr`] token keeps
//! anything downstream from matching. There is no resynchronisation.
//!
//! Compound emission follows one discipline: reserve a header slot with a
//! zero word, emit the body, then patch the header with the opcode and
//! `skip = used - 1 - p`, so that `p + 1 + skip` is the first word past
//! the body.

use crate::buffer::CodeBuf;
use crate::constants::*;
use crate::error::{ErrorState, NoErrs, ParseError};
use crate::instructions::{self, RedirType};
use crate::lex::StringLexer;
use crate::program::{Alloc, Eprog};
use crate::strings::StrPool;
use crate::token::{chars, is_ident, untokenize, Lexer, Modes, Tok, Token};

/// Grammar options.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Allow the short body forms (`if x; y`, `for i in l; cmd`).
    pub short_loops: bool,
    /// Allow csh-style loop bodies terminated by `end`.
    pub csh_junkie_loops: bool,
    /// Error reporting mode.
    pub noerrs: NoErrs,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            short_loops: true,
            csh_junkie_loops: false,
            noerrs: NoErrs::Report,
        }
    }
}

/// What construct the parser is inside, for interactive prompting.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CmdContext {
    For,
    Foreach,
    Select,
    While,
    Until,
    Repeat,
    If,
    IfThen,
    Elif,
    ElifThen,
    Else,
    Case,
    FuncDef,
    Subsh,
    Cursh,
    Cond,
    Array,
    Pipe,
    ErrPipe,
    CmdOr,
    CmdAnd,
}

/// A here-document whose body is still pending.
#[derive(Clone, Debug)]
pub struct Heredoc {
    /// Index of the reserved three-word redirection slot.
    pub slot: usize,
    pub delim: Vec<u8>,
    pub ty: RedirType,
}

/// One compile's worth of state: token, mode flags, code buffer, string
/// pool, pattern and here-document bookkeeping.
pub struct Parser<'l> {
    pub(crate) lex: &'l mut dyn Lexer,
    pub(crate) tok: Token,
    pub(crate) modes: Modes,
    pub(crate) code: CodeBuf,
    pub(crate) strs: StrPool,
    pub(crate) npats: u32,
    pub(crate) errs: ErrorState,
    pub(crate) opts: Options,
    pub(crate) cmd_stack: Vec<CmdContext>,
    pub(crate) hdocs: Vec<Heredoc>,
    pub(crate) line_base: u32,
}

impl<'l> Parser<'l> {
    pub fn new(lex: &'l mut dyn Lexer, opts: Options) -> Parser<'l> {
        Parser {
            lex,
            tok: Token::end(),
            modes: Modes::default(),
            code: CodeBuf::new(),
            strs: StrPool::new(),
            npats: 0,
            errs: ErrorState::new(opts.noerrs),
            opts,
            cmd_stack: Vec::new(),
            hdocs: Vec::new(),
            line_base: 0,
        }
    }

    /// Compiles one top-level event: a sublist with an optional `;`, `&`
    /// or `&!` terminator, plus any events chained after it. `Ok(None)`
    /// means end of input (or a lone interactive newline) without error.
    pub fn parse_event(&mut self) -> Result<Option<Eprog>, ParseError> {
        self.init();
        self.yylex();
        match self.par_event() {
            Ok(true) => Ok(Some(self.finish())),
            Ok(false) => Ok(None),
            Err(()) => Err(self.take_error()),
        }
    }

    /// Compiles until end of input; a residual token is an error. Empty
    /// input yields the one-word `END` program.
    pub fn parse_list(&mut self) -> Result<Eprog, ParseError> {
        self.init();
        self.yylex();
        let mut c = false;
        self.par_list(&mut c);
        if self.tok.tok != Tok::EndInput {
            self.yyerror(false);
            return Err(self.take_error());
        }
        Ok(self.finish())
    }

    /// Compiles exactly one conditional expression.
    pub fn parse_cond(&mut self) -> Result<Eprog, ParseError> {
        self.init();
        self.modes.incmdpos = false;
        self.modes.incond = 1;
        self.yylex();
        if !self.par_cond() {
            return Err(self.take_error());
        }
        Ok(self.finish())
    }

    /// Diagnostics and the sticky error flag of the current compile.
    pub fn errors(&self) -> &ErrorState {
        &self.errs
    }

    /// Clears the error flag; required before chaining another parse
    /// after a failure.
    pub fn clear_err(&mut self) {
        self.errs.clear();
    }

    /// Here-documents whose bodies have not been patched in yet.
    pub fn pending_heredocs(&self) -> &[Heredoc] {
        &self.hdocs[..]
    }

    /// The constructs the parser is currently inside, outermost first.
    /// Interactive front-ends use this for continuation prompts.
    pub fn command_stack(&self) -> &[CmdContext] {
        &self.cmd_stack[..]
    }

    /// Patches a reserved here-document slot: the redirection type at the
    /// slot, the body's string reference two words after it. The
    /// descriptor word between them is left as written.
    pub fn set_heredoc(&mut self, slot: usize, ty: RedirType, body: &[u8]) {
        self.code.set(slot, instructions::redir(ty));
        let w = self.strs.code(body);
        self.code.set(slot + 2, w);
    }

    fn init(&mut self) {
        self.code = CodeBuf::new();
        self.strs.reset();
        self.npats = 0;
        self.hdocs.clear();
        self.cmd_stack.clear();
        self.line_base = 0;
        self.tok = Token::end();
        self.modes = Modes::default();
        self.modes.incmdpos = true;
    }

    fn finish(&mut self) -> Eprog {
        self.code.add(instructions::end());
        let words = self.code.take();
        let strs = self.strs.pool_bytes();
        let npats = self.npats as usize;
        self.strs.reset();
        self.npats = 0;
        Eprog::from_parts(words, strs, npats, Alloc::Heap)
    }

    fn take_error(&mut self) -> ParseError {
        ParseError {
            messages: std::mem::replace(&mut self.errs.messages, Vec::new()),
            flagged: self.errs.flagged,
        }
    }

    pub(crate) fn yylex(&mut self) {
        self.tok = self.lex.next(&self.modes);
        if (self.tok.tok == Tok::Seper && self.tok.newline) || self.tok.tok == Tok::EndInput {
            self.gather_heredocs();
        }
    }

    fn gather_heredocs(&mut self) {
        while !self.hdocs.is_empty() {
            let hd = self.hdocs.remove(0);
            let strip = hd.ty == RedirType::HeredocDash;
            match self.lex.read_heredoc(&hd.delim, strip) {
                Some(body) => self.set_heredoc(hd.slot, hd.ty, &body),
                None => {
                    let delim = untokenize(&hd.delim);
                    self.errs.report(format!(
                        "here-document delimiter `{}' not found",
                        String::from_utf8_lossy(&delim)
                    ));
                    self.tok.tok = Tok::LexErr;
                    self.hdocs.clear();
                    return;
                }
            }
        }
    }

    /// Line number recorded into pipe headers: absolute at top level,
    /// relative to the definition inside function bodies.
    fn cur_line(&self) -> u32 {
        self.tok.line.saturating_sub(self.line_base)
    }

    /// Abandons the current production: truncates to its entry cursor and
    /// makes the token sticky-bad.
    pub(crate) fn fail(&mut self, oecused: usize) -> bool {
        self.tok.tok = Tok::LexErr;
        self.code.truncate(oecused);
        self.hdocs.retain(|h| h.slot + 3 <= oecused);
        false
    }

    fn yyerror(&mut self, noerr: bool) {
        let t = untokenize(&self.tok.text);
        let stop = t.iter().take(20).take_while(|&&b| b != b'\n').count();
        let msg = if stop == 20 {
            format!("parse error near `{}...'", String::from_utf8_lossy(&t[..20]))
        } else if stop > 0 {
            format!("parse error near `{}'", String::from_utf8_lossy(&t[..stop]))
        } else {
            String::from("parse error")
        };
        if noerr {
            self.errs.report_unflagged(msg);
        } else {
            self.errs.report(msg);
        }
    }

    // Insertion and deletion keep pending here-document slots in step.
    pub(crate) fn ins_space(&mut self, p: usize, n: usize) {
        self.code.insert_space(p, n);
        for h in self.hdocs.iter_mut() {
            if h.slot >= p {
                h.slot += n;
            }
        }
    }

    fn del_word(&mut self, p: usize) {
        self.code.delete(p);
        for h in self.hdocs.iter_mut() {
            if h.slot > p {
                h.slot -= 1;
            }
        }
    }

    // Patches a list header, collapsing a trivially linear list to the
    // cheap encoding: the sublist word goes away, Z_SIMPLE marks the
    // header, and a true pipeline head is replaced by its bare line
    // number.
    fn set_list_code(&mut self, p: usize, ty: u32, complex: bool) {
        if !complex
            && (ty == Z_SYNC || ty == (Z_SYNC | Z_END))
            && instructions::sublist_type(self.code[p + 1]) == SUBLIST_END
        {
            let ispipe =
                instructions::sublist_flags(self.code[p + 1]) & SUBLIST_SIMPLE == 0;
            let skip = (self.code.used() - 2 - p) as u32;
            self.code.set(p, instructions::list(ty | Z_SIMPLE, skip));
            self.del_word(p + 1);
            if ispipe {
                let line = instructions::pipe_line(self.code[p + 1]);
                self.code.set(p + 1, line);
            }
        } else {
            let skip = (self.code.used() - 1 - p) as u32;
            self.code.set(p, instructions::list(ty, skip));
        }
    }

    // The same collapse one level down: a non-complex sublist keeps only
    // the pipe's line number in place of its pipe header.
    fn set_sublist_code(&mut self, p: usize, ty: u32, flags: u32, skip: usize, complex: bool) {
        if complex {
            self.code
                .set(p, instructions::sublist(ty, flags, skip as u32));
        } else {
            self.code.set(
                p,
                instructions::sublist(ty, flags | SUBLIST_SIMPLE, skip as u32),
            );
            let line = instructions::pipe_line(self.code[p + 1]);
            self.code.set(p + 1, line);
        }
    }

    fn par_save_list(&mut self, complex: &mut bool) {
        let eu = self.code.used();
        self.par_list(complex);
        if eu == self.code.used() {
            self.code.add(instructions::end());
        }
    }

    fn par_save_list1(&mut self, complex: &mut bool) {
        let eu = self.code.used();
        self.par_list1(complex);
        if eu == self.code.used() {
            self.code.add(instructions::end());
        }
    }

    // event : { SEPER } [ sublist [ SEPER | AMPER | AMPERBANG ] ]
    fn par_event(&mut self) -> Result<bool, ()> {
        while self.tok.tok == Tok::Seper {
            if self.tok.newline {
                return Ok(false);
            }
            self.yylex();
        }
        if self.tok.tok == Tok::EndInput {
            return Ok(false);
        }

        let p = self.code.add(0);
        let mut c = false;
        let mut r = false;

        if self.par_sublist(&mut c) {
            match self.tok.tok {
                Tok::EndInput => {
                    self.set_list_code(p, Z_SYNC, c);
                    r = true;
                }
                Tok::Seper => {
                    self.set_list_code(p, Z_SYNC, c);
                    if !self.tok.newline {
                        self.yylex();
                    }
                    r = true;
                }
                Tok::Amper => {
                    self.set_list_code(p, Z_ASYNC, c);
                    self.yylex();
                    r = true;
                }
                Tok::AmperBang => {
                    self.set_list_code(p, Z_ASYNC | Z_DISOWN, c);
                    self.yylex();
                    r = true;
                }
                _ => {}
            }
        }
        if !r {
            let had = self.errs.flagged;
            self.yyerror(had);
            self.code.truncate(p);
            return Err(());
        }
        let oec = self.code.used();
        self.par_event()?;
        if self.code.used() == oec {
            self.code.or_with(p, Z_END << CODE_BITS);
        }
        Ok(true)
    }

    // list : { SEPER } [ sublist [ { SEPER | AMPER | AMPERBANG } list ] ]
    fn par_list(&mut self, complex: &mut bool) -> bool {
        let mut lp: Option<usize> = None;

        loop {
            while self.tok.tok == Tok::Seper {
                self.yylex();
            }
            let p = self.code.add(0);
            let mut c = false;

            if self.par_sublist(&mut c) {
                *complex |= c;
                match self.tok.tok {
                    Tok::Seper | Tok::Amper | Tok::AmperBang => {
                        let ty = match self.tok.tok {
                            Tok::Seper => Z_SYNC,
                            Tok::Amper => Z_ASYNC,
                            _ => Z_ASYNC | Z_DISOWN,
                        };
                        if self.tok.tok != Tok::Seper {
                            *complex = true;
                        }
                        self.set_list_code(p, ty, c);
                        self.modes.incmdpos = true;
                        loop {
                            self.yylex();
                            if self.tok.tok != Tok::Seper {
                                break;
                            }
                        }
                        lp = Some(p);
                    }
                    _ => {
                        self.set_list_code(p, Z_SYNC | Z_END, c);
                        return true;
                    }
                }
            } else {
                self.code.truncate(p);
                if let Some(lp) = lp {
                    self.code.or_with(lp, Z_END << CODE_BITS);
                    return true;
                }
                return false;
            }
        }
    }

    fn par_list1(&mut self, complex: &mut bool) -> bool {
        let p = self.code.add(0);
        let mut c = false;
        if self.par_sublist(&mut c) {
            self.set_list_code(p, Z_SYNC | Z_END, c);
            *complex |= c;
            true
        } else {
            self.code.truncate(p);
            false
        }
    }

    // sublist : sublist2 [ ( DBAR | DAMPER ) { SEPER } sublist ]
    fn par_sublist(&mut self, complex: &mut bool) -> bool {
        let p = self.code.add(0);
        let mut c = false;

        if let Some(f) = self.par_sublist2(&mut c) {
            let e = self.code.used();
            *complex |= c;
            if self.tok.tok == Tok::DBar || self.tok.tok == Tok::DAmper {
                let qtok = self.tok.tok;
                *complex = true;
                self.cmd_stack.push(if qtok == Tok::DBar {
                    CmdContext::CmdOr
                } else {
                    CmdContext::CmdAnd
                });
                self.yylex();
                while self.tok.tok == Tok::Seper {
                    self.yylex();
                }
                let sl = self.par_sublist(complex);
                let ty = if sl {
                    if qtok == Tok::DBar {
                        SUBLIST_OR
                    } else {
                        SUBLIST_AND
                    }
                } else {
                    SUBLIST_END
                };
                self.set_sublist_code(p, ty, f, e - 1 - p, c);
                self.cmd_stack.pop();
            } else {
                self.set_sublist_code(p, SUBLIST_END, f, e - 1 - p, c);
            }
            true
        } else {
            self.code.truncate(p);
            false
        }
    }

    // sublist2 : [ COPROC | BANG ] pline
    fn par_sublist2(&mut self, complex: &mut bool) -> Option<u32> {
        let mut f = 0;

        if self.tok.tok == Tok::Coproc {
            *complex = true;
            f |= SUBLIST_COPROC;
            self.yylex();
        } else if self.tok.tok == Tok::Bang {
            *complex = true;
            f |= SUBLIST_NOT;
            self.yylex();
        }
        if !self.par_pline(complex) {
            return None;
        }
        Some(f)
    }

    // pline : cmd [ ( BAR | BARAMP ) { SEPER } pline ]
    fn par_pline(&mut self, complex: &mut bool) -> bool {
        let line = self.cur_line();
        let p = self.code.add(0);

        if !self.par_cmd(complex) {
            self.code.truncate(p);
            return false;
        }
        match self.tok.tok {
            Tok::Bar => {
                *complex = true;
                self.cmd_stack.push(CmdContext::Pipe);
                self.yylex();
                while self.tok.tok == Tok::Seper {
                    self.yylex();
                }
                self.code.set(p, instructions::pipe(PIPE_MID, line));
                self.ins_space(p + 1, 1);
                let skip = (self.code.used() - 1 - p) as u32;
                self.code.set(p + 1, skip);
                self.par_pline(complex);
                self.cmd_stack.pop();
                true
            }
            Tok::BarAmp => {
                // Splice a stderr-merge in front of the left-hand command,
                // after any redirections it already owns.
                let mut r = p + 1;
                while r < self.code.used()
                    && instructions::wc_kind(self.code[r])
                        == Some(instructions::WcKind::Redir)
                {
                    r += 3;
                }
                self.ins_space(r, 3);
                self.code.set(r, instructions::redir(RedirType::MergeOut));
                self.code.set(r + 1, 2);
                let w = self.strs.code(b"1");
                self.code.set(r + 2, w);

                *complex = true;
                self.cmd_stack.push(CmdContext::ErrPipe);
                self.yylex();
                self.code.set(p, instructions::pipe(PIPE_MID, line));
                self.ins_space(p + 1, 1);
                let skip = (self.code.used() - 1 - p) as u32;
                self.code.set(p + 1, skip);
                self.par_pline(complex);
                self.cmd_stack.pop();
                true
            }
            _ => {
                self.code.set(p, instructions::pipe(PIPE_END, line));
                true
            }
        }
    }

    // cmd : { redir } ( for | case | if | while | repeat | subsh
    //                 | funcdef | time | dinbrack | dinpar | simple )
    //       { redir }
    fn par_cmd(&mut self, complex: &mut bool) -> bool {
        let mut r = self.code.used();
        let mut nr = 0;

        if self.tok.tok.is_redirop() {
            *complex = true;
            while self.tok.tok.is_redirop() {
                nr += 1;
                if !self.par_redir(&mut r) {
                    return false;
                }
            }
        }
        // Every compound construct is too complex for the collapsed list
        // encoding; only a bare simple command stays eligible.
        match self.tok.tok {
            Tok::For => {
                *complex = true;
                self.cmd_stack.push(CmdContext::For);
                let ok = self.par_for(complex);
                self.cmd_stack.pop();
                if !ok {
                    return false;
                }
            }
            Tok::Foreach => {
                *complex = true;
                self.cmd_stack.push(CmdContext::Foreach);
                let ok = self.par_for(complex);
                self.cmd_stack.pop();
                if !ok {
                    return false;
                }
            }
            Tok::Select => {
                *complex = true;
                self.cmd_stack.push(CmdContext::Select);
                let ok = self.par_for(complex);
                self.cmd_stack.pop();
                if !ok {
                    return false;
                }
            }
            Tok::Case => {
                *complex = true;
                self.cmd_stack.push(CmdContext::Case);
                let ok = self.par_case(complex);
                self.cmd_stack.pop();
                if !ok {
                    return false;
                }
            }
            Tok::If => {
                *complex = true;
                if !self.par_if(complex) {
                    return false;
                }
            }
            Tok::While => {
                *complex = true;
                self.cmd_stack.push(CmdContext::While);
                let ok = self.par_while(complex);
                self.cmd_stack.pop();
                if !ok {
                    return false;
                }
            }
            Tok::Until => {
                *complex = true;
                self.cmd_stack.push(CmdContext::Until);
                let ok = self.par_while(complex);
                self.cmd_stack.pop();
                if !ok {
                    return false;
                }
            }
            Tok::Repeat => {
                *complex = true;
                self.cmd_stack.push(CmdContext::Repeat);
                let ok = self.par_repeat(complex);
                self.cmd_stack.pop();
                if !ok {
                    return false;
                }
            }
            Tok::InPar => {
                *complex = true;
                self.cmd_stack.push(CmdContext::Subsh);
                let ok = self.par_subsh(complex);
                self.cmd_stack.pop();
                if !ok {
                    return false;
                }
            }
            Tok::InBrace => {
                *complex = true;
                self.cmd_stack.push(CmdContext::Cursh);
                let ok = self.par_subsh(complex);
                self.cmd_stack.pop();
                if !ok {
                    return false;
                }
            }
            Tok::Func => {
                *complex = true;
                self.cmd_stack.push(CmdContext::FuncDef);
                let ok = self.par_funcdef();
                self.cmd_stack.pop();
                if !ok {
                    return false;
                }
            }
            Tok::Time => {
                *complex = true;
                if !self.par_time() {
                    return false;
                }
            }
            Tok::DInBrack => {
                *complex = true;
                self.cmd_stack.push(CmdContext::Cond);
                let ok = self.par_dinbrack();
                self.cmd_stack.pop();
                if !ok {
                    return false;
                }
            }
            Tok::DInPar => {
                *complex = true;
                self.code.add(instructions::arith());
                let text = self.tok.text.clone();
                let w = self.strs.code(&text);
                self.code.add(w);
                self.yylex();
            }
            _ => match self.par_simple(complex, nr) {
                None => {
                    if nr == 0 {
                        return false;
                    }
                }
                Some(sr) => {
                    if sr > 0 {
                        // Three codes per redirection parsed inside.
                        *complex = true;
                        r += sr * 3;
                    }
                }
            },
        }
        if self.tok.tok.is_redirop() {
            *complex = true;
            while self.tok.tok.is_redirop() {
                if !self.par_redir(&mut r) {
                    return false;
                }
            }
        }
        self.modes.incmdpos = true;
        self.modes.incasepat = false;
        self.modes.incond = 0;
        true
    }

    // for : FOR DINPAR expr SEMI expr SEMI expr DOUTPAR { SEPER } body
    //     | ( FOR | FOREACH | SELECT ) name
    //       ( "in" wordlist | INPAR wordlist OUTPAR )? { SEPER } body
    fn par_for(&mut self, complex: &mut bool) -> bool {
        let oecused = self.code.used();
        let csh = self.tok.tok == Tok::Foreach;
        let sel = self.tok.tok == Tok::Select;
        let p = self.code.add(0);
        let ty;

        self.modes.incmdpos = false;
        self.modes.infor = self.tok.tok == Tok::For;
        self.yylex();
        if self.tok.tok == Tok::DInPar {
            self.yylex();
            if self.tok.tok != Tok::DInPar {
                return self.fail(oecused);
            }
            let text = self.tok.text.clone();
            let w = self.strs.code(&text);
            self.code.add(w);
            self.yylex();
            if self.tok.tok != Tok::DInPar {
                return self.fail(oecused);
            }
            let text = self.tok.text.clone();
            let w = self.strs.code(&text);
            self.code.add(w);
            self.yylex();
            if self.tok.tok != Tok::DOutPar {
                return self.fail(oecused);
            }
            let text = self.tok.text.clone();
            let w = self.strs.code(&text);
            self.code.add(w);
            self.modes.infor = false;
            self.modes.incmdpos = true;
            self.yylex();
            ty = FOR_COND;
        } else {
            self.modes.infor = false;
            if self.tok.tok != Tok::String || !is_ident(&self.tok.text) {
                return self.fail(oecused);
            }
            let text = self.tok.text.clone();
            let w = self.strs.code(&text);
            self.code.add(w);
            self.modes.incmdpos = true;
            self.yylex();
            if self.tok.tok == Tok::String && self.tok.text == b"in" {
                self.modes.incmdpos = false;
                self.yylex();
                let np = self.code.add(0);
                let n = self.par_wordlist();
                if self.tok.tok != Tok::Seper {
                    return self.fail(oecused);
                }
                self.code.set(np, n);
                ty = if sel { SELECT_LIST } else { FOR_LIST };
            } else if self.tok.tok == Tok::InPar {
                self.modes.incmdpos = false;
                self.yylex();
                let np = self.code.add(0);
                let n = self.par_nl_wordlist();
                if self.tok.tok != Tok::OutPar {
                    return self.fail(oecused);
                }
                self.code.set(np, n);
                self.modes.incmdpos = true;
                self.yylex();
                ty = if sel { SELECT_LIST } else { FOR_LIST };
            } else {
                ty = if sel { SELECT_PPARAM } else { FOR_PPARAM };
            }
        }
        self.modes.incmdpos = true;
        while self.tok.tok == Tok::Seper {
            self.yylex();
        }
        if self.tok.tok == Tok::Do {
            self.yylex();
            self.par_save_list(complex);
            if self.tok.tok != Tok::Done {
                return self.fail(oecused);
            }
            self.yylex();
        } else if self.tok.tok == Tok::InBrace {
            self.yylex();
            self.par_save_list(complex);
            if self.tok.tok != Tok::OutBrace {
                return self.fail(oecused);
            }
            self.yylex();
        } else if csh || self.opts.csh_junkie_loops {
            self.par_save_list(complex);
            if self.tok.tok != Tok::ZEnd {
                return self.fail(oecused);
            }
            self.yylex();
        } else if !self.opts.short_loops {
            return self.fail(oecused);
        } else {
            self.par_save_list1(complex);
        }

        let skip = (self.code.used() - 1 - p) as u32;
        self.code.set(
            p,
            if sel {
                instructions::select_loop(ty, skip)
            } else {
                instructions::for_loop(ty, skip)
            },
        );
        true
    }

    // case : CASE STRING { SEPER } ( "in" | INBRACE )
    //        { { SEPER } STRING { BAR STRING } OUTPAR
    //          list [ DSEMI | SEMIAMP ] }
    //        { SEPER } ( "esac" | OUTBRACE )
    fn par_case(&mut self, complex: &mut bool) -> bool {
        let oecused = self.code.used();
        let p = self.code.add(0);

        self.modes.incmdpos = false;
        self.yylex();
        if self.tok.tok != Tok::String {
            return self.fail(oecused);
        }
        let text = self.tok.text.clone();
        let w = self.strs.code(&text);
        self.code.add(w);

        self.modes.incmdpos = true;
        self.yylex();
        while self.tok.tok == Tok::Seper {
            self.yylex();
        }
        if !(self.tok.tok == Tok::String && self.tok.text == b"in")
            && self.tok.tok != Tok::InBrace
        {
            return self.fail(oecused);
        }
        let brflag = self.tok.tok == Tok::InBrace;
        self.modes.incasepat = true;
        self.modes.incmdpos = false;
        self.yylex();

        loop {
            while self.tok.tok == Tok::Seper {
                self.yylex();
            }
            if self.tok.tok == Tok::OutBrace {
                break;
            }
            if self.tok.tok != Tok::String {
                return self.fail(oecused);
            }
            if self.tok.text == b"esac" {
                break;
            }
            let mut pat = self.tok.text.clone();
            self.modes.incasepat = false;
            self.modes.incmdpos = true;
            let mut ty = CASE_OR;
            loop {
                self.yylex();
                if self.tok.tok == Tok::OutPar {
                    self.modes.incasepat = false;
                    self.modes.incmdpos = true;
                    self.yylex();
                    break;
                } else if self.tok.tok == Tok::Bar {
                    self.modes.incasepat = true;
                    self.modes.incmdpos = false;
                    pat.push(chars::BAR);
                } else if pat.last() != Some(&chars::BAR) {
                    // POSIX allows a fully parenthesised (foo*) pattern;
                    // validate the balance and strip the outer parens.
                    if !strip_case_parens(&mut pat) {
                        return self.fail(oecused);
                    }
                    break;
                } else {
                    if self.tok.tok != Tok::String {
                        return self.fail(oecused);
                    }
                    pat.extend_from_slice(&self.tok.text);
                }
            }
            let pp = self.code.add(0);
            let w = self.strs.code(&pat);
            self.code.add(w);
            let slot = self.npats;
            self.npats += 1;
            self.code.add(slot);
            self.par_save_list(complex);
            if self.tok.tok == Tok::SemiAmp {
                ty = CASE_AND;
            }
            let skip = (self.code.used() - 1 - pp) as u32;
            self.code.set(pp, instructions::case(ty, skip));
            if (self.tok.tok == Tok::Esac && !brflag)
                || (self.tok.tok == Tok::OutBrace && brflag)
            {
                break;
            }
            if self.tok.tok != Tok::DSemi && self.tok.tok != Tok::SemiAmp {
                return self.fail(oecused);
            }
            self.modes.incasepat = true;
            self.modes.incmdpos = false;
            self.yylex();
        }
        self.modes.incmdpos = true;
        self.yylex();

        let skip = (self.code.used() - 1 - p) as u32;
        self.code.set(p, instructions::case(CASE_HEAD, skip));
        true
    }

    // if : { ( IF | ELIF ) { SEPER } ( INPAR list OUTPAR | list )
    //        { SEPER } ( THEN list | INBRACE list OUTBRACE | list1 ) }
    //      [ FI | ELSE list FI | ELSE { SEPER } INBRACE list OUTBRACE ]
    fn par_if(&mut self, complex: &mut bool) -> bool {
        let oecused = self.code.used();
        let mut usebrace = false;
        let p = self.code.add(0);
        let mut xtok;

        loop {
            xtok = self.tok.tok;
            self.cmd_stack.push(if xtok == Tok::If {
                CmdContext::If
            } else {
                CmdContext::Elif
            });
            self.yylex();
            if xtok == Tok::Fi || xtok == Tok::Else {
                break;
            }
            while self.tok.tok == Tok::Seper {
                self.yylex();
            }
            if !(xtok == Tok::If || xtok == Tok::Elif) {
                self.cmd_stack.pop();
                return self.fail(oecused);
            }
            let pp = self.code.add(0);
            let ty = if xtok == Tok::If { IF_IF } else { IF_ELIF };
            self.par_save_list(complex);
            self.modes.incmdpos = true;
            while self.tok.tok == Tok::Seper {
                self.yylex();
            }
            xtok = Tok::Fi;
            let nc = if self.cmd_stack.last() == Some(&CmdContext::If) {
                CmdContext::IfThen
            } else {
                CmdContext::ElifThen
            };
            if self.tok.tok == Tok::Then {
                usebrace = false;
                self.cmd_stack.pop();
                self.cmd_stack.push(nc);
                self.yylex();
                self.par_save_list(complex);
                let skip = (self.code.used() - 1 - pp) as u32;
                self.code.set(pp, instructions::if_cond(ty, skip));
                self.modes.incmdpos = true;
                self.cmd_stack.pop();
            } else if self.tok.tok == Tok::InBrace {
                usebrace = true;
                self.cmd_stack.pop();
                self.cmd_stack.push(nc);
                self.yylex();
                self.par_save_list(complex);
                if self.tok.tok != Tok::OutBrace {
                    self.cmd_stack.pop();
                    return self.fail(oecused);
                }
                let skip = (self.code.used() - 1 - pp) as u32;
                self.code.set(pp, instructions::if_cond(ty, skip));
                self.yylex();
                self.modes.incmdpos = true;
                if self.tok.tok == Tok::Seper {
                    break;
                }
                self.cmd_stack.pop();
            } else if !self.opts.short_loops {
                self.cmd_stack.pop();
                return self.fail(oecused);
            } else {
                self.cmd_stack.pop();
                self.cmd_stack.push(nc);
                self.par_save_list1(complex);
                let skip = (self.code.used() - 1 - pp) as u32;
                self.code.set(pp, instructions::if_cond(ty, skip));
                self.modes.incmdpos = true;
                break;
            }
        }
        self.cmd_stack.pop();

        if xtok == Tok::Else {
            let pp = self.code.add(0);
            self.cmd_stack.push(CmdContext::Else);
            while self.tok.tok == Tok::Seper {
                self.yylex();
            }
            if self.tok.tok == Tok::InBrace && usebrace {
                self.yylex();
                self.par_save_list(complex);
                if self.tok.tok != Tok::OutBrace {
                    self.cmd_stack.pop();
                    return self.fail(oecused);
                }
            } else {
                self.par_save_list(complex);
                if self.tok.tok != Tok::Fi {
                    self.cmd_stack.pop();
                    return self.fail(oecused);
                }
            }
            let skip = (self.code.used() - 1 - pp) as u32;
            self.code.set(pp, instructions::if_cond(IF_ELSE, skip));
            self.yylex();
            self.cmd_stack.pop();
        }
        let skip = (self.code.used() - 1 - p) as u32;
        self.code.set(p, instructions::if_cond(IF_HEAD, skip));
        true
    }

    // while : ( WHILE | UNTIL ) ( INPAR list OUTPAR | list ) { SEPER }
    //         ( DO list DONE | INBRACE list OUTBRACE | list ZEND )
    fn par_while(&mut self, complex: &mut bool) -> bool {
        let oecused = self.code.used();
        let ty = if self.tok.tok == Tok::Until {
            WHILE_UNTIL
        } else {
            WHILE_WHILE
        };
        let p = self.code.add(0);

        self.yylex();
        self.par_save_list(complex);
        self.modes.incmdpos = true;
        while self.tok.tok == Tok::Seper {
            self.yylex();
        }
        if self.tok.tok == Tok::Do {
            self.yylex();
            self.par_save_list(complex);
            if self.tok.tok != Tok::Done {
                return self.fail(oecused);
            }
            self.yylex();
        } else if self.tok.tok == Tok::InBrace {
            self.yylex();
            self.par_save_list(complex);
            if self.tok.tok != Tok::OutBrace {
                return self.fail(oecused);
            }
            self.yylex();
        } else if self.opts.csh_junkie_loops {
            self.par_save_list(complex);
            if self.tok.tok != Tok::ZEnd {
                return self.fail(oecused);
            }
            self.yylex();
        } else {
            return self.fail(oecused);
        }

        let skip = (self.code.used() - 1 - p) as u32;
        self.code.set(p, instructions::while_loop(ty, skip));
        true
    }

    // repeat : REPEAT STRING { SEPER } ( DO list DONE | list1 )
    fn par_repeat(&mut self, complex: &mut bool) -> bool {
        let oecused = self.code.used();
        let p = self.code.add(0);

        self.modes.incmdpos = false;
        self.yylex();
        if self.tok.tok != Tok::String {
            return self.fail(oecused);
        }
        let text = self.tok.text.clone();
        let w = self.strs.code(&text);
        self.code.add(w);
        self.modes.incmdpos = true;
        self.yylex();
        while self.tok.tok == Tok::Seper {
            self.yylex();
        }
        if self.tok.tok == Tok::Do {
            self.yylex();
            self.par_save_list(complex);
            if self.tok.tok != Tok::Done {
                return self.fail(oecused);
            }
            self.yylex();
        } else if self.tok.tok == Tok::InBrace {
            self.yylex();
            self.par_save_list(complex);
            if self.tok.tok != Tok::OutBrace {
                return self.fail(oecused);
            }
            self.yylex();
        } else if self.opts.csh_junkie_loops {
            self.par_save_list(complex);
            if self.tok.tok != Tok::ZEnd {
                return self.fail(oecused);
            }
            self.yylex();
        } else if !self.opts.short_loops {
            return self.fail(oecused);
        } else {
            self.par_save_list1(complex);
        }

        let skip = (self.code.used() - 1 - p) as u32;
        self.code.set(p, instructions::repeat_loop(skip));
        true
    }

    // subsh : ( INPAR | INBRACE ) list ( OUTPAR | OUTBRACE )
    fn par_subsh(&mut self, complex: &mut bool) -> bool {
        let oecused = self.code.used();
        let otok = self.tok.tok;

        self.code.add(if otok == Tok::InPar {
            instructions::subsh()
        } else {
            instructions::cursh()
        });
        self.yylex();
        self.par_save_list(complex);
        let want = if otok == Tok::InPar {
            Tok::OutPar
        } else {
            Tok::OutBrace
        };
        if self.tok.tok != want {
            return self.fail(oecused);
        }
        self.modes.incmdpos = true;
        self.yylex();
        true
    }

    // funcdef : FUNCTION wordlist [ INOUTPAR ] { SEPER }
    //           ( list1 | INBRACE list OUTBRACE )
    fn par_funcdef(&mut self) -> bool {
        let oecused = self.code.used();
        let old_base = self.line_base;
        let oecssub = self.strs.ssub();
        let mut num = 0usize;

        self.line_base = self.tok.line.saturating_sub(1);
        self.modes.incmdpos = false;
        self.yylex();

        let p = self.code.add(0);
        self.code.add(0);

        self.modes.incmdpos = true;
        while self.tok.tok == Tok::String {
            if self.tok.text.len() == 1 && self.tok.text[0] == chars::INBRACE {
                self.tok.tok = Tok::InBrace;
                break;
            }
            let text = self.tok.text.clone();
            let w = self.strs.code(&text);
            self.code.add(w);
            num += 1;
            self.yylex();
        }
        self.code.add(0);
        self.code.add(0);
        self.code.add(0);

        if self.tok.tok == Tok::InOutPar {
            self.yylex();
        }
        while self.tok.tok == Tok::Seper {
            self.yylex();
        }

        self.strs.enter_func();
        let so = self.strs.soffs();
        self.strs.set_ssub(so);
        let onp = self.npats;
        self.npats = 0;

        if self.tok.tok == Tok::InBrace {
            self.yylex();
            let mut c = false;
            self.par_list(&mut c);
            if self.tok.tok != Tok::OutBrace {
                self.line_base = old_base;
                self.npats = onp;
                self.strs.set_ssub(oecssub);
                return self.fail(oecused);
            }
            self.yylex();
        } else if !self.opts.short_loops {
            self.line_base = old_base;
            self.npats = onp;
            self.strs.set_ssub(oecssub);
            return self.fail(oecused);
        } else {
            let mut c = false;
            self.par_list1(&mut c);
        }

        self.code.add(instructions::end());
        self.code.set(p + num + 2, so - oecssub);
        self.code.set(p + num + 3, self.strs.soffs() - so);
        self.code.set(p + num + 4, self.npats);
        self.code.set(p + 1, num as u32);

        self.line_base = old_base;
        self.npats = onp;
        self.strs.set_ssub(oecssub);
        // Leave the body's dedup scope behind: its references are
        // relative to the body pool and must not be reused outside.
        self.strs.enter_func();

        let skip = (self.code.used() - 1 - p) as u32;
        self.code.set(p, instructions::funcdef(skip));
        true
    }

    // time : TIME sublist2
    fn par_time(&mut self) -> bool {
        self.yylex();

        let p = self.code.add(0);
        self.code.add(0);
        let mut c = false;
        match self.par_sublist2(&mut c) {
            None => {
                self.del_word(p + 1);
                self.code.set(p, instructions::timed(TIMED_EMPTY));
            }
            Some(f) => {
                self.code.set(p, instructions::timed(TIMED_PIPE));
                let skip = self.code.used() - 2 - p;
                self.set_sublist_code(p + 1, SUBLIST_END, f, skip, c);
            }
        }
        true
    }

    // dinbrack : DINBRACK cond DOUTBRACK
    fn par_dinbrack(&mut self) -> bool {
        let oecused = self.code.used();

        self.modes.incond = 1;
        self.modes.incmdpos = false;
        self.yylex();
        self.par_cond();
        if self.tok.tok != Tok::DOutBrack {
            self.modes.incond = 0;
            return self.fail(oecused);
        }
        self.modes.incond = 0;
        self.modes.incmdpos = true;
        self.yylex();
        true
    }

    // simple : { NOCORRECT | ENVSTRING | ENVARRAY wordlist OUTPAR }
    //          { STRING | redir }
    //          [ INOUTPAR { SEPER } ( list1 | INBRACE list OUTBRACE ) ]
    //
    // Returns the number of redirections parsed inside, or None when the
    // production matched nothing (or failed hard).
    fn par_simple(&mut self, complex: &mut bool, nr: usize) -> Option<usize> {
        let oecused = self.code.used();
        let mut isnull = true;
        let mut r = self.code.used();
        let mut argc = 0usize;
        let mut isfunc = false;
        let mut sr = 0usize;

        loop {
            match self.tok.tok {
                Tok::NoCorrect => {
                    *complex = true;
                }
                Tok::EnvString => {
                    self.code
                        .add(instructions::assign(ASSIGN_SCALAR, 0));
                    let text = self.tok.text.clone();
                    let (name, val) = split_env(&text);
                    let w = self.strs.code(name);
                    self.code.add(w);
                    let w = self.strs.code(val);
                    self.code.add(w);
                    isnull = false;
                }
                Tok::EnvArray => {
                    let p = self.code.add(0);
                    let oldcmdpos = self.modes.incmdpos;
                    self.modes.incmdpos = false;
                    let text = self.tok.text.clone();
                    let w = self.strs.code(&text);
                    self.code.add(w);
                    self.cmd_stack.push(CmdContext::Array);
                    self.yylex();
                    let n = self.par_nl_wordlist();
                    self.code.set(p, instructions::assign(ASSIGN_ARRAY, n));
                    self.cmd_stack.pop();
                    if self.tok.tok != Tok::OutPar {
                        self.fail(oecused);
                        return None;
                    }
                    self.modes.incmdpos = oldcmdpos;
                    isnull = false;
                }
                _ => break,
            }
            self.yylex();
        }
        if self.tok.tok == Tok::Amper || self.tok.tok == Tok::AmperBang {
            self.fail(oecused);
            return None;
        }

        let mut p = self.code.add(instructions::simple(0));

        loop {
            match self.tok.tok {
                Tok::String => {
                    self.modes.incmdpos = false;
                    let text = self.tok.text.clone();
                    let w = self.strs.code(&text);
                    self.code.add(w);
                    argc += 1;
                    self.yylex();
                }
                Tok::Redir(_) => {
                    *complex = true;
                    if !self.par_redir(&mut r) {
                        return None;
                    }
                    p += 3;
                    sr += 1;
                }
                Tok::InOutPar => {
                    // name () body: the simple command becomes a function
                    // definition over the collected words.
                    *complex = true;
                    let old_base = self.line_base;
                    let oecssub = self.strs.ssub();
                    self.line_base = self.tok.line.saturating_sub(1);
                    self.modes.incmdpos = true;
                    self.cmd_stack.push(CmdContext::FuncDef);
                    self.yylex();
                    while self.tok.tok == Tok::Seper {
                        self.yylex();
                    }

                    self.ins_space(p + 1, 1);
                    self.code.set(p + 1, argc as u32);
                    self.code.add(0);
                    self.code.add(0);
                    self.code.add(0);

                    self.strs.enter_func();
                    let so = self.strs.soffs();
                    self.strs.set_ssub(so);
                    let onp = self.npats;
                    self.npats = 0;

                    if self.tok.tok == Tok::InBrace {
                        self.yylex();
                        let mut c = false;
                        self.par_list(&mut c);
                        if self.tok.tok != Tok::OutBrace {
                            self.cmd_stack.pop();
                            self.line_base = old_base;
                            self.npats = onp;
                            self.strs.set_ssub(oecssub);
                            self.fail(oecused);
                            return None;
                        }
                        self.yylex();
                    } else {
                        // Single-command body: wrap it in a synthetic
                        // list and sublist.
                        let ll = self.code.add(0);
                        let sl = self.code.add(0);
                        let mut c = false;
                        if !self.par_cmd(&mut c) {
                            self.cmd_stack.pop();
                            self.line_base = old_base;
                            self.npats = onp;
                            self.strs.set_ssub(oecssub);
                            self.fail(oecused);
                            return None;
                        }
                        let skip = self.code.used() - 1 - sl;
                        self.set_sublist_code(sl, SUBLIST_END, 0, skip, c);
                        self.set_list_code(ll, Z_SYNC | Z_END, c);
                    }
                    self.cmd_stack.pop();

                    self.code.add(instructions::end());
                    self.code.set(p + argc + 2, so - oecssub);
                    self.code.set(p + argc + 3, self.strs.soffs() - so);
                    self.code.set(p + argc + 4, self.npats);

                    self.line_base = old_base;
                    self.npats = onp;
                    self.strs.set_ssub(oecssub);
                    self.strs.enter_func();

                    let skip = (self.code.used() - 1 - p) as u32;
                    self.code.set(p, instructions::funcdef(skip));
                    isfunc = true;
                }
                _ => break,
            }
            isnull = false;
        }
        if isnull && sr + nr == 0 {
            self.code.truncate(p);
            return None;
        }
        self.modes.incmdpos = true;

        if !isfunc {
            self.code.set(p, instructions::simple(argc as u32));
        }
        Some(sr)
    }

    // redir : ( OUTANG | ... | TRINANG ) STRING
    fn par_redir(&mut self, rp: &mut usize) -> bool {
        let r = *rp;
        let mut ty = match self.tok.tok {
            Tok::Redir(ty) => ty,
            _ => return self.fail(self.code.used()),
        };
        let fd = self.tok.fd;
        let oldcmdpos = self.modes.incmdpos;

        self.modes.incmdpos = false;
        self.yylex();
        if self.tok.tok != Tok::String && self.tok.tok != Tok::EnvString {
            return self.fail(self.code.used());
        }
        self.modes.incmdpos = oldcmdpos;

        let fd1 = if fd == -1 { ty.default_fd() } else { fd as u32 };
        let name = self.tok.text.clone();

        match ty {
            RedirType::Heredoc | RedirType::HeredocDash => {
                // <<[-] delim: reserve the three-word slot now; the body
                // string is patched in when it has been read.
                self.ins_space(r, 3);
                *rp = r + 3;
                self.code.set(r, instructions::redir(ty));
                self.code.set(r + 1, fd1);
                self.hdocs.push(Heredoc {
                    slot: r,
                    delim: name,
                    ty,
                });
                self.yylex();
                return true;
            }
            RedirType::Write | RedirType::WriteNow => {
                if name.starts_with(&[chars::OUTANG, chars::INPAR]) {
                    // > >(...)
                    ty = RedirType::OutPipe;
                } else if name.starts_with(&[chars::INANG, chars::INPAR]) {
                    return self.fail(self.code.used());
                }
            }
            RedirType::Read => {
                if name.starts_with(&[chars::INANG, chars::INPAR]) {
                    // < <(...)
                    ty = RedirType::InPipe;
                } else if name.starts_with(&[chars::OUTANG, chars::INPAR]) {
                    return self.fail(self.code.used());
                }
            }
            RedirType::ReadWrite => {
                if name.starts_with(&[chars::INANG, chars::INPAR]) {
                    ty = RedirType::InPipe;
                } else if name.starts_with(&[chars::OUTANG, chars::INPAR]) {
                    ty = RedirType::OutPipe;
                }
            }
            _ => {}
        }
        self.yylex();

        self.ins_space(r, 3);
        *rp = r + 3;
        self.code.set(r, instructions::redir(ty));
        self.code.set(r + 1, fd1);
        let w = self.strs.code(&name);
        self.code.set(r + 2, w);
        true
    }

    // wordlist : { STRING }
    fn par_wordlist(&mut self) -> u32 {
        let mut num = 0;
        while self.tok.tok == Tok::String {
            let text = self.tok.text.clone();
            let w = self.strs.code(&text);
            self.code.add(w);
            num += 1;
            self.yylex();
        }
        num
    }

    // nl_wordlist : { STRING | SEPER }
    fn par_nl_wordlist(&mut self) -> u32 {
        let mut num = 0;
        while self.tok.tok == Tok::String || self.tok.tok == Tok::Seper {
            if self.tok.tok != Tok::Seper {
                let text = self.tok.text.clone();
                let w = self.strs.code(&text);
                self.code.add(w);
                num += 1;
            }
            self.yylex();
        }
        num
    }
}

/// Splits an `name=value` assignment, skipping a balanced `[…]` subscript
/// in the name.
fn split_env(text: &[u8]) -> (&[u8], &[u8]) {
    let mut i = 0;
    while i < text.len() && text[i] != b'=' && text[i] != chars::INBRACK {
        i += 1;
    }
    if i < text.len() && text[i] == chars::INBRACK {
        let mut depth = 0i32;
        let mut j = i;
        while j < text.len() {
            if text[j] == chars::INBRACK {
                depth += 1;
            } else if text[j] == chars::OUTBRACK {
                depth -= 1;
                if depth == 0 {
                    j += 1;
                    break;
                }
            }
            j += 1;
        }
        if depth == 0 && j < text.len() && text[j] == b'=' {
            return (&text[..j], &text[j + 1..]);
        }
    }
    match text.iter().position(|&b| b == b'=') {
        Some(k) => (&text[..k], &text[k + 1..]),
        None => (text, &[]),
    }
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

// Validates a fully parenthesised case pattern, squeezing blanks around
// the alternation bars and stripping the outer parens. False when the
// parens are unbalanced or the pattern is not wholly enclosed.
fn strip_case_parens(pat: &mut Vec<u8>) -> bool {
    let mut i = 0usize;
    let mut pct = 0i32;
    while i < pat.len() {
        let b = pat[i];
        if b == chars::INPAR {
            pct += 1;
        }
        if pct == 0 {
            break;
        }
        if pct == 1 {
            if b == chars::BAR || b == chars::INPAR {
                while i + 1 < pat.len() && is_blank(pat[i + 1]) {
                    pat.remove(i + 1);
                }
            }
            if b == chars::BAR || b == chars::OUTPAR {
                while i >= 1 && is_blank(pat[i - 1]) {
                    pat.remove(i - 1);
                    i -= 1;
                }
            }
        }
        if pat[i] == chars::OUTPAR {
            pct -= 1;
        }
        i += 1;
    }
    if i < pat.len() || pct != 0 || i == 0 {
        return false;
    }
    pat.pop();
    pat.remove(0);
    true
}

/// Compiles a source string to a program with the reference lexer.
///
/// The `aliases` flag is recorded for lexers that expand aliases; the
/// reference lexer performs no alias expansion.
pub fn parse_string(src: &[u8], aliases: bool) -> Result<Eprog, ParseError> {
    let mut lx = StringLexer::new(src, aliases);
    let mut parser = Parser::new(&mut lx, Options::default());
    parser.parse_list()
}
