//! Conditional expression grammar: `[[ … ]]` and the `test` builtin.
//!
//! Both dialects share one grammar; the `test` dialect is selected by the
//! lexer (see [`crate::lex::TestLexer`]) and additionally applies the
//! POSIX argument-count special cases. String equality operators emit a
//! pattern-slot index after their operands so the matcher can compile the
//! right-hand side once.

use crate::constants::*;
use crate::instructions::cond;
use crate::token::Tok;
use crate::Parser;

/// Single-letter unary test operators.
const UNARY_OPS: &[u8] = b"abcdefghknoprstuwxzLONGS";

/// Two-letter binary operator names, in wire order starting at
/// [`COND_NT`].
const BINARY_OPS: [&[u8]; 9] = [
    b"nt", b"ot", b"ef", b"eq", b"ne", b"lt", b"gt", b"le", b"ge",
];

fn get_cond_num(name: &[u8]) -> Option<u32> {
    BINARY_OPS
        .iter()
        .position(|&op| op == name)
        .map(|i| i as u32)
}

impl<'l> Parser<'l> {
    // cond : cond_1 { SEPER } [ DBAR { SEPER } cond ]
    pub(crate) fn par_cond(&mut self) -> bool {
        let p = self.code.used();
        let r = self.par_cond_1();
        while self.tok.tok == Tok::Seper {
            self.yylex();
        }
        if self.tok.tok == Tok::DBar {
            self.yylex();
            while self.tok.tok == Tok::Seper {
                self.yylex();
            }
            self.ins_space(p, 1);
            self.par_cond();
            let skip = (self.code.used() - 1 - p) as u32;
            self.code.set(p, cond(COND_OR, skip));
            return true;
        }
        r
    }

    // cond_1 : cond_2 { SEPER } [ DAMPER { SEPER } cond_1 ]
    fn par_cond_1(&mut self) -> bool {
        let p = self.code.used();
        let r = self.par_cond_2();
        while self.tok.tok == Tok::Seper {
            self.yylex();
        }
        if self.tok.tok == Tok::DAmper {
            self.yylex();
            while self.tok.tok == Tok::Seper {
                self.yylex();
            }
            self.ins_space(p, 1);
            self.par_cond_1();
            let skip = (self.code.used() - 1 - p) as u32;
            self.code.set(p, cond(COND_AND, skip));
            return true;
        }
        r
    }

    // cond_2 : BANG cond_2
    //        | INPAR { SEPER } cond_2 { SEPER } OUTPAR
    //        | STRING STRING STRING
    //        | STRING STRING
    //        | STRING ( INANG | OUTANG ) STRING
    fn par_cond_2(&mut self) -> bool {
        if self.lex.is_test() {
            // POSIX 1003.2 special cases for the test builtin.
            if self.tok.tok == Tok::NullTok {
                // No arguments: false.
                return self.par_cond_double(b"-n", b"");
            }
            if self.lex.test_remaining().is_empty() {
                // One argument: [ foo ] is [ -n foo ].
                let s1 = self.tok.text.clone();
                self.yylex();
                return self.par_cond_double(b"-n", &s1);
            }
            if self.lex.test_remaining().len() == 2 {
                // Three arguments with a binary operator in the middle.
                let op = self.lex.test_remaining()[0].clone();
                let known = op == b"=" || op == b"==" || op == b"!="
                    || (op.first() == Some(&b'-')
                        && op.len() > 1
                        && get_cond_num(&op[1..]).is_some());
                if known {
                    let s1 = self.tok.text.clone();
                    self.yylex();
                    let s2 = self.tok.text.clone();
                    self.yylex();
                    let s3 = self.tok.text.clone();
                    self.yylex();
                    return self.par_cond_triple(&s1, &s2, &s3);
                }
            }
        }
        if self.tok.tok == Tok::Bang {
            self.yylex();
            self.code.add(cond(COND_NOT, 0));
            return self.par_cond_2();
        }
        if self.tok.tok == Tok::InPar {
            self.yylex();
            while self.tok.tok == Tok::Seper {
                self.yylex();
            }
            let r = self.par_cond();
            while self.tok.tok == Tok::Seper {
                self.yylex();
            }
            if self.tok.tok != Tok::OutPar {
                let used = self.code.used();
                return self.fail(used);
            }
            self.yylex();
            return r;
        }
        if self.tok.tok != Tok::String {
            if self.tok.tok != Tok::NullTok
                && self.tok.tok != Tok::LexErr
                && self.lex.is_test()
            {
                let s1 = self.tok.text.clone();
                self.yylex();
                return self.par_cond_double(b"-n", &s1);
            }
            let used = self.code.used();
            return self.fail(used);
        }
        let s1 = self.tok.text.clone();
        let dble = self.lex.is_test()
            && s1.len() == 2
            && s1[0] == b'-'
            && UNARY_OPS.contains(&s1[1]);
        self.yylex();
        if self.tok.tok == Tok::InAng || self.tok.tok == Tok::OutAng {
            let xtok = self.tok.tok;
            self.yylex();
            if self.tok.tok != Tok::String {
                let used = self.code.used();
                return self.fail(used);
            }
            let s3 = self.tok.text.clone();
            self.yylex();
            self.code.add(cond(
                if xtok == Tok::InAng {
                    COND_STRLT
                } else {
                    COND_STRGTR
                },
                0,
            ));
            let w = self.strs.code(&s1);
            self.code.add(w);
            let w = self.strs.code(&s3);
            self.code.add(w);
            return true;
        }
        if self.tok.tok != Tok::String {
            if self.tok.tok != Tok::LexErr && self.lex.is_test() {
                if !dble {
                    return self.par_cond_double(b"-n", &s1);
                }
                if s1 == b"-t" {
                    // -t with no argument tests the terminal on stdout.
                    return self.par_cond_double(&s1, b"1");
                }
                return self.cond_error("condition expected", &s1);
            }
            let used = self.code.used();
            return self.fail(used);
        }
        let s2 = self.tok.text.clone();
        self.modes.incond += 1; // parentheses do globbing
        self.yylex();
        self.modes.incond -= 1; // parentheses do grouping
        if self.tok.tok == Tok::String && !dble {
            let s3 = self.tok.text.clone();
            self.yylex();
            if self.tok.tok == Tok::String {
                let mut args = vec![s2, s3];
                while self.tok.tok == Tok::String {
                    args.push(self.tok.text.clone());
                    self.yylex();
                }
                self.par_cond_multi(&s1, args)
            } else {
                self.par_cond_triple(&s1, &s2, &s3)
            }
        } else {
            self.par_cond_double(&s1, &s2)
        }
    }

    fn par_cond_double(&mut self, a: &[u8], b: &[u8]) -> bool {
        if a.first() != Some(&b'-') || a.len() < 2 {
            return self.cond_error("parse error: condition expected", a);
        }
        if a.len() == 2 && UNARY_OPS.contains(&a[1]) {
            self.code.add(cond(a[1] as u32, 0));
            let w = self.strs.code(b);
            self.code.add(w);
        } else {
            // Module-provided test: name plus one argument.
            self.code.add(cond(COND_MOD, 1));
            let w = self.strs.code(a);
            self.code.add(w);
            let w = self.strs.code(b);
            self.code.add(w);
        }
        true
    }

    fn par_cond_triple(&mut self, a: &[u8], b: &[u8], c: &[u8]) -> bool {
        let bu = crate::token::untokenize(b);
        if bu == b"=" || bu == b"==" {
            self.code.add(cond(COND_STREQ, 0));
            let w = self.strs.code(a);
            self.code.add(w);
            let w = self.strs.code(c);
            self.code.add(w);
            let slot = self.npats;
            self.npats += 1;
            self.code.add(slot);
        } else if bu == b"!=" {
            self.code.add(cond(COND_STRNEQ, 0));
            let w = self.strs.code(a);
            self.code.add(w);
            let w = self.strs.code(c);
            self.code.add(w);
            let slot = self.npats;
            self.npats += 1;
            self.code.add(slot);
        } else if b.first() == Some(&b'-') {
            if let Some(n) = get_cond_num(&b[1..]) {
                self.code.add(cond(COND_NT + n, 0));
                let w = self.strs.code(a);
                self.code.add(w);
                let w = self.strs.code(c);
                self.code.add(w);
            } else {
                // Module-provided infix test.
                self.code.add(cond(COND_MODI, 0));
                let w = self.strs.code(b);
                self.code.add(w);
                let w = self.strs.code(a);
                self.code.add(w);
                let w = self.strs.code(c);
                self.code.add(w);
            }
        } else if a.first() == Some(&b'-') && a.len() > 1 {
            self.code.add(cond(COND_MOD, 2));
            let w = self.strs.code(a);
            self.code.add(w);
            let w = self.strs.code(b);
            self.code.add(w);
            let w = self.strs.code(c);
            self.code.add(w);
        } else {
            return self.cond_error("condition expected", b);
        }
        true
    }

    fn par_cond_multi(&mut self, a: &[u8], args: Vec<Vec<u8>>) -> bool {
        if a.first() != Some(&b'-') || a.len() < 2 {
            return self.cond_error("condition expected", a);
        }
        self.code.add(cond(COND_MOD, args.len() as u32));
        let w = self.strs.code(a);
        self.code.add(w);
        for s in &args {
            let w = self.strs.code(s);
            self.code.add(w);
        }
        true
    }

    fn cond_error(&mut self, what: &str, text: &[u8]) -> bool {
        let plain = crate::token::untokenize(text);
        self.errs
            .report(format!("{}: {}", what, String::from_utf8_lossy(&plain)));
        self.tok.tok = Tok::LexErr;
        false
    }
}
