use crate::constants::*;
use crate::instructions::{self, Instr, WcKind};
use crate::program::Eprog;
use crate::strings::decode_str;

mod invariants;
mod parse;

pub fn compile(src: &[u8]) -> Eprog {
    match crate::parse_string(src, true) {
        Ok(p) => p,
        Err(e) => panic!("compile of {:?} failed: {:?}", String::from_utf8_lossy(src), e),
    }
}

pub fn compile_err(src: &[u8]) -> crate::ParseError {
    match crate::parse_string(src, true) {
        Ok(p) => panic!(
            "compile of {:?} unexpectedly succeeded: {:?}",
            String::from_utf8_lossy(src),
            p
        ),
        Err(e) => e,
    }
}

pub fn str_at(p: &Eprog, i: usize) -> Vec<u8> {
    let (s, _) = decode_str(p.prog()[i], p.strs());
    s.into_owned()
}

pub fn plain_str_at(p: &Eprog, i: usize) -> Vec<u8> {
    crate::token::untokenize(&str_at(p, i))
}

/// Walks the whole program, checking that every skip-offset points one
/// past its construct's body and that the structure is well formed.
pub fn assert_wellformed(p: &Eprog) {
    let w = p.prog();
    assert!(!w.is_empty());
    assert_eq!(
        instructions::wc_kind(*w.last().unwrap()),
        Some(WcKind::End),
        "program must end with END"
    );
    let end = walk_list(w, 0);
    assert_eq!(end, w.len() - 1, "list chain must stop at the final END");
}

fn walk_list(w: &[u32], mut i: usize) -> usize {
    loop {
        if instructions::wc_kind(w[i]) == Some(WcKind::End) {
            return i;
        }
        assert_eq!(
            instructions::wc_kind(w[i]),
            Some(WcKind::List),
            "expected a list header at {}",
            i
        );
        let ty = instructions::list_type(w[i]);
        let next = i + 1 + instructions::list_skip(w[i]) as usize;
        assert!(next <= w.len(), "list skip at {} overruns the program", i);
        if ty & Z_SIMPLE != 0 {
            // line number, then the bare command
            let e = walk_cmd(w, i + 2);
            assert_eq!(e, next, "simple list at {} has a bad skip", i);
        } else {
            let e = walk_sublist(w, i + 1);
            assert_eq!(e, next, "list at {} has a bad skip", i);
        }
        if ty & Z_END != 0 {
            return next;
        }
        i = next;
    }
}

fn walk_sublist(w: &[u32], i: usize) -> usize {
    assert_eq!(instructions::wc_kind(w[i]), Some(WcKind::Sublist));
    let ty = instructions::sublist_type(w[i]);
    let flags = instructions::sublist_flags(w[i]);
    let next = i + 1 + instructions::sublist_skip(w[i]) as usize;
    let e = if flags & SUBLIST_SIMPLE != 0 {
        walk_cmd(w, i + 2)
    } else {
        walk_pipe(w, i + 1)
    };
    assert_eq!(e, next, "sublist at {} has a bad skip", i);
    if ty == SUBLIST_END {
        e
    } else {
        walk_sublist(w, next)
    }
}

fn walk_pipe(w: &[u32], i: usize) -> usize {
    assert_eq!(instructions::wc_kind(w[i]), Some(WcKind::Pipe));
    if instructions::pipe_type(w[i]) == PIPE_MID {
        let next = i + 1 + w[i + 1] as usize;
        let e = walk_cmd(w, i + 2);
        assert_eq!(e, next, "pipe at {} has a bad skip word", i);
        walk_pipe(w, next)
    } else {
        walk_cmd(w, i + 1)
    }
}

// A body list emitted inside a construct: an empty one is a single END
// word, a non-empty one is a list chain without a trailing END.
fn walk_body_list(w: &[u32], i: usize) -> usize {
    if instructions::wc_kind(w[i]) == Some(WcKind::End) {
        return i + 1;
    }
    walk_list(w, i)
}

fn walk_cmd(w: &[u32], mut i: usize) -> usize {
    while instructions::wc_kind(w[i]) == Some(WcKind::Redir) {
        i += 3;
    }
    while instructions::wc_kind(w[i]) == Some(WcKind::Assign) {
        i += match instructions::decode(w[i]).unwrap() {
            Instr::Assign { array: false, .. } => 3,
            Instr::Assign { array: true, count } => 2 + count as usize,
            _ => unreachable!(),
        };
    }
    match instructions::decode(w[i]).expect("command head") {
        Instr::Simple { argc } => i + 1 + argc as usize,
        Instr::Subsh | Instr::Cursh => walk_body_list(w, i + 1),
        Instr::Timed { pipe } => {
            if pipe {
                walk_sublist(w, i + 1)
            } else {
                i + 1
            }
        }
        Instr::Funcdef { skip } => {
            let end = i + 1 + skip as usize;
            let names = w[i + 1] as usize;
            let body = i + 2 + names + 3;
            let e = walk_list(w, body);
            assert_eq!(instructions::wc_kind(w[e]), Some(WcKind::End));
            assert_eq!(e + 1, end, "funcdef at {} has a bad skip", i);
            end
        }
        Instr::For { ty, skip } => {
            let end = i + 1 + skip as usize;
            let body = match ty {
                FOR_COND => i + 4,
                FOR_PPARAM => i + 2,
                FOR_LIST => i + 3 + w[i + 2] as usize,
                _ => panic!("bad for type"),
            };
            let e = walk_body_list(w, body);
            assert_eq!(e, end, "for at {} has a bad skip", i);
            end
        }
        Instr::Select { ty, skip } => {
            let end = i + 1 + skip as usize;
            let body = match ty {
                SELECT_PPARAM => i + 2,
                SELECT_LIST => i + 3 + w[i + 2] as usize,
                _ => panic!("bad select type"),
            };
            let e = walk_body_list(w, body);
            assert_eq!(e, end, "select at {} has a bad skip", i);
            end
        }
        Instr::While { skip, .. } => {
            let end = i + 1 + skip as usize;
            let mid = walk_body_list(w, i + 1);
            let e = walk_body_list(w, mid);
            assert_eq!(e, end, "while at {} has a bad skip", i);
            end
        }
        Instr::Repeat { skip } => {
            let end = i + 1 + skip as usize;
            let e = walk_body_list(w, i + 2);
            assert_eq!(e, end, "repeat at {} has a bad skip", i);
            end
        }
        Instr::Case { ty, skip } => {
            assert_eq!(ty, CASE_HEAD, "case must start with its head");
            let end = i + 1 + skip as usize;
            let mut pos = i + 2; // discriminant string at i + 1
            while pos < end {
                match instructions::decode(w[pos]).unwrap() {
                    Instr::Case { ty, skip } => {
                        assert!(ty == CASE_OR || ty == CASE_AND);
                        let bnext = pos + 1 + skip as usize;
                        // pattern string, pattern slot, branch body
                        let e = walk_body_list(w, pos + 3);
                        assert_eq!(e, bnext, "case branch at {} has a bad skip", pos);
                        pos = bnext;
                    }
                    other => panic!("expected case branch at {}, got {:?}", pos, other),
                }
            }
            assert_eq!(pos, end);
            end
        }
        Instr::If { ty, skip } => {
            assert_eq!(ty, IF_HEAD, "if must start with its head");
            let end = i + 1 + skip as usize;
            let mut pos = i + 1;
            while pos < end {
                match instructions::decode(w[pos]).unwrap() {
                    Instr::If { ty, skip } => {
                        let anext = pos + 1 + skip as usize;
                        match ty {
                            IF_IF | IF_ELIF => {
                                let mid = walk_body_list(w, pos + 1);
                                let e = walk_body_list(w, mid);
                                assert_eq!(e, anext, "if arm at {} has a bad skip", pos);
                            }
                            IF_ELSE => {
                                let e = walk_body_list(w, pos + 1);
                                assert_eq!(e, anext, "else arm at {} has a bad skip", pos);
                            }
                            _ => panic!("bad if arm type"),
                        }
                        pos = anext;
                    }
                    other => panic!("expected if arm at {}, got {:?}", pos, other),
                }
            }
            assert_eq!(pos, end);
            end
        }
        Instr::Cond { .. } => walk_cond(w, i),
        Instr::Arith => i + 2,
        Instr::Autofn => i + 1,
        other => panic!("unexpected command head at {}: {:?}", i, other),
    }
}

fn walk_cond(w: &[u32], i: usize) -> usize {
    let (ty, skip) = match instructions::decode(w[i]).unwrap() {
        Instr::Cond { ty, skip } => (ty, skip),
        other => panic!("expected cond at {}, got {:?}", i, other),
    };
    match ty {
        COND_NOT => walk_cond(w, i + 1),
        COND_AND | COND_OR => {
            let end = i + 1 + skip as usize;
            let mid = walk_cond(w, i + 1);
            let e = walk_cond(w, mid);
            assert_eq!(e, end, "cond connective at {} has a bad skip", i);
            end
        }
        COND_STREQ | COND_STRNEQ => i + 4,
        COND_STRLT | COND_STRGTR => i + 3,
        COND_MOD => i + 2 + skip as usize,
        COND_MODI => i + 4,
        t if t >= COND_NT && t <= COND_GE => i + 3,
        t if t > COND_MODI => i + 2, // single-letter unary
        t => panic!("bad cond type {}", t),
    }
}
