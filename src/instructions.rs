//! Construction and inspection of single code words.
//!
//! Builders pack a kind and its data fields into one [`Wordcode`]; the
//! `*_type`/`*_skip`/… accessors recover each field. [`decode`] offers a
//! tagged view over the same bits for consumers that switch on the kind.
//!
//! Skip-offsets follow one convention everywhere: a skip `s` stored on a
//! header at index `p` means the first word past the construct's body is
//! `p + 1 + s`. Skips are always patched forward; no builder accepts a
//! negative value (they are unsigned throughout).

use crate::constants::*;
use crate::Wordcode;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// Instruction kinds, in wire order.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum WcKind {
    End = 0,
    List,
    Sublist,
    Pipe,
    Redir,
    Assign,
    Simple,
    Subsh,
    Cursh,
    Timed,
    Funcdef,
    For,
    Select,
    While,
    Repeat,
    Case,
    If,
    Cond,
    Arith,
    Autofn,
}

/// Redirection types, in wire order.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum RedirType {
    /// `>`
    Write = 0,
    /// `>|`
    WriteNow,
    /// `>>`
    App,
    /// `>>|`
    AppNow,
    /// `&>`
    ErrWrite,
    /// `&>|`
    ErrWriteNow,
    /// `&>>`
    ErrApp,
    /// `&>>|`
    ErrAppNow,
    /// `<>`
    ReadWrite,
    /// `<`
    Read,
    /// `< <(...)`
    InPipe,
    /// `> >(...)`
    OutPipe,
    /// `<<<`
    HereStr,
    /// `<<`
    Heredoc,
    /// `<<-`
    HeredocDash,
    /// `<&`
    MergeIn,
    /// `>&`
    MergeOut,
    /// `>&-` style closes, reserved for the executor
    Close,
}

impl RedirType {
    /// True for redirections whose default file descriptor is 0.
    pub fn is_read(self) -> bool {
        match self {
            RedirType::ReadWrite
            | RedirType::Read
            | RedirType::InPipe
            | RedirType::HereStr
            | RedirType::Heredoc
            | RedirType::HeredocDash
            | RedirType::MergeIn => true,
            _ => false,
        }
    }

    /// File descriptor used when the source gives none.
    pub fn default_fd(self) -> u32 {
        if self.is_read() {
            0
        } else {
            1
        }
    }
}

#[inline]
pub fn wc_code(c: Wordcode) -> u32 {
    c & CODE_MASK
}

#[inline]
pub fn wc_data(c: Wordcode) -> u32 {
    c >> CODE_BITS
}

#[inline]
fn wc_bld(kind: WcKind, data: u32) -> Wordcode {
    (kind as u32) | (data << CODE_BITS)
}

/// Kind of a word, or `None` for values outside the instruction set.
#[inline]
pub fn wc_kind(c: Wordcode) -> Option<WcKind> {
    WcKind::from_u32(wc_code(c))
}

pub fn end() -> Wordcode {
    wc_bld(WcKind::End, 0)
}

pub fn list(ty: u32, skip: u32) -> Wordcode {
    wc_bld(WcKind::List, ty | (skip << LIST_FREE))
}

pub fn list_type(c: Wordcode) -> u32 {
    wc_data(c) & LIST_TYPE_MASK
}

pub fn list_skip(c: Wordcode) -> u32 {
    wc_data(c) >> LIST_FREE
}

pub fn sublist(ty: u32, flags: u32, skip: u32) -> Wordcode {
    wc_bld(WcKind::Sublist, ty | flags | (skip << SUBLIST_FREE))
}

pub fn sublist_type(c: Wordcode) -> u32 {
    wc_data(c) & SUBLIST_TYPE_MASK
}

pub fn sublist_flags(c: Wordcode) -> u32 {
    wc_data(c) & SUBLIST_FLAG_MASK
}

pub fn sublist_skip(c: Wordcode) -> u32 {
    wc_data(c) >> SUBLIST_FREE
}

pub fn pipe(ty: u32, line: u32) -> Wordcode {
    wc_bld(WcKind::Pipe, ty | (line << PIPE_FREE))
}

pub fn pipe_type(c: Wordcode) -> u32 {
    wc_data(c) & PIPE_TYPE_MASK
}

pub fn pipe_line(c: Wordcode) -> u32 {
    wc_data(c) >> PIPE_FREE
}

pub fn redir(ty: RedirType) -> Wordcode {
    wc_bld(WcKind::Redir, ty as u32)
}

pub fn redir_type(c: Wordcode) -> Option<RedirType> {
    RedirType::from_u32(wc_data(c))
}

pub fn assign(ty: u32, count: u32) -> Wordcode {
    wc_bld(WcKind::Assign, ty | (count << ASSIGN_FREE))
}

pub fn assign_type(c: Wordcode) -> u32 {
    wc_data(c) & ASSIGN_TYPE_MASK
}

pub fn assign_count(c: Wordcode) -> u32 {
    wc_data(c) >> ASSIGN_FREE
}

pub fn simple(argc: u32) -> Wordcode {
    wc_bld(WcKind::Simple, argc)
}

pub fn simple_argc(c: Wordcode) -> u32 {
    wc_data(c)
}

pub fn subsh() -> Wordcode {
    wc_bld(WcKind::Subsh, 0)
}

pub fn cursh() -> Wordcode {
    wc_bld(WcKind::Cursh, 0)
}

pub fn timed(ty: u32) -> Wordcode {
    wc_bld(WcKind::Timed, ty)
}

pub fn timed_type(c: Wordcode) -> u32 {
    wc_data(c)
}

pub fn funcdef(skip: u32) -> Wordcode {
    wc_bld(WcKind::Funcdef, skip)
}

pub fn funcdef_skip(c: Wordcode) -> u32 {
    wc_data(c)
}

pub fn for_loop(ty: u32, skip: u32) -> Wordcode {
    wc_bld(WcKind::For, ty | (skip << FOR_FREE))
}

pub fn for_type(c: Wordcode) -> u32 {
    wc_data(c) & FOR_TYPE_MASK
}

pub fn for_skip(c: Wordcode) -> u32 {
    wc_data(c) >> FOR_FREE
}

pub fn select_loop(ty: u32, skip: u32) -> Wordcode {
    wc_bld(WcKind::Select, ty | (skip << SELECT_FREE))
}

pub fn select_type(c: Wordcode) -> u32 {
    wc_data(c) & SELECT_TYPE_MASK
}

pub fn select_skip(c: Wordcode) -> u32 {
    wc_data(c) >> SELECT_FREE
}

pub fn while_loop(ty: u32, skip: u32) -> Wordcode {
    wc_bld(WcKind::While, ty | (skip << WHILE_FREE))
}

pub fn while_type(c: Wordcode) -> u32 {
    wc_data(c) & WHILE_TYPE_MASK
}

pub fn while_skip(c: Wordcode) -> u32 {
    wc_data(c) >> WHILE_FREE
}

pub fn repeat_loop(skip: u32) -> Wordcode {
    wc_bld(WcKind::Repeat, skip)
}

pub fn repeat_skip(c: Wordcode) -> u32 {
    wc_data(c)
}

pub fn case(ty: u32, skip: u32) -> Wordcode {
    wc_bld(WcKind::Case, ty | (skip << CASE_FREE))
}

pub fn case_type(c: Wordcode) -> u32 {
    wc_data(c) & CASE_TYPE_MASK
}

pub fn case_skip(c: Wordcode) -> u32 {
    wc_data(c) >> CASE_FREE
}

pub fn if_cond(ty: u32, skip: u32) -> Wordcode {
    wc_bld(WcKind::If, ty | (skip << IF_FREE))
}

pub fn if_type(c: Wordcode) -> u32 {
    wc_data(c) & IF_TYPE_MASK
}

pub fn if_skip(c: Wordcode) -> u32 {
    wc_data(c) >> IF_FREE
}

pub fn cond(ty: u32, skip: u32) -> Wordcode {
    wc_bld(WcKind::Cond, ty | (skip << COND_FREE))
}

pub fn cond_type(c: Wordcode) -> u32 {
    wc_data(c) & COND_TYPE_MASK
}

pub fn cond_skip(c: Wordcode) -> u32 {
    wc_data(c) >> COND_FREE
}

pub fn arith() -> Wordcode {
    wc_bld(WcKind::Arith, 0)
}

pub fn autofn() -> Wordcode {
    wc_bld(WcKind::Autofn, 0)
}

/// Decoded view of one instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Instr {
    End,
    List { ty: u32, skip: u32 },
    Sublist { ty: u32, flags: u32, skip: u32 },
    Pipe { mid: bool, line: u32 },
    Redir { ty: RedirType },
    Assign { array: bool, count: u32 },
    Simple { argc: u32 },
    Subsh,
    Cursh,
    Timed { pipe: bool },
    Funcdef { skip: u32 },
    For { ty: u32, skip: u32 },
    Select { ty: u32, skip: u32 },
    While { until: bool, skip: u32 },
    Repeat { skip: u32 },
    Case { ty: u32, skip: u32 },
    If { ty: u32, skip: u32 },
    Cond { ty: u32, skip: u32 },
    Arith,
    Autofn,
}

/// Decodes one word; `None` for kinds outside the instruction set and for
/// redirections with an unknown type.
pub fn decode(c: Wordcode) -> Option<Instr> {
    Some(match wc_kind(c)? {
        WcKind::End => Instr::End,
        WcKind::List => Instr::List {
            ty: list_type(c),
            skip: list_skip(c),
        },
        WcKind::Sublist => Instr::Sublist {
            ty: sublist_type(c),
            flags: sublist_flags(c),
            skip: sublist_skip(c),
        },
        WcKind::Pipe => Instr::Pipe {
            mid: pipe_type(c) == PIPE_MID,
            line: pipe_line(c),
        },
        WcKind::Redir => Instr::Redir {
            ty: redir_type(c)?,
        },
        WcKind::Assign => Instr::Assign {
            array: assign_type(c) == ASSIGN_ARRAY,
            count: assign_count(c),
        },
        WcKind::Simple => Instr::Simple {
            argc: simple_argc(c),
        },
        WcKind::Subsh => Instr::Subsh,
        WcKind::Cursh => Instr::Cursh,
        WcKind::Timed => Instr::Timed {
            pipe: timed_type(c) == TIMED_PIPE,
        },
        WcKind::Funcdef => Instr::Funcdef {
            skip: funcdef_skip(c),
        },
        WcKind::For => Instr::For {
            ty: for_type(c),
            skip: for_skip(c),
        },
        WcKind::Select => Instr::Select {
            ty: select_type(c),
            skip: select_skip(c),
        },
        WcKind::While => Instr::While {
            until: while_type(c) == WHILE_UNTIL,
            skip: while_skip(c),
        },
        WcKind::Repeat => Instr::Repeat {
            skip: repeat_skip(c),
        },
        WcKind::Case => Instr::Case {
            ty: case_type(c),
            skip: case_skip(c),
        },
        WcKind::If => Instr::If {
            ty: if_type(c),
            skip: if_skip(c),
        },
        WcKind::Cond => Instr::Cond {
            ty: cond_type(c),
            skip: cond_skip(c),
        },
        WcKind::Arith => Instr::Arith,
        WcKind::Autofn => Instr::Autofn,
    })
}
