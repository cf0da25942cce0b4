//! Finished word-code programs.
//!
//! A program owns its code words, its string pool, and a side table of
//! pattern slots (one per pattern index the compiler handed out). The
//! word and pool views behave as one contiguous block: pool offsets are
//! relative to the pool start and survive duplication unchanged.
//!
//! Programs either own their storage ([`Alloc::Heap`] fresh from the
//! compiler, [`Alloc::Real`] for long-lived duplicates) or alias a mapped
//! dump file ([`Alloc::Map`]); mapped storage is shared through a
//! reference-counted [`Backing`] handle and released when the last
//! program referring into it goes away.

use crate::instructions::{self, RedirType, WcKind};
use crate::strings::decode_str;
use crate::Wordcode;
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Bytes charged per pattern slot in a program's combined length.
pub const PAT_BYTES: u32 = 8;

/// Where a program's storage lives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Alloc {
    /// Freshly built by the compiler.
    Heap,
    /// Heap-owned duplicate for long life.
    Real,
    /// Aliases a memory-mapped dump.
    Map,
}

/// Read-only byte store a mapped program aliases into.
pub trait Backing: Send + Sync {
    fn bytes(&self) -> &[u8];
}

/// Slot for one compiled pattern.
///
/// The compiler only reserves slots; the matcher fills them in on first
/// use. The payload is opaque to this crate.
#[derive(Clone, Default)]
pub struct PatSlot(Option<Arc<dyn Any + Send + Sync>>);

impl PatSlot {
    pub fn placeholder() -> PatSlot {
        PatSlot(None)
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.is_none()
    }

    pub fn fill(&mut self, pat: Arc<dyn Any + Send + Sync>) {
        self.0 = Some(pat);
    }

    pub fn get(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.0.as_deref()
    }
}

impl fmt::Debug for PatSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            write!(f, "PatSlot(placeholder)")
        } else {
            write!(f, "PatSlot(compiled)")
        }
    }
}

enum Store {
    Owned {
        words: Vec<Wordcode>,
        strs: Vec<u8>,
    },
    Mapped {
        map: Arc<dyn Backing>,
        start_word: usize,
        nwords: usize,
        strs_len: usize,
    },
}

/// One compiled program.
pub struct Eprog {
    store: Store,
    pats: Vec<PatSlot>,
    alloc: Alloc,
}

impl Eprog {
    /// Builds a program from owned parts. The pattern slots start out as
    /// placeholders.
    pub fn from_parts(words: Vec<Wordcode>, strs: Vec<u8>, npats: usize, alloc: Alloc) -> Eprog {
        Eprog {
            store: Store::Owned { words, strs },
            pats: vec![PatSlot::placeholder(); npats],
            alloc,
        }
    }

    /// Builds a program aliasing `map`. `start_word` is the word offset of
    /// the body within the backing, `nwords` its code length, `strs_len`
    /// the pool byte length following the code.
    pub fn mapped(
        map: Arc<dyn Backing>,
        start_word: usize,
        nwords: usize,
        strs_len: usize,
        npats: usize,
    ) -> Eprog {
        Eprog {
            store: Store::Mapped {
                map,
                start_word,
                nwords,
                strs_len,
            },
            pats: vec![PatSlot::placeholder(); npats],
            alloc: Alloc::Map,
        }
    }

    pub fn alloc(&self) -> Alloc {
        self.alloc
    }

    pub fn npats(&self) -> usize {
        self.pats.len()
    }

    pub fn pats(&self) -> &[PatSlot] {
        &self.pats[..]
    }

    pub fn pats_mut(&mut self) -> &mut [PatSlot] {
        &mut self.pats[..]
    }

    /// The code words.
    pub fn prog(&self) -> &[Wordcode] {
        match &self.store {
            Store::Owned { words, .. } => &words[..],
            Store::Mapped {
                map,
                start_word,
                nwords,
                ..
            } => {
                let bytes = &map.bytes()[start_word * 4..(start_word + nwords) * 4];
                // Mapped files are page-aligned and bodies start on word
                // boundaries, so the cast cannot misalign.
                unsafe {
                    std::slice::from_raw_parts(bytes.as_ptr() as *const Wordcode, *nwords)
                }
            }
        }
    }

    /// The string-pool bytes following the code.
    pub fn strs(&self) -> &[u8] {
        match &self.store {
            Store::Owned { strs, .. } => &strs[..],
            Store::Mapped {
                map,
                start_word,
                nwords,
                strs_len,
            } => {
                let start = (start_word + nwords) * 4;
                &map.bytes()[start..start + strs_len]
            }
        }
    }

    /// Combined byte length: pattern slots, code words, pool bytes.
    pub fn len(&self) -> usize {
        self.pats.len() * PAT_BYTES as usize + self.prog().len() * 4 + self.strs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.prog().is_empty()
    }

    /// Deep clone into heap-owned storage. The word-to-pool offsets are
    /// unchanged, so every string reference in the copy stays valid;
    /// pattern slots restart as placeholders.
    pub fn dup(&self) -> Eprog {
        Eprog::from_parts(
            self.prog().to_vec(),
            self.strs().to_vec(),
            self.pats.len(),
            Alloc::Real,
        )
    }
}

impl fmt::Debug for Eprog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Eprog")
            .field("alloc", &self.alloc)
            .field("words", &self.prog().len())
            .field("strs", &self.strs().len())
            .field("npats", &self.pats.len())
            .finish()
    }
}

static FREE_LIST: Mutex<Vec<Eprog>> = Mutex::new(Vec::new());

/// Enqueues a program for deferred release. Pattern slots stay alive
/// until the next [`free_queued_progs`], so handles still on an execution
/// stack cannot dangle.
pub fn free_prog(p: Eprog) {
    FREE_LIST.lock().unwrap().push(p);
}

/// Releases every queued program.
pub fn free_queued_progs() {
    FREE_LIST.lock().unwrap().clear();
}

/// Decodes the string reference at word index `idx`.
pub fn raw_str(prog: &Eprog, idx: usize) -> (Cow<'_, [u8]>, bool) {
    decode_str(prog.prog()[idx], prog.strs())
}

/// One decoded redirection.
#[derive(Clone, Debug, PartialEq)]
pub struct Redir {
    pub ty: RedirType,
    pub fd: u32,
    pub name: Vec<u8>,
}

/// Cursor over a program, for executors and tests.
pub struct Estate<'p> {
    prog: &'p Eprog,
    pc: usize,
    strs_base: usize,
}

impl<'p> Estate<'p> {
    pub fn new(prog: &'p Eprog) -> Estate<'p> {
        Estate {
            prog,
            pc: 0,
            strs_base: 0,
        }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// Shifts string decoding to a nested function body's pool sub-range.
    pub fn set_strs_base(&mut self, base: usize) {
        self.strs_base = base;
    }

    pub fn peek(&self) -> Wordcode {
        self.prog.prog()[self.pc]
    }

    /// Reads the word under the cursor and advances.
    pub fn word(&mut self) -> Wordcode {
        let c = self.prog.prog()[self.pc];
        self.pc += 1;
        c
    }

    /// Reads one string reference.
    pub fn get_str(&mut self) -> (Cow<'p, [u8]>, bool) {
        let c = self.word();
        decode_str(c, &self.prog.strs()[self.strs_base..])
    }

    /// Reads `num` string references; the flag is the OR of their
    /// has-tokens bits.
    pub fn get_arr(&mut self, num: usize) -> (Vec<Cow<'p, [u8]>>, bool) {
        let mut out = Vec::with_capacity(num);
        let mut tok = false;
        for _ in 0..num {
            let (s, t) = self.get_str();
            tok |= t;
            out.push(s);
        }
        (out, tok)
    }

    /// Reads the run of redirections under the cursor, leaving it on the
    /// first non-redirection word.
    pub fn get_redirs(&mut self) -> Vec<Redir> {
        let mut out = Vec::new();
        while self.pc < self.prog.prog().len()
            && instructions::wc_kind(self.peek()) == Some(WcKind::Redir)
        {
            let c = self.word();
            let ty = match instructions::redir_type(c) {
                Some(ty) => ty,
                None => break,
            };
            let fd = self.word();
            let (name, _) = self.get_str();
            out.push(Redir {
                ty,
                fd,
                name: name.into_owned(),
            });
        }
        out
    }
}
