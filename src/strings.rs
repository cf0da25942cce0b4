//! String pool and the word-sized string encodings.
//!
//! A string reference is one code word. Empty and 1–3 byte strings are
//! packed into the word itself; anything longer lands in the pool and the
//! word carries its byte offset. Pool entries are deduplicated, but only
//! within one function-nesting scope: each nested function body gets a
//! self-contained pool sub-range, so its references are relative to the
//! scope base and cannot alias strings outside it.

use crate::constants::*;
use crate::token::has_tokens;
use crate::Wordcode;
use std::borrow::Cow;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct StrPool {
    /// Pool entries in insertion order; the pool bytes are their
    /// NUL-terminated concatenation.
    entries: Vec<Vec<u8>>,
    /// Dedup index over (bytes, function-nesting id).
    index: HashMap<(Vec<u8>, u32), Wordcode>,
    soffs: u32,
    ssub: u32,
    nfunc: u32,
}

impl StrPool {
    pub fn new() -> StrPool {
        StrPool::default()
    }

    /// Builds the reference word for `s`, adding it to the pool if it is
    /// too long to inline and not already present in this scope.
    pub fn code(&mut self, s: &[u8]) -> Wordcode {
        let t = has_tokens(s) as u32;
        if s.is_empty() {
            return STR_EMPTY | t;
        }
        if s.len() <= STR_SHORT_MAX {
            let mut c = STR_SHORT_BIT | t;
            for (i, &b) in s.iter().enumerate() {
                c |= (b as u32) << (STR_CHAR0_SHIFT + 8 * i as u32);
            }
            return c;
        }
        let key = (s.to_vec(), self.nfunc);
        if let Some(&c) = self.index.get(&key) {
            return c;
        }
        let c = ((self.soffs - self.ssub) << STR_OFFSET_SHIFT) | t;
        self.soffs += s.len() as u32 + 1;
        self.entries.push(key.0.clone());
        self.index.insert(key, c);
        c
    }

    /// Current pool byte offset, including NUL terminators.
    pub fn soffs(&self) -> u32 {
        self.soffs
    }

    /// Current sub-scope base. References are emitted relative to this.
    pub fn ssub(&self) -> u32 {
        self.ssub
    }

    pub fn set_ssub(&mut self, ssub: u32) {
        self.ssub = ssub;
    }

    /// Enters the next function-nesting scope. Never reused, so strings
    /// from distinct bodies cannot dedup against each other.
    pub fn enter_func(&mut self) {
        self.nfunc += 1;
    }

    /// The pool contents: every entry in insertion order, NUL-terminated.
    pub fn pool_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.soffs as usize);
        for e in &self.entries {
            out.extend_from_slice(e);
            out.push(0);
        }
        out
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.soffs = 0;
        self.ssub = 0;
        self.nfunc = 0;
    }
}

/// Decodes a string-reference word against the given pool bytes.
///
/// The second result is the has-tokens flag. Pool offsets are taken
/// relative to the start of `pool`; callers inside a nested function body
/// pass that body's sub-range.
pub fn decode_str<'p>(c: Wordcode, pool: &'p [u8]) -> (Cow<'p, [u8]>, bool) {
    let tok = c & STR_TOKEN_BIT != 0;
    if c | STR_TOKEN_BIT == STR_EMPTY | STR_TOKEN_BIT {
        return (Cow::Borrowed(&[]), tok);
    }
    if c & STR_SHORT_BIT != 0 {
        let mut buf = Vec::with_capacity(STR_SHORT_MAX);
        for i in 0..STR_SHORT_MAX as u32 {
            let b = ((c >> (STR_CHAR0_SHIFT + 8 * i)) & 0xff) as u8;
            if b == 0 {
                break;
            }
            buf.push(b);
        }
        return (Cow::Owned(buf), tok);
    }
    let offs = (c >> STR_OFFSET_SHIFT) as usize;
    let rest = &pool[offs..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    (Cow::Borrowed(&rest[..end]), tok)
}
