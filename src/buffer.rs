//! Growable buffer of code words.
//!
//! The emitter appends into this buffer and later patches header slots by
//! index; pipelines and redirections additionally insert words in the
//! middle, shifting the tail. Nothing outside the compile ever borrows the
//! buffer; the live range is copied into the finished program.

use crate::Wordcode;
use std::ops::{Index, IndexMut};

/// Minimum number of words added per growth step.
const GROW_WORDS: usize = 256;

#[derive(Debug, Default)]
pub struct CodeBuf {
    buf: Vec<Wordcode>,
}

impl CodeBuf {
    pub fn new() -> CodeBuf {
        CodeBuf {
            buf: Vec::with_capacity(GROW_WORDS),
        }
    }

    /// Number of words emitted so far.
    pub fn used(&self) -> usize {
        self.buf.len()
    }

    /// Appends one word and returns its index.
    ///
    /// # Examples
    /// ```
    /// use zwc::buffer::CodeBuf;
    ///
    /// let mut buf = CodeBuf::new();
    /// assert_eq!(buf.add(7), 0);
    /// assert_eq!(buf.add(9), 1);
    /// assert_eq!(buf[1], 9);
    /// ```
    pub fn add(&mut self, c: Wordcode) -> usize {
        self.grow(1);
        self.buf.push(c);
        self.buf.len() - 1
    }

    /// Inserts `n` zero words at position `p`, shifting the tail right.
    pub fn insert_space(&mut self, p: usize, n: usize) {
        self.grow(n);
        for _ in 0..n {
            self.buf.insert(p, 0);
        }
    }

    /// Deletes the word at position `p`, shifting the tail left.
    pub fn delete(&mut self, p: usize) {
        self.buf.remove(p);
    }

    /// Drops every word at or past `len`. Used to abandon partial output
    /// when a production fails.
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    pub fn set(&mut self, p: usize, c: Wordcode) {
        self.buf[p] = c;
    }

    /// ORs bits into an already emitted word.
    pub fn or_with(&mut self, p: usize, bits: Wordcode) {
        self.buf[p] |= bits;
    }

    pub fn words(&self) -> &[Wordcode] {
        &self.buf[..]
    }

    /// Moves the emitted words out, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<Wordcode> {
        std::mem::replace(&mut self.buf, Vec::new())
    }

    // Grow by doubling or by max(need, GROW_WORDS), whichever is larger.
    fn grow(&mut self, need: usize) {
        if self.buf.capacity() - self.buf.len() < need {
            let step = need.max(GROW_WORDS).max(self.buf.len());
            self.buf.reserve(step);
        }
    }
}

impl Index<usize> for CodeBuf {
    type Output = Wordcode;

    fn index(&self, p: usize) -> &Wordcode {
        &self.buf[p]
    }
}

impl IndexMut<usize> for CodeBuf {
    fn index_mut(&mut self, p: usize) -> &mut Wordcode {
        &mut self.buf[p]
    }
}
