//! Compiles extended POSIX shell syntax into word-code: a flat array of
//! 32-bit instruction words plus a deduplicated string pool, built for an
//! executor that dispatches on the low five bits of each word and skips
//! whole constructs through forward offsets.
//!
//! Word-code layout, instruction by instruction:
//!
//!   END
//!     - end of the program
//!
//!   LIST
//!     - data: type (sync, async, disown, end, simple) and skip
//!     - followed by the code of this list
//!     - unless the END type bit is set, followed by the next LIST
//!
//!   SUBLIST
//!     - data: type (&&, ||, end), flags (coproc, not, simple), skip
//!     - followed by the code of this sublist
//!     - unless type is END, followed by the next SUBLIST
//!
//!   PIPE
//!     - data: type (end, mid) and line number
//!     - a MID pipe is followed by one word holding the skip to the
//!       next PIPE, then the command
//!
//!   REDIR
//!     - always three words: opcode, descriptor, name string; placed in
//!       front of the command (or ASSIGN run) that owns it
//!
//!   ASSIGN
//!     - data: type (scalar, array) and array element count
//!     - followed by the name and the value (scalar) or elements (array)
//!
//!   SIMPLE
//!     - data: argument count including the command name
//!     - followed by that many strings
//!
//!   SUBSH / CURSH
//!     - followed by a list run in a subshell / the current shell
//!
//!   TIMED
//!     - data: whether a pipeline follows or the keyword stood alone
//!
//!   FUNCDEF
//!     - data: skip past the body
//!     - followed by: name count, names, string-pool base, string-pool
//!       length, body pattern count, body words, END
//!
//!   FOR / SELECT
//!     - data: iteration source (positional params, word list, or for
//!       FOR an arithmetic header) and skip past the body
//!     - word-list form: name, word count, words; arithmetic form:
//!       three expression strings
//!
//!   WHILE / REPEAT
//!     - data: while/until bit (WHILE) and skip past the body
//!
//!   CASE
//!     - the head carries the skip to just past the whole construct;
//!       each branch is a CASE of sub-kind OR (`;;`) or AND (`;&`) with
//!       the skip to the next branch, followed by the pattern string, a
//!       pattern-slot index, and the branch body
//!
//!   IF
//!     - head, then one IF/ELIF per condition arm and an optional ELSE,
//!       each with the skip to its successor
//!
//!   COND
//!     - data: conditional type and, for AND/OR, the skip past both
//!       operands; string equality operators are followed by their
//!       operands and a pattern-slot index
//!
//!   ARITH
//!     - followed by the expression string
//!
//!   AUTOFN
//!     - reserved for autoloaded function stubs
//!
//! Simplification: a trivially linear list (one synchronous sublist, one
//! pipeline, one command, no connective) drops its SUBLIST word; the
//! SIMPLE type bit on the LIST marks the short shape, and where a true
//! pipeline would have put its PIPE header only the line number remains.
//! The same collapse applies to sublists through the SUBLIST SIMPLE
//! flag. Whether a construct is too complex for this is computed
//! bottom-up while parsing.
//!
//! Strings are encoded in single words: empty strings and strings of up
//! to three bytes are packed inline, longer ones live in the pool that
//! follows the code. The lowest bit of every form records whether the
//! string contains marker bytes the executor must expand. Pool entries
//! are deduplicated per function-nesting scope; a function body's
//! strings form a self-contained pool range so the body can be dumped
//! and reloaded independently.

pub mod buffer;
mod cond;
pub mod constants;
pub mod error;
pub mod instructions;
pub mod lex;
pub mod parse;
pub mod program;
pub mod strings;
pub mod token;

/// One code word.
pub type Wordcode = u32;

pub use crate::error::{NoErrs, ParseError};
pub use crate::parse::{parse_string, Options, Parser};
pub use crate::program::{free_prog, free_queued_progs, Alloc, Eprog, Estate};

#[cfg(test)]
mod test;
