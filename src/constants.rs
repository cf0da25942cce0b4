//! Bit-level layout of code words.
//!
//! Every instruction is a single 32-bit word:
//!
//! ```text
//!          +--------------------------+-------+
//!          |31                       5|4     0|
//!          +--------------------------+-------+
//!          |           data           | kind  |
//!          +--------------------------+-------+
//! ```
//!
//! The data field is further split per kind; each `*_FREE` constant names
//! the first data bit past the kind-specific type/flag bits, i.e. where the
//! skip-offset (or line number, or count) starts.

/// Number of bytes per code word.
pub const WORD_BYTES: u32 = 4;

/// Width of the kind field in the low bits of every word.
pub const CODE_BITS: u32 = 5;
pub const CODE_MASK: u32 = (1 << CODE_BITS) - 1;

// LIST: five type bits, then the skip.
pub const LIST_TYPE_MASK: u32 = 0x1f;
pub const LIST_FREE: u32 = 5;

/// List runs in the foreground, wait for it.
pub const Z_SYNC: u32 = 1 << 0;
/// List runs in the background (`&`).
pub const Z_ASYNC: u32 = 1 << 1;
/// Background list is disowned right away (`&!`).
pub const Z_DISOWN: u32 = 1 << 2;
/// Last list of the program.
pub const Z_END: u32 = 1 << 3;
/// The list body is a bare pipeline slot: line number, then the command.
pub const Z_SIMPLE: u32 = 1 << 4;

// SUBLIST: two type bits, three flag bits, then the skip.
pub const SUBLIST_TYPE_MASK: u32 = 3;
pub const SUBLIST_FLAG_MASK: u32 = 0x1c;
pub const SUBLIST_FREE: u32 = 5;

pub const SUBLIST_END: u32 = 0;
pub const SUBLIST_AND: u32 = 1;
pub const SUBLIST_OR: u32 = 2;

pub const SUBLIST_COPROC: u32 = 4;
pub const SUBLIST_NOT: u32 = 8;
pub const SUBLIST_SIMPLE: u32 = 16;

// PIPE: one type bit, then the line number.
pub const PIPE_TYPE_MASK: u32 = 1;
pub const PIPE_FREE: u32 = 1;

pub const PIPE_END: u32 = 0;
pub const PIPE_MID: u32 = 1;

// ASSIGN: one type bit, then the element count.
pub const ASSIGN_TYPE_MASK: u32 = 1;
pub const ASSIGN_FREE: u32 = 1;

pub const ASSIGN_SCALAR: u32 = 0;
pub const ASSIGN_ARRAY: u32 = 1;

// TIMED: the whole data field is the type.
pub const TIMED_EMPTY: u32 = 0;
pub const TIMED_PIPE: u32 = 1;

// FOR: two type bits, then the skip.
pub const FOR_TYPE_MASK: u32 = 3;
pub const FOR_FREE: u32 = 2;

pub const FOR_PPARAM: u32 = 0;
pub const FOR_LIST: u32 = 1;
pub const FOR_COND: u32 = 2;

// SELECT: one type bit, then the skip.
pub const SELECT_TYPE_MASK: u32 = 1;
pub const SELECT_FREE: u32 = 1;

pub const SELECT_PPARAM: u32 = 0;
pub const SELECT_LIST: u32 = 1;

// WHILE: one type bit, then the skip.
pub const WHILE_TYPE_MASK: u32 = 1;
pub const WHILE_FREE: u32 = 1;

pub const WHILE_WHILE: u32 = 0;
pub const WHILE_UNTIL: u32 = 1;

// CASE: two type bits, then the skip.
pub const CASE_TYPE_MASK: u32 = 3;
pub const CASE_FREE: u32 = 2;

pub const CASE_HEAD: u32 = 0;
pub const CASE_OR: u32 = 1;
pub const CASE_AND: u32 = 2;

// IF: two type bits, then the skip.
pub const IF_TYPE_MASK: u32 = 3;
pub const IF_FREE: u32 = 2;

pub const IF_HEAD: u32 = 0;
pub const IF_IF: u32 = 1;
pub const IF_ELIF: u32 = 2;
pub const IF_ELSE: u32 = 3;

// COND: seven type bits (single-letter unary tests store the letter's
// byte value directly), then the skip.
pub const COND_TYPE_MASK: u32 = 0x7f;
pub const COND_FREE: u32 = 7;

pub const COND_NOT: u32 = 0;
pub const COND_AND: u32 = 1;
pub const COND_OR: u32 = 2;
pub const COND_STREQ: u32 = 3;
pub const COND_STRNEQ: u32 = 4;
pub const COND_STRLT: u32 = 5;
pub const COND_STRGTR: u32 = 6;
pub const COND_NT: u32 = 7;
pub const COND_OT: u32 = 8;
pub const COND_EF: u32 = 9;
pub const COND_EQ: u32 = 10;
pub const COND_NE: u32 = 11;
pub const COND_LT: u32 = 12;
pub const COND_GT: u32 = 13;
pub const COND_LE: u32 = 14;
pub const COND_GE: u32 = 15;
pub const COND_MOD: u32 = 16;
pub const COND_MODI: u32 = 17;

// String references. The low bits select the form, the lowest bit always
// carries the has-tokens flag:
//
//   ...11x   empty string
//   ...01x   one to three bytes packed at the CHAR0/1/2 offsets
//   ......0x pool reference, byte offset shifted by OFFSET_SHIFT
pub const STR_TOKEN_BIT: u32 = 1;
pub const STR_SHORT_BIT: u32 = 2;
pub const STR_EMPTY: u32 = 6;
pub const STR_CHAR0_SHIFT: u32 = 3;
pub const STR_CHAR1_SHIFT: u32 = 11;
pub const STR_CHAR2_SHIFT: u32 = 19;
pub const STR_OFFSET_SHIFT: u32 = 2;
/// Longest string that is packed inline instead of pooled.
pub const STR_SHORT_MAX: usize = 3;
