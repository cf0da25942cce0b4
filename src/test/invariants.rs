use super::*;
use crate::lex::StringLexer;
use crate::parse::{Options, Parser};

// Every compiled program must satisfy the skip-offset invariant: for any
// compound header, the stored skip points exactly one past its body.
#[test]
fn skip_offsets_are_exact() {
    let sources: &[&[u8]] = &[
        b"echo hi",
        b"a | b | c",
        b"a && b || c",
        b"! a | b &",
        b"if a; then b; elif c; then d; else e; fi",
        b"for i in a b c; do echo $i; done",
        b"for ((i=0;i<10;i=i+1)); do : ; done",
        b"while read line; do echo $line; done < input",
        b"until x; do y; done",
        b"repeat 5; do work; done",
        b"case $x in a) one;; b|c) two;& *) three;; esac",
        b"select opt in yes no; do break; done",
        b"f() { echo nested; g() { echo deeper; }; }",
        b"function f g { echo multi; }",
        b"(cd /tmp && ls) | wc -l",
        b"{ echo a; echo b; } > both",
        b"time a | b",
        b"[[ -n $x && ( $y = z* || $y != w ) ]]",
        b"((x = x + 1))",
        b"x=1 y=(a b) cmd arg",
        b"coproc tail -f log\necho started\n",
        b"cat <<EOF\nbody text\nEOF\necho after\n",
        b"nocorrect echo hi",
        b"for i in $(ls); do echo `date` $i; done",
    ];
    for src in sources {
        let p = compile(src);
        assert_wellformed(&p);
    }
}

#[test]
fn simplification_is_applied_exactly_when_legal() {
    // one unadorned command: collapsed
    for src in [&b"echo hi"[..], b"x=1", b"a=1 b=2 cmd"] {
        let p = compile(src);
        assert_ne!(
            instructions::list_type(p.prog()[0]) & Z_SIMPLE,
            0,
            "{:?} should collapse",
            String::from_utf8_lossy(src)
        );
    }
    // pipes, connectives, modifiers, redirections, compounds: kept
    for src in [
        &b"a | b"[..],
        b"a && b",
        b"! a",
        b"coproc a",
        b"a > f",
        b"(a)",
        b"{ a; }",
        b"time a",
        b"if a; then b; fi",
        b"f() { :; }",
        b"((1))",
    ] {
        let p = compile(src);
        assert_eq!(
            instructions::list_type(p.prog()[0]) & Z_SIMPLE,
            0,
            "{:?} must not collapse",
            String::from_utf8_lossy(src)
        );
    }
}

#[test]
fn failed_compiles_truncate_the_buffer() {
    let sources: &[&[u8]] = &[
        b"for",
        b"if x; then",
        b"case x in a)",
        b"echo )",
    ];
    for src in sources {
        let mut lx = StringLexer::new(src, true);
        let mut parser = Parser::new(&mut lx, Options::default());
        assert!(parser.parse_list().is_err(), "{:?}", String::from_utf8_lossy(src));
        assert!(parser.errors().flagged);
        // No partial program survives past the failing production.
        parser.clear_err();
        assert!(!parser.errors().flagged);
    }
}

#[test]
fn error_path_restores_the_entry_cursor() {
    let mut lx = StringLexer::new(b"for x do", true);
    let mut parser = Parser::new(&mut lx, Options::default());
    assert!(parser.parse_list().is_err());
    assert_eq!(parser.code.used(), 0);
}

#[test]
fn dedup_is_per_function_scope() {
    let p = compile(b"echo shared-word\nf() { echo shared-word; }\n");
    let w = p.prog();
    assert_eq!(str_at(&p, 4), b"shared-word".to_vec());

    let second = 1 + instructions::list_skip(w[0]) as usize;
    let fd = second + 3;
    assert_eq!(instructions::wc_kind(w[fd]), Some(WcKind::Funcdef));
    let names = w[fd + 1] as usize;
    let pool_base = w[fd + 2 + names] as usize;
    let pool_len = w[fd + 2 + names + 1] as usize;
    // The body re-pools its strings instead of sharing the toplevel
    // entries: "echo" plus "shared-word", NUL terminated.
    assert_eq!(pool_len, 5 + 12);

    // Body references decode against the body's own pool range.
    let body_list = fd + 2 + names + 3;
    let body_pool = &p.strs()[pool_base..pool_base + pool_len];
    let (s, _) = crate::strings::decode_str(w[body_list + 4], body_pool);
    assert_eq!(&s[..], b"shared-word");
    assert_wellformed(&p);
}

#[test]
fn duplication_preserves_the_views() {
    let p = compile(b"echo one; echo twos; [[ a = b ]]");
    let d = p.dup();
    assert_eq!(d.alloc(), crate::Alloc::Real);
    assert_eq!(d.prog(), p.prog());
    assert_eq!(d.strs(), p.strs());
    assert_eq!(d.npats(), p.npats());
    assert!(d.pats().iter().all(|s| s.is_placeholder()));
    assert_wellformed(&d);
}

#[test]
fn deferred_free_keeps_programs_until_flushed() {
    let p = compile(b"echo hi");
    crate::free_prog(p);
    crate::free_queued_progs();
}

#[test]
fn reader_cursor_decodes_a_simple_command() {
    let p = compile(b"echo hi > out");
    let (name, tok) = crate::program::raw_str(&p, 5);
    assert_eq!(&name[..], b"out");
    assert!(!tok);

    let mut st = crate::Estate::new(&p);
    // full list: header, sublist, pipe head
    st.set_pc(3);
    let redirs = st.get_redirs();
    assert_eq!(redirs.len(), 1);
    assert_eq!(redirs[0].fd, 1);
    assert_eq!(redirs[0].name, b"out".to_vec());
    let argc = instructions::simple_argc(st.word()) as usize;
    let (args, _) = st.get_arr(argc);
    assert_eq!(args[0].as_ref(), b"echo");
    assert_eq!(args[1].as_ref(), b"hi");
}
