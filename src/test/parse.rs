use super::*;
use crate::instructions::RedirType;
use crate::lex::StringLexer;
use crate::parse::{Options, Parser};
use crate::token::chars;
use matches::assert_matches;

#[test]
fn simple_command_collapses() {
    let p = compile(b"echo hi");
    let w = p.prog();
    assert_eq!(w.len(), 6);
    assert_eq!(instructions::list_type(w[0]), Z_SYNC | Z_END | Z_SIMPLE);
    assert_eq!(instructions::list_skip(w[0]), 4);
    assert_eq!(w[1], 1); // line number in place of the sublist
    assert_eq!(instructions::simple_argc(w[2]), 2);
    assert_eq!(str_at(&p, 3), b"echo".to_vec());
    assert_eq!(str_at(&p, 4), b"hi".to_vec());
    assert_eq!(instructions::wc_kind(w[5]), Some(WcKind::End));
    assert_wellformed(&p);
}

#[test]
fn pipeline_keeps_full_encoding() {
    let p = compile(b"a | b");
    let w = p.prog();
    assert_eq!(w.len(), 10);
    assert_eq!(instructions::list_type(w[0]), Z_SYNC | Z_END);
    assert_eq!(instructions::list_skip(w[0]), 8);
    assert_eq!(instructions::sublist_type(w[1]), SUBLIST_END);
    assert_eq!(instructions::sublist_flags(w[1]), 0);
    assert_eq!(instructions::sublist_skip(w[1]), 7);
    assert_eq!(instructions::pipe_type(w[2]), PIPE_MID);
    assert_eq!(w[3], 3); // skip word to the next pipe header
    assert_eq!(instructions::simple_argc(w[4]), 1);
    assert_eq!(str_at(&p, 5), b"a".to_vec());
    assert_eq!(instructions::pipe_type(w[6]), PIPE_END);
    assert_eq!(instructions::simple_argc(w[7]), 1);
    assert_eq!(str_at(&p, 8), b"b".to_vec());
    assert_wellformed(&p);
}

#[test]
fn if_then_fi_chain() {
    let p = compile(b"if x; then y; fi");
    let w = p.prog();
    assert_eq!(w.len(), 14);
    assert_eq!(instructions::list_type(w[0]), Z_SYNC | Z_END);
    assert_eq!(instructions::sublist_type(w[1]), SUBLIST_END);
    assert_eq!(instructions::pipe_type(w[2]), PIPE_END);
    assert_eq!(instructions::if_type(w[3]), IF_HEAD);
    assert_eq!(instructions::if_skip(w[3]), 9);
    assert_eq!(instructions::if_type(w[4]), IF_IF);
    assert_eq!(instructions::if_skip(w[4]), 8);
    // condition and body are collapsed inner lists
    assert_eq!(instructions::list_type(w[5]), Z_SYNC | Z_END | Z_SIMPLE);
    assert_eq!(str_at(&p, 8), b"x".to_vec());
    assert_eq!(instructions::list_type(w[9]), Z_SYNC | Z_END | Z_SIMPLE);
    assert_eq!(str_at(&p, 12), b"y".to_vec());
    assert_wellformed(&p);
}

#[test]
fn if_elif_else() {
    let p = compile(b"if a; then b; elif c; then d; else e; fi");
    let w = p.prog();
    assert_eq!(instructions::if_type(w[3]), IF_HEAD);
    assert_eq!(instructions::if_type(w[4]), IF_IF);
    let elif = 4 + 1 + instructions::if_skip(w[4]) as usize;
    assert_eq!(instructions::if_type(w[elif]), IF_ELIF);
    let els = elif + 1 + instructions::if_skip(w[elif]) as usize;
    assert_eq!(instructions::if_type(w[els]), IF_ELSE);
    assert_wellformed(&p);
}

#[test]
fn for_over_wordlist() {
    let p = compile(b"for i in a b; do echo $i; done");
    let w = p.prog();
    assert_eq!(instructions::for_type(w[3]), FOR_LIST);
    assert_eq!(instructions::for_skip(w[3]), 9);
    assert_eq!(str_at(&p, 4), b"i".to_vec());
    assert_eq!(w[5], 2); // word count
    assert_eq!(str_at(&p, 6), b"a".to_vec());
    assert_eq!(str_at(&p, 7), b"b".to_vec());
    // $i carries the has-tokens bit
    let (arg, tok) = crate::strings::decode_str(w[12], p.strs());
    assert_eq!(arg[0], chars::DOLLAR);
    assert!(tok);
    assert_wellformed(&p);
}

#[test]
fn for_over_positional_params() {
    let p = compile(b"for x; do echo; done");
    let w = p.prog();
    assert_eq!(instructions::for_type(w[3]), FOR_PPARAM);
    assert_eq!(str_at(&p, 4), b"x".to_vec());
    assert_wellformed(&p);
}

#[test]
fn for_arithmetic_header() {
    let p = compile(b"for ((i=0;i<3;i=i+1)); do echo; done");
    let w = p.prog();
    assert_eq!(instructions::for_type(w[3]), FOR_COND);
    assert_eq!(str_at(&p, 4), b"i=0".to_vec());
    assert_eq!(str_at(&p, 5), b"i<3".to_vec());
    assert_eq!(str_at(&p, 6), b"i=i+1".to_vec());
    assert_wellformed(&p);
}

#[test]
fn for_requires_identifier() {
    compile_err(b"for 9x in a; do echo; done");
}

#[test]
fn select_loop() {
    let p = compile(b"select i in a b; do echo; done");
    let w = p.prog();
    assert_eq!(instructions::wc_kind(w[3]), Some(WcKind::Select));
    assert_eq!(instructions::select_type(w[3]), SELECT_LIST);
    assert_eq!(str_at(&p, 4), b"i".to_vec());
    assert_eq!(w[5], 2);
    assert_wellformed(&p);
}

#[test]
fn select_needs_body_without_short_loops() {
    let mut opts = Options::default();
    opts.short_loops = false;
    let mut lx = StringLexer::new(b"select x\necho hi\n", true);
    let mut parser = Parser::new(&mut lx, opts);
    assert!(parser.parse_list().is_err());

    let mut lx = StringLexer::new(b"select x\necho hi\n", true);
    let mut parser = Parser::new(&mut lx, Options::default());
    assert!(parser.parse_list().is_ok());
}

#[test]
fn while_and_until() {
    let p = compile(b"while x; do y; done");
    let w = p.prog();
    assert_eq!(instructions::while_type(w[3]), WHILE_WHILE);
    assert_wellformed(&p);

    let p = compile(b"until x; do y; done");
    assert_eq!(instructions::while_type(p.prog()[3]), WHILE_UNTIL);
    assert_wellformed(&p);
}

#[test]
fn repeat_loop() {
    let p = compile(b"repeat 3; do echo x; done");
    let w = p.prog();
    assert_eq!(instructions::wc_kind(w[3]), Some(WcKind::Repeat));
    assert_eq!(str_at(&p, 4), b"3".to_vec());
    assert_wellformed(&p);
}

#[test]
fn subshell_and_current_shell() {
    let p = compile(b"(echo hi)");
    assert_eq!(
        instructions::wc_kind(p.prog()[3]),
        Some(WcKind::Subsh)
    );
    assert_wellformed(&p);

    let p = compile(b"{ echo hi; }");
    assert_eq!(
        instructions::wc_kind(p.prog()[3]),
        Some(WcKind::Cursh)
    );
    assert_wellformed(&p);
}

#[test]
fn case_branches() {
    let p = compile(b"case word in a) x;; b|c) y;& (d*) z;; esac");
    let w = p.prog();
    assert_eq!(instructions::case_type(w[3]), CASE_HEAD);
    assert_eq!(str_at(&p, 4), b"word".to_vec());

    let end = 3 + 1 + instructions::case_skip(w[3]) as usize;
    let mut pos = 5;
    let mut branches = Vec::new();
    while pos < end {
        let ty = instructions::case_type(w[pos]);
        branches.push((ty, plain_str_at(&p, pos + 1), w[pos + 2]));
        pos += 1 + instructions::case_skip(w[pos]) as usize;
    }
    assert_eq!(
        branches,
        vec![
            (CASE_OR, b"a".to_vec(), 0),
            (CASE_AND, b"b|c".to_vec(), 1),
            (CASE_OR, b"d*".to_vec(), 2),
        ]
    );
    assert_eq!(p.npats(), 3);
    assert_wellformed(&p);
}

#[test]
fn case_with_braces() {
    let p = compile(b"case x { a) echo;; }");
    assert_eq!(instructions::case_type(p.prog()[3]), CASE_HEAD);
    assert_wellformed(&p);
}

#[test]
fn unterminated_case_is_an_error() {
    compile_err(b"case x in a) echo");
}

#[test]
fn function_definition() {
    let p = compile(b"f() { :; }");
    let w = p.prog();
    assert_matches!(instructions::decode(w[3]), Some(Instr::Funcdef { .. }));
    assert_eq!(instructions::funcdef_skip(w[3]), 10);
    assert_eq!(w[4], 1); // one name
    assert_eq!(str_at(&p, 5), b"f".to_vec());
    assert_eq!(w[6], 0); // string-pool base
    assert_eq!(w[7], 0); // string-pool length (":" is inlined)
    assert_eq!(w[8], 0); // body pattern count
    assert_eq!(str_at(&p, 12), b":".to_vec());
    assert_eq!(instructions::wc_kind(w[13]), Some(WcKind::End));
    assert_wellformed(&p);
}

#[test]
fn function_keyword_definition() {
    let p = compile(b"function f g { echo hi; }");
    let w = p.prog();
    assert_eq!(instructions::wc_kind(w[3]), Some(WcKind::Funcdef));
    assert_eq!(w[4], 2);
    assert_eq!(str_at(&p, 5), b"f".to_vec());
    assert_eq!(str_at(&p, 6), b"g".to_vec());
    assert_wellformed(&p);
}

#[test]
fn function_body_pool_is_self_contained() {
    let p = compile(b"f() { echo something-long; }\necho something-long\n");
    let w = p.prog();
    // The body's pool starts at the enclosing base and holds its strings.
    assert_eq!(instructions::wc_kind(w[3]), Some(WcKind::Funcdef));
    assert_eq!(w[6], 0);
    let body_pool_len = w[7];
    assert!(body_pool_len > 0);
    // The toplevel copy decodes correctly against the full pool.
    let last_list = 3 + 1 + instructions::funcdef_skip(w[3]) as usize;
    let w_echo = last_list + 2; // simple list: header, line, SIMPLE
    assert_eq!(str_at(&p, w_echo + 1), b"echo".to_vec());
    assert_eq!(str_at(&p, w_echo + 2), b"something-long".to_vec());
    assert_wellformed(&p);
}

#[test]
fn background_and_disown() {
    let p = compile(b"echo hi &");
    let w = p.prog();
    assert_eq!(instructions::list_type(w[0]), Z_ASYNC | Z_END);
    assert_eq!(
        instructions::sublist_flags(w[1]) & SUBLIST_SIMPLE,
        SUBLIST_SIMPLE
    );
    assert_wellformed(&p);

    let p = compile(b"echo hi &!");
    assert_eq!(
        instructions::list_type(p.prog()[0]),
        Z_ASYNC | Z_DISOWN | Z_END
    );
    assert_wellformed(&p);
}

#[test]
fn logical_connectives() {
    let p = compile(b"a && b");
    let w = p.prog();
    assert_eq!(instructions::sublist_type(w[1]), SUBLIST_AND);
    let rhs = 1 + 1 + instructions::sublist_skip(w[1]) as usize;
    assert_eq!(instructions::sublist_type(w[rhs]), SUBLIST_END);
    assert_wellformed(&p);

    let p = compile(b"a || b || c");
    assert_eq!(instructions::sublist_type(p.prog()[1]), SUBLIST_OR);
    assert_wellformed(&p);
}

#[test]
fn negation_and_coproc() {
    let p = compile(b"! ls");
    assert_eq!(
        instructions::sublist_flags(p.prog()[1]) & SUBLIST_NOT,
        SUBLIST_NOT
    );
    assert_wellformed(&p);

    let p = compile(b"coproc ls");
    assert_eq!(
        instructions::sublist_flags(p.prog()[1]) & SUBLIST_COPROC,
        SUBLIST_COPROC
    );
    assert_wellformed(&p);
}

#[test]
fn bare_negation_is_an_error() {
    compile_err(b"!");
}

#[test]
fn timed_pipeline_and_bare_time() {
    let p = compile(b"time ls");
    let w = p.prog();
    assert_eq!(instructions::timed_type(w[3]), TIMED_PIPE);
    assert_eq!(
        instructions::sublist_flags(w[4]) & SUBLIST_SIMPLE,
        SUBLIST_SIMPLE
    );
    assert_wellformed(&p);

    let p = compile(b"time");
    assert_eq!(instructions::timed_type(p.prog()[3]), TIMED_EMPTY);
    assert_wellformed(&p);
}

#[test]
fn arithmetic_command() {
    let p = compile(b"((x+1))");
    let w = p.prog();
    assert_matches!(instructions::decode(w[3]), Some(Instr::Arith));
    assert_eq!(str_at(&p, 4), b"x+1".to_vec());
    assert_wellformed(&p);
}

#[test]
fn redirections_precede_the_command() {
    let p = compile(b"echo hi >out 2>&1");
    let w = p.prog();
    assert_eq!(instructions::redir_type(w[3]), Some(RedirType::Write));
    assert_eq!(w[4], 1);
    assert_eq!(str_at(&p, 5), b"out".to_vec());
    assert_eq!(instructions::redir_type(w[6]), Some(RedirType::MergeOut));
    assert_eq!(w[7], 2);
    assert_eq!(str_at(&p, 8), b"1".to_vec());
    assert_eq!(instructions::simple_argc(w[9]), 2);
    assert_eq!(str_at(&p, 10), b"echo".to_vec());
    assert_wellformed(&p);
}

#[test]
fn redirection_operator_kinds() {
    let cases: &[(&[u8], RedirType)] = &[
        (b"x > f", RedirType::Write),
        (b"x >| f", RedirType::WriteNow),
        (b"x >> f", RedirType::App),
        (b"x >>| f", RedirType::AppNow),
        (b"x < f", RedirType::Read),
        (b"x <> f", RedirType::ReadWrite),
        (b"x <<< f", RedirType::HereStr),
        (b"x <& 3", RedirType::MergeIn),
        (b"x >& 3", RedirType::MergeOut),
        (b"x &> f", RedirType::ErrWrite),
        (b"x &>> f", RedirType::ErrApp),
    ];
    for &(src, ty) in cases {
        let p = compile(src);
        assert_eq!(
            instructions::redir_type(p.prog()[3]),
            Some(ty),
            "source {:?}",
            String::from_utf8_lossy(src)
        );
        assert_wellformed(&p);
    }
}

#[test]
fn stderr_pipe_inserts_a_merge() {
    let p = compile(b"a |& b");
    let w = p.prog();
    // The left-hand command gains a 2>&1 in front of it.
    assert_eq!(instructions::pipe_type(w[2]), PIPE_MID);
    assert_eq!(instructions::redir_type(w[4]), Some(RedirType::MergeOut));
    assert_eq!(w[5], 2);
    assert_eq!(str_at(&p, 6), b"1".to_vec());
    assert_wellformed(&p);
}

#[test]
fn scalar_assignment() {
    let p = compile(b"FOO=bar make");
    let w = p.prog();
    // Assignments alone do not defeat the collapsed list encoding.
    assert_eq!(instructions::list_type(w[0]), Z_SYNC | Z_END | Z_SIMPLE);
    assert_eq!(instructions::assign_type(w[2]), ASSIGN_SCALAR);
    assert_eq!(str_at(&p, 3), b"FOO".to_vec());
    assert_eq!(str_at(&p, 4), b"bar".to_vec());
    assert_eq!(instructions::simple_argc(w[5]), 1);
    assert_eq!(str_at(&p, 6), b"make".to_vec());
    assert_wellformed(&p);
}

#[test]
fn subscripted_assignment() {
    let p = compile(b"a[1]=x");
    assert_eq!(plain_str_at(&p, 3), b"a[1]".to_vec());
    assert_eq!(str_at(&p, 4), b"x".to_vec());
    assert_wellformed(&p);
}

#[test]
fn array_assignment() {
    let p = compile(b"a=(1 2 3)");
    let w = p.prog();
    assert_eq!(instructions::assign_type(w[2]), ASSIGN_ARRAY);
    assert_eq!(instructions::assign_count(w[2]), 3);
    assert_eq!(str_at(&p, 3), b"a".to_vec());
    assert_eq!(str_at(&p, 4), b"1".to_vec());
    assert_eq!(str_at(&p, 6), b"3".to_vec());
    assert_eq!(instructions::simple_argc(w[7]), 0);
    assert_wellformed(&p);
}

#[test]
fn assignment_only_at_command_position() {
    let p = compile(b"echo a=b");
    let w = p.prog();
    assert_eq!(instructions::simple_argc(w[2]), 2);
    assert_eq!(str_at(&p, 4), b"a=b".to_vec());
    assert_wellformed(&p);
}

#[test]
fn string_deduplication() {
    let p = compile(b"echo hello hello");
    let w = p.prog();
    assert_eq!(w[3], w[4]);
    assert_eq!(str_at(&p, 3), b"hello".to_vec());
    assert_wellformed(&p);
}

#[test]
fn chained_events() {
    let mut lx = StringLexer::new(b"echo a; echo b\n", true);
    let mut parser = Parser::new(&mut lx, Options::default());
    let p = parser.parse_event().unwrap().unwrap();
    let w = p.prog();
    assert_eq!(instructions::list_type(w[0]), Z_SYNC | Z_SIMPLE);
    let second = 1 + instructions::list_skip(w[0]) as usize;
    assert_eq!(
        instructions::list_type(w[second]),
        Z_SYNC | Z_END | Z_SIMPLE
    );
    assert_wellformed(&p);
    // Everything was consumed by the first call.
    assert!(parser.parse_event().unwrap().is_none());
}

#[test]
fn alias_flag_is_recorded() {
    let lx = StringLexer::new(b"", false);
    assert!(!lx.aliases());
    let lx = StringLexer::new(b"", true);
    assert!(lx.aliases());
}

#[test]
fn empty_inputs() {
    let p = compile(b"");
    assert_eq!(p.prog().len(), 1);
    assert_eq!(instructions::wc_kind(p.prog()[0]), Some(WcKind::End));

    let p = compile(b" ; ; \n\n;\n");
    assert_eq!(p.prog().len(), 1);

    let mut lx = StringLexer::new(b"\n", true);
    let mut parser = Parser::new(&mut lx, Options::default());
    assert!(parser.parse_event().unwrap().is_none());
}

#[test]
fn residual_token_is_an_error() {
    compile_err(b"echo hi )");
    compile_err(b"fi");
    compile_err(b";;");
}

#[test]
fn unterminated_constructs_are_errors() {
    compile_err(b"if x; then y");
    compile_err(b"while x; do y");
    compile_err(b"( echo hi");
    compile_err(b"{ echo hi;");
    compile_err(b"[[ -n foo");
}

#[test]
fn error_messages_name_the_offending_token() {
    let err = compile_err(b"echo hi )");
    assert!(!err.messages.is_empty());
    assert!(err.messages[0].contains("parse error near `)'"), "{:?}", err);
    assert!(err.flagged);
}

#[test]
fn process_substitution_redirections() {
    let p = compile(b"x > >(y)");
    assert_eq!(
        instructions::redir_type(p.prog()[3]),
        Some(RedirType::OutPipe)
    );
    assert_wellformed(&p);

    let p = compile(b"x < <(y)");
    assert_eq!(
        instructions::redir_type(p.prog()[3]),
        Some(RedirType::InPipe)
    );
    assert_wellformed(&p);
}

#[test]
fn pipe_line_numbers_advance() {
    let p = compile(b"a\nb | c\n");
    let w = p.prog();
    // first list is collapsed: the bare line number word
    assert_eq!(w[1], 1);
    let second = 1 + instructions::list_skip(w[0]) as usize;
    // second list keeps its pipe header, on line 2
    let pipe = second + 2;
    assert_eq!(instructions::pipe_type(w[pipe]), PIPE_MID);
    assert_eq!(instructions::pipe_line(w[pipe]), 2);
    assert_wellformed(&p);
}
