#[macro_use]
extern crate clap;

use clap::Arg;
use std::path::{Path, PathBuf};
use zwcfile::{build_dump, load_dump_header, MapChoice, FD_EXT};

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("test")
                .short("t")
                .help("List the dump contents, or test that the named functions are present"),
        )
        .arg(
            Arg::with_name("map")
                .short("m")
                .conflicts_with("read")
                .help("Mark the dump to be memory-mapped when loaded"),
        )
        .arg(
            Arg::with_name("read")
                .short("r")
                .help("Mark the dump to be read when loaded"),
        )
        .arg(
            Arg::with_name("noaliases")
                .short("U")
                .help("Do not expand aliases in the source files"),
        )
        .arg(
            Arg::with_name("ARGS")
                .help("Dump file, then source files")
                .required(true)
                .multiple(true),
        )
        .get_matches();

    let args: Vec<String> = matches
        .values_of("ARGS")
        .unwrap()
        .map(String::from)
        .collect();

    let code = if matches.is_present("test") {
        list_dump(&args)
    } else {
        let map = if matches.is_present("map") {
            MapChoice::Map
        } else if matches.is_present("read") {
            MapChoice::Read
        } else {
            MapChoice::Auto
        };
        compile(&args, !matches.is_present("noaliases"), map)
    };
    std::process::exit(code);
}

fn list_dump(args: &[String]) -> i32 {
    let hdr = match load_dump_header(Path::new(&args[0])) {
        Ok(hdr) => hdr,
        Err(err) => {
            eprintln!("zwcc: {}", err);
            return 1;
        }
    };
    if args.len() > 1 {
        for name in &args[1..] {
            if hdr.find(name.as_bytes()).is_none() {
                return 1;
            }
        }
        return 0;
    }
    println!(
        "function dump file ({}) for {}",
        if hdr.mapped { "mapped" } else { "read" },
        String::from_utf8_lossy(&hdr.version)
    );
    for e in &hdr.entries {
        println!("{}", String::from_utf8_lossy(&e.name));
    }
    0
}

fn compile(args: &[String], aliases: bool, map: MapChoice) -> i32 {
    // With a single argument it is both the source and, with the dump
    // extension appended, the output.
    let (dump, files) = if args.len() == 1 {
        (
            format!("{}{}", args[0], FD_EXT),
            vec![PathBuf::from(&args[0])],
        )
    } else {
        (
            args[0].clone(),
            args[1..].iter().map(PathBuf::from).collect(),
        )
    };
    match build_dump(Path::new(&dump), &files, aliases, map) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("zwcc: {}", err);
            1
        }
    }
}
