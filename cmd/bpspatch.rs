#![forbid(unsafe_code)]
use std::fs;
use std::io;
use std::io::prelude::*;
use std::process;

use beatpatch::{verify_marker, Bpspatch, PatchSession};
use clap::Parser;

#[derive(Parser, Debug)]
#[clap(
name = "bpspatch",
version = "0.1.0",
about = "patcher for the bps (beat) binary patch format",
long_about = None,
)]
struct BpspatchArgs {
    /// source file
    #[clap(value_name = "SOURCE")]
    source_path: String,

    /// target file
    #[clap(value_name = "TARGET")]
    target_path: String,

    /// patch file
    #[clap(value_name = "PATCH")]
    patch_path: String,

    /// verify source, target and patch checksums
    #[clap(short = 'c', long = "check")]
    check: bool,

    /// require exact source and target sizes
    #[clap(short = 's', long = "strict")]
    strict: bool,

    /// apply command by command directly on the files
    #[clap(long = "stream")]
    stream: bool,

    /// print debug logs
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    let args = BpspatchArgs::parse();
    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let result = if args.stream {
        execute_stream(args)
    } else {
        execute(args)
    };
    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn execute(args: BpspatchArgs) -> beatpatch::Result<()> {
    // setup input/output
    let mut source;
    let target: Box<dyn Write>;
    let mut patch;
    if args.source_path == "-" {
        source = Vec::new();
        io::stdin().read_to_end(&mut source)?;
    } else {
        source = fs::read(&args.source_path)?;
    }
    source.shrink_to_fit();
    if args.target_path == "-" {
        target = Box::new(io::stdout());
    } else {
        target = Box::new(fs::File::create(&args.target_path)?);
    }
    patch = fs::read(&args.patch_path)?;
    patch.shrink_to_fit();

    // setup patcher
    let bpspatch = Bpspatch::new(&patch[..])?
        .verify_checksums(args.check)
        .strict_size(args.strict);
    log::debug!("metadata: {} bytes", bpspatch.metadata().len());

    // execute patcher
    let n = bpspatch.apply(&source[..], target)?;
    log::debug!("wrote {} bytes", n);
    Ok(())
}

fn execute_stream(args: BpspatchArgs) -> beatpatch::Result<()> {
    if args.source_path == "-" || args.target_path == "-" {
        let e = io::Error::new(io::ErrorKind::InvalidInput, "streaming needs regular files");
        return Err(e.into());
    }
    let mut source = io::BufReader::new(fs::File::open(&args.source_path)?);
    let mut patch = io::BufReader::new(fs::File::open(&args.patch_path)?);
    let mut target = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&args.target_path)?;

    verify_marker(&mut patch)?;
    let mut session = PatchSession::start(&mut patch)?;
    session.run(&mut source, &mut target, &mut patch)?;
    if args.strict {
        session.finish()?;
    }
    if args.check {
        let footer = beatpatch::Footer::read_from(&mut patch)?;
        footer.verify_source(&fs::read(&args.source_path)?)?;
        footer.verify_target(&fs::read(&args.target_path)?)?;
        footer.verify_patch(&fs::read(&args.patch_path)?)?;
    }
    log::debug!("wrote {} bytes", session.output_offset());
    Ok(())
}
