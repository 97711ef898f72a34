//! Build script rendering the `callframe(1)` man page from the CLI definition.
//!
//! The page lands in `$OUT_DIR/man` unless `CALLFRAME_MAN_DIR` names another
//! directory, which packaging scripts use to collect it.

use std::{env, fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn man_dir() -> Result<PathBuf, env::VarError> {
    if let Some(dir) = env::var_os("CALLFRAME_MAN_DIR") {
        return Ok(PathBuf::from(dir));
    }
    Ok(PathBuf::from(env::var("OUT_DIR")?).join("man"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=CALLFRAME_MAN_DIR");

    let dir = man_dir()?;
    fs::create_dir_all(&dir)?;

    let cmd = cli::Cli::command();
    let page = dir.join(format!("{}.1", cmd.get_name()));
    let man = Man::new(cmd)
        .section("1")
        .manual("callframe manual")
        .source(concat!("callframe ", env!("CARGO_PKG_VERSION")));
    let mut buf: Vec<u8> = Vec::new();
    man.render(&mut buf)?;
    fs::write(&page, buf)?;

    Ok(())
}
