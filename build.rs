use clap::CommandFactory;
use clap_mangen::Man;
use std::{fs, io, path::PathBuf};

#[path = "src/cli.rs"]
#[expect(
    dead_code,
    reason = "only the type definitions are needed to render the man page"
)]
mod cli;

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    for tracked in ["CARGO_PKG_NAME", "CARGO_PKG_VERSION", "CARGO_BIN_NAME"] {
        println!("cargo:rerun-if-env-changed={tracked}");
    }

    // Keep the rendered page where packagers look for it.
    let man_dir = PathBuf::from("target/generated-man");
    if man_dir.exists() {
        fs::remove_dir_all(&man_dir)?;
    }
    fs::create_dir_all(&man_dir)?;

    let command = cli::Cli::command();
    let name = command.get_name().to_owned();
    let mut rendered = Vec::new();
    Man::new(command).render(&mut rendered)?;
    fs::write(man_dir.join(format!("{name}.1")), rendered)
}
