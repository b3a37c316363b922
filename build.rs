// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .required(true)
        .help("Configuration file (JSON)")
}

fn mirror_path_arg() -> Arg {
    Arg::new("mirror_path")
        .short('m')
        .long("mirror-path")
        .value_name("DIR")
        .help("Fixed mirror directory (default: a new temp dir)")
}

fn build_cli() -> Command {
    Command::new("pacshadow")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Pacshadow Contributors")
        .about("Check for package upgrades without root privileges")
        .arg(
            Arg::new("debug")
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("check")
                .about("Sync a database mirror and list available upgrades")
                .arg(config_arg())
                .arg(mirror_path_arg())
                .arg(
                    Arg::new("keep")
                        .long("keep")
                        .action(ArgAction::SetTrue)
                        .help("Keep the mirror after the check"),
                )
                .arg(
                    Arg::new("watched")
                        .short('w')
                        .long("watched")
                        .value_name("PATH")
                        .help("Watch list (JSON array of {name, version})"),
                )
                .arg(
                    Arg::new("foreign")
                        .long("foreign")
                        .action(ArgAction::SetTrue)
                        .help("List installed packages no repository carries"),
                )
                .arg(
                    Arg::new("foreign_ignore")
                        .long("foreign-ignore")
                        .value_name("NAME")
                        .action(ArgAction::Append)
                        .help("Package not to report as foreign (repeatable)"),
                )
                .arg(
                    Arg::new("preview")
                        .long("preview")
                        .action(ArgAction::SetTrue)
                        .help("Also list packages the upgrade would remove"),
                )
                .arg(
                    Arg::new("no_upgrades")
                        .long("no-upgrades")
                        .action(ArgAction::SetTrue)
                        .help("Skip the full upgrade check"),
                ),
        )
        .subcommand(
            Command::new("mirror")
                .about("Create or refresh a database mirror without syncing")
                .arg(config_arg())
                .arg(mirror_path_arg()),
        )
        .subcommand(
            Command::new("clean")
                .about("Remove a database mirror")
                .arg(Arg::new("mirror_path").required(true).help("Mirror directory to remove")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("pacshadow.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
