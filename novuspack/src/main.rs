//TODO: update clap to remove the need for this
#![allow(dangerous_implicit_autorefs)]

use std::io;

use clap::{crate_authors, crate_description, crate_name, crate_version, App, AppSettings, Arg, SubCommand};
use novuspack::{cat, create, info, list, remove, CreateOptions};
use tracing_subscriber::EnvFilter;

fn parse_id(value: Option<&str>, name: &str) -> anyhow::Result<u64> {
    let text = match value {
        Some(text) => text,
        None => return Ok(0),
    };
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| anyhow::anyhow!("invalid {}: {}", name, text))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let arg_archive = Arg::with_name("archive")
        .help("Package file")
        .short("a")
        .long("archive")
        .required(true)
        .takes_value(true)
        .value_name("FILE");

    let matches = App::new(crate_name!())
        .author(crate_authors!(", "))
        .about(crate_description!())
        .version(crate_version!())
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("create")
                .about("Create a package from a directory")
                .arg(&arg_archive)
                .arg(
                    Arg::with_name("basedir")
                        .help("Directory to package (defaults to '.')")
                        .required(true)
                        .value_name("DIR")
                        .default_value("."),
                )
                .arg(
                    Arg::with_name("comment")
                        .help("Package comment")
                        .long("comment")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("vendor")
                        .help("Vendor ID")
                        .long("vendor")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("app")
                        .help("Application ID")
                        .long("app")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("list")
                .about("List stored paths")
                .arg(&arg_archive),
        )
        .subcommand(
            SubCommand::with_name("cat")
                .about("Write a stored file to stdout")
                .arg(&arg_archive)
                .arg(
                    Arg::with_name("path")
                        .help("Stored path")
                        .required(true)
                        .value_name("PATH"),
                ),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Show package information")
                .arg(&arg_archive),
        )
        .subcommand(
            SubCommand::with_name("remove")
                .about("Remove stored paths")
                .arg(&arg_archive)
                .arg(
                    Arg::with_name("paths")
                        .help("Stored paths")
                        .required(true)
                        .multiple(true)
                        .value_name("PATH"),
                ),
        )
        .get_matches();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match matches.subcommand() {
        ("create", Some(matches)) => {
            let options = CreateOptions {
                comment: matches.value_of("comment").map(String::from),
                vendor_id: u32::try_from(parse_id(matches.value_of("vendor"), "vendor ID")?)?,
                app_id: parse_id(matches.value_of("app"), "application ID")?,
            };
            create(
                matches.value_of("archive").unwrap_or_default(),
                matches.value_of("basedir").unwrap_or("."),
                &options,
            )?
        }
        ("list", Some(matches)) => list(matches.value_of("archive").unwrap_or_default(), &mut out)?,
        ("cat", Some(matches)) => cat(
            matches.value_of("archive").unwrap_or_default(),
            matches.value_of("path").unwrap_or_default(),
            &mut out,
        )?,
        ("info", Some(matches)) => info(matches.value_of("archive").unwrap_or_default(), &mut out)?,
        ("remove", Some(matches)) => {
            let paths = matches
                .values_of("paths")
                .map(|values| values.collect::<Vec<_>>())
                .unwrap_or_default();
            remove(matches.value_of("archive").unwrap_or_default(), &paths)?
        }
        _ => {}
    }
    Ok(())
}
