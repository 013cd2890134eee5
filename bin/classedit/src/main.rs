use classweave::jvm::class_file::ClassFile;
use classweave::jvm::Error;

use clap::{Arg, ArgMatches, Command};
use std::fs;
use std::process;

fn main() {
    env_logger::init();

    let input = || {
        Arg::new("INPUT")
            .help("Class file to read")
            .required(true)
            .index(1)
    };
    let output = || {
        Arg::new("output")
            .long("output")
            .short('o')
            .value_name("FILE")
            .required(true)
            .help("Where to write the rewritten class file")
    };

    let matches = Command::new("Class file editor")
        .version("0.1.0")
        .about("Inspect and rewrite JVM class files")
        .subcommand_required(true)
        .subcommand(
            Command::new("dump")
                .about("Print the version, names, and members of a class")
                .arg(input()),
        )
        .subcommand(
            Command::new("compact")
                .about("Drop constants nothing refers to")
                .arg(input())
                .arg(output()),
        )
        .subcommand(
            Command::new("prune")
                .about("Drop method bodies and attributes not needed to describe the class")
                .arg(input())
                .arg(output()),
        )
        .subcommand(
            Command::new("rename")
                .about("Rename a class everywhere it is referred to")
                .arg(input())
                .arg(
                    Arg::new("OLD")
                        .help("Class to rename (eg. `foo.bar.Baz`)")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::new("NEW")
                        .help("New name of the class")
                        .required(true)
                        .index(3),
                )
                .arg(output()),
        )
        .get_matches();

    if let Err(err) = run(&matches) {
        log::error!("{}", err);
        process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<(), Error> {
    match matches.subcommand() {
        Some(("dump", args)) => dump(&read_class(args)?),
        Some(("compact", args)) => {
            let mut class = read_class(args)?;
            class.compact()?;
            write_class(&class, args)
        }
        Some(("prune", args)) => {
            let mut class = read_class(args)?;
            class.prune()?;
            write_class(&class, args)
        }
        Some(("rename", args)) => {
            let mut class = read_class(args)?;
            class.rename_class(required(args, "OLD")?, required(args, "NEW")?)?;
            write_class(&class, args)
        }
        _ => Ok(()),
    }
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str, Error> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| Error::MalformedInput(format!("missing argument {}", name)))
}

fn read_class(args: &ArgMatches) -> Result<ClassFile, Error> {
    let path = required(args, "INPUT")?;
    log::info!("Reading '{}'", path);
    let bytes = fs::read(path)?;
    ClassFile::parse(&bytes)
}

fn write_class(class: &ClassFile, args: &ArgMatches) -> Result<(), Error> {
    let path = required(args, "output")?;
    log::info!("Writing '{}'", path);
    class.save_to_path(path, true)
}

fn dump(class: &ClassFile) -> Result<(), Error> {
    let pool = class.constants();
    let version = class.version();
    println!(
        "class {} (version {}.{})",
        class.name()?,
        version.major_version,
        version.minor_version
    );
    println!("  flags: {:?}", class.access_flags());
    if let Some(superclass) = class.superclass()? {
        println!("  extends {}", superclass);
    }
    for interface in class.interfaces()? {
        println!("  implements {}", interface);
    }
    if let Some(source_file) = class.source_file()? {
        println!("  source file: {}", source_file);
    }
    println!("  constants: {}", pool.len());

    println!("fields:");
    for field in class.fields() {
        println!(
            "  {} {} ({:?})",
            field.name(pool)?,
            field.descriptor(pool)?,
            field.access_flags
        );
    }

    println!("methods:");
    for method in class.methods() {
        let code_length = method
            .code()
            .map_or(String::from("no code"), |code| {
                format!("{} bytes of code", code.code.len())
            });
        println!(
            "  {}{} ({:?}, {})",
            method.name(pool)?,
            method.descriptor(pool)?,
            method.access_flags,
            code_length
        );
    }
    Ok(())
}
