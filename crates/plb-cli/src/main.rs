use clap::{Args as ClapArgs, Parser, Subcommand};
use plb_core::{Error, FileResource, Format, Outcome, Params, Resource, State, Store, Value};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "plb",
    about = "Read and edit property list settings by colon-separated key path",
    version
)]
struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the value at a key path as JSON
    Get(KeyArgs),
    /// Merge (default) or replace a value at a key path
    Set(SetArgs),
    /// Remove a key
    Delete(DeleteArgs),
    /// Drive a key to a desired state and report the outcome
    Run(RunArgs),
    /// Print the whole document as JSON
    Dump(DumpArgs),
    /// Re-encode a document as binary plist, XML plist or JSON
    Convert(ConvertArgs),
    /// Zip a settings file or directory next to itself
    Backup(BackupArgs),
}

#[derive(ClapArgs, Debug)]
struct KeyArgs {
    /// Settings file (binary or XML .plist, or .json)
    path: PathBuf,
    /// Key path, e.g. NSWindow:Frame (escape literal colons as \:)
    #[arg(long)]
    key: String,
}

#[derive(ClapArgs, Debug)]
struct WriteOpts {
    /// Report what would change without writing the file
    #[arg(long, default_value_t = false)]
    check: bool,
    /// Zip the existing file before overwriting it
    #[arg(long, default_value_t = false)]
    backup: bool,
}

#[derive(ClapArgs, Debug)]
struct SetArgs {
    #[command(flatten)]
    target: KeyArgs,
    /// New value as JSON (e.g. 123, true, "str", ["a"], {"a":1})
    #[arg(long)]
    value: String,
    /// Overwrite the entry instead of merging into it
    #[arg(long, default_value_t = false)]
    replace: bool,
    #[command(flatten)]
    write: WriteOpts,
}

#[derive(ClapArgs, Debug)]
struct DeleteArgs {
    #[command(flatten)]
    target: KeyArgs,
    #[command(flatten)]
    write: WriteOpts,
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    #[command(flatten)]
    target: KeyArgs,
    /// absent, present, read or replace
    #[arg(long, default_value = "present")]
    state: State,
    /// Value as JSON; required for present and replace
    #[arg(long)]
    value: Option<String>,
    #[command(flatten)]
    write: WriteOpts,
}

#[derive(ClapArgs, Debug)]
struct DumpArgs {
    /// Settings file (.plist or .json)
    path: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct ConvertArgs {
    /// Input settings file
    path: PathBuf,
    /// Output path
    #[arg(long)]
    out: PathBuf,
    /// plist, xml or json (defaults from the output extension)
    #[arg(long)]
    format: Option<Format>,
}

#[derive(ClapArgs, Debug)]
struct BackupArgs {
    /// File or directory to archive
    path: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Cmd::Get(a) => cmd_get(a),
        Cmd::Set(a) => cmd_set(a),
        Cmd::Delete(a) => cmd_delete(a),
        Cmd::Run(a) => cmd_run(a),
        Cmd::Dump(a) => cmd_dump(a),
        Cmd::Convert(a) => cmd_convert(a),
        Cmd::Backup(a) => cmd_backup(a),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// `get` on a key that is not there; distinct from every error code below.
const EXIT_NOT_FOUND: i32 = 1;

fn exit_code(e: &Error) -> i32 {
    match e {
        Error::Usage(_) => 2,
        Error::Format { .. } => 3,
        Error::Io { .. } => 4,
        Error::StructuralConflict { .. } => 5,
        Error::Backup(_) => 6,
    }
}

fn fail(e: Error) -> ! {
    eprintln!("error: {}", e);
    std::process::exit(exit_code(&e));
}

fn print_json(v: &impl serde::Serialize) {
    match serde_json::to_string_pretty(v) {
        Ok(s) => println!("{}", s),
        Err(e) => fail(Error::Usage(e.to_string())),
    }
}

fn parse_value(raw: &str) -> Result<Value, Error> {
    let j: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| Error::Usage(format!("invalid --value JSON: {}", e)))?;
    plb_core::json::from_json(j)
}

// Load, apply one operation, then back up and save if it changed anything.
fn apply_and_save(path: &Path, params: &Params, write: &WriteOpts) -> Result<Outcome, Error> {
    let mut store = Store::open(path)?;
    let outcome = plb_core::apply(&mut store, params)?;
    if !store.is_dirty() {
        return Ok(outcome);
    }
    if write.check {
        debug!(path = %path.display(), "check mode; leaving file untouched");
        return Ok(outcome);
    }
    if write.backup {
        plb_core::backup::backup_if_exists(path)?;
    }
    store.save()?;
    Ok(outcome)
}

fn cmd_get(args: KeyArgs) {
    let store = Store::open(&args.path).unwrap_or_else(|e| fail(e));
    match store.get(args.key.as_str()) {
        Some(v) => print_json(&plb_core::json::to_json(v)),
        None => {
            eprintln!("not found: {}", args.key);
            std::process::exit(EXIT_NOT_FOUND);
        }
    }
}

fn cmd_set(args: SetArgs) {
    let value = parse_value(&args.value).unwrap_or_else(|e| fail(e));
    let params = Params {
        key: args.target.key,
        state: if args.replace { State::Replace } else { State::Present },
        value: Some(value),
    };
    let outcome = apply_and_save(&args.target.path, &params, &args.write).unwrap_or_else(|e| fail(e));
    print_json(&outcome);
}

fn cmd_delete(args: DeleteArgs) {
    let params = Params {
        key: args.target.key,
        state: State::Absent,
        value: None,
    };
    let outcome = apply_and_save(&args.target.path, &params, &args.write).unwrap_or_else(|e| fail(e));
    print_json(&outcome);
}

fn cmd_run(args: RunArgs) {
    let value = args
        .value
        .as_deref()
        .map(parse_value)
        .transpose()
        .unwrap_or_else(|e| fail(e));
    let params = Params {
        key: args.target.key,
        state: args.state,
        value,
    };
    let outcome = apply_and_save(&args.target.path, &params, &args.write).unwrap_or_else(|e| fail(e));
    print_json(&outcome);
}

fn cmd_dump(args: DumpArgs) {
    let store = Store::open(&args.path).unwrap_or_else(|e| fail(e));
    print_json(&plb_core::json::to_json(store.root()));
}

fn cmd_convert(args: ConvertArgs) {
    let store = Store::open(&args.path).unwrap_or_else(|e| fail(e));
    let format = args
        .format
        .unwrap_or_else(|| Format::for_name(&args.out.to_string_lossy()));
    let data = format.encode(store.root()).unwrap_or_else(|e| fail(e));
    FileResource::new(&args.out)
        .write_all(&data)
        .unwrap_or_else(|e| fail(e));
}

fn cmd_backup(args: BackupArgs) {
    match plb_core::backup::backup_path(&args.path) {
        Ok(dest) => println!("{}", dest.display()),
        Err(e) => fail(e),
    }
}
