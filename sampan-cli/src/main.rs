use std::io::Write;
use std::path::{Path, PathBuf};
use std::{fs, io};

use anyhow::{anyhow, bail, Context, Error};
use clap::ArgMatches;
use sampan::machinery::{parse, scan};
use sampan::value::Value;
use sampan::{AutoEscape, Error as SError, Loader};
use tracing_subscriber::EnvFilter;

mod cli;

const STDIN_STDOUT: &str = "-";

struct Output {
    temp: Option<(PathBuf, tempfile::NamedTempFile)>,
}

impl Output {
    pub fn new(filename: &Path) -> Result<Output, Error> {
        Ok(Output {
            temp: if filename == Path::new(STDIN_STDOUT) {
                None
            } else {
                let filename = std::env::current_dir()?.join(filename);
                let ntf = tempfile::NamedTempFile::new_in(
                    filename
                        .parent()
                        .ok_or_else(|| anyhow!("cannot write to root"))?,
                )?;
                Some((filename, ntf))
            },
        })
    }

    pub fn commit(&mut self) -> Result<(), Error> {
        if let Some((filename, temp)) = self.temp.take() {
            temp.persist(filename)?;
        }
        Ok(())
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.temp {
            Some((_, ref mut out)) => out.write(buf),
            None => io::stdout().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.temp {
            Some((_, ref mut out)) => out.flush(),
            None => io::stdout().flush(),
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("SAMPAN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn read_input(path: &Path, what: &str) -> Result<String, Error> {
    if path == Path::new(STDIN_STDOUT) {
        io::read_to_string(io::stdin()).with_context(|| format!("unable to read {what} from stdin"))
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("unable to read {what} file '{}'", path.display()))
    }
}

fn load_data(path: &Path) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
    let contents = read_input(path, "data")?;
    match serde_json::from_str(&contents).context("data file is not valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("data file must contain an object, got {}", json_kind(&other)),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a bool",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn interpret_raw_value(s: &str) -> Result<serde_json::Value, Error> {
    serde_json::from_str(s).with_context(|| format!("invalid raw value '{s}' (not valid JSON)"))
}

fn apply_defines(
    matches: &ArgMatches,
    ctx: &mut serde_json::Map<String, serde_json::Value>,
) -> Result<(), Error> {
    for item in matches.get_many::<String>("define").unwrap_or_default() {
        if let Some((key, raw_value)) = item.split_once(":=") {
            ctx.insert(key.to_string(), interpret_raw_value(raw_value)?);
        } else if let Some((key, string_value)) = item.split_once('=') {
            ctx.insert(key.to_string(), string_value.into());
        } else {
            ctx.insert(item.to_string(), true.into());
        }
    }
    Ok(())
}

fn create_loader(matches: &ArgMatches) -> Result<Loader, Error> {
    let base_dir = match matches.get_one::<PathBuf>("base-dir") {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let mut loader = Loader::with_base_dir(base_dir);
    if let Some(name) = matches.get_one::<String>("autoescape") {
        loader.set_auto_escape(AutoEscape::from_name(name));
    }
    Ok(loader)
}

fn expr_status(rv: &Value) -> i32 {
    match rv.as_i64().and_then(|n| i32::try_from(n).ok()) {
        Some(n) => n,
        None if rv.is_true() => 0,
        None => 1,
    }
}

fn execute() -> Result<i32, Error> {
    let matches = cli::make_command().get_matches();
    init_logging(matches.get_flag("verbose"));

    let mut loader = create_loader(&matches)?;
    let template = matches.get_one::<String>("template");
    let data = match (matches.get_one::<PathBuf>("data"), template) {
        (Some(data), _) => Some(data.clone()),
        // with --expr the only positional argument is the data file
        (None, Some(template)) if matches.contains_id("expr") => Some(PathBuf::from(template)),
        (None, _) => None,
    };
    let mut ctx = match data {
        Some(ref path) => load_data(path)?,
        None => Default::default(),
    };
    apply_defines(&matches, &mut ctx)?;
    tracing::debug!(variables = ctx.len(), "loaded template context");

    let mut output = Output::new(
        matches
            .get_one::<PathBuf>("output")
            .map(|x| x.as_path())
            .unwrap_or(Path::new(STDIN_STDOUT)),
    )?;

    if let Some(expr) = matches.get_one::<String>("expr") {
        let rv = loader.compile_expression(expr)?.eval(&ctx)?;
        match matches.get_one::<String>("expr-out").map(|x| x.as_str()) {
            Some("json") => writeln!(&mut output, "{}", serde_json::to_string(&rv)?)?,
            Some("status") => return Ok(expr_status(&rv)),
            _ => writeln!(&mut output, "{rv}")?,
        }
        output.commit()?;
        return Ok(0);
    }

    let name = template.ok_or_else(|| anyhow!("no template given"))?;
    if name == STDIN_STDOUT {
        if data.as_deref() == Some(Path::new(STDIN_STDOUT)) {
            bail!("cannot read both the template and the data from stdin");
        }
        loader.add_template(STDIN_STDOUT, read_input(Path::new(STDIN_STDOUT), "template")?);
    }

    if let Some(dump) = matches.get_one::<String>("dump") {
        let tmpl = loader.load(name)?;
        match dump.as_str() {
            "tokens" => {
                for item in scan(tmpl.name(), tmpl.source()) {
                    let (chunk, span) = item?;
                    writeln!(&mut output, "{chunk:?}{span:?}")?;
                }
            }
            _ => {
                for stmt in parse(tmpl.name(), tmpl.source())? {
                    writeln!(&mut output, "{stmt:#?}")?;
                }
            }
        }
    } else {
        let result = loader.load(name)?.render(&ctx)?;
        if matches.get_flag("no-newline") {
            write!(&mut output, "{result}")?;
        } else {
            writeln!(&mut output, "{result}")?;
        }
    }

    output.commit()?;
    Ok(0)
}

fn print_error(err: &Error) {
    eprintln!("error: {err}");
    if let Some(err) = err.downcast_ref::<SError>() {
        if err.name().is_some() && err.line().is_some() {
            eprintln!("{err:#}");
        }
    }
    let mut source_opt = err.source();
    while let Some(source) = source_opt {
        eprintln!();
        eprintln!("caused by: {source}");
        source_opt = source.source();
    }
}

fn main() {
    match execute() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            print_error(&err);
            std::process::exit(1);
        }
    }
}
