use std::path::PathBuf;

use clap::{arg, command, value_parser, ArgAction, Command};

const ADVANCED: &str = "Advanced";
const BEHAVIOR: &str = "Template Behavior";

pub(super) fn make_command() -> Command {
    command!()
        .name("sampan")
        .max_term_width(120)
        .args([
            arg!(-b --"base-dir" <PATH> "Directory templates are loaded from")
                .long_help("\
                    Sets the directory that template names are resolved against.  Templates \
                    referenced by extends and include are loaded from this directory too and \
                    can not escape it.\n\n\
                    \
                    [default: the current directory]")
                .value_parser(value_parser!(PathBuf)),
            arg!(-a --autoescape <NAME> "Sets the default escape function")
                .long_help("\
                    Sets the function every {{ expression }} is passed through.  The default \
                    is html_escape.  Any function in the namespace can be named (for instance \
                    url_escape or json_encode); none disables escaping.  Templates can still \
                    change it with the autoescape directive.")
                .help_heading(BEHAVIOR),
            arg!(-D --define <EXPR> "Defines an input variable (key=value / key:=json_value)")
                .long_help("\
                    Defines an input variable for the template in addition to the data file.  \
                    key defines a single bool, key=value a string and key:=json_value a JSON \
                    value.  It can be supplied multiple times.\n\n\
                    \
                    Examples:\n\
                    -D name=Peter       defines a basic string\n\
                    -D user_id:=42      defines an integer\n\
                    -D is_true          shortform to define true boolean")
                .action(ArgAction::Append)
                .help_heading(BEHAVIOR),
            arg!(-n --"no-newline" "Do not output a trailing newline")
                .help_heading(BEHAVIOR),
            arg!(-E --expr <EXPR> "Evaluates an expression instead of a template")
                .long_help("\
                    Evaluates an expression with the input data instead of rendering a \
                    template.  The result is emitted according to --expr-out.\n\n\
                    \
                    Example: sampan --expr='1 < 10'")
                .help_heading(ADVANCED),
            arg!(--"expr-out" <MODE> "The expression output mode")
                .long_help("\
                    Sets the output mode for --expr.  'print' writes the result to stdout, \
                    'json' writes it as JSON and 'status' exits with the result as status \
                    code (numbers are used as is, other values exit with 0 when true and 1 \
                    otherwise).")
                .value_parser(["print", "json", "status"])
                .default_value("print")
                .requires("expr")
                .help_heading(ADVANCED),
            arg!(--dump <KIND> "Dump internals of a template")
                .long_help("\
                    Dumps the chunks the scanner produces ('tokens') or the parsed syntax \
                    tree ('ast') instead of rendering the template.")
                .value_parser(["tokens", "ast"])
                .help_heading(ADVANCED),
            arg!(-v --verbose "Log loader and compiler activity to stderr")
                .long_help("\
                    Enables debug logging.  Without this flag the log filter is read from \
                    the SAMPAN_LOG environment variable and defaults to warn."),
            arg!(-o --output <FILENAME> "Path to the output file")
                .long_help("\
                    Path to the output file instead of stdout.  Files are written \
                    atomically, if rendering fails the original file remains.")
                .default_value("-")
                .value_parser(value_parser!(PathBuf)),
            arg!(template: [TEMPLATE] "Name of the template relative to the base directory")
                .long_help("\
                    The name of the template to render, relative to the base directory.  \
                    '-' reads the template from stdin.")
                .required_unless_present("expr"),
            arg!(data: [DATA] "Path to a JSON data file")
                .long_help("\
                    Path to a JSON file with the variables for the template.  The file must \
                    contain an object.  '-' reads the data from stdin.")
                .value_parser(value_parser!(PathBuf)),
        ])
        .about("Renders a sampan template with JSON data to stdout.")
}

#[test]
fn verify_command() {
    make_command().debug_assert();
}
