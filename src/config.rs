use std::fs;

use clap::{App, Arg, ArgMatches};
use lazy_static::lazy_static;
use regex::Regex;

use crate::parser::BinopPrecedence;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid operator precedence '{0}', expected OP=PREC such as '/=40'")]
    InvalidBinop(String),
    #[error("failed to read source file {0}")]
    Io(String, #[source] std::io::Error),
}

lazy_static! {
    static ref BINOP_RE: Regex = Regex::new(r"^(?P<op>\S)=(?P<prec>-?\d+)$").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// source text; `None` reads standard input
    pub source: Option<String>,
    pub precedence: BinopPrecedence,
    pub emit_ir: bool,
    pub interactive: bool,
}

pub fn app() -> App<'static, 'static> {
    App::new("kscope")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("source")
                .value_name("SOURCE")
                .help("source text to compile; read from stdin when omitted")
                .multiple(true),
        )
        .arg(
            Arg::with_name("file")
                .short("f")
                .long("file")
                .value_name("PATH")
                .help("read source from a file")
                .takes_value(true)
                .conflicts_with("source"),
        )
        .arg(
            Arg::with_name("binop")
                .short("b")
                .long("binop")
                .value_name("OP=PREC")
                .help("set the precedence of a binary operator")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("no-ir")
                .long("no-ir")
                .help("do not print generated IR"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("no prompt when reading stdin"),
        )
}

pub fn parse_binop(arg: &str) -> Result<(char, i32), ConfigError> {
    let invalid = || ConfigError::InvalidBinop(arg.to_string());
    let cap = BINOP_RE.captures(arg).ok_or_else(invalid)?;
    let op = cap["op"].chars().next().ok_or_else(invalid)?;
    let prec = cap["prec"].parse().map_err(|_| invalid())?;
    Ok((op, prec))
}

impl Config {
    pub fn from_matches(matches: &ArgMatches) -> Result<Config, ConfigError> {
        let source = if let Some(path) = matches.value_of("file") {
            Some(fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_string(), e))?)
        } else {
            matches
                .values_of("source")
                .map(|words| words.collect::<Vec<_>>().join(" "))
        };

        let mut precedence = BinopPrecedence::default();
        for arg in matches.values_of("binop").into_iter().flatten() {
            let (op, prec) = parse_binop(arg)?;
            precedence.insert(op, prec);
        }

        Ok(Config {
            interactive: source.is_none() && !matches.is_present("quiet"),
            source,
            precedence,
            emit_ir: !matches.is_present("no-ir"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(args: &[&str]) -> Result<Config, ConfigError> {
        let argv = std::iter::once("kscope").chain(args.iter().copied());
        Config::from_matches(&app().get_matches_from_safe(argv).unwrap())
    }

    #[test]
    fn binop_specs() {
        assert_eq!(parse_binop("/=40").unwrap(), ('/', 40));
        assert_eq!(parse_binop("<=-1").unwrap(), ('<', -1));
        assert!(parse_binop("+").is_err());
        assert!(parse_binop("ab=3").is_err());
        assert!(parse_binop("+=x").is_err());
    }

    #[test]
    fn source_words_are_joined() {
        let config = config(&["def", "f(x)", "x"]).unwrap();
        assert_eq!(config.source.as_deref(), Some("def f(x) x"));
        assert!(!config.interactive);
        assert!(config.emit_ir);
    }

    #[test]
    fn stdin_is_interactive_unless_quiet() {
        assert!(config(&[]).unwrap().interactive);
        assert!(!config(&["-q"]).unwrap().interactive);
    }

    #[test]
    fn binops_extend_the_table() {
        let config = config(&["--no-ir", "-b", "/=40", "--binop", "<=0", "1"]).unwrap();
        assert!(!config.emit_ir);
        assert_eq!(config.precedence.get('/'), Some(40));
        assert_eq!(config.precedence.get('<'), None);
        assert_eq!(config.precedence.get('+'), Some(20));
    }

    #[test]
    fn bad_binop_is_an_error() {
        assert!(matches!(
            config(&["-b", "nope", "1"]),
            Err(ConfigError::InvalidBinop(_))
        ));
    }
}
