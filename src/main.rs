use std::io::{self, BufReader};

use kscope::{
    codegen::Codegen,
    config::{app, Config},
    driver::{Driver, ReaderChars},
    ir::IrBuilder,
    parser::Parser,
};
use tracing_subscriber::EnvFilter;

fn run<I, B>(chars: I, builder: B, config: &Config) -> anyhow::Result<()>
where
    I: Iterator<Item = char>,
    B: IrBuilder,
{
    let parser = Parser::new(chars, config.precedence.clone());
    let mut driver = Driver::new(parser, Codegen::new(builder), io::stderr());
    driver.emit_ir = config.emit_ir;
    driver.interactive = config.interactive;
    driver.run()?;
    Ok(())
}

fn compile<B: IrBuilder>(builder: B, config: &Config) -> anyhow::Result<()> {
    match &config.source {
        Some(source) => run(source.chars(), builder, config),
        None => run(ReaderChars::new(BufReader::new(io::stdin())), builder, config),
    }
}

#[cfg(not(feature = "llvm"))]
fn main_backend(config: &Config) -> anyhow::Result<()> {
    compile(kscope::ir::text::TextModule::new("kscope"), config)
}

#[cfg(feature = "llvm")]
fn main_backend(config: &Config) -> anyhow::Result<()> {
    let context = inkwell::context::Context::create();
    compile(kscope::ir::llvm::LlvmModule::new(&context, "kscope"), config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kscope=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let matches = app().get_matches();
    let config = Config::from_matches(&matches)?;
    main_backend(&config)
}
