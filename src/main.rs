use aqc::{Arch, Backend, Config, DefaultReporter, ExecutionTarget, Os, Reporter};
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

/// Compiles aquila programs, tests and library modules to C
#[derive(Parser)]
#[command(name = "aqc")]
#[command(version = "0.1.0")]
#[command(about = "aquila compilation driver", long_about = None)]
struct Cli {
    /// A source file or a directory holding the main module
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output path, without extension
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Directory holding builtin and the standard modules
    #[arg(long, value_name = "DIR", default_value = "lib")]
    lib_root: PathBuf,

    /// Extra directories searched for imported modules
    #[arg(long = "path", value_name = "DIR")]
    module_paths: Vec<PathBuf>,

    #[arg(long, value_name = "NAME")]
    os: Option<String>,

    #[arg(long, value_name = "NAME")]
    arch: Option<String>,

    /// Build a test harness from the _test.aq files
    #[arg(long, conflicts_with = "lib")]
    test: bool,

    /// Build a library module and publish it to the cache
    #[arg(long)]
    lib: bool,

    /// Emit an x86_64 Linux image directly instead of C
    #[arg(long)]
    native: bool,

    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    #[arg(long)]
    no_cache: bool,

    /// Dotted name to publish a library under, such as net.http
    #[arg(long, value_name = "NAME", requires = "lib")]
    module_name: Option<String>,

    /// Count calls to every function
    #[arg(long)]
    profile: bool,

    /// Time each test
    #[arg(long)]
    stats: bool,

    /// Reload the program from a shared library on every run
    #[arg(long)]
    live: bool,

    #[arg(long)]
    repl: bool,

    /// C compiler to run on the generated file
    #[arg(long, value_name = "CMD")]
    cc: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> aqc::BuildResult<Config> {
        let mut config = Config::new(self.input, self.lib_root);
        if let Some(output) = self.output {
            config.output = output;
        }
        config.module_paths = self.module_paths;
        if let Some(os) = &self.os {
            config.os = Os::from_name(os)?;
        }
        if let Some(arch) = &self.arch {
            config.arch = Arch::from_name(arch)?;
        }
        config.target = if self.test {
            ExecutionTarget::Test
        } else if self.lib {
            ExecutionTarget::Library
        } else {
            ExecutionTarget::Executable
        };
        if self.native {
            config.backend = Backend::Native;
        }
        config.cache_root = self.cache_dir;
        config.cache_enabled = !self.no_cache;
        config.module_name = self.module_name;
        config.profile = self.profile;
        config.stats = self.stats;
        config.live = self.live;
        config.repl = self.repl;
        config.cc = self.cc;
        config.verbose = self.verbose;
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let reporter = DefaultReporter::new();
    let result = cli.into_config().and_then(aqc::build);
    if let Err(error) = result {
        reporter.report_error(&error);
        std::process::exit(1);
    }
}
