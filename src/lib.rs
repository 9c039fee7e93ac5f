pub mod cache;
pub mod codegen;
pub mod config;
pub mod diagnostic;
pub mod driver;
pub mod error;
pub mod lexing;
pub mod library;
pub mod parsing;
pub mod registry;
pub mod resolver;
pub mod source;

pub use config::{Arch, Backend, BuildMode, Config, ExecutionTarget, Os};
pub use diagnostic::{DefaultReporter, Diagnostic, Reporter};
pub use driver::{BuildOutput, Builder, CompilationContext};
pub use error::{BuildError, BuildResult};
pub use source::*;

/// Builds `config` start to finish.
pub fn build(config: Config) -> BuildResult<BuildOutput> {
    Builder::new(config)?.build()
}
