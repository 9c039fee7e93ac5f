use crate::error::{BuildError, BuildResult};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Os {
    Linux,
    Macos,
    Windows,
    Freebsd,
    Android,
}

impl Os {
    pub const ALL: &'static [Os] = &[Os::Linux, Os::Macos, Os::Windows, Os::Freebsd, Os::Android];

    pub fn from_name(name: &str) -> BuildResult<Os> {
        Os::ALL
            .iter()
            .copied()
            .find(|os| os.name() == name)
            .ok_or_else(|| BuildError::Configuration(format!("unsupported target OS `{}`", name)))
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Macos => "macos",
            Os::Windows => "windows",
            Os::Freebsd => "freebsd",
            Os::Android => "android",
        }
    }

    pub fn host() -> Os {
        if cfg!(target_os = "macos") {
            Os::Macos
        } else if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "freebsd") {
            Os::Freebsd
        } else if cfg!(target_os = "android") {
            Os::Android
        } else {
            Os::Linux
        }
    }

    pub fn is_unix(&self) -> bool {
        *self != Os::Windows
    }

    pub const fn shared_library_extension(&self) -> &'static str {
        match self {
            Os::Macos => "dylib",
            Os::Windows => "dll",
            _ => "so",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arch {
    x86_64,
    aarch64,
}

impl Arch {
    pub fn from_name(name: &str) -> BuildResult<Arch> {
        match name {
            "x86_64" | "amd64" => Ok(Arch::x86_64),
            "aarch64" | "arm64" => Ok(Arch::aarch64),
            other => Err(BuildError::Configuration(format!(
                "unsupported target architecture `{}`",
                other
            ))),
        }
    }

    pub fn host() -> Arch {
        if cfg!(target_arch = "aarch64") {
            Arch::aarch64
        } else {
            Arch::x86_64
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::x86_64 => f.write_str("x86_64"),
            Arch::aarch64 => f.write_str("aarch64"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionTarget {
    Executable,
    Test,
    Library,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildMode {
    Program,
    Library,
}

impl ExecutionTarget {
    pub fn build_mode(&self) -> BuildMode {
        match self {
            ExecutionTarget::Library => BuildMode::Library,
            ExecutionTarget::Executable | ExecutionTarget::Test => BuildMode::Program,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    C,
    Native,
}

/// Settings for one invocation. Fixed before the pipeline starts.
#[derive(Clone, Debug)]
pub struct Config {
    pub input: PathBuf,
    /// Output path without extension; `.c`, `.o` and shared library suffixes are appended.
    pub output: PathBuf,
    pub lib_root: PathBuf,
    pub module_paths: Vec<PathBuf>,
    pub os: Os,
    pub arch: Arch,
    pub target: ExecutionTarget,
    pub backend: Backend,
    pub verbose: bool,
    pub cache_enabled: bool,
    pub cache_root: Option<PathBuf>,
    /// Dotted name a library build publishes under, overriding the one derived from its path.
    pub module_name: Option<String>,
    pub profile: bool,
    pub stats: bool,
    pub live: bool,
    pub repl: bool,
    pub cc: Option<String>,
}

impl Config {
    pub fn new(input: impl Into<PathBuf>, lib_root: impl Into<PathBuf>) -> Self {
        let input = input.into();
        let output = default_output(&input);
        Config {
            input,
            output,
            lib_root: lib_root.into(),
            module_paths: Vec::new(),
            os: Os::host(),
            arch: Arch::host(),
            target: ExecutionTarget::Executable,
            backend: Backend::C,
            verbose: false,
            cache_enabled: true,
            cache_root: None,
            module_name: None,
            profile: false,
            stats: false,
            live: false,
            repl: false,
            cc: None,
        }
    }

    pub fn build_mode(&self) -> BuildMode {
        self.target.build_mode()
    }

    /// Rejects option combinations no backend can honor.
    pub fn validate(&self) -> BuildResult<()> {
        if self.backend == Backend::Native {
            if self.os != Os::Linux || self.arch != Arch::x86_64 {
                return Err(BuildError::Configuration(format!(
                    "native backend only supports x86_64 linux, not {} {}",
                    self.arch, self.os
                )));
            }
            if self.target != ExecutionTarget::Executable {
                return Err(BuildError::Configuration(String::from(
                    "native backend only builds executables",
                )));
            }
            if self.live || self.profile {
                return Err(BuildError::Configuration(String::from(
                    "native backend does not support --live or --profile",
                )));
            }
        }

        if self.live && self.target != ExecutionTarget::Executable {
            return Err(BuildError::Configuration(String::from(
                "hot reload only applies to executables",
            )));
        }

        if self.repl && self.target != ExecutionTarget::Executable {
            return Err(BuildError::Configuration(String::from(
                "repl mode only applies to executables",
            )));
        }

        if let Some(name) = &self.module_name {
            if self.target != ExecutionTarget::Library {
                return Err(BuildError::Configuration(String::from(
                    "a module name only applies to library builds",
                )));
            }
            if name.split('.').any(str::is_empty) {
                return Err(BuildError::Configuration(format!(
                    "`{}` is not a dotted module name",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn c_output(&self) -> PathBuf {
        with_suffix(&self.output, "c")
    }

    pub fn object_output(&self) -> PathBuf {
        with_suffix(&self.output, "o")
    }

    pub fn shared_output(&self) -> PathBuf {
        with_suffix(&self.output, self.os.shared_library_extension())
    }

    pub fn caching(&self) -> bool {
        self.cache_enabled && self.cache_root.is_some() && self.backend == Backend::C
    }
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("out"));
    let is_source_file = input.extension().map_or(false, |ext| ext == "aq");
    match input.parent() {
        Some(parent) if is_source_file => parent.join(stem),
        _ => input.join(stem),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
