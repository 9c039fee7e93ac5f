use crate::config::*;
use crate::error::{BuildError, BuildResult};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// The external C compiler named by `Config::cc`.
pub struct Toolchain<'a> {
    config: &'a Config,
    compiler: &'a str,
}

impl<'a> Toolchain<'a> {
    pub fn new(config: &'a Config) -> Option<Self> {
        config
            .cc
            .as_deref()
            .map(|compiler| Toolchain { config, compiler })
    }

    /// Compiles the generated C into an executable, linking precompiled module objects.
    pub fn link_executable(
        &self,
        objects: &[PathBuf],
        uses_threads: bool,
    ) -> BuildResult<PathBuf> {
        let c_file = self.config.c_output();
        let output = self.config.output.clone();

        if self.config.live {
            self.build_shared_library(objects, uses_threads)?;
        }

        let mut args = vec![
            String::from("-o"),
            display(&output),
            display(&c_file),
        ];
        args.extend(objects.iter().map(|o| display(o)));
        args.extend(self.link_flags(uses_threads));
        self.run(&args)?;
        Ok(output)
    }

    fn build_shared_library(&self, objects: &[PathBuf], uses_threads: bool) -> BuildResult<()> {
        let mut args = vec![
            String::from("-shared"),
            String::from("-fPIC"),
            String::from("-o"),
            display(&self.config.shared_output()),
            display(&self.config.c_output()),
        ];
        args.extend(objects.iter().map(|o| display(o)));
        if uses_threads && self.config.os.is_unix() {
            args.push(String::from("-lpthread"));
        }
        self.run(&args)
    }

    /// Compiles a library module to an object file for the cache.
    pub fn compile_object(&self) -> BuildResult<PathBuf> {
        let object = self.config.object_output();
        let args = vec![
            String::from("-c"),
            String::from("-o"),
            display(&object),
            display(&self.config.c_output()),
        ];
        self.run(&args)?;
        Ok(object)
    }

    fn link_flags(&self, uses_threads: bool) -> Vec<String> {
        let mut flags = Vec::new();
        if uses_threads && self.config.os.is_unix() {
            flags.push(String::from("-lpthread"));
        }
        if self.config.live && self.config.os == Os::Linux {
            flags.push(String::from("-ldl"));
        }
        flags
    }

    fn run(&self, args: &[String]) -> BuildResult<()> {
        debug!(target: "pipeline", "{} {}", self.compiler, args.join(" "));
        let status = Command::new(self.compiler)
            .args(args)
            .status()
            .map_err(|e| {
                BuildError::Toolchain(format!("could not run `{}`: {}", self.compiler, e))
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(BuildError::Toolchain(format!(
                "`{} {}` exited with {}",
                self.compiler,
                args.join(" "),
                status
            )))
        }
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

pub fn write_output(path: &Path, contents: &[u8]) -> BuildResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
    }
    fs::write(path, contents).map_err(|e| BuildError::io(path, e))
}

/// Writes the native image and marks it executable.
pub fn write_executable(path: &Path, image: &[u8]) -> BuildResult<()> {
    write_output(path, image)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| BuildError::io(path, e))?;
    }
    Ok(())
}
