//! Site build: install dependencies, run the build script, collect the output.
//!
//! Every command runs as a child process with an explicit environment:
//! `HOME` points at a throwaway directory and `PATH` starts with the bundled
//! runtime's `bin` directory. The step's own environment and working
//! directory are never modified, so nothing needs restoring afterwards.

use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use sitegen_shared::{BuildConfig, Result, SitegenError};

use crate::workspace::scratch_dir;

/// Directory the build script writes the finished site into.
pub const BUILD_OUTPUT_DIR: &str = "build";

/// Lock file that selects yarn over npm.
pub const YARN_LOCKFILE: &str = "yarn.lock";

// ---------------------------------------------------------------------------
// Package manager selection
// ---------------------------------------------------------------------------

/// Package manager used to install and build a source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
}

impl PackageManager {
    /// Yarn when `yarn.lock` sits at the top of `source_dir`, npm otherwise.
    pub fn detect(source_dir: &Path) -> Self {
        if source_dir.join(YARN_LOCKFILE).is_file() {
            Self::Yarn
        } else {
            Self::Npm
        }
    }

    pub fn program(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
        }
    }

    /// Dependency install followed by `run build`.
    pub fn commands(self) -> [CommandSpec; 2] {
        let install = match self {
            Self::Npm => CommandSpec::new(self.program(), ["install"]),
            Self::Yarn => CommandSpec::new(self.program(), [] as [&str; 0]),
        };
        [install, CommandSpec::new(self.program(), ["run", "build"])]
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// A program plus arguments, run without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// What a successful build ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub manager: PackageManager,
    pub commands: Vec<String>,
}

/// Environment handed to every child process of one build.
struct ChildEnv<'a> {
    home: &'a Path,
    path: Option<OsString>,
}

/// Install and build the project in `source_dir`, then copy the contents of
/// its `build/` directory into `site_dir`.
///
/// Fails on the first command exiting non-zero; later commands don't run.
#[instrument(skip_all, fields(source = %source_dir.display()))]
pub async fn run_build(
    source_dir: &Path,
    site_dir: &Path,
    config: &BuildConfig,
) -> Result<BuildReport> {
    let home = scratch_dir(config.work_dir.as_deref(), "home")?;
    let env = ChildEnv {
        home: home.path(),
        path: config.child_path()?,
    };

    let manager = PackageManager::detect(source_dir);
    info!(%manager, "detected package manager");

    let mut commands = Vec::new();
    for spec in manager.commands() {
        run_command(&spec, source_dir, &env).await?;
        commands.push(spec.to_string());
    }

    copy_build_output(source_dir, site_dir, &env).await?;

    let home_path = home.path().to_path_buf();
    if let Err(e) = home.close() {
        warn!(path = %home_path.display(), error = %e, "failed to remove build home");
    }

    info!(%manager, "build complete");
    Ok(BuildReport { manager, commands })
}

/// Copy `<source>/build/.` into `site_dir` with `cp -a`.
async fn copy_build_output(source_dir: &Path, site_dir: &Path, env: &ChildEnv<'_>) -> Result<()> {
    let build_dir = source_dir.join(BUILD_OUTPUT_DIR);
    if !build_dir.is_dir() {
        return Err(SitegenError::build(format!(
            "build produced no `{BUILD_OUTPUT_DIR}/` directory in {}",
            source_dir.display()
        )));
    }

    let spec = CommandSpec::new(
        "cp",
        [
            "-a".to_string(),
            format!("{}/.", build_dir.display()),
            format!("{}/", site_dir.display()),
        ],
    );
    run_command(&spec, source_dir, env).await
}

// ---------------------------------------------------------------------------
// Command execution
// ---------------------------------------------------------------------------

/// Run one command in `cwd`, logging its merged stdout/stderr line by line.
///
/// A non-zero exit fails with [`SitegenError::CommandFailed`] carrying the
/// captured output.
async fn run_command(spec: &CommandSpec, cwd: &Path, env: &ChildEnv<'_>) -> Result<()> {
    info!(command = %spec, "running");

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(cwd)
        .env("HOME", env.home)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(path) = &env.path {
        cmd.env("PATH", path);
    }

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            SitegenError::build(format!("`{}` not found on PATH: {e}", spec.program))
        }
        _ => SitegenError::build(format!("failed to start `{spec}`: {e}")),
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SitegenError::build(format!("no stdout handle for `{spec}`")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SitegenError::build(format!("no stderr handle for `{spec}`")))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let stdout_task = tokio::spawn(forward_lines(stdout, tx.clone()));
    let stderr_task = tokio::spawn(forward_lines(stderr, tx));

    let mut output = String::new();
    while let Some(line) = rx.recv().await {
        info!("{line}");
        output.push_str(&line);
        output.push('\n');
    }

    for task in [stdout_task, stderr_task] {
        task.await
            .map_err(|e| SitegenError::build(format!("output reader for `{spec}` failed: {e}")))?
            .map_err(|e| SitegenError::io(cwd, e))?;
    }

    let status = child.wait().await.map_err(|e| SitegenError::io(cwd, e))?;
    if !status.success() {
        let code = status.code().unwrap_or(-1);
        error!(command = %spec, code, output = %output, "command failed");
        return Err(SitegenError::CommandFailed {
            command: spec.to_string(),
            status: code,
            output,
        });
    }
    Ok(())
}

/// Send each line of `reader` to `tx` until EOF.
async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        // Receiver only goes away once both readers are done.
        let _ = tx.send(line.trim_end_matches(['\r', '\n']).to_string());
    }
}
