use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    os::unix::fs::{symlink, PermissionsExt},
    path::Path,
    process::{Command, Stdio},
};

use tracing::info;

use crate::{config::Secret, error::InstallerError, ui};

// ── Process backend ───────────────────────────────────────────────────────────

/// What a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Finished {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Finished {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Spawns external processes. The only place where the installer touches
/// `std::process`.
pub trait Backend {
    /// Runs `argv` to completion. With `capture` the output is collected,
    /// otherwise it goes straight to the terminal. `input` is fed on stdin.
    fn spawn(&mut self, argv: &[String], input: Option<&str>, capture: bool)
        -> io::Result<Finished>;
}

/// Runs real processes on the host.
#[derive(Debug, Default)]
pub struct SystemBackend;

impl Backend for SystemBackend {
    fn spawn(
        &mut self,
        argv: &[String],
        input: Option<&str>,
        capture: bool,
    ) -> io::Result<Finished> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

        let mut command = Command::new(program);
        command.args(args);
        command.stdin(if input.is_some() { Stdio::piped() } else { Stdio::inherit() });
        if capture {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let mut child = command.spawn()?;
        let written = match (input, child.stdin.take()) {
            // stdin is dropped at the end of the arm so the child sees EOF.
            (Some(data), Some(mut stdin)) => stdin.write_all(data.as_bytes()),
            _ => Ok(()),
        };

        // Reap the child before reporting a failed write.
        let output = child.wait_with_output()?;
        match written {
            // The child exited without reading all of its input; its exit
            // status says what happened.
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
            Err(err) => return Err(err),
            Ok(()) => {}
        }
        Ok(Finished {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ── Executor ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Record every privileged operation, perform none.
    DryRun,
    /// Record and perform.
    Live,
}

/// Runs (or only records) every privileged operation of the installer.
///
/// Each operation is written to the log as one audit line and appended to
/// [`history`](Executor::history). The recorded lines are identical in both
/// modes, so a dry-run is an exact preview of a live run.
pub struct Executor {
    mode: ExecMode,
    backend: Box<dyn Backend>,
    history: Vec<String>,
}

fn owned<S: AsRef<str>>(argv: &[S]) -> Vec<String> {
    argv.iter().map(|a| a.as_ref().to_string()).collect()
}

fn chrooted<S: AsRef<str>>(root: &Path, argv: &[S]) -> Vec<String> {
    let mut full = vec!["chroot".to_string(), root.display().to_string()];
    full.extend(owned(argv));
    full
}

fn not_found_or_io(program: &str, err: io::Error) -> InstallerError {
    if err.kind() == io::ErrorKind::NotFound {
        InstallerError::CommandNotFound(program.to_string())
    } else {
        InstallerError::Io(err)
    }
}

fn print_captured_output(finished: &Finished) {
    if !finished.stdout.trim().is_empty() {
        eprintln!("{}", finished.stdout.trim());
    }
    if !finished.stderr.trim().is_empty() {
        eprintln!("{}", finished.stderr.trim());
    }
}

impl Executor {
    pub fn new(mode: ExecMode) -> Self {
        Self::with_backend(mode, Box::new(SystemBackend))
    }

    pub fn with_backend(mode: ExecMode, backend: Box<dyn Backend>) -> Self {
        Self {
            mode,
            backend,
            history: Vec::new(),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.mode == ExecMode::DryRun
    }

    /// Every recorded operation, in order.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn record(&mut self, line: String) {
        match self.mode {
            ExecMode::DryRun => info!("[CMD] (dry-run): {line}"),
            ExecMode::Live => info!("[CMD]: {line}"),
        }
        self.history.push(line);
    }

    fn spawn_checked(
        &mut self,
        argv: &[String],
        input: Option<&str>,
        capture: bool,
    ) -> Result<Finished, InstallerError> {
        let program = argv.first().map(String::as_str).unwrap_or_default();
        let finished = self
            .backend
            .spawn(argv, input, capture)
            .map_err(|e| not_found_or_io(program, e))?;

        if !finished.success() {
            return Err(InstallerError::CommandFailed {
                program: program.to_string(),
                code: finished.code.unwrap_or(-1),
                stderr: finished.stderr.clone(),
            });
        }
        Ok(finished)
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Runs a command with the terminal attached.
    pub fn run<S: AsRef<str>>(&mut self, argv: &[S]) -> Result<(), InstallerError> {
        let argv = owned(argv);
        self.record(argv.join(" "));
        if self.is_dry_run() {
            return Ok(());
        }
        self.spawn_checked(&argv, None, false).map(drop)
    }

    /// Runs a command **silently** while displaying a spinner.
    /// On failure prints the captured output before returning the error.
    pub fn run_quiet<S: AsRef<str>>(
        &mut self,
        argv: &[S],
        spin_msg: &str,
    ) -> Result<(), InstallerError> {
        let argv = owned(argv);
        self.record(argv.join(" "));
        if self.is_dry_run() {
            return Ok(());
        }

        let pb = ui::spinner(spin_msg);
        let program = argv.first().cloned().unwrap_or_default();
        let result = self.backend.spawn(&argv, None, true);
        pb.finish_and_clear();

        let finished = result.map_err(|e| not_found_or_io(&program, e))?;
        if !finished.success() {
            print_captured_output(&finished);
            return Err(InstallerError::CommandFailed {
                program,
                code: finished.code.unwrap_or(-1),
                stderr: finished.stderr,
            });
        }
        Ok(())
    }

    /// Runs a command and returns its stdout. Nothing is recorded and the
    /// command runs in both modes, so only read-only queries belong here.
    pub fn capture<S: AsRef<str>>(&mut self, argv: &[S]) -> Result<String, InstallerError> {
        let argv = owned(argv);
        self.spawn_checked(&argv, None, true).map(|f| f.stdout)
    }

    pub fn run_in_chroot<S: AsRef<str>>(
        &mut self,
        root: &Path,
        argv: &[S],
    ) -> Result<(), InstallerError> {
        self.run(&chrooted(root, argv))
    }

    pub fn capture_in_chroot<S: AsRef<str>>(
        &mut self,
        root: &Path,
        argv: &[S],
    ) -> Result<String, InstallerError> {
        self.capture(&chrooted(root, argv))
    }

    /// Runs a chrooted command that reads a secret from stdin.
    ///
    /// `payload` builds the stdin text from the secret; it never reaches argv
    /// or the audit line.
    pub fn run_in_chroot_with_secret<S: AsRef<str>>(
        &mut self,
        root: &Path,
        argv: &[S],
        secret: &Secret,
        payload: impl FnOnce(&str) -> String,
    ) -> Result<(), InstallerError> {
        let argv = chrooted(root, argv);
        self.record(format!("{} (stdin redacted)", argv.join(" ")));
        if self.is_dry_run() {
            return Ok(());
        }
        let input = payload(secret.expose());
        self.spawn_checked(&argv, Some(&input), true).map(drop)
    }

    // ── Files ─────────────────────────────────────────────────────────────────

    pub fn create_dir_all(&mut self, path: &Path) -> Result<(), InstallerError> {
        self.record(format!("mkdir -p {}", path.display()));
        if !self.is_dry_run() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    /// Replaces `path` with `contents`, creating parent directories.
    pub fn write_file(&mut self, path: &Path, contents: &str) -> Result<(), InstallerError> {
        self.record(format!("write {} ({} bytes)", path.display(), contents.len()));
        if !self.is_dry_run() {
            ensure_parent(path)?;
            fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Like [`write_file`](Self::write_file), then sets the permission bits.
    pub fn write_file_mode(
        &mut self,
        path: &Path,
        contents: &str,
        mode: u32,
    ) -> Result<(), InstallerError> {
        self.record(format!(
            "write {} ({} bytes, mode {:o})",
            path.display(),
            contents.len(),
            mode
        ));
        if !self.is_dry_run() {
            ensure_parent(path)?;
            fs::write(path, contents)?;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        }
        Ok(())
    }

    /// Appends `contents` to `path` (equivalent to `>> path`).
    pub fn append_file(&mut self, path: &Path, contents: &str) -> Result<(), InstallerError> {
        self.record(format!("append {} ({} bytes)", path.display(), contents.len()));
        if !self.is_dry_run() {
            ensure_parent(path)?;
            let mut file = OpenOptions::new().append(true).create(true).open(path)?;
            file.write_all(contents.as_bytes())?;
        }
        Ok(())
    }

    pub fn copy_file(&mut self, from: &Path, to: &Path) -> Result<(), InstallerError> {
        self.record(format!("cp {} {}", from.display(), to.display()));
        if !self.is_dry_run() {
            ensure_parent(to)?;
            fs::copy(from, to)?;
        }
        Ok(())
    }

    /// Points `link` at `target`, replacing whatever `link` was.
    pub fn symlink(&mut self, target: &str, link: &Path) -> Result<(), InstallerError> {
        self.record(format!("ln -sf {} {}", target, link.display()));
        if !self.is_dry_run() {
            ensure_parent(link)?;
            if link.symlink_metadata().is_ok() {
                fs::remove_file(link)?;
            }
            symlink(target, link)?;
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    type Calls = Rc<RefCell<Vec<(Vec<String>, Option<String>)>>>;

    /// Records every spawn and answers with a fixed result.
    struct Recorder {
        calls: Calls,
        reply: Finished,
    }

    fn recorder(code: i32, stdout: &str) -> (Box<Recorder>, Calls) {
        let calls = Calls::default();
        let backend = Recorder {
            calls: calls.clone(),
            reply: Finished {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: "boom".to_string(),
            },
        };
        (Box::new(backend), calls)
    }

    impl Backend for Recorder {
        fn spawn(
            &mut self,
            argv: &[String],
            input: Option<&str>,
            _capture: bool,
        ) -> io::Result<Finished> {
            self.calls
                .borrow_mut()
                .push((argv.to_vec(), input.map(str::to_string)));
            Ok(self.reply.clone())
        }
    }

    struct Missing;

    impl Backend for Missing {
        fn spawn(&mut self, _: &[String], _: Option<&str>, _: bool) -> io::Result<Finished> {
            Err(io::Error::from(io::ErrorKind::NotFound))
        }
    }

    #[test]
    fn dry_run_records_without_spawning() {
        let (backend, calls) = recorder(0, "");
        let mut exec = Executor::with_backend(ExecMode::DryRun, backend);

        exec.run(&["mkfs.ext4", "/dev/sda2"]).unwrap();
        exec.run_in_chroot(Path::new("/mnt/gentoo"), &["locale-gen"])
            .unwrap();

        assert_eq!(
            exec.history(),
            ["mkfs.ext4 /dev/sda2", "chroot /mnt/gentoo locale-gen"]
        );
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn live_non_zero_exit_is_command_failed() {
        let (backend, calls) = recorder(3, "");
        let mut exec = Executor::with_backend(ExecMode::Live, backend);

        let err = exec.run(&["parted", "/dev/sda"]).unwrap_err();
        assert!(matches!(
            err,
            InstallerError::CommandFailed { ref program, code: 3, ref stderr }
                if program == "parted" && stderr == "boom"
        ));
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn missing_binary_is_command_not_found() {
        let mut exec = Executor::with_backend(ExecMode::Live, Box::new(Missing));
        assert!(matches!(
            exec.capture(&["mirrorselect", "-o"]),
            Err(InstallerError::CommandNotFound(ref p)) if p == "mirrorselect"
        ));
    }

    #[test]
    fn capture_runs_in_dry_run_and_is_not_recorded() {
        let (backend, calls) = recorder(0, "UUID-1\n");
        let mut exec = Executor::with_backend(ExecMode::DryRun, backend);

        let out = exec.capture(&["blkid", "-s", "UUID", "-o", "value", "/dev/sda3"]);
        assert_eq!(out.unwrap(), "UUID-1\n");
        assert!(exec.history().is_empty());
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn secret_stays_out_of_argv_and_history() {
        for mode in [ExecMode::DryRun, ExecMode::Live] {
            let (backend, calls) = recorder(0, "");
            let mut exec = Executor::with_backend(mode, backend);
            let secret = Secret::new("hunter2");

            exec.run_in_chroot_with_secret(Path::new("/mnt/gentoo"), &["chpasswd"], &secret, |pw| {
                format!("root:{pw}\n")
            })
            .unwrap();

            assert_eq!(exec.history(), ["chroot /mnt/gentoo chpasswd (stdin redacted)"]);
            assert!(exec.history().iter().all(|l| !l.contains("hunter2")));

            let calls = calls.borrow();
            match mode {
                ExecMode::DryRun => assert!(calls.is_empty()),
                ExecMode::Live => {
                    let (argv, input) = &calls[0];
                    assert!(argv.iter().all(|a| !a.contains("hunter2")));
                    assert_eq!(input.as_deref(), Some("root:hunter2\n"));
                }
            }
        }
    }

    #[test]
    fn file_operations_only_touch_disk_when_live() {
        let dir = tempfile::tempdir().unwrap();
        let hostname = dir.path().join("etc/hostname");
        let mtab = dir.path().join("etc/mtab");

        let mut dry = Executor::new(ExecMode::DryRun);
        dry.write_file(&hostname, "gentoo\n").unwrap();
        dry.symlink("/proc/self/mounts", &mtab).unwrap();
        assert!(!dir.path().join("etc").exists());
        assert_eq!(dry.history().len(), 2);

        let mut live = Executor::new(ExecMode::Live);
        live.write_file(&hostname, "gentoo\n").unwrap();
        live.append_file(&hostname, "extra\n").unwrap();
        live.symlink("/proc/self/mounts", &mtab).unwrap();
        live.symlink("/proc/self/mounts", &mtab).unwrap();

        assert_eq!(fs::read_to_string(&hostname).unwrap(), "gentoo\nextra\n");
        assert_eq!(
            fs::read_link(&mtab).unwrap(),
            Path::new("/proc/self/mounts")
        );
        assert_eq!(dry.history()[0], live.history()[0]);
    }

    #[test]
    fn write_file_mode_sets_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let rule = dir.path().join("sudoers.d/10-wheel");
        let mut exec = Executor::new(ExecMode::Live);
        exec.write_file_mode(&rule, "%wheel ALL=(ALL:ALL) ALL\n", 0o440)
            .unwrap();
        let mode = fs::metadata(&rule).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o440);
    }

    #[test]
    fn child_that_ignores_stdin_is_still_reaped() {
        let argv: Vec<String> = ["sh", "-c", "exit 3"].iter().map(|s| s.to_string()).collect();
        let input = "x".repeat(1 << 20);

        let finished = SystemBackend.spawn(&argv, Some(&input), true).unwrap();

        assert_eq!(finished.code, Some(3));
        assert!(!finished.success());
    }
}
