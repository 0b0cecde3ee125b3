//! Decryption capability
//!
//! Password-protected workbooks are stored as OLE compound documents wrapping
//! an encrypted package. Stripping the protection is delegated to a
//! `Decryptor`, which writes a plaintext copy for the loader to read.
//!
//! The password never appears on a command line: `CommandDecryptor` writes it
//! to the child's stdin, followed by a newline.

use std::ffi::OsString;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use renewsheet_core::{DecryptionConfig, RenewalError};

/// Reads `<source> <destination>` from argv and the password from stdin
const MSOFFCRYPTO_SCRIPT: &str = "\
import sys, msoffcrypto
password = sys.stdin.readline().rstrip('\\r\\n')
with open(sys.argv[1], 'rb') as src, open(sys.argv[2], 'wb') as dst:
    office = msoffcrypto.OfficeFile(src)
    office.load_key(password=password)
    office.decrypt(dst)
";

/// Writes a plaintext copy of a protected workbook to `destination`
pub trait Decryptor {
    fn decrypt(&self, source: &Path, password: &str, destination: &Path)
        -> Result<(), RenewalError>;
}

impl<T: Decryptor + ?Sized> Decryptor for &T {
    fn decrypt(
        &self,
        source: &Path,
        password: &str,
        destination: &Path,
    ) -> Result<(), RenewalError> {
        (**self).decrypt(source, password, destination)
    }
}

impl<T: Decryptor + ?Sized> Decryptor for Box<T> {
    fn decrypt(
        &self,
        source: &Path,
        password: &str,
        destination: &Path,
    ) -> Result<(), RenewalError> {
        (**self).decrypt(source, password, destination)
    }
}

/// Runs an external tool as `<program> [args..] <source> <destination>`
/// and feeds it the password on stdin.
///
/// The default runs the `msoffcrypto` Python package through `python3 -c`,
/// which understands both the agile/standard OOXML schemes and legacy RC4
/// `.xls` protection.
#[derive(Clone, Debug)]
pub struct CommandDecryptor {
    program: PathBuf,
    args: Vec<OsString>,
}

impl Default for CommandDecryptor {
    fn default() -> Self {
        Self::new("python3").args(["-c", MSOFFCRYPTO_SCRIPT])
    }
}

impl CommandDecryptor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The configured tool, or the built-in `msoffcrypto` runner
    pub fn from_config(config: &DecryptionConfig) -> Self {
        match &config.program {
            Some(program) => Self::new(program).args(&config.args),
            None => Self::default(),
        }
    }

    /// Arguments placed before the source and destination paths
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn spawn_error(&self, e: &std::io::Error) -> RenewalError {
        if e.kind() == IoErrorKind::NotFound {
            RenewalError::Decryption(format!(
                "decryption tool '{}' is unavailable: {e}",
                self.program.display()
            ))
        } else {
            RenewalError::Decryption(format!("cannot run '{}': {e}", self.program.display()))
        }
    }
}

impl Decryptor for CommandDecryptor {
    fn decrypt(
        &self,
        source: &Path,
        password: &str,
        destination: &Path,
    ) -> Result<(), RenewalError> {
        debug!(program = %self.program.display(), source = %source.display(), "running decryption tool");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(source)
            .arg(destination)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(&e))?;

        // Dropping stdin closes it; a tool that exits early is judged by its status
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = writeln!(stdin, "{password}") {
                debug!("decryption tool did not read the password: {e}");
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| self.spawn_error(&e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(RenewalError::Decryption(if detail.is_empty() {
                format!(
                    "'{}' exited with {} (wrong password?)",
                    self.program.display(),
                    output.status
                )
            } else {
                format!(
                    "'{}' exited with {}: {detail}",
                    self.program.display(),
                    output.status
                )
            }));
        }

        if !destination.is_file() {
            return Err(RenewalError::Decryption(format!(
                "'{}' reported success but wrote no file",
                self.program.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_a_decryption_error() {
        let dir = tempfile::tempdir().unwrap();
        let decryptor = CommandDecryptor::new("renewsheet-no-such-decryption-tool");
        let err = decryptor
            .decrypt(
                &dir.path().join("in.xlsx"),
                "secret",
                &dir.path().join("out.xlsx"),
            )
            .unwrap_err();
        assert!(matches!(err, RenewalError::Decryption(_)));
        assert!(err.to_string().contains("unavailable"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_is_a_decryption_error() {
        let dir = tempfile::tempdir().unwrap();
        let decryptor = CommandDecryptor::new("false");
        let err = decryptor
            .decrypt(
                &dir.path().join("in.xlsx"),
                "secret",
                &dir.path().join("out.xlsx"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[cfg(unix)]
    #[test]
    fn silent_tool_without_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let decryptor = CommandDecryptor::new("true");
        let err = decryptor
            .decrypt(
                &dir.path().join("in.xlsx"),
                "secret",
                &dir.path().join("out.xlsx"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("wrote no file"));
    }

    /// `sh -c <script> <source> <destination>` binds `$0` and `$1`
    #[cfg(unix)]
    fn shell(script: &str) -> CommandDecryptor {
        CommandDecryptor::new("sh").args(["-c", script])
    }

    #[cfg(unix)]
    #[test]
    fn password_is_read_from_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.xlsx");
        std::fs::write(&source, b"plaintext").unwrap();
        let decryptor = shell(r#"read pw; [ "$pw" = "s3cret pass" ] && cp "$0" "$1""#);

        let destination = dir.path().join("out.xlsx");
        decryptor.decrypt(&source, "s3cret pass", &destination).unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"plaintext");

        let rejected = dir.path().join("rejected.xlsx");
        let err = decryptor.decrypt(&source, "guess", &rejected).unwrap_err();
        assert!(err.to_string().contains("exited with"));
        assert!(!rejected.exists());
    }

    #[cfg(unix)]
    #[test]
    fn password_is_not_passed_as_an_argument() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.xlsx");
        std::fs::write(&source, b"plaintext").unwrap();
        let decryptor = shell(r#"cat > /dev/null; printf '%s\n' "$0" "$@" > "$1""#);

        let destination = dir.path().join("argv.txt");
        decryptor.decrypt(&source, "hunter2", &destination).unwrap();
        let argv = std::fs::read_to_string(&destination).unwrap();
        assert!(argv.contains("in.xlsx"));
        assert!(!argv.contains("hunter2"));
    }

    #[test]
    fn default_runs_msoffcrypto_through_python() {
        let decryptor = CommandDecryptor::default();
        assert_eq!(decryptor.program(), Path::new("python3"));
        assert_eq!(decryptor.args[0], "-c");
        let script = decryptor.args[1].to_string_lossy();
        assert!(script.contains("msoffcrypto"));
        assert!(script.contains("sys.stdin"));
    }

    #[test]
    fn configured_program_replaces_default() {
        let config = DecryptionConfig {
            program: Some("unlock-workbook".into()),
            args: vec!["--quiet".into()],
            temp_dir: None,
        };
        let decryptor = CommandDecryptor::from_config(&config);
        assert_eq!(decryptor.program(), Path::new("unlock-workbook"));
        assert_eq!(decryptor.args, vec![OsString::from("--quiet")]);

        let decryptor = CommandDecryptor::from_config(&DecryptionConfig::default());
        assert_eq!(decryptor.program(), Path::new("python3"));
    }
}
