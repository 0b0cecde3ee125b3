//! # renewsheet-loader
//!
//! Loads renewal workbooks into a `Dataset`.
//!
//! This crate provides:
//! - `WorkbookLoader`: path checks, encryption sniffing, required-column validation
//! - `Decryptor`: capability that strips workbook protection
//! - `CommandDecryptor`: production decryptor backed by an external tool
//! - calamine cell conversion (`sheet`)
//!
//! Decrypted copies live in a scoped temporary directory that is removed
//! before `load` returns, whether reading succeeded or not.
//!
//! ## Example
//!
//! ```rust,no_run
//! use renewsheet_core::SchemaPolicy;
//! use renewsheet_loader::{CommandDecryptor, WorkbookLoader};
//! use std::path::Path;
//!
//! let loader = WorkbookLoader::new(CommandDecryptor::default())
//!     .with_schema(SchemaPolicy::new().require(["Expiration Date", "Carrier"]));
//! let dataset = loader.load(Path::new("Export_RenewalCenter.xlsx"), Some("hunter2"))?;
//! println!("{} renewals", dataset.row_count());
//! # Ok::<(), renewsheet_core::RenewalError>(())
//! ```

pub mod decrypt;
pub mod sheet;

pub use decrypt::{CommandDecryptor, Decryptor};

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use renewsheet_core::{Dataset, RenewalError, SchemaPolicy};

/// First eight bytes of every OLE compound document
pub const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// How a file on disk is packaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packaging {
    /// Zip-based OOXML or any other format calamine reads directly
    Plain,
    /// Legacy BIFF `.xls` (OLE container, may or may not be protected)
    LegacyOle,
    /// OOXML extension wrapped in an OLE container: an encrypted package
    EncryptedOoxml,
}

/// Sniff the container format from the first bytes and the extension
pub fn detect_packaging(path: &Path) -> Result<Packaging, RenewalError> {
    let mut file = File::open(path)
        .map_err(|e| RenewalError::Read(format!("cannot open {}: {e}", path.display())))?;
    let mut magic = [0u8; 8];
    let mut filled = 0;
    while filled < magic.len() {
        let n = file
            .read(&mut magic[filled..])
            .map_err(|e| RenewalError::Read(format!("cannot read {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    if filled < magic.len() || magic != OLE_SIGNATURE {
        return Ok(Packaging::Plain);
    }
    let legacy = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xls"));
    Ok(if legacy {
        Packaging::LegacyOle
    } else {
        Packaging::EncryptedOoxml
    })
}

/// Reads renewal workbooks, decrypting them first when needed
#[derive(Debug, Clone)]
pub struct WorkbookLoader<D = CommandDecryptor> {
    decryptor: D,
    schema: SchemaPolicy,
    sheet: Option<String>,
    temp_root: Option<PathBuf>,
}

impl<D: Decryptor> WorkbookLoader<D> {
    pub fn new(decryptor: D) -> Self {
        Self {
            decryptor,
            schema: SchemaPolicy::default(),
            sheet: None,
            temp_root: None,
        }
    }

    /// Required columns are checked right after reading
    pub fn with_schema(mut self, schema: SchemaPolicy) -> Self {
        self.schema = schema;
        self
    }

    /// Read this sheet instead of the first one
    pub fn sheet(mut self, name: impl Into<String>) -> Self {
        self.sheet = Some(name.into());
        self
    }

    /// Directory under which decrypted copies are staged
    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(dir.into());
        self
    }

    pub fn decryptor(&self) -> &D {
        &self.decryptor
    }

    /// Load a workbook. An empty password counts as no password.
    pub fn load(&self, path: &Path, password: Option<&str>) -> Result<Dataset, RenewalError> {
        if !path.is_file() {
            return Err(RenewalError::FileNotFound(path.to_path_buf()));
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workbook".to_string());
        let password = password.filter(|p| !p.is_empty());
        let packaging = detect_packaging(path)?;
        debug!(path = %path.display(), ?packaging, "detected packaging");

        let dataset = match (packaging, password) {
            (Packaging::EncryptedOoxml, None) => {
                return Err(RenewalError::Decryption(
                    "workbook is password protected; supply a password".into(),
                ));
            }
            (Packaging::EncryptedOoxml, Some(password)) => {
                self.load_decrypted(path, password, &name)?
            }
            // Legacy workbooks are read directly; only a protected one is decrypted
            (Packaging::LegacyOle, Some(password)) => {
                match sheet::read_sheet(path, self.sheet.as_deref(), &name) {
                    Err(RenewalError::Decryption(_)) => self.load_decrypted(path, password, &name)?,
                    result => {
                        let dataset = result?;
                        debug!(path = %path.display(), "legacy workbook is not protected, password unused");
                        dataset
                    }
                }
            }
            (Packaging::Plain, Some(_)) => {
                warn!(path = %path.display(), "password supplied but workbook is not encrypted");
                sheet::read_sheet(path, self.sheet.as_deref(), &name)?
            }
            (Packaging::Plain | Packaging::LegacyOle, None) => {
                sheet::read_sheet(path, self.sheet.as_deref(), &name)?
            }
        };

        self.schema.validate(&dataset)?;
        info!(
            path = %path.display(),
            rows = dataset.row_count(),
            columns = dataset.columns().len(),
            "loaded workbook"
        );
        Ok(dataset)
    }

    fn load_decrypted(
        &self,
        path: &Path,
        password: &str,
        name: &str,
    ) -> Result<Dataset, RenewalError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("renewsheet-");
        let staging = match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| RenewalError::Decryption(format!("cannot create staging directory: {e}")))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("xlsx");
        let plaintext = staging.path().join(format!("decrypted.{extension}"));

        let result = self
            .decryptor
            .decrypt(path, password, &plaintext)
            .and_then(|()| sheet::read_sheet(&plaintext, self.sheet.as_deref(), name));

        let staged = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            warn!(dir = %staged.display(), "failed to remove decrypted copy: {e}");
        }
        result
    }
}
