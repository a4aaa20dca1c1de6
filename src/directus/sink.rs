//! Destinations for downloaded asset bodies.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Prefix used when the caller does not pick a destination path.
pub const ASSETS_DIR: &str = "assets";

/// Filesystem-like store for binary bodies.
pub trait AssetSink {
  /// Write `bytes` at the relative `path`, replacing any existing file.
  fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;

  /// Absolute location of a relative `path`.
  fn resolve_path(&self, path: &str) -> PathBuf;
}

/// Sink writing under a root directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalDisk {
  root: PathBuf,
}

impl LocalDisk {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

impl AssetSink for LocalDisk {
  fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
    let relative = Path::new(path);
    let escapes = relative
      .components()
      .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || path.is_empty() {
      return Err(Error::InvalidArgument(format!(
        "Asset path '{}' must stay inside the storage root",
        path
      )));
    }

    let target = self.root.join(relative);
    if let Some(parent) = target.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, bytes)?;

    Ok(())
  }

  fn resolve_path(&self, path: &str) -> PathBuf {
    self.root.join(path)
  }
}

/// File name for a downloaded asset.
///
/// Prefers `filename*=` from the `Content-Disposition` header, then
/// `filename=`, and falls back to the asset id. Directory parts are dropped.
pub fn asset_file_name(content_disposition: Option<&str>, id: &str) -> String {
  content_disposition
    .and_then(filename_from_disposition)
    .and_then(|name| {
      Path::new(&name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
    })
    .filter(|name| name != "." && name != "..")
    .unwrap_or_else(|| id.to_string())
}

fn filename_from_disposition(header: &str) -> Option<String> {
  let mut plain = None;
  let mut extended = None;

  for param in split_params(header) {
    let Some((name, value)) = param.split_once('=') else {
      continue;
    };
    match name.trim().to_ascii_lowercase().as_str() {
      "filename*" => {
        // RFC 5987: charset'language'percent-encoded
        let encoded = value.trim().rsplit('\'').next().unwrap_or_default();
        extended = percent_decode(encoded);
      }
      "filename" => plain = Some(unquote(value.trim()).to_string()),
      _ => {}
    }
  }

  extended.or(plain).filter(|name| !name.is_empty())
}

/// Split header parameters on `;` outside quoted strings, dropping the
/// backslash of quoted-pair escapes.
fn split_params(header: &str) -> Vec<String> {
  let mut params = Vec::new();
  let mut current = String::new();
  let mut quoted = false;
  let mut escaped = false;

  for c in header.chars() {
    match c {
      _ if escaped => {
        current.push(c);
        escaped = false;
      }
      '\\' if quoted => escaped = true,
      '"' => {
        quoted = !quoted;
        current.push(c);
      }
      ';' if !quoted => params.push(std::mem::take(&mut current)),
      _ => current.push(c),
    }
  }
  params.push(current);

  params
}

fn unquote(value: &str) -> &str {
  value
    .strip_prefix('"')
    .and_then(|v| v.strip_suffix('"'))
    .unwrap_or(value)
}

fn percent_decode(input: &str) -> Option<String> {
  let bytes = input.as_bytes();
  let mut out = Vec::with_capacity(bytes.len());
  let mut i = 0;
  while i < bytes.len() {
    if bytes[i] == b'%' {
      let hex = input.get(i + 1..i + 3)?;
      out.push(u8::from_str_radix(hex, 16).ok()?);
      i += 3;
    } else {
      out.push(bytes[i]);
      i += 1;
    }
  }
  String::from_utf8(out).ok()
}
