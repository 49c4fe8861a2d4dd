//! Where the CLI keeps its own files (currently just `config.toml`).

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

/// `$RECEIPTS_HOME` if set, else `~/.receipts`.
pub fn receipts_home() -> Result<PathBuf> {
    home_from(|k| std::env::var_os(k))
}

pub fn ensure_receipts_home() -> Result<PathBuf> {
    let dir = receipts_home()?;
    fs::create_dir_all(&dir)
        .with_context(|| format!("create receipts home {}", dir.display()))?;
    Ok(dir)
}

fn home_from(lookup: impl Fn(&str) -> Option<OsString>) -> Result<PathBuf> {
    let get = |k: &str| lookup(k).filter(|v| !v.is_empty());

    if let Some(dir) = get("RECEIPTS_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = get("HOME")
        .context("cannot locate the receipts home: neither RECEIPTS_HOME nor HOME is set (or pass --config)")?;
    Ok(PathBuf::from(home).join(".receipts"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<OsString> {
        move |k| pairs.iter().find(|(n, _)| *n == k).map(|(_, v)| OsString::from(*v))
    }

    #[test]
    fn explicit_home_wins() {
        let dir = home_from(env(&[("RECEIPTS_HOME", "/srv/receipts"), ("HOME", "/home/a")])).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/receipts"));
    }

    #[test]
    fn defaults_under_user_home() {
        let dir = home_from(env(&[("RECEIPTS_HOME", ""), ("HOME", "/home/a")])).unwrap();
        assert_eq!(dir, PathBuf::from("/home/a/.receipts"));
    }

    #[test]
    fn no_home_names_the_override() {
        let err = home_from(env(&[])).unwrap_err();
        assert!(err.to_string().contains("RECEIPTS_HOME"));
    }
}
