use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Expands a leading `~` to the home directory.
pub(crate) fn expand_home(location: &str) -> PathBuf {
    let rest = match location.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(location),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(location),
    }
}

fn has_wildcard(name: &str) -> bool {
    name.contains(['*', '?'])
}

/// Glob match of a single path component: `*` matches any run of
/// characters, `?` exactly one.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// Resolves the source locations echoed back by Snowflake into the files to
/// upload, in a stable order.
pub(crate) async fn expand_sources(locations: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for location in locations {
        let path = expand_home(location);
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        if !has_wildcard(&name) {
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => files.push(path),
                _ => return Err(Error::FileNotFound(location.clone())),
            }
            continue;
        }

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut matched = matching_files(&directory, &name).await?;
        if matched.is_empty() {
            return Err(Error::FileNotFound(location.clone()));
        }
        matched.sort();
        files.extend(matched);
    }
    Ok(files)
}

async fn matching_files(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(directory).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut matched = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let is_match = entry
            .file_name()
            .to_str()
            .is_some_and(|name| wildcard_match(pattern, name));
        if is_match && entry.file_type().await?.is_file() {
            matched.push(entry.path());
        }
    }
    Ok(matched)
}
