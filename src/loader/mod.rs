//! Plain-text URL lists in, URL lists out.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// One URL per line; blank lines and `#` comments are ignored.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL list {:?}", path))?;
    let urls = parse_url_list(&text);
    info!("{} URLs loaded from {:?}", urls.len(), path);
    Ok(urls)
}

pub fn write_url_list(path: &Path, urls: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for url in urls {
        writeln!(file, "{}", url)?;
    }
    debug!("Wrote {} URLs to {:?}", urls.len(), path);
    Ok(())
}

/// Drop repeats, keeping the first occurrence's position.
pub fn dedupe(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(urls.len());
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}
