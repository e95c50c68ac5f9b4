//! Browser Detection
//!
//! Locates a Chromium-family executable that speaks the DevTools protocol.
//! Supports macOS, Linux, and Windows.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

/// Executable names searched on `PATH`, most specific first.
const PATH_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "brave-browser",
    "microsoft-edge",
];

#[cfg(target_os = "macos")]
const INSTALL_CANDIDATES: &[&str] = &[
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

#[cfg(target_os = "windows")]
const INSTALL_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const INSTALL_CANDIDATES: &[&str] = &["/usr/lib/chromium/chromium", "/opt/google/chrome/chrome"];

/// Resolve the browser executable.
///
/// An explicitly configured path wins and must exist. Otherwise `PATH` is
/// searched, then the platform's usual install locations.
pub fn find_browser(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        // Allow bare names like "chromium" in config
        if let Ok(found) = which::which(path) {
            return Ok(found);
        }
        bail!("Configured browser {} not found", path.display());
    }

    for name in PATH_CANDIDATES {
        if let Ok(found) = which::which(name) {
            return Ok(found);
        }
    }

    for path in INSTALL_CANDIDATES {
        let path = Path::new(path);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    bail!("No Chromium-based browser found (tried {})", PATH_CANDIDATES.join(", "))
}
