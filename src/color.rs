//! Seeded workspace colors.
//!
//! A workspace's color is derived from a SHA-256 digest of its id, so every
//! process assigns the same color to the same workspace without coordination.

use crate::model::{Workspace, WorkspaceColors};
use sha2::{Digest, Sha256};

/// Derive a display color (`#rrggbb`) from a seed.
pub fn seeded_color(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let hue = f64::from(u16::from_be_bytes([digest[0], digest[1]]) % 360);
    // Keep colors saturated and bright enough to read on a photo background.
    let saturation = f64::from(55 + digest[2] % 41) / 100.0;
    let value = f64::from(60 + digest[3] % 36) / 100.0;
    format!("#{}", hex::encode(hsv_to_rgb(hue, saturation, value)))
}

fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> [u8; 3] {
    let chroma = value * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u8 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    let channel = |c: f64| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [channel(r), channel(g), channel(b)]
}

/// Colors for a freshly fetched workspace list.
///
/// Existing assignments are kept, new workspaces get their seeded color, and
/// workspaces that are no longer present are dropped.
pub fn merge_colors(previous: &WorkspaceColors, workspaces: &[Workspace]) -> WorkspaceColors {
    workspaces
        .iter()
        .map(|workspace| {
            let color = previous
                .get(workspace.id())
                .cloned()
                .unwrap_or_else(|| seeded_color(workspace.id()));
            (workspace.id().to_string(), color)
        })
        .collect()
}
