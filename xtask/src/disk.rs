//! Disk Image Creation
//!
//! This module creates FAT12 floppy images for exercising fatnav, using
//! `mkfs.fat` and mtools.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::Path;
use std::process::Command;

/// 1.44M floppy: 2880 sectors of 512 bytes
const SECTOR_SIZE: u64 = 512;
const FLOPPY_SECTORS: u64 = 2880;

/// Create a FAT12 floppy image
///
/// # Arguments
/// * `output` - Path for the output image
/// * `label` - Volume label
/// * `dir` - Optional directory to create and copy `files` into
/// * `files` - Host files to copy onto the image
pub fn create_floppy(
    output: &Path,
    label: &str,
    dir: Option<&str>,
    files: &[String],
) -> Result<()> {
    for tool in ["mkfs.fat", "mcopy", "mmd"] {
        if which(tool).is_none() {
            bail!("{} not found in PATH (install dosfstools and mtools)", tool);
        }
    }

    println!("Creating floppy image: {}", output.display());

    let file = File::create(output).context("failed to create image")?;
    file.set_len(FLOPPY_SECTORS * SECTOR_SIZE)?;
    drop(file);

    let image = output.to_string_lossy();
    let status = Command::new("mkfs.fat")
        .args(["-F", "12", "-n", label, &image])
        .status()
        .context("Failed to run mkfs.fat")?;
    if !status.success() {
        let _ = std::fs::remove_file(output);
        bail!("mkfs.fat failed");
    }

    let target = match dir {
        Some(dir) => {
            let dir = format!("::/{}", dir.trim_matches('/'));
            let status = Command::new("mmd")
                .args(["-i", &image, &dir])
                .status()
                .context("Failed to run mmd")?;
            if !status.success() {
                bail!("Failed to create {} on the image", dir);
            }
            dir
        }
        None => "::/".to_string(),
    };

    for path in files {
        if !Path::new(path).exists() {
            bail!("File not found: {}", path);
        }
        let status = Command::new("mcopy")
            .args(["-i", &image, path, &target])
            .status()
            .context("Failed to run mcopy")?;
        if !status.success() {
            bail!("Failed to copy {} onto the image", path);
        }
        println!("Copied {} to {}", path, target);
    }

    println!("Created: {}", output.display());
    Ok(())
}

/// Find a command in PATH
fn which(cmd: &str) -> Option<String> {
    Command::new("which")
        .arg(cmd)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}
