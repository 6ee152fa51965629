//! fatnav Developer Tool
//!
//! This xtask provides commands for creating and inspecting FAT12/16 images.
//!
//! # Usage
//!
//! ```bash
//! cargo xtask create-image --output floppy.img README.md
//! cargo xtask info --image floppy.img
//! cargo xtask ls --image floppy.img /DOCS
//! cargo xtask cat --image floppy.img /DOCS/README.MD
//! ```

mod disk;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fatnav::fs::fat::{attr, DirectoryEntry, FatVolume, FileCursor, ReadStatus, SeekFrom};
use fatnav::ImageFile;
use log::LevelFilter;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "xtask", bin_name = "cargo xtask")]
#[command(about = "fatnav image tooling")]
struct Cli {
    /// Log library activity (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a FAT12 floppy image with mkfs.fat and mtools
    CreateImage {
        /// Output path for the image
        #[arg(long, default_value = "floppy.img")]
        output: PathBuf,

        /// Volume label
        #[arg(long, default_value = "FATNAV")]
        label: String,

        /// Directory to create and copy the files into
        #[arg(long)]
        dir: Option<String>,

        /// Files to copy onto the image
        files: Vec<String>,
    },

    /// Show the volume geometry
    Info {
        /// Path to the image
        #[arg(long)]
        image: PathBuf,
    },

    /// List a directory
    Ls {
        /// Path to the image
        #[arg(long)]
        image: PathBuf,

        /// Directory path on the image
        #[arg(default_value = "/")]
        path: String,

        /// Include deleted and long-name entries, numbered by ordinal
        #[arg(long)]
        raw: bool,
    },

    /// Write a file to stdout
    Cat {
        /// Path to the image
        #[arg(long)]
        image: PathBuf,

        /// File path on the image
        path: String,

        /// Start reading at this byte offset
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    fatnav::logger::init(level).context("failed to install logger")?;

    match cli.command {
        Commands::CreateImage {
            output,
            label,
            dir,
            files,
        } => disk::create_floppy(&output, &label, dir.as_deref(), &files),
        Commands::Info { image } => cmd_info(open(&image)?),
        Commands::Ls { image, path, raw } => cmd_ls(open(&image)?, &path, raw),
        Commands::Cat {
            image,
            path,
            offset,
        } => cmd_cat(open(&image)?, &path, offset),
    }
}

fn open(image: &Path) -> Result<FatVolume<ImageFile>> {
    FatVolume::open_image(image).with_context(|| format!("failed to mount {}", image.display()))
}

fn cmd_info(vol: FatVolume<ImageFile>) -> Result<()> {
    let geo = vol.geometry();
    let bpb = geo.bpb();

    println!("Type:                {:?}", geo.fat_type());
    println!("Bytes per sector:    {}", bpb.bytes_per_sector);
    println!("Sectors per cluster: {}", bpb.sectors_per_cluster);
    println!("Reserved sectors:    {}", bpb.reserved_sectors);
    println!("FATs:                {} x {} sectors", bpb.num_fats, bpb.sectors_per_fat);
    println!("Root entries:        {}", bpb.root_entry_count);
    println!("Total sectors:       {}", bpb.total_sectors());
    println!("Media:               {:#04x}", bpb.media_type);
    println!(
        "Root directory:      sector {} (+{})",
        geo.root_dir_start_sector(),
        geo.root_dir_sector_count()
    );
    println!("Data region:         sector {}", geo.data_region_start_sector());
    println!("Clusters:            {}", geo.cluster_count());
    Ok(())
}

fn cmd_ls(mut vol: FatVolume<ImageFile>, path: &str, raw: bool) -> Result<()> {
    let location = vol
        .resolve_dir(path)
        .with_context(|| format!("{}: not a directory", path))?;

    if raw {
        // Every ordinal the entry reader yields, up to the terminator
        for ordinal in 1.. {
            let entry = match vol.get_entry(ordinal, location) {
                Ok(entry) => entry,
                Err(fatnav::FatError::NotFound) => break,
                Err(e) => return Err(e.into()),
            };
            if entry.is_end() {
                break;
            }
            let state = if entry.is_deleted() { "deleted" } else { "" };
            println!("{:4} {} {}", ordinal, format_entry(&entry), state);
        }
        return Ok(());
    }

    for entry in vol.list_directory(location)? {
        println!("{}", format_entry(&entry));
    }
    Ok(())
}

fn cmd_cat(mut vol: FatVolume<ImageFile>, path: &str, offset: u32) -> Result<()> {
    let entry = vol.lookup(path).with_context(|| format!("{}: not found", path))?;
    if !entry.is_file() {
        anyhow::bail!("{}: not a file", path);
    }

    let mut cursor = FileCursor::open(&entry);
    vol.seek(&mut cursor, SeekFrom::Start(offset))?;

    let mut remaining = entry.size().saturating_sub(offset) as usize;
    let mut buffer = vec![0u8; vol.geometry().bytes_per_cluster()];
    let mut stdout = std::io::stdout().lock();

    while remaining > 0 {
        let want = remaining.min(buffer.len());
        let got = match vol.read(&mut cursor, &mut buffer[..want])? {
            ReadStatus::Complete => want,
            ReadStatus::EndOfChain { filled } => {
                log::warn!("{}: chain ended {} bytes early", path, remaining - filled);
                remaining = filled;
                filled
            }
        };
        stdout.write_all(&buffer[..got])?;
        remaining -= got;
    }
    cursor.close();
    Ok(())
}

fn format_entry(entry: &DirectoryEntry) -> String {
    let kind = if entry.is_long_name() {
        "<LFN>"
    } else if entry.is_volume_label() {
        "<VOL>"
    } else if entry.is_directory() {
        "<DIR>"
    } else {
        ""
    };

    let flags: String = [
        (attr::READ_ONLY, 'R'),
        (attr::HIDDEN, 'H'),
        (attr::SYSTEM, 'S'),
        (attr::ARCHIVE, 'A'),
    ]
    .iter()
    .map(|&(bit, c)| if entry.attributes() & bit != 0 { c } else { '-' })
    .collect();

    format!(
        "{:<12} {:>5} {:>10} {} {} {}",
        entry.short_name().as_str(),
        kind,
        entry.size(),
        entry.modified_date(),
        entry.modified_time(),
        flags
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_entry() {
        let attributes = attr::ARCHIVE | attr::READ_ONLY;
        let entry = DirectoryEntry::new(*b"README  ", *b"TXT", attributes, 2, 1234)
            .with_modified((44 << 9) | (3 << 5) | 15, (13 << 11) | (45 << 5) | 29);
        assert_eq!(
            format_entry(&entry),
            "README.TXT               1234 15/03/2024 13:45:58 R--A"
        );

        let dir = DirectoryEntry::new(*b"DOCS    ", *b"   ", attr::DIRECTORY, 3, 0);
        assert!(format_entry(&dir).contains("<DIR>"));
    }
}
