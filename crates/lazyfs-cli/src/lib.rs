// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `lazyfs` command: browse a host directory through the in-memory overlay

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use lazyfs_archive::{Metadata, Placer};
use lazyfs_core::{FileType, FsConfig, Mode, Tree};
use lazyfs_logging::CliLoggingArgs;
use lazyfs_posix::{join, PosixFs};

#[derive(clap::Parser, Debug)]
#[command(name = "lazyfs", about = "Browse a host directory through a lazyfs overlay", version)]
pub struct Cli {
    /// Host directory to overlay (overrides `overlay.lower-root`)
    #[arg(long, env = "LAZYFS_LOWER")]
    pub lower: Option<PathBuf>,
    /// TOML configuration file
    #[arg(long, env = "LAZYFS_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(flatten)]
    pub logging: CliLoggingArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Show mode, owner and size
        #[arg(short, long)]
        long: bool,
    },
    /// Print file contents
    Cat { path: String },
    /// Describe one entry
    Stat {
        path: String,
        #[arg(long)]
        json: bool,
        /// Describe a final symlink itself
        #[arg(long)]
        no_follow: bool,
    },
    /// Print a symlink target
    Readlink { path: String },
    /// Resolve a symlink to a path inside the overlay root
    Resolve { path: String },
    /// Print the directory hierarchy without following symlinks
    Tree {
        #[arg(default_value = "/")]
        path: String,
    },
}

impl Cli {
    /// Effective configuration: the file (if any) with `--lower` applied.
    pub fn fs_config(&self) -> Result<FsConfig> {
        let mut config = match &self.config {
            Some(path) => FsConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => FsConfig::default(),
        };
        if let Some(lower) = &self.lower {
            config.overlay.lower_root = Some(lower.clone());
        }
        Ok(config)
    }

    pub fn run(&self, out: &mut impl Write) -> Result<()> {
        let config = self.fs_config()?;
        let Some(lower) = config.overlay.lower_root.clone() else {
            bail!("no lower directory: pass --lower or set overlay.lower-root");
        };
        tracing::info!(lower = %lower.display(), "overlaying host directory");
        let placer = Placer::new(Tree::from_host(&lower), config);
        let fs = placer.posix();

        match &self.command {
            Commands::Ls { path, long } => list(fs, path, *long, out),
            Commands::Cat { path } => cat(fs, path, out),
            Commands::Stat {
                path,
                json,
                no_follow,
            } => {
                let md = if *no_follow {
                    placer.lstat(path)?
                } else {
                    placer.stat(path)?
                };
                if *json {
                    writeln!(out, "{}", serde_json::to_string_pretty(&md)?)?;
                } else {
                    write_metadata(&md, out)?;
                }
                Ok(())
            }
            Commands::Readlink { path } => {
                writeln!(out, "{}", fs.readlink(path)?)?;
                Ok(())
            }
            Commands::Resolve { path } => {
                let (target, is_link) = placer.readlink(path)?;
                if !is_link {
                    bail!("{path} is not a symlink");
                }
                writeln!(out, "{}", placer.resolve_link(&target, path)?)?;
                Ok(())
            }
            Commands::Tree { path } => {
                writeln!(out, "{path}")?;
                tree(fs, path, "", out)
            }
        }
    }
}

fn list(fs: &PosixFs, path: &str, long: bool, out: &mut impl Write) -> Result<()> {
    for info in fs.read_dir(path)? {
        if long {
            writeln!(
                out,
                "{} {:>5} {:>5} {:>8} {}",
                mode_string(info.mode),
                info.uid,
                info.gid,
                info.size,
                info.name
            )?;
        } else {
            writeln!(out, "{}{}", info.name, type_suffix(info.mode.file_type()))?;
        }
    }
    Ok(())
}

fn cat(fs: &PosixFs, path: &str, out: &mut impl Write) -> Result<()> {
    let handle = fs.open(path)?;
    let mut buf = vec![0u8; 64 * 1024];
    let result = loop {
        match fs.read(handle, &mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => {
                if let Err(e) = out.write_all(&buf[..n]) {
                    break Err(e.into());
                }
            }
            Err(e) => break Err(e.into()),
        }
    };
    fs.close(handle)?;
    result
}

fn tree(fs: &PosixFs, path: &str, indent: &str, out: &mut impl Write) -> Result<()> {
    let entries = fs.read_dir(path)?;
    let count = entries.len();
    for (idx, info) in entries.into_iter().enumerate() {
        let last = idx + 1 == count;
        let branch = if last { "`-- " } else { "|-- " };
        if info.is_symlink() {
            let target = fs.readlink(&join(&[path, info.name.as_str()]))?;
            writeln!(out, "{indent}{branch}{} -> {target}", info.name)?;
        } else {
            writeln!(out, "{indent}{branch}{}{}", info.name, type_suffix(info.mode.file_type()))?;
        }
        if info.is_dir {
            let child_indent = format!("{indent}{}", if last { "    " } else { "|   " });
            tree(fs, &join(&[path, info.name.as_str()]), &child_indent, out)?;
        }
    }
    Ok(())
}

fn write_metadata(md: &Metadata, out: &mut impl Write) -> Result<()> {
    writeln!(out, "  Name: {}", md.name)?;
    writeln!(out, "  Type: {:?}", md.kind)?;
    writeln!(out, " Perms: {:04o}", md.perms)?;
    writeln!(out, " Owner: {}:{}", md.uid, md.gid)?;
    writeln!(out, "  Size: {}", md.size)?;
    if !md.linkname.is_empty() {
        writeln!(out, "  Link: {}", md.linkname)?;
    }
    if md.devmajor != 0 || md.devminor != 0 {
        writeln!(out, "Device: {},{}", md.devmajor, md.devminor)?;
    }
    Ok(())
}

fn type_suffix(kind: FileType) -> &'static str {
    match kind {
        FileType::Directory => "/",
        FileType::Symlink => "@",
        FileType::Fifo => "|",
        _ => "",
    }
}

/// `ls -l` style mode string, e.g. `drwxr-sr-x`.
pub fn mode_string(mode: Mode) -> String {
    let kind = match mode.file_type() {
        FileType::Regular => '-',
        FileType::Directory => 'd',
        FileType::Symlink => 'l',
        FileType::BlockDevice => 'b',
        FileType::CharDevice => 'c',
        FileType::Fifo => 'p',
    };
    let perms = mode.perms();
    let mut s = String::with_capacity(10);
    s.push(kind);
    for (shift, special, set, unset) in [
        (6, mode.is_setuid(), 's', 'S'),
        (3, mode.is_setgid(), 's', 'S'),
        (0, mode.is_sticky(), 't', 'T'),
    ] {
        let bits = (perms >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(match (bits & 0o1 != 0, special) {
            (true, true) => set,
            (false, true) => unset,
            (true, false) => 'x',
            (false, false) => '-',
        });
    }
    s
}
