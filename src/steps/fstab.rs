use std::{fmt, path::Path};

use tracing::{info, warn};

use super::Context;
use crate::{
    error::{best_effort, InstallerError},
    lsblk::parse_pairs,
    ui,
};

/// One row of `findmnt -P -o SOURCE,TARGET,FSTYPE,UUID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRow {
    pub source: String,
    pub target: String,
    pub fstype: String,
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub uuid: String,
    pub mountpoint: String,
    pub fstype: String,
    pub options: String,
    pub dump: u8,
    pub pass: u8,
}

impl fmt::Display for FstabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UUID={} {} {} {} {} {}",
            self.uuid, self.mountpoint, self.fstype, self.options, self.dump, self.pass
        )
    }
}

/// Undoes the `\xHH` escapes `findmnt -P` writes for whitespace and other
/// unsafe bytes.
pub fn decode_findmnt(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = bytes
            .get(i..i + 4)
            .filter(|chunk| chunk.starts_with(b"\\x"))
            .and_then(|chunk| std::str::from_utf8(&chunk[2..]).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escaped {
            Some(byte) => {
                out.push(byte);
                i += 4;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Octal-escapes the characters that would split an fstab field.
pub fn encode_fstab_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ' ' => out.push_str("\\040"),
            '\t' => out.push_str("\\011"),
            '\n' => out.push_str("\\012"),
            '\\' => out.push_str("\\134"),
            c => out.push(c),
        }
    }
    out
}

pub fn parse_findmnt(output: &str) -> Vec<MountRow> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut pairs = parse_pairs(line);
            let mut take = |key: &str| decode_findmnt(&pairs.remove(key).unwrap_or_default());
            MountRow {
                source: take("SOURCE"),
                target: take("TARGET"),
                fstype: take("FSTYPE"),
                uuid: take("UUID"),
            }
        })
        .collect()
}

/// Builds the fstab of the installed system.
///
/// Only mounts inside `root` with both a filesystem type and a UUID are kept;
/// their targets are rewritten relative to `root`. The root filesystem is
/// checked first (pass 1), everything else after (pass 2). The swap entry,
/// when a UUID is known, comes last.
pub fn derive_entries(rows: &[MountRow], root: &Path, swap_uuid: Option<&str>) -> Vec<FstabEntry> {
    let mut entries: Vec<FstabEntry> = rows
        .iter()
        .filter(|row| !row.fstype.is_empty() && !row.uuid.is_empty())
        .filter_map(|row| {
            let rel = Path::new(&row.target).strip_prefix(root).ok()?;
            let pass = if rel.as_os_str().is_empty() { 1 } else { 2 };
            Some(FstabEntry {
                uuid: row.uuid.clone(),
                mountpoint: encode_fstab_field(&format!("/{}", rel.display())),
                fstype: row.fstype.clone(),
                options: "defaults".to_string(),
                dump: 0,
                pass,
            })
        })
        .collect();

    if let Some(uuid) = swap_uuid.map(str::trim).filter(|u| !u.is_empty()) {
        entries.push(FstabEntry {
            uuid: uuid.to_string(),
            mountpoint: "none".to_string(),
            fstype: "swap".to_string(),
            options: "sw".to_string(),
            dump: 0,
            pass: 0,
        });
    }

    entries
}

pub fn render(entries: &[FstabEntry]) -> String {
    entries.iter().map(|e| format!("{e}\n")).collect()
}

/// Generates `<root>/etc/fstab` from what is mounted under the root right now
/// plus the configured swap partition.
pub fn generate(ctx: &mut Context) -> Result<(), InstallerError> {
    let fstab_path = ctx.target("etc/fstab");
    info!("Generating fstab at {}", fstab_path.display());

    let root = ctx.root_str();
    let rows = best_effort(
        "Reading mounts with findmnt",
        ctx.exec.capture(&[
            "findmnt",
            "-R",
            "-n",
            "-P",
            "-o",
            "SOURCE,TARGET,FSTYPE,UUID",
            &root,
        ]),
    )
    .map(|out| parse_findmnt(&out))
    .unwrap_or_default();

    let swap_uuid = match ctx.config.swap_partition.as_deref().filter(|s| !s.is_empty()) {
        Some(swap) => best_effort(
            &format!("Looking up the UUID of swap {swap}"),
            ctx.exec.capture(&["blkid", "-s", "UUID", "-o", "value", swap]),
        ),
        None => None,
    };

    let entries = derive_entries(&rows, &ctx.root, swap_uuid.as_deref());
    if entries.is_empty() {
        warn!("No fstab entries were generated");
        ui::print_warning("fstab not written: nothing mounted under the install root.");
        return Ok(());
    }

    for entry in &entries {
        info!("fstab: {entry}");
    }
    ctx.exec.write_file(&fstab_path, &render(&entries))?;
    ui::print_success(&format!("fstab written to {}.", fstab_path.display()));
    Ok(())
}
