use std::collections::HashMap;

use serde::Deserialize;

use crate::cmd::Executor;

// ── Data types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub path: String,       // /dev/sda2
    pub size: String,       // 20G
    pub fstype: String,     // ext4, empty when unformatted
    pub mountpoint: String, // empty when not mounted
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskDescriptor {
    pub path: String,  // /dev/sda
    pub size: String,  // 240G
    pub model: String, // SAMSUNG SSD 870
    pub partitions: Vec<PartitionDescriptor>,
}

impl DiskDescriptor {
    /// One-line label shown in the arrow-key selector.
    pub fn display(&self) -> String {
        let model = if self.model.is_empty() { "—" } else { &self.model };
        format!("{:<14}  {:>8}   {}", self.path, self.size, model)
    }
}

impl PartitionDescriptor {
    pub fn display(&self) -> String {
        let fstype = if self.fstype.is_empty() { "-" } else { &self.fstype };
        format!("{:<16}  {:>8}   {:<6} {}", self.path, self.size, fstype, self.mountpoint)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Returns all block devices of type `disk` visible to the system.
/// Falls back to an empty list if `lsblk` is unavailable or its output is unusable.
pub fn list_disks(exec: &mut Executor) -> Vec<DiskDescriptor> {
    match exec.capture(&[
        "lsblk",
        "-J",
        "-o",
        "NAME,TYPE,SIZE,MODEL,FSTYPE,MOUNTPOINT",
    ]) {
        Ok(json) => parse_disks(&json),
        Err(_) => vec![],
    }
}

// ── lsblk -J parser ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<RawDevice>,
}

#[derive(Deserialize)]
struct RawDevice {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<String>,
    model: Option<String>,
    fstype: Option<String>,
    mountpoint: Option<String>,
    #[serde(default)]
    children: Option<Vec<RawDevice>>,
}

/// Parses `lsblk -J` output. Anything that does not match the expected shape
/// yields an empty list rather than partial data.
pub fn parse_disks(json: &str) -> Vec<DiskDescriptor> {
    let Ok(output) = serde_json::from_str::<LsblkOutput>(json) else {
        return vec![];
    };

    output
        .blockdevices
        .into_iter()
        .filter(|dev| dev.kind == "disk")
        .map(|dev| DiskDescriptor {
            path: format!("/dev/{}", dev.name),
            size: dev.size.unwrap_or_default(),
            model: dev.model.unwrap_or_default().trim().to_string(),
            partitions: dev
                .children
                .unwrap_or_default()
                .into_iter()
                .map(|part| PartitionDescriptor {
                    path: format!("/dev/{}", part.name),
                    size: part.size.unwrap_or_default(),
                    fstype: part.fstype.unwrap_or_default(),
                    mountpoint: part.mountpoint.unwrap_or_default(),
                })
                .collect(),
        })
        .collect()
}

// ── --pairs parser ────────────────────────────────────────────────────────────
//
// Shared by lsblk and findmnt. Each line looks like:
//   SOURCE="/dev/sda2" TARGET="/mnt/gentoo" FSTYPE="ext4" UUID="0f3c..."

pub fn parse_pairs(line: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].split_whitespace().last().unwrap_or("").to_string();
        rest = &rest[eq + 1..];

        if !rest.starts_with('"') {
            break;
        }
        rest = &rest[1..]; // skip opening "

        let Some(close) = rest.find('"') else { break };
        let value = rest[..close].to_string();
        rest = &rest[close + 1..]; // skip closing "

        if !key.is_empty() {
            map.insert(key, value);
        }
    }

    map
}
