//! Chassis loading from manifests and ZIP packages.
//!
//! A chassis manifest (`chassis.json`) lists the cards installed in each
//! backplane slot, the medium images behind SD cards and, optionally, where
//! the driver records live in RAM. Packages are ZIP files holding the
//! manifest and its images.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;

use serde::{Deserialize, Serialize};
use zip::ZipArchive;

use crate::bus::{Card, Chassis, SLOT_COUNT};
use crate::cards::{SdCard, SerialCard, StubCard};
use crate::console::{HeadlessConsole, SerialConsole};
use crate::error::{MajelError, MajelResult};
use crate::memory::{MemoryPlan, IOTBL_DEFAULT_TOP, MFS_DEFAULT_TOP};

/// Manifest file name inside a package.
pub const MANIFEST_NAME: &str = "chassis.json";

/// Card type installed in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Sd,
    Serial,
    Stub,
}

/// One slot in a chassis manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotEntry {
    pub slot: u8,
    #[serde(rename = "type")]
    pub kind: CardKind,
    /// Medium image for SD cards; absent means no medium inserted.
    #[serde(default)]
    pub image: Option<String>,
    /// Device class for stub cards.
    #[serde(default)]
    pub did: Option<u8>,
    #[serde(default)]
    pub busy_reads: Option<u8>,
}

/// RAM window tops, as hex strings ("0x0100" or "0100").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    #[serde(default)]
    pub mfs_top: Option<String>,
    #[serde(default)]
    pub iotbl_top: Option<String>,
}

/// Chassis manifest schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChassisManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slots: Vec<SlotEntry>,
    #[serde(default)]
    pub memory: Option<MemoryConfig>,
}

/// Manifest together with the medium images it names.
#[derive(Debug, Clone)]
pub struct LoadedChassis {
    pub manifest: ChassisManifest,
    pub images: HashMap<String, Vec<u8>>,
}

impl LoadedChassis {
    /// Single SD card in slot 0 holding `image`.
    pub fn from_image(name: &str, image: Vec<u8>) -> Self {
        let manifest = ChassisManifest {
            name: Some(name.to_string()),
            slots: vec![SlotEntry {
                slot: 0,
                kind: CardKind::Sd,
                image: Some(name.to_string()),
                did: None,
                busy_reads: None,
            }],
            memory: None,
        };
        let mut images = HashMap::new();
        images.insert(name.to_string(), image);
        Self { manifest, images }
    }

    /// RAM windows from the manifest, defaults where unset.
    pub fn memory_plan(&self) -> MajelResult<MemoryPlan> {
        let memory = self.manifest.memory.clone().unwrap_or_default();
        let mfs_top = match memory.mfs_top {
            Some(text) => parse_hex(&text)?,
            None => MFS_DEFAULT_TOP,
        };
        let iotbl_top = match memory.iotbl_top {
            Some(text) => parse_hex(&text)?,
            None => IOTBL_DEFAULT_TOP,
        };
        MemoryPlan::new(mfs_top, iotbl_top)
    }

    /// Build the chassis with headless consoles on serial cards.
    pub fn build(&self) -> MajelResult<Chassis> {
        self.build_with(|| Box::new(HeadlessConsole::new()))
    }

    /// Build the chassis, asking `console` for each serial card's console.
    pub fn build_with<F>(&self, mut console: F) -> MajelResult<Chassis>
    where
        F: FnMut() -> Box<dyn SerialConsole>,
    {
        let mut chassis = Chassis::new();
        for entry in &self.manifest.slots {
            if entry.slot as usize >= SLOT_COUNT {
                return Err(MajelError::Config(format!(
                    "slot {} out of range",
                    entry.slot
                )));
            }
            if chassis.card(entry.slot).is_some() {
                return Err(MajelError::Config(format!(
                    "slot {} listed twice",
                    entry.slot
                )));
            }
            let busy = entry.busy_reads.unwrap_or(0);
            let card: Box<dyn Card> = match entry.kind {
                CardKind::Sd => {
                    let card = match &entry.image {
                        Some(name) => {
                            let image = self.images.get(name).ok_or_else(|| {
                                MajelError::Config(format!("missing image {:?}", name))
                            })?;
                            SdCard::new(image.clone())
                        }
                        None => SdCard::empty(),
                    };
                    Box::new(card.with_busy_reads(busy))
                }
                CardKind::Serial => Box::new(SerialCard::new(console())),
                CardKind::Stub => {
                    let class = entry.did.ok_or_else(|| {
                        MajelError::Config(format!("stub in slot {} needs a did", entry.slot))
                    })?;
                    Box::new(StubCard::with_busy_reads(class, busy))
                }
            };
            chassis.insert(entry.slot, card);
        }
        Ok(chassis)
    }
}

/// Parse a 16-bit-space address given in hex, with or without `0x`.
pub fn parse_hex(text: &str) -> MajelResult<u32> {
    let digits = text
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u32::from_str_radix(digits, 16)
        .map_err(|_| MajelError::Config(format!("bad hex address {:?}", text)))
}

/// Parse a manifest from JSON text.
pub fn parse_manifest(text: &str) -> MajelResult<ChassisManifest> {
    Ok(serde_json::from_str(text)?)
}

/// Load a chassis package from ZIP data.
pub fn load_chassis<R: Read + Seek>(reader: R) -> MajelResult<LoadedChassis> {
    let mut archive = ZipArchive::new(reader)?;
    let mut manifest = None;
    let mut images = HashMap::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;

        // Nested paths are flattened to the file name
        let filename = name.rsplit('/').next().unwrap_or(&name).to_string();
        if filename.eq_ignore_ascii_case(MANIFEST_NAME) {
            let text = String::from_utf8(content)
                .map_err(|_| MajelError::Config(format!("{} is not UTF-8", name)))?;
            manifest = Some(parse_manifest(&text)?);
        } else {
            images.insert(filename, content);
        }
    }

    let manifest = manifest
        .ok_or_else(|| MajelError::Config(format!("package has no {}", MANIFEST_NAME)))?;
    Ok(LoadedChassis { manifest, images })
}

/// Load a chassis from a `.zip` package, a `.json` manifest (images
/// resolved next to it) or a bare medium image.
pub fn load_chassis_from_path(path: &Path) -> MajelResult<LoadedChassis> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("zip") => {
            let file = std::fs::File::open(path)?;
            load_chassis(file)
        }
        Some("json") => {
            let manifest = parse_manifest(&std::fs::read_to_string(path)?)?;
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            let mut images = HashMap::new();
            for name in manifest.slots.iter().filter_map(|s| s.image.as_ref()) {
                images.insert(name.clone(), std::fs::read(base.join(name))?);
            }
            Ok(LoadedChassis { manifest, images })
        }
        _ => {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("medium.img");
            Ok(LoadedChassis::from_image(name, std::fs::read(path)?))
        }
    }
}
