//! Tunables for the GI scene core and their on-disk form.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::constants::*;
use crate::error::{GiError, GiResult};

const MAGIC_HEADER: &[u8; 4] = b"VXGI";
const VERSION: u32 = 1;
/// Upper bound on the encoded settings payload.
const MAX_SETTINGS_BYTES: u64 = 64 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GiSettings {
    #[serde(default)]
    pub scene: SceneSettings,
    #[serde(default)]
    pub surface_cache: SurfaceCacheSettings,
    #[serde(default)]
    pub clipmap: ClipmapSettings,
}

impl Default for GiSettings {
    fn default() -> Self {
        Self {
            scene: SceneSettings::default(),
            surface_cache: SurfaceCacheSettings::default(),
            clipmap: ClipmapSettings::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SceneSettings {
    pub max_objects: u32,
    pub max_surface_caches: u32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            max_objects: MAX_OBJECTS,
            max_surface_caches: MAX_SURFACE_CACHES,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SurfaceCacheSettings {
    pub atlas_resolution: u32,
    pub min_node_size: u32,
    pub max_card_resolution: u32,
    pub default_card_resolution: u32,
    /// World-size breakpoints selecting 1x, 2x, 4x and 8x the minimum node size.
    pub resolution_thresholds: [f32; 3],
    pub resolution_checks_per_frame: usize,
    /// Recapture every entry visited by the resolution check.
    #[serde(default)]
    pub force_capture: bool,
    #[serde(default)]
    pub rotation_seed: u64,
}

impl Default for SurfaceCacheSettings {
    fn default() -> Self {
        Self {
            atlas_resolution: SURFACE_ATLAS_RESOLUTION,
            min_node_size: SURFACE_MIN_NODE_SIZE,
            max_card_resolution: SURFACE_MAX_CARD_RESOLUTION,
            default_card_resolution: SURFACE_DEFAULT_CARD_RESOLUTION,
            resolution_thresholds: SURFACE_RESOLUTION_THRESHOLDS,
            resolution_checks_per_frame: SURFACE_RESOLUTION_CHECKS_PER_FRAME,
            force_capture: false,
            rotation_seed: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum VolumeResolutionPreset {
    Low,
    Medium,
    High,
}

impl VolumeResolutionPreset {
    pub fn resolution(self) -> u32 {
        match self {
            VolumeResolutionPreset::Low => VOLUME_RESOLUTIONS[0],
            VolumeResolutionPreset::Medium => VOLUME_RESOLUTIONS[1],
            VolumeResolutionPreset::High => VOLUME_RESOLUTIONS[2],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClipmapSettings {
    pub num_levels: usize,
    pub volume_resolution: u32,
    /// Edge length of one voxel at level 0, in world units.
    pub voxel_cell_size: f32,
    pub chunks_per_axis: u32,
    pub chunk_updates_per_frame: usize,
    pub dirty_padding_cells: u32,
    pub pages_per_axis: u32,
}

impl Default for ClipmapSettings {
    fn default() -> Self {
        Self {
            num_levels: MAX_CLIP_NUM,
            volume_resolution: VolumeResolutionPreset::High.resolution(),
            voxel_cell_size: DEFAULT_VOXEL_CELL_SIZE,
            chunks_per_axis: UPDATE_CHUNK_NUM,
            chunk_updates_per_frame: CHUNK_UPDATES_PER_FRAME,
            dirty_padding_cells: DIRTY_PADDING_CELLS,
            pages_per_axis: PAGES_PER_AXIS,
        }
    }
}

impl ClipmapSettings {
    pub fn with_preset(mut self, preset: VolumeResolutionPreset) -> Self {
        self.volume_resolution = preset.resolution();
        self
    }

    pub fn with_levels(mut self, num_levels: usize) -> Self {
        self.num_levels = num_levels.clamp(1, MAX_CLIP_NUM);
        self
    }

    pub fn with_cell_size(mut self, voxel_cell_size: f32) -> Self {
        self.voxel_cell_size = voxel_cell_size;
        self
    }

    pub fn chunk_resolution(&self) -> u32 {
        self.volume_resolution / self.chunks_per_axis
    }

    pub fn page_capacity(&self) -> u32 {
        self.pages_per_axis.pow(3)
    }

    /// Settings that change the volume layout and force a full rebuild.
    pub fn layout_differs(&self, other: &ClipmapSettings) -> bool {
        self.num_levels != other.num_levels
            || self.volume_resolution != other.volume_resolution
            || self.voxel_cell_size != other.voxel_cell_size
            || self.chunks_per_axis != other.chunks_per_axis
            || self.pages_per_axis != other.pages_per_axis
    }
}

impl GiSettings {
    pub fn validate(&self) -> GiResult<()> {
        let s = &self.scene;
        if s.max_objects == 0 || s.max_surface_caches == 0 {
            return Err(GiError::invalid_settings("table capacities must be non-zero"));
        }

        let sc = &self.surface_cache;
        for (name, v) in [
            ("atlas_resolution", sc.atlas_resolution),
            ("min_node_size", sc.min_node_size),
            ("max_card_resolution", sc.max_card_resolution),
            ("default_card_resolution", sc.default_card_resolution),
        ] {
            if !v.is_power_of_two() {
                return Err(GiError::invalid_settings(format!(
                    "{} must be a power of two, got {}",
                    name, v
                )));
            }
        }
        if sc.min_node_size > sc.max_card_resolution || sc.max_card_resolution > sc.atlas_resolution
        {
            return Err(GiError::invalid_settings(
                "expected min_node_size <= max_card_resolution <= atlas_resolution",
            ));
        }
        if sc.resolution_thresholds.windows(2).any(|w| w[0] > w[1]) {
            return Err(GiError::invalid_settings(
                "resolution thresholds must be ascending",
            ));
        }
        if sc.resolution_checks_per_frame == 0 {
            return Err(GiError::invalid_settings(
                "resolution_checks_per_frame must be non-zero",
            ));
        }

        let c = &self.clipmap;
        if c.num_levels == 0 || c.num_levels > MAX_CLIP_NUM {
            return Err(GiError::invalid_settings(format!(
                "num_levels must be in 1..={}",
                MAX_CLIP_NUM
            )));
        }
        if c.chunks_per_axis == 0 || c.volume_resolution % c.chunks_per_axis != 0 {
            return Err(GiError::invalid_settings(
                "volume_resolution must be divisible by chunks_per_axis",
            ));
        }
        if c.chunk_resolution() % VOXEL_BLOCK_SIZE != 0 {
            return Err(GiError::invalid_settings(format!(
                "chunk resolution {} is not a multiple of the {}-voxel page cell",
                c.chunk_resolution(),
                VOXEL_BLOCK_SIZE
            )));
        }
        if c.voxel_cell_size.is_nan() || c.voxel_cell_size <= 0.0 {
            return Err(GiError::invalid_settings("voxel_cell_size must be positive"));
        }
        if c.chunk_updates_per_frame == 0 || c.pages_per_axis == 0 {
            return Err(GiError::invalid_settings(
                "chunk_updates_per_frame and pages_per_axis must be non-zero",
            ));
        }
        Ok(())
    }
}

pub fn save_settings<P: AsRef<Path>>(path: P, settings: &GiSettings) -> GiResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(MAGIC_HEADER)?;
    writer.write_all(&VERSION.to_le_bytes())?;

    let data = bincode::serialize(settings)?;
    writer.write_all(&(data.len() as u64).to_le_bytes())?;
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}

pub fn load_settings<P: AsRef<Path>>(path: P) -> GiResult<GiSettings> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC_HEADER {
        return Err(GiError::bad_format("missing settings header"));
    }

    let mut version_bytes = [0u8; 4];
    reader.read_exact(&mut version_bytes)?;
    let version = u32::from_le_bytes(version_bytes);
    if version != VERSION {
        return Err(GiError::bad_format(format!(
            "unsupported settings version {}",
            version
        )));
    }

    let mut size_bytes = [0u8; 8];
    reader.read_exact(&mut size_bytes)?;
    let size = u64::from_le_bytes(size_bytes);
    if size > MAX_SETTINGS_BYTES {
        return Err(GiError::bad_format(format!(
            "settings payload of {} bytes exceeds {}",
            size, MAX_SETTINGS_BYTES
        )));
    }

    let mut data = vec![0u8; size as usize];
    reader.read_exact(&mut data)?;
    let settings: GiSettings = bincode::deserialize(&data)?;
    settings.validate()?;

    tracing::info!("Loaded GI settings (version {})", version);
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(GiSettings::default().validate().is_ok());
    }

    #[test]
    fn test_presets_divide_into_page_cells() {
        for preset in [
            VolumeResolutionPreset::Low,
            VolumeResolutionPreset::Medium,
            VolumeResolutionPreset::High,
        ] {
            let mut settings = GiSettings::default();
            settings.clipmap = settings.clipmap.clone().with_preset(preset);
            assert!(settings.validate().is_ok(), "{:?}", preset);
        }
    }

    #[test]
    fn test_rejects_non_power_of_two_atlas() {
        let mut settings = GiSettings::default();
        settings.surface_cache.atlas_resolution = 2000;
        assert!(matches!(
            settings.validate(),
            Err(GiError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_rejects_misaligned_chunks() {
        let mut settings = GiSettings::default();
        settings.clipmap.volume_resolution = 80;
        // 80 / 8 = 10 voxels per chunk, not a multiple of 4
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_with_levels_clamps() {
        let c = ClipmapSettings::default().with_levels(9);
        assert_eq!(c.num_levels, MAX_CLIP_NUM);
    }

    #[test]
    fn test_builders_compose() {
        let c = ClipmapSettings::default().with_levels(2).with_cell_size(4.0);
        assert_eq!(c.num_levels, 2);
        assert_eq!(c.voxel_cell_size, 4.0);

        let mut settings = GiSettings::default();
        settings.clipmap = ClipmapSettings::default().with_cell_size(0.0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("voxgi_settings_{}.bin", std::process::id()));
        let mut settings = GiSettings::default();
        settings.clipmap.num_levels = 2;
        settings.surface_cache.force_capture = true;

        save_settings(&path, &settings).unwrap();
        let loaded = load_settings(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_rejects_foreign_file() {
        let path = std::env::temp_dir().join(format!("voxgi_foreign_{}.bin", std::process::id()));
        std::fs::write(&path, b"R3DW\x01\x00\x00\x00").unwrap();
        let result = load_settings(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(GiError::BadFormat(_))));
    }

    #[test]
    fn test_load_rejects_oversized_length() {
        let path = std::env::temp_dir().join(format!("voxgi_oversized_{}.bin", std::process::id()));
        let mut bytes = MAGIC_HEADER.to_vec();
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let result = load_settings(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(GiError::BadFormat(_))));
    }
}
