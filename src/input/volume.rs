//! Dense scalar volumes and boolean masks over a fixed voxel grid.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A scalar volume stored in x-fastest order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// Grid dimensions.
    pub dims: [usize; 3],
    /// Voxel values, `dims[0] * dims[1] * dims[2]` of them.
    pub data: Vec<f32>,
}

impl Volume {
    /// Build a volume, checking the value count against the grid.
    pub fn new(dims: [usize; 3], data: Vec<f32>) -> Result<Self> {
        let expected = dims.iter().product::<usize>();
        if data.len() != expected {
            return Err(Error::InsufficientData(format!(
                "volume of dims {:?} needs {} values, got {}",
                dims,
                expected,
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Number of voxels in the grid.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty grid.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Boolean analysis mask; only `true` voxels are tested.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    dims: [usize; 3],
    data: Vec<bool>,
}

impl Mask {
    /// Build a mask, checking the value count against the grid.
    pub fn new(dims: [usize; 3], data: Vec<bool>) -> Result<Self> {
        let expected = dims.iter().product::<usize>();
        if data.len() != expected {
            return Err(Error::InsufficientData(format!(
                "mask of dims {:?} needs {} values, got {}",
                dims,
                expected,
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Mask selecting every voxel of the grid.
    pub fn full(dims: [usize; 3]) -> Self {
        Self {
            dims,
            data: vec![true; dims.iter().product()],
        }
    }

    /// Nonzero voxels of a volume become `true`.
    pub fn from_volume(volume: &Volume) -> Self {
        Self {
            dims: volume.dims,
            data: volume.data.iter().map(|&v| v != 0.0).collect(),
        }
    }

    /// Grid dimensions.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Number of grid voxels (masked or not).
    pub fn grid_len(&self) -> usize {
        self.data.len()
    }

    /// Number of selected voxels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&m| m).count()
    }

    /// Flat grid indices of the selected voxels, ascending.
    pub fn indices(&self) -> Vec<usize> {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect()
    }

    /// Scatter per-masked-voxel values back onto the full grid (zeros elsewhere).
    pub fn unmask(&self, values: &[f64]) -> Volume {
        let mut data = vec![0.0f32; self.data.len()];
        for (slot, &v) in self.indices().iter().zip(values) {
            data[*slot] = v as f32;
        }
        Volume {
            dims: self.dims,
            data,
        }
    }
}

/// Source of scalar volumes.
pub trait VolumeReader {
    /// Load the volume stored at `path`.
    fn read(&self, path: &Path) -> Result<Volume>;
}

/// Reads and writes volumes as `{"dims":[x,y,z],"data":[...]}` JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonVolumeReader;

impl JsonVolumeReader {
    /// Write a volume in the format this reader accepts.
    pub fn write(path: &Path, volume: &Volume) -> Result<()> {
        let json = serde_json::to_string(volume)?;
        fs::write(path, json).map_err(|e| Error::io(path, e))
    }
}

impl VolumeReader for JsonVolumeReader {
    fn read(&self, path: &Path) -> Result<Volume> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let raw: Volume = serde_json::from_str(&text)?;
        Volume::new(raw.dims, raw.data)
    }
}
