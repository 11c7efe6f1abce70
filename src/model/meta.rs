use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Label of the shot identifier meta value
pub const META_PMC: &str = "PMC";
/// Label of the detector identifier meta value
pub const META_DETECTOR_ID: &str = "DETECTOR_ID";
/// Label of the spectrum role meta value
pub const META_READTYPE: &str = "READTYPE";
/// Label of the spacecraft clock meta value
pub const META_SCLK: &str = "SCLK";
/// Label of the source file name meta value
pub const META_SOURCEFILE: &str = "SOURCEFILE";
/// eV per channel
pub const META_XPERCHAN: &str = "XPERCHAN";
/// eV start offset
pub const META_OFFSET: &str = "OFFSET";
/// Detector live time
pub const META_LIVETIME: &str = "LIVETIME";
/// Detector real time
pub const META_REALTIME: &str = "REALTIME";
/// Stage X position
pub const META_XPOSITION: &str = "XPOSITION";
/// Stage Y position
pub const META_YPOSITION: &str = "YPOSITION";
/// Stage Z position
pub const META_ZPOSITION: &str = "ZPOSITION";

/// Type tag of a [`MetaValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaType {
    /// UTF-8 string
    String,
    /// 32-bit signed integer
    Int,
    /// 32-bit float
    Float,
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetaType::String => "MT_STRING",
            MetaType::Int => "MT_INT",
            MetaType::Float => "MT_FLOAT",
        };
        f.write_str(s)
    }
}

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    /// String value
    String(String),
    /// Integer value
    Int(i32),
    /// Float value
    Float(f32),
}

impl MetaValue {
    /// Type tag of this value
    pub fn meta_type(&self) -> MetaType {
        match self {
            MetaValue::String(_) => MetaType::String,
            MetaValue::Int(_) => MetaType::Int,
            MetaValue::Float(_) => MetaType::Float,
        }
    }

    /// String content, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an int value
    pub fn as_int(&self) -> Option<i32> {
        match self {
            MetaValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric content as f32 (ints are widened)
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            MetaValue::Int(v) => Some(*v as f32),
            MetaValue::Float(v) => Some(*v),
            MetaValue::String(_) => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::String(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::String(value)
    }
}

impl From<i32> for MetaValue {
    fn from(value: i32) -> Self {
        MetaValue::Int(value)
    }
}

impl From<f32> for MetaValue {
    fn from(value: f32) -> Self {
        MetaValue::Float(value)
    }
}

/// Label → value map. Ordered, so iteration is alphabetical.
pub type MetaData = BTreeMap<String, MetaValue>;

/// Role of a spectrum within a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadType {
    /// Regular per-shot spectrum
    Normal,
    /// Longer-dwell spectrum taken at a shot that also has a normal one
    Dwell,
    /// Per-channel sum across the scan
    BulkSum,
    /// Per-channel max across the scan
    MaxValue,
}

impl ReadType {
    /// Canonical label value
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadType::Normal => "Normal",
            ReadType::Dwell => "Dwell",
            ReadType::BulkSum => "BulkSum",
            ReadType::MaxValue => "MaxValue",
        }
    }
}

impl fmt::Display for ReadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Normal" => Ok(ReadType::Normal),
            "Dwell" => Ok(ReadType::Dwell),
            "BulkSum" => Ok(ReadType::BulkSum),
            "MaxValue" => Ok(ReadType::MaxValue),
            other => Err(format!("Invalid READTYPE: {other}")),
        }
    }
}

/// One of the two PIXL detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DetectorId {
    /// Detector A
    A,
    /// Detector B
    B,
}

impl DetectorId {
    /// Canonical label value
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorId::A => "A",
            DetectorId::B => "B",
        }
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(DetectorId::A),
            "B" => Ok(DetectorId::B),
            other => Err(format!("Invalid DETECTOR_ID: {other}")),
        }
    }
}
