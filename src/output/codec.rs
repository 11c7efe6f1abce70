//! Binary encoding of [`ScanArtifact`] (`dataset.bin`).
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! "PIXLSCAN"          8-byte magic
//! u16                 format version
//! header strings      scan id, group, instrument, detector config, title, ...
//! meta dictionary     u32 count, then (string label, u8 type) pairs
//! locations           u32 count, then one record per shot
//! images              aligned, unaligned, matched
//! pseudo ranges       u32 count, then (name, i32 start, i32 end)
//! counts              5 x u32
//! ```
//!
//! Strings are u32-length-prefixed UTF-8, sequences u32-count-prefixed and
//! options a u8 tag (0 = none) followed by the value. Encoding walks the
//! artifact in field order, so equal artifacts always produce equal bytes.

use std::io::{Cursor, Read};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use crate::model::{MetaType, MetaValue, PseudoIntensityRange, SpectrumCounts};

use super::artifact::{
    ContextImageCoordinateInfo, Coordinate2D, DetectorSpectrum, Location, LocationBeam,
    MatchedContextImageInfo, MetaItem, PseudoIntensityData, ScanArtifact,
};
use super::CodecError;

/// File magic
pub const MAGIC: &[u8; 8] = b"PIXLSCAN";

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

const TAG_STRING: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;

/// Encode an artifact
pub fn encode(artifact: &ScanArtifact) -> Vec<u8> {
    let mut enc = Encoder::default();
    enc.buf.extend_from_slice(MAGIC);
    enc.u16(FORMAT_VERSION);

    for s in [
        &artifact.scan_id,
        &artifact.group,
        &artifact.instrument,
        &artifact.detector_config,
        &artifact.title,
        &artifact.target_id,
        &artifact.target,
    ] {
        enc.str(s);
    }
    enc.i32(artifact.site_id);
    enc.str(&artifact.site);
    enc.i32(artifact.drive_id);
    enc.str(&artifact.sol);
    enc.value(&artifact.rtt);
    enc.i32(artifact.sclk);
    enc.str(&artifact.bulk_sum_quant_file);
    enc.str(&artifact.default_context_image);

    enc.len(artifact.meta_labels.len());
    for (label, ty) in artifact.meta_labels.iter().zip(&artifact.meta_types) {
        enc.str(label);
        enc.u8(type_tag(*ty));
    }

    enc.len(artifact.locations.len());
    for location in &artifact.locations {
        enc.location(location);
    }

    enc.len(artifact.aligned_context_images.len());
    for img in &artifact.aligned_context_images {
        enc.str(&img.image);
        enc.i32(img.pmc);
        enc.u8(u8::from(img.trapezoid_corrected));
    }
    enc.len(artifact.unaligned_context_images.len());
    for img in &artifact.unaligned_context_images {
        enc.str(img);
    }
    enc.len(artifact.matched_aligned_context_images.len());
    for img in &artifact.matched_aligned_context_images {
        enc.str(&img.image);
        enc.u32(img.aligned_index);
        for v in [img.x_offset, img.y_offset, img.x_scale, img.y_scale] {
            enc.f32(v);
        }
    }

    enc.len(artifact.pseudo_intensity_ranges.len());
    for range in &artifact.pseudo_intensity_ranges {
        enc.str(&range.name);
        enc.i32(range.start);
        enc.i32(range.end);
    }

    let c = &artifact.counts;
    for v in [c.normal, c.dwell, c.bulk, c.max, c.pseudo_intensities] {
        enc.u32(v);
    }

    enc.buf
}

/// Decode an artifact
pub fn decode(bytes: &[u8]) -> Result<ScanArtifact, CodecError> {
    let mut dec = Decoder {
        cursor: Cursor::new(bytes),
    };

    let mut magic = [0u8; 8];
    dec.cursor.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = dec.cursor.read_u16::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let scan_id = dec.str()?;
    let group = dec.str()?;
    let instrument = dec.str()?;
    let detector_config = dec.str()?;
    let title = dec.str()?;
    let target_id = dec.str()?;
    let target = dec.str()?;
    let site_id = dec.i32()?;
    let site = dec.str()?;
    let drive_id = dec.i32()?;
    let sol = dec.str()?;
    let rtt = dec.value()?;
    let sclk = dec.i32()?;
    let bulk_sum_quant_file = dec.str()?;
    let default_context_image = dec.str()?;

    let label_count = dec.len()?;
    let mut meta_labels = Vec::with_capacity(label_count);
    let mut meta_types = Vec::with_capacity(label_count);
    for _ in 0..label_count {
        meta_labels.push(dec.str()?);
        meta_types.push(tag_type(dec.u8()?)?);
    }

    let locations = dec.seq(Decoder::location)?;

    let aligned_context_images = dec.seq(|d| {
        Ok(ContextImageCoordinateInfo {
            image: d.str()?,
            pmc: d.i32()?,
            trapezoid_corrected: d.u8()? != 0,
        })
    })?;
    let unaligned_context_images = dec.seq(Decoder::str)?;
    let matched_aligned_context_images = dec.seq(|d| {
        Ok(MatchedContextImageInfo {
            image: d.str()?,
            aligned_index: d.u32()?,
            x_offset: d.f32()?,
            y_offset: d.f32()?,
            x_scale: d.f32()?,
            y_scale: d.f32()?,
        })
    })?;

    let pseudo_intensity_ranges = dec.seq(|d| {
        Ok(PseudoIntensityRange {
            name: d.str()?,
            start: d.i32()?,
            end: d.i32()?,
        })
    })?;

    let counts = SpectrumCounts {
        normal: dec.u32()?,
        dwell: dec.u32()?,
        bulk: dec.u32()?,
        max: dec.u32()?,
        pseudo_intensities: dec.u32()?,
    };

    let trailing = bytes.len() as u64 - dec.cursor.position();
    if trailing > 0 {
        return Err(CodecError::TrailingBytes(trailing));
    }

    Ok(ScanArtifact {
        scan_id,
        group,
        instrument,
        detector_config,
        title,
        target_id,
        target,
        site_id,
        site,
        drive_id,
        sol,
        rtt,
        sclk,
        bulk_sum_quant_file,
        default_context_image,
        meta_labels,
        meta_types,
        locations,
        aligned_context_images,
        unaligned_context_images,
        matched_aligned_context_images,
        pseudo_intensity_ranges,
        counts,
    })
}

fn type_tag(ty: MetaType) -> u8 {
    match ty {
        MetaType::String => TAG_STRING,
        MetaType::Int => TAG_INT,
        MetaType::Float => TAG_FLOAT,
    }
}

fn tag_type(tag: u8) -> Result<MetaType, CodecError> {
    match tag {
        TAG_STRING => Ok(MetaType::String),
        TAG_INT => Ok(MetaType::Int),
        TAG_FLOAT => Ok(MetaType::Float),
        other => Err(CodecError::InvalidTag(other)),
    }
}

#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn i32(&mut self, v: i32) {
        let mut b = [0u8; 4];
        LittleEndian::write_i32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn i64(&mut self, v: i64) {
        let mut b = [0u8; 8];
        LittleEndian::write_i64(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn f32(&mut self, v: f32) {
        let mut b = [0u8; 4];
        LittleEndian::write_f32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn len(&mut self, n: usize) {
        self.u32(n as u32);
    }

    fn str(&mut self, s: &str) {
        self.len(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn value(&mut self, v: &MetaValue) {
        match v {
            MetaValue::String(s) => {
                self.u8(TAG_STRING);
                self.str(s);
            }
            MetaValue::Int(i) => {
                self.u8(TAG_INT);
                self.i32(*i);
            }
            MetaValue::Float(f) => {
                self.u8(TAG_FLOAT);
                self.f32(*f);
            }
        }
    }

    fn meta(&mut self, items: &[MetaItem]) {
        self.len(items.len());
        for item in items {
            self.u32(item.label_idx);
            self.value(&item.value);
        }
    }

    fn location(&mut self, loc: &Location) {
        self.i32(loc.pmc);
        self.str(&loc.context_image);

        match &loc.beam {
            None => self.u8(0),
            Some(beam) => {
                self.u8(1);
                for v in [beam.x, beam.y, beam.z] {
                    self.f32(v);
                }
                match beam.geom_corr {
                    None => self.u8(0),
                    Some(g) => {
                        self.u8(1);
                        self.f32(g);
                    }
                }
                self.f32(beam.image_i);
                self.f32(beam.image_j);
                self.len(beam.context_locations.len());
                for c in &beam.context_locations {
                    self.f32(c.i);
                    self.f32(c.j);
                }
            }
        }

        self.len(loc.detectors.len());
        for det in &loc.detectors {
            self.meta(&det.meta);
            self.i64(det.spectrum_max);
            self.len(det.spectrum.len());
            for v in &det.spectrum {
                self.i64(*v);
            }
        }

        self.len(loc.pseudo_intensities.len());
        for ps in &loc.pseudo_intensities {
            self.str(&ps.detector_id);
            self.len(ps.element_intensities.len());
            for v in &ps.element_intensities {
                self.f32(*v);
            }
        }

        self.meta(&loc.meta);
    }
}

struct Decoder<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl Decoder<'_> {
    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.cursor.read_u8()?)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(self.cursor.read_u32::<LittleEndian>()?)
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(self.cursor.read_i32::<LittleEndian>()?)
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(self.cursor.read_i64::<LittleEndian>()?)
    }

    fn f32(&mut self) -> Result<f32, CodecError> {
        Ok(self.cursor.read_f32::<LittleEndian>()?)
    }

    fn len(&mut self) -> Result<usize, CodecError> {
        let n = self.u32()? as usize;
        let remaining = self.cursor.get_ref().len() as u64 - self.cursor.position();
        // Every element takes at least one byte
        if n as u64 > remaining {
            return Err(CodecError::InvalidLength(n));
        }
        Ok(n)
    }

    fn str(&mut self) -> Result<String, CodecError> {
        let n = self.len()?;
        let mut bytes = vec![0u8; n];
        self.cursor.read_exact(&mut bytes)?;
        Ok(String::from_utf8(bytes)?)
    }

    fn value(&mut self) -> Result<MetaValue, CodecError> {
        Ok(match tag_type(self.u8()?)? {
            MetaType::String => MetaValue::String(self.str()?),
            MetaType::Int => MetaValue::Int(self.i32()?),
            MetaType::Float => MetaValue::Float(self.f32()?),
        })
    }

    fn seq<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, CodecError>,
    ) -> Result<Vec<T>, CodecError> {
        let n = self.len()?;
        let mut result = Vec::with_capacity(n);
        for _ in 0..n {
            result.push(item(self)?);
        }
        Ok(result)
    }

    fn meta(&mut self) -> Result<Vec<MetaItem>, CodecError> {
        self.seq(|d| {
            Ok(MetaItem {
                label_idx: d.u32()?,
                value: d.value()?,
            })
        })
    }

    fn option(&mut self) -> Result<bool, CodecError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidTag(other)),
        }
    }

    fn location(&mut self) -> Result<Location, CodecError> {
        let pmc = self.i32()?;
        let context_image = self.str()?;

        let beam = if self.option()? {
            let x = self.f32()?;
            let y = self.f32()?;
            let z = self.f32()?;
            let geom_corr = if self.option()? { Some(self.f32()?) } else { None };
            let image_i = self.f32()?;
            let image_j = self.f32()?;
            let context_locations = self.seq(|d| {
                Ok(Coordinate2D {
                    i: d.f32()?,
                    j: d.f32()?,
                })
            })?;
            Some(LocationBeam {
                x,
                y,
                z,
                geom_corr,
                image_i,
                image_j,
                context_locations,
            })
        } else {
            None
        };

        let detectors = self.seq(|d| {
            Ok(DetectorSpectrum {
                meta: d.meta()?,
                spectrum_max: d.i64()?,
                spectrum: d.seq(Decoder::i64)?,
            })
        })?;

        let pseudo_intensities = self.seq(|d| {
            Ok(PseudoIntensityData {
                detector_id: d.str()?,
                element_intensities: d.seq(Decoder::f32)?,
            })
        })?;

        let meta = self.meta()?;

        Ok(Location {
            pmc,
            context_image,
            beam,
            detectors,
            pseudo_intensities,
            meta,
        })
    }
}
