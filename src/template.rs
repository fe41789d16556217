use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::{CatalogEntry, LayoutOptions, TemplateCatalog};
use crate::error::{ConvertError, Result};
use crate::layout::{self, HEADER_LEN, SAMPLE_WIDTH, TRAILER_LEN};

/// A contiguous byte range inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

impl Region {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.end()
    }
}

/// The four regions of a legacy file; they tile the whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regions {
    pub header: Region,
    pub head: Region,
    pub body: Region,
    pub tail: Region,
}

/// An immutable legacy file used as the skeleton of every conversion.
///
/// Templates are read-only once constructed; conversions copy the bytes into
/// their own [`OutputBuffer`](crate::grafter::OutputBuffer).
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    bytes: Vec<u8>,
    sample_rate: f64,
    channel_labels: Vec<String>,
    capacity_secs: f64,
    regions: Regions,
}

impl Template {
    /// Wraps raw template bytes, checking the framing against the declared layout.
    ///
    /// # Errors
    ///
    /// * `ConvertError::TemplateLoadFailure` - the bytes are too short, the data
    ///   area is not a whole number of frames, or the body cannot hold
    ///   `capacity_secs` of data at `sample_rate`
    pub fn from_bytes(
        name: &str,
        bytes: Vec<u8>,
        sample_rate: f64,
        channel_labels: Vec<String>,
        capacity_secs: f64,
    ) -> Result<Self> {
        if channel_labels.is_empty() {
            return Err(ConvertError::template(name, "no channel layout"));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConvertError::template(name, format!("invalid sample rate {}", sample_rate)));
        }
        if !(capacity_secs.is_finite() && capacity_secs > 0.0) {
            return Err(ConvertError::template(name, format!("invalid capacity {}", capacity_secs)));
        }

        let frame_len = channel_labels.len() * SAMPLE_WIDTH;
        if bytes.len() < HEADER_LEN + TRAILER_LEN {
            return Err(ConvertError::template(name, format!("only {} bytes", bytes.len())));
        }
        let data_len = bytes.len() - HEADER_LEN - TRAILER_LEN;
        if data_len % frame_len != 0 {
            return Err(ConvertError::template(
                name,
                format!("data payload of {} bytes is not a multiple of {}-byte frames", data_len, frame_len),
            ));
        }

        let frames = data_len / frame_len;
        let head_frames = layout::frames_for(layout::LEAD_IN_SECS, sample_rate);
        let tail_frames = layout::frames_for(layout::LEAD_OUT_SECS, sample_rate);
        let needed = (capacity_secs * sample_rate).ceil() as usize;
        let body_frames = frames.saturating_sub(head_frames + tail_frames);
        if frames < head_frames + tail_frames || body_frames < needed {
            return Err(ConvertError::template(
                name,
                format!(
                    "{} frames cannot hold {:.1} s after {} lead-in and {} lead-out frames",
                    frames, capacity_secs, head_frames, tail_frames
                ),
            ));
        }

        let header = Region { offset: 0, len: HEADER_LEN };
        let head = Region { offset: header.end(), len: head_frames * frame_len };
        let body = Region { offset: head.end(), len: body_frames * frame_len };
        let tail = Region { offset: body.end(), len: tail_frames * frame_len + TRAILER_LEN };
        debug_assert_eq!(tail.end(), bytes.len());

        Ok(Template {
            name: name.to_string(),
            bytes,
            sample_rate,
            channel_labels,
            capacity_secs,
            regions: Regions { header, head, body, tail },
        })
    }

    /// Reads a catalog entry from `dir` in full.
    pub fn load<P: AsRef<Path>>(dir: P, entry: &CatalogEntry, catalog: &TemplateCatalog) -> Result<Self> {
        let path = dir.as_ref().join(&entry.file);
        let bytes = fs::read(&path)
            .map_err(|e| ConvertError::template(&entry.file, format!("{}: {}", path.display(), e)))?;

        let template = Self::from_bytes(
            &entry.file,
            bytes,
            catalog.sample_rate,
            catalog.channel_labels.clone(),
            entry.capacity_minutes * 60.0,
        )?;
        log::info!(
            "Loaded template {} ({} bytes, {:.1} min capacity)",
            template.name,
            template.len(),
            template.capacity_secs / 60.0
        );
        Ok(template)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channel_labels(&self) -> &[String] {
        &self.channel_labels
    }

    pub fn channel_count(&self) -> usize {
        self.channel_labels.len()
    }

    pub fn frame_len(&self) -> usize {
        self.channel_count() * SAMPLE_WIDTH
    }

    pub fn capacity_secs(&self) -> f64 {
        self.capacity_secs
    }

    pub fn regions(&self) -> Regions {
        self.regions
    }

    pub fn body_frames(&self) -> usize {
        self.regions.body.len / self.frame_len()
    }

    pub fn region_bytes(&self, region: Region) -> &[u8] {
        &self.bytes[region.range()]
    }

    /// Builds a larger template from this one.
    ///
    /// The body is refilled by cycling through this template's body frames
    /// until it holds `target_minutes` of data; header, head and tail bytes
    /// are carried over unchanged. `self` is left untouched.
    ///
    /// ```rust
    /// use edf2wineeg::doctest_utils::synthetic_template;
    ///
    /// let base = synthetic_template("base.EEG", 50.0, 1.0)?;
    /// let extended = base.extend(2.5)?;
    /// assert_eq!(extended.name(), "base_EXTENDED_2.5min.EEG");
    /// assert_eq!(extended.capacity_secs(), 150.0);
    /// assert_eq!(extended.body_frames(), 7500);
    /// assert_eq!(
    ///     extended.region_bytes(extended.regions().head),
    ///     base.region_bytes(base.regions().head)
    /// );
    /// # Ok::<(), edf2wineeg::ConvertError>(())
    /// ```
    pub fn extend(&self, target_minutes: f64) -> Result<Template> {
        self.extend_with(target_minutes, &LayoutOptions::default())
    }

    /// Like [`extend`](Self::extend), also writing the new total frame count
    /// when `options` places a frame count field.
    ///
    /// # Errors
    ///
    /// * `ConvertError::InvalidDuration` - target is not finite, is below the
    ///   current capacity, or needs more frames than a u32 frame count holds
    pub fn extend_with(&self, target_minutes: f64, options: &LayoutOptions) -> Result<Template> {
        let target_secs = target_minutes * 60.0;
        if !(target_secs.is_finite() && target_secs > 0.0) {
            return Err(ConvertError::InvalidDuration(format!("cannot extend to {} minutes", target_minutes)));
        }
        if target_secs < self.capacity_secs {
            return Err(ConvertError::InvalidDuration(format!(
                "{:.1} min is below the {:.1} min capacity of {}",
                target_minutes,
                self.capacity_secs / 60.0,
                self.name
            )));
        }

        let frame_len = self.frame_len();
        let lead_frames = (self.regions.head.len + self.regions.tail.len - TRAILER_LEN) / frame_len;
        let body_frames = (target_secs * self.sample_rate).ceil();
        let too_long = || {
            ConvertError::InvalidDuration(format!("{} min needs more frames than a u32 count holds", target_minutes))
        };
        if body_frames + lead_frames as f64 > u32::MAX as f64 {
            return Err(too_long());
        }
        let body_frames = body_frames as usize;
        let total_frames = u32::try_from(body_frames + lead_frames).map_err(|_| too_long())?;
        let body_len = body_frames.checked_mul(frame_len).ok_or_else(too_long)?;

        let pattern = self.region_bytes(self.regions.body);
        let mut bytes = Vec::with_capacity(self.len() - pattern.len() + body_len);
        bytes.extend_from_slice(&self.bytes[..self.regions.body.offset]);
        bytes.extend(pattern.chunks_exact(frame_len).cycle().take(body_frames).flatten());
        bytes.extend_from_slice(self.region_bytes(self.regions.tail));

        if let Some(field) = options.frame_count_field() {
            bytes[field.range()].copy_from_slice(&layout::encode_u32(total_frames));
        }

        let name = extended_name(&self.name, target_minutes);
        log::info!("Extended {} to {} ({} min)", self.name, name, target_minutes);
        Template::from_bytes(&name, bytes, self.sample_rate, self.channel_labels.clone(), target_secs)
    }
}

// `{}` prints whole minutes without a fraction, so 30.0 stays "30min"
fn extended_name(name: &str, target_minutes: f64) -> String {
    let (stem, ext) = match name.rfind('.') {
        Some(dot) => (&name[..dot], &name[dot..]),
        None => (name, ""),
    };
    format!("{}_EXTENDED_{}min{}", stem, target_minutes, ext)
}

/// Read-only set of templates ordered by capacity.
#[derive(Debug, Clone, Default)]
pub struct TemplateRepository {
    templates: Vec<Arc<Template>>,
}

impl TemplateRepository {
    pub fn new(templates: Vec<Template>) -> Self {
        let mut templates: Vec<Arc<Template>> = templates.into_iter().map(Arc::new).collect();
        templates.sort_by(|a, b| a.capacity_secs.total_cmp(&b.capacity_secs));
        TemplateRepository { templates }
    }

    /// Loads every template named by `catalog` from `dir`.
    ///
    /// Any missing or malformed file fails the whole load.
    pub fn from_catalog<P: AsRef<Path>>(dir: P, catalog: &TemplateCatalog) -> Result<Self> {
        let templates = catalog
            .templates
            .iter()
            .map(|entry| Template::load(&dir, entry, catalog))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(templates))
    }

    pub fn templates(&self) -> &[Arc<Template>] {
        &self.templates
    }

    pub fn max_capacity_secs(&self) -> f64 {
        self.templates.last().map_or(0.0, |t| t.capacity_secs)
    }

    /// Picks the smallest template whose capacity covers `duration_secs`.
    ///
    /// # Errors
    ///
    /// * `ConvertError::InvalidDuration` - duration is not a positive number
    /// * `ConvertError::CapacityExceeded` - no template is large enough
    pub fn select(&self, duration_secs: f64) -> Result<Arc<Template>> {
        if !(duration_secs.is_finite() && duration_secs > 0.0) {
            return Err(ConvertError::InvalidDuration(format!("{} s", duration_secs)));
        }

        let template = self
            .templates
            .iter()
            .find(|t| t.capacity_secs >= duration_secs)
            .ok_or(ConvertError::CapacityExceeded {
                requested: duration_secs,
                available: self.max_capacity_secs(),
            })?;

        log::debug!(
            "Selected {} ({:.1} min) for {:.1} min of data",
            template.name,
            template.capacity_secs / 60.0,
            duration_secs / 60.0
        );
        Ok(Arc::clone(template))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctest_utils::synthetic_template;
    use crate::layout::FRAME_COUNT_FIELD;

    #[test]
    fn test_regions_tile_the_buffer() {
        let template = synthetic_template("a.EEG", 10.0, 2.0).unwrap();
        let r = template.regions();
        assert_eq!(r.header.offset, 0);
        assert_eq!(r.head.offset, r.header.end());
        assert_eq!(r.body.offset, r.head.end());
        assert_eq!(r.tail.offset, r.body.end());
        assert_eq!(r.tail.end(), template.len());
        assert_eq!(r.head.len, 50 * template.frame_len());
        assert_eq!(r.tail.len, 10 * template.frame_len() + TRAILER_LEN);
        assert_eq!(template.body_frames(), 1200);
    }

    #[test]
    fn test_rejects_partial_frames() {
        let labels: Vec<String> = layout::MONTAGE_10_20.iter().map(|s| s.to_string()).collect();
        let bytes = vec![0u8; HEADER_LEN + TRAILER_LEN + 100 * 38 + 1];
        let err = Template::from_bytes("bad.EEG", bytes, 10.0, labels, 1.0).unwrap_err();
        assert!(matches!(err, ConvertError::TemplateLoadFailure { .. }));
    }

    #[test]
    fn test_rejects_capacity_beyond_body() {
        let labels: Vec<String> = layout::MONTAGE_10_20.iter().map(|s| s.to_string()).collect();
        // 60 lead frames + 10 body frames at 10 Hz
        let bytes = vec![0u8; HEADER_LEN + TRAILER_LEN + 70 * 38];
        assert!(Template::from_bytes("small.EEG", bytes.clone(), 10.0, labels.clone(), 1.0).is_ok());
        assert!(Template::from_bytes("small.EEG", bytes, 10.0, labels, 1.5).is_err());
    }

    #[test]
    fn test_select_smallest_sufficient() {
        let repo = TemplateRepository::new(vec![
            synthetic_template("big.EEG", 10.0, 3.0).unwrap(),
            synthetic_template("small.EEG", 10.0, 1.0).unwrap(),
        ]);
        assert_eq!(repo.select(30.0).unwrap().name(), "small.EEG");
        assert_eq!(repo.select(60.0).unwrap().name(), "small.EEG");
        assert_eq!(repo.select(61.0).unwrap().name(), "big.EEG");
        match repo.select(181.0) {
            Err(ConvertError::CapacityExceeded { available, .. }) => assert_eq!(available, 180.0),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(repo.select(0.0), Err(ConvertError::InvalidDuration(_))));
        assert!(matches!(repo.select(f64::NAN), Err(ConvertError::InvalidDuration(_))));
    }

    #[test]
    fn test_extend_cycles_body_frames() {
        let base = synthetic_template("base.EEG", 10.0, 0.5).unwrap();
        let frame_len = base.frame_len();
        let extended = base.extend(1.25).unwrap();

        assert_eq!(extended.name(), "base_EXTENDED_1.25min.EEG");
        assert_eq!(extended.body_frames(), 750);
        assert_eq!(extended.region_bytes(extended.regions().tail), base.region_bytes(base.regions().tail));
        assert_eq!(extended.region_bytes(extended.regions().header), base.region_bytes(base.regions().header));

        let base_body = base.region_bytes(base.regions().body);
        let new_body = extended.region_bytes(extended.regions().body);
        let base_frames = base.body_frames();
        for (i, frame) in new_body.chunks_exact(frame_len).enumerate() {
            let j = i % base_frames;
            assert_eq!(frame, &base_body[j * frame_len..(j + 1) * frame_len]);
        }
    }

    #[test]
    fn test_extend_with_count_fields_writes_total_frames() {
        let base = synthetic_template("base.EEG", 10.0, 0.5).unwrap();
        let extended = base.extend_with(1.25, &LayoutOptions::default().with_count_fields()).unwrap();

        let header = extended.region_bytes(extended.regions().header);
        assert_eq!(layout::read_u32(header, FRAME_COUNT_FIELD), Some(750 + 60));
        for pos in 0..HEADER_LEN {
            if !FRAME_COUNT_FIELD.contains(pos) {
                assert_eq!(header[pos], base.bytes()[pos]);
            }
        }
    }

    #[test]
    fn test_extended_names_keep_fractional_minutes() {
        let base = synthetic_template("base.EEG", 10.0, 0.5).unwrap();
        assert_eq!(base.extend(30.0).unwrap().name(), "base_EXTENDED_30min.EEG");
        assert_ne!(base.extend(1.25).unwrap().name(), base.extend(1.0).unwrap().name());
        assert_eq!(extended_name("plain", 2.0), "plain_EXTENDED_2min");
    }

    #[test]
    fn test_extend_rejects_uncountable_length_before_allocating() {
        let base = synthetic_template("base.EEG", 10.0, 0.5).unwrap();
        // 6e14 frames: far past a u32 count and any reasonable allocation
        assert!(matches!(base.extend(1e12), Err(ConvertError::InvalidDuration(_))));
        assert!(matches!(base.extend(f64::INFINITY), Err(ConvertError::InvalidDuration(_))));
    }

    #[test]
    fn test_extend_rejects_shrinking() {
        let base = synthetic_template("base.EEG", 10.0, 2.0).unwrap();
        assert!(base.extend(1.0).is_err());
        assert!(base.extend(-3.0).is_err());
        assert_eq!(base.capacity_secs(), 120.0);
    }
}
