//! Builder for creating trackables from the various target kinds.

use crate::scene::{Trackable, TrackableConfig, TrackableOption};

/// Default physical width for square markers, in metres.
const DEFAULT_WIDTH: f32 = 0.08;

/// Fluent construction of a [`Trackable`] with pre-cached options.
///
/// Options set here are cached on the trackable and pushed to the engine
/// when it loads.
#[derive(Debug, Clone)]
pub struct TrackableBuilder {
    config: TrackableConfig,
    tag: Option<String>,
    options: Vec<TrackableOption>,
}

impl TrackableBuilder {
    fn with_config(config: TrackableConfig) -> Self {
        Self {
            config,
            tag: None,
            options: Vec::new(),
        }
    }

    /// Square marker from raw pattern buffer contents.
    pub fn pattern(data: impl Into<String>) -> Self {
        Self::with_config(TrackableConfig::SinglePattern {
            pattern: data.into(),
            width: DEFAULT_WIDTH,
        })
    }

    /// Square marker from a matrix barcode id.
    pub fn barcode(barcode_id: u32) -> Self {
        Self::with_config(TrackableConfig::SingleBarcode {
            barcode_id,
            width: DEFAULT_WIDTH,
        })
    }

    /// Rigid multimarker set from a config file.
    pub fn multimarker(config_file: impl Into<String>) -> Self {
        Self::with_config(TrackableConfig::MultiMarker {
            config_file: config_file.into(),
        })
    }

    /// NFT dataset (base path without extension).
    pub fn nft(dataset: impl Into<String>) -> Self {
        Self::with_config(TrackableConfig::Nft {
            dataset: dataset.into(),
        })
    }

    /// Planar image target.
    pub fn image(path: impl Into<String>, width: f32) -> Self {
        Self::with_config(TrackableConfig::TwoDImage {
            image: path.into(),
            width,
        })
    }

    /// Physical width in metres, for kinds that carry one.
    pub fn width(mut self, value: f32) -> Self {
        match &mut self.config {
            TrackableConfig::SinglePattern { width, .. }
            | TrackableConfig::SingleBarcode { width, .. }
            | TrackableConfig::TwoDImage { width, .. } => *width = value,
            _ => {}
        }
        self
    }

    /// Tag used by dependents to reference this trackable. Defaults to a
    /// name derived from the configuration.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn filtered(mut self, enabled: bool) -> Self {
        self.options.push(TrackableOption::Filtered(enabled));
        self
    }

    pub fn filter_sample_rate(mut self, rate: f32) -> Self {
        self.options.push(TrackableOption::FilterSampleRate(rate));
        self
    }

    pub fn filter_cutoff_freq(mut self, freq: f32) -> Self {
        self.options.push(TrackableOption::FilterCutoffFreq(freq));
        self
    }

    pub fn continuous_pose_estimation(mut self, enabled: bool) -> Self {
        self.options
            .push(TrackableOption::ContinuousPoseEstimation(enabled));
        self
    }

    pub fn nft_scale(mut self, scale: f32) -> Self {
        self.options.push(TrackableOption::NftScale(scale));
        self
    }

    /// Build the final [`Trackable`].
    pub fn build(self) -> Trackable {
        let tag = self.tag.unwrap_or_else(|| default_tag(&self.config));
        let mut trackable = Trackable::new(tag, self.config);
        for opt in self.options {
            trackable.set_option(opt);
        }
        trackable
    }
}

fn default_tag(config: &TrackableConfig) -> String {
    match config {
        TrackableConfig::SinglePattern { .. } => "pattern".into(),
        TrackableConfig::SingleBarcode { barcode_id, .. } => format!("barcode-{barcode_id}"),
        TrackableConfig::MultiMarker { config_file } => format!("multi-{config_file}"),
        TrackableConfig::Nft { dataset } => format!("nft-{dataset}"),
        TrackableConfig::TwoDImage { image, .. } => format!("2d-{image}"),
        TrackableConfig::Unknown => "unknown".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::TrackableKind;

    #[test]
    fn builder_sets_width_and_tag() {
        let t = TrackableBuilder::barcode(3).width(0.1).tag("anchor").build();
        assert_eq!(t.tag, "anchor");
        assert_eq!(t.kind(), TrackableKind::SingleBarcode);
        assert_eq!(
            t.config().engine_config_string().unwrap(),
            "single_barcode;3;100"
        );
    }

    #[test]
    fn builder_caches_options_for_load() {
        let t = TrackableBuilder::barcode(1)
            .filtered(true)
            .filter_cutoff_freq(15.0)
            .build();
        assert_eq!(t.filtered(), Some(true));
        assert_eq!(t.filter_cutoff_freq(), Some(15.0));
    }

    #[test]
    fn default_tags_are_derived_from_config() {
        assert_eq!(TrackableBuilder::barcode(7).build().tag, "barcode-7");
        assert_eq!(
            TrackableBuilder::nft("data/pinball").build().tag,
            "nft-data/pinball"
        );
    }
}
