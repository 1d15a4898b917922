//! The segmentation planner.
//!
//! Walks the source timeline window by window. Each window prefers a cut
//! on detected silence from the first tier with a candidate inside the
//! window; otherwise the cut lands exactly at the duration bound. A final
//! pass merges a too-short trailing remainder and re-splits anything that
//! still exceeds the bound.

use std::path::Path;

use tracing::{debug, info, warn};

use durascribe_audio::AudioToolkit;

use crate::{AudioSegment, Result, SegmentPlan, SegmentationStats, SegmenterConfig};

/// Tolerance for floating-point boundary comparisons, in seconds.
const EPS: f64 = 1e-9;

/// Plans bounded-duration segments over a source file
pub struct SilenceAwareSegmenter {
    config: SegmenterConfig,
}

impl SilenceAwareSegmenter {
    /// Create a segmenter, validating the configuration
    pub fn new(config: SegmenterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Segmenter configuration in effect
    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Plan segments covering `[0, duration_s)` of `source`
    ///
    /// Detection failures are absorbed: a tier that errors contributes no
    /// candidates and the walk falls through to the next tier or a hard
    /// cut. Zero or invalid duration yields an empty plan.
    pub fn plan(&self, toolkit: &dyn AudioToolkit, source: &Path, duration_s: f64) -> SegmentPlan {
        let tier_count = self.config.tiers.len();
        let mut stats = SegmentationStats {
            tier_hits: vec![0; tier_count],
            ..SegmentationStats::default()
        };

        if !duration_s.is_finite() || duration_s <= 0.0 {
            debug!("nothing to segment: duration {duration_s}");
            return SegmentPlan {
                segments: Vec::new(),
                stats,
            };
        }

        let max = self.config.max_segment_s;
        let mut tier_cache: Vec<Option<Vec<f64>>> = vec![None; tier_count];

        // Raw cut walk: (start, end) pairs, each span at most `max` long.
        let mut raw: Vec<(f64, f64)> = Vec::new();
        let mut current = 0.0;
        while duration_s - current > max + EPS {
            let window_end = current + max;
            let mut cut = None;
            for idx in 0..tier_count {
                let positions = tier_positions(
                    &mut tier_cache,
                    toolkit,
                    source,
                    &self.config,
                    idx,
                );
                // Sorted ascending, so the last in-window candidate is the
                // latest usable cut - the longest segment the bound allows.
                let in_window = positions
                    .iter()
                    .copied()
                    .filter(|p| *p > current + EPS && *p <= window_end + EPS)
                    .last();
                if let Some(position) = in_window {
                    stats.tier_hits[idx] += 1;
                    cut = Some(position.min(window_end));
                    break;
                }
            }
            let cut_at = match cut {
                Some(position) => position,
                None => {
                    stats.forced_cuts += 1;
                    debug!(
                        "no silence in ({current:.2}, {window_end:.2}], forcing cut at {window_end:.2}"
                    );
                    window_end
                }
            };
            raw.push((current, cut_at));
            current = cut_at;
        }
        if duration_s - current > EPS {
            raw.push((current, duration_s));
        }

        // Aggregate-not-discard: fold a short trailing remainder into its
        // predecessor. The first segment of a file may stand alone.
        let n = raw.len();
        if n >= 2 && (raw[n - 1].1 - raw[n - 1].0) < self.config.min_tail_s {
            let tail_end = raw[n - 1].1;
            raw[n - 2].1 = tail_end;
            raw.pop();
            stats.merged_tails += 1;
        }

        // Fallback splitter: the duration bound always wins.
        let mut segments: Vec<AudioSegment> = Vec::new();
        for (start, end) in raw {
            let span = end - start;
            if span > max + EPS {
                stats.oversized_splits += 1;
                let parts = (span / max).ceil() as usize;
                let part = span / parts as f64;
                debug!("re-splitting oversized span {span:.2}s into {parts} parts");
                for k in 0..parts {
                    let part_start = start + k as f64 * part;
                    let part_end = if k == parts - 1 {
                        end
                    } else {
                        part_start + part
                    };
                    segments.push(AudioSegment {
                        source_path: source.to_path_buf(),
                        start_offset: part_start,
                        duration: part_end - part_start,
                        sequence_index: segments.len(),
                    });
                }
            } else {
                segments.push(AudioSegment {
                    source_path: source.to_path_buf(),
                    start_offset: start,
                    duration: span,
                    sequence_index: segments.len(),
                });
            }
        }

        stats.segment_count = segments.len();
        stats.total_duration = segments.iter().map(|s| s.duration).sum();
        stats.max_duration = segments.iter().map(|s| s.duration).fold(0.0, f64::max);
        stats.average_duration = if segments.is_empty() {
            0.0
        } else {
            stats.total_duration / segments.len() as f64
        };

        info!(
            "planned {} segments over {:.1}s (avg {:.1}s, max {:.1}s, {} forced cuts, {} re-splits)",
            stats.segment_count,
            duration_s,
            stats.average_duration,
            stats.max_duration,
            stats.forced_cuts,
            stats.oversized_splits
        );
        SegmentPlan { segments, stats }
    }
}

/// Detect-once-per-tier cache. A failed pass logs and caches an empty
/// candidate list so the tier is not retried for every window.
fn tier_positions<'a>(
    cache: &'a mut [Option<Vec<f64>>],
    toolkit: &dyn AudioToolkit,
    source: &Path,
    config: &SegmenterConfig,
    idx: usize,
) -> &'a [f64] {
    if cache[idx].is_none() {
        let tier = &config.tiers[idx];
        let positions = match toolkit.detect_silences(source, tier.threshold_db, tier.min_silence_s)
        {
            Ok(spans) => {
                let mut positions: Vec<f64> = spans
                    .iter()
                    .map(|span| span.start)
                    .filter(|p| p.is_finite() && *p >= 0.0)
                    .collect();
                positions.sort_by(f64::total_cmp);
                positions
            }
            Err(e) => {
                warn!(
                    "silence detection tier {} ({}dB/{}s) failed, treating as no candidates: {e}",
                    idx, tier.threshold_db, tier.min_silence_s
                );
                Vec::new()
            }
        };
        cache[idx] = Some(positions);
    }
    cache[idx].as_deref().unwrap_or(&[])
}
