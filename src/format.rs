//! PCM format negotiation state.
//!
//! Upstream sources announce partial formats (any subset of channels, bit
//! depth, sample rate, signedness). `FormatState` merges those partials into
//! the last known full picture and reports whether anything changed, which is
//! what decides whether the engine gets reconfigured and the merged snapshot
//! gets re-announced downstream.

use serde::{Deserialize, Serialize};

/// Bit depths the scaling engine understands.
pub const VALID_BIT_DEPTHS: [u16; 4] = [8, 16, 24, 32];

/// A partial format update — any subset of the four PCM fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialFormat {
    pub channels: Option<u16>,
    pub bit_depth: Option<u16>,
    pub sample_rate: Option<u32>,
    pub signed: Option<bool>,
}

/// Snapshot of the merged format. Fields stay `None` until some upstream
/// (or the construction options) supplies them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PcmFormat {
    pub channels: Option<u16>,
    pub bit_depth: Option<u16>,
    pub sample_rate: Option<u32>,
    pub signed: Option<bool>,
}

/// Merging state machine over [`PcmFormat`].
///
/// Fields are never reset once set. `signed` is special: unless it has been
/// supplied explicitly at some point, it is re-derived from the bit depth
/// (`signed = bit_depth != 8`) on every merge that changes something.
/// An explicit `signed` is sticky — only a later explicit `signed` replaces it.
#[derive(Debug, Default)]
pub struct FormatState {
    current: PcmFormat,
    signed_explicit: bool,
}

impl FormatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a partial update. Returns `true` when any field actually changed,
    /// i.e. when the engine must be reconfigured and the snapshot re-announced.
    ///
    /// Invalid field values (zero channels, zero sample rate, an unsupported
    /// bit depth) are ignored per-field; they never fail the whole merge.
    pub fn merge(&mut self, partial: &PartialFormat) -> bool {
        let mut changed = false;

        if let Some(channels) = partial.channels {
            if channels == 0 {
                tracing::warn!("ignoring invalid channel count 0 in format update");
            } else if self.current.channels != Some(channels) {
                self.current.channels = Some(channels);
                changed = true;
            }
        }

        if let Some(bit_depth) = partial.bit_depth {
            if !VALID_BIT_DEPTHS.contains(&bit_depth) {
                tracing::warn!(bit_depth, "ignoring unsupported bit depth in format update");
            } else if self.current.bit_depth != Some(bit_depth) {
                self.current.bit_depth = Some(bit_depth);
                changed = true;
            }
        }

        if let Some(sample_rate) = partial.sample_rate {
            if sample_rate == 0 {
                tracing::warn!("ignoring invalid sample rate 0 in format update");
            } else if self.current.sample_rate != Some(sample_rate) {
                self.current.sample_rate = Some(sample_rate);
                changed = true;
            }
        }

        match partial.signed {
            Some(signed) => {
                self.signed_explicit = true;
                if self.current.signed != Some(signed) {
                    self.current.signed = Some(signed);
                    changed = true;
                }
            }
            None if changed && !self.signed_explicit => {
                // Default: 8-bit PCM is conventionally unsigned, everything
                // else signed. Recomputed only on merges that changed a field.
                if let Some(bit_depth) = self.current.bit_depth {
                    self.current.signed = Some(bit_depth != 8);
                }
            }
            None => {}
        }

        changed
    }

    /// Pure read of the merged format.
    pub fn snapshot(&self) -> PcmFormat {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sets_fields_and_reports_change() {
        let mut state = FormatState::new();
        let changed = state.merge(&PartialFormat {
            channels: Some(2),
            bit_depth: Some(16),
            ..Default::default()
        });
        assert!(changed);
        let snap = state.snapshot();
        assert_eq!(snap.channels, Some(2));
        assert_eq!(snap.bit_depth, Some(16));
        assert_eq!(snap.sample_rate, None);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut state = FormatState::new();
        let partial = PartialFormat {
            channels: Some(2),
            bit_depth: Some(16),
            sample_rate: Some(44100),
            ..Default::default()
        };
        assert!(state.merge(&partial));
        assert!(!state.merge(&partial));
    }

    #[test]
    fn empty_partial_changes_nothing() {
        let mut state = FormatState::new();
        assert!(!state.merge(&PartialFormat::default()));
        assert_eq!(state.snapshot(), PcmFormat::default());
    }

    #[test]
    fn signed_derived_from_bit_depth() {
        let mut state = FormatState::new();
        state.merge(&PartialFormat {
            bit_depth: Some(8),
            ..Default::default()
        });
        assert_eq!(state.snapshot().signed, Some(false));

        state.merge(&PartialFormat {
            bit_depth: Some(16),
            ..Default::default()
        });
        assert_eq!(state.snapshot().signed, Some(true));
    }

    #[test]
    fn explicit_signed_wins_over_derivation() {
        let mut state = FormatState::new();
        state.merge(&PartialFormat {
            bit_depth: Some(8),
            signed: Some(true),
            ..Default::default()
        });
        assert_eq!(state.snapshot().signed, Some(true));

        // A later bit-depth change must not clobber the explicit choice.
        state.merge(&PartialFormat {
            bit_depth: Some(16),
            ..Default::default()
        });
        assert_eq!(state.snapshot().signed, Some(true));

        state.merge(&PartialFormat {
            signed: Some(false),
            ..Default::default()
        });
        assert_eq!(state.snapshot().signed, Some(false));
    }

    #[test]
    fn invalid_fields_ignored_per_field() {
        let mut state = FormatState::new();
        let changed = state.merge(&PartialFormat {
            channels: Some(0),
            bit_depth: Some(12),
            sample_rate: Some(48000),
            ..Default::default()
        });
        assert!(changed);
        let snap = state.snapshot();
        assert_eq!(snap.channels, None);
        assert_eq!(snap.bit_depth, None);
        assert_eq!(snap.sample_rate, Some(48000));
    }

    #[test]
    fn partial_format_deserializes_camel_case() {
        let partial: PartialFormat =
            serde_json::from_str(r#"{"channels":2,"bitDepth":24,"sampleRate":48000}"#).unwrap();
        assert_eq!(partial.channels, Some(2));
        assert_eq!(partial.bit_depth, Some(24));
        assert_eq!(partial.sample_rate, Some(48000));
        assert_eq!(partial.signed, None);
    }
}
