//! Conversions from `windbal_config` schema types to core types.

use crate::calibration::{CalibrationMatrixSet, MatrixPair, Orientation};
use crate::controller::AcquisitionCfg;
use crate::error::AcqError;
use crate::layout::{Category, ChannelGroup, ChannelSet};

// ── Orientation ──────────────────────────────────────────────────────────────

impl From<windbal_config::Orientation> for Orientation {
    fn from(o: windbal_config::Orientation) -> Self {
        match o {
            windbal_config::Orientation::Normal => Self::Normal,
            windbal_config::Orientation::Side => Self::Side,
        }
    }
}

// ── Channels ─────────────────────────────────────────────────────────────────

impl TryFrom<&windbal_config::ChannelsCfg> for ChannelSet {
    type Error = AcqError;

    fn try_from(c: &windbal_config::ChannelsCfg) -> Result<Self, Self::Error> {
        let mut groups = vec![
            ChannelGroup::new(Category::Pressure, c.pressure.clone()),
            ChannelGroup::new(Category::Velocity, c.velocity.clone()),
            ChannelGroup::new(Category::Temperature, c.temperature.clone()),
        ];
        groups.retain(|g| !g.channels.is_empty());
        if !c.sting.channels.is_empty() {
            groups.push(ChannelGroup::sting(
                c.sting.channels.clone(),
                c.sting.orientation.into(),
            ));
        }
        ChannelSet::new(groups)
    }
}

// ── Acquisition ──────────────────────────────────────────────────────────────

impl From<&windbal_config::AcquisitionCfg> for AcquisitionCfg {
    fn from(c: &windbal_config::AcquisitionCfg) -> Self {
        Self {
            interval_ms: c.interval_ms,
            event_capacity: c.event_capacity,
        }
    }
}

// ── Calibration ──────────────────────────────────────────────────────────────

impl From<&windbal_config::MatrixPairCfg> for MatrixPair {
    fn from(c: &windbal_config::MatrixPairCfg) -> Self {
        Self {
            cinv: c.cinv,
            cinv_c2: c.cinv_c2,
        }
    }
}

impl From<&windbal_config::CalibrationCfg> for CalibrationMatrixSet {
    fn from(c: &windbal_config::CalibrationCfg) -> Self {
        Self::with_overrides(
            c.normal.as_ref().map(MatrixPair::from),
            c.side.as_ref().map(MatrixPair::from),
        )
    }
}
