//! Channel groups and the positional layout of a scan.
//!
//! A scan returns one record per channel in a fixed category order:
//! pressure, velocity, temperature, sting. `ScanLayout` keeps the
//! `(category, count)` pairs for the active configuration so a flat decoded
//! scan can be cut back into per-category readings without recomputing
//! anything per sample.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use crate::calibration::Orientation;
use crate::error::AcqError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Pressure,
    Velocity,
    Temperature,
    Sting,
}

impl Category {
    /// Scan order.
    pub const ALL: [Category; 4] = [
        Category::Pressure,
        Category::Velocity,
        Category::Temperature,
        Category::Sting,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Pressure => "pressure",
            Self::Velocity => "velocity",
            Self::Temperature => "temperature",
            Self::Sting => "sting",
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Channels measuring one physical quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    pub category: Category,
    pub channels: Vec<u16>,
    /// Only meaningful for `Sting`.
    pub orientation: Option<Orientation>,
}

impl ChannelGroup {
    pub fn new(category: Category, channels: impl Into<Vec<u16>>) -> Self {
        Self {
            category,
            channels: channels.into(),
            orientation: None,
        }
    }

    pub fn sting(channels: impl Into<Vec<u16>>, orientation: Orientation) -> Self {
        Self {
            category: Category::Sting,
            channels: channels.into(),
            orientation: Some(orientation),
        }
    }
}

/// Validated channel configuration handed to the controller.
///
/// Every channel id appears at most once across all groups and each category
/// at most once. Groups are kept in scan order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelSet {
    groups: Vec<ChannelGroup>,
}

impl ChannelSet {
    pub fn new(mut groups: Vec<ChannelGroup>) -> Result<Self, AcqError> {
        groups.sort_by_key(|g| g.category);
        let mut owner: HashMap<u16, Category> = HashMap::new();
        for (i, g) in groups.iter().enumerate() {
            if i > 0 && groups[i - 1].category == g.category {
                return Err(AcqError::Config(format!(
                    "category {} configured twice",
                    g.category
                )));
            }
            if g.orientation.is_some() && g.category != Category::Sting {
                return Err(AcqError::Config(format!(
                    "orientation only applies to sting, not {}",
                    g.category
                )));
            }
            for &ch in &g.channels {
                if let Some(prev) = owner.insert(ch, g.category) {
                    return Err(AcqError::Config(format!(
                        "channel {ch} appears in both {prev} and {}",
                        g.category
                    )));
                }
            }
        }
        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[ChannelGroup] {
        &self.groups
    }

    /// Active sting orientation; `Normal` when not specified.
    pub fn orientation(&self) -> Orientation {
        self.groups
            .iter()
            .find(|g| g.category == Category::Sting)
            .and_then(|g| g.orientation)
            .unwrap_or_default()
    }

    /// All channel ids in scan order.
    pub fn channels(&self) -> Vec<u16> {
        self.groups
            .iter()
            .flat_map(|g| g.channels.iter().copied())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.groups.iter().map(|g| g.channels.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn layout(&self) -> ScanLayout {
        ScanLayout::resolve(&self.groups)
    }
}

/// Positional mapping between flat scan slots and category groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLayout {
    counts: [(Category, usize); 4],
    channels: Vec<u16>,
}

impl Default for ScanLayout {
    fn default() -> Self {
        Self::resolve(&[])
    }
}

impl ScanLayout {
    /// Concatenate `groups` in fixed category order. Categories with no
    /// group get a count of zero.
    pub fn resolve(groups: &[ChannelGroup]) -> Self {
        let mut counts = Category::ALL.map(|c| (c, 0usize));
        let mut channels = Vec::new();
        for cat in Category::ALL {
            for g in groups.iter().filter(|g| g.category == cat) {
                counts[cat.index()].1 += g.channels.len();
                channels.extend_from_slice(&g.channels);
            }
        }
        Self { counts, channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channel ids in scan order.
    pub fn channels(&self) -> &[u16] {
        &self.channels
    }

    /// `(category, count)` pairs in scan order.
    pub fn counts(&self) -> &[(Category, usize)] {
        &self.counts
    }

    pub fn count(&self, cat: Category) -> usize {
        self.counts[cat.index()].1
    }

    /// Flat slot range occupied by `cat`.
    pub fn range(&self, cat: Category) -> Range<usize> {
        let start: usize = self.counts[..cat.index()].iter().map(|(_, n)| n).sum();
        start..start + self.count(cat)
    }

    /// Map a flat slot to `(category, index within group)`.
    pub fn locate(&self, slot: usize) -> Option<(Category, usize)> {
        let mut start = 0;
        for &(cat, n) in &self.counts {
            if slot < start + n {
                return Some((cat, slot - start));
            }
            start += n;
        }
        None
    }

    /// Cut flat decoded arrays into per-category readings.
    pub fn split(&self, values: &[f64], timestamps: &[f64]) -> Result<GroupedReadings, AcqError> {
        for found in [values.len(), timestamps.len()] {
            if found != self.len() {
                return Err(AcqError::LayoutMismatch {
                    expected: self.len(),
                    found,
                });
            }
        }
        let groups = Category::ALL.map(|cat| {
            let r = self.range(cat);
            GroupReadings {
                category: cat,
                values: values[r.clone()].to_vec(),
                timestamps: timestamps[r].to_vec(),
            }
        });
        Ok(GroupedReadings { groups })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupReadings {
    pub category: Category,
    pub values: Vec<f64>,
    pub timestamps: Vec<f64>,
}

/// One scan's readings, grouped by category in scan order.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedReadings {
    groups: [GroupReadings; 4],
}

impl GroupedReadings {
    pub fn get(&self, cat: Category) -> &GroupReadings {
        &self.groups[cat.index()]
    }

    pub fn values(&self, cat: Category) -> &[f64] {
        &self.get(cat).values
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupReadings> {
        self.groups.iter()
    }

    /// Concatenate back into flat `(values, timestamps)` in scan order.
    pub fn flatten(&self) -> (Vec<f64>, Vec<f64>) {
        let values = self.groups.iter().flat_map(|g| g.values.iter().copied());
        let timestamps = self
            .groups
            .iter()
            .flat_map(|g| g.timestamps.iter().copied());
        (values.collect(), timestamps.collect())
    }

    /// `(category, channel count)` in scan order.
    pub fn counts(&self) -> [(Category, usize); 4] {
        self.groups.each_ref().map(|g| (g.category, g.values.len()))
    }

    /// The sting voltages when exactly three are present.
    pub fn sting_triplet(&self) -> Option<[f64; 3]> {
        <[f64; 3]>::try_from(self.values(Category::Sting)).ok()
    }
}
