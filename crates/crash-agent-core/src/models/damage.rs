use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Ratio at which a part is reported as broken.
pub const BROKEN_DAMAGE_THRESHOLD: f64 = 0.8;

/// Clamps a host reading into `[0.0, 1.0]`; non-finite readings have no value.
#[must_use]
pub fn sanitize_ratio(raw: f64) -> Option<f64> {
    raw.is_finite().then(|| raw.clamp(0.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageSeverity {
    None,
    Minor,
    Moderate,
    Major,
    Severe,
    Destroyed,
}

impl DamageSeverity {
    #[must_use]
    pub fn classify(ratio: f64) -> Self {
        if ratio <= 0.0 {
            Self::None
        } else if ratio < 0.2 {
            Self::Minor
        } else if ratio < 0.5 {
            Self::Moderate
        } else if ratio < BROKEN_DAMAGE_THRESHOLD {
            Self::Major
        } else if ratio < 0.95 {
            Self::Severe
        } else {
            Self::Destroyed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Major => "major",
            Self::Severe => "severe",
            Self::Destroyed => "destroyed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartDamage {
    pub part_id: String,
    pub label: String,
    /// `None` when the host reported a non-finite value.
    pub damage: Option<f64>,
}

impl PartDamage {
    pub fn new(part_id: impl Into<String>, label: impl Into<String>, raw_damage: f64) -> Self {
        Self {
            part_id: part_id.into(),
            label: label.into(),
            damage: sanitize_ratio(raw_damage),
        }
    }

    pub fn is_damaged(&self) -> bool {
        self.damage.is_some_and(|ratio| ratio > 0.0)
    }

    pub fn is_broken(&self) -> bool {
        self.damage
            .is_some_and(|ratio| ratio >= BROKEN_DAMAGE_THRESHOLD)
    }

    pub fn severity(&self) -> Option<DamageSeverity> {
        self.damage.map(DamageSeverity::classify)
    }
}

/// Zone damage at or below this ratio is left out of zone summaries.
pub const ZONE_DAMAGE_THRESHOLD: f64 = 0.05;

/// Body region a part belongs to, matched on keywords in its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactZone {
    Front,
    Rear,
    SideLeft,
    SideRight,
    Roof,
    Underbody,
}

impl ImpactZone {
    pub const ALL: [Self; 6] = [
        Self::Front,
        Self::Rear,
        Self::SideLeft,
        Self::SideRight,
        Self::Roof,
        Self::Underbody,
    ];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Front => &[
                "hood",
                "bumper_f",
                "front_bumper",
                "headlight",
                "grille",
                "fender_f",
                "front_quarter",
            ],
            Self::Rear => &[
                "trunk",
                "tailgate",
                "bumper_r",
                "rear_bumper",
                "taillight",
                "rear_quarter",
            ],
            Self::SideLeft => &[
                "door_fl",
                "door_rl",
                "left_door",
                "mirror_l",
                "left_mirror",
                "left_quarter",
                "left_window",
            ],
            Self::SideRight => &[
                "door_fr",
                "door_rr",
                "right_door",
                "mirror_r",
                "right_mirror",
                "right_quarter",
                "right_window",
            ],
            Self::Roof => &["roof", "sunroof"],
            Self::Underbody => &["chassis", "exhaust", "suspension", "subframe"],
        }
    }

    /// First zone whose keyword appears in `part_id`, case-insensitively.
    pub fn of_part(part_id: &str) -> Option<Self> {
        let id = part_id.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|zone| zone.keywords().iter().any(|keyword| id.contains(keyword)))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Rear => "rear",
            Self::SideLeft => "side_left",
            Self::SideRight => "side_right",
            Self::Roof => "roof",
            Self::Underbody => "underbody",
        }
    }
}

/// Per-part damage keyed by part id. Iteration follows part-id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartDamageMap {
    parts: BTreeMap<String, PartDamage>,
}

impl PartDamageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a part, returning the row it replaced.
    pub fn insert(&mut self, part: PartDamage) -> Option<PartDamage> {
        self.parts.insert(part.part_id.clone(), part)
    }

    pub fn get(&self, part_id: &str) -> Option<&PartDamage> {
        self.parts.get(part_id)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartDamage> {
        self.parts.values()
    }

    /// Arithmetic mean over parts with a known ratio; `0.0` when there are none.
    pub fn mean_damage(&self) -> f64 {
        let (sum, count) = self
            .parts
            .values()
            .filter_map(|part| part.damage)
            .fold((0.0_f64, 0_u32), |(sum, count), ratio| {
                (sum + ratio, count.saturating_add(1))
            });
        if count == 0 {
            0.0
        } else {
            sum / f64::from(count)
        }
    }

    pub fn damaged_count(&self) -> usize {
        self.parts.values().filter(|part| part.is_damaged()).count()
    }

    pub fn broken_count(&self) -> usize {
        self.parts.values().filter(|part| part.is_broken()).count()
    }

    pub fn max_damage(&self) -> f64 {
        self.parts
            .values()
            .filter_map(|part| part.damage)
            .fold(0.0, f64::max)
    }

    /// Worst known ratio per zone, keeping zones above
    /// [`ZONE_DAMAGE_THRESHOLD`], in zone order.
    pub fn impact_zones(&self) -> Vec<(ImpactZone, f64)> {
        let mut zones = BTreeMap::<ImpactZone, f64>::new();
        for part in self.parts.values() {
            if let (Some(zone), Some(ratio)) = (ImpactZone::of_part(&part.part_id), part.damage) {
                let worst = zones.entry(zone).or_insert(0.0);
                *worst = worst.max(ratio);
            }
        }
        zones
            .into_iter()
            .filter(|(_, ratio)| *ratio > ZONE_DAMAGE_THRESHOLD)
            .collect()
    }
}

impl FromIterator<PartDamage> for PartDamageMap {
    fn from_iter<I: IntoIterator<Item = PartDamage>>(iter: I) -> Self {
        let mut map = Self::new();
        for part in iter {
            map.insert(part);
        }
        map
    }
}
