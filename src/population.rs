use serde::{Deserialize, Serialize};

use crate::grid::{CellType, Position, MAX_HEALTH};
use crate::world::PopulationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopulationKind {
    Humans,
    Wildlife,
    Fish,
    Pests,
    Trees,
}

impl PopulationKind {
    pub const ALL: [PopulationKind; 5] = [
        PopulationKind::Humans,
        PopulationKind::Wildlife,
        PopulationKind::Fish,
        PopulationKind::Pests,
        PopulationKind::Trees,
    ];

    pub fn label(self) -> &'static str {
        profile(self).label
    }

    pub fn priority(self) -> Priority {
        profile(self).priority
    }

    pub fn max_density(self) -> u64 {
        profile(self).max_density
    }
}

/// Resource distribution order; lower values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Highest = 1,
    High = 2,
    Medium = 3,
    Low = 4,
    Lowest = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    pub fn period_days(self) -> u64 {
        match self {
            Cadence::Daily => 1,
            Cadence::Weekly => 7,
            Cadence::Monthly => 30,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KindProfile {
    pub kind: PopulationKind,
    pub label: &'static str,
    pub priority: Priority,
    pub max_density: u64,
    pub cadences: &'static [Cadence],
    /// Cell type initial populations are seeded on.
    pub home: CellType,
    /// Cell types the kind can spread or colonize into.
    pub habitats: &'static [CellType],
}

const PROFILES: &[KindProfile] = &[
    KindProfile {
        kind: PopulationKind::Humans,
        label: "humans",
        priority: Priority::Highest,
        max_density: 1_000,
        cadences: &[Cadence::Daily, Cadence::Weekly],
        home: CellType::City,
        habitats: &[CellType::City],
    },
    KindProfile {
        kind: PopulationKind::Wildlife,
        label: "wildlife",
        priority: Priority::High,
        max_density: 400,
        cadences: &[Cadence::Daily, Cadence::Monthly],
        home: CellType::Forest,
        habitats: &[CellType::Forest, CellType::Land],
    },
    KindProfile {
        kind: PopulationKind::Fish,
        label: "fish",
        priority: Priority::High,
        max_density: 800,
        cadences: &[Cadence::Daily],
        home: CellType::Lake,
        habitats: &[CellType::Lake],
    },
    KindProfile {
        kind: PopulationKind::Pests,
        label: "pests",
        priority: Priority::Low,
        max_density: 300,
        cadences: &[Cadence::Daily],
        home: CellType::Land,
        habitats: &[CellType::Land, CellType::Forest, CellType::City],
    },
    KindProfile {
        kind: PopulationKind::Trees,
        label: "trees",
        priority: Priority::Medium,
        max_density: 500,
        cadences: &[Cadence::Daily, Cadence::Monthly],
        home: CellType::Forest,
        habitats: &[CellType::Forest],
    },
];

pub fn profile(kind: PopulationKind) -> &'static KindProfile {
    PROFILES
        .iter()
        .find(|profile| profile.kind == kind)
        .unwrap_or(&PROFILES[0])
}

/// What the resource distribution phase granted a population this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub requested: f64,
    pub granted: f64,
    pub quality: f64,
}

impl Allocation {
    /// Fraction of the request that was met, 1.0 when nothing was asked for.
    pub fn satisfaction(&self) -> f64 {
        if self.requested <= 0.0 {
            1.0
        } else {
            (self.granted / self.requested).clamp(0.0, 1.0)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    pub id: PopulationId,
    pub kind: PopulationKind,
    pub position: Position,
    pub size: u64,
    pub health: f64,
    pub resource_consumption_rate: f64,
    pub pollution_generation_rate: f64,
    #[serde(skip)]
    pub allocation: Option<Allocation>,
}

impl Population {
    pub fn is_extinct(&self) -> bool {
        self.size == 0 || self.health <= 0.0
    }

    pub fn adjust_health(&mut self, delta: f64) {
        let next = self.health + delta;
        self.health = if next.is_finite() {
            next.clamp(0.0, MAX_HEALTH)
        } else {
            0.0
        };
    }

    /// Resource demand for one day.
    pub fn daily_need(&self) -> f64 {
        self.resource_consumption_rate * self.size as f64
    }

    /// Takes this tick's allocation, leaving nothing for a second read.
    pub fn take_allocation(&mut self) -> Allocation {
        self.allocation.take().unwrap_or(Allocation {
            requested: 0.0,
            granted: 0.0,
            quality: 1.0,
        })
    }

    pub fn scale_size(&mut self, factor: f64) {
        self.size = (self.size as f64 * factor).max(0.0).floor() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_table_orders_kinds() {
        assert!(PopulationKind::Humans.priority() < PopulationKind::Wildlife.priority());
        assert_eq!(
            PopulationKind::Wildlife.priority(),
            PopulationKind::Fish.priority()
        );
        assert!(PopulationKind::Fish.priority() < PopulationKind::Trees.priority());
        assert!(PopulationKind::Trees.priority() < PopulationKind::Pests.priority());
    }

    #[test]
    fn every_kind_has_a_profile() {
        for kind in PopulationKind::ALL {
            assert_eq!(profile(kind).kind, kind);
            assert!(!profile(kind).cadences.is_empty());
        }
    }

    #[test]
    fn health_adjustments_stay_in_range() {
        let mut population = Population {
            id: PopulationId::from_raw(1),
            kind: PopulationKind::Fish,
            position: Position::new(0, 0),
            size: 10,
            health: 95.0,
            resource_consumption_rate: 0.01,
            pollution_generation_rate: 0.0,
            allocation: None,
        };
        population.adjust_health(20.0);
        assert_eq!(population.health, 100.0);
        population.adjust_health(-250.0);
        assert_eq!(population.health, 0.0);
        assert!(population.is_extinct());
    }

    #[test]
    fn satisfaction_handles_empty_requests() {
        let idle = Allocation {
            requested: 0.0,
            granted: 0.0,
            quality: 1.0,
        };
        assert_eq!(idle.satisfaction(), 1.0);
        let partial = Allocation {
            requested: 4.0,
            granted: 1.0,
            quality: 1.0,
        };
        assert_eq!(partial.satisfaction(), 0.25);
    }
}
