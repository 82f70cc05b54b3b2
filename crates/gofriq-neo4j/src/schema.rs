//! Graph schema definitions and the core taxonomy.
//!
//! The taxonomy is merged by stable code on every startup, so seeding is
//! idempotent and safe to run against a populated graph.

use gofriq::models::ImpactTier;

/// A seeded region node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDef {
    pub code: &'static str,
    pub name: &'static str,
}

/// A seeded sector node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorDef {
    pub code: &'static str,
    pub name: &'static str,
}

/// A seeded event type with its default impact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventTypeDef {
    pub code: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub base_impact: f64,
    pub default_tier: ImpactTier,
}

/// A seeded macro factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorDef {
    pub factor_id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
}

/// Region taxonomy.
pub const REGIONS: &[RegionDef] = &[
    RegionDef { code: "APAC", name: "Asia-Pacific" },
    RegionDef { code: "AMER", name: "Americas" },
    RegionDef { code: "EMEA", name: "Europe, Middle East and Africa" },
    RegionDef { code: "GLOBAL", name: "Global" },
];

/// Sector taxonomy.
pub const SECTORS: &[SectorDef] = &[
    SectorDef { code: "TECH", name: "Technology" },
    SectorDef { code: "FIN", name: "Financials" },
    SectorDef { code: "ENERGY", name: "Energy" },
    SectorDef { code: "HEALTH", name: "Health Care" },
    SectorDef { code: "INDUSTRIALS", name: "Industrials" },
    SectorDef { code: "MATERIALS", name: "Materials" },
    SectorDef { code: "CONSUMER", name: "Consumer" },
    SectorDef { code: "UTILITIES", name: "Utilities" },
    SectorDef { code: "TELECOM", name: "Telecommunications" },
    SectorDef { code: "REAL_ESTATE", name: "Real Estate" },
    SectorDef { code: "TOBACCO", name: "Tobacco" },
    SectorDef { code: "GAMBLING", name: "Gambling" },
];

/// Event type taxonomy with base impacts matching the extraction
/// guidance.
pub const EVENT_TYPES: &[EventTypeDef] = &[
    EventTypeDef {
        code: "EARNINGS",
        name: "Earnings report",
        category: "corporate",
        base_impact: 55.0,
        default_tier: ImpactTier::Silver,
    },
    EventTypeDef {
        code: "MERGER_ACQUISITION",
        name: "Merger or acquisition",
        category: "corporate",
        base_impact: 80.0,
        default_tier: ImpactTier::Gold,
    },
    EventTypeDef {
        code: "REGULATORY",
        name: "Regulatory action",
        category: "policy",
        base_impact: 70.0,
        default_tier: ImpactTier::Gold,
    },
    EventTypeDef {
        code: "PRODUCT_LAUNCH",
        name: "Product launch",
        category: "corporate",
        base_impact: 45.0,
        default_tier: ImpactTier::Bronze,
    },
    EventTypeDef {
        code: "GUIDANCE_CHANGE",
        name: "Guidance change",
        category: "corporate",
        base_impact: 60.0,
        default_tier: ImpactTier::Silver,
    },
    EventTypeDef {
        code: "MANAGEMENT_CHANGE",
        name: "Management change",
        category: "corporate",
        base_impact: 50.0,
        default_tier: ImpactTier::Bronze,
    },
    EventTypeDef {
        code: "LITIGATION",
        name: "Litigation",
        category: "legal",
        base_impact: 55.0,
        default_tier: ImpactTier::Silver,
    },
    EventTypeDef {
        code: "STRIKE_LABOR",
        name: "Strike or labor action",
        category: "operations",
        base_impact: 60.0,
        default_tier: ImpactTier::Silver,
    },
    EventTypeDef {
        code: "SUPPLY_DISRUPTION",
        name: "Supply chain disruption",
        category: "operations",
        base_impact: 65.0,
        default_tier: ImpactTier::Silver,
    },
    EventTypeDef {
        code: "MACRO_POLICY",
        name: "Macro policy decision",
        category: "macro",
        base_impact: 75.0,
        default_tier: ImpactTier::Gold,
    },
    EventTypeDef {
        code: "CREDIT_RATING",
        name: "Credit rating change",
        category: "credit",
        base_impact: 60.0,
        default_tier: ImpactTier::Silver,
    },
    EventTypeDef {
        code: "DIVIDEND_BUYBACK",
        name: "Dividend or buyback",
        category: "corporate",
        base_impact: 40.0,
        default_tier: ImpactTier::Bronze,
    },
];

/// Macro factor taxonomy.
pub const FACTORS: &[FactorDef] = &[
    FactorDef { factor_id: "rates", name: "Global interest rates", category: "macro" },
    FactorDef { factor_id: "oil", name: "Crude oil price", category: "commodity" },
    FactorDef { factor_id: "fx_usd", name: "US dollar strength", category: "fx" },
    FactorDef { factor_id: "china_growth", name: "China growth", category: "macro" },
    FactorDef {
        factor_id: "semiconductor_cycle",
        name: "Semiconductor cycle",
        category: "industry",
    },
];

/// Look up a seeded event type by code.
#[must_use]
pub fn event_type(code: &str) -> Option<&'static EventTypeDef> {
    EVENT_TYPES.iter().find(|e| e.code.eq_ignore_ascii_case(code))
}

/// Every seeded event type code, for prompt construction.
#[must_use]
pub fn event_type_codes() -> Vec<&'static str> {
    EVENT_TYPES.iter().map(|e| e.code).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_lookup() {
        let earnings = event_type("earnings").unwrap();
        assert_eq!(earnings.code, "EARNINGS");
        assert_eq!(earnings.default_tier, ImpactTier::Silver);
        assert!(event_type("UNKNOWN_EVENT").is_none());
    }

    #[test]
    fn test_taxonomy_codes_unique() {
        let mut codes: Vec<&str> = EVENT_TYPES.iter().map(|e| e.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), EVENT_TYPES.len());

        let mut sectors: Vec<&str> = SECTORS.iter().map(|s| s.code).collect();
        sectors.sort_unstable();
        sectors.dedup();
        assert_eq!(sectors.len(), SECTORS.len());
    }
}
